mod common;

pub(crate) use common::*;

pub(crate) mod v2;
