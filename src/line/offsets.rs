use itertools::Itertools;

use crate::errors::{Error, Result};
use crate::uapi::v2::GPIO_LINES_MAX;

/// The offsets covered by one request or handle, in caller order.
///
/// Order is load-bearing: it defines the positional mapping used by bulk
/// value reads and writes, so offsets are never sorted or merged here.
/// Duplicates are rejected instead of deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Offsets(heapless::Vec<u32, GPIO_LINES_MAX>);

impl Offsets {
    pub(crate) fn from_slice(offsets: &[u32]) -> Result<Self> {
        if offsets.is_empty() {
            return Err(Error::InvalidConfig(
                "at least one line offset is required".into(),
            ));
        }
        if offsets.len() > GPIO_LINES_MAX {
            return Err(Error::InvalidConfig(format!(
                "a request covers at most {GPIO_LINES_MAX} lines, got {}",
                offsets.len()
            )));
        }

        let duplicates = offsets.iter().duplicates().collect::<Vec<_>>();
        if !duplicates.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "duplicate line offsets: {}",
                duplicates.iter().join(", ")
            )));
        }

        let vec = heapless::Vec::from_slice(offsets)
            .map_err(|_| Error::InvalidConfig("line offset list does not fit a request".into()))?;
        Ok(Self(vec))
    }

    /// Index of `offset` in this list, i.e. its bit position in the
    /// kernel's bits/mask words.
    pub(crate) fn position(&self, offset: u32) -> Option<usize> {
        self.0.iter().position(|o| *o == offset)
    }

    pub(crate) fn as_slice(&self) -> &[u32] {
        &self.0
    }

    pub(crate) fn to_raw(&self) -> (u32, [u32; GPIO_LINES_MAX]) {
        let mut lines = [0; GPIO_LINES_MAX];
        for (slot, offset) in lines.iter_mut().zip(self.0.iter()) {
            *slot = *offset;
        }
        (self.0.len() as u32, lines)
    }
}

impl std::ops::Deref for Offsets {
    type Target = [u32];

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
