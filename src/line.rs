//! Line requests and everything that travels through them: per-line
//! configuration, counted handles, static metadata and decoded edge events.

pub mod config;
pub mod event;
pub mod info;
pub(crate) mod offsets;
pub mod request;
pub(crate) mod values;

pub use config::{Active, Bias, Direction, Drive, EdgeDetect, EventClock, LineConfig};
pub use event::{Edge, Event, Timestamp};
pub use info::LineInfo;
pub use request::{LineHandle, RequestId};
