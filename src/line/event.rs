use std::time::Duration;

use crate::errors::{Error, Result};
use crate::uapi::v2;

/// The direction of a detected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// A kernel event timestamp: nanoseconds on the clock the line was
/// configured with (monotonic unless realtime or HTE was selected).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timestamp(u64);

impl Timestamp {
    pub(crate) const fn from_nanos(ns: u64) -> Self {
        Self(ns)
    }

    pub const fn as_nanos(&self) -> u64 {
        self.0
    }

    pub const fn as_duration(&self) -> Duration {
        Duration::from_nanos(self.0)
    }

    /// Current monotonic clock reading, comparable with default-clock event
    /// timestamps for latency measurements.
    pub fn now() -> Result<Self> {
        let mut ts = libc::timespec {
            tv_sec: 0,
            tv_nsec: 0,
        };
        let res = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
        if res == -1 {
            return Err(nix::errno::Errno::last().into());
        }
        Ok(Self(ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64))
    }
}

/// A single edge observation, decoded from the kernel's event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    offset: u32,
    edge: Edge,
    timestamp: Timestamp,
    seqno: u32,
    line_seqno: u32,
}

impl Event {
    pub(crate) fn from_raw(raw: v2::gpio_line_event) -> Result<Self> {
        let edge = match raw.id {
            v2::LINE_EVENT_RISING_EDGE => Edge::Rising,
            v2::LINE_EVENT_FALLING_EDGE => Edge::Falling,
            other => {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("unrecognized line event id: {other}"),
                )))
            }
        };

        Ok(Self {
            offset: raw.offset,
            edge,
            timestamp: Timestamp::from_nanos(raw.timestamp_ns),
            seqno: raw.seqno,
            line_seqno: raw.line_seqno,
        })
    }

    /// Offset of the line the transition happened on.
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    pub const fn edge(&self) -> Edge {
        self.edge
    }

    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Sequence number across all lines of the owning request.
    pub const fn seqno(&self) -> u32 {
        self.seqno
    }

    /// Sequence number within this line alone.
    pub const fn line_seqno(&self) -> u32 {
        self.line_seqno
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn raw(id: u32) -> v2::gpio_line_event {
        let mut raw = v2::gpio_line_event::zeroed();
        raw.timestamp_ns = 123_456_789;
        raw.id = id;
        raw.offset = 17;
        raw.seqno = 42;
        raw.line_seqno = 7;
        raw
    }

    #[test]
    fn decodes_both_edges() {
        let rising = Event::from_raw(raw(v2::LINE_EVENT_RISING_EDGE)).unwrap();
        assert_eq!(rising.edge(), Edge::Rising);
        assert_eq!(rising.offset(), 17);
        assert_eq!(rising.timestamp().as_nanos(), 123_456_789);
        assert_eq!(rising.seqno(), 42);
        assert_eq!(rising.line_seqno(), 7);

        let falling = Event::from_raw(raw(v2::LINE_EVENT_FALLING_EDGE)).unwrap();
        assert_eq!(falling.edge(), Edge::Falling);
    }

    #[test]
    fn rejects_unknown_event_ids() {
        assert!(matches!(Event::from_raw(raw(99)), Err(Error::Io(_))));
    }

    #[test]
    fn timestamp_converts_to_duration() {
        let ts = Timestamp::from_nanos(1_500_000_000);
        assert_eq!(ts.as_duration(), Duration::from_millis(1_500));
    }
}
