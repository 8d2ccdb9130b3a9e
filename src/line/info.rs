use std::time::Duration;

use crate::errors::{Error, Result};
use crate::fixed_str::FixedStr;
use crate::line::config::{Active, Bias, Direction, EdgeDetect};
use crate::uapi::v2::{self, LineFlags, GPIO_MAX_NAME_SIZE};

/// Static metadata about one line, as reported by the kernel.
///
/// This is the enumeration-side view: it reflects whatever consumer
/// currently holds the line, not necessarily a request made through this
/// crate.
#[derive(Debug, Clone)]
pub struct LineInfo {
    name: FixedStr<GPIO_MAX_NAME_SIZE>,
    consumer: FixedStr<GPIO_MAX_NAME_SIZE>,
    offset: u32,
    flags: LineFlags,
    debounce: Option<Duration>,
}

impl LineInfo {
    pub(crate) fn from_raw(raw: v2::gpio_line_info) -> Result<Self> {
        let name = FixedStr::from_byte_array(raw.name).map_err(|e| Error::Io(e.into()))?;
        let consumer = FixedStr::from_byte_array(raw.consumer).map_err(|e| Error::Io(e.into()))?;

        let mut flags = LineFlags::from_bits_truncate(raw.flags);
        let mut debounce = None;
        for attr in raw.attrs.iter().take(raw.num_attrs as usize) {
            match attr.id {
                v2::LINE_ATTR_ID_FLAGS => {
                    flags = LineFlags::from_bits_truncate(unsafe { attr.value.flags });
                }
                v2::LINE_ATTR_ID_DEBOUNCE => {
                    let micros = unsafe { attr.value.debounce_period_us };
                    debounce = Some(Duration::from_micros(micros as u64));
                }
                _ => {}
            }
        }

        Ok(Self {
            name,
            consumer,
            offset: raw.offset,
            flags,
            debounce,
        })
    }

    /// Line name assigned by the device tree or driver, if any.
    pub fn name(&self) -> Option<&str> {
        if self.name.is_empty() {
            None
        } else {
            Some(&self.name)
        }
    }

    /// Label of whoever currently holds the line, if anyone.
    pub fn consumer(&self) -> Option<&str> {
        if self.consumer.is_empty() {
            None
        } else {
            Some(&self.consumer)
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Lines not explicitly marked as outputs by the kernel are inputs.
    pub fn direction(&self) -> Direction {
        if self.flags.contains(LineFlags::OUTPUT) {
            Direction::Output
        } else {
            Direction::Input
        }
    }

    pub fn active(&self) -> Active {
        if self.flags.contains(LineFlags::ACTIVE_LOW) {
            Active::Low
        } else {
            Active::High
        }
    }

    /// True if some consumer holds the line.
    pub fn is_used(&self) -> bool {
        self.flags.contains(LineFlags::USED)
    }

    pub fn bias(&self) -> Bias {
        if self.flags.contains(LineFlags::BIAS_PULL_UP) {
            Bias::PullUp
        } else if self.flags.contains(LineFlags::BIAS_PULL_DOWN) {
            Bias::PullDown
        } else {
            Bias::Disabled
        }
    }

    pub fn edge(&self) -> Option<EdgeDetect> {
        let rising = self.flags.contains(LineFlags::EDGE_RISING);
        let falling = self.flags.contains(LineFlags::EDGE_FALLING);
        match (rising, falling) {
            (true, true) => Some(EdgeDetect::Both),
            (true, false) => Some(EdgeDetect::Rising),
            (false, true) => Some(EdgeDetect::Falling),
            (false, false) => None,
        }
    }

    pub fn is_open_drain(&self) -> bool {
        self.flags.contains(LineFlags::OPEN_DRAIN)
    }

    pub fn is_open_source(&self) -> bool {
        self.flags.contains(LineFlags::OPEN_SOURCE)
    }

    pub fn debounce(&self) -> Option<Duration> {
        self.debounce
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_flags_and_attributes() {
        let mut raw = v2::gpio_line_info::zeroed();
        raw.offset = 12;
        raw.name[..5].copy_from_slice(b"reset");
        raw.flags = (LineFlags::USED | LineFlags::INPUT | LineFlags::EDGE_RISING).bits();
        raw.num_attrs = 1;
        raw.attrs[0].id = v2::LINE_ATTR_ID_DEBOUNCE;
        raw.attrs[0].value.debounce_period_us = 250;

        let info = LineInfo::from_raw(raw).unwrap();
        assert_eq!(info.name(), Some("reset"));
        assert_eq!(info.consumer(), None);
        assert_eq!(info.offset(), 12);
        assert_eq!(info.direction(), Direction::Input);
        assert!(info.is_used());
        assert_eq!(info.edge(), Some(EdgeDetect::Rising));
        assert_eq!(info.debounce(), Some(Duration::from_micros(250)));
    }

    #[test]
    fn flag_attribute_overrides_base_flags() {
        let mut raw = v2::gpio_line_info::zeroed();
        raw.flags = LineFlags::INPUT.bits();
        raw.num_attrs = 1;
        raw.attrs[0].id = v2::LINE_ATTR_ID_FLAGS;
        raw.attrs[0].value.flags = (LineFlags::OUTPUT | LineFlags::ACTIVE_LOW).bits();

        let info = LineInfo::from_raw(raw).unwrap();
        assert_eq!(info.direction(), Direction::Output);
        assert_eq!(info.active(), Active::Low);
    }
}
