use std::time::Duration;

use crate::errors::{Error, Result};
use crate::uapi::v2::{
    self, LineFlags, GPIO_LINES_MAX, GPIO_LINE_NUM_ATTRS_MAX, LINE_ATTR_ID_DEBOUNCE,
    LINE_ATTR_ID_FLAGS, LINE_ATTR_ID_OUTPUT_VALUES,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Active {
    #[default]
    High,
    Low,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Bias {
    #[default]
    Disabled,
    PullUp,
    PullDown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Drive {
    #[default]
    PushPull,
    OpenDrain,
    OpenSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EdgeDetect {
    Rising,
    Falling,
    #[default]
    Both,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum EventClock {
    /// CLOCK_MONOTONIC, the kernel default.
    #[default]
    Monotonic,
    Realtime,
    /// Hardware timestamp engine.
    Hte,
}

/// Per-line intent supplied at request time.
///
/// A single request mixes input and output lines freely; whether any line
/// carries an edge mode decides internally how the request is armed, it is
/// not a separate request flavor. Everything here except the edge mode can
/// later be changed through [`LineHandle::reconfigure`].
///
/// [`LineHandle::reconfigure`]: crate::line::request::LineHandle::reconfigure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineConfig {
    direction: Direction,
    active: Active,
    bias: Bias,
    drive: Drive,
    edge: Option<EdgeDetect>,
    clock: EventClock,
    value: Option<bool>,
    debounce: Option<Duration>,
}

impl LineConfig {
    /// An input line with default active level and bias.
    pub const fn input() -> Self {
        Self {
            direction: Direction::Input,
            active: Active::High,
            bias: Bias::Disabled,
            drive: Drive::PushPull,
            edge: None,
            clock: EventClock::Monotonic,
            value: None,
            debounce: None,
        }
    }

    /// An output line driven to `initial` as soon as the request is granted.
    pub const fn output(initial: bool) -> Self {
        Self {
            direction: Direction::Output,
            value: Some(initial),
            ..Self::input()
        }
    }

    pub const fn active_low(self) -> Self {
        Self {
            active: Active::Low,
            ..self
        }
    }

    pub const fn with_active(self, active: Active) -> Self {
        Self { active, ..self }
    }

    pub const fn with_bias(self, bias: Bias) -> Self {
        Self { bias, ..self }
    }

    pub const fn with_drive(self, drive: Drive) -> Self {
        Self { drive, ..self }
    }

    pub const fn with_edge(self, edge: EdgeDetect) -> Self {
        Self {
            edge: Some(edge),
            ..self
        }
    }

    pub const fn with_event_clock(self, clock: EventClock) -> Self {
        Self { clock, ..self }
    }

    pub const fn with_debounce(self, period: Duration) -> Self {
        Self {
            debounce: Some(period),
            ..self
        }
    }

    pub const fn direction(&self) -> Direction {
        self.direction
    }

    pub const fn active(&self) -> Active {
        self.active
    }

    pub const fn bias(&self) -> Bias {
        self.bias
    }

    pub const fn drive(&self) -> Drive {
        self.drive
    }

    pub const fn edge(&self) -> Option<EdgeDetect> {
        self.edge
    }

    pub const fn event_clock(&self) -> EventClock {
        self.clock
    }

    /// Initial output value, if this is an output line.
    pub const fn value(&self) -> Option<bool> {
        self.value
    }

    pub const fn debounce(&self) -> Option<Duration> {
        self.debounce
    }

    /// Rejects combinations the kernel interface cannot express, before any
    /// kernel call is issued.
    pub fn validate(&self) -> Result<()> {
        match self.direction {
            Direction::Output => {
                if self.edge.is_some() {
                    return Err(Error::InvalidConfig(
                        "edge detection requires input direction".into(),
                    ));
                }
                if self.debounce.is_some() {
                    return Err(Error::InvalidConfig(
                        "debounce requires input direction".into(),
                    ));
                }
            }
            Direction::Input => {
                if self.value.is_some() {
                    return Err(Error::InvalidConfig(
                        "initial value requires output direction".into(),
                    ));
                }
                if self.drive != Drive::PushPull {
                    return Err(Error::InvalidConfig(
                        "open-drain and open-source drive require output direction".into(),
                    ));
                }
            }
        }

        if let Some(period) = self.debounce {
            if period.as_micros() > u32::MAX as u128 {
                return Err(Error::InvalidConfig(format!(
                    "debounce period of {period:?} exceeds the interface maximum"
                )));
            }
        }

        Ok(())
    }

    pub(crate) fn flags(&self) -> LineFlags {
        let mut flags = match self.direction {
            Direction::Input => LineFlags::INPUT,
            Direction::Output => LineFlags::OUTPUT,
        };

        if matches!(self.active, Active::Low) {
            flags |= LineFlags::ACTIVE_LOW;
        }

        flags |= match self.bias {
            Bias::Disabled => LineFlags::BIAS_DISABLED,
            Bias::PullUp => LineFlags::BIAS_PULL_UP,
            Bias::PullDown => LineFlags::BIAS_PULL_DOWN,
        };

        match self.drive {
            Drive::PushPull => {}
            Drive::OpenDrain => flags |= LineFlags::OPEN_DRAIN,
            Drive::OpenSource => flags |= LineFlags::OPEN_SOURCE,
        }

        if let Some(edge) = self.edge {
            flags |= match edge {
                EdgeDetect::Rising => LineFlags::EDGE_RISING,
                EdgeDetect::Falling => LineFlags::EDGE_FALLING,
                EdgeDetect::Both => LineFlags::EDGE_RISING | LineFlags::EDGE_FALLING,
            };

            // The clock only matters for event timestamps.
            flags |= match self.clock {
                EventClock::Monotonic => LineFlags::empty(),
                EventClock::Realtime => LineFlags::EVENT_CLOCK_REALTIME,
                EventClock::Hte => LineFlags::EVENT_CLOCK_HTE,
            };
        }

        flags
    }
}

/// Packs one request's per-line configs into the wire layout: base flags
/// from the first line, then attribute overrides for lines that differ.
/// The interface caps overrides at [`GPIO_LINE_NUM_ATTRS_MAX`] slots.
pub(crate) fn encode(configs: &[LineConfig]) -> Result<v2::gpio_line_config> {
    debug_assert!(!configs.is_empty() && configs.len() <= GPIO_LINES_MAX);

    let base = configs[0].flags();

    let mut attrs: heapless::Vec<v2::gpio_line_config_attribute, GPIO_LINE_NUM_ATTRS_MAX> =
        heapless::Vec::new();

    // Flag overrides, one attribute per distinct flag pattern.
    let mut flag_groups: heapless::Vec<(u64, u64), GPIO_LINE_NUM_ATTRS_MAX> = heapless::Vec::new();
    for (idx, config) in configs.iter().enumerate() {
        let flags = config.flags();
        if flags == base {
            continue;
        }
        match flag_groups.iter_mut().find(|(bits, _)| *bits == flags.bits()) {
            Some((_, mask)) => *mask |= 1 << idx,
            None => flag_groups
                .push((flags.bits(), 1 << idx))
                .map_err(|_| attr_overflow())?,
        }
    }
    for (bits, mask) in &flag_groups {
        push_attr(
            &mut attrs,
            v2::gpio_line_config_attribute {
                attr: v2::gpio_line_attribute {
                    id: LINE_ATTR_ID_FLAGS,
                    _padding: 0,
                    value: v2::gpio_line_attr_value { flags: *bits },
                },
                mask: *mask,
            },
        )?;
    }

    // Initial values for the output lines, one shared attribute.
    let mut out_mask = 0u64;
    let mut out_bits = 0u64;
    for (idx, config) in configs.iter().enumerate() {
        if config.direction() == Direction::Output {
            out_mask |= 1 << idx;
            if config.value() == Some(true) {
                out_bits |= 1 << idx;
            }
        }
    }
    if out_mask != 0 {
        push_attr(
            &mut attrs,
            v2::gpio_line_config_attribute {
                attr: v2::gpio_line_attribute {
                    id: LINE_ATTR_ID_OUTPUT_VALUES,
                    _padding: 0,
                    value: v2::gpio_line_attr_value { values: out_bits },
                },
                mask: out_mask,
            },
        )?;
    }

    // Debounce periods, one attribute per distinct period.
    let mut debounce_groups: heapless::Vec<(u32, u64), GPIO_LINE_NUM_ATTRS_MAX> =
        heapless::Vec::new();
    for (idx, config) in configs.iter().enumerate() {
        let Some(period) = config.debounce() else {
            continue;
        };
        let micros = period.as_micros() as u32;
        match debounce_groups.iter_mut().find(|(us, _)| *us == micros) {
            Some((_, mask)) => *mask |= 1 << idx,
            None => debounce_groups
                .push((micros, 1 << idx))
                .map_err(|_| attr_overflow())?,
        }
    }
    for (micros, mask) in &debounce_groups {
        push_attr(
            &mut attrs,
            v2::gpio_line_config_attribute {
                attr: v2::gpio_line_attribute {
                    id: LINE_ATTR_ID_DEBOUNCE,
                    _padding: 0,
                    value: v2::gpio_line_attr_value {
                        debounce_period_us: *micros,
                    },
                },
                mask: *mask,
            },
        )?;
    }

    let mut config = v2::gpio_line_config::zeroed();
    config.flags = base.bits();
    config.num_attrs = attrs.len() as u32;
    for (slot, attr) in config.attrs.iter_mut().zip(attrs) {
        *slot = attr;
    }

    Ok(config)
}

fn push_attr(
    attrs: &mut heapless::Vec<v2::gpio_line_config_attribute, GPIO_LINE_NUM_ATTRS_MAX>,
    attr: v2::gpio_line_config_attribute,
) -> Result<()> {
    attrs.push(attr).map_err(|_| attr_overflow())
}

fn attr_overflow() -> Error {
    Error::InvalidConfig(format!(
        "per-line configuration needs more than {GPIO_LINE_NUM_ATTRS_MAX} attribute slots"
    ))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builds_input_flags() {
        let flags = LineConfig::input()
            .active_low()
            .with_bias(Bias::PullUp)
            .with_edge(EdgeDetect::Both)
            .with_event_clock(EventClock::Realtime)
            .flags();

        let expected = LineFlags::INPUT
            | LineFlags::ACTIVE_LOW
            | LineFlags::BIAS_PULL_UP
            | LineFlags::EDGE_RISING
            | LineFlags::EDGE_FALLING
            | LineFlags::EVENT_CLOCK_REALTIME;

        assert_eq!(flags, expected);
    }

    #[test]
    fn builds_open_drain_output_flags() {
        let flags = LineConfig::output(true)
            .with_drive(Drive::OpenDrain)
            .with_bias(Bias::PullUp)
            .flags();

        let expected = LineFlags::OUTPUT | LineFlags::OPEN_DRAIN | LineFlags::BIAS_PULL_UP;

        assert_eq!(flags, expected);
    }

    #[test]
    fn clock_flags_need_an_edge() {
        let flags = LineConfig::input()
            .with_event_clock(EventClock::Realtime)
            .flags();
        assert!(!flags.contains(LineFlags::EVENT_CLOCK_REALTIME));
    }

    #[test]
    fn rejects_edge_detection_on_outputs() {
        let err = LineConfig::output(false)
            .with_edge(EdgeDetect::Rising)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_initial_value_on_inputs() {
        let config = LineConfig {
            value: Some(true),
            ..LineConfig::input()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_open_drive_on_inputs() {
        let err = LineConfig::input()
            .with_drive(Drive::OpenDrain)
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_debounce_on_outputs() {
        let err = LineConfig::output(false)
            .with_debounce(Duration::from_millis(5))
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_oversized_debounce() {
        let err = LineConfig::input()
            .with_debounce(Duration::from_secs(1 << 33))
            .validate()
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn encodes_uniform_configs_without_attributes() {
        let config = LineConfig::input().with_edge(EdgeDetect::Rising);
        let encoded = encode(&[config, config, config]).unwrap();
        assert_eq!(encoded.flags, config.flags().bits());
        assert_eq!(encoded.num_attrs, 0);
    }

    #[test]
    fn encodes_flag_overrides_per_group() {
        let base = LineConfig::input();
        let low = LineConfig::input().active_low();
        let encoded = encode(&[base, low, low, base]).unwrap();

        assert_eq!(encoded.flags, base.flags().bits());
        assert_eq!(encoded.num_attrs, 1);
        let attr = encoded.attrs[0];
        assert_eq!(attr.attr.id, LINE_ATTR_ID_FLAGS);
        assert_eq!(attr.mask, 0b0110);
        assert_eq!(unsafe { attr.attr.value.flags }, low.flags().bits());
    }

    #[test]
    fn encodes_output_values_bitmap() {
        let encoded = encode(&[
            LineConfig::output(true),
            LineConfig::output(false),
            LineConfig::output(true),
        ])
        .unwrap();

        assert_eq!(encoded.num_attrs, 1);
        let attr = encoded.attrs[0];
        assert_eq!(attr.attr.id, LINE_ATTR_ID_OUTPUT_VALUES);
        assert_eq!(attr.mask, 0b0111);
        assert_eq!(unsafe { attr.attr.value.values }, 0b0101);
    }

    #[test]
    fn encodes_distinct_debounce_periods() {
        let fast = LineConfig::input().with_debounce(Duration::from_micros(100));
        let slow = LineConfig::input().with_debounce(Duration::from_micros(5_000));
        let encoded = encode(&[fast, slow, fast]).unwrap();

        assert_eq!(encoded.num_attrs, 2);
        assert_eq!(encoded.attrs[0].attr.id, LINE_ATTR_ID_DEBOUNCE);
        assert_eq!(encoded.attrs[0].mask, 0b0101);
        assert_eq!(unsafe { encoded.attrs[0].attr.value.debounce_period_us }, 100);
        assert_eq!(encoded.attrs[1].mask, 0b0010);
        assert_eq!(
            unsafe { encoded.attrs[1].attr.value.debounce_period_us },
            5_000
        );
    }

    #[test]
    fn encode_rejects_attribute_overflow() {
        let configs: Vec<LineConfig> = (0..11)
            .map(|i| LineConfig::input().with_debounce(Duration::from_micros(i + 1)))
            .collect();
        // 11 distinct debounce periods cannot fit the 10 attribute slots.
        assert!(matches!(
            encode(&configs),
            Err(Error::InvalidConfig(_))
        ));
    }
}
