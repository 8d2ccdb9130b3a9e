// Copyright (c) 2026 The gpio-lines Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use bitflags::bitflags;
use nix::ioctl_readwrite;

pub(crate) const GPIO_LINES_MAX: usize = 64;
pub(crate) const GPIO_MAX_NAME_SIZE: usize = 32;
pub(crate) const GPIO_LINE_NUM_ATTRS_MAX: usize = 10;

bitflags! {
    /// Line flags
    ///
    /// Maps to kernel [`GPIO_V2_LINE_FLAG_*`] flags.
    ///
    /// [`GPIO_V2_LINE_FLAG_*`]: https://github.com/torvalds/linux/blob/v5.19/include/uapi/linux/gpio.h
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct LineFlags: u64 {
        const USED = (1 << 0);
        const ACTIVE_LOW = (1 << 1);
        const INPUT = (1 << 2);
        const OUTPUT = (1 << 3);
        const EDGE_RISING = (1 << 4);
        const EDGE_FALLING = (1 << 5);
        const OPEN_DRAIN = (1 << 6);
        const OPEN_SOURCE = (1 << 7);
        const BIAS_PULL_UP = (1 << 8);
        const BIAS_PULL_DOWN = (1 << 9);
        const BIAS_DISABLED = (1 << 10);
        const EVENT_CLOCK_REALTIME = (1 << 11);
        const EVENT_CLOCK_HTE = (1 << 12);
    }
}

// GPIO_V2_LINE_ATTR_ID_*. Scalar ids, not flag bits.
pub(crate) const LINE_ATTR_ID_FLAGS: u32 = 1;
pub(crate) const LINE_ATTR_ID_OUTPUT_VALUES: u32 = 2;
pub(crate) const LINE_ATTR_ID_DEBOUNCE: u32 = 3;

// GPIO_V2_LINE_EVENT_*
pub(crate) const LINE_EVENT_RISING_EDGE: u32 = 1;
pub(crate) const LINE_EVENT_FALLING_EDGE: u32 = 2;

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_values {
    pub(crate) bits: u64,
    pub(crate) mask: u64,
}

/// Tagged by `gpio_line_attribute.id`.
#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) union gpio_line_attr_value {
    /// [`LINE_ATTR_ID_FLAGS`]: per-line flags overriding `gpio_line_config.flags`
    pub(crate) flags: u64,
    /// [`LINE_ATTR_ID_OUTPUT_VALUES`]: bitmap indexed by position in
    /// `gpio_line_request.offsets`
    pub(crate) values: u64,
    /// [`LINE_ATTR_ID_DEBOUNCE`]: debounce period in microseconds
    pub(crate) debounce_period_us: u32,
}

#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_attribute {
    pub(crate) id: u32,
    pub(crate) _padding: u32,
    pub(crate) value: gpio_line_attr_value,
}

impl gpio_line_attribute {
    pub(crate) const fn zeroed() -> Self {
        Self {
            id: 0,
            _padding: 0,
            value: gpio_line_attr_value { values: 0 },
        }
    }
}

#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_config_attribute {
    pub(crate) attr: gpio_line_attribute,
    pub(crate) mask: u64,
}

impl gpio_line_config_attribute {
    pub(crate) const fn zeroed() -> Self {
        Self {
            attr: gpio_line_attribute::zeroed(),
            mask: 0,
        }
    }
}

#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_config {
    pub(crate) flags: u64,
    pub(crate) num_attrs: u32,
    _padding: [u32; 5],
    pub(crate) attrs: [gpio_line_config_attribute; GPIO_LINE_NUM_ATTRS_MAX],
}

impl gpio_line_config {
    pub(crate) const fn zeroed() -> Self {
        Self {
            flags: 0,
            num_attrs: 0,
            _padding: [0; 5],
            attrs: [gpio_line_config_attribute::zeroed(); GPIO_LINE_NUM_ATTRS_MAX],
        }
    }
}

#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_request {
    pub(crate) offsets: [u32; GPIO_LINES_MAX],
    pub(crate) consumer: [u8; GPIO_MAX_NAME_SIZE],
    pub(crate) config: gpio_line_config,
    pub(crate) num_lines: u32,
    pub(crate) event_buffer_size: u32,
    _padding: [u32; 5],
    pub(crate) fd: std::os::fd::RawFd,
}

impl gpio_line_request {
    pub(crate) const fn zeroed() -> Self {
        Self {
            offsets: [0; GPIO_LINES_MAX],
            consumer: [0; GPIO_MAX_NAME_SIZE],
            config: gpio_line_config::zeroed(),
            num_lines: 0,
            event_buffer_size: 0,
            _padding: [0; 5],
            fd: 0,
        }
    }
}

#[derive(Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_info {
    pub(crate) name: [u8; GPIO_MAX_NAME_SIZE],
    pub(crate) consumer: [u8; GPIO_MAX_NAME_SIZE],
    pub(crate) offset: u32,
    pub(crate) num_attrs: u32,
    pub(crate) flags: u64,
    pub(crate) attrs: [gpio_line_attribute; GPIO_LINE_NUM_ATTRS_MAX],
    pub(crate) _padding: [u32; 4],
}

impl gpio_line_info {
    pub(crate) const fn zeroed() -> Self {
        Self {
            name: [0; GPIO_MAX_NAME_SIZE],
            consumer: [0; GPIO_MAX_NAME_SIZE],
            offset: 0,
            num_attrs: 0,
            flags: 0,
            attrs: [gpio_line_attribute::zeroed(); GPIO_LINE_NUM_ATTRS_MAX],
            _padding: [0; 4],
        }
    }
}

#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub(crate) struct gpio_line_event {
    pub(crate) timestamp_ns: u64,
    pub(crate) id: u32,
    pub(crate) offset: u32,
    pub(crate) seqno: u32,
    pub(crate) line_seqno: u32,
    /* Space reserved for future use. */
    _padding: [u32; 6],
}

pub(crate) const LINE_EVENT_SIZE: usize = std::mem::size_of::<gpio_line_event>();

impl gpio_line_event {
    #[cfg(test)]
    pub(crate) const fn zeroed() -> Self {
        Self {
            timestamp_ns: 0,
            id: 0,
            offset: 0,
            seqno: 0,
            line_seqno: 0,
            _padding: [0; 6],
        }
    }

    /// Reassemble a record drained from the event stream. Every bit pattern
    /// of the fields is a valid value, so this cannot fail.
    pub(crate) fn from_bytes(bytes: [u8; LINE_EVENT_SIZE]) -> Self {
        let ptr = (&bytes as *const u8) as *const Self;
        unsafe { std::ptr::read_unaligned(ptr) }
    }

    #[cfg(test)]
    pub(crate) fn to_bytes(self) -> [u8; LINE_EVENT_SIZE] {
        let mut buf = [0u8; LINE_EVENT_SIZE];
        let ptr = buf.as_mut_ptr() as *mut Self;
        unsafe { std::ptr::write_unaligned(ptr, self) };
        buf
    }
}

ioctl_readwrite!(gpio_get_line, 0xB4, 0x07, gpio_line_request);

ioctl_readwrite!(gpio_get_lineinfo, 0xB4, 0x05, gpio_line_info);

ioctl_readwrite!(gpio_line_set_config, 0xB4, 0x0D, gpio_line_config);

ioctl_readwrite!(gpio_line_get_values, 0xB4, 0x0E, gpio_line_values);
ioctl_readwrite!(gpio_line_set_values, 0xB4, 0x0F, gpio_line_values);
