use std::fs;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use bstr::ByteSlice;

use crate::errors::{Error, Result};
use crate::fixed_str::FixedStr;
use crate::line::config::LineConfig;
use crate::line::info::LineInfo;
use crate::line::request::{self, LineHandle};
use crate::uapi::{self, v2};

/// A GPIO chip maps to the actual device driver instance in hardware that
/// one interacts with to reach individual lines. Often these chips map to
/// IP blocks on an SoC, but they can also be enumerated within the kernel
/// via something like a PCI or USB bus.
///
/// The kernel exposes chips at `/dev/gpiochipN`. Enumeration order is not
/// stable, especially for bus-attached controllers; to reliably find a
/// chip either match on [`ChipInfo`] attributes while iterating with
/// [`chips()`], or set up a udev symlink. Hard-coding the enumerated path
/// is fine for demo work only.
#[derive(Debug)]
pub struct Chip {
    fd: OwnedFd,
    info: ChipInfo,
}

impl Chip {
    /// Opens the GPIO chip at the provided path (e.g. `/dev/gpiochip0`) and
    /// reads its static metadata.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
                std::io::ErrorKind::PermissionDenied => Error::PermissionDenied,
                _ => Error::Io(e),
            })?;
        let fd = OwnedFd::from(file);

        let mut raw = uapi::gpio_chip_info::zeroed();
        unsafe { uapi::gpio_get_chipinfo(fd.as_raw_fd(), &mut raw) }
            .map_err(Error::from_request_errno)?;

        let info = ChipInfo {
            name: FixedStr::from_byte_array(raw.name).map_err(|e| Error::Io(e.into()))?,
            label: FixedStr::from_byte_array(raw.label).map_err(|e| Error::Io(e.into()))?,
            lines: raw.lines,
        };

        Ok(Self { fd, info })
    }

    pub fn info(&self) -> &ChipInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        self.info.name()
    }

    pub fn label(&self) -> &str {
        self.info.label()
    }

    pub fn num_lines(&self) -> u32 {
        self.info.num_lines()
    }

    /// Static metadata of the line at `offset`.
    pub fn line_info(&self, offset: u32) -> Result<LineInfo> {
        if offset >= self.num_lines() {
            return Err(Error::NotFound(format!(
                "line offset {offset} out of range on chip {} ({} lines)",
                self.name(),
                self.num_lines()
            )));
        }

        let mut raw = v2::gpio_line_info::zeroed();
        raw.offset = offset;
        unsafe { v2::gpio_get_lineinfo(self.fd.as_raw_fd(), &mut raw) }
            .map_err(Error::from_request_errno)?;

        LineInfo::from_raw(raw)
    }

    /// Requests control of the given lines, each with its own config, in
    /// one atomic kernel call: either every line is granted or none is.
    ///
    /// The order of `lines` defines the positional mapping used by
    /// [`LineHandle::get_values`] and [`LineHandle::set_values`]. The
    /// returned handle covers all requested offsets and holds the request's
    /// first shared reference; the request stays alive until the last
    /// handle derived or cloned from it is released.
    ///
    /// Whether any line asks for edge detection is handled internally; a
    /// request mixing plain value access and edge delivery is one request.
    pub fn request_lines(
        &self,
        consumer: &str,
        lines: &[(u32, LineConfig)],
    ) -> Result<LineHandle> {
        request::request(self, consumer, lines)
    }
}

impl AsRawFd for Chip {
    #[inline]
    fn as_raw_fd(&self) -> std::os::fd::RawFd {
        self.fd.as_raw_fd()
    }
}

impl AsFd for Chip {
    #[inline]
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

/// Identity and shape of one chip.
#[derive(Debug, Clone)]
pub struct ChipInfo {
    name: FixedStr<{ v2::GPIO_MAX_NAME_SIZE }>,
    label: FixedStr<{ v2::GPIO_MAX_NAME_SIZE }>,
    lines: u32,
}

impl ChipInfo {
    /// The name of the device driving this chip in the kernel.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// A functional name for this chip, such as a product number. Might be
    /// an empty string. As an example, the SoC GPIO chip on a Raspberry Pi
    /// is "pinctrl-bcm2835".
    pub fn label(&self) -> &str {
        self.label.as_str()
    }

    /// The number of lines addressable through this chip. Not all of them
    /// may be usable depending on how the hardware is configured/muxed.
    pub const fn num_lines(&self) -> u32 {
        self.lines
    }
}

/// Iterate over all GPIO chips currently present on this system.
///
/// The sequence is lazy and restartable: call again after device changes
/// for a fresh view. A chip that is unplugged between directory scan and
/// open is skipped, never reported as a stale entry.
pub fn chips() -> Result<ChipIterator> {
    Ok(ChipIterator {
        readdir: fs::read_dir("/dev").map_err(Error::Io)?,
    })
}

/// Iterator over chips
#[derive(Debug)]
pub struct ChipIterator {
    readdir: fs::ReadDir,
}

impl Iterator for ChipIterator {
    type Item = Result<Chip>;

    fn next(&mut self) -> Option<Result<Chip>> {
        for entry in &mut self.readdir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => return Some(Err(e.into())),
            };
            let path = entry.path();
            let Some(name) = path.file_name() else {
                continue;
            };
            if !is_chip_node(name.as_bytes()) {
                continue;
            }
            match Chip::open(&path) {
                // Vanished between readdir and open.
                Err(Error::NotFound(_)) => continue,
                other => return Some(other),
            }
        }

        None
    }
}

fn is_chip_node(name: &[u8]) -> bool {
    name.contains_str("gpiochip")
}
