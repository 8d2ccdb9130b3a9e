// Copyright (c) 2026 The gpio-lines Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::chip::Chip;
use crate::errors::{Error, Result};
use crate::fixed_str::FixedStr;
use crate::line::config::{self, Direction, LineConfig};
use crate::line::offsets::Offsets;
use crate::line::values::ValueMask;
use crate::uapi::v2::{self, GPIO_LINES_MAX, GPIO_MAX_NAME_SIZE};

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of one kernel-side line request, used to attribute
/// monitor results to the request they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(u64);

impl RequestId {
    fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "request-{}", self.0)
    }
}

/// Mutable half of a request, behind the single mutation point.
///
/// `refs` is only ever touched from this module; it counts live
/// [`LineHandle`]s, and the descriptor is dropped exactly when it reaches
/// zero. `invalidation_reported` keeps device-removal reports to one per
/// request no matter how many monitors watch it.
pub(crate) struct RequestState {
    pub(crate) fd: Option<OwnedFd>,
    refs: usize,
    pub(crate) configs: heapless::Vec<LineConfig, GPIO_LINES_MAX>,
    pub(crate) invalidated: bool,
    pub(crate) invalidation_reported: bool,
}

pub(crate) struct RequestInner {
    id: RequestId,
    consumer: FixedStr<GPIO_MAX_NAME_SIZE>,
    offsets: Offsets,
    // Edge modes cannot change after creation, so this is immutable.
    has_edges: bool,
    state: Mutex<RequestState>,
}

impl RequestInner {
    fn new(
        fd: OwnedFd,
        consumer: FixedStr<GPIO_MAX_NAME_SIZE>,
        offsets: Offsets,
        configs: heapless::Vec<LineConfig, GPIO_LINES_MAX>,
    ) -> Self {
        let has_edges = configs.iter().any(|c| c.edge().is_some());
        Self {
            id: RequestId::next(),
            consumer,
            offsets,
            has_edges,
            state: Mutex::new(RequestState {
                fd: Some(fd),
                refs: 1,
                configs,
                invalidated: false,
                invalidation_reported: false,
            }),
        }
    }

    pub(crate) fn id(&self) -> RequestId {
        self.id
    }

    pub(crate) fn watches_edges(&self) -> bool {
        self.has_edges
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, RequestState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Drops the descriptor after external removal of the device. Returns
    /// true exactly once per request so the loss is reported once.
    pub(crate) fn invalidate(&self) -> bool {
        let mut state = self.lock_state();
        state.fd = None;
        state.invalidated = true;
        if state.invalidation_reported {
            false
        } else {
            state.invalidation_reported = true;
            true
        }
    }

    fn increment(&self) -> Result<()> {
        let mut state = self.lock_state();
        if state.fd.is_none() {
            return Err(Error::Closed);
        }
        state.refs += 1;
        Ok(())
    }

    fn decrement(&self) {
        let mut state = self.lock_state();
        state.refs = state.refs.saturating_sub(1);
        if state.refs == 0 {
            // Last handle gone: closing the descriptor releases the lines.
            state.fd = None;
        }
    }
}

/// Issues the kernel request and returns the first handle, covering all
/// requested offsets, with the shared count at one.
pub(crate) fn request(
    chip: &Chip,
    consumer: &str,
    lines: &[(u32, LineConfig)],
) -> Result<LineHandle> {
    if lines.len() > GPIO_LINES_MAX {
        return Err(Error::InvalidConfig(format!(
            "a request covers at most {GPIO_LINES_MAX} lines, got {}",
            lines.len()
        )));
    }

    let raw_offsets: Vec<u32> = lines.iter().map(|(offset, _)| *offset).collect();
    let offsets = Offsets::from_slice(&raw_offsets)?;

    for (offset, _) in lines {
        if *offset >= chip.num_lines() {
            return Err(Error::NotFound(format!(
                "line offset {offset} out of range on chip {} ({} lines)",
                chip.name(),
                chip.num_lines()
            )));
        }
    }

    for (_, config) in lines {
        config.validate()?;
    }

    let consumer =
        FixedStr::new(consumer).map_err(|e| Error::InvalidConfig(format!("consumer label: {e}")))?;

    let configs: heapless::Vec<LineConfig, GPIO_LINES_MAX> =
        lines.iter().map(|(_, config)| *config).collect();

    let mut req = v2::gpio_line_request::zeroed();
    let (num_lines, raw) = offsets.to_raw();
    req.num_lines = num_lines;
    req.offsets = raw;
    req.consumer = consumer.into_byte_array();
    req.config = config::encode(&configs)?;

    // All-or-nothing: the kernel grants every line or fails the ioctl.
    unsafe { v2::gpio_get_line(chip.as_raw_fd(), &mut req) }
        .map_err(Error::from_request_errno)?;

    let fd = unsafe { OwnedFd::from_raw_fd(req.fd) };
    let inner = Arc::new(RequestInner::new(fd, consumer, offsets, configs));
    Ok(LineHandle::first(inner))
}

#[cfg(test)]
pub(crate) fn request_for_tests(fd: OwnedFd, lines: &[(u32, LineConfig)]) -> LineHandle {
    let raw_offsets: Vec<u32> = lines.iter().map(|(offset, _)| *offset).collect();
    let offsets = Offsets::from_slice(&raw_offsets).unwrap();
    let configs: heapless::Vec<LineConfig, GPIO_LINES_MAX> =
        lines.iter().map(|(_, config)| *config).collect();
    let consumer = FixedStr::new("test").unwrap();
    LineHandle::first(Arc::new(RequestInner::new(fd, consumer, offsets, configs)))
}

/// A counted reference to one kernel-side line request, scoped to a subset
/// of its offsets.
///
/// Handles are the only way the shared count moves: [`derive`] and
/// [`try_clone`] increment it, [`release`] (or drop) decrements it, and the
/// request descriptor is closed exactly when the last handle goes away.
/// After that, or after the underlying device disappears, every operation
/// on any remaining path to the request fails with [`Error::Closed`].
///
/// [`derive`]: LineHandle::derive
/// [`try_clone`]: LineHandle::try_clone
/// [`release`]: LineHandle::release
pub struct LineHandle {
    inner: Arc<RequestInner>,
    /// Offsets this handle may address, in the caller's order.
    offsets: heapless::Vec<u32, GPIO_LINES_MAX>,
    /// positions[i] = index of offsets[i] in the request's offset list.
    positions: heapless::Vec<usize, GPIO_LINES_MAX>,
    released: bool,
}

impl LineHandle {
    fn first(inner: Arc<RequestInner>) -> Self {
        let offsets: heapless::Vec<u32, GPIO_LINES_MAX> =
            inner.offsets.iter().copied().collect();
        let positions: heapless::Vec<usize, GPIO_LINES_MAX> = (0..offsets.len()).collect();
        Self {
            inner,
            offsets,
            positions,
            released: false,
        }
    }

    pub fn request_id(&self) -> RequestId {
        self.inner.id()
    }

    /// The consumer label recorded with the kernel for this request.
    pub fn consumer(&self) -> &str {
        self.inner.consumer.as_str()
    }

    /// The offsets this handle addresses, in the order value sequences map
    /// to.
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// True once the request descriptor is gone, whether through the last
    /// release, this handle's own release, or device removal.
    pub fn is_closed(&self) -> bool {
        self.released || self.inner.lock_state().fd.is_none()
    }

    pub(crate) fn shared(&self) -> &Arc<RequestInner> {
        &self.inner
    }

    /// A new handle for a subset of the request's offsets. Increments the
    /// shared count.
    pub fn derive(&self, offsets: &[u32]) -> Result<LineHandle> {
        if self.released {
            return Err(Error::Closed);
        }

        let subset = Offsets::from_slice(offsets)?;
        let mut positions: heapless::Vec<usize, GPIO_LINES_MAX> = heapless::Vec::new();
        for offset in subset.as_slice() {
            let pos = self.inner.offsets.position(*offset).ok_or_else(|| {
                Error::InvalidConfig(format!("offset {offset} is not part of this request"))
            })?;
            let _ = positions.push(pos);
        }

        self.inner.increment()?;
        Ok(LineHandle {
            inner: Arc::clone(&self.inner),
            offsets: subset.iter().copied().collect(),
            positions,
            released: false,
        })
    }

    /// An independent handle over the same offsets. Increments the shared
    /// count; the clone is released separately.
    pub fn try_clone(&self) -> Result<LineHandle> {
        if self.released {
            return Err(Error::Closed);
        }
        self.inner.increment()?;
        Ok(LineHandle {
            inner: Arc::clone(&self.inner),
            offsets: self.offsets.clone(),
            positions: self.positions.clone(),
            released: false,
        })
    }

    /// Gives this handle's reference back. The request descriptor is closed
    /// when the count reaches zero. A second release of the same handle is
    /// reported as [`Error::DoubleRelease`] and does not touch the count.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Err(Error::DoubleRelease);
        }
        self.released = true;
        self.inner.decrement();
        Ok(())
    }

    /// Current logical values of this handle's lines, in offset order.
    pub fn get_values(&self) -> Result<Vec<bool>> {
        if self.released {
            return Err(Error::Closed);
        }
        let mut state = self.inner.lock_state();
        let fd = state.fd.as_ref().ok_or(Error::Closed)?.as_raw_fd();

        let mut mask = ValueMask::empty();
        for pos in &self.positions {
            mask.select(*pos);
        }
        let mut data = v2::gpio_line_values {
            bits: 0,
            mask: mask.mask(),
        };
        if let Err(errno) = unsafe { v2::gpio_line_get_values(fd, &mut data) } {
            return Err(fail(&mut state, errno));
        }

        let values = ValueMask::from_raw(data.bits, data.mask);
        Ok(self
            .positions
            .iter()
            .map(|pos| values.get(*pos).unwrap_or(false))
            .collect())
    }

    /// Drives this handle's output lines, atomically across the set. The
    /// sequence must match [`offsets`](LineHandle::offsets) in length and
    /// order; addressing a non-output line is rejected before the kernel
    /// call, so no partial write happens.
    pub fn set_values(&mut self, values: &[bool]) -> Result<()> {
        if self.released {
            return Err(Error::Closed);
        }
        if values.len() != self.offsets.len() {
            return Err(Error::InvalidConfig(format!(
                "{} values supplied for {} lines",
                values.len(),
                self.offsets.len()
            )));
        }

        let mut state = self.inner.lock_state();
        if state.fd.is_none() {
            return Err(Error::Closed);
        }
        for (idx, pos) in self.positions.iter().enumerate() {
            if state.configs[*pos].direction() != Direction::Output {
                return Err(Error::InvalidConfig(format!(
                    "line {} is not configured for output",
                    self.offsets[idx]
                )));
            }
        }

        let mut mask = ValueMask::empty();
        for (idx, pos) in self.positions.iter().enumerate() {
            mask.set(*pos, values[idx]);
        }
        let mut data = v2::gpio_line_values {
            bits: mask.bits(),
            mask: mask.mask(),
        };
        let fd = state.fd.as_ref().ok_or(Error::Closed)?.as_raw_fd();
        if let Err(errno) = unsafe { v2::gpio_line_set_values(fd, &mut data) } {
            return Err(fail(&mut state, errno));
        }
        Ok(())
    }

    /// Applies new configs to this handle's lines, one per offset in handle
    /// order; lines outside the handle keep their current config. Direction,
    /// active level, bias, drive, output value and debounce may change; the
    /// kernel interface fixes edge detection at request time, so any edge
    /// mode change is [`Error::Unsupported`].
    pub fn reconfigure(&mut self, configs: &[LineConfig]) -> Result<()> {
        if self.released {
            return Err(Error::Closed);
        }
        if configs.len() != self.offsets.len() {
            return Err(Error::InvalidConfig(format!(
                "{} configs supplied for {} lines",
                configs.len(),
                self.offsets.len()
            )));
        }
        for config in configs {
            config.validate()?;
        }

        let mut state = self.inner.lock_state();
        if state.fd.is_none() {
            return Err(Error::Closed);
        }

        for (idx, pos) in self.positions.iter().enumerate() {
            if configs[idx].edge() != state.configs[*pos].edge() {
                return Err(Error::Unsupported(format!(
                    "edge detection on line {} is fixed at request time",
                    self.offsets[idx]
                )));
            }
        }

        let mut merged = state.configs.clone();
        for (idx, pos) in self.positions.iter().enumerate() {
            merged[*pos] = configs[idx];
        }

        let mut encoded = config::encode(&merged)?;
        let fd = state.fd.as_ref().ok_or(Error::Closed)?.as_raw_fd();
        if let Err(errno) = unsafe { v2::gpio_line_set_config(fd, &mut encoded) } {
            return Err(fail(&mut state, errno));
        }
        state.configs = merged;
        Ok(())
    }

    /// The active config of one of this handle's lines.
    pub fn line_config(&self, offset: u32) -> Result<LineConfig> {
        if self.released {
            return Err(Error::Closed);
        }
        let idx = self
            .offsets
            .iter()
            .position(|o| *o == offset)
            .ok_or_else(|| {
                Error::InvalidConfig(format!("offset {offset} is not covered by this handle"))
            })?;
        let state = self.inner.lock_state();
        Ok(state.configs[self.positions[idx]])
    }
}

impl Drop for LineHandle {
    fn drop(&mut self) {
        if !self.released {
            self.inner.decrement();
        }
    }
}

impl std::fmt::Debug for LineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineHandle")
            .field("request", &self.inner.id())
            .field("consumer", &self.inner.consumer.as_str())
            .field("offsets", &self.offsets)
            .field("released", &self.released)
            .finish()
    }
}

/// Converts a failed descriptor ioctl, marking the request closed when the
/// device itself went away so later operations fail deterministically.
fn fail(state: &mut RequestState, errno: nix::errno::Errno) -> Error {
    let err = Error::from_handle_errno(errno);
    if matches!(err, Error::Closed) {
        state.fd = None;
        state.invalidated = true;
    }
    err
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::line::config::LineConfig;

    fn pipe_handle(lines: &[(u32, LineConfig)]) -> LineHandle {
        let (read_end, _write_end) = nix::unistd::pipe().unwrap();
        request_for_tests(read_end, lines)
    }

    fn io_lines() -> Vec<(u32, LineConfig)> {
        vec![
            (3, LineConfig::input()),
            (5, LineConfig::output(true)),
            (9, LineConfig::output(false)),
        ]
    }

    #[test]
    fn descriptor_survives_until_last_release() {
        let mut first = pipe_handle(&io_lines());
        let mut clones: Vec<LineHandle> = (0..3).map(|_| first.try_clone().unwrap()).collect();
        let mut derived = first.derive(&[5]).unwrap();

        for clone in &mut clones {
            clone.release().unwrap();
            assert!(!first.is_closed());
        }
        derived.release().unwrap();
        assert!(!first.is_closed());

        first.release().unwrap();
        assert!(first.shared().lock_state().fd.is_none());
        assert!(matches!(first.get_values(), Err(Error::Closed)));
    }

    #[test]
    fn double_release_reports_without_double_decrement() {
        let mut first = pipe_handle(&io_lines());
        let mut second = first.try_clone().unwrap();

        first.release().unwrap();
        assert!(matches!(first.release(), Err(Error::DoubleRelease)));
        // The count must still reflect the second handle.
        assert!(!second.is_closed());

        second.release().unwrap();
        assert!(second.shared().lock_state().fd.is_none());
    }

    #[test]
    fn drop_counts_as_release() {
        let mut first = pipe_handle(&io_lines());
        {
            let _second = first.try_clone().unwrap();
        }
        assert!(!first.is_closed());
        first.release().unwrap();
        assert!(first.shared().lock_state().fd.is_none());
    }

    #[test]
    fn derive_checks_membership_and_order() {
        let first = pipe_handle(&io_lines());

        let derived = first.derive(&[9, 3]).unwrap();
        assert_eq!(derived.offsets(), &[9, 3]);

        assert!(matches!(
            first.derive(&[4]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(first.derive(&[]), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn set_values_rejects_wrong_length_before_any_write() {
        let mut handle = pipe_handle(&io_lines());
        assert!(matches!(
            handle.set_values(&[true]),
            Err(Error::InvalidConfig(_))
        ));
        assert!(!handle.is_closed());
    }

    #[test]
    fn set_values_rejects_non_output_lines() {
        let mut handle = pipe_handle(&io_lines());
        let err = handle.set_values(&[true, false, true]).unwrap_err();
        match err {
            Error::InvalidConfig(msg) => assert!(msg.contains('3'), "{msg}"),
            other => panic!("unexpected error: {other:?}"),
        }

        // An output-only subset passes the checks and reaches the
        // descriptor (which is a pipe here, so the ioctl itself fails).
        let mut outputs = handle.derive(&[5, 9]).unwrap();
        assert!(matches!(
            outputs.set_values(&[true, false]),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn reconfigure_rejects_edge_mode_changes() {
        let mut handle = pipe_handle(&[(
            2,
            LineConfig::input().with_edge(crate::line::config::EdgeDetect::Rising),
        )]);

        assert!(matches!(
            handle.reconfigure(&[LineConfig::input()]),
            Err(Error::Unsupported(_))
        ));

        // Same edge mode is allowed through to the descriptor.
        let same_edge =
            LineConfig::input().with_edge(crate::line::config::EdgeDetect::Rising).active_low();
        assert!(matches!(
            handle.reconfigure(&[same_edge]),
            Err(Error::Io(_))
        ));
    }

    #[test]
    fn operations_after_close_fail_closed() {
        let mut first = pipe_handle(&io_lines());
        let probe = first.try_clone().unwrap();
        first.release().unwrap();

        assert!(matches!(first.get_values(), Err(Error::Closed)));
        assert!(matches!(first.set_values(&[true; 3]), Err(Error::Closed)));
        assert!(matches!(first.derive(&[3]), Err(Error::Closed)));
        assert!(matches!(first.try_clone(), Err(Error::Closed)));
        assert!(matches!(first.line_config(3), Err(Error::Closed)));

        // Probe still holds the request open.
        assert!(!probe.is_closed());
        drop(probe);

        // Now the descriptor is gone for everyone.
        let mut late = pipe_handle(&io_lines());
        late.shared().invalidate();
        assert!(matches!(late.get_values(), Err(Error::Closed)));
        assert!(matches!(late.reconfigure(&[
            LineConfig::input(),
            LineConfig::output(true),
            LineConfig::output(false)
        ]), Err(Error::Closed)));
    }

    #[test]
    fn line_config_reflects_request_state() {
        let handle = pipe_handle(&io_lines());
        assert_eq!(handle.line_config(5).unwrap(), LineConfig::output(true));
        assert!(matches!(
            handle.line_config(4),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalidation_is_reported_exactly_once() {
        let handle = pipe_handle(&io_lines());
        assert!(handle.shared().invalidate());
        assert!(!handle.shared().invalidate());
        assert!(handle.is_closed());
    }
}
