// Copyright (c) 2026 The gpio-lines Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Edge-event monitoring across one or more line requests.
//!
//! A [`MonitorSet`] polls the descriptors of edge-configured requests and
//! decodes their queued event records. The poll loop distinguishes three
//! things a plain wait conflates: nothing arrived before the timeout (empty
//! result), a signal interrupted the wait (either surfaced as
//! [`PollOutcome::Interrupted`] or transparently restarted, depending on the
//! caller's [`CancelToken`]), and a descriptor that stopped being valid
//! because its chip was removed ([`MonitorEntry::Invalidated`], reported
//! once, after which the owning request is closed).

use std::os::fd::{BorrowedFd, RawFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{self, PollFd, PollFlags, PollTimeout};

use crate::errors::{Error, Result};
use crate::line::event::Event;
use crate::line::request::{LineHandle, RequestId, RequestInner};
use crate::uapi::v2::{self, LINE_EVENT_SIZE};

/// How long one poll cycle may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Check for pending events and return at once.
    Immediate,
    /// Block until something happens.
    Never,
    /// Block for at most this long.
    After(Duration),
}

impl Timeout {
    fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::Immediate => Some(Instant::now()),
            Timeout::Never => None,
            Timeout::After(duration) => Some(Instant::now() + *duration),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(duration: Duration) -> Self {
        Timeout::After(duration)
    }
}

/// Caller-supplied cancellation policy for signal-interrupted polls.
///
/// Cancelling does not wake a poll by itself; it decides what happens when
/// a signal does. Arrange for the signal handler (or another thread) to
/// call [`cancel`](CancelToken::cancel): an interrupted poll then returns
/// [`PollOutcome::Interrupted`] instead of transparently restarting.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One result from a poll cycle, tagged with the request it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEntry {
    /// A decoded edge event.
    Edge { request: RequestId, event: Event },
    /// The request's descriptor lost validity (device removed). Reported
    /// once; the request is closed and evicted from the set.
    Invalidated { request: RequestId },
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Everything that became available this cycle; empty when the timeout
    /// elapsed with nothing to report.
    Events(Vec<MonitorEntry>),
    /// A signal arrived and the cancel token was set. Nothing was consumed;
    /// the caller decides whether to poll again.
    Interrupted,
}

struct Member {
    inner: Arc<RequestInner>,
}

enum DrainEnd {
    Empty,
    Invalidated,
}

/// The set of request descriptors watched by one monitor.
///
/// Membership changes only through [`add`](MonitorSet::add) and
/// [`remove`](MonitorSet::remove) between poll cycles, never concurrently
/// with an in-flight [`poll`](MonitorSet::poll).
#[derive(Default)]
pub struct MonitorSet {
    members: Vec<Member>,
}

impl MonitorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a request to the set. Only requests created with edge detection
    /// on at least one line can deliver events.
    pub fn add(&mut self, handle: &LineHandle) -> Result<()> {
        let inner = handle.shared();
        if handle.is_closed() {
            return Err(Error::Closed);
        }
        if !inner.watches_edges() {
            return Err(Error::InvalidConfig(
                "request has no edge-detecting lines".into(),
            ));
        }
        if self.members.iter().any(|m| m.inner.id() == inner.id()) {
            return Err(Error::InvalidConfig(
                "request is already part of this monitor set".into(),
            ));
        }
        self.members.push(Member {
            inner: Arc::clone(inner),
        });
        Ok(())
    }

    /// Removes a request from the set. Safe to call after the request was
    /// already evicted by invalidation.
    pub fn remove(&mut self, handle: &LineHandle) {
        self.remove_request(handle.request_id());
    }

    pub fn remove_request(&mut self, id: RequestId) {
        self.members.retain(|m| m.inner.id() != id);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Requests currently in the set.
    pub fn requests(&self) -> impl Iterator<Item = RequestId> + '_ {
        self.members.iter().map(|m| m.inner.id())
    }

    /// Waits for edge events on any member descriptor.
    ///
    /// Readable descriptors are fully drained before returning, each record
    /// decoded in kernel delivery order and tagged with its request. Order
    /// is only meaningful per request; use event timestamps to compare
    /// across requests. Timeout expiry with nothing pending yields
    /// `Events(vec![])`. A set with no members still honors the timeout.
    ///
    /// Signals: with a cancelled `cancel` token the call returns
    /// [`PollOutcome::Interrupted`]; otherwise the wait restarts with the
    /// remaining budget, so total blocking never exceeds `timeout`.
    pub fn poll(
        &mut self,
        timeout: Timeout,
        cancel: Option<&CancelToken>,
    ) -> Result<PollOutcome> {
        let deadline = timeout.deadline();
        let mut entries = Vec::new();

        // Members whose request already lost its descriptor never reach the
        // kernel poll: deliberately released ones leave silently, ones the
        // device dropped out from under get their one Invalidated entry.
        self.sweep_closed(&mut entries);

        loop {
            let polled: Vec<(RequestId, RawFd)> = self
                .members
                .iter()
                .filter_map(|m| {
                    let state = m.inner.lock_state();
                    let fd = state.fd.as_ref()?;
                    Some((m.inner.id(), std::os::fd::AsRawFd::as_raw_fd(fd)))
                })
                .collect();

            // The set is not mutated during the poll (see type docs), so
            // these raw descriptors stay pinned by their OwnedFds; a racing
            // release at worst turns into POLLNVAL, handled below.
            let mut pollfds: Vec<PollFd> = polled
                .iter()
                .map(|(_, fd)| {
                    PollFd::new(unsafe { BorrowedFd::borrow_raw(*fd) }, PollFlags::POLLIN)
                })
                .collect();

            match poll::poll(&mut pollfds, remaining(deadline)) {
                Err(Errno::EINTR) => {
                    if cancel.is_some_and(CancelToken::is_cancelled) {
                        return Ok(PollOutcome::Interrupted);
                    }
                    if expired(deadline) {
                        return Ok(PollOutcome::Events(entries));
                    }
                    // Incidental signal: restart with the remaining budget.
                    continue;
                }
                Err(errno) => return Err(errno.into()),
                Ok(0) => return Ok(PollOutcome::Events(entries)),
                Ok(_) => {
                    let ready: Vec<(RequestId, RawFd, PollFlags)> = pollfds
                        .iter()
                        .zip(polled.iter())
                        .filter_map(|(pollfd, (id, fd))| {
                            let revents = pollfd.revents().unwrap_or(PollFlags::empty());
                            (!revents.is_empty()).then_some((*id, *fd, revents))
                        })
                        .collect();
                    drop(pollfds);

                    let gone =
                        PollFlags::POLLERR | PollFlags::POLLHUP | PollFlags::POLLNVAL;
                    for (id, fd, revents) in ready {
                        if revents.contains(PollFlags::POLLIN) {
                            match drain(fd, id, &mut entries)? {
                                DrainEnd::Empty => {}
                                DrainEnd::Invalidated => self.invalidate(id, &mut entries),
                            }
                        } else if revents.intersects(gone) {
                            self.invalidate(id, &mut entries);
                        }
                    }

                    return Ok(PollOutcome::Events(entries));
                }
            }
        }
    }

    fn sweep_closed(&mut self, entries: &mut Vec<MonitorEntry>) {
        self.members.retain(|m| {
            let mut state = m.inner.lock_state();
            if state.fd.is_some() {
                return true;
            }
            if state.invalidated && !state.invalidation_reported {
                state.invalidation_reported = true;
                entries.push(MonitorEntry::Invalidated {
                    request: m.inner.id(),
                });
            }
            false
        });
    }

    fn invalidate(&mut self, id: RequestId, entries: &mut Vec<MonitorEntry>) {
        let Some(pos) = self.members.iter().position(|m| m.inner.id() == id) else {
            return;
        };
        let member = self.members.remove(pos);
        if member.inner.invalidate() {
            entries.push(MonitorEntry::Invalidated { request: id });
        }
    }
}

fn remaining(deadline: Option<Instant>) -> PollTimeout {
    match deadline {
        None => PollTimeout::NONE,
        Some(deadline) => {
            let left = deadline.saturating_duration_since(Instant::now());
            left.as_millis().try_into().unwrap_or(PollTimeout::MAX)
        }
    }
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// Reads every queued record off a readable descriptor. The descriptor may
/// be in blocking mode, so readability is re-checked with a zero-timeout
/// poll before each record rather than relying on a short read.
fn drain(fd: RawFd, id: RequestId, entries: &mut Vec<MonitorEntry>) -> Result<DrainEnd> {
    loop {
        let mut pollfds = [PollFd::new(
            unsafe { BorrowedFd::borrow_raw(fd) },
            PollFlags::POLLIN,
        )];
        match poll::poll(&mut pollfds, PollTimeout::ZERO) {
            Err(Errno::EINTR) => continue,
            Err(errno) => return Err(errno.into()),
            Ok(0) => return Ok(DrainEnd::Empty),
            Ok(_) => {}
        }
        let revents = pollfds[0].revents().unwrap_or(PollFlags::empty());
        if !revents.contains(PollFlags::POLLIN) {
            // ERR/HUP/NVAL with nothing left to read: the device is gone.
            return Ok(DrainEnd::Invalidated);
        }

        let mut buf = [0u8; LINE_EVENT_SIZE];
        let mut filled = 0;
        while filled < buf.len() {
            match nix::unistd::read(fd, &mut buf[filled..]) {
                // EOF mid-stream also means the descriptor is dead.
                Ok(0) => return Ok(DrainEnd::Invalidated),
                Ok(n) => filled += n,
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) if filled == 0 => return Ok(DrainEnd::Empty),
                Err(Errno::EAGAIN) => continue,
                Err(Errno::ENODEV) | Err(Errno::EBADF) => return Ok(DrainEnd::Invalidated),
                Err(errno) => return Err(errno.into()),
            }
        }

        let event = Event::from_raw(v2::gpio_line_event::from_bytes(buf))?;
        entries.push(MonitorEntry::Edge { request: id, event });
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::line::config::{EdgeDetect, LineConfig};
    use crate::line::request::{request_for_tests, LineHandle};
    use libc::c_int;
    use nix::sys::pthread::{pthread_kill, pthread_self};
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use std::os::fd::OwnedFd;
    use std::sync::OnceLock;

    fn edge_request(offset: u32) -> (LineHandle, OwnedFd) {
        let (read_end, write_end) = nix::unistd::pipe().unwrap();
        let handle = request_for_tests(
            read_end,
            &[(offset, LineConfig::input().with_edge(EdgeDetect::Both))],
        );
        (handle, write_end)
    }

    fn raw_event(id: u32, offset: u32, seqno: u32) -> [u8; LINE_EVENT_SIZE] {
        let mut raw = v2::gpio_line_event::zeroed();
        raw.timestamp_ns = 1_000_000 * seqno as u64;
        raw.id = id;
        raw.offset = offset;
        raw.seqno = seqno;
        raw.line_seqno = seqno;
        raw.to_bytes()
    }

    fn events(outcome: PollOutcome) -> Vec<MonitorEntry> {
        match outcome {
            PollOutcome::Events(entries) => entries,
            PollOutcome::Interrupted => panic!("unexpected interruption"),
        }
    }

    #[test]
    fn add_requires_edge_detection() {
        let (read_end, _write_end) = nix::unistd::pipe().unwrap();
        let handle = request_for_tests(read_end, &[(0, LineConfig::input())]);
        let mut set = MonitorSet::new();
        assert!(matches!(set.add(&handle), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn add_rejects_duplicates_and_remove_is_idempotent() {
        let (handle, _write_end) = edge_request(2);
        let mut set = MonitorSet::new();
        set.add(&handle).unwrap();
        assert!(matches!(set.add(&handle), Err(Error::InvalidConfig(_))));
        assert_eq!(set.len(), 1);

        set.remove(&handle);
        set.remove(&handle);
        assert!(set.is_empty());
    }

    #[test]
    fn timeout_with_nothing_pending_returns_empty() {
        let (handle, _write_end) = edge_request(2);
        let mut set = MonitorSet::new();
        set.add(&handle).unwrap();

        let start = Instant::now();
        let entries = events(
            set.poll(Timeout::After(Duration::from_millis(100)), None)
                .unwrap(),
        );
        let elapsed = start.elapsed();

        assert!(entries.is_empty());
        assert!(elapsed >= Duration::from_millis(90), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    }

    #[test]
    fn empty_set_still_honors_the_timeout() {
        let mut set = MonitorSet::new();
        let start = Instant::now();
        let entries = events(
            set.poll(Timeout::After(Duration::from_millis(60)), None)
                .unwrap(),
        );
        assert!(entries.is_empty());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn decodes_queued_events_in_delivery_order() {
        let (handle, write_end) = edge_request(4);
        let mut set = MonitorSet::new();
        set.add(&handle).unwrap();

        nix::unistd::write(&write_end, &raw_event(v2::LINE_EVENT_RISING_EDGE, 4, 1)).unwrap();
        nix::unistd::write(&write_end, &raw_event(v2::LINE_EVENT_FALLING_EDGE, 4, 2)).unwrap();

        let entries = events(set.poll(Timeout::Immediate, None).unwrap());
        assert_eq!(entries.len(), 2);

        match &entries[0] {
            MonitorEntry::Edge { request, event } => {
                assert_eq!(*request, handle.request_id());
                assert_eq!(event.edge(), crate::line::event::Edge::Rising);
                assert_eq!(event.offset(), 4);
                assert_eq!(event.seqno(), 1);
            }
            other => panic!("unexpected entry: {other:?}"),
        }
        match &entries[1] {
            MonitorEntry::Edge { event, .. } => {
                assert_eq!(event.edge(), crate::line::event::Edge::Falling);
                assert_eq!(event.seqno(), 2);
            }
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[test]
    fn device_loss_reports_invalidated_exactly_once() {
        let (handle, write_end) = edge_request(7);
        let mut set = MonitorSet::new();
        set.add(&handle).unwrap();

        nix::unistd::write(&write_end, &raw_event(v2::LINE_EVENT_RISING_EDGE, 7, 1)).unwrap();
        drop(write_end);

        let entries = events(
            set.poll(Timeout::After(Duration::from_secs(1)), None)
                .unwrap(),
        );
        // Queued events are delivered before the loss is reported.
        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0], MonitorEntry::Edge { .. }));
        assert_eq!(
            entries[1],
            MonitorEntry::Invalidated {
                request: handle.request_id()
            }
        );
        assert!(set.is_empty());

        // The owning request is now closed for every handle.
        assert!(matches!(handle.get_values(), Err(Error::Closed)));

        // And the loss is never reported again.
        set.add(&handle).unwrap_err();
        let entries = events(
            set.poll(Timeout::After(Duration::from_millis(10)), None)
                .unwrap(),
        );
        assert!(entries.is_empty());
    }

    #[test]
    fn released_requests_are_swept_silently() {
        let (mut handle, _write_end) = edge_request(3);
        let mut set = MonitorSet::new();
        set.add(&handle).unwrap();

        handle.release().unwrap();
        let entries = events(set.poll(Timeout::Immediate, None).unwrap());
        assert!(entries.is_empty());
        assert!(set.is_empty());
    }

    static CANCEL: OnceLock<CancelToken> = OnceLock::new();

    extern "C" fn cancelling_handler(_: c_int) {
        if let Some(token) = CANCEL.get() {
            token.cancel();
        }
    }

    extern "C" fn incidental_handler(_: c_int) {}

    fn install(signal: Signal, handler: extern "C" fn(c_int)) {
        // No SA_RESTART: the poll must observe EINTR.
        let action = SigAction::new(
            SigHandler::Handler(handler),
            SaFlags::empty(),
            SigSet::empty(),
        );
        unsafe { sigaction(signal, &action) }.unwrap();
    }

    #[test]
    fn cancelling_signal_interrupts_the_poll() {
        let token = CANCEL.get_or_init(CancelToken::new).clone();
        install(Signal::SIGUSR1, cancelling_handler);

        let (handle, _write_end) = edge_request(1);
        let mut set = MonitorSet::new();
        set.add(&handle).unwrap();

        let target = pthread_self();
        let killer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            pthread_kill(target, Signal::SIGUSR1).unwrap();
        });

        let start = Instant::now();
        let outcome = set
            .poll(Timeout::After(Duration::from_secs(5)), Some(&token))
            .unwrap();
        killer.join().unwrap();

        assert_eq!(outcome, PollOutcome::Interrupted);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn incidental_signal_restarts_with_remaining_budget() {
        install(Signal::SIGUSR2, incidental_handler);

        let (handle, _write_end) = edge_request(1);
        let mut set = MonitorSet::new();
        set.add(&handle).unwrap();

        let target = pthread_self();
        let killer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            pthread_kill(target, Signal::SIGUSR2).unwrap();
        });

        let start = Instant::now();
        let entries = events(
            set.poll(Timeout::After(Duration::from_millis(300)), None)
                .unwrap(),
        );
        killer.join().unwrap();
        let elapsed = start.elapsed();

        assert!(entries.is_empty());
        // The wait resumed after the signal and ran out the full budget.
        assert!(elapsed >= Duration::from_millis(280), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    }
}
