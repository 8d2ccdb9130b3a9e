// Copyright (c) 2026 The gpio-lines Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Wrapper for asynchronous programming using Tokio.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::pin::Pin;

use futures::ready;
use futures::stream::Stream;
use futures::task::{Context, Poll};
use tokio::io::unix::AsyncFd;

use crate::errors::{Error, Result};
use crate::line::event::Event;
use crate::line::request::LineHandle;
use crate::uapi::v2::{self, LINE_EVENT_SIZE};

struct EventSource {
    // Holds a shared reference on the request so the descriptor stays open
    // for as long as the stream lives.
    handle: LineHandle,
    fd: RawFd,
}

impl AsRawFd for EventSource {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

/// An edge-event stream over one line request, driven by the Tokio reactor.
///
/// # Example
///
/// The following example waits for state changes on an input line.
///
/// ```no_run
/// use futures::stream::StreamExt;
/// use gpio_lines::{AsyncLineEvents, Chip, EdgeDetect, LineConfig};
///
/// async fn print_events(line: u32) -> gpio_lines::Result<()> {
///     let chip = Chip::open("/dev/gpiochip0")?;
///     let handle = chip.request_lines(
///         "gpioevents",
///         &[(line, LineConfig::input().with_edge(EdgeDetect::Both))],
///     )?;
///     let mut events = AsyncLineEvents::new(&handle)?;
///
///     while let Some(event) = events.next().await {
///         println!("{:?}", event?);
///     }
///
///     Ok(())
/// }
/// ```
pub struct AsyncLineEvents {
    afd: AsyncFd<EventSource>,
}

impl AsyncLineEvents {
    /// Wraps a clone of `handle` (the stream counts as one more shared
    /// reference to the request). The request must watch at least one edge.
    pub fn new(handle: &LineHandle) -> Result<Self> {
        if !handle.shared().watches_edges() {
            return Err(Error::InvalidConfig(
                "request has no edge-detecting lines".into(),
            ));
        }
        let handle = handle.try_clone()?;
        let fd = {
            let state = handle.shared().lock_state();
            state.fd.as_ref().ok_or(Error::Closed)?.as_raw_fd()
        };

        // The reactor needs a nonblocking descriptor.
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFL, 0);
            if flags == -1 || libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) == -1 {
                return Err(Error::Io(io::Error::last_os_error()));
            }
        }

        let afd = AsyncFd::new(EventSource { handle, fd }).map_err(Error::Io)?;
        Ok(Self { afd })
    }

    /// The handle held by this stream.
    pub fn handle(&self) -> &LineHandle {
        &self.afd.get_ref().handle
    }
}

fn read_one(fd: RawFd) -> io::Result<Option<Event>> {
    let mut buf = [0u8; LINE_EVENT_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        match nix::unistd::read(fd, &mut buf[filled..]) {
            // EOF or a dead descriptor ends the stream.
            Ok(0) => return Ok(None),
            Ok(n) => filled += n,
            Err(nix::errno::Errno::EINTR) => continue,
            Err(nix::errno::Errno::EAGAIN) if filled == 0 => {
                return Err(io::Error::from(io::ErrorKind::WouldBlock))
            }
            Err(nix::errno::Errno::EAGAIN) => continue,
            Err(nix::errno::Errno::ENODEV) | Err(nix::errno::Errno::EBADF) => return Ok(None),
            Err(errno) => return Err(io::Error::from_raw_os_error(errno as i32)),
        }
    }

    match Event::from_raw(v2::gpio_line_event::from_bytes(buf)) {
        Ok(event) => Ok(Some(event)),
        Err(e) => Err(io::Error::new(io::ErrorKind::InvalidData, e.to_string())),
    }
}

impl Stream for AsyncLineEvents {
    type Item = Result<Event>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            let mut guard = match ready!(this.afd.poll_read_ready(cx)) {
                Ok(guard) => guard,
                Err(e) => return Poll::Ready(Some(Err(Error::Io(e)))),
            };
            match guard.try_io(|inner| read_one(inner.get_ref().as_raw_fd())) {
                Ok(Ok(Some(event))) => return Poll::Ready(Some(Ok(event))),
                Ok(Ok(None)) => return Poll::Ready(None),
                Ok(Err(e)) => return Poll::Ready(Some(Err(Error::Io(e)))),
                // Raced with another reader; wait for readiness again.
                Err(_would_block) => continue,
            }
        }
    }
}
