// Copyright (c) 2026 The gpio-lines Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The `gpio-lines` crate drives GPIO lines through the [Linux character
//! device ABI](https://www.kernel.org/doc/Documentation/ABI/testing/gpio-cdev)
//! (`/dev/gpiochipN`, uAPI v2), centered on three things the raw interface
//! leaves to the caller:
//!
//! - one request covers many lines and is shared: [`LineHandle`]s are
//!   counted references, and the kernel descriptor is closed exactly when
//!   the last one is released — no manual "who closes the fd" bookkeeping;
//! - a request carries plain value access and edge-event delivery through
//!   the same object, decided by its per-line [`LineConfig`]s rather than by
//!   two parallel request flavors;
//! - [`MonitorSet::poll`] tells apart "nothing yet" (empty result),
//!   "a signal interrupted the wait" (restart or surface, by caller policy)
//!   and "the chip was unplugged" (an [`Invalidated`](MonitorEntry)
//!   entry, once, after which handles fail with [`Error::Closed`]).
//!
//! # Examples
//!
//! Mirror one line's edges onto another:
//!
//! ```no_run
//! use gpio_lines::{
//!     Chip, Edge, EdgeDetect, LineConfig, MonitorEntry, MonitorSet, PollOutcome, Timeout,
//! };
//!
//! fn mirror_gpio(input: u32, output: u32) -> gpio_lines::Result<()> {
//!     let chip = Chip::open("/dev/gpiochip0")?;
//!     let mut out = chip.request_lines("mirror-gpio", &[(output, LineConfig::output(false))])?;
//!     let watch = chip.request_lines(
//!         "mirror-gpio",
//!         &[(input, LineConfig::input().with_edge(EdgeDetect::Both))],
//!     )?;
//!
//!     let mut monitor = MonitorSet::new();
//!     monitor.add(&watch)?;
//!     loop {
//!         match monitor.poll(Timeout::Never, None)? {
//!             PollOutcome::Interrupted => break,
//!             PollOutcome::Events(entries) => {
//!                 for entry in entries {
//!                     match entry {
//!                         MonitorEntry::Edge { event, .. } => {
//!                             out.set_values(&[event.edge() == Edge::Rising])?;
//!                         }
//!                         MonitorEntry::Invalidated { .. } => return Ok(()),
//!                     }
//!                 }
//!             }
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Read a few lines in one atomic call:
//!
//! ```no_run
//! use gpio_lines::{Chip, LineConfig};
//!
//! # fn main() -> gpio_lines::Result<()> {
//! let chip = Chip::open("/dev/gpiochip0")?;
//! let handle = chip.request_lines(
//!     "read-inputs",
//!     &[(4, LineConfig::input()), (7, LineConfig::input())],
//! )?;
//! // Values come back in the order the lines were requested.
//! println!("{:?}", handle.get_values()?);
//! # Ok(()) }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

mod errors;

pub mod fixed_str;

#[allow(non_camel_case_types)]
mod uapi;

pub mod chip;

pub mod line;

pub mod monitor;

#[cfg(feature = "async-tokio")]
#[cfg_attr(docsrs, doc(cfg(feature = "async-tokio")))]
pub mod async_tokio;

pub use chip::{chips, Chip, ChipInfo};
pub use errors::{Error, Result};
pub use line::{
    Active, Bias, Direction, Drive, Edge, EdgeDetect, Event, EventClock, LineConfig, LineHandle,
    LineInfo, RequestId, Timestamp,
};
pub use monitor::{CancelToken, MonitorEntry, MonitorSet, PollOutcome, Timeout};

#[cfg(feature = "async-tokio")]
pub use async_tokio::AsyncLineEvents;
