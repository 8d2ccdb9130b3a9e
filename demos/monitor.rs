// Copyright (c) 2026 The gpio-lines Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use gpio_lines::{
    CancelToken, Chip, EdgeDetect, LineConfig, MonitorEntry, MonitorSet, PollOutcome, Timeout,
};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use quicli::prelude::*;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// The gpiochip device (e.g. /dev/gpiochip0)
    chip: PathBuf,
    /// The offsets of the GPIO lines to watch for edges
    lines: Vec<u32>,
}

static CANCEL: OnceLock<CancelToken> = OnceLock::new();

extern "C" fn on_sigint(_: libc::c_int) {
    if let Some(token) = CANCEL.get() {
        token.cancel();
    }
}

fn do_main(args: Cli) -> gpio_lines::Result<()> {
    let token = CANCEL.get_or_init(CancelToken::new).clone();

    // Without SA_RESTART the poll observes the interruption and can consult
    // the token instead of resuming behind our back.
    let action = SigAction::new(
        SigHandler::Handler(on_sigint),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGINT, &action) }?;

    let chip = Chip::open(&args.chip)?;
    let requested: Vec<(u32, LineConfig)> = args
        .lines
        .iter()
        .map(|offset| {
            (
                *offset,
                LineConfig::input().with_edge(EdgeDetect::Both),
            )
        })
        .collect();
    let handle = chip.request_lines("monitor", &requested)?;

    let mut monitor = MonitorSet::new();
    monitor.add(&handle)?;

    loop {
        match monitor.poll(Timeout::After(Duration::from_secs(10)), Some(&token))? {
            PollOutcome::Interrupted => {
                info!("interrupted, exiting");
                return Ok(());
            }
            PollOutcome::Events(entries) => {
                for entry in entries {
                    match entry {
                        MonitorEntry::Edge { event, .. } => {
                            println!(
                                "line {}: {:?} edge at {}ns (seq {})",
                                event.offset(),
                                event.edge(),
                                event.timestamp().as_nanos(),
                                event.seqno(),
                            );
                        }
                        MonitorEntry::Invalidated { request } => {
                            error!("{request} lost its device, exiting");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn main() -> CliResult {
    let args = Cli::from_args();
    do_main(args).or_else(|e| {
        error!("{:?}", e);
        Ok(())
    })
}
