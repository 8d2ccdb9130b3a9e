// Copyright (c) 2026 The gpio-lines Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use gpio_lines::{Chip, LineConfig};
use quicli::prelude::*;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::{Duration, Instant};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// The gpiochip device (e.g. /dev/gpiochip0)
    chip: PathBuf,
    /// The offset of the GPIO line for the provided chip
    line: u32,
    /// Half-period in milliseconds
    period_ms: u64,
    /// Duration over which to blink in milliseconds
    duration_ms: u64,
}

fn do_main(args: Cli) -> gpio_lines::Result<()> {
    let chip = Chip::open(&args.chip)?;

    // The initial value lights the line as soon as the request is granted.
    let mut handle = chip.request_lines("blinky", &[(args.line, LineConfig::output(true))])?;

    let duration = Duration::from_millis(args.duration_ms);
    let start = Instant::now();
    let mut lit = true;
    while start.elapsed() < duration {
        sleep(Duration::from_millis(args.period_ms));
        lit = !lit;
        handle.set_values(&[lit])?;
    }

    Ok(())
}

fn main() -> CliResult {
    let args = Cli::from_args();
    do_main(args).or_else(|e| {
        error!("{:?}", e);
        Ok(())
    })
}
