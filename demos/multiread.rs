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
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// The gpiochip device (e.g. /dev/gpiochip0)
    chip: PathBuf,
    /// The offsets of the GPIO lines for the provided chip
    lines: Vec<u32>,
}

fn do_main(args: Cli) -> gpio_lines::Result<()> {
    let chip = Chip::open(&args.chip)?;

    let requested: Vec<(u32, LineConfig)> = args
        .lines
        .iter()
        .map(|offset| (*offset, LineConfig::input()))
        .collect();
    let handle = chip.request_lines("multiread", &requested)?;

    // One atomic read across the whole set, in request order.
    let values = handle.get_values()?;
    for (offset, value) in handle.offsets().iter().zip(values) {
        println!("line {offset}: {}", if value { "active" } else { "inactive" });
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
