// Copyright (c) 2026 The gpio-lines Project Developers.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use futures::stream::StreamExt;
use gpio_lines::{AsyncLineEvents, Chip, EdgeDetect, LineConfig};
use quicli::prelude::*;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
struct Cli {
    /// The gpiochip device (e.g. /dev/gpiochip0)
    chip: PathBuf,
    /// The offset of the GPIO line to watch for edges
    line: u32,
}

async fn do_main(args: Cli) -> gpio_lines::Result<()> {
    let chip = Chip::open(&args.chip)?;
    let handle = chip.request_lines(
        "async_watch",
        &[(args.line, LineConfig::input().with_edge(EdgeDetect::Both))],
    )?;

    let mut events = AsyncLineEvents::new(&handle)?;
    while let Some(event) = events.next().await {
        let event = event?;
        println!(
            "line {}: {:?} edge at {}ns",
            event.offset(),
            event.edge(),
            event.timestamp().as_nanos(),
        );
    }
    // The stream ends when the request descriptor goes away.
    Ok(())
}

#[tokio::main]
async fn main() -> CliResult {
    let args = Cli::from_args();
    do_main(args).await.or_else(|e| {
        error!("{:?}", e);
        Ok(())
    })
}
