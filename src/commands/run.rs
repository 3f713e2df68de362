// File: run.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use std::time::Instant;

use super::{display_scan_report, format_duration, print_info, print_json, print_success};
use crate::cli::RunArgs;
use crate::session::SessionController;
use crate::transport::FileTransport;

pub async fn execute(args: &RunArgs) -> Result<()> {
    let settings = args.settings();
    let mut transport = FileTransport::new(&args.payload).with_buffer_size(args.payload_limit);
    if let Some(results) = &args.results {
        transport = transport.with_results(results);
    }

    if !args.json {
        print_info(&format!(
            "Running target from {}",
            settings.control_dir().display()
        ));
    }

    let started = Instant::now();
    let report = SessionController::new(settings, transport)
        .run()
        .await
        .context("Fuzzing iteration failed")?;

    if args.json {
        print_json(&report)?;
    } else {
        display_scan_report(&report);
        print_success(&format!(
            "Iteration finished in {}",
            format_duration(started.elapsed().as_millis() as u64)
        ));
        if let Some(results) = &args.results {
            print_success(&format!("Results saved to: {}", results.display()));
        }
    }
    Ok(())
}
