// File: scan.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;

use super::{display_param_block, display_scan_report, print_info, print_json};
use crate::cli::ScanArgs;
use crate::config::HarnessSettings;
use crate::param::HttpParam;
use crate::session::exchange;
use crate::shm::SharedParamBlock;

pub async fn execute(args: &ScanArgs) -> Result<()> {
    let payload = tokio::fs::read(&args.payload)
        .await
        .with_context(|| format!("Failed to read payload {}", args.payload.display()))?;
    let addr = SocketAddr::new(args.host, args.port);
    let timeout = Duration::from_millis(args.timeout);
    let mut settings = HarnessSettings::new();
    settings.set_recv_buffer_size(args.buffer_size);

    if !args.json {
        print_info(&format!("Sending {} bytes to {}", payload.len(), addr));
    }

    let (report, block) = if args.shm {
        let mut block = SharedParamBlock::attach(args.shm_key)
            .context("Failed to attach the shared parameter block")?;
        let report = exchange(addr, &payload, timeout, &settings, &mut block)
            .await
            .with_context(|| format!("Scan of {} failed", addr))?;
        (report, block.snapshot())
    } else {
        let mut block = HttpParam::new();
        let report = exchange(addr, &payload, timeout, &settings, &mut block)
            .await
            .with_context(|| format!("Scan of {} failed", addr))?;
        (report, block)
    };

    if args.json {
        print_json(&report)?;
    } else {
        display_scan_report(&report);
        if args.shm {
            display_param_block(&block);
        }
    }
    Ok(())
}
