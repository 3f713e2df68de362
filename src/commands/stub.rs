// File: stub.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use std::net::SocketAddr;

use super::{print_info, print_success};
use crate::cli::StubArgs;
use crate::stub::StubResponder;

pub async fn execute(args: &StubArgs) -> Result<()> {
    let addr = SocketAddr::new(args.host, args.port);
    let mut stub = StubResponder::bind(args.mode, addr)
        .await
        .context("Failed to start stub responder")?
        .spawn()?;

    if let Some(path) = &args.override_file {
        let payload = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read override payload {}", path.display()))?;
        print_info(&format!(
            "Serving {} override bytes from {}",
            payload.len(),
            path.display()
        ));
        stub.set_override(payload);
    }

    print_success(&format!(
        "Stub responder for {} mode listening on {}",
        args.mode,
        stub.local_addr()
    ));
    print_info("Press Ctrl-C to stop");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            stub.shutdown().await?;
            print_info("Stub responder stopped");
        }
        // only returns when something went wrong
        result = stub.wait() => result.context("Stub responder stopped")?,
    }
    Ok(())
}
