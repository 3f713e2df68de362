// File: main.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use clap::Parser;
use simple_logger::SimpleLogger;

use rdesync::cli::{Cli, Commands};
use rdesync::commands;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        commands::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    if cli.no_color {
        colored::control::set_override(false);
    }

    SimpleLogger::new()
        .with_level(cli.level_filter())
        .init()
        .context("Failed to initialize logger")?;

    match &cli.command {
        Commands::Run(args) => commands::handle_run_command(args).await,
        Commands::Stub(args) => commands::handle_stub_command(args).await,
        Commands::Scan(args) => commands::handle_scan_command(args).await,
        Commands::Param(args) => commands::handle_param_command(args).await,
        Commands::Compare(args) => commands::handle_compare_command(args).await,
    }
}
