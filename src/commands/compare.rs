// File: compare.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};
use colored::*;
use serde::Serialize;
use std::path::Path;

use super::{display_param_block, print_json, print_success, print_warning};
use crate::cli::CompareArgs;
use crate::oracle::{self, Divergence};
use crate::param::HttpParam;

#[derive(Debug, Serialize)]
struct ComparisonResult {
    interesting: bool,
    divergence: Option<Divergence>,
}

pub async fn execute(args: &CompareArgs) -> Result<()> {
    let first = load_block(&args.first)?;
    let second = load_block(&args.second)?;
    let divergence = oracle::compare(&first, &second);

    if args.json {
        return print_json(&ComparisonResult {
            interesting: divergence.is_some(),
            divergence,
        });
    }

    println!();
    println!("{}", "═".repeat(72).bright_black());
    println!("{:^72}", "BLOCK COMPARISON".bold().bright_white());
    println!("{}", "═".repeat(72).bright_black());

    println!("{}", args.first.display().to_string().bold().bright_blue());
    display_param_block(&first);
    println!("{}", args.second.display().to_string().bold().bright_blue());
    display_param_block(&second);

    println!();
    match divergence {
        Some(divergence) => print_warning(&format!("Desync candidate: {}", divergence)),
        None => print_success("Both targets framed the input the same way"),
    }
    println!("{}", "═".repeat(72).bright_black());
    Ok(())
}

/// Accepts a bare block or anything with a `block` field, such as the
/// results file the `run` command writes.
fn load_block(path: &Path) -> Result<HttpParam> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not valid JSON", path.display()))?;
    let block = match value.get("block") {
        Some(inner) => inner.clone(),
        None => value,
    };
    serde_json::from_value(block)
        .with_context(|| format!("{} does not hold a parameter block", path.display()))
}
