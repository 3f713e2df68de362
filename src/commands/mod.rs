// File: mod.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::Result;
use colored::*;

use crate::cli::{CompareArgs, ParamArgs, RunArgs, ScanArgs, StubArgs};
use crate::param::HttpParam;
use crate::scanner::ScanReport;

pub mod compare;
pub mod param;
pub mod run;
pub mod scan;
pub mod stub;

pub async fn handle_run_command(args: &RunArgs) -> Result<()> {
    run::execute(args).await
}

pub async fn handle_stub_command(args: &StubArgs) -> Result<()> {
    stub::execute(args).await
}

pub async fn handle_scan_command(args: &ScanArgs) -> Result<()> {
    scan::execute(args).await
}

pub async fn handle_param_command(args: &ParamArgs) -> Result<()> {
    param::execute(args).await
}

pub async fn handle_compare_command(args: &CompareArgs) -> Result<()> {
    compare::execute(args).await
}

fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

fn format_duration(ms: u64) -> String {
    if ms >= 60000 {
        format!("{}m {:.1}s", ms / 60000, (ms % 60000) as f64 / 1000.0)
    } else if ms >= 1000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}

fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn colored_status(status: i16) -> ColoredString {
    let text = status.to_string();
    match status {
        200..=299 => text.green(),
        300..=399 => text.cyan(),
        400..=499 => text.yellow(),
        500..=599 => text.red(),
        _ => text.bright_black(),
    }
}

fn display_scan_report(report: &ScanReport) {
    println!();
    println!("{}", "═".repeat(60).bright_black());
    println!("{:^60}", "SCAN REPORT".bold().bright_white());
    println!("{}", "═".repeat(60).bright_black());

    println!("Received: {}", format_file_size(report.bytes_received).bold());

    let statuses: Vec<String> = report
        .statuses
        .iter()
        .map(|s| colored_status(*s).to_string())
        .collect();
    println!(
        "Statuses: {}",
        if statuses.is_empty() {
            "none".bright_black().to_string()
        } else {
            statuses.join(", ")
        }
    );

    let orders: Vec<String> = report.orders.iter().map(|o| o.to_string()).collect();
    println!(
        "Markers:  {}",
        if orders.is_empty() {
            "none".bright_black().to_string()
        } else {
            orders.join(", ").cyan().to_string()
        }
    );

    if report.dropped > 0 {
        print_warning(&format!(
            "{} value(s) did not fit into the parameter block",
            report.dropped
        ));
    }
    println!("{}", "═".repeat(60).bright_black());
}

fn display_param_block(param: &HttpParam) {
    println!();
    println!(
        "{} {}   {} {}",
        "message_count:".bold(),
        param.message_count,
        "message_processed:".bold(),
        param.message_processed
    );
    println!("{}", "─".repeat(72).bright_black());
    println!(
        "{:>4} {:>14} {:>7} {:>14} {:>14} {:>7} {:>10}",
        "slot".bold(),
        "content_len".bold(),
        "chunked".bold(),
        "consumed".bold(),
        "body_len".bold(),
        "status".bold(),
        "order".bold()
    );
    for slot in 0..crate::param::SLOT_COUNT {
        println!(
            "{:>4} {:>14} {:>7} {:>14} {:>14} {:>7} {:>10}",
            slot,
            param.content_length[slot],
            param.chunked_encoding[slot],
            param.consumed_length[slot],
            param.body_length[slot],
            colored_status(param.status[slot]),
            param.order[slot]
        );
    }
    println!("{}", "─".repeat(72).bright_black());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(250), "250ms");
        assert_eq!(format_duration(1500), "1.50s");
        assert_eq!(format_duration(61_000), "1m 1.0s");
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(2048), "2.00 KB");
    }
}
