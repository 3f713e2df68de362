// File: cli.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{HarnessSettings, DEFAULT_CONTROL_DIR};
use crate::mode::Mode;
use crate::shm::HTTP_PARAM_KEY;
use crate::stub::STUB_PORT;

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = env!("CARGO_PKG_DESCRIPTION"),
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long = "log-level", default_value = "info", global = true)]
    pub log_level: String,

    #[arg(
        short = 'v',
        long = "verbose",
        help = "Enable verbose output",
        global = true
    )]
    pub verbose: bool,

    #[arg(
        short = 'q',
        long = "quiet",
        help = "Reduce output verbosity",
        global = true
    )]
    pub quiet: bool,

    #[arg(long = "no-color", help = "Disable colored output", global = true)]
    pub no_color: bool,
}

impl Cli {
    /// `-v` and `-q` win over `--log-level`; unknown levels fall back to info.
    pub fn level_filter(&self) -> LevelFilter {
        if self.verbose {
            return LevelFilter::Debug;
        }
        if self.quiet {
            return LevelFilter::Warn;
        }
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one fuzzing iteration against the target in the control directory
    Run(RunArgs),
    /// Serve canned upstream responses in the foreground
    Stub(StubArgs),
    /// Send a payload to a host and report the status codes and markers seen
    Scan(ScanArgs),
    /// Create, inspect, clear or delete the shared parameter block
    Param(ParamArgs),
    /// Compare two saved blocks the way the fuzzer's oracle does
    Compare(CompareArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(short = 'c', long = "control-dir", default_value = DEFAULT_CONTROL_DIR)]
    pub control_dir: PathBuf,

    #[arg(short = 'p', long = "payload", help = "File holding the fuzz payload")]
    pub payload: PathBuf,

    #[arg(short = 'o', long = "results", help = "Write the iteration results as JSON")]
    pub results: Option<PathBuf>,

    #[arg(long = "stub-port", default_value_t = STUB_PORT)]
    pub stub_port: u16,

    #[arg(long = "stub-host", default_value = "0.0.0.0", help = "Address the stub responder binds")]
    pub stub_host: IpAddr,

    #[arg(long = "target-host", default_value = "127.0.0.1")]
    pub target_host: IpAddr,

    #[arg(long = "shm-key", default_value_t = HTTP_PARAM_KEY, value_parser = parse_key)]
    pub shm_key: libc::key_t,

    #[arg(long = "retry-window", default_value_t = 60, help = "Health check window in seconds")]
    pub retry_window: u64,

    #[arg(long = "retry-interval", default_value_t = 1000, help = "Milliseconds between health checks")]
    pub retry_interval: u64,

    #[arg(long = "settle-delay", default_value_t = 5, help = "Seconds to wait after a passed health check")]
    pub settle_delay: u64,

    #[arg(long = "buffer-size", default_value_t = crate::scanner::RECV_BUFFER_SIZE)]
    pub buffer_size: usize,

    #[arg(long = "payload-limit", default_value_t = crate::transport::DEFAULT_PAYLOAD_BUFFER_SIZE)]
    pub payload_limit: usize,

    #[arg(long = "json", help = "Print the scan report as JSON")]
    pub json: bool,
}

impl RunArgs {
    pub fn settings(&self) -> HarnessSettings {
        let mut settings = HarnessSettings::new();
        settings.set_control_dir(&self.control_dir);
        settings.set_target_host(self.target_host);
        settings.set_stub_host(self.stub_host);
        settings.set_stub_port(self.stub_port);
        settings.set_shm_key(self.shm_key);
        settings.set_retry_window(Duration::from_secs(self.retry_window));
        settings.set_retry_interval(Duration::from_millis(self.retry_interval));
        settings.set_settle_delay(Duration::from_secs(self.settle_delay));
        settings.set_recv_buffer_size(self.buffer_size);
        settings
    }
}

#[derive(Args, Debug)]
pub struct StubArgs {
    #[arg(short = 'm', long = "mode", value_enum, default_value_t = Mode::Response)]
    pub mode: Mode,

    #[arg(long = "host", default_value = "0.0.0.0", help = "Address to bind")]
    pub host: IpAddr,

    #[arg(short = 'p', long = "port", default_value_t = STUB_PORT)]
    pub port: u16,

    #[arg(long = "override", help = "Serve this file instead of the canned response")]
    pub override_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[arg(long = "host", default_value = "127.0.0.1")]
    pub host: IpAddr,

    #[arg(short = 'p', long = "port")]
    pub port: u16,

    #[arg(short = 'i', long = "payload", help = "File holding the bytes to send")]
    pub payload: PathBuf,

    #[arg(short = 't', long = "timeout", default_value_t = 200, help = "Socket timeout in milliseconds, 0 disables it")]
    pub timeout: u64,

    #[arg(long = "buffer-size", default_value_t = crate::scanner::RECV_BUFFER_SIZE)]
    pub buffer_size: usize,

    #[arg(long = "shm", help = "Record into the shared parameter block")]
    pub shm: bool,

    #[arg(long = "shm-key", default_value_t = HTTP_PARAM_KEY, value_parser = parse_key)]
    pub shm_key: libc::key_t,

    #[arg(long = "json", help = "Print the scan report as JSON")]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ParamArgs {
    #[command(subcommand)]
    pub action: ParamAction,

    #[arg(long = "key", default_value_t = HTTP_PARAM_KEY, value_parser = parse_key, global = true)]
    pub key: libc::key_t,
}

#[derive(Subcommand, Debug)]
pub enum ParamAction {
    /// Create the segment and clear it
    Create,
    /// Print the current contents
    Show {
        #[arg(long = "json")]
        json: bool,
    },
    /// Write the "nothing seen" pattern over the block
    Clear,
    /// Remove the segment
    Delete,
}

#[derive(Args, Debug)]
pub struct CompareArgs {
    #[arg(help = "Block saved from the first target (JSON)")]
    pub first: PathBuf,

    #[arg(help = "Block saved from the second target (JSON)")]
    pub second: PathBuf,

    #[arg(long = "json")]
    pub json: bool,
}

/// Accepts decimal or `0x` prefixed hexadecimal keys.
fn parse_key(value: &str) -> Result<libc::key_t, String> {
    let value = value.trim();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => libc::key_t::from_str_radix(hex, 16),
        None => value.parse::<libc::key_t>(),
    };
    parsed.map_err(|e| format!("invalid key '{}': {}", value, e))
}
