// File: config.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::debug;
use std::fs;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};
use crate::mode::Mode;
use crate::scanner::RECV_BUFFER_SIZE;
use crate::shm::HTTP_PARAM_KEY;
use crate::stub::STUB_PORT;

pub const DEFAULT_CONTROL_DIR: &str = "/tmp/target";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_micros(200_000);

const MODE_FILE: &str = "mode";
const CHECK_PAYLOAD_FILE: &str = "check_payload";
const PORT_FILE: &str = "port";
const TIMEOUT_FILE: &str = "timeout";
const START_SCRIPT: &str = "start.sh";

#[derive(Debug, Clone)]
pub struct HarnessSettings {
    control_dir: PathBuf,
    target_host: IpAddr,
    stub_host: IpAddr,
    stub_port: u16,
    shm_key: libc::key_t,
    retry_window: Duration,
    retry_interval: Duration,
    settle_delay: Duration,
    recv_buffer_size: usize,
    health_check_read_size: usize,
}

impl HarnessSettings {
    pub fn new() -> Self {
        Self {
            control_dir: PathBuf::from(DEFAULT_CONTROL_DIR),
            target_host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            stub_host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            stub_port: STUB_PORT,
            shm_key: HTTP_PARAM_KEY,
            retry_window: Duration::from_secs(60),
            retry_interval: Duration::from_secs(1),
            settle_delay: Duration::from_secs(5),
            recv_buffer_size: RECV_BUFFER_SIZE,
            health_check_read_size: 1024,
        }
    }

    pub fn set_control_dir(&mut self, control_dir: impl Into<PathBuf>) {
        self.control_dir = control_dir.into();
    }

    pub fn control_dir(&self) -> &Path {
        &self.control_dir
    }

    pub fn set_target_host(&mut self, target_host: IpAddr) {
        self.target_host = target_host;
    }

    pub fn target_host(&self) -> IpAddr {
        self.target_host
    }

    pub fn set_stub_host(&mut self, stub_host: IpAddr) {
        self.stub_host = stub_host;
    }

    pub fn stub_host(&self) -> IpAddr {
        self.stub_host
    }

    pub fn set_stub_port(&mut self, stub_port: u16) {
        self.stub_port = stub_port;
    }

    pub fn stub_port(&self) -> u16 {
        self.stub_port
    }

    /// Address the stub responder binds, every interface unless narrowed.
    pub fn stub_addr(&self) -> SocketAddr {
        SocketAddr::new(self.stub_host, self.stub_port)
    }

    pub fn set_shm_key(&mut self, shm_key: libc::key_t) {
        self.shm_key = shm_key;
    }

    pub fn shm_key(&self) -> libc::key_t {
        self.shm_key
    }

    pub fn set_retry_window(&mut self, retry_window: Duration) {
        self.retry_window = retry_window;
    }

    pub fn retry_window(&self) -> Duration {
        self.retry_window
    }

    pub fn set_retry_interval(&mut self, retry_interval: Duration) {
        self.retry_interval = retry_interval;
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    pub fn set_settle_delay(&mut self, settle_delay: Duration) {
        self.settle_delay = settle_delay;
    }

    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    pub fn set_recv_buffer_size(&mut self, recv_buffer_size: usize) {
        self.recv_buffer_size = recv_buffer_size.max(1);
    }

    pub fn recv_buffer_size(&self) -> usize {
        self.recv_buffer_size
    }

    pub fn set_health_check_read_size(&mut self, health_check_read_size: usize) {
        self.health_check_read_size = health_check_read_size.max(1);
    }

    pub fn health_check_read_size(&self) -> usize {
        self.health_check_read_size
    }
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self::new()
    }
}

/// The directory of small files that describes how to run one target.
///
/// The mode is read before the target starts, everything else after its
/// startup script has run, since the script may generate those files.
#[derive(Debug, Clone)]
pub struct ControlDir {
    root: PathBuf,
}

impl ControlDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ControlDir { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn start_script(&self) -> PathBuf {
        self.root.join(START_SCRIPT)
    }

    /// Request mode when the file is absent.
    pub fn mode(&self) -> HarnessResult<Mode> {
        let path = self.root.join(MODE_FILE);
        match read_optional(&path)? {
            Some(contents) => {
                let word = first_word(&contents).unwrap_or_default();
                word.parse::<Mode>()
                    .map_err(|_| HarnessError::control_file(&path, format!("invalid mode '{}'", word)))
            }
            None => Ok(Mode::default()),
        }
    }

    /// Health-check bytes, truncated to `limit`.
    pub fn check_payload(&self, limit: usize) -> HarnessResult<Vec<u8>> {
        let path = self.root.join(CHECK_PAYLOAD_FILE);
        let mut payload = fs::read(&path)
            .map_err(|e| HarnessError::control_file(&path, format!("cannot read: {}", e)))?;
        payload.truncate(limit);
        Ok(payload)
    }

    pub fn port(&self) -> HarnessResult<u16> {
        let path = self.root.join(PORT_FILE);
        let contents = fs::read_to_string(&path)
            .map_err(|e| HarnessError::control_file(&path, format!("cannot read: {}", e)))?;
        let word = first_word(&contents).unwrap_or_default();
        word.parse::<u16>()
            .map_err(|_| HarnessError::control_file(&path, format!("invalid port '{}'", word)))
    }

    /// `"<sec> <usec>"`, [`DEFAULT_TIMEOUT`] when the file is absent.
    pub fn timeout(&self) -> HarnessResult<Duration> {
        let path = self.root.join(TIMEOUT_FILE);
        let Some(contents) = read_optional(&path)? else {
            return Ok(DEFAULT_TIMEOUT);
        };
        parse_timeout(&contents).ok_or_else(|| {
            HarnessError::control_file(&path, format!("invalid timeout '{}'", contents.trim()))
        })
    }

    /// Reads everything the session needs once the target is up.
    pub fn load(&self, mode: Mode, payload_limit: usize) -> HarnessResult<TargetConfig> {
        let config = TargetConfig {
            mode,
            check_payload: self.check_payload(payload_limit)?,
            port: self.port()?,
            timeout: self.timeout()?,
        };
        debug!(
            "Loaded target config from {}: port {}, timeout {:?}, check payload {} bytes",
            self.root.display(),
            config.port,
            config.timeout,
            config.check_payload.len()
        );
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    pub mode: Mode,
    pub check_payload: Vec<u8>,
    pub port: u16,
    pub timeout: Duration,
}

fn read_optional(path: &Path) -> HarnessResult<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HarnessError::control_file(path, format!("cannot read: {}", e))),
    }
}

fn first_word(contents: &str) -> Option<&str> {
    contents.split_whitespace().next()
}

fn parse_timeout(contents: &str) -> Option<Duration> {
    let mut fields = contents.split_whitespace();
    let secs = fields.next()?.parse::<u64>().ok()?;
    let micros = match fields.next() {
        Some(field) => field.parse::<u64>().ok()?,
        None => 0,
    };
    Some(Duration::from_secs(secs) + Duration::from_micros(micros))
}
