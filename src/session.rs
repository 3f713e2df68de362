// File: session.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

//! One fuzzing iteration against a target, from environment setup to the
//! release of the results.
//!
//! The steps run strictly in order:
//!
//! 1. [`SessionController::configure`] negotiates with the transport and
//!    attaches the parameter block (once per process).
//! 2. [`SessionController::start_target`] starts the stub responder, runs the
//!    target's `start.sh` and loads the remaining control files.
//! 3. [`SessionController::wait_until_ready`] health-checks the target.
//! 4. [`SessionController::run_iteration`] sends one payload and scans the
//!    reply into the block.
//!
//! Any environment failure ends the session with an error; nothing is
//! retried except the individual health-check attempts.

use log::{debug, info, warn};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::process::Command;

use crate::capabilities::{self, Capabilities};
use crate::config::{ControlDir, HarnessSettings, TargetConfig};
use crate::error::{HarnessError, HarnessResult};
use crate::instrument::ENV_MODE;
use crate::mode::Mode;
use crate::param::ParamSink;
use crate::scanner::{ResponseScanner, ScanReport};
use crate::shm::SharedParamBlock;
use crate::stub::{StubHandle, StubResponder};
use crate::transport::FuzzTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configured,
    TargetStarting,
    HealthChecking,
    Ready,
    Sending,
    Scanning,
    Done,
}

pub struct SessionController<T> {
    state: SessionState,
    settings: HarnessSettings,
    control: ControlDir,
    transport: T,
    capabilities: Option<Capabilities>,
    block: Option<SharedParamBlock>,
    stub: Option<StubHandle>,
    target: Option<TargetConfig>,
}

impl<T: FuzzTransport> SessionController<T> {
    pub fn new(settings: HarnessSettings, transport: T) -> Self {
        let control = ControlDir::new(settings.control_dir());
        SessionController {
            state: SessionState::Unconfigured,
            settings,
            control,
            transport,
            capabilities: None,
            block: None,
            stub: None,
            target: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    pub fn block(&self) -> Option<&SharedParamBlock> {
        self.block.as_ref()
    }

    pub fn stub(&self) -> Option<&StubHandle> {
        self.stub.as_ref()
    }

    pub fn target(&self) -> Option<&TargetConfig> {
        self.target.as_ref()
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn require(&self, allowed: &[SessionState], step: &str) -> HarnessResult<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(HarnessError::Session(format!(
                "cannot {} in state {:?}",
                step, self.state
            )))
        }
    }

    pub fn configure(&mut self) -> HarnessResult<()> {
        self.require(&[SessionState::Unconfigured], "configure")?;
        let caps = capabilities::configure(&mut self.transport, &self.settings)?;
        let mut block = SharedParamBlock::attach_id(caps.shm_id)?;
        block.reset();
        self.capabilities = Some(caps);
        self.block = Some(block);
        self.transition(SessionState::Configured);
        Ok(())
    }

    pub async fn start_target(&mut self) -> HarnessResult<()> {
        self.require(&[SessionState::Configured], "start the target")?;
        self.transition(SessionState::TargetStarting);

        let mode = self.control.mode()?;
        info!("Starting target in {} mode", mode);
        let stub = StubResponder::bind(mode, self.settings.stub_addr())
            .await?
            .spawn()?;
        self.stub = Some(stub);

        run_startup_script(&self.control.start_script(), mode).await?;

        let limit = self
            .capabilities
            .map(|caps| caps.payload_buffer_size)
            .unwrap_or(usize::MAX);
        self.target = Some(self.control.load(mode, limit)?);
        Ok(())
    }

    pub async fn wait_until_ready(&mut self) -> HarnessResult<()> {
        self.require(&[SessionState::TargetStarting], "health-check")?;
        self.transition(SessionState::HealthChecking);

        let target = self.loaded_target()?;
        let addr = SocketAddr::new(self.settings.target_host(), target.port);
        health_check(addr, &target.check_payload, target.timeout, &self.settings).await?;

        let settle = self.settings.settle_delay();
        if !settle.is_zero() {
            info!("Waiting {:?} for buffered requests to drain", settle);
            tokio::time::sleep(settle).await;
        }
        self.transition(SessionState::Ready);
        Ok(())
    }

    pub async fn run_iteration(&mut self) -> HarnessResult<ScanReport> {
        self.require(&[SessionState::Ready, SessionState::Done], "run an iteration")?;
        self.transition(SessionState::Sending);

        let target = self.loaded_target()?.clone();
        let addr = SocketAddr::new(self.settings.target_host(), target.port);
        let payload = self.transport.acquire_payload()?;
        self.block_mut()?.reset();

        let outgoing = if target.mode.is_request() {
            payload
        } else {
            if let Some(stub) = &self.stub {
                stub.set_override(payload);
            }
            target.check_payload
        };

        let mut stream = connect(addr, target.timeout).await?;
        debug!("Connected to target at {}", addr);
        send(&mut stream, &outgoing, target.timeout).await?;

        self.transition(SessionState::Scanning);
        let scanner = scanner_for(&self.settings, target.timeout);
        let block = self.block_mut()?;
        let report = scanner.scan(&mut stream, &mut *block).await;
        let snapshot = block.snapshot();

        self.transport.release(&snapshot, &report)?;
        self.transition(SessionState::Done);
        Ok(report)
    }

    /// Runs every step once and stops the stub afterwards.
    pub async fn run(mut self) -> HarnessResult<ScanReport> {
        self.configure()?;
        self.start_target().await?;
        self.wait_until_ready().await?;
        let result = self.run_iteration().await;
        self.shutdown().await?;
        result
    }

    pub async fn shutdown(mut self) -> HarnessResult<()> {
        match self.stub.take() {
            Some(stub) => stub.shutdown().await,
            None => Ok(()),
        }
    }

    fn block_mut(&mut self) -> HarnessResult<&mut SharedParamBlock> {
        self.block
            .as_mut()
            .ok_or_else(|| HarnessError::Session("no parameter block attached".to_string()))
    }

    fn loaded_target(&self) -> HarnessResult<&TargetConfig> {
        self.target
            .as_ref()
            .ok_or_else(|| HarnessError::Session("target configuration not loaded".to_string()))
    }
}

async fn within<F, R>(limit: Duration, fut: F) -> io::Result<R>
where
    F: Future<Output = io::Result<R>>,
{
    // A zero timeout means no timeout, as with SO_RCVTIMEO.
    if limit.is_zero() {
        return fut.await;
    }
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "operation timed out")),
    }
}

async fn connect(addr: SocketAddr, timeout: Duration) -> io::Result<TcpStream> {
    within(timeout, TcpStream::connect(addr)).await
}

async fn send(stream: &mut TcpStream, payload: &[u8], timeout: Duration) -> io::Result<()> {
    within(timeout, stream.write_all(payload)).await
}

fn scanner_for(settings: &HarnessSettings, timeout: Duration) -> ResponseScanner {
    let scanner = ResponseScanner::with_buffer_size(settings.recv_buffer_size());
    if timeout.is_zero() {
        scanner
    } else {
        scanner.with_read_timeout(timeout)
    }
}

/// Runs the target's startup script with the mode exported.
pub async fn run_startup_script(script: &Path, mode: Mode) -> HarnessResult<()> {
    if !script.exists() {
        return Err(HarnessError::StartupScript(format!(
            "{} not found",
            script.display()
        )));
    }
    debug!("Running startup script {}", script.display());
    let status = Command::new("sh")
        .arg(script)
        .env(ENV_MODE, mode.as_str())
        .status()
        .await
        .map_err(|e| {
            HarnessError::StartupScript(format!("cannot run {}: {}", script.display(), e))
        })?;
    if !status.success() {
        return Err(HarnessError::StartupScript(format!(
            "{} exited with {}",
            script.display(),
            status
        )));
    }
    Ok(())
}

/// Polls the target until it answers the check payload with a `200`.
pub async fn health_check(
    addr: SocketAddr,
    payload: &[u8],
    timeout: Duration,
    settings: &HarnessSettings,
) -> HarnessResult<()> {
    info!("Health checking target at {}", addr);
    let started = Instant::now();
    let mut attempt = 0u32;
    while started.elapsed() < settings.retry_window() {
        attempt += 1;
        match probe(addr, payload, timeout, settings.health_check_read_size()).await {
            Ok(()) => {
                info!("Health check passed after {} attempt(s)", attempt);
                return Ok(());
            }
            Err(reason) => warn!("Health check attempt {} failed: {}", attempt, reason),
        }
        tokio::time::sleep(settings.retry_interval()).await;
    }
    Err(HarnessError::HealthCheck(settings.retry_window().as_secs()))
}

async fn probe(
    addr: SocketAddr,
    payload: &[u8],
    timeout: Duration,
    read_size: usize,
) -> Result<(), String> {
    let mut stream = connect(addr, timeout)
        .await
        .map_err(|e| format!("failed to connect: {}", e))?;
    send(&mut stream, payload, timeout)
        .await
        .map_err(|e| format!("failed to send payload: {}", e))?;

    let mut buffer = vec![0u8; read_size];
    let n = within(timeout, stream.read(&mut buffer))
        .await
        .map_err(|e| format!("failed to receive response: {}", e))?;
    let reply = &buffer[..n];
    if reply.windows(3).any(|w| w == b"200") {
        Ok(())
    } else {
        debug!("Health check reply: {}", String::from_utf8_lossy(reply));
        Err("not 200".to_string())
    }
}

/// Sends `payload` to `addr` and scans whatever comes back into `sink`.
pub async fn exchange<S>(
    addr: SocketAddr,
    payload: &[u8],
    timeout: Duration,
    settings: &HarnessSettings,
    sink: &mut S,
) -> HarnessResult<ScanReport>
where
    S: ParamSink + ?Sized,
{
    let mut stream = connect(addr, timeout).await?;
    send(&mut stream, payload, timeout).await?;
    Ok(scanner_for(settings, timeout).scan(&mut stream, sink).await)
}
