// File: error.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the harness environment.
///
/// Everything here means the deployment is broken, not that the target
/// misbehaved. Malformed wire data never produces one of these.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Shared memory error ({operation}): {source}")]
    SharedMemory {
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Control file {path}: {reason}")]
    ControlFile { path: PathBuf, reason: String },

    #[error("Invalid mode: {0}")]
    InvalidMode(String),

    #[error("Stub responder failed to bind port {port}: {source}")]
    StubBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Stub responder failed to accept connection: {0}")]
    StubAccept(#[source] std::io::Error),

    #[error("Target startup script failed: {0}")]
    StartupScript(String),

    #[error("Target did not pass the health check within {0} seconds")]
    HealthCheck(u64),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Session error: {0}")]
    Session(String),
}

impl HarnessError {
    pub(crate) fn shm(operation: &'static str) -> Self {
        HarnessError::SharedMemory {
            operation,
            source: std::io::Error::last_os_error(),
        }
    }

    pub(crate) fn control_file(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        HarnessError::ControlFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type HarnessResult<T> = Result<T, HarnessError>;
