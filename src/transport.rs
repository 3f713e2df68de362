// File: transport.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

use crate::error::{HarnessError, HarnessResult};
use crate::param::HttpParam;
use crate::scanner::ScanReport;

/// Payload buffer size used when nothing else was negotiated.
pub const DEFAULT_PAYLOAD_BUFFER_SIZE: usize = 128 * 1024;

/// What the fuzzer side agreed to during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    pub payload_buffer_size: usize,
}

/// Connection to whatever drives the fuzzing loop.
///
/// A session calls `negotiate` once, then `acquire_payload` and `release`
/// once per iteration. `release` hands the iteration's findings back.
pub trait FuzzTransport {
    fn negotiate(&mut self) -> HarnessResult<Negotiation>;
    fn acquire_payload(&mut self) -> HarnessResult<Vec<u8>>;
    fn release(&mut self, block: &HttpParam, report: &ScanReport) -> HarnessResult<()>;
}

#[derive(Debug, Serialize)]
pub struct IterationRecord<'a> {
    pub timestamp: DateTime<Utc>,
    pub payload_size: usize,
    pub report: &'a ScanReport,
    pub block: &'a HttpParam,
}

/// Reads the payload from a file and writes the results as JSON.
#[derive(Debug, Clone)]
pub struct FileTransport {
    payload_path: PathBuf,
    results_path: Option<PathBuf>,
    buffer_size: usize,
    last_payload_size: usize,
}

impl FileTransport {
    pub fn new(payload_path: impl Into<PathBuf>) -> Self {
        FileTransport {
            payload_path: payload_path.into(),
            results_path: None,
            buffer_size: DEFAULT_PAYLOAD_BUFFER_SIZE,
            last_payload_size: 0,
        }
    }

    pub fn with_results(mut self, results_path: impl Into<PathBuf>) -> Self {
        self.results_path = Some(results_path.into());
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }
}

impl FuzzTransport for FileTransport {
    fn negotiate(&mut self) -> HarnessResult<Negotiation> {
        debug!("File transport payload buffer is {} bytes", self.buffer_size);
        Ok(Negotiation {
            payload_buffer_size: self.buffer_size,
        })
    }

    fn acquire_payload(&mut self) -> HarnessResult<Vec<u8>> {
        let mut payload = fs::read(&self.payload_path).map_err(|e| {
            HarnessError::Transport(format!(
                "cannot read payload {}: {}",
                self.payload_path.display(),
                e
            ))
        })?;
        if payload.len() > self.buffer_size {
            debug!(
                "Payload truncated from {} to {} bytes",
                payload.len(),
                self.buffer_size
            );
            payload.truncate(self.buffer_size);
        }
        self.last_payload_size = payload.len();
        Ok(payload)
    }

    fn release(&mut self, block: &HttpParam, report: &ScanReport) -> HarnessResult<()> {
        let Some(path) = &self.results_path else {
            return Ok(());
        };
        let record = IterationRecord {
            timestamp: Utc::now(),
            payload_size: self.last_payload_size,
            report,
            block,
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| HarnessError::Transport(format!("cannot encode results: {}", e)))?;
        fs::write(path, json).map_err(|e| {
            HarnessError::Transport(format!("cannot write results {}: {}", path.display(), e))
        })?;
        info!("Results written to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_truncates_to_buffer() {
        let dir = TempDir::new().unwrap();
        let payload = dir.path().join("payload");
        fs::write(&payload, b"GET / HTTP/1.1\r\n\r\n").unwrap();

        let mut transport = FileTransport::new(&payload).with_buffer_size(3);
        assert_eq!(transport.negotiate().unwrap().payload_buffer_size, 3);
        assert_eq!(transport.acquire_payload().unwrap(), b"GET");
    }

    #[test]
    fn test_missing_payload_is_transport_error() {
        let dir = TempDir::new().unwrap();
        let mut transport = FileTransport::new(dir.path().join("absent"));
        assert!(matches!(
            transport.acquire_payload(),
            Err(HarnessError::Transport(_))
        ));
    }

    #[test]
    fn test_release_writes_json_record() {
        let dir = TempDir::new().unwrap();
        let payload = dir.path().join("payload");
        let results = dir.path().join("results.json");
        fs::write(&payload, b"abcd").unwrap();

        let mut transport = FileTransport::new(&payload).with_results(&results);
        transport.acquire_payload().unwrap();

        let mut block = HttpParam::new();
        block.record_status(200);
        let report = ScanReport {
            bytes_received: 19,
            statuses: vec![200],
            orders: vec![],
            dropped: 0,
        };
        transport.release(&block, &report).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&results).unwrap()).unwrap();
        assert_eq!(value["payload_size"], 4);
        assert_eq!(value["report"]["statuses"][0], 200);
        assert_eq!(value["block"]["status"][0], 200);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_release_without_results_path_is_noop() {
        let mut transport = FileTransport::new("/nonexistent");
        transport
            .release(&HttpParam::new(), &ScanReport::default())
            .unwrap();
    }
}
