// File: scanner.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, info, trace, warn};
use serde::Serialize;
use std::borrow::Cow;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::param::ParamSink;
use crate::token::{
    clamp_order, clamp_status, find_next, parse_value, partial_suffix_start, pending_fragment,
    TokenKind, ValueParse,
};

pub const RECV_BUFFER_SIZE: usize = 65536;

/// Room for the longest fragment carried across reads: the 12 byte marker
/// prefix, one blank, a sign and the carried digits.
pub const LONGEST_TOKEN: usize = 32;
pub const PENDING_CAPACITY: usize = LONGEST_TOKEN - 1;

/// What one scanner session saw, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub bytes_received: u64,
    pub statuses: Vec<i16>,
    pub orders: Vec<i32>,
    /// Values the block had no free slot for.
    pub dropped: usize,
}

/// Extracts status codes and `X-Desync-Id` values from a response stream.
///
/// Reads may split the stream anywhere. A token whose prefix or value runs
/// into the end of a read is kept as a pending fragment and completed with
/// the next read, so the recorded values do not depend on how the peer's
/// bytes were chunked. Every occurrence inside a read is recorded, not just
/// the first, which is what makes pipelined responses visible.
#[derive(Debug)]
pub struct ResponseScanner {
    pending: Vec<u8>,
    buffer_size: usize,
    read_timeout: Option<Duration>,
    report: ScanReport,
}

impl ResponseScanner {
    pub fn new() -> Self {
        Self::with_buffer_size(RECV_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        ResponseScanner {
            pending: Vec::with_capacity(PENDING_CAPACITY),
            buffer_size: buffer_size.max(1),
            read_timeout: None,
            report: ScanReport::default(),
        }
    }

    /// A read that stalls longer than `timeout` ends the session like a close.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn bytes_received(&self) -> u64 {
        self.report.bytes_received
    }

    /// Drives the scanner until the peer closes or a read fails.
    pub async fn scan<R, S>(mut self, reader: &mut R, sink: &mut S) -> ScanReport
    where
        R: AsyncRead + Unpin,
        S: ParamSink + ?Sized,
    {
        let mut buffer = vec![0u8; self.buffer_size];
        loop {
            let read = match self.read_timeout {
                Some(limit) => match tokio::time::timeout(limit, reader.read(&mut buffer)).await {
                    Ok(result) => result,
                    Err(_) => {
                        debug!("No data within {:?}, ending scan", limit);
                        break;
                    }
                },
                None => reader.read(&mut buffer).await,
            };

            match read {
                Ok(0) => break,
                Ok(n) => {
                    trace!("Scanner received {} bytes", n);
                    self.feed(&buffer[..n], sink);
                }
                Err(e) => {
                    debug!("Read failed, ending scan: {}", e);
                    break;
                }
            }
        }

        let report = self.finish(sink);
        info!(
            "Scan finished: {} bytes, statuses {:?}, orders {:?}",
            report.bytes_received, report.statuses, report.orders
        );
        report
    }

    /// Processes one read worth of bytes.
    pub fn feed<S>(&mut self, chunk: &[u8], sink: &mut S)
    where
        S: ParamSink + ?Sized,
    {
        self.report.bytes_received += chunk.len() as u64;

        let data: Cow<[u8]> = if self.pending.is_empty() {
            Cow::Borrowed(chunk)
        } else {
            let mut joined = std::mem::take(&mut self.pending);
            joined.extend_from_slice(chunk);
            Cow::Owned(joined)
        };

        let mut from = 0;
        while let Some((pos, kind)) = find_next(&data, from) {
            let value_start = pos + kind.prefix().len();
            match parse_value(&data, value_start, kind.signed()) {
                ValueParse::Number { value, end } => {
                    self.record(kind, value, sink);
                    from = end;
                }
                ValueParse::NoDigits { end } => {
                    trace!("Skipping {:?} token without a value at offset {}", kind, pos);
                    from = end;
                }
                ValueParse::Truncated { .. } => {
                    self.pending = pending_fragment(kind, &data, value_start);
                    trace!("Carrying {:?} token from offset {} into the next read", kind, pos);
                    return;
                }
            }
        }

        if let Some(start) = partial_suffix_start(&data[from..]) {
            self.pending.extend_from_slice(&data[from + start..]);
        }
    }

    /// Resolves whatever is still pending once the stream has ended.
    pub fn finish<S>(mut self, sink: &mut S) -> ScanReport
    where
        S: ParamSink + ?Sized,
    {
        let pending = std::mem::take(&mut self.pending);
        if let Some((pos, kind)) = find_next(&pending, 0) {
            let value_start = pos + kind.prefix().len();
            match parse_value(&pending, value_start, kind.signed()) {
                ValueParse::Number { value, .. }
                | ValueParse::Truncated {
                    partial: Some(value),
                } => self.record(kind, value, sink),
                _ => trace!("Discarding incomplete {:?} token at end of stream", kind),
            }
        }

        if self.report.dropped > 0 {
            warn!(
                "{} value(s) did not fit into the parameter block",
                self.report.dropped
            );
        }
        self.report
    }

    fn record<S>(&mut self, kind: TokenKind, value: i64, sink: &mut S)
    where
        S: ParamSink + ?Sized,
    {
        let stored = match kind {
            TokenKind::Status => {
                let status = clamp_status(value);
                self.report.statuses.push(status);
                sink.record_status(status)
            }
            TokenKind::Marker => {
                let order = clamp_order(value);
                self.report.orders.push(order);
                sink.record_order(order)
            }
        };
        if !stored {
            self.report.dropped += 1;
        }
    }
}

impl Default for ResponseScanner {
    fn default() -> Self {
        Self::new()
    }
}
