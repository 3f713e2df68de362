// File: mode.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::HarnessError;

/// Wire protocol spoken between the target and its upstream.
///
/// The discriminants are the bit values used in the instrumentation
/// `mode` bitmask, so a call site can tag a setter with several modes at once.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
#[clap(rename_all = "lower")]
pub enum Mode {
    Request = 1,
    Response = 2,
    Scgi = 4,
    FastCgi = 8,
    Ajp = 16,
    Uwsgi = 32,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::Request,
        Mode::Response,
        Mode::Scgi,
        Mode::FastCgi,
        Mode::Ajp,
        Mode::Uwsgi,
    ];

    pub fn flag(self) -> i32 {
        self as i32
    }

    /// True when `flags` (a bitmask of mode values) includes this mode.
    pub fn matches(self, flags: i32) -> bool {
        flags & self.flag() != 0
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Request => "request",
            Mode::Response => "response",
            Mode::Scgi => "scgi",
            Mode::FastCgi => "fastcgi",
            Mode::Ajp => "ajp",
            Mode::Uwsgi => "uwsgi",
        }
    }

    /// Request mode fuzzes the front-end's request parser; every other mode
    /// fuzzes how the front-end parses what the upstream sends back.
    pub fn is_request(self) -> bool {
        self == Mode::Request
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Request
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Mode::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str() == trimmed)
            .ok_or_else(|| HarnessError::InvalidMode(trimmed.to_string()))
    }
}
