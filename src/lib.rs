// File: lib.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2023-2025
// - Volker Schwaberow <volker@schwaberow.de>

#![allow(clippy::uninlined_format_args)]
#![allow(clippy::bool_assert_comparison)]

pub mod capabilities;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod instrument;
pub mod mode;
pub mod oracle;
pub mod param;
pub mod responses;
pub mod scanner;
pub mod session;
pub mod shm;
pub mod stub;
pub mod token;
pub mod transport;


pub use error::{HarnessError, HarnessResult};
pub use mode::Mode;
pub use param::{HttpParam, ParamSink};
pub use scanner::{ResponseScanner, ScanReport};
