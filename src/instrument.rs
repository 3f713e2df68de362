// File: instrument.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

//! Target-side half of the protocol: the setters an instrumented parser
//! calls while it frames a message.
//!
//! Every setter takes a bitmask of the modes the call site belongs to, and is
//! ignored unless the harness runs the target in one of them. The first
//! setter call after [`Instrumentation::mark_message_processed`] moves on to
//! the next slot. Calls past the last slot are dropped.

use log::{debug, error};
use once_cell::sync::OnceCell;
use std::sync::Mutex;

use crate::error::HarnessResult;
use crate::mode::Mode;
use crate::param::{HttpParam, SLOT_COUNT};
use crate::shm::SharedParamBlock;

/// Environment variable carrying the active mode name.
pub const ENV_MODE: &str = "HDHUNTER_MODE";

impl AsMut<HttpParam> for HttpParam {
    fn as_mut(&mut self) -> &mut HttpParam {
        self
    }
}

impl AsMut<HttpParam> for SharedParamBlock {
    fn as_mut(&mut self) -> &mut HttpParam {
        self.block_mut()
    }
}

#[derive(Debug)]
pub struct Instrumentation<B> {
    block: B,
    mode: Mode,
}

impl Instrumentation<SharedParamBlock> {
    /// Attaches to the block exported by the harness and picks up the mode.
    pub fn from_env() -> HarnessResult<Self> {
        let block = SharedParamBlock::from_env()?;
        let mode = match std::env::var(ENV_MODE) {
            Ok(value) => value.parse()?,
            Err(_) => Mode::default(),
        };
        debug!("Instrumentation attached to block {} in {} mode", block.id(), mode);
        Ok(Instrumentation::new(block, mode))
    }
}

impl<B: AsMut<HttpParam>> Instrumentation<B> {
    pub fn new(block: B, mode: Mode) -> Self {
        Instrumentation { block, mode }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn block_mut(&mut self) -> &mut HttpParam {
        self.block.as_mut()
    }

    pub fn into_inner(self) -> B {
        self.block
    }

    /// Slot the next framing fact belongs to, or `None` when the call is
    /// filtered out or the block is full.
    fn current_slot(&mut self, flags: i32) -> Option<usize> {
        if !self.mode.matches(flags) {
            return None;
        }
        let param = self.block.as_mut();
        if param.message_processed == 1 {
            param.message_count += 1;
            param.message_processed = 0;
        }
        usize::try_from(param.message_count)
            .ok()
            .filter(|slot| *slot < SLOT_COUNT)
    }

    pub fn set_content_length(&mut self, length: i64, flags: i32) {
        if let Some(slot) = self.current_slot(flags) {
            self.block.as_mut().content_length[slot] = length;
        }
    }

    pub fn set_chunked_encoding(&mut self, chunked: i8, flags: i32) {
        if let Some(slot) = self.current_slot(flags) {
            self.block.as_mut().chunked_encoding[slot] = chunked;
        }
    }

    pub fn inc_consumed_length(&mut self, delta: i64, flags: i32) {
        if let Some(slot) = self.current_slot(flags) {
            accumulate(&mut self.block.as_mut().consumed_length[slot], delta);
        }
    }

    pub fn inc_body_length(&mut self, delta: i64, flags: i32) {
        if let Some(slot) = self.current_slot(flags) {
            accumulate(&mut self.block.as_mut().body_length[slot], delta);
        }
    }

    pub fn mark_message_processed(&mut self, flags: i32) {
        if self.mode.matches(flags) {
            self.block.as_mut().message_processed = 1;
        }
    }
}

fn accumulate(field: &mut i64, delta: i64) {
    if *field == -1 {
        *field = 0;
    }
    *field = field.saturating_add(delta);
}

static GLOBAL: OnceCell<Mutex<Instrumentation<SharedParamBlock>>> = OnceCell::new();

fn with_global(f: impl FnOnce(&mut Instrumentation<SharedParamBlock>)) {
    if let Some(cell) = GLOBAL.get() {
        if let Ok(mut guard) = cell.lock() {
            f(&mut guard);
        }
    }
}

/// Attaches the process-wide instrumentation. Repeated calls are no-ops.
#[no_mangle]
pub extern "C" fn hdhunter_init() {
    if GLOBAL.get().is_some() {
        return;
    }
    match Instrumentation::from_env() {
        Ok(instrumentation) => {
            let _ = GLOBAL.set(Mutex::new(instrumentation));
        }
        Err(e) => error!("Instrumentation disabled: {}", e),
    }
}

#[no_mangle]
pub extern "C" fn hdhunter_set_content_length(length: i64, mode: i32) {
    with_global(|i| i.set_content_length(length, mode));
}

#[no_mangle]
pub extern "C" fn hdhunter_set_chunked_encoding(chunked: i8, mode: i32) {
    with_global(|i| i.set_chunked_encoding(chunked, mode));
}

#[no_mangle]
pub extern "C" fn hdhunter_inc_consumed_length(length: i64, mode: i32) {
    with_global(|i| i.inc_consumed_length(length, mode));
}

#[no_mangle]
pub extern "C" fn hdhunter_inc_body_length(length: i64, mode: i32) {
    with_global(|i| i.inc_body_length(length, mode));
}

#[no_mangle]
pub extern "C" fn hdhunter_mark_message_processed(mode: i32) {
    with_global(|i| i.mark_message_processed(mode));
}
