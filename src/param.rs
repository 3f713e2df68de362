// File: param.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use serde::{Deserialize, Serialize};
use std::mem::size_of;

/// Number of message slots in a block.
pub const SLOT_COUNT: usize = 10;

/// Per-iteration framing record shared between the target, the harness and
/// operator tooling.
///
/// The layout matches `http_param_t` from the C instrumentation header field
/// for field, so it can be placed in a shared memory segment and read by
/// processes that were not built from this crate. There is no locking: the
/// target-side instrumentation owns the framing columns, the scanner owns
/// `status` and `order`, and clearing between iterations is the operator's
/// job.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpParam {
    /// Declared `Content-Length`, `-1` when not seen.
    pub content_length: [i64; SLOT_COUNT],
    /// `1` when the message used chunked transfer coding.
    pub chunked_encoding: [i8; SLOT_COUNT],
    /// Bytes consumed from the wire for the message, `-1` when not seen.
    pub consumed_length: [i64; SLOT_COUNT],
    /// Body bytes delivered for the message, `-1` when not seen.
    pub body_length: [i64; SLOT_COUNT],
    pub message_count: i32,
    pub message_processed: i8,
    /// Status codes observed by the scanner, `0` marks an empty slot.
    pub status: [i16; SLOT_COUNT],
    /// Marker values observed by the scanner, `0` marks an empty slot.
    pub order: [i32; SLOT_COUNT],
}

impl HttpParam {
    pub const SIZE: usize = size_of::<HttpParam>();

    pub fn new() -> Self {
        let mut param = HttpParam {
            content_length: [0; SLOT_COUNT],
            chunked_encoding: [0; SLOT_COUNT],
            consumed_length: [0; SLOT_COUNT],
            body_length: [0; SLOT_COUNT],
            message_count: 0,
            message_processed: 0,
            status: [0; SLOT_COUNT],
            order: [0; SLOT_COUNT],
        };
        param.reset();
        param
    }

    /// Writes the "nothing seen" pattern over every field.
    pub fn reset(&mut self) {
        self.content_length = [-1; SLOT_COUNT];
        self.chunked_encoding = [0; SLOT_COUNT];
        self.consumed_length = [-1; SLOT_COUNT];
        self.body_length = [-1; SLOT_COUNT];
        self.message_count = 0;
        self.message_processed = 0;
        self.status = [0; SLOT_COUNT];
        self.order = [0; SLOT_COUNT];
    }

    /// Stores `code` in the first empty status slot. Returns `false` when all
    /// slots are taken and the value was dropped.
    pub fn record_status(&mut self, code: i16) -> bool {
        append_at_first_empty(&mut self.status, code)
    }

    /// Stores `id` in the first empty order slot. Returns `false` when all
    /// slots are taken and the value was dropped.
    pub fn record_order(&mut self, id: i32) -> bool {
        append_at_first_empty(&mut self.order, id)
    }

    pub fn recorded_statuses(&self) -> Vec<i16> {
        self.status.iter().copied().filter(|s| *s != 0).collect()
    }

    pub fn recorded_orders(&self) -> Vec<i32> {
        self.order.iter().copied().filter(|o| *o != 0).collect()
    }

    pub fn is_processed(&self) -> bool {
        self.message_processed != 0
    }
}

impl Default for HttpParam {
    fn default() -> Self {
        Self::new()
    }
}

fn append_at_first_empty<T>(slots: &mut [T], value: T) -> bool
where
    T: Copy + Default + PartialEq,
{
    match slots.iter_mut().find(|slot| **slot == T::default()) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

/// Destination for what the response scanner finds.
pub trait ParamSink {
    fn record_status(&mut self, code: i16) -> bool;
    fn record_order(&mut self, id: i32) -> bool;
}

impl ParamSink for HttpParam {
    fn record_status(&mut self, code: i16) -> bool {
        HttpParam::record_status(self, code)
    }

    fn record_order(&mut self, id: i32) -> bool {
        HttpParam::record_order(self, id)
    }
}

impl<T: ParamSink + ?Sized> ParamSink for &mut T {
    fn record_status(&mut self, code: i16) -> bool {
        (**self).record_status(code)
    }

    fn record_order(&mut self, id: i32) -> bool {
        (**self).record_order(id)
    }
}
