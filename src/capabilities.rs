// File: capabilities.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::{debug, info};
use once_cell::sync::OnceCell;

use crate::config::HarnessSettings;
use crate::error::HarnessResult;
use crate::shm::SharedParamBlock;
use crate::transport::FuzzTransport;

/// Outcome of the one-time environment setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub payload_buffer_size: usize,
    pub shm_id: libc::c_int,
}

static CONFIGURED: OnceCell<Capabilities> = OnceCell::new();

/// Negotiates with the transport and provisions the parameter block.
///
/// Runs at most once per process. Later calls return the first result
/// without touching the transport or the segment again. A failed attempt is
/// not cached.
pub fn configure<T>(transport: &mut T, settings: &HarnessSettings) -> HarnessResult<Capabilities>
where
    T: FuzzTransport + ?Sized,
{
    if let Some(caps) = CONFIGURED.get() {
        debug!("Capabilities already configured, reusing shmid {}", caps.shm_id);
        return Ok(*caps);
    }

    let caps = CONFIGURED.get_or_try_init(|| {
        let negotiation = transport.negotiate()?;
        let mut block = SharedParamBlock::create(settings.shm_key())?;
        block.reset();
        block.export_env();
        info!(
            "Parameter block ready (shmid {}), payload buffer {} bytes",
            block.id(),
            negotiation.payload_buffer_size
        );
        HarnessResult::Ok(Capabilities {
            payload_buffer_size: negotiation.payload_buffer_size,
            shm_id: block.id(),
        })
    })?;
    Ok(*caps)
}

/// The cached setup, if [`configure`] has succeeded in this process.
pub fn configured() -> Option<Capabilities> {
    CONFIGURED.get().copied()
}
