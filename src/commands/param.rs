// File: param.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use anyhow::{Context, Result};

use super::{display_param_block, print_info, print_json, print_success};
use crate::cli::{ParamAction, ParamArgs};
use crate::shm::{SharedParamBlock, SEGMENT_SIZE};

pub async fn execute(args: &ParamArgs) -> Result<()> {
    let key = args.key;
    match &args.action {
        ParamAction::Create => {
            let mut block = SharedParamBlock::create(key)
                .with_context(|| format!("Failed to create segment for key {:#x}", key))?;
            block.reset();
            print_success(&format!(
                "Parameter block created (key {:#x}, shmid {}, {} bytes)",
                key,
                block.id(),
                SEGMENT_SIZE
            ));
            print_info(&format!(
                "export __HTTP_PARAM={} __HTTP_PARAM_SIZE={}",
                block.id(),
                SEGMENT_SIZE
            ));
        }
        ParamAction::Show { json } => {
            let block = attach(key)?;
            let snapshot = block.snapshot();
            if *json {
                print_json(&snapshot)?;
            } else {
                print_info(&format!("Parameter block key {:#x}, shmid {}", key, block.id()));
                display_param_block(&snapshot);
            }
        }
        ParamAction::Clear => {
            let mut block = attach(key)?;
            block.reset();
            print_success("Parameter block cleared");
        }
        ParamAction::Delete => {
            SharedParamBlock::remove(key)
                .with_context(|| format!("Failed to remove segment for key {:#x}", key))?;
            print_success(&format!("Segment for key {:#x} marked for removal", key));
        }
    }
    Ok(())
}

fn attach(key: libc::key_t) -> Result<SharedParamBlock> {
    SharedParamBlock::attach(key).with_context(|| {
        format!(
            "No parameter block for key {:#x}; run `param create` first",
            key
        )
    })
}
