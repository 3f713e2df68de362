// File: shm.rs
// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Copyright (c) 2025
// - Volker Schwaberow <volker@schwaberow.de>

use log::debug;
use std::ptr::{self, NonNull};

use crate::error::{HarnessError, HarnessResult};
use crate::param::{HttpParam, ParamSink};

/// Well-known SysV key of the parameter block segment.
pub const HTTP_PARAM_KEY: libc::key_t = 0x1338;
/// Segment size provisioned for the block; the block only uses the front.
pub const SEGMENT_SIZE: usize = 0x1000;

pub const ENV_SHM_ID: &str = "__HTTP_PARAM";
pub const ENV_SHM_SIZE: &str = "__HTTP_PARAM_SIZE";

/// A parameter block living in a SysV shared memory segment.
///
/// Field access is plain, non-atomic memory access. Any synchronization
/// between independent writers is up to the processes involved.
/// Dropping the value detaches the mapping; the segment itself survives
/// until [`SharedParamBlock::remove`] is called.
#[derive(Debug)]
pub struct SharedParamBlock {
    id: libc::c_int,
    ptr: NonNull<HttpParam>,
}

// The mapping is process-wide; moving the handle between threads is fine.
unsafe impl Send for SharedParamBlock {}

impl SharedParamBlock {
    /// Creates the segment for `key` if needed and attaches to it.
    pub fn create(key: libc::key_t) -> HarnessResult<Self> {
        let id = unsafe { libc::shmget(key, SEGMENT_SIZE, libc::IPC_CREAT | 0o666) };
        if id < 0 {
            return Err(HarnessError::shm("shmget"));
        }
        debug!("Parameter block segment key {:#x} has shmid {}", key, id);
        Self::attach_id(id)
    }

    /// Attaches to an existing segment by key.
    pub fn attach(key: libc::key_t) -> HarnessResult<Self> {
        let id = unsafe { libc::shmget(key, 0, 0o666) };
        if id < 0 {
            return Err(HarnessError::shm("shmget"));
        }
        Self::attach_id(id)
    }

    /// Attaches to the segment advertised in `__HTTP_PARAM`.
    pub fn from_env() -> HarnessResult<Self> {
        let raw = std::env::var(ENV_SHM_ID).map_err(|_| HarnessError::SharedMemory {
            operation: "env",
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} is not set", ENV_SHM_ID),
            ),
        })?;
        let id = raw.trim().parse::<libc::c_int>().map_err(|e| {
            HarnessError::SharedMemory {
                operation: "env",
                source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
            }
        })?;
        Self::attach_id(id)
    }

    pub fn attach_id(id: libc::c_int) -> HarnessResult<Self> {
        let size = segment_size(id)?;
        if size < HttpParam::SIZE {
            return Err(HarnessError::SharedMemory {
                operation: "shmat",
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!(
                        "segment {} holds {} bytes, block needs {}",
                        id,
                        size,
                        HttpParam::SIZE
                    ),
                ),
            });
        }

        let addr = unsafe { libc::shmat(id, ptr::null(), 0) };
        if addr as isize == -1 {
            return Err(HarnessError::shm("shmat"));
        }
        let ptr = NonNull::new(addr as *mut HttpParam).ok_or_else(|| HarnessError::shm("shmat"))?;
        Ok(SharedParamBlock { id, ptr })
    }

    /// Marks the segment for deletion once every process has detached.
    pub fn remove(key: libc::key_t) -> HarnessResult<()> {
        let id = unsafe { libc::shmget(key, 0, 0o666) };
        if id < 0 {
            return Err(HarnessError::shm("shmget"));
        }
        Self::remove_id(id)
    }

    pub fn remove_id(id: libc::c_int) -> HarnessResult<()> {
        let ret = unsafe { libc::shmctl(id, libc::IPC_RMID, ptr::null_mut()) };
        if ret < 0 {
            return Err(HarnessError::shm("shmctl"));
        }
        Ok(())
    }

    pub fn id(&self) -> libc::c_int {
        self.id
    }

    /// Copies the current contents out of the segment.
    pub fn snapshot(&self) -> HttpParam {
        unsafe { ptr::read_volatile(self.ptr.as_ptr()) }
    }

    pub fn block_mut(&mut self) -> &mut HttpParam {
        unsafe { self.ptr.as_mut() }
    }

    pub fn reset(&mut self) {
        self.block_mut().reset();
    }

    /// Publishes the segment id the way the instrumentation runtime expects.
    pub fn export_env(&self) {
        std::env::set_var(ENV_SHM_ID, self.id.to_string());
        std::env::set_var(ENV_SHM_SIZE, SEGMENT_SIZE.to_string());
    }
}

impl ParamSink for SharedParamBlock {
    fn record_status(&mut self, code: i16) -> bool {
        self.block_mut().record_status(code)
    }

    fn record_order(&mut self, id: i32) -> bool {
        self.block_mut().record_order(id)
    }
}

impl Drop for SharedParamBlock {
    fn drop(&mut self) {
        let ret = unsafe { libc::shmdt(self.ptr.as_ptr() as *const libc::c_void) };
        if ret < 0 {
            debug!(
                "Failed to detach parameter block {}: {}",
                self.id,
                std::io::Error::last_os_error()
            );
        }
    }
}

fn segment_size(id: libc::c_int) -> HarnessResult<usize> {
    let mut stat: libc::shmid_ds = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::shmctl(id, libc::IPC_STAT, &mut stat) };
    if ret < 0 {
        return Err(HarnessError::shm("shmctl"));
    }
    Ok(stat.shm_segsz as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_private_segment_is_shared_between_attachments() {
        let mut writer = SharedParamBlock::create(libc::IPC_PRIVATE).unwrap();
        let id = writer.id();
        writer.reset();
        writer.record_status(200);
        writer.block_mut().content_length[0] = 30;

        let reader = SharedParamBlock::attach_id(id).unwrap();
        let seen = reader.snapshot();
        assert_eq!(seen.recorded_statuses(), vec![200]);
        assert_eq!(seen.content_length[0], 30);
        assert_eq!(seen.content_length[1], -1);

        drop(reader);
        drop(writer);
        SharedParamBlock::remove_id(id).unwrap();
    }

    #[test]
    #[serial]
    fn test_attach_to_missing_id_fails() {
        let err = SharedParamBlock::attach_id(-1).unwrap_err();
        assert!(matches!(err, HarnessError::SharedMemory { .. }));
    }
}
