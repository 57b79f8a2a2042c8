//! Lock directory inspection and clearing.

use super::liveness::is_pid_alive;
use super::record::{LockRecord, parse_lock_file_name};
use crate::context::LockContext;
use crate::error::{GpuLockError, Result};
use std::fmt;
use std::fs;
use std::path::PathBuf;

/// State of a record found in the lock directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    /// The owning process is alive.
    Held,
    /// The owning process is gone; the next acquirer will reclaim it.
    Stale,
    /// The record does not parse.
    Corrupt(String),
}

/// Information about one lock record.
#[derive(Debug, Clone)]
pub struct LockInfo {
    pub device: u32,
    pub path: PathBuf,
    /// The parsed record, absent when corrupt.
    pub record: Option<LockRecord>,
    pub status: LockStatus,
}

impl LockInfo {
    fn inspect(device: u32, path: PathBuf) -> Result<Option<Self>> {
        let (record, status) = match LockRecord::read(&path) {
            Ok(Some(record)) => {
                let status = if is_pid_alive(record.owner) {
                    LockStatus::Held
                } else {
                    LockStatus::Stale
                };
                (Some(record), status)
            }
            // Released between listing and reading
            Ok(None) => return Ok(None),
            Err(GpuLockError::CorruptState { reason, .. }) => (None, LockStatus::Corrupt(reason)),
            Err(e) => return Err(e),
        };

        Ok(Some(Self {
            device,
            path,
            record,
            status,
        }))
    }
}

impl fmt::Display for LockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.record, &self.status) {
            (Some(record), status) => write!(
                f,
                "GPU {} (holder: {}, age: {}{})",
                self.device,
                record.holder(),
                record.age_string(),
                if *status == LockStatus::Stale {
                    ", STALE"
                } else {
                    ""
                }
            ),
            (None, LockStatus::Corrupt(reason)) => {
                write!(f, "GPU {} (CORRUPT: {})", self.device, reason)
            }
            (None, _) => write!(f, "GPU {}", self.device),
        }
    }
}

/// List every lock record in the lock directory, sorted by device id.
pub fn list_locks(ctx: &LockContext) -> Result<Vec<LockInfo>> {
    let mut locks = Vec::new();

    if !ctx.lock_dir().exists() {
        return Ok(locks);
    }

    let entries = fs::read_dir(ctx.lock_dir()).map_err(|e| {
        GpuLockError::UserError(format!(
            "failed to read lock directory '{}': {}",
            ctx.lock_dir().display(),
            e
        ))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            GpuLockError::UserError(format!("failed to read lock directory entry: {}", e))
        })?;

        let Some(device) = entry.file_name().to_str().and_then(parse_lock_file_name) else {
            continue;
        };

        if let Some(info) = LockInfo::inspect(device, entry.path())? {
            locks.push(info);
        }
    }

    locks.sort_by_key(|l| l.device);
    Ok(locks)
}

/// Remove the lock record for `device`.
///
/// Stale and corrupt records are always cleared. A record whose owner is
/// alive is only cleared with `force`, since its holder may still be using
/// the device.
///
/// # Returns
///
/// * `Ok(LockInfo)` - The cleared record
/// * `Err(GpuLockError::UserError)` - No record, or a live record without `force`
pub fn clear_lock(ctx: &LockContext, device: u32, force: bool) -> Result<LockInfo> {
    let path = ctx.lock_path(device);

    let info = LockInfo::inspect(device, path.clone())?.ok_or_else(|| {
        GpuLockError::UserError(format!(
            "no lock record for GPU {} at: {}",
            device,
            path.display()
        ))
    })?;

    if info.status == LockStatus::Held && !force {
        let holder = info
            .record
            .as_ref()
            .map(LockRecord::holder)
            .unwrap_or_default();
        return Err(GpuLockError::UserError(format!(
            "refusing to clear GPU {} lock held by live process {} without --force",
            device, holder
        )));
    }

    fs::remove_file(&path).map_err(|e| {
        GpuLockError::UserError(format!(
            "failed to clear lock '{}': {}",
            path.display(),
            e
        ))
    })?;

    log::info!("Cleared GPU {} lock", device);
    Ok(info)
}
