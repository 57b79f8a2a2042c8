//! Multi-device lock aggregation.

use super::device::DeviceLock;
use crate::context::LockContext;
use crate::error::{GpuLockError, Result};

/// Exclusive claim on several devices at once.
///
/// Exists only when every requested device was claimed; a failed
/// acquisition releases whatever it had claimed before returning.
#[derive(Debug)]
pub struct MultiDeviceLock {
    locks: Vec<DeviceLock>,
}

impl MultiDeviceLock {
    /// Claim `count` devices, scanning the pool in ascending id order.
    ///
    /// Busy devices are skipped. Any other failure aborts the scan.
    ///
    /// # Returns
    ///
    /// * `Ok(MultiDeviceLock)` - Exactly `count` records were created
    /// * `Err(GpuLockError::InsufficientResources)` - The pool ran out first
    pub fn acquire(ctx: &LockContext, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(GpuLockError::UserError(
                "at least one GPU must be requested".to_string(),
            ));
        }

        let mut locks = Vec::with_capacity(count);
        if let Err(e) = claim_from_pool(ctx, count, &mut locks) {
            release_all(locks);
            return Err(e);
        }

        if locks.len() < count {
            let acquired = locks.len();
            release_all(locks);
            return Err(GpuLockError::InsufficientResources {
                requested: count,
                acquired,
                pool_size: ctx.config.pool_size,
            });
        }

        Ok(Self { locks })
    }

    /// Claimed device ids, ascending.
    pub fn devices(&self) -> Vec<u32> {
        self.locks.iter().map(DeviceLock::device).collect()
    }

    /// Advertise every claimed device.
    ///
    /// If one entry fails, the locks entered so far are exited again.
    pub fn enter(&mut self) -> Result<()> {
        for i in 0..self.locks.len() {
            if let Err(e) = self.locks[i].enter() {
                for lock in &mut self.locks[..i] {
                    if let Err(unwind) = lock.exit() {
                        log::warn!("failed to release GPU {} lock: {}", lock.device(), unwind);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Exit every lock, reporting the first failure after trying them all.
    pub fn exit(&mut self) -> Result<()> {
        let mut first_err = None;
        for lock in &mut self.locks {
            if let Err(e) = lock.exit() {
                log::warn!("failed to release GPU {} lock: {}", lock.device(), e);
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

fn claim_from_pool(ctx: &LockContext, count: usize, locks: &mut Vec<DeviceLock>) -> Result<()> {
    for device in ctx.pool() {
        if locks.len() == count {
            break;
        }

        let mut lock = DeviceLock::new(ctx, device)?;
        match lock.acquire() {
            Ok(()) => locks.push(lock),
            Err(e) if e.is_skippable() => {
                log::info!("Could not acquire lock on GPU {}: {}", device, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn release_all(locks: Vec<DeviceLock>) {
    for mut lock in locks {
        if let Err(e) = lock.release() {
            log::warn!("failed to release GPU {} lock: {}", lock.device(), e);
        }
    }
}
