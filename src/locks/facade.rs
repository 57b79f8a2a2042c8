//! Entry points choosing between single- and multi-device acquisition.

use super::device::DeviceLock;
use super::multi::MultiDeviceLock;
use crate::context::LockContext;
use crate::error::{GpuLockError, Result};

/// A claim on one or more devices with a uniform enter/exit contract.
#[derive(Debug)]
pub enum GpuLock {
    Single(DeviceLock),
    Multi(MultiDeviceLock),
}

impl GpuLock {
    /// Claimed device ids, ascending.
    pub fn devices(&self) -> Vec<u32> {
        match self {
            GpuLock::Single(lock) => vec![lock.device()],
            GpuLock::Multi(lock) => lock.devices(),
        }
    }

    /// Advertise the claimed devices as visible.
    pub fn enter(&mut self) -> Result<()> {
        match self {
            GpuLock::Single(lock) => lock.enter(),
            GpuLock::Multi(lock) => lock.enter(),
        }
    }

    /// Withdraw visibility and delete the lock records.
    pub fn exit(&mut self) -> Result<()> {
        match self {
            GpuLock::Single(lock) => lock.exit(),
            GpuLock::Multi(lock) => lock.exit(),
        }
    }

    /// Enter, run `f`, and exit on every path.
    ///
    /// An error from `f` takes precedence over an error from exiting.
    pub fn scoped<T, F>(mut self, f: F) -> Result<T>
    where
        F: FnOnce(&GpuLock) -> Result<T>,
    {
        self.enter()?;
        let result = f(&self);
        let exited = self.exit();

        let value = result?;
        exited?;
        Ok(value)
    }
}

/// Lock `count` devices from the configured pool.
///
/// With `count == 1` the lowest free id wins; otherwise the request is
/// delegated to [`MultiDeviceLock::acquire`]. The returned lock is held but
/// not yet entered.
///
/// # Returns
///
/// * `Ok(GpuLock)` - The requested devices are claimed
/// * `Err(GpuLockError::AllBusy)` - No single device was free
/// * `Err(GpuLockError::InsufficientResources)` - Fewer than `count` were free
pub fn lock_gpu(ctx: &LockContext, count: usize) -> Result<GpuLock> {
    match count {
        0 => Err(GpuLockError::UserError(
            "at least one GPU must be requested".to_string(),
        )),
        1 => {
            for device in ctx.pool() {
                let mut lock = DeviceLock::new(ctx, device)?;
                match lock.acquire() {
                    Ok(()) => return Ok(GpuLock::Single(lock)),
                    Err(e) if e.is_skippable() => {
                        log::info!("Could not acquire lock on GPU {}: {}", device, e);
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(GpuLockError::AllBusy {
                pool_size: ctx.config.pool_size,
            })
        }
        n => MultiDeviceLock::acquire(ctx, n).map(GpuLock::Multi),
    }
}

/// Lock one specific device.
pub fn lock_device(ctx: &LockContext, device: u32) -> Result<GpuLock> {
    let mut lock = DeviceLock::new(ctx, device)?;
    lock.acquire()?;
    Ok(GpuLock::Single(lock))
}
