//! gpu-lock: mutual exclusion for GPUs shared between processes and users
//! on one host, coordinated through lock files instead of a daemon.
//!
//! ```no_run
//! use gpu_lock::{LockContext, lock_gpu};
//!
//! let ctx = LockContext::resolve()?;
//! let lock = lock_gpu(&ctx, 2)?;
//! lock.scoped(|held| {
//!     println!("training on GPUs {:?}", held.devices());
//!     Ok(())
//! })?;
//! # Ok::<(), gpu_lock::GpuLockError>(())
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod exit_codes;
pub mod locks;
pub mod oracle;
pub mod visibility;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use context::{Identity, LockContext};
pub use error::{GpuLockError, Result};
pub use locks::{GpuLock, lock_device, lock_gpu};
