//! Locking subsystem for gpu-lock.
//!
//! Each GPU is claimed through one JSON lock record in a shared,
//! world-writable directory (default `/var/tmp/gpu_lock/`). There is no
//! daemon: processes coordinate through the records alone.
//!
//! # Lock Records
//!
//! `gpu_<id>.json` holds:
//! - `user`: login name of the holder
//! - `time`: acquisition time (seconds since the epoch)
//! - `uid`: the device id
//! - `owner`: process id of the holder
//! - `version`: producer version (informational)
//!
//! A record whose owner process no longer exists is stale and may be
//! reclaimed by anyone. A record owned by the acquiring process itself is
//! renewed. Records are created with **create_new** semantics, so two
//! processes racing for the same device cannot both succeed.
//!
//! # Scoped Locks
//!
//! Locks are returned held but not entered. `enter` advertises the devices
//! in `CUDA_VISIBLE_DEVICES`; `exit` (or dropping the lock) withdraws them and
//! deletes the records.

mod device;
mod facade;
pub mod liveness;
mod multi;
mod operations;
pub mod record;


// Re-export public API
pub use device::{Availability, DeviceLock};
pub use facade::{GpuLock, lock_device, lock_gpu};
pub use multi::MultiDeviceLock;
pub use operations::{LockInfo, LockStatus, clear_lock, list_locks};
pub use record::LockRecord;
