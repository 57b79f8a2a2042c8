//! Error types for gpu-lock.
//!
//! Uses thiserror for derive macros. Every variant carries enough context
//! (device id, current holder, offending path) for callers to log or retry.

use crate::exit_codes;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gpu-lock operations.
#[derive(Error, Debug)]
pub enum GpuLockError {
    /// A live, foreign lock record (or an external workload) blocks the device.
    #[error("GPU {device} is locked by {holder}")]
    ResourceBusy { device: u32, holder: String },

    /// Fewer devices than requested could be claimed from the pool.
    #[error(
        "could not acquire {requested} GPUs from a pool of {pool_size} ({acquired} available). Too many GPUs are busy"
    )]
    InsufficientResources {
        requested: usize,
        acquired: usize,
        pool_size: u32,
    },

    /// Every device in the pool is busy.
    #[error("could not acquire a lock: all {pool_size} GPUs are busy")]
    AllBusy { pool_size: u32 },

    /// An existing lock record could not be parsed. The file is left untouched.
    #[error("corrupt lock record '{}': {}", .path.display(), .reason)]
    CorruptState { path: PathBuf, reason: String },

    /// The named environment entry is not set.
    #[error("environment variable {0} is not set")]
    NotConfigured(String),

    /// The utilization oracle does not report this device.
    #[error("GPU {0} is not reported by the device query")]
    UnknownDevice(u32),

    /// The utilization oracle could not be queried.
    #[error("device query failed: {0}")]
    OracleError(String),

    /// Invalid arguments, configuration, or filesystem failure.
    #[error("{0}")]
    UserError(String),
}

impl GpuLockError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            GpuLockError::ResourceBusy { .. }
            | GpuLockError::InsufficientResources { .. }
            | GpuLockError::AllBusy { .. }
            | GpuLockError::UnknownDevice(_) => exit_codes::LOCK_FAILURE,
            GpuLockError::CorruptState { .. } => exit_codes::CORRUPT_STATE,
            GpuLockError::OracleError(_) => exit_codes::ORACLE_FAILURE,
            GpuLockError::NotConfigured(_) | GpuLockError::UserError(_) => exit_codes::USER_ERROR,
        }
    }

    /// Whether retrying later (or with another device) may succeed.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            GpuLockError::ResourceBusy { .. }
                | GpuLockError::InsufficientResources { .. }
                | GpuLockError::AllBusy { .. }
                | GpuLockError::UnknownDevice(_)
        )
    }

    /// Whether a pool scan should move on to the next candidate device.
    pub(crate) fn is_skippable(&self) -> bool {
        matches!(
            self,
            GpuLockError::ResourceBusy { .. } | GpuLockError::UnknownDevice(_)
        )
    }
}

/// Result type alias for gpu-lock operations.
pub type Result<T> = std::result::Result<T, GpuLockError>;
