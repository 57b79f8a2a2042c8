//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for GPU locking on one host.
///
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock settings
    // =========================================================================
    /// Directory holding one `gpu_<id>.json` record per claimed device.
    /// Must be writable by every user that shares the host.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// Number of devices in the system; candidate ids are `0..pool_size`.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    // =========================================================================
    // Utilization cross-check
    // =========================================================================
    /// Whether to refuse devices that are busy without holding a lock record.
    #[serde(default = "default_true")]
    pub check_utilization: bool,

    /// Load and memory fraction above which an unlocked device counts as busy.
    #[serde(default = "default_busy_threshold")]
    pub busy_threshold: f64,

    /// Executable used to query device utilization.
    #[serde(default = "default_nvidia_smi")]
    pub nvidia_smi: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_dir: default_lock_dir(),
            pool_size: default_pool_size(),
            check_utilization: default_true(),
            busy_threshold: default_busy_threshold(),
            nvidia_smi: default_nvidia_smi(),
        }
    }
}
