//! Defaults for the Config struct.

use std::path::PathBuf;

/// Default shared lock directory.
pub const DEFAULT_LOCK_DIR: &str = "/var/tmp/gpu_lock";

pub(crate) fn default_lock_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOCK_DIR)
}
pub(crate) fn default_pool_size() -> u32 {
    8
}
pub(crate) fn default_busy_threshold() -> f64 {
    0.1
}
pub(crate) fn default_nvidia_smi() -> String {
    "nvidia-smi".to_string()
}
pub(crate) fn default_true() -> bool {
    true
}
