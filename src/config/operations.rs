//! Config loading, validation, and resolution.

use super::model::Config;
use crate::error::{GpuLockError, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "GPU_LOCK_CONFIG";

/// Host-wide config file, used when present and no override is given.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/gpu_lock/config.yaml";

impl Config {
    /// Load config from a YAML file.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(GpuLockError::UserError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            GpuLockError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| GpuLockError::UserError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            GpuLockError::UserError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Resolve the effective config for this process.
    ///
    /// Resolution order:
    /// 1. the file named by `GPU_LOCK_CONFIG` (must exist)
    /// 2. `/etc/gpu_lock/config.yaml` if it exists
    /// 3. built-in defaults
    pub fn resolve() -> Result<Self> {
        if let Some(path) = env::var_os(CONFIG_ENV_VAR) {
            return Self::load(PathBuf::from(path));
        }
        Self::resolve_from(Path::new(SYSTEM_CONFIG_PATH))
    }

    /// Load `path` if it exists, otherwise fall back to defaults.
    pub fn resolve_from(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `lock_dir` must be non-empty
    /// - `pool_size` must be positive
    /// - `busy_threshold` must lie in `[0, 1]`
    /// - `nvidia_smi` must be non-empty
    pub fn validate(&self) -> Result<()> {
        if self.lock_dir.as_os_str().is_empty() {
            return Err(GpuLockError::UserError(
                "config validation failed: lock_dir must not be empty".to_string(),
            ));
        }

        if self.pool_size == 0 {
            return Err(GpuLockError::UserError(
                "config validation failed: pool_size must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.busy_threshold) {
            return Err(GpuLockError::UserError(format!(
                "config validation failed: busy_threshold must be between 0 and 1 (found {})",
                self.busy_threshold
            )));
        }

        if self.nvidia_smi.trim().is_empty() {
            return Err(GpuLockError::UserError(
                "config validation failed: nvidia_smi must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
