//! Lock context resolution for gpu-lock.
//!
//! A [`LockContext`] bundles everything a lock operation needs: the resolved
//! config, the identity of the acquiring process, the utilization oracle and
//! the visibility manager. It is cheap to clone; every lock keeps its own copy.

use crate::config::Config;
use crate::error::{GpuLockError, Result};
use crate::locks::record::lock_file_name;
use crate::oracle::{DeviceOracle, NoOracle, NvidiaSmiOracle};
use crate::visibility::VisibilityManager;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The principal acquiring locks: a user name and an OS process id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: String,
    pub pid: u32,
}

impl Identity {
    /// Identity of the running process.
    pub fn current() -> Self {
        Self {
            user: current_user(),
            pid: std::process::id(),
        }
    }
}

/// Get the login name of the running process.
pub(crate) fn current_user() -> String {
    ["USER", "LOGNAME", "USERNAME"]
        .iter()
        .find_map(|key| env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Shared state for lock operations.
#[derive(Clone)]
pub struct LockContext {
    pub config: Config,
    pub identity: Identity,
    oracle: Arc<dyn DeviceOracle>,
    visibility: Arc<VisibilityManager>,
}

impl LockContext {
    /// Build a context from a validated config.
    ///
    /// Wires the `nvidia-smi` oracle (or [`NoOracle`] when the utilization
    /// check is disabled) and the process-wide visibility manager.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let oracle: Arc<dyn DeviceOracle> = if config.check_utilization {
            Arc::new(NvidiaSmiOracle::new(config.nvidia_smi.clone()))
        } else {
            Arc::new(NoOracle)
        };

        Ok(Self {
            config,
            identity: Identity::current(),
            oracle,
            visibility: VisibilityManager::process(),
        })
    }

    /// Build a context from [`Config::resolve`].
    pub fn resolve() -> Result<Self> {
        Self::new(Config::resolve()?)
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn DeviceOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    pub fn with_visibility(mut self, visibility: Arc<VisibilityManager>) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = identity;
        self
    }

    pub fn oracle(&self) -> &dyn DeviceOracle {
        self.oracle.as_ref()
    }

    pub fn visibility(&self) -> &Arc<VisibilityManager> {
        &self.visibility
    }

    pub fn lock_dir(&self) -> &Path {
        &self.config.lock_dir
    }

    /// Path of the lock record for `device`.
    pub fn lock_path(&self, device: u32) -> PathBuf {
        self.config.lock_dir.join(lock_file_name(device))
    }

    /// Candidate device ids, ascending.
    pub fn pool(&self) -> std::ops::Range<u32> {
        0..self.config.pool_size
    }

    /// Create the shared lock directory if it does not exist yet.
    ///
    /// The directory is made world-accessible regardless of the umask, since
    /// unrelated users coordinate through it.
    pub fn ensure_lock_dir(&self) -> Result<()> {
        let dir = self.lock_dir();
        match std::fs::create_dir(dir) {
            Ok(()) => {
                crate::locks::record::make_world_accessible(dir)?;
                log::debug!("Created lock directory {}", dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(GpuLockError::UserError(format!(
                "failed to create lock directory '{}': {}",
                dir.display(),
                e
            ))),
        }
    }
}

impl std::fmt::Debug for LockContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockContext")
            .field("config", &self.config)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{env_lock, test_context};

    #[test]
    fn current_identity_uses_own_pid() {
        let identity = {
            let _env = env_lock();
            Identity::current()
        };
        assert_eq!(identity.pid, std::process::id());
        assert!(!identity.user.is_empty());
    }

    #[test]
    fn lock_path_is_derived_from_device_id() {
        let (_temp_dir, ctx) = test_context(4);
        assert_eq!(ctx.lock_path(3), ctx.lock_dir().join("gpu_3.json"));
    }

    #[test]
    fn pool_covers_configured_size() {
        let (_temp_dir, ctx) = test_context(4);
        assert_eq!(ctx.pool().collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn ensure_lock_dir_is_idempotent() {
        let (_temp_dir, ctx) = test_context(2);
        ctx.ensure_lock_dir().unwrap();
        ctx.ensure_lock_dir().unwrap();
        assert!(ctx.lock_dir().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn lock_dir_is_world_accessible() {
        use std::os::unix::fs::PermissionsExt;

        let (_temp_dir, ctx) = test_context(2);
        ctx.ensure_lock_dir().unwrap();
        let mode = std::fs::metadata(ctx.lock_dir()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = Config {
            pool_size: 0,
            ..Config::default()
        };
        assert!(LockContext::new(config).is_err());
    }
}
