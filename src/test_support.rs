use crate::config::Config;
use crate::context::LockContext;
use crate::error::Result;
use crate::locks::LockRecord;
use crate::oracle::{DeviceOracle, DeviceUtilization};
use crate::visibility::VisibilityManager;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use tempfile::TempDir;

static ENV_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Hold while reading or writing process environment variables.
///
/// `set_var` is not thread-safe against concurrent readers (including
/// `Command::spawn`), so every test that touches the environment takes this
/// lock even if a `#[serial]` annotation is missed.
pub(crate) fn env_lock() -> MutexGuard<'static, ()> {
    ENV_LOCK.lock().unwrap_or_else(|poison| poison.into_inner())
}

/// A pid above the kernel's `pid_max` ceiling (2^22), never alive.
pub(crate) const DEAD_PID: u32 = 99_999_999;

/// init: always alive, and never the test process itself.
pub(crate) const LIVE_FOREIGN_PID: u32 = 1;

/// Oracle with scripted readings. Unscripted devices are present and idle.
#[derive(Debug, Default)]
pub(crate) struct FakeOracle {
    readings: Mutex<HashMap<u32, DeviceUtilization>>,
    absent: Mutex<HashSet<u32>>,
}

impl FakeOracle {
    pub(crate) fn set(&self, device: u32, load: f64, memory: f64) {
        self.readings
            .lock()
            .unwrap()
            .insert(device, DeviceUtilization { load, memory });
    }

    pub(crate) fn set_absent(&self, device: u32) {
        self.absent.lock().unwrap().insert(device);
    }
}

impl DeviceOracle for FakeOracle {
    fn utilization(&self, device: u32) -> Result<Option<DeviceUtilization>> {
        if self.absent.lock().unwrap().contains(&device) {
            return Ok(None);
        }
        Ok(Some(
            self.readings
                .lock()
                .unwrap()
                .get(&device)
                .copied()
                .unwrap_or(DeviceUtilization {
                    load: 0.0,
                    memory: 0.0,
                }),
        ))
    }
}

/// Idle oracle that runs a callback during its first query, i.e. in the
/// middle of an availability check.
pub(crate) struct HookOracle {
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl HookOracle {
    pub(crate) fn new(hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            hook: Mutex::new(Some(Box::new(hook))),
        }
    }
}

impl DeviceOracle for HookOracle {
    fn utilization(&self, _device: u32) -> Result<Option<DeviceUtilization>> {
        let hook = self.hook.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        Ok(Some(DeviceUtilization {
            load: 0.0,
            memory: 0.0,
        }))
    }
}

/// A context over a fresh lock directory, an idle fake oracle and a
/// private visibility environment.
pub(crate) fn test_context(pool_size: u32) -> (TempDir, LockContext) {
    let (temp_dir, ctx, _oracle) = test_context_with_oracle(pool_size);
    (temp_dir, ctx)
}

pub(crate) fn test_context_with_oracle(
    pool_size: u32,
) -> (TempDir, LockContext, Arc<FakeOracle>) {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        lock_dir: temp_dir.path().join("gpu_lock"),
        pool_size,
        check_utilization: false,
        ..Config::default()
    };

    let oracle = Arc::new(FakeOracle::default());
    let ctx = {
        let _env = env_lock();
        LockContext::new(config).unwrap()
    };
    let ctx = ctx
        .with_oracle(oracle.clone())
        .with_visibility(Arc::new(VisibilityManager::in_memory()));

    (temp_dir, ctx, oracle)
}

/// Write a record as if another process had claimed `device`.
pub(crate) fn write_foreign_record(ctx: &LockContext, device: u32, owner: u32) -> LockRecord {
    ctx.ensure_lock_dir().unwrap();
    let record = LockRecord {
        user: "someone-else".to_string(),
        time: 1_600_000_000,
        uid: device,
        owner,
        version: Some("0.0.1".to_string()),
    };
    std::fs::write(ctx.lock_path(device), record.to_json().unwrap()).unwrap();
    record
}

/// Number of lock records currently on disk.
pub(crate) fn record_count(ctx: &LockContext) -> usize {
    crate::locks::list_locks(ctx).unwrap().len()
}
