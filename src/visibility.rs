//! Device visibility environment.
//!
//! Two environment entries advertise which GPUs the current process and its
//! children may use:
//! - `CUDA_DEVICE_ORDER` pinned to `PCI_BUS_ID`, so device ids mean the same
//!   thing in every process on the host
//! - `CUDA_VISIBLE_DEVICES`, a comma-separated list of device ids
//!
//! All reads and writes go through a [`VisibilityManager`]. Each update is a
//! read-modify-write performed while holding the manager's mutex, so locks
//! held side by side in one process add and remove only their own id and
//! never clobber a sibling's entry.

use crate::error::{GpuLockError, Result};
use std::collections::{BTreeSet, HashMap};
use std::env;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

/// Environment entry fixing the device enumeration order.
pub const DEVICE_ORDER_VAR: &str = "CUDA_DEVICE_ORDER";

/// Enumeration order shared by every process on the host.
pub const DEVICE_ORDER: &str = "PCI_BUS_ID";

/// Environment entry listing the visible device ids.
pub const VISIBLE_DEVICES_VAR: &str = "CUDA_VISIBLE_DEVICES";

static PROCESS_MANAGER: LazyLock<Arc<VisibilityManager>> =
    LazyLock::new(|| Arc::new(VisibilityManager::new(Backend::Process)));

/// A set of visible device ids.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibleDevices(BTreeSet<String>);

impl VisibleDevices {
    /// Parse a comma-separated list, ignoring whitespace and empty entries.
    pub fn parse(value: &str) -> Self {
        Self(
            value
                .split(',')
                .map(|id| id.trim())
                .filter(|id| !id.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn insert(&mut self, id: impl Into<String>) -> bool {
        self.0.insert(id.into())
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.0.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Ids in advertised order: numeric ids ascending, then anything else.
    pub fn ordered(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.0.iter().map(String::as_str).collect();
        ids.sort_by_key(|id| (id.parse::<u32>().map_err(|_| ()), *id));
        ids
    }
}

impl fmt::Display for VisibleDevices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ordered().join(","))
    }
}

impl<S: Into<String>> FromIterator<S> for VisibleDevices {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug)]
enum Backend {
    /// The real process environment, inherited by spawned children.
    Process,
    /// A private map, for tests and embedders that spawn children explicitly.
    Memory(HashMap<String, String>),
}

impl Backend {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self {
            Backend::Process => match env::var(key) {
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(env::VarError::NotUnicode(_)) => Err(GpuLockError::UserError(format!(
                    "environment variable {} is not valid unicode",
                    key
                ))),
            },
            Backend::Memory(vars) => Ok(vars.get(key).cloned()),
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        match self {
            // SAFETY: every write goes through the manager's mutex; the
            // process backend is a single shared instance.
            Backend::Process => unsafe { env::set_var(key, value) },
            Backend::Memory(vars) => {
                vars.insert(key.to_string(), value.to_string());
            }
        }
    }
}

/// Serialized access to the visible-device environment.
#[derive(Debug)]
pub struct VisibilityManager {
    backend: Mutex<Backend>,
}

impl VisibilityManager {
    fn new(backend: Backend) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// The manager for the real process environment.
    ///
    /// There is exactly one per process, shared by every lock.
    pub fn process() -> Arc<Self> {
        Arc::clone(&PROCESS_MANAGER)
    }

    /// A manager over a private, initially empty environment.
    pub fn in_memory() -> Self {
        Self::new(Backend::Memory(HashMap::new()))
    }

    fn backend(&self) -> MutexGuard<'_, Backend> {
        self.backend
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Read the currently advertised set.
    ///
    /// Fails with `NotConfigured` when the entry is unset; callers merging
    /// into the set treat that as empty.
    pub fn read_visible(&self) -> Result<VisibleDevices> {
        read_visible(&self.backend())
    }

    /// Advertise `device` in addition to the ids already visible.
    ///
    /// Also pins the enumeration order to PCI bus order.
    pub fn add(&self, device: u32) -> Result<VisibleDevices> {
        let mut backend = self.backend();
        backend.set(DEVICE_ORDER_VAR, DEVICE_ORDER);

        let mut visible = match read_visible(&backend) {
            Ok(visible) => visible,
            Err(GpuLockError::NotConfigured(_)) => VisibleDevices::default(),
            Err(e) => return Err(e),
        };
        visible.insert(device.to_string());
        backend.set(VISIBLE_DEVICES_VAR, &visible.to_string());

        log::debug!("Visible devices: {}", visible);
        Ok(visible)
    }

    /// Stop advertising `device`.
    ///
    /// Removing an id that is not advertised, or from an unset entry, is a no-op.
    pub fn remove(&self, device: u32) -> Result<VisibleDevices> {
        let mut backend = self.backend();

        let mut visible = match read_visible(&backend) {
            Ok(visible) => visible,
            Err(GpuLockError::NotConfigured(_)) => return Ok(VisibleDevices::default()),
            Err(e) => return Err(e),
        };
        if visible.remove(&device.to_string()) {
            backend.set(VISIBLE_DEVICES_VAR, &visible.to_string());
            log::debug!("Visible devices: {}", visible);
        }
        Ok(visible)
    }

    /// Entries to pass to a child process, in `(name, value)` form.
    pub fn child_env(&self) -> Result<Vec<(String, String)>> {
        let backend = self.backend();
        let mut vars = Vec::new();
        for key in [DEVICE_ORDER_VAR, VISIBLE_DEVICES_VAR] {
            if let Some(value) = backend.get(key)? {
                vars.push((key.to_string(), value));
            }
        }
        Ok(vars)
    }
}

fn read_visible(backend: &Backend) -> Result<VisibleDevices> {
    backend
        .get(VISIBLE_DEVICES_VAR)?
        .map(|value| VisibleDevices::parse(&value))
        .ok_or_else(|| GpuLockError::NotConfigured(VISIBLE_DEVICES_VAR.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::env_lock;
    use serial_test::serial;

    #[test]
    fn parse_ignores_whitespace_and_empty_entries() {
        let visible = VisibleDevices::parse(" 0, 2,,3 ");
        assert_eq!(visible.len(), 3);
        assert!(visible.contains("0"));
        assert!(visible.contains("2"));
        assert!(visible.contains("3"));
        assert!(VisibleDevices::parse("").is_empty());
    }

    #[test]
    fn display_orders_ids_numerically() {
        let visible: VisibleDevices = ["10", "2", "0"].into_iter().collect();
        assert_eq!(visible.to_string(), "0,2,10");
    }

    #[test]
    fn read_unset_is_not_configured() {
        let manager = VisibilityManager::in_memory();
        let err = manager.read_visible().unwrap_err();
        assert!(matches!(err, GpuLockError::NotConfigured(_)));
    }

    #[test]
    fn add_is_a_union() {
        let manager = VisibilityManager::in_memory();
        manager.add(1).unwrap();
        let visible = manager.add(3).unwrap();

        assert_eq!(visible.to_string(), "1,3");
        assert_eq!(manager.read_visible().unwrap(), visible);
    }

    #[test]
    fn add_pins_device_order() {
        let manager = VisibilityManager::in_memory();
        manager.add(0).unwrap();

        let vars = manager.child_env().unwrap();
        assert!(vars.contains(&(DEVICE_ORDER_VAR.to_string(), DEVICE_ORDER.to_string())));
        assert!(vars.contains(&(VISIBLE_DEVICES_VAR.to_string(), "0".to_string())));
    }

    #[test]
    fn remove_only_touches_own_id() {
        let manager = VisibilityManager::in_memory();
        manager.add(0).unwrap();
        manager.add(1).unwrap();

        let visible = manager.remove(0).unwrap();
        assert_eq!(visible.to_string(), "1");
    }

    #[test]
    fn remove_absent_id_is_noop() {
        let manager = VisibilityManager::in_memory();
        assert!(manager.remove(4).unwrap().is_empty());

        manager.add(2).unwrap();
        assert_eq!(manager.remove(5).unwrap().to_string(), "2");
    }

    #[test]
    fn remove_last_id_leaves_empty_list() {
        let manager = VisibilityManager::in_memory();
        manager.add(6).unwrap();
        manager.remove(6).unwrap();

        assert!(manager.read_visible().unwrap().is_empty());
    }

    #[test]
    #[serial]
    fn process_manager_writes_real_environment() {
        let _env = env_lock();
        let original = env::var_os(VISIBLE_DEVICES_VAR);
        // SAFETY: every test that reads or writes the environment holds `env_lock`.
        unsafe { env::set_var(VISIBLE_DEVICES_VAR, "5") };

        let manager = VisibilityManager::process();
        manager.add(7).unwrap();
        assert_eq!(env::var(VISIBLE_DEVICES_VAR).unwrap(), "5,7");
        assert_eq!(env::var(DEVICE_ORDER_VAR).unwrap(), DEVICE_ORDER);

        manager.remove(7).unwrap();
        assert_eq!(env::var(VISIBLE_DEVICES_VAR).unwrap(), "5");

        unsafe {
            match original {
                Some(value) => env::set_var(VISIBLE_DEVICES_VAR, value),
                None => env::remove_var(VISIBLE_DEVICES_VAR),
            }
        }
    }
}
