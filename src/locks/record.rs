//! Lock record structures and utilities.

use crate::context::Identity;
use crate::error::{GpuLockError, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Schema/software version written into every record.
pub const RECORD_VERSION: &str = env!("CARGO_PKG_VERSION");

const FILE_PREFIX: &str = "gpu_";
const FILE_SUFFIX: &str = ".json";

/// One device's exclusive claim, stored as `gpu_<id>.json` in the lock directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Login name of the acquiring user.
    pub user: String,

    /// Acquisition time in seconds since the Unix epoch.
    pub time: i64,

    /// The device id this record claims. Older records call it `id`.
    #[serde(alias = "id")]
    pub uid: u32,

    /// Process id of the holder.
    pub owner: u32,

    /// Version of the producer, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl LockRecord {
    /// Create a record claiming `device` for `identity`, stamped now.
    pub fn new(identity: &Identity, device: u32) -> Self {
        Self {
            user: identity.user.clone(),
            time: Utc::now().timestamp(),
            uid: device,
            owner: identity.pid,
            version: Some(RECORD_VERSION.to_string()),
        }
    }

    /// Read the record at `path`.
    ///
    /// # Returns
    ///
    /// * `Ok(None)` - No record exists
    /// * `Ok(Some(record))` - A well-formed record
    /// * `Err(GpuLockError::CorruptState)` - The file exists but does not parse
    /// * `Err(GpuLockError::UserError)` - The file could not be read
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Option<Self>> {
        let path = path.as_ref();
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(GpuLockError::UserError(format!(
                    "failed to read lock file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| GpuLockError::CorruptState {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Serialize the record to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            GpuLockError::UserError(format!("failed to serialize lock record: {}", e))
        })
    }

    /// Holder description for diagnostics, e.g. `alice (pid 4242)`.
    pub fn holder(&self) -> String {
        format!("{} (pid {})", self.user, self.owner)
    }

    /// Acquisition time, if the stored timestamp is representable.
    pub fn acquired_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.time, 0)
    }

    /// Calculate the age of the record.
    pub fn age(&self) -> Duration {
        self.acquired_at()
            .map(|at| Utc::now().signed_duration_since(at))
            .unwrap_or_else(Duration::zero)
    }

    /// Format the age as a human-readable string.
    pub fn age_string(&self) -> String {
        let age = self.age();
        let minutes = age.num_minutes();
        let hours = age.num_hours();
        let days = age.num_days();

        if days > 0 {
            format!("{}d {}h", days, hours % 24)
        } else if hours > 0 {
            format!("{}h {}m", hours, minutes % 60)
        } else {
            format!("{}m", minutes)
        }
    }
}

/// File name of the record for `device`.
pub fn lock_file_name(device: u32) -> String {
    format!("{}{}{}", FILE_PREFIX, device, FILE_SUFFIX)
}

/// Device id encoded in a record file name, if it is one.
pub fn parse_lock_file_name(name: &str) -> Option<u32> {
    name.strip_prefix(FILE_PREFIX)?
        .strip_suffix(FILE_SUFFIX)?
        .parse()
        .ok()
}

/// Grant read/write/execute to every user, independent of the umask.
pub(crate) fn make_world_accessible(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(0o777)).map_err(|e| {
            GpuLockError::UserError(format!(
                "failed to set permissions on '{}': {}",
                path.display(),
                e
            ))
        })?;
    }
    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}
