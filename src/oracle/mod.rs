//! Device utilization oracle.
//!
//! The oracle is an advisory cross-check: lock records remain the source of
//! truth for exclusivity, but a device that is already loaded by a process
//! which never took a lock is refused as well. The capability is a trait so
//! tests can substitute deterministic fakes for real hardware.

mod nvidia_smi;

pub use nvidia_smi::{NvidiaSmiOracle, parse_query_output};

use crate::error::Result;

/// Utilization snapshot for one device, as fractions in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceUtilization {
    /// Compute load.
    pub load: f64,
    /// Fraction of device memory in use.
    pub memory: f64,
}

impl DeviceUtilization {
    /// A device is busy only when both load and memory exceed `threshold`.
    pub fn is_busy(&self, threshold: f64) -> bool {
        self.load > threshold && self.memory > threshold
    }
}

/// Source of per-device utilization readings.
pub trait DeviceOracle: Send + Sync {
    /// Current utilization of `device`, or `None` if the device is not present.
    fn utilization(&self, device: u32) -> Result<Option<DeviceUtilization>>;
}

/// Oracle that reports every device as present and idle.
///
/// Used when the utilization cross-check is disabled in the config.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOracle;

impl DeviceOracle for NoOracle {
    fn utilization(&self, _device: u32) -> Result<Option<DeviceUtilization>> {
        Ok(Some(DeviceUtilization {
            load: 0.0,
            memory: 0.0,
        }))
    }
}
