//! Utilization queries through the `nvidia-smi` command line tool.

use super::{DeviceOracle, DeviceUtilization};
use crate::error::{GpuLockError, Result};
use std::collections::BTreeMap;
use std::process::Command;

const QUERY_ARGS: [&str; 2] = [
    "--query-gpu=index,utilization.gpu,memory.used,memory.total",
    "--format=csv,noheader,nounits",
];

/// Oracle backed by `nvidia-smi`.
///
/// Device indices reported by `nvidia-smi` follow PCI bus order, which is
/// the enumeration order pinned through `CUDA_DEVICE_ORDER`.
#[derive(Debug, Clone)]
pub struct NvidiaSmiOracle {
    program: String,
}

impl NvidiaSmiOracle {
    /// Create an oracle that runs `program` (normally `nvidia-smi`).
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Query every device in one invocation.
    pub fn query_all(&self) -> Result<BTreeMap<u32, DeviceUtilization>> {
        let output = Command::new(&self.program)
            .args(QUERY_ARGS)
            .output()
            .map_err(|e| {
                GpuLockError::OracleError(format!("failed to execute {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GpuLockError::OracleError(format!(
                "{} exited with code {}: {}",
                self.program,
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        parse_query_output(&String::from_utf8_lossy(&output.stdout))
    }
}

impl DeviceOracle for NvidiaSmiOracle {
    fn utilization(&self, device: u32) -> Result<Option<DeviceUtilization>> {
        let mut readings = self.query_all()?;
        Ok(readings.remove(&device))
    }
}

/// Parse `index, utilization.gpu, memory.used, memory.total` CSV rows.
///
/// Fields the driver cannot report (`[N/A]`, `[Not Supported]`) read as zero.
pub fn parse_query_output(stdout: &str) -> Result<BTreeMap<u32, DeviceUtilization>> {
    let mut readings = BTreeMap::new();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(GpuLockError::OracleError(format!(
                "unexpected device query row '{}'",
                line
            )));
        }

        let index: u32 = fields[0].parse().map_err(|_| {
            GpuLockError::OracleError(format!("invalid device index in row '{}'", line))
        })?;
        let load = numeric(fields[1]) / 100.0;
        let used = numeric(fields[2]);
        let total = numeric(fields[3]);
        let memory = if total > 0.0 { used / total } else { 0.0 };

        readings.insert(index, DeviceUtilization { load, memory });
    }

    Ok(readings)
}

fn numeric(field: &str) -> f64 {
    field.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rows_into_fractions() {
        let stdout = "0, 35, 4096, 16384\n1, 0, 0, 16384\n";
        let readings = parse_query_output(stdout).unwrap();

        assert_eq!(readings.len(), 2);
        let gpu0 = readings[&0];
        assert!((gpu0.load - 0.35).abs() < 1e-9);
        assert!((gpu0.memory - 0.25).abs() < 1e-9);
        assert_eq!(readings[&1].load, 0.0);
        assert_eq!(readings[&1].memory, 0.0);
    }

    #[test]
    fn unsupported_fields_read_as_zero() {
        let readings = parse_query_output("2, [N/A], [Not Supported], 0\n").unwrap();
        let gpu2 = readings[&2];
        assert_eq!(gpu2.load, 0.0);
        assert_eq!(gpu2.memory, 0.0);
    }

    #[test]
    fn blank_output_has_no_devices() {
        assert!(parse_query_output("\n  \n").unwrap().is_empty());
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let err = parse_query_output("0, 10, 20\n").unwrap_err();
        assert!(matches!(err, GpuLockError::OracleError(_)));

        let err = parse_query_output("gpu0, 10, 20, 30\n").unwrap_err();
        assert!(err.to_string().contains("invalid device index"));
    }

    #[test]
    fn missing_program_is_an_oracle_error() {
        let oracle = NvidiaSmiOracle::new("/nonexistent/nvidia-smi");
        let err = {
            let _env = crate::test_support::env_lock();
            oracle.utilization(0).unwrap_err()
        };
        assert!(matches!(err, GpuLockError::OracleError(_)));
    }
}
