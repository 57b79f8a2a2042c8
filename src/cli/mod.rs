//! CLI argument parsing for gpu-lock.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// gpu-lock: claim GPUs on a shared host without a central daemon.
///
/// Each claimed GPU is recorded in a JSON lock file in a shared directory.
/// Locks held by processes that no longer exist are reclaimed automatically.
#[derive(Parser, Debug)]
#[command(name = "gpu-lock")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Options shared by every command.
#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Config file (default: $GPU_LOCK_CONFIG, then /etc/gpu_lock/config.yaml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the shared lock directory.
    #[arg(long, global = true)]
    pub lock_dir: Option<PathBuf>,

    /// Override the number of GPUs in the system.
    #[arg(long, global = true)]
    pub pool_size: Option<u32>,

    /// Skip the nvidia-smi utilization cross-check.
    #[arg(long, global = true)]
    pub no_utilization_check: bool,

    /// Log debug output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands for gpu-lock.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Lock GPUs and run a command on them.
    ///
    /// The command sees only the locked GPUs through CUDA_VISIBLE_DEVICES.
    /// Locks are released when it exits; its exit code is passed through.
    Run(RunArgs),

    /// Show the lock records in the lock directory.
    Status,

    /// Clear the lock record of a GPU.
    ///
    /// Stale and corrupt records are cleared directly; a record held by a
    /// live process requires --force.
    Clear(ClearArgs),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Number of GPUs to lock.
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,

    /// Lock this specific GPU instead of scanning the pool.
    #[arg(long, conflicts_with = "count")]
    pub device: Option<u32>,

    /// Command to run, with its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

/// Arguments for the `clear` command.
#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// GPU id whose lock should be cleared.
    pub device: u32,

    /// Clear even if the holder is still running.
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_defaults() {
        let cli = Cli::try_parse_from(["gpu-lock", "run", "python", "train.py"]).unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.count, 1);
            assert_eq!(args.device, None);
            assert_eq!(args.command, vec!["python", "train.py"]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_run_passes_hyphenated_args_through() {
        let cli = Cli::try_parse_from([
            "gpu-lock", "run", "-n", "2", "--", "python", "train.py", "--lr", "0.1",
        ])
        .unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.count, 2);
            assert_eq!(args.command, vec!["python", "train.py", "--lr", "0.1"]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_run_with_device() {
        let cli = Cli::try_parse_from(["gpu-lock", "run", "--device", "3", "nvidia-smi"]).unwrap();
        if let Command::Run(args) = cli.command {
            assert_eq!(args.device, Some(3));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_run_requires_command() {
        assert!(Cli::try_parse_from(["gpu-lock", "run"]).is_err());
    }

    #[test]
    fn parse_run_rejects_device_with_count() {
        let result = Cli::try_parse_from(["gpu-lock", "run", "-n", "2", "--device", "1", "true"]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_status_with_global_flags() {
        let cli = Cli::try_parse_from([
            "gpu-lock",
            "status",
            "--lock-dir",
            "/tmp/locks",
            "--pool-size",
            "4",
            "--no-utilization-check",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Status));
        assert_eq!(cli.global.lock_dir, Some(PathBuf::from("/tmp/locks")));
        assert_eq!(cli.global.pool_size, Some(4));
        assert!(cli.global.no_utilization_check);
    }

    #[test]
    fn parse_clear() {
        let cli = Cli::try_parse_from(["gpu-lock", "clear", "2", "--force"]).unwrap();
        if let Command::Clear(args) = cli.command {
            assert_eq!(args.device, 2);
            assert!(args.force);
        } else {
            panic!("Expected Clear command");
        }
    }
}
