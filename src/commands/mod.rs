//! Command implementations for gpu-lock.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations, and resolves the lock context from the global flags.

mod clear;
mod run;
mod status;

use crate::cli::{Cli, Command, GlobalArgs};
use gpu_lock::error::Result;
use gpu_lock::exit_codes;
use gpu_lock::{Config, LockContext};

/// Dispatch a command to its implementation.
///
/// Returns the process exit code on success.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let ctx = build_context(&cli.global)?;

    match cli.command {
        Command::Run(args) => run::cmd_run(&ctx, args),
        Command::Status => status::cmd_status(&ctx).map(|()| exit_codes::SUCCESS),
        Command::Clear(args) => clear::cmd_clear(&ctx, args).map(|()| exit_codes::SUCCESS),
    }
}

/// Resolve the config and apply command-line overrides.
fn build_context(global: &GlobalArgs) -> Result<LockContext> {
    let mut config = match &global.config {
        Some(path) => Config::load(path)?,
        None => Config::resolve()?,
    };

    if let Some(lock_dir) = &global.lock_dir {
        config.lock_dir = lock_dir.clone();
    }
    if let Some(pool_size) = global.pool_size {
        config.pool_size = pool_size;
    }
    if global.no_utilization_check {
        config.check_utilization = false;
    }

    LockContext::new(config)
}
