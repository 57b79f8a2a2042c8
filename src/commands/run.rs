//! Implementation of the `gpu-lock run` command.

use crate::cli::RunArgs;
use gpu_lock::error::{GpuLockError, Result};
use gpu_lock::exit_codes;
use gpu_lock::{LockContext, lock_device, lock_gpu};
use std::process::{Command, ExitStatus};

/// Execute the `gpu-lock run` command.
///
/// Locks the requested GPUs, runs the command with the visibility
/// environment of the held locks, and releases them when it exits.
/// Returns the command's exit code.
pub fn cmd_run(ctx: &LockContext, args: RunArgs) -> Result<i32> {
    let (program, program_args) = args
        .command
        .split_first()
        .ok_or_else(|| GpuLockError::UserError("no command given".to_string()))?;

    let lock = match args.device {
        Some(device) => lock_device(ctx, device)?,
        None => lock_gpu(ctx, args.count)?,
    };

    lock.scoped(|held| {
        log::info!("Locked GPU(s) {:?} for {}", held.devices(), program);

        let status = Command::new(program)
            .args(program_args)
            .envs(ctx.visibility().child_env()?)
            .status()
            .map_err(|e| {
                GpuLockError::UserError(format!("failed to execute {}: {}", program, e))
            })?;

        Ok(exit_code_of(status))
    })
}

/// Exit code to report for a finished child, `128 + signal` if it was killed.
fn exit_code_of(status: ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(exit_codes::USER_ERROR)
}
