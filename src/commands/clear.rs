//! Implementation of the `gpu-lock clear` command.

use crate::cli::ClearArgs;
use gpu_lock::LockContext;
use gpu_lock::error::Result;
use gpu_lock::locks::{self, LockStatus};

/// Execute the `gpu-lock clear` command.
pub fn cmd_clear(ctx: &LockContext, args: ClearArgs) -> Result<()> {
    let cleared = locks::clear_lock(ctx, args.device, args.force)?;

    println!("Cleared lock: GPU {}", cleared.device);
    println!();
    println!("Lock details:");
    if let Some(record) = &cleared.record {
        println!("  User:       {}", record.user);
        println!("  PID:        {}", record.owner);
        println!("  Age:        {}", record.age_string());
    }
    match &cleared.status {
        LockStatus::Held => println!("  Status:     was HELD (forced)"),
        LockStatus::Stale => println!("  Status:     was STALE"),
        LockStatus::Corrupt(reason) => println!("  Status:     was CORRUPT ({})", reason),
    }
    println!("  Path:       {}", cleared.path.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::cli_context;

    #[test]
    fn clear_corrupt_record() {
        let (_temp_dir, ctx) = cli_context(1);
        ctx.ensure_lock_dir().unwrap();
        std::fs::write(ctx.lock_path(0), "{").unwrap();

        cmd_clear(
            &ctx,
            ClearArgs {
                device: 0,
                force: false,
            },
        )
        .unwrap();
        assert!(!ctx.lock_path(0).exists());
    }

    #[test]
    fn clear_missing_record_fails() {
        let (_temp_dir, ctx) = cli_context(1);
        let result = cmd_clear(
            &ctx,
            ClearArgs {
                device: 0,
                force: true,
            },
        );
        assert!(result.is_err());
    }
}
