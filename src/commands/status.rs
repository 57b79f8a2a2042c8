//! Implementation of the `gpu-lock status` command.

use gpu_lock::LockContext;
use gpu_lock::error::Result;
use gpu_lock::locks::{self, LockStatus};

/// Execute the `gpu-lock status` command.
pub fn cmd_status(ctx: &LockContext) -> Result<()> {
    let locks = locks::list_locks(ctx)?;

    if locks.is_empty() {
        println!("No GPUs locked in {}.", ctx.lock_dir().display());
        return Ok(());
    }

    println!("Locked GPUs ({} of {}):", locks.len(), ctx.config.pool_size);
    println!();

    for lock in &locks {
        println!("  GPU {}:", lock.device);
        if let Some(record) = &lock.record {
            println!("    User:       {}", record.user);
            println!("    PID:        {}", record.owner);
            if let Some(at) = record.acquired_at() {
                println!("    Acquired:   {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
            }
            println!("    Age:        {}", record.age_string());
            if let Some(version) = &record.version {
                println!("    Version:    {}", version);
            }
        }
        match &lock.status {
            LockStatus::Held => println!("    Status:     held"),
            LockStatus::Stale => println!("    Status:     STALE (owner process is gone)"),
            LockStatus::Corrupt(reason) => println!("    Status:     CORRUPT ({})", reason),
        }
        println!("    Path:       {}", lock.path.display());
        println!();
    }

    let reclaimable = locks
        .iter()
        .filter(|l| l.status != LockStatus::Held)
        .count();
    if reclaimable > 0 {
        println!(
            "Note: {} lock(s) are stale or corrupt. Use `gpu-lock clear <gpu>` to remove them.",
            reclaimable
        );
    }

    Ok(())
}
