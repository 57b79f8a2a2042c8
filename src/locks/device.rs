//! Single-device lock lifecycle.
//!
//! A [`DeviceLock`] moves through three states:
//! 1. proposed: constructed for a device id, nothing on disk
//! 2. held: its lock record has been created (`acquire`)
//! 3. entered: held, and the device id is advertised as visible (`enter`)
//!
//! `exit` undoes both side effects in reverse order. Dropping a lock that is
//! still held or entered performs `exit` best-effort, so neither the record
//! nor the visibility entry leaks when the caller returns early or panics.

use super::liveness::is_pid_alive;
use super::record::{LockRecord, make_world_accessible};
use crate::context::LockContext;
use crate::error::{GpuLockError, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Outcome of a successful availability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// No record exists.
    Free,
    /// The record belongs to this process and will be replaced.
    Renewable(LockRecord),
    /// The record's owner no longer exists; anyone may reclaim it.
    Stale(LockRecord),
}

impl Availability {
    /// The record that acquisition will replace, if any.
    pub fn existing(&self) -> Option<&LockRecord> {
        match self {
            Availability::Free => None,
            Availability::Renewable(record) | Availability::Stale(record) => Some(record),
        }
    }
}

/// Exclusive claim on one device.
#[derive(Debug)]
pub struct DeviceLock {
    ctx: LockContext,
    device: u32,
    path: PathBuf,
    held: bool,
    entered: bool,
}

impl DeviceLock {
    /// Propose a lock on `device`, creating the lock directory if needed.
    pub fn new(ctx: &LockContext, device: u32) -> Result<Self> {
        ctx.ensure_lock_dir()?;
        Ok(Self {
            ctx: ctx.clone(),
            device,
            path: ctx.lock_path(device),
            held: false,
            entered: false,
        })
    }

    pub fn device(&self) -> u32 {
        self.device
    }

    /// Path to the lock record.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this lock's record has been created and not yet released.
    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn is_entered(&self) -> bool {
        self.entered
    }

    /// Check whether the device can be claimed.
    ///
    /// The record decides first: a self-owned record is renewable, a record
    /// whose owner is gone is stale, any other record makes the device busy.
    /// The utilization oracle is then consulted in every case, so a device
    /// loaded by a process that never took a lock is refused too.
    ///
    /// # Returns
    ///
    /// * `Ok(Availability)` - The device may be claimed
    /// * `Err(GpuLockError::ResourceBusy)` - A live holder or an external workload
    /// * `Err(GpuLockError::CorruptState)` - The record does not parse; it is left untouched
    /// * `Err(GpuLockError::UnknownDevice)` - The oracle does not report this device
    pub fn check_availability(&self) -> Result<Availability> {
        let availability = match LockRecord::read(&self.path)? {
            None => Availability::Free,
            Some(record) => self.judge_record(record)?,
        };

        self.verify_not_busy()?;
        Ok(availability)
    }

    fn judge_record(&self, record: LockRecord) -> Result<Availability> {
        if record.uid != self.device {
            return Err(GpuLockError::CorruptState {
                path: self.path.clone(),
                reason: format!("record claims GPU {}", record.uid),
            });
        }

        if record.owner == self.ctx.identity.pid {
            log::warn!(
                "Found existing GPU {} lock for pid {}. Please make sure to release resources \
                 after finishing your scripts. Old lock will be renewed.",
                self.device,
                record.owner
            );
            Ok(Availability::Renewable(record))
        } else if !is_pid_alive(record.owner) {
            log::info!(
                "Found stale GPU {} lock held by {} with dead owner",
                self.device,
                record.holder()
            );
            Ok(Availability::Stale(record))
        } else {
            Err(GpuLockError::ResourceBusy {
                device: self.device,
                holder: record.holder(),
            })
        }
    }

    fn verify_not_busy(&self) -> Result<()> {
        let reading = self
            .ctx
            .oracle()
            .utilization(self.device)?
            .ok_or(GpuLockError::UnknownDevice(self.device))?;

        log::debug!(
            "GPU {} has load {:.2} and memory utilization {:.2}",
            self.device,
            reading.load,
            reading.memory
        );

        if reading.is_busy(self.ctx.config.busy_threshold) {
            return Err(GpuLockError::ResourceBusy {
                device: self.device,
                holder: format!(
                    "a process without a lock (load {:.2}, memory {:.2})",
                    reading.load, reading.memory
                ),
            });
        }
        Ok(())
    }

    /// Claim the device by creating its lock record.
    ///
    /// A renewable or stale record is claimed and removed first (see
    /// [`reclaim_record`](Self::reclaim_record)). The new record is created
    /// with exclusive-create semantics, so a peer that wins the race between
    /// the check and the create makes this call fail with `ResourceBusy`
    /// instead of both processes believing they hold the lock.
    pub fn acquire(&mut self) -> Result<()> {
        if self.held {
            return Ok(());
        }

        let availability = self.check_availability()?;
        if let Some(previous) = availability.existing() {
            self.reclaim_record(previous)?;
            log::debug!(
                "Released old GPU {} lock held by {}",
                self.device,
                previous.holder()
            );
        }

        self.create_record()?;
        self.held = true;
        log::debug!("Acquired lock on GPU {}", self.device);
        Ok(())
    }

    /// Remove the record judged replaceable by `check_availability`.
    ///
    /// The record is first renamed to a name private to this process, which
    /// only one contender can do. If the claimed file is no longer `expected`
    /// (a peer reclaimed it and wrote its own record in the meantime), it is
    /// renamed back unchanged and the device is reported busy.
    fn reclaim_record(&self, expected: &LockRecord) -> Result<()> {
        let claimed = self.claim_path();

        if let Err(e) = fs::rename(&self.path, &claimed) {
            if e.kind() == ErrorKind::NotFound {
                return Err(GpuLockError::ResourceBusy {
                    device: self.device,
                    holder: "another process reclaiming it".to_string(),
                });
            }
            return Err(GpuLockError::UserError(format!(
                "failed to claim lock file '{}': {}",
                self.path.display(),
                e
            )));
        }

        match LockRecord::read(&claimed) {
            Ok(Some(record)) if &record == expected => remove_record(&claimed),
            found => {
                let holder = match found {
                    Ok(Some(record)) => record.holder(),
                    _ => "another process".to_string(),
                };
                log::debug!(
                    "GPU {} lock changed hands before it could be reclaimed; restoring it",
                    self.device
                );
                fs::rename(&claimed, &self.path).map_err(|e| {
                    GpuLockError::UserError(format!(
                        "failed to restore lock file '{}': {}",
                        self.path.display(),
                        e
                    ))
                })?;
                Err(GpuLockError::ResourceBusy {
                    device: self.device,
                    holder,
                })
            }
        }
    }

    fn claim_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".reclaim.{}", self.ctx.identity.pid));
        PathBuf::from(name)
    }

    fn create_record(&self) -> Result<()> {
        let record = LockRecord::new(&self.ctx.identity, self.device);
        let json = record.to_json()?;

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
            .map_err(|e| {
                if e.kind() == ErrorKind::AlreadyExists {
                    let holder = match LockRecord::read(&self.path) {
                        Ok(Some(existing)) => existing.holder(),
                        _ => "another process".to_string(),
                    };
                    GpuLockError::ResourceBusy {
                        device: self.device,
                        holder,
                    }
                } else {
                    GpuLockError::UserError(format!(
                        "failed to create lock file '{}': {}",
                        self.path.display(),
                        e
                    ))
                }
            })?;

        let written = file
            .write_all(json.as_bytes())
            .and_then(|()| file.sync_all())
            .map_err(|e| GpuLockError::UserError(format!("failed to write lock record: {}", e)))
            .and_then(|()| make_world_accessible(&self.path));

        if let Err(e) = written {
            // Clean up the partial record
            let _ = fs::remove_file(&self.path);
            return Err(e);
        }
        Ok(())
    }

    /// Delete the lock record.
    ///
    /// Releasing a lock that is not held is a no-op, as is releasing a record
    /// that has already disappeared. A record that now belongs to another
    /// process is left in place.
    pub fn release(&mut self) -> Result<()> {
        if !self.held {
            log::debug!(
                "GPU {} lockfile was not created, so it will not be removed",
                self.device
            );
            return Ok(());
        }

        match LockRecord::read(&self.path) {
            Ok(Some(record)) if record.owner != self.ctx.identity.pid => {
                log::warn!(
                    "GPU {} lock was taken over by {}; leaving it in place",
                    self.device,
                    record.holder()
                );
            }
            _ => remove_record(&self.path)?,
        }

        self.held = false;
        log::debug!("Released GPU {} lock", self.device);
        Ok(())
    }

    /// Acquire (if not yet held) and advertise the device as visible.
    pub fn enter(&mut self) -> Result<()> {
        if self.entered {
            return Ok(());
        }
        self.acquire()?;

        if let Err(e) = self.ctx.visibility().add(self.device) {
            let _ = self.release();
            return Err(e);
        }
        self.entered = true;
        Ok(())
    }

    /// Withdraw the visibility entry, then release the record.
    ///
    /// The record is released even when the visibility update fails.
    pub fn exit(&mut self) -> Result<()> {
        let withdrawn = if self.entered {
            self.entered = false;
            self.ctx.visibility().remove(self.device).map(|_| ())
        } else {
            Ok(())
        };
        let released = self.release();

        withdrawn?;
        released
    }
}

impl Drop for DeviceLock {
    fn drop(&mut self) {
        if (self.held || self.entered)
            && let Err(e) = self.exit()
        {
            log::warn!("failed to release GPU {} lock: {}", self.device, e);
        }
    }
}

fn remove_record(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(GpuLockError::UserError(format!(
            "failed to remove lock file '{}': {}",
            path.display(),
            e
        ))),
    }
}
