//! Process liveness probe.

/// Whether a process with `pid` currently exists.
///
/// Sends the null signal. `EPERM` means the process exists but belongs to
/// another user, which on a shared host is the common case for a live holder.
pub fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(pid) = libc::pid_t::try_from(pid) else {
            return false;
        };
        // pid 0 would address our own process group
        if pid <= 0 {
            return false;
        }

        // SAFETY: kill with signal 0 performs the permission and existence
        // checks only; no signal is delivered.
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return true;
        }
        matches!(
            std::io::Error::last_os_error().raw_os_error(),
            Some(code) if code == libc::EPERM
        )
    }

    #[cfg(not(unix))]
    {
        // No probe available; never reclaim.
        let _ = pid;
        true
    }
}
