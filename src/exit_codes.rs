//! Exit code constants for the gpu-lock CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, bad config, filesystem failure)
//! - 2: Lock acquisition failure (device busy, pool exhausted)
//! - 3: Corrupt lock record
//! - 4: Device query failure
//!
//! `gpu-lock run` exits with the child's own status once the locks are held.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, invalid configuration, or I/O failure.
pub const USER_ERROR: i32 = 1;

/// Lock acquisition failure: requested GPUs are held or in use.
pub const LOCK_FAILURE: i32 = 2;

/// An existing lock record could not be parsed.
pub const CORRUPT_STATE: i32 = 3;

/// The device utilization query failed.
pub const ORACLE_FAILURE: i32 = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            LOCK_FAILURE,
            CORRUPT_STATE,
            ORACLE_FAILURE,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
