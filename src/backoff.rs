//! Reconnect backoff.
//!
//! Step-then-exponential curve over the consecutive failure count:
//! - fewer than `BACKOFF_START_FAILURES` failures: no extra wait
//! - exactly `BACKOFF_START_FAILURES`: `BACKOFF_INITIAL_SECS`
//! - afterwards: double the previous wait, capped at `BACKOFF_MAX_SECS`

/// Failure count at which the first backoff wait is applied.
pub const BACKOFF_START_FAILURES: u32 = 3;

/// First backoff wait in seconds.
pub const BACKOFF_INITIAL_SECS: u64 = 30;

/// Upper bound for any backoff wait in seconds.
pub const BACKOFF_MAX_SECS: u64 = 600;

/// Next backoff wait for `consecutive_failures`, given the previous wait.
pub fn next_backoff(consecutive_failures: u32, previous_backoff_secs: u64) -> u64 {
    if consecutive_failures < BACKOFF_START_FAILURES {
        0
    } else if consecutive_failures == BACKOFF_START_FAILURES {
        BACKOFF_INITIAL_SECS
    } else {
        previous_backoff_secs
            .saturating_mul(2)
            .min(BACKOFF_MAX_SECS)
    }
}
