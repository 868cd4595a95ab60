pub mod backoff;

use backoff::{BackoffEntry, BackoffPolicy};
use std::time::Duration;

/// Backoff applied to connection and authentication attempts.
///
/// The first counted failure already delays further attempts by two seconds,
/// doubling per consecutive failure with no ceiling and no jitter. A single
/// instance is shared by every client of a host, so failures from any source
/// throttle everyone.
pub const LOGIN_BACKOFF_POLICY: BackoffPolicy = BackoffPolicy {
    num_errors_to_ignore: 0,
    initial_delay: Duration::from_millis(2000),
    multiply_factor: 2.0,
    jitter_factor: 0.0,
    maximum_backoff: None,
    entry_lifetime: None,
    require_failure_for_delay: true,
};

/// Host-wide login backoff tracker.
pub type LoginBackoff = BackoffEntry;

/// Build a fresh tracker with [`LOGIN_BACKOFF_POLICY`].
pub fn login_backoff() -> LoginBackoff {
    BackoffEntry::new(LOGIN_BACKOFF_POLICY)
}
