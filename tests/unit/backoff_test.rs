use chromoting_host::security::backoff::{BackoffEntry, BackoffPolicy};
use chromoting_host::security::{login_backoff, LOGIN_BACKOFF_POLICY};
use std::time::Duration;
use tokio::time::advance;

// ===========================================================================
// Login policy
// ===========================================================================

#[test]
fn login_policy_constants() {
    assert_eq!(LOGIN_BACKOFF_POLICY.num_errors_to_ignore, 0);
    assert_eq!(LOGIN_BACKOFF_POLICY.initial_delay, Duration::from_millis(2000));
    assert_eq!(LOGIN_BACKOFF_POLICY.multiply_factor, 2.0);
    assert_eq!(LOGIN_BACKOFF_POLICY.jitter_factor, 0.0);
    assert!(LOGIN_BACKOFF_POLICY.maximum_backoff.is_none());
    assert!(LOGIN_BACKOFF_POLICY.entry_lifetime.is_none());
    assert!(LOGIN_BACKOFF_POLICY.require_failure_for_delay);
}

#[tokio::test(start_paused = true)]
async fn consecutive_failures_double_the_window() {
    let mut backoff = login_backoff();
    let mut expected = Duration::from_secs(2);
    for failures in 1..=8u32 {
        backoff.inform_of_request(false);
        assert_eq!(backoff.failure_count(), failures);
        assert_eq!(backoff.time_until_release(), expected);
        assert!(backoff.should_reject_request());

        advance(expected).await;
        assert!(!backoff.should_reject_request());
        expected *= 2;
    }
}

#[tokio::test(start_paused = true)]
async fn window_holds_until_reset() {
    let mut backoff = login_backoff();
    for _ in 0..5 {
        backoff.inform_of_request(false);
    }
    // 2s * 2^4
    assert_eq!(backoff.time_until_release(), Duration::from_secs(32));

    advance(Duration::from_secs(31)).await;
    assert!(backoff.should_reject_request());

    backoff.reset();
    assert!(!backoff.should_reject_request());
    assert_eq!(backoff.failure_count(), 0);
    assert_eq!(backoff.release_time(), None);
}

#[tokio::test(start_paused = true)]
async fn success_decays_without_clearing_window() {
    let mut backoff = login_backoff();
    backoff.inform_of_request(false);
    backoff.inform_of_request(false);
    let horizon = backoff.release_time();

    backoff.inform_of_request(true);

    assert_eq!(backoff.failure_count(), 1);
    assert_eq!(backoff.release_time(), horizon);
    assert!(backoff.should_reject_request());
}

#[test]
fn login_entries_are_never_discarded() {
    let mut backoff = login_backoff();
    assert!(!backoff.can_discard());
    backoff.inform_of_request(false);
    assert!(!backoff.can_discard());
}

// ===========================================================================
// General policies
// ===========================================================================

#[tokio::test(start_paused = true)]
async fn delay_always_applies_when_failure_not_required() {
    let mut backoff = BackoffEntry::new(BackoffPolicy {
        num_errors_to_ignore: 0,
        initial_delay: Duration::from_millis(500),
        multiply_factor: 2.0,
        jitter_factor: 0.0,
        maximum_backoff: None,
        entry_lifetime: None,
        require_failure_for_delay: false,
    });

    backoff.inform_of_request(true);

    assert!(backoff.should_reject_request());
    assert_eq!(backoff.time_until_release(), Duration::from_millis(500));
}

#[tokio::test(start_paused = true)]
async fn jittered_delay_stays_within_bounds() {
    let policy = BackoffPolicy {
        num_errors_to_ignore: 0,
        initial_delay: Duration::from_secs(10),
        multiply_factor: 2.0,
        jitter_factor: 0.5,
        maximum_backoff: None,
        entry_lifetime: None,
        require_failure_for_delay: true,
    };
    for _ in 0..50 {
        let mut backoff = BackoffEntry::new(policy);
        backoff.inform_of_request(false);
        let delay = backoff.time_until_release();
        assert!(delay >= Duration::from_secs(5), "delay {delay:?} below jitter floor");
        assert!(delay <= Duration::from_secs(10), "delay {delay:?} above initial delay");
    }
}

#[tokio::test(start_paused = true)]
async fn idle_entry_discarded_after_lifetime() {
    let mut backoff = BackoffEntry::new(BackoffPolicy {
        num_errors_to_ignore: 0,
        initial_delay: Duration::from_secs(1),
        multiply_factor: 2.0,
        jitter_factor: 0.0,
        maximum_backoff: Some(Duration::from_secs(60)),
        entry_lifetime: Some(Duration::from_secs(10)),
        require_failure_for_delay: true,
    });
    backoff.inform_of_request(false);
    assert!(!backoff.can_discard());

    // Released after 1s, but failures are remembered for the maximum backoff.
    advance(Duration::from_secs(30)).await;
    assert!(!backoff.can_discard());

    advance(Duration::from_secs(31)).await;
    assert!(backoff.can_discard());
}
