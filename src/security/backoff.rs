use std::time::Duration;
use tokio::time::Instant;

/// Horizon used when a computed delay does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Parameters of an exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// Failures tolerated before any delay applies.
    pub num_errors_to_ignore: u32,
    /// Delay after the first counted failure.
    pub initial_delay: Duration,
    /// Factor applied to the delay for every further consecutive failure.
    pub multiply_factor: f64,
    /// Fraction of the delay that may be randomly shaved off, in `[0, 1]`.
    pub jitter_factor: f64,
    /// Ceiling on the delay. `None` means unbounded.
    pub maximum_backoff: Option<Duration>,
    /// How long an idle entry is kept before it can be discarded.
    /// `None` means never.
    pub entry_lifetime: Option<Duration>,
    /// When false, even a success (or the very first request) pushes the
    /// release horizon out by `initial_delay`.
    pub require_failure_for_delay: bool,
}

/// Exponential backoff state for one stream of requests.
///
/// Failures push a release horizon into the future; requests arriving before
/// the horizon should be rejected. Successes decay the failure count by one
/// rather than clearing it, so interleaved successes do not defeat the
/// backoff. Only [`BackoffEntry::reset`] clears history.
#[derive(Debug, Clone)]
pub struct BackoffEntry {
    policy: BackoffPolicy,
    failure_count: u32,
    release_time: Option<Instant>,
}

impl BackoffEntry {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            failure_count: 0,
            release_time: None,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Record the outcome of a request.
    pub fn inform_of_request(&mut self, succeeded: bool) {
        let now = Instant::now();
        if !succeeded {
            self.failure_count = self.failure_count.saturating_add(1);
            self.release_time = Some(self.calculate_release_time(now));
        } else {
            self.failure_count = self.failure_count.saturating_sub(1);
            // Keep the horizon set by earlier failures so that requests in
            // flight alongside this success still wait.
            let delay = if self.policy.require_failure_for_delay {
                Duration::ZERO
            } else {
                self.policy.initial_delay
            };
            let candidate = add_saturating(now, delay);
            self.release_time = Some(self.release_time.map_or(candidate, |t| t.max(candidate)));
        }
    }

    /// True while the release horizon is still in the future.
    pub fn should_reject_request(&self) -> bool {
        self.release_time.is_some_and(|t| t > Instant::now())
    }

    /// Forget all failures.
    pub fn reset(&mut self) {
        self.failure_count = 0;
        self.release_time = None;
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    /// Remaining wait before a request would be accepted.
    pub fn time_until_release(&self) -> Duration {
        match self.release_time {
            Some(t) => t.saturating_duration_since(Instant::now()),
            None => Duration::ZERO,
        }
    }

    pub fn release_time(&self) -> Option<Instant> {
        self.release_time
    }

    /// Whether the entry carries no information worth keeping.
    pub fn can_discard(&self) -> bool {
        let Some(lifetime) = self.policy.entry_lifetime else {
            return false;
        };
        let now = Instant::now();
        let unused_since = match self.release_time {
            Some(t) if t > now => return false,
            Some(t) => now - t,
            None => return true,
        };
        if self.failure_count > 0 {
            // Further failures would still add to the delay until the
            // maximum backoff period has passed.
            let keep_for = self
                .policy
                .maximum_backoff
                .map_or(lifetime, |max| max.max(lifetime));
            return unused_since >= keep_for;
        }
        unused_since >= lifetime
    }

    fn calculate_release_time(&self, now: Instant) -> Instant {
        let mut effective = self
            .failure_count
            .saturating_sub(self.policy.num_errors_to_ignore);
        if !self.policy.require_failure_for_delay {
            effective = effective.saturating_add(1);
        }

        let horizon = |candidate: Instant| match self.release_time {
            Some(existing) => existing.max(candidate),
            None => candidate,
        };

        if effective == 0 {
            return horizon(now);
        }

        let exponent = i32::try_from(effective - 1).unwrap_or(i32::MAX);
        let mut delay_ms =
            self.policy.initial_delay.as_millis() as f64 * self.policy.multiply_factor.powi(exponent);
        if self.policy.jitter_factor > 0.0 {
            delay_ms -= rand::random::<f64>() * self.policy.jitter_factor * delay_ms;
        }

        let mut delay = if !delay_ms.is_finite() || delay_ms >= u64::MAX as f64 {
            Duration::from_millis(u64::MAX)
        } else {
            Duration::from_millis((delay_ms + 0.5) as u64)
        };
        if let Some(max) = self.policy.maximum_backoff {
            delay = delay.min(max);
        }

        horizon(add_saturating(now, delay))
    }
}

fn add_saturating(now: Instant, delay: Duration) -> Instant {
    now.checked_add(delay)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}
