//! Bounded retry-with-backoff for read-after-write visibility.
//!
//! # Responsibility
//! - Describe the backoff schedule used while a just-written contact is not
//!   yet readable.
//! - Poll a probe until it yields a value or the wait budget is spent.
//!
//! # Invariants
//! - The probe runs at least once, even with a zero timeout.
//! - Total requested sleep never exceeds `timeout_ms`.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff schedule with a total wait budget.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    /// Upper bound on the summed sleep across all attempts.
    pub timeout_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            multiplier: 2.0,
            max_delay_ms: 1_000,
            timeout_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that probes exactly once and never sleeps.
    pub fn no_wait() -> Self {
        Self {
            initial_delay_ms: 0,
            multiplier: 1.0,
            max_delay_ms: 0,
            timeout_ms: 0,
        }
    }

    /// Delays to sleep between attempts, already clipped to the budget.
    pub fn delays(&self) -> Vec<Duration> {
        let mut delays = Vec::new();
        let mut remaining = self.timeout_ms;
        let mut next = self.initial_delay_ms.min(self.max_delay_ms) as f64;

        while remaining > 0 {
            let step = (next.round() as u64).clamp(1, self.max_delay_ms.max(1));
            let step = step.min(remaining);
            delays.push(Duration::from_millis(step));
            remaining -= step;
            next = (next * self.multiplier).min(self.max_delay_ms as f64);
        }
        delays
    }
}

/// Outcome of a polling run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollOutcome<T> {
    pub value: Option<T>,
    pub attempts: u32,
    pub waited: Duration,
}

/// Runs `probe` until it returns `Ok(Some(_))`, an error, or the policy is
/// exhausted, calling `sleep` between attempts.
pub fn poll_with_backoff<T, E>(
    policy: &RetryPolicy,
    mut sleep: impl FnMut(Duration),
    mut probe: impl FnMut() -> Result<Option<T>, E>,
) -> Result<PollOutcome<T>, E> {
    let mut attempts = 1;
    let mut waited = Duration::ZERO;
    if let Some(value) = probe()? {
        return Ok(PollOutcome {
            value: Some(value),
            attempts,
            waited,
        });
    }

    for delay in policy.delays() {
        sleep(delay);
        waited += delay;
        attempts += 1;
        if let Some(value) = probe()? {
            return Ok(PollOutcome {
                value: Some(value),
                attempts,
                waited,
            });
        }
    }

    Ok(PollOutcome {
        value: None,
        attempts,
        waited,
    })
}

#[cfg(test)]
mod tests {
    use super::{poll_with_backoff, RetryPolicy};
    use std::convert::Infallible;
    use std::time::Duration;

    fn ms(values: &[u64]) -> Vec<Duration> {
        values.iter().copied().map(Duration::from_millis).collect()
    }

    #[test]
    fn default_delays_double_then_cap_within_budget() {
        let delays = RetryPolicy::default().delays();
        assert_eq!(delays, ms(&[250, 500, 1000, 1000, 1000, 1000, 250]));
        let total: Duration = delays.iter().sum();
        assert_eq!(total, Duration::from_millis(5_000));
    }

    #[test]
    fn no_wait_policy_has_no_delays() {
        assert!(RetryPolicy::no_wait().delays().is_empty());
    }

    #[test]
    fn poll_stops_at_first_hit() {
        let mut slept = Vec::new();
        let mut calls = 0;
        let outcome = poll_with_backoff(
            &RetryPolicy::default(),
            |delay| slept.push(delay),
            || {
                calls += 1;
                Ok::<_, Infallible>((calls == 3).then_some("found"))
            },
        )
        .expect("infallible probe");

        assert_eq!(outcome.value, Some("found"));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(slept, ms(&[250, 500]));
        assert_eq!(outcome.waited, Duration::from_millis(750));
    }

    #[test]
    fn poll_gives_up_after_budget() {
        let policy = RetryPolicy {
            initial_delay_ms: 10,
            multiplier: 2.0,
            max_delay_ms: 40,
            timeout_ms: 100,
        };
        let outcome = poll_with_backoff(&policy, |_| {}, || Ok::<Option<()>, Infallible>(None))
            .expect("infallible probe");
        assert_eq!(outcome.value, None);
        // 10 + 20 + 40 + 30 = 100 ms, four sleeps after the first probe.
        assert_eq!(outcome.attempts, 5);
        assert_eq!(outcome.waited, Duration::from_millis(100));
    }

    #[test]
    fn poll_propagates_probe_errors() {
        let err = poll_with_backoff(&RetryPolicy::default(), |_| {}, || {
            Err::<Option<()>, _>("store down")
        })
        .expect_err("error must propagate");
        assert_eq!(err, "store down");
    }
}
