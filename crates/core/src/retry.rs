//! Retry policies with timer-based backoff.
//!
//! Status updates back off linearly (1s, 2s, ...); point measurements wait a
//! fixed delay between attempts. Waiting uses `tokio::time::sleep`, so a
//! retrying task never blocks other tasks on the runtime.

use std::future::Future;
use std::time::Duration;

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `step * attempt` after the n-th failed attempt.
    Linear { step: Duration },
    /// The same delay after every failed attempt.
    Fixed { delay: Duration },
}

/// Bounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Always at least 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

/// Run status transitions: 3 attempts, 1s x attempt.
pub const STATUS_UPDATE_POLICY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    backoff: Backoff::Linear {
        step: Duration::from_secs(1),
    },
};

/// Point measurements: 3 attempts, 2s apart.
pub const MEASUREMENT_POLICY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    backoff: Backoff::Fixed {
        delay: Duration::from_secs(2),
    },
};

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Linear { step } => step.saturating_mul(attempt.max(1)),
            Backoff::Fixed { delay } => delay,
        }
    }

    /// Copy of this policy without any waiting, for tests.
    pub fn without_delay(self) -> Self {
        Self {
            backoff: Backoff::Fixed {
                delay: Duration::ZERO,
            },
            ..self
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Run `op` until it succeeds or the policy is exhausted.
///
/// `op` receives the 1-based attempt number. `on_error` is called for every
/// failure with the attempt number, the error, and whether another attempt
/// follows. The last error is returned once all attempts fail.
pub async fn retry_with<T, E, F, Fut, L>(policy: RetryPolicy, mut op: F, mut on_error: L) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    L: FnMut(u32, &E, bool),
{
    let attempts = policy.attempts();
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let will_retry = attempt < attempts;
                on_error(attempt, &e, will_retry);
                if !will_retry {
                    return Err(e);
                }
                let delay = policy.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn linear_backoff_grows_with_attempt() {
        assert_eq!(STATUS_UPDATE_POLICY.delay_after(1), Duration::from_secs(1));
        assert_eq!(STATUS_UPDATE_POLICY.delay_after(2), Duration::from_secs(2));
        assert_eq!(STATUS_UPDATE_POLICY.delay_after(3), Duration::from_secs(3));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        assert_eq!(MEASUREMENT_POLICY.delay_after(1), Duration::from_secs(2));
        assert_eq!(MEASUREMENT_POLICY.delay_after(3), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result: Result<u32, &str> = retry_with(
            MEASUREMENT_POLICY.without_delay(),
            |attempt| {
                calls.set(calls.get() + 1);
                async move {
                    if attempt < 3 {
                        Err("flaky")
                    } else {
                        Ok(attempt)
                    }
                }
            },
            |_, _, _| {},
        )
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let mut seen = Vec::new();
        let result: Result<(), String> = retry_with(
            STATUS_UPDATE_POLICY.without_delay(),
            |attempt| async move { Err(format!("fail {attempt}")) },
            |attempt, _, will_retry| seen.push((attempt, will_retry)),
        )
        .await;
        assert_eq!(result, Err("fail 3".to_string()));
        assert_eq!(seen, vec![(1, true), (2, true), (3, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_attempts_without_blocking() {
        let start = tokio::time::Instant::now();
        let _: Result<(), ()> = retry_with(STATUS_UPDATE_POLICY, |_| async { Err(()) }, |_, _, _| {}).await;
        // 1s + 2s between three attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn zero_attempts_still_runs_once() {
        let policy = RetryPolicy {
            max_attempts: 0,
            backoff: Backoff::Fixed {
                delay: Duration::ZERO,
            },
        };
        assert_eq!(policy.attempts(), 1);
    }
}
