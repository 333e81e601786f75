//! Bounded retries with exponential backoff, and ordered fallback across
//! alternative strategies.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::error::StrategyFailure;

const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total tries, including the first. Zero is treated as one.
    pub attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline applied to each individual try.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, timeout: Duration) -> Self {
        Self {
            attempts,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            timeout,
        }
    }

    pub fn single(timeout: Duration) -> Self {
        Self::new(1, timeout)
    }

    /// Delay after the given (1-based) failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

#[derive(Debug)]
pub enum AttemptError<E> {
    TimedOut(Duration),
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::TimedOut(after) => write!(f, "timed out after {after:?}"),
            AttemptError::Failed(e) => write!(f, "{e}"),
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts run out. Timeouts are always retryable.
pub async fn retry_with_backoff<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    retryable: R,
    mut op: F,
) -> Result<T, AttemptError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: fmt::Display,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        let outcome = match tokio::time::timeout(policy.timeout, op(attempt)).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => AttemptError::Failed(e),
            Err(_) => AttemptError::TimedOut(policy.timeout),
        };

        let can_retry = match &outcome {
            AttemptError::TimedOut(_) => true,
            AttemptError::Failed(e) => retryable(e),
        };
        if !can_retry || attempt >= attempts {
            return Err(outcome);
        }

        let delay = policy.backoff_for(attempt);
        tracing::debug!(attempt, ?delay, error = %outcome, "attempt failed, backing off");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Try each candidate in order and return the first success along with the
/// name of the candidate that produced it. Later candidates are not touched
/// once one succeeds.
pub async fn try_in_order<'a, S, T, E, F, Fut, N>(
    candidates: &'a [S],
    policy: &RetryPolicy,
    name: N,
    mut op: F,
) -> Result<(T, String), Vec<StrategyFailure>>
where
    N: Fn(&S) -> String,
    F: FnMut(&'a S) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut failures = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let label = name(candidate);
        match retry_with_backoff(policy, |_| true, |_| op(candidate)).await {
            Ok(value) => {
                tracing::info!(strategy = %label, "strategy succeeded");
                return Ok((value, label));
            }
            Err(e) => {
                tracing::warn!(strategy = %label, error = %e, "strategy failed, trying next");
                failures.push(StrategyFailure {
                    strategy: label,
                    message: e.to_string(),
                });
            }
        }
    }
    Err(failures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = RetryPolicy::new(5, Duration::from_secs(1));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(2), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(10), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_failures_then_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::from_secs(5));
        let result: Result<u32, AttemptError<String>> =
            retry_with_backoff(&policy, |_| true, |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("flaky {attempt}"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result.ok(), Some(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(5, Duration::from_secs(5));
        let result: Result<(), AttemptError<&str>> =
            retry_with_backoff(&policy, |e: &&str| *e != "fatal", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            })
            .await;
        assert!(matches!(result, Err(AttemptError::Failed("fatal"))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_attempt_times_out() {
        let policy = RetryPolicy::single(Duration::from_secs(240));
        let result: Result<(), AttemptError<String>> =
            retry_with_backoff(&policy, |_| true, |_| std::future::pending()).await;
        match result {
            Err(e @ AttemptError::TimedOut(_)) => assert_eq!(e.to_string(), "timed out after 240s"),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_success_wins_and_later_candidates_are_skipped() {
        let touched = Arc::new(AtomicU32::new(0));
        let candidates = vec!["a", "b", "c"];
        let policy = RetryPolicy::single(Duration::from_secs(1));
        let seen = touched.clone();
        let result = try_in_order(&candidates, &policy, |s| s.to_string(), |s| {
            let seen = seen.clone();
            async move {
                seen.fetch_add(1, Ordering::SeqCst);
                match *s {
                    "a" => Err("down".to_string()),
                    other => Ok(format!("from {other}")),
                }
            }
        })
        .await;

        let (value, strategy) = result.expect("b succeeds");
        assert_eq!(value, "from b");
        assert_eq!(strategy, "b");
        assert_eq!(touched.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn all_failures_are_reported_in_order() {
        let candidates = vec!["a", "b"];
        let policy = RetryPolicy::single(Duration::from_secs(1));
        let failures = try_in_order(&candidates, &policy, |s| s.to_string(), |s| async move {
            Err::<(), _>(format!("{s} broke"))
        })
        .await
        .unwrap_err();
        assert_eq!(failures.len(), 2);
        assert_eq!(failures[0].strategy, "a");
        assert_eq!(failures[1].message, "b broke");
    }
}
