//! Bounded polling and retry.
//!
//! Every wait in the harvester goes through here so that no loop against the
//! remote page can spin forever.

use crate::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: Backoff,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            backoff: Backoff::Fixed,
            max_delay: delay,
        }
    }

    /// Delay to sleep after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.delay.saturating_mul(factor).min(self.max_delay)
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    GaveUp { attempts: u32 },
}

/// Calls `check` until it yields a value or the attempt bound is reached.
///
/// Errors from `check` are not swallowed; they end the poll immediately.
pub async fn poll_until<T, F, Fut>(policy: &RetryPolicy, mut check: F) -> Result<PollOutcome<T>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    for attempt in 1..=policy.max_attempts {
        if let Some(value) = check(attempt).await? {
            return Ok(PollOutcome::Ready(value));
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    Ok(PollOutcome::GaveUp {
        attempts: policy.max_attempts,
    })
}

/// Retries `op` while it fails with a transient interaction error.
///
/// Non-transient errors propagate untouched. Running out of attempts turns the
/// last transient failure into [`HarvestError::InteractionExhausted`].
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, action: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = String::new();

    for attempt in 1..=policy.max_attempts {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}",
                    action,
                    attempt,
                    policy.max_attempts,
                    e
                );
                last_error = e.to_string();
            }
            Err(e) => return Err(e),
        }

        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay_after(attempt)).await;
        }
    }

    Err(HarvestError::InteractionExhausted {
        action: action.to_string(),
        attempts: policy.max_attempts,
        last_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(max_attempts, Duration::ZERO)
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            delay: Duration::from_millis(100),
            backoff: Backoff::Exponential,
            max_delay: Duration::from_millis(1000),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(4), Duration::from_millis(800));
        assert_eq!(policy.delay_after(5), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(40), Duration::from_millis(1000));
    }

    #[test]
    fn test_fixed_delay() {
        let policy = RetryPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(policy.delay_after(1), policy.delay_after(3));
    }

    #[test]
    fn test_poll_until_ready() {
        let outcome = tokio_test::block_on(poll_until(&instant(5), |attempt| async move {
            Ok((attempt == 3).then_some(attempt))
        }))
        .unwrap();
        assert_eq!(outcome, PollOutcome::Ready(3));
    }

    #[tokio::test]
    async fn test_poll_until_gives_up() {
        let calls = Cell::new(0);
        let outcome: PollOutcome<()> = poll_until(&instant(4), |_| {
            calls.set(calls.get() + 1);
            async { Ok(None) }
        })
        .await
        .unwrap();
        assert_eq!(outcome, PollOutcome::GaveUp { attempts: 4 });
        assert_eq!(calls.get(), 4);
    }

    #[tokio::test]
    async fn test_poll_until_propagates_check_error() {
        let result: Result<PollOutcome<()>> = poll_until(&instant(4), |_| async {
            Err(HarvestError::Browser("target closed".into()))
        })
        .await;
        assert!(matches!(result, Err(HarvestError::Browser(_))));
    }

    #[tokio::test]
    async fn test_retry_transient_recovers() {
        let value = retry_transient(&instant(20), "popup click", |attempt| async move {
            if attempt < 5 {
                Err(HarvestError::transient("not clickable"))
            } else {
                Ok(attempt)
            }
        })
        .await
        .unwrap();
        assert_eq!(value, 5);
    }

    #[tokio::test]
    async fn test_retry_transient_exhausts_bound() {
        let calls = Cell::new(0);
        let result: Result<()> = retry_transient(&instant(20), "popup click", |_| {
            calls.set(calls.get() + 1);
            async { Err(HarvestError::transient("not clickable")) }
        })
        .await;

        assert_eq!(calls.get(), 20);
        match result {
            Err(HarvestError::InteractionExhausted {
                attempts,
                last_error,
                ..
            }) => {
                assert_eq!(attempts, 20);
                assert!(last_error.contains("not clickable"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retry_transient_does_not_retry_fatal() {
        let calls = Cell::new(0);
        let result: Result<()> = retry_transient(&instant(20), "popup click", |_| {
            calls.set(calls.get() + 1);
            async { Err(HarvestError::StructuralDrift("gone".into())) }
        })
        .await;
        assert_eq!(calls.get(), 1);
        assert!(matches!(result, Err(HarvestError::StructuralDrift(_))));
    }
}
