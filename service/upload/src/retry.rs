use std::future::Future;
use std::time::Duration;

use backoff::{backoff::Backoff, ExponentialBackoff};
use serde::{Deserialize, Serialize};

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Including the first attempt.
    pub max_attempts: u32,
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Each delay is drawn from `interval * (1 ± randomization_factor)`.
    pub randomization_factor: f64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval_ms: 200,
            max_interval_ms: 5_000,
            randomization_factor: 0.5,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Fresh backoff state for one retried operation. Attempts, not elapsed time, bound it.
    pub fn backoff(&self) -> ExponentialBackoff {
        let initial_interval = Duration::from_millis(self.initial_interval_ms);
        ExponentialBackoff {
            current_interval: initial_interval,
            initial_interval,
            max_interval: Duration::from_millis(self.max_interval_ms),
            randomization_factor: self.randomization_factor,
            multiplier: self.multiplier,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Run `operation` until it succeeds or the attempts run out.
    ///
    /// On exhaustion returns the number of attempts made with the last error.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, (u32, anyhow::Error)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut backoff = self.backoff();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let e = match operation().await {
                Ok(x) => return Ok(x),
                Err(e) => e,
            };
            if attempts >= max_attempts {
                return Err((attempts, e));
            }
            let Some(delay) = backoff.next_backoff() else {
                return Err((attempts, e));
            };
            tracing::warn!(
                attempt = attempts,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                "{what} failed, retrying: {e:#}"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_interval_ms: 1,
            max_interval_ms: 5,
            ..Default::default()
        }
    }

    #[test]
    fn intervals_grow_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_interval_ms: 100,
            max_interval_ms: 1_000,
            randomization_factor: 0.0,
            multiplier: 2.0,
        };
        let mut backoff = policy.backoff();
        let delays: Vec<u64> = (0..6)
            .map(|_| backoff.next_backoff().unwrap().as_millis() as u64)
            .collect();
        assert_eq!(delays, [100, 200, 400, 800, 1_000, 1_000]);
    }

    #[test]
    fn jitter_stays_within_factor() {
        let policy = RetryPolicy {
            initial_interval_ms: 100,
            randomization_factor: 0.5,
            ..Default::default()
        };
        for _ in 0..20 {
            let delay = policy.backoff().next_backoff().unwrap();
            assert!(delay >= Duration::from_millis(50));
            assert!(delay <= Duration::from_millis(151));
        }
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = quick(3)
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    anyhow::bail!("transient")
                }
                Ok(7)
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_keeps_last_error() {
        let calls = AtomicU32::new(0);
        let (attempts, e) = quick(4)
            .run("broken", || async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(anyhow::anyhow!("failure {n}"))
            })
            .await
            .unwrap_err();
        assert_eq!(attempts, 4);
        assert_eq!(e.to_string(), "failure 3");
    }
}
