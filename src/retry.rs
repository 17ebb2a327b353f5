//! Bounded retries with fixed or exponential delays.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::RetryIf;
use tracing::warn;

/// How the delay between attempts evolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    Fixed,
    /// Delay doubles after every retry.
    Exponential,
}

/// Retry policy: total attempts plus the delay schedule between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: usize,
    delay: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    /// `attempts` tries in total, waiting `delay` between each.
    pub fn fixed(attempts: usize, delay: Duration) -> Self {
        Self { attempts: attempts.max(1), delay, backoff: Backoff::Fixed }
    }

    /// `attempts` tries in total, waiting `initial`, then twice that, and so on.
    pub fn exponential(attempts: usize, initial: Duration) -> Self {
        Self { attempts: attempts.max(1), delay: initial, backoff: Backoff::Exponential }
    }

    /// Single attempt, no retry.
    pub fn none() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    /// Delays slept between consecutive attempts.
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        let retries = self.attempts - 1;
        match self.backoff {
            Backoff::Fixed => Box::new(FixedInterval::new(self.delay).take(retries)),
            Backoff::Exponential => {
                let initial = self.delay;
                Box::new((0..retries as u32).map(move |n| initial.saturating_mul(1 << n.min(16))))
            }
        }
    }

    /// Runs `action` until it succeeds or the attempts are used up.
    pub async fn run<T, E, F, Fut>(&self, operation: &str, action: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.run_if(operation, action, |_: &E| true).await
    }

    /// Like [`run`](Self::run), but stops early when `retryable` rejects an error.
    pub async fn run_if<T, E, F, Fut, P>(
        &self,
        operation: &str,
        action: F,
        mut retryable: P,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: FnMut(&E) -> bool,
    {
        let attempts = self.attempts;
        let mut attempt = 0;
        let condition = move |err: &E| {
            attempt += 1;
            if !retryable(err) {
                warn!("{} failed permanently: {}", operation, err);
                return false;
            }
            if attempt < attempts {
                warn!("{} failed (attempt {}/{}): {}. Retrying", operation, attempt, attempts, err);
            }
            true
        };

        RetryIf::spawn(self.delays(), action, condition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fixed_delays() {
        let policy = RetryPolicy::fixed(5, Duration::from_secs(5));
        let delays: Vec<_> = policy.delays().collect();
        assert_eq!(delays, vec![Duration::from_secs(5); 4]);
    }

    #[test]
    fn test_exponential_delays_double() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(1));
        let delays: Vec<_> = policy.delays().map(|d| d.as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let policy = RetryPolicy::fixed(0, Duration::from_secs(1));
        assert_eq!(policy.attempts(), 1);
        assert_eq!(policy.delays().count(), 0);
        assert_eq!(RetryPolicy::none().attempts(), 1);
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy::fixed(5, Duration::ZERO);

        let result: Result<u32, String> = policy
            .run("flaky op", move || async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(format!("failure {}", n))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy::fixed(5, Duration::ZERO);

        let result: Result<(), String> = policy
            .run("always failing", move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("nope".to_string())
            })
            .await;

        assert_eq!(result, Err("nope".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_non_retryable_stops_immediately() {
        let calls = AtomicUsize::new(0);
        let counter = &calls;
        let policy = RetryPolicy::exponential(5, Duration::ZERO);

        let result: Result<(), String> = policy
            .run_if(
                "fatal op",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("fatal".to_string())
                },
                |err: &String| err != "fatal",
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
