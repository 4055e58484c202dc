// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>


use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Capped exponential backoff with an optional attempt ceiling.
///
/// `max_attempts: None` retries until success. That is the correct mode for
/// operations that must eventually land (round advance, a stuck settlement):
/// a hard retry ceiling there would leave the auction wedged.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: Option<usize>,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn bounded(max_attempts: usize, base_delay: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    pub fn unbounded(base_delay: Duration) -> Self {
        Self {
            max_attempts: None,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    pub async fn run<F, Fut, T, E>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut delay = self.base_delay;
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(v) => return Ok(v),
                Err(_) if self.max_attempts.map_or(true, |max| attempt < max) => {
                    sleep(delay).await;
                    delay = delay.saturating_mul(2).min(self.max_delay);
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Retry an async operation with exponential backoff.
pub async fn retry_async<F, Fut, T, E>(
    op: F,
    attempts: usize,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    RetryPolicy::bounded(attempts, initial_delay).run(op).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let counter = AtomicUsize::new(0);
        let res: Result<u32, ()> = retry_async(
            |_| {
                let current = counter.fetch_add(1, Ordering::Relaxed);
                async move {
                    if current < 2 {
                        Err(())
                    } else {
                        Ok(7)
                    }
                }
            },
            4,
            Duration::from_millis(1),
        )
        .await;

        assert_eq!(res.unwrap(), 7);
        assert!(counter.load(Ordering::Relaxed) >= 3);
    }

    #[tokio::test]
    async fn bounded_policy_surfaces_last_error() {
        let counter = AtomicUsize::new(0);
        let res: Result<u32, &str> = RetryPolicy::bounded(3, Duration::from_millis(1))
            .run(|_| {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Err("ledger unreachable") }
            })
            .await;

        assert_eq!(res.unwrap_err(), "ledger unreachable");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn unbounded_policy_outlasts_a_long_error_streak() {
        let res: Result<u32, ()> = RetryPolicy {
            max_attempts: None,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
        .run(|attempt| async move { if attempt < 10 { Err(()) } else { Ok(attempt as u32) } })
        .await;

        assert_eq!(res.unwrap(), 10);
    }
}
