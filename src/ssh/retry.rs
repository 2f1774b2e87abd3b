//! Retry with exponential backoff.

use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Policy for retrying a fallible async operation with a doubling delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    /// Three attempts, sleeping 100ms then 200ms in between.
    fn default() -> Self {
        Self::new(Duration::from_millis(100), 3)
    }
}

impl Backoff {
    pub fn new(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts,
        }
    }

    /// Delay to sleep after the given failed attempt (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.min(31);
        let multiplier = 1u32.checked_shl(shift).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(multiplier)
    }

    /// Run `op` until it succeeds or the attempt budget is spent.
    ///
    /// No delay follows the final failed attempt.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let attempts = self.max_attempts.max(1);
        let mut errors: Vec<E> = Vec::new();

        for attempt in 0..attempts {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    tracing::debug!("attempt {}/{} failed: {}", attempt + 1, attempts, err);
                    let repeated = errors
                        .last()
                        .is_some_and(|last| last.to_string() == err.to_string());
                    if !repeated {
                        errors.push(err);
                    }
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.delay_for(attempt)).await;
            }
        }

        Err(RetryError { attempts, errors })
    }
}

/// All attempts failed; holds each distinct error in the order seen.
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub errors: Vec<E>,
}

impl<E> RetryError<E> {
    pub fn last(&self) -> Option<&E> {
        self.errors.last()
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "all {} attempts failed", self.attempts)?;
        for (i, err) in self.errors.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, err)?;
        }
        Ok(())
    }
}

impl<E> std::error::Error for RetryError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .last()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}
