use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::config::LoaderSection;
use crate::error::ConfigError;

/// Linear backoff: the wait after failed attempt `n` (1-based) is `n * base_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct RetryOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

impl RetryPolicy {
    pub fn linear(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub async fn run<F, Fut, T, E>(&self, label: &str, mut operation: F) -> Result<RetryOutcome<T>, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => {
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                    })
                }
                Err(err) if attempt >= self.attempts => return Err(err),
                Err(err) => {
                    let wait = self.delay_after(attempt);
                    warn!(attempt, wait = ?wait, stage = label, error = %err, "retrying operation");
                    if !wait.is_zero() {
                        sleep(wait).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

impl TryFrom<&LoaderSection> for RetryPolicy {
    type Error = ConfigError;

    fn try_from(section: &LoaderSection) -> Result<Self, Self::Error> {
        if section.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "loader.max_attempts",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(Self::linear(
            section.max_attempts,
            Duration::from_millis(section.backoff_base_ms),
        ))
    }
}
