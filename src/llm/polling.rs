use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::time::sleep;

use crate::error::{InsightsError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Backoff {
    Fixed,
    Exponential { factor: f64, max_interval: Duration },
}

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(2), 30)
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            backoff: Backoff::Fixed,
        }
    }

    pub fn exponential(
        interval: Duration,
        max_attempts: u32,
        factor: f64,
        max_interval: Duration,
    ) -> Self {
        Self {
            interval,
            max_attempts,
            backoff: Backoff::Exponential {
                factor,
                max_interval,
            },
        }
    }

    /// Delay after the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.interval,
            Backoff::Exponential {
                factor,
                max_interval,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let secs = self.interval.as_secs_f64() * factor.powi(exponent);
                if secs.is_finite() && secs >= 0.0 {
                    Duration::from_secs_f64(secs.min(max_interval.as_secs_f64()))
                } else {
                    max_interval
                }
            }
        }
    }

    /// Total time spent sleeping if every attempt comes back pending.
    pub fn max_wait(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.delay_for(a)).sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus<T> {
    Ready(T),
    Pending(String),
    Failed(String),
}

/// Runs `op` until it reports `Ready`, sleeping between attempts per `policy`.
///
/// `Failed` is terminal. Errors returned by `op` propagate immediately.
/// Exhausting `max_attempts` yields [`InsightsError::Timeout`].
pub async fn poll_until<T, F, Fut>(resource: &str, policy: &PollPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<PollStatus<T>>>,
{
    let mut waited = Duration::ZERO;

    for attempt in 1..=policy.max_attempts {
        match op().await? {
            PollStatus::Ready(value) => return Ok(value),
            PollStatus::Failed(reason) => {
                return Err(InsightsError::ExtractionFailed(format!(
                    "{} failed: {}",
                    resource, reason
                )))
            }
            PollStatus::Pending(state) => {
                debug!(
                    "{} is {} (attempt {}/{})",
                    resource, state, attempt, policy.max_attempts
                );
                if attempt < policy.max_attempts {
                    let delay = policy.delay_for(attempt);
                    sleep(delay).await;
                    waited += delay;
                }
            }
        }
    }

    Err(InsightsError::Timeout {
        resource: resource.to_string(),
        attempts: policy.max_attempts,
        waited,
    })
}
