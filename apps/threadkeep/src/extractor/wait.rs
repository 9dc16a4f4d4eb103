//! Cooperative polling until a page condition holds.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{self, MissedTickBehavior};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
    /// Upper bound on the whole wait, independent of `max_attempts`.
    pub timeout: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            max_attempts: 240,
            timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WaitError {
    #[error("condition still unmet after {attempts} checks")]
    Exhausted { attempts: u32 },

    #[error("gave up waiting after {after:?}")]
    TimedOut { after: Duration },
}

/// Checks `condition` immediately, then once per `policy.interval`, until it
/// returns true. Returns the number of checks made.
pub async fn wait_until<F, Fut>(policy: &WaitPolicy, mut condition: F) -> Result<u32, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let period = policy.interval.max(Duration::from_millis(1));
    let max_attempts = policy.max_attempts;

    let poll = async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        for attempt in 1..=max_attempts {
            ticker.tick().await;
            if condition().await {
                return Ok(attempt);
            }
        }
        Err(WaitError::Exhausted {
            attempts: max_attempts,
        })
    };

    time::timeout(policy.timeout, poll)
        .await
        .map_err(|_| WaitError::TimedOut {
            after: policy.timeout,
        })?
}
