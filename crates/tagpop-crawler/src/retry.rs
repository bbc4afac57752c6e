use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::RetryConfig;
use crate::stats::RunStats;

/// Re-runs a fallible operation with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct Retry {
    max_attempts: u32,
    backoff_base: f64,
    jitter_max: f64,
}

impl Retry {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            backoff_base: config.backoff_base,
            jitter_max: config.jitter_max,
        }
    }

    /// Runs `op` until it succeeds or `max_attempts` is reached.
    ///
    /// Every failure followed by another attempt counts as a retry, the
    /// final failure counts as a failure and is returned.
    pub async fn run<T, E, F, Fut>(&self, label: &str, stats: &RunStats, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < self.max_attempts => {
                    let delay = self.delay(attempt);
                    log::warn!(
                        "{label} failed (attempt {}/{}), retrying in {delay:.1?}: {e}",
                        attempt + 1,
                        self.max_attempts
                    );
                    RunStats::incr(&stats.retries);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    RunStats::incr(&stats.failures);
                    return Err(e);
                }
            }
        }
    }

    /// Sleep before the attempt following `attempt`, a zero base disables it.
    pub fn delay(&self, attempt: u32) -> Duration {
        if self.backoff_base <= 0.0 {
            return Duration::ZERO;
        }
        let jitter = if self.jitter_max > 0.0 {
            rand::thread_rng().gen_range(0.0..self.jitter_max)
        } else {
            0.0
        };
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        Duration::try_from_secs_f64(self.backoff_base.powi(exp) + jitter).unwrap_or(Duration::MAX)
    }
}
