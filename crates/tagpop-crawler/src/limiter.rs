use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};

/// Enforces a minimum interval between the starts of two requests to the
/// same host.
///
/// Each caller books the next free slot of its host under the lock, then
/// sleeps outside of it, so concurrent callers are spaced by `interval`.
#[derive(Debug, Clone)]
pub struct HostLimiter {
    interval: Duration,
    next_slots: Arc<Mutex<HashMap<String, Instant>>>,
}

impl HostLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Waits until a request to `host` may start.
    pub async fn wait(&self, host: &str) {
        if self.interval.is_zero() {
            return;
        }

        let slot = {
            let mut slots = self.next_slots.lock().unwrap_or_else(|e| e.into_inner());
            let now = Instant::now();
            let slot = match slots.get(host) {
                Some(&next) if next > now => next,
                _ => now,
            };
            slots.insert(host.to_string(), slot + self.interval);
            slot
        };

        if slot > Instant::now() {
            log::trace!("Throttling {host} for {:?}", slot - Instant::now());
        }
        sleep_until(slot).await;
    }
}
