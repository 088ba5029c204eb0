use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use pc_error::{PcError, Result};

/// Request budget per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: usize,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 10,
            window: Duration::from_millis(60_000),
        }
    }
}

/// Sliding-window request counter keyed by identity.
///
/// State is process-local and starts empty; each identity keeps only the
/// timestamps of accepted requests still inside the window. Best-effort
/// only: separate processes do not share counts.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(&self, identity: &str, max_requests: usize, window: Duration) -> bool {
        self.allow_at(identity, max_requests, window, Instant::now())
    }

    pub fn allow_at(
        &self,
        identity: &str,
        max_requests: usize,
        window: Duration,
        now: Instant,
    ) -> bool {
        self.admit(identity, max_requests, window, now).is_ok()
    }

    /// Like [`RateLimiter::allow`], but reports a rejection as [`PcError::RateLimited`].
    pub fn check(&self, identity: &str, policy: &RateLimitPolicy) -> Result<()> {
        self.admit(identity, policy.max_requests, policy.window, Instant::now())
            .map_err(|wait| PcError::RateLimited {
                limit: policy.max_requests,
                window_ms: policy.window.as_millis() as u64,
                retry_after: Some(wait),
            })
    }

    /// Number of identities with at least one live timestamp.
    pub fn tracked_identities(&self) -> usize {
        self.lock().len()
    }

    /// Timestamps currently held for `identity` (pruned on the next check).
    pub fn window_len(&self, identity: &str) -> usize {
        self.lock().get(identity).map_or(0, VecDeque::len)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        // the critical section cannot leave the map inconsistent, so a poisoned lock is still usable
        self.windows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns how long until the oldest timestamp leaves the window on rejection.
    fn admit(
        &self,
        identity: &str,
        max_requests: usize,
        window: Duration,
        now: Instant,
    ) -> std::result::Result<(), Duration> {
        let mut windows = self.lock();
        // identities whose newest timestamp has aged out hold nothing live
        windows.retain(|_, ts| {
            ts.back()
                .is_some_and(|&t| now.saturating_duration_since(t) <= window)
        });
        let timestamps = windows.entry(identity.to_string()).or_default();

        while timestamps
            .front()
            .is_some_and(|&t| now.saturating_duration_since(t) > window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() < max_requests {
            timestamps.push_back(now);
            return Ok(());
        }

        let wait = timestamps
            .front()
            .map(|&oldest| window.saturating_sub(now.saturating_duration_since(oldest)))
            .unwrap_or(window);
        if timestamps.is_empty() {
            windows.remove(identity);
        }
        Err(wait)
    }
}
