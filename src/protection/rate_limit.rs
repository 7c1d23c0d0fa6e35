//! Sliding-window detection of mass removals.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::config::ProtectionConfig;

/// Per-actor sliding window of removal timestamps.
///
/// Exemptions (owner, bot and assistant accounts) are the caller's concern:
/// exempt actors must simply not be recorded.
#[derive(Debug)]
pub struct KickLimiter {
    window: Duration,
    threshold: usize,
    windows: HashMap<String, VecDeque<Instant>>,
}

impl KickLimiter {
    /// Create a limiter that fires when `threshold` removals fall inside `window`.
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold: threshold.max(1),
            windows: HashMap::new(),
        }
    }

    /// Build from protection config.
    pub fn from_config(cfg: &ProtectionConfig) -> Self {
        Self::new(Duration::from_secs(cfg.kick_window_secs), cfg.kick_threshold)
    }

    /// Record a removal by `actor` now.
    pub fn record_removal(&mut self, actor: &str) -> bool {
        self.record_at(actor, Instant::now())
    }

    /// Record a removal by `actor` at `now`.
    ///
    /// Returns `true` exactly when the window reaches the threshold; the
    /// actor's window is then cleared so the same burst fires once.
    pub fn record_at(&mut self, actor: &str, now: Instant) -> bool {
        let window = self.windows.entry(actor.to_owned()).or_default();

        while window
            .front()
            .is_some_and(|t| now.saturating_duration_since(*t) >= self.window)
        {
            window.pop_front();
        }
        window.push_back(now);

        if window.len() >= self.threshold {
            self.windows.remove(actor);
            return true;
        }
        false
    }

    /// Removals currently counted against `actor`.
    pub fn pending(&self, actor: &str) -> usize {
        self.windows.get(actor).map_or(0, VecDeque::len)
    }
}
