//! Cooperative poll loop.
//!
//! One worker: each cycle lists the inbox, then for every group thread
//! fetches its items, keeps those newer than the last processed one and
//! feeds them to the engine oldest first.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::events::{normalize, Event};
use crate::platform::{Platform, PlatformError};

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Group threads visited.
    pub threads: usize,
    /// Events handed to the engine and processed.
    pub processed: usize,
    /// Events or threads that failed.
    pub failed: usize,
}

/// Owns the engine and drives it from the platform.
pub struct Poller {
    platform: Arc<dyn Platform>,
    engine: Engine,
    interval: Duration,
}

impl Poller {
    /// Create a poller reading through `platform`.
    pub fn new(platform: Arc<dyn Platform>, engine: Engine, interval: Duration) -> Self {
        Self {
            platform,
            engine,
            interval,
        }
    }

    /// The engine, for inspection.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Run one cycle.
    ///
    /// # Errors
    ///
    /// Returns an error when the inbox cannot be listed. Failures inside a
    /// thread are logged and counted.
    pub async fn poll_once(&mut self) -> Result<CycleStats, PlatformError> {
        let threads = self.platform.fetch_inbox().await?;
        let mut stats = CycleStats::default();

        for thread in threads.iter().filter(|t| t.is_group) {
            stats.threads = stats.threads.saturating_add(1);
            let thread_id = thread.thread_id.as_str();

            let items = match self.platform.fetch_thread_items(thread_id).await {
                Ok(items) => items,
                Err(e) => {
                    warn!(thread_id, error = %e, "failed to fetch thread items");
                    stats.failed = stats.failed.saturating_add(1);
                    continue;
                }
            };

            for event in select_new(&items, self.engine.last_processed(thread_id)) {
                match self.engine.on_event(thread_id, &event).await {
                    Ok(report) if report.processed => {
                        stats.processed = stats.processed.saturating_add(1);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(thread_id, event_id = %event.id, error = %e, "event handling failed");
                        stats.failed = stats.failed.saturating_add(1);
                        // Later events wait so an unrecorded one is retried in order.
                        break;
                    }
                }
            }
        }

        Ok(stats)
    }

    /// Poll until `shutdown` flips to `true` or its sender is dropped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "poller started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(stats) => debug!(
                            threads = stats.threads,
                            processed = stats.processed,
                            failed = stats.failed,
                            "poll cycle finished"
                        ),
                        Err(e) => warn!(error = %e, "poll cycle failed"),
                    }
                }
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("poller shutting down");
                        break;
                    }
                }
            }
        }
    }
}

/// Pick the items to process, oldest first.
///
/// `items` is newest first, as the platform returns it. Without a last
/// processed id only the newest item is taken, so a fresh start does not
/// replay history. When the last id is in the page, only newer items are
/// taken; when it has scrolled out of the page, the whole page is.
pub fn select_new(items: &[Value], last_processed: Option<&str>) -> Vec<Event> {
    let events: Vec<Event> = items.iter().map(normalize).collect();
    let fresh: Vec<Event> = match last_processed {
        None => events.into_iter().take(1).collect(),
        Some(last) => events.into_iter().take_while(|e| e.id != last).collect(),
    };
    fresh.into_iter().rev().collect()
}
