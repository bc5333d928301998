//! Periodic TTL eviction for the result store.
//!
//! The `Reaper` wakes on a fixed period and evicts results nobody claimed
//! within the TTL. Evicted payloads are dropped right here, which is where
//! their memory goes back to the allocator. A failing sweep is logged and
//! the loop keeps going; only the cancellation token stops it.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::store::{ResidentSize, ResultStore};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub reclaimed_bytes: usize,
    pub remaining: usize,
}

/// Background task evicting expired results.
#[derive(Debug)]
pub struct Reaper<V> {
    store: Arc<ResultStore<V>>,
    ttl: Duration,
    period: Duration,
}

impl<V> Reaper<V>
where
    V: Clone + ResidentSize + Send + Sync + 'static,
{
    pub fn new(store: Arc<ResultStore<V>>, ttl: Duration, period: Duration) -> Self {
        Self {
            store,
            ttl,
            period: period.max(Duration::from_millis(1)),
        }
    }

    /// Run a single sweep now. Returns `None` if the sweep panicked.
    pub fn sweep_once(&self) -> Option<SweepReport> {
        let swept = catch_unwind(AssertUnwindSafe(|| {
            let evicted = self.store.evict_expired(Instant::now(), self.ttl);
            let reclaimed_bytes = evicted.iter().map(|(_, v)| v.resident_bytes()).sum();
            SweepReport {
                removed: evicted.len(),
                reclaimed_bytes,
                remaining: self.store.len(),
            }
        }));

        match swept {
            Ok(report) => {
                if report.removed > 0 {
                    info!(
                        removed = report.removed,
                        reclaimed_bytes = report.reclaimed_bytes,
                        remaining = report.remaining,
                        "evicted expired results"
                    );
                } else {
                    debug!(remaining = report.remaining, "sweep found nothing to evict");
                }
                Some(report)
            }
            Err(_) => {
                error!("result sweep panicked; will retry next tick");
                None
            }
        }
    }

    /// Sweep every period until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it.
        ticker.tick().await;

        info!(
            ttl_secs = self.ttl.as_secs(),
            period_secs = self.period.as_secs(),
            "reaper started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.sweep_once();
                }
            }
        }

        info!("reaper stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cutout::Cutout;
    use cutout_types::owner::OwnerId;
    use image::RgbaImage;

    const TTL: Duration = Duration::from_secs(600);
    const PERIOD: Duration = Duration::from_secs(300);

    fn cutout() -> Cutout {
        Cutout::new(RgbaImage::new(4, 4))
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_once_reports_evictions() {
        let store = Arc::new(ResultStore::new());
        store.put(OwnerId(1), cutout());
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        store.put(OwnerId(2), cutout());

        let reaper = Reaper::new(Arc::clone(&store), TTL, PERIOD);
        let report = reaper.sweep_once().unwrap();

        assert_eq!(
            report,
            SweepReport {
                removed: 1,
                reclaimed_bytes: 64,
                remaining: 1,
            }
        );
        assert!(store.get(OwnerId(1)).is_none());
        assert!(store.get(OwnerId(2)).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn loop_evicts_on_schedule_and_stops_on_cancel() {
        let store = Arc::new(ResultStore::new());
        store.put(OwnerId(1), cutout());

        let cancel = CancellationToken::new();
        let task = Reaper::new(Arc::clone(&store), TTL, PERIOD).spawn(cancel.clone());

        // Ticks at 5 and 10 minutes: entry is not yet older than the TTL.
        tokio::time::sleep(Duration::from_secs(601)).await;
        assert!(store.contains(OwnerId(1)));

        // Tick at 15 minutes evicts it.
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert!(!store.contains(OwnerId(1)));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entries_survive_sweeps() {
        let store = Arc::new(ResultStore::new());
        let reaper = Reaper::new(Arc::clone(&store), TTL, PERIOD);
        store.put(OwnerId(9), cutout());

        tokio::time::advance(TTL - Duration::from_secs(1)).await;
        assert_eq!(reaper.sweep_once().unwrap().removed, 0);
        assert!(store.contains(OwnerId(9)));
    }
}
