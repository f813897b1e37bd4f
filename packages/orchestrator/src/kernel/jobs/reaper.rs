//! Lease reaper (C2): the safety net that returns expired leases to
//! `pending` independently of the router, so work survives a wedged
//! router or a dead worker (spec.md §4.3).

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::metrics::Metrics;
use super::store::JobTaskStore;

#[derive(Debug, Clone, Copy)]
pub struct ReaperConfig {
    pub interval: Duration,
    pub max_n: i64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            max_n: 100,
        }
    }
}

pub struct LeaseReaper {
    store: Arc<dyn JobTaskStore>,
    config: ReaperConfig,
    metrics: Arc<Metrics>,
}

impl LeaseReaper {
    pub fn new(store: Arc<dyn JobTaskStore>, config: ReaperConfig, metrics: Arc<Metrics>) -> Self {
        Self { store, config, metrics }
    }

    /// Runs until `shutdown` is cancelled. Intended to be spawned as its
    /// own Tokio task alongside the router (spec.md §4.3: "a standalone
    /// loop because it must continue to run even if the router is
    /// momentarily wedged").
    pub async fn run(self, shutdown: CancellationToken) {
        info!(interval_s = self.config.interval.as_secs(), "lease reaper starting");
        let mut ticker = tokio::time::interval(self.config.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.store.reclaim_expired_leases(self.config.max_n).await {
                        Ok(0) => debug!("reaper: no expired leases"),
                        Ok(n) => {
                            info!(count = n, "reaper: reclaimed expired leases");
                            self.metrics.leases_reclaimed.add(n as u64);
                        }
                        Err(e) => warn!(error = %e, "reaper: reclaim failed"),
                    }
                }
            }
        }
        info!("lease reaper stopped");
    }
}
