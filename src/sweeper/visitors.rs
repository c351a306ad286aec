//! Idle visitor eviction.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::security::rate_limit::ClientRegistry;

#[derive(Debug)]
pub struct VisitorSweeper {
    registry: Arc<ClientRegistry>,
    interval: Duration,
    idle: Duration,
}

impl VisitorSweeper {
    pub fn new(registry: Arc<ClientRegistry>, interval: Duration, idle: Duration) -> Self {
        Self {
            registry,
            interval,
            idle,
        }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            idle_secs = self.idle.as_secs(),
            "Visitor sweeper starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep_once();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Visitor sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub fn sweep_once(&self) -> usize {
        let evicted = self.registry.sweep(self.idle);
        if evicted > 0 {
            tracing::debug!(evicted, remaining = self.registry.len(), "Evicted idle visitors");
            metrics::record_visitors_evicted(evicted);
        }
        evicted
    }
}
