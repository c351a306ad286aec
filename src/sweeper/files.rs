//! Expired upload removal.
//!
//! The storage directory belongs to the upload server; this sweep only
//! observes entry names and modification times. Anything older than the
//! retention window goes, one log line per deletion.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::time::{self, Instant, MissedTickBehavior};

use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// Outcome of one pass over the storage directory.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: Vec<String>,
    pub failed: usize,
}

#[derive(Debug)]
pub struct FileSweeper {
    dir: PathBuf,
    interval: Duration,
    retention: Duration,
}

impl FileSweeper {
    pub fn new(dir: PathBuf, interval: Duration, retention: Duration) -> Self {
        Self {
            dir,
            interval,
            retention,
        }
    }

    pub async fn run(self, mut shutdown: ShutdownSignal) {
        tracing::info!(
            path = %self.dir.display(),
            interval_secs = self.interval.as_secs(),
            retention_secs = self.retention.as_secs(),
            "File sweeper starting"
        );

        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::error!(
                            path = %self.dir.display(),
                            error = %e,
                            "Failed to read upload directory, skipping cycle"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    tracing::info!("File sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    pub async fn sweep_once(&self) -> io::Result<SweepReport> {
        self.sweep_at(SystemTime::now()).await
    }

    /// One pass, judging age against `now`.
    ///
    /// Only listing the directory can fail the pass. Entries whose metadata
    /// cannot be read are skipped; entries already gone count as removed by
    /// someone else and are ignored.
    pub async fn sweep_at(&self, now: SystemTime) -> io::Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(_) => continue,
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            // Timestamps in the future are treated as fresh.
            let expired = now
                .duration_since(modified)
                .map(|age| age > self.retention)
                .unwrap_or(false);
            if !expired {
                continue;
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    tracing::info!(file = %name, "Removed expired upload");
                    metrics::record_file_expired();
                    report.removed.push(name);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "Failed to remove expired upload");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }
}
