//! Background expiry.
//!
//! # Data Flow
//! ```text
//! every visitor_sweep_interval:
//!     visitors.rs → ClientRegistry::sweep(visitor_idle)
//!
//! every file_sweep_interval:
//!     files.rs → list storage_dir → delete entries older than file_retention
//! ```
//!
//! # Design Decisions
//! - Two independent tasks: a slow directory listing never delays eviction
//! - Failures are logged and the cycle skipped; nothing reaches a client
//! - The first run happens one interval after start, not at start
//! - Both tasks stop on the shared shutdown signal

pub mod files;
pub mod visitors;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::{SweeperConfig, UploadConfig};
use crate::lifecycle::Shutdown;
use crate::security::rate_limit::ClientRegistry;

pub use files::{FileSweeper, SweepReport};
pub use visitors::VisitorSweeper;

/// Both expiry schedules, ready to be spawned.
#[derive(Debug)]
pub struct ExpirySweeper {
    pub visitors: VisitorSweeper,
    pub files: FileSweeper,
}

/// Join handles for the spawned sweep tasks.
#[derive(Debug)]
pub struct SweeperHandles {
    pub visitors: JoinHandle<()>,
    pub files: JoinHandle<()>,
}

impl SweeperHandles {
    /// Wait for both tasks to finish (after shutdown has been triggered).
    pub async fn join(self) {
        for (name, handle) in [("visitors", self.visitors), ("files", self.files)] {
            if let Err(e) = handle.await {
                tracing::error!(sweeper = name, error = %e, "Sweeper task failed");
            }
        }
    }
}

impl ExpirySweeper {
    pub fn new(registry: Arc<ClientRegistry>, sweeper: &SweeperConfig, upload: &UploadConfig) -> Self {
        Self {
            visitors: VisitorSweeper::new(
                registry,
                sweeper.visitor_sweep_interval(),
                sweeper.visitor_idle(),
            ),
            files: FileSweeper::new(
                upload.storage_dir.clone(),
                sweeper.file_sweep_interval(),
                sweeper.file_retention(),
            ),
        }
    }

    pub fn spawn(self, shutdown: &Shutdown) -> SweeperHandles {
        SweeperHandles {
            visitors: tokio::spawn(self.visitors.run(shutdown.subscribe())),
            files: tokio::spawn(self.files.run(shutdown.subscribe())),
        }
    }
}
