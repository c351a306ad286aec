//! Connection lifecycle tracking.
//!
//! # Responsibilities
//! - Count open connections so shutdown can wait for them to drain
//! - Give each connection an ID for tracing
//! - Track in-flight requests per connection to detect idleness

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Relaxed ordering is enough: IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts open connections.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new connection. The guard decrements the count on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until every tracked connection has closed.
    pub async fn wait_for_drain(&self) {
        while self.active_count() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// In-flight request bookkeeping for one connection.
#[derive(Debug)]
pub struct ConnectionActivity {
    in_flight: AtomicUsize,
    idle_since: Mutex<Instant>,
}

impl ConnectionActivity {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            idle_since: Mutex::new(Instant::now()),
        })
    }

    /// Mark a request as started; dropping the guard marks it finished.
    pub fn begin(self: &Arc<Self>) -> ActivityGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        ActivityGuard {
            activity: Arc::clone(self),
        }
    }

    /// When the connection will have been idle for `idle`, or `None` while a
    /// request is in flight.
    pub fn idle_deadline(&self, idle: Duration) -> Option<Instant> {
        if self.in_flight.load(Ordering::SeqCst) > 0 {
            return None;
        }
        let since = *self.idle_since.lock().unwrap_or_else(PoisonError::into_inner);
        Some(since + idle)
    }

    pub fn is_idle_for(&self, idle: Duration) -> bool {
        self.idle_deadline(idle)
            .is_some_and(|deadline| deadline <= Instant::now())
    }
}

pub struct ActivityGuard {
    activity: Arc<ConnectionActivity>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        // Stamp before decrementing so a watcher never sees zero in-flight
        // paired with a stale timestamp.
        *self
            .activity
            .idle_since
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
