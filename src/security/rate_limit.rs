//! Per-client admission control.
//!
//! A token bucket per client identity, held in a registry that owns every
//! bucket behind a single lock. Lookup-or-create, the last-seen refresh and
//! the token spend happen in one critical section, so concurrent first
//! requests from one client never create two buckets and never double-spend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::http::response::rejection;
use crate::observability::metrics::{self, RejectReason};
use crate::security::headers::SecurityHeaders;
use crate::security::identity::IdentityResolver;

/// Bucket size and refill speed shared by every client.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitPolicy {
    /// Burst size.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_rate: f64,
}

impl RateLimitPolicy {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            capacity: f64::from(config.burst_size),
            refill_rate: config.requests_per_second,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            capacity: 5.0,
            refill_rate: 2.0,
        }
    }
}

/// A token bucket. Starts full.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn full(policy: &RateLimitPolicy, now: Instant) -> Self {
        Self {
            tokens: policy.capacity,
            last_refill: now,
        }
    }

    /// Refill for the time elapsed since the last check, then spend one token
    /// if a whole one is available.
    pub fn try_acquire(&mut self, policy: &RateLimitPolicy, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * policy.refill_rate).min(policy.capacity);
        self.last_refill = self.last_refill.max(now);

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }
}

/// Admission state for one client.
#[derive(Debug, Clone)]
pub struct VisitorState {
    pub limiter: TokenBucket,
    pub last_seen: Instant,
}

/// Concurrent client identity → [`VisitorState`] map.
///
/// The map is never handed out; callers work on a visitor through
/// [`ClientRegistry::with_visitor`] while the lock is held.
#[derive(Debug)]
pub struct ClientRegistry {
    visitors: Mutex<HashMap<String, VisitorState>>,
    policy: RateLimitPolicy,
}

impl ClientRegistry {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            visitors: Mutex::new(HashMap::new()),
            policy,
        }
    }

    // Every critical section leaves the map consistent, so a panic elsewhere
    // while holding the lock does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, VisitorState>> {
        self.visitors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on the visitor for `identity`, creating it on first sight.
    /// `last_seen` is refreshed to `now` before `f` runs.
    pub fn with_visitor<R>(
        &self,
        identity: &str,
        now: Instant,
        f: impl FnOnce(&RateLimitPolicy, &mut VisitorState) -> R,
    ) -> R {
        let mut visitors = self.lock();
        let tracked = visitors.len();
        let visitor = visitors.entry(identity.to_string()).or_insert_with(|| {
            tracing::trace!(client = %identity, "Tracking new client");
            metrics::record_tracked_clients(tracked + 1);
            VisitorState {
                limiter: TokenBucket::full(&self.policy, now),
                last_seen: now,
            }
        });
        visitor.last_seen = visitor.last_seen.max(now);
        f(&self.policy, visitor)
    }

    /// Drop every visitor idle for longer than `idle`. Returns how many went.
    pub fn sweep(&self, idle: Duration) -> usize {
        self.sweep_at(Instant::now(), idle)
    }

    pub fn sweep_at(&self, now: Instant, idle: Duration) -> usize {
        let mut visitors = self.lock();
        let before = visitors.len();
        visitors.retain(|_, visitor| now.saturating_duration_since(visitor.last_seen) <= idle);
        let remaining = visitors.len();
        drop(visitors);

        metrics::record_tracked_clients(remaining);
        before - remaining
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.lock().contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Token-bucket admission keyed by client identity.
#[derive(Debug, Clone)]
pub struct AdmissionLimiter {
    registry: Arc<ClientRegistry>,
}

impl AdmissionLimiter {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Admit or reject one request from `identity`.
    pub fn allow(&self, identity: &str) -> bool {
        self.allow_at(identity, Instant::now())
    }

    pub fn allow_at(&self, identity: &str, now: Instant) -> bool {
        self.registry
            .with_visitor(identity, now, |policy, visitor| visitor.limiter.try_acquire(policy, now))
    }
}

/// State for [`admission_middleware`].
#[derive(Clone)]
pub struct AdmissionState {
    pub limiter: AdmissionLimiter,
    pub identity: IdentityResolver,
    /// Applied to the 429 so the short-circuited response is hardened too.
    pub headers: Arc<SecurityHeaders>,
    pub enabled: bool,
}

/// First gate of the pipeline. Exhausted clients get a 429 and the rest of
/// the pipeline never runs.
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let client = state.identity.resolve(&request);
    if state.limiter.allow(&client) {
        return next.run(request).await;
    }

    tracing::debug!(
        client = %client,
        method = %request.method(),
        path = %request.uri().path(),
        "Rate limit exceeded"
    );
    metrics::record_rejection(RejectReason::RateLimit);

    let mut response = rejection(StatusCode::TOO_MANY_REQUESTS);
    state
        .headers
        .decorate(request.method(), request.uri().path(), response.headers_mut());
    response
}
