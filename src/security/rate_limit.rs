//! Per-source token bucket rate limiting.
//!
//! Each source address gets a bucket on its first request holding
//! `max_requests - 1` tokens; that first request is admitted. Later
//! requests spend one token each and are refused with 429 once the bucket
//! is empty. A background task adds one token to every bucket per tick.
//!
//! Request-path decrements and refill increments serialize on the same
//! lock. Buckets are never evicted and refills are not capped.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::http::response::error_response;
use crate::observability::metrics;
use crate::security::source_ip;

/// Message shown on the 429 document.
pub const RATE_LIMITED_MESSAGE: &str = "You have been rate limited. Please try again later";

/// Shared token bucket store.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: Mutex<HashMap<IpAddr, u64>>,
    max_requests: AtomicU32,
}

impl RateLimiter {
    pub fn new(max_requests: u32) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_requests: AtomicU32::new(max_requests),
        }
    }

    /// Bucket size used for sources seen from now on.
    ///
    /// Existing buckets keep their current token count.
    pub fn set_max_requests(&self, max_requests: u32) {
        self.max_requests.store(max_requests, Ordering::Relaxed);
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests.load(Ordering::Relaxed)
    }

    /// Spend a token for `ip`. Returns false when the bucket is empty.
    pub fn try_acquire(&self, ip: IpAddr) -> bool {
        let mut buckets = self.buckets.lock();
        match buckets.get_mut(&ip) {
            Some(0) => false,
            Some(tokens) => {
                *tokens -= 1;
                true
            }
            None => {
                let initial = u64::from(self.max_requests()).saturating_sub(1);
                buckets.insert(ip, initial);
                true
            }
        }
    }

    /// Add one token to every known bucket.
    pub fn refill(&self) {
        let mut buckets = self.buckets.lock();
        for tokens in buckets.values_mut() {
            *tokens = tokens.saturating_add(1);
        }
    }

    /// Remaining tokens for `ip`, if it has been seen.
    pub fn tokens(&self, ip: IpAddr) -> Option<u64> {
        self.buckets.lock().get(&ip).copied()
    }

    /// Number of source addresses with a bucket.
    pub fn tracked_sources(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Start the periodic refill task.
    ///
    /// The task stops when the returned handle is dropped.
    pub fn spawn_refill(self: &Arc<Self>, interval: Duration) -> RefillTask {
        let limiter = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                limiter.refill();
            }
        });

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Rate limit refill task started");
        RefillTask { handle, interval }
    }
}

/// Owner of the refill task. Aborts the task on drop.
#[derive(Debug)]
pub struct RefillTask {
    handle: JoinHandle<()>,
    interval: Duration,
}

impl RefillTask {
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Drop for RefillTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Middleware refusing requests from sources with an empty bucket.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = source_ip(&addr);

    if limiter.try_acquire(ip) {
        next.run(request).await
    } else {
        tracing::warn!(client = %ip, path = %request.uri().path(), "Rate limit exceeded");
        metrics::record_rate_limited();
        error_response(StatusCode::TOO_MANY_REQUESTS, Some(RATE_LIMITED_MESSAGE))
    }
}
