//! Per-IP request throttling
//!
//! Backed by a single keyed governor limiter: each client IP draws from its
//! own token bucket, and idle buckets are pruned by a background task.

use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tracing::{debug, warn};

use crate::utils::AppError;

/// Sustained rate and burst allowance for one throttled surface
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst_size: u32,
}

impl RateLimitConfig {
    /// Limits for the magic-link endpoint, taken from the app configuration
    pub fn for_auth(settings: &crate::config::RateLimitSettings) -> Self {
        Self {
            requests_per_second: settings.auth_requests_per_second,
            burst_size: settings.auth_burst_size,
        }
    }

    fn quota(&self) -> Quota {
        // Config validation rejects zeroes; clamp anyway so a bad value
        // throttles hard instead of panicking
        let rate = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(NonZeroU32::MIN);
        Quota::per_second(rate).allow_burst(burst)
    }
}

/// Shared throttle handle, cheap to clone into middleware state
#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl RateLimitState {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            limiter: Arc::new(RateLimiter::keyed(config.quota())),
        }
    }

    /// True when the IP still has allowance; consumes one unit when it does
    fn allow(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }

    /// Drop buckets that have fully replenished, then release their capacity
    pub fn prune(&self) {
        let before = self.limiter.len();
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
        let after = self.limiter.len();
        if after < before {
            debug!(before, after, "Pruned idle rate limiter buckets");
        }
    }
}

/// Middleware rejecting over-limit requests with a 429 envelope
pub async fn rate_limit_middleware(
    State(rate_limit): State<RateLimitState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let ip = addr.ip();
    if rate_limit.allow(ip) {
        next.run(request).await
    } else {
        warn!(ip = %ip, "Rate limit exceeded");
        ([("Retry-After", "1")], AppError::RateLimited).into_response()
    }
}

/// Spawn the hourly bucket-pruning task
pub fn spawn_rate_limit_cleanup(state: RateLimitState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(3600));
        loop {
            interval.tick().await;
            state.prune();
        }
    });
}
