//! Per-client rate limiting for the API
//!
//! A keyed `governor` limiter holds one token bucket per client IP. The
//! bucket holds `requests_per_hour` cells and refills one cell every
//! `3600 / requests_per_hour` seconds. Buckets that have refilled completely
//! are pruned periodically so idle clients do not accumulate.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

const FORWARDED_FOR: &str = "x-forwarded-for";
const LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Rate limiting middleware state
#[derive(Clone)]
pub struct ApiRateLimit {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    requests_per_hour: NonZeroU32,
}

impl std::fmt::Debug for ApiRateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimit")
            .field("requests_per_hour", &self.requests_per_hour)
            .finish()
    }
}

impl ApiRateLimit {
    /// Limiter allowing `requests` per client per hour; `None` when zero
    pub fn per_hour(requests: u32) -> Option<Self> {
        let requests_per_hour = NonZeroU32::new(requests)?;
        Some(Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_hour(requests_per_hour))),
            requests_per_hour,
        })
    }

    /// Take one request from the client's budget
    pub fn check(&self, client: IpAddr) -> Result<()> {
        self.limiter
            .check_key(&client)
            .map_err(|_| Error::RateLimitExceeded)
    }

    /// Drop buckets of clients that are back to a full budget
    pub fn prune(&self) {
        self.limiter.retain_recent();
        self.limiter.shrink_to_fit();
    }

    /// Number of clients currently holding a bucket
    pub fn tracked_clients(&self) -> usize {
        self.limiter.len()
    }

    /// Prune every `period` until the runtime shuts down
    pub fn spawn_pruning(&self, period: Duration) -> JoinHandle<()> {
        let limit = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let before = limit.tracked_clients();
                limit.prune();
                tracing::debug!(before, after = limit.tracked_clients(), "rate limit buckets pruned");
            }
        })
    }

    /// Middleware function rejecting clients over their budget
    pub async fn middleware(
        State(limit): State<Self>,
        request: Request,
        next: Next,
    ) -> Result<Response> {
        let client = client_ip(&request);
        if let Err(err) = limit.check(client) {
            tracing::warn!(%client, path = request.uri().path(), "rate limit exceeded");
            return Err(err);
        }

        let mut response = next.run(request).await;
        response.headers_mut().insert(
            LIMIT_HEADER,
            HeaderValue::from(limit.requests_per_hour.get()),
        );
        Ok(response)
    }
}

/// Address of the connected peer, falling back to `x-forwarded-for`
pub fn client_ip<B>(request: &Request<B>) -> IpAddr {
    if let Some(ConnectInfo(addr)) = request.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip();
    }

    request
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}
