/// Request rate limiting
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use std::{num::NonZeroU32, sync::Arc};

const FALLBACK_RPS: NonZeroU32 = match NonZeroU32::new(100) {
    Some(n) => n,
    None => unreachable!(),
};

const FALLBACK_BURST: NonZeroU32 = match NonZeroU32::new(50) {
    Some(n) => n,
    None => unreachable!(),
};

/// Global request rate limiter
#[derive(Clone)]
pub struct RateLimiter {
    limiter: Option<Arc<GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>>>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        if !config.enabled {
            return Self { limiter: None };
        }

        let quota = Quota::per_second(NonZeroU32::new(config.requests_per_second).unwrap_or(FALLBACK_RPS))
            .allow_burst(NonZeroU32::new(config.burst_size).unwrap_or(FALLBACK_BURST));

        Self {
            limiter: Some(Arc::new(GovernorLimiter::direct(quota))),
        }
    }

    /// Take one request from the quota
    pub fn check(&self) -> ApiResult<()> {
        match &self.limiter {
            Some(limiter) => limiter.check().map_err(|_| ApiError::RateLimitExceeded),
            None => Ok(()),
        }
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Err(e) = ctx.rate_limiter.check() {
        tracing::warn!("Rate limit exceeded for {} {}", request.method(), request.uri().path());
        return Err(e);
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_limit() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: true,
            requests_per_second: 1,
            burst_size: 5,
        });

        for _ in 0..5 {
            assert!(limiter.check().is_ok());
        }

        // Should hit rate limit after burst
        assert!(matches!(limiter.check(), Err(ApiError::RateLimitExceeded)));
    }

    #[test]
    fn test_disabled_limiter_always_allows() {
        let limiter = RateLimiter::new(&RateLimitConfig {
            enabled: false,
            requests_per_second: 1,
            burst_size: 1,
        });

        for _ in 0..100 {
            assert!(limiter.check().is_ok());
        }
    }
}
