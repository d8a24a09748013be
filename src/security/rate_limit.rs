//! Rate limiting middleware for power-action routes.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::config::schema::RateLimitConfig;
use crate::http::response::json_error;

/// A token bucket shared by all power-action routes.
///
/// The bucket refills continuously at `rate` tokens per second up to
/// `burst`, and each admitted request consumes one token. The whole
/// read-modify-write happens inside one mutex critical section so
/// concurrent requests never observe a torn update.
pub struct PowerRateLimiter {
    bucket: Mutex<Bucket>,
    rate: f64,
    burst: f64,
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl PowerRateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            bucket: Mutex::new(Bucket {
                tokens: config.burst as f64,
                last_refill: Instant::now(),
            }),
            rate: config.rate_per_sec,
            burst: config.burst as f64,
        }
    }

    /// Admission check: refill by elapsed time, then take one token.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock().expect("rate limiter mutex poisoned");

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.burst);
        bucket.last_refill = now;

        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }

    #[cfg(test)]
    fn tokens(&self) -> f64 {
        self.bucket.lock().unwrap().tokens
    }
}

/// Middleware guarding power-action routes.
///
/// Rejections are deliberately not logged: under abuse the rejection rate
/// is exactly what would flood the log.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<PowerRateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if limiter.allow() {
        next.run(request).await
    } else {
        json_error(StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded")
    }
}
