//! Rate/Quota Limiter: sliding-window-with-sub-buckets
//! admission control and the axum middleware that enforces it.

#![forbid(unsafe_code)]

pub mod config;
pub mod limiter;
pub mod middleware;

pub use config::RateLimitConfig;
pub use limiter::RateLimiter;
pub use middleware::rate_limit_middleware;
