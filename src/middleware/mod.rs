//! Middleware for the UniGoods API
//!
//! Request tracing, rate limiting, security headers, and authentication
//! extractors.

pub mod auth;
mod client_ip;
mod rate_limiter;
mod security;
mod tracing;

pub use auth::{AdminUser, AuthenticatedUser};
pub use rate_limiter::{bucket_janitor, rate_limit, RateLimiter};
pub use security::{hsts_header, security_headers};
pub use tracing::request_tracing;
