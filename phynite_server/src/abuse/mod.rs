//! Abuse prevention module
//!
//! Provides protection against:
//! - Signup floods (per-IP rate limiting with temporary blocks)
//! - Form bots (honeypot and time-on-form checks)
//! - Throwaway accounts (disposable email blocklist)

pub mod disposable;
pub mod ip;
pub mod rate_limit;
pub mod screen;

pub use ip::client_ip;
pub use rate_limit::{RateLimitConfig, RateLimitStore, RateLimiter};
pub use screen::{screen, Verdict};
