//! # kc-cache
//!
//! Caching and rate limiting for outbound membership API calls.
//!
//! All cross-request coordination goes through the [`CacheBackend`] trait:
//! a key/value store with per-entry TTL, a global version tag and an atomic
//! increment. The in-process [`InMemoryCache`] implementation backs tests
//! and single-node deployments; a shared deployment implements the same
//! trait over its cache tier.
//!
//! On top of the backend sit:
//!
//! - [`ResponseCache`] - read-through storage of successful upstream
//!   response bodies, with TTL derived from upstream `Cache-Control`
//!   headers capped by a per-system ceiling;
//! - [`FixedWindowLimiter`] - a fixed-window call budget shared across
//!   workers through the backend's atomic increment.

pub mod backend;
pub mod memory;
pub mod rate_limit;
pub mod response;

pub use backend::CacheBackend;
pub use memory::InMemoryCache;
pub use rate_limit::{FixedWindowLimiter, RateLimitExceeded};
pub use response::ResponseCache;
