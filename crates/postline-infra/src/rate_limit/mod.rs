//! Rate limiting implementations.

mod memory;
mod route;
mod store;

pub use memory::{FixedWindowRateLimiter, MAX_WINDOW, RateLimitConfig};
pub use route::RouteRateLimiter;
pub use store::{RateLimitEntry, RateLimitStore, WindowPolicy, WindowRule};
