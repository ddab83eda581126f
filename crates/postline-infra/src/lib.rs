//! # Postline Infrastructure
//!
//! Concrete implementations of the ports defined in `postline-core`:
//! the fixed-window rate limiters and the post repositories.
//!
//! ## Feature Flags
//!
//! - `postgres` (default) - PostgreSQL post repository via SeaORM. Without
//!   it only the in-memory repository is built.

pub mod database;
pub mod rate_limit;

pub use database::{DatabaseConfig, InMemoryPostRepository};
pub use rate_limit::{
    FixedWindowRateLimiter, RateLimitConfig, RateLimitStore, RouteRateLimiter, WindowPolicy,
};

#[cfg(feature = "postgres")]
pub use database::{DatabaseConnections, PostgresPostRepository};
