//! Ports - trait definitions for external dependencies.
//! These are the "interfaces" that infrastructure must implement.

mod clock;
mod rate_limit;
mod repository;

pub use clock::{Clock, ManualClock, SystemClock};
pub use rate_limit::{OnInternalError, RateLimitError, RateLimitResult, RateLimiter};
pub use repository::{BaseRepository, PostRepository};
