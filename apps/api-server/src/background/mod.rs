//! Background jobs.

mod scheduler;
mod sweep;

pub use scheduler::{Scheduler, SchedulerConfig};
pub use sweep::schedule_rate_limit_sweep;
