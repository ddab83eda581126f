//! Periodic removal of expired rate limit windows.

use std::sync::Arc;
use std::time::Duration;

use postline_infra::FixedWindowRateLimiter;
use tokio_cron_scheduler::JobSchedulerError;

use super::Scheduler;

/// Register a job sweeping the limiter's store every `interval`.
pub async fn schedule_rate_limit_sweep(
    scheduler: &Scheduler,
    limiter: Arc<FixedWindowRateLimiter>,
    interval: Duration,
) -> Result<uuid::Uuid, JobSchedulerError> {
    scheduler
        .add_interval(interval, move || {
            let limiter = limiter.clone();
            async move {
                limiter.sweep_expired();
            }
        })
        .await
}
