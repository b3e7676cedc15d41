//! Time source for scheduling and polling
//!
//! Job schedules are derived from [`Clock::now`] and every wait between vendor
//! queries goes through [`Clock::sleep`], so polling loops can be driven
//! deterministically in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time in UTC
    fn now(&self) -> DateTime<Utc>;

    /// Block the calling task for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by the system time and the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
