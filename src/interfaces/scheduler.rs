use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn name(&self) -> &str;
    fn interval(&self) -> Duration;
    /// Upper bound for a single run. `None` lets a run take as long as it needs.
    fn timeout(&self) -> Option<Duration> {
        None
    }
    async fn run(&self) -> Result<()>;
}
