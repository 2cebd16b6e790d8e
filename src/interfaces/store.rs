use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::error::Result;
use crate::reminders::Reminder;

/// The slice of the reminder store the scheduler depends on.
#[async_trait]
pub trait ReminderBackend: Send + Sync {
    /// Open reminders of `user_id` with an occurrence at or before
    /// `now + advance_notice`, earliest first.
    async fn due_reminders(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        advance_notice: TimeDelta,
    ) -> Result<Vec<Reminder>>;

    /// Moves an open reminder to its next occurrence. `Ok(false)` when no owned open
    /// row matched.
    async fn reschedule(&self, user_id: &str, id: i32, next: DateTime<Utc>) -> Result<bool>;

    async fn mark_completed(&self, user_id: &str, id: i32) -> Result<bool>;
}
