use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::interfaces::store::ReminderBackend;
use crate::reminders::Reminder;

/// What happens to a reminder once it has been alerted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Advancement {
    Advanced { next: DateTime<Utc> },
    Completed,
}

/// Decides the follow-up state of a just-alerted reminder.
///
/// One-shot reminders, reminders without a recurrence and reminders with no
/// occurrence time complete. Recurring ones move to their first occurrence
/// strictly after `now`, unless that lies past the recurrence end.
pub fn advance(reminder: &Reminder, now: DateTime<Utc>) -> Advancement {
    if !reminder.is_recurring || reminder.recurrence_pattern.is_none() {
        return Advancement::Completed;
    }
    let Some(current) = reminder.occurrence_time else {
        return Advancement::Completed;
    };
    match reminder.recurrence_rule().next_after(current, now) {
        Some(next) if reminder.recurrence_end.is_some_and(|end| next > end) => {
            Advancement::Completed
        }
        Some(next) => Advancement::Advanced { next },
        None => Advancement::Completed,
    }
}

/// Persists `advancement`. `Ok(false)` means the row was gone or already closed.
pub async fn apply_advancement(
    backend: &dyn ReminderBackend,
    reminder: &Reminder,
    advancement: &Advancement,
) -> Result<bool> {
    match advancement {
        Advancement::Advanced { next } => {
            backend
                .reschedule(&reminder.user_id, reminder.id, *next)
                .await
        }
        Advancement::Completed => backend.mark_completed(&reminder.user_id, reminder.id).await,
    }
}
