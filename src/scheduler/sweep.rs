use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde::Serialize;

use crate::clock::Clock;
use crate::error::Result;
use crate::interfaces::scheduler::ScheduledJob;
use crate::interfaces::store::ReminderBackend;
use crate::notifications::NotificationDispatcher;

use super::advancer::{advance, apply_advancement, Advancement};
use super::dedup::NotifiedCache;

/// Counters from one pass over the due set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub due: usize,
    pub notified: usize,
    pub suppressed: usize,
    pub advanced: usize,
    pub completed: usize,
    pub write_failures: usize,
    pub query_failed: bool,
}

/// One user's periodic check: fetch due reminders, alert the unseen ones and move
/// each of those to its next state.
pub struct ReminderSweep {
    user_id: String,
    backend: Arc<dyn ReminderBackend>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    notified: Arc<Mutex<NotifiedCache>>,
    advance_notice: TimeDelta,
    interval: Duration,
    scan_timeout: Option<Duration>,
}

impl ReminderSweep {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: impl Into<String>,
        backend: Arc<dyn ReminderBackend>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        notified: Arc<Mutex<NotifiedCache>>,
        advance_notice: TimeDelta,
        interval: Duration,
        scan_timeout: Option<Duration>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            backend,
            dispatcher,
            clock,
            notified,
            advance_notice,
            interval,
            scan_timeout,
        }
    }

    /// Runs one pass. Store failures are logged and counted, never returned: a
    /// failed read yields an empty report and a failed write leaves the occurrence
    /// due, kept quiet by the notified cache.
    pub async fn scan(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        let purged = self.cache().purge_expired(now);
        if purged > 0 {
            tracing::debug!(user_id = %self.user_id, purged, "Expired notified entries dropped");
        }

        let due = match self
            .backend
            .due_reminders(&self.user_id, now, self.advance_notice)
            .await
        {
            Ok(due) => due,
            Err(err) => {
                tracing::warn!(user_id = %self.user_id, error = %err, "Due reminder query failed");
                report.query_failed = true;
                return report;
            }
        };
        report.due = due.len();

        for reminder in &due {
            let fresh = self
                .cache()
                .try_mark(reminder.id, reminder.occurrence_time, now);
            if !fresh {
                report.suppressed += 1;
                continue;
            }

            self.dispatcher.notify(reminder);
            report.notified += 1;

            let advancement = advance(reminder, now);
            match apply_advancement(self.backend.as_ref(), reminder, &advancement).await {
                Ok(applied) => {
                    if !applied {
                        tracing::debug!(reminder_id = reminder.id, "Reminder changed before it could be advanced");
                    }
                    match advancement {
                        Advancement::Advanced { next } => {
                            report.advanced += 1;
                            tracing::debug!(reminder_id = reminder.id, %next, "Recurring reminder rescheduled");
                        }
                        Advancement::Completed => report.completed += 1,
                    }
                }
                Err(err) => {
                    report.write_failures += 1;
                    tracing::warn!(
                        reminder_id = reminder.id,
                        ?advancement,
                        error = %err,
                        "Persisting reminder state failed"
                    );
                }
            }
        }

        if report.due > 0 {
            tracing::debug!(user_id = %self.user_id, ?report, "Reminder sweep finished");
        }
        report
    }

    fn cache(&self) -> MutexGuard<'_, NotifiedCache> {
        match self.notified.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ScheduledJob for ReminderSweep {
    fn name(&self) -> &str {
        "reminder_sweep"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn timeout(&self) -> Option<Duration> {
        self.scan_timeout
    }

    async fn run(&self) -> Result<()> {
        self.scan().await;
        Ok(())
    }
}
