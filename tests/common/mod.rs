#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use nanatech::config::NotificationSettings;
use nanatech::error::{NanatechError, Result};
use nanatech::interfaces::alerts::{AlertPermission, AlertRequest, AlertSurface};
use nanatech::interfaces::store::ReminderBackend;
use nanatech::notifications::NotificationDispatcher;
use nanatech::reminders::{Reminder, ReminderStore};

pub fn ts(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

pub async fn temp_store() -> (tempfile::TempDir, Arc<ReminderStore>) {
    let dir = tempfile::tempdir().expect("temp dir");
    let db_path = dir.path().join("reminders.db");
    let store = ReminderStore::new(db_path.to_string_lossy().to_string())
        .await
        .expect("store");
    (dir, Arc::new(store))
}

/// Alert surface that remembers what it was asked to show and say.
pub struct RecordingSurface {
    pub permission: AlertPermission,
    pub alerts: Mutex<Vec<AlertRequest>>,
    pub spoken: Mutex<Vec<String>>,
}

impl RecordingSurface {
    pub fn granted() -> Arc<Self> {
        Arc::new(Self {
            permission: AlertPermission::Granted,
            alerts: Mutex::new(Vec::new()),
            spoken: Mutex::new(Vec::new()),
        })
    }

    pub fn tags(&self) -> Vec<String> {
        self.alerts
            .lock()
            .unwrap()
            .iter()
            .map(|alert| alert.tag.clone())
            .collect()
    }
}

#[async_trait]
impl AlertSurface for RecordingSurface {
    fn permission(&self) -> AlertPermission {
        self.permission
    }

    async fn show_alert(&self, request: &AlertRequest) -> Result<()> {
        self.alerts.lock().unwrap().push(request.clone());
        Ok(())
    }

    async fn speak(&self, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub fn dispatcher(surface: Arc<RecordingSurface>) -> Arc<NotificationDispatcher> {
    Arc::new(NotificationDispatcher::new(
        surface,
        NotificationSettings::default(),
    ))
}

/// Wraps a real store and fails reads or writes on demand.
pub struct FlakyBackend {
    pub inner: Arc<ReminderStore>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub reads: AtomicUsize,
}

impl FlakyBackend {
    pub fn new(inner: Arc<ReminderStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ReminderBackend for FlakyBackend {
    async fn due_reminders(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        advance_notice: TimeDelta,
    ) -> Result<Vec<Reminder>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(NanatechError::Store("database is locked".to_string()));
        }
        self.inner.due_reminders(user_id, now, advance_notice).await
    }

    async fn reschedule(&self, user_id: &str, id: i32, next: DateTime<Utc>) -> Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NanatechError::Store("disk I/O error".to_string()));
        }
        self.inner.reschedule(user_id, id, next).await
    }

    async fn mark_completed(&self, user_id: &str, id: i32) -> Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(NanatechError::Store("disk I/O error".to_string()));
        }
        self.inner.mark_completed(user_id, id).await
    }
}

pub async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}
