//! Turning a due reminder into something the user sees and hears.
//!
//! [`NotificationDispatcher::notify`] hands delivery to a spawned task and returns
//! at once; the scheduler never waits for an alert to be shown, read or dismissed.
//! When the host has not granted alert permission the visual half is dropped and
//! only the spoken reminder is played.

use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use crate::config::NotificationSettings;
use crate::interfaces::alerts::{AlertPermission, AlertRequest, AlertSurface};
use crate::reminders::Reminder;

mod console;
mod desktop;

pub use console::ConsoleAlertSurface;
pub use desktop::{AlertAck, DesktopAlertSurface};

/// Finished deliveries are only dropped from tracking once this many pile up.
const PRUNE_AFTER: usize = 64;

pub struct NotificationDispatcher {
    surface: Arc<dyn AlertSurface>,
    settings: NotificationSettings,
    in_flight: Mutex<Vec<JoinHandle<Delivery>>>,
}

impl NotificationDispatcher {
    pub fn new(surface: Arc<dyn AlertSurface>, settings: NotificationSettings) -> Self {
        Self {
            surface,
            settings,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Effective permission: disabled notifications count as denied.
    pub fn permission(&self) -> AlertPermission {
        if !self.settings.enabled {
            return AlertPermission::Denied;
        }
        self.surface.permission()
    }

    pub fn alert_for(&self, reminder: &Reminder) -> AlertRequest {
        let title = reminder.display_title();
        AlertRequest {
            tag: reminder.alert_tag(),
            summary: format!("🔔 {title}"),
            body: format!("Don't forget: {title}"),
            require_interaction: true,
            auto_close: self.settings.auto_close(),
        }
    }

    pub fn speech_for(&self, reminder: &Reminder) -> Option<String> {
        self.settings
            .sound_enabled
            .then(|| format!("Reminder: {}", reminder.display_title()))
    }

    pub fn notify(&self, reminder: &Reminder) {
        let permission = self.permission();
        let alert = (permission == AlertPermission::Granted).then(|| self.alert_for(reminder));
        let speech = self.speech_for(reminder);
        let surface = Arc::clone(&self.surface);
        let reminder_id = reminder.id;
        let title = reminder.display_title().to_string();

        if alert.is_none() {
            tracing::debug!(
                reminder_id,
                ?permission,
                "Alert permission not granted, falling back to audio"
            );
        }

        let handle = tokio::spawn(async move {
            let show = async {
                let Some(alert) = &alert else {
                    return false;
                };
                match surface.show_alert(alert).await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(reminder_id, error = %err, "Showing reminder alert failed");
                        false
                    }
                }
            };
            let say = async {
                let Some(text) = &speech else {
                    return false;
                };
                match surface.speak(text).await {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(reminder_id, error = %err, "Speaking reminder failed");
                        false
                    }
                }
            };
            let (shown, spoken) = tokio::join!(show, say);
            let delivery = Delivery {
                reminder_id,
                shown,
                spoken,
            };
            if delivery.reached_user() {
                tracing::info!(reminder_id, title = %title, shown, spoken, "Reminder triggered");
            } else {
                tracing::debug!(reminder_id, title = %title, "Reminder due but nothing was delivered");
            }
            delivery
        });

        let mut in_flight = match self.in_flight.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if in_flight.len() >= PRUNE_AFTER {
            in_flight.retain(|handle| !handle.is_finished());
        }
        in_flight.push(handle);
    }

    /// Waits for the deliveries started since the last flush and returns their
    /// outcomes. Used by one-shot callers (the CLI) before exiting. Long sessions
    /// that never flush drop finished deliveries once enough pile up.
    pub async fn flush(&self) -> Vec<Delivery> {
        let pending = {
            let mut in_flight = match self.in_flight.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            std::mem::take(&mut *in_flight)
        };
        let mut deliveries = Vec::with_capacity(pending.len());
        for handle in pending {
            match handle.await {
                Ok(delivery) => deliveries.push(delivery),
                Err(err) => tracing::warn!(error = %err, "Reminder delivery task failed"),
            }
        }
        deliveries
    }
}

/// What one notification actually reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub reminder_id: i32,
    pub shown: bool,
    pub spoken: bool,
}

impl Delivery {
    pub fn reached_user(&self) -> bool {
        self.shown || self.spoken
    }
}
