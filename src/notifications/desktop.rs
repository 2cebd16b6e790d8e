use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::{NanatechError, Result};
use crate::interfaces::alerts::{AlertPermission, AlertRequest, AlertSurface};

const APP_NAME: &str = "Nanatech";

/// The user interacted with (or closed) a desktop alert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertAck {
    pub tag: String,
    pub action: String,
}

/// Native desktop notifications plus an optional external speech program.
pub struct DesktopAlertSurface {
    speech_command: Option<Vec<String>>,
    ack_tx: broadcast::Sender<AlertAck>,
}

impl DesktopAlertSurface {
    pub fn new(speech_command: Option<&str>) -> Self {
        let speech_command = speech_command
            .map(|raw| {
                raw.split_whitespace()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|parts| !parts.is_empty());
        let (ack_tx, _) = broadcast::channel(32);
        Self {
            speech_command,
            ack_tx,
        }
    }

    pub fn subscribe_acknowledgements(&self) -> broadcast::Receiver<AlertAck> {
        self.ack_tx.subscribe()
    }
}

#[async_trait]
impl AlertSurface for DesktopAlertSurface {
    fn permission(&self) -> AlertPermission {
        if cfg!(any(target_os = "linux", target_os = "macos")) {
            AlertPermission::Granted
        } else {
            AlertPermission::Denied
        }
    }

    async fn show_alert(&self, request: &AlertRequest) -> Result<()> {
        show_native(request.clone(), self.ack_tx.clone()).await
    }

    async fn speak(&self, text: &str) -> Result<()> {
        let Some(command) = &self.speech_command else {
            tracing::info!(text, "Speech requested but no speech command is configured");
            return Ok(());
        };
        let status = tokio::process::Command::new(&command[0])
            .args(&command[1..])
            .arg(text)
            .status()
            .await
            .map_err(|e| NanatechError::Alert(format!("speech command failed to start: {e}")))?;
        if !status.success() {
            return Err(NanatechError::Alert(format!(
                "speech command exited with {status}"
            )));
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
async fn show_native(request: AlertRequest, ack_tx: broadcast::Sender<AlertAck>) -> Result<()> {
    use notify_rust::{Hint, Notification, Timeout};

    tokio::task::spawn_blocking(move || {
        let mut notification = Notification::new();
        notification
            .appname(APP_NAME)
            .summary(&request.summary)
            .body(&request.body)
            .id(notification_id(&request.tag))
            .action("default", "Got it")
            .timeout(match request.auto_close {
                Some(after) => Timeout::Milliseconds(after.as_millis().min(u32::MAX as u128) as u32),
                None => Timeout::Never,
            });
        if request.require_interaction {
            notification.hint(Hint::Resident(true));
        }
        let handle = notification
            .show()
            .map_err(|e| NanatechError::Alert(e.to_string()))?;
        // Blocks this worker until the alert is acted on, closed or expires.
        handle.wait_for_action(|action| {
            let _ = ack_tx.send(AlertAck {
                tag: request.tag.clone(),
                action: action.to_string(),
            });
        });
        Ok(())
    })
    .await
    .map_err(|e| NanatechError::Runtime(e.to_string()))?
}

#[cfg(target_os = "macos")]
async fn show_native(request: AlertRequest, _ack_tx: broadcast::Sender<AlertAck>) -> Result<()> {
    use notify_rust::Notification;

    tokio::task::spawn_blocking(move || {
        Notification::new()
            .appname(APP_NAME)
            .summary(&request.summary)
            .body(&request.body)
            .show()
            .map(|_| ())
            .map_err(|e| NanatechError::Alert(e.to_string()))
    })
    .await
    .map_err(|e| NanatechError::Runtime(e.to_string()))?
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
async fn show_native(request: AlertRequest, _ack_tx: broadcast::Sender<AlertAck>) -> Result<()> {
    tracing::debug!(tag = %request.tag, app = APP_NAME, "Desktop alerts unsupported on this platform");
    Ok(())
}

/// XDG notification ids are u32; the same tag always maps to the same id so a
/// re-shown alert replaces the previous one.
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn notification_id(tag: &str) -> u32 {
    // FNV-1a
    let hash = tag.bytes().fold(0x811c_9dc5_u32, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(0x0100_0193)
    });
    hash.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_ids_are_stable_per_tag() {
        assert_eq!(notification_id("reminder-1"), notification_id("reminder-1"));
        assert_ne!(notification_id("reminder-1"), notification_id("reminder-2"));
        assert_ne!(notification_id(""), 0);
    }

    #[tokio::test]
    async fn speech_without_command_is_a_logged_no_op() {
        let surface = DesktopAlertSurface::new(Some("   "));
        assert!(surface.speech_command.is_none());
        surface.speak("Reminder: Lunch").await.expect("no-op speech");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn speech_command_receives_the_text() {
        let surface = DesktopAlertSurface::new(Some("true --ignored"));
        surface.speak("Reminder: Lunch").await.expect("speech");

        let failing = DesktopAlertSurface::new(Some("false"));
        assert!(failing.speak("Reminder: Lunch").await.is_err());
    }
}
