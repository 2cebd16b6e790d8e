use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{NanatechError, Result};

const DEFAULT_CHECK_INTERVAL_MS: u64 = 30_000;
const DEFAULT_ADVANCE_NOTICE_MINUTES: i64 = 5;
const VOICE_FLOW_ADVANCE_NOTICE_MINUTES: i64 = 2;
const DEFAULT_DEDUP_RETENTION_SECS: i64 = 24 * 60 * 60;
const DEFAULT_AUTO_CLOSE_MS: u64 = 10_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub check_interval_ms: u64,
    pub advance_notice_minutes: i64,
    pub dedup_retention_secs: i64,
    pub scan_timeout_ms: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: DEFAULT_CHECK_INTERVAL_MS,
            advance_notice_minutes: DEFAULT_ADVANCE_NOTICE_MINUTES,
            dedup_retention_secs: DEFAULT_DEDUP_RETENTION_SECS,
            scan_timeout_ms: None,
        }
    }
}

impl SchedulerConfig {
    /// Settings used when reminders are dictated through the voice agent.
    pub fn voice_flow() -> Self {
        Self {
            advance_notice_minutes: VOICE_FLOW_ADVANCE_NOTICE_MINUTES,
            ..Self::default()
        }
    }

    pub fn check_interval(&self) -> Duration {
        // tokio intervals reject a zero period.
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    pub fn advance_notice(&self) -> TimeDelta {
        TimeDelta::try_minutes(self.advance_notice_minutes.max(0)).unwrap_or_default()
    }

    pub fn dedup_retention(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.dedup_retention_secs.max(0)).unwrap_or_default()
    }

    pub fn scan_timeout(&self) -> Option<Duration> {
        self.scan_timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub sound_enabled: bool,
    pub auto_close_ms: Option<u64>,
    /// Program (plus leading arguments) that speaks its last argument aloud.
    pub speech_command: Option<String>,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sound_enabled: true,
            auto_close_ms: Some(DEFAULT_AUTO_CLOSE_MS),
            speech_command: None,
        }
    }
}

impl NotificationSettings {
    pub fn auto_close(&self) -> Option<Duration> {
        self.auto_close_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

impl Config {
    pub fn convention_defaults(db_path: &str) -> Self {
        Self {
            store: StoreConfig {
                sqlite_path: Some(db_path.to_string()),
            },
            scheduler: SchedulerConfig::default(),
            notifications: NotificationSettings::default(),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            NanatechError::Config(format!(
                "Failed to read config {}: {e}",
                path.to_string_lossy()
            ))
        })?;
        serde_json::from_str(&raw).map_err(|e| NanatechError::Config(e.to_string()))
    }

    /// Loads `path` when it exists, otherwise falls back to convention defaults.
    /// `db_override` wins over whatever the file says.
    pub fn load_or_default(path: impl AsRef<Path>, db_override: Option<&str>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!(path = %path.to_string_lossy(), "No config file, using defaults");
            Self::convention_defaults(&crate::runtime_paths::default_db_path())
        };
        if let Some(db) = db_override {
            config.store.sqlite_path = Some(db.to_string());
        }
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        crate::db::ensure_parent_dir(&path.to_string_lossy())
            .map_err(|e| NanatechError::Config(e.to_string()))?;
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| NanatechError::Serialization(e.to_string()))?;
        fs::write(path, raw).map_err(|e| {
            NanatechError::Config(format!(
                "Failed to write config {}: {e}",
                path.to_string_lossy()
            ))
        })
    }

    pub fn db_path(&self) -> String {
        self.store
            .sqlite_path
            .as_deref()
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .unwrap_or_else(crate::runtime_paths::default_db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_app() {
        let config = Config::convention_defaults("/tmp/nanatech.db");
        assert_eq!(config.scheduler.check_interval(), Duration::from_secs(30));
        assert_eq!(config.scheduler.advance_notice(), TimeDelta::minutes(5));
        assert_eq!(config.scheduler.dedup_retention(), TimeDelta::hours(24));
        assert_eq!(config.scheduler.scan_timeout(), None);
        assert!(config.notifications.enabled);
        assert_eq!(
            config.notifications.auto_close(),
            Some(Duration::from_secs(10))
        );
        assert_eq!(config.db_path(), "/tmp/nanatech.db");
    }

    #[test]
    fn voice_flow_uses_two_minutes_notice() {
        let voice = SchedulerConfig::voice_flow();
        assert_eq!(voice.advance_notice(), TimeDelta::minutes(2));
        assert_eq!(voice.check_interval_ms, DEFAULT_CHECK_INTERVAL_MS);
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_fields() {
        let config: Config = serde_json::from_str(
            r#"{"scheduler": {"advance_notice_minutes": 2}, "notifications": {"sound_enabled": false}}"#,
        )
        .unwrap();
        assert_eq!(config.scheduler.advance_notice_minutes, 2);
        assert_eq!(config.scheduler.check_interval_ms, DEFAULT_CHECK_INTERVAL_MS);
        assert!(config.notifications.enabled);
        assert!(!config.notifications.sound_enabled);
        assert_eq!(config.store.sqlite_path, None);
    }

    #[test]
    fn degenerate_values_are_clamped() {
        let scheduler = SchedulerConfig {
            check_interval_ms: 0,
            advance_notice_minutes: -3,
            dedup_retention_secs: -1,
            scan_timeout_ms: Some(0),
        };
        assert_eq!(scheduler.check_interval(), Duration::from_millis(1));
        assert_eq!(scheduler.advance_notice(), TimeDelta::zero());
        assert_eq!(scheduler.dedup_retention(), TimeDelta::zero());
        assert_eq!(scheduler.scan_timeout(), None);
    }

    #[test]
    fn save_then_load_from_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("nested").join("config.json");
        let mut config = Config::convention_defaults("reminders.db");
        config.scheduler = SchedulerConfig::voice_flow();
        config.notifications.speech_command = Some("espeak -s 130".to_string());
        config.save(&path).expect("save");

        let loaded = Config::load_or_default(&path, Some("override.db")).expect("load");
        assert_eq!(loaded.scheduler, SchedulerConfig::voice_flow());
        assert_eq!(
            loaded.notifications.speech_command.as_deref(),
            Some("espeak -s 130")
        );
        assert_eq!(loaded.db_path(), "override.db");
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = temp.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, NanatechError::Config(_)));
    }
}
