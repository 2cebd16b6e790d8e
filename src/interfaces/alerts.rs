use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPermission {
    Granted,
    Denied,
    /// The host has not been asked yet.
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertRequest {
    /// Stable per reminder; hosts replace an alert with the same tag instead of
    /// stacking a second one.
    pub tag: String,
    pub summary: String,
    pub body: String,
    pub require_interaction: bool,
    pub auto_close: Option<Duration>,
}

#[async_trait]
pub trait AlertSurface: Send + Sync {
    fn permission(&self) -> AlertPermission;
    async fn show_alert(&self, request: &AlertRequest) -> Result<()>;
    async fn speak(&self, text: &str) -> Result<()>;
}
