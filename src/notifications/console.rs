use async_trait::async_trait;

use crate::error::Result;
use crate::interfaces::alerts::{AlertPermission, AlertRequest, AlertSurface};

/// Prints alerts to stdout. Backs `nanatech check`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleAlertSurface;

#[async_trait]
impl AlertSurface for ConsoleAlertSurface {
    fn permission(&self) -> AlertPermission {
        AlertPermission::Granted
    }

    async fn show_alert(&self, request: &AlertRequest) -> Result<()> {
        println!("{} [{}]\n  {}", request.summary, request.tag, request.body);
        Ok(())
    }

    async fn speak(&self, text: &str) -> Result<()> {
        println!("🔊 {text}");
        Ok(())
    }
}
