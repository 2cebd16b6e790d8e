pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod interfaces;
pub mod logging;
pub mod notifications;
pub mod recurrence;
pub mod reminders;
pub mod runtime_paths;
pub mod scheduler;

pub type Result<T> = std::result::Result<T, error::NanatechError>;
