use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;

use nanatech::clock::SystemClock;
use nanatech::config::Config;
use nanatech::error::{NanatechError, Result};
use nanatech::notifications::{ConsoleAlertSurface, NotificationDispatcher};
use nanatech::recurrence::{RecurrenceData, RecurrencePattern};
use nanatech::reminders::{NewReminderInput, ReminderStatus, ReminderStore};
use nanatech::scheduler::{ReminderScheduler, SessionSignal};

#[derive(Parser, Debug)]
#[command(name = "nanatech")]
#[command(about = "Manage Nanatech reminders")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("NANATECH_GIT_SHA"), ")"))]
struct Cli {
    #[arg(long, env = "NANATECH_CONFIG", default_value_t = nanatech::runtime_paths::default_config_path())]
    config: String,

    /// Overrides the database path from the config file.
    #[arg(long)]
    db: Option<String>,

    #[arg(long, env = "NANATECH_USER", default_value = "user")]
    user_id: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a reminder.
    Add {
        title: String,
        /// RFC 3339 timestamp, e.g. 2024-03-15T08:00:00Z.
        #[arg(long)]
        at: String,
        /// none, daily, weekly, monthly or yearly.
        #[arg(long, default_value = "none")]
        repeat: String,
        #[arg(long)]
        until: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        interval: Option<u32>,
        #[arg(long)]
        day_of_month: Option<u32>,
    },
    /// List reminders as JSON.
    List {
        /// open, completed or all.
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    Complete {
        id: i32,
    },
    Delete {
        id: i32,
    },
    /// Run one scan now and print alerts to the console.
    Check {
        #[arg(long)]
        advance_minutes: Option<i64>,
    },
    /// Write a config file with default settings.
    InitConfig {
        #[arg(long, default_value_t = false)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    nanatech::logging::init_tracing("nanatech");
    let cli = Cli::parse();

    if let Command::InitConfig { force } = &cli.command {
        return init_config(&cli, *force);
    }

    let config = Config::load_or_default(&cli.config, cli.db.as_deref())?;
    let store = Arc::new(ReminderStore::new(config.db_path()).await?);

    match cli.command {
        Command::Add {
            title,
            at,
            repeat,
            until,
            description,
            interval,
            day_of_month,
        } => {
            let at = parse_timestamp(&at)?;
            let pattern = repeat.parse::<RecurrencePattern>().unwrap_or_default();
            let mut input = NewReminderInput::recurring(&title, at, pattern);
            input.description = description;
            if let Some(until) = until {
                input = input.until(parse_timestamp(&until)?);
            }
            if interval.is_some() || day_of_month.is_some() {
                input = input.with_data(RecurrenceData {
                    interval,
                    day_of_month,
                    ..RecurrenceData::default()
                });
            }
            let reminder = store.create_reminder(&cli.user_id, &input).await?;
            print_json(&reminder)?;
        }
        Command::List { status, limit } => {
            let status = ReminderStatus::from_option(status.as_deref());
            let reminders = store.list_reminders(&cli.user_id, status, limit).await?;
            print_json(&reminders)?;
        }
        Command::Complete { id } => {
            let updated = store.complete_reminder(&cli.user_id, id).await?;
            print_json(&json!({ "id": id, "completed": updated }))?;
        }
        Command::Delete { id } => {
            let deleted = store.delete_reminder(&cli.user_id, id).await?;
            print_json(&json!({ "id": id, "deleted": deleted }))?;
        }
        Command::Check { advance_minutes } => {
            let mut scheduler_config = config.scheduler.clone();
            if let Some(minutes) = advance_minutes {
                scheduler_config.advance_notice_minutes = minutes;
            }
            let dispatcher = Arc::new(NotificationDispatcher::new(
                Arc::new(ConsoleAlertSurface),
                config.notifications.clone(),
            ));
            let mut scheduler = ReminderScheduler::new(
                scheduler_config,
                store,
                dispatcher.clone(),
                Arc::new(SystemClock),
            );
            // Backgrounded first so the session is known without starting the loop.
            scheduler.handle_signal(SessionSignal::Background).await;
            scheduler
                .handle_signal(SessionSignal::SessionStarted {
                    user_id: cli.user_id.clone(),
                })
                .await;
            let report = scheduler.check_now().await?;
            let undelivered: Vec<i32> = dispatcher
                .flush()
                .await
                .iter()
                .filter(|delivery| !delivery.reached_user())
                .map(|delivery| delivery.reminder_id)
                .collect();
            print_json(&json!({ "report": report, "undelivered": undelivered }))?;
        }
        Command::InitConfig { .. } => {}
    }
    Ok(())
}

fn init_config(cli: &Cli, force: bool) -> Result<()> {
    let path = std::path::Path::new(&cli.config);
    if path.exists() && !force {
        return Err(NanatechError::Config(format!(
            "{} already exists (use --force to overwrite)",
            cli.config
        )));
    }
    let db_path = cli
        .db
        .clone()
        .unwrap_or_else(nanatech::runtime_paths::default_db_path);
    Config::convention_defaults(&db_path).save(path)?;
    println!("Wrote {}", cli.config);
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| NanatechError::Config(format!("invalid timestamp {raw:?}: {e}")))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|e| NanatechError::Serialization(e.to_string()))?;
    println!("{rendered}");
    Ok(())
}
