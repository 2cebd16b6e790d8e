use std::sync::Arc;

use clap::Parser;
use tokio::sync::{broadcast, mpsc};

use nanatech::clock::SystemClock;
use nanatech::config::{Config, SchedulerConfig};
use nanatech::error::{NanatechError, Result};
use nanatech::notifications::{DesktopAlertSurface, NotificationDispatcher};
use nanatech::reminders::ReminderStore;
use nanatech::scheduler::{ReminderScheduler, SessionSignal};

#[derive(Parser, Debug)]
#[command(name = "nanatechd")]
#[command(about = "Nanatech reminder scheduler daemon")]
#[command(version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("NANATECH_GIT_SHA"), ")"))]
struct Cli {
    #[arg(long, env = "NANATECH_CONFIG", default_value_t = nanatech::runtime_paths::default_config_path())]
    config: String,

    #[arg(long)]
    db: Option<String>,

    #[arg(long, env = "NANATECH_USER", default_value = "user")]
    user_id: String,

    /// Use the shorter advance notice of the voice flow.
    #[arg(long, default_value_t = false)]
    voice_flow: bool,

    #[arg(long)]
    advance_minutes: Option<i64>,

    #[arg(long)]
    interval_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    nanatech::logging::init_tracing("nanatechd");
    let cli = Cli::parse();

    let config = Config::load_or_default(&cli.config, cli.db.as_deref())?;
    let scheduler_config = scheduler_config(&config, &cli);
    let store = Arc::new(ReminderStore::new(config.db_path()).await?);

    let surface = Arc::new(DesktopAlertSurface::new(
        config.notifications.speech_command.as_deref(),
    ));
    let mut acks = surface.subscribe_acknowledgements();
    tokio::spawn(async move {
        loop {
            match acks.recv().await {
                Ok(ack) => tracing::info!(tag = %ack.tag, action = %ack.action, "Reminder acknowledged"),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Acknowledgement listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let dispatcher = Arc::new(NotificationDispatcher::new(
        surface,
        config.notifications.clone(),
    ));
    let scheduler = ReminderScheduler::new(
        scheduler_config,
        store,
        dispatcher.clone(),
        Arc::new(SystemClock),
    );
    tracing::info!(
        user_id = %cli.user_id,
        db = %config.db_path(),
        permission = ?scheduler.permission(),
        "nanatechd starting"
    );

    let (tx, rx) = mpsc::channel(16);
    tx.send(SessionSignal::SessionStarted {
        user_id: cli.user_id.clone(),
    })
    .await
    .map_err(|e| NanatechError::Runtime(e.to_string()))?;

    let session = tokio::spawn(scheduler.run(rx));
    let host = host_signals()?;
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %err, "Ctrl-C listener failed, stopping");
        }
    };
    forward_session_signals(tx, shutdown, host).await;
    session
        .await
        .map_err(|e| NanatechError::Runtime(e.to_string()))?;
    dispatcher.flush().await;
    tracing::info!("nanatechd stopped");
    Ok(())
}

fn scheduler_config(config: &Config, cli: &Cli) -> SchedulerConfig {
    let mut scheduler = if cli.voice_flow {
        SchedulerConfig {
            check_interval_ms: config.scheduler.check_interval_ms,
            dedup_retention_secs: config.scheduler.dedup_retention_secs,
            scan_timeout_ms: config.scheduler.scan_timeout_ms,
            ..SchedulerConfig::voice_flow()
        }
    } else {
        config.scheduler.clone()
    };
    if let Some(minutes) = cli.advance_minutes {
        scheduler.advance_notice_minutes = minutes;
    }
    if let Some(interval) = cli.interval_ms {
        scheduler.check_interval_ms = interval;
    }
    scheduler
}

/// On unix SIGUSR1/SIGUSR2 background and foreground the app, pausing and
/// resuming the sweep. Elsewhere no host signals are produced.
fn host_signals() -> Result<mpsc::Receiver<SessionSignal>> {
    let (tx, rx) = mpsc::channel(8);
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut background = signal(SignalKind::user_defined1())
            .map_err(|e| NanatechError::Runtime(e.to_string()))?;
        let mut foreground = signal(SignalKind::user_defined2())
            .map_err(|e| NanatechError::Runtime(e.to_string()))?;
        tokio::spawn(async move {
            loop {
                let next = tokio::select! {
                    Some(()) = background.recv() => SessionSignal::Background,
                    Some(()) = foreground.recv() => SessionSignal::Foreground,
                    else => break,
                };
                if tx.send(next).await.is_err() {
                    break;
                }
            }
        });
    }
    #[cfg(not(unix))]
    drop(tx);
    Ok(rx)
}

/// Forwards host signals to the scheduler until `shutdown` resolves, then ends
/// the session. `shutdown` is polled as one future for the whole run, so a
/// shutdown request that lands while a signal is being forwarded is still seen.
async fn forward_session_signals<F>(
    tx: mpsc::Sender<SessionSignal>,
    shutdown: F,
    mut host: mpsc::Receiver<SessionSignal>,
) where
    F: std::future::Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut host_open = true;
    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break,
            next = host.recv(), if host_open => match next {
                Some(signal) => {
                    if tx.send(signal).await.is_err() {
                        return;
                    }
                }
                None => host_open = false,
            },
        }
    }

    tracing::info!("Shutdown requested");
    let _ = tx.send(SessionSignal::SessionEnded).await;
}
