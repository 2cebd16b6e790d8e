use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::interfaces::scheduler::ScheduledJob;

pub mod advancer;
pub mod dedup;
pub mod lifecycle;
pub mod sweep;

pub use advancer::{advance, apply_advancement, Advancement};
pub use dedup::NotifiedCache;
pub use lifecycle::{LoopState, ReminderScheduler, SessionSignal};
pub use sweep::{ReminderSweep, SweepReport};

/// Runs registered jobs on their own fixed-period timers until stopped.
///
/// The first tick fires immediately. A tick waits for its run to finish before the
/// next one is considered; ticks missed meanwhile are delayed rather than burst.
pub struct Scheduler {
    jobs: Vec<Arc<dyn ScheduledJob>>,
    handles: Vec<JoinHandle<()>>,
    stop: Option<watch::Sender<bool>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            jobs: Vec::new(),
            handles: Vec::new(),
            stop: None,
        }
    }

    pub fn register_job(&mut self, job: Arc<dyn ScheduledJob>) {
        self.jobs.push(job);
    }

    pub fn is_running(&self) -> bool {
        self.stop.is_some()
    }

    pub fn start(&mut self) {
        if self.stop.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        self.stop = Some(tx);

        for job in &self.jobs {
            let job = Arc::clone(job);
            let mut tick = tokio::time::interval(job.interval());
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut rx = rx.clone();
            let handle = tokio::spawn(async move {
                loop {
                    tokio::select! {
                        biased;
                        changed = rx.changed() => {
                            if changed.is_err() || *rx.borrow() {
                                break;
                            }
                        }
                        _ = tick.tick() => {
                            tokio::select! {
                                biased;
                                changed = rx.changed() => {
                                    if changed.is_err() || *rx.borrow() {
                                        tracing::debug!(job = job.name(), "Job cancelled mid-run");
                                        break;
                                    }
                                }
                                _ = run_job(job.as_ref()) => {}
                            }
                        }
                    }
                }
            });
            self.handles.push(handle);
        }
    }

    /// Signals every job loop and waits for them to exit. No run starts after this
    /// returns.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop.take() {
            let _ = tx.send(true);
        }
        let handles = std::mem::take(&mut self.handles);
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_job(job: &dyn ScheduledJob) {
    let outcome = match job.timeout() {
        Some(limit) => match tokio::time::timeout(limit, job.run()).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(job = job.name(), ?limit, "Scheduled job timed out");
                return;
            }
        },
        None => job.run().await,
    };
    if let Err(err) = outcome {
        tracing::warn!(job = job.name(), error = %err, "Scheduled job failed");
    }
}
