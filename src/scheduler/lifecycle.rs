//! Starting and stopping the reminder sweep as the user's session changes.

use std::sync::{Arc, Mutex};

use rust_fsm::*;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::error::{NanatechError, Result};
use crate::interfaces::alerts::AlertPermission;
use crate::interfaces::store::ReminderBackend;
use crate::notifications::NotificationDispatcher;

use super::dedup::NotifiedCache;
use super::sweep::{ReminderSweep, SweepReport};
use super::Scheduler;

state_machine! {
    scheduler_flow(Stopped)

    Stopped(Start) => Running,
    Running(Stop) => Stopped
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Stopped,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopAction {
    Start,
    Stop,
}

fn hydrate(machine: &mut scheduler_flow::StateMachine, state: LoopState) -> std::result::Result<(), ()> {
    match state {
        LoopState::Stopped => Ok(()),
        LoopState::Running => machine
            .consume(&scheduler_flow::Input::Start)
            .map(|_| ())
            .map_err(|_| ()),
    }
}

fn expected_next_state(current: LoopState, action: LoopAction) -> Option<LoopState> {
    match (current, action) {
        (LoopState::Stopped, LoopAction::Start) => Some(LoopState::Running),
        (LoopState::Running, LoopAction::Stop) => Some(LoopState::Stopped),
        _ => None,
    }
}

/// `None` when `action` is not valid from `current`.
pub fn transition(current: LoopState, action: LoopAction) -> Option<LoopState> {
    let mut machine = scheduler_flow::StateMachine::new();
    hydrate(&mut machine, current).ok()?;

    let input = match action {
        LoopAction::Start => scheduler_flow::Input::Start,
        LoopAction::Stop => scheduler_flow::Input::Stop,
    };

    machine.consume(&input).ok()?;
    expected_next_state(current, action)
}

/// Host events the scheduler reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    SessionStarted { user_id: String },
    SessionEnded,
    Foreground,
    Background,
    Pause,
    Resume,
    PermissionChanged(AlertPermission),
}

#[derive(Debug, Clone)]
struct SessionState {
    user_id: Option<String>,
    visible: bool,
    paused: bool,
    permission: AlertPermission,
}

impl SessionState {
    fn wants_running(&self) -> bool {
        self.user_id.is_some()
            && self.visible
            && !self.paused
            && self.permission != AlertPermission::Denied
    }
}

/// Owns the Stopped/Running lifecycle of one user's reminder sweep.
///
/// Entering `Running` scans immediately and then every `check_interval`. Leaving it
/// waits for any in-flight scan to be cancelled and only then forgets which
/// reminders were already alerted, so the next session starts clean.
pub struct ReminderScheduler {
    config: SchedulerConfig,
    backend: Arc<dyn ReminderBackend>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    notified: Arc<Mutex<NotifiedCache>>,
    session: SessionState,
    state: LoopState,
    runner: Scheduler,
}

impl ReminderScheduler {
    pub fn new(
        config: SchedulerConfig,
        backend: Arc<dyn ReminderBackend>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let notified = Arc::new(Mutex::new(NotifiedCache::new(config.dedup_retention())));
        let session = SessionState {
            user_id: None,
            visible: true,
            paused: false,
            permission: dispatcher.permission(),
        };
        Self {
            config,
            backend,
            dispatcher,
            clock,
            notified,
            session,
            state: LoopState::Stopped,
            runner: Scheduler::new(),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn permission(&self) -> AlertPermission {
        self.session.permission
    }

    pub fn user_id(&self) -> Option<&str> {
        self.session.user_id.as_deref()
    }

    pub fn notified_count(&self) -> usize {
        match self.notified.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub async fn handle_signal(&mut self, signal: SessionSignal) -> LoopState {
        tracing::debug!(?signal, state = ?self.state, "Session signal");
        match signal {
            SessionSignal::SessionStarted { user_id } => {
                if self.session.user_id.as_deref() != Some(user_id.as_str()) && self.is_running() {
                    self.stop().await;
                }
                self.session.user_id = Some(user_id);
            }
            SessionSignal::SessionEnded => self.session.user_id = None,
            SessionSignal::Foreground => self.session.visible = true,
            SessionSignal::Background => self.session.visible = false,
            SessionSignal::Pause => self.session.paused = true,
            SessionSignal::Resume => self.session.paused = false,
            SessionSignal::PermissionChanged(permission) => self.session.permission = permission,
        }
        self.reconcile().await;
        self.state
    }

    /// Runs one scan now, whether or not the loop is running. Shares the notified
    /// cache with the loop, so a reminder alerted here is not alerted again by the
    /// next tick.
    pub async fn check_now(&self) -> Result<SweepReport> {
        let user_id = self
            .session
            .user_id
            .clone()
            .ok_or_else(|| NanatechError::Runtime("no active session".to_string()))?;
        Ok(self.sweep_for(user_id).scan().await)
    }

    /// Applies signals until the sender side is dropped, then stops.
    pub async fn run(mut self, mut signals: mpsc::Receiver<SessionSignal>) {
        while let Some(signal) = signals.recv().await {
            self.handle_signal(signal).await;
        }
        self.shutdown().await;
    }

    pub async fn shutdown(&mut self) {
        if self.is_running() {
            self.stop().await;
        }
    }

    async fn reconcile(&mut self) {
        match (self.state, self.session.wants_running()) {
            (LoopState::Stopped, true) => self.start(),
            (LoopState::Running, false) => self.stop().await,
            _ => {}
        }
    }

    fn start(&mut self) {
        let Some(next) = transition(self.state, LoopAction::Start) else {
            return;
        };
        let Some(user_id) = self.session.user_id.clone() else {
            return;
        };
        let mut runner = Scheduler::new();
        runner.register_job(Arc::new(self.sweep_for(user_id.clone())));
        runner.start();
        self.runner = runner;
        self.state = next;
        tracing::info!(
            user_id = %user_id,
            interval = ?self.config.check_interval(),
            advance_notice_minutes = self.config.advance_notice().num_minutes(),
            "Reminder scheduler started"
        );
    }

    async fn stop(&mut self) {
        let Some(next) = transition(self.state, LoopAction::Stop) else {
            return;
        };
        self.runner.stop().await;
        match self.notified.lock() {
            Ok(mut guard) => guard.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
        self.state = next;
        tracing::info!("Reminder scheduler stopped");
    }

    fn sweep_for(&self, user_id: String) -> ReminderSweep {
        ReminderSweep::new(
            user_id,
            Arc::clone(&self.backend),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.clock),
            Arc::clone(&self.notified),
            self.config.advance_notice(),
            self.config.check_interval(),
            self.config.scan_timeout(),
        )
    }
}
