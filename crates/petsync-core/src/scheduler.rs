//! Sync trigger scheduler.
//!
//! Turns host signals (connectivity, visibility, focus, a recurring timer,
//! and startup) into push and pull calls. Nothing here propagates errors:
//! every failure is absorbed and the next trigger tries again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::Result;
use crate::observe;
use crate::signals::TokenSource;

/// What the scheduler drives
#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn push(&self) -> Result<()>;

    /// Pull remote changes; `force` bypasses the pull throttle
    async fn pull(&self, force: bool) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// Connectivity came back: push, then a forced pull
    NetworkOnline,
    /// The host became visible: throttled pull
    Visible,
    /// The host gained focus: throttled pull
    Focus,
    /// Recurring timer tick: debounced push
    Timer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub push_interval: Duration,
    pub push_debounce: Duration,
    pub token_poll_interval: Duration,
    pub token_poll_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            push_interval: Duration::from_secs(30),
            push_debounce: Duration::from_secs(5),
            token_poll_interval: Duration::from_millis(500),
            token_poll_timeout: Duration::from_secs(15),
        }
    }
}

pub struct SyncScheduler {
    runner: Arc<dyn SyncRunner>,
    tokens: Arc<dyn TokenSource>,
    config: SchedulerConfig,
    started: AtomicBool,
    last_push: Mutex<Option<Instant>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncScheduler {
    pub fn new(
        runner: Arc<dyn SyncRunner>,
        tokens: Arc<dyn TokenSource>,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            runner,
            tokens,
            config,
            started: AtomicBool::new(false),
            last_push: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Start the recurring timer and the startup sync.
    ///
    /// Returns `false` without doing anything when already started, or when
    /// there is no Tokio runtime to schedule on.
    pub fn start(self: &Arc<Self>) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("Sync scheduler already started");
            return false;
        }
        if let Err(error) = tokio::runtime::Handle::try_current() {
            observe::absorb("scheduler.start", &error);
            self.started.store(false, Ordering::Release);
            return false;
        }

        let mut tasks = Vec::with_capacity(2);
        tasks.push(tokio::spawn(run_timer(
            Arc::downgrade(self),
            self.config.push_interval,
        )));

        if self.tokens.has_token() {
            let scheduler = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                scheduler.push_then_pull(false).await;
            }));
        } else {
            tasks.push(tokio::spawn(poll_for_token(
                Arc::downgrade(self),
                self.config.token_poll_interval,
                self.config.token_poll_timeout,
            )));
        }

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(tasks);
        tracing::info!(
            push_interval_secs = self.config.push_interval.as_secs(),
            "Sync scheduler started"
        );
        true
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Stop background tasks; a later `start` begins afresh
    pub fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for task in tasks {
            task.abort();
        }
        self.started.store(false, Ordering::Release);
    }

    /// Handle a trigger on a background task
    pub fn notify(self: &Arc<Self>, trigger: SyncTrigger) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let scheduler = Arc::clone(self);
                handle.spawn(async move { scheduler.handle(trigger).await });
            }
            Err(error) => observe::absorb("scheduler.notify", &error),
        }
    }

    /// Handle a trigger and wait for the resulting sync work
    pub async fn handle(&self, trigger: SyncTrigger) {
        tracing::debug!(?trigger, "Sync trigger");
        match trigger {
            SyncTrigger::NetworkOnline => self.push_then_pull(true).await,
            SyncTrigger::Visible | SyncTrigger::Focus => self.pull(false).await,
            SyncTrigger::Timer => {
                if self.within_debounce() {
                    tracing::debug!("Timer push debounced");
                } else {
                    self.push().await;
                }
            }
        }
    }

    /// Pull always follows the push, whatever the push did
    async fn push_then_pull(&self, force: bool) {
        self.push().await;
        self.pull(force).await;
    }

    async fn push(&self) {
        *self.last_push.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
        observe::absorb_result("scheduler.push", self.runner.push().await);
    }

    async fn pull(&self, force: bool) {
        observe::absorb_result("scheduler.pull", self.runner.pull(force).await);
    }

    fn within_debounce(&self) -> bool {
        let last = *self.last_push.lock().unwrap_or_else(PoisonError::into_inner);
        last.is_some_and(|at| at.elapsed() < self.config.push_debounce)
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_timer(scheduler: Weak<SyncScheduler>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let Some(scheduler) = scheduler.upgrade() else {
            return;
        };
        scheduler.handle(SyncTrigger::Timer).await;
    }
}

/// Wait for a token to appear, then run one throttled pull
async fn poll_for_token(scheduler: Weak<SyncScheduler>, interval: Duration, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    loop {
        tokio::time::sleep(interval).await;
        let Some(scheduler) = scheduler.upgrade() else {
            return;
        };
        if scheduler.tokens.has_token() {
            tracing::debug!("Auth token appeared; running first pull");
            scheduler.pull(false).await;
            return;
        }
        if Instant::now() >= deadline {
            tracing::debug!("No auth token before poll timeout");
            return;
        }
    }
}
