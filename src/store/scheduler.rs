//! Background refresh loops.
//!
//! Each domain store owns one [`RefreshScheduler`]. A running loop fetches
//! once immediately, then on every interval tick and on every
//! focus/visibility [`LifecycleSignal`]. Stopping the loop also detaches it
//! from the signal channel, so a stopped store is never woken again.

use std::sync::{Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const SIGNAL_CAPACITY: usize = 16;
const MIN_INTERVAL: Duration = Duration::from_millis(1);
/// Longest accepted refresh interval; longer requests are clamped so the
/// first tick deadline always fits in an `Instant`.
pub const MAX_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Host lifecycle events that trigger an immediate refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    FocusGained,
    BecameVisible,
}

/// Fan-out channel for lifecycle signals, shared by every scheduler.
#[derive(Clone)]
pub struct LifecycleSignals {
    tx: broadcast::Sender<LifecycleSignal>,
}

impl LifecycleSignals {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(SIGNAL_CAPACITY);
        Self { tx }
    }

    /// Delivers `signal` to every running loop. Returns how many listened.
    pub fn emit(&self, signal: LifecycleSignal) -> usize {
        self.tx.send(signal).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleSignal> {
        self.tx.subscribe()
    }
}

impl Default for LifecycleSignals {
    fn default() -> Self {
        Self::new()
    }
}

/// Something a scheduler can refresh.
#[async_trait]
pub trait Refresh: Send + Sync + 'static {
    /// Short name used in log fields.
    fn label(&self) -> &'static str;

    async fn refresh(&self);
}

/// Opaque handle to a running loop. Cancelling it has the same effect as
/// `RefreshScheduler::stop`.
#[derive(Clone, Debug)]
pub struct RefreshToken(CancellationToken);

impl RefreshToken {
    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

struct ActiveLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl ActiveLoop {
    fn is_running(&self) -> bool {
        !self.token.is_cancelled() && !self.task.is_finished()
    }
}

pub struct RefreshScheduler {
    signals: LifecycleSignals,
    active: Mutex<Option<ActiveLoop>>,
}

impl RefreshScheduler {
    pub fn new(signals: LifecycleSignals) -> Self {
        Self {
            signals,
            active: Mutex::new(None),
        }
    }

    /// Starts the loop for `target`. Returns `None` and does nothing when a
    /// loop is already running. The loop holds `target` weakly and ends once
    /// it is dropped.
    pub fn start(&self, target: Weak<dyn Refresh>, interval: Duration) -> Option<RefreshToken> {
        let label = target.upgrade()?.label();
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        if active.as_ref().is_some_and(ActiveLoop::is_running) {
            tracing::debug!(store = label, "auto refresh already running");
            return None;
        }

        let token = CancellationToken::new();
        let signals = self.signals.subscribe();
        let interval = interval.clamp(MIN_INTERVAL, MAX_INTERVAL);
        tracing::debug!(
            store = label,
            interval_ms = interval.as_millis() as u64,
            "starting auto refresh"
        );
        let task = tokio::spawn(run_refresh_loop(
            target,
            label,
            interval,
            signals,
            token.clone(),
        ));
        *active = Some(ActiveLoop {
            token: token.clone(),
            task,
        });
        Some(RefreshToken(token))
    }

    /// Cancels the running loop. Returns whether one was running.
    pub fn stop(&self) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.take() {
            Some(running) => {
                let was_running = running.is_running();
                running.token.cancel();
                was_running
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(ActiveLoop::is_running)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Refreshes `target` if it is still alive. Returns `false` once it is gone.
async fn refresh_once(target: &Weak<dyn Refresh>) -> bool {
    match target.upgrade() {
        Some(target) => {
            target.refresh().await;
            true
        }
        None => false,
    }
}

async fn run_refresh_loop(
    target: Weak<dyn Refresh>,
    label: &'static str,
    interval: Duration,
    mut signals: broadcast::Receiver<LifecycleSignal>,
    token: CancellationToken,
) {
    let mut alive = refresh_once(&target).await;

    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut listening = true;

    while alive {
        tokio::select! {
            biased;

            _ = token.cancelled() => break,

            _ = ticker.tick() => {
                alive = refresh_once(&target).await;
            }

            signal = signals.recv(), if listening => {
                match signal {
                    Ok(signal) => {
                        tracing::debug!(store = label, ?signal, "lifecycle refresh");
                        alive = refresh_once(&target).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(store = label, skipped, "lifecycle signals lagged");
                        alive = refresh_once(&target).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => listening = false,
                }
            }
        }
    }
    tracing::debug!(store = label, "auto refresh stopped");
}
