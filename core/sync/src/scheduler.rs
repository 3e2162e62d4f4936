//! Sync scheduling: watcher lifecycle, heartbeat tick and shutdown.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use diskmirror_common::{Error, Result};
use diskmirror_storage::RemoteStorage;

use crate::config::SyncConfig;
use crate::dispatch::{event_queue, EventDispatcher};
use crate::handler::SyncEventHandler;
use crate::reconcile::ReconciliationEngine;
use crate::watcher::FolderWatcher;

/// Lifecycle state of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    /// Watcher is running with its events held; initial sync in progress.
    Reconciling,
    Watching,
    Stopping,
    Stopped,
}

/// What to do when the configured period turns out to be invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidPeriodPolicy {
    /// Stop the tick loop and the watcher; `run` returns.
    #[default]
    Shutdown,
    /// Stop only the tick loop; the watcher keeps delivering events until
    /// an external shutdown.
    KeepWatching,
}

impl FromStr for InvalidPeriodPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shutdown" => Ok(InvalidPeriodPolicy::Shutdown),
            "keep-watching" | "keep_watching" => Ok(InvalidPeriodPolicy::KeepWatching),
            other => Err(Error::Config(format!(
                "unknown invalid-period policy {:?} (expected \"shutdown\" or \"keep-watching\")",
                other
            ))),
        }
    }
}

/// Why the tick loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickExit {
    Cancelled,
    InvalidPeriod,
}

#[derive(Default)]
struct Shared {
    ticking: AtomicBool,
    ticks: AtomicU64,
}

/// Control side of the scheduler: observe state, request shutdown.
pub struct SyncScheduler {
    state: Arc<RwLock<SchedulerState>>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl SyncScheduler {
    /// Create a scheduler and the handle that runs it.
    ///
    /// Performs no I/O; everything happens in [`SyncSchedulerHandle::run`].
    pub fn new<S>(config: Arc<SyncConfig>, storage: Arc<S>) -> (Self, SyncSchedulerHandle<S>)
    where
        S: RemoteStorage + ?Sized + 'static,
    {
        let state = Arc::new(RwLock::new(SchedulerState::Idle));
        let shared = Arc::new(Shared::default());
        let shutdown = CancellationToken::new();

        let scheduler = Self {
            state: state.clone(),
            shared: shared.clone(),
            shutdown: shutdown.clone(),
        };

        let handle = SyncSchedulerHandle {
            config,
            storage,
            state,
            shared,
            shutdown,
        };

        (scheduler, handle)
    }

    /// Get current state.
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Whether the heartbeat loop is running.
    pub fn is_ticking(&self) -> bool {
        self.shared.ticking.load(Ordering::SeqCst)
    }

    /// Number of completed heartbeat ticks.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    /// Request an orderly shutdown.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token that triggers shutdown when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Handle for the scheduler task.
pub struct SyncSchedulerHandle<S: RemoteStorage + ?Sized> {
    config: Arc<SyncConfig>,
    storage: Arc<S>,
    state: Arc<RwLock<SchedulerState>>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl<S: RemoteStorage + ?Sized + 'static> SyncSchedulerHandle<S> {
    /// Run the scheduler until shutdown.
    ///
    /// Starts the watcher first so changes made during reconciliation are
    /// queued, then reconciles (if configured), then starts the dispatcher
    /// and ticks every `sync_period` seconds. Reconciliation failures are
    /// logged and do not prevent watching. A shutdown during reconciliation
    /// abandons it and stops without dispatching.
    ///
    /// # Errors
    /// - `Error::Watcher` if the sync folder cannot be watched
    pub async fn run(self) -> Result<()> {
        let (tx, rx) = event_queue(self.config.queue_capacity);
        let mut watcher =
            FolderWatcher::new(&self.config.sync_folder, self.config.ignored_names.clone());
        if let Err(e) = watcher.start(tx) {
            error!("Cannot start watching: {}", e);
            self.set_state(SchedulerState::Stopped).await;
            return Err(e);
        }

        if self.config.reconcile_on_start {
            self.set_state(SchedulerState::Reconciling).await;
            let engine = ReconciliationEngine::new(self.storage.clone(), &self.config);

            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    warn!("Shutdown requested during initial sync; stopping");
                    watcher.stop();
                    self.set_state(SchedulerState::Stopped).await;
                    return Ok(());
                }
                result = engine.synchronize_initial(&self.config.sync_folder) => {
                    if let Err(e) = result {
                        warn!("Continuing without a complete initial sync: {}", e);
                    }
                }
            }
        }

        let handler = Arc::new(SyncEventHandler::new(self.storage.clone(), &self.config));
        let dispatcher = EventDispatcher::new(handler, rx, self.config.debounce);
        let dispatcher_stop = CancellationToken::new();
        let dispatcher_task = tokio::spawn(dispatcher.run(dispatcher_stop.clone()));

        self.set_state(SchedulerState::Watching).await;
        info!("Sync scheduler started");

        let exit = self.tick_loop().await;
        if exit == TickExit::InvalidPeriod
            && self.config.invalid_period_policy == InvalidPeriodPolicy::KeepWatching
        {
            warn!("Periodic loop stopped; watcher keeps running until shutdown");
            self.shutdown.cancelled().await;
        }

        self.set_state(SchedulerState::Stopping).await;
        info!("Sync scheduler shutting down");

        watcher.stop();
        dispatcher_stop.cancel();
        match dispatcher_task.await {
            Ok(stats) => debug!("Dispatcher joined: {:?}", stats),
            Err(e) => error!("Dispatcher task failed: {}", e),
        }

        self.set_state(SchedulerState::Stopped).await;
        info!("Sync scheduler stopped");
        Ok(())
    }

    async fn tick_loop(&self) -> TickExit {
        self.shared.ticking.store(true, Ordering::SeqCst);

        let exit = loop {
            let period = match self.config.sync_period() {
                Ok(period) => period,
                Err(e) => {
                    error!("{}; stopping periodic loop", e);
                    break TickExit::InvalidPeriod;
                }
            };

            tokio::select! {
                _ = self.shutdown.cancelled() => break TickExit::Cancelled,
                _ = tokio::time::sleep(period) => {
                    let ticks = self.shared.ticks.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("Heartbeat {}: watching {}", ticks, self.config.sync_folder.display());
                }
            }
        };

        self.shared.ticking.store(false, Ordering::SeqCst);
        exit
    }

    async fn set_state(&self, state: SchedulerState) {
        *self.state.write().await = state;
    }
}
