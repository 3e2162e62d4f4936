//! Bounded event queue with a single consumer and per-path coalescing.
//!
//! The watcher is the only producer. A single dispatcher task drains the
//! queue and hands events to the [`SyncEventHandler`] one at a time, so remote
//! operations on the same file name never overlap. When the queue is full
//! the producer blocks.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use diskmirror_storage::RemoteStorage;

use crate::event::{ChangeKind, SyncEvent};
use crate::handler::{HandleOutcome, SyncEventHandler};

/// Create the queue between watcher and dispatcher.
pub fn event_queue(capacity: usize) -> (mpsc::Sender<SyncEvent>, mpsc::Receiver<SyncEvent>) {
    mpsc::channel(capacity.max(1))
}

/// Fold a later change into an earlier pending one for the same path.
///
/// `None` means the two cancel out (a file created and deleted within the
/// window never needs to reach the remote).
pub fn merge(earlier: Option<ChangeKind>, later: ChangeKind) -> Option<ChangeKind> {
    use ChangeKind::*;

    match (earlier, later) {
        (None, later) => Some(later),
        (Some(Created), Created | Modified) => Some(Created),
        (Some(Created), Deleted) => None,
        (Some(Modified), Created | Modified) => Some(Modified),
        (Some(Deleted), Created | Modified) => Some(Modified),
        (Some(_), Deleted) => Some(Deleted),
    }
}

#[derive(Debug)]
struct Pending {
    path: PathBuf,
    kind: Option<ChangeKind>,
    due: Instant,
}

/// Per-path coalescing buffer.
///
/// An entry becomes due `window` after the first event for its path, so a
/// file that keeps changing is still flushed at a bounded delay. Due entries
/// are released in the order their paths were first seen.
#[derive(Debug)]
pub struct Coalescer {
    window: Duration,
    pending: Vec<Pending>,
    merged: u64,
}

impl Coalescer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Vec::new(),
            merged: 0,
        }
    }

    /// Add an event observed at `now`.
    pub fn push(&mut self, event: SyncEvent, now: Instant) {
        let kind = event.kind();
        let path = event.into_path();

        if !self.window.is_zero() {
            if let Some(entry) = self.pending.iter_mut().find(|p| p.path == path) {
                entry.kind = merge(entry.kind, kind);
                self.merged += 1;
                return;
            }
        }

        self.pending.push(Pending {
            path,
            kind: Some(kind),
            due: now + self.window,
        });
    }

    /// Earliest instant at which an entry becomes due.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.iter().map(|p| p.due).min()
    }

    /// Remove and return every entry due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Vec<SyncEvent> {
        let (due, waiting): (Vec<_>, Vec<_>) =
            self.pending.drain(..).partition(|p| p.due <= now);
        self.pending = waiting;

        due.into_iter()
            .filter_map(|p| p.kind.map(|kind| SyncEvent::new(kind, p.path)))
            .collect()
    }

    /// Remove and return everything regardless of due time.
    pub fn take_all(&mut self) -> Vec<SyncEvent> {
        self.pending
            .drain(..)
            .filter_map(|p| p.kind.map(|kind| SyncEvent::new(kind, p.path)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Number of events folded into an earlier one so far.
    pub fn merged(&self) -> u64 {
        self.merged
    }
}

/// Counters reported when the dispatcher exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub received: u64,
    pub handled: u64,
    pub coalesced: u64,
    pub failed: u64,
}

/// Single consumer of the event queue.
pub struct EventDispatcher<S: RemoteStorage + ?Sized> {
    handler: Arc<SyncEventHandler<S>>,
    rx: mpsc::Receiver<SyncEvent>,
    coalescer: Coalescer,
    stats: DispatchStats,
}

impl<S: RemoteStorage + ?Sized> EventDispatcher<S> {
    pub fn new(
        handler: Arc<SyncEventHandler<S>>,
        rx: mpsc::Receiver<SyncEvent>,
        window: Duration,
    ) -> Self {
        Self {
            handler,
            rx,
            coalescer: Coalescer::new(window),
            stats: DispatchStats::default(),
        }
    }

    /// Consume events until the queue closes or `shutdown` fires.
    ///
    /// Events already queued or pending at that point are still handled
    /// before returning.
    pub async fn run(mut self, shutdown: CancellationToken) -> DispatchStats {
        debug!("Event dispatcher started");

        loop {
            let next_due = self.coalescer.next_due();

            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                received = self.rx.recv() => match received {
                    Some(event) => {
                        self.stats.received += 1;
                        self.coalescer.push(event, Instant::now());
                    }
                    None => break,
                },

                _ = wait_until(next_due) => {}
            }

            let due = self.coalescer.take_due(Instant::now());
            self.dispatch(due).await;
        }

        self.rx.close();
        while let Ok(event) = self.rx.try_recv() {
            self.stats.received += 1;
            self.coalescer.push(event, Instant::now());
        }
        let rest = self.coalescer.take_all();
        self.dispatch(rest).await;

        self.stats.coalesced = self.coalescer.merged();
        info!(
            "Event dispatcher stopped: {} received, {} handled, {} coalesced, {} failed",
            self.stats.received, self.stats.handled, self.stats.coalesced, self.stats.failed
        );
        self.stats
    }

    async fn dispatch(&mut self, events: Vec<SyncEvent>) {
        for event in events {
            let outcome = self.handler.handle(&event).await;
            self.stats.handled += 1;
            if matches!(outcome, HandleOutcome::Failed { .. }) {
                self.stats.failed += 1;
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
