//! Filesystem watcher for the sync folder.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use diskmirror_common::{file_name_of, Error, Result};

use crate::event::{events_from_notify, SyncEvent};

/// Watches one directory, non-recursively, and forwards file events.
///
/// Events are pushed into a bounded channel from the notification backend's
/// own thread with `blocking_send`, so a full queue blocks the producer.
pub struct FolderWatcher {
    root: PathBuf,
    ignored: Arc<BTreeSet<String>>,
    watcher: Option<RecommendedWatcher>,
    started: bool,
}

impl FolderWatcher {
    /// Create a watcher for `root`. Nothing is observed until [`start`](Self::start).
    pub fn new(root: impl Into<PathBuf>, ignored: BTreeSet<String>) -> Self {
        Self {
            root: root.into(),
            ignored: Arc::new(ignored),
            watcher: None,
            started: false,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the OS watch is currently held.
    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    /// Begin observation, delivering events into `tx`.
    ///
    /// # Errors
    /// - `Error::Watcher` if called more than once
    /// - `Error::Watcher` if the backend cannot watch the folder
    pub fn start(&mut self, tx: mpsc::Sender<SyncEvent>) -> Result<()> {
        if self.started {
            return Err(Error::Watcher(format!(
                "watcher for {} was already started",
                self.root.display()
            )));
        }

        let ignored = self.ignored.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("Watch error: {}", e);
                    return;
                }
            };

            for sync_event in events_from_notify(&event) {
                let name = file_name_of(sync_event.path()).unwrap_or_default();
                if ignored.contains(name) {
                    debug!("Ignoring {:?} for {}", sync_event.kind(), name);
                    continue;
                }
                if tx.blocking_send(sync_event).is_err() {
                    debug!("Event queue closed, dropping notification");
                    return;
                }
            }
        })
        .map_err(|e| Error::Watcher(format!("Failed to create watcher: {}", e)))?;

        watcher
            .watch(&self.root, RecursiveMode::NonRecursive)
            .map_err(|e| Error::Watcher(format!("Failed to watch {}: {}", self.root.display(), e)))?;

        info!("Watching {}", self.root.display());
        self.watcher = Some(watcher);
        self.started = true;
        Ok(())
    }

    /// Stop observation and release the OS watch handle.
    ///
    /// Never waits on the backend thread: `unwatch` would, and that thread
    /// may be parked in `blocking_send` on a full queue. Dropping the watcher
    /// only signals its event loop to exit.
    ///
    /// Calling this on a watcher that is not running is a no-op.
    pub fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            info!("Stopped watching {}", self.root.display());
        }
    }
}

impl Drop for FolderWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
