//! DiskMirror Sync Engine
//!
//! One-way mirroring of a local folder into a remote folder:
//! - Initial reconciliation (wipe-and-reupload or diff)
//! - Non-recursive folder watching
//! - Per-path event coalescing and dispatch to the remote
//! - Heartbeat scheduling with orderly shutdown

pub mod config;
pub mod dispatch;
pub mod event;
pub mod handler;
pub mod reconcile;
pub mod scheduler;
pub mod watcher;

// Re-export main types
pub use config::SyncConfig;
pub use dispatch::{event_queue, Coalescer, DispatchStats, EventDispatcher};
pub use event::{events_from_notify, ChangeKind, SyncEvent};
pub use handler::{HandleOutcome, SyncEventHandler};
pub use reconcile::{list_local_files, ReconcileReport, ReconcileStrategy, ReconciliationEngine};
pub use scheduler::{InvalidPeriodPolicy, SchedulerState, SyncScheduler, SyncSchedulerHandle};
pub use watcher::FolderWatcher;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_exports() {
        // Verify all main types are accessible
        let _strategy = ReconcileStrategy::default();
        let _policy = InvalidPeriodPolicy::default();
        let _coalescer = Coalescer::new(std::time::Duration::ZERO);
        let _stats = DispatchStats::default();
    }
}
