//! Translation of sync events into remote storage calls.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info};

use diskmirror_common::file_name_of;
use diskmirror_storage::RemoteStorage;

use crate::config::SyncConfig;
use crate::event::SyncEvent;

/// What the handler did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// File was uploaded with the given overwrite flag.
    Uploaded { name: String, overwrite: bool },
    /// Remote file was deleted.
    Deleted { name: String },
    /// Name is on the ignore-list (or the path has no usable file name).
    Ignored { name: String },
    /// The remote or local operation failed; the error was logged.
    Failed { name: String, action: &'static str },
}

/// Applies sync events to the remote folder.
///
/// | event    | action                        |
/// |----------|-------------------------------|
/// | Created  | upload with `overwrite=false` |
/// | Modified | upload with `overwrite=true`  |
/// | Deleted  | delete by file name           |
///
/// Ignored names produce no call. Failures are logged and reported in the
/// outcome, never returned as errors.
pub struct SyncEventHandler<S: RemoteStorage + ?Sized> {
    storage: Arc<S>,
    cloud_folder: String,
    ignored: BTreeSet<String>,
}

impl<S: RemoteStorage + ?Sized> SyncEventHandler<S> {
    pub fn new(storage: Arc<S>, config: &SyncConfig) -> Self {
        Self {
            storage,
            cloud_folder: config.cloud_folder.clone(),
            ignored: config.ignored_names.clone(),
        }
    }

    /// Handle a single event.
    pub async fn handle(&self, event: &SyncEvent) -> HandleOutcome {
        let name = match file_name_of(event.path()) {
            Some(name) if !self.ignored.contains(name) => name.to_string(),
            other => {
                let name = other.unwrap_or_default().to_string();
                info!("File {} ignored ({:?})", name, event.kind());
                return HandleOutcome::Ignored { name };
            }
        };

        match event {
            SyncEvent::Created(path) => self.upload(path, name, false, "created").await,
            SyncEvent::Modified(path) => self.upload(path, name, true, "modified").await,
            SyncEvent::Deleted(_) => match self.storage.delete(&self.cloud_folder, &name).await {
                Ok(_) => {
                    info!("File {} was deleted, removed from {}", name, self.cloud_folder);
                    HandleOutcome::Deleted { name }
                }
                Err(e) => {
                    error!("File {} was deleted, remote delete failed: {}", name, e);
                    HandleOutcome::Failed { name, action: "delete" }
                }
            },
        }
    }

    async fn upload(
        &self,
        path: &std::path::Path,
        name: String,
        overwrite: bool,
        what: &str,
    ) -> HandleOutcome {
        match self.storage.upload(&self.cloud_folder, path, overwrite).await {
            Ok(_) => {
                info!(
                    "File {} was {}, uploaded to {} (overwrite={})",
                    name, what, self.cloud_folder, overwrite
                );
                HandleOutcome::Uploaded { name, overwrite }
            }
            Err(e) => {
                error!("File {} was {}, upload failed: {}", name, what, e);
                HandleOutcome::Failed { name, action: "upload" }
            }
        }
    }
}
