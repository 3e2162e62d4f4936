//! Startup reconciliation: make the remote folder match the local one.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use diskmirror_common::{file_name_of, Error, Result};
use diskmirror_storage::RemoteStorage;

use crate::config::SyncConfig;

/// How reconciliation brings the remote folder in line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileStrategy {
    /// Delete every remote entry, then upload every local file.
    ///
    /// If enumerating the local folder fails after the wipe, the remote
    /// folder is left empty.
    #[default]
    WipeAndReupload,
    /// Enumerate local files first, delete only remote extras, upload
    /// missing files and overwrite the rest. Nothing is touched if the local
    /// folder cannot be read.
    Diff,
}

impl FromStr for ReconcileStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wipe" | "wipe-and-reupload" => Ok(ReconcileStrategy::WipeAndReupload),
            "diff" => Ok(ReconcileStrategy::Diff),
            other => Err(Error::Config(format!(
                "unknown reconcile strategy {:?} (expected \"wipe\" or \"diff\")",
                other
            ))),
        }
    }
}

/// Counters for one reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub deleted: usize,
    pub uploaded: usize,
    pub failed: usize,
    pub duration: Duration,
}

/// List regular files directly inside `folder`, sorted by name.
///
/// Subdirectories are not walked. Symlinks count if they point at a
/// regular file. Names in `ignored` and names that are not valid UTF-8 are
/// skipped.
pub async fn list_local_files(folder: &Path, ignored: &BTreeSet<String>) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(folder)
        .await
        .map_err(|e| Error::local_io(folder, e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| Error::local_io(folder, e))?
    {
        let path = entry.path();
        let name = match file_name_of(&path) {
            Some(name) => name,
            None => {
                warn!("Skipping {}: file name is not valid UTF-8", path.display());
                continue;
            }
        };
        if ignored.contains(name) {
            continue;
        }

        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => files.push(path),
            Ok(_) => {}
            Err(e) => warn!("Skipping {}: {}", path.display(), e),
        }
    }

    files.sort();
    Ok(files)
}

/// Runs the startup reconciliation.
pub struct ReconciliationEngine<S: RemoteStorage + ?Sized> {
    storage: Arc<S>,
    cloud_folder: String,
    ignored: BTreeSet<String>,
    strategy: ReconcileStrategy,
}

impl<S: RemoteStorage + ?Sized> ReconciliationEngine<S> {
    pub fn new(storage: Arc<S>, config: &SyncConfig) -> Self {
        Self {
            storage,
            cloud_folder: config.cloud_folder.clone(),
            ignored: config.ignored_names.clone(),
            strategy: config.reconcile_strategy,
        }
    }

    pub fn with_strategy(mut self, strategy: ReconcileStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Make the remote folder's name set equal to the local one.
    ///
    /// Per-file delete and upload failures are logged, counted and skipped.
    ///
    /// # Errors
    /// - `Error::Remote` if the remote listing fails (nothing is changed)
    /// - `Error::LocalIo` if the local folder cannot be enumerated; with
    ///   [`ReconcileStrategy::WipeAndReupload`] the remote wipe has already
    ///   happened and is not rolled back
    pub async fn synchronize_initial(&self, local_folder: &Path) -> Result<ReconcileReport> {
        let start = Instant::now();
        info!(
            "Reconciling {} -> {} ({:?})",
            local_folder.display(),
            self.cloud_folder,
            self.strategy
        );

        let mut report = match self.strategy {
            ReconcileStrategy::WipeAndReupload => self.wipe_and_reupload(local_folder).await?,
            ReconcileStrategy::Diff => self.diff(local_folder).await?,
        };

        report.duration = start.elapsed();
        info!(
            "Reconciliation completed in {:?}: {} deleted, {} uploaded, {} failed",
            report.duration, report.deleted, report.uploaded, report.failed
        );
        Ok(report)
    }

    async fn remote_names(&self) -> Result<Vec<String>> {
        match self.storage.list(&self.cloud_folder).await {
            Ok(response) => Ok(response.body.into_iter().map(|e| e.name).collect()),
            Err(e) => {
                error!("Reconciliation aborted, cannot list {}: {}", self.cloud_folder, e);
                Err(e)
            }
        }
    }

    async fn local_files(&self, local_folder: &Path) -> Result<Vec<PathBuf>> {
        list_local_files(local_folder, &self.ignored)
            .await
            .inspect_err(|e| error!("Reconciliation aborted, cannot read local folder: {}", e))
    }

    async fn wipe_and_reupload(&self, local_folder: &Path) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        for name in self.remote_names().await? {
            self.delete(&name, &mut report).await;
        }

        for path in self.local_files(local_folder).await? {
            self.upload(&path, false, &mut report).await;
        }

        Ok(report)
    }

    async fn diff(&self, local_folder: &Path) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let local = self.local_files(local_folder).await?;
        let remote: HashSet<String> = self.remote_names().await?.into_iter().collect();
        let local_names: HashSet<&str> = local.iter().filter_map(|p| file_name_of(p)).collect();

        let mut extras: Vec<&String> = remote
            .iter()
            .filter(|name| !local_names.contains(name.as_str()))
            .collect();
        extras.sort();
        for name in extras {
            self.delete(name, &mut report).await;
        }

        for path in &local {
            let exists = file_name_of(path).is_some_and(|name| remote.contains(name));
            self.upload(path, exists, &mut report).await;
        }

        Ok(report)
    }

    async fn delete(&self, name: &str, report: &mut ReconcileReport) {
        match self.storage.delete(&self.cloud_folder, name).await {
            Ok(_) => {
                info!("Deleted remote {}", name);
                report.deleted += 1;
            }
            Err(e) => {
                error!("Failed to delete remote {}: {}", name, e);
                report.failed += 1;
            }
        }
    }

    async fn upload(&self, path: &Path, overwrite: bool, report: &mut ReconcileReport) {
        match self.storage.upload(&self.cloud_folder, path, overwrite).await {
            Ok(_) => {
                info!("Uploaded {} (overwrite={})", path.display(), overwrite);
                report.uploaded += 1;
            }
            Err(e) => {
                error!("Failed to upload {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }
}
