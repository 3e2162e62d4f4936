//! In-memory remote storage for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

use diskmirror_common::{remote_path, Error, RemoteOperation, Result};

use crate::provider::{ApiResponse, RemoteEntry, RemoteStorage, UploadTicket};

/// A call observed by [`MemoryStorage`], in the order it was made.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCall {
    List { folder: String },
    UploadLink { folder: String, name: String, overwrite: bool },
    CommitUpload { name: String, bytes: usize },
    Delete { folder: String, name: String },
}

#[derive(Default)]
struct Inner {
    folders: HashMap<String, BTreeMap<String, Vec<u8>>>,
    tickets: HashMap<String, (String, String)>,
    next_ticket: u64,
    calls: Vec<RecordedCall>,
    failures: HashSet<(RemoteOperation, String)>,
    delays: HashMap<RemoteOperation, Duration>,
}

/// In-memory remote storage.
///
/// Mimics the status codes of the real service (404 for a missing target,
/// 409 for an existing target without overwrite) and records every call so
/// tests can assert on exact call sequences. All data is lost on drop.
#[derive(Default)]
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

fn key(folder: &str) -> String {
    let trimmed = folder.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

impl MemoryStorage {
    /// Create a new storage with no folders.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty folder (no-op if it already exists).
    pub fn create_folder(&self, folder: &str) {
        self.lock().folders.entry(key(folder)).or_default();
    }

    /// Put a file directly into a folder, creating the folder if needed.
    pub fn insert(&self, folder: &str, name: &str, data: impl Into<Vec<u8>>) {
        self.lock()
            .folders
            .entry(key(folder))
            .or_default()
            .insert(name.to_string(), data.into());
    }

    /// Sorted names currently stored in `folder`.
    pub fn names(&self, folder: &str) -> Vec<String> {
        self.lock()
            .folders
            .get(&key(folder))
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Content of `folder/name`, if present.
    pub fn content(&self, folder: &str, name: &str) -> Option<Vec<u8>> {
        self.lock()
            .folders
            .get(&key(folder))
            .and_then(|files| files.get(name).cloned())
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// `(name, overwrite)` of every upload-link request so far.
    pub fn upload_requests(&self) -> Vec<(String, bool)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RecordedCall::UploadLink { name, overwrite, .. } => Some((name.clone(), *overwrite)),
                _ => None,
            })
            .collect()
    }

    /// Names of every delete request so far.
    pub fn delete_requests(&self) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RecordedCall::Delete { name, .. } => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Make every future `operation` addressed to `name` fail with a 500.
    ///
    /// For [`RemoteOperation::List`] the name is the folder path.
    pub fn fail_on(&self, operation: RemoteOperation, name: &str) {
        self.lock().failures.insert((operation, name.to_string()));
    }

    /// Make every future `operation` wait `delay` before taking effect.
    ///
    /// The call is recorded before the wait starts.
    pub fn delay_on(&self, operation: RemoteOperation, delay: Duration) {
        self.lock().delays.insert(operation, delay);
    }

    async fn record(&self, call: RecordedCall, operation: RemoteOperation) {
        let delay = {
            let mut inner = self.lock();
            inner.calls.push(call);
            inner.delays.get(&operation).copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn injected_failure(inner: &Inner, operation: RemoteOperation, name: &str, target: &str) -> Result<()> {
        if inner.failures.contains(&(operation, name.to_string())) {
            return Err(Error::remote_status(operation, target, 500, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStorage for MemoryStorage {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list(&self, folder: &str) -> Result<ApiResponse<Vec<RemoteEntry>>> {
        self.record(
            RecordedCall::List {
                folder: folder.to_string(),
            },
            RemoteOperation::List,
        )
        .await;
        let inner = self.lock();
        Self::injected_failure(&inner, RemoteOperation::List, folder, folder)?;

        let files = inner.folders.get(&key(folder)).ok_or_else(|| {
            Error::remote_status(RemoteOperation::List, folder, 404, "folder not found")
        })?;

        let entries = files
            .iter()
            .map(|(name, data)| RemoteEntry {
                size: Some(data.len() as u64),
                ..RemoteEntry::file(name.clone())
            })
            .collect();

        Ok(ApiResponse::new(entries, 200))
    }

    async fn request_upload_link(
        &self,
        folder: &str,
        filename: &str,
        overwrite: bool,
    ) -> Result<ApiResponse<UploadTicket>> {
        let target = remote_path(folder, filename)?;
        self.record(
            RecordedCall::UploadLink {
                folder: folder.to_string(),
                name: filename.to_string(),
                overwrite,
            },
            RemoteOperation::UploadLink,
        )
        .await;
        let mut inner = self.lock();
        Self::injected_failure(&inner, RemoteOperation::UploadLink, filename, &target)?;

        let files = inner.folders.get(&key(folder)).ok_or_else(|| {
            Error::remote_status(RemoteOperation::UploadLink, &target, 409, "parent folder does not exist")
        })?;
        if !overwrite && files.contains_key(filename) {
            return Err(Error::remote_status(
                RemoteOperation::UploadLink,
                &target,
                409,
                "resource already exists",
            ));
        }

        inner.next_ticket += 1;
        let href = format!("memory://upload/{}", inner.next_ticket);
        let url = Url::parse(&href)
            .map_err(|e| Error::remote(RemoteOperation::UploadLink, &target, e))?;
        inner
            .tickets
            .insert(href, (key(folder), filename.to_string()));

        Ok(ApiResponse::new(
            UploadTicket {
                href: url,
                method: "PUT".to_string(),
                templated: false,
            },
            200,
        ))
    }

    async fn commit_upload(&self, ticket: &UploadTicket, data: Bytes) -> Result<ApiResponse<()>> {
        let href = ticket.href.to_string();
        let name = self
            .lock()
            .tickets
            .get(&href)
            .map(|(_, name)| name.clone())
            .unwrap_or_default();
        self.record(
            RecordedCall::CommitUpload {
                name,
                bytes: data.len(),
            },
            RemoteOperation::CommitUpload,
        )
        .await;
        let mut inner = self.lock();

        // Tickets are single use.
        let (folder, name) = inner.tickets.remove(&href).ok_or_else(|| {
            Error::remote_status(
                RemoteOperation::CommitUpload,
                &href,
                404,
                "unknown or already used upload location",
            )
        })?;
        Self::injected_failure(&inner, RemoteOperation::CommitUpload, &name, &href)?;

        inner
            .folders
            .entry(folder)
            .or_default()
            .insert(name, data.to_vec());

        Ok(ApiResponse::new((), 201))
    }

    async fn delete(&self, folder: &str, filename: &str) -> Result<ApiResponse<()>> {
        let target = remote_path(folder, filename)?;
        self.record(
            RecordedCall::Delete {
                folder: folder.to_string(),
                name: filename.to_string(),
            },
            RemoteOperation::Delete,
        )
        .await;
        let mut inner = self.lock();
        Self::injected_failure(&inner, RemoteOperation::Delete, filename, &target)?;

        let removed = inner
            .folders
            .get_mut(&key(folder))
            .and_then(|files| files.remove(filename));

        match removed {
            Some(_) => Ok(ApiResponse::new((), 204)),
            None => Err(Error::remote_status(
                RemoteOperation::Delete,
                target,
                404,
                "resource not found",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const FOLDER: &str = "disk:/backup";

    #[tokio::test]
    async fn test_list_reports_inserted_files() {
        let storage = MemoryStorage::new();
        storage.insert(FOLDER, "b.txt", "bb");
        storage.insert(FOLDER, "a.txt", "a");

        let response = storage.list(FOLDER).await.unwrap();
        assert_eq!(response.status, 200);
        let names: Vec<_> = response.body.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_delay_applies_after_recording() {
        let storage = std::sync::Arc::new(MemoryStorage::new());
        storage.create_folder(FOLDER);
        storage.delay_on(RemoteOperation::List, Duration::from_millis(300));

        let started = tokio::time::Instant::now();
        let task = {
            let storage = storage.clone();
            tokio::spawn(async move { storage.list(FOLDER).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(storage.calls(), vec![RecordedCall::List { folder: FOLDER.into() }]);

        task.await.unwrap().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_list_missing_folder_is_not_found() {
        let storage = MemoryStorage::new();
        let err = storage.list("disk:/nope").await.unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn test_upload_link_without_overwrite_conflicts() {
        let storage = MemoryStorage::new();
        storage.insert(FOLDER, "a.txt", "old");

        let err = storage
            .request_upload_link(FOLDER, "a.txt", false)
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(409));

        let ticket = storage
            .request_upload_link(FOLDER, "a.txt", true)
            .await
            .unwrap()
            .body;
        storage
            .commit_upload(&ticket, Bytes::from_static(b"new"))
            .await
            .unwrap();
        assert_eq!(storage.content(FOLDER, "a.txt"), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_ticket_is_single_use() {
        let storage = MemoryStorage::new();
        storage.create_folder(FOLDER);

        let ticket = storage
            .request_upload_link(FOLDER, "a.txt", false)
            .await
            .unwrap()
            .body;
        storage.commit_upload(&ticket, Bytes::from_static(b"1")).await.unwrap();

        let err = storage
            .commit_upload(&ticket, Bytes::from_static(b"2"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(storage.content(FOLDER, "a.txt"), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let storage = MemoryStorage::new();
        storage.create_folder(FOLDER);

        let err = storage.delete(FOLDER, "ghost.txt").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Remote {
                operation: RemoteOperation::Delete,
                status: Some(404),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_upload_reads_local_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();

        let storage = MemoryStorage::new();
        storage.create_folder(FOLDER);
        storage.upload(FOLDER, &path, false).await.unwrap();

        assert_eq!(storage.content(FOLDER, "report.csv"), Some(b"a,b\n1,2\n".to_vec()));
        assert_eq!(
            storage.calls(),
            vec![
                RecordedCall::UploadLink {
                    folder: FOLDER.to_string(),
                    name: "report.csv".to_string(),
                    overwrite: false,
                },
                RecordedCall::CommitUpload {
                    name: "report.csv".to_string(),
                    bytes: 8,
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_upload_missing_local_file_makes_no_remote_call() {
        let dir = TempDir::new().unwrap();
        let storage = MemoryStorage::new();
        storage.create_folder(FOLDER);

        let err = storage
            .upload(FOLDER, &dir.path().join("gone.txt"), true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::LocalIo { .. }));
        assert!(storage.calls().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let storage = MemoryStorage::new();
        storage.insert(FOLDER, "a.txt", "a");
        storage.fail_on(RemoteOperation::Delete, "a.txt");

        let err = storage.delete(FOLDER, "a.txt").await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(storage.names(FOLDER), vec!["a.txt"]);
    }
}
