//! Remote storage trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use url::Url;

use diskmirror_common::{file_name_of, Error, Result};

/// Kind of a remote entry as reported by the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    #[default]
    File,
    Dir,
}

/// An item reported by a folder listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Name, unique within the listed folder.
    pub name: String,
    /// File or directory.
    #[serde(rename = "type", default)]
    pub kind: EntryKind,
    /// Size in bytes (files only).
    #[serde(default)]
    pub size: Option<u64>,
    /// Last modification time.
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    /// Create a file entry with only a name.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
            size: None,
            modified: None,
        }
    }
}

/// One-time upload location issued by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadTicket {
    /// URL the file bytes must be written to.
    pub href: Url,
    /// HTTP method the service expects for the write.
    #[serde(default = "default_upload_method")]
    pub method: String,
    /// Whether `href` is a URL template.
    #[serde(default)]
    pub templated: bool,
}

fn default_upload_method() -> String {
    "PUT".to_string()
}

/// Decoded response body together with the HTTP status it arrived with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse<T> {
    pub body: T,
    pub status: u16,
}

impl<T> ApiResponse<T> {
    pub fn new(body: T, status: u16) -> Self {
        Self { body, status }
    }
}

/// A local file opened for upload.
///
/// The length is taken when the file is opened; the upload sends exactly
/// that many bytes.
#[derive(Debug)]
pub struct LocalFile {
    pub path: PathBuf,
    pub file: File,
    pub len: u64,
}

impl LocalFile {
    /// Open `path` for reading.
    ///
    /// # Errors
    /// - `Error::LocalIo` if the file cannot be opened or inspected
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .map_err(|e| Error::local_io(path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| Error::local_io(path, e))?
            .len();

        Ok(Self {
            path: path.to_path_buf(),
            file,
            len,
        })
    }

    /// Read the whole file into memory.
    pub async fn into_bytes(self) -> Result<Bytes> {
        let mut data = Vec::with_capacity(self.len as usize);
        self.file
            .take(self.len)
            .read_to_end(&mut data)
            .await
            .map_err(|e| Error::local_io(&self.path, e))?;
        Ok(Bytes::from(data))
    }
}

/// Contract of the remote folder the local directory is mirrored to.
///
/// Every call is a single attempt. Implementations report any failure
/// (transport, non-2xx status, malformed body) as `Error::Remote`, and never
/// pre-check remote state on the caller's behalf.
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Get the provider name (e.g., "yadisk", "memory").
    fn name(&self) -> &str;

    /// List the entries of a remote folder.
    async fn list(&self, folder: &str) -> Result<ApiResponse<Vec<RemoteEntry>>>;

    /// Obtain a one-time upload location for `folder/filename`.
    ///
    /// With `overwrite == false` the remote service rejects the request when
    /// the target already exists.
    async fn request_upload_link(
        &self,
        folder: &str,
        filename: &str,
        overwrite: bool,
    ) -> Result<ApiResponse<UploadTicket>>;

    /// Write file bytes to a previously issued upload location.
    async fn commit_upload(&self, ticket: &UploadTicket, data: Bytes) -> Result<ApiResponse<()>>;

    /// Write an opened local file to a previously issued upload location.
    ///
    /// The default buffers the file and calls [`commit_upload`](Self::commit_upload);
    /// network providers stream it instead.
    async fn commit_file(&self, ticket: &UploadTicket, source: LocalFile) -> Result<ApiResponse<()>> {
        let data = source.into_bytes().await?;
        self.commit_upload(ticket, data).await
    }

    /// Delete `folder/filename`.
    ///
    /// # Errors
    /// - The target does not exist (reported by the remote service)
    async fn delete(&self, folder: &str, filename: &str) -> Result<ApiResponse<()>>;

    /// Read-only listing for external callers.
    async fn get_info(&self, folder: &str) -> Result<ApiResponse<Vec<RemoteEntry>>> {
        self.list(folder).await
    }

    /// Upload a local file into `folder` under its own file name.
    ///
    /// Opens the file, requests an upload link, then commits the contents:
    /// two network round trips.
    ///
    /// # Errors
    /// - `Error::LocalIo` if the file cannot be opened or read
    /// - `Error::Remote` if either remote call fails
    async fn upload(
        &self,
        folder: &str,
        local_path: &Path,
        overwrite: bool,
    ) -> Result<ApiResponse<()>> {
        let filename = file_name_of(local_path).ok_or_else(|| {
            Error::InvalidInput(format!("No file name in {}", local_path.display()))
        })?;

        let source = LocalFile::open(local_path).await?;

        let ticket = self
            .request_upload_link(folder, filename, overwrite)
            .await?
            .body;

        self.commit_file(&ticket, source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_entry_from_listing_item() {
        let json = r#"{
            "name": "notes.txt",
            "type": "file",
            "size": 42,
            "modified": "2024-03-01T10:00:00+00:00",
            "path": "disk:/backup/notes.txt"
        }"#;

        let entry: RemoteEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.name, "notes.txt");
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, Some(42));
        assert!(entry.modified.is_some());
    }

    #[test]
    fn test_remote_entry_name_only() {
        let entry: RemoteEntry = serde_json::from_str(r#"{"name": "photos", "type": "dir"}"#).unwrap();
        assert_eq!(entry.kind, EntryKind::Dir);
        assert_eq!(entry.size, None);
    }

    #[tokio::test]
    async fn test_local_file_open_and_read() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, vec![7u8; 4096]).unwrap();

        let source = LocalFile::open(&path).await.unwrap();
        assert_eq!(source.len, 4096);
        assert_eq!(source.into_bytes().await.unwrap().len(), 4096);

        let missing = LocalFile::open(&dir.path().join("missing")).await.unwrap_err();
        assert!(matches!(missing, Error::LocalIo { .. }));
    }

    #[test]
    fn test_upload_ticket_defaults() {
        let ticket: UploadTicket =
            serde_json::from_str(r#"{"href": "https://uploader.example/put/123"}"#).unwrap();
        assert_eq!(ticket.method, "PUT");
        assert!(!ticket.templated);
        assert_eq!(ticket.href.host_str(), Some("uploader.example"));
    }
}
