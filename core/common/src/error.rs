//! Common error types for diskmirror.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Remote primitive that was being attempted when an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    /// Folder listing (also used by `get_info`).
    List,
    /// Request for a one-time upload location.
    UploadLink,
    /// Byte transfer to an upload location.
    CommitUpload,
    /// Removal of a remote entry.
    Delete,
}

impl RemoteOperation {
    /// Short lowercase name used in log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOperation::List => "list",
            RemoteOperation::UploadLink => "upload-link",
            RemoteOperation::CommitUpload => "commit-upload",
            RemoteOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error type for diskmirror operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Remote storage call failed: non-2xx status, transport failure or an
    /// undecodable body.
    #[error("Remote {operation} failed for {target}: {cause}")]
    Remote {
        operation: RemoteOperation,
        /// Remote path or URL the call was addressed to.
        target: String,
        /// HTTP status, when a response was received at all.
        status: Option<u16>,
        cause: String,
    },

    /// Local filesystem access failed.
    #[error("Local I/O error at {}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem watcher failure or lifecycle misuse.
    #[error("Watcher error: {0}")]
    Watcher(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Build a remote error without an HTTP status (transport-level failure).
    pub fn remote(
        operation: RemoteOperation,
        target: impl Into<String>,
        cause: impl fmt::Display,
    ) -> Self {
        Error::Remote {
            operation,
            target: target.into(),
            status: None,
            cause: cause.to_string(),
        }
    }

    /// Build a remote error for a response with a non-success status.
    pub fn remote_status(
        operation: RemoteOperation,
        target: impl Into<String>,
        status: u16,
        cause: impl fmt::Display,
    ) -> Self {
        Error::Remote {
            operation,
            target: target.into(),
            status: Some(status),
            cause: cause.to_string(),
        }
    }

    /// Wrap an I/O error together with the path it concerns.
    pub fn local_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::LocalIo {
            path: path.into(),
            source,
        }
    }

    /// HTTP status carried by a remote error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => *status,
            _ => None,
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = Error::remote_status(RemoteOperation::Delete, "disk:/backup/a.txt", 404, "not found");
        assert_eq!(
            err.to_string(),
            "Remote delete failed for disk:/backup/a.txt: not found"
        );
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_local_io_display_includes_path() {
        let err = Error::local_io(
            "/missing/dir",
            std::io::Error::new(std::io::ErrorKind::NotFound, "no such directory"),
        );
        let text = err.to_string();
        assert!(text.contains("/missing/dir"));
        assert!(text.contains("no such directory"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_operation_names() {
        let names: Vec<String> = [
            RemoteOperation::List,
            RemoteOperation::UploadLink,
            RemoteOperation::CommitUpload,
            RemoteOperation::Delete,
        ]
        .iter()
        .map(|op| op.to_string())
        .collect();
        assert_eq!(names, vec!["list", "upload-link", "commit-upload", "delete"]);
    }
}
