//! Common types used throughout diskmirror.

use std::fmt;
use std::path::Path;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// OAuth token for the remote storage service.
///
/// The value is wiped from memory on drop and never printed by `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccessToken(String);

impl AccessToken {
    /// Create a new token.
    ///
    /// # Errors
    /// - Returns error if the token is empty or only whitespace
    pub fn new(token: impl Into<String>) -> crate::Result<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(crate::Error::Config("Access token cannot be empty".to_string()));
        }
        Ok(Self(token))
    }

    /// Get the raw token value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken([REDACTED])")
    }
}

/// Join a remote folder and a file name into the remote path of that file.
///
/// Exactly one `/` separates the two parts regardless of trailing separators
/// on `folder`.
///
/// # Errors
/// - `name` is empty, `.`/`..`, or contains a path separator
pub fn remote_path(folder: &str, name: &str) -> crate::Result<String> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(crate::Error::InvalidInput(format!(
            "Invalid remote file name: {:?}",
            name
        )));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(crate::Error::InvalidInput(format!(
            "Remote file name cannot contain separators: {}",
            name
        )));
    }

    let folder = folder.trim_end_matches('/');
    Ok(format!("{}/{}", folder, name))
}

/// Final component of a local path as UTF-8, if it has one.
pub fn file_name_of(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}
