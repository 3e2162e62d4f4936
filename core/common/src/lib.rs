//! Common utilities and types shared across diskmirror crates.
//!
//! This module provides the error taxonomy and the small value types that
//! travel between the storage client and the sync engine.

pub mod error;
pub mod types;

pub use error::{Error, RemoteOperation, Result};
pub use types::{file_name_of, remote_path, AccessToken};
