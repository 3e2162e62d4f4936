//! Remote storage abstraction for diskmirror.
//!
//! This module provides the trait-based contract the sync engine talks to
//! and two implementations of it:
//! - `DiskProvider`, the Yandex Disk REST client
//! - `MemoryStorage`, an in-memory folder namespace for tests and dry runs
//!
//! # Design Principles
//! - Single-shot calls: no retries or backoff inside the client
//! - Every primitive returns the decoded body together with the HTTP status
//! - Unified error semantics: every failure is `Error::Remote` carrying the
//!   attempted operation and its target

pub mod memory;
pub mod provider;
pub mod yadisk;

pub use memory::{MemoryStorage, RecordedCall};
pub use provider::{
    ApiResponse, EntryKind, LocalFile, RemoteEntry, RemoteStorage, UploadTicket,
};
pub use yadisk::{DiskClient, DiskConfig, DiskProvider};
