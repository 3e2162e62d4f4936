//! Yandex Disk storage backend for diskmirror.
//!
//! This module provides:
//! - `DiskClient`, the raw REST client (OAuth header, status handling)
//! - `DiskProvider`, the `RemoteStorage` implementation on top of it,
//!   including paginated folder listings

pub mod client;
pub mod provider;

pub use client::{DiskClient, DISK_API_BASE};
pub use provider::{DiskConfig, DiskProvider};
