//! Yandex Disk remote storage implementation.

use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::debug;

use diskmirror_common::{remote_path, AccessToken, Result};

use crate::provider::{ApiResponse, LocalFile, RemoteEntry, RemoteStorage, UploadTicket};

use super::client::{DiskClient, DISK_API_BASE};

/// Page size used when listing folders.
const LIST_PAGE_SIZE: u64 = 100;

/// Yandex Disk provider configuration.
#[derive(Debug, Clone)]
pub struct DiskConfig {
    /// OAuth token.
    pub token: AccessToken,
    /// API base URL.
    pub base_url: String,
    /// Connect and API-call timeout; uploads extend it by their size.
    pub request_timeout: Duration,
}

impl DiskConfig {
    /// Configuration for the public API endpoint.
    pub fn new(token: AccessToken) -> Self {
        Self {
            token,
            base_url: DISK_API_BASE.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }

    /// Point the provider at another endpoint (e.g. a local mock).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Yandex Disk storage provider.
///
/// Implements the RemoteStorage trait for the Yandex Disk REST API.
pub struct DiskProvider {
    client: DiskClient,
}

impl DiskProvider {
    /// Create a new provider.
    ///
    /// Performs no network I/O.
    pub fn new(config: DiskConfig) -> Result<Self> {
        let client = DiskClient::new(config.token, config.base_url, config.request_timeout)?;
        Ok(Self { client })
    }

    /// Access the underlying client.
    pub fn client(&self) -> &DiskClient {
        &self.client
    }
}

#[async_trait]
impl RemoteStorage for DiskProvider {
    fn name(&self) -> &str {
        "yadisk"
    }

    async fn list(&self, folder: &str) -> Result<ApiResponse<Vec<RemoteEntry>>> {
        let mut entries = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.client.get_resources(folder, LIST_PAGE_SIZE, offset).await?;
            let status = page.status;
            let embedded = page.body.embedded;
            let received = embedded.items.len() as u64;

            entries.extend(embedded.items);
            offset += received;

            let exhausted = match embedded.total {
                Some(total) => offset >= total,
                None => received < embedded.limit.unwrap_or(LIST_PAGE_SIZE),
            };
            if exhausted || received == 0 {
                debug!("Listed {} entries in {}", entries.len(), folder);
                return Ok(ApiResponse::new(entries, status));
            }
        }
    }

    async fn request_upload_link(
        &self,
        folder: &str,
        filename: &str,
        overwrite: bool,
    ) -> Result<ApiResponse<UploadTicket>> {
        let path = remote_path(folder, filename)?;
        self.client.get_upload_link(&path, overwrite).await
    }

    async fn commit_upload(&self, ticket: &UploadTicket, data: Bytes) -> Result<ApiResponse<()>> {
        self.client.put_to_href(ticket, data).await
    }

    async fn commit_file(&self, ticket: &UploadTicket, source: LocalFile) -> Result<ApiResponse<()>> {
        self.client.put_file_to_href(ticket, source).await
    }

    async fn delete(&self, folder: &str, filename: &str) -> Result<ApiResponse<()>> {
        let path = remote_path(folder, filename)?;
        self.client.delete_resource(&path).await
    }
}
