//! Yandex Disk REST API client.

use bytes::Bytes;
use reqwest::{header, Body, Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use diskmirror_common::{AccessToken, Error, RemoteOperation, Result};

use crate::provider::{ApiResponse, LocalFile, RemoteEntry, UploadTicket};

/// Yandex Disk API base URL.
pub const DISK_API_BASE: &str = "https://cloud-api.yandex.net/v1/disk";

/// Slowest transfer rate, in bytes per second, an upload may run at before
/// it times out.
pub const MIN_UPLOAD_RATE: u64 = 32 * 1024;

/// Deadline for writing `len` bytes: the request timeout plus the time the
/// transfer takes at [`MIN_UPLOAD_RATE`].
pub fn upload_deadline(timeout: Duration, len: u64) -> Duration {
    timeout + Duration::from_secs(len.div_ceil(MIN_UPLOAD_RATE))
}

/// `_embedded` block of a folder resource.
#[derive(Debug, Deserialize)]
pub struct EmbeddedItems {
    #[serde(default)]
    pub items: Vec<RemoteEntry>,
    /// Total number of items in the folder, across all pages.
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub limit: Option<u64>,
    #[serde(default)]
    pub offset: Option<u64>,
}

/// Folder resource as returned by `GET /resources`.
#[derive(Debug, Deserialize)]
pub struct FolderResource {
    #[serde(rename = "_embedded")]
    pub embedded: EmbeddedItems,
}

/// Error body returned by the API on failure.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiErrorBody {
    fn into_cause(self, raw: String) -> String {
        match (self.error, self.message.or(self.description)) {
            (Some(code), Some(text)) => format!("{}: {}", code, text),
            (Some(code), None) => code,
            (None, Some(text)) => text,
            (None, None) => raw,
        }
    }
}

/// Low-level Yandex Disk API client.
///
/// Knows the endpoints and the wire format; folder semantics live in
/// [`super::DiskProvider`].
pub struct DiskClient {
    http: Client,
    base_url: String,
    token: AccessToken,
    timeout: Duration,
}

impl DiskClient {
    /// Create a new client.
    ///
    /// `timeout` bounds connecting and each API call. Uploads get
    /// [`upload_deadline`] instead, so large files are not cut off.
    ///
    /// # Errors
    /// - The underlying HTTP client cannot be constructed
    pub fn new(token: AccessToken, base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("diskmirror/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            timeout,
        })
    }

    /// Get authorization header.
    fn auth_header(&self) -> String {
        format!("OAuth {}", self.token.expose())
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Fetch one page of a folder listing.
    pub async fn get_resources(
        &self,
        path: &str,
        limit: u64,
        offset: u64,
    ) -> Result<ApiResponse<FolderResource>> {
        let limit = limit.to_string();
        let offset = offset.to_string();

        let response = self
            .http
            .get(self.url("/resources"))
            .header(header::AUTHORIZATION, self.auth_header())
            .timeout(self.timeout)
            .query(&[
                ("path", path),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::remote(RemoteOperation::List, path, e))?;

        Self::handle_json(response, RemoteOperation::List, path).await
    }

    /// Request a one-time upload location for `path`.
    pub async fn get_upload_link(
        &self,
        path: &str,
        overwrite: bool,
    ) -> Result<ApiResponse<UploadTicket>> {
        let overwrite = if overwrite { "true" } else { "false" };

        let response = self
            .http
            .get(self.url("/resources/upload"))
            .header(header::AUTHORIZATION, self.auth_header())
            .timeout(self.timeout)
            .query(&[("path", path), ("overwrite", overwrite)])
            .send()
            .await
            .map_err(|e| Error::remote(RemoteOperation::UploadLink, path, e))?;

        Self::handle_json(response, RemoteOperation::UploadLink, path).await
    }

    /// Write bytes to an upload location.
    ///
    /// The location is pre-authorized, so no token is sent.
    pub async fn put_to_href(&self, ticket: &UploadTicket, data: Bytes) -> Result<ApiResponse<()>> {
        let len = data.len() as u64;
        self.put(ticket, Body::from(data), len).await
    }

    /// Stream a local file to an upload location without buffering it.
    pub async fn put_file_to_href(
        &self,
        ticket: &UploadTicket,
        source: LocalFile,
    ) -> Result<ApiResponse<()>> {
        let len = source.len;
        let stream = ReaderStream::new(source.file.take(len));
        self.put(ticket, Body::wrap_stream(stream), len).await
    }

    async fn put(&self, ticket: &UploadTicket, body: Body, len: u64) -> Result<ApiResponse<()>> {
        let target = ticket.href.as_str();
        let method = Method::from_bytes(ticket.method.as_bytes()).map_err(|e| {
            Error::remote(RemoteOperation::CommitUpload, target, format!("bad method: {}", e))
        })?;

        let response = self
            .http
            .request(method, ticket.href.clone())
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, len)
            .timeout(upload_deadline(self.timeout, len))
            .body(body)
            .send()
            .await
            .map_err(|e| Error::remote(RemoteOperation::CommitUpload, target, e))?;

        Self::handle_empty(response, RemoteOperation::CommitUpload, target).await
    }

    /// Delete the resource at `path`.
    pub async fn delete_resource(&self, path: &str) -> Result<ApiResponse<()>> {
        let response = self
            .http
            .delete(self.url("/resources"))
            .header(header::AUTHORIZATION, self.auth_header())
            .timeout(self.timeout)
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| Error::remote(RemoteOperation::Delete, path, e))?;

        Self::handle_empty(response, RemoteOperation::Delete, path).await
    }

    /// Decode a JSON body after checking the status.
    async fn handle_json<T: DeserializeOwned>(
        response: Response,
        operation: RemoteOperation,
        target: &str,
    ) -> Result<ApiResponse<T>> {
        let status = response.status().as_u16();
        let response = Self::check_status(response, operation, target).await?;

        let body = response.json::<T>().await.map_err(|e| {
            Error::remote_status(operation, target, status, format!("Failed to parse response: {}", e))
        })?;

        Ok(ApiResponse::new(body, status))
    }

    /// Check the status of a response whose body is not needed.
    async fn handle_empty(
        response: Response,
        operation: RemoteOperation,
        target: &str,
    ) -> Result<ApiResponse<()>> {
        let status = response.status().as_u16();
        Self::check_status(response, operation, target).await?;
        Ok(ApiResponse::new((), status))
    }

    async fn check_status(
        response: Response,
        operation: RemoteOperation,
        target: &str,
    ) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let raw = response.text().await.unwrap_or_default();
        let cause = serde_json::from_str::<ApiErrorBody>(&raw)
            .unwrap_or_default()
            .into_cause(if raw.is_empty() { status.to_string() } else { raw });

        Err(Error::remote_status(operation, target, status.as_u16(), cause))
    }
}
