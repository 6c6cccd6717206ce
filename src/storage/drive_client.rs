//! # Drive Storage Client
//!
//! HTTP implementation of [`StorageApi`] for a Graph-style drive REST API.
//!
//! - listing: `GET {staging}/root:{folder}:/children?$top=N`, following
//!   `@odata.nextLink` page by page
//! - copy: `POST {staging}/root:{path}:/copy?@microsoft.graph.conflictBehavior=replace`,
//!   answered with a `Location` monitor URL
//! - monitor: `GET {monitor}` (pre-authenticated, retried like the rest)
//! - download: `GET {downloadUrl}` (pre-authenticated)
//! - upload: `PUT {primary}/root:{path}:/content?@microsoft.graph.conflictBehavior=replace`
//!
//! Authenticated requests retry on network errors, HTTP 429 and 5xx with
//! exponential backoff; other 4xx responses fail immediately.

use super::{ChildrenPage, CopyStatus, DriveItem, StorageApi};
use crate::config::StorageConfig;
use crate::error::{PromoteError, Result};
use crate::resilience::BackoffPolicy;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, warn};

const ROOT_PATH_PREFIX: &str = "/drive/root:";
const REPLACE_ON_CONFLICT: &str = "@microsoft.graph.conflictBehavior=replace";

#[derive(Debug, Deserialize)]
struct ChildrenResponse {
    #[serde(default)]
    value: Vec<GraphItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphItem {
    name: String,
    #[serde(rename = "parentReference")]
    parent_reference: Option<ParentReference>,
    folder: Option<serde_json::Value>,
    #[serde(rename = "@microsoft.graph.downloadUrl")]
    download_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParentReference {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MonitorResponse {
    status: CopyStatus,
}

impl From<GraphItem> for DriveItem {
    fn from(item: GraphItem) -> Self {
        let parent = item
            .parent_reference
            .and_then(|reference| reference.path)
            .unwrap_or_default();
        let parent_path = parent
            .strip_prefix(ROOT_PATH_PREFIX)
            .unwrap_or(&parent)
            .to_string();
        DriveItem {
            name: item.name,
            parent_path,
            is_folder: item.folder.is_some(),
            download_url: item.download_url,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DriveStorageClient {
    client: Client,
    staging_base: String,
    primary_base: String,
    primary_drive_id: Option<String>,
    access_token: String,
    retry: BackoffPolicy,
}

impl DriveStorageClient {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        if config.staging_drive_url.is_empty() || config.primary_drive_url.is_empty() {
            return Err(PromoteError::configuration(
                "storage.staging_drive_url and storage.primary_drive_url are required",
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| PromoteError::configuration(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            staging_base: config.staging_drive_url.trim_end_matches('/').to_string(),
            primary_base: config.primary_drive_url.trim_end_matches('/').to_string(),
            primary_drive_id: config.primary_drive_id.clone(),
            access_token: config.access_token.clone(),
            retry: BackoffPolicy::from(config),
        })
    }

    /// `{base}/root:{path}:/{action}`, or `{base}/root/{action}` for the drive root
    pub fn path_url(base: &str, path: &str, action: &str) -> String {
        let path = path.trim_end_matches('/');
        if path.is_empty() {
            format!("{base}/root/{action}")
        } else if path.starts_with('/') {
            format!("{base}/root:{path}:/{action}")
        } else {
            format!("{base}/root:/{path}:/{action}")
        }
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.bearer_auth(&self.access_token)
    }

    /// Send a request built by `build`, retrying transient failures
    async fn send_with_retry<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let error_text = response
                        .text()
                        .await
                        .unwrap_or_else(|_| "Unknown error".to_string());

                    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
                        error!(operation = operation, status = %status, error = %error_text, "Client error from drive API");
                        return Err(PromoteError::storage(
                            operation,
                            format!("HTTP {status}: {error_text}"),
                        ));
                    }
                    if !self.retry.allows_retry(attempts) {
                        error!(operation = operation, attempts = attempts, status = %status, "Exhausted drive API retries");
                        return Err(PromoteError::storage(
                            operation,
                            format!("HTTP {status} after {attempts} attempts: {error_text}"),
                        ));
                    }
                    warn!(
                        operation = operation,
                        status = %status,
                        retry = attempts,
                        max_attempts = self.retry.max_attempts,
                        "Server error from drive API, will retry"
                    );
                }
                Err(e) => {
                    if !self.retry.allows_retry(attempts) {
                        error!(operation = operation, attempts = attempts, error = %e, "Exhausted drive API retries");
                        return Err(PromoteError::storage(operation, e.to_string()));
                    }
                    warn!(
                        operation = operation,
                        error = %e,
                        retry = attempts,
                        max_attempts = self.retry.max_attempts,
                        "Network error from drive API, will retry"
                    );
                }
            }

            tokio::time::sleep(self.retry.delay_for(attempts - 1)).await;
        }
    }
}

#[async_trait]
impl StorageApi for DriveStorageClient {
    async fn list_children(
        &self,
        folder: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ChildrenPage> {
        let url = match page_token {
            Some(next_link) => next_link.to_string(),
            None => format!(
                "{}?$top={page_size}",
                Self::path_url(&self.staging_base, folder, "children")
            ),
        };
        debug!(folder = folder, url = %url, "Listing drive folder");

        let response = self
            .send_with_retry("list_children", || self.authorized(self.client.get(&url)))
            .await
            .map_err(|e| PromoteError::enumeration(folder, e.to_string()))?;
        let body: ChildrenResponse = response
            .json()
            .await
            .map_err(|e| PromoteError::enumeration(folder, format!("Invalid response format: {e}")))?;

        Ok(ChildrenPage {
            items: body.value.into_iter().map(DriveItem::from).collect(),
            next_page: body.next_link,
        })
    }

    async fn start_copy(
        &self,
        source_path: &str,
        destination_folder: &str,
    ) -> Result<Option<String>> {
        let url = format!(
            "{}?{REPLACE_ON_CONFLICT}",
            Self::path_url(&self.staging_base, source_path, "copy")
        );
        let mut parent_reference = json!({ "path": format!("{ROOT_PATH_PREFIX}{destination_folder}") });
        if let Some(drive_id) = &self.primary_drive_id {
            parent_reference["driveId"] = json!(drive_id);
        }
        let payload = json!({ "parentReference": parent_reference });

        let response = self
            .send_with_retry("copy", || {
                self.authorized(self.client.post(&url)).json(&payload)
            })
            .await?;

        let monitor = response
            .headers()
            .get(header::LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        debug!(source_path = source_path, destination_folder = destination_folder, monitor = ?monitor, "Copy requested");
        Ok(monitor)
    }

    async fn copy_status(&self, monitor_url: &str) -> Result<CopyStatus> {
        let response = self
            .send_with_retry("copy_status", || self.client.get(monitor_url))
            .await?;
        let monitor: MonitorResponse = response.json().await.map_err(|e| {
            PromoteError::storage("copy_status", format!("Invalid monitor response: {e}"))
        })?;
        Ok(monitor.status)
    }

    async fn download(&self, download_url: &str) -> Result<Vec<u8>> {
        let response = self
            .send_with_retry("download", || self.client.get(download_url))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn upload(&self, destination_path: &str, content: Vec<u8>) -> Result<()> {
        let url = format!(
            "{}?{REPLACE_ON_CONFLICT}",
            Self::path_url(&self.primary_base, destination_path, "content")
        );
        self.send_with_retry("upload", || {
            self.authorized(self.client.put(&url)).body(content.clone())
        })
        .await?;
        debug!(destination_path = destination_path, "Uploaded file");
        Ok(())
    }
}
