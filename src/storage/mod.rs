//! # Storage API
//!
//! The remote file-storage operations the pipeline consumes: paged folder
//! listing, asynchronous server-side copy with a status monitor, download by
//! pre-authorized URL, and upload by destination path. Copies and uploads use
//! replace-on-conflict semantics, so promoting the same file twice overwrites
//! rather than fails.
//!
//! Paths handed to [`StorageApi`] are drive paths (`/fg/a/1.html`); the client
//! maps them onto its drive base URLs.

pub mod drive_client;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use drive_client::DriveStorageClient;

/// One child entry from a folder listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveItem {
    pub name: String,
    /// Drive path of the containing folder, e.g. `/fg/a`
    pub parent_path: String,
    pub is_folder: bool,
    /// Pre-authorized content URL; absent for folders
    pub download_url: Option<String>,
}

impl DriveItem {
    pub fn file(
        parent_path: impl Into<String>,
        name: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            parent_path: parent_path.into(),
            is_folder: false,
            download_url: Some(download_url.into()),
        }
    }

    pub fn folder(parent_path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent_path: parent_path.into(),
            is_folder: true,
            download_url: None,
        }
    }

    /// Fully qualified drive path of this item
    pub fn full_path(&self) -> String {
        format!("{}/{}", self.parent_path.trim_end_matches('/'), self.name)
    }
}

/// One page of a folder listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildrenPage {
    pub items: Vec<DriveItem>,
    /// Opaque token for the next page; `None` on the last page
    pub next_page: Option<String>,
}

/// State reported by a copy monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CopyStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed,
    /// Monitor answered with a status this client does not recognize
    #[serde(other)]
    Unknown,
}

impl CopyStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Immediate children of `folder`, at most `page_size` per page
    async fn list_children(
        &self,
        folder: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ChildrenPage>;

    /// Request a server-side copy of `source_path` (staging) into
    /// `destination_folder` (primary), creating folders as needed. Returns the
    /// monitor URL when the service provides one.
    async fn start_copy(&self, source_path: &str, destination_folder: &str)
        -> Result<Option<String>>;

    async fn copy_status(&self, monitor_url: &str) -> Result<CopyStatus>;

    async fn download(&self, download_url: &str) -> Result<Vec<u8>>;

    /// Save `content` at `destination_path` in the primary tree, replacing any existing file
    async fn upload(&self, destination_path: &str, content: Vec<u8>) -> Result<()>;
}
