//! In-memory drive used in place of the HTTP drive client.
//!
//! Files are registered by full drive path; folders exist implicitly. Copy
//! behavior is scripted per source path, and every call is recorded so tests
//! can assert on what the pipeline actually did.

use crate::error::{PromoteError, Result};
use crate::storage::{ChildrenPage, CopyStatus, DriveItem, StorageApi};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Scripted result of a copy request for one source path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyBehavior {
    /// Monitor reports `completed` on the first poll
    Complete,
    /// Monitor reports `failed`
    Fail,
    /// Monitor reports `inProgress` forever
    NeverComplete,
    /// The copy request itself errors
    Error,
    /// Copy accepted without a monitor URL
    NoMonitor,
}

#[derive(Debug)]
struct Monitor {
    source_path: String,
    destination_folder: String,
    behavior: CopyBehavior,
}

#[derive(Debug, Default)]
struct Recorded {
    list_calls: usize,
    status_polls: usize,
    failed_status_polls: usize,
    monitors: Vec<Monitor>,
    copied: Vec<String>,
    uploaded: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryStorage {
    /// Full path to download URL
    files: BTreeMap<String, String>,
    copy_behavior: HashMap<String, CopyBehavior>,
    failing_listings: HashSet<String>,
    failing_downloads: HashSet<String>,
    failing_uploads: HashSet<String>,
    /// Number of leading monitor polls that error before answering
    flaky_monitor_polls: usize,
    recorded: Mutex<Recorded>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Download URL the fake assigns to a file path
    pub fn download_url_for(path: &str) -> String {
        format!("https://staging.test{path}")
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.files
            .insert(path.to_string(), Self::download_url_for(path));
        self
    }

    pub fn with_copy_behavior(mut self, source_path: &str, behavior: CopyBehavior) -> Self {
        self.copy_behavior.insert(source_path.to_string(), behavior);
        self
    }

    pub fn failing_listing(mut self, folder: &str) -> Self {
        self.failing_listings
            .insert(folder.trim_end_matches('/').to_string());
        self
    }

    pub fn failing_download(mut self, source_path: &str) -> Self {
        self.failing_downloads
            .insert(Self::download_url_for(source_path));
        self
    }

    pub fn failing_upload(mut self, destination_path: &str) -> Self {
        self.failing_uploads.insert(destination_path.to_string());
        self
    }

    /// Fail the first `polls` copy-status requests with a connection error
    pub fn with_flaky_monitor(mut self, polls: usize) -> Self {
        self.flaky_monitor_polls = polls;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.recorded.lock().list_calls
    }

    pub fn status_polls(&self) -> usize {
        self.recorded.lock().status_polls
    }

    /// Destination paths of completed server-side copies
    pub fn copied_paths(&self) -> Vec<String> {
        self.recorded.lock().copied.clone()
    }

    /// Destination paths written by the fallback upload
    pub fn uploaded_paths(&self) -> Vec<String> {
        self.recorded.lock().uploaded.clone()
    }

    /// Paths promoted by either route
    pub fn promoted_paths(&self) -> BTreeSet<String> {
        let recorded = self.recorded.lock();
        recorded
            .copied
            .iter()
            .chain(recorded.uploaded.iter())
            .cloned()
            .collect()
    }

    fn children(&self, folder: &str) -> Vec<DriveItem> {
        let prefix = format!("{folder}/");
        let mut subfolders = BTreeSet::new();
        let mut items = Vec::new();
        for (path, url) in &self.files {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((subfolder, _)) => {
                    subfolders.insert(subfolder.to_string());
                }
                None => items.push(DriveItem::file(folder, rest, url.clone())),
            }
        }
        let mut children: Vec<DriveItem> = subfolders
            .into_iter()
            .map(|name| DriveItem::folder(folder, name))
            .collect();
        children.extend(items);
        children
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[async_trait]
impl StorageApi for InMemoryStorage {
    async fn list_children(
        &self,
        folder: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> Result<ChildrenPage> {
        self.recorded.lock().list_calls += 1;
        let folder = folder.trim_end_matches('/');
        if self.failing_listings.contains(folder) {
            return Err(PromoteError::storage("list_children", format!("HTTP 503 listing {folder}")));
        }

        let children = self.children(folder);
        let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (offset + page_size).min(children.len());
        let next_page = (end < children.len()).then(|| end.to_string());
        Ok(ChildrenPage {
            items: children[offset.min(end)..end].to_vec(),
            next_page,
        })
    }

    async fn start_copy(
        &self,
        source_path: &str,
        destination_folder: &str,
    ) -> Result<Option<String>> {
        if !self.files.contains_key(source_path) {
            return Err(PromoteError::storage("copy", format!("HTTP 404: {source_path}")));
        }
        let behavior = self
            .copy_behavior
            .get(source_path)
            .copied()
            .unwrap_or(CopyBehavior::Complete);
        match behavior {
            CopyBehavior::Error => Err(PromoteError::storage("copy", "HTTP 400: copy rejected")),
            CopyBehavior::NoMonitor => Ok(None),
            _ => {
                let mut recorded = self.recorded.lock();
                recorded.monitors.push(Monitor {
                    source_path: source_path.to_string(),
                    destination_folder: destination_folder.to_string(),
                    behavior,
                });
                Ok(Some(format!("monitor://{}", recorded.monitors.len() - 1)))
            }
        }
    }

    async fn copy_status(&self, monitor_url: &str) -> Result<CopyStatus> {
        let mut recorded = self.recorded.lock();
        recorded.status_polls += 1;
        if recorded.failed_status_polls < self.flaky_monitor_polls {
            recorded.failed_status_polls += 1;
            return Err(PromoteError::storage("copy_status", "connect: connection reset"));
        }
        let index: usize = monitor_url
            .strip_prefix("monitor://")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| PromoteError::storage("copy_status", "unknown monitor"))?;
        let monitor = recorded
            .monitors
            .get(index)
            .ok_or_else(|| PromoteError::storage("copy_status", "unknown monitor"))?;

        match monitor.behavior {
            CopyBehavior::Complete => {
                let destination = format!(
                    "{}/{}",
                    monitor.destination_folder.trim_end_matches('/'),
                    file_name(&monitor.source_path)
                );
                recorded.copied.push(destination);
                Ok(CopyStatus::Completed)
            }
            CopyBehavior::Fail => Ok(CopyStatus::Failed),
            _ => Ok(CopyStatus::InProgress),
        }
    }

    async fn download(&self, download_url: &str) -> Result<Vec<u8>> {
        if self.failing_downloads.contains(download_url) {
            return Err(PromoteError::storage("download", "HTTP 500: download failed"));
        }
        self.files
            .iter()
            .find(|(_, url)| url.as_str() == download_url)
            .map(|(path, _)| path.as_bytes().to_vec())
            .ok_or_else(|| PromoteError::storage("download", format!("HTTP 404: {download_url}")))
    }

    async fn upload(&self, destination_path: &str, _content: Vec<u8>) -> Result<()> {
        if self.failing_uploads.contains(destination_path) {
            return Err(PromoteError::storage("upload", "HTTP 500: upload failed"));
        }
        self.recorded.lock().uploaded.push(destination_path.to_string());
        Ok(())
    }
}
