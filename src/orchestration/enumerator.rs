//! # File Tree Enumerator
//!
//! Breadth-first walk of the staging tree producing the complete list of files
//! to promote. The listing is authoritative for every later stage, so any
//! failed page fetch aborts the walk instead of returning a partial list.

use super::types::{normalize_drive_path, FileRecord};
use crate::error::{PromoteError, Result};
use crate::storage::StorageApi;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct FileTreeEnumerator {
    storage: Arc<dyn StorageApi>,
    page_size: usize,
}

impl FileTreeEnumerator {
    pub fn new(storage: Arc<dyn StorageApi>, page_size: usize) -> Self {
        Self {
            storage,
            page_size: page_size.max(1),
        }
    }

    /// Every file under `root_path`, with paths relative to it
    #[instrument(skip(self), fields(page_size = self.page_size))]
    pub async fn enumerate(&self, root_path: &str) -> Result<Vec<FileRecord>> {
        // Listings report parent paths as `/root/...` regardless of how the root was given
        let root = normalize_drive_path(root_path);
        let mut folders = VecDeque::from([root.clone()]);
        let mut files = Vec::new();
        let mut folders_visited = 0usize;

        while let Some(folder) = folders.pop_front() {
            folders_visited += 1;
            let mut page_token: Option<String> = None;
            loop {
                let page = self
                    .storage
                    .list_children(&folder, self.page_size, page_token.as_deref())
                    .await
                    .map_err(|e| match e {
                        PromoteError::Enumeration { .. } => e,
                        other => PromoteError::enumeration(folder.clone(), other.to_string()),
                    })?;

                for item in page.items {
                    let full_path = item.full_path();
                    if item.is_folder {
                        folders.push_back(full_path);
                        continue;
                    }
                    let relative_path = relative_to(&root, &full_path);
                    match item.download_url {
                        Some(download_url) => files.push(FileRecord::new(download_url, relative_path)),
                        None => {
                            return Err(PromoteError::enumeration(
                                folder.clone(),
                                format!("file '{relative_path}' has no download URL"),
                            ))
                        }
                    }
                }

                match page.next_page {
                    Some(next) => page_token = Some(next),
                    None => break,
                }
            }
            debug!(folder = %folder, queued = folders.len(), files = files.len(), "Listed folder");
        }

        if files.is_empty() {
            warn!(root_path = root_path, "No files found under staging root");
        }
        info!(
            root_path = root_path,
            folders = folders_visited,
            files = files.len(),
            "Enumerated staging tree"
        );
        Ok(files)
    }
}

/// Strip the root prefix from a full path; results always start with `/`
fn relative_to(root: &str, full_path: &str) -> String {
    let stripped = full_path.strip_prefix(root).unwrap_or(full_path);
    if stripped.starts_with('/') {
        stripped.to_string()
    } else {
        format!("/{stripped}")
    }
}
