//! # Promotion Types
//!
//! Data carried between pipeline stages. Everything here is serializable because
//! it crosses a dispatch boundary as action parameters or is persisted next to
//! the status records.

use crate::error::{PromoteError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One file to promote; immutable once enumerated
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Pre-authorized download URL in the staging tree
    pub download_url: String,
    /// Path relative to the staging root, always starting with `/`
    pub relative_path: String,
}

impl FileRecord {
    pub fn new(download_url: impl Into<String>, relative_path: impl Into<String>) -> Self {
        Self {
            download_url: download_url.into(),
            relative_path: relative_path.into(),
        }
    }

    /// Parent folder of the file relative to the tree root (`""` for root files)
    pub fn destination_folder(&self) -> &str {
        match self.relative_path.rfind('/') {
            Some(index) => &self.relative_path[..index],
            None => "",
        }
    }
}

/// Contiguous slice of the job's files handled by one dispatched worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Batch {
    pub batch_number: u32,
    pub files: Vec<FileRecord>,
}

impl Batch {
    pub fn new(batch_number: u32, files: Vec<FileRecord>) -> Self {
        Self {
            batch_number,
            files,
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Relative paths that failed to promote within one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureManifest {
    pub batch_number: u32,
    pub failed_paths: Vec<String>,
    pub written_at: DateTime<Utc>,
}

impl FailureManifest {
    pub fn new(batch_number: u32, failed_paths: Vec<String>) -> Self {
        Self {
            batch_number,
            failed_paths,
            written_at: Utc::now(),
        }
    }
}

/// Drive path with one leading `/` and no trailing `/`; the drive root becomes `""`
pub fn normalize_drive_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// Job parameters passed verbatim from stage to stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobParams {
    /// Staging root drive path; also the job's status key
    pub root_folder: String,
    /// Page reference used to scope authorization
    pub admin_page_uri: String,
    /// Project reference path
    pub project_path: String,
    pub do_publish: bool,
}

impl JobParams {
    pub fn new(
        root_folder: impl Into<String>,
        admin_page_uri: impl Into<String>,
        project_path: impl Into<String>,
    ) -> Self {
        Self {
            root_folder: normalize_drive_path(&root_folder.into()),
            admin_page_uri: admin_page_uri.into(),
            project_path: project_path.into(),
            do_publish: false,
        }
    }

    /// Same parameters with `root_folder` in drive-path form, so every stage
    /// derives the same status key and source paths from it
    pub fn normalized(mut self) -> Self {
        self.root_folder = normalize_drive_path(&self.root_folder);
        self
    }

    pub fn with_publish(mut self, do_publish: bool) -> Self {
        self.do_publish = do_publish;
        self
    }

    pub fn has_root_folder(&self) -> bool {
        !normalize_drive_path(&self.root_folder).is_empty()
    }

    /// Names of required parameters that are missing or blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !self.has_root_folder() {
            missing.push("root_folder");
        }
        if self.admin_page_uri.trim().is_empty() {
            missing.push("admin_page_uri");
        }
        if self.project_path.trim().is_empty() {
            missing.push("project_path");
        }
        missing
    }

    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PromoteError::missing_parameters(missing))
        }
    }
}

/// Parameters for one batch worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchParams {
    #[serde(flatten)]
    pub job: JobParams,
    pub batch_number: u32,
    /// Inline batch files; the worker falls back to the batch store when empty
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileRecord>,
}

impl BatchParams {
    pub fn new(job: JobParams, batch: &Batch) -> Self {
        Self {
            job,
            batch_number: batch.batch_number,
            files: batch.files.clone(),
        }
    }
}

/// Parameters for the stage chained after a batch's copy phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStageParams {
    #[serde(flatten)]
    pub job: JobParams,
    pub batch_number: u32,
}

/// How a file reached the primary tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionMethod {
    /// Server-side copy reported completion
    Copied,
    /// Copy did not complete; download and upload succeeded
    Uploaded,
    Failed,
}

/// Result of promoting one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcome {
    pub relative_path: String,
    pub method: PromotionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcome {
    pub fn promoted(relative_path: impl Into<String>, method: PromotionMethod) -> Self {
        Self {
            relative_path: relative_path.into(),
            method,
            error: None,
        }
    }

    pub fn failed(relative_path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            method: PromotionMethod::Failed,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.method != PromotionMethod::Failed
    }
}

/// Aggregated per-file outcomes of one batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_number: u32,
    pub total: usize,
    pub copied: usize,
    pub uploaded: usize,
    pub failed_paths: Vec<String>,
}

impl BatchReport {
    pub fn from_outcomes(batch_number: u32, outcomes: &[FileOutcome]) -> Self {
        let mut report = Self {
            batch_number,
            total: outcomes.len(),
            copied: 0,
            uploaded: 0,
            failed_paths: Vec::new(),
        };
        for outcome in outcomes {
            match outcome.method {
                PromotionMethod::Copied => report.copied += 1,
                PromotionMethod::Uploaded => report.uploaded += 1,
                PromotionMethod::Failed => {
                    let path = if outcome.relative_path.is_empty() {
                        "Path Info Not available".to_string()
                    } else {
                        outcome.relative_path.clone()
                    };
                    report.failed_paths.push(path);
                }
            }
        }
        report
    }

    pub fn succeeded(&self) -> usize {
        self.copied + self.uploaded
    }

    pub fn failed(&self) -> usize {
        self.failed_paths.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed_paths.is_empty()
    }
}

/// Result returned by a stage entry point to its hosting invocation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ActionResponse {
    Status { code: u16, payload: Value },
    Body { body: Value },
}

impl ActionResponse {
    pub fn ok(payload: Value) -> Self {
        Self::Status { code: 200, payload }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Status {
            code,
            payload: Value::String(message.into()),
        }
    }

    pub fn body(body: Value) -> Self {
        Self::Body { body }
    }

    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            Self::Body { .. } => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.code().map_or(true, |code| (200..300).contains(&code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_destination_folder() {
        assert_eq!(FileRecord::new("u", "/a/b/1.html").destination_folder(), "/a/b");
        assert_eq!(FileRecord::new("u", "/1.html").destination_folder(), "");
        assert_eq!(FileRecord::new("u", "1.html").destination_folder(), "");
    }

    #[test]
    fn test_root_folder_normalization() {
        assert_eq!(normalize_drive_path("fg"), "/fg");
        assert_eq!(normalize_drive_path("/fg/sub/"), "/fg/sub");
        assert_eq!(normalize_drive_path(" fg/ "), "/fg");
        assert_eq!(normalize_drive_path("/"), "");

        assert_eq!(JobParams::new("fg/", "u", "p").root_folder, "/fg");
        let params: JobParams =
            serde_json::from_value(json!({"rootFolder": "fg", "adminPageUri": "u"})).unwrap();
        assert_eq!(params.normalized().root_folder, "/fg");
        assert!(!JobParams::new("/", "u", "p").has_root_folder());
    }

    #[test]
    fn test_missing_fields() {
        let params = JobParams::new("/fg", "", " ");
        assert_eq!(params.missing_fields(), vec!["admin_page_uri", "project_path"]);
        assert!(params.validate().is_err());
        assert!(JobParams::new("/fg", "https://x/page", "/p.xlsx").validate().is_ok());
    }

    #[test]
    fn test_batch_params_wire_format() {
        let job = JobParams::new("/fg", "https://x/page", "/p.xlsx").with_publish(true);
        let batch = Batch::new(3, vec![FileRecord::new("https://dl/1", "/a/1.html")]);
        let value = serde_json::to_value(BatchParams::new(job, &batch)).unwrap();
        assert_eq!(
            value,
            json!({
                "rootFolder": "/fg",
                "adminPageUri": "https://x/page",
                "projectPath": "/p.xlsx",
                "doPublish": true,
                "batchNumber": 3,
                "files": [{"downloadUrl": "https://dl/1", "relativePath": "/a/1.html"}]
            })
        );
    }

    #[test]
    fn test_batch_params_without_files() {
        let params: BatchParams =
            serde_json::from_value(json!({"rootFolder": "/fg", "batchNumber": 1})).unwrap();
        assert!(params.files.is_empty());
        assert_eq!(params.job.root_folder, "/fg");
        assert!(!params.job.do_publish);
    }

    #[test]
    fn test_report_counts_every_outcome() {
        let outcomes = vec![
            FileOutcome::promoted("/a", PromotionMethod::Copied),
            FileOutcome::promoted("/b", PromotionMethod::Uploaded),
            FileOutcome::failed("/c", "boom"),
        ];
        let report = BatchReport::from_outcomes(0, &outcomes);
        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded() + report.failed(), report.total);
        assert_eq!(report.failed_paths, vec!["/c".to_string()]);
    }

    #[test]
    fn test_action_response_shapes() {
        assert_eq!(
            serde_json::to_value(ActionResponse::ok(json!("started"))).unwrap(),
            json!({"code": 200, "payload": "started"})
        );
        let body = ActionResponse::body(json!({"status": "COMPLETED"}));
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"body": {"status": "COMPLETED"}})
        );
        assert!(body.is_success());
        assert!(!ActionResponse::error(500, "boom").is_success());
    }
}
