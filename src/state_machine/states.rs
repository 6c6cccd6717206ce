use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status shared by job-level and batch-level status records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Initial state written when a job or batch starts
    Started,
    /// Work has been handed off or is being performed
    InProgress,
    /// Finished; individual files may still be listed in a failure manifest
    Completed,
    /// Stopped by an unexpected error after partial progress
    CompletedWithError,
    /// Nothing usable completed (validation or dispatch failure)
    Failed,
}

impl JobStatus {
    /// Check if this is a terminal state (no further non-reset transitions expected)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithError | Self::Failed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Completed => "COMPLETED",
            Self::CompletedWithError => "COMPLETED_WITH_ERROR",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "STARTED" => Ok(Self::Started),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETED" => Ok(Self::Completed),
            "COMPLETED_WITH_ERROR" => Ok(Self::CompletedWithError),
            "FAILED" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

/// Named pipeline stages tracked in a record's stage-detail map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// File enumeration and batch dispatch
    CreateBatch,
    /// Per-batch copy phase
    PromoteCopy,
    /// Downstream stage chained after the copy phase
    PostCopy,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateBatch => write!(f, "create_batch"),
            Self::PromoteCopy => write!(f, "promote_copy"),
            Self::PostCopy => write!(f, "post_copy"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::CompletedWithError.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Started.is_terminal());
        assert!(!JobStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(JobStatus::CompletedWithError.to_string(), "COMPLETED_WITH_ERROR");
        assert_eq!(
            "IN_PROGRESS".parse::<JobStatus>().unwrap(),
            JobStatus::InProgress
        );
        assert!("in_progress".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"IN_PROGRESS\"");

        let stage = serde_json::to_string(&PipelineStage::PromoteCopy).unwrap();
        assert_eq!(stage, "\"promote_copy\"");
    }
}
