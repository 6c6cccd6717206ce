//! # Promotion Error Types
//!
//! Structured error handling for the promotion pipeline using thiserror.
//!
//! Errors never cross a dispatch boundary as values: the stage that observes an
//! error turns it into a status write, so every variant carries enough context
//! to produce a readable status message on its own.

use thiserror::Error;

/// Comprehensive promotion error types
#[derive(Error, Debug)]
pub enum PromoteError {
    #[error("Required data is not available to proceed: missing {}", names.join(", "))]
    MissingParameters { names: Vec<String> },

    #[error("Failed to list folder '{folder}': {message}")]
    Enumeration { folder: String, message: String },

    #[error("Storage operation failed: {operation}: {message}")]
    Storage { operation: String, message: String },

    #[error("Copy of '{path}' timed out after {attempts} status polls")]
    CopyTimedOut { path: String, attempts: u32 },

    #[error("Failed to invoke action '{action}': {message}")]
    Dispatch { action: String, message: String },

    #[error("Status store error: {operation}: {message}")]
    StatusStore { operation: String, message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Batch {batch_number} not found for '{root_folder}'")]
    BatchNotFound {
        root_folder: String,
        batch_number: u32,
    },
}

impl PromoteError {
    /// Create a missing parameters error
    pub fn missing_parameters<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MissingParameters {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Create an enumeration error for a folder listing
    pub fn enumeration(folder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Enumeration {
            folder: folder.into(),
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a copy timeout error
    pub fn copy_timed_out(path: impl Into<String>, attempts: u32) -> Self {
        Self::CopyTimedOut {
            path: path.into(),
            attempts,
        }
    }

    /// Create a dispatch error
    pub fn dispatch(action: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dispatch {
            action: action.into(),
            message: message.into(),
        }
    }

    /// Create a status store error
    pub fn status_store(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StatusStore {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for PromoteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for PromoteError {
    fn from(err: reqwest::Error) -> Self {
        let operation = if err.is_timeout() {
            "timeout"
        } else if err.is_connect() {
            "connect"
        } else if err.is_decode() {
            "decode"
        } else {
            "request"
        };
        Self::storage(operation, err.to_string())
    }
}

impl From<::config::ConfigError> for PromoteError {
    fn from(err: ::config::ConfigError) -> Self {
        Self::configuration(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for PromoteError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::status_store("query", "No rows found"),
            sqlx::Error::PoolTimedOut => Self::status_store("pool", "Timed out acquiring connection"),
            sqlx::Error::PoolClosed => Self::status_store("pool", "Database pool is closed"),
            other => Self::status_store("database", other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PromoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_parameters_display() {
        let err = PromoteError::missing_parameters(["admin_page_uri", "project_path"]);
        let display = err.to_string();
        assert!(display.contains("Required data is not available"));
        assert!(display.contains("admin_page_uri, project_path"));
    }

    #[test]
    fn test_error_creation() {
        let err = PromoteError::copy_timed_out("/a/1.html", 60);
        assert!(matches!(err, PromoteError::CopyTimedOut { attempts: 60, .. }));

        let err = PromoteError::dispatch("floodgate/promote-worker", "connection refused");
        assert_eq!(
            err.to_string(),
            "Failed to invoke action 'floodgate/promote-worker': connection refused"
        );
    }

    #[test]
    fn test_serde_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid").unwrap_err();
        let err: PromoteError = json_err.into();
        assert!(matches!(err, PromoteError::Serialization { .. }));
    }
}
