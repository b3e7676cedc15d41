//! Error types for BigShift

use thiserror::Error;

/// Result type alias for BigShift operations
pub type Result<T> = std::result::Result<T, BigShiftError>;

/// Main error type for BigShift
///
/// Every variant is fatal to the pipeline run. The only recovery the pipeline
/// performs is the bounded retry around vendor job lookups, which surfaces as
/// [`BigShiftError::TransferRpc`] once it gives up.
#[derive(Error, Debug)]
pub enum BigShiftError {
    #[error("Table {table:?} for schema {schema:?} not found")]
    TableNotFound { schema: String, table: String },

    #[error("Unsupported column type: {0:?}")]
    UnsupportedColumnType(String),

    #[error("Gave up {operation} after {attempts} attempts: {message}")]
    TransferRpc {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Transfer {job} failed: {message}")]
    TransferJobFailed { job: String, message: String },

    #[error("Transferred files don't match unload manifest: {0}")]
    TransferValidation(String),

    #[error("Load job {job_id} failed: {message}")]
    LoadJobFailed { job_id: String, message: String },

    #[error("{service} API error{}: {message}", status_suffix(.status))]
    Api {
        service: String,
        status: Option<u16>,
        message: String,
    },

    #[error("Source warehouse error: {0}")]
    Source(String),

    #[error("Staging storage error: {0}")]
    Staging(String),

    #[error("No such object: {0}")]
    ObjectNotFound(String),

    #[error("Malformed manifest: {0}")]
    Manifest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl BigShiftError {
    /// Build an API error for a vendor HTTP service
    pub fn api(service: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        BigShiftError::Api {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// Whether a retry of the same call could plausibly succeed.
    ///
    /// Server-side failures, throttling and transport errors (no HTTP status)
    /// are transient; everything else is not.
    pub fn is_transient(&self) -> bool {
        match self {
            BigShiftError::Api { status: None, .. } => true,
            BigShiftError::Api {
                status: Some(status),
                ..
            } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}
