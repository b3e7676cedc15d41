//! Storage Transfer job payloads

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::credentials::StagingCredentials;

/// Forward buffer applied to the schedule so a slightly fast vendor clock
/// does not consider the start time already passed
pub const SCHEDULE_BUFFER_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Date {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hours: u32,
    pub minutes: u32,
}

/// One-shot schedule: starts at a given minute and ends the same day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub schedule_start_date: Date,
    pub schedule_end_date: Date,
    pub start_time_of_day: TimeOfDay,
}

impl Schedule {
    /// Run once, shortly after `now`
    pub fn once_after(now: DateTime<Utc>) -> Self {
        let start = now + Duration::seconds(SCHEDULE_BUFFER_SECS);
        let date = Date {
            year: start.year(),
            month: start.month(),
            day: start.day(),
        };
        Self {
            schedule_start_date: date,
            schedule_end_date: date,
            start_time_of_day: TimeOfDay {
                hours: start.hour(),
                minutes: start.minute(),
            },
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsAccessKey {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for AwsAccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsAccessKey")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

impl From<&StagingCredentials> for AwsAccessKey {
    fn from(credentials: &StagingCredentials) -> Self {
        Self {
            access_key_id: credentials.access_key_id.clone(),
            secret_access_key: credentials.secret_access_key.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsS3Data {
    pub bucket_name: String,
    pub aws_access_key: AwsAccessKey,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GcsData {
    pub bucket_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectConditions {
    pub include_prefixes: Vec<String>,
    pub exclude_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferOptions {
    pub overwrite_objects_already_existing_in_sink: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSpec {
    pub aws_s3_data_source: AwsS3Data,
    pub gcs_data_sink: GcsData,
    pub object_conditions: ObjectConditions,
    pub transfer_options: TransferOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferJobStatus {
    Enabled,
}

/// Request body for `transferJobs.create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferJobSpec {
    pub description: String,
    pub project_id: String,
    pub status: TransferJobStatus,
    pub schedule: Schedule,
    pub transfer_spec: TransferSpec,
}

/// Source and sink of a staging-to-destination copy
#[derive(Debug, Clone)]
pub struct CopyRequest<'a> {
    pub staging_bucket: &'a str,
    pub prefix: &'a str,
    pub manifest_key: &'a str,
    pub destination_bucket: &'a str,
    pub allow_overwrite: bool,
}

impl TransferJobSpec {
    /// Copy everything under the request prefix except the manifest
    pub fn for_copy(
        project_id: &str,
        description: &str,
        credentials: &StagingCredentials,
        request: &CopyRequest<'_>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            description: description.to_string(),
            project_id: project_id.to_string(),
            status: TransferJobStatus::Enabled,
            schedule: Schedule::once_after(now),
            transfer_spec: TransferSpec {
                aws_s3_data_source: AwsS3Data {
                    bucket_name: request.staging_bucket.to_string(),
                    aws_access_key: AwsAccessKey::from(credentials),
                },
                gcs_data_sink: GcsData {
                    bucket_name: request.destination_bucket.to_string(),
                },
                object_conditions: ObjectConditions {
                    include_prefixes: vec![request.prefix.to_string()],
                    exclude_prefixes: vec![request.manifest_key.to_string()],
                },
                transfer_options: TransferOptions {
                    overwrite_objects_already_existing_in_sink: request.allow_overwrite,
                },
            },
        }
    }
}

/// Created job as returned by the service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransferJobHandle {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferCounters {
    #[serde(default, deserialize_with = "crate::wire::opt_u64::deserialize")]
    pub objects_copied_to_sink: Option<u64>,
    #[serde(default, deserialize_with = "crate::wire::opt_u64::deserialize")]
    pub bytes_copied_to_sink: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationMetadata {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub counters: Option<TransferCounters>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Long-running operation spawned by a transfer job
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TransferOperation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub metadata: OperationMetadata,
    #[serde(default)]
    pub error: Option<OperationError>,
}

pub const STATUS_IN_PROGRESS: &str = "IN_PROGRESS";
pub const STATUS_SUCCESS: &str = "SUCCESS";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_ABORTED: &str = "ABORTED";

impl TransferOperation {
    pub fn status(&self) -> Option<&str> {
        self.metadata.status.as_deref()
    }

    pub fn is_in_progress(&self) -> bool {
        self.status() == Some(STATUS_IN_PROGRESS)
    }

    /// A finished operation failed if the service says so or attached an
    /// error
    pub fn is_failed(&self) -> bool {
        matches!(self.status(), Some(STATUS_FAILED) | Some(STATUS_ABORTED)) || self.error.is_some()
    }

    pub fn failure_message(&self) -> String {
        self.error
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| format!("status {}", self.status().unwrap_or("unknown")))
    }

    /// Operation snapshot carrying only a status
    pub fn with_status(name: impl Into<String>, status: &str, done: bool) -> Self {
        Self {
            name: name.into(),
            done,
            metadata: OperationMetadata {
                status: Some(status.to_string()),
                counters: None,
            },
            error: None,
        }
    }
}
