//! BigQuery load job payloads

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::schema::DestinationSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableReference {
    pub project_id: String,
    pub dataset_id: String,
    pub table_id: String,
}

impl TableReference {
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: impl Into<String>,
        table_id: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.into(),
            table_id: table_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReference {
    pub project_id: String,
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteDisposition {
    /// Refuse to load into a table that already has rows
    #[serde(rename = "WRITE_EMPTY")]
    FailIfNonEmpty,
    #[serde(rename = "WRITE_TRUNCATE")]
    TruncateOverwrite,
}

impl WriteDisposition {
    pub fn from_allow_overwrite(allow_overwrite: bool) -> Self {
        if allow_overwrite {
            WriteDisposition::TruncateOverwrite
        } else {
            WriteDisposition::FailIfNonEmpty
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateDisposition {
    #[serde(rename = "CREATE_IF_NEEDED")]
    CreateIfAbsent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    #[serde(rename = "CSV")]
    DelimitedText,
}

pub const FIELD_DELIMITER: &str = "\t";
pub const QUOTE: &str = "\"";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadConfiguration {
    pub source_uris: Vec<String>,
    pub destination_table: TableReference,
    pub write_disposition: WriteDisposition,
    pub create_disposition: CreateDisposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<DestinationSchema>,
    pub source_format: SourceFormat,
    pub field_delimiter: String,
    pub quote: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bad_records: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobConfiguration {
    pub load: LoadConfiguration,
}

/// Request body for `jobs.insert`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadJobSpec {
    pub job_reference: JobReference,
    pub configuration: JobConfiguration,
}

impl LoadJobSpec {
    /// Tab-delimited, double-quoted load of `source_uri` into `table`
    pub fn new(
        job_id: impl Into<String>,
        table: &TableReference,
        source_uri: impl Into<String>,
        schema: Option<DestinationSchema>,
        write_disposition: WriteDisposition,
        max_bad_records: Option<u32>,
    ) -> Self {
        Self {
            job_reference: JobReference {
                project_id: table.project_id.clone(),
                job_id: job_id.into(),
                location: None,
            },
            configuration: JobConfiguration {
                load: LoadConfiguration {
                    source_uris: vec![source_uri.into()],
                    destination_table: table.clone(),
                    write_disposition,
                    create_disposition: CreateDisposition::CreateIfAbsent,
                    schema,
                    source_format: SourceFormat::DelimitedText,
                    field_delimiter: FIELD_DELIMITER.to_string(),
                    quote: QUOTE.to_string(),
                    max_bad_records,
                },
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorProto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub const STATE_RUNNING: &str = "RUNNING";
pub const STATE_DONE: &str = "DONE";

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error_result: Option<ErrorProto>,
    #[serde(default)]
    pub errors: Vec<ErrorProto>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadJobStatistics {
    #[serde(default, deserialize_with = "crate::wire::opt_u64::deserialize")]
    pub input_file_bytes: Option<u64>,
    #[serde(default, deserialize_with = "crate::wire::opt_u64::deserialize")]
    pub input_files: Option<u64>,
    #[serde(default, deserialize_with = "crate::wire::opt_u64::deserialize")]
    pub output_rows: Option<u64>,
    #[serde(default, deserialize_with = "crate::wire::opt_u64::deserialize")]
    pub output_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct JobStatistics {
    #[serde(default)]
    pub load: Option<LoadJobStatistics>,
}

/// Job resource as returned by `jobs.insert` and `jobs.get`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadJob {
    pub job_reference: JobReference,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub statistics: Option<JobStatistics>,
}

impl LoadJob {
    pub fn state(&self) -> Option<&str> {
        self.status.as_ref().and_then(|s| s.state.as_deref())
    }

    pub fn is_done(&self) -> bool {
        self.state() == Some(STATE_DONE)
    }

    pub fn is_running(&self) -> bool {
        self.state() == Some(STATE_RUNNING)
    }

    pub fn error_result(&self) -> Option<&ErrorProto> {
        self.status.as_ref().and_then(|s| s.error_result.as_ref())
    }

    pub fn row_errors(&self) -> &[ErrorProto] {
        self.status.as_ref().map(|s| s.errors.as_slice()).unwrap_or_default()
    }

    pub fn load_statistics(&self) -> LoadStatistics {
        self.statistics
            .as_ref()
            .and_then(|s| s.load.as_ref())
            .map(LoadStatistics::from)
            .unwrap_or_default()
    }
}

/// Table metadata; the existing schema is not inspected
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub table_reference: TableReference,
    #[serde(default, deserialize_with = "crate::wire::opt_u64::deserialize")]
    pub num_rows: Option<u64>,
}

impl TableInfo {
    pub fn new(table_reference: TableReference) -> Self {
        Self {
            table_reference,
            num_rows: None,
        }
    }
}

/// Summary of a finished load
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStatistics {
    pub input_file_bytes: u64,
    pub input_files: u64,
    pub output_rows: u64,
    pub output_bytes: u64,
}

impl From<&LoadJobStatistics> for LoadStatistics {
    fn from(stats: &LoadJobStatistics) -> Self {
        Self {
            input_file_bytes: stats.input_file_bytes.unwrap_or(0),
            input_files: stats.input_files.unwrap_or(0),
            output_rows: stats.output_rows.unwrap_or(0),
            output_bytes: stats.output_bytes.unwrap_or(0),
        }
    }
}

/// Position of a rejected row, parsed from strings like
/// `File: 0 / Line:5 / Field:18`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowErrorLocation {
    pub file: Option<u64>,
    pub line: Option<u64>,
    pub field: Option<u64>,
    raw: String,
}

impl RowErrorLocation {
    /// Never fails; components that do not parse are left empty
    pub fn parse(raw: &str) -> Self {
        let mut location = Self {
            file: None,
            line: None,
            field: None,
            raw: raw.to_string(),
        };
        for part in raw.split('/') {
            let Some((name, value)) = part.split_once(':') else {
                continue;
            };
            let Ok(value) = value.trim().parse::<u64>() else {
                continue;
            };
            match name.trim().to_ascii_lowercase().as_str() {
                "file" => location.file = Some(value),
                "line" => location.line = Some(value),
                "field" => location.field = Some(value),
                _ => {},
            }
        }
        location
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// `file 0, line 5, field 18` when any component parsed, the raw text
/// otherwise
impl fmt::Display for RowErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [("file", self.file), ("line", self.line), ("field", self.field)]
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| format!("{name} {value}")))
            .collect::<Vec<_>>();
        if parts.is_empty() {
            f.write_str(&self.raw)
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}
