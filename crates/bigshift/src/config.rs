//! Pipeline configuration

use bigshift_common::{BigShiftError, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::DEFAULT_MAX_ATTEMPTS;

/// Default source schema.
pub const DEFAULT_SOURCE_SCHEMA: &str = "public";

/// Default interval between transfer operation lookups.
pub const DEFAULT_TRANSFER_POLL_SECS: u64 = 30;

/// Default interval between load job lookups.
pub const DEFAULT_LOAD_POLL_SECS: u64 = 60;

/// Pipeline stage. Stages always run in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    Unload,
    Transfer,
    Load,
    Cleanup,
}

impl Step {
    pub const ALL: [Step; 4] = [Step::Unload, Step::Transfer, Step::Load, Step::Cleanup];

    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Unload => "unload",
            Step::Transfer => "transfer",
            Step::Load => "load",
            Step::Cleanup => "cleanup",
        }
    }

    /// Parse a comma-separated step list; an empty list selects every step
    pub fn parse_list(list: &str) -> Result<BTreeSet<Step>> {
        let steps = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Step::from_str)
            .collect::<Result<BTreeSet<_>>>()?;
        if steps.is_empty() {
            Ok(Step::ALL.into_iter().collect())
        } else {
            Ok(steps)
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = BigShiftError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unload" => Ok(Step::Unload),
            "transfer" => Ok(Step::Transfer),
            "load" => Ok(Step::Load),
            "cleanup" => Ok(Step::Cleanup),
            _ => Err(BigShiftError::Config(format!(
                "Unknown step {s:?}, expected one of unload, transfer, load, cleanup"
            ))),
        }
    }
}

/// Everything one run needs besides collaborator handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub source_database: String,
    pub source_schema: String,
    pub source_table: String,
    pub destination_project: String,
    pub destination_dataset: String,
    pub destination_table: String,
    pub staging_bucket: String,
    pub staging_prefix: Option<String>,
    pub destination_bucket: String,
    pub max_bad_records: Option<u32>,
    pub steps: BTreeSet<Step>,
    pub compression: bool,
    /// Truncate a non-empty destination table instead of failing the load
    pub allow_overwrite: bool,
    pub transfer_poll_interval: Duration,
    pub load_poll_interval: Duration,
    pub retry_attempts: u32,
}

impl PipelineConfig {
    /// Configuration with every optional setting at its default
    pub fn new(
        source_database: impl Into<String>,
        source_table: impl Into<String>,
        destination_project: impl Into<String>,
        destination_dataset: impl Into<String>,
        staging_bucket: impl Into<String>,
        destination_bucket: impl Into<String>,
    ) -> Self {
        let source_table = source_table.into();
        Self {
            source_database: source_database.into(),
            source_schema: DEFAULT_SOURCE_SCHEMA.to_string(),
            destination_table: source_table.clone(),
            source_table,
            destination_project: destination_project.into(),
            destination_dataset: destination_dataset.into(),
            staging_bucket: staging_bucket.into(),
            staging_prefix: None,
            destination_bucket: destination_bucket.into(),
            max_bad_records: None,
            steps: Step::ALL.into_iter().collect(),
            compression: true,
            allow_overwrite: false,
            transfer_poll_interval: Duration::from_secs(DEFAULT_TRANSFER_POLL_SECS),
            load_poll_interval: Duration::from_secs(DEFAULT_LOAD_POLL_SECS),
            retry_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn runs(&self, step: Step) -> bool {
        self.steps.contains(&step)
    }

    /// Validate configuration, reporting every problem at once
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        let required = [
            ("source database", &self.source_database),
            ("source schema", &self.source_schema),
            ("source table", &self.source_table),
            ("destination project", &self.destination_project),
            ("destination dataset", &self.destination_dataset),
            ("destination table", &self.destination_table),
            ("staging bucket", &self.staging_bucket),
            ("destination bucket", &self.destination_bucket),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                errors.push(format!("{name} cannot be empty"));
            }
        }

        if self.steps.is_empty() {
            errors.push("at least one step must be selected".to_string());
        }
        if self.transfer_poll_interval.is_zero() || self.load_poll_interval.is_zero() {
            errors.push("poll intervals must be greater than 0".to_string());
        }
        if self.retry_attempts == 0 {
            errors.push("retry attempts must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BigShiftError::Config(errors.join("; ")))
        }
    }
}
