//! Command-line surface
//!
//! Arguments fall back to `BIGSHIFT_*` environment variables. Credentials are
//! read from YAML (or JSON) files. Every missing argument and unreadable file
//! is reported in a single error rather than one at a time.

use bigshift_common::{BigShiftError, Result};
use clap::Parser;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use yup_oauth2::ServiceAccountKey;

use crate::clients::gcp::{
    AccessTokenProvider, BigQueryClient, CloudStorageClient, ServiceAccountTokens, StaticToken,
    StorageTransferClient,
};
use crate::clients::redshift::RedshiftSource;
use crate::clients::s3::S3Staging;
use crate::config::{
    PipelineConfig, Step, DEFAULT_LOAD_POLL_SECS, DEFAULT_SOURCE_SCHEMA, DEFAULT_TRANSFER_POLL_SECS,
};
use crate::credentials::{SourceCredentials, StagingCredentials, StagingCredentialsFile};
use crate::pipeline::Components;

/// Move a Redshift table to BigQuery through S3 and Cloud Storage
#[derive(Parser, Debug, Default)]
#[command(name = "bigshift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// GCP service account key file (YAML or JSON)
    #[arg(long, env = "BIGSHIFT_GCP_CREDENTIALS", value_name = "PATH")]
    pub gcp_credentials: Option<PathBuf>,

    /// Pre-issued GCP access token used instead of the service account key
    #[arg(long, env = "GCP_ACCESS_TOKEN", hide_env_values = true)]
    pub gcp_access_token: Option<String>,

    /// GCP project, defaults to the `project_id` of the service account key
    #[arg(long, env = "BIGSHIFT_GCP_PROJECT", value_name = "PROJECT_ID")]
    pub gcp_project: Option<String>,

    /// AWS credentials file; the default AWS provider chain is used without it
    #[arg(long, env = "BIGSHIFT_AWS_CREDENTIALS", value_name = "PATH")]
    pub aws_credentials: Option<PathBuf>,

    /// Redshift credentials file with host, port, username and password
    #[arg(long, env = "BIGSHIFT_RS_CREDENTIALS", value_name = "PATH")]
    pub rs_credentials: Option<PathBuf>,

    #[arg(long, env = "BIGSHIFT_RS_DATABASE", value_name = "DB_NAME")]
    pub rs_database: Option<String>,

    #[arg(long, env = "BIGSHIFT_RS_SCHEMA", value_name = "SCHEMA_NAME")]
    pub rs_schema: Option<String>,

    #[arg(long, env = "BIGSHIFT_RS_TABLE", value_name = "TABLE_NAME")]
    pub rs_table: Option<String>,

    #[arg(long, env = "BIGSHIFT_BQ_DATASET", value_name = "DATASET_ID")]
    pub bq_dataset: Option<String>,

    /// Destination table, defaults to the source table name
    #[arg(long, env = "BIGSHIFT_BQ_TABLE", value_name = "TABLE_ID")]
    pub bq_table: Option<String>,

    #[arg(long, env = "BIGSHIFT_S3_BUCKET", value_name = "BUCKET_NAME")]
    pub s3_bucket: Option<String>,

    #[arg(long, env = "BIGSHIFT_S3_PREFIX", value_name = "PREFIX")]
    pub s3_prefix: Option<String>,

    #[arg(long, env = "BIGSHIFT_CS_BUCKET", value_name = "BUCKET_NAME")]
    pub cs_bucket: Option<String>,

    #[arg(long, env = "BIGSHIFT_MAX_BAD_RECORDS", value_name = "N")]
    pub max_bad_records: Option<u32>,

    /// Comma-separated subset of unload,transfer,load,cleanup
    #[arg(long, env = "BIGSHIFT_STEPS", value_name = "STEPS")]
    pub steps: Option<String>,

    /// Write uncompressed shards
    #[arg(long)]
    pub no_compression: bool,

    /// Replace the contents of a non-empty destination table
    #[arg(long)]
    pub allow_overwrite: bool,

    #[arg(long, env = "BIGSHIFT_TRANSFER_POLL_SECS", default_value_t = DEFAULT_TRANSFER_POLL_SECS)]
    pub transfer_poll_secs: u64,

    #[arg(long, env = "BIGSHIFT_LOAD_POLL_SECS", default_value_t = DEFAULT_LOAD_POLL_SECS)]
    pub load_poll_secs: u64,

    /// Log at debug level
    #[arg(short, long)]
    pub verbose: bool,
}

/// How GCP calls are authenticated
#[derive(Clone)]
pub enum GcpAuth {
    ServiceAccount(Box<ServiceAccountKey>),
    Token(String),
}

/// Validated arguments plus loaded credential files
pub struct Settings {
    pub pipeline: PipelineConfig,
    pub source_credentials: SourceCredentials,
    pub staging_credentials: Option<StagingCredentialsFile>,
    pub gcp_auth: GcpAuth,
}

fn load_credentials<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path)?;
    serde_yaml::from_str(&text)
        .map_err(|e| BigShiftError::Config(format!("{} is malformed: {}", path.display(), e)))
}

/// Load an optional credentials file, recording why it could not be read
fn credentials_file<T: DeserializeOwned>(path: Option<&Path>, errors: &mut Vec<String>) -> Option<T> {
    let path = path?;
    if !path.exists() {
        errors.push(format!("{:?} does not exist", path.display().to_string()));
        return None;
    }
    match load_credentials(path) {
        Ok(value) => Some(value),
        Err(e) => {
            errors.push(e.to_string());
            None
        },
    }
}

fn required<'a>(value: &'a Option<String>, flag: &str, errors: &mut Vec<String>) -> &'a str {
    match value.as_deref() {
        Some(v) if !v.trim().is_empty() => v,
        _ => {
            errors.push(format!("{flag} is required"));
            ""
        },
    }
}

impl Cli {
    /// Check arguments and load credential files
    pub fn resolve(&self) -> Result<Settings> {
        let mut errors = Vec::new();

        let source_credentials: Option<SourceCredentials> =
            credentials_file(self.rs_credentials.as_deref(), &mut errors);
        if self.rs_credentials.is_none() {
            errors.push("--rs-credentials is required".to_string());
        }
        let staging_credentials: Option<StagingCredentialsFile> =
            credentials_file(self.aws_credentials.as_deref(), &mut errors);

        let gcp_key: Option<ServiceAccountKey> =
            credentials_file(self.gcp_credentials.as_deref(), &mut errors);
        if self.gcp_credentials.is_none() && self.gcp_access_token.is_none() {
            errors.push("--gcp-credentials is required".to_string());
        }
        let project = self
            .gcp_project
            .clone()
            .or_else(|| gcp_key.as_ref().and_then(|key| key.project_id.clone()));
        if project.is_none() && (gcp_key.is_some() || self.gcp_access_token.is_some()) {
            errors.push("--gcp-project is required when the credentials carry no project_id".to_string());
        }

        let database = required(&self.rs_database, "--rs-database", &mut errors);
        let table = required(&self.rs_table, "--rs-table", &mut errors);
        let dataset = required(&self.bq_dataset, "--bq-dataset", &mut errors);
        let s3_bucket = required(&self.s3_bucket, "--s3-bucket", &mut errors);
        let cs_bucket = required(&self.cs_bucket, "--cs-bucket", &mut errors);

        let steps = match self.steps.as_deref() {
            Some(list) => Step::parse_list(list).unwrap_or_else(|e| {
                errors.push(e.to_string());
                Default::default()
            }),
            None => Step::ALL.into_iter().collect(),
        };

        let mut pipeline = PipelineConfig::new(
            database,
            table,
            project.unwrap_or_default(),
            dataset,
            s3_bucket,
            cs_bucket,
        );
        pipeline.source_schema = self
            .rs_schema
            .clone()
            .unwrap_or_else(|| DEFAULT_SOURCE_SCHEMA.to_string());
        if let Some(bq_table) = &self.bq_table {
            pipeline.destination_table = bq_table.clone();
        }
        pipeline.staging_prefix = self.s3_prefix.clone();
        pipeline.max_bad_records = self.max_bad_records;
        pipeline.steps = steps;
        pipeline.compression = !self.no_compression;
        pipeline.allow_overwrite = self.allow_overwrite;
        pipeline.transfer_poll_interval = Duration::from_secs(self.transfer_poll_secs);
        pipeline.load_poll_interval = Duration::from_secs(self.load_poll_secs);

        if errors.is_empty() {
            if let Err(e) = pipeline.validate() {
                errors.push(e.to_string());
            }
        }

        let gcp_auth = match (&self.gcp_access_token, gcp_key) {
            (Some(token), _) => Some(GcpAuth::Token(token.clone())),
            (None, Some(key)) => Some(GcpAuth::ServiceAccount(Box::new(key))),
            (None, None) => None,
        };

        match (source_credentials, gcp_auth) {
            (Some(source_credentials), Some(gcp_auth)) if errors.is_empty() => Ok(Settings {
                pipeline,
                source_credentials,
                staging_credentials,
                gcp_auth,
            }),
            _ => Err(BigShiftError::Config(format!(
                "Configuration missing or malformed: {}",
                errors.join("; ")
            ))),
        }
    }
}

impl Settings {
    /// Resolve staging keys, from the credentials file or the AWS default
    /// provider chain
    pub async fn staging_credentials(&self) -> Result<StagingCredentials> {
        let file = self.staging_credentials.clone().unwrap_or_default();
        match file.credentials() {
            Some(credentials) => Ok(credentials),
            None => {
                debug!("No AWS keys in credentials file, using the default provider chain");
                StagingCredentials::from_default_chain(file.region.clone()).await
            },
        }
    }

    async fn token_provider(&self) -> Result<Arc<dyn AccessTokenProvider>> {
        Ok(match &self.gcp_auth {
            GcpAuth::Token(token) => Arc::new(StaticToken::new(token.clone())),
            GcpAuth::ServiceAccount(key) => {
                Arc::new(ServiceAccountTokens::from_key(key.as_ref().clone()).await?)
            },
        })
    }

    /// Connect every production collaborator
    pub async fn connect(&self) -> Result<Components> {
        let staging_credentials = self.staging_credentials().await?;
        let region = self
            .staging_credentials
            .as_ref()
            .and_then(|file| file.region.clone());

        let source = RedshiftSource::connect(
            &self.source_credentials,
            &self.pipeline.source_database,
            &self.pipeline.source_schema,
        )
        .await?;
        let staging = S3Staging::connect(&staging_credentials, region).await;

        let tokens = self.token_provider().await?;
        let transfer = StorageTransferClient::new(tokens.clone())?;
        let destination = CloudStorageClient::new(tokens.clone())?;
        let warehouse = BigQueryClient::new(tokens)?;

        info!(project = %self.pipeline.destination_project, "Collaborators connected");
        Ok(Components::new(
            Arc::new(source),
            Arc::new(staging),
            Arc::new(transfer),
            Arc::new(destination),
            Arc::new(warehouse),
            staging_credentials,
        ))
    }
}
