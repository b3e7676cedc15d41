//! Four-stage table migration: unload, transfer, load, cleanup
//!
//! Stages run sequentially in a fixed order; each blocks until its vendor job
//! is finished. A failed stage aborts the run and leaves what it produced in
//! place.

use bigshift_common::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::cleaner::Cleaner;
use crate::clients::{DestinationStore, SourceWarehouse, StagingStore, TransferService, WarehouseClient};
use crate::clock::{Clock, SystemClock};
use crate::config::{PipelineConfig, Step};
use crate::credentials::StagingCredentials;
use crate::load::{LoadOptions, TableReference, WarehouseLoader};
use crate::manifest::TransferManifest;
use crate::progress::{ProgressSink, TracingProgress};
use crate::retry::RetryPolicy;
use crate::schema::TableSchema;
use crate::transfer::{CrossCloudTransfer, TransferValidator};
use crate::unloader::{RedshiftUnloader, UnloadOptions};

/// Collaborators a pipeline run talks to
#[derive(Clone)]
pub struct Components {
    pub source: Arc<dyn SourceWarehouse>,
    pub staging: Arc<dyn StagingStore>,
    pub transfer: Arc<dyn TransferService>,
    pub destination: Arc<dyn DestinationStore>,
    pub warehouse: Arc<dyn WarehouseClient>,
    pub staging_credentials: StagingCredentials,
    pub clock: Arc<dyn Clock>,
    pub progress: Arc<dyn ProgressSink>,
}

impl Components {
    /// Components with the system clock and tracing progress
    pub fn new(
        source: Arc<dyn SourceWarehouse>,
        staging: Arc<dyn StagingStore>,
        transfer: Arc<dyn TransferService>,
        destination: Arc<dyn DestinationStore>,
        warehouse: Arc<dyn WarehouseClient>,
        staging_credentials: StagingCredentials,
    ) -> Self {
        Self {
            source,
            staging,
            transfer,
            destination,
            warehouse,
            staging_credentials,
            clock: Arc::new(SystemClock),
            progress: Arc::new(TracingProgress),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }
}

/// Staging key prefix for a table:
/// `[<user prefix>/]<db>/<schema>/<table>/<db>-<schema>-<table>-`
pub fn staging_prefix(config: &PipelineConfig) -> String {
    let db = &config.source_database;
    let schema = &config.source_schema;
    let table = &config.source_table;
    let prefix = format!("{db}/{schema}/{table}/{db}-{schema}-{table}-");

    match config
        .staging_prefix
        .as_deref()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty())
    {
        Some(user_prefix) => format!("{user_prefix}/{prefix}"),
        None => prefix,
    }
}

/// Human-readable transfer job description, unique per minute
pub fn transfer_description(config: &PipelineConfig, now: DateTime<Utc>) -> String {
    format!(
        "bigshift-{}-{}-{}-{}",
        config.source_database,
        config.source_schema,
        config.source_table,
        now.format("%Y%m%dT%H%M")
    )
}

pub struct Pipeline {
    config: PipelineConfig,
    components: Components,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, components: Components) -> Self {
        Self { config, components }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<()> {
        self.config.validate()?;

        let table_schema = TableSchema::new(
            self.components.source.clone(),
            &self.config.source_schema,
            &self.config.source_table,
        );
        let manifest = TransferManifest::new(
            self.components.staging.clone(),
            &self.config.staging_bucket,
            staging_prefix(&self.config),
        );

        for step in Step::ALL {
            if !self.config.runs(step) {
                debug!("Skipping {}", step);
                continue;
            }
            match step {
                Step::Unload => self.unload(&table_schema, &manifest).await?,
                Step::Transfer => self.transfer(&manifest).await?,
                Step::Load => self.load(&table_schema, &manifest).await?,
                Step::Cleanup => self.cleanup(&manifest).await?,
            }
        }

        info!(
            "Migration of {}.{} finished",
            self.config.source_schema, self.config.source_table
        );
        Ok(())
    }

    async fn unload(&self, table_schema: &TableSchema, manifest: &TransferManifest) -> Result<()> {
        let unloader = RedshiftUnloader::new(
            self.components.source.clone(),
            self.components.staging_credentials.clone(),
        );
        let s3_uri = format!("s3://{}/{}", manifest.bucket_name(), manifest.prefix());
        let options = UnloadOptions {
            allow_overwrite: false,
            compression: self.config.compression,
        };
        unloader.unload_to(table_schema, &s3_uri, options).await
    }

    async fn transfer(&self, manifest: &TransferManifest) -> Result<()> {
        let poll_interval = self.config.transfer_poll_interval;
        let transfer = CrossCloudTransfer::new(
            self.components.transfer.clone(),
            &self.config.destination_project,
            self.components.staging_credentials.clone(),
        )
        .with_clock(self.components.clock.clone())
        .with_progress(self.components.progress.clone())
        .with_poll_interval(poll_interval)
        .with_retry(RetryPolicy::new(self.config.retry_attempts, poll_interval));

        let description = transfer_description(&self.config, self.components.clock.now());
        transfer
            .copy_to_destination(manifest, &self.config.destination_bucket, &description, false)
            .await?;

        TransferValidator::new(self.components.destination.clone())
            .validate(manifest, &self.config.destination_bucket)
            .await
    }

    async fn load(&self, table_schema: &TableSchema, manifest: &TransferManifest) -> Result<()> {
        let poll_interval = self.config.load_poll_interval;
        let loader = WarehouseLoader::new(self.components.warehouse.clone())
            .with_clock(self.components.clock.clone())
            .with_progress(self.components.progress.clone())
            .with_poll_interval(poll_interval)
            .with_retry(RetryPolicy::new(self.config.retry_attempts, poll_interval));

        let schema = table_schema.to_destination_schema().await?;
        let table = TableReference::new(
            &self.config.destination_project,
            &self.config.destination_dataset,
            &self.config.destination_table,
        );
        loader.ensure_table(&table, Some(&schema)).await?;

        let uri = format!("gs://{}/{}*", self.config.destination_bucket, manifest.prefix());
        let options = LoadOptions {
            schema: Some(schema),
            allow_overwrite: self.config.allow_overwrite,
            max_bad_records: self.config.max_bad_records,
        };
        loader.load(&table, &uri, &options).await?;
        Ok(())
    }

    async fn cleanup(&self, manifest: &TransferManifest) -> Result<()> {
        Cleaner::new(
            self.components.staging.clone(),
            self.components.destination.clone(),
        )
        .cleanup(manifest, &self.config.destination_bucket)
        .await
    }
}
