//! Bulk load of transferred shards into the destination warehouse

pub mod spec;

pub use spec::{
    JobReference, LoadJob, LoadJobSpec, LoadStatistics, RowErrorLocation, TableInfo,
    TableReference, WriteDisposition,
};

use bigshift_common::{BigShiftError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clients::WarehouseClient;
use crate::clock::{Clock, SystemClock};
use crate::progress::{ProgressEvent, ProgressSink, TracingProgress};
use crate::retry::RetryPolicy;
use crate::schema::DestinationSchema;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Load job ids are chosen client-side so a resubmitted request cannot start
/// a second job
pub fn new_job_id() -> String {
    format!("bigshift_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadOptions {
    pub schema: Option<DestinationSchema>,
    pub allow_overwrite: bool,
    pub max_bad_records: Option<u32>,
}

pub struct WarehouseLoader {
    client: Arc<dyn WarehouseClient>,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressSink>,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl WarehouseLoader {
    pub fn new(client: Arc<dyn WarehouseClient>) -> Self {
        Self {
            client,
            clock: Arc::new(SystemClock),
            progress: Arc::new(TracingProgress),
            retry: RetryPolicy::with_delay(DEFAULT_POLL_INTERVAL),
            poll_interval: DEFAULT_POLL_INTERVAL,
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

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.retry = RetryPolicy::new(self.retry.max_attempts, poll_interval);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch the destination table, creating it with `schema` if absent
    pub async fn ensure_table(
        &self,
        table: &TableReference,
        schema: Option<&DestinationSchema>,
    ) -> Result<TableInfo> {
        if let Some(existing) = self.client.get_table(table).await? {
            debug!(
                dataset = %table.dataset_id,
                table = %table.table_id,
                "Destination table exists"
            );
            return Ok(existing);
        }
        info!("Creating table {}.{}", table.dataset_id, table.table_id);
        self.client.create_table(table, schema).await
    }

    /// Load `uri` into `table` and wait for the job to finish
    pub async fn load(
        &self,
        table: &TableReference,
        uri: &str,
        options: &LoadOptions,
    ) -> Result<LoadStatistics> {
        let spec = LoadJobSpec::new(
            new_job_id(),
            table,
            uri,
            options.schema.clone(),
            WriteDisposition::from_allow_overwrite(options.allow_overwrite),
            options.max_bad_records,
        );
        let job = self.client.insert_job(&spec).await?;
        info!(
            "Loading rows from {} to the table {}.{}",
            uri, table.dataset_id, table.table_id
        );
        self.await_completion(&job.job_reference).await
    }

    async fn await_completion(&self, job_reference: &JobReference) -> Result<LoadStatistics> {
        let client = self.client.as_ref();
        let mut started = false;

        loop {
            let job = self
                .retry
                .run(self.clock.as_ref(), "waiting for load job", move || {
                    client.get_job(job_reference)
                })
                .await?;

            if job.is_done() {
                return self.handle_completion(&job);
            }

            if job.is_running() && !started {
                started = true;
                self.progress.report(ProgressEvent::LoadStarted {
                    job_id: job_reference.job_id.clone(),
                });
            } else {
                self.progress.report(ProgressEvent::LoadWaiting {
                    job_id: job_reference.job_id.clone(),
                    state: job.state().map(str::to_string),
                });
            }
            self.clock.sleep(self.poll_interval).await;
        }
    }

    fn handle_completion(&self, job: &LoadJob) -> Result<LoadStatistics> {
        let job_id = job.job_reference.job_id.clone();

        if let Some(error_result) = job.error_result() {
            for row_error in job.row_errors() {
                self.progress.report(ProgressEvent::LoadRowError {
                    message: row_error.message.clone().unwrap_or_default(),
                    location: row_error.location.as_deref().map(RowErrorLocation::parse),
                });
            }
            return Err(BigShiftError::LoadJobFailed {
                job_id,
                message: error_result
                    .message
                    .clone()
                    .unwrap_or_else(|| "load job failed".to_string()),
            });
        }

        let statistics = job.load_statistics();
        self.progress.report(ProgressEvent::LoadComplete { job_id, statistics });
        Ok(statistics)
    }
}
