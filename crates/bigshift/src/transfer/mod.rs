//! Cross-cloud copy of exported shards
//!
//! A one-shot Storage Transfer job copies every shard under the export prefix
//! (but not the manifest) from staging into the destination-adjacent bucket.
//! The job is then polled until its operation reaches a terminal status.
//! Success reported by the service is not trusted on its own; callers follow
//! up with [`TransferValidator`].

pub mod spec;
pub mod validator;

pub use spec::{CopyRequest, TransferJobHandle, TransferJobSpec, TransferOperation};
pub use validator::TransferValidator;

use bigshift_common::units::format_gib;
use bigshift_common::{BigShiftError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::clients::TransferService;
use crate::clock::{Clock, SystemClock};
use crate::credentials::StagingCredentials;
use crate::manifest::TransferManifest;
use crate::progress::{ProgressEvent, ProgressSink, TracingProgress};
use crate::retry::RetryPolicy;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

pub struct CrossCloudTransfer {
    service: Arc<dyn TransferService>,
    project_id: String,
    credentials: StagingCredentials,
    clock: Arc<dyn Clock>,
    progress: Arc<dyn ProgressSink>,
    retry: RetryPolicy,
    poll_interval: Duration,
}

impl CrossCloudTransfer {
    pub fn new(
        service: Arc<dyn TransferService>,
        project_id: impl Into<String>,
        credentials: StagingCredentials,
    ) -> Self {
        Self {
            service,
            project_id: project_id.into(),
            credentials,
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

    /// Poll interval; also used as the delay between lookup retries
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.retry = RetryPolicy::new(self.retry.max_attempts, poll_interval);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Copy the manifest's shards to `destination_bucket` and wait for the
    /// job to finish
    pub async fn copy_to_destination(
        &self,
        manifest: &TransferManifest,
        destination_bucket: &str,
        description: &str,
        allow_overwrite: bool,
    ) -> Result<TransferOperation> {
        let request = CopyRequest {
            staging_bucket: manifest.bucket_name(),
            prefix: manifest.prefix(),
            manifest_key: manifest.manifest_key(),
            destination_bucket,
            allow_overwrite,
        };
        let spec = TransferJobSpec::for_copy(
            &self.project_id,
            description,
            &self.credentials,
            &request,
            self.clock.now(),
        );
        let job = self.service.create_transfer_job(&spec).await?;

        info!(
            "Transferring {} objects ({}) from s3://{}/{} to gs://{}/{}",
            manifest.count().await?,
            format_gib(manifest.total_file_size().await?),
            manifest.bucket_name(),
            manifest.prefix(),
            destination_bucket,
            manifest.prefix()
        );

        self.await_completion(&job, description).await
    }

    async fn await_completion(
        &self,
        job: &TransferJobHandle,
        description: &str,
    ) -> Result<TransferOperation> {
        let service = self.service.as_ref();
        let project_id = self.project_id.as_str();
        let job_name = job.name.as_str();
        let mut started = false;

        loop {
            let operations = self
                .retry
                .run(self.clock.as_ref(), "waiting for transfer job", move || {
                    service.list_transfer_operations(project_id, job_name)
                })
                .await?;
            let operation = operations.into_iter().next();

            match operation {
                Some(operation) if operation.done => {
                    return self.handle_completion(job, description, operation);
                },
                operation => {
                    let in_progress = operation.as_ref().is_some_and(TransferOperation::is_in_progress);
                    if in_progress && !started {
                        started = true;
                        self.progress.report(ProgressEvent::TransferStarted {
                            description: description.to_string(),
                        });
                    } else {
                        self.progress.report(ProgressEvent::TransferWaiting {
                            description: description.to_string(),
                            job_name: job.name.clone(),
                            status: operation.and_then(|op| op.metadata.status),
                        });
                    }
                    self.clock.sleep(self.poll_interval).await;
                },
            }
        }
    }

    fn handle_completion(
        &self,
        job: &TransferJobHandle,
        description: &str,
        operation: TransferOperation,
    ) -> Result<TransferOperation> {
        if operation.is_failed() {
            return Err(BigShiftError::TransferJobFailed {
                job: job.name.clone(),
                message: operation.failure_message(),
            });
        }

        let counters = operation.metadata.counters.clone().unwrap_or_default();
        self.progress.report(ProgressEvent::TransferComplete {
            description: description.to_string(),
            objects_copied: counters.objects_copied_to_sink,
            bytes_copied: counters.bytes_copied_to_sink,
        });
        Ok(operation)
    }
}
