//! Storage Transfer Service v1

use async_trait::async_trait;
use bigshift_common::Result;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{AccessTokenProvider, GcpHttp};
use crate::clients::TransferService;
use crate::transfer::{TransferJobHandle, TransferJobSpec, TransferOperation};

pub const DEFAULT_BASE_URL: &str = "https://storagetransfer.googleapis.com/v1";

#[derive(Debug, Default, Deserialize)]
struct ListOperationsResponse {
    #[serde(default)]
    operations: Vec<TransferOperation>,
}

pub struct StorageTransferClient {
    http: GcpHttp,
}

impl StorageTransferClient {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, tokens)
    }

    pub fn with_base_url(base_url: impl Into<String>, tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        Ok(Self {
            http: GcpHttp::new("storagetransfer", base_url, tokens)?,
        })
    }
}

#[async_trait]
impl TransferService for StorageTransferClient {
    #[instrument(skip(self, spec), fields(description = %spec.description))]
    async fn create_transfer_job(&self, spec: &TransferJobSpec) -> Result<TransferJobHandle> {
        let request = self
            .http
            .client()
            .post(self.http.url("/transferJobs"))
            .json(spec);
        let job: TransferJobHandle = self.http.send_json(request).await?;
        debug!(name = %job.name, "Created transfer job");
        Ok(job)
    }

    async fn list_transfer_operations(
        &self,
        project_id: &str,
        job_name: &str,
    ) -> Result<Vec<TransferOperation>> {
        let filter = json!({"projectId": project_id, "jobNames": [job_name]}).to_string();
        let request = self
            .http
            .client()
            .get(self.http.url("/transferOperations"))
            .query(&[("filter", filter.as_str())]);
        let response: ListOperationsResponse = self.http.send_json(request).await?;
        Ok(response.operations)
    }
}
