//! BigQuery REST API v2

use async_trait::async_trait;
use bigshift_common::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{is_not_found, AccessTokenProvider, GcpHttp};
use crate::clients::WarehouseClient;
use crate::load::{JobReference, LoadJob, LoadJobSpec, TableInfo, TableReference};
use crate::schema::DestinationSchema;

pub const DEFAULT_BASE_URL: &str = "https://bigquery.googleapis.com/bigquery/v2";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NewTable<'a> {
    table_reference: &'a TableReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    schema: Option<&'a DestinationSchema>,
}

pub struct BigQueryClient {
    http: GcpHttp,
}

impl BigQueryClient {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, tokens)
    }

    pub fn with_base_url(base_url: impl Into<String>, tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        Ok(Self {
            http: GcpHttp::new("bigquery", base_url, tokens)?,
        })
    }

    fn tables_url(&self, project_id: &str, dataset_id: &str) -> String {
        self.http.url(&format!(
            "/projects/{}/datasets/{}/tables",
            urlencoding::encode(project_id),
            urlencoding::encode(dataset_id)
        ))
    }

    fn jobs_url(&self, project_id: &str) -> String {
        self.http
            .url(&format!("/projects/{}/jobs", urlencoding::encode(project_id)))
    }
}

#[async_trait]
impl WarehouseClient for BigQueryClient {
    #[instrument(skip(self))]
    async fn get_table(&self, table: &TableReference) -> Result<Option<TableInfo>> {
        let url = format!(
            "{}/{}",
            self.tables_url(&table.project_id, &table.dataset_id),
            urlencoding::encode(&table.table_id)
        );
        match self.http.send_json(self.http.client().get(url)).await {
            Ok(info) => Ok(Some(info)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    #[instrument(skip(self, schema))]
    async fn create_table(
        &self,
        table: &TableReference,
        schema: Option<&DestinationSchema>,
    ) -> Result<TableInfo> {
        let body = NewTable {
            table_reference: table,
            schema,
        };
        let request = self
            .http
            .client()
            .post(self.tables_url(&table.project_id, &table.dataset_id))
            .json(&body);
        self.http.send_json(request).await
    }

    #[instrument(skip(self, spec), fields(job_id = %spec.job_reference.job_id))]
    async fn insert_job(&self, spec: &LoadJobSpec) -> Result<LoadJob> {
        let request = self
            .http
            .client()
            .post(self.jobs_url(&spec.job_reference.project_id))
            .json(spec);
        let job: LoadJob = self.http.send_json(request).await?;
        debug!(state = ?job.state(), "Inserted load job");
        Ok(job)
    }

    async fn get_job(&self, job: &JobReference) -> Result<LoadJob> {
        let url = format!(
            "{}/{}",
            self.jobs_url(&job.project_id),
            urlencoding::encode(&job.job_id)
        );
        let mut request = self.http.client().get(url);
        if let Some(location) = &job.location {
            request = request.query(&[("location", location.as_str())]);
        }
        self.http.send_json(request).await
    }
}
