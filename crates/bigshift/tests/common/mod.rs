//! In-memory collaborators shared by the integration tests

#![allow(dead_code, clippy::unwrap_used)]

use async_trait::async_trait;
use bigshift::clients::{
    CatalogRow, DestinationStore, ObjectInfo, SourceWarehouse, StagingStore, TransferService,
    WarehouseClient,
};
use bigshift::clock::Clock;
use bigshift::credentials::StagingCredentials;
use bigshift::load::spec::{ErrorProto, JobStatistics, JobStatus, LoadJobStatistics};
use bigshift::load::{JobReference, LoadJob, LoadJobSpec, TableInfo, TableReference};
use bigshift::progress::{ProgressEvent, ProgressSink};
use bigshift::schema::DestinationSchema;
use bigshift::transfer::spec::STATUS_SUCCESS;
use bigshift::transfer::{TransferJobHandle, TransferJobSpec, TransferOperation};
use bigshift::{BigShiftError, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,bigshift=debug")),
        )
        .with_test_writer()
        .try_init();
}

pub fn staging_credentials() -> StagingCredentials {
    StagingCredentials::new("AKIAEXAMPLE", "s3cr3t", None)
}

pub fn unavailable() -> BigShiftError {
    BigShiftError::api("storagetransfer", Some(503), "backend unavailable")
}

/// Manifest body in the layout the export writes
pub fn manifest_body(bucket: &str, keys: &[&str]) -> Vec<u8> {
    let entries = keys
        .iter()
        .map(|key| serde_json::json!({"url": format!("s3://{bucket}/{key}")}))
        .collect::<Vec<_>>();
    serde_json::to_vec(&serde_json::json!({ "entries": entries })).unwrap()
}

// ---------------------------------------------------------------------------
// Clock and progress
// ---------------------------------------------------------------------------

pub struct RecordingClock {
    now: DateTime<Utc>,
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::at(Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap())
    }

    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for RecordingClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&ProgressEvent) -> bool) -> usize {
        self.events().iter().filter(|e| predicate(e)).count()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

// ---------------------------------------------------------------------------
// Source warehouse
// ---------------------------------------------------------------------------

/// Catalog keyed by `(schema, table)`; executed statements are recorded and,
/// when a staging store is attached, an export writes shards and a manifest
/// into it
#[derive(Default)]
pub struct FakeSource {
    catalog: Mutex<BTreeMap<(String, String), Vec<CatalogRow>>>,
    catalog_calls: AtomicUsize,
    executed: Mutex<Vec<String>>,
    export: Mutex<Option<ExportTarget>>,
}

struct ExportTarget {
    staging: Arc<InMemoryStaging>,
    bucket: String,
    prefix: String,
    shards: Vec<(String, usize)>,
}

impl FakeSource {
    pub fn with_table(self, schema: &str, table: &str, columns: &[(&str, &str, bool)]) -> Self {
        let rows = columns
            .iter()
            .map(|(column, data_type, not_null)| CatalogRow {
                column: column.to_string(),
                data_type: data_type.to_string(),
                not_null: *not_null,
            })
            .collect();
        self.catalog
            .lock()
            .unwrap()
            .insert((schema.to_string(), table.to_string()), rows);
        self
    }

    /// Make the next executed statement write `shards` under `prefix`
    pub fn exporting_to(
        self,
        staging: Arc<InMemoryStaging>,
        bucket: &str,
        prefix: &str,
        shards: &[(&str, usize)],
    ) -> Self {
        *self.export.lock().unwrap() = Some(ExportTarget {
            staging,
            bucket: bucket.to_string(),
            prefix: prefix.to_string(),
            shards: shards.iter().map(|(s, n)| (s.to_string(), *n)).collect(),
        });
        self
    }

    pub fn catalog_calls(&self) -> usize {
        self.catalog_calls.load(Ordering::SeqCst)
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SourceWarehouse for FakeSource {
    async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<CatalogRow>> {
        self.catalog_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .catalog
            .lock()
            .unwrap()
            .get(&(schema.to_string(), table.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        self.executed.lock().unwrap().push(sql.to_string());
        if let Some(target) = self.export.lock().unwrap().as_ref() {
            let mut keys = Vec::new();
            for (suffix, size) in &target.shards {
                let key = format!("{}{}", target.prefix, suffix);
                target.staging.put(&target.bucket, &key, vec![b'x'; *size]);
                keys.push(key);
            }
            let keys = keys.iter().map(String::as_str).collect::<Vec<_>>();
            target.staging.put(
                &target.bucket,
                &format!("{}manifest", target.prefix),
                manifest_body(&target.bucket, &keys),
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Object stores
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryStaging {
    objects: Mutex<BTreeMap<(String, String), Vec<u8>>>,
    get_calls: AtomicUsize,
    list_calls: AtomicUsize,
    bulk_deletes: Mutex<Vec<(String, Vec<String>)>>,
}

impl InMemoryStaging {
    pub fn put(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), body);
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .lock()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Objects under `prefix` with their sizes
    pub fn snapshot(&self, bucket: &str, prefix: &str) -> Vec<ObjectInfo> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), body)| ObjectInfo::new(k.clone(), body.len() as u64))
            .collect()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn bulk_deletes(&self) -> Vec<(String, Vec<String>)> {
        self.bulk_deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl StagingStore for InMemoryStaging {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| BigShiftError::ObjectNotFound(format!("s3://{bucket}/{key}")))
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot(bucket, prefix))
    }

    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        self.bulk_deletes
            .lock()
            .unwrap()
            .push((bucket.to_string(), keys.to_vec()));
        let mut objects = self.objects.lock().unwrap();
        for key in keys {
            objects.remove(&(bucket.to_string(), key.clone()));
        }
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDestination {
    objects: Mutex<BTreeMap<(String, String), u64>>,
    deletes: Mutex<Vec<(String, String)>>,
    deletes_before_outage: Mutex<Option<usize>>,
}

impl InMemoryDestination {
    pub fn put(&self, bucket: &str, key: &str, size: u64) {
        self.objects
            .lock()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), size);
    }

    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn deletes(&self) -> Vec<(String, String)> {
        self.deletes.lock().unwrap().clone()
    }

    /// Let `count` more deletes through, then fail every delete with a 503
    /// until `restore` is called
    pub fn fail_deletes_after(&self, count: usize) {
        *self.deletes_before_outage.lock().unwrap() = Some(count);
    }

    pub fn restore(&self) {
        *self.deletes_before_outage.lock().unwrap() = None;
    }
}

#[async_trait]
impl DestinationStore for InMemoryDestination {
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((b, k), _)| b == bucket && k.starts_with(prefix))
            .map(|((_, k), size)| ObjectInfo::new(k.clone(), *size))
            .collect())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        if let Some(remaining) = self.deletes_before_outage.lock().unwrap().as_mut() {
            if *remaining == 0 {
                return Err(BigShiftError::api("storage", Some(503), "backend unavailable"));
            }
            *remaining -= 1;
        }
        self.deletes
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string()));
        self.objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Transfer service
// ---------------------------------------------------------------------------

/// Replays queued lookup results; once the queue is empty every lookup
/// reports a finished, successful operation. With stores attached, creating
/// a job copies the selected objects like the real service would.
#[derive(Default)]
pub struct ScriptedTransferService {
    created: Mutex<Vec<TransferJobSpec>>,
    lookups: Mutex<VecDeque<Result<Vec<TransferOperation>>>>,
    lookup_calls: AtomicUsize,
    stores: Mutex<Option<(Arc<InMemoryStaging>, Arc<InMemoryDestination>)>>,
}

impl ScriptedTransferService {
    pub fn with_lookups(self, lookups: Vec<Result<Vec<TransferOperation>>>) -> Self {
        *self.lookups.lock().unwrap() = lookups.into();
        self
    }

    pub fn copying_between(self, staging: Arc<InMemoryStaging>, destination: Arc<InMemoryDestination>) -> Self {
        *self.stores.lock().unwrap() = Some((staging, destination));
        self
    }

    pub fn created(&self) -> Vec<TransferJobSpec> {
        self.created.lock().unwrap().clone()
    }

    pub fn lookup_calls(&self) -> usize {
        self.lookup_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferService for ScriptedTransferService {
    async fn create_transfer_job(&self, spec: &TransferJobSpec) -> Result<TransferJobHandle> {
        self.created.lock().unwrap().push(spec.clone());

        if let Some((staging, destination)) = self.stores.lock().unwrap().as_ref() {
            let source = &spec.transfer_spec.aws_s3_data_source.bucket_name;
            let sink = &spec.transfer_spec.gcs_data_sink.bucket_name;
            let conditions = &spec.transfer_spec.object_conditions;
            for prefix in &conditions.include_prefixes {
                for object in staging.snapshot(source, prefix) {
                    if conditions
                        .exclude_prefixes
                        .iter()
                        .any(|excluded| object.key.starts_with(excluded.as_str()))
                    {
                        continue;
                    }
                    destination.put(sink, &object.key, object.size);
                }
            }
        }

        Ok(TransferJobHandle {
            name: "transferJobs/123".to_string(),
            description: spec.description.clone(),
        })
    }

    async fn list_transfer_operations(
        &self,
        _project_id: &str,
        job_name: &str,
    ) -> Result<Vec<TransferOperation>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        self.lookups.lock().unwrap().pop_front().unwrap_or_else(|| {
            Ok(vec![TransferOperation::with_status(
                format!("transferOperations/{}", job_name.trim_start_matches("transferJobs/")),
                STATUS_SUCCESS,
                true,
            )])
        })
    }
}

// ---------------------------------------------------------------------------
// Destination warehouse
// ---------------------------------------------------------------------------

/// Scripted load job state, replayed one lookup at a time
#[derive(Debug, Clone)]
pub enum JobStep {
    Pending(Option<&'static str>),
    Succeeded(LoadJobStatistics),
    Failed(ErrorProto, Vec<ErrorProto>),
    Unavailable,
}

pub fn error_proto(message: &str, location: Option<&str>) -> ErrorProto {
    ErrorProto {
        reason: Some("invalid".to_string()),
        location: location.map(str::to_string),
        message: Some(message.to_string()),
    }
}

#[derive(Default)]
pub struct ScriptedWarehouse {
    tables: Mutex<BTreeMap<String, TableInfo>>,
    created: Mutex<Vec<(TableReference, Option<DestinationSchema>)>>,
    inserted: Mutex<Vec<LoadJobSpec>>,
    steps: Mutex<VecDeque<JobStep>>,
    get_job_calls: AtomicUsize,
}

fn table_key(table: &TableReference) -> String {
    format!("{}:{}.{}", table.project_id, table.dataset_id, table.table_id)
}

impl ScriptedWarehouse {
    pub fn with_table(self, table: &TableReference) -> Self {
        self.tables
            .lock()
            .unwrap()
            .insert(table_key(table), TableInfo::new(table.clone()));
        self
    }

    pub fn with_steps(self, steps: Vec<JobStep>) -> Self {
        *self.steps.lock().unwrap() = steps.into();
        self
    }

    pub fn created(&self) -> Vec<(TableReference, Option<DestinationSchema>)> {
        self.created.lock().unwrap().clone()
    }

    pub fn inserted(&self) -> Vec<LoadJobSpec> {
        self.inserted.lock().unwrap().clone()
    }

    pub fn get_job_calls(&self) -> usize {
        self.get_job_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WarehouseClient for ScriptedWarehouse {
    async fn get_table(&self, table: &TableReference) -> Result<Option<TableInfo>> {
        Ok(self.tables.lock().unwrap().get(&table_key(table)).cloned())
    }

    async fn create_table(
        &self,
        table: &TableReference,
        schema: Option<&DestinationSchema>,
    ) -> Result<TableInfo> {
        self.created
            .lock()
            .unwrap()
            .push((table.clone(), schema.cloned()));
        let info = TableInfo::new(table.clone());
        self.tables
            .lock()
            .unwrap()
            .insert(table_key(table), info.clone());
        Ok(info)
    }

    async fn insert_job(&self, spec: &LoadJobSpec) -> Result<LoadJob> {
        self.inserted.lock().unwrap().push(spec.clone());
        Ok(LoadJob {
            job_reference: spec.job_reference.clone(),
            status: Some(JobStatus {
                state: Some("PENDING".to_string()),
                ..JobStatus::default()
            }),
            statistics: None,
        })
    }

    async fn get_job(&self, job: &JobReference) -> Result<LoadJob> {
        self.get_job_calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(JobStep::Succeeded(LoadJobStatistics::default()));

        let (status, statistics) = match step {
            JobStep::Unavailable => {
                return Err(BigShiftError::api("bigquery", Some(503), "backend error"));
            },
            JobStep::Pending(state) => (
                JobStatus {
                    state: state.map(str::to_string),
                    ..JobStatus::default()
                },
                None,
            ),
            JobStep::Succeeded(load) => (
                JobStatus {
                    state: Some("DONE".to_string()),
                    ..JobStatus::default()
                },
                Some(JobStatistics { load: Some(load) }),
            ),
            JobStep::Failed(error_result, errors) => (
                JobStatus {
                    state: Some("DONE".to_string()),
                    error_result: Some(error_result),
                    errors,
                },
                None,
            ),
        };

        Ok(LoadJob {
            job_reference: job.clone(),
            status: Some(status),
            statistics,
        })
    }
}
