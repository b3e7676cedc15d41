//! Collaborator interfaces and their vendor implementations
//!
//! The pipeline only talks to the outside world through the traits below.
//! Production implementations live in the submodules; tests substitute
//! in-memory fakes.

pub mod gcp;
pub mod redshift;
pub mod s3;

use async_trait::async_trait;
use bigshift_common::Result;

use crate::load::{JobReference, LoadJob, LoadJobSpec, TableInfo, TableReference};
use crate::schema::DestinationSchema;
use crate::transfer::{TransferJobHandle, TransferJobSpec, TransferOperation};

/// One catalog row describing a source column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRow {
    pub column: String,
    pub data_type: String,
    pub not_null: bool,
}

/// Key and size of a stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
        }
    }
}

/// Source data warehouse connection
#[async_trait]
pub trait SourceWarehouse: Send + Sync {
    /// Catalog rows for `schema.table` in ordinal order; empty if the table
    /// does not exist
    async fn table_columns(&self, schema: &str, table: &str) -> Result<Vec<CatalogRow>>;

    /// Execute a statement, discarding any result rows
    async fn execute(&self, sql: &str) -> Result<()>;
}

/// Object store in the source cloud holding shards and the manifest
#[async_trait]
pub trait StagingStore: Send + Sync {
    /// Fails with `ObjectNotFound` when `key` does not exist
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Every object under `prefix`, across all listing pages
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Delete `keys` as one logical bulk operation; keys that are already
    /// gone are not an error
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()>;

    /// Delete one object; an object that is already gone is not an error
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}

/// Vendor-managed cross-cloud copy service
#[async_trait]
pub trait TransferService: Send + Sync {
    async fn create_transfer_job(&self, spec: &TransferJobSpec) -> Result<TransferJobHandle>;

    async fn list_transfer_operations(
        &self,
        project_id: &str,
        job_name: &str,
    ) -> Result<Vec<TransferOperation>>;
}

/// Object store next to the destination warehouse
#[async_trait]
pub trait DestinationStore: Send + Sync {
    /// Every object under `prefix`, across all listing pages
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Delete one object; an object that is already gone is not an error
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}

/// Destination analytical warehouse
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Table metadata, or `None` if the table does not exist
    async fn get_table(&self, table: &TableReference) -> Result<Option<TableInfo>>;

    async fn create_table(
        &self,
        table: &TableReference,
        schema: Option<&DestinationSchema>,
    ) -> Result<TableInfo>;

    async fn insert_job(&self, spec: &LoadJobSpec) -> Result<LoadJob>;

    async fn get_job(&self, job: &JobReference) -> Result<LoadJob>;
}
