//! Removal of staging and destination-adjacent artifacts after a successful
//! run
//!
//! Destination keys go first and the staging bulk delete, which includes the
//! manifest, goes last. Both stores treat already-deleted keys as success and
//! a missing manifest means a previous cleanup finished, so cleanup can be run
//! again after a partial failure.

use bigshift_common::{BigShiftError, Result};
use std::sync::Arc;
use tracing::info;

use crate::clients::{DestinationStore, StagingStore};
use crate::manifest::TransferManifest;

pub struct Cleaner {
    staging: Arc<dyn StagingStore>,
    destination: Arc<dyn DestinationStore>,
}

impl Cleaner {
    pub fn new(staging: Arc<dyn StagingStore>, destination: Arc<dyn DestinationStore>) -> Self {
        Self {
            staging,
            destination,
        }
    }

    pub async fn cleanup(&self, manifest: &TransferManifest, destination_bucket: &str) -> Result<()> {
        let keys = match manifest.keys().await {
            Ok(keys) => keys,
            Err(BigShiftError::ObjectNotFound(url)) => {
                info!("Manifest {} is gone, nothing left to clean up", url);
                return Ok(());
            },
            Err(err) => return Err(err),
        };
        self.cleanup_destination(manifest, keys, destination_bucket)
            .await?;
        self.cleanup_staging(manifest, keys).await
    }

    async fn cleanup_destination(
        &self,
        manifest: &TransferManifest,
        keys: &[String],
        destination_bucket: &str,
    ) -> Result<()> {
        info!(
            "Deleting {} files from gs://{}/{}",
            keys.len(),
            destination_bucket,
            manifest.prefix()
        );
        for key in keys {
            self.destination
                .delete_object(destination_bucket, key)
                .await?;
        }
        Ok(())
    }

    /// One bulk call covering every shard plus the manifest itself
    async fn cleanup_staging(&self, manifest: &TransferManifest, keys: &[String]) -> Result<()> {
        let mut keys = keys.to_vec();
        keys.push(manifest.manifest_key().to_string());
        info!(
            "Deleting {} files from s3://{}/{} (including the manifest file)",
            keys.len(),
            manifest.bucket_name(),
            manifest.prefix()
        );
        self.staging
            .delete_objects(manifest.bucket_name(), &keys)
            .await
    }
}
