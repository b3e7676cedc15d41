use bigshift_common::Result;
use std::sync::Arc;
use tracing::info;

use crate::clients::DestinationStore;
use crate::manifest::TransferManifest;

/// Byte-exact check of the destination-adjacent bucket after a copy
pub struct TransferValidator {
    destination: Arc<dyn DestinationStore>,
}

impl TransferValidator {
    pub fn new(destination: Arc<dyn DestinationStore>) -> Self {
        Self { destination }
    }

    pub async fn validate(&self, manifest: &TransferManifest, destination_bucket: &str) -> Result<()> {
        manifest
            .validate_transfer(self.destination.as_ref(), destination_bucket)
            .await?;
        info!("Transfer validated, all file sizes match");
        Ok(())
    }
}
