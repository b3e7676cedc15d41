//! Staging store on Amazon S3

use async_trait::async_trait;
use aws_sdk_s3::{
    config::{Credentials, Region},
    error::DisplayErrorContext,
    types::{Delete, ObjectIdentifier},
    Client,
};
use bigshift_common::{BigShiftError, Result};
use tracing::{debug, instrument};

use super::{ObjectInfo, StagingStore};
use crate::credentials::StagingCredentials;

/// Maximum number of keys accepted by one `DeleteObjects` request
pub const DELETE_BATCH_SIZE: usize = 1000;

fn staging_error(action: &str, err: impl std::error::Error) -> BigShiftError {
    BigShiftError::Staging(format!("{action}: {}", DisplayErrorContext(err)))
}

#[derive(Clone)]
pub struct S3Staging {
    client: Client,
}

impl S3Staging {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Client authenticated with `credentials`; the region falls back to the
    /// environment when not given
    pub async fn connect(credentials: &StagingCredentials, region: Option<String>) -> Self {
        let mut loader = aws_config::from_env();
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .credentials_provider(Credentials::new(
                &credentials.access_key_id,
                &credentials.secret_access_key,
                credentials.session_token.clone(),
                None,
                "bigshift-staging",
            ))
            .build();

        Self::new(Client::from_conf(s3_config))
    }
}

#[async_trait]
impl StagingStore for S3Staging {
    #[instrument(skip(self))]
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        debug!("Downloading s3://{}/{}", bucket, key);

        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|err| err.is_no_such_key()) {
                    BigShiftError::ObjectNotFound(format!("s3://{bucket}/{key}"))
                } else {
                    staging_error(&format!("Failed to download s3://{bucket}/{key}"), e)
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| staging_error("Failed to read S3 response body", e))?
            .into_bytes()
            .to_vec();

        debug!("Downloaded {} bytes from s3://{}/{}", data.len(), bucket, key);
        Ok(data)
    }

    #[instrument(skip(self))]
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut continuation_token = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .prefix(prefix)
                .set_continuation_token(continuation_token.take())
                .send()
                .await
                .map_err(|e| staging_error(&format!("Failed to list s3://{bucket}/{prefix}"), e))?;

            objects.extend(response.contents().iter().filter_map(|object| {
                let key = object.key()?;
                let size = object.size().unwrap_or(0).max(0) as u64;
                Some(ObjectInfo::new(key, size))
            }));

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation_token = Some(token.to_string());
                },
                _ => break,
            }
        }

        debug!("Listed {} objects under s3://{}/{}", objects.len(), bucket, prefix);
        Ok(objects)
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn delete_objects(&self, bucket: &str, keys: &[String]) -> Result<()> {
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let identifiers = batch
                .iter()
                .map(|key| ObjectIdentifier::builder().key(key).build())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| staging_error("Invalid object key", e))?;
            let delete = Delete::builder()
                .set_objects(Some(identifiers))
                .quiet(true)
                .build()
                .map_err(|e| staging_error("Invalid delete request", e))?;

            let response = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| staging_error(&format!("Failed to delete from s3://{bucket}"), e))?;

            let failures = response
                .errors()
                .iter()
                .filter(|error| error.code() != Some("NoSuchKey"))
                .map(|error| {
                    format!(
                        "{} ({})",
                        error.key().unwrap_or("?"),
                        error.message().or(error.code()).unwrap_or("unknown error")
                    )
                })
                .collect::<Vec<_>>();
            if !failures.is_empty() {
                return Err(BigShiftError::Staging(format!(
                    "Failed to delete {} objects from s3://{}: {}",
                    failures.len(),
                    bucket,
                    failures.join(", ")
                )));
            }
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| staging_error(&format!("Failed to delete s3://{bucket}/{key}"), e))?;
        Ok(())
    }
}
