//! Export manifest and post-copy reconciliation
//!
//! The export writes `<prefix>manifest`, a JSON document listing every shard
//! by URL. [`TransferManifest`] resolves it to staging-relative keys, sizes
//! the shards from a staging listing, and later checks the destination-adjacent
//! listing against it byte for byte.

use bigshift_common::{BigShiftError, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::clients::{DestinationStore, ObjectInfo, StagingStore};

#[derive(Debug, Deserialize)]
struct ManifestDocument {
    entries: Vec<ManifestEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    url: String,
}

/// Strip `<scheme>://<bucket>/` from a shard URL
pub fn key_from_url(url: &str) -> Result<String> {
    let (_, rest) = url
        .split_once("://")
        .ok_or_else(|| BigShiftError::Manifest(format!("entry URL without scheme: {url:?}")))?;
    let (_, key) = rest
        .split_once('/')
        .ok_or_else(|| BigShiftError::Manifest(format!("entry URL without key: {url:?}")))?;
    Ok(key.to_string())
}

/// Parse a manifest body into staging-relative keys, preserving order
pub fn parse_manifest(body: &[u8]) -> Result<Vec<String>> {
    let document: ManifestDocument = serde_json::from_slice(body)?;
    document
        .entries
        .iter()
        .map(|entry| key_from_url(&entry.url))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeMismatch {
    pub key: String,
    pub actual: u64,
    pub expected: u64,
}

/// Differences between the manifest and a destination listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferDiscrepancies {
    /// Manifest keys absent from the destination, in manifest order
    pub missing: Vec<String>,
    /// Destination keys not in the manifest, sorted
    pub extra: Vec<String>,
    /// Keys present on both sides whose sizes differ, in manifest order
    pub mismatched: Vec<SizeMismatch>,
    /// Manifest keys with no staging size to compare against, in manifest
    /// order
    pub unstaged: Vec<String>,
}

impl TransferDiscrepancies {
    /// Compare manifest keys and their staging sizes against the destination
    /// listing
    pub fn reconcile(
        manifest_keys: &[String],
        expected_sizes: &BTreeMap<String, u64>,
        destination: &[ObjectInfo],
    ) -> Self {
        let actual_sizes: BTreeMap<&str, u64> = destination
            .iter()
            .map(|object| (object.key.as_str(), object.size))
            .collect();
        let manifest_set: HashSet<&str> = manifest_keys.iter().map(String::as_str).collect();

        let missing = manifest_keys
            .iter()
            .filter(|key| !actual_sizes.contains_key(key.as_str()))
            .cloned()
            .collect();

        let extra = actual_sizes
            .keys()
            .filter(|key| !manifest_set.contains(*key))
            .map(|key| key.to_string())
            .collect();

        let mut mismatched = Vec::new();
        let mut unstaged = Vec::new();
        for key in manifest_keys {
            let Some(&actual) = actual_sizes.get(key.as_str()) else {
                continue;
            };
            match expected_sizes.get(key) {
                Some(&expected) if expected != actual => mismatched.push(SizeMismatch {
                    key: key.clone(),
                    actual,
                    expected,
                }),
                Some(_) => {},
                None => unstaged.push(key.clone()),
            }
        }

        Self {
            missing,
            extra,
            mismatched,
            unstaged,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.missing.is_empty()
            && self.extra.is_empty()
            && self.mismatched.is_empty()
            && self.unstaged.is_empty()
    }
}

impl fmt::Display for TransferDiscrepancies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing files: {}", self.missing.join(", ")));
        }
        if !self.extra.is_empty() {
            parts.push(format!("extra files: {}", self.extra.join(", ")));
        }
        if !self.mismatched.is_empty() {
            let rendered = self
                .mismatched
                .iter()
                .map(|m| format!("{} ({} != {})", m.key, m.actual, m.expected))
                .collect::<Vec<_>>();
            parts.push(format!("size mismatches: {}", rendered.join(", ")));
        }
        if !self.unstaged.is_empty() {
            parts.push(format!("missing from staging: {}", self.unstaged.join(", ")));
        }
        f.write_str(&parts.join("; "))
    }
}

pub struct TransferManifest {
    staging: Arc<dyn StagingStore>,
    bucket_name: String,
    prefix: String,
    manifest_key: String,
    keys: OnceCell<Vec<String>>,
    file_sizes: OnceCell<BTreeMap<String, u64>>,
}

impl TransferManifest {
    pub fn new(
        staging: Arc<dyn StagingStore>,
        bucket_name: impl Into<String>,
        prefix: impl Into<String>,
    ) -> Self {
        let prefix = prefix.into();
        Self {
            staging,
            bucket_name: bucket_name.into(),
            manifest_key: format!("{prefix}manifest"),
            prefix,
            keys: OnceCell::new(),
            file_sizes: OnceCell::new(),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn manifest_key(&self) -> &str {
        &self.manifest_key
    }

    /// Shard keys listed in the manifest, fetched and parsed once
    pub async fn keys(&self) -> Result<&[String]> {
        let keys = self
            .keys
            .get_or_try_init(|| async {
                let body = self
                    .staging
                    .get_object(&self.bucket_name, &self.manifest_key)
                    .await?;
                parse_manifest(&body)
            })
            .await?;
        Ok(keys.as_slice())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    /// Sum of the staging sizes of every manifest key
    pub async fn total_file_size(&self) -> Result<u64> {
        Ok(self.file_sizes().await?.values().sum())
    }

    /// Staging sizes of manifest keys; other objects under the prefix are
    /// ignored
    async fn file_sizes(&self) -> Result<&BTreeMap<String, u64>> {
        self.file_sizes
            .get_or_try_init(|| async {
                let keys: HashSet<&str> = self.keys().await?.iter().map(String::as_str).collect();
                let objects = self
                    .staging
                    .list_objects(&self.bucket_name, &self.prefix)
                    .await?;
                Ok::<_, BigShiftError>(
                    objects
                        .into_iter()
                        .filter(|object| keys.contains(object.key.as_str()))
                        .map(|object| (object.key, object.size))
                        .collect(),
                )
            })
            .await
    }

    /// Compare the destination-adjacent bucket against the manifest.
    ///
    /// Fails with `TransferValidation` listing every missing, extra,
    /// size-mismatched and unstaged key.
    pub async fn validate_transfer(
        &self,
        destination: &dyn DestinationStore,
        destination_bucket: &str,
    ) -> Result<()> {
        let listing = destination
            .list_objects(destination_bucket, &self.prefix)
            .await?;
        let discrepancies =
            TransferDiscrepancies::reconcile(self.keys().await?, self.file_sizes().await?, &listing);

        if discrepancies.is_empty() {
            Ok(())
        } else {
            Err(BigShiftError::TransferValidation(discrepancies.to_string()))
        }
    }
}
