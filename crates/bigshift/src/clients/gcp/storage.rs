//! Cloud Storage JSON API v1

use async_trait::async_trait;
use bigshift_common::Result;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{is_not_found, AccessTokenProvider, GcpHttp};
use crate::clients::{DestinationStore, ObjectInfo};

pub const DEFAULT_BASE_URL: &str = "https://storage.googleapis.com/storage/v1";

#[derive(Debug, Deserialize)]
struct StorageObject {
    name: String,
    #[serde(default, deserialize_with = "crate::wire::opt_u64::deserialize")]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsResponse {
    #[serde(default)]
    items: Vec<StorageObject>,
    #[serde(default)]
    next_page_token: Option<String>,
}

pub struct CloudStorageClient {
    http: GcpHttp,
}

impl CloudStorageClient {
    pub fn new(tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, tokens)
    }

    pub fn with_base_url(base_url: impl Into<String>, tokens: Arc<dyn AccessTokenProvider>) -> Result<Self> {
        Ok(Self {
            http: GcpHttp::new("storage", base_url, tokens)?,
        })
    }

    fn objects_url(&self, bucket: &str) -> String {
        self.http
            .url(&format!("/b/{}/o", urlencoding::encode(bucket)))
    }
}

#[async_trait]
impl DestinationStore for CloudStorageClient {
    #[instrument(skip(self))]
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .client()
                .get(self.objects_url(bucket))
                .query(&[("prefix", prefix), ("fields", "items(name,size),nextPageToken")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response: ListObjectsResponse = self.http.send_json(request).await?;
            objects.extend(
                response
                    .items
                    .into_iter()
                    .map(|item| ObjectInfo::new(item.name, item.size.unwrap_or(0))),
            );

            match response.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} objects under gs://{}/{}", objects.len(), bucket, prefix);
        Ok(objects)
    }

    #[instrument(skip(self))]
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let url = format!("{}/{}", self.objects_url(bucket), urlencoding::encode(key));
        match self.http.send(self.http.client().delete(url)).await {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => {
                debug!("gs://{}/{} already deleted", bucket, key);
                Ok(())
            },
            Err(err) => Err(err),
        }
    }
}
