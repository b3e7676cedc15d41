//! Google Cloud REST clients
//!
//! Storage Transfer, Cloud Storage and BigQuery are called over their JSON
//! APIs with a bearer token from an [`AccessTokenProvider`]. Base URLs are
//! configurable so the clients can be pointed at a mock server.

pub mod bigquery;
pub mod storage;
pub mod transfer;

pub use bigquery::BigQueryClient;
pub use storage::CloudStorageClient;
pub use transfer::StorageTransferClient;

use async_trait::async_trait;
use bigshift_common::{BigShiftError, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use yup_oauth2::authenticator::DefaultAuthenticator;
use yup_oauth2::{ServiceAccountAuthenticator, ServiceAccountKey};

/// Default timeout for API requests in seconds.
pub const DEFAULT_API_TIMEOUT_SECS: u64 = 120;

/// OAuth scope covering every API the pipeline calls.
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Source of OAuth bearer tokens
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Pre-issued token, e.g. from `gcloud auth print-access-token`
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Tokens minted from a service account key, cached and refreshed by
/// `yup-oauth2`
pub struct ServiceAccountTokens {
    authenticator: DefaultAuthenticator,
}

impl ServiceAccountTokens {
    pub async fn from_key(key: ServiceAccountKey) -> Result<Self> {
        let authenticator = ServiceAccountAuthenticator::builder(key)
            .build()
            .await
            .map_err(|e| BigShiftError::Config(format!("Invalid GCP service account key: {e}")))?;
        Ok(Self { authenticator })
    }
}

#[async_trait]
impl AccessTokenProvider for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String> {
        let token = self
            .authenticator
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| BigShiftError::api("oauth2", None, e.to_string()))?;
        token
            .token()
            .map(str::to_string)
            .ok_or_else(|| BigShiftError::api("oauth2", None, "no access token issued"))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// Whether an error is an HTTP 404 from a vendor API
pub fn is_not_found(err: &BigShiftError) -> bool {
    matches!(err, BigShiftError::Api { status: Some(404), .. })
}

/// Authenticated JSON transport shared by the individual API clients
#[derive(Clone)]
pub(crate) struct GcpHttp {
    service: &'static str,
    client: Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
}

impl GcpHttp {
    pub(crate) fn new(
        service: &'static str,
        base_url: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_API_TIMEOUT_SECS))
            .build()
            .map_err(|e| BigShiftError::api(service, None, e.to_string()))?;
        Ok(Self {
            service,
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    pub(crate) fn client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send with a bearer token; non-2xx responses become `Api` errors
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let token = self.tokens.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BigShiftError::api(self.service, None, e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .ok()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            });
        Err(BigShiftError::api(self.service, Some(status.as_u16()), message))
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.send(request).await?;
        let status = response.status().as_u16();
        response.json().await.map_err(|e| {
            BigShiftError::api(self.service, Some(status), format!("invalid response body: {e}"))
        })
    }
}
