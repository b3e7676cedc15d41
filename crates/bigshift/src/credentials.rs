//! Staging-store credentials handed to the export statement and the
//! cross-cloud copy job

use aws_credential_types::provider::ProvideCredentials;
use bigshift_common::{BigShiftError, Result};
use serde::Deserialize;
use std::fmt;

/// Default Redshift port.
pub const DEFAULT_SOURCE_PORT: u16 = 5439;

fn default_source_port() -> u16 {
    DEFAULT_SOURCE_PORT
}

/// Source warehouse login, as stored in the credentials file
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SourceCredentials {
    pub host: String,
    #[serde(default = "default_source_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for SourceCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Staging access keys file; every field is optional so a file holding only
/// a region is accepted
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StagingCredentialsFile {
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default)]
    pub session_token: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl StagingCredentialsFile {
    /// Explicit keys if both halves are present
    pub fn credentials(&self) -> Option<StagingCredentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => Some(StagingCredentials::new(
                id.clone(),
                secret.clone(),
                self.session_token.clone(),
            )),
            _ => None,
        }
    }
}

impl fmt::Debug for StagingCredentialsFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingCredentialsFile")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct StagingCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl StagingCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Resolve credentials from the AWS default provider chain
    /// (environment, profile, instance metadata, ...)
    pub async fn from_default_chain(region: Option<String>) -> Result<Self> {
        let mut loader = aws_config::from_env();
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let sdk_config = loader.load().await;
        let provider = sdk_config
            .credentials_provider()
            .ok_or_else(|| BigShiftError::Config("No AWS credentials found".to_string()))?;
        let credentials = provider
            .provide_credentials()
            .await
            .map_err(|e| BigShiftError::Config(format!("No AWS credentials found: {e}")))?;

        Ok(Self::new(
            credentials.access_key_id(),
            credentials.secret_access_key(),
            credentials.session_token().map(str::to_string),
        ))
    }

    /// Credential string in the form the `UNLOAD ... CREDENTIALS` clause takes
    pub fn to_unload_credentials(&self) -> String {
        let mut value = format!(
            "aws_access_key_id={};aws_secret_access_key={}",
            self.access_key_id, self.secret_access_key
        );
        if let Some(token) = &self.session_token {
            value.push_str(";token=");
            value.push_str(token);
        }
        value
    }
}

impl fmt::Debug for StagingCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StagingCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
