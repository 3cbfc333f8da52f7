use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `AuthMethod` values.
pub enum AuthMethod {
    Social,
    Idc,
}

impl AuthMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMethod::Social => "social",
            AuthMethod::Idc => "idc",
        }
    }
}

/// Fields submitted to the registry when creating a credential.
#[derive(Clone, PartialEq, Eq)]
pub struct NewCredential {
    pub refresh_token: String,
    pub auth_method: AuthMethod,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub priority: u32,
    pub region: Option<String>,
    pub auth_region: Option<String>,
    pub api_region: Option<String>,
    pub machine_id: Option<String>,
    pub email: Option<String>,
}

impl fmt::Debug for NewCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewCredential")
            .field("refresh_token", &"[REDACTED]")
            .field("auth_method", &self.auth_method)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("priority", &self.priority)
            .field("region", &self.region)
            .field("auth_region", &self.auth_region)
            .field("api_region", &self.api_region)
            .field("machine_id", &self.machine_id)
            .field("email", &self.email)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `CreatedCredential` returned by a successful create call.
pub struct CreatedCredential {
    pub remote_id: u64,
    pub identity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Usage snapshot fetched to confirm a credential is live and readable.
pub struct UsageSnapshot {
    pub current_usage: f64,
    pub usage_limit: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_reset_at: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A credential already present in the registry.
pub struct RegisteredCredential {
    pub remote_id: u64,
    pub content_hash: Option<String>,
    pub identity: Option<String>,
    pub disabled: bool,
}

#[derive(Debug, Error)]
/// Enumerates supported `RegistryError` values.
pub enum RegistryError {
    #[error("invalid registry client configuration: {0}")]
    InvalidConfig(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("registry returned non-success status {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("registry rejected the request: {0}")]
    Rejected(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl RegistryError {
    /// Returns true when the registry reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::HttpStatus { status: 404, .. })
    }
}

#[async_trait]
/// Trait contract for the remote credential registry.
pub trait CredentialRegistry: Send + Sync {
    async fn list_credentials(&self) -> Result<Vec<RegisteredCredential>, RegistryError>;

    async fn create_credential(
        &self,
        credential: NewCredential,
    ) -> Result<CreatedCredential, RegistryError>;

    async fn fetch_balance(&self, remote_id: u64) -> Result<UsageSnapshot, RegistryError>;

    async fn set_disabled(&self, remote_id: u64, disabled: bool) -> Result<(), RegistryError>;

    async fn delete_credential(&self, remote_id: u64) -> Result<(), RegistryError>;
}
