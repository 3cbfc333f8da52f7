//! HTTP client for the credential registry admin API.
//!
//! Every call is a single attempt: onboarding decides what a failure means
//! (rollback, skip, abort), so the client never retries on its own.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::types::{
    CreatedCredential, CredentialRegistry, NewCredential, RegisteredCredential, RegistryError,
    UsageSnapshot,
};

pub const DEFAULT_REGISTRY_URL: &str = "http://127.0.0.1:8990/api/admin";
const ERROR_BODY_PREVIEW_CHARS: usize = 240;

#[derive(Debug, Clone)]
/// Public struct `RegistryClientConfig` used by the intake binary and tests.
pub struct RegistryClientConfig {
    pub base_url: String,
    pub admin_token: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REGISTRY_URL.to_string(),
            admin_token: None,
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
/// Public struct `HttpRegistryClient` used across intake components.
pub struct HttpRegistryClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialListBody {
    #[serde(default)]
    credentials: Vec<CredentialStatusBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialStatusBody {
    id: u64,
    #[serde(default)]
    disabled: bool,
    #[serde(default)]
    refresh_token_hash: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddCredentialBody<'a> {
    refresh_token: &'a str,
    auth_method: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret: Option<&'a str>,
    priority: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    auth_region: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    api_region: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    machine_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

impl<'a> From<&'a NewCredential> for AddCredentialBody<'a> {
    fn from(value: &'a NewCredential) -> Self {
        Self {
            refresh_token: value.refresh_token.as_str(),
            auth_method: value.auth_method.as_str(),
            client_id: value.client_id.as_deref(),
            client_secret: value.client_secret.as_deref(),
            priority: value.priority,
            region: value.region.as_deref(),
            auth_region: value.auth_region.as_deref(),
            api_region: value.api_region.as_deref(),
            machine_id: value.machine_id.as_deref(),
            email: value.email.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddCredentialResponseBody {
    success: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    credential_id: Option<u64>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceBody {
    current_usage: f64,
    usage_limit: f64,
    #[serde(default)]
    subscription_title: Option<String>,
    #[serde(default)]
    remaining: Option<f64>,
    #[serde(default)]
    next_reset_at: Option<f64>,
}

#[derive(Debug, Serialize)]
struct SetDisabledBody {
    disabled: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    message: String,
}

impl HttpRegistryClient {
    pub fn new(config: RegistryClientConfig) -> Result<Self, RegistryError> {
        let base_url = config.base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(RegistryError::InvalidConfig(
                "registry base url must not be empty".to_string(),
            ));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(RegistryError::InvalidConfig(format!(
                "registry base url '{base_url}' must use http or https"
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = config
            .admin_token
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            let bearer = format!("Bearer {token}");
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&bearer).map_err(|e| {
                    RegistryError::InvalidConfig(format!("invalid admin token header: {e}"))
                })?,
            );
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(token).map_err(|e| {
                    RegistryError::InvalidConfig(format!("invalid admin token header: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl CredentialRegistry for HttpRegistryClient {
    async fn list_credentials(&self) -> Result<Vec<RegisteredCredential>, RegistryError> {
        let response = self.client.get(self.url("credentials")).send().await?;
        let body = read_success_body(response).await?;
        let parsed = serde_json::from_str::<CredentialListBody>(&body)?;
        tracing::debug!(
            registry = %self.base_url,
            credentials = parsed.credentials.len(),
            "listed registry credentials"
        );
        Ok(parsed
            .credentials
            .into_iter()
            .map(|entry| RegisteredCredential {
                remote_id: entry.id,
                content_hash: entry
                    .refresh_token_hash
                    .map(|hash| hash.trim().to_ascii_lowercase())
                    .filter(|hash| !hash.is_empty()),
                identity: entry.email.filter(|email| !email.trim().is_empty()),
                disabled: entry.disabled,
            })
            .collect())
    }

    async fn create_credential(
        &self,
        credential: NewCredential,
    ) -> Result<CreatedCredential, RegistryError> {
        let response = self
            .client
            .post(self.url("credentials"))
            .json(&AddCredentialBody::from(&credential))
            .send()
            .await?;
        let body = read_success_body(response).await?;
        let parsed = serde_json::from_str::<AddCredentialResponseBody>(&body)?;
        if !parsed.success {
            let message = if parsed.message.trim().is_empty() {
                "create call reported success=false".to_string()
            } else {
                parsed.message
            };
            return Err(RegistryError::Rejected(message));
        }
        let Some(remote_id) = parsed.credential_id else {
            return Err(RegistryError::InvalidResponse(
                "create response is missing credentialId".to_string(),
            ));
        };
        Ok(CreatedCredential {
            remote_id,
            identity: parsed.email.filter(|email| !email.trim().is_empty()),
        })
    }

    async fn fetch_balance(&self, remote_id: u64) -> Result<UsageSnapshot, RegistryError> {
        let response = self
            .client
            .get(self.url(&format!("credentials/{remote_id}/balance")))
            .send()
            .await?;
        let body = read_success_body(response).await?;
        let parsed = serde_json::from_str::<BalanceBody>(&body)?;
        Ok(UsageSnapshot {
            current_usage: parsed.current_usage,
            usage_limit: parsed.usage_limit,
            subscription_title: parsed.subscription_title,
            remaining: parsed.remaining,
            next_reset_at: parsed.next_reset_at,
        })
    }

    async fn set_disabled(&self, remote_id: u64, disabled: bool) -> Result<(), RegistryError> {
        let response = self
            .client
            .post(self.url(&format!("credentials/{remote_id}/disabled")))
            .json(&SetDisabledBody { disabled })
            .send()
            .await?;
        read_success_body(response).await.map(|_| ())
    }

    async fn delete_credential(&self, remote_id: u64) -> Result<(), RegistryError> {
        let response = self
            .client
            .delete(self.url(&format!("credentials/{remote_id}")))
            .send()
            .await?;
        read_success_body(response).await.map(|_| ())
    }
}

async fn read_success_body(response: reqwest::Response) -> Result<String, RegistryError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    Err(RegistryError::HttpStatus {
        status: status.as_u16(),
        message: registry_error_message(&body),
    })
}

fn registry_error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(body) {
        return match envelope.error.kind {
            Some(kind) if !kind.trim().is_empty() => {
                format!("{kind}: {}", envelope.error.message)
            }
            _ => envelope.error.message,
        };
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }
    trimmed.chars().take(ERROR_BODY_PREVIEW_CHARS).collect()
}
