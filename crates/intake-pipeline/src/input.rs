//! Normalized credential input records and their per-item validation.

use std::fmt;

use intake_registry::{AuthMethod, NewCredential};
use thiserror::Error;

const HEALTHY_EXTERNAL_STATUSES: [&str; 5] = ["active", "normal", "valid", "ok", "healthy"];

/// Secret string wrapper whose formatting never reveals the value.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into().trim().to_string())
    }

    /// Returns the plaintext for explicit use sites (hashing, create calls).
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// One credential to onboard, independent of the wire shape it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialInput {
    pub token: SecretToken,
    pub client_id: Option<String>,
    pub client_secret: Option<SecretToken>,
    pub region: Option<String>,
    pub auth_region: Option<String>,
    pub api_region: Option<String>,
    pub priority: Option<u32>,
    pub machine_id: Option<String>,
    /// Identity hint supplied by the input, forwarded to the registry.
    pub email: Option<String>,
    /// Status reported by the exporting tool; only the envelope shape sets it.
    pub external_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Enumerates supported `ValidationError` values.
pub enum ValidationError {
    #[error("credential token is missing or empty")]
    MissingToken,
    #[error("{present} was supplied without {missing}; provide both or neither")]
    UnpairedClientCredential {
        present: &'static str,
        missing: &'static str,
    },
}

impl CredentialInput {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretToken::new(token),
            ..Self::default()
        }
    }

    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(SecretToken::new(client_secret));
        self
    }

    /// True when the exporting tool marked this credential as unusable.
    pub fn is_flagged_bad(&self) -> bool {
        let Some(status) = self
            .external_status
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            return false;
        };
        !HEALTHY_EXTERNAL_STATUSES
            .iter()
            .any(|healthy| status.eq_ignore_ascii_case(healthy))
    }

    /// Checks token presence and client pairing, returning the auth method the
    /// pairing selects.
    pub fn validate(&self) -> Result<AuthMethod, ValidationError> {
        if self.token.is_empty() {
            return Err(ValidationError::MissingToken);
        }
        let has_client_id = self
            .client_id
            .as_deref()
            .is_some_and(|value| !value.trim().is_empty());
        let has_client_secret = self
            .client_secret
            .as_ref()
            .is_some_and(|value| !value.is_empty());
        match (has_client_id, has_client_secret) {
            (true, true) => Ok(AuthMethod::Idc),
            (false, false) => Ok(AuthMethod::Social),
            (true, false) => Err(ValidationError::UnpairedClientCredential {
                present: "clientId",
                missing: "clientSecret",
            }),
            (false, true) => Err(ValidationError::UnpairedClientCredential {
                present: "clientSecret",
                missing: "clientId",
            }),
        }
    }

    pub(crate) fn to_new_credential(&self, auth_method: AuthMethod) -> NewCredential {
        let (client_id, client_secret) = match auth_method {
            AuthMethod::Idc => (
                self.client_id.clone(),
                self.client_secret
                    .as_ref()
                    .map(|secret| secret.expose().to_string()),
            ),
            AuthMethod::Social => (None, None),
        };
        NewCredential {
            refresh_token: self.token.expose().to_string(),
            auth_method,
            client_id,
            client_secret,
            priority: self.priority.unwrap_or(0),
            region: self.region.clone(),
            auth_region: self.auth_region.clone(),
            api_region: self.api_region.clone(),
            machine_id: self.machine_id.clone(),
            email: self.email.clone(),
        }
    }
}
