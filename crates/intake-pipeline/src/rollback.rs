//! Compensating rollback for credentials created but not verified.
//!
//! Rollback is disable-then-delete, attempted once. Delete runs only after a
//! successful disable. Failures are captured as an outcome for the operator to
//! remediate; they are never raised back into the pipeline.

use std::sync::Arc;

use intake_registry::{CredentialRegistry, RegistryError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `RollbackStage` values.
pub enum RollbackStage {
    Disable,
    Delete,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
/// Enumerates supported `RollbackOutcome` values.
pub enum RollbackOutcome {
    Success,
    Failed { stage: RollbackStage, error: String },
    /// No remote resource existed, so there was nothing to undo.
    Skipped,
}

impl RollbackOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RollbackOutcome::Success => "success",
            RollbackOutcome::Failed { .. } => "failed",
            RollbackOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Error)]
/// Enumerates supported `RollbackError` values.
pub enum RollbackError {
    #[error("failed to disable credential {remote_id}: {source}")]
    Disable {
        remote_id: u64,
        source: RegistryError,
    },
    #[error("credential {remote_id} was disabled but could not be deleted: {source}")]
    Delete {
        remote_id: u64,
        source: RegistryError,
    },
}

impl RollbackError {
    pub fn stage(&self) -> RollbackStage {
        match self {
            RollbackError::Disable { .. } => RollbackStage::Disable,
            RollbackError::Delete { .. } => RollbackStage::Delete,
        }
    }
}

#[derive(Clone)]
/// Public struct `RollbackCoordinator` used by the onboarding pipeline.
pub struct RollbackCoordinator {
    registry: Arc<dyn CredentialRegistry>,
}

impl RollbackCoordinator {
    pub fn new(registry: Arc<dyn CredentialRegistry>) -> Self {
        Self { registry }
    }

    /// Disables then deletes `remote_id`, stopping at the first failure.
    pub async fn try_rollback(&self, remote_id: u64) -> Result<(), RollbackError> {
        self.registry
            .set_disabled(remote_id, true)
            .await
            .map_err(|source| RollbackError::Disable { remote_id, source })?;
        self.registry
            .delete_credential(remote_id)
            .await
            .map_err(|source| RollbackError::Delete { remote_id, source })?;
        Ok(())
    }

    pub async fn rollback(&self, remote_id: u64) -> RollbackOutcome {
        match self.try_rollback(remote_id).await {
            Ok(()) => {
                tracing::info!(remote_id, "rolled back unverified credential");
                RollbackOutcome::Success
            }
            Err(error) => {
                tracing::warn!(
                    remote_id,
                    stage = ?error.stage(),
                    error = %error,
                    "rollback failed; credential needs manual remediation"
                );
                RollbackOutcome::Failed {
                    stage: error.stage(),
                    error: error.to_string(),
                }
            }
        }
    }
}
