use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use intake_registry::{
    AuthMethod, CreatedCredential, CredentialRegistry, NewCredential, RegisteredCredential,
    RegistryError, UsageSnapshot,
};
use tokio::time::Instant;

use crate::pipeline::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RegistryCall {
    List,
    Create {
        refresh_token: String,
        auth_method: AuthMethod,
    },
    Balance(u64),
    SetDisabled(u64, bool),
    Delete(u64),
}

#[derive(Default)]
struct ScriptedState {
    listed: Vec<RegisteredCredential>,
    list_error: Option<RegistryError>,
    creates: VecDeque<Result<CreatedCredential, RegistryError>>,
    balances: VecDeque<Result<UsageSnapshot, RegistryError>>,
    disables: VecDeque<Result<(), RegistryError>>,
    deletes: VecDeque<Result<(), RegistryError>>,
    next_remote_id: u64,
    cancel_on_create: Option<CancellationToken>,
    calls: Vec<(RegistryCall, Instant)>,
}

impl ScriptedState {
    fn record(&mut self, call: RegistryCall) {
        self.calls.push((call, Instant::now()));
    }
}

/// In-memory registry that records calls and replays scripted results.
///
/// Unscripted calls succeed: creates hand out sequential ids starting at 100.
#[derive(Clone, Default)]
pub(crate) struct ScriptedRegistry {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
        self.state.lock().expect("scripted registry lock")
    }

    pub(crate) fn with_listed(self, listed: Vec<RegisteredCredential>) -> Self {
        self.lock().listed = listed;
        self
    }

    pub(crate) fn fail_list(&self, error: RegistryError) {
        self.lock().list_error = Some(error);
    }

    pub(crate) fn push_create(&self, result: Result<CreatedCredential, RegistryError>) {
        self.lock().creates.push_back(result);
    }

    pub(crate) fn push_balance(&self, result: Result<UsageSnapshot, RegistryError>) {
        self.lock().balances.push_back(result);
    }

    pub(crate) fn push_disable(&self, result: Result<(), RegistryError>) {
        self.lock().disables.push_back(result);
    }

    pub(crate) fn push_delete(&self, result: Result<(), RegistryError>) {
        self.lock().deletes.push_back(result);
    }

    /// Trips `token` from inside the next create call.
    pub(crate) fn cancel_on_create(&self, token: CancellationToken) {
        self.lock().cancel_on_create = Some(token);
    }

    pub(crate) fn calls(&self) -> Vec<RegistryCall> {
        self.lock()
            .calls
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    /// Calls paired with the tokio clock reading taken when each was issued.
    pub(crate) fn timeline(&self) -> Vec<(RegistryCall, Instant)> {
        self.lock().calls.clone()
    }

    pub(crate) fn create_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|(call, _)| matches!(call, RegistryCall::Create { .. }))
            .count()
    }
}

pub(crate) fn usage(current: f64, limit: f64) -> UsageSnapshot {
    UsageSnapshot {
        current_usage: current,
        usage_limit: limit,
        subscription_title: None,
        remaining: Some(limit - current),
        next_reset_at: None,
    }
}

pub(crate) fn status_error(status: u16, message: &str) -> RegistryError {
    RegistryError::HttpStatus {
        status,
        message: message.to_string(),
    }
}

#[async_trait]
impl CredentialRegistry for ScriptedRegistry {
    async fn list_credentials(&self) -> Result<Vec<RegisteredCredential>, RegistryError> {
        let mut state = self.lock();
        state.record(RegistryCall::List);
        if let Some(error) = state.list_error.take() {
            return Err(error);
        }
        Ok(state.listed.clone())
    }

    async fn create_credential(
        &self,
        credential: NewCredential,
    ) -> Result<CreatedCredential, RegistryError> {
        let mut state = self.lock();
        state.record(RegistryCall::Create {
            refresh_token: credential.refresh_token.clone(),
            auth_method: credential.auth_method,
        });
        if let Some(token) = state.cancel_on_create.take() {
            token.cancel();
        }
        if let Some(result) = state.creates.pop_front() {
            return result;
        }
        let remote_id = 100 + state.next_remote_id;
        state.next_remote_id += 1;
        Ok(CreatedCredential {
            remote_id,
            identity: None,
        })
    }

    async fn fetch_balance(&self, remote_id: u64) -> Result<UsageSnapshot, RegistryError> {
        let mut state = self.lock();
        state.record(RegistryCall::Balance(remote_id));
        state
            .balances
            .pop_front()
            .unwrap_or_else(|| Ok(usage(0.0, 500.0)))
    }

    async fn set_disabled(&self, remote_id: u64, disabled: bool) -> Result<(), RegistryError> {
        let mut state = self.lock();
        state.record(RegistryCall::SetDisabled(remote_id, disabled));
        state.disables.pop_front().unwrap_or(Ok(()))
    }

    async fn delete_credential(&self, remote_id: u64) -> Result<(), RegistryError> {
        let mut state = self.lock();
        state.record(RegistryCall::Delete(remote_id));
        state.deletes.pop_front().unwrap_or(Ok(()))
    }
}
