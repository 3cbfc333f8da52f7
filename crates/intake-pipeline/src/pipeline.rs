//! Sequential onboarding orchestrator.
//!
//! Each input moves `pending → checking → (duplicate | verifying) → (verified |
//! failed)`, or straight to `skipped` when flagged inputs are skipped. One item
//! is in flight at a time, which keeps `ExistingIndex` mutation race-free.
//! Cancellation is only observed between items: an item that has started is
//! always driven to a terminal state, rollback included.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use intake_registry::{AuthMethod, CredentialRegistry, RegistryError};
use thiserror::Error;

use crate::batch::{BatchRun, BatchSummary, FailureStage, ItemStatus, OnboardingItem, ProgressSnapshot};
use crate::dedup::{hash_preview, DedupVerdict, DuplicateDetector, ExistingCredential, ExistingIndex};
use crate::input::{CredentialInput, ValidationError};
use crate::parser::{parse_credential_input, ParseError, ParsedBatch};
use crate::rollback::{RollbackCoordinator, RollbackOutcome};

pub const DEFAULT_SETTLE_INTERVAL: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone)]
/// Public struct `PipelineConfig` used to tune a pipeline run.
pub struct PipelineConfig {
    /// Fixed pause between create and probe. The registry is eventually
    /// consistent and a fresh credential may not be readable immediately.
    pub settle_interval: Duration,
    /// Skip inputs whose exporter reported a non-healthy status.
    pub skip_flagged: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            settle_interval: DEFAULT_SETTLE_INTERVAL,
            skip_flagged: false,
        }
    }
}

/// Cooperative cancellation flag checked at item boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Enumerates supported `OnboardingEvent` values.
pub enum OnboardingEvent {
    BatchStarted { total: usize },
    ItemStatusChanged { index: usize, status: ItemStatus },
    Progress(ProgressSnapshot),
    BatchCancelled { completed: usize, total: usize },
    BatchFinished { summary: BatchSummary },
}

type EventHandler = Arc<dyn Fn(&OnboardingEvent) + Send + Sync>;

#[derive(Debug, Error)]
/// Enumerates supported `ItemFailure` values.
pub enum ItemFailure {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("create call failed: {0}")]
    RemoteCreate(RegistryError),
    #[error("verification probe failed: {0}")]
    RemoteProbe(RegistryError),
}

impl ItemFailure {
    pub fn stage(&self) -> FailureStage {
        match self {
            ItemFailure::Validation(_) => FailureStage::Validation,
            ItemFailure::RemoteCreate(_) => FailureStage::Create,
            ItemFailure::RemoteProbe(_) => FailureStage::Probe,
        }
    }
}

/// Public struct `OnboardingPipeline` driving batches against a registry.
pub struct OnboardingPipeline {
    registry: Arc<dyn CredentialRegistry>,
    rollback: RollbackCoordinator,
    config: PipelineConfig,
    handlers: Vec<EventHandler>,
    cancellation_token: Option<CancellationToken>,
}

impl OnboardingPipeline {
    pub fn new(registry: Arc<dyn CredentialRegistry>, config: PipelineConfig) -> Self {
        Self {
            rollback: RollbackCoordinator::new(Arc::clone(&registry)),
            registry,
            config,
            handlers: Vec::new(),
            cancellation_token: None,
        }
    }

    /// Adds an event subscriber that receives status and progress callbacks.
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&OnboardingEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    pub fn set_cancellation_token(&mut self, token: Option<CancellationToken>) {
        self.cancellation_token = token;
    }

    /// Parses `raw` and runs the resulting batch. Parse failures abort before
    /// any registry call.
    pub async fn run_text(
        &self,
        raw: &str,
        index: &mut ExistingIndex,
    ) -> Result<(ParsedBatch, BatchRun), ParseError> {
        let parsed = parse_credential_input(raw)?;
        let run = self.run(&parsed.inputs, index).await;
        Ok((parsed, run))
    }

    /// Onboards `inputs` in order, growing `index` with every verified item.
    pub async fn run(&self, inputs: &[CredentialInput], index: &mut ExistingIndex) -> BatchRun {
        let total = inputs.len();
        let mut run = BatchRun::new(total);
        tracing::info!(
            total,
            settle_ms = self.config.settle_interval.as_millis() as u64,
            skip_flagged = self.config.skip_flagged,
            "starting onboarding batch"
        );
        self.emit(OnboardingEvent::BatchStarted { total });

        let mut detector = DuplicateDetector::new(index);
        for (position, input) in inputs.iter().enumerate() {
            if self.is_cancelled() {
                run.cancelled = true;
                tracing::warn!(
                    completed = run.progress.current,
                    total,
                    "onboarding batch cancelled at item boundary"
                );
                self.emit(OnboardingEvent::BatchCancelled {
                    completed: run.progress.current,
                    total,
                });
                break;
            }
            self.process_item(input, &mut run.items[position], &mut detector)
                .await;
            let progress = run.record_terminal(position);
            self.emit(OnboardingEvent::Progress(progress));
        }

        let summary = run.summary();
        tracing::info!(
            verified = summary.counters.verified,
            duplicate = summary.counters.duplicate,
            failed = summary.counters.failed,
            skipped = summary.counters.skipped,
            rollback_failed = summary.counters.rollback_failed,
            hashes_computed = detector.hashes_computed(),
            "onboarding batch finished"
        );
        self.emit(OnboardingEvent::BatchFinished { summary });
        run
    }

    async fn process_item(
        &self,
        input: &CredentialInput,
        item: &mut OnboardingItem,
        detector: &mut DuplicateDetector<'_>,
    ) {
        if self.config.skip_flagged && input.is_flagged_bad() {
            item.error = Some(format!(
                "input reported status '{}'",
                input.external_status.as_deref().unwrap_or_default()
            ));
            item.rollback = Some(RollbackOutcome::Skipped);
            self.transition(item, ItemStatus::Skipped);
            tracing::info!(item = item.index, "skipped flagged credential");
            return;
        }

        self.transition(item, ItemStatus::Checking);
        let auth_method = match input.validate() {
            Ok(auth_method) => auth_method,
            Err(error) => {
                item.rollback = Some(RollbackOutcome::Skipped);
                self.fail(item, ItemFailure::Validation(error));
                return;
            }
        };

        let verdict = detector.classify(&input.token);
        item.content_hash = Some(verdict.hash().to_string());
        let hash = match verdict {
            DedupVerdict::Duplicate { hash, existing } => {
                item.identity = existing.identity;
                item.duplicate_of = existing.remote_id;
                item.rollback = Some(RollbackOutcome::Skipped);
                self.transition(item, ItemStatus::Duplicate);
                if existing.disabled {
                    tracing::warn!(
                        item = item.index,
                        hash = hash_preview(&hash),
                        duplicate_of = ?item.duplicate_of,
                        "credential already onboarded but disabled in the registry"
                    );
                } else {
                    tracing::info!(
                        item = item.index,
                        hash = hash_preview(&hash),
                        duplicate_of = ?item.duplicate_of,
                        "credential already onboarded"
                    );
                }
                return;
            }
            DedupVerdict::New { hash } => hash,
        };

        self.transition(item, ItemStatus::Verifying);
        match self.verify(input, auth_method, item).await {
            Ok(()) => {
                detector.commit(
                    hash,
                    ExistingCredential {
                        remote_id: item.remote_id,
                        identity: item.identity.clone(),
                        disabled: false,
                    },
                );
                self.transition(item, ItemStatus::Verified);
                tracing::info!(
                    item = item.index,
                    remote_id = ?item.remote_id,
                    identity = ?item.identity,
                    "credential verified"
                );
            }
            Err(failure) => {
                let rollback = match item.remote_id {
                    Some(remote_id) => self.rollback.rollback(remote_id).await,
                    None => RollbackOutcome::Skipped,
                };
                item.rollback = Some(rollback);
                self.fail(item, failure);
            }
        }
    }

    async fn verify(
        &self,
        input: &CredentialInput,
        auth_method: AuthMethod,
        item: &mut OnboardingItem,
    ) -> Result<(), ItemFailure> {
        let created = self
            .registry
            .create_credential(input.to_new_credential(auth_method))
            .await
            .map_err(ItemFailure::RemoteCreate)?;
        item.remote_id = Some(created.remote_id);
        item.identity = created.identity.or_else(|| input.email.clone());
        tracing::debug!(
            item = item.index,
            remote_id = created.remote_id,
            auth_method = auth_method.as_str(),
            "credential created; waiting before probe"
        );

        if !self.config.settle_interval.is_zero() {
            tokio::time::sleep(self.config.settle_interval).await;
        }

        let usage = self
            .registry
            .fetch_balance(created.remote_id)
            .await
            .map_err(|error| {
                if error.is_not_found() {
                    tracing::warn!(
                        item = item.index,
                        remote_id = created.remote_id,
                        settle_ms = self.config.settle_interval.as_millis() as u64,
                        "created credential not visible after settle interval"
                    );
                }
                ItemFailure::RemoteProbe(error)
            })?;
        item.usage = Some(usage);
        Ok(())
    }

    fn fail(&self, item: &mut OnboardingItem, failure: ItemFailure) {
        tracing::warn!(
            item = item.index,
            stage = ?failure.stage(),
            remote_id = ?item.remote_id,
            rollback = item.rollback.as_ref().map(RollbackOutcome::as_str),
            error = %failure,
            "credential onboarding failed"
        );
        item.failure_stage = Some(failure.stage());
        item.error = Some(failure.to_string());
        self.transition(item, ItemStatus::Failed);
    }

    fn transition(&self, item: &mut OnboardingItem, next: ItemStatus) {
        if item.advance(next) {
            self.emit(OnboardingEvent::ItemStatusChanged {
                index: item.index,
                status: next,
            });
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation_token
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn emit(&self, event: OnboardingEvent) {
        for handler in &self.handlers {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event)));
        }
    }
}
