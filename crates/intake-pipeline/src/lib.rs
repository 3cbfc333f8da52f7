//! Bulk credential onboarding pipeline.
//!
//! Parses a batch of exported credentials, drops those already registered by
//! content hash, creates the rest one at a time, probes each new credential,
//! and rolls back any that fail the probe. Callers own the resulting
//! `BatchRun` and may persist it as an `OnboardingReport`.

mod batch;
mod dedup;
mod input;
mod parser;
mod pipeline;
mod report;
mod rollback;

#[cfg(test)]
mod test_support;

pub use batch::{
    BatchCounters, BatchOutcome, BatchRun, BatchSummary, FailureStage, ItemStatus,
    OnboardingItem, ProgressSnapshot,
};
pub use dedup::{
    content_hash, hash_preview, load_existing_index, DedupVerdict, DuplicateDetector,
    ExistingCredential, ExistingIndex,
};
pub use input::{CredentialInput, SecretToken, ValidationError};
pub use parser::{parse_credential_input, InputShape, ParseError, ParsedBatch};
pub use pipeline::{
    CancellationToken, ItemFailure, OnboardingEvent, OnboardingPipeline, PipelineConfig,
    DEFAULT_SETTLE_INTERVAL,
};
pub use report::{
    current_unix_timestamp_ms, write_report_atomic, OnboardingReport,
    ONBOARDING_REPORT_SCHEMA_VERSION,
};
pub use rollback::{RollbackCoordinator, RollbackError, RollbackOutcome, RollbackStage};
