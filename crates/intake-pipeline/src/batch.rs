//! Batch state owned by the caller: per-item records, progress, and tallies.

use std::fmt;

use intake_registry::UsageSnapshot;
use serde::Serialize;

use crate::rollback::RollbackOutcome;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `ItemStatus` values.
pub enum ItemStatus {
    Pending,
    Skipped,
    Checking,
    Verifying,
    Duplicate,
    Verified,
    Failed,
}

impl ItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::Skipped => "skipped",
            ItemStatus::Checking => "checking",
            ItemStatus::Verifying => "verifying",
            ItemStatus::Duplicate => "duplicate",
            ItemStatus::Verified => "verified",
            ItemStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ItemStatus::Skipped | ItemStatus::Duplicate | ItemStatus::Verified | ItemStatus::Failed
        )
    }

    /// Status moves forward only; terminal states have no successors.
    pub fn can_transition_to(self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Pending, ItemStatus::Checking)
                | (ItemStatus::Pending, ItemStatus::Skipped)
                | (ItemStatus::Checking, ItemStatus::Duplicate)
                | (ItemStatus::Checking, ItemStatus::Verifying)
                | (ItemStatus::Checking, ItemStatus::Failed)
                | (ItemStatus::Verifying, ItemStatus::Verified)
                | (ItemStatus::Verifying, ItemStatus::Failed)
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `FailureStage` values.
pub enum FailureStage {
    Validation,
    Create,
    Probe,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Public struct `OnboardingItem` tracking one input through the pipeline.
pub struct OnboardingItem {
    /// 1-based position in the submitted batch.
    pub index: usize,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_stage: Option<FailureStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Remote id of the already-registered credential a duplicate matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<u64>,
}

impl OnboardingItem {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            status: ItemStatus::Pending,
            error: None,
            failure_stage: None,
            rollback: None,
            remote_id: None,
            identity: None,
            usage: None,
            content_hash: None,
            duplicate_of: None,
        }
    }

    /// Applies a forward transition; out-of-order requests are refused.
    pub(crate) fn advance(&mut self, next: ItemStatus) -> bool {
        if !self.status.can_transition_to(next) {
            tracing::error!(
                item = self.index,
                from = %self.status,
                to = %next,
                "refusing out-of-order item status transition"
            );
            return false;
        }
        self.status = next;
        true
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
/// Public struct `ProgressSnapshot` emitted after every finished item.
pub struct ProgressSnapshot {
    pub current: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
/// Running tallies over terminal items.
pub struct BatchCounters {
    pub verified: usize,
    pub duplicate: usize,
    pub failed: usize,
    pub skipped: usize,
    pub rollback_success: usize,
    pub rollback_failed: usize,
    pub rollback_skipped: usize,
}

impl BatchCounters {
    fn record(&mut self, item: &OnboardingItem) {
        match item.status {
            ItemStatus::Verified => self.verified += 1,
            ItemStatus::Duplicate => self.duplicate += 1,
            ItemStatus::Failed => self.failed += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Pending | ItemStatus::Checking | ItemStatus::Verifying => {}
        }
        match item.rollback {
            Some(RollbackOutcome::Success) => self.rollback_success += 1,
            Some(RollbackOutcome::Failed { .. }) => self.rollback_failed += 1,
            Some(RollbackOutcome::Skipped) => self.rollback_skipped += 1,
            None => {}
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `BatchOutcome` values.
pub enum BatchOutcome {
    FullySuccessful,
    Mixed,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
/// Public struct `BatchSummary` describing a finished (or cancelled) run.
pub struct BatchSummary {
    pub outcome: BatchOutcome,
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub cancelled: bool,
    #[serde(flatten)]
    pub counters: BatchCounters,
    /// Remote ids left behind by a failed rollback.
    pub remediation_required: Vec<u64>,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match (self.outcome, self.cancelled) {
            (_, true) => "cancelled",
            (BatchOutcome::FullySuccessful, false) => "fully successful",
            (BatchOutcome::Mixed, false) => "mixed",
        };
        write!(
            f,
            "onboarding {label}: {}/{} processed, verified={} duplicate={} failed={} skipped={}",
            self.completed,
            self.total,
            self.counters.verified,
            self.counters.duplicate,
            self.counters.failed,
            self.counters.skipped
        )?;
        write!(
            f,
            "; rollback success={} failed={} skipped={}",
            self.counters.rollback_success,
            self.counters.rollback_failed,
            self.counters.rollback_skipped
        )?;
        if self.pending > 0 {
            write!(f, "; pending={}", self.pending)?;
        }
        if !self.remediation_required.is_empty() {
            let ids = self
                .remediation_required
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            write!(f, "; manual cleanup needed for credential ids [{ids}]")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
/// Public struct `BatchRun` returned to the caller by the pipeline.
pub struct BatchRun {
    pub items: Vec<OnboardingItem>,
    pub progress: ProgressSnapshot,
    pub counters: BatchCounters,
    pub cancelled: bool,
}

impl BatchRun {
    pub fn new(total: usize) -> Self {
        Self {
            items: (1..=total).map(OnboardingItem::new).collect(),
            progress: ProgressSnapshot { current: 0, total },
            counters: BatchCounters::default(),
            cancelled: false,
        }
    }

    /// Folds a terminal item into the tallies and advances the cursor.
    pub fn record_terminal(&mut self, position: usize) -> ProgressSnapshot {
        if let Some(item) = self.items.get(position) {
            self.counters.record(item);
            self.progress.current = (self.progress.current + 1).min(self.progress.total);
        }
        self.progress
    }

    pub fn summary(&self) -> BatchSummary {
        let completed = self
            .items
            .iter()
            .filter(|item| item.status.is_terminal())
            .count();
        let total = self.items.len();
        let outcome = if !self.cancelled && self.counters.verified == total {
            BatchOutcome::FullySuccessful
        } else {
            BatchOutcome::Mixed
        };
        let remediation_required = self
            .items
            .iter()
            .filter(|item| matches!(item.rollback, Some(RollbackOutcome::Failed { .. })))
            .filter_map(|item| item.remote_id)
            .collect();
        BatchSummary {
            outcome,
            total,
            completed,
            pending: total - completed,
            cancelled: self.cancelled,
            counters: self.counters,
            remediation_required,
        }
    }
}
