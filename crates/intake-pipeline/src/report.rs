//! Machine-readable record of a finished run.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::batch::{BatchRun, BatchSummary, OnboardingItem};
use crate::parser::{InputShape, ParsedBatch};

pub const ONBOARDING_REPORT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize)]
/// Public struct `OnboardingReport` written after a run. Holds no token
/// material: items carry content hashes, never secrets.
pub struct OnboardingReport {
    pub schema_version: u32,
    pub generated_at_ms: u64,
    pub registry_url: String,
    pub input_shape: InputShape,
    pub entries_found: usize,
    pub entries_dropped: usize,
    pub summary: BatchSummary,
    pub items: Vec<OnboardingItem>,
}

impl OnboardingReport {
    pub fn new(registry_url: impl Into<String>, parsed: &ParsedBatch, run: &BatchRun) -> Self {
        Self {
            schema_version: ONBOARDING_REPORT_SCHEMA_VERSION,
            generated_at_ms: current_unix_timestamp_ms(),
            registry_url: registry_url.into(),
            input_shape: parsed.shape,
            entries_found: parsed.found,
            entries_dropped: parsed.dropped,
            summary: run.summary(),
            items: run.items.clone(),
        }
    }
}

pub fn current_unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Serializes `report` as pretty JSON via temp file + rename.
pub fn write_report_atomic(path: &Path, report: &OnboardingReport) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("report path cannot be empty");
    }
    if path.is_dir() {
        bail!("report path '{}' is a directory", path.display());
    }

    let parent_dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent_dir)
        .with_context(|| format!("failed to create {}", parent_dir.display()))?;

    let mut payload =
        serde_json::to_string_pretty(report).context("failed to serialize onboarding report")?;
    payload.push('\n');

    let temp_path = parent_dir.join(format!(
        ".{}.tmp-{}-{}",
        path.file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("onboarding-report"),
        std::process::id(),
        report.generated_at_ms
    ));
    std::fs::write(&temp_path, payload)
        .with_context(|| format!("failed to write temporary file {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path).with_context(|| {
        format!(
            "failed to move temporary report {} to {}",
            temp_path.display(),
            path.display()
        )
    })?;
    tracing::debug!(path = %path.display(), "wrote onboarding report");
    Ok(())
}
