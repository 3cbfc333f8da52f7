use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use intake_cli::{Cli, InputSource};
use intake_pipeline::{
    load_existing_index, parse_credential_input, write_report_atomic, BatchOutcome, BatchRun,
    CancellationToken, ItemStatus, OnboardingEvent, OnboardingItem, OnboardingPipeline,
    OnboardingReport,
};
use intake_registry::HttpRegistryClient;
use tokio::io::AsyncReadExt;

const EXIT_MIXED: u8 = 2;

pub(crate) async fn run_cli(cli: Cli) -> Result<ExitCode> {
    let raw = read_input(&cli.input_source()).await?;
    let parsed = parse_credential_input(&raw).context("failed to parse credential input")?;
    tracing::info!(
        shape = parsed.shape.as_str(),
        found = parsed.found,
        dropped = parsed.dropped,
        "loaded credential batch"
    );

    let client = HttpRegistryClient::new(cli.registry_client_config())
        .context("failed to configure registry client")?;
    let registry_url = client.base_url().to_string();
    let mut index = load_existing_index(&client)
        .await
        .with_context(|| format!("failed to load existing credentials from {registry_url}"))?;
    let registry = Arc::new(client);

    let cancellation_token = CancellationToken::new();
    let mut pipeline = OnboardingPipeline::new(registry, cli.pipeline_config());
    pipeline.set_cancellation_token(Some(cancellation_token.clone()));
    pipeline.subscribe(print_progress_event);

    let signal_token = cancellation_token.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current credential");
            signal_token.cancel();
        }
    });
    let run = pipeline.run(&parsed.inputs, &mut index).await;
    signal_task.abort();

    if let Some(path) = cli.report.as_deref() {
        let report = OnboardingReport::new(registry_url, &parsed, &run);
        write_report_atomic(path, &report)
            .with_context(|| format!("failed to write onboarding report {}", path.display()))?;
        eprintln!("report written to {}", path.display());
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&run.summary())
                .context("failed to serialize onboarding summary")?
        );
    } else {
        println!("{}", render_text_summary(&run));
    }

    Ok(exit_code_for(run.summary().outcome))
}

async fn read_input(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("failed to read credential input from stdin")?;
            Ok(raw)
        }
        InputSource::File(path) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read credential input {}", path.display())),
    }
}

fn print_progress_event(event: &OnboardingEvent) {
    match event {
        OnboardingEvent::BatchStarted { total } => {
            eprintln!("onboarding {total} credential(s)");
        }
        OnboardingEvent::ItemStatusChanged { index, status } if status.is_terminal() => {
            eprintln!("  item {index}: {status}");
        }
        OnboardingEvent::Progress(progress) => {
            eprintln!("  progress {}/{}", progress.current, progress.total);
        }
        OnboardingEvent::BatchCancelled { completed, total } => {
            eprintln!("cancelled after {completed}/{total} credential(s)");
        }
        OnboardingEvent::ItemStatusChanged { .. } | OnboardingEvent::BatchFinished { .. } => {}
    }
}

fn render_item_line(item: &OnboardingItem) -> Option<String> {
    let identity = item
        .identity
        .as_deref()
        .map(|identity| format!(" ({identity})"))
        .unwrap_or_default();
    match item.status {
        ItemStatus::Verified => Some(format!(
            "item {}: verified as credential {}{identity}",
            item.index,
            item.remote_id.map(|id| id.to_string()).unwrap_or_default()
        )),
        ItemStatus::Duplicate => Some(match item.duplicate_of {
            Some(existing) => format!(
                "item {}: duplicate of credential {existing}{identity}",
                item.index
            ),
            None => format!("item {}: duplicate of an earlier item{identity}", item.index),
        }),
        ItemStatus::Failed => {
            let rollback = item
                .rollback
                .as_ref()
                .map(|outcome| format!("; rollback {}", outcome.as_str()))
                .unwrap_or_default();
            Some(format!(
                "item {}: failed: {}{rollback}",
                item.index,
                item.error.as_deref().unwrap_or("unknown error")
            ))
        }
        ItemStatus::Skipped => Some(format!(
            "item {}: skipped: {}",
            item.index,
            item.error.as_deref().unwrap_or("flagged by exporter")
        )),
        ItemStatus::Pending | ItemStatus::Checking | ItemStatus::Verifying => None,
    }
}

fn render_text_summary(run: &BatchRun) -> String {
    let mut lines = run
        .items
        .iter()
        .filter_map(render_item_line)
        .collect::<Vec<_>>();
    lines.push(run.summary().to_string());
    lines.join("\n")
}

fn exit_code_for(outcome: BatchOutcome) -> ExitCode {
    match outcome {
        BatchOutcome::FullySuccessful => ExitCode::SUCCESS,
        BatchOutcome::Mixed => ExitCode::from(EXIT_MIXED),
    }
}
