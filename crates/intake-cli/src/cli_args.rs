use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use intake_pipeline::PipelineConfig;
use intake_registry::{RegistryClientConfig, DEFAULT_REGISTRY_URL};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_non_empty_input(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("input path cannot be empty".to_string());
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Enumerates supported `InputSource` values.
pub enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "intake-onboard",
    about = "Bulk-onboard exported credentials into a credential registry",
    version
)]
/// Public struct `Cli` parsed by the `intake-onboard` binary.
pub struct Cli {
    #[arg(
        long,
        value_parser = parse_non_empty_input,
        help = "Credential batch to onboard: a JSON file path, or '-' to read stdin"
    )]
    pub input: String,

    #[arg(
        long = "registry-url",
        env = "INTAKE_REGISTRY_URL",
        default_value = DEFAULT_REGISTRY_URL,
        help = "Base URL of the registry admin API"
    )]
    pub registry_url: String,

    #[arg(
        long = "admin-token",
        env = "INTAKE_ADMIN_TOKEN",
        hide_env_values = true,
        help = "Admin token sent as bearer authorization and x-api-key"
    )]
    pub admin_token: Option<String>,

    #[arg(
        long = "request-timeout-ms",
        env = "INTAKE_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Per-request timeout for registry admin calls"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "settle-ms",
        env = "INTAKE_SETTLE_MS",
        default_value_t = 1_000,
        help = "Pause between creating a credential and probing it"
    )]
    pub settle_ms: u64,

    #[arg(
        long = "skip-flagged",
        env = "INTAKE_SKIP_FLAGGED",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Skip inputs whose exporter reported a non-healthy account status"
    )]
    pub skip_flagged: bool,

    #[arg(
        long,
        env = "INTAKE_REPORT",
        help = "Write a JSON onboarding report to this path after the run"
    )]
    pub report: Option<PathBuf>,

    #[arg(long, help = "Print the final summary as JSON instead of text")]
    pub json: bool,
}

impl Cli {
    pub fn input_source(&self) -> InputSource {
        if self.input == "-" {
            InputSource::Stdin
        } else {
            InputSource::File(PathBuf::from(&self.input))
        }
    }

    pub fn registry_client_config(&self) -> RegistryClientConfig {
        RegistryClientConfig {
            base_url: self.registry_url.clone(),
            admin_token: self
                .admin_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(str::to_string),
            request_timeout_ms: self.request_timeout_ms,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            settle_interval: Duration::from_millis(self.settle_ms),
            skip_flagged: self.skip_flagged,
        }
    }
}
