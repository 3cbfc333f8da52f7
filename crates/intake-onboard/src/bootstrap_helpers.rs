use tracing_subscriber::EnvFilter;

/// Intake crates log at `info`; dependencies such as reqwest stay at `warn`.
const DEFAULT_LOG_DIRECTIVES: &str =
    "warn,intake_onboard=info,intake_pipeline=info,intake_registry=info";

pub(crate) fn init_tracing() {
    let configured = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(configured.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// A usable `RUST_LOG` replaces the defaults entirely; a blank or unparsable
/// one falls back to them.
fn log_filter(configured: Option<&str>) -> EnvFilter {
    configured
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_DIRECTIVES))
}
