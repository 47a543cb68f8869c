// Observability infrastructure using tracing crate
// Structured logging for daemon and CLI runs

use anyhow::{Context, Result};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const DEFAULT_FILTER: &str = "domain_cert_manager=info,dcm=info";

/// Output format of the log stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for the daemon
    Json,
    /// Human-readable lines, for interactive CLI use
    Pretty,
}

fn filter() -> Result<EnvFilter> {
    // Example: RUST_LOG=domain_cert_manager=debug
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create tracing filter")
}

/// Initialize the global subscriber
pub fn init(format: LogFormat) -> Result<()> {
    let filter_layer = filter()?;

    match format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_current_span(true)
                .with_span_list(true)
                .with_span_events(FmtSpan::CLOSE);

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .try_init()
                .context("Failed to install tracing subscriber")?;
        }
        LogFormat::Pretty => {
            let fmt_layer = fmt::layer().with_target(false).compact();

            tracing_subscriber::registry()
                .with(filter_layer)
                .with(fmt_layer)
                .try_init()
                .context("Failed to install tracing subscriber")?;
        }
    }

    Ok(())
}

/// Span wrapping one lifecycle run of a project
#[inline]
pub fn project_span(project_id: &str) -> tracing::Span {
    tracing::info_span!(
        "project_run",
        project_id = project_id,
        run_id = %uuid::Uuid::new_v4(),
    )
}

/// Span wrapping one operator API request
#[inline]
pub fn request_span(method: &str, path: &str) -> tracing::Span {
    tracing::info_span!(
        "request",
        method = method,
        path = path,
        request_id = %uuid::Uuid::new_v4(),
    )
}
