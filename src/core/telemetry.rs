use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// `RUST_LOG` wins over `OCR_LOG_LEVEL` when both are set.
pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&telemetry.log_level))
        .map_err(|err| anyhow::anyhow!("invalid OCR_LOG_LEVEL '{}': {err}", telemetry.log_level))?;

    let builder = fmt().with_env_filter(filter).with_target(false);

    let installed = if telemetry.json {
        builder
            .json()
            .with_current_span(true)
            .with_span_events(FmtSpan::CLOSE)
            .try_init()
    } else {
        builder.compact().with_span_events(FmtSpan::CLOSE).try_init()
    };
    installed.map_err(|err| anyhow::anyhow!(err.to_string()))?;

    tracing::debug!(
        service = %settings.api().project_name,
        json = telemetry.json,
        "Tracing initialised"
    );
    Ok(())
}
