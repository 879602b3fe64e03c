use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install `cfg` as the global subscriber.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = directives(&cfg.level)?;
    let output = output_layer(cfg).with_filter(filter);

    tracing_subscriber::registry()
        .with(output)
        .try_init()
        .map_err(classify)
}

fn output_layer(cfg: &LoggerConfig) -> BoxedLayer {
    let layer = fmt::layer()
        .with_target(cfg.with_targets)
        .with_span_events(cfg.span_events.as_fmt_span())
        .with_timer(local_rfc3339());

    match cfg.format {
        LoggerFormat::Text => layer.with_ansi(cfg.use_color).boxed(),
        LoggerFormat::Json => layer
            .json()
            .with_ansi(false)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    }
}

fn directives(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

fn local_rfc3339() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

/// `try_init` reports both the global dispatcher and the `log` bridge; either
/// one being taken means another subscriber won.
fn classify(e: impl std::fmt::Display) -> LoggerError {
    let msg = e.to_string();
    if msg.contains("SetGlobalDefaultError") || msg.contains("already") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(msg)
    }
}
