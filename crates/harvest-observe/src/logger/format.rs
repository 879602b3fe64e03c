use std::str::FromStr;

use tracing_subscriber::fmt::format::FmtSpan;

use crate::logger::error::LoggerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoggerFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(LoggerFormat::Text),
            "json" => Ok(LoggerFormat::Json),
            _ => Err(LoggerError::InvalidFormat(s.to_string())),
        }
    }
}

/// Which span lifecycle events are written as log lines.
///
/// The scheduler runs its loop and every job unit inside spans; `Close`
/// logs each span's busy/idle time when it ends, `Lifecycle` also logs
/// when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpanEvents {
    #[default]
    Off,
    Close,
    Lifecycle,
}

impl SpanEvents {
    pub(crate) fn as_fmt_span(self) -> FmtSpan {
        match self {
            SpanEvents::Off => FmtSpan::NONE,
            SpanEvents::Close => FmtSpan::CLOSE,
            SpanEvents::Lifecycle => FmtSpan::NEW | FmtSpan::CLOSE,
        }
    }
}

impl FromStr for SpanEvents {
    type Err = LoggerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(SpanEvents::Off),
            "close" => Ok(SpanEvents::Close),
            "lifecycle" | "full" => Ok(SpanEvents::Lifecycle),
            _ => Err(LoggerError::InvalidSpanEvents(s.to_string())),
        }
    }
}
