use std::io::IsTerminal;

use crate::logger::format::{LoggerFormat, SpanEvents};

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directive, e.g. `info` or `harvest_core=debug,info`.
    pub level: String,
    pub span_events: SpanEvents,
    pub with_targets: bool,
    /// Ignored for JSON output.
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            span_events: SpanEvents::Off,
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
        }
    }
}
