use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?}, expected text or json")]
    InvalidFormat(String),

    #[error("unknown span event mode {0:?}, expected off, close or lifecycle")]
    InvalidSpanEvents(String),

    #[error("invalid log filter {0:?}")]
    InvalidLogLevel(String),

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,

    #[error("failed to install tracing subscriber: {0}")]
    InitializationFailed(String),
}
