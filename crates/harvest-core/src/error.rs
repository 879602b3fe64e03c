use thiserror::Error;

/// Failure of a control-plane round trip.
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("received unexpected response code from {url}: {status} {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("request cancelled")]
    Cancelled,
}

/// Failure of a single batch upload, classified for the retry policy.
#[derive(Error, Debug)]
pub enum UploadError {
    /// Service unavailable or gateway timeout; the same batch may be retried.
    #[error("ingest endpoint temporarily unavailable: {status}")]
    Transient { status: u16 },

    #[error("ingest request failed: {0}")]
    Transport(String),

    #[error("ingest rejected with {status}: {body}")]
    Rejected { status: u16, body: String },
}

impl UploadError {
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, UploadError::Transient { .. })
    }
}
