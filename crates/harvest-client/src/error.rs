use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid control plane url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("failed to sign request: {0}")]
    Signing(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}
