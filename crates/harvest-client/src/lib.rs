//! HTTP side of the agent: control-plane calls, batch uploads and request
//! signing, all over one shared `reqwest::Client`.

mod config;
pub use config::ClientConfig;

mod error;
pub use error::ClientError;

mod signer;
pub use signer::{HmacSigner, NoSigner, RequestSigner};

mod client;
pub use client::ApiClient;

mod control;
mod ingest;
