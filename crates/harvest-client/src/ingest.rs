use async_trait::async_trait;
use harvest_core::{BatchUploader, UploadError};
use harvest_model::IngestEnvelope;
use reqwest::{Method, StatusCode, header::HeaderName};
use tracing::{debug, error};

use crate::{client::ApiClient, control::render_body};

const PREFER: HeaderName = HeaderName::from_static("prefer");

#[async_trait]
impl BatchUploader for ApiClient {
    /// `POST /api/v2/ingest`, asking the server to hold the request until the
    /// batch is accepted.
    ///
    /// 503 and 504 are transient, 202 is success, anything else is a rejection.
    async fn upload(&self, envelope: &IngestEnvelope) -> Result<(), UploadError> {
        let url = &self.endpoints.ingest;
        let prefer = format!("wait={}", self.cfg.ingest_wait.as_secs());
        let builder = self
            .request(Method::POST, url)
            .header(PREFER, prefer)
            .json(envelope);

        let response = self
            .send(builder)
            .await
            .map_err(|e| UploadError::Transport(format!("{url}: {e}")))?;

        let status = response.status();
        match status {
            StatusCode::ACCEPTED => {
                debug!(records = envelope.len(), "batch accepted");
                Ok(())
            }
            StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
                Err(UploadError::Transient {
                    status: status.as_u16(),
                })
            }
            _ => {
                let body = match response.text().await {
                    Ok(text) => render_body(&text),
                    Err(e) => format!("failure reading response body: {e}"),
                };
                error!(url = %url, status = status.as_u16(), body = %body, "received unexpected response code");
                Err(UploadError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
