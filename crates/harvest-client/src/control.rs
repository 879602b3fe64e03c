use async_trait::async_trait;
use harvest_core::{ControlPlane, ControlPlaneError};
use harvest_model::{ClientIdentity, JobOutcome, StartTaskRequest, Task, TaskId};
use reqwest::{Method, RequestBuilder, Response, Url};
use tracing::debug;

use crate::client::ApiClient;

impl ApiClient {
    /// Send a control-plane request, treating statuses outside `[200, 400)` as failures.
    async fn call(&self, url: &Url, builder: RequestBuilder) -> Result<Response, ControlPlaneError> {
        let builder = builder.timeout(self.cfg.request_timeout);
        let response = self
            .send(builder)
            .await
            .map_err(|e| ControlPlaneError::Request {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        ensure_success(url, response).await
    }
}

pub(crate) async fn ensure_success(url: &Url, response: Response) -> Result<Response, ControlPlaneError> {
    let status = response.status();
    if (200..400).contains(&status.as_u16()) {
        return Ok(response);
    }

    let body = match response.text().await {
        Ok(text) => render_body(&text),
        Err(e) => format!("failure reading response body: {e}"),
    };
    Err(ControlPlaneError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Compact JSON when the body decodes, the trimmed text otherwise.
pub(crate) fn render_body(text: &str) -> String {
    serde_json::from_str::<serde_json::Value>(text)
        .map(|v| v.to_string())
        .unwrap_or_else(|_| text.trim().to_string())
}

#[async_trait]
impl ControlPlane for ApiClient {
    async fn available_tasks(&self) -> Result<Vec<Task>, ControlPlaneError> {
        let url = &self.endpoints.available_tasks;
        let response = self.call(url, self.request(Method::GET, url)).await?;

        response
            .json::<Vec<Task>>()
            .await
            .map_err(|e| ControlPlaneError::InvalidResponse {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }

    async fn start_task(&self, id: TaskId) -> Result<(), ControlPlaneError> {
        let url = &self.endpoints.start_task;
        let builder = self
            .request(Method::POST, url)
            .json(&StartTaskRequest { id });
        self.call(url, builder).await?;
        Ok(())
    }

    async fn current_job(&self) -> Result<(), ControlPlaneError> {
        let url = &self.endpoints.current_job;
        self.call(url, self.request(Method::GET, url)).await?;
        Ok(())
    }

    async fn end_job(&self, outcome: &JobOutcome) -> Result<(), ControlPlaneError> {
        let url = &self.endpoints.end_job;
        let builder = self.request(Method::POST, url).json(outcome);
        self.call(url, builder).await?;
        Ok(())
    }

    async fn update_client(&self, identity: &ClientIdentity) -> Result<(), ControlPlaneError> {
        debug!(
            address = %identity.address,
            hostname = %identity.hostname,
            version = %identity.version,
            "updating client info"
        );
        let url = &self.endpoints.update_client;
        let builder = self.request(Method::PUT, url).json(identity);
        self.call(url, builder).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{body_json, header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::{ClientConfig, HmacSigner, NoSigner};

    fn client(server: &MockServer) -> ApiClient {
        let cfg = ClientConfig {
            base_url: server.uri(),
            ..Default::default()
        };
        ApiClient::new(cfg, Arc::new(NoSigner)).unwrap()
    }

    #[tokio::test]
    async fn fetches_available_tasks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/clients/availabletasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "execution_time": "2024-05-01T12:00:10Z"},
                {"id": 2, "execution_time": "2024-05-01T11:59:55Z"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let tasks = client(&server).available_tasks().await.unwrap();
        let ids: Vec<TaskId> = tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn malformed_task_list_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/clients/availabletasks"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = client(&server).available_tasks().await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn start_task_posts_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/clients/starttask"))
            .and(body_json(json!({ "id": 42 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).start_task(42).await.unwrap();
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/clients/starttask"))
            .respond_with(
                ResponseTemplate::new(409).set_body_json(json!({ "errors": ["task already started"] })),
            )
            .mount(&server)
            .await;

        let err = client(&server).start_task(1).await.unwrap_err();
        match err {
            ControlPlaneError::Status { status, body, .. } => {
                assert_eq!(status, 409);
                assert!(body.contains("task already started"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn redirect_range_counts_as_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/jobs/current"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;

        client(&server).current_job().await.unwrap();
    }

    #[tokio::test]
    async fn heartbeat_failure_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/jobs/current"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server).current_job().await.unwrap_err();
        assert!(err.to_string().contains("500 boom"));
    }

    #[tokio::test]
    async fn end_job_posts_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v2/jobs/end"))
            .and(body_json(json!({
                "status": "COMPLETE",
                "message": "Collection completed successfully"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        client(&server).end_job(&JobOutcome::completed()).await.unwrap();
    }

    #[tokio::test]
    async fn update_client_is_signed_put() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/v1/clients/update"))
            .and(header("authorization", "bhesignature agent-token-id"))
            .and(header_exists("requestdate"))
            .and(header_exists("signature"))
            .and(body_json(json!({
                "address": "10.0.0.5",
                "hostname": "collector-01",
                "version": "1.2.3"
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let cfg = ClientConfig {
            base_url: server.uri(),
            ..Default::default()
        };
        let signer = HmacSigner::new("agent-token-id", "secret").unwrap();
        let client = ApiClient::new(cfg, Arc::new(signer)).unwrap();

        let identity = ClientIdentity {
            address: "10.0.0.5".into(),
            hostname: "collector-01".into(),
            version: "1.2.3".into(),
        };
        client.update_client(&identity).await.unwrap();
    }

    #[test]
    fn renders_json_and_plain_bodies() {
        assert_eq!(render_body("{ \"a\" : 1 }"), "{\"a\":1}");
        assert_eq!(render_body("  gateway down \n"), "gateway down");
    }
}
