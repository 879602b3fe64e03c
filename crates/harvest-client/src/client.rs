use std::sync::Arc;

use reqwest::{Client, Method, Proxy, Request, RequestBuilder, Response, Url};
use tracing::trace;

use crate::{config::ClientConfig, error::ClientError, signer::RequestSigner};

/// Control-plane paths, resolved once against the base URL.
#[derive(Debug, Clone)]
pub(crate) struct Endpoints {
    pub available_tasks: Url,
    pub start_task: Url,
    pub current_job: Url,
    pub end_job: Url,
    pub update_client: Url,
    pub ingest: Url,
}

impl Endpoints {
    fn resolve(base: &Url) -> Result<Self, ClientError> {
        let join = |path: &str| {
            base.join(path).map_err(|e| ClientError::InvalidUrl {
                url: base.to_string(),
                reason: e.to_string(),
            })
        };
        Ok(Self {
            available_tasks: join("/api/v1/clients/availabletasks")?,
            start_task: join("/api/v1/clients/starttask")?,
            current_job: join("/api/v2/jobs/current")?,
            end_job: join("/api/v2/jobs/end")?,
            update_client: join("/api/v1/clients/update")?,
            ingest: join("/api/v2/ingest")?,
        })
    }
}

/// Signing HTTP client for the control plane and the ingest endpoint.
///
/// Implements both [`harvest_core::ControlPlane`] and
/// [`harvest_core::BatchUploader`]; clones share one connection pool.
#[derive(Clone)]
pub struct ApiClient {
    pub(crate) http: Client,
    pub(crate) signer: Arc<dyn RequestSigner>,
    pub(crate) endpoints: Arc<Endpoints>,
    pub(crate) cfg: Arc<ClientConfig>,
    base: Url,
}

impl ApiClient {
    pub fn new(cfg: ClientConfig, signer: Arc<dyn RequestSigner>) -> Result<Self, ClientError> {
        let base = Url::parse(&cfg.base_url).map_err(|e| ClientError::InvalidUrl {
            url: cfg.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base.host_str().is_none() {
            return Err(ClientError::InvalidUrl {
                url: cfg.base_url.clone(),
                reason: "missing host".into(),
            });
        }
        let endpoints = Endpoints::resolve(&base)?;

        let mut builder = Client::builder().user_agent(cfg.user_agent.clone());
        if let Some(proxy) = cfg.proxy.as_deref().filter(|p| !p.is_empty()) {
            builder = builder.proxy(Proxy::all(proxy)?);
        }
        let http = builder.build()?;

        Ok(Self {
            http,
            signer,
            endpoints: Arc::new(endpoints),
            cfg: Arc::new(cfg),
            base,
        })
    }

    /// Host and port of the control plane.
    pub fn authority(&self) -> (String, u16) {
        let host = self.base.host_str().unwrap_or_default().to_string();
        let port = self.base.port_or_known_default().unwrap_or(443);
        (host, port)
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub(crate) fn request(&self, method: Method, url: &Url) -> RequestBuilder {
        self.http.request(method, url.clone())
    }

    /// Sign and send a built request.
    pub(crate) async fn send(&self, builder: RequestBuilder) -> Result<Response, ClientError> {
        let mut request: Request = builder.build()?;
        self.signer.sign(&mut request)?;
        trace!(method = %request.method(), url = %request.url(), "sending request");
        Ok(self.http.execute(request).await?)
    }
}
