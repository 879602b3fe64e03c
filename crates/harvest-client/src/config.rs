use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Control-plane base URL; endpoint paths are resolved against it.
    pub base_url: String,
    /// Optional proxy applied to every request.
    pub proxy: Option<String>,
    /// Client-side deadline for control-plane calls. Ingest requests have none.
    pub request_timeout: Duration,
    /// Server-side wait requested on ingest via `Prefer: wait=<secs>`.
    pub ingest_wait: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            proxy: None,
            request_timeout: Duration::from_secs(30),
            ingest_wait: Duration::from_secs(60),
            user_agent: format!("harvest-agent/{}", harvest_core::agent_version()),
        }
    }
}
