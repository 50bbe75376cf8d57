//! Minimal Microsoft Graph HTTP client.
//!
//! Every request carries the turn's bearer token, but only when the target
//! host is on the allow-list. Anything else goes out unauthenticated.

use reqwest::{Method, StatusCode, Url};
use retrievalbot_core::error::ToolError;
use std::time::Duration;
use tracing::{debug, warn};

/// Host that always receives the Graph token.
pub const GRAPH_HOST: &str = "graph.microsoft.com";

/// Upper bound on one Graph request, connect through body.
pub const DEFAULT_GRAPH_TIMEOUT: Duration = Duration::from_secs(30);

/// Graph API roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEndpoints {
    /// Stable API root, e.g. `https://graph.microsoft.com/v1.0`
    pub base_url: String,
    /// Beta API root (Copilot retrieval)
    pub beta_url: String,
}

impl Default for GraphEndpoints {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".into(),
            beta_url: "https://graph.microsoft.com/beta".into(),
        }
    }
}

/// Hands out one fixed token, but only for allowed hosts.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
    allowed_hosts: Vec<String>,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            allowed_hosts: vec![GRAPH_HOST.to_string()],
        }
    }

    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        if !self.allowed_hosts.contains(&host) {
            self.allowed_hosts.push(host);
        }
        self
    }

    /// The token to present to `url`, or `None` when the host is not allowed
    /// or there is no token.
    pub fn token_for(&self, url: &Url) -> Option<&str> {
        let host = url.host_str()?;
        (!self.token.is_empty() && self.allowed_hosts.iter().any(|h| h == host))
            .then_some(self.token.as_str())
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"[REDACTED]")
            .field("allowed_hosts", &self.allowed_hosts)
            .finish()
    }
}

/// A plain HTTP response: status plus body text.
#[derive(Debug, Clone)]
pub struct GraphResponse {
    pub status: StatusCode,
    pub body: String,
}

impl GraphResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Short status name like `Unauthorized` or `NotFound`.
    pub fn status_name(&self) -> String {
        self.status
            .canonical_reason()
            .map(|r| r.replace(' ', ""))
            .unwrap_or_else(|| self.status.as_str().to_string())
    }
}

pub struct GraphClient {
    http: reqwest::Client,
    endpoints: GraphEndpoints,
    tokens: StaticTokenProvider,
}

impl GraphClient {
    /// The configured endpoint hosts are allowed alongside Graph itself.
    pub fn new(endpoints: GraphEndpoints, token: Option<String>) -> Self {
        let mut tokens = StaticTokenProvider::new(token.unwrap_or_default());
        for root in [&endpoints.base_url, &endpoints.beta_url] {
            if let Some(host) = Url::parse(root).ok().and_then(|u| u.host_str().map(String::from))
            {
                tokens = tokens.allow_host(host);
            }
        }

        Self {
            http: http_client(DEFAULT_GRAPH_TIMEOUT),
            endpoints,
            tokens,
        }
    }

    /// Replace the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = http_client(timeout);
        self
    }

    pub async fn get(&self, path: &str) -> Result<GraphResponse, ToolError> {
        let url = join(&self.endpoints.base_url, path)?;
        self.send(Method::GET, url, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<GraphResponse, ToolError> {
        let url = join(&self.endpoints.base_url, path)?;
        self.send(Method::POST, url, Some(body)).await
    }

    pub async fn post_beta(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<GraphResponse, ToolError> {
        let url = join(&self.endpoints.beta_url, path)?;
        self.send(Method::POST, url, Some(body)).await
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<GraphResponse, ToolError> {
        debug!(%method, %url, "Graph request");

        let mut request = self.http.request(method, url.clone());
        if let Some(token) = self.tokens.token_for(&url) {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(request_failed)?;
        let status = response.status();
        let body = response.text().await.map_err(request_failed)?;
        Ok(GraphResponse { status, body })
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to default Graph HTTP client");
            reqwest::Client::new()
        })
}

fn request_failed(e: reqwest::Error) -> ToolError {
    let reason = if e.is_timeout() {
        format!("Graph request timed out: {e}")
    } else {
        e.to_string()
    };
    ToolError::ExecutionFailed {
        tool_name: "graph".into(),
        reason,
    }
}

fn join(root: &str, path: &str) -> Result<Url, ToolError> {
    let raw = format!("{}/{}", root.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&raw).map_err(|e| ToolError::ExecutionFailed {
        tool_name: "graph".into(),
        reason: format!("invalid Graph URL '{raw}': {e}"),
    })
}
