//! Network fetch collaborator shared by the validator and the page fetcher.

use crate::error::TransportError;
use crate::proxy::ProxyAddress;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub proxy: Option<ProxyAddress>,
    pub timeout: Duration,
    pub verify_tls: bool,
}

impl TransportRequest {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            proxy: None,
            timeout,
            verify_tls: true,
        }
    }

    pub fn via(mut self, proxy: Option<ProxyAddress>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.verify_tls = verify;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Issues a single HTTP GET, optionally routed through a proxy.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// `reqwest` backed transport. Every request gets its own client so the
/// connection is torn down with the call.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    fn client(&self, request: &TransportRequest) -> Result<Client, TransportError> {
        let mut builder = Client::builder()
            .timeout(request.timeout)
            .user_agent(&self.user_agent)
            .pool_max_idle_per_host(0)
            .danger_accept_invalid_certs(!request.verify_tls);

        if let Some(proxy) = &request.proxy {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| TransportError::Other(format!("invalid proxy {}: {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        } else {
            builder = builder.no_proxy();
        }

        builder
            .build()
            .map_err(|e| TransportError::Other(format!("cannot build client: {}", e)))
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn classify(err: reqwest::Error, proxied: bool) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() && proxied {
        TransportError::Proxy(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, request: &TransportRequest) -> Result<TransportResponse, TransportError> {
        let client = self.client(request)?;
        let proxied = request.proxy.is_some();

        let resp = client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| classify(e, proxied))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| classify(e, proxied))?;

        Ok(TransportResponse { status, body })
    }
}
