use crate::error::{Result, TransportError};
use crate::provider::CandidateSource;
use crate::proxy::ProxyAddress;
use crate::transport::{Transport, TransportRequest};
use async_trait::async_trait;
use log::info;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const PROXYSCRAPE_URL: &str = "https://api.proxyscrape.com/v3/free-proxy-list/get?request=getproxies&skip=0&proxy_format=protocolipport&format=json";

#[derive(Deserialize)]
struct ProxyList {
    #[serde(default)]
    proxies: Vec<ListedProxy>,
}

#[derive(Deserialize)]
struct ListedProxy {
    proxy: String,
    protocol: String,
}

/// ProxyScrape free list API, HTTP and HTTPS entries only.
pub struct ProxyScrape {
    transport: Arc<dyn Transport>,
    url: String,
    limit: usize,
}

impl ProxyScrape {
    pub fn new(transport: Arc<dyn Transport>, limit: usize) -> Self {
        Self {
            transport,
            url: PROXYSCRAPE_URL.to_string(),
            limit,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    fn parse(body: &str) -> Result<Vec<ProxyAddress>> {
        let list: ProxyList = serde_json::from_str(body)?;
        Ok(list
            .proxies
            .into_iter()
            .filter(|p| p.protocol == "http" || p.protocol == "https")
            .filter_map(|p| ProxyAddress::parse(&p.proxy))
            .collect())
    }
}

#[async_trait]
impl CandidateSource for ProxyScrape {
    async fn list(&mut self) -> Result<Vec<ProxyAddress>> {
        let url = format!("{}&limit={}", self.url, self.limit);
        let request = TransportRequest::new(url, Duration::from_secs(30));
        let resp = self.transport.get(&request).await?;
        if !(200..300).contains(&resp.status) {
            return Err(TransportError::Other(format!(
                "{} returned status {}",
                self.name(),
                resp.status
            ))
            .into());
        }

        let proxies = Self::parse(&resp.body)?;
        info!("{} found ips {}", self.name(), proxies.len());
        Ok(proxies)
    }

    fn name(&self) -> &'static str {
        "api.proxyscrape.com"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::transport::testing::{ok, ScriptedTransport};

    const BODY: &str = r#"{"proxies":[
        {"proxy":"http://1.2.3.4:80","protocol":"http","ip":"1.2.3.4","port":80},
        {"proxy":"socks5://5.6.7.8:1080","protocol":"socks5","ip":"5.6.7.8","port":1080},
        {"proxy":"https://9.9.9.9:443","protocol":"https","ip":"9.9.9.9","port":443}
    ]}"#;

    #[tokio::test]
    async fn keeps_http_and_https_entries() {
        let transport = Arc::new(ScriptedTransport::new().route("proxyscrape", vec![ok(200, BODY)]));
        let mut source = ProxyScrape::new(transport.clone(), 7);

        let proxies = source.list().await.unwrap();

        assert_eq!(
            proxies,
            vec![
                ProxyAddress::parse("http://1.2.3.4:80").unwrap(),
                ProxyAddress::parse("https://9.9.9.9:443").unwrap(),
            ]
        );
        assert!(transport.calls()[0].url.ends_with("&limit=7"));
    }

    #[tokio::test]
    async fn error_status_is_an_error() {
        let transport = Arc::new(ScriptedTransport::new().route("proxyscrape", vec![ok(503, "")]));

        let err = ProxyScrape::new(transport, 7).list().await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
    }

    #[test]
    fn missing_proxies_key_yields_nothing() {
        assert!(ProxyScrape::parse("{}").unwrap().is_empty());
    }

    #[test]
    fn garbage_body_is_an_error() {
        assert!(matches!(ProxyScrape::parse("<html>"), Err(Error::Json(_))));
    }
}
