use crate::error::{Error, Result};
use crate::provider::CandidateSource;
use crate::proxy::ProxyAddress;
use crate::transport::{Transport, TransportRequest};
use async_trait::async_trait;
use log::{info, warn};
use scraper::{Html, Selector};
use std::sync::Arc;
use std::time::Duration;

const FREEPROXY_WORLD_URL: &str =
    "https://www.freeproxy.world/?type=http&anonymity=4&country=&speed=&port=";

/// Scrapes the freeproxy.world HTTP listing, `pages` pages deep.
pub struct FreeProxyWorld {
    transport: Arc<dyn Transport>,
    url: String,
    pages: u32,
}

impl FreeProxyWorld {
    pub fn new(transport: Arc<dyn Transport>, pages: u32) -> Self {
        Self {
            transport,
            url: FREEPROXY_WORLD_URL.to_string(),
            pages,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Rows carry the IP in `td.show-ip-div` and the port as the value of the
    /// first link's query string (`?port=8080`).
    fn parse_page(body: &str) -> Result<Vec<ProxyAddress>> {
        let row_selector = selector("table tr")?;
        let ip_selector = selector("td.show-ip-div")?;
        let link_selector = selector("a")?;

        let doc = Html::parse_document(body);
        let mut result = Vec::new();

        for row in doc.select(&row_selector) {
            let Some(ip_cell) = row.select(&ip_selector).next() else {
                continue;
            };
            let ip = ip_cell.text().collect::<String>();
            let port = row
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(|href| href.split('=').nth(1));

            match port.and_then(|port| ProxyAddress::parse(&format!("{}:{}", ip.trim(), port))) {
                Some(proxy) => result.push(proxy),
                None => warn!("freeproxy.world row without usable port for {}", ip.trim()),
            }
        }

        Ok(result)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| Error::config(format!("bad selector {}: {}", css, e), "selector"))
}

#[async_trait]
impl CandidateSource for FreeProxyWorld {
    async fn list(&mut self) -> Result<Vec<ProxyAddress>> {
        let mut proxies = Vec::new();

        for page in 1..=self.pages {
            let url = format!("{}&page={}", self.url, page);
            let resp = match self
                .transport
                .get(&TransportRequest::new(url, Duration::from_secs(30)))
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("{} page {} failed: {}", self.name(), page, e);
                    continue;
                }
            };
            if !(200..300).contains(&resp.status) {
                warn!("{} page {} returned status {}", self.name(), page, resp.status);
                continue;
            }
            proxies.extend(Self::parse_page(&resp.body)?);
        }

        info!("{} found ips {}", self.name(), proxies.len());
        Ok(proxies)
    }

    fn name(&self) -> &'static str {
        "www.freeproxy.world"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::transport::testing::{ok, ScriptedTransport};

    const PAGE: &str = r#"<html><body><table>
        <tr><th>IP</th><th>Port</th></tr>
        <tr><td class="show-ip-div"> 45.12.30.1 </td><td><a href="/?port=8080">8080</a></td></tr>
        <tr><td class="show-ip-div">103.5.6.7</td><td><a href="/?port=3128">3128</a></td></tr>
        <tr><td class="show-ip-div">8.8.4.4</td><td>no link</td></tr>
    </table></body></html>"#;

    #[test]
    fn parses_ip_and_port_columns() {
        let proxies = FreeProxyWorld::parse_page(PAGE).unwrap();

        assert_eq!(
            proxies,
            vec![
                ProxyAddress::parse("45.12.30.1:8080").unwrap(),
                ProxyAddress::parse("103.5.6.7:3128").unwrap(),
            ]
        );
    }

    #[tokio::test]
    async fn walks_every_page_and_skips_failed_ones() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .route("page=1", vec![ok(200, PAGE)])
                .route("page=2", vec![ok(500, "")]),
        );
        let mut source = FreeProxyWorld::new(transport.clone(), 2);

        let proxies = source.list().await.unwrap();

        assert_eq!(proxies.len(), 2);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn unreachable_page_is_skipped_like_an_error_status() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .route("page=1", vec![Err(TransportError::Connect("refused".into()))])
                .route("page=2", vec![ok(200, PAGE)]),
        );
        let mut source = FreeProxyWorld::new(transport.clone(), 2);

        let proxies = source.list().await.unwrap();

        assert_eq!(proxies.len(), 2);
        assert_eq!(transport.calls().len(), 2);
    }
}
