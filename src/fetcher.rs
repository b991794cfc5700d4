//! Concurrent retrieval of a contiguous page range.

use crate::error::{Error, Result};
use crate::observer::{Event, Observer};
use crate::proxy::ProxyAddress;
use crate::transport::{Transport, TransportRequest};
use futures::stream::{self, StreamExt};
use log::warn;
use reqwest::Url;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Raw JSON body of one catalog page.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    pub page: u32,
    pub body: Value,
}

/// Where catalog pages live. Pages are addressed with query parameters.
#[derive(Debug, Clone)]
pub struct CatalogEndpoint {
    pub base_url: String,
    pub category_id: Option<u64>,
    pub page_param: String,
    pub category_param: String,
}

impl CatalogEndpoint {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            category_id: None,
            page_param: "page".to_string(),
            category_param: "category".to_string(),
        }
    }

    pub fn with_category(mut self, category_id: u64) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn page_url(&self, page: u32) -> Result<String> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            Error::config(
                format!("invalid catalog URL {}: {}", self.base_url, e),
                "catalog.base_url",
            )
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(category) = self.category_id {
                query.append_pair(&self.category_param, &category.to_string());
            }
            query.append_pair(&self.page_param, &page.to_string());
        }
        Ok(url.into())
    }
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub request_timeout: Duration,
    pub max_concurrent_pages: usize,
    pub verify_tls: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_concurrent_pages: 16,
            verify_tls: true,
        }
    }
}

pub struct PagedFetcher {
    endpoint: CatalogEndpoint,
    transport: Arc<dyn Transport>,
    observer: Arc<dyn Observer>,
    config: FetcherConfig,
}

impl PagedFetcher {
    pub fn new(
        endpoint: CatalogEndpoint,
        transport: Arc<dyn Transport>,
        observer: Arc<dyn Observer>,
        config: FetcherConfig,
    ) -> Self {
        Self {
            endpoint,
            transport,
            observer,
            config,
        }
    }

    /// Fetches pages `start..=end`, one request each, through `proxies` in
    /// round-robin order (directly when `proxies` is empty).
    ///
    /// Every request runs to completion; a failed page does not cancel its
    /// siblings. If some pages fail the whole batch is an
    /// [`Error::FetchGap`]. If every page fails the result is an empty
    /// vector, which callers treat as the API being unreachable.
    /// Payloads come back in completion order.
    pub async fn fetch_range(
        &self,
        start: u32,
        end: u32,
        proxies: &[ProxyAddress],
    ) -> Result<Vec<Payload>> {
        if start > end {
            return Err(Error::config(
                format!("start page {} is after end page {}", start, end),
                "catalog.start_page",
            ));
        }

        let requests = (start..=end)
            .enumerate()
            .map(|(i, page)| -> Result<(u32, TransportRequest)> {
                let proxy = if proxies.is_empty() {
                    None
                } else {
                    Some(proxies[i % proxies.len()].clone())
                };
                Ok((page, self.request(page, proxy)?))
            })
            .collect::<Result<Vec<_>>>()?;
        let requested = requests.len();

        let results: Vec<(u32, Option<Payload>)> = stream::iter(requests)
            .map(|(page, request)| async move { (page, self.fetch_page(page, request).await) })
            .buffer_unordered(self.config.max_concurrent_pages.max(1))
            .collect()
            .await;

        let mut payloads = Vec::with_capacity(requested);
        let mut missing = Vec::new();
        for (page, payload) in results {
            match payload {
                Some(payload) => payloads.push(payload),
                None => missing.push(page),
            }
        }
        missing.sort_unstable();

        if payloads.is_empty() {
            warn!("no page in {}..={} could be fetched", start, end);
            return Ok(payloads);
        }
        if !missing.is_empty() {
            return Err(Error::FetchGap {
                requested,
                received: payloads.len(),
                missing,
            });
        }
        Ok(payloads)
    }

    fn request(&self, page: u32, proxy: Option<ProxyAddress>) -> Result<TransportRequest> {
        Ok(
            TransportRequest::new(self.endpoint.page_url(page)?, self.config.request_timeout)
                .via(proxy)
                .verify_tls(self.config.verify_tls),
        )
    }

    async fn fetch_page(&self, page: u32, request: TransportRequest) -> Option<Payload> {
        let failed = |reason: String| {
            self.observer.event(&Event::PageFailed {
                page,
                proxy: request.proxy.clone(),
                reason,
            });
            None
        };

        let resp = match self.transport.get(&request).await {
            Ok(resp) => resp,
            Err(e) => return failed(e.to_string()),
        };
        if !(200..300).contains(&resp.status) {
            return failed(format!("status {}", resp.status));
        }
        let body: Value = match serde_json::from_str(&resp.body) {
            Ok(body) => body,
            Err(e) => return failed(format!("invalid JSON: {}", e)),
        };

        self.observer.event(&Event::PageFetched {
            page,
            proxy: request.proxy.clone(),
        });
        Some(Payload { page, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::observer::NoopObserver;
    use crate::transport::testing::{ok, ScriptedTransport};

    fn fetcher(transport: Arc<ScriptedTransport>) -> PagedFetcher {
        PagedFetcher::new(
            CatalogEndpoint::new("http://catalog.test/api/items").with_category(38),
            transport,
            Arc::new(NoopObserver),
            FetcherConfig::default(),
        )
    }

    fn proxy(n: u8) -> ProxyAddress {
        ProxyAddress::parse(&format!("10.0.0.{}:8080", n)).unwrap()
    }

    #[test]
    fn page_url_carries_category_and_page() {
        let endpoint = CatalogEndpoint::new("https://catalog.test/api/items?sort=new").with_category(38);

        assert_eq!(
            endpoint.page_url(3).unwrap(),
            "https://catalog.test/api/items?sort=new&category=38&page=3"
        );
    }

    #[test]
    fn invalid_base_url_is_a_config_error() {
        let err = CatalogEndpoint::new("not a url").page_url(1).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn single_page_yields_one_payload() {
        let transport = Arc::new(ScriptedTransport::new().route("page=7", vec![ok(200, r#"{"data":[]}"#)]));

        let payloads = fetcher(transport).fetch_range(7, 7, &[]).await.unwrap();

        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].page, 7);
        assert_eq!(payloads[0].body, serde_json::json!({"data": []}));
    }

    #[tokio::test]
    async fn every_page_requested_exactly_once() {
        let transport = Arc::new(ScriptedTransport::new().route("catalog.test", vec![ok(200, "{}")]));

        let payloads = fetcher(transport.clone()).fetch_range(3, 6, &[]).await.unwrap();

        let mut pages: Vec<u32> = payloads.iter().map(|p| p.page).collect();
        pages.sort_unstable();
        assert_eq!(pages, vec![3, 4, 5, 6]);
        assert_eq!(transport.calls().len(), 4);
        assert!(transport.calls().iter().all(|c| c.proxy.is_none()));
    }

    #[tokio::test]
    async fn proxies_are_assigned_round_robin() {
        let transport = Arc::new(ScriptedTransport::new().route("catalog.test", vec![ok(200, "{}")]));
        let proxies = vec![proxy(1), proxy(2)];

        fetcher(transport.clone()).fetch_range(1, 3, &proxies).await.unwrap();

        let mut assigned: Vec<(String, String)> = transport
            .calls()
            .into_iter()
            .map(|c| (c.url, c.proxy.unwrap().to_string()))
            .collect();
        assigned.sort();
        assert_eq!(
            assigned,
            vec![
                ("http://catalog.test/api/items?category=38&page=1".to_string(), proxy(1).to_string()),
                ("http://catalog.test/api/items?category=38&page=2".to_string(), proxy(2).to_string()),
                ("http://catalog.test/api/items?category=38&page=3".to_string(), proxy(1).to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn one_failed_page_fails_the_batch() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .route("catalog.test", vec![ok(200, "{}")])
                .route("page=4", vec![Err(TransportError::Timeout)]),
        );

        let err = fetcher(transport.clone()).fetch_range(3, 5, &[]).await.unwrap_err();

        match err {
            Error::FetchGap {
                requested,
                received,
                missing,
            } => {
                assert_eq!((requested, received), (3, 2));
                assert_eq!(missing, vec![4]);
            }
            other => panic!("unexpected error {other:?}"),
        }
        // siblings were not cancelled
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn bad_status_or_body_counts_as_failure() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .route("page=1", vec![ok(500, "{}")])
                .route("page=2", vec![ok(200, "<html>")])
                .route("page=3", vec![ok(200, "{}")]),
        );

        let err = fetcher(transport).fetch_range(1, 3, &[]).await.unwrap_err();

        assert!(matches!(err, Error::FetchGap { ref missing, .. } if missing == &vec![1, 2]));
    }

    #[tokio::test]
    async fn unreachable_api_yields_no_payloads() {
        let transport = Arc::new(
            ScriptedTransport::new()
                .route("catalog.test", vec![Err(TransportError::Connect("refused".into()))]),
        );

        let payloads = fetcher(transport).fetch_range(1, 3, &[]).await.unwrap();

        assert!(payloads.is_empty());
    }

    #[tokio::test]
    async fn inverted_range_is_rejected() {
        let transport = Arc::new(ScriptedTransport::new());

        let err = fetcher(transport).fetch_range(5, 4, &[]).await.unwrap_err();

        assert!(matches!(err, Error::Config { .. }));
    }
}
