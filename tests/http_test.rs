use harvestrs::fetcher::{CatalogEndpoint, FetcherConfig, PagedFetcher};
use harvestrs::transport::TransportRequest;
use harvestrs::{Error, NoopObserver, ProxyAddress, ReqwestTransport, Transport, TransportError};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn direct_request_reports_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ip"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let request = TransportRequest::new(format!("{}/ip", server.uri()), Duration::from_secs(5));
    let resp = ReqwestTransport::new().get(&request).await.unwrap();

    assert_eq!(resp.status, 429);
    assert_eq!(resp.body, "slow down");
}

#[tokio::test]
async fn slow_response_is_a_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let request = TransportRequest::new(server.uri(), Duration::from_millis(200));
    let err = ReqwestTransport::new().get(&request).await.unwrap_err();

    assert_eq!(err, TransportError::Timeout);
}

#[tokio::test]
async fn dead_proxy_is_an_error() {
    let server = MockServer::start().await;
    let proxy = ProxyAddress::parse(&format!("127.0.0.1:{}", closed_port()));

    let request = TransportRequest::new(server.uri(), Duration::from_secs(5)).via(proxy);
    let err = ReqwestTransport::new().get(&request).await.unwrap_err();

    assert_ne!(err, TransportError::Timeout);
}

#[tokio::test]
async fn fetcher_reads_page_range_from_api() {
    let server = MockServer::start().await;
    for page in ["3", "4"] {
        Mock::given(method("GET"))
            .and(path("/api/items"))
            .and(query_param("category", "38"))
            .and(query_param("page", page))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"previews": {"mp4": {"url": format!("{}.mp4", page)}}}]
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let fetcher = PagedFetcher::new(
        CatalogEndpoint::new(format!("{}/api/items", server.uri())).with_category(38),
        Arc::new(ReqwestTransport::new()),
        Arc::new(NoopObserver),
        FetcherConfig::default(),
    );
    let mut payloads = fetcher.fetch_range(3, 4, &[]).await.unwrap();
    payloads.sort_by_key(|p| p.page);

    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[1].body["data"][0]["previews"]["mp4"]["url"], "4.mp4");
}

#[tokio::test]
async fn failed_page_is_a_gap() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let fetcher = PagedFetcher::new(
        CatalogEndpoint::new(server.uri()),
        Arc::new(ReqwestTransport::new()),
        Arc::new(NoopObserver),
        FetcherConfig::default(),
    );
    let err = fetcher.fetch_range(1, 2, &[]).await.unwrap_err();

    match err {
        Error::FetchGap {
            requested,
            received,
            missing,
        } => {
            assert_eq!((requested, received), (2, 1));
            assert_eq!(missing, vec![2]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}
