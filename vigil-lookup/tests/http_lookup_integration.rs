//! Integration tests for the HTTP-backed lookup service.
//!
//! A wiremock server stands in for the upstream company registry so the
//! tests can count upstream requests precisely.

use std::time::Duration;
use vigil_lookup::{http_service, CompanyRecord, FetchError, LookupConfig, LookupError};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> LookupConfig {
    LookupConfig {
        base_url: server.uri(),
        timeout_seconds: 1,
        ..Default::default()
    }
}

fn acme_body() -> serde_json::Value {
    serde_json::json!({
        "companies": [
            {"name": "Acme Corp", "registration_number": "01234567", "country": "GB"},
            {"name": "Acme Corporation Holdings"}
        ]
    })
}

fn upstream_cause(err: LookupError) -> FetchError {
    match err {
        LookupError::Upstream(vigil_lookup::CacheError::LookupFailed(cause)) => (*cause).clone(),
        other => panic!("expected upstream failure, got {other:?}"),
    }
}

#[tokio::test]
async fn first_match_is_returned_then_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .and(query_param("name", "acme corp"))
        .respond_with(ResponseTemplate::new(200).set_body_json(acme_body()))
        .expect(1)
        .mount(&server)
        .await;

    let service = http_service(&config_for(&server)).unwrap();

    let first = service.search("  Acme Corp  ").await.unwrap();
    assert!(!first.from_cache);
    assert_eq!(
        first.result,
        Some(CompanyRecord {
            name: "Acme Corp".into(),
            registration_number: Some("01234567".into()),
            domain: None,
            country: Some("GB".into()),
        })
    );

    let second = service.search("acme corp").await.unwrap();
    assert!(second.from_cache);
    assert_eq!(second.result, first.result);
}

#[tokio::test]
async fn empty_company_list_is_a_cached_no_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"companies": []})))
        .expect(1)
        .mount(&server)
        .await;

    let service = http_service(&config_for(&server)).unwrap();

    let first = service.search("Ghost Co").await.unwrap();
    let second = service.search("Ghost Co").await.unwrap();
    assert_eq!((first.result.clone(), first.from_cache), (None, false));
    assert_eq!((second.result, second.from_cache), (None, true));
}

#[tokio::test]
async fn not_found_status_means_no_match() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let service = http_service(&config_for(&server)).unwrap();
    let outcome = service.search("Nobody Ltd").await.unwrap();
    assert!(outcome.result.is_none());
}

#[tokio::test]
async fn rate_limit_surfaces_as_upstream_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "30"))
        .mount(&server)
        .await;

    let service = http_service(&config_for(&server)).unwrap();
    let err = service.search("Acme Corp").await.unwrap_err();
    match upstream_cause(err) {
        FetchError::RateLimited(msg) => assert!(msg.contains("30")),
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let service = http_service(&config_for(&server)).unwrap();
    for _ in 0..2 {
        let err = service.search("Acme Corp").await.unwrap_err();
        assert!(matches!(upstream_cause(err), FetchError::Http(_)));
    }
    assert_eq!(service.cached_entries(), 0);
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let service = http_service(&config_for(&server)).unwrap();
    let err = service.search("Acme Corp").await.unwrap_err();
    assert!(matches!(upstream_cause(err), FetchError::Parse(_)));
}

#[tokio::test]
async fn slow_registry_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(acme_body())
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let service = http_service(&config_for(&server)).unwrap();
    let err = service.search("Acme Corp").await.unwrap_err();
    assert!(matches!(upstream_cause(err), FetchError::Timeout(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_searches_make_one_upstream_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/companies"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(acme_body())
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let service = http_service(&config_for(&server)).unwrap();
    let handles: Vec<_> = (0..10)
        .map(|i| {
            let service = service.clone();
            let name = if i % 2 == 0 { "Acme Corp" } else { " acme  CORP " };
            tokio::spawn(async move { service.search(name).await })
        })
        .collect();

    let mut fresh = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.result.as_ref().map(|r| r.name.as_str()), Some("Acme Corp"));
        if !outcome.from_cache {
            fresh += 1;
        }
    }
    assert_eq!(fresh, 1);
    assert_eq!(service.cache_stats().misses, 1);
}
