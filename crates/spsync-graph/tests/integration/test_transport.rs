//! Transport retry behavior of GraphClient against a mock server

use std::time::{Duration, Instant};

use reqwest::{Method, StatusCode};
use spsync_graph::GraphError;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

#[tokio::test]
async fn test_429_honors_retry_after_then_succeeds() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/sites/root"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/sites/root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "s"})))
        .mount(&server)
        .await;

    let started = Instant::now();
    let response = client
        .execute(Method::GET, "/sites/root", |r| r)
        .await
        .expect("request should succeed after 429");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(client.monitor().total_requests(), 2);
}

#[tokio::test]
async fn test_429_exhaustion_raises_too_many_requests() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/sites/root"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&server)
        .await;

    let err = client
        .execute(Method::GET, "/sites/root", |r| r)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::TooManyRequests { .. }));
}

#[tokio::test]
async fn test_server_error_retried_then_raised() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/drives/d/root"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let err = client
        .execute(Method::GET, "/drives/d/root", |r| r)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::ServerError(_)));
}

#[tokio::test]
async fn test_server_error_recovers() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/drives/d/root"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/drives/d/root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "r"})))
        .mount(&server)
        .await;

    let response = client
        .execute(Method::GET, "/drives/d/root", |r| r)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_client_errors_returned_without_retry() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/drives/d/items/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let response = client
        .execute(Method::GET, "/drives/d/items/missing", |r| r)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_conflict_retried_then_returned() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("PATCH"))
        .and(path("/drives/d/items/i/listItem/fields"))
        .respond_with(ResponseTemplate::new(409))
        .expect(3)
        .mount(&server)
        .await;

    let response = client
        .execute(Method::PATCH, "/drives/d/items/i/listItem/fields", |r| {
            r.json(&serde_json::json!({"FileHash": "x"}))
        })
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_conflict_not_retried_when_allowed() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("POST"))
        .and(path("/drives/d/items/p/children"))
        .respond_with(ResponseTemplate::new(409))
        .expect(1)
        .mount(&server)
        .await;

    let response = client
        .execute_allowing_conflict(Method::POST, "/drives/d/items/p/children", |r| r)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_throttle_headers_feed_monitor() {
    let (server, client) = common::setup_graph_mock().await;

    Mock::given(method("GET"))
        .and(path("/sites/root"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-ms-throttle-limit-percentage", "0.95")
                .insert_header("x-ms-resource-unit", "2")
                .insert_header("x-ms-throttle-scope", "Tenant_Application/ReadWrite/tenant/app"),
        )
        .mount(&server)
        .await;

    client
        .execute(Method::GET, "/sites/root", |r| r)
        .await
        .unwrap();

    assert!(client.monitor().should_slow_down());
    let summary = client.monitor().summary();
    assert_eq!(summary.alerts_triggered, 1);
    assert_eq!(summary.resource_units_consumed, 2);
    assert_eq!(summary.status, "approached limits");
}

#[tokio::test]
async fn test_network_error_retried_then_raised() {
    // Nothing listens on port 1, so every attempt fails to connect
    let client = spsync_graph::client::GraphClient::with_base_url("test-access-token", "http://127.0.0.1:1")
        .with_retry(common::fast_retry());

    let started = Instant::now();
    let err = client
        .execute(Method::GET, "/sites/root", |r| r)
        .await
        .unwrap_err();

    assert!(matches!(err, GraphError::NetworkError(_)));
    // Two backoff waits of at least 2ms and 3ms between the three attempts
    assert!(started.elapsed() >= Duration::from_millis(5));
}
