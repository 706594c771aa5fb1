//! Tests for the HTTP transport

use super::*;
use crate::auth::AuthContext;
use crate::error::Error;
use crate::types::BackoffType;
use reqwest::Method;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fast_client(server: &MockServer) -> (HttpClient, String) {
    let config = HttpClientConfig::builder()
        .max_attempts(3)
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(10),
            Duration::from_millis(100),
        )
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config)
        .unwrap()
        .with_auth(AuthContext::bearer_token("test-token"));
    (client, server.uri())
}

#[test]
fn test_http_client_config_default() {
    let config = HttpClientConfig::default();
    assert_eq!(config.max_attempts, 5);
    assert_eq!(config.initial_backoff, Duration::from_secs(5));
    assert_eq!(config.pool_size, 100);
    assert_eq!(config.backoff_type, BackoffType::Platform);
    assert!(config.rate_limit.is_some());
}

#[test]
fn test_http_client_config_builder() {
    let config = HttpClientConfig::builder()
        .timeout(Duration::from_secs(60))
        .max_attempts(0)
        .pool_size(8)
        .retry_status(403)
        .header("X-Custom", "value")
        .user_agent("test-agent/1.0")
        .build();

    assert_eq!(config.timeout, Duration::from_secs(60));
    assert_eq!(config.max_attempts, 1);
    assert_eq!(config.pool_size, 8);
    assert_eq!(config.retry_statuses, vec![403]);
    assert_eq!(
        config.default_headers.get("X-Custom"),
        Some(&"value".to_string())
    );
    assert_eq!(config.user_agent, "test-agent/1.0");
}

#[test]
fn test_request_config_builder() {
    let config = RequestConfig::new()
        .header("X-Request-Id", "abc123")
        .json(serde_json::json!({"key": "value"}))
        .timeout(Duration::from_secs(10))
        .attempts(2)
        .retry_on(409);

    assert_eq!(
        config.headers.get("X-Request-Id"),
        Some(&"abc123".to_string())
    );
    assert!(config.body.is_some());
    assert_eq!(config.timeout, Some(Duration::from_secs(10)));
    assert_eq!(config.max_attempts, Some(2));
    assert_eq!(config.retry_statuses, vec![409]);
}

#[tokio::test]
async fn test_post_json_sends_bearer_and_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/ReportDefinitionService/get"))
        .and(header("Authorization", "Bearer test-token"))
        .and(body_json(serde_json::json!({"accountId": "1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, base) = fast_client(&mock_server);
    let value: serde_json::Value = client
        .post_json_for(
            &format!("{base}/ReportDefinitionService/get"),
            serde_json::json!({"accountId": "1"}),
        )
        .await
        .unwrap();

    assert_eq!(value["ok"], true);
}

#[tokio::test]
async fn test_default_headers_applied() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/secure"))
        .and(header("X-Custom", "secret123"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let config = HttpClientConfig::builder()
        .header("X-Custom", "secret123")
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();
    let response = client
        .execute(
            Method::GET,
            &format!("{}/api/secure", mock_server.uri()),
            RequestConfig::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_client_error_carries_raw_body() {
    let mock_server = MockServer::start().await;
    let body = r#"[{"errorCode":"INVALID_PARAMETER","message":"bad"}]"#;

    Mock::given(method("POST"))
        .and(path("/add"))
        .respond_with(ResponseTemplate::new(400).set_body_string(body))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, base) = fast_client(&mock_server);
    let err = client
        .post_json(&format!("{base}/add"), serde_json::json!({}))
        .await
        .unwrap_err();

    match &err {
        Error::HttpStatus { status, body: raw } => {
            assert_eq!(*status, 400);
            assert_eq!(raw, body);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.platform_errors()[0].error_code, "INVALID_PARAMETER");
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/get"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (client, base) = fast_client(&mock_server);
    let err = client
        .post_json(&format!("{base}/get"), serde_json::json!({}))
        .await
        .unwrap_err();

    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_retry_on_500_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let (client, base) = fast_client(&mock_server);
    let response = client
        .post_json(&format!("{base}/flaky"), serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_attempts_exhausted_surfaces_last_status() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/always-fail"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let (client, base) = fast_client(&mock_server);
    let err = client
        .post_json(&format!("{base}/always-fail"), serde_json::json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
}

#[tokio::test]
async fn test_caller_chosen_status_is_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(403).set_body_string(
            r#"[{"errorCode":"REQUEST_LIMIT_EXCEEDED","message":"slow down"}]"#,
        ))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/limited"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    let (client, base) = fast_client(&mock_server);
    let response = client
        .execute(
            Method::POST,
            &format!("{base}/limited"),
            RequestConfig::new().retry_on(403),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_rate_limit_retry_after() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/throttled"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "60")
                .set_body_string("Rate limited"),
        )
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/throttled"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&mock_server)
        .await;

    // retry-after is capped by max_backoff (100ms)
    let (client, base) = fast_client(&mock_server);
    let response = client
        .post_json(&format!("{base}/throttled"), serde_json::json!({}))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_connection_error_is_retried_then_surfaced() {
    let config = HttpClientConfig::builder()
        .max_attempts(2)
        .backoff(
            BackoffType::Constant,
            Duration::from_millis(5),
            Duration::from_millis(5),
        )
        .no_rate_limit()
        .build();
    let client = HttpClient::with_config(config).unwrap();

    // Nothing listens on port 9 on the loopback interface
    let err = client
        .post_json("http://127.0.0.1:9/add", serde_json::json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Http(_)));
}

#[test]
fn test_calculate_backoff_platform_default() {
    let client = HttpClient::with_config(HttpClientConfig::builder().no_rate_limit().build())
        .unwrap();

    assert_eq!(client.calculate_backoff(0), Duration::from_secs(5));
    assert_eq!(client.calculate_backoff(1), Duration::from_secs(25));
    assert_eq!(client.calculate_backoff(2), Duration::from_secs(125));
    assert_eq!(client.calculate_backoff(3), Duration::from_secs(625));
    assert_eq!(client.calculate_backoff(4), Duration::from_secs(625));
}

#[test]
fn test_calculate_backoff_constant_and_linear() {
    let constant = HttpClient::with_config(
        HttpClientConfig::builder()
            .backoff(
                BackoffType::Constant,
                Duration::from_millis(100),
                Duration::from_secs(10),
            )
            .no_rate_limit()
            .build(),
    )
    .unwrap();
    assert_eq!(constant.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(constant.calculate_backoff(5), Duration::from_millis(100));

    let linear = HttpClient::with_config(
        HttpClientConfig::builder()
            .backoff(
                BackoffType::Linear,
                Duration::from_millis(100),
                Duration::from_secs(10),
            )
            .no_rate_limit()
            .build(),
    )
    .unwrap();
    assert_eq!(linear.calculate_backoff(0), Duration::from_millis(100));
    assert_eq!(linear.calculate_backoff(2), Duration::from_millis(300));
}

#[test]
fn test_calculate_backoff_overflow_caps_at_max() {
    let client = HttpClient::with_config(
        HttpClientConfig::builder()
            .backoff(
                BackoffType::Exponential { factor: 2 },
                Duration::from_millis(100),
                Duration::from_millis(500),
            )
            .no_rate_limit()
            .build(),
    )
    .unwrap();

    assert_eq!(client.calculate_backoff(1), Duration::from_millis(200));
    assert_eq!(client.calculate_backoff(10), Duration::from_millis(500));
    assert_eq!(client.calculate_backoff(200), Duration::from_millis(500));
}

#[test]
fn test_http_client_debug() {
    let client = HttpClient::new().unwrap();
    let debug_str = format!("{client:?}");
    assert!(debug_str.contains("HttpClient"));
    assert!(client.has_rate_limiter());
}
