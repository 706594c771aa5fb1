//! Integration tests using mock HTTP server
//!
//! Tests the full end-to-end flow: config file → report specs → submit → poll
//! → download → CSV decode → sink → job removal

use ads_report_connector::catalog::FieldCatalog;
use ads_report_connector::config::ConnectorConfig;
use ads_report_connector::engine::OutcomeResult;
use ads_report_connector::output::{JsonLinesSink, MemorySink};
use ads_report_connector::{AdProduct, Error, ReportType};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::io::Write;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CSV: &str = "\u{feff}日,クリック数,コスト\n2024-01-01,10,120\n2024-01-02,7,\"1,050\"\n";

fn envelope(job_id: &str, status: &str) -> Value {
    json!({
        "rval": {"values": [{
            "operationSucceeded": true,
            "reportDefinition": {"reportJobId": job_id, "reportJobStatus": status}
        }]}
    })
}

/// Config pointing every endpoint at the mock server, with no poll delay
fn config_yaml(server: &MockServer, extra: &str) -> String {
    format!(
        r#"
credentials:
  client_id: my-client
  client_secret: my-secret
  refresh_token: my-refresh
  access_token: seed-token
accounts:
  search_account_id: "123"
start_date: "2024-01-01"
end_date: "2024-01-31"
endpoints:
  search_base_url: "{uri}/search"
  display_base_url: "{uri}/display"
  token_url: "{uri}/oauth/v1/token"
http:
  max_attempts: 1
  requests_per_second: 0
poll:
  initial_delay_secs: 0
{extra}"#,
        uri = server.uri()
    )
}

fn load_config(yaml: &str) -> ConnectorConfig {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    ConnectorConfig::load(file.path()).unwrap()
}

async fn mount_search_job(server: &MockServer, bearer: &str) {
    Mock::given(method("POST"))
        .and(path("/search/add"))
        .and(header("Authorization", format!("Bearer {bearer}").as_str()))
        .and(body_string_contains("\"reportType\":\"AD\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope("job-1", "WAIT")))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search/get"))
        .and(body_json(json!({"accountId": 123, "reportJobIds": ["job-1"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope("job-1", "IN_PROGRESS")))
        .up_to_n_times(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search/get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope("job-1", "COMPLETED")))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search/download"))
        .and(body_json(json!({"accountId": 123, "reportJobId": "job-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_string(CSV))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search/remove"))
        .and(body_json(json!({"accountId": 123, "operand": [{"reportJobId": "job-1"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(envelope("job-1", "COMPLETED")))
        .expect(1)
        .mount(server)
        .await;
}

// ============================================================================
// End-to-end
// ============================================================================

#[tokio::test]
async fn test_config_to_rows_end_to_end() {
    let server = MockServer::start().await;
    mount_search_job(&server, "seed-token").await;

    let config = load_config(&config_yaml(
        &server,
        "reports:\n  - { ad_product: SEARCH, report_type: AD }\n",
    ));
    let specs = config.report_specs(&FieldCatalog::standard()).unwrap();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].fields.first().map(String::as_str), Some("ACCOUNT_ID"));

    let engine = config.build_engine().unwrap();
    let mut sink = MemorySink::new();
    let report = engine
        .run(&specs, &mut sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.rows, 2);
    assert_eq!(report.stats.reports_succeeded, 1);
    assert_eq!(report.cleanup.removed, vec!["job-1".to_string()]);
    assert_eq!(
        report.outcomes[0].result,
        OutcomeResult::Succeeded { rows: 2 }
    );
    assert_eq!(report.outcomes[0].job_id.as_deref(), Some("job-1"));

    let rows = sink.rows("search_ad");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].columns(), ["日", "クリック数", "コスト"]);
    assert_eq!(rows[1].get("コスト"), Some("1,050"));
    assert_eq!(rows[1].line_number(), 3);
    assert_eq!(sink.completed(), [("search_ad".to_string(), 2)]);
}

#[tokio::test]
async fn test_json_lines_with_logical_names() {
    let server = MockServer::start().await;
    mount_search_job(&server, "seed-token").await;

    let config = load_config(&config_yaml(
        &server,
        "reports:\n  - { ad_product: SEARCH, report_type: AD, fields: [DAY, CLICKS, COST] }\n",
    ));
    let specs = config.report_specs(&FieldCatalog::standard()).unwrap();
    let engine = config.build_engine().unwrap();

    let mut sink = JsonLinesSink::new(Vec::new()).with_logical_names(FieldCatalog::standard());
    engine
        .run(&specs, &mut sink, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(sink.rows_written(), 2);

    let output = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<Value> = output
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "RECORD");
    assert_eq!(lines[0]["record"]["stream"], "search_ad");
    assert_eq!(
        lines[0]["record"]["data"],
        json!({"DAY": "2024-01-01", "CLICKS": "10", "COST": "120"})
    );
}

#[tokio::test]
async fn test_expired_token_is_refreshed_once() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search/add"))
        .and(header("Authorization", "Bearer seed-token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("token expired"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/oauth/v1/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=my-refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    mount_search_job(&server, "fresh-token").await;

    let config = load_config(&config_yaml(
        &server,
        "reports:\n  - { ad_product: SEARCH, report_type: AD, fields: [DAY] }\n",
    ));
    let specs = config.report_specs(&FieldCatalog::standard()).unwrap();
    let mut sink = MemorySink::new();
    let report = config
        .build_engine()
        .unwrap()
        .run(&specs, &mut sink, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stats.rows, 2);
    assert_eq!(report.cleanup.removed, vec!["job-1".to_string()]);
}

#[tokio::test]
async fn test_every_report_rejected_fails_the_run() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search/add"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!([
            {"errorCode": "INVALID_PARAMETER", "message": "bad field"}
        ])))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/search/remove"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = load_config(&config_yaml(&server, ""));
    let specs = config.report_specs(&FieldCatalog::standard()).unwrap();
    let pairs: Vec<_> = specs.iter().map(|s| (s.ad_product, s.report_type)).collect();
    assert_eq!(
        pairs,
        vec![
            (AdProduct::Search, ReportType::Ad),
            (AdProduct::Search, ReportType::AdConversion),
            (AdProduct::Search, ReportType::Keywords),
        ]
    );

    let mut sink = MemorySink::new();
    let err = config
        .build_engine()
        .unwrap()
        .run(&specs, &mut sink, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        Error::SyncFailed { failed } => {
            assert_eq!(failed.len(), 3);
            assert!(failed[0].1.contains("INVALID_PARAMETER"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(sink.total_rows(), 0);
}

#[tokio::test]
async fn test_invalid_field_never_reaches_the_platform() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let config = load_config(&config_yaml(
        &server,
        "reports:\n  - { ad_product: SEARCH, report_type: AD, fields: [NOT_A_FIELD] }\n",
    ));
    let specs = config.report_specs(&FieldCatalog::standard()).unwrap();
    let mut sink = MemorySink::new();
    let err = config
        .build_engine()
        .unwrap()
        .run(&specs, &mut sink, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SyncFailed { .. }));
}
