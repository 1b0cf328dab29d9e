//! Snowflake connector protocol tests.
//!
//! Uses `wiremock` to stand in for the Snowflake REST endpoints, so no real
//! account is needed.

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use sales_atlas::analysis::Analysis;
use sales_atlas::config::{Config, WarehouseConfig};
use sales_atlas::error::AtlasError;
use sales_atlas::pipeline::{Pipeline, PipelineConfig, SectionOutcome};
use sales_atlas::render::Dashboard;
use sales_atlas::warehouse::{SnowflakeWarehouse, Value, WarehouseBackend, WarehouseClient};

const TOKEN: &str = "test-session-token";

fn test_config(server: &MockServer) -> WarehouseConfig {
    WarehouseConfig {
        backend: WarehouseBackend::Snowflake,
        account: Some("xy12345.eu-west-1".to_string()),
        user: Some("analyst".to_string()),
        host: Some(server.uri()),
        query_timeout_secs: 5,
        ..WarehouseConfig::default()
    }
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/session/v1/login-request"))
        .and(query_param("warehouse", "TASTY_DE_WH"))
        .and(query_param("roleName", "TASTY_DATA_ENGINEER"))
        .and(body_partial_json(json!({
            "data": {
                "ACCOUNT_NAME": "XY12345",
                "LOGIN_NAME": "analyst",
                "SESSION_PARAMETERS": { "GEOGRAPHY_OUTPUT_FORMAT": "GeoJSON" }
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "token": TOKEN },
            "message": null,
            "code": null,
            "success": true
        })))
        .mount(server)
        .await;
}

async fn connect(server: &MockServer) -> SnowflakeWarehouse {
    mount_login(server).await;
    SnowflakeWarehouse::connect(&test_config(server), Some("hunter2"))
        .await
        .expect("login should succeed")
}

fn query_response(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "data": data,
        "message": null,
        "code": null,
        "success": true
    }))
}

#[tokio::test]
async fn test_login_and_query() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("POST"))
        .and(path("/queries/v1/query-request"))
        .and(header("Authorization", "Snowflake Token=\"test-session-token\""))
        .and(body_partial_json(json!({ "asyncExec": false, "sequenceId": 1 })))
        .respond_with(query_response(json!({
            "rowtype": [
                { "name": "LOCATION_ID", "type": "fixed", "scale": 0 },
                { "name": "LOCATION_NAME", "type": "text" },
                { "name": "TOTAL_SALES_USD", "type": "fixed", "scale": 2 },
                { "name": "GEOMETRIC_CENTER_POINT", "type": "geography" }
            ],
            "rowset": [
                [
                    "4493",
                    "Place de la Bastille",
                    "298402.00",
                    "{\"coordinates\":[2.3649,48.8568],\"type\":\"Point\"}"
                ],
                ["3519", null, "272115.50", null]
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.execute_query("SELECT 1").await.unwrap();

    assert_eq!(result.row_count, 2);
    assert_eq!(result.columns[3].name, "GEOMETRIC_CENTER_POINT");
    assert_eq!(result.columns[3].data_type, "geography");
    assert_eq!(result.rows[0][0], Value::Int(4493));
    assert_eq!(result.rows[0][2], Value::Float(298402.0));
    assert_eq!(
        result.rows[0][3],
        Value::from("{\"coordinates\":[2.3649,48.8568],\"type\":\"Point\"}")
    );
    assert_eq!(result.rows[1][1], Value::Null);
}

#[tokio::test]
async fn test_login_rejected_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/v1/login-request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "message": "Incorrect username or password was specified.",
            "code": "390100",
            "success": false
        })))
        .mount(&server)
        .await;

    let err = SnowflakeWarehouse::connect(&test_config(&server), Some("wrong"))
        .await
        .unwrap_err();

    assert!(matches!(err, AtlasError::Connection(_)));
    assert!(err.is_fatal());
    assert!(err.to_string().contains("Incorrect username or password"));
    assert!(err.to_string().contains("390100"));
}

#[tokio::test]
async fn test_login_http_failure_is_connection_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/session/v1/login-request"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = SnowflakeWarehouse::connect(&test_config(&server), Some("pw"))
        .await
        .unwrap_err();
    assert!(matches!(err, AtlasError::Connection(_)));
}

#[tokio::test]
async fn test_missing_password_is_config_error() {
    let server = MockServer::start().await;
    let err = SnowflakeWarehouse::connect(&test_config(&server), None)
        .await
        .unwrap_err();
    assert_eq!(err.category(), "Configuration Error");
}

#[tokio::test]
async fn test_query_failure_is_query_error() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("POST"))
        .and(path("/queries/v1/query-request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "errorCode": "002003" },
            "message": "SQL compilation error: Object 'ORDERS_V' does not exist.",
            "code": "002003",
            "success": false
        })))
        .mount(&server)
        .await;

    let err = client.execute_query("SELECT * FROM orders_v").await.unwrap_err();
    assert!(matches!(err, AtlasError::Query(_)));
    assert!(!err.is_fatal());
    assert!(err.to_string().contains("(code 002003)"));
}

#[tokio::test]
async fn test_rejected_session_token_ends_the_pass() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("POST"))
        .and(path("/queries/v1/query-request"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.execute_query("SELECT 1").await.unwrap_err();
    assert!(matches!(err, AtlasError::Connection(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_expired_session_skips_remaining_sections() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("POST"))
        .and(path("/queries/v1/query-request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "message": "Authentication token has expired.",
            "code": "390112",
            "success": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = PipelineConfig::from_config(&Config::default()).unwrap();
    let mut dashboard = Dashboard::new();
    let report = Pipeline::new(&client, &config).run(&mut dashboard).await;

    assert!(matches!(
        report.outcome(Analysis::TopLocations),
        Some(SectionOutcome::Failed { .. })
    ));
    for analysis in [
        Analysis::BoundingArea,
        Analysis::Centroid,
        Analysis::FarthestLocations,
    ] {
        assert_eq!(report.outcome(analysis), Some(&SectionOutcome::Skipped));
    }
    assert_eq!(dashboard.errors().count(), 1);
    assert!(report.pass_error().unwrap().is_fatal());
}

#[tokio::test]
async fn test_result_chunks_are_appended_in_order() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("POST"))
        .and(path("/queries/v1/query-request"))
        .respond_with(query_response(json!({
            "rowtype": [
                { "name": "LOCATION_NAME", "type": "text" },
                { "name": "KILOMETER_FROM_TOP_SELLING_CENTER", "type": "fixed", "scale": 2 }
            ],
            "rowset": [["Porte Maillot", "6.43"]],
            "chunks": [
                { "url": format!("{}/chunks/0", server.uri()), "rowCount": 2 }
            ],
            "chunkHeaders": { "x-amz-server-side-encryption-customer-key": "k" }
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/chunks/0"))
        .and(header("x-amz-server-side-encryption-customer-key", "k"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"["Parc Montsouris","4.32"],["Bercy","3.90"]"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let result = client.execute_query("SELECT 1").await.unwrap();
    let names: Vec<String> = result
        .rows
        .iter()
        .map(|row| row[0].to_display_string())
        .collect();
    assert_eq!(names, vec!["Porte Maillot", "Parc Montsouris", "Bercy"]);
    assert_eq!(result.rows[2][1], Value::Float(3.9));
}

#[tokio::test]
async fn test_running_statement_is_polled() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("POST"))
        .and(path("/queries/v1/query-request"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {
                "queryId": "01b2-0000",
                "getResultUrl": "/queries/01b2-0000/result"
            },
            "message": "Asynchronous execution in progress.",
            "code": "333334",
            "success": true
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/queries/01b2-0000/result"))
        .and(header("Authorization", "Snowflake Token=\"test-session-token\""))
        .respond_with(query_response(json!({
            "rowtype": [{ "name": "N", "type": "fixed", "scale": 0 }],
            "rowset": [["7"]]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.execute_query("SELECT 7 AS N").await.unwrap();
    assert_eq!(result.rows[0][0], Value::Int(7));
}

#[tokio::test]
async fn test_close_deletes_session() {
    let server = MockServer::start().await;
    let client = connect(&server).await;

    Mock::given(method("POST"))
        .and(path("/session"))
        .and(query_param("delete", "true"))
        .and(header("Authorization", "Snowflake Token=\"test-session-token\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "success": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    client.close().await.unwrap();
}
