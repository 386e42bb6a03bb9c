use std::io;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use serde_json::{Value, json};
use tower::util::ServiceExt;

use marrakesh_ingest::api::{ApiState, create_api_router};
use marrakesh_ingest::auth::{ApiKeyValidation, ApiKeyValidator, StaticKeyValidator};
use marrakesh_ingest::relay::SinkClient;
use marrakesh_ingest::schema::RecordKind;

const API_KEY: &str = "pk_test_valid";
const USER_ID: &str = "user_123";

fn app_with(validator: Arc<dyn ApiKeyValidator>, sink: &MockServer) -> Router {
    let sink = SinkClient::with_client(reqwest::Client::new(), &sink.base_url(), "tb_test");
    create_api_router(ApiState::new(validator, sink))
}

fn app(sink: &MockServer) -> Router {
    app_with(Arc::new(StaticKeyValidator::single(API_KEY, USER_ID)), sink)
}

fn ingest_request(key: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/ingest")
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(body.into()).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn tool_call() -> Value {
    json!({
        "cost_usd": 0.5,
        "execution_id": "e1",
        "execution_time_ms": 10,
        "input_tokens": 5,
        "output_tokens": 5,
        "prompt_id": "p1",
        "status": "OK",
        "tool_call_id": "t1",
        "tool_name": "search"
    })
}

fn all_kinds() -> Value {
    json!({
        "tool_calls": [tool_call()],
        "prompt_metadata": [{
            "account_id": "acc_123",
            "created_at": "2025-10-15T10:00:00Z",
            "description": "A sample prompt for testing.",
            "is_active": 1,
            "name": "Sample Prompt",
            "organization_id": "org_456",
            "prompt_id": "prompt_789",
            "prompt_text": "This is a sample prompt text.",
            "updated_at": "2025-10-15T08:00:00Z",
            "version": "1.0"
        }],
        "prompt_executions": [{
            "account_id": "acc123",
            "cost_usd": 0.123,
            "execution_id": "exec456",
            "execution_time_ms": 150,
            "execution_timestamp": "2025-10-15T10:00:00Z",
            "model": "gpt-3.5-turbo",
            "organization_id": "org789",
            "prompt_id": "prompt101",
            "prompt_name": "Summarize",
            "prompt_version": "v1",
            "region": "us-east-1",
            "request_tokens": 100,
            "response_tokens": 50,
            "session_id": "sess112",
            "status": "success",
            "error_message": null
        }],
        "test_runs": [{
            "test_run_id": "run_1",
            "prompt_id": "p1",
            "prompt_name": "Summarize",
            "total_tests": 2,
            "passed_tests": 1,
            "failed_tests": 1,
            "duration_ms": 900,
            "environment": "production",
            "timestamp": "2025-10-15T10:00:00Z"
        }],
        "test_cases": [{
            "test_case_id": "case_1",
            "test_run_id": "run_1",
            "prompt_id": "p1",
            "input": "2+2",
            "actual_output": "4",
            "expected_output": "4",
            "passed": true,
            "duration_ms": 12,
            "execution_id": "exec456"
        }]
    })
}

#[tokio::test]
async fn single_tool_call_is_ingested() {
    let sink = MockServer::start();
    let mock = sink.mock(|when, then| {
        when.method(POST)
            .path("/v0/events")
            .query_param("name", "tool_calls")
            .header("authorization", "Bearer tb_test");
        then.status(202)
            .body(r#"{"successful_rows":1,"quarantined_rows":0}"#);
    });

    let body = json!({ "tool_calls": [tool_call()] }).to_string();
    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["results"]["tool_calls"]["success"], true);
    assert_eq!(
        body["results"]["tool_calls"]["message"],
        "Successfully sent batch of 1 records to tool_calls"
    );
    mock.assert_calls(1);
}

#[tokio::test]
async fn omitted_kinds_report_no_data() {
    let sink = MockServer::start();
    let mock = sink.mock(|when, then| {
        when.method(POST).path("/v0/events");
        then.status(200);
    });

    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), "{}")).await;

    assert_eq!(status, StatusCode::OK);
    for kind in ["tool_calls", "prompt_metadata", "prompt_executions", "test_runs", "test_cases"] {
        assert_eq!(body["results"][kind]["success"], true, "{kind}");
        assert_eq!(body["results"][kind]["message"], "No data to send", "{kind}");
    }
    mock.assert_calls(0);
}

#[tokio::test]
async fn timestamps_are_normalized_before_relay() {
    let sink = MockServer::start();
    let mock = sink.mock(|when, then| {
        when.method(POST)
            .path("/v0/events")
            .query_param("name", "tool_calls")
            .body_includes("\"tool_call_timestamp\":\"2025-10-15T10:11:12.000Z\"");
        then.status(200);
    });

    let mut call = tool_call();
    call["tool_call_timestamp"] = json!("2025-10-15T12:11:12+02:00");
    let body = json!({ "tool_calls": [call] }).to_string();
    let (status, _) = send(app(&sink), ingest_request(Some(API_KEY), body)).await;

    assert_eq!(status, StatusCode::OK);
    mock.assert_calls(1);
}

#[tokio::test]
async fn unparseable_timestamp_is_rejected() {
    let sink = MockServer::start();
    let mock = sink.mock(|when, then| {
        when.method(POST).path("/v0/events");
        then.status(200);
    });

    let mut call = tool_call();
    call["tool_call_timestamp"] = json!("the day after tomorrow");
    let body = json!({ "tool_calls": [call] }).to_string();
    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid date format");
    assert!(
        body["details"]
            .as_str()
            .unwrap()
            .starts_with("tool_calls[0].tool_call_timestamp")
    );
    mock.assert_calls(0);
}

#[tokio::test]
async fn caller_cannot_choose_user_id() {
    let sink = MockServer::start();
    let owned = sink.mock(|when, then| {
        when.method(POST)
            .path("/v0/events")
            .body_includes(format!("\"user_id\":\"{}\"", USER_ID));
        then.status(200);
    });
    let spoofed = sink.mock(|when, then| {
        when.method(POST).path("/v0/events").body_includes("intruder");
        then.status(500);
    });

    let mut call = tool_call();
    call["user_id"] = json!("intruder");
    let body = json!({ "tool_calls": [call] }).to_string();
    let (status, _) = send(app(&sink), ingest_request(Some(API_KEY), body)).await;

    assert_eq!(status, StatusCode::OK);
    owned.assert_calls(1);
    spoofed.assert_calls(0);
}

#[tokio::test]
async fn batch_rejection_falls_back_to_single_records() {
    let sink = MockServer::start();
    let batch = sink.mock(|when, then| {
        when.method(POST)
            .path("/v0/events")
            .header("content-type", "application/x-ndjson");
        then.status(503).body("try again later");
    });
    let single = sink.mock(|when, then| {
        when.method(POST)
            .path("/v0/events")
            .header("content-type", "application/json");
        then.status(202);
    });

    let mut second = tool_call();
    second["tool_call_id"] = json!("t2");
    let body = json!({ "tool_calls": [tool_call(), second] }).to_string();
    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["results"]["tool_calls"]["message"],
        "Successfully sent 2/2 records to tool_calls (fallback mode)"
    );
    batch.assert_calls(1);
    single.assert_calls(2);
}

#[tokio::test]
async fn one_failing_kind_does_not_hide_the_others() {
    let sink = MockServer::start();
    let failing = sink.mock(|when, then| {
        when.method(POST)
            .path("/v0/events")
            .query_param("name", "prompt_executions");
        then.status(500).body("datasource not found");
    });
    for kind in ["tool_calls", "prompt_metadata", "test_runs", "test_cases"] {
        sink.mock(|when, then| {
            when.method(POST).path("/v0/events").query_param("name", kind);
            then.status(200);
        });
    }

    let body = all_kinds().to_string();
    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), body)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Data ingestion failed");
    let details = body["details"].as_array().unwrap();
    assert_eq!(details.len(), 1);
    assert!(details[0].as_str().unwrap().starts_with("Prompt executions: Record 1:"));

    assert_eq!(body["results"]["prompt_executions"]["success"], false);
    for kind in ["tool_calls", "prompt_metadata", "test_runs", "test_cases"] {
        assert_eq!(body["results"][kind]["success"], true, "{kind}");
    }
    // 整批一次 + 逐条回退一次
    failing.assert_calls(2);
}

#[tokio::test]
async fn missing_api_key_never_reaches_the_sink() {
    let sink = MockServer::start();
    let mock = sink.mock(|when, then| {
        when.method(POST).path("/v0/events");
        then.status(200);
    });

    let body = json!({ "tool_calls": [tool_call()] }).to_string();
    let (status, body) = send(app(&sink), ingest_request(None, body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "API key required"}));
    mock.assert_calls(0);
}

#[tokio::test]
async fn garbage_api_key_is_rejected() {
    let sink = MockServer::start();
    let mock = sink.mock(|when, then| {
        when.method(POST).path("/v0/events");
        then.status(200);
    });

    let body = json!({ "tool_calls": [tool_call()] }).to_string();
    let (status, body) = send(app(&sink), ingest_request(Some("pk_garbage"), body)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"error": "Invalid API key"}));
    mock.assert_calls(0);
}

struct ExpiredKeys;

#[async_trait]
impl ApiKeyValidator for ExpiredKeys {
    async fn validate(&self, _key: &str) -> anyhow::Result<ApiKeyValidation> {
        Ok(ApiKeyValidation::Invalid {
            error: Some("API key has expired".to_string()),
        })
    }
}

struct BrokenOracle;

#[async_trait]
impl ApiKeyValidator for BrokenOracle {
    async fn validate(&self, _key: &str) -> anyhow::Result<ApiKeyValidation> {
        anyhow::bail!("connection refused")
    }
}

#[tokio::test]
async fn oracle_message_is_passed_through() {
    let sink = MockServer::start();
    let (status, body) = send(
        app_with(Arc::new(ExpiredKeys), &sink),
        ingest_request(Some("pk_old"), "{}"),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "API key has expired");
}

#[tokio::test]
async fn oracle_outage_is_a_server_error() {
    let sink = MockServer::start();
    let (status, body) = send(
        app_with(Arc::new(BrokenOracle), &sink),
        ingest_request(Some(API_KEY), "{}"),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert_eq!(body["details"], "connection refused");
}

#[tokio::test]
async fn empty_body_is_rejected() {
    let sink = MockServer::start();
    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), "  \n")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Request body is empty"}));
}

#[tokio::test]
async fn invalid_json_is_rejected() {
    let sink = MockServer::start();
    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), "not json")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"error": "Invalid JSON in request body"}));
}

#[tokio::test]
async fn is_active_outside_zero_one_is_rejected() {
    let sink = MockServer::start();
    let mock = sink.mock(|when, then| {
        when.method(POST).path("/v0/events");
        then.status(200);
    });

    let mut body = all_kinds();
    body["prompt_metadata"][0]["is_active"] = json!(2);
    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), body.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid request data");
    assert!(
        body["details"]
            .as_str()
            .unwrap()
            .starts_with("prompt_metadata[0].is_active")
    );
    // 整个请求被拒绝，其他类别也不投递
    mock.assert_calls(0);
}

#[tokio::test]
async fn quarantined_rows_are_reported_but_not_failures() {
    let sink = MockServer::start();
    sink.mock(|when, then| {
        when.method(POST).path("/v0/events");
        then.status(202)
            .body(r#"{"successful_rows":0,"quarantined_rows":1}"#);
    });

    let body = json!({ "tool_calls": [tool_call()] }).to_string();
    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), body)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"]["tool_calls"]["success"], true);
    assert_eq!(body["results"]["tool_calls"]["quarantined_rows"], 1);
}

#[tokio::test]
async fn oversized_body_gets_json_error() {
    let sink = MockServer::start();
    let mock = sink.mock(|when, then| {
        when.method(POST).path("/v0/events");
        then.status(200);
    });

    let body = vec![b' '; 17 * 1024 * 1024];
    let (status, body) = send(app(&sink), ingest_request(Some(API_KEY), body)).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "Failed to read request body");
    assert!(!body["details"].as_str().unwrap().is_empty());
    mock.assert_calls(0);
}

#[tokio::test]
async fn kinds_are_relayed_concurrently() {
    let sink = MockServer::start();
    let mocks: Vec<_> = RecordKind::ALL
        .iter()
        .map(|kind| {
            sink.mock(|when, then| {
                when.method(POST)
                    .path("/v0/events")
                    .query_param("name", kind.table_name());
                then.status(200).delay(Duration::from_millis(300));
            })
        })
        .collect();

    let started = Instant::now();
    let (status, _) = send(app(&sink), ingest_request(Some(API_KEY), all_kinds().to_string())).await;
    let elapsed = started.elapsed();

    assert_eq!(status, StatusCode::OK);
    for mock in &mocks {
        mock.assert_calls(1);
    }
    // 串行投递至少需要 5 × 300ms
    assert!(elapsed < Duration::from_millis(1200), "耗时 {elapsed:?}");
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn auth_logs_carry_request_id() {
    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let sink = MockServer::start();
    let (status, _) = send(app(&sink), ingest_request(None, "{}")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let output = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
    let line = output
        .lines()
        .find(|l| l.contains("缺少 API Key"))
        .expect("认证失败应当有日志");
    assert!(line.contains("request_id="), "{line}");
}

#[tokio::test]
async fn validate_key_returns_owner() {
    let sink = MockServer::start();
    let request = Request::builder()
        .method("POST")
        .uri("/api/validate-key")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app(&sink), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "user": USER_ID, "metadata": {}}));
}

#[tokio::test]
async fn token_usage_is_scoped_to_caller() {
    let sink = MockServer::start();
    let pipe = sink.mock(|when, then| {
        when.method(GET)
            .path("/v0/pipes/total_token_usage.json")
            .query_param("userId", USER_ID)
            .query_param("timeframe", "24h");
        then.status(200)
            .json_body(json!({"data": [{"total_tokens": 1234}]}));
    });

    let own = Request::builder()
        .uri(format!("/api/analytics/total-token-usage?userId={}", USER_ID))
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&sink), own).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["total_tokens"], 1234);

    let other = Request::builder()
        .uri("/api/analytics/total-token-usage?userId=someone_else")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&sink), other).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    pipe.assert_calls(1);
}

#[tokio::test]
async fn malformed_token_usage_query_gets_json_error() {
    let sink = MockServer::start();
    let request = Request::builder()
        .uri("/api/analytics/total-token-usage?userId=a&userId=b")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();

    let (status, body) = send(app(&sink), request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid query parameters");
    assert!(body["details"].as_str().unwrap().contains("userId"));
}

#[tokio::test]
async fn non_json_pipe_response_is_internal_error() {
    let sink = MockServer::start();
    sink.mock(|when, then| {
        when.method(GET).path("/v0/pipes/total_token_usage.json");
        then.status(200).body("<html>maintenance</html>");
    });

    let request = Request::builder()
        .uri("/api/analytics/total-token-usage")
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app(&sink), request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn health_needs_no_key() {
    let sink = MockServer::start();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(app(&sink), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}
