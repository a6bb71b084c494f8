use auditrail_core::BackpressureMode;
use auditrail_crypto::Signer;
use auditrail_pipeline::Worker;
use auditrail_policy::PolicyEngine;
use auditrail_proxy::{build_router, AppState};
use auditrail_store::Store;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tempfile::{tempdir, NamedTempFile};
use tower::ServiceExt;

const POLICY_YAML: &str = r#"
version: 1
defaults:
  retention_days: 90
  signing_enabled: true
  log_level: info
policies:
  - id: critical-aws
    match_methods: ["aws:*"]
    risk_level: critical
    redact: ["secret_key"]
"#;

async fn spawn_echo_upstream() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = axum::Router::new().route(
        "/",
        axum::routing::post(|body: axum::body::Bytes| async move { (axum::http::StatusCode::OK, body) }),
    );
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

// Scenario S6: policy tagging and redaction on a matched event, forwarded
// through to a live upstream.
#[tokio::test]
async fn request_is_recorded_tagged_redacted_and_forwarded() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("ledger")).unwrap());
    let signer = Arc::new(Signer::load_or_create(dir.path().join("key")).unwrap());
    let mut policy_file = NamedTempFile::new().unwrap();
    policy_file.write_all(POLICY_YAML.as_bytes()).unwrap();
    let policy = Arc::new(PolicyEngine::load(policy_file.path()).unwrap());

    let worker = Worker::new(16, store.clone(), signer, BackpressureMode::Drop, policy.clone(), None).unwrap();
    worker.start("test-agent").unwrap();

    let upstream_url = spawn_echo_upstream().await;
    let state = AppState::new(worker.clone(), policy, upstream_url);
    let router = build_router(state);

    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "aws:ec2:launch",
        "params": {"secret_key": "shh", "task_id": "T1"}
    });
    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/")
        .header("content-type", "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    worker.shutdown(Duration::from_secs(1)).await.unwrap();

    let run_id = store.current_run_id().unwrap().unwrap();
    let events = store.events_by_run(&run_id).unwrap();
    let call = events.iter().find(|e| e.method == "aws:ec2:launch").unwrap();
    assert_eq!(call.risk_level, Some(auditrail_core::RiskLevel::Critical));
    assert_eq!(call.policy_id.as_deref(), Some("critical-aws"));
    assert_eq!(call.params.get("secret_key").unwrap(), "[REDACTED]");
    assert_eq!(call.task_id.as_deref(), Some("T1"));
}

#[tokio::test]
async fn malformed_body_is_forwarded_without_an_event() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::open(dir.path().join("ledger")).unwrap());
    let signer = Arc::new(Signer::load_or_create(dir.path().join("key")).unwrap());
    let mut policy_file = NamedTempFile::new().unwrap();
    policy_file.write_all(POLICY_YAML.as_bytes()).unwrap();
    let policy = Arc::new(PolicyEngine::load(policy_file.path()).unwrap());

    let worker = Worker::new(16, store.clone(), signer, BackpressureMode::Drop, policy.clone(), None).unwrap();
    worker.start("test-agent").unwrap();
    let events_before = store.events_by_run(&worker.run_id().unwrap()).unwrap().len();

    let upstream_url = spawn_echo_upstream().await;
    let state = AppState::new(worker.clone(), policy, upstream_url);
    let router = build_router(state);

    let request = axum::http::Request::builder()
        .method("POST")
        .uri("/")
        .body(axum::body::Body::from("not json"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), axum::http::StatusCode::OK);

    worker.shutdown(Duration::from_secs(1)).await.unwrap();
    let events_after = store.events_by_run(&worker.run_id().unwrap()).unwrap().len();
    assert_eq!(events_before, events_after);
}
