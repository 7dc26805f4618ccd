//! End-to-end tests for the `translate` and `export` commands against a
//! wiremock backend and blob store.

use std::time::Duration;

use jobflow_cli::run::{self, TranslateOutcome};
use jobflow_client::api::BackendApi;
use jobflow_client::{ClientConfig, JobOrchestrator};
use jobflow_core::export::IssuesExportRequest;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Backend that presigns, accepts the PUT and answers every status poll
/// with `status`.
async fn backend(status: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/presign/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "url": format!("{}/blob/x", server.uri()),
            "key": "k1",
            "bucket": "b",
            "expiresIn": 900,
            "jobId": "j1",
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/blob/x"))
        .and(header("content-type", "text/csv"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/presign/download"))
        .and(query_param("key", "out/k1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "url": "https://blob/out/k1?sig=1" })),
        )
        .mount(&server)
        .await;
    server
}

fn orchestrator(server: &MockServer) -> JobOrchestrator {
    let mut config = ClientConfig::new(server.uri());
    config.poll_interval = Duration::from_millis(20);
    JobOrchestrator::from_config(&config).unwrap()
}

fn csv_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
    let file = dir.path().join("a.csv");
    std::fs::write(&file, "id,name\n1,x\n").unwrap();
    file
}

// ---------------------------------------------------------------------------
// Test: translate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn translate_returns_download_url() {
    let server = backend(json!({ "jobId": "j1", "state": "COMPLETED", "outKey": "out/k1" })).await;
    let orchestrator = orchestrator(&server);
    let dir = tempfile::tempdir().unwrap();

    let outcome = run::translate(
        &orchestrator,
        &csv_file(&dir),
        "application/octet-stream",
        std::future::pending(),
    )
    .await
    .unwrap();

    assert_eq!(
        outcome,
        TranslateOutcome::Completed {
            download_url: "https://blob/out/k1?sig=1".into()
        }
    );
}

#[tokio::test]
async fn translate_reports_backend_failure() {
    let server = backend(json!({ "jobId": "j1", "state": "FAILED", "error": "row 3 is malformed" })).await;
    let orchestrator = orchestrator(&server);
    let dir = tempfile::tempdir().unwrap();

    let err = run::translate(&orchestrator, &csv_file(&dir), "text/csv", std::future::pending())
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "Job failed: row 3 is malformed");
}

/// The shutdown future stands in for Ctrl-C.
#[tokio::test]
async fn translate_cancels_on_shutdown() {
    let server = backend(json!({ "jobId": "j1", "state": "RUNNING", "percent": 10 })).await;
    let orchestrator = orchestrator(&server);
    let dir = tempfile::tempdir().unwrap();

    let outcome = run::translate(
        &orchestrator,
        &csv_file(&dir),
        "text/csv",
        tokio::time::sleep(Duration::from_millis(200)),
    )
    .await
    .unwrap();

    assert_eq!(outcome, TranslateOutcome::Cancelled);
    assert!(!orchestrator.is_busy());
}

#[tokio::test]
async fn translate_missing_file_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let orchestrator = orchestrator(&server);
    let dir = tempfile::tempdir().unwrap();

    let err = run::translate(
        &orchestrator,
        &dir.path().join("missing.csv"),
        "text/csv",
        std::future::pending(),
    )
    .await
    .unwrap_err();

    assert!(err.to_string().starts_with("Failed to read"));
}

// ---------------------------------------------------------------------------
// Test: export
// ---------------------------------------------------------------------------

#[tokio::test]
async fn export_writes_csv_named_after_repo() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/issues.csv"))
        .and(query_param("owner", "vercel"))
        .and(query_param("repo", "next.js"))
        .respond_with(ResponseTemplate::new(200).set_body_string("number,title\n1,Crash\n"))
        .expect(1)
        .mount(&server)
        .await;
    let api = BackendApi::new(server.uri());
    let dir = tempfile::tempdir().unwrap();

    let written = run::export(
        &api,
        &IssuesExportRequest {
            owner: "vercel".into(),
            repo: "next.js".into(),
            labels: "bug".into(),
            wanted_n: 50,
        },
        dir.path(),
    )
    .await
    .unwrap();

    assert_eq!(written, dir.path().join("vercel-next.js-issues.csv"));
    assert_eq!(
        std::fs::read_to_string(&written).unwrap(),
        "number,title\n1,Crash\n"
    );
}

#[tokio::test]
async fn export_backend_error_writes_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/issues.csv"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "message": "repo not found" })))
        .mount(&server)
        .await;
    let api = BackendApi::new(server.uri());
    let dir = tempfile::tempdir().unwrap();

    let err = run::export(
        &api,
        &IssuesExportRequest {
            owner: "nobody".into(),
            repo: "nothing".into(),
            labels: String::new(),
            wanted_n: 10,
        },
        dir.path(),
    )
    .await
    .unwrap_err();

    assert!(format!("{err:#}").contains("repo not found"));
    assert!(!dir.path().join("nobody-nothing-issues.csv").exists());
}

/// Owner and repo become part of the file name; anything that would
/// escape the target directory is refused before any request goes out.
#[tokio::test]
async fn export_refuses_path_like_owner() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("number,title\n"))
        .expect(0)
        .mount(&server)
        .await;
    let api = BackendApi::new(server.uri());
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("out");
    std::fs::create_dir(&dir).unwrap();

    let result = run::export(
        &api,
        &IssuesExportRequest {
            owner: "../..".into(),
            repo: "x".into(),
            labels: String::new(),
            wanted_n: 10,
        },
        &dir,
    )
    .await;

    assert!(result.is_err());
    assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);
}
