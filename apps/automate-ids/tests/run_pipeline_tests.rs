//! End-to-end tests of the `run` command against a mocked Speckle server.
//!
//! Each test serves one version, lets the function check it and inspects the
//! run status mutation it posts.

// Allow unwrap and panic in tests - these are standard for test code
#![allow(clippy::unwrap_used, clippy::panic)]

use automate_ids::automation::RunStatus;
use automate_ids::cli::cmd_run;
use automate_ids::error::AppError;
use automate_ids::function::FunctionConfig;
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

fn automation_context(server: &MockServer) -> String {
    json!({
        "projectId": "p1",
        "modelId": "m1",
        "branchName": "main",
        "versionId": "v1",
        "speckleServerUrl": server.uri(),
        "automationId": "a1",
        "automationRevisionId": "r1",
        "automationRunId": "run-1",
        "functionId": "f1",
        "functionName": "IDS / bsDD checker",
        "functionLogo": null
    })
    .to_string()
}

fn window(id: &str, omniclass: &str) -> Value {
    json!({
        "id": id,
        "speckle_type": "Objects.BuiltElements.Revit.FamilyInstance",
        "name": format!("Window {}", id),
        "category": "Windows",
        "type": "Fixed",
        "family": "Window-Fixed",
        "parameters": {
            "speckle_type": "Base",
            "OMNICLASS": {
                "speckle_type": "Objects.BuiltElements.Revit.Parameter",
                "name": "OmniClass Number",
                "value": omniclass
            }
        }
    })
}

async fn mount_version(server: &MockServer, windows: Vec<Value>) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("VersionReferencedObject"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"project": {"version": {"referencedObject": "root"}}}
        })))
        .mount(server)
        .await;

    let references: Vec<Value> = windows
        .iter()
        .map(|w| json!({"speckle_type": "reference", "referencedId": w["id"]}))
        .collect();
    let mut objects = vec![json!({
        "id": "root",
        "speckle_type": "Speckle.Core.Models.Collection",
        "name": "Model",
        "elements": references
    })];
    objects.extend(windows);

    Mock::given(method("GET"))
        .and(path("/objects/p1/root"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(objects)))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/stream/p1/blob"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "uploadResults": [{"blobId": "blob-1"}]
        })))
        .mount(server)
        .await;
}

async fn mount_status_report(server: &MockServer, status: &str) {
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("automateFunctionRunStatusReport"))
        .and(body_partial_json(json!({
            "variables": {"projectId": "p1", "functionRunId": "run-1", "status": status}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"automateFunctionRunStatusReport": true}
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// Variables of the status mutation the function posted.
async fn reported_variables(server: &MockServer) -> Value {
    let requests = server.received_requests().await.unwrap();
    let body: Value = requests
        .iter()
        .filter(|r| r.url.path() == "/graphql")
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
        .find(|b| {
            b["query"]
                .as_str()
                .is_some_and(|q| q.contains("automateFunctionRunStatusReport"))
        })
        .unwrap();
    body["variables"].clone()
}

/// Body of the blob upload the function posted, lowercased.
async fn uploaded_blob(server: &MockServer) -> String {
    let requests = server.received_requests().await.unwrap();
    let request = requests
        .iter()
        .find(|r| r.url.path() == "/api/stream/p1/blob")
        .unwrap();
    String::from_utf8_lossy(&request.body).to_lowercase()
}

fn config(dir: &tempfile::TempDir) -> FunctionConfig {
    FunctionConfig {
        output_dir: dir.path().to_path_buf(),
        bsdd_api_url: "http://127.0.0.1:9".to_string(),
    }
}

// =============================================================================
// RUN COMMAND TESTS
// =============================================================================

#[tokio::test]
async fn test_run_reports_failed_for_invalid_windows() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_version(&server, vec![window("w1", "23.30.20.17"), window("w2", "23.10.00")]).await;
    mount_status_report(&server, "FAILED").await;

    let status = cmd_run(
        &automation_context(&server),
        r#"{"report_format": "JSON"}"#,
        "token",
        &config(&dir),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Failed);
    assert_eq!(status.exit_code(), 1);

    let variables = reported_variables(&server).await;
    assert_eq!(
        variables["statusMessage"],
        "Automation failed due to parameter issues. Pass rate: 50.00%, Invalid rate: 50.00%, Missing rate: 0.00%"
    );
    let results = &variables["results"]["values"];
    assert_eq!(results["blobIds"], json!(["blob-1"]));
    assert_eq!(results["objectResults"][0]["category"], "Invalid");
    assert_eq!(results["objectResults"][0]["level"], "ERROR");
    assert_eq!(results["objectResults"][0]["objectIds"], json!(["w2"]));
    assert_eq!(results["objectResults"][1]["category"], "Passing");
    assert_eq!(results["objectResults"][1]["objectIds"], json!(["w1"]));
    assert!(dir.path().join("report.json").exists());
}

#[tokio::test]
async fn test_run_reports_succeeded_when_all_valid() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_version(&server, vec![window("w1", "23.30.20.17"), window("w2", "23.30.20.01")]).await;
    mount_status_report(&server, "SUCCEEDED").await;

    let status = cmd_run(&automation_context(&server), "{}", "token", &config(&dir))
        .await
        .unwrap();

    assert_eq!(status, RunStatus::Succeeded);
    assert_eq!(status.exit_code(), 0);
    let variables = reported_variables(&server).await;
    assert_eq!(variables["statusMessage"], "All parameters are valid.");
    assert!(dir.path().join("report.pdf").exists());

    let blob = uploaded_blob(&server).await;
    assert!(blob.contains("filename=\"report.pdf\""));
    assert!(blob.contains("content-type: application/pdf"));
}

#[tokio::test]
async fn test_run_warn_mode_succeeds_with_issues() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_version(&server, vec![window("w1", "99")]).await;
    mount_status_report(&server, "SUCCEEDED").await;

    let status = cmd_run(
        &automation_context(&server),
        r#"{"threshold_mode": "WARN", "report_format": "HTML"}"#,
        "token",
        &config(&dir),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Succeeded);
    let variables = reported_variables(&server).await;
    assert!(variables["statusMessage"]
        .as_str()
        .unwrap()
        .starts_with("Completed with issues."));
    assert_eq!(variables["results"]["values"]["objectResults"][0]["level"], "WARNING");
    assert!(uploaded_blob(&server).await.contains("content-type: text/html"));
}

#[tokio::test]
async fn test_run_bad_inputs_report_exception() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    mount_status_report(&server, "EXCEPTION").await;

    let status = cmd_run(
        &automation_context(&server),
        r#"{"report_format": "DOCX"}"#,
        "token",
        &config(&dir),
    )
    .await
    .unwrap();

    assert_eq!(status, RunStatus::Exception);
    let variables = reported_variables(&server).await;
    assert!(variables["statusMessage"]
        .as_str()
        .unwrap()
        .starts_with("Function error: "));
    assert_eq!(variables["results"]["values"]["objectResults"], json!([]));
}

#[tokio::test]
async fn test_run_server_failure_reports_exception() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("VersionReferencedObject"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    mount_status_report(&server, "EXCEPTION").await;

    let status = cmd_run(&automation_context(&server), "{}", "token", &config(&dir))
        .await
        .unwrap();
    assert_eq!(status, RunStatus::Exception);
}

#[tokio::test]
async fn test_run_invalid_context_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = cmd_run(r#"{"projectId": "p1"}"#, "{}", "token", &config(&dir)).await;
    assert!(matches!(result, Err(AppError::Core(_))));
}

#[tokio::test]
async fn test_run_rejected_status_report_is_an_error() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "Function run not found"}]
        })))
        .mount(&server)
        .await;

    let result = cmd_run(&automation_context(&server), "{}", "token", &config(&dir)).await;
    assert!(matches!(result, Err(AppError::Server(_))));
}
