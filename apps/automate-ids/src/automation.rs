//! # Automation Module
//!
//! Run-scoped state of one Automate function invocation.
//!
//! `AutomationContext` collects object results and stored files while the
//! function runs, then posts them with the final status in a single
//! `report_run_status` call. Without a `SpeckleClient` (offline `check`)
//! nothing is sent and files stay local.

use crate::api::speckle::StatusReport;
use crate::api::SpeckleClient;
use crate::error::{AppError, AppResult};
use automate_ids_core::AutomationRunData;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

// =============================================================================
// STATUS AND RESULT TYPES
// =============================================================================

/// Automate run status, as named by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Initializing,
    Running,
    Succeeded,
    Failed,
    Exception,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "INITIALIZING",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Exception => "EXCEPTION",
        }
    }

    /// The run reached a final status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Exception)
    }

    /// Process exit code: 0 for success, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Succeeded => 0,
            _ => 1,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an object result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectResultLevel {
    Error,
    Warning,
    Info,
}

/// A message attached to a set of model objects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectResult {
    pub category: String,
    pub level: ObjectResultLevel,
    pub object_ids: Vec<String>,
    pub message: Option<String>,
    pub metadata: Map<String, Value>,
    pub visual_overrides: Map<String, Value>,
}

// =============================================================================
// CONTEXT
// =============================================================================

/// State of one automation run.
#[derive(Debug)]
pub struct AutomationContext {
    run_data: AutomationRunData,
    client: Option<SpeckleClient>,
    status: RunStatus,
    status_message: Option<String>,
    object_results: Vec<ObjectResult>,
    blob_ids: Vec<String>,
    file_results: Vec<PathBuf>,
    started: Instant,
}

impl AutomationContext {
    /// Context that talks to the Speckle server of the run.
    pub fn new(run_data: AutomationRunData, client: SpeckleClient) -> Self {
        Self::with_client(run_data, Some(client))
    }

    /// Context that never contacts a server.
    pub fn offline(run_data: AutomationRunData) -> Self {
        Self::with_client(run_data, None)
    }

    fn with_client(run_data: AutomationRunData, client: Option<SpeckleClient>) -> Self {
        Self {
            run_data,
            client,
            status: RunStatus::Initializing,
            status_message: None,
            object_results: Vec::new(),
            blob_ids: Vec::new(),
            file_results: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn run_data(&self) -> &AutomationRunData {
        &self.run_data
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    pub fn object_results(&self) -> &[ObjectResult] {
        &self.object_results
    }

    pub fn blob_ids(&self) -> &[String] {
        &self.blob_ids
    }

    /// Local paths of every stored file.
    pub fn file_results(&self) -> &[PathBuf] {
        &self.file_results
    }

    pub fn is_offline(&self) -> bool {
        self.client.is_none()
    }

    /// Whole seconds since the context was created.
    pub fn elapsed_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    fn client(&self) -> AppResult<&SpeckleClient> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Automation("no Speckle server connection".to_string()))
    }

    /// Receive the version that triggered the run, references inlined.
    pub async fn receive_version(&mut self) -> AppResult<Value> {
        let client = self.client()?;
        let root = client
            .receive_version(&self.run_data.project_id, &self.run_data.version_id)
            .await?;
        self.status = RunStatus::Running;
        Ok(root)
    }

    pub fn mark_running(&mut self) {
        self.status = RunStatus::Running;
    }

    // -------------------------------------------------------------------------
    // Object results
    // -------------------------------------------------------------------------

    /// Attach a result to objects. An empty id list is rejected.
    pub fn attach_result_to_objects(
        &mut self,
        level: ObjectResultLevel,
        category: &str,
        object_ids: Vec<String>,
        message: impl Into<String>,
    ) -> AppResult<()> {
        if object_ids.is_empty() {
            return Err(AppError::Automation(format!(
                "cannot attach {} result to an empty object list",
                category
            )));
        }
        self.object_results.push(ObjectResult {
            category: category.to_string(),
            level,
            object_ids,
            message: Some(message.into()),
            metadata: Map::new(),
            visual_overrides: Map::new(),
        });
        Ok(())
    }

    pub fn attach_error_to_objects(
        &mut self,
        category: &str,
        object_ids: Vec<String>,
        message: impl Into<String>,
    ) -> AppResult<()> {
        self.attach_result_to_objects(ObjectResultLevel::Error, category, object_ids, message)
    }

    pub fn attach_warning_to_objects(
        &mut self,
        category: &str,
        object_ids: Vec<String>,
        message: impl Into<String>,
    ) -> AppResult<()> {
        self.attach_result_to_objects(ObjectResultLevel::Warning, category, object_ids, message)
    }

    pub fn attach_info_to_objects(
        &mut self,
        category: &str,
        object_ids: Vec<String>,
        message: impl Into<String>,
    ) -> AppResult<()> {
        self.attach_result_to_objects(ObjectResultLevel::Info, category, object_ids, message)
    }

    // -------------------------------------------------------------------------
    // File results
    // -------------------------------------------------------------------------

    /// Upload a local file as a run result. Offline, the path is only recorded.
    pub async fn store_file_result(&mut self, path: &Path, mime_type: &str) -> AppResult<()> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::InvalidArgument(format!("not a file path: {}", path.display())))?
            .to_string();

        if let Some(client) = &self.client {
            let bytes = tokio::fs::read(path).await?;
            let blob_id = client
                .upload_blob(
                    &self.run_data.project_id,
                    &file_name,
                    bytes,
                    mime_type,
                )
                .await?;
            info!(file = %file_name, blob_id = %blob_id, "Stored file result");
            self.blob_ids.push(blob_id);
        }
        self.file_results.push(path.to_path_buf());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Status
    // -------------------------------------------------------------------------

    pub fn mark_run_success(&mut self, message: impl Into<String>) {
        self.mark(RunStatus::Succeeded, message.into());
    }

    pub fn mark_run_failed(&mut self, message: impl Into<String>) {
        self.mark(RunStatus::Failed, message.into());
    }

    pub fn mark_run_exception(&mut self, message: impl Into<String>) {
        self.mark(RunStatus::Exception, message.into());
    }

    fn mark(&mut self, status: RunStatus, message: String) {
        info!(status = %status, message = %message, "Run marked");
        self.status = status;
        self.status_message = Some(message);
    }

    /// Results payload of the status mutation.
    pub fn results_payload(&self) -> Value {
        json!({
            "version": 1,
            "values": {
                "objectResults": self.object_results,
                "blobIds": self.blob_ids,
            },
        })
    }

    /// Send the status, message and results to the server.
    pub async fn report_run_status(&self) -> AppResult<()> {
        if !self.status.is_terminal() {
            warn!(status = %self.status, "Reporting a non-final run status");
        }
        let elapsed_seconds = self.elapsed_seconds();
        let Some(client) = &self.client else {
            info!(status = %self.status, elapsed_seconds, "Offline run, status not reported");
            return Ok(());
        };

        let report = StatusReport {
            project_id: &self.run_data.project_id,
            function_run_id: &self.run_data.automation_run_id,
            status: self.status.as_str(),
            status_message: self.status_message.as_deref(),
            results: self.results_payload(),
            context_view: None,
        };
        client.report_run_status(&report).await?;
        info!(
            status = %self.status,
            elapsed_seconds,
            object_results = self.object_results.len(),
            blobs = self.blob_ids.len(),
            "Reported run status"
        );
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run_data() -> AutomationRunData {
        AutomationRunData {
            project_id: "p".into(),
            model_id: "m".into(),
            branch_name: "main".into(),
            version_id: "v".into(),
            speckle_server_url: "http://localhost".into(),
            automation_id: "a".into(),
            automation_revision_id: "r".into(),
            automation_run_id: "run".into(),
            function_id: "f".into(),
            function_name: "IDS".into(),
            function_logo: String::new(),
        }
    }

    #[test]
    fn attach_rejects_empty_ids() {
        let mut context = AutomationContext::offline(run_data());
        let err = context
            .attach_error_to_objects("Missing", Vec::new(), "none")
            .unwrap_err();
        assert!(matches!(err, AppError::Automation(_)));
        assert!(context.object_results().is_empty());
    }

    #[test]
    fn results_payload_shape() {
        let mut context = AutomationContext::offline(run_data());
        context
            .attach_warning_to_objects("Invalid", vec!["a".into(), "b".into()], "two")
            .unwrap();
        let payload = context.results_payload();
        assert_eq!(payload["version"], 1);
        let result = &payload["values"]["objectResults"][0];
        assert_eq!(result["category"], "Invalid");
        assert_eq!(result["level"], "WARNING");
        assert_eq!(result["objectIds"], json!(["a", "b"]));
        assert_eq!(result["metadata"], json!({}));
        assert_eq!(result["visualOverrides"], json!({}));
        assert_eq!(payload["values"]["blobIds"], json!([]));
    }

    #[test]
    fn marking_sets_status_and_message() {
        let mut context = AutomationContext::offline(run_data());
        assert_eq!(context.status(), RunStatus::Initializing);
        context.mark_run_failed("bad");
        assert_eq!(context.status(), RunStatus::Failed);
        assert_eq!(context.status_message(), Some("bad"));
        assert_eq!(context.status().exit_code(), 1);
        context.mark_run_success("good");
        assert_eq!(context.status().exit_code(), 0);
    }

    #[tokio::test]
    async fn offline_receive_version_is_an_error() {
        let mut context = AutomationContext::offline(run_data());
        assert!(context.receive_version().await.is_err());
        assert!(context.report_run_status().await.is_ok());
    }

    #[tokio::test]
    async fn offline_file_results_are_only_recorded() {
        let mut context = AutomationContext::offline(run_data());
        context
            .store_file_result(Path::new("out/report.html"), "text/html")
            .await
            .unwrap();
        assert_eq!(context.file_results(), &[PathBuf::from("out/report.html")]);
        assert!(context.results_payload()["values"]["blobIds"]
            .as_array()
            .unwrap()
            .is_empty());

        assert!(context
            .store_file_result(Path::new(".."), "text/html")
            .await
            .is_err());
    }
}
