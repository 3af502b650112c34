//! # Speckle Client
//!
//! The subset of the Speckle server API an Automate function needs:
//!
//! - `POST /graphql`: version lookup and run status report
//! - `GET /objects/{projectId}/{objectId}`: the object closure as a JSON array
//! - `POST /api/stream/{projectId}/blob`: multipart file upload

use super::{ensure_success, http_client};
use crate::error::{AppError, AppResult};
use automate_ids_core::ObjectStore;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

const VERSION_QUERY: &str = "query VersionReferencedObject($projectId: String!, $versionId: String!) {
  project(id: $projectId) {
    version(id: $versionId) {
      referencedObject
    }
  }
}";

const STATUS_MUTATION: &str = "mutation AutomateFunctionRunStatusReport(
  $projectId: String!
  $functionRunId: String!
  $status: AutomateRunStatus!
  $statusMessage: String
  $results: JSONObject
  $contextView: String
) {
  automateFunctionRunStatusReport(input: {
    projectId: $projectId
    functionRunId: $functionRunId
    status: $status
    statusMessage: $statusMessage
    results: $results
    contextView: $contextView
  })
}";

/// Input of the run status mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport<'a> {
    pub project_id: &'a str,
    pub function_run_id: &'a str,
    pub status: &'a str,
    pub status_message: Option<&'a str>,
    pub results: Value,
    pub context_view: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobUploadResponse {
    #[serde(default)]
    upload_results: Vec<BlobUploadResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlobUploadResult {
    blob_id: Option<String>,
}

/// Authenticated client for one Speckle server.
#[derive(Debug, Clone)]
pub struct SpeckleClient {
    server_url: String,
    client: reqwest::Client,
}

impl SpeckleClient {
    /// Create a client sending `Authorization: Bearer <token>` with every request.
    pub fn new(server_url: &str, token: &str) -> AppResult<Self> {
        Ok(Self {
            server_url: server_url.trim_end_matches('/').to_string(),
            client: http_client(Some(token))?,
        })
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Run a GraphQL operation and return its `data`.
    ///
    /// A non-empty `errors` array is an `AppError::Server`.
    pub async fn graphql(&self, query: &str, variables: Value) -> AppResult<Value> {
        let url = format!("{}/graphql", self.server_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let mut body: Value = ensure_success(response).await?.json().await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<&str> = errors
                    .iter()
                    .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("unknown error"))
                    .collect();
                return Err(AppError::Server(format!("GraphQL: {}", messages.join("; "))));
            }
        }
        Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }

    /// Id of the root object a version points at.
    pub async fn referenced_object(&self, project_id: &str, version_id: &str) -> AppResult<String> {
        let data = self
            .graphql(
                VERSION_QUERY,
                json!({ "projectId": project_id, "versionId": version_id }),
            )
            .await?;
        data.pointer("/project/version/referencedObject")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::Server(format!(
                    "version {} of project {} has no referenced object",
                    version_id, project_id
                ))
            })
    }

    /// Download an object and its closure.
    pub async fn download_objects(&self, project_id: &str, object_id: &str) -> AppResult<Vec<Value>> {
        let url = format!("{}/objects/{}/{}", self.server_url, project_id, object_id);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let objects: Vec<Value> = ensure_success(response).await?.json().await?;
        debug!(object_id, count = objects.len(), "Downloaded object closure");
        Ok(objects)
    }

    /// Receive a version's root object with every reference inlined.
    pub async fn receive_version(&self, project_id: &str, version_id: &str) -> AppResult<Value> {
        let root_id = self.referenced_object(project_id, version_id).await?;
        let objects = self.download_objects(project_id, &root_id).await?;
        let store = ObjectStore::from_objects(objects)?;
        info!(
            project_id,
            version_id,
            root_id = %root_id,
            object_count = store.object_count(),
            "Received version"
        );
        store
            .resolve(&root_id)
            .ok_or_else(|| AppError::Server(format!("root object {} missing from download", root_id)))
    }

    /// Upload a file as a project blob and return its blob id.
    pub async fn upload_blob(
        &self,
        project_id: &str,
        file_name: &str,
        bytes: Vec<u8>,
        mime_type: &str,
    ) -> AppResult<String> {
        let url = format!("{}/api/stream/{}/blob", self.server_url, project_id);
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_type)?;
        let form = Form::new().part("files", part);

        let response = self.client.post(&url).multipart(form).send().await?;
        let uploaded: BlobUploadResponse = ensure_success(response).await?.json().await?;
        uploaded
            .upload_results
            .into_iter()
            .find_map(|r| r.blob_id)
            .ok_or_else(|| AppError::Server(format!("blob upload of {} returned no blob id", file_name)))
    }

    /// Post the run status mutation.
    pub async fn report_run_status(&self, report: &StatusReport<'_>) -> AppResult<()> {
        let data = self
            .graphql(
                STATUS_MUTATION,
                json!({
                    "projectId": report.project_id,
                    "functionRunId": report.function_run_id,
                    "status": report.status,
                    "statusMessage": report.status_message,
                    "results": report.results,
                    "contextView": report.context_view,
                }),
            )
            .await?;
        if data.get("automateFunctionRunStatusReport") == Some(&Value::Bool(false)) {
            return Err(AppError::Server("run status report was rejected".to_string()));
        }
        Ok(())
    }
}
