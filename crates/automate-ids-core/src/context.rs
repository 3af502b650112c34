//! # Run Context
//!
//! Identifiers of one automation run, as handed over by the Automate host.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize};

/// The run context passed as the first `run` argument.
///
/// All fields are required. `functionLogo` may be `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRunData {
    pub project_id: String,
    pub model_id: String,
    pub branch_name: String,
    pub version_id: String,
    pub speckle_server_url: String,
    pub automation_id: String,
    pub automation_revision_id: String,
    pub automation_run_id: String,
    pub function_id: String,
    pub function_name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub function_logo: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl AutomationRunData {
    /// Parse and validate the context JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let data: Self = serde_json::from_str(json)?;
        data.validate()?;
        Ok(data)
    }

    /// Reject contexts the server calls could not use.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("projectId", &self.project_id),
            ("versionId", &self.version_id),
            ("speckleServerUrl", &self.speckle_server_url),
            ("automationRunId", &self.automation_run_id),
            ("functionId", &self.function_id),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(CoreError::InvalidInput(format!("{} must not be empty", field)));
        }
        if !(self.speckle_server_url.starts_with("http://")
            || self.speckle_server_url.starts_with("https://"))
        {
            return Err(CoreError::InvalidInput(format!(
                "speckleServerUrl is not an http(s) URL: {}",
                self.speckle_server_url
            )));
        }
        Ok(())
    }

    /// Server URL without a trailing slash.
    pub fn server_url(&self) -> &str {
        self.speckle_server_url.trim_end_matches('/')
    }
}

// =============================================================================
// TESTS
// =============================================================================
