//! # Function Inputs
//!
//! User-facing configuration of the function, filled in on the Automate
//! dashboard and passed to `run` as a JSON object.
//!
//! Every field has a default. Unknown keys are ignored so the dashboard can
//! evolve independently of the binary.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

/// Format of the generated report file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportFormat {
    #[default]
    #[serde(alias = "pdf")]
    Pdf,
    #[serde(alias = "html")]
    Html,
    #[serde(alias = "json")]
    Json,
}

impl ReportFormat {
    pub const ALL: [Self; 3] = [Self::Pdf, Self::Html, Self::Json];

    /// Value used on the wire and in the schema.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Html => "HTML",
            Self::Json => "JSON",
        }
    }

    /// File extension, lowercase.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Html => "html",
            Self::Json => "json",
        }
    }

    /// MIME type used when uploading the report.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Html => "text/html",
            Self::Json => "application/json",
        }
    }

    /// Report file name, e.g. `report.pdf`.
    pub fn file_name(&self) -> String {
        format!("report.{}", self.extension())
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How harshly failing objects are reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThresholdMode {
    /// Failures are errors and fail the run.
    #[default]
    #[serde(alias = "error")]
    Error,
    /// Failures are warnings; the run succeeds.
    #[serde(alias = "warn")]
    Warn,
    /// Failures are informational; the run succeeds.
    #[serde(alias = "info")]
    Info,
}

impl ThresholdMode {
    pub const ALL: [Self; 3] = [Self::Error, Self::Warn, Self::Info];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Warn => "WARN",
            Self::Info => "INFO",
        }
    }
}

/// Inputs of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionInputs {
    /// Path or URL of an IDS XML file. Empty disables IDS checks.
    pub ids_xml_file: String,
    /// Comma-separated bsDD sources. Empty disables bsDD checks.
    pub bsdd_sheets: String,
    pub single_category: String,
    /// Empty disables the single-property rule.
    pub single_property: String,
    /// Required value prefix for `single_property`.
    pub single_rule: String,
    pub report_format: ReportFormat,
    pub threshold_mode: ThresholdMode,
}

impl Default for FunctionInputs {
    fn default() -> Self {
        Self {
            ids_xml_file: String::new(),
            bsdd_sheets: String::new(),
            single_category: "Windows".to_string(),
            single_property: "OmniClass Number".to_string(),
            single_rule: "23.30.20".to_string(),
            report_format: ReportFormat::default(),
            threshold_mode: ThresholdMode::default(),
        }
    }
}

impl FunctionInputs {
    /// Parse the inputs JSON passed by the host.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        if !value.is_object() {
            return Err(CoreError::InvalidInput(
                "function inputs must be a JSON object".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// bsDD sources, trimmed, empty entries dropped.
    pub fn bsdd_sources(&self) -> Vec<&str> {
        self.bsdd_sheets
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// IDS source, if configured.
    pub fn ids_source(&self) -> Option<&str> {
        Some(self.ids_xml_file.trim()).filter(|s| !s.is_empty())
    }

    /// `(category, property, rule)` shown in report headers.
    pub fn criteria(&self) -> (&str, &str, &str) {
        (
            &self.single_category,
            &self.single_property,
            &self.single_rule,
        )
    }

    /// JSON Schema used by the dashboard to render the inputs form.
    pub fn json_schema() -> Value {
        let defaults = Self::default();
        let mut properties = Map::new();

        let mut text = |key: &str, title: &str, description: &str, default: &str| {
            properties.insert(
                key.to_string(),
                json!({
                    "title": title,
                    "description": description,
                    "type": "string",
                    "default": default,
                }),
            );
        };
        text(
            "ids_xml_file",
            "IDS XML File",
            "URL or path of the IDS XML file defining project standards. e.g. https://example.com/project_standards/ids.xml",
            defaults.ids_xml_file.as_str(),
        );
        text(
            "bsdd_sheets",
            "bsDD Sheet Identifier(s)",
            "Comma-separated bsDD sheet URLs or bsDD class URIs relevant to the project. e.g. https://example.com/project_standards/bsdd.json",
            defaults.bsdd_sheets.as_str(),
        );
        text(
            "single_category",
            "Single Category",
            "Category checked by the single-property rule. e.g. Windows.",
            defaults.single_category.as_str(),
        );
        text(
            "single_property",
            "Single Property",
            "Parameter checked on every object of the category. Leave empty to disable. e.g. OmniClass Number.",
            defaults.single_property.as_str(),
        );
        text(
            "single_rule",
            "Rule",
            "Required prefix of the parameter value. e.g. 23.30.20.",
            defaults.single_rule.as_str(),
        );

        properties.insert(
            "report_format".to_string(),
            json!({
                "title": "Report Format",
                "description": "Preferred format for the compliance report. e.g. PDF, HTML, JSON.",
                "type": "string",
                "default": defaults.report_format.as_str(),
                "oneOf": ReportFormat::ALL
                    .iter()
                    .map(|f| json!({"const": f.as_str(), "title": f.as_str()}))
                    .collect::<Vec<_>>(),
            }),
        );
        properties.insert(
            "threshold_mode".to_string(),
            json!({
                "title": "Reporting Threshold",
                "description": "Set the threshold mode for reporting results: ERROR, WARN, or INFO.",
                "type": "string",
                "default": defaults.threshold_mode.as_str(),
                "oneOf": ThresholdMode::ALL
                    .iter()
                    .map(|m| json!({"const": m.as_str(), "title": m.as_str()}))
                    .collect::<Vec<_>>(),
            }),
        );

        json!({
            "title": "FunctionInputs",
            "type": "object",
            "properties": properties,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let inputs = FunctionInputs::from_json("{}").unwrap();
        assert_eq!(inputs, FunctionInputs::default());
        assert_eq!(inputs.single_category, "Windows");
        assert_eq!(inputs.report_format, ReportFormat::Pdf);
        assert_eq!(inputs.threshold_mode, ThresholdMode::Error);
    }

    #[test]
    fn parses_known_keys_and_ignores_unknown() {
        let inputs = FunctionInputs::from_json(
            r#"{"single_category": "Doors", "report_format": "HTML", "threshold_mode": "warn", "extra": 1}"#,
        )
        .unwrap();
        assert_eq!(inputs.single_category, "Doors");
        assert_eq!(inputs.report_format, ReportFormat::Html);
        assert_eq!(inputs.threshold_mode, ThresholdMode::Warn);
    }

    #[test]
    fn rejects_non_object_and_bad_enum() {
        assert!(FunctionInputs::from_json("[]").is_err());
        assert!(FunctionInputs::from_json(r#"{"report_format": "DOCX"}"#).is_err());
    }

    #[test]
    fn bsdd_sources_are_split_and_trimmed() {
        let inputs = FunctionInputs {
            bsdd_sheets: " a.json , ,https://x/y ".to_string(),
            ..FunctionInputs::default()
        };
        assert_eq!(inputs.bsdd_sources(), vec!["a.json", "https://x/y"]);
        assert_eq!(inputs.ids_source(), None);
    }

    #[test]
    fn report_file_names() {
        assert_eq!(ReportFormat::Pdf.file_name(), "report.pdf");
        assert_eq!(ReportFormat::Json.file_name(), "report.json");
        assert_eq!(ReportFormat::Html.mime_type(), "text/html");
    }

    #[test]
    fn schema_lists_every_input_with_enums() {
        let schema = FunctionInputs::json_schema();
        let properties = schema["properties"].as_object().unwrap();
        assert_eq!(properties.len(), 7);
        assert_eq!(properties["single_rule"]["default"], "23.30.20");
        assert_eq!(properties["report_format"]["oneOf"][1]["const"], "HTML");
        assert_eq!(properties["threshold_mode"]["oneOf"].as_array().unwrap().len(), 3);
    }
}
