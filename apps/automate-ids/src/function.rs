//! # Function Module
//!
//! The Automate function: receive the version, check it, report.
//!
//! ```text
//! receive_version -> elements_of -> build_rules -> assess
//!     -> attach object results -> write + store report -> mark status
//! ```
//!
//! `execute` wraps the pipeline so any error becomes an `EXCEPTION` status
//! before the single status report is sent.

use crate::api::DEFAULT_BSDD_API_URL;
use crate::automation::{AutomationContext, ObjectResultLevel, RunStatus};
use crate::error::AppResult;
use crate::sources::SourceLoader;
use automate_ids_core::report::{render, Criteria};
use automate_ids_core::{assess, elements_of, Assessment, FunctionInputs, Outcome, RuleSet, ThresholdMode};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// Prefix of the failure status message.
pub const FAILED_PREFIX: &str = "Automation failed due to parameter issues. ";

/// Prefix of the success message when failures were only reported.
pub const ISSUES_PREFIX: &str = "Completed with issues. ";

/// Success message when nothing failed.
pub const ALL_VALID: &str = "All parameters are valid.";

/// Environment-level settings of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionConfig {
    /// Directory the report file is written to.
    pub output_dir: PathBuf,
    pub bsdd_api_url: String,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            bsdd_api_url: DEFAULT_BSDD_API_URL.to_string(),
        }
    }
}

/// Levels for (missing/invalid, passing) under a threshold mode.
pub fn result_levels(mode: ThresholdMode) -> (ObjectResultLevel, ObjectResultLevel) {
    let failure = match mode {
        ThresholdMode::Error => ObjectResultLevel::Error,
        ThresholdMode::Warn => ObjectResultLevel::Warning,
        ThresholdMode::Info => ObjectResultLevel::Info,
    };
    (failure, ObjectResultLevel::Info)
}

/// Run the function against the triggering version, then report the status.
///
/// Errors inside the function become an `EXCEPTION` status. Only a failing
/// status report is returned as an error.
pub async fn execute(
    context: &mut AutomationContext,
    inputs_json: &str,
    config: &FunctionConfig,
) -> AppResult<RunStatus> {
    context.mark_running();
    let result = match FunctionInputs::from_json(inputs_json) {
        Ok(inputs) => automate_function(context, &inputs, config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Err(e) => {
            error!(error = %e, "Function raised an error");
            context.mark_run_exception(format!("Function error: {}", e));
        }
        Ok(()) if !context.status().is_terminal() => {
            warn!("Function did not mark the run, assuming success");
            context.mark_run_success("Function finished without a final status.");
        }
        Ok(()) => {}
    }

    context.report_run_status().await?;
    Ok(context.status())
}

/// The function body: receive, check, report.
pub async fn automate_function(
    context: &mut AutomationContext,
    inputs: &FunctionInputs,
    config: &FunctionConfig,
) -> AppResult<()> {
    let root = context.receive_version().await?;
    let loader = SourceLoader::new(&config.bsdd_api_url)?;
    check_model(context, &root, inputs, &loader, &config.output_dir).await?;
    Ok(())
}

/// Build the rule set: demo rule, IDS requirements, bsDD dictionaries.
pub async fn build_rules(inputs: &FunctionInputs, loader: &SourceLoader) -> AppResult<RuleSet> {
    let mut rules = RuleSet::from_inputs(inputs);

    if let Some(source) = inputs.ids_source() {
        let document = loader.load_ids(source).await?;
        for note in &document.skipped {
            warn!(source, note = %note, "IDS content skipped");
        }
        rules.extend(document.requirements);
    }

    for source in inputs.bsdd_sources() {
        for dictionary in loader.load_bsdd(source).await? {
            rules.add_dictionary(dictionary);
        }
    }

    info!(requirements = rules.len(), "Rule set ready");
    Ok(rules)
}

/// Check a resolved root object and record results on `context`.
pub async fn check_model(
    context: &mut AutomationContext,
    root: &Value,
    inputs: &FunctionInputs,
    loader: &SourceLoader,
    output_dir: &Path,
) -> AppResult<Assessment> {
    let elements = elements_of(root);
    info!(object_count = elements.len(), "Traversed model");

    let rules = build_rules(inputs, loader).await?;
    let (findings, assessment) = assess(&elements, &rules);
    info!(
        findings = findings.len(),
        assessed = assessment.total(),
        missing = assessment.count(Outcome::Missing),
        invalid = assessment.count(Outcome::Invalid),
        passing = assessment.count(Outcome::Passing),
        "Evaluated rules"
    );

    attach_results(context, &assessment, inputs.threshold_mode)?;

    let report_path = write_report(&assessment, inputs, output_dir).await?;
    context
        .store_file_result(&report_path, inputs.report_format.mime_type())
        .await?;

    if assessment.has_failures() {
        let rates = assessment.rate_message();
        match inputs.threshold_mode {
            ThresholdMode::Error => context.mark_run_failed(format!("{}{}", FAILED_PREFIX, rates)),
            ThresholdMode::Warn | ThresholdMode::Info => {
                context.mark_run_success(format!("{}{}", ISSUES_PREFIX, rates));
            }
        }
    } else {
        context.mark_run_success(ALL_VALID);
    }
    Ok(assessment)
}

/// Attach one result per non-empty group. Objects without an id are skipped.
pub fn attach_results(
    context: &mut AutomationContext,
    assessment: &Assessment,
    mode: ThresholdMode,
) -> AppResult<()> {
    let (failure, passing) = result_levels(mode);
    for outcome in [Outcome::Missing, Outcome::Invalid, Outcome::Passing] {
        let ids = assessment.object_ids(outcome);
        if ids.is_empty() {
            continue;
        }
        let level = if outcome.is_failure() { failure } else { passing };
        context.attach_result_to_objects(
            level,
            outcome.title(),
            ids,
            assessment.summary_message(outcome),
        )?;
    }
    Ok(())
}

/// Render the report in the requested format and write it to `output_dir`.
pub async fn write_report(
    assessment: &Assessment,
    inputs: &FunctionInputs,
    output_dir: &Path,
) -> AppResult<PathBuf> {
    let criteria = Criteria::from(inputs.criteria());
    let bytes = render(assessment, inputs.report_format, &criteria)?;

    tokio::fs::create_dir_all(output_dir).await?;
    let path = output_dir.join(inputs.report_format.file_name());
    tokio::fs::write(&path, &bytes).await?;
    info!(path = %path.display(), bytes = bytes.len(), "Wrote report");
    Ok(path)
}
