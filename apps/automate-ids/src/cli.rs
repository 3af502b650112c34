//! # CLI Module
//!
//! Command line surface of the function image.
//!
//! ```text
//! automate-ids run <automationContext> <functionInputs> <token>
//! automate-ids generate-schema <path>
//! automate-ids check --model <file.json> [--inputs <json>] [--root <id>] [--json]
//! ```

use crate::api::{SpeckleClient, DEFAULT_BSDD_API_URL};
use crate::automation::{AutomationContext, RunStatus};
use crate::error::{AppError, AppResult};
use crate::function::{check_model, execute, FunctionConfig};
use crate::logging::LogFormat;
use crate::sources::SourceLoader;
use automate_ids_core::{AutomationRunData, FunctionInputs, ObjectStore, Outcome};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::info;

// =============================================================================
// ARGUMENTS
// =============================================================================

/// IDS / bsDD compliance checker for Speckle Automate.
#[derive(Debug, Parser)]
#[command(name = "automate-ids", version, about)]
pub struct Cli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the function for one automation run (invoked by the Automate host).
    Run {
        /// Automation run context, JSON object.
        automation_context: String,
        /// Function inputs, JSON object.
        function_inputs: String,
        /// Speckle token for the run.
        token: String,
        #[command(flatten)]
        config: ConfigArgs,
    },
    /// Write the JSON Schema of the function inputs.
    GenerateSchema {
        /// Output file.
        path: PathBuf,
    },
    /// Check a local model file without a server.
    Check(CheckArgs),
}

/// Settings shared by `run` and `check`.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Directory the report is written to.
    #[arg(long, env = "AUTOMATE_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// bsDD API base URL.
    #[arg(long, env = "BSDD_API_URL", default_value = DEFAULT_BSDD_API_URL)]
    pub bsdd_api_url: String,
}

impl From<ConfigArgs> for FunctionConfig {
    fn from(args: ConfigArgs) -> Self {
        Self {
            output_dir: args.output_dir,
            bsdd_api_url: args.bsdd_api_url,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Model JSON: a resolved root object or a flat object array.
    #[arg(long)]
    pub model: PathBuf,

    /// Function inputs as inline JSON or a path to a JSON file.
    #[arg(long)]
    pub inputs: Option<String>,

    /// Root object id, for flat object arrays.
    #[arg(long)]
    pub root: Option<String>,

    /// Print the outcome as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub config: ConfigArgs,
}

/// Run the parsed command and return the final run status.
pub async fn dispatch(command: Commands) -> AppResult<RunStatus> {
    match command {
        Commands::Run {
            automation_context,
            function_inputs,
            token,
            config,
        } => cmd_run(&automation_context, &function_inputs, &token, &config.into()).await,
        Commands::GenerateSchema { path } => {
            cmd_generate_schema(&path)?;
            Ok(RunStatus::Succeeded)
        }
        Commands::Check(args) => cmd_check(&args).await.map(|outcome| outcome.status),
    }
}

// =============================================================================
// RUN COMMAND
// =============================================================================

/// Execute one automation run and report its status to the server.
///
/// An unusable run context is returned as an error, since no status can be
/// reported without it.
pub async fn cmd_run(
    automation_context: &str,
    function_inputs: &str,
    token: &str,
    config: &FunctionConfig,
) -> AppResult<RunStatus> {
    let run_data = AutomationRunData::from_json(automation_context)?;
    info!(
        project_id = %run_data.project_id,
        model_id = %run_data.model_id,
        version_id = %run_data.version_id,
        automation_run_id = %run_data.automation_run_id,
        "Starting automation run"
    );

    let client = SpeckleClient::new(run_data.server_url(), token)?;
    let mut context = AutomationContext::new(run_data, client);
    execute(&mut context, function_inputs, config).await
}

// =============================================================================
// GENERATE-SCHEMA COMMAND
// =============================================================================

/// Write the function inputs JSON Schema to `path`.
pub fn cmd_generate_schema(path: &Path) -> AppResult<()> {
    let schema = serde_json::to_string_pretty(&FunctionInputs::json_schema())?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, schema)?;
    info!(path = %path.display(), "Wrote function inputs schema");
    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Result of an offline check.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub status: RunStatus,
    pub status_message: String,
    pub report_path: Option<PathBuf>,
    pub missing: usize,
    pub invalid: usize,
    pub passing: usize,
    /// Object results as they would be posted.
    pub results: Value,
}

impl CheckOutcome {
    pub fn to_json(&self) -> Value {
        json!({
            "status": self.status,
            "statusMessage": self.status_message,
            "report": self.report_path.as_ref().map(|p| p.display().to_string()),
            "counts": {
                "missing": self.missing,
                "invalid": self.invalid,
                "passing": self.passing,
            },
            "results": self.results,
        })
    }
}

/// Read function inputs given inline or as a file path.
pub fn read_inputs(inputs: Option<&str>) -> AppResult<FunctionInputs> {
    let Some(inputs) = inputs.map(str::trim) else {
        return Ok(FunctionInputs::default());
    };
    if inputs.starts_with('{') {
        return Ok(FunctionInputs::from_json(inputs)?);
    }
    let text = std::fs::read_to_string(inputs)
        .map_err(|e| AppError::InvalidArgument(format!("cannot read inputs {}: {}", inputs, e)))?;
    Ok(FunctionInputs::from_json(&text)?)
}

/// Load a model file as a resolved root object.
pub fn load_model(path: &Path, root: Option<&str>) -> AppResult<Value> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        AppError::InvalidArgument(format!("cannot read model {}: {}", path.display(), e))
    })?;
    let value: Value = serde_json::from_str(&text)?;

    match value {
        Value::Array(objects) => {
            let root_id = match root {
                Some(id) => id.to_string(),
                None => objects
                    .first()
                    .and_then(|o| o.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .ok_or_else(|| AppError::InvalidArgument("model array is empty".to_string()))?,
            };
            ObjectStore::from_objects(objects)?
                .resolve(&root_id)
                .ok_or_else(|| AppError::InvalidArgument(format!("root object {} not in model", root_id)))
        }
        Value::Object(_) => Ok(value),
        _ => Err(AppError::InvalidArgument(
            "model must be a JSON object or an array of objects".to_string(),
        )),
    }
}

fn offline_run_data() -> AutomationRunData {
    let local = || "local".to_string();
    AutomationRunData {
        project_id: local(),
        model_id: local(),
        branch_name: local(),
        version_id: local(),
        speckle_server_url: "http://localhost".to_string(),
        automation_id: local(),
        automation_revision_id: local(),
        automation_run_id: local(),
        function_id: local(),
        function_name: "automate-ids check".to_string(),
        function_logo: String::new(),
    }
}

/// Check a local model file and print the outcome.
pub async fn cmd_check(args: &CheckArgs) -> AppResult<CheckOutcome> {
    let inputs = read_inputs(args.inputs.as_deref())?;
    let root = load_model(&args.model, args.root.as_deref())?;
    let config = FunctionConfig::from(args.config.clone());
    let loader = SourceLoader::new(&config.bsdd_api_url)?;

    let mut context = AutomationContext::offline(offline_run_data());
    context.mark_running();
    let assessment = check_model(&mut context, &root, &inputs, &loader, &config.output_dir).await?;

    let outcome = CheckOutcome {
        status: context.status(),
        status_message: context.status_message().unwrap_or_default().to_string(),
        report_path: context.file_results().first().cloned(),
        missing: assessment.count(Outcome::Missing),
        invalid: assessment.count(Outcome::Invalid),
        passing: assessment.count(Outcome::Passing),
        results: context.results_payload(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.to_json())?);
    } else {
        println!("Status: {}", outcome.status);
        println!("{}", outcome.status_message);
        println!(
            "Missing: {}, Invalid: {}, Passing: {}",
            outcome.missing, outcome.invalid, outcome.passing
        );
        if let Some(path) = &outcome.report_path {
            println!("Report: {}", path.display());
        }
    }
    Ok(outcome)
}
