//! Entry point of the Automate function image.
//!
//! Exit code 0 means the run SUCCEEDED. Any other status, or a failure to
//! report the status, exits with 1.

use automate_ids::cli::{dispatch, Cli};
use automate_ids::logging;
use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    match dispatch(cli.command).await {
        Ok(status) => ExitCode::from(status.exit_code()),
        Err(e) => {
            tracing::error!(error = %e, "automate-ids failed");
            ExitCode::FAILURE
        }
    }
}
