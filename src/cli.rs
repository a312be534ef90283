// Command-line surface. `run` wires the real collaborators (config from
// the environment, the blocking API client, the terminal progress bar and
// title prompt) into `session::run`.

use crate::api::ApiClient;
use crate::config::Config;
use crate::session::{self, SessionReport, SessionRequest};
use crate::ui::{prompt_title, TerminalProgress};
use crate::uploader::{RetryPolicy, Uploader};
use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::sync::Arc;

/// Upload a directory of files to a Zenodo deposition.
#[derive(Parser, Debug)]
#[command(name = "zenodo-upload", version, about = "Upload files to Zenodo")]
pub struct Cli {
    /// Zenodo deposition ID (omit to create a new deposition)
    #[arg(long = "id", value_name = "DEPOSITION_ID")]
    pub deposition_id: Option<String>,

    /// Directory containing the files
    #[arg(long = "dir", value_name = "DIRECTORY")]
    pub directory: PathBuf,

    /// Upload files even if the deposition already has a file with the same name
    #[arg(
        long,
        value_name = "BOOL",
        default_value_t = false,
        num_args = 0..=1,
        default_missing_value = "true",
        action = ArgAction::Set
    )]
    pub overwrite: bool,

    /// Title for a new deposition; prompted for when missing
    #[arg(long)]
    pub title: Option<String>,

    /// Use the Zenodo sandbox instead of the production API
    #[arg(long)]
    pub sandbox: bool,
}

/// Exit status of a run stopped by the user (128 + SIGINT).
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// Make Ctrl-C end the whole run at once, wherever it is blocked: mid
/// stream, in the pause between attempts, or at the title prompt.
pub fn install_interrupt_handler() -> Result<()> {
    ctrlc::set_handler(|| exit_interrupted()).context("Failed to install Ctrl-C handler")
}

/// Print the interrupt notice and terminate the process.
pub fn exit_interrupted() -> ! {
    println!("Manual interrupt. Exiting...");
    std::process::exit(INTERRUPT_EXIT_CODE)
}

/// Initialise diagnostics on stderr. `RUST_LOG` overrides the default
/// `warn` level; user-facing status lines go to stdout separately.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> Result<SessionReport> {
    let config = Config::from_env(cli.sandbox)?;
    tracing::info!(api_url = %config.api_url, "configuration loaded");

    let client = ApiClient::new(&config).context("Failed to build HTTP client")?;
    let uploader = Uploader::new(&client, RetryPolicy::from(&config))
        .with_observer(Arc::new(TerminalProgress::new()));

    let request = SessionRequest {
        deposition_id: cli.deposition_id.as_deref(),
        directory: &cli.directory,
        overwrite: cli.overwrite,
    };
    let preset_title = cli.title.clone();
    let title = move || match preset_title {
        Some(title) => Ok(title),
        None => prompt_title(),
    };

    let report = session::run(&client, &request, title, &uploader)?;
    tracing::info!(
        deposition = %report.deposition_id,
        created = report.created,
        uploaded = report.uploaded.len(),
        skipped = report.skipped,
        bytes = report.total_bytes,
        attempts = report.attempts,
        "run finished"
    );
    Ok(report)
}
