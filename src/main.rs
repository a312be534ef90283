// Entrypoint for the CLI application.
// - Keeps `main` small: parse arguments and hand them to `cli::run`.
// - Ctrl-C, or an interrupted transfer reported by the uploader, exits
//   with 130 instead of the generic failure code.

use clap::Parser;
use std::process::ExitCode;
use zenodo_upload::cli::{exit_interrupted, init_tracing, install_interrupt_handler, run, Cli};
use zenodo_upload::error::UploadError;

fn main() -> ExitCode {
    init_tracing();
    if let Err(err) = install_interrupt_handler() {
        tracing::warn!("{err:#}");
    }
    let cli = Cli::parse();

    match run(cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(UploadError::Cancelled { .. }) = err.downcast_ref::<UploadError>() {
                exit_interrupted();
            }
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
