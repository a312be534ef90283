// Library root
// -----------
// This crate exposes the upload pipeline as a library. The binary
// (`main.rs`) only parses arguments and hands them to `cli::run`.
//
// Module responsibilities:
// - `api`: HTTP interactions with the deposition API (lookup, create,
//   bucket upload) and the traits the pipeline consumes them through.
// - `resolver`: decides whether to reuse or create a deposition.
// - `planner`: walks the local directory and picks the files to send.
// - `uploader`: streams one file with the fixed-delay retry loop.
// - `session`: runs resolver, planner and uploader in order.
// - `ui`: terminal progress bar and title prompt.
// - `cli`, `config`, `error`: argument parsing, settings and error types.
pub mod api;
pub mod cli;
pub mod config;
pub mod error;
pub mod planner;
pub mod resolver;
pub mod session;
pub mod ui;
pub mod uploader;
