// Error types for the library modules. The binary wraps these in
// `anyhow::Error`; `main.rs` looks for `UploadError::Cancelled` to pick
// the exit status.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single remote call.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("could not decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ApiError {
    /// True when an interrupted I/O error sits anywhere in the error chain.
    /// Such an attempt was stopped by the user and must not be retried.
    pub fn is_interrupt(&self) -> bool {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self);
        while let Some(err) = current {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                if io_err.kind() == io::ErrorKind::Interrupted {
                    return true;
                }
            }
            current = err.source();
        }
        false
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not fetch deposition {id}: {source}")]
    Lookup {
        id: String,
        #[source]
        source: ApiError,
    },

    #[error("could not create deposition: {source}")]
    Create {
        #[source]
        source: ApiError,
    },

    #[error("could not read a deposition title: {0}")]
    Title(#[source] anyhow::Error),

    #[error("deposition title must not be empty")]
    EmptyTitle,

    #[error("deposition {id} has no bucket link")]
    MissingBucket { id: String },
}

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

#[derive(Debug, Error)]
pub enum UploadError {
    /// The user interrupted the transfer. The whole run stops.
    #[error("upload of {path} cancelled by user")]
    Cancelled { path: PathBuf },

    /// Only reachable when a retry cap is configured.
    #[error("upload of {path} gave up after {attempts} attempts: {source}")]
    Exhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: ApiError,
    },

    #[error("cannot read metadata of {path}: {source}")]
    Metadata {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
