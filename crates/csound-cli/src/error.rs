use std::path::PathBuf;

use csound_api::{BridgeError, Status};
use miette::Diagnostic;
use thiserror::Error;

/// Errors reported by the `csound-bridge` commands.
#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    #[error("Bridge error: {0}")]
    #[diagnostic(code(csound::cli::bridge_error))]
    Bridge(#[from] BridgeError),

    #[error("Failed to read file {path}")]
    #[diagnostic(code(csound::cli::io_error))]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} returned {status}")]
    #[diagnostic(
        code(csound::cli::engine_status),
        help("run with -v to see the engine's own messages")
    )]
    EngineStatus { operation: &'static str, status: Status },

    #[error("The orchestra could not be parsed")]
    #[diagnostic(code(csound::cli::parse_failed))]
    ParseFailed,

    #[error("Performance ended with error code {0}")]
    #[diagnostic(code(csound::cli::performance_failed))]
    PerformanceFailed(i32),

    #[error("Failed to serialize the syntax tree")]
    #[diagnostic(code(csound::cli::json_error))]
    Json(#[from] serde_json::Error),

    #[error("Failed to write output")]
    #[diagnostic(code(csound::cli::output_error))]
    Output(#[source] std::io::Error),
}

/// Convert IO errors with context
pub fn convert_io_error(error: std::io::Error, path: PathBuf) -> CliError {
    CliError::IoError { path, source: error }
}

/// Turns a non-success engine status into an error naming the call that produced it.
pub fn expect_success(operation: &'static str, status: Status) -> Result<(), CliError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(CliError::EngineStatus { operation, status })
    }
}
