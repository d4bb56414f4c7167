//! Command bodies of the `csound-bridge` tool.
//!
//! Every command is generic over [`csound_api::Engine`]; the binary instantiates them with
//! the native engine.

pub mod commands;
pub mod error;
pub mod io;
pub mod present;
pub mod style;

pub use error::CliError;
