use std::path::PathBuf;

use thiserror::Error;

use crate::registry::InstanceId;

/// Errors raised by the binding itself.
///
/// Engine status codes are never turned into a `BridgeError`; they are returned
/// verbatim inside `Ok` (see [`crate::Status`]).
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Instance {0} is not registered (destroyed or never created).")]
    UnknownInstance(InstanceId),

    #[error("Engine failed to allocate a new instance.")]
    CreateFailed,

    #[error("Instance {0} is already performing.")]
    AlreadyPerforming(InstanceId),

    #[error("Invalid argument `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("Syntax tree was already released.")]
    TreeReleased,

    #[error("Native {what} belongs to instance {owner}, not {used_with}.")]
    ForeignHandle {
        what: &'static str,
        owner: InstanceId,
        used_with: InstanceId,
    },

    #[error("Failed to spawn performance worker.")]
    WorkerSpawn(#[source] std::io::Error),

    #[error("Failed to read configuration file {path}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl BridgeError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        BridgeError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
