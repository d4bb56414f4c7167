use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::status::init_flags;

/// Settings applied by a [`Host`](crate::Host) to the engine and to every instance it creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Flags for the process-wide engine initialisation.
    pub init_flags: i32,

    /// Engine options (`-d`, `-m0`, `--sample-rate=...`) set on each new instance.
    pub options: Vec<String>,

    /// Message level set on each new instance.
    pub message_level: Option<i32>,

    /// How long a worker paused at a breakpoint waits between checks for a destroyed instance.
    pub breakpoint_poll_ms: u64,

    pub worker: WorkerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name given to performance threads.
    pub thread_name: String,

    /// Stack size of performance threads; the platform default when unset.
    pub stack_size: Option<usize>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            init_flags: init_flags::NO_SIGNAL_HANDLER,
            options: Vec::new(),
            message_level: None,
            breakpoint_poll_ms: default_breakpoint_poll_ms(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: "csound-perform".to_string(),
            stack_size: None,
        }
    }
}

fn default_breakpoint_poll_ms() -> u64 {
    50
}

impl HostConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| BridgeError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn breakpoint_poll_interval(&self) -> Duration {
        Duration::from_millis(self.breakpoint_poll_ms.max(1))
    }
}
