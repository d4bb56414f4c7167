//! Host-side binding to the Csound 6 engine.
//!
//! A [`Host`] owns engine instances and runs every host callback on its own thread.
//! Instances are named by generation-checked [`InstanceId`]s, so a handle that outlives
//! its instance is reported as [`BridgeError::UnknownInstance`] instead of reaching freed
//! memory.
//!
//! # Architecture
//!
//! - [`Engine`]: one method per engine entry point. [`NativeEngine`] (feature `libcsound`)
//!   forwards to `csound64`; `csound-testkit` provides a scripted stand-in.
//! - [`marshal`]: deep copies of engine structures (syntax trees, channel and opcode
//!   lists, graph windows, breakpoint reports) into owned Rust values.
//! - [`Host`]: registry, synchronous pass-through calls, callback slots and the event pump.
//! - Asynchronous performance: [`Host::perform_async`] steps the engine on a worker thread;
//!   results and callbacks come back through [`Host::poll_events`].
//!
//! # Usage
//!
//! ```
//! use csound_api::{Host, HostConfig, HostData, Status};
//! use csound_testkit::ScriptedEngine;
//!
//! let mut host: Host<ScriptedEngine> = Host::new(HostConfig::default());
//! let id = host.create(HostData::none()).unwrap();
//! assert_eq!(host.compile_orc(id, "sr = 48000\ninstr 1\nendin\n").unwrap(), Status::SUCCESS);
//! assert_eq!(host.read_score(id, "i 1 0 0.01\n").unwrap(), Status::SUCCESS);
//! host.start(id).unwrap();
//!
//! host.perform_async(id, |_host, _id, result| assert!(result > 0)).unwrap();
//! host.run_until_idle();
//! host.destroy(id).unwrap();
//! ```

mod adapter;
mod bridge;
mod config;
mod engine;
mod error;
mod host;
mod host_data;
pub mod marshal;
mod message;
#[cfg(feature = "libcsound")]
mod native;
mod registry;
mod status;
mod trampoline;

pub use bridge::{PerformanceHandle, PerformanceState};
pub use config::{HostConfig, WorkerConfig};
pub use engine::Engine;
pub use error::{BridgeError, Result};
pub use host::{
    CompletionCallback, DefaultMessageCallback, FileOpenCallback, GraphCallback, Host,
    MakeGraphCallback, MessageCallback, ProgressCallback,
};
pub use host_data::HostData;
pub use marshal::{
    BreakpointInfo, ChannelBehavior, ChannelHints, ChannelInfo, ChannelType, ChannelValue,
    DebugInstrument, DebugOpcode, DebugVariable, FileOpenInfo, GraphData, ListKind, NativeList,
    OpcodeEntry, ParsedTree, SyntaxNode, Token, VariableValue,
};
pub use message::{Color, MessageAttributes, MessageKind};
#[cfg(feature = "libcsound")]
pub use native::NativeEngine;
pub use registry::InstanceId;
pub use status::{file_type, init_flags, Status};
pub use trampoline::{deliver_default_message, BreakpointCallback, CallbackHub, CallbackKind};

/// The host over the real engine.
#[cfg(feature = "libcsound")]
pub type CsoundHost = Host<NativeEngine>;
