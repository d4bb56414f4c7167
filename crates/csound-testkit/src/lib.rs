//! An in-process engine for exercising `csound-api` without `libcsound64`.
//!
//! [`ScriptedEngine`] understands a small slice of the orchestra language (header
//! assignments, `instr`/`endin`, channel declarations, `prints` and `return`) and of the
//! score language (`i`, `f`, `e`). It allocates trees, channel lists, opcode lists and
//! utility lists with the same layouts and ownership rules the real engine uses, and
//! raises callbacks through the instance's [`CallbackHub`](csound_api::CallbackHub).

mod engine;
mod native;
pub mod orchestra;
pub mod score;

pub use engine::{
    ScriptedEngine, API_VERSION, DEFAULT_KSMPS, DEFAULT_SR, DEFAULT_ZERO_DBFS, OPCODES, UTILITIES,
    VERSION,
};

/// A host driving scripted instances.
pub type ScriptedHost = csound_api::Host<ScriptedEngine>;
