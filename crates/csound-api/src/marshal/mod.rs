//! Conversions between engine-owned C structures and owned Rust values.
//!
//! Engine to host copies are deep and never fail: a null pointer becomes `None`, an empty
//! collection or an empty string, and no result keeps a pointer into engine memory.
//! Host to engine conversions validate before anything reaches the engine.

mod channel;
mod debug;
mod file;
mod graph;
mod list;
mod tree;

use std::ffi::{CStr, CString};

use libc::c_char;

use crate::error::{BridgeError, Result};

pub use channel::{
    channel_infos_from_native, hints_from_native, ChannelBehavior, ChannelHints, ChannelInfo,
    ChannelType, ChannelValue, NativeHints,
};
pub use debug::{
    breakpoint_from_native, BreakpointInfo, DebugInstrument, DebugOpcode, DebugVariable,
    VariableValue,
};
pub use file::{file_open_from_native, FileOpenInfo};
pub use graph::{graph_from_native, GraphData};
pub use list::{
    opcode_entries_from_native, utility_names_from_native, ListKind, NativeList, OpcodeEntry,
};
pub use tree::{syntax_tree_from_native, ParsedTree, Siblings, SyntaxNode, Token};

/// Copies a NUL-terminated engine string. Invalid UTF-8 is replaced lossily.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string valid for the duration of the call.
pub unsafe fn string_from_ptr(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// Copies a fixed-size, possibly unterminated character buffer.
pub(crate) fn string_from_buffer(buffer: &[c_char]) -> String {
    let bytes: Vec<u8> = buffer.iter().take_while(|&&c| c != 0).map(|&c| c as u8).collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Converts a host string argument, rejecting interior NUL bytes.
pub(crate) fn c_string(name: &'static str, value: &str) -> Result<CString> {
    CString::new(value).map_err(|err| {
        BridgeError::invalid(name, format!("contains a NUL byte at offset {}", err.nul_position()))
    })
}
