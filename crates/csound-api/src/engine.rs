//! The seam between the binding and the engine's C entry points.
//!
//! [`Engine`] mirrors the engine API one call per method with borrowed C strings and raw
//! native structures. Validation, marshalling and state tracking happen in
//! [`Host`](crate::Host); implementations only forward.
//!
//! Thread-safety: a single instance is called from the host thread and from at most one
//! performance worker at a time. Whether two such calls may overlap is the engine's own
//! guarantee; implementations add no locking.

use std::ffi::CStr;
use std::sync::Arc;

use csound_sys::{controlChannelHints_t, controlChannelInfo_t, opcodeListEntry, TREE};
use libc::c_char;

use crate::message::MessageAttributes;
use crate::status::Status;
use crate::trampoline::{CallbackHub, CallbackKind};

pub trait Engine: Send + Sync + Sized + 'static {
    /// Process-wide initialisation. Returns the engine's code, positive when already done.
    fn initialize(flags: i32) -> i32;
    fn version() -> i32;
    fn api_version() -> i32;
    fn size_of_myflt() -> i32;
    /// Sets a variable for every instance created afterwards.
    fn set_global_env(name: &CStr, value: &CStr) -> Status;

    /// Creates an instance whose native callbacks report to `hub`. `None` on allocation failure.
    fn create(hub: Arc<CallbackHub>) -> Option<Self>;

    /// Installs or removes the native trampoline for one callback kind.
    fn install_callback(&self, kind: CallbackKind, enabled: bool);

    /// Installs or removes the process-wide default message trampoline, which reports through
    /// [`deliver_default_message`](crate::deliver_default_message). Instances created while it
    /// is installed use it until they get a message callback of their own.
    fn set_default_message_callback(enabled: bool);

    // Compilation
    fn parse_orc(&self, orchestra: &CStr) -> *mut TREE;
    /// # Safety
    /// `tree` must come from `parse_orc` on this instance and not be deleted yet.
    unsafe fn compile_tree(&self, tree: *mut TREE) -> Status;
    /// # Safety
    /// `tree` must come from `parse_orc` on this instance and not be deleted yet.
    unsafe fn delete_tree(&self, tree: *mut TREE);
    fn compile_orc(&self, orchestra: &CStr) -> Status;
    fn eval_code(&self, code: &CStr) -> f64;
    fn compile_args(&self, args: &[&CStr]) -> Status;
    fn compile(&self, args: &[&CStr]) -> Status;
    fn compile_csd(&self, path: &CStr) -> Status;
    fn start(&self) -> Status;

    // Performance
    fn perform(&self) -> i32;
    fn perform_ksmps(&self) -> i32;
    fn perform_buffer(&self) -> i32;
    fn stop(&self);
    fn cleanup(&self) -> Status;
    fn reset(&self);

    // Attributes
    fn sr(&self) -> f64;
    fn kr(&self) -> f64;
    fn ksmps(&self) -> u32;
    fn nchnls(&self) -> u32;
    fn nchnls_input(&self) -> u32;
    fn zero_dbfs(&self) -> f64;
    fn current_time_samples(&self) -> i64;
    fn set_option(&self, option: &CStr) -> Status;
    fn debug(&self) -> bool;
    fn set_debug(&self, debug: bool);
    fn output_name(&self) -> Option<String>;
    fn set_output(&self, name: &CStr, file_type: Option<&CStr>, format: Option<&CStr>);

    // Score
    fn read_score(&self, score: &CStr) -> Status;
    fn score_time(&self) -> f64;
    fn is_score_pending(&self) -> bool;
    fn set_score_pending(&self, pending: bool);
    fn score_offset_seconds(&self) -> f64;
    fn set_score_offset_seconds(&self, offset: f64);
    fn rewind_score(&self);
    fn score_event(&self, kind: c_char, pfields: &[f64]) -> Status;
    fn input_message(&self, message: &CStr);

    // Messages
    fn message(&self, attributes: Option<MessageAttributes>, text: &CStr);
    fn message_level(&self) -> i32;
    fn set_message_level(&self, level: i32);
    fn create_message_buffer(&self, echo_to_stdout: bool);
    fn first_message(&self) -> Option<String>;
    fn first_message_attributes(&self) -> i32;
    fn pop_first_message(&self);
    fn message_count(&self) -> i32;
    fn destroy_message_buffer(&self);

    // Channels
    /// Stores the engine-allocated array in `list` and returns its length, negative on error.
    fn list_channels(&self, list: &mut *mut controlChannelInfo_t) -> i32;
    /// # Safety
    /// `list` must come from `list_channels` on this instance and not be deleted yet.
    unsafe fn delete_channel_list(&self, list: *mut controlChannelInfo_t);
    /// Fills `hints`; its attribute string stays engine-owned.
    fn control_channel_hints(&self, name: &CStr, hints: &mut controlChannelHints_t) -> Status;
    /// The engine copies everything it keeps; `hints` only has to live for the call.
    fn set_control_channel_hints(&self, name: &CStr, hints: controlChannelHints_t) -> Status;
    fn control_channel(&self, name: &CStr) -> (f64, Status);
    fn set_control_channel(&self, name: &CStr, value: f64);

    // Tables
    fn table_length(&self, table: i32) -> i32;
    fn table_get(&self, table: i32, index: i32) -> f64;
    fn table_set(&self, table: i32, index: i32, value: f64);

    // Graphs
    fn set_is_graphable(&self, graphable: bool) -> bool;

    // Opcodes, utilities, environment
    fn new_opcode_list(&self, list: &mut *mut opcodeListEntry) -> i32;
    /// # Safety
    /// `list` must come from `new_opcode_list` on this instance and not be disposed yet.
    unsafe fn dispose_opcode_list(&self, list: *mut opcodeListEntry);
    /// Null-terminated array of names, or null.
    fn list_utilities(&self) -> *mut *mut c_char;
    /// # Safety
    /// `list` must come from `list_utilities` on this instance and not be deleted yet.
    unsafe fn delete_utility_list(&self, list: *mut *mut c_char);
    fn utility_description(&self, name: &CStr) -> Option<String>;
    fn env(&self, name: &CStr) -> Option<String>;

    // Debugger
    fn debugger_init(&self);
    fn debugger_clean(&self);
    fn set_instrument_breakpoint(&self, instrument: f64, skip: i32);
    fn remove_instrument_breakpoint(&self, instrument: f64);
    fn clear_breakpoints(&self);
    fn debug_continue(&self);
    fn debug_stop(&self);
}
