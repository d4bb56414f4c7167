//! Synchronous pass-through operations.
//!
//! Each method validates its arguments, forwards to the engine and hands the engine's
//! result back unchanged. `Err` is reserved for usage and resource errors; engine status
//! codes travel inside `Ok`.

use std::ffi::{CStr, CString};
use std::ptr::{self, NonNull};

use csound_sys::controlChannelHints_t;
use libc::c_char;

use crate::bridge::Command;
use crate::engine::Engine;
use crate::error::{BridgeError, Result};
use crate::host::Host;
use crate::marshal::{
    c_string, channel_infos_from_native, hints_from_native, opcode_entries_from_native,
    syntax_tree_from_native, utility_names_from_native, ChannelHints, ChannelInfo, ChannelValue,
    ListKind, NativeHints, NativeList, OpcodeEntry, ParsedTree,
};
use crate::message::MessageAttributes;
use crate::registry::InstanceId;
use crate::status::Status;

impl<E: Engine> Host<E> {
    // Process-wide

    pub fn version() -> i32 {
        E::version()
    }

    pub fn api_version() -> i32 {
        E::api_version()
    }

    pub fn size_of_myflt() -> i32 {
        E::size_of_myflt()
    }

    /// Sets an environment variable for every instance created afterwards, in any host.
    pub fn set_global_env(name: &str, value: &str) -> Result<Status> {
        let name = c_string("name", name)?;
        let value = c_string("value", value)?;
        Ok(E::set_global_env(&name, &value))
    }

    pub fn env(&self, id: InstanceId, name: &str) -> Result<Option<String>> {
        let name = c_string("name", name)?;
        Ok(self.engine(id)?.env(&name))
    }

    // Compilation

    /// Parses an orchestra. An empty orchestra or a syntax error gives `None`.
    pub fn parse_orc(&self, id: InstanceId, orchestra: &str) -> Result<Option<ParsedTree>> {
        let orchestra = c_string("orchestra", orchestra)?;
        let raw = self.engine(id)?.parse_orc(&orchestra);
        let Some(native) = NonNull::new(raw) else {
            return Ok(None);
        };
        let root = unsafe { syntax_tree_from_native(raw) };
        Ok(root.map(|root| ParsedTree::new(id, native, root)))
    }

    pub fn compile_tree(&self, id: InstanceId, tree: &ParsedTree) -> Result<Status> {
        check_owner("syntax tree", tree.owner(), id)?;
        let native = tree.native().ok_or(BridgeError::TreeReleased)?;
        let engine = self.engine(id)?;
        Ok(unsafe { engine.compile_tree(native.as_ptr()) })
    }

    /// Frees the native tree. The owned copy in `tree` stays readable. Releasing twice is a no-op.
    pub fn delete_tree(&self, id: InstanceId, tree: &mut ParsedTree) -> Result<()> {
        check_owner("syntax tree", tree.owner(), id)?;
        let engine = self.engine(id)?;
        match tree.take_native() {
            Some(native) => unsafe { engine.delete_tree(native.as_ptr()) },
            None => log::debug!("Syntax tree of instance {} already released.", id),
        }
        Ok(())
    }

    pub fn compile_orc(&self, id: InstanceId, orchestra: &str) -> Result<Status> {
        let orchestra = c_string("orchestra", orchestra)?;
        self.feed(id, Command::CompileOrc(orchestra))
    }

    pub fn eval_code(&self, id: InstanceId, code: &str) -> Result<f64> {
        let code = c_string("code", code)?;
        Ok(self.engine(id)?.eval_code(&code))
    }

    /// Compiles from command-line style arguments; the first is the program name.
    pub fn compile_args(&self, id: InstanceId, args: &[&str]) -> Result<Status> {
        let args = c_strings(args)?;
        let args: Vec<&CStr> = args.iter().map(CString::as_c_str).collect();
        Ok(self.engine(id)?.compile_args(&args))
    }

    /// Compiles from arguments and starts the engine.
    pub fn compile(&self, id: InstanceId, args: &[&str]) -> Result<Status> {
        let args = c_strings(args)?;
        let args: Vec<&CStr> = args.iter().map(CString::as_c_str).collect();
        Ok(self.engine(id)?.compile(&args))
    }

    pub fn compile_csd(&self, id: InstanceId, path: &str) -> Result<Status> {
        let path = c_string("path", path)?;
        Ok(self.engine(id)?.compile_csd(&path))
    }

    /// Prepares the engine for performance. Without a compiled orchestra the engine
    /// reports an initialization error.
    pub fn start(&self, id: InstanceId) -> Result<Status> {
        Ok(self.idle_engine(id)?.start())
    }

    pub fn cleanup(&self, id: InstanceId) -> Result<Status> {
        Ok(self.idle_engine(id)?.cleanup())
    }

    pub fn reset(&self, id: InstanceId) -> Result<()> {
        self.idle_engine(id)?.reset();
        Ok(())
    }

    // Attributes

    pub fn sr(&self, id: InstanceId) -> Result<f64> {
        Ok(self.engine(id)?.sr())
    }

    pub fn kr(&self, id: InstanceId) -> Result<f64> {
        Ok(self.engine(id)?.kr())
    }

    pub fn ksmps(&self, id: InstanceId) -> Result<u32> {
        Ok(self.engine(id)?.ksmps())
    }

    pub fn nchnls(&self, id: InstanceId) -> Result<u32> {
        Ok(self.engine(id)?.nchnls())
    }

    pub fn nchnls_input(&self, id: InstanceId) -> Result<u32> {
        Ok(self.engine(id)?.nchnls_input())
    }

    pub fn zero_dbfs(&self, id: InstanceId) -> Result<f64> {
        Ok(self.engine(id)?.zero_dbfs())
    }

    pub fn current_time_samples(&self, id: InstanceId) -> Result<i64> {
        Ok(self.engine(id)?.current_time_samples())
    }

    pub fn set_option(&self, id: InstanceId, option: &str) -> Result<Status> {
        let option = c_string("option", option)?;
        Ok(self.engine(id)?.set_option(&option))
    }

    pub fn debug(&self, id: InstanceId) -> Result<bool> {
        Ok(self.engine(id)?.debug())
    }

    pub fn set_debug(&self, id: InstanceId, debug: bool) -> Result<()> {
        self.engine(id)?.set_debug(debug);
        Ok(())
    }

    pub fn output_name(&self, id: InstanceId) -> Result<Option<String>> {
        Ok(self.engine(id)?.output_name())
    }

    /// Sets the output destination, with an optional file type (`wav`, `aiff`, ...) and
    /// sample format (`short`, `float`, ...).
    pub fn set_output(
        &self,
        id: InstanceId,
        name: &str,
        file_type: Option<&str>,
        format: Option<&str>,
    ) -> Result<()> {
        let name = c_string("name", name)?;
        let file_type = file_type.map(|value| c_string("type", value)).transpose()?;
        let format = format.map(|value| c_string("format", value)).transpose()?;
        self.engine(id)?
            .set_output(&name, file_type.as_deref(), format.as_deref());
        Ok(())
    }

    // Score

    pub fn read_score(&self, id: InstanceId, score: &str) -> Result<Status> {
        let score = c_string("score", score)?;
        self.feed(id, Command::ReadScore(score))
    }

    pub fn score_time(&self, id: InstanceId) -> Result<f64> {
        Ok(self.engine(id)?.score_time())
    }

    pub fn is_score_pending(&self, id: InstanceId) -> Result<bool> {
        Ok(self.engine(id)?.is_score_pending())
    }

    pub fn set_score_pending(&self, id: InstanceId, pending: bool) -> Result<()> {
        self.engine(id)?.set_score_pending(pending);
        Ok(())
    }

    pub fn score_offset_seconds(&self, id: InstanceId) -> Result<f64> {
        Ok(self.engine(id)?.score_offset_seconds())
    }

    pub fn set_score_offset_seconds(&self, id: InstanceId, offset: f64) -> Result<()> {
        self.engine(id)?.set_score_offset_seconds(offset);
        Ok(())
    }

    pub fn rewind_score(&self, id: InstanceId) -> Result<()> {
        self.engine(id)?.rewind_score();
        Ok(())
    }

    /// Sends one score event (`i`, `f`, `e`, ...) with its p-fields.
    pub fn score_event(&self, id: InstanceId, kind: char, pfields: &[f64]) -> Result<Status> {
        if !kind.is_ascii() {
            return Err(BridgeError::invalid(
                "kind",
                format!("`{kind}` is not a single-byte event type"),
            ));
        }
        self.feed(id, Command::ScoreEvent(kind as u8 as c_char, pfields.to_vec()))
    }

    /// Sends score lines to the engine as if typed on its line input.
    pub fn input_message(&self, id: InstanceId, message: &str) -> Result<Status> {
        let message = c_string("message", message)?;
        self.feed(id, Command::InputMessage(message))
    }

    /// Runs `command` now, or defers it to the worker of a running performance.
    fn feed(&self, id: InstanceId, command: Command) -> Result<Status> {
        let instance = self.instance(id)?;
        match instance.performance.active_control() {
            Some(control) => {
                control.push(command);
                Ok(Status::SUCCESS)
            }
            None => Ok(command.run(instance.engine.as_ref())),
        }
    }

    // Messages

    pub fn message(&self, id: InstanceId, text: &str) -> Result<()> {
        let text = c_string("text", text)?;
        self.engine(id)?.message(None, &text);
        Ok(())
    }

    pub fn message_s(
        &self,
        id: InstanceId,
        attributes: MessageAttributes,
        text: &str,
    ) -> Result<()> {
        let text = c_string("text", text)?;
        self.engine(id)?.message(Some(attributes), &text);
        Ok(())
    }

    pub fn message_level(&self, id: InstanceId) -> Result<i32> {
        Ok(self.engine(id)?.message_level())
    }

    pub fn set_message_level(&self, id: InstanceId, level: i32) -> Result<()> {
        self.engine(id)?.set_message_level(level);
        Ok(())
    }

    /// Buffers messages inside the engine instead of delivering them to the message callback.
    pub fn create_message_buffer(&self, id: InstanceId, echo_to_stdout: bool) -> Result<()> {
        self.engine(id)?.create_message_buffer(echo_to_stdout);
        Ok(())
    }

    pub fn first_message(&self, id: InstanceId) -> Result<Option<String>> {
        Ok(self.engine(id)?.first_message())
    }

    pub fn first_message_attributes(&self, id: InstanceId) -> Result<MessageAttributes> {
        Ok(MessageAttributes::from(self.engine(id)?.first_message_attributes()))
    }

    pub fn pop_first_message(&self, id: InstanceId) -> Result<()> {
        self.engine(id)?.pop_first_message();
        Ok(())
    }

    pub fn message_count(&self, id: InstanceId) -> Result<i32> {
        Ok(self.engine(id)?.message_count())
    }

    pub fn destroy_message_buffer(&self, id: InstanceId) -> Result<()> {
        self.engine(id)?.destroy_message_buffer();
        Ok(())
    }

    // Channels

    /// Lists the declared channels. The count is the engine's return value; when it is
    /// negative the list is empty.
    pub fn list_channels(&self, id: InstanceId) -> Result<(i32, NativeList<ChannelInfo>)> {
        let engine = self.engine(id)?;
        let mut raw = ptr::null_mut();
        let count = engine.list_channels(&mut raw);
        let items = unsafe { channel_infos_from_native(raw, count) };
        Ok((count, NativeList::new(id, ListKind::Channels, raw.cast(), items)))
    }

    /// Frees the native channel list and empties `list`.
    pub fn delete_channel_list(
        &self,
        id: InstanceId,
        list: &mut NativeList<ChannelInfo>,
    ) -> Result<()> {
        self.release_list(id, list, |engine, raw| unsafe {
            engine.delete_channel_list(raw.cast())
        })
    }

    /// Reads the hints of a control channel. `None` unless the status is success.
    pub fn control_channel_hints(
        &self,
        id: InstanceId,
        name: &str,
    ) -> Result<(Status, Option<ChannelHints>)> {
        let name = c_string("name", name)?;
        let mut raw = controlChannelHints_t::default();
        let status = self.engine(id)?.control_channel_hints(&name, &mut raw);
        let hints = status.is_success().then(|| unsafe { hints_from_native(&raw) });
        Ok((status, hints))
    }

    pub fn set_control_channel_hints(
        &self,
        id: InstanceId,
        name: &str,
        hints: &ChannelHints,
    ) -> Result<Status> {
        let name = c_string("name", name)?;
        let native = NativeHints::try_from(hints)?;
        Ok(self.engine(id)?.set_control_channel_hints(&name, native.as_raw()))
    }

    pub fn control_channel(&self, id: InstanceId, name: &str) -> Result<ChannelValue> {
        let name = c_string("name", name)?;
        let (value, status) = self.engine(id)?.control_channel(&name);
        Ok(ChannelValue { value, status })
    }

    pub fn set_control_channel(&self, id: InstanceId, name: &str, value: f64) -> Result<()> {
        let name = c_string("name", name)?;
        self.engine(id)?.set_control_channel(&name, value);
        Ok(())
    }

    // Tables

    pub fn table_length(&self, id: InstanceId, table: i32) -> Result<i32> {
        Ok(self.engine(id)?.table_length(table))
    }

    pub fn table_get(&self, id: InstanceId, table: i32, index: i32) -> Result<f64> {
        Ok(self.engine(id)?.table_get(table, index))
    }

    pub fn table_set(&self, id: InstanceId, table: i32, index: i32, value: f64) -> Result<()> {
        self.engine(id)?.table_set(table, index, value);
        Ok(())
    }

    // Graphs

    /// Enables function-table display callbacks. Returns the previous setting.
    pub fn set_is_graphable(&self, id: InstanceId, graphable: bool) -> Result<bool> {
        Ok(self.engine(id)?.set_is_graphable(graphable))
    }

    // Opcodes and utilities

    pub fn new_opcode_list(&self, id: InstanceId) -> Result<(i32, NativeList<OpcodeEntry>)> {
        let engine = self.engine(id)?;
        let mut raw = ptr::null_mut();
        let count = engine.new_opcode_list(&mut raw);
        let items = unsafe { opcode_entries_from_native(raw, count) };
        Ok((count, NativeList::new(id, ListKind::Opcodes, raw.cast(), items)))
    }

    /// Frees the native opcode list and empties `list`.
    pub fn dispose_opcode_list(
        &self,
        id: InstanceId,
        list: &mut NativeList<OpcodeEntry>,
    ) -> Result<()> {
        self.release_list(id, list, |engine, raw| unsafe {
            engine.dispose_opcode_list(raw.cast())
        })
    }

    pub fn list_utilities(&self, id: InstanceId) -> Result<NativeList<String>> {
        let raw = self.engine(id)?.list_utilities();
        let names = unsafe { utility_names_from_native(raw as *const *const c_char) };
        Ok(NativeList::new(id, ListKind::Utilities, raw.cast(), names))
    }

    /// Frees the native utility list and empties `list`.
    pub fn delete_utility_list(&self, id: InstanceId, list: &mut NativeList<String>) -> Result<()> {
        self.release_list(id, list, |engine, raw| unsafe { engine.delete_utility_list(raw.cast()) })
    }

    /// Description of a utility; `None` for an unknown or empty name.
    pub fn utility_description(&self, id: InstanceId, name: &str) -> Result<Option<String>> {
        let name = c_string("name", name)?;
        Ok(self.engine(id)?.utility_description(&name))
    }

    fn release_list<T>(
        &self,
        id: InstanceId,
        list: &mut NativeList<T>,
        free: impl FnOnce(&E, *mut libc::c_void),
    ) -> Result<()> {
        check_owner("list", list.owner(), id)?;
        let engine = self.engine(id)?;
        match list.release() {
            Some(raw) => {
                log::debug!("Releasing {:?} list of instance {}.", list.kind(), id);
                free(engine, raw.as_ptr());
            }
            None => log::debug!("{:?} list of instance {} already released.", list.kind(), id),
        }
        Ok(())
    }

    // Debugger

    pub fn debugger_init(&self, id: InstanceId) -> Result<()> {
        self.engine(id)?.debugger_init();
        Ok(())
    }

    pub fn debugger_clean(&self, id: InstanceId) -> Result<()> {
        self.engine(id)?.debugger_clean();
        Ok(())
    }

    /// Breaks when `instrument` runs; `skip` control periods pass between repeated breaks.
    pub fn set_instrument_breakpoint(
        &self,
        id: InstanceId,
        instrument: f64,
        skip: i32,
    ) -> Result<()> {
        if skip < 0 {
            return Err(BridgeError::invalid("skip", format!("{skip} is negative")));
        }
        self.engine(id)?.set_instrument_breakpoint(instrument, skip);
        Ok(())
    }

    pub fn remove_instrument_breakpoint(&self, id: InstanceId, instrument: f64) -> Result<()> {
        self.engine(id)?.remove_instrument_breakpoint(instrument);
        Ok(())
    }

    pub fn clear_breakpoints(&self, id: InstanceId) -> Result<()> {
        self.engine(id)?.clear_breakpoints();
        Ok(())
    }

    pub fn debug_continue(&self, id: InstanceId) -> Result<()> {
        self.engine(id)?.debug_continue();
        Ok(())
    }

    pub fn debug_stop(&self, id: InstanceId) -> Result<()> {
        self.engine(id)?.debug_stop();
        Ok(())
    }
}

fn c_strings(args: &[&str]) -> Result<Vec<CString>> {
    args.iter().map(|arg| c_string("args", arg)).collect()
}

fn check_owner(what: &'static str, owner: InstanceId, used_with: InstanceId) -> Result<()> {
    if owner == used_with {
        Ok(())
    } else {
        Err(BridgeError::ForeignHandle {
            what,
            owner,
            used_with,
        })
    }
}
