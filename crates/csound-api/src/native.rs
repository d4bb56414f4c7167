//! [`Engine`] backed by the real `csound64` library.

use std::ffi::CStr;
use std::ptr::{self, NonNull};
use std::sync::Arc;

use csound_sys as sys;
use csound_sys::{controlChannelHints_t, controlChannelInfo_t, opcodeListEntry, CSOUND, TREE};
use libc::{c_char, c_int, c_long, c_void};

use crate::engine::Engine;
use crate::marshal::string_from_ptr;
use crate::message::MessageAttributes;
use crate::status::Status;
use crate::trampoline::{CallbackHub, CallbackKind};

const PERCENT_S: &CStr = c"%s";

pub struct NativeEngine {
    csound: NonNull<CSOUND>,
    hub: Arc<CallbackHub>,
}

// The engine serialises its own state; the handle is only an address.
unsafe impl Send for NativeEngine {}
unsafe impl Sync for NativeEngine {}

impl NativeEngine {
    fn raw(&self) -> *mut CSOUND {
        self.csound.as_ptr()
    }

    pub fn hub(&self) -> &Arc<CallbackHub> {
        &self.hub
    }
}

impl Drop for NativeEngine {
    fn drop(&mut self) {
        log::debug!("Destroying native instance {}.", self.hub.instance());
        unsafe { sys::csoundDestroy(self.raw()) };
    }
}

/// The hub registered as host data of `csound`.
///
/// # Safety
///
/// `csound` must be an instance created by [`NativeEngine::create`] that is still alive.
unsafe fn hub_of<'a>(csound: *mut CSOUND) -> Option<&'a CallbackHub> {
    sys::csoundGetHostData(csound).cast::<CallbackHub>().as_ref()
}

unsafe extern "C" fn message_trampoline(csound: *mut CSOUND, attr: c_int, text: *const c_char) {
    if let (Some(hub), false) = (hub_of(csound), text.is_null()) {
        hub.message(attr, CStr::from_ptr(text));
    }
}

/// Longest default message kept; the rest is cut off.
const DEFAULT_MESSAGE_CAPACITY: usize = 4096;

extern "C" {
    fn vsnprintf(
        buffer: *mut c_char,
        size: libc::size_t,
        format: *const c_char,
        args: sys::va_list,
    ) -> c_int;
}

unsafe extern "C" fn default_message_trampoline(
    _csound: *mut CSOUND,
    attr: c_int,
    format: *const c_char,
    args: sys::va_list,
) {
    if format.is_null() {
        return;
    }
    // A single pass: the argument list cannot be walked twice without `va_copy`.
    let mut buffer = [0 as c_char; DEFAULT_MESSAGE_CAPACITY];
    let written = vsnprintf(buffer.as_mut_ptr(), buffer.len(), format, args);
    if written < 0 {
        return;
    }
    if written as usize >= DEFAULT_MESSAGE_CAPACITY {
        log::trace!("Default message of {} bytes truncated.", written);
    }
    crate::trampoline::deliver_default_message(attr, CStr::from_ptr(buffer.as_ptr()));
}

unsafe extern "C" fn make_graph_trampoline(
    csound: *mut CSOUND,
    data: *mut sys::WINDAT,
    name: *const c_char,
) {
    if let Some(hub) = hub_of(csound) {
        hub.make_graph(data, name);
    }
}

unsafe extern "C" fn draw_graph_trampoline(csound: *mut CSOUND, data: *mut sys::WINDAT) {
    if let Some(hub) = hub_of(csound) {
        hub.draw_graph(data);
    }
}

unsafe extern "C" fn kill_graph_trampoline(csound: *mut CSOUND, data: *mut sys::WINDAT) {
    if let Some(hub) = hub_of(csound) {
        hub.kill_graph(data);
    }
}

unsafe extern "C" fn file_open_trampoline(
    csound: *mut CSOUND,
    path: *const c_char,
    file_type: c_int,
    write: c_int,
    temp: c_int,
) {
    if let Some(hub) = hub_of(csound) {
        hub.file_open(path, file_type, write, temp);
    }
}

unsafe extern "C" fn breakpoint_trampoline(
    _csound: *mut CSOUND,
    info: *mut sys::debug_bkpt_info_t,
    userdata: *mut c_void,
) {
    if let Some(hub) = userdata.cast::<CallbackHub>().as_ref() {
        hub.breakpoint(info);
    }
}

fn owned(ptr: *const c_char) -> Option<String> {
    unsafe { string_from_ptr(ptr) }
}

fn argv(args: &[&CStr]) -> Vec<*const c_char> {
    args.iter().map(|arg| arg.as_ptr()).collect()
}

impl Engine for NativeEngine {
    fn initialize(flags: i32) -> i32 {
        unsafe { sys::csoundInitialize(flags) }
    }

    fn version() -> i32 {
        unsafe { sys::csoundGetVersion() }
    }

    fn api_version() -> i32 {
        unsafe { sys::csoundGetAPIVersion() }
    }

    fn size_of_myflt() -> i32 {
        unsafe { sys::csoundGetSizeOfMYFLT() }
    }

    fn set_global_env(name: &CStr, value: &CStr) -> Status {
        Status::from(unsafe { sys::csoundSetGlobalEnv(name.as_ptr(), value.as_ptr()) })
    }

    fn create(hub: Arc<CallbackHub>) -> Option<Self> {
        // The hub outlives the engine: the engine holds one of its references.
        let host_data = Arc::as_ptr(&hub) as *mut c_void;
        let csound = NonNull::new(unsafe { sys::csoundCreate(host_data) })?;
        Some(Self { csound, hub })
    }

    fn set_default_message_callback(enabled: bool) {
        let callback: Option<sys::csound_default_message_callback> =
            enabled.then_some(default_message_trampoline);
        unsafe { sys::csoundSetDefaultMessageCallback(callback) }
    }

    fn install_callback(&self, kind: CallbackKind, enabled: bool) {
        let csound = self.raw();
        log::trace!(
            "{} {:?} trampoline on instance {}.",
            if enabled { "Installing" } else { "Removing" },
            kind,
            self.hub.instance()
        );
        unsafe {
            match kind {
                CallbackKind::Message => {
                    let callback: Option<sys::csound_message_callback> =
                        enabled.then_some(message_trampoline);
                    sys::csoundSetMessageStringCallback(csound, callback)
                }
                CallbackKind::MakeGraph => {
                    let callback: Option<sys::csound_make_graph_callback> =
                        enabled.then_some(make_graph_trampoline);
                    sys::csoundSetMakeGraphCallback(csound, callback)
                }
                CallbackKind::DrawGraph => {
                    let callback: Option<sys::csound_graph_callback> =
                        enabled.then_some(draw_graph_trampoline);
                    sys::csoundSetDrawGraphCallback(csound, callback)
                }
                CallbackKind::KillGraph => {
                    let callback: Option<sys::csound_graph_callback> =
                        enabled.then_some(kill_graph_trampoline);
                    sys::csoundSetKillGraphCallback(csound, callback)
                }
                CallbackKind::FileOpen => {
                    let callback: Option<sys::csound_file_open_callback> =
                        enabled.then_some(file_open_trampoline);
                    sys::csoundSetFileOpenCallback(csound, callback)
                }
                CallbackKind::Breakpoint => {
                    let userdata = if enabled {
                        Arc::as_ptr(&self.hub) as *mut c_void
                    } else {
                        ptr::null_mut()
                    };
                    let callback: Option<sys::breakpoint_cb_t> =
                        enabled.then_some(breakpoint_trampoline);
                    sys::csoundSetBreakpointCallback(csound, callback, userdata)
                }
            }
        }
    }

    fn parse_orc(&self, orchestra: &CStr) -> *mut TREE {
        unsafe { sys::csoundParseOrc(self.raw(), orchestra.as_ptr()) }
    }

    unsafe fn compile_tree(&self, tree: *mut TREE) -> Status {
        Status::from(sys::csoundCompileTree(self.raw(), tree))
    }

    unsafe fn delete_tree(&self, tree: *mut TREE) {
        sys::csoundDeleteTree(self.raw(), tree)
    }

    fn compile_orc(&self, orchestra: &CStr) -> Status {
        Status::from(unsafe { sys::csoundCompileOrc(self.raw(), orchestra.as_ptr()) })
    }

    fn eval_code(&self, code: &CStr) -> f64 {
        unsafe { sys::csoundEvalCode(self.raw(), code.as_ptr()) }
    }

    fn compile_args(&self, args: &[&CStr]) -> Status {
        let argv = argv(args);
        let argc = argv.len() as c_int;
        Status::from(unsafe { sys::csoundCompileArgs(self.raw(), argc, argv.as_ptr()) })
    }

    fn compile(&self, args: &[&CStr]) -> Status {
        let argv = argv(args);
        Status::from(unsafe { sys::csoundCompile(self.raw(), argv.len() as c_int, argv.as_ptr()) })
    }

    fn compile_csd(&self, path: &CStr) -> Status {
        Status::from(unsafe { sys::csoundCompileCsd(self.raw(), path.as_ptr()) })
    }

    fn start(&self) -> Status {
        Status::from(unsafe { sys::csoundStart(self.raw()) })
    }

    fn perform(&self) -> i32 {
        unsafe { sys::csoundPerform(self.raw()) }
    }

    fn perform_ksmps(&self) -> i32 {
        unsafe { sys::csoundPerformKsmps(self.raw()) }
    }

    fn perform_buffer(&self) -> i32 {
        unsafe { sys::csoundPerformBuffer(self.raw()) }
    }

    fn stop(&self) {
        unsafe { sys::csoundStop(self.raw()) }
    }

    fn cleanup(&self) -> Status {
        Status::from(unsafe { sys::csoundCleanup(self.raw()) })
    }

    fn reset(&self) {
        unsafe { sys::csoundReset(self.raw()) }
    }

    fn sr(&self) -> f64 {
        unsafe { sys::csoundGetSr(self.raw()) }
    }

    fn kr(&self) -> f64 {
        unsafe { sys::csoundGetKr(self.raw()) }
    }

    fn ksmps(&self) -> u32 {
        unsafe { sys::csoundGetKsmps(self.raw()) }
    }

    fn nchnls(&self) -> u32 {
        unsafe { sys::csoundGetNchnls(self.raw()) }
    }

    fn nchnls_input(&self) -> u32 {
        unsafe { sys::csoundGetNchnlsInput(self.raw()) }
    }

    fn zero_dbfs(&self) -> f64 {
        unsafe { sys::csoundGet0dBFS(self.raw()) }
    }

    fn current_time_samples(&self) -> i64 {
        unsafe { sys::csoundGetCurrentTimeSamples(self.raw()) }
    }

    fn set_option(&self, option: &CStr) -> Status {
        Status::from(unsafe { sys::csoundSetOption(self.raw(), option.as_ptr()) })
    }

    fn debug(&self) -> bool {
        unsafe { sys::csoundGetDebug(self.raw()) != 0 }
    }

    fn set_debug(&self, debug: bool) {
        unsafe { sys::csoundSetDebug(self.raw(), debug as c_int) }
    }

    fn output_name(&self) -> Option<String> {
        owned(unsafe { sys::csoundGetOutputName(self.raw()) })
    }

    fn set_output(&self, name: &CStr, file_type: Option<&CStr>, format: Option<&CStr>) {
        let file_type = file_type.map_or(ptr::null(), CStr::as_ptr);
        let format = format.map_or(ptr::null(), CStr::as_ptr);
        unsafe { sys::csoundSetOutput(self.raw(), name.as_ptr(), file_type, format) }
    }

    fn read_score(&self, score: &CStr) -> Status {
        Status::from(unsafe { sys::csoundReadScore(self.raw(), score.as_ptr()) })
    }

    fn score_time(&self) -> f64 {
        unsafe { sys::csoundGetScoreTime(self.raw()) }
    }

    fn is_score_pending(&self) -> bool {
        unsafe { sys::csoundIsScorePending(self.raw()) != 0 }
    }

    fn set_score_pending(&self, pending: bool) {
        unsafe { sys::csoundSetScorePending(self.raw(), pending as c_int) }
    }

    fn score_offset_seconds(&self) -> f64 {
        unsafe { sys::csoundGetScoreOffsetSeconds(self.raw()) }
    }

    fn set_score_offset_seconds(&self, offset: f64) {
        unsafe { sys::csoundSetScoreOffsetSeconds(self.raw(), offset) }
    }

    fn rewind_score(&self) {
        unsafe { sys::csoundRewindScore(self.raw()) }
    }

    fn score_event(&self, kind: c_char, pfields: &[f64]) -> Status {
        Status::from(unsafe {
            sys::csoundScoreEvent(self.raw(), kind, pfields.as_ptr(), pfields.len() as c_long)
        })
    }

    fn input_message(&self, message: &CStr) {
        unsafe { sys::csoundInputMessage(self.raw(), message.as_ptr()) }
    }

    fn message(&self, attributes: Option<MessageAttributes>, text: &CStr) {
        // Never pass user text as the format string.
        unsafe {
            match attributes {
                Some(attributes) => {
                    sys::csoundMessageS(
                        self.raw(),
                        attributes.bits() as c_int,
                        PERCENT_S.as_ptr(),
                        text.as_ptr(),
                    )
                }
                None => sys::csoundMessage(self.raw(), PERCENT_S.as_ptr(), text.as_ptr()),
            }
        }
    }

    fn message_level(&self) -> i32 {
        unsafe { sys::csoundGetMessageLevel(self.raw()) }
    }

    fn set_message_level(&self, level: i32) {
        unsafe { sys::csoundSetMessageLevel(self.raw(), level) }
    }

    fn create_message_buffer(&self, echo_to_stdout: bool) {
        unsafe { sys::csoundCreateMessageBuffer(self.raw(), echo_to_stdout as c_int) }
    }

    fn first_message(&self) -> Option<String> {
        owned(unsafe { sys::csoundGetFirstMessage(self.raw()) })
    }

    fn first_message_attributes(&self) -> i32 {
        unsafe { sys::csoundGetFirstMessageAttr(self.raw()) }
    }

    fn pop_first_message(&self) {
        unsafe { sys::csoundPopFirstMessage(self.raw()) }
    }

    fn message_count(&self) -> i32 {
        unsafe { sys::csoundGetMessageCnt(self.raw()) }
    }

    fn destroy_message_buffer(&self) {
        unsafe { sys::csoundDestroyMessageBuffer(self.raw()) }
    }

    fn list_channels(&self, list: &mut *mut controlChannelInfo_t) -> i32 {
        unsafe { sys::csoundListChannels(self.raw(), list) }
    }

    unsafe fn delete_channel_list(&self, list: *mut controlChannelInfo_t) {
        sys::csoundDeleteChannelList(self.raw(), list)
    }

    fn control_channel_hints(&self, name: &CStr, hints: &mut controlChannelHints_t) -> Status {
        Status::from(unsafe { sys::csoundGetControlChannelHints(self.raw(), name.as_ptr(), hints) })
    }

    fn set_control_channel_hints(&self, name: &CStr, hints: controlChannelHints_t) -> Status {
        Status::from(unsafe { sys::csoundSetControlChannelHints(self.raw(), name.as_ptr(), hints) })
    }

    fn control_channel(&self, name: &CStr) -> (f64, Status) {
        let mut err: c_int = 0;
        let value = unsafe { sys::csoundGetControlChannel(self.raw(), name.as_ptr(), &mut err) };
        (value, Status::from(err))
    }

    fn set_control_channel(&self, name: &CStr, value: f64) {
        unsafe { sys::csoundSetControlChannel(self.raw(), name.as_ptr(), value) }
    }

    fn table_length(&self, table: i32) -> i32 {
        unsafe { sys::csoundTableLength(self.raw(), table) }
    }

    fn table_get(&self, table: i32, index: i32) -> f64 {
        unsafe { sys::csoundTableGet(self.raw(), table, index) }
    }

    fn table_set(&self, table: i32, index: i32, value: f64) {
        unsafe { sys::csoundTableSet(self.raw(), table, index, value) }
    }

    fn set_is_graphable(&self, graphable: bool) -> bool {
        unsafe { sys::csoundSetIsGraphable(self.raw(), graphable as c_int) != 0 }
    }

    fn new_opcode_list(&self, list: &mut *mut opcodeListEntry) -> i32 {
        unsafe { sys::csoundNewOpcodeList(self.raw(), list) }
    }

    unsafe fn dispose_opcode_list(&self, list: *mut opcodeListEntry) {
        sys::csoundDisposeOpcodeList(self.raw(), list)
    }

    fn list_utilities(&self) -> *mut *mut c_char {
        unsafe { sys::csoundListUtilities(self.raw()) }
    }

    unsafe fn delete_utility_list(&self, list: *mut *mut c_char) {
        sys::csoundDeleteUtilityList(self.raw(), list)
    }

    fn utility_description(&self, name: &CStr) -> Option<String> {
        owned(unsafe { sys::csoundGetUtilityDescription(self.raw(), name.as_ptr()) })
    }

    fn env(&self, name: &CStr) -> Option<String> {
        owned(unsafe { sys::csoundGetEnv(self.raw(), name.as_ptr()) })
    }

    fn debugger_init(&self) {
        unsafe { sys::csoundDebuggerInit(self.raw()) }
    }

    fn debugger_clean(&self) {
        unsafe { sys::csoundDebuggerClean(self.raw()) }
    }

    fn set_instrument_breakpoint(&self, instrument: f64, skip: i32) {
        unsafe { sys::csoundSetInstrumentBreakpoint(self.raw(), instrument, skip) }
    }

    fn remove_instrument_breakpoint(&self, instrument: f64) {
        unsafe { sys::csoundRemoveInstrumentBreakpoint(self.raw(), instrument) }
    }

    fn clear_breakpoints(&self) {
        unsafe { sys::csoundClearBreakpoints(self.raw()) }
    }

    fn debug_continue(&self) {
        unsafe { sys::csoundDebugContinue(self.raw()) }
    }

    fn debug_stop(&self) {
        unsafe { sys::csoundDebugStop(self.raw()) }
    }
}
