//! Raw C layouts, constants and entry points of the Csound 6 host API (`csound64`).
//!
//! Everything here mirrors `csound.h`, `csound_orc.h`, `cwindow.h` and `csdebug.h`
//! one-to-one. Safe wrappers live in `csound-api`.
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]

use libc::{c_char, c_double, c_int, c_uint, c_void};

#[cfg(feature = "link")]
mod functions;
#[cfg(feature = "link")]
pub use functions::*;

/// Sample type of the double-precision engine build.
pub type MYFLT = c_double;

/// Opaque engine instance.
#[repr(C)]
pub struct CSOUND {
    _private: [u8; 0],
}

pub type CSOUND_STATUS = c_int;
pub const CSOUND_SUCCESS: CSOUND_STATUS = 0;
pub const CSOUND_ERROR: CSOUND_STATUS = -1;
pub const CSOUND_INITIALIZATION: CSOUND_STATUS = -2;
pub const CSOUND_PERFORMANCE: CSOUND_STATUS = -3;
pub const CSOUND_MEMORY: CSOUND_STATUS = -4;
pub const CSOUND_SIGNAL: CSOUND_STATUS = -5;

pub const CSOUNDINIT_NO_SIGNAL_HANDLER: c_int = 1;
pub const CSOUNDINIT_NO_ATEXIT: c_int = 2;

pub const CSOUNDMSG_DEFAULT: c_int = 0x0000;
pub const CSOUNDMSG_ERROR: c_int = 0x1000;
pub const CSOUNDMSG_ORCH: c_int = 0x2000;
pub const CSOUNDMSG_REALTIME: c_int = 0x3000;
pub const CSOUNDMSG_WARNING: c_int = 0x4000;
pub const CSOUNDMSG_STDOUT: c_int = 0x5000;

pub const CSOUNDMSG_FG_BLACK: c_int = 0x0100;
pub const CSOUNDMSG_FG_RED: c_int = 0x0101;
pub const CSOUNDMSG_FG_GREEN: c_int = 0x0102;
pub const CSOUNDMSG_FG_YELLOW: c_int = 0x0103;
pub const CSOUNDMSG_FG_BLUE: c_int = 0x0104;
pub const CSOUNDMSG_FG_MAGENTA: c_int = 0x0105;
pub const CSOUNDMSG_FG_CYAN: c_int = 0x0106;
pub const CSOUNDMSG_FG_WHITE: c_int = 0x0107;

pub const CSOUNDMSG_FG_BOLD: c_int = 0x0008;
pub const CSOUNDMSG_FG_UNDERLINE: c_int = 0x0080;

pub const CSOUNDMSG_BG_BLACK: c_int = 0x0200;
pub const CSOUNDMSG_BG_RED: c_int = 0x0210;
pub const CSOUNDMSG_BG_GREEN: c_int = 0x0220;
pub const CSOUNDMSG_BG_ORANGE: c_int = 0x0230;
pub const CSOUNDMSG_BG_BLUE: c_int = 0x0240;
pub const CSOUNDMSG_BG_MAGENTA: c_int = 0x0250;
pub const CSOUNDMSG_BG_CYAN: c_int = 0x0260;
pub const CSOUNDMSG_BG_GREY: c_int = 0x0270;

pub const CSOUNDMSG_TYPE_MASK: c_int = 0x7000;
pub const CSOUNDMSG_FG_COLOR_MASK: c_int = 0x0107;
pub const CSOUNDMSG_FG_ATTR_MASK: c_int = 0x0088;
pub const CSOUNDMSG_BG_COLOR_MASK: c_int = 0x0270;

pub type controlChannelType = c_int;
pub const CSOUND_CONTROL_CHANNEL: controlChannelType = 1;
pub const CSOUND_AUDIO_CHANNEL: controlChannelType = 2;
pub const CSOUND_STRING_CHANNEL: controlChannelType = 3;
pub const CSOUND_PVS_CHANNEL: controlChannelType = 4;
pub const CSOUND_VAR_CHANNEL: controlChannelType = 5;
pub const CSOUND_CHANNEL_TYPE_MASK: controlChannelType = 15;
pub const CSOUND_INPUT_CHANNEL: controlChannelType = 16;
pub const CSOUND_OUTPUT_CHANNEL: controlChannelType = 32;

pub type controlChannelBehavior = c_uint;
pub const CSOUND_CONTROL_CHANNEL_NO_HINTS: controlChannelBehavior = 0;
pub const CSOUND_CONTROL_CHANNEL_INT: controlChannelBehavior = 1;
pub const CSOUND_CONTROL_CHANNEL_LIN: controlChannelBehavior = 2;
pub const CSOUND_CONTROL_CHANNEL_EXP: controlChannelBehavior = 3;

pub const CSFTYPE_RAW_AUDIO: c_int = 10;
pub const CSFTYPE_IRCAM: c_int = 11;
pub const CSFTYPE_AIFF: c_int = 12;
pub const CSFTYPE_AIFC: c_int = 13;
pub const CSFTYPE_WAVE: c_int = 14;
pub const CSFTYPE_AU: c_int = 15;
pub const CSFTYPE_SD2: c_int = 16;
pub const CSFTYPE_W64: c_int = 17;
pub const CSFTYPE_WAVEX: c_int = 18;
pub const CSFTYPE_FLAC: c_int = 19;
pub const CSFTYPE_CAF: c_int = 20;
pub const CSFTYPE_WVE: c_int = 21;
pub const CSFTYPE_OGG: c_int = 22;
pub const CSFTYPE_MPC2K: c_int = 23;
pub const CSFTYPE_RF64: c_int = 24;
pub const CSFTYPE_AVR: c_int = 25;
pub const CSFTYPE_HTK: c_int = 26;
pub const CSFTYPE_MAT4: c_int = 27;
pub const CSFTYPE_MAT5: c_int = 28;
pub const CSFTYPE_NIST: c_int = 29;
pub const CSFTYPE_PAF: c_int = 30;
pub const CSFTYPE_PVF: c_int = 31;
pub const CSFTYPE_SDS: c_int = 32;
pub const CSFTYPE_SVX: c_int = 33;
pub const CSFTYPE_VOC: c_int = 34;
pub const CSFTYPE_XI: c_int = 35;
pub const CSFTYPE_UNKNOWN_AUDIO: c_int = 36;

pub const NOPOL: i16 = 0;
pub const NEGPOL: i16 = 1;
pub const POSPOL: i16 = 2;
pub const BIPOL: i16 = 3;

/// Capacity of the fixed caption buffer in `WINDAT`.
pub const CAPSIZE: usize = 60;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct ORCTOKEN {
    pub type_: c_int,
    pub lexeme: *mut c_char,
    pub value: c_int,
    pub fvalue: c_double,
    pub optype: *mut c_char,
    pub next: *mut ORCTOKEN,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TREE {
    pub type_: c_int,
    pub value: *mut ORCTOKEN,
    pub rate: c_int,
    pub len: c_int,
    pub line: c_int,
    pub locn: u64,
    pub left: *mut TREE,
    pub right: *mut TREE,
    pub next: *mut TREE,
    pub markup: *mut c_void,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct controlChannelHints_t {
    pub behav: controlChannelBehavior,
    pub dflt: MYFLT,
    pub min: MYFLT,
    pub max: MYFLT,
    pub x: c_int,
    pub y: c_int,
    pub width: c_int,
    pub height: c_int,
    /// Free text; engine-owned when read back from `csoundGetControlChannelHints`.
    pub attributes: *mut c_char,
}

impl Default for controlChannelHints_t {
    fn default() -> Self {
        Self {
            behav: CSOUND_CONTROL_CHANNEL_NO_HINTS,
            dflt: 0.0,
            min: 0.0,
            max: 0.0,
            x: 0,
            y: 0,
            width: 0,
            height: 0,
            attributes: std::ptr::null_mut(),
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct controlChannelInfo_t {
    pub name: *mut c_char,
    pub type_: c_int,
    pub hints: controlChannelHints_t,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct opcodeListEntry {
    pub opname: *mut c_char,
    pub outypes: *mut c_char,
    pub intypes: *mut c_char,
    pub flags: c_int,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct WINDAT {
    pub windid: usize,
    pub fdata: *mut MYFLT,
    pub npts: i32,
    pub caption: [c_char; CAPSIZE],
    pub waitflg: i16,
    pub polarity: i16,
    pub max: MYFLT,
    pub min: MYFLT,
    pub absmax: MYFLT,
    pub oabsmax: MYFLT,
    pub danflag: c_int,
    pub absflag: c_int,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct debug_instr_t {
    pub instrptr: *mut c_void,
    pub lclbas: *mut c_void,
    pub varPoolHead: *mut c_void,
    pub p1: MYFLT,
    pub p2: MYFLT,
    pub p3: MYFLT,
    pub kcounter: u64,
    pub line: c_int,
    pub next: *mut debug_instr_t,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct debug_opcode_t {
    pub opname: [c_char; 16],
    pub line: c_int,
    pub next: *mut debug_opcode_t,
    pub prev: *mut debug_opcode_t,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct debug_variable_t {
    pub name: *const c_char,
    pub typeName: *const c_char,
    pub data: *mut c_void,
    pub next: *mut debug_variable_t,
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct debug_bkpt_info_t {
    pub breakpointInstr: *mut debug_instr_t,
    pub instrVarList: *mut debug_variable_t,
    pub instrListHead: *mut debug_instr_t,
    pub currentOpcode: *mut debug_opcode_t,
}

pub type csound_message_callback =
    unsafe extern "C" fn(csound: *mut CSOUND, attr: c_int, text: *const c_char);

/// A `va_list` received as a callback argument. On x86_64 and AArch64 it reaches the callee
/// as a pointer, so it can only be forwarded to `v*printf`, never read directly.
pub type va_list = *mut c_void;

pub type csound_default_message_callback =
    unsafe extern "C" fn(csound: *mut CSOUND, attr: c_int, format: *const c_char, args: va_list);

pub type csound_file_open_callback = unsafe extern "C" fn(
    csound: *mut CSOUND,
    path: *const c_char,
    file_type: c_int,
    write: c_int,
    temp: c_int,
);

pub type csound_make_graph_callback =
    unsafe extern "C" fn(csound: *mut CSOUND, windat: *mut WINDAT, name: *const c_char);

pub type csound_graph_callback = unsafe extern "C" fn(csound: *mut CSOUND, windat: *mut WINDAT);

pub type breakpoint_cb_t = unsafe extern "C" fn(
    csound: *mut CSOUND,
    bkpt_info: *mut debug_bkpt_info_t,
    userdata: *mut c_void,
);
