//! Engine-owned C structures, allocated with the native layouts and freed on request.

use std::ffi::CString;
use std::ptr;

use csound_sys::{
    controlChannelHints_t, controlChannelInfo_t, debug_bkpt_info_t, debug_instr_t, debug_opcode_t,
    debug_variable_t, opcodeListEntry, ORCTOKEN, TREE, CAPSIZE, MYFLT, WINDAT,
};
use csound_api::marshal::ChannelHints;
use libc::{c_char, c_int, c_void};

use crate::orchestra::{unquote, Orchestra, Statement, Variable, VariableData};

pub const T_INSTR: c_int = 258;
pub const T_OPCALL: c_int = 259;
pub const T_IDENT: c_int = 260;
pub const T_INTEGER: c_int = 261;
pub const T_NUMBER: c_int = 262;
pub const T_STRCONST: c_int = 263;
pub const T_EXPR: c_int = 264;
pub const T_RETURN: c_int = 265;
pub const T_ASSIGN: c_int = b'=' as c_int;

pub(crate) fn c_string(text: &str) -> CString {
    CString::new(text.replace('\0', "")).unwrap_or_default()
}

fn token(kind: c_int, lexeme: &str) -> *mut ORCTOKEN {
    Box::into_raw(Box::new(ORCTOKEN {
        type_: kind,
        lexeme: c_string(lexeme).into_raw(),
        value: 0,
        fvalue: 0.0,
        optype: ptr::null_mut(),
        next: ptr::null_mut(),
    }))
}

fn node(kind: c_int, value: *mut ORCTOKEN, line: i32) -> *mut TREE {
    Box::into_raw(Box::new(TREE {
        type_: kind,
        value,
        rate: 0,
        len: 0,
        line,
        locn: 0,
        left: ptr::null_mut(),
        right: ptr::null_mut(),
        next: ptr::null_mut(),
        markup: ptr::null_mut(),
    }))
}

/// Links `nodes` through `next` and returns the head.
fn chain(nodes: Vec<*mut TREE>) -> *mut TREE {
    let mut head = ptr::null_mut();
    for node in nodes.into_iter().rev() {
        unsafe { (*node).next = head };
        head = node;
    }
    head
}

fn leaf(text: &str, line: i32) -> *mut TREE {
    let text = text.trim();
    if let Ok(value) = text.parse::<i32>() {
        let value_token = token(T_INTEGER, text);
        unsafe {
            (*value_token).value = value;
            (*value_token).fvalue = value as f64;
        }
        return node(T_INTEGER, value_token, line);
    }
    if let Ok(value) = text.parse::<f64>() {
        let value_token = token(T_NUMBER, text);
        unsafe { (*value_token).fvalue = value };
        return node(T_NUMBER, value_token, line);
    }
    let kind = if unquote(text).is_some() {
        T_STRCONST
    } else if text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        T_IDENT
    } else {
        T_EXPR
    };
    let tree = node(kind, token(kind, text), line);
    if kind == T_IDENT {
        unsafe { (*tree).rate = text.bytes().next().map_or(0, c_int::from) };
    }
    tree
}

fn statement_node(statement: &Statement) -> *mut TREE {
    match statement {
        Statement::Assign { target, expr, line } => {
            let tree = node(T_ASSIGN, token(T_ASSIGN, "="), *line);
            unsafe {
                (*tree).left = leaf(target, *line);
                (*tree).right = leaf(expr, *line);
            }
            tree
        }
        Statement::Opcode {
            outputs,
            name,
            args,
            line,
        } => {
            let tree = node(T_OPCALL, token(T_IDENT, name), *line);
            unsafe {
                (*tree).left = chain(outputs.iter().map(|output| leaf(output, *line)).collect());
                (*tree).right = chain(args.iter().map(|arg| leaf(arg, *line)).collect());
            }
            tree
        }
        Statement::Instrument(instrument) => {
            let tree = node(T_INSTR, token(T_INSTR, "instr"), instrument.line);
            let numbers = instrument
                .numbers
                .iter()
                .map(|number| leaf(&number.to_string(), instrument.line))
                .collect();
            unsafe {
                (*tree).left = chain(numbers);
                (*tree).right = chain(instrument.body.iter().map(statement_node).collect());
            }
            tree
        }
        Statement::Return { expr, line } => {
            let tree = node(T_RETURN, token(T_RETURN, "return"), *line);
            unsafe { (*tree).right = leaf(expr, *line) };
            tree
        }
    }
}

/// Builds the syntax tree of `orchestra`: top-level statements chained through `next`.
pub(crate) fn alloc_tree(orchestra: &Orchestra) -> *mut TREE {
    chain(orchestra.statements.iter().map(statement_node).collect())
}

/// # Safety
///
/// `root` must come from [`alloc_tree`] and not be freed yet.
pub(crate) unsafe fn free_tree(root: *mut TREE) {
    let mut pending = vec![root];
    while let Some(tree) = pending.pop() {
        if tree.is_null() {
            continue;
        }
        let tree = Box::from_raw(tree);
        pending.extend([tree.left, tree.right, tree.next]);
        let mut token = tree.value;
        while !token.is_null() {
            let owned = Box::from_raw(token);
            free_string(owned.lexeme);
            free_string(owned.optype);
            token = owned.next;
        }
    }
}

unsafe fn free_string(text: *mut c_char) {
    if !text.is_null() {
        drop(CString::from_raw(text));
    }
}

fn into_raw_slice<T>(items: Vec<T>) -> *mut T {
    Box::into_raw(items.into_boxed_slice()).cast()
}

unsafe fn from_raw_slice<T>(items: *mut T, len: usize) -> Box<[T]> {
    Box::from_raw(ptr::slice_from_raw_parts_mut(items, len))
}

pub(crate) struct ChannelRecord<'a> {
    pub name: &'a str,
    pub channel_type: i32,
    pub hints: &'a ChannelHints,
}

/// Builds the C hints record; `attributes` is stored as given.
pub(crate) fn raw_hints(hints: &ChannelHints, attributes: *mut c_char) -> controlChannelHints_t {
    controlChannelHints_t {
        behav: hints.behavior.raw(),
        dflt: hints.default,
        min: hints.min,
        max: hints.max,
        x: hints.x,
        y: hints.y,
        width: hints.width,
        height: hints.height,
        attributes,
    }
}

pub(crate) fn alloc_channel_list(channels: &[ChannelRecord<'_>]) -> *mut controlChannelInfo_t {
    let infos = channels
        .iter()
        .map(|channel| controlChannelInfo_t {
            name: c_string(channel.name).into_raw(),
            type_: channel.channel_type,
            hints: raw_hints(
                channel.hints,
                channel
                    .hints
                    .attributes
                    .as_deref()
                    .map_or(ptr::null_mut(), |text| c_string(text).into_raw()),
            ),
        })
        .collect();
    into_raw_slice(infos)
}

/// # Safety
///
/// `list` must come from [`alloc_channel_list`] with `len` entries and not be freed yet.
pub(crate) unsafe fn free_channel_list(list: *mut controlChannelInfo_t, len: usize) {
    for info in from_raw_slice(list, len).iter() {
        free_string(info.name);
        free_string(info.hints.attributes);
    }
}

pub(crate) fn alloc_opcode_list(opcodes: &[(&str, &str, &str)]) -> *mut opcodeListEntry {
    let entries = opcodes
        .iter()
        .map(|(name, outputs, inputs)| opcodeListEntry {
            opname: c_string(name).into_raw(),
            outypes: c_string(outputs).into_raw(),
            intypes: c_string(inputs).into_raw(),
            flags: 0,
        })
        .collect();
    into_raw_slice(entries)
}

/// # Safety
///
/// `list` must come from [`alloc_opcode_list`] with `len` entries and not be freed yet.
pub(crate) unsafe fn free_opcode_list(list: *mut opcodeListEntry, len: usize) {
    for entry in from_raw_slice(list, len).iter() {
        free_string(entry.opname);
        free_string(entry.outypes);
        free_string(entry.intypes);
    }
}

/// Null-terminated array of names.
pub(crate) fn alloc_name_list(names: &[&str]) -> *mut *mut c_char {
    let mut list: Vec<*mut c_char> = names.iter().map(|name| c_string(name).into_raw()).collect();
    list.push(ptr::null_mut());
    into_raw_slice(list)
}

/// # Safety
///
/// `list` must come from [`alloc_name_list`] and not be freed yet.
pub(crate) unsafe fn free_name_list(list: *mut *mut c_char) {
    let mut len = 0;
    while !(*list.add(len)).is_null() {
        free_string(*list.add(len));
        len += 1;
    }
    drop(from_raw_slice(list, len + 1));
}

/// Display window over `data`, valid while `data` is borrowed.
pub(crate) fn window(id: usize, caption: &str, data: &mut [MYFLT]) -> WINDAT {
    let mut text = [0 as c_char; CAPSIZE];
    for (slot, byte) in text.iter_mut().zip(caption.bytes().take(CAPSIZE - 1)) {
        *slot = byte as c_char;
    }
    let max = data.iter().copied().fold(f64::MIN, f64::max);
    let min = data.iter().copied().fold(f64::MAX, f64::min);
    let (max, min) = if data.is_empty() { (0.0, 0.0) } else { (max, min) };
    let absmax = max.abs().max(min.abs());
    WINDAT {
        windid: id,
        fdata: data.as_mut_ptr(),
        npts: data.len() as i32,
        caption: text,
        waitflg: 0,
        polarity: if min < 0.0 { csound_sys::BIPOL } else { csound_sys::POSPOL },
        max,
        min,
        absmax,
        oabsmax: absmax,
        danflag: 0,
        absflag: 0,
    }
}

/// One running instrument instance as reported to the debugger.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct InstanceSnapshot {
    pub p1: f64,
    pub p2: f64,
    pub p3: f64,
    pub kcounter: u64,
    pub line: i32,
}

#[derive(Debug, Clone)]
pub(crate) struct BreakpointReport {
    pub instrument: InstanceSnapshot,
    pub active: Vec<InstanceSnapshot>,
    pub variables: Vec<Variable>,
    pub opcode: Option<(String, i32)>,
}

fn debug_instr(snapshot: &InstanceSnapshot) -> debug_instr_t {
    debug_instr_t {
        instrptr: ptr::null_mut(),
        lclbas: ptr::null_mut(),
        varPoolHead: ptr::null_mut(),
        p1: snapshot.p1,
        p2: snapshot.p2,
        p3: snapshot.p3,
        kcounter: snapshot.kcounter,
        line: snapshot.line,
        next: ptr::null_mut(),
    }
}

/// Lays `report` out as a native breakpoint report and passes it to `f`. Everything is
/// freed when `f` returns.
pub(crate) fn with_native_report<R>(
    report: &BreakpointReport,
    f: impl FnOnce(*const debug_bkpt_info_t) -> R,
) -> R {
    let mut breakpoint = debug_instr(&report.instrument);

    let mut active: Vec<debug_instr_t> = report.active.iter().map(debug_instr).collect();
    let active_head = active.as_mut_ptr();
    for index in 1..active.len() {
        unsafe { (*active_head.add(index - 1)).next = active_head.add(index) };
    }

    let names: Vec<CString> =
        report.variables.iter().map(|variable| c_string(&variable.name)).collect();
    let types: Vec<CString> = report
        .variables
        .iter()
        .map(|variable| c_string(&variable.type_name))
        .collect();
    let texts: Vec<CString> = report
        .variables
        .iter()
        .map(|variable| match &variable.value {
            VariableData::Text(text) => c_string(text),
            VariableData::Number(_) => CString::default(),
        })
        .collect();
    let mut numbers: Vec<MYFLT> = report
        .variables
        .iter()
        .map(|variable| match variable.value {
            VariableData::Number(value) => value,
            VariableData::Text(_) => 0.0,
        })
        .collect();
    let numbers_head = numbers.as_mut_ptr();
    let mut variables: Vec<debug_variable_t> = report
        .variables
        .iter()
        .enumerate()
        .map(|(index, variable)| debug_variable_t {
            name: names[index].as_ptr(),
            typeName: types[index].as_ptr(),
            data: match variable.value {
                VariableData::Text(_) => texts[index].as_ptr() as *mut c_void,
                VariableData::Number(_) => unsafe { numbers_head.add(index) }.cast(),
            },
            next: ptr::null_mut(),
        })
        .collect();
    let variables_head = variables.as_mut_ptr();
    for index in 1..variables.len() {
        unsafe { (*variables_head.add(index - 1)).next = variables_head.add(index) };
    }

    let mut opcode = report.opcode.as_ref().map(|(name, line)| {
        let mut opname = [0 as c_char; 16];
        for (slot, byte) in opname.iter_mut().zip(name.bytes().take(15)) {
            *slot = byte as c_char;
        }
        debug_opcode_t {
            opname,
            line: *line,
            next: ptr::null_mut(),
            prev: ptr::null_mut(),
        }
    });

    let info = debug_bkpt_info_t {
        breakpointInstr: &mut breakpoint,
        instrVarList: if variables.is_empty() { ptr::null_mut() } else { variables_head },
        instrListHead: if active.is_empty() { ptr::null_mut() } else { active_head },
        currentOpcode: opcode.as_mut().map_or(ptr::null_mut(), |op| op as *mut debug_opcode_t),
    };
    f(&info)
}
