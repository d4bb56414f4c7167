use csound_sys::{debug_bkpt_info_t, debug_instr_t, debug_opcode_t, debug_variable_t, MYFLT};
use libc::c_char;
use serde::Serialize;

use super::{string_from_buffer, string_from_ptr};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugInstrument {
    pub p1: f64,
    pub p2: f64,
    pub p3: f64,
    pub kcounter: u64,
    pub line: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugOpcode {
    pub name: String,
    pub line: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum VariableValue {
    Number(f64),
    Text(String),
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugVariable {
    pub name: String,
    pub type_name: String,
    pub value: VariableValue,
}

/// Everything the engine exposes at a breakpoint, copied out of the callback's scope.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BreakpointInfo {
    pub instrument: Option<DebugInstrument>,
    pub variables: Vec<DebugVariable>,
    /// Every active instrument instance, starting at the list head.
    pub active_instruments: Vec<DebugInstrument>,
    pub current_opcode: Option<DebugOpcode>,
}

impl BreakpointInfo {
    pub fn variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables
            .iter()
            .find(|variable| variable.name == name)
            .map(|variable| &variable.value)
    }
}

/// Copies the breakpoint report.
///
/// # Safety
///
/// `info` must be null or point to a report valid for the duration of the call. String
/// variables (type `S`) must point to a NUL-terminated string, every other variable to at
/// least one `MYFLT`.
pub unsafe fn breakpoint_from_native(info: *const debug_bkpt_info_t) -> BreakpointInfo {
    let Some(info) = info.as_ref() else {
        return BreakpointInfo::default();
    };

    let mut active_instruments = Vec::new();
    let mut cursor = info.instrListHead as *const debug_instr_t;
    while let Some(instr) = cursor.as_ref() {
        active_instruments.push(instrument(instr));
        cursor = instr.next;
    }

    let mut variables = Vec::new();
    let mut cursor = info.instrVarList as *const debug_variable_t;
    while let Some(var) = cursor.as_ref() {
        variables.push(variable(var));
        cursor = var.next;
    }

    BreakpointInfo {
        instrument: (info.breakpointInstr as *const debug_instr_t).as_ref().map(instrument),
        variables,
        active_instruments,
        current_opcode: (info.currentOpcode as *const debug_opcode_t)
            .as_ref()
            .map(|op| DebugOpcode {
                name: string_from_buffer(&op.opname),
                line: op.line,
            }),
    }
}

fn instrument(instr: &debug_instr_t) -> DebugInstrument {
    DebugInstrument {
        p1: instr.p1,
        p2: instr.p2,
        p3: instr.p3,
        kcounter: instr.kcounter,
        line: instr.line,
    }
}

unsafe fn variable(var: &debug_variable_t) -> DebugVariable {
    let type_name = string_from_ptr(var.typeName).unwrap_or_default();
    let value = if var.data.is_null() {
        VariableValue::Missing
    } else if type_name == "S" {
        string_from_ptr(var.data as *const c_char)
            .map_or(VariableValue::Missing, VariableValue::Text)
    } else {
        VariableValue::Number(*(var.data as *const MYFLT))
    };
    DebugVariable {
        name: string_from_ptr(var.name).unwrap_or_default(),
        type_name,
        value,
    }
}
