use std::ffi::CString;
use std::ptr;

use csound_sys as sys;
use csound_sys::{controlChannelHints_t, controlChannelInfo_t};
use serde::{Deserialize, Serialize};

use super::{c_string, string_from_ptr};
use crate::error::{BridgeError, Result};
use crate::status::Status;

/// How a control channel's value should be presented by a UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelBehavior {
    #[default]
    NoHint,
    Integer,
    Linear,
    Exponential,
}

impl ChannelBehavior {
    pub fn raw(self) -> u32 {
        match self {
            ChannelBehavior::NoHint => sys::CSOUND_CONTROL_CHANNEL_NO_HINTS,
            ChannelBehavior::Integer => sys::CSOUND_CONTROL_CHANNEL_INT,
            ChannelBehavior::Linear => sys::CSOUND_CONTROL_CHANNEL_LIN,
            ChannelBehavior::Exponential => sys::CSOUND_CONTROL_CHANNEL_EXP,
        }
    }
}

impl TryFrom<i32> for ChannelBehavior {
    type Error = BridgeError;

    fn try_from(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(ChannelBehavior::NoHint),
            1 => Ok(ChannelBehavior::Integer),
            2 => Ok(ChannelBehavior::Linear),
            3 => Ok(ChannelBehavior::Exponential),
            other => Err(BridgeError::invalid(
                "behavior",
                format!("{other} is not a channel behavior (expected 0 to 3)"),
            )),
        }
    }
}

/// Channel type word: data type in the low nibble, direction flags above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelType(pub i32);

impl ChannelType {
    pub const CONTROL: ChannelType = ChannelType(sys::CSOUND_CONTROL_CHANNEL);
    pub const AUDIO: ChannelType = ChannelType(sys::CSOUND_AUDIO_CHANNEL);
    pub const STRING: ChannelType = ChannelType(sys::CSOUND_STRING_CHANNEL);
    pub const PVS: ChannelType = ChannelType(sys::CSOUND_PVS_CHANNEL);
    pub const VAR: ChannelType = ChannelType(sys::CSOUND_VAR_CHANNEL);
    pub const TYPE_MASK: i32 = sys::CSOUND_CHANNEL_TYPE_MASK;
    pub const INPUT: ChannelType = ChannelType(sys::CSOUND_INPUT_CHANNEL);
    pub const OUTPUT: ChannelType = ChannelType(sys::CSOUND_OUTPUT_CHANNEL);

    pub fn data_type(self) -> ChannelType {
        ChannelType(self.0 & Self::TYPE_MASK)
    }

    pub fn is_input(self) -> bool {
        self.0 & Self::INPUT.0 != 0
    }

    pub fn is_output(self) -> bool {
        self.0 & Self::OUTPUT.0 != 0
    }
}

impl std::ops::BitOr for ChannelType {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        ChannelType(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChannelHints {
    pub behavior: ChannelBehavior,
    pub default: f64,
    pub min: f64,
    pub max: f64,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub attributes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub hints: ChannelHints,
}

/// Value read from a control channel together with the engine's status for the read.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelValue {
    pub value: f64,
    pub status: Status,
}

/// Copies a native hints record.
///
/// # Safety
///
/// `raw.attributes` must be null or a valid NUL-terminated string.
pub unsafe fn hints_from_native(raw: &controlChannelHints_t) -> ChannelHints {
    let behavior = ChannelBehavior::try_from(raw.behav as i32).unwrap_or_else(|_| {
        log::warn!(
            "Unknown channel behavior {} reported by engine; treating as no hint.",
            raw.behav
        );
        ChannelBehavior::NoHint
    });
    ChannelHints {
        behavior,
        default: raw.dflt,
        min: raw.min,
        max: raw.max,
        x: raw.x,
        y: raw.y,
        width: raw.width,
        height: raw.height,
        attributes: string_from_ptr(raw.attributes),
    }
}

/// Copies `count` channel descriptions.
///
/// # Safety
///
/// `list` must be null or point to at least `count` initialised entries.
pub unsafe fn channel_infos_from_native(
    list: *const controlChannelInfo_t,
    count: i32,
) -> Vec<ChannelInfo> {
    if list.is_null() || count <= 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(list, count as usize)
        .iter()
        .map(|info| ChannelInfo {
            name: string_from_ptr(info.name).unwrap_or_default(),
            channel_type: ChannelType(info.type_),
            hints: hints_from_native(&info.hints),
        })
        .collect()
}

/// Hints ready to be handed to the engine. Keeps the attribute string alive.
#[derive(Debug)]
pub struct NativeHints {
    raw: controlChannelHints_t,
    _attributes: Option<CString>,
}

impl NativeHints {
    /// The record to pass by value; valid while `self` lives.
    pub fn as_raw(&self) -> controlChannelHints_t {
        self.raw
    }
}

impl TryFrom<&ChannelHints> for NativeHints {
    type Error = BridgeError;

    fn try_from(hints: &ChannelHints) -> Result<Self> {
        for (name, value) in [("default", hints.default), ("min", hints.min), ("max", hints.max)] {
            if !value.is_finite() {
                return Err(BridgeError::invalid(name, format!("{value} is not a finite number")));
            }
        }
        let attributes = hints
            .attributes
            .as_deref()
            .map(|text| c_string("attributes", text))
            .transpose()?;
        let raw = controlChannelHints_t {
            behav: hints.behavior.raw(),
            dflt: hints.default,
            min: hints.min,
            max: hints.max,
            x: hints.x,
            y: hints.y,
            width: hints.width,
            height: hints.height,
            attributes: attributes
                .as_ref()
                .map_or(ptr::null_mut(), |text| text.as_ptr() as *mut _),
        };
        Ok(Self {
            raw,
            _attributes: attributes,
        })
    }
}
