use std::fmt;

use csound_sys as sys;
use serde::{Deserialize, Serialize};

/// Status code returned by the engine's compilation and performance entry points.
///
/// The value is passed through unchanged; codes outside the documented set are kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Status(pub i32);

impl Status {
    pub const SUCCESS: Status = Status(sys::CSOUND_SUCCESS);
    pub const ERROR: Status = Status(sys::CSOUND_ERROR);
    pub const INITIALIZATION: Status = Status(sys::CSOUND_INITIALIZATION);
    pub const PERFORMANCE: Status = Status(sys::CSOUND_PERFORMANCE);
    pub const MEMORY: Status = Status(sys::CSOUND_MEMORY);
    pub const SIGNAL: Status = Status(sys::CSOUND_SIGNAL);

    pub fn code(self) -> i32 {
        self.0
    }

    pub fn is_success(self) -> bool {
        self == Status::SUCCESS
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Status::SUCCESS => "success",
            Status::ERROR => "error",
            Status::INITIALIZATION => "initialization error",
            Status::PERFORMANCE => "performance error",
            Status::MEMORY => "memory error",
            Status::SIGNAL => "signal",
            _ => return None,
        })
    }
}

impl From<i32> for Status {
    fn from(code: i32) -> Self {
        Status(code)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", name, self.0),
            None => write!(f, "status {}", self.0),
        }
    }
}

/// Flags accepted by the process-wide engine initialisation.
pub mod init_flags {
    pub const NO_SIGNAL_HANDLER: i32 = csound_sys::CSOUNDINIT_NO_SIGNAL_HANDLER;
    pub const NO_ATEXIT: i32 = csound_sys::CSOUNDINIT_NO_ATEXIT;
}

/// File type codes reported to the file-open callback.
pub mod file_type {
    use csound_sys as sys;

    pub const RAW_AUDIO: i32 = sys::CSFTYPE_RAW_AUDIO;
    pub const IRCAM: i32 = sys::CSFTYPE_IRCAM;
    pub const AIFF: i32 = sys::CSFTYPE_AIFF;
    pub const AIFC: i32 = sys::CSFTYPE_AIFC;
    pub const WAVE: i32 = sys::CSFTYPE_WAVE;
    pub const AU: i32 = sys::CSFTYPE_AU;
    pub const SD2: i32 = sys::CSFTYPE_SD2;
    pub const W64: i32 = sys::CSFTYPE_W64;
    pub const WAVEX: i32 = sys::CSFTYPE_WAVEX;
    pub const FLAC: i32 = sys::CSFTYPE_FLAC;
    pub const CAF: i32 = sys::CSFTYPE_CAF;
    pub const WVE: i32 = sys::CSFTYPE_WVE;
    pub const OGG: i32 = sys::CSFTYPE_OGG;
    pub const MPC2K: i32 = sys::CSFTYPE_MPC2K;
    pub const RF64: i32 = sys::CSFTYPE_RF64;
    pub const AVR: i32 = sys::CSFTYPE_AVR;
    pub const HTK: i32 = sys::CSFTYPE_HTK;
    pub const MAT4: i32 = sys::CSFTYPE_MAT4;
    pub const MAT5: i32 = sys::CSFTYPE_MAT5;
    pub const NIST: i32 = sys::CSFTYPE_NIST;
    pub const PAF: i32 = sys::CSFTYPE_PAF;
    pub const PVF: i32 = sys::CSFTYPE_PVF;
    pub const SDS: i32 = sys::CSFTYPE_SDS;
    pub const SVX: i32 = sys::CSFTYPE_SVX;
    pub const VOC: i32 = sys::CSFTYPE_VOC;
    pub const XI: i32 = sys::CSFTYPE_XI;
    pub const UNKNOWN_AUDIO: i32 = sys::CSFTYPE_UNKNOWN_AUDIO;
}
