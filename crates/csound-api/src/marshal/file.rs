use libc::{c_char, c_int};
use serde::Serialize;

use super::string_from_ptr;

/// A file the engine opened, as reported to the file-open callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOpenInfo {
    pub path: String,
    /// One of the [`file_type`](crate::file_type) codes.
    pub file_type: i32,
    pub for_writing: bool,
    pub temporary: bool,
}

/// # Safety
///
/// `path` must be null or a valid NUL-terminated string.
pub unsafe fn file_open_from_native(
    path: *const c_char,
    file_type: c_int,
    write: c_int,
    temp: c_int,
) -> FileOpenInfo {
    FileOpenInfo {
        path: string_from_ptr(path).unwrap_or_default(),
        file_type,
        for_writing: write != 0,
        temporary: temp != 0,
    }
}
