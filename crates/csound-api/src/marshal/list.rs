use std::ops::Deref;
use std::ptr::NonNull;

use csound_sys::opcodeListEntry;
use libc::{c_char, c_void};
use serde::Serialize;

use super::string_from_ptr;
use crate::registry::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListKind {
    Channels,
    Opcodes,
    Utilities,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpcodeEntry {
    #[serde(rename = "opname")]
    pub name: String,
    #[serde(rename = "outypes")]
    pub output_types: String,
    #[serde(rename = "intypes")]
    pub input_types: String,
    pub flags: i32,
}

/// Copies `count` opcode entries.
///
/// # Safety
///
/// `list` must be null or point to at least `count` initialised entries.
pub unsafe fn opcode_entries_from_native(
    list: *const opcodeListEntry,
    count: i32,
) -> Vec<OpcodeEntry> {
    if list.is_null() || count <= 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(list, count as usize)
        .iter()
        .map(|entry| OpcodeEntry {
            name: string_from_ptr(entry.opname).unwrap_or_default(),
            output_types: string_from_ptr(entry.outypes).unwrap_or_default(),
            input_types: string_from_ptr(entry.intypes).unwrap_or_default(),
            flags: entry.flags,
        })
        .collect()
}

/// Copies a null-terminated array of names.
///
/// # Safety
///
/// `list` must be null or a null-terminated array of valid strings.
pub unsafe fn utility_names_from_native(list: *const *const c_char) -> Vec<String> {
    let mut names = Vec::new();
    if list.is_null() {
        return names;
    }
    let mut cursor = list;
    while let Some(name) = string_from_ptr(*cursor) {
        names.push(name);
        cursor = cursor.add(1);
    }
    names
}

/// Items copied out of an engine-allocated array, plus the array itself until it is released.
///
/// Releasing through the matching `Host` operation frees the native array and empties the
/// items, so `len()` reads 0 afterwards.
#[derive(Debug)]
pub struct NativeList<T> {
    owner: InstanceId,
    kind: ListKind,
    backing: Option<NonNull<c_void>>,
    items: Vec<T>,
}

impl<T> NativeList<T> {
    pub(crate) fn new(
        owner: InstanceId,
        kind: ListKind,
        backing: *mut c_void,
        items: Vec<T>,
    ) -> Self {
        Self {
            owner,
            kind,
            backing: NonNull::new(backing),
            items,
        }
    }

    pub fn owner(&self) -> InstanceId {
        self.owner
    }

    pub fn kind(&self) -> ListKind {
        self.kind
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn is_released(&self) -> bool {
        self.backing.is_none()
    }

    pub(crate) fn release(&mut self) -> Option<NonNull<c_void>> {
        self.items.clear();
        self.backing.take()
    }
}

impl<T> Deref for NativeList<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<'a, T> IntoIterator for &'a NativeList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T> Drop for NativeList<T> {
    fn drop(&mut self) {
        if self.backing.is_some() {
            log::warn!(
                "{:?} list of instance {} dropped without release; held until destroy.",
                self.kind,
                self.owner
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::CString;
    use std::ptr;

    use super::*;

    #[test]
    fn copies_opcode_entries() {
        let name = CString::new("oscili").unwrap();
        let outs = CString::new("a").unwrap();
        let ins = CString::new("kkjo").unwrap();
        let entries = [opcodeListEntry {
            opname: name.as_ptr() as *mut _,
            outypes: outs.as_ptr() as *mut _,
            intypes: ins.as_ptr() as *mut _,
            flags: 0,
        }];
        let copied = unsafe { opcode_entries_from_native(entries.as_ptr(), 1) };
        assert_eq!(copied[0].name, "oscili");
        assert_eq!(copied[0].input_types, "kkjo");
    }

    #[test]
    fn stops_at_null_terminator() {
        let a = CString::new("hetro").unwrap();
        let b = CString::new("sndinfo").unwrap();
        let list = [a.as_ptr(), b.as_ptr(), ptr::null()];
        assert_eq!(unsafe { utility_names_from_native(list.as_ptr()) }, ["hetro", "sndinfo"]);
    }

    #[test]
    fn release_empties_items() {
        let mut backing = 0u8;
        let mut list = NativeList::new(
            InstanceId::detached(),
            ListKind::Opcodes,
            &mut backing as *mut u8 as *mut c_void,
            vec![1, 2, 3],
        );
        assert_eq!(list.len(), 3);
        assert!(list.release().is_some());
        assert_eq!(list.len(), 0);
        assert!(list.is_released());
        assert!(list.release().is_none());
    }
}
