/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::gc::ptr::Gc;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::Runtime;

/// A heap-allocated string. Immutable once constructed; the bytes (plus a
/// terminating NUL for hosts that want a C view) live inline after the
/// header, and the FNV-1a hash is computed up front so map lookups never
/// rescan the contents.
#[repr(C)]
pub struct ObjString {
    pub obj: ObjHeader,

    /// Number of bytes, not including the terminator.
    pub length: u32,

    pub hash: u32,

    data: [u8; 0],
}

impl ObjString {
    pub fn new(vm: &mut Runtime, text: &str) -> Gc<ObjString> {
        Self::from_bytes(vm, text.as_bytes())
    }

    pub fn from_bytes(vm: &mut Runtime, bytes: &[u8]) -> Gc<ObjString> {
        unsafe {
            let ptr = vm.allocate_flex::<ObjString>(bytes.len() + 1);
            (*ptr).length = bytes.len() as u32;
            (*ptr).hash = hash_bytes(bytes);
            let data = (*ptr).data.as_mut_ptr();
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data, bytes.len());
            data.add(bytes.len()).write(0);
            let class = vm.string_class;
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::String, class.cast());
            Gc::from_raw(ptr)
        }
    }

    /// Copies `count` bytes out of `source` starting at `start`, stepping by
    /// `step` (±1), one byte per step. Used by range subscripts.
    pub fn from_byte_range(
        vm: &mut Runtime,
        source: Gc<ObjString>,
        start: u32,
        count: u32,
        step: i32,
    ) -> Gc<ObjString> {
        let mut bytes = Vec::with_capacity(count as usize);
        let source_bytes = source.as_bytes();
        for i in 0..count as i64 {
            let index = start as i64 + i * step as i64;
            bytes.push(source_bytes[index as usize]);
        }
        Self::from_bytes(vm, &bytes)
    }

    pub fn concat(vm: &mut Runtime, left: Gc<ObjString>, right: Gc<ObjString>) -> Gc<ObjString> {
        let mut bytes = Vec::with_capacity(left.len() + right.len());
        bytes.extend_from_slice(left.as_bytes());
        bytes.extend_from_slice(right.as_bytes());
        Self::from_bytes(vm, &bytes)
    }

    pub fn len(&self) -> usize {
        self.length as usize
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.length as usize) }
    }

    /// View as UTF-8. Strings that reach name/message positions are always
    /// built from `&str` input; raw byte strings only flow through the
    /// byte-oriented APIs.
    pub fn as_str(&self) -> &str {
        unsafe { std::str::from_utf8_unchecked(self.as_bytes()) }
    }
}

impl std::fmt::Display for ObjString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

/// FNV-1a.
pub fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &byte in bytes {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// The display form of a double. Integral values print without a
/// fractional part; the non-finite values get their singleton spellings.
pub fn num_display(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 {
            "infinity".to_string()
        } else {
            "-infinity".to_string()
        };
    }
    let mut buffer = ryu_js::Buffer::new();
    buffer.format_finite(value).to_string()
}

pub fn num_to_string(vm: &mut Runtime, value: f64) -> Gc<ObjString> {
    let text = num_display(value);
    ObjString::new(vm, &text)
}
