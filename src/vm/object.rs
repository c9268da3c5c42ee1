/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::gc::ptr::Gc;
use crate::vm::class::ObjClass;

/// Identifies which specific kind a heap-allocated object is.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum ObjKind {
    Class,
    Closure,
    Fiber,
    Fn,
    Foreign,
    Instance,
    List,
    Map,
    Module,
    Range,
    String,
    Upvalue,
}

/// Header shared by all heap-allocated objects. Every concrete object struct
/// is `#[repr(C)]` with this as its first field so a pointer to either can
/// be viewed as the other.
#[repr(C)]
pub struct ObjHeader {
    pub kind: ObjKind,

    /// Mark bit, meaningful only while a collection is running.
    pub is_dark: bool,

    /// The object's class. Null for modules, upvalues, and objects created
    /// during bootstrap before their class exists.
    pub class_obj: Gc<ObjClass>,

    /// The next object in the linked list of all currently allocated objects.
    pub next: *mut ObjHeader,
}
