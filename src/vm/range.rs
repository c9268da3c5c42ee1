/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::gc::ptr::Gc;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::Runtime;

#[repr(C)]
pub struct ObjRange {
    pub obj: ObjHeader,

    /// The beginning of the range.
    pub from: f64,

    /// The end of the range. May be greater or less than `from`.
    pub to: f64,

    /// True if `to` is included in the range.
    pub is_inclusive: bool,
}

impl ObjRange {
    pub fn new(vm: &mut Runtime, from: f64, to: f64, is_inclusive: bool) -> Gc<ObjRange> {
        unsafe {
            let ptr = vm.allocate::<ObjRange>();
            (*ptr).from = from;
            (*ptr).to = to;
            (*ptr).is_inclusive = is_inclusive;
            let class = vm.range_class;
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Range, class);
            Gc::from_raw(ptr)
        }
    }
}
