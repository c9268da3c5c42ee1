/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::gc::ptr::Gc;
use crate::vm::class::ObjClass;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::Runtime;

/// An instance of a foreign class: an opaque, host-sized byte buffer
/// allocated inline. The host reads and writes it through the slot API; the
/// class's finalizer sees it exactly once before the sweep reclaims it.
#[repr(C)]
pub struct ObjForeign {
    pub obj: ObjHeader,
    pub size: usize,
    data: [u8; 0],
}

impl ObjForeign {
    pub fn new(vm: &mut Runtime, class: Gc<ObjClass>, size: usize) -> Gc<ObjForeign> {
        debug_assert!(class.num_fields == -1, "class must be a foreign class");
        vm.push_root(class.cast());
        let foreign = unsafe {
            let ptr = vm.allocate_flex::<ObjForeign>(size);
            (*ptr).size = size;
            std::ptr::write_bytes((*ptr).data.as_mut_ptr(), 0, size);
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Foreign, class);
            Gc::from_raw(ptr)
        };
        vm.pop_root();
        foreign
    }

    pub fn data_ptr(&self) -> *mut u8 {
        self.data.as_ptr() as *mut u8
    }
}
