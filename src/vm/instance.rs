/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::gc::ptr::Gc;
use crate::vm::class::ObjClass;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::value::Value;
use crate::vm::Runtime;

/// An instance of a user-defined class. Its fields are allocated inline,
/// sized by the class's field count.
#[repr(C)]
pub struct ObjInstance {
    pub obj: ObjHeader,
    fields: [Value; 0],
}

impl ObjInstance {
    pub fn new(vm: &mut Runtime, class: Gc<ObjClass>) -> Gc<ObjInstance> {
        debug_assert!(class.num_fields >= 0);
        vm.push_root(class.cast());
        let num_fields = class.num_fields as usize;
        let instance = unsafe {
            let ptr = vm.allocate_flex::<ObjInstance>(num_fields * std::mem::size_of::<Value>());
            let fields = (*ptr).fields.as_mut_ptr();
            for i in 0..num_fields {
                fields.add(i).write(Value::null());
            }
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Instance, class);
            Gc::from_raw(ptr)
        };
        vm.pop_root();
        instance
    }

    pub fn num_fields(&self) -> usize {
        self.obj.class_obj.num_fields as usize
    }

    pub fn field(&self, index: usize) -> Value {
        debug_assert!(index < self.num_fields());
        unsafe { *self.fields.as_ptr().add(index) }
    }

    pub fn set_field(&mut self, index: usize, value: Value) {
        debug_assert!(index < self.num_fields());
        unsafe {
            self.fields.as_mut_ptr().add(index).write(value);
        }
    }
}
