/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::gc::buffer::Buffer;
use crate::gc::ptr::Gc;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::value::Value;
use crate::vm::Runtime;

#[repr(C)]
pub struct ObjList {
    pub obj: ObjHeader,
    pub elements: Buffer<Value>,
}

impl ObjList {
    pub fn new(vm: &mut Runtime) -> Gc<ObjList> {
        unsafe {
            let ptr = vm.allocate::<ObjList>();
            std::ptr::addr_of_mut!((*ptr).elements).write(Buffer::new());
            let class = vm.list_class;
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::List, class);
            Gc::from_raw(ptr)
        }
    }

    pub fn len(&self) -> usize {
        self.elements.count()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Inserts `value` at `index`, shifting down the other elements.
    pub fn insert(mut this: Gc<ObjList>, vm: &mut Runtime, index: usize, value: Value) {
        if value.is_obj() {
            vm.push_root(value.as_obj());
        }

        // Add a slot at the end of the list.
        this.elements.push(vm, Value::null());

        if value.is_obj() {
            vm.pop_root();
        }

        // Shift the existing elements down.
        let count = this.elements.count();
        let mut i = count - 1;
        while i > index {
            this.elements[i] = this.elements[i - 1];
            i -= 1;
        }
        this.elements[index] = value;
    }

    /// Removes and returns the item at `index`, shifting up the rest.
    pub fn remove_at(mut this: Gc<ObjList>, vm: &mut Runtime, index: usize) -> Value {
        let removed = this.elements[index];
        if removed.is_obj() {
            vm.push_root(removed.as_obj());
        }

        for i in index..this.elements.count() - 1 {
            this.elements[i] = this.elements[i + 1];
        }
        let count = this.elements.count();
        this.elements.truncate(count - 1);

        if removed.is_obj() {
            vm.pop_root();
        }
        removed
    }
}
