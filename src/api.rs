/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The foreign-function boundary.
//!
//! Host code addresses values through small slot indices into the window
//! `[stack_base, stack_top)` of the current fiber. Around each foreign call
//! the core swaps `stack_base` to the argument start and flips the
//! in-API-call flag; [`ForeignCallScope`] restores both on every exit path,
//! including the one where the foreign method aborted the fiber.

use libc::c_void;

use crate::gc::handle::Handle;
use crate::gc::ptr::Gc;
use crate::vm::fiber::ObjFiber;
use crate::vm::foreign::ObjForeign;
use crate::vm::function::{ObjClosure, ObjFn};
use crate::vm::list::ObjList;
use crate::vm::map::ObjMap;
use crate::vm::opcodes::Op;
use crate::vm::string::ObjString;
use crate::vm::value::Value;
use crate::vm::{InterpretResult, Runtime};

/// The host-visible classification of a slot's contents.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SlotType {
    Bool,
    Num,
    Foreign,
    List,
    Map,
    Null,
    String,
    Unknown,
}

/// Scoped save/restore of the foreign-call window. Stores the old
/// `stack_base` as an offset, since a foreign method may grow (and move)
/// the stack under it.
pub(crate) struct ForeignCallScope {
    vm: *mut Runtime,
    fiber: Gc<ObjFiber>,
    old_base_offset: usize,
    old_is_api_call: bool,
}

impl ForeignCallScope {
    pub(crate) fn enter(vm: &mut Runtime, mut fiber: Gc<ObjFiber>, args: *mut Value) -> Self {
        let old_is_api_call = vm.is_api_call;
        vm.is_api_call = true;

        let old_base_offset = (fiber.stack_base as usize - fiber.stack as usize)
            / std::mem::size_of::<Value>();
        fiber.stack_base = args;

        Self {
            vm: vm as *mut Runtime,
            fiber,
            old_base_offset,
            old_is_api_call,
        }
    }
}

impl Drop for ForeignCallScope {
    fn drop(&mut self) {
        unsafe {
            let vm = &mut *self.vm;
            let mut fiber = self.fiber;
            fiber.stack_base = fiber.stack.add(self.old_base_offset);
            vm.is_api_call = self.old_is_api_call;
        }
    }
}

impl Runtime {
    /// The number of slots currently visible, or zero outside an API call.
    pub fn slot_count(&self) -> usize {
        if !self.is_api_call {
            return 0;
        }
        self.fiber.frame_size()
    }

    /// Grows the visible window to `num_slots`, filling fresh slots with
    /// `null`. Outside any call, sets up a scratch fiber for the API to
    /// work in.
    pub fn set_slot_count(&mut self, num_slots: usize) {
        if !self.is_api_call {
            self.is_api_call = true;
            self.fiber = ObjFiber::new(self, Gc::null());
        }
        let mut fiber = self.fiber;
        fiber.set_frame_size(self, num_slots);
    }

    /// Raw value access; the typed accessors below are usually what a host
    /// wants.
    pub fn get_slot(&self, slot: usize) -> Value {
        self.fiber.get_slot(slot)
    }

    pub fn set_slot(&mut self, slot: usize, value: Value) {
        let mut fiber = self.fiber;
        fiber.set_slot(slot, value);
    }

    pub fn slot_type(&self, slot: usize) -> SlotType {
        let value = self.get_slot(slot);
        if value.is_bool() {
            return SlotType::Bool;
        }
        if value.is_num() {
            return SlotType::Num;
        }
        if value.is_foreign() {
            return SlotType::Foreign;
        }
        if value.is_list() {
            return SlotType::List;
        }
        if value.is_map() {
            return SlotType::Map;
        }
        if value.is_null() {
            return SlotType::Null;
        }
        if value.is_string() {
            return SlotType::String;
        }
        SlotType::Unknown
    }

    pub fn get_slot_bool(&self, slot: usize) -> bool {
        let value = self.get_slot(slot);
        debug_assert!(value.is_bool(), "slot must hold a bool");
        value.to_bool()
    }

    pub fn get_slot_double(&self, slot: usize) -> f64 {
        let value = self.get_slot(slot);
        debug_assert!(value.is_num(), "slot must hold a number");
        value.to_double()
    }

    pub fn get_slot_string(&self, slot: usize) -> &str {
        let value = self.get_slot(slot);
        debug_assert!(value.is_string(), "slot must hold a string");
        unsafe { &*(value.as_string().raw()) }.as_str()
    }

    pub fn get_slot_bytes(&self, slot: usize) -> &[u8] {
        let value = self.get_slot(slot);
        debug_assert!(value.is_string(), "slot must hold a string");
        unsafe { &*(value.as_string().raw()) }.as_bytes()
    }

    /// The opaque payload of the foreign instance in `slot`.
    pub fn get_slot_foreign(&self, slot: usize) -> *mut c_void {
        let value = self.get_slot(slot);
        debug_assert!(value.is_foreign(), "slot must hold a foreign instance");
        value.as_foreign().data_ptr().cast()
    }

    pub fn set_slot_bool(&mut self, slot: usize, value: bool) {
        self.set_slot(slot, Value::from_bool(value));
    }

    pub fn set_slot_double(&mut self, slot: usize, value: f64) {
        self.set_slot(slot, Value::from_double(value));
    }

    pub fn set_slot_null(&mut self, slot: usize) {
        self.set_slot(slot, Value::null());
    }

    pub fn set_slot_string(&mut self, slot: usize, text: &str) {
        let string = ObjString::new(self, text);
        self.set_slot(slot, Value::from_obj(string.cast()));
    }

    pub fn set_slot_bytes(&mut self, slot: usize, bytes: &[u8]) {
        let string = ObjString::from_bytes(self, bytes);
        self.set_slot(slot, Value::from_obj(string.cast()));
    }

    pub fn set_slot_new_list(&mut self, slot: usize) {
        let list = ObjList::new(self);
        self.set_slot(slot, Value::from_obj(list.cast()));
    }

    pub fn set_slot_new_map(&mut self, slot: usize) {
        let map = ObjMap::new(self);
        self.set_slot(slot, Value::from_obj(map.cast()));
    }

    /// Allocates a foreign instance of the class in `class_slot` with a
    /// payload of `size` bytes, stores it in `dst_slot`, and returns the
    /// payload pointer.
    pub fn set_slot_new_foreign(
        &mut self,
        dst_slot: usize,
        class_slot: usize,
        size: usize,
    ) -> *mut c_void {
        let class_value = self.get_slot(class_slot);
        debug_assert!(class_value.is_class(), "slot must hold a class");
        let class = class_value.as_class();
        debug_assert!(class.num_fields == -1, "class must be a foreign class");

        let foreign = ObjForeign::new(self, class, size);
        self.set_slot(dst_slot, Value::from_obj(foreign.cast()));
        foreign.data_ptr().cast()
    }

    /// Wraps the value in `slot` in a new handle.
    pub fn get_slot_handle(&mut self, slot: usize) -> *mut Handle {
        let value = self.get_slot(slot);
        self.make_handle(value)
    }

    pub fn set_slot_handle(&mut self, slot: usize, handle: *mut Handle) {
        debug_assert!(!handle.is_null(), "handle cannot be null");
        let value = unsafe { (*handle).value };
        self.set_slot(slot, value);
    }

    pub fn get_list_count(&self, slot: usize) -> usize {
        let value = self.get_slot(slot);
        debug_assert!(value.is_list(), "slot must hold a list");
        value.as_list().len()
    }

    pub fn get_list_element(&mut self, dst_slot: usize, list_slot: usize, index: isize) {
        let value = self.get_slot(list_slot);
        debug_assert!(value.is_list(), "slot must hold a list");
        let list = value.as_list();

        // Negative indices count from the end.
        let index = if index < 0 {
            (list.len() as isize + index) as usize
        } else {
            index as usize
        };
        let element = list.elements[index];
        self.set_slot(dst_slot, element);
    }

    pub fn insert_in_list(&mut self, list_slot: usize, index: isize, src_slot: usize) {
        let value = self.get_slot(list_slot);
        debug_assert!(value.is_list(), "must insert into a list");
        let list = value.as_list();

        // Negative indices count from the end; -1 appends.
        let index = if index < 0 {
            (list.len() as isize + 1 + index) as usize
        } else {
            index as usize
        };
        debug_assert!(index <= list.len(), "index out of bounds");

        let element = self.get_slot(src_slot);
        ObjList::insert(list, self, index, element);
    }

    /// Looks up the key in `key_slot` in the map in `map_slot`. When found
    /// and `value_slot` is given, the value is stored there (`null`
    /// otherwise). Returns whether the key was present.
    pub fn get_map_value(
        &mut self,
        map_slot: usize,
        key_slot: usize,
        value_slot: Option<usize>,
    ) -> bool {
        let map_value = self.get_slot(map_slot);
        debug_assert!(map_value.is_map(), "slot must hold a map");
        let map = map_value.as_map();

        let key = self.get_slot(key_slot);
        let value = map.get(key);
        if let Some(value_slot) = value_slot {
            if value.is_undefined() {
                self.set_slot(value_slot, Value::null());
            } else {
                self.set_slot(value_slot, value);
            }
        }
        !value.is_undefined()
    }

    /// Fetches a previously loaded module's top-level binding into
    /// `dst_slot`.
    pub fn get_variable(&mut self, dst_slot: usize, module: &str, name: &str) {
        let module_name = ObjString::new(self, module);
        self.push_root(module_name.cast());
        let module_obj = self.get_module(Value::from_obj(module_name.cast()));
        self.pop_root();
        debug_assert!(module_obj.is_not_null(), "could not find module");

        match module_obj.find_variable(name) {
            Some(value) => self.set_slot(dst_slot, value),
            None => {
                debug_assert!(false, "could not find variable");
                self.set_slot_null(dst_slot);
            }
        }
    }

    /// Stores the value in `src_slot` as the current fiber's error,
    /// aborting it.
    pub fn abort_fiber(&mut self, src_slot: usize) {
        let error = self.get_slot(src_slot);
        let mut fiber = self.fiber;
        fiber.set_error(error);
    }

    /// Creates a handle around a tiny stub function that calls the method
    /// with `signature` on whatever receiver sits in slot zero. Both
    /// constructor-style `(...)` and subscript-style `[...]` signatures
    /// carry their arity.
    pub fn make_call_handle(&mut self, signature: &str) -> *mut Handle {
        debug_assert!(!signature.is_empty(), "signature cannot be empty");

        let num_params = signature_arity(signature);

        // Add the signature to the method table.
        let method = self.method_names.ensure(signature);

        // A stub that assumes the arguments are already on the stack and
        // calls the method.
        let fn_obj = ObjFn::new(self, Gc::null(), num_params + 1);

        // Wrap the function in a closure and then in a handle here, so
        // filling in the code below can't lose it to a collection.
        let handle = self.make_handle(Value::from_obj(fn_obj.cast()));
        let closure = ObjClosure::new(self, fn_obj);
        unsafe {
            (*handle).value = Value::from_obj(closure.cast());
        }

        let mut fn_obj = fn_obj;
        fn_obj.arity = num_params;
        fn_obj.code.push(self, Op::call(num_params) as u8);
        fn_obj.code.push(self, ((method >> 8) & 0xff) as u8);
        fn_obj.code.push(self, (method & 0xff) as u8);
        fn_obj.code.push(self, Op::Return as u8);
        fn_obj.code.push(self, Op::End as u8);
        fn_obj.debug.source_lines.fill(self, 0, 5);
        fn_obj.bind_name(signature);

        handle
    }

    /// Invokes a call handle. The receiver and arguments must already be in
    /// slots 0 through arity, set up via [`Runtime::set_slot_count`] and the
    /// slot setters.
    pub fn call(&mut self, method: *mut Handle) -> InterpretResult {
        debug_assert!(!method.is_null(), "method cannot be null");
        let method_value = unsafe { (*method).value };
        debug_assert!(method_value.is_closure(), "method must be a call handle");
        debug_assert!(self.is_api_call, "must set up arguments for call first");
        debug_assert!(self.fiber.is_not_null(), "must set up arguments for call first");
        debug_assert!(
            self.fiber.num_frames == 0,
            "can not call from a foreign method"
        );

        let closure = method_value.as_closure();
        let num_slots = closure.fn_obj.arity + 1;
        debug_assert!(
            self.fiber.stack_size() >= num_slots,
            "stack must have enough arguments for method"
        );

        // The call consumes the API window; a successful run re-opens it
        // over the result in slot zero.
        self.is_api_call = false;

        let mut fiber = self.fiber;
        fiber.call_function(self, closure, num_slots);
        let result = self.run_interpreter(fiber);

        if result == InterpretResult::Success {
            self.is_api_call = true;
        }
        result
    }
}

/// Counts the parameters a method signature declares: underscores between
/// the trailing parentheses, plus subscript underscores for a leading
/// bracket form.
pub fn signature_arity(signature: &str) -> usize {
    let bytes = signature.as_bytes();
    let mut num_params = 0;

    if bytes.last() == Some(&b')') {
        let mut i = bytes.len() - 1;
        while i > 0 && bytes[i] != b'(' {
            if bytes[i] == b'_' {
                num_params += 1;
            }
            i -= 1;
        }
    }

    if bytes.first() == Some(&b'[') {
        let mut i = 0;
        while i < bytes.len() && bytes[i] != b']' {
            if bytes[i] == b'_' {
                num_params += 1;
            }
            i += 1;
        }
    }

    num_params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_arities() {
        assert_eq!(signature_arity("toString"), 0);
        assert_eq!(signature_arity("call()"), 0);
        assert_eq!(signature_arity("call(_)"), 1);
        assert_eq!(signature_arity("translate(_,_,_)"), 3);
        assert_eq!(signature_arity("[_]"), 1);
        assert_eq!(signature_arity("[_,_]"), 2);
        assert_eq!(signature_arity("[_]=(_)"), 2);
        assert_eq!(signature_arity("+(_)"), 1);
    }
}
