/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::vm::value::Value;
use crate::vm::Runtime;

/// A host-owned root holding one value across interpreter invocations:
/// a node in a doubly-linked list of extra collector roots.
///
/// Non-heap values can be stored here too; they simply have nothing for the
/// collector to do.
#[repr(C)]
pub struct Handle {
    pub value: Value,

    pub(crate) prev: *mut Handle,
    pub(crate) next: *mut Handle,
}

impl Runtime {
    /// Wraps `value` in a new handle. The host must release it with
    /// [`Runtime::release_handle`]; until then the value stays alive.
    pub fn make_handle(&mut self, value: Value) -> *mut Handle {
        if value.is_obj() {
            self.push_root(value.as_obj());
        }

        let handle = unsafe {
            let handle = self.allocate::<Handle>();
            (*handle).value = value;

            // Add it to the front of the linked list of handles.
            (*handle).prev = std::ptr::null_mut();
            (*handle).next = self.handles;
            if !self.handles.is_null() {
                (*self.handles).prev = handle;
            }
            handle
        };
        self.handles = handle;

        if value.is_obj() {
            self.pop_root();
        }
        handle
    }

    pub fn release_handle(&mut self, handle: *mut Handle) {
        debug_assert!(!handle.is_null(), "handle cannot be null");

        unsafe {
            // Update the head pointer if we're releasing the first handle.
            if self.handles == handle {
                self.handles = (*handle).next;
            }

            // Unlink it from the list.
            if !(*handle).prev.is_null() {
                (*(*handle).prev).next = (*handle).next;
            }
            if !(*handle).next.is_null() {
                (*(*handle).next).prev = (*handle).prev;
            }

            // Not strictly necessary ahead of the free, but it makes stale
            // pointers fail loudly while debugging.
            (*handle).prev = std::ptr::null_mut();
            (*handle).next = std::ptr::null_mut();
            (*handle).value = Value::null();

            self.deallocate(handle.cast());
        }
    }
}
