/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use std::ops::{Deref, DerefMut};

/// An untracked pointer to a heap object.
///
/// This is a plain machine word; nothing about it keeps the referent alive.
/// The referent stays alive because it is reachable from a collector root
/// (fiber stacks, the modules map, handles, temporary roots). Code that holds
/// a `Gc` across an allocation point without such a path must pin it with
/// [`Runtime::push_root`](crate::vm::Runtime::push_root).
#[repr(transparent)]
pub struct Gc<T> {
    pointer: *mut T,
}

impl<T> Gc<T> {
    pub fn null() -> Self {
        Self {
            pointer: std::ptr::null_mut(),
        }
    }

    pub fn from_raw(ptr: *mut T) -> Self {
        Self { pointer: ptr }
    }

    pub fn is_null(self) -> bool {
        self.pointer.is_null()
    }

    pub fn is_not_null(self) -> bool {
        !self.pointer.is_null()
    }

    pub fn raw(self) -> *mut T {
        self.pointer
    }

    /// Reinterpret the referent. Sound only between types that share a
    /// leading `ObjHeader`, which is what every heap object kind does.
    pub fn cast<U>(self) -> Gc<U> {
        Gc {
            pointer: self.pointer.cast(),
        }
    }

    pub fn ptr_eq(self, other: Gc<T>) -> bool {
        self.pointer == other.pointer
    }
}

impl<T> Copy for Gc<T> {}
impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.pointer == other.pointer
    }
}
impl<T> Eq for Gc<T> {}

impl<T> Deref for Gc<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        debug_assert!(!self.pointer.is_null());
        unsafe { &*self.pointer }
    }
}

impl<T> DerefMut for Gc<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        debug_assert!(!self.pointer.is_null());
        unsafe { &mut *self.pointer }
    }
}
