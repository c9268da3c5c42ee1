/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Core execution runtime for Siskin, a small class-based scripting language
//! meant to be embedded in a host application.
//!
//! The crate provides the four pieces the host composes: a 64-bit [value
//! representation](vm::value), an object heap with a precise mark-sweep
//! [collector](gc::heap), the [fiber](vm::fiber) execution engine driven by
//! the bytecode [interpreter](vm::interpreter), and the slot-indexed
//! [foreign API](api) through which host code exchanges values with running
//! fibers. Source-to-bytecode compilation is a collaborator supplied through
//! [`Config::compile_fn`](vm::Config); the core only consumes the function
//! objects it produces.

#[macro_export]
macro_rules! log_if {
    ($val: expr,$($rest:tt)*) => {
        if $val {
            eprintln!($($rest)*);
        }
    };
}

pub mod api;
pub mod gc;
pub mod options;
pub mod vm;
pub mod corelib;

pub mod prelude {
    pub use crate::api::SlotType;
    pub use crate::gc::buffer::Buffer;
    pub use crate::gc::handle::Handle;
    pub use crate::gc::ptr::Gc;
    pub use crate::options::Options;
    pub use crate::vm::class::{Method, ObjClass};
    pub use crate::vm::fiber::{FiberState, ObjFiber};
    pub use crate::vm::foreign::ObjForeign;
    pub use crate::vm::function::{ObjClosure, ObjFn, ObjUpvalue};
    pub use crate::vm::instance::ObjInstance;
    pub use crate::vm::list::ObjList;
    pub use crate::vm::map::ObjMap;
    pub use crate::vm::module::ObjModule;
    pub use crate::vm::object::{ObjHeader, ObjKind};
    pub use crate::vm::range::ObjRange;
    pub use crate::vm::string::ObjString;
    pub use crate::vm::value::Value;
    pub use crate::vm::{
        Config, ErrorKind, ForeignClassMethods, ForeignMethodFn, InterpretResult, Runtime,
    };
}
