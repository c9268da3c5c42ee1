/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::gc::buffer::Buffer;
use crate::gc::ptr::Gc;
use crate::vm::module::ObjModule;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::value::Value;
use crate::vm::Runtime;

/// Debugging information for a function, used for stack traces.
pub struct FnDebug {
    /// The name of the function.
    pub name: String,

    /// One entry per bytecode byte: the source line that generated it.
    pub source_lines: Buffer<i32>,
}

/// A function object. It wraps and owns the bytecode and other debug
/// information for a callable chunk of code.
///
/// Function objects are not passed around and invoked directly. Instead they
/// are always referenced by an [`ObjClosure`], the real first-class
/// representation of a function. That isn't strictly necessary when there
/// are no upvalues, but it lets the rest of the VM assume all called objects
/// are closures.
#[repr(C)]
pub struct ObjFn {
    pub obj: ObjHeader,

    pub code: Buffer<u8>,
    pub constants: Buffer<Value>,

    /// The module where this function was defined. Null for synthesized
    /// call-handle stubs.
    pub module: Gc<ObjModule>,

    /// The maximum number of stack slots this function may use.
    pub max_slots: usize,

    /// The number of upvalues this function closes over.
    pub num_upvalues: usize,

    /// The number of parameters this function expects, used so `call`
    /// handles an argument count mismatch. Only meaningful for plain
    /// functions, not methods or module bodies.
    pub arity: usize,

    pub debug: FnDebug,
}

impl ObjFn {
    pub fn new(vm: &mut Runtime, module: Gc<ObjModule>, max_slots: usize) -> Gc<ObjFn> {
        unsafe {
            let ptr = vm.allocate::<ObjFn>();
            ptr.write(ObjFn {
                obj: ObjHeader {
                    kind: ObjKind::Fn,
                    is_dark: false,
                    class_obj: Gc::null(),
                    next: std::ptr::null_mut(),
                },
                code: Buffer::new(),
                constants: Buffer::new(),
                module,
                max_slots,
                num_upvalues: 0,
                arity: 0,
                debug: FnDebug {
                    name: String::new(),
                    source_lines: Buffer::new(),
                },
            });
            let class = vm.fn_class;
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Fn, class);
            Gc::from_raw(ptr)
        }
    }

    pub fn bind_name(&mut self, name: &str) {
        self.debug.name = name.to_string();
    }
}

/// An instance of a first-class function and the environment it has closed
/// over. The upvalue references live inline after the header.
#[repr(C)]
pub struct ObjClosure {
    pub obj: ObjHeader,

    /// The function this closure is an instance of.
    pub fn_obj: Gc<ObjFn>,

    upvalues: [Gc<ObjUpvalue>; 0],
}

impl ObjClosure {
    /// Creates a new closure invoking `fn_obj`. Allocates room for its
    /// upvalues, but assumes outside code will populate them.
    pub fn new(vm: &mut Runtime, fn_obj: Gc<ObjFn>) -> Gc<ObjClosure> {
        vm.push_root(fn_obj.cast());
        let num_upvalues = fn_obj.num_upvalues;
        let closure = unsafe {
            let ptr = vm.allocate_flex::<ObjClosure>(
                num_upvalues * std::mem::size_of::<Gc<ObjUpvalue>>(),
            );
            (*ptr).fn_obj = fn_obj;
            let upvalues = (*ptr).upvalues.as_mut_ptr();
            for i in 0..num_upvalues {
                upvalues.add(i).write(Gc::null());
            }
            let class = vm.fn_class;
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Closure, class);
            Gc::from_raw(ptr)
        };
        vm.pop_root();
        closure
    }

    pub fn upvalue(&self, index: usize) -> Gc<ObjUpvalue> {
        debug_assert!(index < self.fn_obj.num_upvalues);
        unsafe { *self.upvalues.as_ptr().add(index) }
    }

    pub fn set_upvalue(&mut self, index: usize, upvalue: Gc<ObjUpvalue>) {
        debug_assert!(index < self.fn_obj.num_upvalues);
        unsafe {
            self.upvalues.as_mut_ptr().add(index).write(upvalue);
        }
    }
}

/// The runtime representation of a variable that has been captured by a
/// closure.
///
/// An upvalue is "open" while the variable still lives on a fiber's stack:
/// `value` aliases that slot, and the upvalue sits on the fiber's sorted
/// open-upvalue list. When the variable leaves scope the upvalue is closed:
/// the referent is copied into `closed` and `value` is redirected to it, the
/// one ownership shift in the object graph.
#[repr(C)]
pub struct ObjUpvalue {
    /// The object header. Upvalues are garbage collected, but they are not
    /// first-class language objects, so their class is null.
    pub obj: ObjHeader,

    /// Pointer to the variable this upvalue references.
    pub value: *mut Value,

    pub closed: Value,

    /// The next open upvalue in the owning fiber's list.
    pub next: *mut ObjUpvalue,
}

impl ObjUpvalue {
    pub fn new(vm: &mut Runtime, value: *mut Value) -> Gc<ObjUpvalue> {
        unsafe {
            let ptr = vm.allocate::<ObjUpvalue>();
            (*ptr).value = value;
            (*ptr).closed = Value::null();
            (*ptr).next = std::ptr::null_mut();
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Upvalue, Gc::null());
            Gc::from_raw(ptr)
        }
    }
}
