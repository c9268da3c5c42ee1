/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::corelib::validate_fn;
use crate::vm::class::PrimitiveFn;
use crate::vm::string::ObjString;
use crate::vm::value::Value;
use crate::vm::Runtime;

def_primitive!(fn_new(vm, args) {
    if !validate_fn(vm, args!(args, 1), "Argument") {
        return false;
    }

    // The block argument is already a function, so just return it.
    return_val!(args, args!(args, 1));
});

def_primitive!(fn_arity(vm, args) {
    return_num!(args, args!(args, 0).as_closure().fn_obj.arity as f64);
});

/// Pushes the closure in `args[0]` as a new call frame. The interpreter
/// reloads its registers when the primitive reports a frame change.
fn call_fn(vm: &mut Runtime, args: *mut Value, num_args: usize) {
    let closure = unsafe { *args }.as_closure();

    // We only care about missing arguments, not extras.
    if closure.fn_obj.arity > num_args {
        vm.abort_fiber_str("Function expects more arguments.");
        return;
    }

    let mut fiber = vm.fiber;
    fiber.call_function(vm, closure, num_args + 1);
}

macro_rules! def_fn_call {
    ($name:ident, $num_args:expr) => {
        pub(super) fn $name(vm: &mut Runtime, args: *mut Value) -> bool {
            call_fn(vm, args, $num_args);
            false
        }
    };
}

def_fn_call!(fn_call0, 0);
def_fn_call!(fn_call1, 1);
def_fn_call!(fn_call2, 2);
def_fn_call!(fn_call3, 3);
def_fn_call!(fn_call4, 4);
def_fn_call!(fn_call5, 5);
def_fn_call!(fn_call6, 6);
def_fn_call!(fn_call7, 7);
def_fn_call!(fn_call8, 8);
def_fn_call!(fn_call9, 9);
def_fn_call!(fn_call10, 10);
def_fn_call!(fn_call11, 11);
def_fn_call!(fn_call12, 12);
def_fn_call!(fn_call13, 13);
def_fn_call!(fn_call14, 14);
def_fn_call!(fn_call15, 15);
def_fn_call!(fn_call16, 16);

/// One `call` signature per supported arity.
pub(super) const CALLS: [(&str, PrimitiveFn); 17] = [
    ("call()", fn_call0),
    ("call(_)", fn_call1),
    ("call(_,_)", fn_call2),
    ("call(_,_,_)", fn_call3),
    ("call(_,_,_,_)", fn_call4),
    ("call(_,_,_,_,_)", fn_call5),
    ("call(_,_,_,_,_,_)", fn_call6),
    ("call(_,_,_,_,_,_,_)", fn_call7),
    ("call(_,_,_,_,_,_,_,_)", fn_call8),
    ("call(_,_,_,_,_,_,_,_,_)", fn_call9),
    ("call(_,_,_,_,_,_,_,_,_,_)", fn_call10),
    ("call(_,_,_,_,_,_,_,_,_,_,_)", fn_call11),
    ("call(_,_,_,_,_,_,_,_,_,_,_,_)", fn_call12),
    ("call(_,_,_,_,_,_,_,_,_,_,_,_,_)", fn_call13),
    ("call(_,_,_,_,_,_,_,_,_,_,_,_,_,_)", fn_call14),
    ("call(_,_,_,_,_,_,_,_,_,_,_,_,_,_,_)", fn_call15),
    ("call(_,_,_,_,_,_,_,_,_,_,_,_,_,_,_,_)", fn_call16),
];

def_primitive!(fn_to_string(vm, args) {
    let string = ObjString::new(vm, "<fn>");
    return_obj!(args, string);
});
