/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::corelib::validate_fn;
use crate::gc::ptr::Gc;
use crate::vm::fiber::{FiberState, ObjFiber};
use crate::vm::value::Value;
use crate::vm::Runtime;

def_primitive!(fiber_new(vm, args) {
    if !validate_fn(vm, args!(args, 1), "Argument") {
        return false;
    }

    let closure = args!(args, 1).as_closure();
    if closure.fn_obj.arity > 1 {
        return_error!(vm, "Function cannot take more than one parameter.");
    }

    let fiber = ObjFiber::new(vm, closure);
    return_obj!(args, fiber);
});

def_primitive!(fiber_abort(vm, args) {
    let mut fiber = vm.fiber;
    fiber.set_error(args!(args, 1));

    // If the error is explicitly null, it's not really an abort.
    args!(args, 1).is_null()
});

def_primitive!(fiber_current(vm, args) {
    let fiber = vm.fiber;
    return_obj!(args, fiber);
});

def_primitive!(fiber_suspend(vm, args) {
    let _ = args;
    // Leave the whole runtime with no fiber to run; the interpreter entry
    // reports success to the host.
    vm.fiber = Gc::null();
    false
});

def_primitive!(fiber_yield(vm, args) {
    let _ = args;
    let mut current = vm.fiber;
    vm.fiber = current.caller;

    // Unhook this fiber from the one that called it.
    current.caller = Gc::null();
    current.state = FiberState::Other;

    if vm.fiber.is_not_null() {
        // Make the caller's call() return null.
        let caller = vm.fiber;
        unsafe {
            *caller.stack_top.sub(1) = Value::null();
        }
    }
    false
});

def_primitive!(fiber_yield1(vm, args) {
    let mut current = vm.fiber;
    vm.fiber = current.caller;

    // Unhook this fiber from the one that called it.
    current.caller = Gc::null();
    current.state = FiberState::Other;

    if vm.fiber.is_not_null() {
        // Make the caller's call() return the value passed to yield.
        let caller = vm.fiber;
        unsafe {
            *caller.stack_top.sub(1) = args!(args, 1);
        }

        // When the yielding fiber resumes, we'll store the result of the
        // yield call in its stack. Since Fiber.yield(value) has two slots
        // (the Fiber class and the value) and we only need one for the
        // result, discard the other now.
        current.drop_values(1);
    }
    false
});

/// Transfers control into `fiber`. Shared by call and try; on success the
/// runtime's current fiber has been switched.
fn run_fiber(
    vm: &mut Runtime,
    mut fiber: Gc<ObjFiber>,
    args: *mut Value,
    is_call: bool,
    has_value: bool,
    verb: &str,
) {
    if fiber.has_error() {
        vm.abort_fiber_str(&format!("Cannot {} an aborted fiber.", verb));
        return;
    }

    if is_call {
        // You can't call a called fiber, but you can transfer directly to it,
        // which is why this check is gated on `is_call`.
        if fiber.caller.is_not_null() {
            vm.abort_fiber_str("Fiber has already been called.");
            return;
        }
        if fiber.state == FiberState::Root {
            vm.abort_fiber_str("Cannot call root fiber.");
            return;
        }

        // Remember who ran it.
        fiber.caller = vm.fiber;
    }

    if fiber.num_frames == 0 {
        vm.abort_fiber_str(&format!("Cannot {} a finished fiber.", verb));
        return;
    }

    // When the calling fiber resumes, we'll store the result of the call in
    // its stack. If the call has two arguments (the fiber and a value), we
    // only need one slot for the result, so discard the other now.
    if has_value {
        let mut current = vm.fiber;
        current.drop_values(1);
    }

    let first_frame = unsafe { &*fiber.frames };
    if fiber.num_frames == 1 && first_frame.ip == first_frame.closure.fn_obj.code.as_ptr() {
        // The fiber is being started for the first time. If its function
        // takes a parameter, bind it.
        if first_frame.closure.fn_obj.arity == 1 {
            let value = if has_value {
                args!(args, 1)
            } else {
                Value::null()
            };
            fiber.push(value);
        }
    } else {
        // The fiber is being resumed; make yield() return the value.
        let value = if has_value {
            args!(args, 1)
        } else {
            Value::null()
        };
        unsafe {
            *fiber.stack_top.sub(1) = value;
        }
    }

    vm.fiber = fiber;
}

def_primitive!(fiber_call(vm, args) {
    run_fiber(vm, args!(args, 0).as_fiber(), args, true, false, "call");
    false
});

def_primitive!(fiber_call1(vm, args) {
    run_fiber(vm, args!(args, 0).as_fiber(), args, true, true, "call");
    false
});

def_primitive!(fiber_try(vm, args) {
    run_fiber(vm, args!(args, 0).as_fiber(), args, true, false, "try");

    // If we're switching to a valid fiber to try, remember we're trying it.
    if vm.fiber.is_not_null() && !vm.fiber.has_error() {
        let mut fiber = vm.fiber;
        fiber.state = FiberState::Try;
    }
    false
});

def_primitive!(fiber_error(vm, args) {
    return_val!(args, args!(args, 0).as_fiber().error);
});

def_primitive!(fiber_is_done(vm, args) {
    let fiber = args!(args, 0).as_fiber();
    return_bool!(args, fiber.is_done() || fiber.has_error());
});
