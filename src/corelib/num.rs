/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::corelib::validate_num;
use crate::vm::range::ObjRange;
use crate::vm::string::num_to_string;

macro_rules! def_num_binary {
    ($name:ident, $op:tt) => {
        def_primitive!($name(vm, args) {
            if !validate_num(vm, args!(args, 1), "Right operand") {
                return false;
            }
            return_num!(args, args!(args, 0).to_double() $op args!(args, 1).to_double());
        });
    };
}

macro_rules! def_num_compare {
    ($name:ident, $op:tt) => {
        def_primitive!($name(vm, args) {
            if !validate_num(vm, args!(args, 1), "Right operand") {
                return false;
            }
            return_bool!(args, args!(args, 0).to_double() $op args!(args, 1).to_double());
        });
    };
}

def_num_binary!(num_plus, +);
def_num_binary!(num_minus, -);
def_num_binary!(num_multiply, *);
def_num_binary!(num_divide, /);
def_num_binary!(num_mod, %);

def_num_compare!(num_lt, <);
def_num_compare!(num_gt, >);
def_num_compare!(num_lte, <=);
def_num_compare!(num_gte, >=);

def_primitive!(num_eqeq(vm, args) {
    if !args!(args, 1).is_num() {
        return_bool!(args, false);
    }
    return_bool!(args, args!(args, 0).to_double() == args!(args, 1).to_double());
});

def_primitive!(num_bangeq(vm, args) {
    if !args!(args, 1).is_num() {
        return_bool!(args, true);
    }
    return_bool!(args, args!(args, 0).to_double() != args!(args, 1).to_double());
});

def_primitive!(num_negate(vm, args) {
    return_num!(args, -args!(args, 0).to_double());
});

def_primitive!(num_not(vm, args) {
    return_bool!(args, false);
});

def_primitive!(num_dotdot(vm, args) {
    if !validate_num(vm, args!(args, 1), "Right hand side of range") {
        return false;
    }
    let from = args!(args, 0).to_double();
    let to = args!(args, 1).to_double();
    let range = ObjRange::new(vm, from, to, true);
    return_obj!(args, range);
});

def_primitive!(num_dotdotdot(vm, args) {
    if !validate_num(vm, args!(args, 1), "Right hand side of range") {
        return false;
    }
    let from = args!(args, 0).to_double();
    let to = args!(args, 1).to_double();
    let range = ObjRange::new(vm, from, to, false);
    return_obj!(args, range);
});

def_primitive!(num_abs(vm, args) {
    return_num!(args, args!(args, 0).to_double().abs());
});

def_primitive!(num_ceil(vm, args) {
    return_num!(args, args!(args, 0).to_double().ceil());
});

def_primitive!(num_floor(vm, args) {
    return_num!(args, args!(args, 0).to_double().floor());
});

def_primitive!(num_is_integer(vm, args) {
    let value = args!(args, 0).to_double();
    return_bool!(args, value.is_finite() && value.trunc() == value);
});

def_primitive!(num_is_nan(vm, args) {
    return_bool!(args, args!(args, 0).to_double().is_nan());
});

def_primitive!(num_to_string_prim(vm, args) {
    let string = num_to_string(vm, args!(args, 0).to_double());
    return_obj!(args, string);
});
