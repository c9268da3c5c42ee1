/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::corelib::{calculate_range, validate_index, validate_string};
use crate::vm::string::ObjString;

def_primitive!(string_plus(vm, args) {
    if !validate_string(vm, args!(args, 1), "Right operand") {
        return false;
    }
    let result = ObjString::concat(
        vm,
        args!(args, 0).as_string(),
        args!(args, 1).as_string(),
    );
    return_obj!(args, result);
});

def_primitive!(string_subscript(vm, args) {
    let string = args!(args, 0).as_string();

    if args!(args, 1).is_num() {
        let index = match validate_index(vm, args!(args, 1), string.len(), "Subscript") {
            Some(index) => index,
            None => return false,
        };
        let result = ObjString::from_byte_range(vm, string, index as u32, 1, 1);
        return_obj!(args, result);
    }

    if !args!(args, 1).is_range() {
        return_error!(vm, "Subscript must be a number or a range.");
    }

    let mut length = string.len();
    let mut step = 0;
    let start = match calculate_range(vm, args!(args, 1).as_range(), &mut length, &mut step) {
        Some(start) => start,
        None => return false,
    };
    let result = ObjString::from_byte_range(vm, string, start as u32, length as u32, step);
    return_obj!(args, result);
});

def_primitive!(string_byte_at(vm, args) {
    let string = args!(args, 0).as_string();
    let index = match validate_index(vm, args!(args, 1), string.len(), "Index") {
        Some(index) => index,
        None => return false,
    };
    return_num!(args, string.as_bytes()[index] as f64);
});

def_primitive!(string_byte_count(vm, args) {
    return_num!(args, args!(args, 0).as_string().len() as f64);
});

def_primitive!(string_count(vm, args) {
    return_num!(args, args!(args, 0).as_string().len() as f64);
});

def_primitive!(string_contains(vm, args) {
    if !validate_string(vm, args!(args, 1), "Argument") {
        return false;
    }
    let haystack = args!(args, 0).as_string();
    let needle = args!(args, 1).as_string();
    let found = needle.is_empty()
        || haystack
            .as_bytes()
            .windows(needle.len().max(1))
            .any(|window| window == needle.as_bytes());
    return_bool!(args, found);
});

def_primitive!(string_ends_with(vm, args) {
    if !validate_string(vm, args!(args, 1), "Argument") {
        return false;
    }
    let string = args!(args, 0).as_string();
    let suffix = args!(args, 1).as_string();
    return_bool!(args, string.as_bytes().ends_with(suffix.as_bytes()));
});

def_primitive!(string_starts_with(vm, args) {
    if !validate_string(vm, args!(args, 1), "Argument") {
        return false;
    }
    let string = args!(args, 0).as_string();
    let prefix = args!(args, 1).as_string();
    return_bool!(args, string.as_bytes().starts_with(prefix.as_bytes()));
});

def_primitive!(string_to_string(vm, args) {
    return_val!(args, args!(args, 0));
});
