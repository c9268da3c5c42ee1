/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::vm::string::ObjString;

def_primitive!(bool_not(vm, args) {
    return_bool!(args, !args!(args, 0).to_bool());
});

def_primitive!(bool_to_string(vm, args) {
    let string = if args!(args, 0).to_bool() {
        ObjString::new(vm, "true")
    } else {
        ObjString::new(vm, "false")
    };
    return_obj!(args, string);
});
