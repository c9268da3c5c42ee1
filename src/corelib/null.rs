/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::vm::string::ObjString;

def_primitive!(null_not(vm, args) {
    return_bool!(args, true);
});

def_primitive!(null_to_string(vm, args) {
    let string = ObjString::new(vm, "null");
    return_obj!(args, string);
});
