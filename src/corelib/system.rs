/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::corelib::{display_string, validate_string};

def_primitive!(system_print0(vm, args) {
    vm.write("\n");
    return_null!(args);
});

def_primitive!(system_print1(vm, args) {
    let text = display_string(vm, args!(args, 1));
    vm.write(&text);
    vm.write("\n");
    return_val!(args, args!(args, 1));
});

def_primitive!(system_write(vm, args) {
    let text = display_string(vm, args!(args, 1));
    vm.write(&text);
    return_val!(args, args!(args, 1));
});

// The raw output path: takes a string that is already rendered and hands it
// to the host sink untouched.
def_primitive!(system_write_string(vm, args) {
    if !validate_string(vm, args!(args, 1), "Argument") {
        return false;
    }
    let text = args!(args, 1).as_string().as_str().to_string();
    vm.write(&text);
    return_val!(args, args!(args, 1));
});
