/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::vm::string::ObjString;
use crate::vm::value::values_equal;
use crate::vm::value::Value;

def_primitive!(object_not(vm, args) {
    return_val!(args, Value::false_());
});

def_primitive!(object_eqeq(vm, args) {
    return_bool!(args, values_equal(args!(args, 0), args!(args, 1)));
});

def_primitive!(object_bangeq(vm, args) {
    return_bool!(args, !values_equal(args!(args, 0), args!(args, 1)));
});

def_primitive!(object_is(vm, args) {
    if !args!(args, 1).is_class() {
        return_error!(vm, "Right operand must be a class.");
    }

    let mut class_obj = vm.class_of(args!(args, 0));
    let base_class = args!(args, 1).as_class();

    // Walk the superclass chain looking for the class.
    while class_obj.is_not_null() {
        if base_class == class_obj {
            return_bool!(args, true);
        }
        class_obj = class_obj.superclass;
    }
    return_bool!(args, false);
});

def_primitive!(object_to_string(vm, args) {
    let class = vm.class_of(args!(args, 0));
    let text = format!("instance of {}", class.name.as_str());
    let string = ObjString::new(vm, &text);
    return_obj!(args, string);
});

def_primitive!(object_type(vm, args) {
    let class = vm.class_of(args!(args, 0));
    return_obj!(args, class);
});

def_primitive!(object_same(vm, args) {
    return_bool!(args, values_equal(args!(args, 1), args!(args, 2)));
});

def_primitive!(class_name(vm, args) {
    return_obj!(args, args!(args, 0).as_class().name);
});

def_primitive!(class_supertype(vm, args) {
    let class = args!(args, 0).as_class();

    // Object has no superclass.
    if class.superclass.is_null() {
        return_null!(args);
    }
    return_obj!(args, class.superclass);
});

def_primitive!(class_to_string(vm, args) {
    return_obj!(args, args!(args, 0).as_class().name);
});
