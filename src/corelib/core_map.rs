/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::corelib::validate_key;
use crate::vm::map::ObjMap;

def_primitive!(map_new(vm, args) {
    let map = ObjMap::new(vm);
    return_obj!(args, map);
});

def_primitive!(map_subscript(vm, args) {
    if !validate_key(vm, args!(args, 1)) {
        return false;
    }

    let map = args!(args, 0).as_map();
    let value = map.get(args!(args, 1));
    if value.is_undefined() {
        return_null!(args);
    }
    return_val!(args, value);
});

def_primitive!(map_subscript_setter(vm, args) {
    if !validate_key(vm, args!(args, 1)) {
        return false;
    }

    let map = args!(args, 0).as_map();
    ObjMap::set(map, vm, args!(args, 1), args!(args, 2));
    return_val!(args, args!(args, 2));
});

def_primitive!(map_clear(vm, args) {
    let map = args!(args, 0).as_map();
    ObjMap::clear(map, vm);
    return_null!(args);
});

def_primitive!(map_contains_key(vm, args) {
    if !validate_key(vm, args!(args, 1)) {
        return false;
    }
    return_bool!(args, args!(args, 0).as_map().contains(args!(args, 1)));
});

def_primitive!(map_count(vm, args) {
    return_num!(args, args!(args, 0).as_map().count as f64);
});

def_primitive!(map_remove(vm, args) {
    if !validate_key(vm, args!(args, 1)) {
        return false;
    }
    let map = args!(args, 0).as_map();
    let removed = ObjMap::remove(map, vm, args!(args, 1));
    return_val!(args, removed);
});
