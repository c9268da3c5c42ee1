/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::corelib::{calculate_range, validate_index, validate_int};
use crate::vm::list::ObjList;

def_primitive!(list_new(vm, args) {
    let list = ObjList::new(vm);
    return_obj!(args, list);
});

def_primitive!(list_add(vm, args) {
    let list = args!(args, 0).as_list();
    let count = list.len();
    ObjList::insert(list, vm, count, args!(args, 1));
    return_val!(args, args!(args, 1));
});

def_primitive!(list_clear(vm, args) {
    let mut list = args!(args, 0).as_list();
    list.elements.clear(vm);
    return_null!(args);
});

def_primitive!(list_count(vm, args) {
    return_num!(args, args!(args, 0).as_list().len() as f64);
});

def_primitive!(list_insert(vm, args) {
    let list = args!(args, 0).as_list();

    // count + 1 here so the index can be one past the end to append.
    let index = match validate_index(vm, args!(args, 1), list.len() + 1, "Index") {
        Some(index) => index,
        None => return false,
    };
    ObjList::insert(list, vm, index, args!(args, 2));
    return_val!(args, args!(args, 2));
});

def_primitive!(list_iterate(vm, args) {
    let list = args!(args, 0).as_list();

    // If the iterator is null, start the iteration.
    if args!(args, 1).is_null() {
        if list.is_empty() {
            return_bool!(args, false);
        }
        return_num!(args, 0.0);
    }

    if !validate_int(vm, args!(args, 1), "Iterator") {
        return false;
    }
    let index = args!(args, 1).to_double();

    // Stop if we're out of bounds.
    if index < 0.0 || index >= list.len() as f64 - 1.0 {
        return_bool!(args, false);
    }
    return_num!(args, index + 1.0);
});

def_primitive!(list_iterator_value(vm, args) {
    let list = args!(args, 0).as_list();
    let index = match validate_index(vm, args!(args, 1), list.len(), "Iterator") {
        Some(index) => index,
        None => return false,
    };
    return_val!(args, list.elements[index]);
});

def_primitive!(list_remove_at(vm, args) {
    let list = args!(args, 0).as_list();
    let index = match validate_index(vm, args!(args, 1), list.len(), "Index") {
        Some(index) => index,
        None => return false,
    };
    let removed = ObjList::remove_at(list, vm, index);
    return_val!(args, removed);
});

def_primitive!(list_subscript(vm, args) {
    let list = args!(args, 0).as_list();

    if args!(args, 1).is_num() {
        let index = match validate_index(vm, args!(args, 1), list.len(), "Subscript") {
            Some(index) => index,
            None => return false,
        };
        return_val!(args, list.elements[index]);
    }

    if !args!(args, 1).is_range() {
        return_error!(vm, "Subscript must be a number or a range.");
    }

    let mut count = list.len();
    let mut step = 0;
    let start = match calculate_range(vm, args!(args, 1).as_range(), &mut count, &mut step) {
        Some(start) => start,
        None => return false,
    };

    let mut result = ObjList::new(vm);
    vm.push_root(result.cast());
    for i in 0..count {
        let index = (start as isize + i as isize * step as isize) as usize;
        let element = list.elements[index];
        result.elements.push(vm, element);
    }
    vm.pop_root();
    return_obj!(args, result);
});

def_primitive!(list_subscript_setter(vm, args) {
    let mut list = args!(args, 0).as_list();
    let index = match validate_index(vm, args!(args, 1), list.len(), "Subscript") {
        Some(index) => index,
        None => return false,
    };
    list.elements[index] = args!(args, 2);
    return_val!(args, args!(args, 2));
});
