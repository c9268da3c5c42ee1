/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::corelib::validate_num;
use crate::vm::string::{num_display, ObjString};

def_primitive!(range_from(vm, args) {
    return_num!(args, args!(args, 0).as_range().from);
});

def_primitive!(range_to(vm, args) {
    return_num!(args, args!(args, 0).as_range().to);
});

def_primitive!(range_min(vm, args) {
    let range = args!(args, 0).as_range();
    return_num!(args, range.from.min(range.to));
});

def_primitive!(range_max(vm, args) {
    let range = args!(args, 0).as_range();
    return_num!(args, range.from.max(range.to));
});

def_primitive!(range_is_inclusive(vm, args) {
    return_bool!(args, args!(args, 0).as_range().is_inclusive);
});

def_primitive!(range_iterate(vm, args) {
    let range = args!(args, 0).as_range();

    // Special case: empty range.
    if range.from == range.to && !range.is_inclusive {
        return_bool!(args, false);
    }

    // Start the iteration.
    if args!(args, 1).is_null() {
        return_num!(args, range.from);
    }

    if !validate_num(vm, args!(args, 1), "Iterator") {
        return false;
    }
    let mut iterator = args!(args, 1).to_double();

    // Iterate towards `to` from `from`.
    if range.from < range.to {
        iterator += 1.0;
        if iterator > range.to {
            return_bool!(args, false);
        }
        if !range.is_inclusive && iterator == range.to {
            return_bool!(args, false);
        }
    } else {
        iterator -= 1.0;
        if iterator < range.to {
            return_bool!(args, false);
        }
        if !range.is_inclusive && iterator == range.to {
            return_bool!(args, false);
        }
    }

    return_num!(args, iterator);
});

def_primitive!(range_iterator_value(vm, args) {
    // Assume the iterator is a number so that is the value.
    return_val!(args, args!(args, 1));
});

def_primitive!(range_to_string(vm, args) {
    let range = args!(args, 0).as_range();
    let text = format!(
        "{}{}{}",
        num_display(range.from),
        if range.is_inclusive { ".." } else { "..." },
        num_display(range.to)
    );
    let string = ObjString::new(vm, &text);
    return_obj!(args, string);
});
