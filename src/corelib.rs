/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The built-in classes and their primitive methods.
//!
//! Primitives run directly on the fiber's stack: they receive the receiver
//! and arguments through `args` and either write a result into `args[0]`
//! and return `true`, or return `false` after aborting the fiber, switching
//! fibers, or pushing a call frame.

use crate::gc::ptr::Gc;
use crate::vm::class::ObjClass;
use crate::vm::map::ObjMap;
use crate::vm::module::ObjModule;
use crate::vm::object::ObjKind;
use crate::vm::range::ObjRange;
use crate::vm::string::{num_display, ObjString};
use crate::vm::value::Value;
use crate::vm::Runtime;

/// Reads one argument slot of a primitive.
macro_rules! args {
    ($args:expr, $i:expr) => {
        unsafe { *$args.add($i) }
    };
}

/// Places a result in the receiver slot and signals "keep running".
macro_rules! return_val {
    ($args:expr, $value:expr) => {{
        unsafe {
            *$args = $value;
        }
        return true;
    }};
}

macro_rules! return_bool {
    ($args:expr, $value:expr) => {
        return_val!($args, $crate::vm::value::Value::from_bool($value))
    };
}

macro_rules! return_num {
    ($args:expr, $value:expr) => {
        return_val!($args, $crate::vm::value::Value::from_double($value))
    };
}

macro_rules! return_null {
    ($args:expr) => {
        return_val!($args, $crate::vm::value::Value::null())
    };
}

macro_rules! return_obj {
    ($args:expr, $obj:expr) => {
        return_val!(
            $args,
            $crate::vm::value::Value::from_obj(($obj).cast())
        )
    };
}

/// Aborts the fiber with a formatted error and signals "unwind".
macro_rules! return_error {
    ($vm:expr, $($fmt:tt)*) => {{
        $vm.abort_fiber_str(&format!($($fmt)*));
        return false;
    }};
}

macro_rules! def_primitive {
    ($name:ident ($vm:ident, $args:ident) $body:block) => {
        pub(super) fn $name(
            $vm: &mut $crate::vm::Runtime,
            $args: *mut $crate::vm::value::Value,
        ) -> bool {
            let _ = &$vm;
            $body
        }
    };
}

/// Interns `signature` and binds a primitive method on `class`.
macro_rules! primitive {
    ($vm:expr, $class:expr, $sig:expr, $func:expr) => {{
        let class = $class;
        let symbol = $vm.method_names.ensure($sig);
        $crate::vm::class::ObjClass::bind_method(
            $vm,
            class,
            symbol,
            $crate::vm::class::Method::Primitive($func),
        );
    }};
}

pub mod bool_;
pub mod core_fiber;
pub mod core_fn;
pub mod core_list;
pub mod core_map;
pub mod core_range;
pub mod core_string;
pub mod null;
pub mod num;
pub mod object;
pub mod system;

// ---------------------------------------------------------------------------
// Argument validation shared by the primitives.

pub(crate) fn validate_num(vm: &mut Runtime, arg: Value, arg_name: &str) -> bool {
    if arg.is_num() {
        return true;
    }
    vm.abort_fiber_str(&format!("{} must be a number.", arg_name));
    false
}

pub(crate) fn validate_int_value(vm: &mut Runtime, value: f64, arg_name: &str) -> bool {
    if value.trunc() == value {
        return true;
    }
    vm.abort_fiber_str(&format!("{} must be an integer.", arg_name));
    false
}

pub(crate) fn validate_int(vm: &mut Runtime, arg: Value, arg_name: &str) -> bool {
    if !validate_num(vm, arg, arg_name) {
        return false;
    }
    validate_int_value(vm, arg.to_double(), arg_name)
}

pub(crate) fn validate_string(vm: &mut Runtime, arg: Value, arg_name: &str) -> bool {
    if arg.is_string() {
        return true;
    }
    vm.abort_fiber_str(&format!("{} must be a string.", arg_name));
    false
}

pub(crate) fn validate_fn(vm: &mut Runtime, arg: Value, arg_name: &str) -> bool {
    if arg.is_closure() {
        return true;
    }
    vm.abort_fiber_str(&format!("{} must be a function.", arg_name));
    false
}

/// Map keys must be immutable value types so their hashes stay stable.
pub(crate) fn validate_key(vm: &mut Runtime, arg: Value) -> bool {
    if arg.is_bool()
        || arg.is_class()
        || arg.is_null()
        || arg.is_num()
        || arg.is_range()
        || arg.is_string()
    {
        return true;
    }
    vm.abort_fiber_str("Key must be a value type.");
    false
}

/// Validates that `value` is an integer in `[0, count)`. Negative values
/// index backwards from the end. Returns the effective index, or `None`
/// with the fiber aborted.
pub(crate) fn validate_index_value(
    vm: &mut Runtime,
    count: usize,
    value: f64,
    arg_name: &str,
) -> Option<usize> {
    if !validate_int_value(vm, value, arg_name) {
        return None;
    }

    // Negative indices count from the end.
    let value = if value < 0.0 {
        count as f64 + value
    } else {
        value
    };

    if value >= 0.0 && value < count as f64 {
        return Some(value as usize);
    }

    vm.abort_fiber_str(&format!("{} out of bounds.", arg_name));
    None
}

pub(crate) fn validate_index(
    vm: &mut Runtime,
    arg: Value,
    count: usize,
    arg_name: &str,
) -> Option<usize> {
    if !validate_num(vm, arg, arg_name) {
        return None;
    }
    validate_index_value(vm, count, arg.to_double(), arg_name)
}

/// Interprets `range` as indices into a sequence of `*length` elements.
/// Returns the starting index, rewriting `length` to the slice length and
/// `step` to ±1, or `None` with the fiber aborted.
pub(crate) fn calculate_range(
    vm: &mut Runtime,
    range: Gc<ObjRange>,
    length: &mut usize,
    step: &mut i32,
) -> Option<usize> {
    *step = 0;

    // Edge case: an empty range is allowed at the end of a sequence, so
    // that list[0...list.count] can copy a list even when it is empty.
    if range.from == *length as f64
        && range.to
            == if range.is_inclusive {
                -1.0
            } else {
                *length as f64
            }
    {
        *length = 0;
        return Some(0);
    }

    let from = validate_index_value(vm, *length, range.from, "Range start")?;

    // Bounds check the end manually to handle exclusive ranges.
    let mut value = range.to;
    if !validate_int_value(vm, value, "Range end") {
        return None;
    }

    // Negative indices count from the end.
    if value < 0.0 {
        value += *length as f64;
    }

    // Convert the exclusive range to an inclusive one.
    if !range.is_inclusive {
        // An exclusive range with the same start and end points is empty.
        if value == from as f64 {
            *length = 0;
            return Some(from);
        }

        // Shift the endpoint to make it inclusive, handling both increasing
        // and decreasing ranges.
        value += if value >= from as f64 { -1.0 } else { 1.0 };
    }

    // Check bounds.
    if value < 0.0 || value >= *length as f64 {
        vm.abort_fiber_str("Range end out of bounds.");
        return None;
    }

    let to = value as usize;
    *length = (from as isize - to as isize).abs() as usize + 1;
    *step = if from < to { 1 } else { -1 };
    Some(from)
}

// ---------------------------------------------------------------------------
// Stringification used by System.print and the toString primitives.

/// Renders any value into host-visible text. Built-in containers print
/// their elements; plain instances fall back to their class name.
pub(crate) fn display_string(vm: &mut Runtime, value: Value) -> String {
    if value.is_num() {
        return num_display(value.to_double());
    }
    if value.is_true() {
        return "true".to_string();
    }
    if value.is_false() {
        return "false".to_string();
    }
    if value.is_null() {
        return "null".to_string();
    }
    debug_assert!(value.is_obj());

    let obj = value.as_obj();
    match obj.kind {
        ObjKind::String => value.as_string().as_str().to_string(),
        ObjKind::Class => value.as_class().name.as_str().to_string(),
        ObjKind::Range => {
            let range = value.as_range();
            format!(
                "{}{}{}",
                num_display(range.from),
                if range.is_inclusive { ".." } else { "..." },
                num_display(range.to)
            )
        }
        ObjKind::List => {
            let list = value.as_list();
            let mut text = String::from("[");
            for i in 0..list.elements.count() {
                if i > 0 {
                    text.push_str(", ");
                }
                let element = list.elements[i];
                text.push_str(&display_string(vm, element));
            }
            text.push(']');
            text
        }
        ObjKind::Map => {
            let map = value.as_map();
            let mut text = String::from("{");
            let mut first = true;
            for i in 0..map.capacity {
                let entry = unsafe { &*map.entries.add(i) };
                if entry.key.is_undefined() {
                    continue;
                }
                if !first {
                    text.push_str(", ");
                }
                first = false;
                text.push_str(&display_string(vm, entry.key));
                text.push_str(": ");
                text.push_str(&display_string(vm, entry.value));
            }
            text.push('}');
            text
        }
        ObjKind::Closure | ObjKind::Fn => "<fn>".to_string(),
        ObjKind::Fiber => "<fiber>".to_string(),
        _ => format!("instance of {}", obj.class_obj.name.as_str()),
    }
}

// ---------------------------------------------------------------------------
// Bootstrap.

fn define_single_class(vm: &mut Runtime, module: Gc<ObjModule>, name: &str) -> Gc<ObjClass> {
    let name_string = ObjString::new(vm, name);
    vm.push_root(name_string.cast());
    let class = ObjClass::new_single(vm, 0, name_string);
    let _ = vm.define_variable(module, name, Value::from_obj(class.cast()));
    vm.pop_root();
    class
}

fn define_class(vm: &mut Runtime, module: Gc<ObjModule>, name: &str) -> Gc<ObjClass> {
    let name_string = ObjString::new(vm, name);
    vm.push_root(name_string.cast());
    let object_class = vm.object_class;
    let class = ObjClass::new(vm, object_class, 0, name_string);
    let _ = vm.define_variable(module, name, Value::from_obj(class.cast()));
    vm.pop_root();
    class
}

/// Builds the core module: the class hierarchy, the metaclass knot, and
/// every primitive method.
pub fn initialize_core(vm: &mut Runtime) {
    // The core module's registry key is null, setting it apart from every
    // user module.
    let core = ObjModule::new(vm, Gc::null());
    vm.push_root(core.cast());
    let modules = vm.modules;
    ObjMap::set(modules, vm, Value::null(), Value::from_obj(core.cast()));
    vm.pop_root();

    // Define the root Object class, the ancestor of everything.
    vm.object_class = define_single_class(vm, core, "Object");
    primitive!(vm, vm.object_class, "!", object::object_not);
    primitive!(vm, vm.object_class, "==(_)", object::object_eqeq);
    primitive!(vm, vm.object_class, "!=(_)", object::object_bangeq);
    primitive!(vm, vm.object_class, "is(_)", object::object_is);
    primitive!(vm, vm.object_class, "toString", object::object_to_string);
    primitive!(vm, vm.object_class, "type", object::object_type);

    // Now we can define Class, which is a subclass of Object.
    vm.class_class = define_single_class(vm, core, "Class");
    let (class_class, object_class) = (vm.class_class, vm.object_class);
    ObjClass::bind_superclass(vm, class_class, object_class);
    primitive!(vm, vm.class_class, "name", object::class_name);
    primitive!(vm, vm.class_class, "supertype", object::class_supertype);
    primitive!(vm, vm.class_class, "toString", object::class_to_string);

    // Finally Object's metaclass, which closes the knot at the top: Object's
    // metaclass inherits Class, and Class is its own class.
    let object_metaclass = define_single_class(vm, core, "Object metaclass");
    let mut object_class = vm.object_class;
    object_class.obj.class_obj = object_metaclass;
    let mut object_metaclass = object_metaclass;
    object_metaclass.obj.class_obj = vm.class_class;
    let mut class_class = vm.class_class;
    class_class.obj.class_obj = vm.class_class;
    ObjClass::bind_superclass(vm, object_metaclass, class_class);
    primitive!(vm, object_metaclass, "same(_,_)", object::object_same);

    // The remaining built-in classes hang off Object normally.

    vm.bool_class = define_class(vm, core, "Bool");
    primitive!(vm, vm.bool_class, "!", bool_::bool_not);
    primitive!(vm, vm.bool_class, "toString", bool_::bool_to_string);

    vm.null_class = define_class(vm, core, "Null");
    primitive!(vm, vm.null_class, "!", null::null_not);
    primitive!(vm, vm.null_class, "toString", null::null_to_string);

    vm.num_class = define_class(vm, core, "Num");
    primitive!(vm, vm.num_class, "+(_)", num::num_plus);
    primitive!(vm, vm.num_class, "-(_)", num::num_minus);
    primitive!(vm, vm.num_class, "*(_)", num::num_multiply);
    primitive!(vm, vm.num_class, "/(_)", num::num_divide);
    primitive!(vm, vm.num_class, "%(_)", num::num_mod);
    primitive!(vm, vm.num_class, "<(_)", num::num_lt);
    primitive!(vm, vm.num_class, ">(_)", num::num_gt);
    primitive!(vm, vm.num_class, "<=(_)", num::num_lte);
    primitive!(vm, vm.num_class, ">=(_)", num::num_gte);
    primitive!(vm, vm.num_class, "==(_)", num::num_eqeq);
    primitive!(vm, vm.num_class, "!=(_)", num::num_bangeq);
    primitive!(vm, vm.num_class, "-", num::num_negate);
    primitive!(vm, vm.num_class, "!", num::num_not);
    primitive!(vm, vm.num_class, "..(_)", num::num_dotdot);
    primitive!(vm, vm.num_class, "...(_)", num::num_dotdotdot);
    primitive!(vm, vm.num_class, "abs", num::num_abs);
    primitive!(vm, vm.num_class, "ceil", num::num_ceil);
    primitive!(vm, vm.num_class, "floor", num::num_floor);
    primitive!(vm, vm.num_class, "isInteger", num::num_is_integer);
    primitive!(vm, vm.num_class, "isNan", num::num_is_nan);
    primitive!(vm, vm.num_class, "toString", num::num_to_string_prim);

    vm.string_class = define_class(vm, core, "String");
    primitive!(vm, vm.string_class, "+(_)", core_string::string_plus);
    primitive!(vm, vm.string_class, "[_]", core_string::string_subscript);
    primitive!(vm, vm.string_class, "byteAt_(_)", core_string::string_byte_at);
    primitive!(vm, vm.string_class, "byteCount", core_string::string_byte_count);
    primitive!(vm, vm.string_class, "count", core_string::string_count);
    primitive!(vm, vm.string_class, "contains(_)", core_string::string_contains);
    primitive!(vm, vm.string_class, "endsWith(_)", core_string::string_ends_with);
    primitive!(vm, vm.string_class, "startsWith(_)", core_string::string_starts_with);
    primitive!(vm, vm.string_class, "toString", core_string::string_to_string);

    vm.fn_class = define_class(vm, core, "Fn");
    primitive!(vm, vm.fn_class.obj.class_obj, "new(_)", core_fn::fn_new);
    primitive!(vm, vm.fn_class, "arity", core_fn::fn_arity);
    for (signature, func) in core_fn::CALLS.iter() {
        primitive!(vm, vm.fn_class, signature, *func);
    }
    primitive!(vm, vm.fn_class, "toString", core_fn::fn_to_string);

    vm.fiber_class = define_class(vm, core, "Fiber");
    primitive!(vm, vm.fiber_class.obj.class_obj, "new(_)", core_fiber::fiber_new);
    primitive!(vm, vm.fiber_class.obj.class_obj, "abort(_)", core_fiber::fiber_abort);
    primitive!(vm, vm.fiber_class.obj.class_obj, "current", core_fiber::fiber_current);
    primitive!(vm, vm.fiber_class.obj.class_obj, "suspend()", core_fiber::fiber_suspend);
    primitive!(vm, vm.fiber_class.obj.class_obj, "yield()", core_fiber::fiber_yield);
    primitive!(vm, vm.fiber_class.obj.class_obj, "yield(_)", core_fiber::fiber_yield1);
    primitive!(vm, vm.fiber_class, "call()", core_fiber::fiber_call);
    primitive!(vm, vm.fiber_class, "call(_)", core_fiber::fiber_call1);
    primitive!(vm, vm.fiber_class, "error", core_fiber::fiber_error);
    primitive!(vm, vm.fiber_class, "isDone", core_fiber::fiber_is_done);
    primitive!(vm, vm.fiber_class, "try()", core_fiber::fiber_try);

    vm.list_class = define_class(vm, core, "List");
    primitive!(vm, vm.list_class.obj.class_obj, "new()", core_list::list_new);
    primitive!(vm, vm.list_class, "[_]", core_list::list_subscript);
    primitive!(vm, vm.list_class, "[_]=(_)", core_list::list_subscript_setter);
    primitive!(vm, vm.list_class, "add(_)", core_list::list_add);
    primitive!(vm, vm.list_class, "clear()", core_list::list_clear);
    primitive!(vm, vm.list_class, "count", core_list::list_count);
    primitive!(vm, vm.list_class, "insert(_,_)", core_list::list_insert);
    primitive!(vm, vm.list_class, "iterate(_)", core_list::list_iterate);
    primitive!(vm, vm.list_class, "iteratorValue(_)", core_list::list_iterator_value);
    primitive!(vm, vm.list_class, "removeAt(_)", core_list::list_remove_at);

    vm.map_class = define_class(vm, core, "Map");
    primitive!(vm, vm.map_class.obj.class_obj, "new()", core_map::map_new);
    primitive!(vm, vm.map_class, "[_]", core_map::map_subscript);
    primitive!(vm, vm.map_class, "[_]=(_)", core_map::map_subscript_setter);
    primitive!(vm, vm.map_class, "clear()", core_map::map_clear);
    primitive!(vm, vm.map_class, "containsKey(_)", core_map::map_contains_key);
    primitive!(vm, vm.map_class, "count", core_map::map_count);
    primitive!(vm, vm.map_class, "remove(_)", core_map::map_remove);

    vm.range_class = define_class(vm, core, "Range");
    primitive!(vm, vm.range_class, "from", core_range::range_from);
    primitive!(vm, vm.range_class, "to", core_range::range_to);
    primitive!(vm, vm.range_class, "min", core_range::range_min);
    primitive!(vm, vm.range_class, "max", core_range::range_max);
    primitive!(vm, vm.range_class, "isInclusive", core_range::range_is_inclusive);
    primitive!(vm, vm.range_class, "iterate(_)", core_range::range_iterate);
    primitive!(vm, vm.range_class, "iteratorValue(_)", core_range::range_iterator_value);
    primitive!(vm, vm.range_class, "toString", core_range::range_to_string);

    let system_class = define_class(vm, core, "System");
    primitive!(vm, system_class.obj.class_obj, "print()", system::system_print0);
    primitive!(vm, system_class.obj.class_obj, "print(_)", system::system_print1);
    primitive!(vm, system_class.obj.class_obj, "write(_)", system::system_write);
    primitive!(
        vm,
        system_class.obj.class_obj,
        "writeString_(_)",
        system::system_write_string
    );

    // While bootstrapping the classes above, strings and other objects were
    // created before the class they belong to existed. Stamp them now.
    unsafe {
        let mut obj = vm.heap.first;
        while !obj.is_null() {
            if (*obj).class_obj.is_null() {
                match (*obj).kind {
                    ObjKind::String => (*obj).class_obj = vm.string_class,
                    ObjKind::Fn | ObjKind::Closure => (*obj).class_obj = vm.fn_class,
                    ObjKind::List => (*obj).class_obj = vm.list_class,
                    ObjKind::Map => (*obj).class_obj = vm.map_class,
                    ObjKind::Range => (*obj).class_obj = vm.range_class,
                    _ => {}
                }
            }
            obj = (*obj).next;
        }
    }
}
