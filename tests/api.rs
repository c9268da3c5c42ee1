/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Embedding API tests: slots, handles, foreign classes, and the host call
//! entry.

mod common;

use std::os::raw::c_void;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{drop_host, host, new_vm, FnBuilder};
use siskin::prelude::*;
use siskin::vm::opcodes::Op;

#[test]
fn slot_doubles_round_trip_bit_identical() {
    let (mut vm, state) = new_vm(Options::default());
    vm.set_slot_count(1);

    for &value in &[
        0.0,
        -0.0,
        1.5,
        -123456.789,
        f64::INFINITY,
        f64::NEG_INFINITY,
        f64::from_bits(0x7ff8_0000_0000_0000),
    ] {
        vm.set_slot_double(0, value);
        assert_eq!(vm.slot_type(0), SlotType::Num);
        assert_eq!(vm.get_slot_double(0).to_bits(), value.to_bits());
    }

    drop(vm);
    drop_host(state);
}

#[test]
fn slot_types_and_contents() {
    let (mut vm, state) = new_vm(Options::default());
    vm.set_slot_count(4);
    assert_eq!(vm.slot_count(), 4);

    vm.set_slot_bool(0, true);
    assert_eq!(vm.slot_type(0), SlotType::Bool);
    assert!(vm.get_slot_bool(0));

    vm.set_slot_string(1, "hello");
    assert_eq!(vm.slot_type(1), SlotType::String);
    assert_eq!(vm.get_slot_string(1), "hello");

    vm.set_slot_bytes(2, b"\x00\xfe\xff");
    assert_eq!(vm.get_slot_bytes(2), b"\x00\xfe\xff");

    vm.set_slot_null(3);
    assert_eq!(vm.slot_type(3), SlotType::Null);

    vm.set_slot_new_list(3);
    assert_eq!(vm.slot_type(3), SlotType::List);

    vm.set_slot_new_map(3);
    assert_eq!(vm.slot_type(3), SlotType::Map);

    drop(vm);
    drop_host(state);
}

#[test]
fn list_slot_indexing() {
    let (mut vm, state) = new_vm(Options::default());
    vm.set_slot_count(3);
    vm.set_slot_new_list(0);

    // Build [10, 20, 30] using append-at-minus-one.
    for &value in &[10.0, 20.0, 30.0] {
        vm.set_slot_double(1, value);
        vm.insert_in_list(0, -1, 1);
    }
    assert_eq!(vm.get_list_count(0), 3);

    // Insert at the front.
    vm.set_slot_double(1, 5.0);
    vm.insert_in_list(0, 0, 1);
    assert_eq!(vm.get_list_count(0), 4);

    vm.get_list_element(2, 0, 0);
    assert_eq!(vm.get_slot_double(2), 5.0);
    vm.get_list_element(2, 0, -1);
    assert_eq!(vm.get_slot_double(2), 30.0);

    drop(vm);
    drop_host(state);
}

#[test]
fn map_slot_lookup_misses_are_null() {
    let (mut vm, state) = new_vm(Options::default());
    vm.set_slot_count(3);
    vm.set_slot_new_map(0);
    vm.set_slot_string(1, "missing");

    assert!(!vm.get_map_value(0, 1, Some(2)));
    assert_eq!(vm.slot_type(2), SlotType::Null);

    drop(vm);
    drop_host(state);
}

#[test]
fn handles_root_values_across_collections() {
    let (mut vm, state) = new_vm(Options::default());
    vm.set_slot_count(2);
    vm.set_slot_string(0, "persistent");
    let handle = vm.get_slot_handle(0);

    // A make/release pair leaves the object set unchanged.
    let value = vm.get_slot(0);
    let scratch = vm.make_handle(value);
    vm.release_handle(scratch);

    vm.collect_garbage();

    vm.set_slot_handle(1, handle);
    assert_eq!(vm.get_slot_string(1), "persistent");

    vm.release_handle(handle);
    drop(vm);
    drop_host(state);
}

#[test]
fn accounting_is_stable_across_collections() {
    let (mut vm, state) = new_vm(Options::default());

    vm.set_slot_count(1);
    vm.set_slot_string(0, "some garbage");
    vm.set_slot_null(0);

    vm.collect_garbage();
    let live = vm.bytes_allocated();
    assert!(live > 0);

    // Immediately after a sweep the count equals the live set; a second
    // collection with no new allocation must not change it.
    vm.collect_garbage();
    assert_eq!(vm.bytes_allocated(), live);

    let before = vm.bytes_allocated();
    let handle = vm.make_handle(Value::from_double(1.0));
    assert!(vm.bytes_allocated() > before);
    vm.release_handle(handle);
    assert_eq!(vm.bytes_allocated(), before);

    drop(vm);
    drop_host(state);
}

// ---------------------------------------------------------------------------
// Foreign class lifecycle.

static FINALIZED: AtomicUsize = AtomicUsize::new(0);

fn resource_allocate(vm: &mut Runtime) {
    let data = vm.set_slot_new_foreign(0, 0, std::mem::size_of::<i32>()) as *mut i32;
    unsafe {
        *data = 123;
    }
}

fn resource_finalize(data: *mut c_void) {
    // Make sure we get the right data back.
    let value = unsafe { *(data as *mut i32) };
    if value == 123 {
        FINALIZED.fetch_add(1, Ordering::SeqCst);
    }
}

fn bind_resource_class(_vm: &mut Runtime, module: &str, class_name: &str) -> ForeignClassMethods {
    assert_eq!(module, "main");
    assert_eq!(class_name, "Resource");
    ForeignClassMethods {
        allocate: Some(resource_allocate),
        finalize: Some(resource_finalize),
    }
}

/// ```text
/// foreign class Resource {
///   construct new() {}
/// }
/// // create and drop four instances
/// ```
fn compile_resources(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    vm.define_variable(module, "Resource", Value::null()).unwrap();

    let mut body = FnBuilder::new(vm, "(script)", 16);

    let mut ctor = FnBuilder::new(vm, "new()", 4);
    ctor.op(Op::ForeignConstruct);
    ctor.op(Op::Return);
    ctor.op(Op::End);
    let ctor_fn = ctor.build(vm, module);
    let ctor_constant = body.fn_constant(vm, ctor_fn);

    let name = body.str_constant(vm, "Resource");

    body.op(Op::Constant).short(name);
    body.load_module_var(module, "Object");
    body.op(Op::ForeignClass);
    body.store_module_var(module, "Resource");
    body.op(Op::Pop);

    let new_symbol = vm.method_names.ensure("new()");
    body.op(Op::Closure).short(ctor_constant);
    body.load_module_var(module, "Resource");
    body.op(Op::MethodStatic).short(new_symbol);

    for _ in 0..4 {
        body.load_module_var(module, "Resource");
        body.call(vm, 0, "new()");
        body.op(Op::Pop);
    }

    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn foreign_class_lifecycle_runs_finalizers_once() {
    let (mut vm, state) = common::new_vm_with(Options::default(), |config| {
        config.bind_foreign_class_fn = Some(bind_resource_class);
    });
    host(&vm)
        .compilers
        .insert("resources".to_string(), compile_resources);

    FINALIZED.store(0, Ordering::SeqCst);
    let result = vm.interpret("main", "resources");
    assert_eq!(result, InterpretResult::Success);

    // The four instances are garbage now but have not been swept yet.
    assert_eq!(FINALIZED.load(Ordering::SeqCst), 0);
    vm.collect_garbage();
    assert_eq!(FINALIZED.load(Ordering::SeqCst), 4);

    drop(vm);
    drop_host(state);
}

// ---------------------------------------------------------------------------
// Host call entry, including stack reset after an aborted call.

/// ```text
/// class Test {
///   static abortFiber() { Fiber.abort("Abort!") }
///   static afterAbort(a, b) { return a + b }
/// }
/// ```
fn compile_test_class(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    vm.define_variable(module, "Test", Value::null()).unwrap();

    let mut body = FnBuilder::new(vm, "(script)", 16);

    let mut aborter = FnBuilder::new(vm, "abortFiber()", 8);
    aborter.load_module_var(module, "Fiber");
    let message = aborter.str_constant(vm, "Abort!");
    aborter.op(Op::Constant).short(message);
    aborter.call(vm, 1, "abort(_)");
    aborter.op(Op::Return);
    aborter.op(Op::End);
    let aborter_fn = aborter.build(vm, module);
    let aborter_constant = body.fn_constant(vm, aborter_fn);

    let mut after = FnBuilder::new(vm, "afterAbort(_,_)", 8);
    after.arity = 2;
    after.op(Op::LoadLocal1);
    after.op(Op::LoadLocal2);
    after.call(vm, 1, "+(_)");
    after.op(Op::Return);
    after.op(Op::End);
    let after_fn = after.build(vm, module);
    let after_constant = body.fn_constant(vm, after_fn);

    let name = body.str_constant(vm, "Test");

    body.op(Op::Constant).short(name);
    body.load_module_var(module, "Object");
    body.op(Op::Class).byte(0);
    body.store_module_var(module, "Test");
    body.op(Op::Pop);

    let abort_symbol = vm.method_names.ensure("abortFiber()");
    body.op(Op::Closure).short(aborter_constant);
    body.load_module_var(module, "Test");
    body.op(Op::MethodStatic).short(abort_symbol);

    let after_symbol = vm.method_names.ensure("afterAbort(_,_)");
    body.op(Op::Closure).short(after_constant);
    body.load_module_var(module, "Test");
    body.op(Op::MethodStatic).short(after_symbol);

    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn stack_resets_after_aborted_host_call() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("test class".to_string(), compile_test_class);

    let result = vm.interpret("main", "test class");
    assert_eq!(result, InterpretResult::Success);

    vm.set_slot_count(1);
    vm.get_variable(0, "main", "Test");
    let test_class = vm.get_slot_handle(0);

    let abort_fiber = vm.make_call_handle("abortFiber()");
    let after_abort = vm.make_call_handle("afterAbort(_,_)");

    vm.set_slot_count(1);
    vm.set_slot_handle(0, test_class);
    assert_eq!(vm.call(abort_fiber), InterpretResult::RuntimeError);
    assert!(host(&vm)
        .errors
        .iter()
        .any(|error| error.contains("Abort!")));

    // The aborted call must leave a clean stack for the next one.
    vm.set_slot_count(3);
    vm.set_slot_handle(0, test_class);
    vm.set_slot_double(1, 1.0);
    vm.set_slot_double(2, 2.0);
    assert_eq!(vm.call(after_abort), InterpretResult::Success);
    assert_eq!(vm.get_slot_double(0), 3.0);

    vm.release_handle(test_class);
    vm.release_handle(abort_fiber);
    vm.release_handle(after_abort);

    drop(vm);
    drop_host(state);
}

#[test]
fn call_handle_with_subscript_signature() {
    let (mut vm, state) = new_vm(Options::default());

    // list[1] via a subscript call handle.
    let subscript = vm.make_call_handle("[_]");

    vm.set_slot_count(3);
    vm.set_slot_new_list(0);
    for &value in &[4.0, 5.0, 6.0] {
        vm.set_slot_double(2, value);
        vm.insert_in_list(0, -1, 2);
    }
    vm.set_slot_double(1, 1.0);

    // Trim the window to receiver + argument before calling.
    let list = vm.get_slot_handle(0);
    vm.set_slot_count(2);
    vm.set_slot_handle(0, list);
    vm.set_slot_double(1, 1.0);

    assert_eq!(vm.call(subscript), InterpretResult::Success);
    assert_eq!(vm.get_slot_double(0), 5.0);

    vm.release_handle(list);
    vm.release_handle(subscript);
    drop(vm);
    drop_host(state);
}
