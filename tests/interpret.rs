/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! End-to-end interpreter scenarios. The test "compiler" hand-assembles the
//! bytecode a real front end would emit for each source line.

mod common;

use common::{drop_host, host, new_vm, FnBuilder};
use siskin::prelude::*;
use siskin::vm::opcodes::Op;

/// `System.print(1 + 2 * 3)`
fn compile_arithmetic(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    let mut body = FnBuilder::new(vm, "(script)", 16);
    body.load_module_var(module, "System");
    let one = body.constant(Value::from_double(1.0));
    let two = body.constant(Value::from_double(2.0));
    let three = body.constant(Value::from_double(3.0));
    body.op(Op::Constant).short(one);
    body.op(Op::Constant).short(two);
    body.op(Op::Constant).short(three);
    body.call(vm, 1, "*(_)");
    body.call(vm, 1, "+(_)");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);
    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn arithmetic_prints_seven() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("arithmetic".to_string(), compile_arithmetic);

    let result = vm.interpret("main", "arithmetic");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "7\n");

    drop(vm);
    drop_host(state);
}

#[test]
fn arithmetic_survives_gc_stress() {
    let (mut vm, state) = new_vm(Options::default().with_gc_stress(true));
    host(&vm)
        .compilers
        .insert("arithmetic".to_string(), compile_arithmetic);

    let result = vm.interpret("main", "arithmetic");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "7\n");

    drop(vm);
    drop_host(state);
}

/// A closure incrementing a captured counter, called three times:
///
/// ```text
/// var x = 0
/// var inc = Fn.new { x = x + 1 ... }
/// System.print(inc.call()) // three times
/// ```
fn compile_counter(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    let mut body = FnBuilder::new(vm, "(script)", 16);

    // The inner function: increments its upvalue and returns the new value.
    let mut inner = FnBuilder::new(vm, "increment", 4);
    inner.num_upvalues = 1;
    inner.op(Op::LoadUpvalue).byte(0);
    let one = inner.constant(Value::from_double(1.0));
    inner.op(Op::Constant).short(one);
    inner.call(vm, 1, "+(_)");
    inner.op(Op::StoreUpvalue).byte(0);
    inner.op(Op::Return);
    inner.op(Op::End);
    let inner_fn = inner.build(vm, module);
    let inner_constant = body.fn_constant(vm, inner_fn);

    let zero = body.constant(Value::from_double(0.0));

    // Slot 1 holds the counter local, slot 2 the closure.
    body.op(Op::Constant).short(zero);
    body.op(Op::Closure).short(inner_constant);
    body.byte(1).byte(1); // capture the local in slot 1

    for _ in 0..3 {
        body.load_module_var(module, "System");
        body.op(Op::LoadLocal2);
        body.call(vm, 0, "call()");
        body.call(vm, 1, "print(_)");
        body.op(Op::Pop);
    }

    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn closure_counter_shares_one_cell() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("counter".to_string(), compile_counter);

    let result = vm.interpret("main", "counter");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "1\n2\n3\n");

    drop(vm);
    drop_host(state);
}

#[test]
fn closure_counter_survives_gc_stress() {
    let (mut vm, state) = new_vm(Options::default().with_gc_stress(true));
    host(&vm)
        .compilers
        .insert("counter".to_string(), compile_counter);

    let result = vm.interpret("main", "counter");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "1\n2\n3\n");

    drop(vm);
    drop_host(state);
}

/// A closed-over local outliving its scope:
///
/// ```text
/// var x = 7
/// f = Fn.new { x }
/// // x leaves scope here
/// System.print(f.call())
/// ```
fn compile_closed_upvalue(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    vm.define_variable(module, "f", Value::null()).unwrap();

    let mut body = FnBuilder::new(vm, "(script)", 16);

    let mut reader = FnBuilder::new(vm, "reader", 4);
    reader.num_upvalues = 1;
    reader.op(Op::LoadUpvalue).byte(0);
    reader.op(Op::Return);
    reader.op(Op::End);
    let reader_fn = reader.build(vm, module);
    let reader_constant = body.fn_constant(vm, reader_fn);

    let seven = body.constant(Value::from_double(7.0));

    body.op(Op::Constant).short(seven); // slot 1: the local
    body.op(Op::Closure).short(reader_constant);
    body.byte(1).byte(1);
    body.store_module_var(module, "f");
    body.op(Op::Pop);

    // The local leaves scope: close the upvalue over it and drop it.
    body.op(Op::CloseUpvalue);

    body.load_module_var(module, "System");
    body.load_module_var(module, "f");
    body.call(vm, 0, "call()");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);
    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn closed_upvalue_owns_its_value() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("closed".to_string(), compile_closed_upvalue);

    let result = vm.interpret("main", "closed");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "7\n");

    drop(vm);
    drop_host(state);
}

/// `"abc".bogus`
fn compile_method_not_found(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    let mut body = FnBuilder::new(vm, "(script)", 16);
    let abc = body.str_constant(vm, "abc");
    body.op(Op::Constant).short(abc);
    body.call(vm, 0, "bogus");
    body.op(Op::Pop);
    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn method_not_found_reports_class_and_signature() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("bogus".to_string(), compile_method_not_found);

    let result = vm.interpret("main", "bogus");
    assert_eq!(result, InterpretResult::RuntimeError);
    let errors = &host(&vm).errors;
    assert!(
        errors
            .iter()
            .any(|error| error.contains("String does not implement 'bogus'.")),
        "got errors: {:?}",
        errors
    );

    drop(vm);
    drop_host(state);
}

/// A fiber aborting inside `try`:
///
/// ```text
/// var f = Fiber.new { Fiber.abort("boom") }
/// System.print(f.try())
/// ```
fn compile_fiber_try(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    let mut body = FnBuilder::new(vm, "(script)", 16);

    let mut aborter = FnBuilder::new(vm, "aborter", 8);
    aborter.load_module_var(module, "Fiber");
    let boom = aborter.str_constant(vm, "boom");
    aborter.op(Op::Constant).short(boom);
    aborter.call(vm, 1, "abort(_)");
    aborter.op(Op::Return);
    aborter.op(Op::End);
    let aborter_fn = aborter.build(vm, module);
    let aborter_constant = body.fn_constant(vm, aborter_fn);

    body.load_module_var(module, "System");
    body.load_module_var(module, "Fiber");
    body.op(Op::Closure).short(aborter_constant);
    body.call(vm, 1, "new(_)");
    body.call(vm, 0, "try()");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);
    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn fiber_try_catches_abort() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("try".to_string(), compile_fiber_try);

    let result = vm.interpret("main", "try");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "boom\n");
    assert!(host(&vm).errors.is_empty());

    drop(vm);
    drop_host(state);
}

/// Yield handshake:
///
/// ```text
/// var f = Fiber.new {|start| Fiber.yield(start + 1) }
/// System.print(f.call(10))   // 11
/// System.print(f.isDone)     // false
/// ```
fn compile_fiber_yield(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    vm.define_variable(module, "f", Value::null()).unwrap();

    let mut body = FnBuilder::new(vm, "(script)", 16);

    let mut yielder = FnBuilder::new(vm, "yielder", 8);
    yielder.arity = 1;
    yielder.load_module_var(module, "Fiber");
    yielder.op(Op::LoadLocal1);
    let one = yielder.constant(Value::from_double(1.0));
    yielder.op(Op::Constant).short(one);
    yielder.call(vm, 1, "+(_)");
    yielder.call(vm, 1, "yield(_)");
    yielder.op(Op::Pop);
    yielder.op(Op::Null);
    yielder.op(Op::Return);
    yielder.op(Op::End);
    let yielder_fn = yielder.build(vm, module);
    let yielder_constant = body.fn_constant(vm, yielder_fn);

    let ten = body.constant(Value::from_double(10.0));

    body.load_module_var(module, "Fiber");
    body.op(Op::Closure).short(yielder_constant);
    body.call(vm, 1, "new(_)");
    body.store_module_var(module, "f");
    body.op(Op::Pop);

    body.load_module_var(module, "System");
    body.load_module_var(module, "f");
    body.op(Op::Constant).short(ten);
    body.call(vm, 1, "call(_)");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);

    body.load_module_var(module, "System");
    body.load_module_var(module, "f");
    body.call(vm, 0, "isDone");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);

    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn fiber_yield_returns_value_to_caller() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("yield".to_string(), compile_fiber_yield);

    let result = vm.interpret("main", "yield");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "11\nfalse\n");

    drop(vm);
    drop_host(state);
}

/// Deep recursion: grows both the frame stack and the value stack, which
/// forces the pointer fixups on reallocation.
///
/// ```text
/// var rec = Fn.new {|n| n < 1 ? 0 : rec.call(n - 1) }
/// System.print(rec.call(300))
/// ```
fn compile_recursion(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    vm.define_variable(module, "rec", Value::null()).unwrap();

    let mut body = FnBuilder::new(vm, "(script)", 16);

    let mut rec = FnBuilder::new(vm, "rec", 8);
    rec.arity = 1;
    let one = rec.constant(Value::from_double(1.0));
    let zero = rec.constant(Value::from_double(0.0));

    rec.op(Op::LoadLocal1);
    rec.op(Op::Constant).short(one);
    rec.call(vm, 1, "<(_)");
    rec.op(Op::JumpIf);
    let to_recurse = rec.short_placeholder();

    // Base case.
    rec.op(Op::Constant).short(zero);
    rec.op(Op::Return);

    rec.patch_to_here(to_recurse);
    rec.load_module_var(module, "rec");
    rec.op(Op::LoadLocal1);
    rec.op(Op::Constant).short(one);
    rec.call(vm, 1, "-(_)");
    rec.call(vm, 1, "call(_)");
    rec.op(Op::Return);
    rec.op(Op::End);
    let rec_fn = rec.build(vm, module);
    let rec_constant = body.fn_constant(vm, rec_fn);

    let depth = body.constant(Value::from_double(300.0));

    body.op(Op::Closure).short(rec_constant);
    body.store_module_var(module, "rec");
    body.op(Op::Pop);

    body.load_module_var(module, "System");
    body.load_module_var(module, "rec");
    body.op(Op::Constant).short(depth);
    body.call(vm, 1, "call(_)");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);
    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn deep_recursion_grows_stacks() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("recursion".to_string(), compile_recursion);

    let result = vm.interpret("main", "recursion");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "0\n");

    drop(vm);
    drop_host(state);
}

/// List and map primitives driven from bytecode, including negative and
/// range subscripts.
fn compile_containers(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    let mut body = FnBuilder::new(vm, "(script)", 16);
    let one = body.constant(Value::from_double(1.0));
    let two = body.constant(Value::from_double(2.0));
    let three = body.constant(Value::from_double(3.0));
    let zero = body.constant(Value::from_double(0.0));
    let minus_one = body.constant(Value::from_double(-1.0));
    let a = body.str_constant(vm, "a");
    let b = body.str_constant(vm, "b");

    // Slot 1: a list of 1, 2, 3. Slot 2: an empty list. Slot 3: a map.
    body.load_module_var(module, "List");
    body.call(vm, 0, "new()");
    body.load_module_var(module, "List");
    body.call(vm, 0, "new()");
    body.load_module_var(module, "Map");
    body.call(vm, 0, "new()");

    for constant in [one, two, three].iter() {
        body.op(Op::LoadLocal1);
        body.op(Op::Constant).short(*constant);
        body.call(vm, 1, "add(_)");
        body.op(Op::Pop);
    }

    // System.print(list[-1]) => 3
    body.load_module_var(module, "System");
    body.op(Op::LoadLocal1);
    body.op(Op::Constant).short(minus_one);
    body.call(vm, 1, "[_]");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);

    // System.print(list[1..2]) => [2, 3]
    body.load_module_var(module, "System");
    body.op(Op::LoadLocal1);
    body.op(Op::Constant).short(one);
    body.op(Op::Constant).short(two);
    body.call(vm, 1, "..(_)");
    body.call(vm, 1, "[_]");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);

    // System.print(empty[0...0]) => [] (empty range at the end is legal)
    body.load_module_var(module, "System");
    body.op(Op::LoadLocal2);
    body.op(Op::Constant).short(zero);
    body.op(Op::Constant).short(zero);
    body.call(vm, 1, "...(_)");
    body.call(vm, 1, "[_]");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);

    // map["a"] = 1; map["b"] = 2; map.remove("a")
    body.op(Op::LoadLocal3);
    body.op(Op::Constant).short(a);
    body.op(Op::Constant).short(one);
    body.call(vm, 2, "[_]=(_)");
    body.op(Op::Pop);
    body.op(Op::LoadLocal3);
    body.op(Op::Constant).short(b);
    body.op(Op::Constant).short(two);
    body.call(vm, 2, "[_]=(_)");
    body.op(Op::Pop);
    body.op(Op::LoadLocal3);
    body.op(Op::Constant).short(a);
    body.call(vm, 1, "remove(_)");
    body.op(Op::Pop);

    // System.print(map["b"]) => 2, System.print(map.count) => 1
    body.load_module_var(module, "System");
    body.op(Op::LoadLocal3);
    body.op(Op::Constant).short(b);
    body.call(vm, 1, "[_]");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);
    body.load_module_var(module, "System");
    body.op(Op::LoadLocal3);
    body.call(vm, 0, "count");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);

    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn container_primitives() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("containers".to_string(), compile_containers);

    let result = vm.interpret("main", "containers");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "3\n[2, 3]\n[]\n2\n1\n");

    drop(vm);
    drop_host(state);
}

/// Importing the same module twice only invokes the loader once.
fn compile_importer(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    let mut body = FnBuilder::new(vm, "(script)", 16);
    let dep = body.str_constant(vm, "dep");
    body.op(Op::ImportModule).short(dep);
    body.op(Op::Pop);
    body.op(Op::ImportModule).short(dep);
    body.op(Op::Pop);
    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

fn compile_dep(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    let mut body = FnBuilder::new(vm, "(script)", 4);
    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn import_caches_modules() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("importer".to_string(), compile_importer);
    host(&vm)
        .compilers
        .insert("dep source".to_string(), compile_dep);
    host(&vm)
        .sources
        .insert("dep".to_string(), "dep source".to_string());

    let result = vm.interpret("main", "importer");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).loads, 1);

    drop(vm);
    drop_host(state);
}

/// Importing a module nobody can load aborts the fiber.
fn compile_missing_import(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    let mut body = FnBuilder::new(vm, "(script)", 16);
    let name = body.str_constant(vm, "nowhere");
    body.op(Op::ImportModule).short(name);
    body.op(Op::Pop);
    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn missing_import_is_a_runtime_error() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("missing".to_string(), compile_missing_import);

    let result = vm.interpret("main", "missing");
    assert_eq!(result, InterpretResult::RuntimeError);
    assert!(host(&vm)
        .errors
        .iter()
        .any(|error| error.contains("Could not load module 'nowhere'.")));

    drop(vm);
    drop_host(state);
}

/// Classes end to end: construction, instance fields, metaclass
/// constructors, and super dispatch with bind-time patching.
///
/// ```text
/// class Point { construct new(x, y) { _x = x  _y = y } sum() { _x + _y } }
/// class A { construct new() {} describe() { "A" } }
/// class B is A { describe() { super.describe() + "B" } }
/// System.print(Point.new(3, 4).sum())
/// System.print(B.new().describe())
/// ```
fn compile_classes(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    vm.define_variable(module, "Point", Value::null()).unwrap();
    vm.define_variable(module, "A", Value::null()).unwrap();
    vm.define_variable(module, "B", Value::null()).unwrap();

    let mut body = FnBuilder::new(vm, "(script)", 16);

    // Point's constructor: stores both arguments into fields and returns
    // the fresh instance.
    let mut point_new = FnBuilder::new(vm, "new(_,_)", 8);
    point_new.arity = 2;
    point_new.op(Op::Construct);
    point_new.op(Op::LoadLocal1);
    point_new.op(Op::StoreFieldThis).byte(0);
    point_new.op(Op::Pop);
    point_new.op(Op::LoadLocal2);
    point_new.op(Op::StoreFieldThis).byte(1);
    point_new.op(Op::Pop);
    point_new.op(Op::LoadLocal0);
    point_new.op(Op::Return);
    point_new.op(Op::End);
    let point_new_fn = point_new.build(vm, module);
    let point_new_constant = body.fn_constant(vm, point_new_fn);

    let mut point_sum = FnBuilder::new(vm, "sum()", 8);
    point_sum.op(Op::LoadFieldThis).byte(0);
    point_sum.op(Op::LoadFieldThis).byte(1);
    point_sum.call(vm, 1, "+(_)");
    point_sum.op(Op::Return);
    point_sum.op(Op::End);
    let point_sum_fn = point_sum.build(vm, module);
    let point_sum_constant = body.fn_constant(vm, point_sum_fn);

    // A trivial constructor shared by A and B.
    let mut plain_new = FnBuilder::new(vm, "new()", 4);
    plain_new.op(Op::Construct);
    plain_new.op(Op::Return);
    plain_new.op(Op::End);
    let plain_new_fn = plain_new.build(vm, module);
    let a_new_constant = body.fn_constant(vm, plain_new_fn);
    let b_new_constant = body.fn_constant(vm, plain_new_fn);

    let mut a_describe = FnBuilder::new(vm, "describe()", 4);
    let a_text = a_describe.str_constant(vm, "A");
    a_describe.op(Op::Constant).short(a_text);
    a_describe.op(Op::Return);
    a_describe.op(Op::End);
    let a_describe_fn = a_describe.build(vm, module);
    let a_describe_constant = body.fn_constant(vm, a_describe_fn);

    // B's override calls up through super; the superclass constant slot is
    // patched when the method is bound to B.
    let mut b_describe = FnBuilder::new(vm, "describe()", 8);
    let superclass_slot = b_describe.constant(Value::null());
    let b_text = b_describe.str_constant(vm, "B");
    b_describe.op(Op::LoadLocal0);
    let describe_symbol = vm.method_names.ensure("describe()");
    b_describe.op(Op::Super0).short(describe_symbol).short(superclass_slot);
    b_describe.op(Op::Constant).short(b_text);
    b_describe.call(vm, 1, "+(_)");
    b_describe.op(Op::Return);
    b_describe.op(Op::End);
    let b_describe_fn = b_describe.build(vm, module);
    let b_describe_constant = body.fn_constant(vm, b_describe_fn);

    let point_name = body.str_constant(vm, "Point");
    let a_name = body.str_constant(vm, "A");
    let b_name = body.str_constant(vm, "B");
    let three = body.constant(Value::from_double(3.0));
    let four = body.constant(Value::from_double(4.0));

    let new2_symbol = vm.method_names.ensure("new(_,_)");
    let new0_symbol = vm.method_names.ensure("new()");
    let sum_symbol = vm.method_names.ensure("sum()");

    // class Point
    body.op(Op::Constant).short(point_name);
    body.load_module_var(module, "Object");
    body.op(Op::Class).byte(2);
    body.store_module_var(module, "Point");
    body.op(Op::Pop);
    body.op(Op::Closure).short(point_new_constant);
    body.load_module_var(module, "Point");
    body.op(Op::MethodStatic).short(new2_symbol);
    body.op(Op::Closure).short(point_sum_constant);
    body.load_module_var(module, "Point");
    body.op(Op::MethodInstance).short(sum_symbol);

    // class A
    body.op(Op::Constant).short(a_name);
    body.load_module_var(module, "Object");
    body.op(Op::Class).byte(0);
    body.store_module_var(module, "A");
    body.op(Op::Pop);
    body.op(Op::Closure).short(a_new_constant);
    body.load_module_var(module, "A");
    body.op(Op::MethodStatic).short(new0_symbol);
    body.op(Op::Closure).short(a_describe_constant);
    body.load_module_var(module, "A");
    body.op(Op::MethodInstance).short(describe_symbol);

    // class B is A
    body.op(Op::Constant).short(b_name);
    body.load_module_var(module, "A");
    body.op(Op::Class).byte(0);
    body.store_module_var(module, "B");
    body.op(Op::Pop);
    body.op(Op::Closure).short(b_new_constant);
    body.load_module_var(module, "B");
    body.op(Op::MethodStatic).short(new0_symbol);
    body.op(Op::Closure).short(b_describe_constant);
    body.load_module_var(module, "B");
    body.op(Op::MethodInstance).short(describe_symbol);

    // System.print(Point.new(3, 4).sum())
    body.load_module_var(module, "System");
    body.load_module_var(module, "Point");
    body.op(Op::Constant).short(three);
    body.op(Op::Constant).short(four);
    body.call(vm, 2, "new(_,_)");
    body.call(vm, 0, "sum()");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);

    // System.print(B.new().describe())
    body.load_module_var(module, "System");
    body.load_module_var(module, "B");
    body.call(vm, 0, "new()");
    body.call(vm, 0, "describe()");
    body.call(vm, 1, "print(_)");
    body.op(Op::Pop);

    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn classes_fields_and_super_dispatch() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("classes".to_string(), compile_classes);

    let result = vm.interpret("main", "classes");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "7\nAB\n");

    drop(vm);
    drop_host(state);
}

/// `System.writeString_("no newline")` passes raw text straight through.
fn compile_write_string(vm: &mut Runtime, module: Gc<ObjModule>) -> Option<Gc<ObjFn>> {
    let mut body = FnBuilder::new(vm, "(script)", 16);
    let text = body.str_constant(vm, "no newline");
    body.load_module_var(module, "System");
    body.op(Op::Constant).short(text);
    body.call(vm, 1, "writeString_(_)");
    body.op(Op::Pop);
    body.op(Op::EndModule);
    body.op(Op::Return);
    body.op(Op::End);
    Some(body.build(vm, module))
}

#[test]
fn write_string_emits_raw_text() {
    let (mut vm, state) = new_vm(Options::default());
    host(&vm)
        .compilers
        .insert("write string".to_string(), compile_write_string);

    let result = vm.interpret("main", "write string");
    assert_eq!(result, InterpretResult::Success);
    assert_eq!(host(&vm).output, "no newline");

    drop(vm);
    drop_host(state);
}
