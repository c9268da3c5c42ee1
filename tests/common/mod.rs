/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Test host: stands in for the embedding application and for the compiler
//! collaborator. "Compiling" looks the source text up in a registry of
//! hand-assembled function builders.

#![allow(dead_code)]

use std::collections::HashMap;
use std::os::raw::c_void;

use siskin::prelude::*;
use siskin::vm::opcodes::Op;
use siskin::vm::ErrorKind;

pub type TestCompiler = fn(&mut Runtime, Gc<ObjModule>) -> Option<Gc<ObjFn>>;

#[derive(Default)]
pub struct TestHost {
    pub output: String,
    pub errors: Vec<String>,
    pub compilers: HashMap<String, TestCompiler>,
    pub sources: HashMap<String, String>,
    pub loads: usize,
}

pub fn host(vm: &Runtime) -> &'static mut TestHost {
    unsafe { &mut *(vm.user_data() as *mut TestHost) }
}

fn write_cb(vm: &mut Runtime, text: &str) {
    host(vm).output.push_str(text);
}

fn error_cb(vm: &mut Runtime, kind: ErrorKind, module: Option<&str>, line: i32, message: &str) {
    host(vm).errors.push(format!(
        "{:?}|{}|{}|{}",
        kind,
        module.unwrap_or(""),
        line,
        message
    ));
}

fn compile_cb(vm: &mut Runtime, module: Gc<ObjModule>, source: &str) -> Option<Gc<ObjFn>> {
    let compiler = *host(vm).compilers.get(source)?;
    compiler(vm, module)
}

fn load_cb(vm: &mut Runtime, name: &str) -> Option<String> {
    let state = host(vm);
    state.loads += 1;
    state.sources.get(name).cloned()
}

pub fn new_vm(options: Options) -> (Box<Runtime>, *mut TestHost) {
    new_vm_with(options, |_| {})
}

pub fn new_vm_with(
    options: Options,
    customize: impl FnOnce(&mut Config),
) -> (Box<Runtime>, *mut TestHost) {
    let state = Box::into_raw(Box::new(TestHost::default()));
    let mut config = Config::default();
    config.user_data = state as *mut c_void;
    config.write_fn = Some(write_cb);
    config.error_fn = Some(error_cb);
    config.compile_fn = Some(compile_cb);
    config.load_module_fn = Some(load_cb);
    customize(&mut config);
    (Runtime::new(config, options), state)
}

pub fn drop_host(state: *mut TestHost) {
    unsafe {
        drop(Box::from_raw(state));
    }
}

/// Assembles a function object the way the compiler collaborator would.
/// Constants created while building are parked in a handle-rooted list so a
/// stress-mode collection can't sweep them mid-assembly.
pub struct FnBuilder {
    code: Vec<u8>,
    constants: Vec<Value>,
    pub max_slots: usize,
    pub arity: usize,
    pub num_upvalues: usize,
    name: String,
    keepalive: Gc<ObjList>,
    keepalive_handle: *mut Handle,
}

impl FnBuilder {
    pub fn new(vm: &mut Runtime, name: &str, max_slots: usize) -> Self {
        let keepalive = ObjList::new(vm);
        let keepalive_handle = vm.make_handle(Value::from_obj(keepalive.cast()));
        Self {
            code: Vec::new(),
            constants: Vec::new(),
            max_slots,
            arity: 0,
            num_upvalues: 0,
            name: name.to_string(),
            keepalive,
            keepalive_handle,
        }
    }

    pub fn op(&mut self, op: Op) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    pub fn byte(&mut self, byte: u8) -> &mut Self {
        self.code.push(byte);
        self
    }

    pub fn short(&mut self, value: usize) -> &mut Self {
        self.code.push(((value >> 8) & 0xff) as u8);
        self.code.push((value & 0xff) as u8);
        self
    }

    pub fn pos(&self) -> usize {
        self.code.len()
    }

    /// Emits a 16-bit placeholder; patch it with [`FnBuilder::patch_to_here`].
    pub fn short_placeholder(&mut self) -> usize {
        let at = self.pos();
        self.short(0xffff);
        at
    }

    /// Rewrites the jump operand at `at` with the forward distance from the
    /// end of that operand to the current position.
    pub fn patch_to_here(&mut self, at: usize) {
        let offset = self.pos() - at - 2;
        self.code[at] = ((offset >> 8) & 0xff) as u8;
        self.code[at + 1] = (offset & 0xff) as u8;
    }

    pub fn constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    pub fn str_constant(&mut self, vm: &mut Runtime, text: &str) -> usize {
        let string = ObjString::new(vm, text);
        let value = Value::from_obj(string.cast());
        let keepalive = self.keepalive;
        let count = keepalive.len();
        ObjList::insert(keepalive, vm, count, value);
        self.constant(value)
    }

    pub fn fn_constant(&mut self, vm: &mut Runtime, fn_obj: Gc<ObjFn>) -> usize {
        let value = Value::from_obj(fn_obj.cast());
        let keepalive = self.keepalive;
        let count = keepalive.len();
        ObjList::insert(keepalive, vm, count, value);
        self.constant(value)
    }

    /// Shorthand for a method call: emits the call opcode for `num_args`
    /// arguments (receiver excluded) and the interned signature symbol.
    pub fn call(&mut self, vm: &mut Runtime, num_args: usize, signature: &str) -> &mut Self {
        let symbol = vm.method_names.ensure(signature);
        self.op(Op::call(num_args));
        self.short(symbol)
    }

    pub fn load_module_var(&mut self, module: Gc<ObjModule>, name: &str) -> &mut Self {
        let symbol = module
            .variable_names
            .find(name)
            .unwrap_or_else(|| panic!("module variable {} not defined", name));
        self.op(Op::LoadModuleVar);
        self.short(symbol)
    }

    pub fn store_module_var(&mut self, module: Gc<ObjModule>, name: &str) -> &mut Self {
        let symbol = module
            .variable_names
            .find(name)
            .unwrap_or_else(|| panic!("module variable {} not defined", name));
        self.op(Op::StoreModuleVar);
        self.short(symbol)
    }

    pub fn build(&mut self, vm: &mut Runtime, module: Gc<ObjModule>) -> Gc<ObjFn> {
        let mut fn_obj = ObjFn::new(vm, module, self.max_slots);
        vm.push_root(fn_obj.cast());
        fn_obj.arity = self.arity;
        fn_obj.num_upvalues = self.num_upvalues;
        for &byte in &self.code {
            fn_obj.code.push(vm, byte);
        }
        for &constant in &self.constants {
            fn_obj.constants.push(vm, constant);
        }
        fn_obj.debug.source_lines.fill(vm, 1, self.code.len());
        fn_obj.bind_name(&self.name);
        vm.pop_root();
        vm.release_handle(self.keepalive_handle);
        self.keepalive_handle = std::ptr::null_mut();
        fn_obj
    }
}
