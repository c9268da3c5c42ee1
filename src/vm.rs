/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use libc::c_void;

use crate::gc::handle::Handle;
use crate::gc::heap::{default_reallocate, Heap};
use crate::gc::ptr::Gc;
use crate::options::Options;

pub mod class;
pub mod fiber;
pub mod foreign;
pub mod function;
pub mod instance;
pub mod interpreter;
pub mod list;
pub mod map;
pub mod module;
pub mod object;
pub mod opcodes;
pub mod range;
pub mod string;
pub mod symbol_table;
pub mod value;

use class::{Method, ObjClass, MAX_FIELDS};
use fiber::ObjFiber;
use function::{ObjClosure, ObjFn};
use map::ObjMap;
use module::ObjModule;
use opcodes::{operand_bytes, Op};
use string::ObjString;
use symbol_table::SymbolTable;
use value::Value;

/// The host allocator. `new_size == 0` frees and returns null; a null `ptr`
/// allocates; otherwise the block is resized in place or relocated.
pub type ReallocateFn =
    unsafe fn(user_data: *mut c_void, ptr: *mut c_void, new_size: usize) -> *mut c_void;

/// A host method. It reads its receiver and arguments, and leaves its
/// result, through the slot API.
pub type ForeignMethodFn = fn(vm: &mut Runtime);

/// A foreign class finalizer. Receives the instance's opaque payload;
/// invoked exactly once, right before the sweep reclaims the instance.
pub type FinalizerFn = fn(data: *mut c_void);

/// Rewrites an imported module name relative to the importing module.
/// Returning `None` fails the import.
pub type ResolveModuleFn = fn(vm: &mut Runtime, importer: &str, name: &str) -> Option<String>;

/// Returns the source text for a module. Ownership of the returned string
/// transfers to the runtime, which drops it once the module is compiled.
pub type LoadModuleFn = fn(vm: &mut Runtime, name: &str) -> Option<String>;

pub type BindForeignMethodFn = fn(
    vm: &mut Runtime,
    module: &str,
    class_name: &str,
    is_static: bool,
    signature: &str,
) -> Option<ForeignMethodFn>;

pub type BindForeignClassFn =
    fn(vm: &mut Runtime, module: &str, class_name: &str) -> ForeignClassMethods;

/// Receives the UTF-8 output of `System.print` and friends.
pub type WriteFn = fn(vm: &mut Runtime, text: &str);

pub type ErrorFn =
    fn(vm: &mut Runtime, kind: ErrorKind, module: Option<&str>, line: i32, message: &str);

/// The compiler collaborator: turns source text into a function object
/// (bytecode, constants, debug info) owned by `module`. The runtime itself
/// never parses source.
pub type CompileFn =
    fn(vm: &mut Runtime, module: Gc<ObjModule>, source: &str) -> Option<Gc<ObjFn>>;

#[derive(Copy, Clone, Default)]
pub struct ForeignClassMethods {
    pub allocate: Option<ForeignMethodFn>,
    pub finalize: Option<FinalizerFn>,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    Compile,
    Runtime,
    /// One line of a runtime error's stack trace.
    StackTrace,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum InterpretResult {
    Success,
    CompileError,
    RuntimeError,
}

pub struct Config {
    pub reallocate_fn: Option<ReallocateFn>,
    pub resolve_module_fn: Option<ResolveModuleFn>,
    pub load_module_fn: Option<LoadModuleFn>,
    pub bind_foreign_method_fn: Option<BindForeignMethodFn>,
    pub bind_foreign_class_fn: Option<BindForeignClassFn>,
    pub write_fn: Option<WriteFn>,
    pub error_fn: Option<ErrorFn>,
    pub compile_fn: Option<CompileFn>,

    /// Opaque pointer echoed back to every host callback through
    /// [`Runtime::user_data`].
    pub user_data: *mut c_void,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reallocate_fn: None,
            resolve_module_fn: None,
            load_module_fn: None,
            bind_foreign_method_fn: None,
            bind_foreign_class_fn: None,
            write_fn: None,
            error_fn: None,
            compile_fn: None,
            user_data: std::ptr::null_mut(),
        }
    }
}

/// A single instance of the language runtime. Not safe to touch from more
/// than one thread; within the instance, fibers provide all the concurrency
/// there is.
pub struct Runtime {
    pub(crate) heap: Heap,

    pub bool_class: Gc<ObjClass>,
    pub class_class: Gc<ObjClass>,
    pub fiber_class: Gc<ObjClass>,
    pub fn_class: Gc<ObjClass>,
    pub list_class: Gc<ObjClass>,
    pub map_class: Gc<ObjClass>,
    pub null_class: Gc<ObjClass>,
    pub num_class: Gc<ObjClass>,
    pub object_class: Gc<ObjClass>,
    pub range_class: Gc<ObjClass>,
    pub string_class: Gc<ObjClass>,

    /// The fiber currently being run, or null when no interpretation is in
    /// flight.
    pub fiber: Gc<ObjFiber>,

    /// The loaded modules, keyed by name string (the core module's key is
    /// `null`).
    pub(crate) modules: Gc<ObjMap>,

    /// The module whose code most recently finished executing. Not a
    /// separate root; it is already in `modules`.
    pub(crate) last_module: Gc<ObjModule>,

    /// Head of the doubly-linked list of live handles.
    pub(crate) handles: *mut Handle,

    /// Whether the slot API currently has a window open. Cleared while
    /// bytecode runs; set inside foreign calls and host-driven setup.
    pub(crate) is_api_call: bool,

    pub(crate) config: Config,
    pub(crate) options: Options,

    /// The single runtime-wide symbol table for method names. Calls
    /// dispatch by index into it. Append-only during execution.
    pub method_names: SymbolTable,

    /// Values the compiler collaborator needs kept alive while a compile is
    /// in progress.
    pub compiler_scratch: Vec<Value>,

    /// Preallocated so the collector can raise it without allocating.
    pub(crate) oom_error: Value,
}

impl Runtime {
    pub fn new(config: Config, options: Options) -> Box<Runtime> {
        let realloc_fn = config.reallocate_fn.unwrap_or(default_reallocate);
        let user_data = config.user_data;
        let initial_heap_size = options.initial_heap_size;

        let mut vm = Box::new(Runtime {
            heap: Heap::new(realloc_fn, user_data, initial_heap_size),
            bool_class: Gc::null(),
            class_class: Gc::null(),
            fiber_class: Gc::null(),
            fn_class: Gc::null(),
            list_class: Gc::null(),
            map_class: Gc::null(),
            null_class: Gc::null(),
            num_class: Gc::null(),
            object_class: Gc::null(),
            range_class: Gc::null(),
            string_class: Gc::null(),
            fiber: Gc::null(),
            modules: Gc::null(),
            last_module: Gc::null(),
            handles: std::ptr::null_mut(),
            is_api_call: false,
            config,
            options,
            method_names: SymbolTable::new(),
            compiler_scratch: Vec::new(),
            oom_error: Value::null(),
        });

        vm.modules = ObjMap::new(&mut vm);
        let oom = ObjString::new(&mut vm, "out of memory");
        vm.oom_error = Value::from_obj(oom.cast());

        crate::corelib::initialize_core(&mut vm);
        vm
    }

    pub fn user_data(&self) -> *mut c_void {
        self.config.user_data
    }

    pub fn set_user_data(&mut self, user_data: *mut c_void) {
        self.config.user_data = user_data;
        self.heap.user_data = user_data;
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn bytes_allocated(&self) -> usize {
        self.heap.bytes_allocated()
    }

    pub(crate) fn write(&mut self, text: &str) {
        if let Some(write_fn) = self.config.write_fn {
            write_fn(self, text);
        }
    }

    pub(crate) fn report_error(
        &mut self,
        kind: ErrorKind,
        module: Option<&str>,
        line: i32,
        message: &str,
    ) {
        if let Some(error_fn) = self.config.error_fn {
            error_fn(self, kind, module, line, message);
        }
    }

    /// The class of `value`. Numbers, booleans, and null are unboxed, so
    /// their classes live on the runtime; everything else carries its class
    /// in its header.
    pub fn class_of(&self, value: Value) -> Gc<ObjClass> {
        if value.is_num() {
            return self.num_class;
        }
        if value.is_obj() {
            return value.as_obj().class_obj;
        }
        if value.is_bool() {
            return self.bool_class;
        }
        if value.is_null() {
            return self.null_class;
        }
        // `undefined` never reaches user code, so it never gets dispatched
        // on.
        debug_assert!(false, "undefined has no class");
        self.null_class
    }

    /// Aborts the current fiber with a fresh error string.
    pub fn abort_fiber_str(&mut self, message: &str) {
        if self.fiber.is_null() {
            return;
        }
        let error = ObjString::new(self, message);
        let mut fiber = self.fiber;
        fiber.set_error(Value::from_obj(error.cast()));
    }

    pub(crate) fn method_not_found(&mut self, class: Gc<ObjClass>, symbol: usize) {
        let message = format!(
            "{} does not implement '{}'.",
            class.name.as_str(),
            self.method_names.name(symbol)
        );
        self.abort_fiber_str(&message);
    }

    /// Verifies that `superclass_value` is a valid object to inherit from:
    /// a class, not one of the sealed built-ins, not foreign, and not
    /// producing too many fields.
    fn validate_superclass(
        &self,
        name: Value,
        superclass_value: Value,
        num_fields: i32,
    ) -> Result<(), String> {
        let name = name.as_string();

        if !superclass_value.is_class() {
            return Err(format!(
                "Class '{}' cannot inherit from a non-class object.",
                name.as_str()
            ));
        }

        // Primitive methods on the sealed built-in classes assume the
        // receiver has a specific representation and would fail horribly on
        // a plain instance.
        let superclass = superclass_value.as_class();
        if superclass == self.class_class
            || superclass == self.fiber_class
            || superclass == self.fn_class
            || superclass == self.list_class
            || superclass == self.map_class
            || superclass == self.range_class
            || superclass == self.string_class
        {
            return Err(format!(
                "Class '{}' cannot inherit from built-in class '{}'.",
                name.as_str(),
                superclass.name.as_str()
            ));
        }

        if superclass.num_fields == -1 {
            return Err(format!(
                "Class '{}' cannot inherit from foreign class '{}'.",
                name.as_str(),
                superclass.name.as_str()
            ));
        }

        if num_fields == -1 && superclass.num_fields > 0 {
            return Err(format!(
                "Foreign class '{}' may not inherit from a class with fields.",
                name.as_str()
            ));
        }

        if num_fields != -1 && superclass.num_fields + num_fields > MAX_FIELDS as i32 {
            return Err(format!(
                "Class '{}' may not have more than 255 fields, including inherited ones.",
                name.as_str()
            ));
        }

        Ok(())
    }

    /// Creates a new class. If `num_fields` is -1 the class is foreign. The
    /// name and superclass are the top two values of the fiber's stack; the
    /// new class replaces them both.
    ///
    /// Aborts the current fiber if validation fails.
    pub(crate) fn create_class(&mut self, num_fields: i32, module: Gc<ObjModule>) {
        let mut fiber = self.fiber;
        let name = fiber.peek2();
        let superclass = fiber.peek();

        // Two values on the stack and one will be left, so discard the
        // other slot.
        fiber.drop_values(1);

        if let Err(message) = self.validate_superclass(name, superclass, num_fields) {
            self.abort_fiber_str(&message);
            return;
        }

        let class = ObjClass::new(self, superclass.as_class(), num_fields, name.as_string());
        unsafe {
            *fiber.stack_top.sub(1) = Value::from_obj(class.cast());
        }

        if num_fields == -1 {
            self.bind_foreign_class(class, module);
        }
    }

    fn bind_foreign_class(&mut self, class: Gc<ObjClass>, module: Gc<ObjModule>) {
        let methods = match self.config.bind_foreign_class_fn {
            Some(bind) => {
                let module_name = module.name_str().to_string();
                let class_name = class.name.as_str().to_string();
                bind(self, &module_name, &class_name)
            }
            None => ForeignClassMethods::default(),
        };

        // Intern the symbols even when the host bound nothing, so they are
        // always present in the table.
        let allocate_symbol = self.method_names.ensure("<allocate>");
        if let Some(allocate) = methods.allocate {
            ObjClass::bind_method(self, class, allocate_symbol, Method::Foreign(allocate));
        }

        let finalize_symbol = self.method_names.ensure("<finalize>");
        if let Some(finalize) = methods.finalize {
            ObjClass::bind_method(self, class, finalize_symbol, Method::Finalizer(finalize));
        }
    }

    /// Runs the foreign class allocator for `ForeignConstruct`: the class
    /// sits in `stack[0]` and the constructor arguments follow it, all
    /// visible to the allocator through the slot window.
    pub(crate) fn create_foreign(&mut self, fiber: Gc<ObjFiber>, stack: *mut Value) {
        let class = unsafe { *stack }.as_class();
        debug_assert!(class.num_fields == -1, "class must be a foreign class");

        let allocate = self
            .method_names
            .find("<allocate>")
            .and_then(|symbol| class.lookup_method(symbol))
            .and_then(|method| match method {
                Method::Foreign(allocate) => Some(allocate),
                _ => None,
            });

        match allocate {
            Some(allocate) => {
                let scope = crate::api::ForeignCallScope::enter(self, fiber, stack);
                allocate(self);
                drop(scope);
            }
            None => {
                let message = format!(
                    "Class '{}' does not have a foreign allocator.",
                    class.name.as_str()
                );
                self.abort_fiber_str(&message);
            }
        }
    }

    /// Defines a method on `class` (or its metaclass for static methods).
    /// `method_value` is either a bytecode closure or a string holding a
    /// foreign method signature to resolve through the host.
    ///
    /// Aborts the current fiber if a foreign method cannot be resolved.
    pub(crate) fn bind_method(
        &mut self,
        is_static: bool,
        symbol: usize,
        module: Gc<ObjModule>,
        class: Gc<ObjClass>,
        method_value: Value,
    ) {
        let class_name = class.name.as_str().to_string();
        let target = if is_static { class.obj.class_obj } else { class };

        let method = if method_value.is_string() {
            let signature = method_value.as_string().as_str().to_string();
            let module_name = module.name_str().to_string();
            let foreign = self.config.bind_foreign_method_fn.and_then(|bind| {
                bind(self, &module_name, &class_name, is_static, &signature)
            });
            match foreign {
                Some(foreign) => Method::Foreign(foreign),
                None => {
                    self.abort_fiber_str(&format!(
                        "Could not find foreign method '{}' for class {} in module '{}'.",
                        signature, class_name, module_name
                    ));
                    return;
                }
            }
        } else {
            let closure = method_value.as_closure();
            // Patch up the bytecode now that we know the superclass.
            Self::bind_method_code(target, closure.fn_obj);
            Method::Block(closure)
        };

        ObjClass::bind_method(self, target, symbol, method);
    }

    /// Fixes up a method body once its class is known: field instructions
    /// shift past the inherited fields, and super-call constant slots get
    /// the actual superclass. Recurses into nested closures.
    pub(crate) fn bind_method_code(class: Gc<ObjClass>, mut fn_obj: Gc<ObjFn>) {
        let mut ip = 0;
        loop {
            let op = Op::from_u8(fn_obj.code[ip]);
            match op {
                Op::LoadFieldThis | Op::StoreFieldThis | Op::LoadField | Op::StoreField => {
                    fn_obj.code[ip + 1] += class.superclass.num_fields as u8;
                }
                _ if op.is_super_call() => {
                    let constant =
                        ((fn_obj.code[ip + 3] as usize) << 8) | fn_obj.code[ip + 4] as usize;
                    fn_obj.constants[constant] = Value::from_obj(class.superclass.cast());
                }
                Op::Closure => {
                    let constant =
                        ((fn_obj.code[ip + 1] as usize) << 8) | fn_obj.code[ip + 2] as usize;
                    Self::bind_method_code(class, fn_obj.constants[constant].as_fn());
                }
                Op::End => return,
                _ => {}
            }
            ip += 1 + operand_bytes(&fn_obj, ip);
        }
    }

    /// Looks up a previously loaded module, or null.
    pub(crate) fn get_module(&self, name: Value) -> Gc<ObjModule> {
        let module = self.modules.get(name);
        if module.is_undefined() {
            Gc::null()
        } else {
            module.as_module()
        }
    }

    pub(crate) fn compile_in_module(&mut self, name: Value, source: &str) -> Option<Gc<ObjClosure>> {
        let mut module = self.get_module(name);
        if module.is_null() {
            let name_string = if name.is_null() {
                Gc::null()
            } else {
                name.as_string()
            };
            module = ObjModule::new(self, name_string);
            self.push_root(module.cast());

            // Store it in the module registry so the same import doesn't
            // load it twice.
            let modules = self.modules;
            ObjMap::set(modules, self, name, Value::from_obj(module.cast()));

            // Implicitly import the core module.
            let core = self.get_module(Value::null());
            if core.is_not_null() {
                for i in 0..core.variables.count() {
                    let var_name = core.variable_names.name(i).to_string();
                    let value = core.variables[i];
                    let _ = self.define_variable(module, &var_name, value);
                }
            }
            self.pop_root();
        }

        let compile = match self.config.compile_fn {
            Some(compile) => compile,
            None => {
                let module_name = module.name_str().to_string();
                self.report_error(
                    ErrorKind::Compile,
                    Some(&module_name),
                    0,
                    "no compiler configured",
                );
                return None;
            }
        };
        let fn_obj = compile(self, module, source)?;

        // Functions are always wrapped in closures.
        self.push_root(fn_obj.cast());
        let closure = ObjClosure::new(self, fn_obj);
        self.pop_root();
        Some(closure)
    }

    /// Compiles `source` in the context of the named module and wraps it in
    /// a closure ready to run. Returns `None` if a compile error occurred.
    pub fn compile_source(&mut self, module: Option<&str>, source: &str) -> Option<Gc<ObjClosure>> {
        let name_value = match module {
            Some(name) => {
                let name = ObjString::new(self, name);
                self.push_root(name.cast());
                Value::from_obj(name.cast())
            }
            None => Value::null(),
        };

        let closure = self.compile_in_module(name_value, source);

        if module.is_some() {
            self.pop_root();
        }
        closure
    }

    /// Executes `source` in the context of the named module.
    pub fn interpret(&mut self, module: &str, source: &str) -> InterpretResult {
        match self.compile_source(Some(module), source) {
            None => InterpretResult::CompileError,
            Some(closure) => {
                self.push_root(closure.cast());
                let fiber = ObjFiber::new(self, closure);
                self.pop_root();
                self.run_interpreter(fiber)
            }
        }
    }

    /// Lets the host resolve an imported module name if it wants to.
    fn resolve_module(&mut self, name: Value) -> Value {
        let resolve = match self.config.resolve_module_fn {
            // If the host doesn't care to resolve, leave the name alone.
            None => return name,
            Some(resolve) => resolve,
        };

        let fiber = self.fiber;
        let importer = unsafe {
            let frame = &*fiber.frames.add(fiber.num_frames - 1);
            frame.closure.fn_obj.module.name_str().to_string()
        };

        let name_string = name.as_string();
        let name_str = name_string.as_str().to_string();
        match resolve(self, &importer, &name_str) {
            None => {
                self.abort_fiber_str(&format!(
                    "Could not resolve module '{}' imported from '{}'.",
                    name_str, importer
                ));
                Value::null()
            }
            Some(resolved) => {
                if resolved == name_str {
                    return name;
                }
                let resolved = ObjString::new(self, &resolved);
                Value::from_obj(resolved.cast())
            }
        }
    }

    /// Imports the named module, returning the cached module object when it
    /// is already loaded, or the closure of its freshly compiled body when
    /// not. Returns `null` (with the fiber aborted) on failure.
    pub(crate) fn import_module(&mut self, name: Value) -> Value {
        let name = self.resolve_module(name);
        if name.is_null() {
            return Value::null();
        }

        // If the module is already loaded, there is nothing to do.
        let existing = self.modules.get(name);
        if !existing.is_undefined() {
            return existing;
        }

        self.push_root(name.as_obj());

        let name_string = name.as_string();
        let name_str = name_string.as_str().to_string();

        let source = self
            .config
            .load_module_fn
            .and_then(|load| load(self, &name_str));

        let source = match source {
            Some(source) => source,
            None => {
                self.abort_fiber_str(&format!("Could not load module '{}'.", name_str));
                self.pop_root(); // name.
                return Value::null();
            }
        };

        let closure = self.compile_in_module(name, &source);

        // The loader handed the source's ownership to the runtime; it dies
        // here, after compilation.
        drop(source);

        let result = match closure {
            Some(closure) => Value::from_obj(closure.cast()),
            None => {
                self.abort_fiber_str(&format!("Could not compile module '{}'.", name_str));
                Value::null()
            }
        };

        self.pop_root(); // name.
        result
    }

    /// Fetches a top-level variable from `module` by name value, aborting
    /// the current fiber when it does not exist.
    pub(crate) fn get_module_variable(&mut self, module: Gc<ObjModule>, name: Value) -> Value {
        let variable = name.as_string();
        match module.find_variable(variable.as_str()) {
            Some(value) => value,
            None => {
                let message = format!(
                    "Could not find a variable named '{}' in module '{}'.",
                    variable.as_str(),
                    module.name_str()
                );
                self.abort_fiber_str(&message);
                Value::null()
            }
        }
    }

    /// Walks the caller chain after a fiber's error was set. The first
    /// ancestor running a `try` catches: the error replaces its caller's
    /// top-of-stack and that fiber resumes. With no catcher, the stack trace
    /// goes to the error sink and the current fiber becomes null.
    pub(crate) fn handle_runtime_error(&mut self) {
        debug_assert!(self.fiber.has_error(), "should only unwind after an error");

        let error = self.fiber.error;
        let mut current = self.fiber;

        while current.is_not_null() {
            // Every fiber along the way gets aborted with the same error.
            current.error = error;

            // If the fiber is caught up in a try, jump to it with the error.
            if current.state == fiber::FiberState::Try {
                // Make the caller's try method return the error.
                let caller = current.caller;
                unsafe {
                    *caller.stack_top.sub(1) = error;
                }
                self.fiber = caller;
                return;
            }

            // Otherwise unhook the caller; we will never resume and return
            // to it.
            let caller = current.caller;
            current.caller = Gc::null();
            current = caller;
        }

        // Nothing caught the error, so show the stack trace.
        self.print_stack_trace();
        self.fiber = Gc::null();
    }

    pub(crate) fn print_stack_trace(&mut self) {
        if self.config.error_fn.is_none() {
            return;
        }

        let fiber = self.fiber;
        let message = if fiber.error.is_string() {
            fiber.error.as_string().as_str().to_string()
        } else {
            // The error is not a string, so it can't be printed directly.
            "[error object]".to_string()
        };
        self.report_error(ErrorKind::Runtime, None, -1, &message);

        for i in (0..fiber.num_frames).rev() {
            let frame = unsafe { &*fiber.frames.add(i) };
            let fn_obj = frame.closure.fn_obj;

            // Synthesized call-handle stubs have no module or line info, and
            // the core module's internals stay out of user traces.
            if fn_obj.module.is_null() {
                continue;
            }
            if fn_obj.module.name.is_null() {
                continue;
            }

            let offset = frame.ip as usize - fn_obj.code.as_ptr() as usize;
            let line = if offset >= 1 && offset <= fn_obj.debug.source_lines.count() {
                fn_obj.debug.source_lines[offset - 1]
            } else {
                0
            };
            let module_name = fn_obj.module.name.as_str().to_string();
            let fn_name = fn_obj.debug.name.clone();
            self.report_error(ErrorKind::StackTrace, Some(&module_name), line, &fn_name);
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        // Free all of the collector's objects, finalizers included.
        unsafe {
            let mut obj = self.heap.first;
            while !obj.is_null() {
                let next = (*obj).next;
                self.free_obj(obj);
                obj = next;
            }
        }

        // Unreleased handles mean the host still holds pointers into this
        // runtime; surface the bug early rather than freeing under them.
        debug_assert!(self.handles.is_null(), "all handles have not been released");
    }
}
