/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::gc::buffer::Buffer;
use crate::gc::ptr::Gc;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::string::ObjString;
use crate::vm::symbol_table::SymbolTable;
use crate::vm::value::Value;
use crate::vm::Runtime;

/// The maximum number of top-level variables one module can define.
/// Module-variable instructions address them with a two-byte symbol.
pub const MAX_MODULE_VARS: usize = 65536;

/// A loaded module and the top-level variables it defines.
///
/// While this is managed by the collector, it never appears as a first-class
/// language object.
#[repr(C)]
pub struct ObjModule {
    pub obj: ObjHeader,

    /// The currently defined top-level variables.
    pub variables: Buffer<Value>,

    /// Names of all module variables; indices here correspond directly to
    /// entries in `variables`.
    pub variable_names: SymbolTable,

    /// The name of the module. Null for the implicit core module.
    pub name: Gc<ObjString>,
}

impl ObjModule {
    pub fn new(vm: &mut Runtime, name: Gc<ObjString>) -> Gc<ObjModule> {
        if name.is_not_null() {
            vm.push_root(name.cast());
        }
        let module = unsafe {
            let ptr = vm.allocate::<ObjModule>();
            ptr.write(ObjModule {
                obj: ObjHeader {
                    kind: ObjKind::Module,
                    is_dark: false,
                    class_obj: Gc::null(),
                    next: std::ptr::null_mut(),
                },
                variables: Buffer::new(),
                variable_names: SymbolTable::new(),
                name,
            });
            // Modules are never exposed to user code, so they have no class.
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Module, Gc::null());
            Gc::from_raw(ptr)
        };
        if name.is_not_null() {
            vm.pop_root();
        }
        module
    }

    pub fn name_str(&self) -> &str {
        if self.name.is_null() {
            "core"
        } else {
            self.name.as_str()
        }
    }

    pub fn find_variable(&self, name: &str) -> Option<Value> {
        self.variable_names
            .find(name)
            .map(|symbol| self.variables[symbol])
    }
}

impl Runtime {
    /// Adds a new implicitly declared top-level variable named `name` to
    /// `module`, based on a use site occurring on `line`.
    ///
    /// Does not check whether the name is already declared. Returns the
    /// symbol for the new variable, or `None` if the module is full.
    pub fn declare_variable(
        &mut self,
        mut module: Gc<ObjModule>,
        name: &str,
        line: i32,
    ) -> Option<usize> {
        if module.variables.count() == MAX_MODULE_VARS {
            return None;
        }

        // Implicitly defined variables get a "value" that is the line where
        // the variable is first used, to report a late error on the right
        // line.
        module.variables.push(self, Value::from_double(line as f64));
        Some(module.variable_names.ensure(name))
    }

    /// Adds a new top-level variable named `name` to `module`.
    ///
    /// Returns `Ok(symbol)`, or `Err(true)` if the variable was already
    /// explicitly defined, or `Err(false)` if the module has too many
    /// variables.
    pub fn define_variable(
        &mut self,
        mut module: Gc<ObjModule>,
        name: &str,
        value: Value,
    ) -> Result<usize, bool> {
        if module.variables.count() == MAX_MODULE_VARS {
            return Err(false);
        }

        if value.is_obj() {
            self.push_root(value.as_obj());
        }

        let result = match module.variable_names.find(name) {
            None => {
                // Brand new variable.
                let symbol = module.variable_names.ensure(name);
                module.variables.push(self, value);
                Ok(symbol)
            }
            Some(symbol) if module.variables[symbol].is_num() => {
                // An implicitly declared variable's value is always the use
                // line number. Now it has a real definition.
                module.variables[symbol] = value;
                Ok(symbol)
            }
            Some(_) => Err(true),
        };

        if value.is_obj() {
            self.pop_root();
        }

        result
    }
}
