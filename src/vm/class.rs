/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use vec_map::VecMap;

use crate::gc::ptr::Gc;
use crate::vm::function::ObjClosure;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::string::ObjString;
use crate::vm::value::Value;
use crate::vm::{FinalizerFn, ForeignMethodFn, Runtime};

/// The maximum number of fields a class can have, including inherited ones.
/// Field instructions address fields with a single byte.
pub const MAX_FIELDS: usize = 255;

/// A built-in method with direct access to the fiber's stack. Receives the
/// arguments (receiver first) and returns `true` when the result has been
/// written into `args[0]`, or `false` when it aborted the fiber, switched
/// fibers, or pushed a call frame.
pub type PrimitiveFn = fn(vm: &mut Runtime, args: *mut Value) -> bool;

/// One entry in a class's method table.
///
/// A symbol with no entry at all is the "no such method" case; keeping the
/// table a dense index map makes that the absent-entry state rather than a
/// sentinel variant.
#[derive(Copy, Clone)]
pub enum Method {
    Primitive(PrimitiveFn),
    Foreign(ForeignMethodFn),
    Block(Gc<ObjClosure>),
    /// A foreign class's finalizer, parked under the `<finalize>` symbol. It
    /// is never dispatched as a call; the sweep phase invokes it directly.
    Finalizer(FinalizerFn),
}

#[repr(C)]
pub struct ObjClass {
    pub obj: ObjHeader,

    pub superclass: Gc<ObjClass>,

    /// The number of fields needed for an instance of this class, including
    /// all of its superclass fields. -1 marks a foreign class whose payload
    /// is an opaque byte buffer instead.
    pub num_fields: i32,

    /// Methods indexed by the runtime-wide method-name symbol.
    pub methods: VecMap<Method>,

    pub name: Gc<ObjString>,
}

impl ObjClass {
    /// Creates a new "raw" class with no metaclass or superclass whatsoever.
    /// Only used while bootstrapping the initial Object and Class classes,
    /// which are a little special.
    pub fn new_single(vm: &mut Runtime, num_fields: i32, name: Gc<ObjString>) -> Gc<ObjClass> {
        vm.push_root(name.cast());
        let class = unsafe {
            let ptr = vm.allocate::<ObjClass>();
            ptr.write(ObjClass {
                obj: ObjHeader {
                    kind: ObjKind::Class,
                    is_dark: false,
                    class_obj: Gc::null(),
                    next: std::ptr::null_mut(),
                },
                superclass: Gc::null(),
                num_fields,
                methods: VecMap::new(),
                name,
            });
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Class, Gc::null());
            Gc::from_raw(ptr)
        };
        vm.pop_root();
        class
    }

    /// Creates a new class object as well as its associated metaclass.
    pub fn new(
        vm: &mut Runtime,
        superclass: Gc<ObjClass>,
        num_fields: i32,
        name: Gc<ObjString>,
    ) -> Gc<ObjClass> {
        vm.push_root(name.cast());
        let metaclass_name = ObjString::new(vm, &format!("{} metaclass", name.as_str()));
        vm.push_root(metaclass_name.cast());

        let mut metaclass = Self::new_single(vm, 0, metaclass_name);
        metaclass.obj.class_obj = vm.class_class;
        vm.pop_root(); // metaclass_name

        // Make sure the metaclass isn't collected when we allocate the class.
        vm.push_root(metaclass.cast());

        // Metaclasses always inherit Class and do not parallel the
        // non-metaclass hierarchy.
        let class_class = vm.class_class;
        Self::bind_superclass(vm, metaclass, class_class);

        let mut class = Self::new_single(vm, num_fields, name);

        // Make sure the class isn't collected while the inherited methods
        // are being bound.
        vm.push_root(class.cast());
        class.obj.class_obj = metaclass;
        Self::bind_superclass(vm, class, superclass);

        vm.pop_root(); // class
        vm.pop_root(); // metaclass
        vm.pop_root(); // name
        class
    }

    /// Makes `superclass` the superclass of `subclass` and causes the
    /// subclass to inherit its methods. Must happen before any methods are
    /// defined on the subclass.
    pub fn bind_superclass(vm: &mut Runtime, mut subclass: Gc<ObjClass>, superclass: Gc<ObjClass>) {
        debug_assert!(superclass.is_not_null(), "must have superclass");
        subclass.superclass = superclass;

        // Include the superclass in the total number of fields.
        if subclass.num_fields != -1 {
            subclass.num_fields += superclass.num_fields;
        } else {
            debug_assert!(
                superclass.num_fields == 0,
                "a foreign class cannot inherit from a class with fields"
            );
        }

        for (symbol, method) in superclass.methods.clone_entries() {
            Self::bind_method(vm, subclass, symbol, method);
        }
    }

    pub fn bind_method(_vm: &mut Runtime, mut class: Gc<ObjClass>, symbol: usize, method: Method) {
        class.methods.insert(symbol, method);
    }

    pub fn lookup_method(&self, symbol: usize) -> Option<Method> {
        self.methods.get(symbol).copied()
    }
}

/// Snapshot of a method table for inheritance, detached from the borrow on
/// the superclass so binding into the subclass can allocate freely.
trait CloneEntries {
    fn clone_entries(&self) -> Vec<(usize, Method)>;
}

impl CloneEntries for VecMap<Method> {
    fn clone_entries(&self) -> Vec<(usize, Method)> {
        self.iter().map(|(symbol, method)| (symbol, *method)).collect()
    }
}
