/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The accounting allocator and the mark-sweep collector.
//!
//! Every managed allocation funnels through one host-supplied reallocation
//! function. A small chunk header in front of each block records its size,
//! which keeps `bytes_allocated` exact across grow, shrink, and free without
//! a recount pass. Collection is stop-the-world tri-color mark-sweep: roots
//! are grayed, the gray stack is drained by tracing, then the intrusive list
//! of all objects is swept and unmarked objects are freed.

use libc::c_void;

use crate::gc::ptr::Gc;
use crate::gc::MAX_TEMP_ROOTS;
use crate::vm::class::{Method, ObjClass};
use crate::vm::fiber::ObjFiber;
use crate::vm::foreign::ObjForeign;
use crate::vm::function::{ObjClosure, ObjFn, ObjUpvalue};
use crate::vm::instance::ObjInstance;
use crate::vm::list::ObjList;
use crate::vm::map::ObjMap;
use crate::vm::module::ObjModule;
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::value::Value;
use crate::vm::{ReallocateFn, Runtime};

/// Sits in front of every block handed out by [`Runtime::reallocate`] so the
/// accounting knows the old size on realloc and free. Padded to keep the
/// payload 16-byte aligned.
#[repr(C)]
struct ChunkHeader {
    size: usize,
    _pad: usize,
}

const CHUNK_HEADER_SIZE: usize = std::mem::size_of::<ChunkHeader>();

/// The behavior of `realloc` for a zero size is implementation defined: it
/// may return a pointer that must not be dereferenced but still has to be
/// freed. Avoid that case entirely.
pub unsafe fn default_reallocate(
    _user_data: *mut c_void,
    ptr: *mut c_void,
    new_size: usize,
) -> *mut c_void {
    if new_size == 0 {
        libc::free(ptr);
        return std::ptr::null_mut();
    }
    libc::realloc(ptr, new_size)
}

pub struct Heap {
    pub(crate) realloc_fn: ReallocateFn,
    pub(crate) user_data: *mut c_void,

    /// The number of bytes known to be currently allocated: everything that
    /// was live after the last collection plus allocations since, minus
    /// frees since.
    pub(crate) bytes_allocated: usize,

    /// The total that will trigger the next collection.
    pub(crate) next_gc: usize,

    /// The first object in the linked list of all currently allocated
    /// objects.
    pub(crate) first: *mut ObjHeader,

    /// The gray stack: discovered but not yet traced objects during a
    /// collection pass.
    gray: Vec<Gc<ObjHeader>>,

    /// Temporary or new objects that are not otherwise reachable but must
    /// not be collected. A stack: only the most recently pushed object can
    /// be released.
    temp_roots: [Gc<ObjHeader>; MAX_TEMP_ROOTS],
    num_temp_roots: usize,

    /// Set while a collection runs so the frees issued by the sweep (and the
    /// stress mode) cannot re-enter the collector.
    collecting: bool,
}

impl Heap {
    pub fn new(realloc_fn: ReallocateFn, user_data: *mut c_void, initial_heap_size: usize) -> Self {
        Self {
            realloc_fn,
            user_data,
            bytes_allocated: 0,
            next_gc: initial_heap_size,
            first: std::ptr::null_mut(),
            gray: Vec::with_capacity(16),
            temp_roots: [Gc::null(); MAX_TEMP_ROOTS],
            num_temp_roots: 0,
            collecting: false,
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }
}

impl Runtime {
    /// All managed memory goes through here: `new_size == 0` frees, a null
    /// `ptr` allocates, anything else resizes. May trigger a collection
    /// before satisfying a growing request; on exhaustion it forces one
    /// collection, retries, and aborts the current fiber with the
    /// preallocated out-of-memory error if the retry also fails.
    pub(crate) unsafe fn reallocate(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        let old_size = if ptr.is_null() {
            0
        } else {
            (*ptr.cast::<ChunkHeader>().sub(1)).size
        };

        // If new bytes are being allocated, count them before deciding to
        // collect so the trigger sees the true total.
        self.heap.bytes_allocated = (self.heap.bytes_allocated as isize + new_size as isize
            - old_size as isize) as usize;

        if new_size > 0
            && !self.heap.collecting
            && (self.options.gc_stress || self.heap.bytes_allocated > self.heap.next_gc)
        {
            self.collect_garbage();
        }

        let raw_old: *mut c_void = if ptr.is_null() {
            std::ptr::null_mut()
        } else {
            ptr.cast::<ChunkHeader>().sub(1).cast()
        };
        let raw_size = if new_size == 0 {
            0
        } else {
            new_size + CHUNK_HEADER_SIZE
        };

        let mut mem = (self.heap.realloc_fn)(self.heap.user_data, raw_old, raw_size);
        if mem.is_null() && new_size > 0 {
            // Reclaim what we can and ask once more.
            if !self.heap.collecting {
                self.collect_garbage();
            }
            mem = (self.heap.realloc_fn)(self.heap.user_data, raw_old, raw_size);
            if mem.is_null() {
                // Undo the count and abort the fiber rather than corrupt.
                self.heap.bytes_allocated = (self.heap.bytes_allocated as isize
                    - new_size as isize
                    + old_size as isize) as usize;
                let oom = self.oom_error;
                if self.fiber.is_not_null() {
                    let mut fiber = self.fiber;
                    fiber.set_error(oom);
                }
                return std::ptr::null_mut();
            }
        }
        if mem.is_null() {
            return std::ptr::null_mut();
        }

        let header = mem.cast::<ChunkHeader>();
        (*header).size = new_size;
        header.add(1).cast::<u8>()
    }

    pub(crate) unsafe fn allocate<T>(&mut self) -> *mut T {
        self.reallocate(std::ptr::null_mut(), std::mem::size_of::<T>())
            .cast()
    }

    /// Allocates a `T` with `extra` payload bytes inline after it, for the
    /// object kinds with flexible tails (strings, instances, closures,
    /// foreign buffers).
    pub(crate) unsafe fn allocate_flex<T>(&mut self, extra: usize) -> *mut T {
        self.reallocate(std::ptr::null_mut(), std::mem::size_of::<T>() + extra)
            .cast()
    }

    pub(crate) unsafe fn allocate_array<T>(&mut self, count: usize) -> *mut T {
        self.reallocate(std::ptr::null_mut(), count * std::mem::size_of::<T>())
            .cast()
    }

    pub(crate) unsafe fn deallocate(&mut self, ptr: *mut u8) {
        if !ptr.is_null() {
            self.reallocate(ptr, 0);
        }
    }

    /// Stamps a freshly allocated object's header and chains it into the
    /// all-objects list.
    pub(crate) unsafe fn link_obj(&mut self, obj: *mut ObjHeader, kind: ObjKind, class: Gc<ObjClass>) {
        (*obj).kind = kind;
        (*obj).is_dark = false;
        (*obj).class_obj = class;
        (*obj).next = self.heap.first;
        self.heap.first = obj;
    }

    /// Marks `obj` as a root so it survives collections triggered before it
    /// becomes reachable. Strict LIFO discipline with [`Runtime::pop_root`].
    pub fn push_root(&mut self, obj: Gc<ObjHeader>) {
        debug_assert!(obj.is_not_null(), "can't root null");
        debug_assert!(
            self.heap.num_temp_roots < MAX_TEMP_ROOTS,
            "too many temporary roots"
        );
        self.heap.temp_roots[self.heap.num_temp_roots] = obj;
        self.heap.num_temp_roots += 1;
    }

    pub fn pop_root(&mut self) {
        debug_assert!(self.heap.num_temp_roots > 0, "no temporary roots to release");
        self.heap.num_temp_roots -= 1;
    }

    pub fn collect_garbage(&mut self) {
        debug_assert!(!self.heap.collecting);
        self.heap.collecting = true;

        log_if!(
            self.options.verbose_gc,
            "-- gc -- initiating cycle at {} bytes allocated",
            self.heap.bytes_allocated
        );
        let before = self.heap.bytes_allocated;

        // Mark all reachable objects, roots first.

        let modules = self.modules;
        if modules.is_not_null() {
            self.gray_obj(modules.cast());
        }

        for i in 0..self.heap.num_temp_roots {
            let root = self.heap.temp_roots[i];
            self.gray_obj(root);
        }

        let fiber = self.fiber;
        if fiber.is_not_null() {
            self.gray_obj(fiber.cast());
        }

        let mut handle = self.handles;
        while !handle.is_null() {
            unsafe {
                self.gray_value((*handle).value);
                handle = (*handle).next;
            }
        }

        // Whatever the compiler has in flight (if a compile is in progress).
        for i in 0..self.compiler_scratch.len() {
            let value = self.compiler_scratch[i];
            self.gray_value(value);
        }

        // The method-name table interns its strings outside the managed
        // heap, so there is nothing to mark for it. The preallocated
        // out-of-memory error is a heap string, though.
        let oom = self.oom_error;
        self.gray_value(oom);

        // Now that the roots are gray, do a depth-first search over all of
        // the reachable objects.
        self.blacken_objects();

        // Collect the white objects.
        unsafe {
            let mut obj: *mut *mut ObjHeader = &mut self.heap.first;
            while !(*obj).is_null() {
                if !(**obj).is_dark {
                    // This object wasn't reached, so unlink and free it.
                    let unreached = *obj;
                    *obj = (*unreached).next;
                    self.free_obj(unreached);
                } else {
                    // This object was reached; unmark it for the next cycle
                    // and move on.
                    (**obj).is_dark = false;
                    obj = &mut (**obj).next;
                }
            }
        }

        // The next collection point is the live size plus a configured
        // percentage of it, floored at the minimum heap size.
        let mut next_gc = self.heap.bytes_allocated
            + self.heap.bytes_allocated * self.options.heap_growth_percent / 100;
        if next_gc < self.options.min_heap_size {
            next_gc = self.options.min_heap_size;
        }
        self.heap.next_gc = next_gc;
        self.heap.collecting = false;

        log_if!(
            self.options.verbose_gc,
            "-- gc -- {} before, {} after ({} collected), next at {}",
            before,
            self.heap.bytes_allocated,
            before - self.heap.bytes_allocated.min(before),
            self.heap.next_gc
        );
    }

    /// Marks `obj` reachable and queues it for tracing.
    pub(crate) fn gray_obj(&mut self, obj: Gc<ObjHeader>) {
        if obj.is_null() {
            return;
        }
        unsafe {
            if (*obj.raw()).is_dark {
                return;
            }
            (*obj.raw()).is_dark = true;
        }
        self.heap.gray.push(obj);
    }

    pub(crate) fn gray_value(&mut self, value: Value) {
        if value.is_obj() {
            self.gray_obj(value.as_obj());
        }
    }

    /// Processes the gray stack until every reachable object has been
    /// traced.
    fn blacken_objects(&mut self) {
        while let Some(obj) = self.heap.gray.pop() {
            self.blacken(obj);
        }
    }

    fn blacken(&mut self, obj: Gc<ObjHeader>) {
        // Every object keeps its class alive; the kind decides the rest.
        let class: Gc<ObjHeader> = obj.class_obj.cast();
        self.gray_obj(class);

        unsafe {
            match obj.kind {
                ObjKind::Class => {
                    let class: Gc<ObjClass> = obj.cast();
                    self.gray_obj(class.superclass.cast());
                    self.gray_obj(class.name.cast());
                    let blocks: Vec<Gc<ObjClosure>> = class
                        .methods
                        .values()
                        .filter_map(|method| match method {
                            Method::Block(closure) => Some(*closure),
                            _ => None,
                        })
                        .collect();
                    for closure in blocks {
                        self.gray_obj(closure.cast());
                    }
                }
                ObjKind::Closure => {
                    let closure: Gc<ObjClosure> = obj.cast();
                    self.gray_obj(closure.fn_obj.cast());
                    for i in 0..closure.fn_obj.num_upvalues {
                        self.gray_obj(closure.upvalue(i).cast());
                    }
                }
                ObjKind::Fiber => {
                    let fiber: Gc<ObjFiber> = obj.cast();

                    // The call frames' closures.
                    for i in 0..fiber.num_frames {
                        self.gray_obj((*fiber.frames.add(i)).closure.cast());
                    }

                    // The live part of the value stack.
                    let mut slot = fiber.stack;
                    while slot < fiber.stack_top {
                        self.gray_value(*slot);
                        slot = slot.add(1);
                    }

                    // The open upvalues.
                    let mut upvalue = fiber.open_upvalues;
                    while !upvalue.is_null() {
                        self.gray_obj(Gc::from_raw(upvalue).cast());
                        upvalue = (*upvalue).next;
                    }

                    self.gray_obj(fiber.caller.cast());
                    self.gray_value(fiber.error);
                }
                ObjKind::Fn => {
                    let fn_obj: Gc<ObjFn> = obj.cast();
                    for i in 0..fn_obj.constants.count() {
                        self.gray_value(fn_obj.constants[i]);
                    }
                    self.gray_obj(fn_obj.module.cast());
                }
                ObjKind::Foreign => {}
                ObjKind::Instance => {
                    let instance: Gc<ObjInstance> = obj.cast();
                    for i in 0..instance.num_fields() {
                        self.gray_value(instance.field(i));
                    }
                }
                ObjKind::List => {
                    let list: Gc<ObjList> = obj.cast();
                    for i in 0..list.elements.count() {
                        self.gray_value(list.elements[i]);
                    }
                }
                ObjKind::Map => {
                    let map: Gc<ObjMap> = obj.cast();
                    for i in 0..map.capacity {
                        let entry = &*map.entries.add(i);
                        if entry.key.is_undefined() {
                            continue;
                        }
                        self.gray_value(entry.key);
                        self.gray_value(entry.value);
                    }
                }
                ObjKind::Module => {
                    let module: Gc<ObjModule> = obj.cast();
                    for i in 0..module.variables.count() {
                        self.gray_value(module.variables[i]);
                    }
                    self.gray_obj(module.name.cast());
                }
                ObjKind::Range => {}
                ObjKind::String => {}
                ObjKind::Upvalue => {
                    let upvalue: Gc<ObjUpvalue> = obj.cast();
                    self.gray_value(upvalue.closed);
                }
            }
        }
    }

    /// Releases all memory owned by `obj`, including `obj` itself. Foreign
    /// objects see their finalizer first.
    pub(crate) unsafe fn free_obj(&mut self, obj: *mut ObjHeader) {
        match (*obj).kind {
            ObjKind::Class => {
                let class = obj.cast::<ObjClass>();
                std::ptr::drop_in_place(std::ptr::addr_of_mut!((*class).methods));
            }
            ObjKind::Fiber => {
                let fiber = obj.cast::<ObjFiber>();
                self.deallocate((*fiber).stack.cast());
                self.deallocate((*fiber).frames.cast());
            }
            ObjKind::Fn => {
                let fn_obj = obj.cast::<ObjFn>();
                let mut code = std::ptr::read(std::ptr::addr_of!((*fn_obj).code));
                code.clear(self);
                let mut constants = std::ptr::read(std::ptr::addr_of!((*fn_obj).constants));
                constants.clear(self);
                let mut lines =
                    std::ptr::read(std::ptr::addr_of!((*fn_obj).debug.source_lines));
                lines.clear(self);
                std::ptr::drop_in_place(std::ptr::addr_of_mut!((*fn_obj).debug.name));
            }
            ObjKind::Foreign => {
                self.finalize_foreign(obj.cast::<ObjForeign>());
            }
            ObjKind::List => {
                let list = obj.cast::<ObjList>();
                let mut elements = std::ptr::read(std::ptr::addr_of!((*list).elements));
                elements.clear(self);
            }
            ObjKind::Map => {
                let map = obj.cast::<ObjMap>();
                self.deallocate((*map).entries.cast());
            }
            ObjKind::Module => {
                let module = obj.cast::<ObjModule>();
                let mut variables = std::ptr::read(std::ptr::addr_of!((*module).variables));
                variables.clear(self);
                std::ptr::drop_in_place(std::ptr::addr_of_mut!((*module).variable_names));
            }
            ObjKind::Closure
            | ObjKind::Instance
            | ObjKind::Range
            | ObjKind::String
            | ObjKind::Upvalue => {}
        }
        self.deallocate(obj.cast());
    }

    /// Invokes a swept foreign object's finalizer, if its class bound one.
    unsafe fn finalize_foreign(&mut self, foreign: *mut ObjForeign) {
        let symbol = match self.method_names.find("<finalize>") {
            Some(symbol) => symbol,
            None => return,
        };
        let class = (*foreign).obj.class_obj;
        if class.is_null() {
            return;
        }
        if let Some(Method::Finalizer(finalize)) = class.lookup_method(symbol) {
            finalize((*foreign).data_ptr().cast());
        }
    }
}
