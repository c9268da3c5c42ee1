/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */
use crate::gc::buffer::power_of_2_ceil;
use crate::gc::ptr::Gc;
use crate::vm::function::{ObjClosure, ObjUpvalue};
use crate::vm::object::{ObjHeader, ObjKind};
use crate::vm::value::Value;
use crate::vm::Runtime;

const DEFAULT_FRAME_CAPACITY: usize = 4;
const DEFAULT_STACK_CAPACITY: usize = 16;

#[derive(Copy, Clone)]
pub struct CallFrame {
    /// Pointer to the current (really next-to-be-executed) instruction in
    /// the function's bytecode.
    pub ip: *mut u8,

    /// The closure being executed.
    pub closure: Gc<ObjClosure>,

    /// Pointer to the first stack slot used by this call frame. This holds
    /// the receiver, followed by the function's parameters, then local
    /// variables and temporaries.
    pub stack_start: *mut Value,
}

/// Tracks how this fiber has been invoked, aside from the ways that can be
/// detected from the state of other fields in the fiber.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FiberState {
    /// The fiber is being run from another fiber using a call to `try()`.
    Try,

    /// The fiber was directly invoked by the interpreter entry point.
    Root,

    /// The fiber is invoked some other way. If `caller` is null then the
    /// fiber was invoked using `call()`. If `num_frames` is zero, then the
    /// fiber has finished running and is done. If `num_frames` is one and
    /// that frame's `ip` points to the first byte of code, the fiber has not
    /// been started yet.
    Other,
}

#[repr(C)]
pub struct ObjFiber {
    pub obj: ObjHeader,

    /// The stack of value slots, holding locals and temporaries while the
    /// fiber is executing. Heap-allocated and grown as needed.
    pub stack: *mut Value,

    /// The first slot of the window the foreign API addresses.
    pub stack_base: *mut Value,

    /// One past the top-most value on the stack.
    pub stack_top: *mut Value,

    pub stack_capacity: usize,

    /// The stack of call frames, grown as needed but never shrunk.
    pub frames: *mut CallFrame,
    pub num_frames: usize,
    pub frame_capacity: usize,

    /// The first node in the list of open upvalues pointing to values still
    /// on the stack. The head is the upvalue closest to the top of the
    /// stack, and the list works downward.
    pub open_upvalues: *mut ObjUpvalue,

    /// The fiber that ran this one. If this fiber is yielded, control
    /// resumes to this one. May be null.
    pub caller: Gc<ObjFiber>,

    /// If the fiber failed because of a runtime error, this contains the
    /// error value. Otherwise it is `null`.
    pub error: Value,

    pub state: FiberState,
}

impl ObjFiber {
    /// Creates a new fiber that will invoke `closure`, which may be null for
    /// a fiber the foreign API drives directly.
    pub fn new(vm: &mut Runtime, closure: Gc<ObjClosure>) -> Gc<ObjFiber> {
        // Allocate the arrays before the fiber in case either triggers a
        // collection.
        let frame_capacity = DEFAULT_FRAME_CAPACITY;
        let frames = unsafe { vm.allocate_array::<CallFrame>(frame_capacity) };

        // Add one slot for the implicit receiver slot every function has.
        let stack_capacity = if closure.is_null() {
            DEFAULT_STACK_CAPACITY
        } else {
            power_of_2_ceil(closure.fn_obj.max_slots + 1)
        };
        let stack = unsafe { vm.allocate_array::<Value>(stack_capacity) };

        let mut fiber = unsafe {
            let ptr = vm.allocate::<ObjFiber>();
            (*ptr).stack = stack;
            (*ptr).stack_base = stack;
            (*ptr).stack_top = stack;
            (*ptr).stack_capacity = stack_capacity;
            (*ptr).frames = frames;
            (*ptr).num_frames = 0;
            (*ptr).frame_capacity = frame_capacity;
            (*ptr).open_upvalues = std::ptr::null_mut();
            (*ptr).caller = Gc::null();
            (*ptr).error = Value::null();
            (*ptr).state = FiberState::Other;
            let class = vm.fiber_class;
            vm.link_obj(ptr.cast::<ObjHeader>(), ObjKind::Fiber, class);
            Gc::from_raw(ptr)
        };

        if closure.is_not_null() {
            // Initialize the first call frame.
            let stack_ptr = fiber.stack;
            fiber.append_frame(closure, stack_ptr);

            // The first slot always holds the closure.
            fiber.push(Value::from_obj(closure.cast()));
        }

        fiber
    }

    pub fn has_error(&self) -> bool {
        !self.error.is_null()
    }

    pub fn set_error(&mut self, error: Value) {
        // Do not clobber a previous error; it stays until the catching
        // frame observes it.
        if self.has_error() {
            return;
        }
        self.error = error;
    }

    pub fn stack_size(&self) -> usize {
        (self.stack_top as usize - self.stack as usize) / std::mem::size_of::<Value>()
    }

    /// The number of slots visible to the foreign API.
    pub fn frame_size(&self) -> usize {
        (self.stack_top as usize - self.stack_base as usize) / std::mem::size_of::<Value>()
    }

    pub fn is_done(&self) -> bool {
        self.num_frames == 0
    }

    pub fn push(&mut self, value: Value) {
        debug_assert!(self.stack_size() < self.stack_capacity);
        unsafe {
            self.stack_top.write(value);
            self.stack_top = self.stack_top.add(1);
        }
    }

    pub fn pop(&mut self) -> Value {
        debug_assert!(self.stack_top > self.stack);
        unsafe {
            self.stack_top = self.stack_top.sub(1);
            self.stack_top.read()
        }
    }

    pub fn drop_values(&mut self, count: usize) {
        unsafe {
            self.stack_top = self.stack_top.sub(count);
        }
    }

    pub fn peek(&self) -> Value {
        unsafe { self.stack_top.sub(1).read() }
    }

    pub fn peek2(&self) -> Value {
        unsafe { self.stack_top.sub(2).read() }
    }

    /// Reads `slot` from the window visible to the foreign API.
    pub fn get_slot(&self, slot: usize) -> Value {
        debug_assert!(slot < self.frame_size(), "not that many slots");
        unsafe { self.stack_base.add(slot).read() }
    }

    pub fn set_slot(&mut self, slot: usize, value: Value) {
        debug_assert!(slot < self.frame_size(), "not that many slots");
        unsafe {
            self.stack_base.add(slot).write(value);
        }
    }

    /// Ensures the fiber's stack can hold at least `needed` slots.
    ///
    /// If the reallocation moves the stack, every pointer into the old
    /// array is recalculated to the same relative distance in the new one:
    /// each frame's `stack_start`, each open upvalue's referent,
    /// `stack_base`, and `stack_top`.
    pub fn ensure_stack(&mut self, vm: &mut Runtime, needed: usize) {
        if self.stack_capacity >= needed {
            return;
        }

        let new_capacity = power_of_2_ceil(needed);
        unsafe {
            let old_stack = self.stack;
            self.stack = vm
                .reallocate(
                    self.stack.cast::<u8>(),
                    new_capacity * std::mem::size_of::<Value>(),
                )
                .cast::<Value>();
            self.stack_capacity = new_capacity;

            // Pointer subtraction is only well-defined within one array, so
            // rebase via byte offsets.
            if self.stack != old_stack {
                let new_stack = self.stack;
                let rebase = move |ptr: *mut Value| {
                    let offset = ptr as usize - old_stack as usize;
                    (new_stack as usize + offset) as *mut Value
                };

                for i in 0..self.num_frames {
                    let frame = &mut *self.frames.add(i);
                    frame.stack_start = rebase(frame.stack_start);
                }

                let mut upvalue = self.open_upvalues;
                while !upvalue.is_null() {
                    (*upvalue).value = rebase((*upvalue).value);
                    upvalue = (*upvalue).next;
                }

                self.stack_base = rebase(self.stack_base);
                self.stack_top = rebase(self.stack_top);
            }
        }
    }

    fn ensure_frame_capacity(&mut self, vm: &mut Runtime, needed: usize) {
        if self.frame_capacity >= needed {
            return;
        }
        let new_capacity = self.frame_capacity * 2;
        unsafe {
            self.frames = vm
                .reallocate(
                    self.frames.cast::<u8>(),
                    new_capacity * std::mem::size_of::<CallFrame>(),
                )
                .cast::<CallFrame>();
        }
        self.frame_capacity = new_capacity;
    }

    /// Adds a new call frame invoking `closure` whose stack starts at
    /// `stack_start`. The caller must have ensured frame capacity already.
    pub fn append_frame(&mut self, closure: Gc<ObjClosure>, stack_start: *mut Value) {
        debug_assert!(self.num_frames < self.frame_capacity, "no memory for call frame");
        unsafe {
            let frame = &mut *self.frames.add(self.num_frames);
            frame.stack_start = stack_start;
            frame.closure = closure;
            frame.ip = closure.fn_obj.code.as_ptr();
        }
        self.num_frames += 1;
    }

    /// Pushes `closure` onto the callstack to invoke it. Expects `num_args`
    /// arguments (including the receiver) to be on top of the stack already.
    pub fn call_function(&mut self, vm: &mut Runtime, closure: Gc<ObjClosure>, num_args: usize) {
        self.ensure_frame_capacity(vm, self.num_frames + 1);

        let needed = self.stack_size() + closure.fn_obj.max_slots;
        self.ensure_stack(vm, needed);

        let stack_start = unsafe { self.stack_top.sub(num_args) };
        self.append_frame(closure, stack_start);
    }

    /// Grows the API-visible window to `num_slots`, filling fresh slots
    /// with `null`.
    pub fn set_frame_size(&mut self, vm: &mut Runtime, num_slots: usize) {
        let base_offset = (self.stack_base as usize - self.stack as usize)
            / std::mem::size_of::<Value>();
        self.ensure_stack(vm, base_offset + num_slots);

        unsafe {
            let new_top = self.stack_base.add(num_slots);
            let mut slot = self.stack_top;
            while slot < new_top {
                slot.write(Value::null());
                slot = slot.add(1);
            }
            self.stack_top = new_top;
        }
    }

    /// Captures `local` as an upvalue, reusing an existing open upvalue over
    /// the same slot so co-capturing closures share one cell. The list is
    /// kept sorted by slot address, top of stack first.
    pub fn capture_upvalue(this: &mut Gc<ObjFiber>, vm: &mut Runtime, local: *mut Value) -> Gc<ObjUpvalue> {
        // If there are no open upvalues at all, we must need a new one.
        if this.open_upvalues.is_null() {
            let upvalue = ObjUpvalue::new(vm, local);
            this.open_upvalues = upvalue.raw();
            return upvalue;
        }

        unsafe {
            let mut prev_upvalue: *mut ObjUpvalue = std::ptr::null_mut();
            let mut upvalue = this.open_upvalues;

            // Walk towards the bottom of the stack until we find a
            // previously existing upvalue or pass where it should be.
            while !upvalue.is_null() && (*upvalue).value > local {
                prev_upvalue = upvalue;
                upvalue = (*upvalue).next;
            }

            // Found an existing upvalue for this local.
            if !upvalue.is_null() && (*upvalue).value == local {
                return Gc::from_raw(upvalue);
            }

            // Create a new one and link it in the right place to keep the
            // list sorted.
            let mut created = ObjUpvalue::new(vm, local);
            if prev_upvalue.is_null() {
                this.open_upvalues = created.raw();
            } else {
                (*prev_upvalue).next = created.raw();
            }
            created.next = upvalue;
            created
        }
    }

    /// Closes every open upvalue pointing at or above `last`, moving each
    /// referent into the upvalue's own storage.
    pub fn close_upvalues(&mut self, last: *mut Value) {
        unsafe {
            while !self.open_upvalues.is_null() && (*self.open_upvalues).value >= last {
                let upvalue = &mut *self.open_upvalues;
                upvalue.closed = *upvalue.value;
                upvalue.value = &mut upvalue.closed;
                self.open_upvalues = upvalue.next;
            }
        }
    }
}
