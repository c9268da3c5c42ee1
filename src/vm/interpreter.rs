/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! The bytecode dispatch loop.
//!
//! One `loop`-over-`match` — the portable equivalent of a threaded
//! dispatcher, which Rust's toolchain has no computed goto to build.
//! The hot frame state (instruction pointer, frame base, current function)
//! is held in locals and spilled to the frame only around operations that
//! can switch frames or fibers, mirroring the register discipline the
//! semantics below assume.

use crate::api::ForeignCallScope;
use crate::gc::ptr::Gc;
use crate::vm::class::Method;
use crate::vm::fiber::{CallFrame, FiberState, ObjFiber};
use crate::vm::function::ObjClosure;
use crate::vm::instance::ObjInstance;
use crate::vm::opcodes::Op;
use crate::vm::value::Value;
use crate::vm::{ForeignMethodFn, InterpretResult, Runtime};

/// Invokes a foreign method: the caller's frame window is swapped for one
/// starting at the arguments, the host function runs to completion, and the
/// stack is trimmed so slot 0 holds the return value.
pub(crate) fn call_foreign(
    vm: &mut Runtime,
    mut fiber: Gc<ObjFiber>,
    foreign: ForeignMethodFn,
    num_args: usize,
) {
    let args = unsafe { fiber.stack_top.sub(num_args) };
    let scope = ForeignCallScope::enter(vm, fiber, args);
    foreign(vm);

    // Discard the stack slots for the arguments and temporaries but leave
    // one for the result.
    unsafe {
        fiber.stack_top = fiber.stack_base.add(1);
    }
    drop(scope);
}

impl Runtime {
    /// Runs `fiber` until it completes, errors without a catcher, or a
    /// primitive suspends execution entirely.
    pub fn run_interpreter(&mut self, fiber: Gc<ObjFiber>) -> InterpretResult {
        let vm: &mut Runtime = self;

        debug_assert!(fiber.is_not_null() && fiber.num_frames > 0);
        debug_assert!(!fiber.has_error());

        // Remember the fiber so the collector can find it.
        vm.fiber = fiber;
        let mut fiber = fiber;
        fiber.state = FiberState::Root;

        unsafe {
            // Hoisted registers of the dispatch loop. They are reloaded from
            // the frame whenever the frame or fiber may have changed, and
            // spilled back before anything that needs the frame current.
            let mut frame: *mut CallFrame = std::ptr::null_mut();
            let mut stack_start: *mut Value = std::ptr::null_mut();
            let mut ip: *mut u8 = std::ptr::null_mut();
            let mut closure: Gc<ObjClosure> = Gc::null();

            macro_rules! read_byte {
                () => {{
                    let byte = *ip;
                    ip = ip.add(1);
                    byte
                }};
            }

            macro_rules! read_short {
                () => {{
                    let short = ((*ip as usize) << 8) | (*ip.add(1) as usize);
                    ip = ip.add(2);
                    short
                }};
            }

            macro_rules! store_frame {
                () => {
                    (*frame).ip = ip;
                };
            }

            macro_rules! load_frame {
                () => {
                    frame = fiber.frames.add(fiber.num_frames - 1);
                    stack_start = (*frame).stack_start;
                    ip = (*frame).ip;
                    closure = (*frame).closure;
                };
            }

            load_frame!();

            'run: loop {
                // The caller must have spilled the frame already; a stale
                // frame pointer cannot be written through here because the
                // erroring operation may have grown the frame array.
                macro_rules! runtime_error {
                    () => {{
                        vm.handle_runtime_error();
                        if vm.fiber.is_null() {
                            return InterpretResult::RuntimeError;
                        }
                        fiber = vm.fiber;
                        load_frame!();
                        continue 'run;
                    }};
                }

                // Shared tail of the method call opcodes, dispatching on the
                // method table entry's kind. The frame is spilled up front:
                // a primitive may push a call frame (growing the frame
                // array) or switch fibers, and the error walker reads the
                // saved instruction pointer for stack traces.
                macro_rules! complete_call {
                    ($num_args:expr, $symbol:expr, $class_obj:expr) => {{
                        let num_args: usize = $num_args;
                        let symbol: usize = $symbol;
                        let class_obj = $class_obj;
                        let args = fiber.stack_top.sub(num_args);
                        store_frame!();

                        let method = if class_obj.is_not_null() {
                            class_obj.lookup_method(symbol)
                        } else {
                            None
                        };
                        match method {
                            Some(Method::Primitive(primitive)) => {
                                if primitive(vm, args) {
                                    // The result is in the first arg slot;
                                    // discard the other stack slots.
                                    fiber.drop_values(num_args - 1);
                                } else {
                                    // An error, fiber switch, or call frame
                                    // change occurred.

                                    // If there is no fiber to switch to,
                                    // stop interpreting.
                                    fiber = vm.fiber;
                                    if fiber.is_null() {
                                        return InterpretResult::Success;
                                    }
                                    if fiber.has_error() {
                                        runtime_error!();
                                    }
                                    load_frame!();
                                }
                            }
                            Some(Method::Foreign(foreign)) => {
                                call_foreign(vm, fiber, foreign, num_args);
                                if fiber.has_error() {
                                    runtime_error!();
                                }
                                load_frame!();
                            }
                            Some(Method::Block(body)) => {
                                fiber.call_function(vm, body, num_args);
                                load_frame!();
                            }
                            Some(Method::Finalizer(_)) | None => {
                                vm.method_not_found(class_obj, symbol);
                                runtime_error!();
                            }
                        }
                    }};
                }

                let op = Op::from_u8(read_byte!());
                match op {
                    Op::Constant => {
                        let constant = read_short!();
                        fiber.push(closure.fn_obj.constants[constant]);
                    }
                    Op::Null => fiber.push(Value::null()),
                    Op::False => fiber.push(Value::false_()),
                    Op::True => fiber.push(Value::true_()),

                    Op::LoadLocal0 => fiber.push(*stack_start),
                    Op::LoadLocal1 => fiber.push(*stack_start.add(1)),
                    Op::LoadLocal2 => fiber.push(*stack_start.add(2)),
                    Op::LoadLocal3 => fiber.push(*stack_start.add(3)),
                    Op::LoadLocal4 => fiber.push(*stack_start.add(4)),
                    Op::LoadLocal5 => fiber.push(*stack_start.add(5)),
                    Op::LoadLocal6 => fiber.push(*stack_start.add(6)),
                    Op::LoadLocal7 => fiber.push(*stack_start.add(7)),
                    Op::LoadLocal8 => fiber.push(*stack_start.add(8)),

                    Op::LoadLocal => {
                        let slot = read_byte!() as usize;
                        fiber.push(*stack_start.add(slot));
                    }
                    Op::StoreLocal => {
                        let slot = read_byte!() as usize;
                        *stack_start.add(slot) = fiber.peek();
                    }

                    Op::LoadUpvalue => {
                        let index = read_byte!() as usize;
                        fiber.push(*closure.upvalue(index).value);
                    }
                    Op::StoreUpvalue => {
                        let index = read_byte!() as usize;
                        *closure.upvalue(index).value = fiber.peek();
                    }

                    Op::LoadModuleVar => {
                        let symbol = read_short!();
                        fiber.push(closure.fn_obj.module.variables[symbol]);
                    }
                    Op::StoreModuleVar => {
                        let symbol = read_short!();
                        let mut module = closure.fn_obj.module;
                        module.variables[symbol] = fiber.peek();
                    }

                    Op::LoadFieldThis => {
                        let field = read_byte!() as usize;
                        let receiver = *stack_start;
                        debug_assert!(receiver.is_instance(), "receiver should be instance");
                        let instance: Gc<ObjInstance> = receiver.as_instance();
                        fiber.push(instance.field(field));
                    }
                    Op::StoreFieldThis => {
                        let field = read_byte!() as usize;
                        let receiver = *stack_start;
                        debug_assert!(receiver.is_instance(), "receiver should be instance");
                        let mut instance = receiver.as_instance();
                        instance.set_field(field, fiber.peek());
                    }
                    Op::LoadField => {
                        let field = read_byte!() as usize;
                        let receiver = fiber.pop();
                        debug_assert!(receiver.is_instance(), "receiver should be instance");
                        let instance = receiver.as_instance();
                        fiber.push(instance.field(field));
                    }
                    Op::StoreField => {
                        let field = read_byte!() as usize;
                        let receiver = fiber.pop();
                        debug_assert!(receiver.is_instance(), "receiver should be instance");
                        let mut instance = receiver.as_instance();
                        instance.set_field(field, fiber.peek());
                    }

                    Op::Pop => {
                        fiber.pop();
                    }

                    _ if op.is_call() => {
                        let num_args = op as usize - Op::Call0 as usize + 1;
                        let symbol = read_short!();
                        let args = fiber.stack_top.sub(num_args);
                        let class_obj = vm.class_of(*args);
                        complete_call!(num_args, symbol, class_obj);
                    }

                    _ if op.is_super_call() => {
                        let num_args = op as usize - Op::Super0 as usize + 1;
                        let symbol = read_short!();

                        // The superclass is stored in a constant slot patched
                        // in when the method was bound.
                        let constant = read_short!();
                        let superclass = closure.fn_obj.constants[constant].as_class();
                        complete_call!(num_args, symbol, superclass);
                    }

                    Op::Jump => {
                        let offset = read_short!();
                        ip = ip.add(offset);
                    }
                    Op::Loop => {
                        let offset = read_short!();
                        ip = ip.sub(offset);
                    }
                    Op::JumpIf => {
                        let offset = read_short!();
                        let condition = fiber.pop();
                        if condition.is_falsy() {
                            ip = ip.add(offset);
                        }
                    }
                    Op::And => {
                        let offset = read_short!();
                        let condition = fiber.peek();
                        if condition.is_falsy() {
                            // Short-circuit the right hand side.
                            ip = ip.add(offset);
                        } else {
                            // Discard the condition and evaluate the right
                            // hand side.
                            fiber.pop();
                        }
                    }
                    Op::Or => {
                        let offset = read_short!();
                        let condition = fiber.peek();
                        if condition.is_falsy() {
                            fiber.pop();
                        } else {
                            ip = ip.add(offset);
                        }
                    }

                    Op::CloseUpvalue => {
                        let top = fiber.stack_top.sub(1);
                        fiber.close_upvalues(top);
                        fiber.pop();
                    }

                    Op::Return => {
                        let result = fiber.pop();
                        fiber.num_frames -= 1;

                        // Close any upvalues still in scope.
                        fiber.close_upvalues(stack_start);

                        if fiber.num_frames == 0 {
                            // The fiber is complete. See if there is another
                            // fiber to return to; if not, we're done.
                            if fiber.caller.is_null() {
                                // Store the final result at the beginning of
                                // the stack so the slot API can find it.
                                *fiber.stack = result;
                                fiber.stack_top = fiber.stack.add(1);
                                return InterpretResult::Success;
                            }

                            let resuming = fiber.caller;
                            fiber.caller = Gc::null();
                            vm.fiber = resuming;

                            // Store the result in the resuming fiber.
                            *resuming.stack_top.sub(1) = result;
                            fiber = resuming;
                        } else {
                            // Store the result of the block in the first slot
                            // of the frame, which is where the caller expects
                            // it, and discard the rest of the call frame.
                            *stack_start = result;
                            fiber.stack_top = stack_start.add(1);
                        }
                        load_frame!();
                    }

                    Op::Construct => {
                        debug_assert!((*stack_start).is_class(), "expected class in slot zero");
                        let class = (*stack_start).as_class();
                        let instance = ObjInstance::new(vm, class);
                        *stack_start = Value::from_obj(instance.cast());
                    }
                    Op::ForeignConstruct => {
                        debug_assert!((*stack_start).is_class(), "expected class in slot zero");
                        store_frame!();
                        vm.create_foreign(fiber, stack_start);
                        if fiber.has_error() {
                            runtime_error!();
                        }
                        // The allocator may have grown the stack.
                        load_frame!();
                    }

                    Op::Closure => {
                        let constant = read_short!();
                        let function = closure.fn_obj.constants[constant].as_fn();
                        let created = ObjClosure::new(vm, function);
                        fiber.push(Value::from_obj(created.cast()));

                        // Capture upvalues, one pair of operand bytes each.
                        for i in 0..function.num_upvalues {
                            let is_local = read_byte!();
                            let index = read_byte!() as usize;
                            let mut created = created;
                            if is_local != 0 {
                                // Make an new upvalue to close over the
                                // parent's local variable.
                                let upvalue = ObjFiber::capture_upvalue(
                                    &mut fiber,
                                    vm,
                                    stack_start.add(index),
                                );
                                created.set_upvalue(i, upvalue);
                            } else {
                                // Use the same upvalue as the current call
                                // frame.
                                created.set_upvalue(i, closure.upvalue(index));
                            }
                        }
                    }

                    Op::Class => {
                        let num_fields = read_byte!() as i32;
                        store_frame!();
                        vm.create_class(num_fields, Gc::null());
                        if fiber.has_error() {
                            runtime_error!();
                        }
                    }
                    Op::ForeignClass => {
                        let module = closure.fn_obj.module;
                        store_frame!();
                        vm.create_class(-1, module);
                        if fiber.has_error() {
                            runtime_error!();
                        }
                    }

                    Op::MethodInstance | Op::MethodStatic => {
                        let symbol = read_short!();
                        let class = fiber.peek().as_class();
                        let method = fiber.peek2();
                        let module = closure.fn_obj.module;
                        store_frame!();
                        vm.bind_method(op == Op::MethodStatic, symbol, module, class, method);
                        if fiber.has_error() {
                            runtime_error!();
                        }
                        fiber.pop();
                        fiber.pop();
                    }

                    Op::EndModule => {
                        vm.last_module = closure.fn_obj.module;
                        fiber.push(Value::null());
                    }

                    Op::ImportModule => {
                        // Leave the closure (or cached module) on the stack
                        // so a collection during the call below can find it.
                        let constant = read_short!();
                        let name = closure.fn_obj.constants[constant];
                        store_frame!();
                        let result = vm.import_module(name);
                        fiber.push(result);
                        if fiber.has_error() {
                            runtime_error!();
                        }

                        if result.is_closure() {
                            // The module body has to run; call it.
                            store_frame!();
                            let body = result.as_closure();
                            fiber.call_function(vm, body, 1);
                            load_frame!();
                        } else {
                            // The module is already loaded; remember it so
                            // variables can be imported from it.
                            vm.last_module = result.as_module();
                        }
                    }

                    Op::ImportVariable => {
                        let constant = read_short!();
                        let name = closure.fn_obj.constants[constant];
                        debug_assert!(
                            vm.last_module.is_not_null(),
                            "should have already imported module"
                        );
                        let last_module = vm.last_module;
                        store_frame!();
                        let result = vm.get_module_variable(last_module, name);
                        if fiber.has_error() {
                            runtime_error!();
                        }
                        fiber.push(result);
                    }

                    Op::End => {
                        // A sentinel after the final return; executing it is
                        // a bug in the bytecode.
                        debug_assert!(false, "executed END opcode");
                        return InterpretResult::RuntimeError;
                    }

                    _ => {
                        debug_assert!(false, "unhandled opcode {:?}", op);
                        return InterpretResult::RuntimeError;
                    }
                }
            }
        }
    }
}
