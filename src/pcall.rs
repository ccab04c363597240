//! Protected calls (`pcall`/`xpcall`): catches a recoverable
//! `RuntimeError` raised anywhere inside `callee`, however deep into
//! recursive script calls, and restores the interpreter to the state it was
//! in just before the call.
//!
//! The actual unwind is the Rust call stack: `Interpreter::call_value` drives
//! the dispatch loop recursively, so a `RuntimeError` returned from deep
//! inside naturally propagates straight back here without any explicit
//! stack-walking. What's left to clean up by hand is the *interpreter's own*
//! frame stack and register high-water mark, since the frames a failed call
//! pushed were never popped by a `RETURN` that never ran.

use crate::error::RuntimeError;
use crate::value::Value;
use crate::vm::Interpreter;

impl Interpreter {
    /// Calls `callee(args)`, unwinding the interpreter back to its
    /// pre-call state if it raises. A `RuntimeError::Halt` still propagates
    /// unchanged — it means the interpreter itself cannot continue, which no
    /// protected call can paper over; only `Recoverable` is meant to be
    /// caught here (the caller in `crate::stdlib::base` checks which).
    pub fn protected_call(&mut self, callee: Value, args: Vec<Value>, line: u32) -> Result<Vec<Value>, RuntimeError> {
        let depth = self.frame_depth();
        let top = self.register_top();
        match self.call_value(callee, args, line) {
            Ok(vals) => Ok(vals),
            Err(err) => {
                self.unwind_frames(depth, top);
                Err(err)
            }
        }
    }

    /// `xpcall(f, handler, ...)`: like `protected_call`, but a recoverable
    /// error is first passed through `handler` before unwinding, so the
    /// handler can still see the failing call's frame-local context if it
    /// does `debug`-style introspection. The handler's own errors replace
    /// the original. `RuntimeError::Halt` from either `callee` or `handler`
    /// still propagates unchanged.
    pub fn protected_call_with_handler(&mut self, callee: Value, args: Vec<Value>, handler: Value, line: u32) -> Result<Vec<Value>, RuntimeError> {
        match self.protected_call(callee, args, line) {
            Ok(vals) => Ok(vals),
            Err(RuntimeError::Recoverable(obj)) => {
                let depth = self.frame_depth();
                let top = self.register_top();
                match self.call_value(handler, vec![obj.into_value()], line) {
                    Ok(vals) => Err(RuntimeError::thrown(vals.into_iter().next().unwrap_or(Value::Nil))),
                    Err(err) => {
                        self.unwind_frames(depth, top);
                        Err(err)
                    }
                }
            }
            Err(halt) => Err(halt),
        }
    }
}
