//! Call frames: one per active script call, forming the interpreter's own
//! call stack (never the OS stack, so deep script recursion fails with a
//! recoverable error rather than a segfault).
//!
//! Registers themselves (`crate::vm::Interpreter::registers`) are the
//! source of truth for upvalue aliasing: each slot is a shared
//! `Rc<RefCell<Value>>` cell, so capturing a local for a closure is just
//! cloning the `Rc` already sitting in the register array — no separate
//! open-upvalue bookkeeping is needed here. `CLOSE` detaches a scope's
//! locals from future reuse by replacing those slots with fresh cells.

use std::rc::Rc;

use crate::value::{ScriptClosure, Value};

/// One activation record. Registers live in the interpreter's shared
/// register file at `[base, base + proto.max_stack_size)`; `Frame` itself
/// only tracks the window and bookkeeping state.
#[derive(Debug)]
pub struct Frame {
    pub closure: Rc<ScriptClosure>,
    /// Index into the interpreter's register file where this frame's
    /// register window begins.
    pub base: usize,
    /// Program counter: index of the next instruction to execute.
    pub pc: u32,
    /// Extra arguments beyond `proto.num_params` when the function is
    /// vararg and the call passed more. Read by `VARARG`.
    pub varargs: Vec<Value>,
    /// True if this frame is the target of an active `pcall`/`xpcall` — set
    /// for introspection/tracebacks only. The actual unwind mechanism is the
    /// Rust call stack itself: `crate::pcall` recursively drives the
    /// dispatch loop for a protected call, so a `RuntimeError` naturally
    /// unwinds exactly to the nearest protected call's Rust frame without
    /// this flag needing to be scanned for.
    pub is_protected_boundary: bool,
    /// Absolute register the caller wants this frame's return values
    /// written to, and how many (`CALL`'s `C` field: 0 = all). Meaningless
    /// for a frame pushed as a `drive()` boundary (top-level call, `pcall`'s
    /// protected call, a coroutine's entry) — those deliver results back to
    /// Rust, not to a caller's register window.
    pub caller_dest: usize,
    pub caller_want: u8,
}

impl Frame {
    pub fn new(closure: Rc<ScriptClosure>, base: usize) -> Self {
        Self { closure, base, pc: 0, varargs: Vec::new(), is_protected_boundary: false, caller_dest: base, caller_want: 1 }
    }
}
