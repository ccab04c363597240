//! The bytecode interpreter: register file, call-frame stack, and the main
//! dispatch loop.
//!
//! Registers are `Rc<RefCell<Value>>` cells rather than bare `Value`s, so
//! capturing a local for a closure — `CLOSURE`'s trailing `MOVE`/`GETUPVAL`
//! pseudo-instructions — is just cloning the `Rc` already sitting in the
//! register array, with no separate open-upvalue table to maintain. `CLOSE`
//! and a frame's own `RETURN` detach a scope from future reuse by replacing
//! its slots with fresh cells, so a later loop iteration or sibling call
//! frame reusing the same indices never aliases an earlier capture.
//!
//! `pcall`/`xpcall` and coroutine `resume`/`yield` both drive this same
//! dispatch loop recursively rather than unwinding by hand: see
//! [`Interpreter::drive`].

mod arith;
mod call;
mod forloop;
mod table_access;

use std::cell::RefCell;
use std::rc::Rc;

use q_asm::Opcode;
use tracing::trace;

use crate::coroutine::ResumeSlot;
use crate::error::RuntimeError;
use crate::frame::Frame;
use crate::list::List;
use crate::state::VmOptions;
use crate::value::{NativeClosure, ScriptClosure, Value};

pub(crate) use call::CallStart;

/// What driving the dispatch loop down to some target frame depth produced.
#[derive(Debug)]
pub enum RunOutcome {
    Returned(Vec<Value>),
    Yielded(Vec<Value>),
}

/// Per-instruction dispatch result.
enum Step {
    Continue,
    Done(Vec<Value>),
    Yield(Vec<Value>),
}

/// The register-bytecode interpreter. One `Interpreter` drives the "main"
/// coroutine; the global table and the channel/coroutine object graph are
/// shared (via `Rc`) with every coroutine spawned from scripts running on it.
pub struct Interpreter {
    registers: Vec<Rc<RefCell<Value>>>,
    frames: Vec<Frame>,
    pub globals: Rc<RefCell<List>>,
    top: usize,
    pub options: VmOptions,
    allocated: usize,

    // Native-call plumbing: `NativeFn`'s calling convention.
    native_args: Vec<Value>,
    native_results: Vec<Value>,
    current_native: Vec<Rc<NativeClosure>>,

    // Set by the `coroutine.yield` native just before it returns; consumed
    // by the CALL/TAILCALL handler that invoked it to turn the step into a
    // `Step::Yield` without `NativeFn`'s signature needing to change.
    pending_yield: Option<Vec<Value>>,
    // Where the yielding CALL wanted its eventual resume values delivered;
    // read by `crate::stdlib::coroutine_lib::resume` after a
    // `RunOutcome::Yielded` to restore `ResumeSlot` on the coroutine object.
    yield_resume_slot: Option<ResumeSlot>,
}

impl Interpreter {
    pub fn new(options: VmOptions) -> Self {
        let initial = options.initial_register_file.max(crate::consts::DEFAULT_STACK_SIZE);
        let registers = (0..initial).map(|_| Rc::new(RefCell::new(Value::Nil))).collect();
        Self {
            registers,
            frames: Vec::new(),
            globals: Rc::new(RefCell::new(List::new())),
            top: 0,
            options,
            allocated: 0,
            native_args: Vec::new(),
            native_results: Vec::new(),
            current_native: Vec::new(),
            pending_yield: None,
            yield_resume_slot: None,
        }
    }

    // -- register file --------------------------------------------------------

    fn ensure_registers(&mut self, needed: usize) {
        while self.registers.len() < needed {
            self.registers.push(Rc::new(RefCell::new(Value::Nil)));
        }
    }

    fn reg_get(&self, idx: usize) -> Value {
        self.registers[idx].borrow().clone()
    }

    fn reg_set(&mut self, idx: usize, v: Value) {
        self.ensure_registers(idx + 1);
        *self.registers[idx].borrow_mut() = v;
    }

    /// Replaces a slot with a brand new cell. Any closure that already
    /// captured the old one keeps seeing the old value; nothing written
    /// through this index from now on is visible to that capture.
    fn reg_fresh(&mut self, idx: usize) {
        if idx < self.registers.len() {
            self.registers[idx] = Rc::new(RefCell::new(Value::Nil));
        }
    }

    fn reg_cell(&mut self, idx: usize) -> Rc<RefCell<Value>> {
        self.ensure_registers(idx + 1);
        self.registers[idx].clone()
    }

    fn const_at(&self, frame_idx: usize, idx: u32) -> Value {
        self.frames[frame_idx].closure.proto.constants[idx as usize].clone()
    }

    /// Decodes an `Rk` operand: a tagged constant-pool index or a plain
    /// register index relative to `base`.
    fn rk(&self, frame_idx: usize, base: usize, field: u32) -> Value {
        if q_asm::is_k(field) {
            self.const_at(frame_idx, q_asm::k_index(field))
        } else {
            self.reg_get(base + q_asm::reg_index(field) as usize)
        }
    }

    // -- native argument/result accessors -------------------------

    pub fn arg_count(&self) -> usize {
        self.native_args.len()
    }

    pub fn arg(&self, i: usize) -> Value {
        self.native_args.get(i).cloned().unwrap_or(Value::Nil)
    }

    pub fn args_from(&self, i: usize) -> Vec<Value> {
        self.native_args.iter().skip(i).cloned().collect()
    }

    pub fn push_result(&mut self, v: Value) {
        self.native_results.push(v);
    }

    pub fn native_upvalue(&self, i: usize) -> Value {
        self.current_native.last().and_then(|c| c.upvalues.get(i)).cloned().unwrap_or(Value::Nil)
    }

    pub fn current_native_name(&self) -> String {
        self.current_native.last().map(|c| c.name.clone()).unwrap_or_default()
    }

    /// Marks that the currently running native call (must be the innermost
    /// one) is yielding with `vals`; the enclosing `CALL`/`TAILCALL` turns
    /// this into `Step::Yield` once the native returns.
    pub fn signal_yield(&mut self, vals: Vec<Value>) {
        self.pending_yield = Some(vals);
    }

    pub(crate) fn take_yield_resume_slot(&mut self) -> Option<ResumeSlot> {
        self.yield_resume_slot.take()
    }

    pub fn set_global(&mut self, name: &str, v: Value) {
        self.globals.borrow_mut().raw_set(Value::string(name), v);
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.globals.borrow().raw_get(&Value::string(name))
    }

    /// Builds a recoverable error stamped with the innermost script frame's
    /// source name, for builtins and opcode handlers alike.
    pub fn runtime_error(&self, line: u32, message: impl Into<String>) -> RuntimeError {
        let source = self.frames.last().map(|f| f.closure.proto.source_name.clone()).unwrap_or_default();
        RuntimeError::raised(source, line, message)
    }

    pub fn current_line(&self) -> u32 {
        self.frames.last().map(|f| f.closure.proto.line_at(f.pc.saturating_sub(1))).unwrap_or(0)
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn register_top(&self) -> usize {
        self.top
    }

    /// Swaps a coroutine's reified `Stack` into the live register
    /// file/frame stack, returning whatever was running before — the
    /// mechanism `crate::stdlib::coroutine_lib::resume` uses to hand control
    /// to a suspended coroutine and get it back on yield/return.
    pub(crate) fn swap_stack(&mut self, mut stack: crate::coroutine::Stack) -> crate::coroutine::Stack {
        std::mem::swap(&mut self.frames, &mut stack.frames);
        std::mem::swap(&mut self.registers, &mut stack.registers);
        std::mem::swap(&mut self.top, &mut stack.top);
        stack
    }

    /// Delivers a suspended coroutine's resume arguments into the register
    /// window the yielding `CALL`/`TAILCALL` wanted its results in, without
    /// going through a fresh call.
    pub(crate) fn deliver_resume(&mut self, dest: usize, want: u8, vals: Vec<Value>) {
        self.deliver_results(dest, want, vals);
    }

    /// Truncates the frame stack back to `depth` and resets the register
    /// high-water mark to `top`. Used by `crate::pcall` after catching a
    /// `RuntimeError` raised deep inside a protected call: the normal
    /// `RETURN` path that would have popped those frames and refreshed
    /// their register windows never ran.
    pub(crate) fn unwind_frames(&mut self, depth: usize, top: usize) {
        while self.frames.len() > depth {
            let popped = self.frames.pop().expect("unwind_frames depth exceeds frame stack");
            let max_stack = popped.closure.proto.max_stack_size as usize;
            for i in 0..max_stack {
                self.reg_fresh(popped.base + i);
            }
        }
        self.top = top;
    }

    // -- metatables -------------------------------------------------------------

    pub(crate) fn metatable_of(&self, v: &Value) -> Option<Rc<RefCell<List>>> {
        match v {
            Value::List(l) => l.borrow().metatable.clone(),
            Value::UserData(u) => u.metatable.borrow().clone(),
            _ => None,
        }
    }

    pub(crate) fn metamethod(&self, v: &Value, name: &str) -> Option<Value> {
        let mt = self.metatable_of(v)?;
        let got = mt.borrow().raw_get(&Value::string(name));
        if matches!(got, Value::Nil) {
            None
        } else {
            Some(got)
        }
    }

    fn charge(&mut self, bytes: usize) -> Result<(), RuntimeError> {
        if let Some(cap) = self.options.memory_cap {
            self.allocated += bytes;
            if self.allocated > cap {
                return Err(RuntimeError::Halt("memory cap exceeded".into()));
            }
        }
        Ok(())
    }

    // -- top-level entry points -------------------------------------------------

    /// Runs a freshly loaded chunk (or any script closure) to completion at
    /// the top level. Not resumable: a `yield` reaching here is an error,
    /// since there is no enclosing `resume` to hand control back to.
    pub fn call_script(&mut self, closure: Rc<ScriptClosure>, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        let base = self.top;
        self.push_script_frame(closure, base, args, base, 1);
        let target_depth = self.frames.len() - 1;
        match self.drive(target_depth, false)? {
            RunOutcome::Returned(vals) => Ok(vals),
            RunOutcome::Yielded(_) => Err(RuntimeError::Halt("attempt to yield from outside a coroutine".into())),
        }
    }

    pub(crate) fn push_script_frame(&mut self, closure: Rc<ScriptClosure>, base: usize, mut args: Vec<Value>, caller_dest: usize, caller_want: u8) {
        let proto = closure.proto.clone();
        let nparams = proto.num_params as usize;
        let max_stack = (proto.max_stack_size as usize).max(1);
        self.ensure_registers(base + max_stack);
        for i in 0..max_stack {
            self.reg_fresh(base + i);
        }
        let mut frame = Frame::new(closure, base);
        frame.caller_dest = caller_dest;
        frame.caller_want = caller_want;
        if proto.is_vararg && args.len() > nparams {
            frame.varargs = args.split_off(nparams);
        }
        for (i, v) in args.into_iter().take(nparams).enumerate() {
            self.reg_set(base + i, v);
        }
        self.frames.push(frame);
        self.top = base + max_stack;
    }

    /// Delivers a completed call's results into the caller's register
    /// window: exactly `want - 1` values (padded with `Nil`) when `want !=
    /// 0`, or every value (and a `top` update so a following multret
    /// consumer sees them) when `want == 0`.
    pub(crate) fn deliver_results(&mut self, dest: usize, want: u8, mut vals: Vec<Value>) {
        if want == 0 {
            let count = vals.len();
            for (i, v) in vals.drain(..).enumerate() {
                self.reg_set(dest + i, v);
            }
            self.top = dest + count;
        } else {
            vals.resize((want - 1) as usize, Value::Nil);
            for (i, v) in vals.into_iter().enumerate() {
                self.reg_set(dest + i, v);
            }
        }
    }

    fn finish_return(&mut self, caller_dest: usize, caller_want: u8, vals: Vec<Value>, target_depth: usize) -> Step {
        if self.frames.len() == target_depth {
            Step::Done(vals)
        } else {
            self.deliver_results(caller_dest, caller_want, vals);
            Step::Continue
        }
    }

    /// Runs `nc`'s function synchronously, threading `native_args`/
    /// `native_results`/`current_native` so nested native calls nest
    /// correctly. Does not itself check `pending_yield` — callers that care
    /// (CALL/TAILCALL) do that once this returns.
    pub(crate) fn invoke_native(&mut self, nc: Rc<NativeClosure>, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        let saved_args = std::mem::replace(&mut self.native_args, args);
        let saved_results = std::mem::take(&mut self.native_results);
        self.current_native.push(nc.clone());
        let outcome = (nc.func)(self);
        self.current_native.pop();
        let mut results = std::mem::replace(&mut self.native_results, saved_results);
        self.native_args = saved_args;
        let n = outcome?;
        results.truncate(n.min(results.len()));
        Ok(results)
    }

    // -- the dispatch loop --------------------------------------------------------

    /// Steps the dispatch loop until the frame stack unwinds back down to
    /// `target_depth` (a `RETURN`/`TAILCALL` from the frame that loop was
    /// entered at) or a native `yield` call propagates up to it. `yieldable`
    /// gates whether a yield reaching this boundary is legal: false for a
    /// top-level script run or a synchronous nested call, true only for a
    /// coroutine's own `resume` boundary.
    pub(crate) fn drive(&mut self, target_depth: usize, yieldable: bool) -> Result<RunOutcome, RuntimeError> {
        loop {
            match self.step(target_depth)? {
                Step::Continue => {}
                Step::Done(vals) => return Ok(RunOutcome::Returned(vals)),
                Step::Yield(vals) => {
                    if yieldable {
                        return Ok(RunOutcome::Yielded(vals));
                    }
                    return Err(RuntimeError::Halt("attempt to yield from outside a resumable coroutine".into()));
                }
            }
        }
    }

    fn step(&mut self, target_depth: usize) -> Result<Step, RuntimeError> {
        let frame_idx = self.frames.len() - 1;
        let pc = self.frames[frame_idx].pc;
        let instr = self.frames[frame_idx].closure.proto.code[pc as usize];
        self.frames[frame_idx].pc = pc + 1;
        let base = self.frames[frame_idx].base;
        let line = self.frames[frame_idx].closure.proto.line_at(pc);
        if self.options.trace_dispatch {
            trace!(pc, opcode = ?instr.opcode(), line, "step");
        }

        match instr.opcode() {
            Opcode::MOVE => {
                let v = self.reg_get(base + instr.b() as usize);
                self.reg_set(base + instr.a() as usize, v);
            }
            Opcode::MOVEN => {
                let run = instr.c() as usize;
                for i in 0..=run {
                    let v = self.reg_get(base + instr.b() as usize + i);
                    self.reg_set(base + instr.a() as usize + i, v);
                }
            }
            Opcode::LOADK => {
                let k = self.const_at(frame_idx, instr.bx());
                self.reg_set(base + instr.a() as usize, k);
            }
            Opcode::LOADBOOL => {
                self.reg_set(base + instr.a() as usize, Value::Bool(instr.b() != 0));
                if instr.c() != 0 {
                    self.frames[frame_idx].pc += 1;
                }
            }
            Opcode::LOADNIL => {
                let a = instr.a() as usize;
                let b = instr.b() as usize;
                for i in a..=b {
                    self.reg_set(base + i, Value::Nil);
                }
            }
            Opcode::GETUPVAL => {
                let v = self.frames[frame_idx].closure.upvalues[instr.b() as usize].get();
                self.reg_set(base + instr.a() as usize, v);
            }
            Opcode::SETUPVAL => {
                let v = self.reg_get(base + instr.a() as usize);
                self.frames[frame_idx].closure.upvalues[instr.b() as usize].set(v);
            }
            Opcode::GETGLOBAL => {
                let k = self.const_at(frame_idx, instr.bx());
                let v = self.globals.borrow().raw_get(&k);
                self.reg_set(base + instr.a() as usize, v);
            }
            Opcode::SETGLOBAL => {
                let k = self.const_at(frame_idx, instr.bx());
                let v = self.reg_get(base + instr.a() as usize);
                self.globals.borrow_mut().raw_set(k, v);
            }
            Opcode::GETTABLE | Opcode::GETTABLEKS => {
                self.op_gettable(frame_idx, base, instr, line)?;
            }
            Opcode::SETTABLE | Opcode::SETTABLEKS => {
                self.op_settable(frame_idx, base, instr, line)?;
            }
            Opcode::NEWTABLE => {
                // B/C carry size hints (`int2fb`-encoded); List grows on
                // demand so they're read only for the allocation charge.
                let hint = forloop::fb2int(instr.b()) + forloop::fb2int(instr.c());
                self.charge(hint * std::mem::size_of::<Value>())?;
                self.reg_set(base + instr.a() as usize, Value::list(List::new()));
            }
            Opcode::SELFOP => {
                self.op_self(frame_idx, base, instr, line)?;
            }
            Opcode::ADD | Opcode::SUB | Opcode::MUL | Opcode::DIV | Opcode::MOD | Opcode::POW => {
                self.op_arith(frame_idx, base, instr, line)?;
            }
            Opcode::UNM | Opcode::NOT | Opcode::LEN => {
                self.op_unary(frame_idx, base, instr, line)?;
            }
            Opcode::CONCAT => {
                self.op_concat(frame_idx, base, instr, line)?;
            }
            Opcode::JMP => {
                let cur = self.frames[frame_idx].pc;
                self.frames[frame_idx].pc = (cur as i32 + instr.sbx()) as u32;
            }
            Opcode::EQ | Opcode::LT | Opcode::LE => {
                self.op_compare(frame_idx, base, instr, line)?;
            }
            Opcode::TEST => {
                let truthy = self.reg_get(base + instr.a() as usize).is_truthy();
                if truthy == (instr.c() != 0) {
                    self.frames[frame_idx].pc += 1;
                }
            }
            Opcode::TESTSET => {
                let src = self.reg_get(base + instr.b() as usize);
                if src.is_truthy() == (instr.c() != 0) {
                    self.reg_set(base + instr.a() as usize, src);
                } else {
                    self.frames[frame_idx].pc += 1;
                }
            }
            Opcode::CALL => return self.op_call(frame_idx, base, instr, line),
            Opcode::TAILCALL => return self.op_tailcall(frame_idx, base, instr, line, target_depth),
            Opcode::RETURN => return self.op_return(frame_idx, base, instr, target_depth),
            Opcode::FORPREP => self.op_forprep(frame_idx, base, instr, line)?,
            Opcode::FORLOOP => self.op_forloop(frame_idx, base, instr),
            Opcode::TFORLOOP => return self.op_tforloop(frame_idx, base, instr, line),
            Opcode::SETLIST => self.op_setlist(frame_idx, base, instr)?,
            Opcode::CLOSE => {
                let a = instr.a() as usize;
                let max_stack = self.frames[frame_idx].closure.proto.max_stack_size as usize;
                for i in a..max_stack {
                    self.reg_fresh(base + i);
                }
            }
            Opcode::CLOSURE => {
                self.op_closure(frame_idx, base, instr, line)?;
            }
            Opcode::VARARG => {
                self.op_vararg(frame_idx, base, instr);
            }
            Opcode::NOP => {}
        }
        Ok(Step::Continue)
    }
}
