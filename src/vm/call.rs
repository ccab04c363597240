//! Call/return dispatch: `CALL`, `TAILCALL`, `RETURN`, `CLOSURE`, `VARARG`,
//! and `SELFOP`. `call_value` is the synchronous entry point
//! `TFORLOOP` and `crate::pcall` both need for a call that isn't tied to any
//! particular `CALL` instruction.

use std::rc::Rc;

use q_asm::{Instruction, Opcode};

use super::{Interpreter, RunOutcome, Step};
use crate::error::RuntimeError;
use crate::value::{Closure, ScriptClosure, Upvalue, Value};

/// What starting a call produced: either a new frame the dispatch loop must
/// keep driving, or a native call's results, already in hand.
pub(crate) enum CallStart {
    Pushed,
    Immediate(Vec<Value>),
}

impl Interpreter {
    /// Resolves `callee` to something callable and starts the call. Script
    /// closures get a fresh frame at `new_base`; native closures run to
    /// completion immediately; anything else falls back to its `__call`
    /// metamethod, one level only.
    fn begin_call(&mut self, callee: Value, args: Vec<Value>, new_base: usize, caller_dest: usize, caller_want: u8, line: u32) -> Result<CallStart, RuntimeError> {
        match callee {
            Value::Closure(Closure::Script(sc)) => {
                self.push_script_frame(sc, new_base, args, caller_dest, caller_want);
                Ok(CallStart::Pushed)
            }
            Value::Closure(Closure::Native(nc)) => {
                let vals = self.invoke_native(nc, args)?;
                Ok(CallStart::Immediate(vals))
            }
            other => {
                if let Some(mm) = self.metamethod(&other, crate::consts::MM_CALL) {
                    let mut new_args = Vec::with_capacity(args.len() + 1);
                    new_args.push(other);
                    new_args.extend(args);
                    self.begin_call(mm, new_args, new_base, caller_dest, caller_want, line)
                } else {
                    Err(self.runtime_error(line, format!("attempt to call a {} value", other.type_name())))
                }
            }
        }
    }

    /// Calls `callee` synchronously with `args`, returning every result.
    /// Used where there's no enclosing `CALL` instruction to deliver into:
    /// `pcall`'s protected call and `TFORLOOP`'s iterator invocation. Not
    /// yieldable — a script iterator or protected function that tries to
    /// `yield` across this boundary gets a halt error.
    pub(crate) fn call_value(&mut self, callee: Value, args: Vec<Value>, line: u32) -> Result<Vec<Value>, RuntimeError> {
        let new_base = self.top;
        let pre_len = self.frames.len();
        match self.begin_call(callee, args, new_base, new_base, 0, line)? {
            CallStart::Immediate(vals) => {
                if self.pending_yield.take().is_some() {
                    return Err(self.runtime_error(line, "attempt to yield across a non-resumable call boundary"));
                }
                Ok(vals)
            }
            CallStart::Pushed => match self.drive(pre_len, false)? {
                RunOutcome::Returned(vals) => Ok(vals),
                RunOutcome::Yielded(_) => Err(RuntimeError::Halt("yield inside a non-coroutine call".into())),
            },
        }
    }

    pub(super) fn op_call(&mut self, _frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<Step, RuntimeError> {
        let a = base + instr.a() as usize;
        let b = instr.b();
        let c = instr.c();
        let nargs = if b == 0 { self.top.saturating_sub(a + 1) } else { (b - 1) as usize };
        let callee = self.reg_get(a);
        let args: Vec<Value> = (0..nargs).map(|i| self.reg_get(a + 1 + i)).collect();
        match self.begin_call(callee, args, a, a, c as u8, line)? {
            CallStart::Pushed => Ok(Step::Continue),
            CallStart::Immediate(vals) => {
                if let Some(yielded) = self.pending_yield.take() {
                    self.yield_resume_slot = Some(crate::coroutine::ResumeSlot { dest: a, want: c as u8 });
                    return Ok(Step::Yield(yielded));
                }
                self.deliver_results(a, c as u8, vals);
                Ok(Step::Continue)
            }
        }
    }

    /// `TAILCALL A B`: pops the current frame, reuses its register window
    /// and its caller-facing destination for the new call, so tail
    /// recursion never grows the frame stack.
    pub(super) fn op_tailcall(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32, target_depth: usize) -> Result<Step, RuntimeError> {
        let a = base + instr.a() as usize;
        let b = instr.b();
        let nargs = if b == 0 { self.top.saturating_sub(a + 1) } else { (b - 1) as usize };
        let callee = self.reg_get(a);
        let args: Vec<Value> = (0..nargs).map(|i| self.reg_get(a + 1 + i)).collect();

        let popped = self.frames.pop().expect("TAILCALL with no active frame");
        debug_assert_eq!(frame_idx, self.frames.len());
        let max_stack = popped.closure.proto.max_stack_size as usize;
        for i in 0..max_stack {
            self.reg_fresh(popped.base + i);
        }
        let new_base = popped.base;
        let caller_dest = popped.caller_dest;
        let caller_want = popped.caller_want;

        match self.begin_call(callee, args, new_base, caller_dest, caller_want, line)? {
            CallStart::Pushed => Ok(Step::Continue),
            CallStart::Immediate(vals) => {
                if let Some(yielded) = self.pending_yield.take() {
                    self.yield_resume_slot = Some(crate::coroutine::ResumeSlot { dest: caller_dest, want: caller_want });
                    return Ok(Step::Yield(yielded));
                }
                Ok(self.finish_return(caller_dest, caller_want, vals, target_depth))
            }
        }
    }

    pub(super) fn op_return(&mut self, frame_idx: usize, base: usize, instr: Instruction, target_depth: usize) -> Result<Step, RuntimeError> {
        let a = base + instr.a() as usize;
        let b = instr.b();
        let n = if b == 0 { self.top.saturating_sub(a) } else { (b - 1) as usize };
        let vals: Vec<Value> = (0..n).map(|i| self.reg_get(a + i)).collect();

        let popped = self.frames.pop().expect("RETURN with no active frame");
        debug_assert_eq!(frame_idx, self.frames.len());
        let max_stack = popped.closure.proto.max_stack_size as usize;
        for i in 0..max_stack {
            self.reg_fresh(popped.base + i);
        }
        self.top = popped.base;

        Ok(self.finish_return(popped.caller_dest, popped.caller_want, vals, target_depth))
    }

    /// `CLOSURE A Bx`: instantiates `protos[Bx]`, then consumes the
    /// `proto.upvalues.len()` pseudo-instructions immediately following in
    /// the code stream (one `MOVE`/`GETUPVAL` per upvalue) by advancing `pc`
    /// past them directly — they are never executed through ordinary
    /// dispatch.
    pub(super) fn op_closure(&mut self, frame_idx: usize, base: usize, instr: Instruction, _line: u32) -> Result<(), RuntimeError> {
        let proto = self.frames[frame_idx].closure.proto.protos[instr.bx() as usize].clone();
        let mut upvalues = Vec::with_capacity(proto.upvalues.len());
        let mut pc = self.frames[frame_idx].pc;
        for _ in 0..proto.upvalues.len() {
            let pseudo = self.frames[frame_idx].closure.proto.code[pc as usize];
            let cell = match pseudo.opcode() {
                Opcode::MOVE => self.reg_cell(base + pseudo.b() as usize),
                Opcode::GETUPVAL => self.frames[frame_idx].closure.upvalues[pseudo.b() as usize].cell(),
                other => return Err(RuntimeError::Halt(format!("malformed CLOSURE upvalue pseudo-instruction {other:?}"))),
            };
            upvalues.push(Upvalue::Open(cell));
            pc += 1;
        }
        self.frames[frame_idx].pc = pc;
        let closure = Value::Closure(Closure::Script(Rc::new(ScriptClosure { proto, upvalues })));
        self.reg_set(base + instr.a() as usize, closure);
        Ok(())
    }

    pub(super) fn op_vararg(&mut self, frame_idx: usize, base: usize, instr: Instruction) {
        let a = base + instr.a() as usize;
        let varargs = self.frames[frame_idx].varargs.clone();
        let b = instr.b();
        if b == 0 {
            let n = varargs.len();
            for (i, v) in varargs.into_iter().enumerate() {
                self.reg_set(a + i, v);
            }
            self.top = a + n;
        } else {
            let want = (b - 1) as usize;
            for i in 0..want {
                self.reg_set(a + i, varargs.get(i).cloned().unwrap_or(Value::Nil));
            }
        }
    }

    /// `SELFOP A B C`: `R[A+1] = R[B]` (the object, for the method call's
    /// implicit `self`), `R[A] = R[B][RK(C)]` (the method, via the same
    /// `__index` chain `GETTABLE` uses).
    pub(super) fn op_self(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<(), RuntimeError> {
        let obj = self.reg_get(base + instr.b() as usize);
        let key = self.rk(frame_idx, base, instr.c());
        let method = self.index_get(obj.clone(), key, line)?;
        let a = base + instr.a() as usize;
        self.reg_set(a + 1, obj);
        self.reg_set(a, method);
        Ok(())
    }
}
