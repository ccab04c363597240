//! Loop opcodes: `FORPREP`/`FORLOOP` for numeric `for`, `TFORLOOP` for
//! generic `for`, plus the floating-byte decode `NEWTABLE`
//! uses for its size-hint operands.

use q_asm::Instruction;

use super::{Interpreter, Step};
use crate::error::RuntimeError;
use crate::value::Value;

/// Inverse of the compiler's `int2fb`: a capacity hint only (`NEWTABLE`'s
/// `B`/`C` feed a preallocation charge, not an exact count), so an
/// approximate decode is fine.
pub(super) fn fb2int(b: u32) -> usize {
    let e = (b >> 3) & 31;
    if e == 0 {
        b as usize
    } else {
        (((b & 7) + 8) << (e - 1)) as usize
    }
}

fn for_number(v: &Value, line: u32, what: &str, interp: &Interpreter) -> Result<f64, RuntimeError> {
    v.as_number().ok_or_else(|| interp.runtime_error(line, format!("'for' {what} must be a number")))
}

impl Interpreter {
    /// `FORPREP A sBx`: primes the loop by subtracting the step from the
    /// initial value (so the first `FORLOOP` adds it back before testing),
    /// then jumps to the loop's condition check.
    pub(super) fn op_forprep(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<(), RuntimeError> {
        let a = base + instr.a() as usize;
        let init = for_number(&self.reg_get(a), line, "initial value", self)?;
        let limit = for_number(&self.reg_get(a + 1), line, "limit", self)?;
        let step = for_number(&self.reg_get(a + 2), line, "step", self)?;
        self.reg_set(a + 1, Value::Number(limit));
        self.reg_set(a + 2, Value::Number(step));
        self.reg_set(a, Value::Number(init - step));
        self.frames[frame_idx].pc = (self.frames[frame_idx].pc as i64 + instr.sbx() as i64) as u32;
        Ok(())
    }

    /// `FORLOOP A sBx`: advances the counter, and if it hasn't passed the
    /// limit (direction depending on the step's sign), jumps back into the
    /// loop body and publishes the counter to `R[A+3]`.
    pub(super) fn op_forloop(&mut self, frame_idx: usize, base: usize, instr: Instruction) {
        let a = base + instr.a() as usize;
        let step = self.reg_get(a + 2).as_number().unwrap_or(0.0);
        let counter = self.reg_get(a).as_number().unwrap_or(0.0) + step;
        let limit = self.reg_get(a + 1).as_number().unwrap_or(0.0);
        let continues = if step >= 0.0 { counter <= limit } else { counter >= limit };
        self.reg_set(a, Value::Number(counter));
        if continues {
            self.frames[frame_idx].pc = (self.frames[frame_idx].pc as i64 + instr.sbx() as i64) as u32;
            self.reg_set(a + 3, Value::Number(counter));
        }
    }

    /// `TFORLOOP A C`: calls the iterator function `R[A]` with `(R[A+1],
    /// R[A+2])`, places up to `C` results at `R[A+3..]`. A nil first result
    /// ends the loop by skipping the back-edge `JMP` that otherwise follows;
    /// any other value becomes the new control variable `R[A+2]`.
    pub(super) fn op_tforloop(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<Step, RuntimeError> {
        let a = base + instr.a() as usize;
        let want = instr.c() as usize;
        let func = self.reg_get(a);
        let state = self.reg_get(a + 1);
        let control = self.reg_get(a + 2);
        let mut results = self.call_value(func, vec![state, control], line)?;
        results.resize(want.max(1), Value::Nil);
        for (i, v) in results.iter().take(want).cloned().enumerate() {
            self.reg_set(a + 3 + i, v);
        }
        if matches!(results[0], Value::Nil) {
            self.frames[frame_idx].pc += 1;
        } else {
            self.reg_set(a + 2, results[0].clone());
        }
        Ok(Step::Continue)
    }
}
