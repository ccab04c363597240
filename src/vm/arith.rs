//! Arithmetic, comparison, and concatenation opcodes:
//! `ADD`/`SUB`/`MUL`/`DIV`/`MOD`/`POW`, `UNM`/`NOT`/`LEN`, `CONCAT`, and
//! `EQ`/`LT`/`LE`. Each falls back to the matching metamethod when an
//! operand isn't a plain number (or, for `CONCAT`, a number/string).

use q_asm::{Instruction, Opcode};

use super::Interpreter;
use crate::compiler::fold::float_mod;
use crate::consts::{MM_ARITH, MM_CONCAT, MM_EQ, MM_LE, MM_LT, MM_LEN, MM_UNM};
use crate::error::RuntimeError;
use crate::value::Value;

fn arith_mm_index(op: Opcode) -> usize {
    match op {
        Opcode::ADD => 0,
        Opcode::SUB => 1,
        Opcode::MUL => 2,
        Opcode::DIV => 3,
        Opcode::MOD => 4,
        Opcode::POW => 5,
        _ => unreachable!("not an arithmetic opcode"),
    }
}

fn apply_arith(op: Opcode, a: f64, b: f64) -> f64 {
    match op {
        Opcode::ADD => a + b,
        Opcode::SUB => a - b,
        Opcode::MUL => a * b,
        Opcode::DIV => a / b,
        Opcode::MOD => float_mod(a, b),
        Opcode::POW => a.powf(b),
        _ => unreachable!("not an arithmetic opcode"),
    }
}

impl Interpreter {
    pub(super) fn op_arith(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<(), RuntimeError> {
        let op = instr.opcode();
        let lhs = self.rk(frame_idx, base, instr.b());
        let rhs = self.rk(frame_idx, base, instr.c());
        let result = match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Value::Number(apply_arith(op, a, b)),
            _ => {
                let name = MM_ARITH[arith_mm_index(op)];
                if let Some(mm) = self.metamethod(&lhs, name).or_else(|| self.metamethod(&rhs, name)) {
                    let results = self.call_value(mm, vec![lhs, rhs], line)?;
                    results.into_iter().next().unwrap_or(Value::Nil)
                } else {
                    let bad = if lhs.as_number().is_none() { &lhs } else { &rhs };
                    return Err(self.runtime_error(line, format!("attempt to perform arithmetic on a {} value", bad.type_name())));
                }
            }
        };
        self.reg_set(base + instr.a() as usize, result);
        Ok(())
    }

    pub(super) fn op_unary(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<(), RuntimeError> {
        let src = self.reg_get(base + instr.b() as usize);
        let result = match instr.opcode() {
            Opcode::NOT => Value::Bool(!src.is_truthy()),
            Opcode::UNM => match src.as_number() {
                Some(n) => Value::Number(-n),
                None => match self.metamethod(&src, MM_UNM) {
                    Some(mm) => {
                        let results = self.call_value(mm, vec![src.clone(), src.clone()], line)?;
                        results.into_iter().next().unwrap_or(Value::Nil)
                    }
                    None => return Err(self.runtime_error(line, format!("attempt to perform arithmetic on a {} value", src.type_name()))),
                },
            },
            Opcode::LEN => match &src {
                Value::Str(s) => Value::Number(s.len() as f64),
                Value::List(_) => match self.metamethod(&src, MM_LEN) {
                    Some(mm) => {
                        let results = self.call_value(mm, vec![src.clone()], line)?;
                        results.into_iter().next().unwrap_or(Value::Nil)
                    }
                    None => Value::Number(src.as_list().unwrap().borrow().max_n() as f64),
                },
                other => return Err(self.runtime_error(line, format!("attempt to get length of a {} value", other.type_name()))),
            },
            other => unreachable!("not a unary opcode: {other:?}"),
        };
        self.reg_set(base + instr.a() as usize, result);
        Ok(())
    }

    /// `CONCAT A B C`: concatenates the contiguous register run `R[B..=C]`.
    /// Numbers coerce through the canonical decimal form `tostring` uses;
    /// anything else needs `__concat` (checked pairwise, left to right)
    /// or is an error.
    pub(super) fn op_concat(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<(), RuntimeError> {
        let _ = frame_idx;
        let b = instr.b() as usize;
        let c = instr.c() as usize;
        let mut acc = self.reg_get(base + b);
        for i in (b + 1)..=c {
            let next = self.reg_get(base + i);
            acc = self.concat_pair(acc, next, line)?;
        }
        self.reg_set(base + instr.a() as usize, acc);
        Ok(())
    }

    fn concat_pair(&mut self, lhs: Value, rhs: Value, line: u32) -> Result<Value, RuntimeError> {
        let coerces = |v: &Value| matches!(v, Value::Str(_) | Value::Number(_));
        if coerces(&lhs) && coerces(&rhs) {
            return Ok(Value::string(format!("{}{}", lhs.display_string(), rhs.display_string())));
        }
        if let Some(mm) = self.metamethod(&lhs, MM_CONCAT).or_else(|| self.metamethod(&rhs, MM_CONCAT)) {
            let results = self.call_value(mm, vec![lhs, rhs], line)?;
            return Ok(results.into_iter().next().unwrap_or(Value::Nil));
        }
        let bad = if coerces(&lhs) { &rhs } else { &lhs };
        Err(self.runtime_error(line, format!("attempt to concatenate a {} value", bad.type_name())))
    }

    /// `EQ`/`LT`/`LE A B C`: compares `RK(B)` against `RK(C)`, then skips
    /// the instruction immediately following (normally an unconditional
    /// `JMP`) unless the boolean result matches `A`. See
    /// `crate::compiler::stat::compile_binary` for the two-`LOADBOOL` idiom
    /// this feeds.
    pub(super) fn op_compare(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<(), RuntimeError> {
        let lhs = self.rk(frame_idx, base, instr.b());
        let rhs = self.rk(frame_idx, base, instr.c());
        let result = match instr.opcode() {
            Opcode::EQ => self.values_equal(lhs, rhs, line)?,
            Opcode::LT => self.values_less(lhs, rhs, line, false)?,
            Opcode::LE => self.values_less(lhs, rhs, line, true)?,
            other => unreachable!("not a comparison opcode: {other:?}"),
        };
        if result != (instr.a() != 0) {
            self.frames[frame_idx].pc += 1;
        }
        Ok(())
    }

    fn values_equal(&mut self, lhs: Value, rhs: Value, line: u32) -> Result<bool, RuntimeError> {
        if lhs.raw_eq(&rhs) {
            return Ok(true);
        }
        let same_kind = matches!((&lhs, &rhs), (Value::List(_), Value::List(_)));
        if same_kind {
            if let Some(mm) = self.metamethod(&lhs, MM_EQ).or_else(|| self.metamethod(&rhs, MM_EQ)) {
                let results = self.call_value(mm, vec![lhs, rhs], line)?;
                return Ok(results.into_iter().next().map(|v| v.is_truthy()).unwrap_or(false));
            }
        }
        Ok(false)
    }

    fn values_less(&mut self, lhs: Value, rhs: Value, line: u32, or_equal: bool) -> Result<bool, RuntimeError> {
        match (&lhs, &rhs) {
            (Value::Number(a), Value::Number(b)) => Ok(if or_equal { a <= b } else { a < b }),
            (Value::Str(a), Value::Str(b)) => Ok(if or_equal { a <= b } else { a < b }),
            _ => {
                let name = if or_equal { MM_LE } else { MM_LT };
                if let Some(mm) = self.metamethod(&lhs, name).or_else(|| self.metamethod(&rhs, name)) {
                    let results = self.call_value(mm, vec![lhs, rhs], line)?;
                    Ok(results.into_iter().next().map(|v| v.is_truthy()).unwrap_or(false))
                } else {
                    Err(self.runtime_error(line, format!("attempt to compare {} with {}", lhs.type_name(), rhs.type_name())))
                }
            }
        }
    }
}
