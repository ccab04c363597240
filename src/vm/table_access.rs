//! Table access: `GETTABLE`/`GETTABLEKS`/`SETTABLE`/`SETTABLEKS` and the
//! `__index`/`__newindex` metamethod chains they (and `SELFOP`) resolve
//! through.

use q_asm::{Instruction, Opcode};

use super::Interpreter;
use crate::consts::{FIELDS_PER_FLUSH, MM_INDEX, MM_NEWINDEX, METATABLE_CHAIN_LIMIT};
use crate::error::RuntimeError;
use crate::value::Value;

impl Interpreter {
    /// Raw get on a list; if that misses and a metatable declares
    /// `__index`, either recurse into it (another list) or call it (any
    /// callable, with `(table, key)`). Bounded so a metatable cycle errors
    /// instead of looping forever.
    pub(super) fn index_get(&mut self, table: Value, key: Value, line: u32) -> Result<Value, RuntimeError> {
        let mut current = table;
        for _ in 0..METATABLE_CHAIN_LIMIT {
            match &current {
                Value::List(l) => {
                    let raw = l.borrow().raw_get(&key);
                    if !matches!(raw, Value::Nil) {
                        return Ok(raw);
                    }
                    match self.metamethod(&current, MM_INDEX) {
                        Some(next @ Value::List(_)) => {
                            current = next;
                        }
                        Some(callable @ Value::Closure(_)) => {
                            let results = self.call_value(callable, vec![current.clone(), key], line)?;
                            return Ok(results.into_iter().next().unwrap_or(Value::Nil));
                        }
                        _ => return Ok(Value::Nil),
                    }
                }
                other => match self.metamethod(other, MM_INDEX) {
                    Some(next @ Value::List(_)) => {
                        current = next;
                    }
                    Some(callable @ Value::Closure(_)) => {
                        let results = self.call_value(callable, vec![current.clone(), key], line)?;
                        return Ok(results.into_iter().next().unwrap_or(Value::Nil));
                    }
                    _ => {
                        return Err(self.runtime_error(line, format!("attempt to index a {} value", current.type_name())));
                    }
                },
            }
        }
        Err(self.runtime_error(line, "'__index' chain too long; possible loop"))
    }

    /// Raw set on a list when the key already exists there, or when no
    /// `__newindex` applies; otherwise recurses into/calls `__newindex` the
    /// same way `index_get` handles `__index`.
    pub(super) fn index_set(&mut self, table: Value, key: Value, value: Value, line: u32) -> Result<(), RuntimeError> {
        let mut current = table;
        for _ in 0..METATABLE_CHAIN_LIMIT {
            match &current {
                Value::List(l) => {
                    let has_raw = !matches!(l.borrow().raw_get(&key), Value::Nil);
                    if has_raw {
                        l.borrow_mut().raw_set(key, value);
                        return Ok(());
                    }
                    match self.metamethod(&current, MM_NEWINDEX) {
                        Some(next @ Value::List(_)) => {
                            current = next;
                        }
                        Some(callable @ Value::Closure(_)) => {
                            self.call_value(callable, vec![current.clone(), key, value], line)?;
                            return Ok(());
                        }
                        _ => {
                            l.borrow_mut().raw_set(key, value);
                            return Ok(());
                        }
                    }
                }
                _ => {
                    return Err(self.runtime_error(line, format!("attempt to index a {} value", current.type_name())));
                }
            }
        }
        Err(self.runtime_error(line, "'__newindex' chain too long; possible loop"))
    }

    pub(super) fn op_gettable(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<(), RuntimeError> {
        let table = self.reg_get(base + instr.b() as usize);
        let key = if instr.opcode() == Opcode::GETTABLEKS {
            self.const_at(frame_idx, instr.c())
        } else {
            self.rk(frame_idx, base, instr.c())
        };
        let v = self.index_get(table, key, line)?;
        self.reg_set(base + instr.a() as usize, v);
        Ok(())
    }

    pub(super) fn op_settable(&mut self, frame_idx: usize, base: usize, instr: Instruction, line: u32) -> Result<(), RuntimeError> {
        let table = self.reg_get(base + instr.a() as usize);
        let (key, value) = if instr.opcode() == Opcode::SETTABLEKS {
            (self.const_at(frame_idx, instr.b()), self.rk(frame_idx, base, instr.c()))
        } else {
            (self.rk(frame_idx, base, instr.b()), self.rk(frame_idx, base, instr.c()))
        };
        self.index_set(table, key, value, line)
    }

    /// `SETLIST A B C`: flushes the constructor run `R[A+1..A+1+B]` into the
    /// table at `R[A]`, starting at the 1-indexed array position
    /// `(C-1)*FIELDS_PER_FLUSH + 1`. `B == 0` means "flush to register
    /// top" — the last element of the constructor was a multret expression.
    pub(super) fn op_setlist(&mut self, frame_idx: usize, base: usize, instr: Instruction) -> Result<(), RuntimeError> {
        let _ = frame_idx;
        let a = base + instr.a() as usize;
        let count = if instr.b() == 0 { self.top.saturating_sub(a + 1) } else { instr.b() as usize };
        let start = (instr.c() as i64 - 1) * FIELDS_PER_FLUSH as i64 + 1;
        let table = self.reg_get(a);
        let list = table.as_list().expect("SETLIST target is not a list").clone();
        for i in 0..count {
            let v = self.reg_get(a + 1 + i);
            list.borrow_mut().raw_set(Value::Number((start + i as i64) as f64), v);
        }
        Ok(())
    }
}
