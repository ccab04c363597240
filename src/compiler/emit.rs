//! Instruction emission helpers: discharging a [`Place`] into a register or
//! `Rk` operand, and two post-pass peephole optimizations — jump-to-jump
//! collapsing and MOVE-run coalescing.

use q_asm::{rk_from_const, Instruction, Opcode};

use super::expr::Place;
use super::funcstate::FuncState;
use crate::consts::{JUMP_COLLAPSE_BOUND, MOVEN_MAX_RUN};
use crate::error::CompileError;
use crate::value::Value;

/// Ensures `place` lives in a concrete register, emitting `LOADK`/`LOADBOOL`
/// etc. if it was still a literal, and returns that register.
pub fn discharge_to_any_register(fs: &mut FuncState, place: Place, line: u32) -> Result<u8, CompileError> {
    match place {
        Place::Fixed(r) | Place::Temp(r) | Place::OpenMulti(r) => Ok(r),
        Place::Nil => {
            let r = fs.reserve(1, line)?;
            fs.emit(Instruction::abc(Opcode::LOADNIL, r as u32, r as u32, 0), line);
            Ok(r)
        }
        Place::True | Place::False => {
            let r = fs.reserve(1, line)?;
            let b = if matches!(place, Place::True) { 1 } else { 0 };
            fs.emit(Instruction::abc(Opcode::LOADBOOL, r as u32, b, 0), line);
            Ok(r)
        }
        Place::Number(n) => {
            let k = fs.add_constant(Value::Number(n), line)?;
            let r = fs.reserve(1, line)?;
            fs.emit(Instruction::abx(Opcode::LOADK, r as u32, k), line);
            Ok(r)
        }
        Place::Const(k) => {
            let r = fs.reserve(1, line)?;
            fs.emit(Instruction::abx(Opcode::LOADK, r as u32, k), line);
            Ok(r)
        }
    }
}

/// Discharges `place` into exactly register `target`, emitting a `MOVE` if
/// it already lives elsewhere. This is the "savereg" step: when the
/// enclosing context names a known destination, the compiler writes
/// straight there instead of through a temporary.
pub fn discharge_to_register(fs: &mut FuncState, place: Place, target: u8, line: u32) -> Result<(), CompileError> {
    match place {
        Place::Fixed(r) | Place::Temp(r) | Place::OpenMulti(r) if r == target => Ok(()),
        Place::Fixed(r) | Place::Temp(r) | Place::OpenMulti(r) => {
            emit_move(fs, target, r, line);
            Ok(())
        }
        Place::Nil => {
            fs.emit(Instruction::abc(Opcode::LOADNIL, target as u32, target as u32, 0), line);
            Ok(())
        }
        Place::True | Place::False => {
            let b = if matches!(place, Place::True) { 1 } else { 0 };
            fs.emit(Instruction::abc(Opcode::LOADBOOL, target as u32, b, 0), line);
            Ok(())
        }
        Place::Number(n) => {
            let k = fs.add_constant(Value::Number(n), line)?;
            fs.emit(Instruction::abx(Opcode::LOADK, target as u32, k), line);
            Ok(())
        }
        Place::Const(k) => {
            fs.emit(Instruction::abx(Opcode::LOADK, target as u32, k), line);
            Ok(())
        }
    }
}

/// The K/M/V propagation rule: if `place` is a literal/const
/// or a plain register, it can be used directly as an `Rk` operand without
/// materializing a fresh register. Otherwise it is discharged first.
pub fn discharge_to_rk(fs: &mut FuncState, place: Place, line: u32) -> Result<u32, CompileError> {
    match place {
        Place::Const(k) if k <= q_asm::MAXINDEXRK => Ok(rk_from_const(k)),
        Place::Number(n) => {
            let k = fs.add_constant(Value::Number(n), line)?;
            if k <= q_asm::MAXINDEXRK {
                Ok(rk_from_const(k))
            } else {
                Ok(discharge_to_any_register(fs, Place::Const(k), line)? as u32)
            }
        }
        Place::Fixed(r) | Place::Temp(r) | Place::OpenMulti(r) => Ok(r as u32),
        other => Ok(discharge_to_any_register(fs, other, line)? as u32),
    }
}

/// Jump-to-jump collapsing: if a `JMP`'s target is itself an unconditional
/// `JMP`, redirect to its ultimate target, following at most
/// [`JUMP_COLLAPSE_BOUND`] hops to guarantee termination even on (buggy)
/// cyclic chains. Also turns a zero-distance `JMP` into a `NOP`.
pub fn collapse_jump_chains(code: &mut [Instruction]) {
    for pc in 0..code.len() {
        if code[pc].opcode() != Opcode::JMP {
            continue;
        }
        let mut target = (pc as i32 + 1 + code[pc].sbx()) as usize;
        let mut hops = 0;
        while hops < JUMP_COLLAPSE_BOUND && target < code.len() && code[target].opcode() == Opcode::JMP {
            let next = (target as i32 + 1 + code[target].sbx()) as usize;
            if next == target {
                break;
            }
            target = next;
            hops += 1;
        }
        let new_offset = target as i32 - pc as i32 - 1;
        if new_offset == 0 {
            code[pc] = Instruction::abc(Opcode::NOP, 0, 0, 0);
        } else {
            code[pc].set_sbx(new_offset);
        }
    }
}

/// Emits `R[target] <- R[src]`, coalescing with an immediately preceding
/// `MOVE`/`MOVEN` into one `MOVEN` when the two form a contiguous run
/// (`target == prev_a + run` and `src == prev_b + run`). This is a true
/// peephole — it inspects only the just-emitted instruction — so it runs
/// safely before jump labels are patched, unlike a whole-buffer pass that
/// would shrink the code and invalidate relative jump offsets computed
/// against the unpatched length.
pub fn emit_move(fs: &mut FuncState, target: u8, src: u8, line: u32) {
    if let Some(last) = fs.code.last_mut() {
        if last.opcode() == Opcode::MOVE {
            let run = 1u32;
            if target as u32 == last.a() + run && src as u32 == last.b() + run && run < MOVEN_MAX_RUN as u32 {
                *last = Instruction::abc(Opcode::MOVEN, last.a(), last.b(), run);
                return;
            }
        } else if last.opcode() == Opcode::MOVEN {
            let run = last.c() + 1;
            if target as u32 == last.a() + run && src as u32 == last.b() + run && run < MOVEN_MAX_RUN as u32 {
                last.set_c(run);
                return;
            }
        }
    }
    fs.emit(Instruction::abc(Opcode::MOVE, target as u32, src as u32, 0), line);
}
