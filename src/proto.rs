//! Function prototypes: the compiler's output and the VM's unit of dispatch.
//!
//! Mirrors the role `fuel-asm`/`fuel-tx` bytecode plays in `fuel-vm` —
//! a flat, already-validated instruction stream plus side tables the VM
//! consults at call/error time — but scoped to a single function body
//! rather than a whole transaction script.

use std::rc::Rc;

use q_asm::Instruction;

use crate::value::Value;

/// Debug info for one named local: the register it lives in and the
/// instruction range across which that name is valid. Used by the
/// backtrace/error-message machinery, never by the dispatch loop itself.
#[derive(Debug, Clone)]
pub struct LocalVarInfo {
    pub name: Rc<str>,
    pub register: u8,
    pub start_pc: u32,
    pub end_pc: u32,
}

/// Debug info describing where an upvalue this prototype declares was
/// captured from: a register in the immediately enclosing function, or one
/// of the enclosing function's own upvalues.
#[derive(Debug, Clone, Copy)]
pub enum UpvalueSource {
    ParentLocal(u8),
    ParentUpvalue(u8),
}

#[derive(Debug, Clone)]
pub struct UpvalueInfo {
    pub name: Rc<str>,
    pub source: UpvalueSource,
}

/// Maps a PC range back to a source line, for error messages and
/// `debug.traceback`-equivalent output.
#[derive(Debug, Clone, Copy)]
pub struct LineInfo {
    pub start_pc: u32,
    pub line: u32,
}

/// A compiled function body: everything the VM needs to run it, and
/// everything the error/debug machinery needs to describe it.
#[derive(Debug)]
pub struct Prototype {
    pub source_name: String,
    pub line_defined: u32,
    pub last_line_defined: u32,
    pub num_params: u8,
    pub is_vararg: bool,
    pub max_stack_size: u8,

    pub code: Vec<Instruction>,
    pub constants: Vec<Value>,
    pub protos: Vec<Rc<Prototype>>,
    pub upvalues: Vec<UpvalueInfo>,
    pub locals: Vec<LocalVarInfo>,
    pub lines: Vec<LineInfo>,
}

impl Prototype {
    /// Looks up the source line a given PC maps to via the compacted
    /// `lines` table (binary search over monotonically increasing
    /// `start_pc`s, same structure as a typical line-number table).
    pub fn line_at(&self, pc: u32) -> u32 {
        match self.lines.binary_search_by_key(&pc, |l| l.start_pc) {
            Ok(i) => self.lines[i].line,
            Err(0) => 0,
            Err(i) => self.lines[i - 1].line,
        }
    }
}
