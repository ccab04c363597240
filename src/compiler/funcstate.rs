//! Per-function compilation state: constant pool, local variable stack,
//! label table, and register high-water mark.

use std::collections::HashMap;
use std::rc::Rc;

use q_asm::Instruction;

use crate::consts::MAX_CONSTANTS;
use crate::error::CompileError;
use crate::proto::{LineInfo, LocalVarInfo, Prototype, UpvalueInfo};
use crate::value::Value;

#[derive(Clone, PartialEq, Eq, Hash)]
enum ConstKey {
    Number(u64),
    Str(Rc<str>),
    Bool(bool),
    Nil,
}

fn const_key(v: &Value) -> Option<ConstKey> {
    Some(match v {
        Value::Nil => ConstKey::Nil,
        Value::Bool(b) => ConstKey::Bool(*b),
        Value::Number(n) => ConstKey::Number(n.to_bits()),
        Value::Str(s) => ConstKey::Str(s.clone()),
        _ => return None,
    })
}

pub struct LocalVar {
    pub name: Rc<str>,
    pub register: u8,
    pub start_pc: u32,
}

pub struct BlockScope {
    pub locals_base: usize,
    pub is_loop: bool,
    pub break_label: Option<LabelId>,
    pub has_upvalue_capture: bool,
    pub reg_base: u8,
}

pub type LabelId = usize;

/// A label not yet resolved to a PC: the list of instruction slots whose
/// jump offset needs patching once the label's PC is known.
#[derive(Default)]
pub struct Label {
    pub pc: Option<u32>,
    pub pending: Vec<u32>,
}

/// One function body's worth of in-progress compilation state. Nested
/// function bodies get their own `FuncState`, linked to the enclosing one
/// through [`crate::compiler::Compiler`]'s stack rather than a raw pointer,
/// so upvalue resolution borrows the parent immutably while the child is
/// still being built.
pub struct FuncState {
    pub source_name: String,
    pub line_defined: u32,
    pub num_params: u8,
    pub is_vararg: bool,

    pub code: Vec<Instruction>,
    pub lines: Vec<LineInfo>,
    last_line: u32,

    constants: Vec<Value>,
    const_map: HashMap<ConstKey, u32>,

    pub locals: Vec<LocalVar>,
    pub locals_debug: Vec<LocalVarInfo>,
    pub blocks: Vec<BlockScope>,

    pub upvalues: Vec<UpvalueInfo>,
    upvalue_names: HashMap<Rc<str>, u8>,

    pub protos: Vec<Rc<Prototype>>,

    pub reg_top: u8,
    pub max_stack_size: u8,

    labels: Vec<Label>,
}

impl FuncState {
    pub fn new(source_name: String, line_defined: u32) -> Self {
        Self {
            source_name,
            line_defined,
            num_params: 0,
            is_vararg: false,
            code: Vec::new(),
            lines: Vec::new(),
            last_line: 0,
            constants: Vec::new(),
            const_map: HashMap::new(),
            locals: Vec::new(),
            locals_debug: Vec::new(),
            blocks: vec![BlockScope { locals_base: 0, is_loop: false, break_label: None, has_upvalue_capture: false, reg_base: 0 }],
            upvalues: Vec::new(),
            upvalue_names: HashMap::new(),
            protos: Vec::new(),
            reg_top: 0,
            max_stack_size: 0,
            labels: Vec::new(),
        }
    }

    fn err(&self, line: u32, msg: impl Into<String>) -> CompileError {
        CompileError::new(self.source_name.clone(), line, msg)
    }

    // -- constants --------------------------------------------------------

    pub fn add_constant(&mut self, v: Value, line: u32) -> Result<u32, CompileError> {
        if let Some(key) = const_key(&v) {
            if let Some(&idx) = self.const_map.get(&key) {
                return Ok(idx);
            }
            let idx = self.constants.len() as u32;
            if idx as usize >= MAX_CONSTANTS {
                return Err(self.err(line, "too many constants in function"));
            }
            self.constants.push(v);
            self.const_map.insert(key, idx);
            Ok(idx)
        } else {
            let idx = self.constants.len() as u32;
            self.constants.push(v);
            Ok(idx)
        }
    }

    pub fn constants_take(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.constants)
    }

    pub fn protos_push(&mut self, proto: Rc<Prototype>) -> u32 {
        let idx = self.protos.len() as u32;
        self.protos.push(proto);
        idx
    }

    // -- registers ----------------------------------------------------------

    pub fn reserve(&mut self, n: u8, line: u32) -> Result<u8, CompileError> {
        let base = self.reg_top;
        let top = self.reg_top as u32 + n as u32;
        if top > crate::consts::MAX_REGISTERS as u32 {
            return Err(self.err(line, "function uses too many registers"));
        }
        self.reg_top = top as u8;
        self.max_stack_size = self.max_stack_size.max(self.reg_top);
        Ok(base)
    }

    pub fn free_to(&mut self, mark: u8) {
        self.reg_top = mark;
    }

    // -- locals ---------------------------------------------------------

    pub fn declare_local(&mut self, name: Rc<str>, line: u32) -> Result<u8, CompileError> {
        let reg = self.reserve(1, line)?;
        self.locals.push(LocalVar { name: name.clone(), register: reg, start_pc: self.code.len() as u32 });
        self.locals_debug.push(LocalVarInfo { name, register: reg, start_pc: self.code.len() as u32, end_pc: u32::MAX });
        Ok(reg)
    }

    pub fn resolve_local(&self, name: &str) -> Option<u8> {
        self.locals.iter().rev().find(|l| &*l.name == name).map(|l| l.register)
    }

    pub fn enter_block(&mut self, is_loop: bool) {
        self.blocks.push(BlockScope {
            locals_base: self.locals.len(),
            is_loop,
            break_label: if is_loop { Some(self.new_label()) } else { None },
            has_upvalue_capture: false,
            reg_base: self.reg_top,
        });
    }

    pub fn leave_block(&mut self) -> BlockScope {
        let scope = self.blocks.pop().expect("unbalanced block scope");
        let end_pc = self.code.len() as u32;
        for debug in self.locals_debug.iter_mut().rev() {
            if debug.end_pc == u32::MAX && self.locals.len() > scope.locals_base {
                debug.end_pc = end_pc;
            }
        }
        self.locals.truncate(scope.locals_base);
        self.reg_top = scope.reg_base;
        scope
    }

    // -- upvalues ---------------------------------------------------------

    pub fn add_upvalue(&mut self, name: Rc<str>, info: UpvalueInfo) -> u8 {
        if let Some(&idx) = self.upvalue_names.get(&name) {
            return idx;
        }
        let idx = self.upvalues.len() as u8;
        self.upvalue_names.insert(name, idx);
        self.upvalues.push(info);
        idx
    }

    // -- labels & jump patching ---------------------------------------------

    pub fn new_label(&mut self) -> LabelId {
        self.labels.push(Label::default());
        self.labels.len() - 1
    }

    pub fn bind_label_here(&mut self, label: LabelId) {
        self.labels[label].pc = Some(self.code.len() as u32);
    }

    pub fn label_pc(&self, label: LabelId) -> Option<u32> {
        self.labels[label].pc
    }

    pub fn mark_pending(&mut self, label: LabelId, instr_pc: u32) {
        self.labels[label].pending.push(instr_pc);
    }

    /// Resolves every label and patches its pending `JMP`/conditional-jump
    /// operands to the label's final PC. Jump-to-jump collapsing over the
    /// resulting code is a separate pass — see
    /// [`crate::compiler::emit::collapse_jump_chains`].
    pub fn patch_labels(&mut self) {
        for label in &self.labels {
            let Some(target_pc) = label.pc else { continue };
            for &instr_pc in &label.pending {
                let offset = target_pc as i32 - instr_pc as i32 - 1;
                self.code[instr_pc as usize].set_sbx(offset);
            }
        }
    }

    // -- line table ---------------------------------------------------------

    pub fn note_line(&mut self, line: u32) {
        if line != self.last_line {
            self.lines.push(LineInfo { start_pc: self.code.len() as u32, line });
            self.last_line = line;
        }
    }

    pub fn emit(&mut self, instr: Instruction, line: u32) -> u32 {
        self.note_line(line);
        let pc = self.code.len() as u32;
        self.code.push(instr);
        pc
    }

    pub fn current_pc(&self) -> u32 {
        self.code.len() as u32
    }
}
