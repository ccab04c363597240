//! AST → bytecode compiler: the component the design calls
//! "the hardest engineering in the repo" alongside the VM dispatch loop.

mod emit;
mod expr;
pub(crate) mod fold;
mod funcstate;
mod stat;

use std::rc::Rc;

use q_asm::Instruction;

use crate::ast::{Block, FunctionBody};
use crate::error::CompileError;
use crate::proto::{Prototype, UpvalueInfo, UpvalueSource};
use funcstate::FuncState;

/// Drives compilation of one chunk (top-level script) or one nested function
/// body at a time. Holds a stack of [`FuncState`]s — one per function
/// currently being compiled, innermost last — so upvalue resolution can walk
/// outward through enclosing scopes.
pub struct Compiler {
    stack: Vec<FuncState>,
    source_name: String,
}

impl Compiler {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self { stack: Vec::new(), source_name: source_name.into() }
    }

    fn fs(&mut self) -> &mut FuncState {
        self.stack.last_mut().expect("no active function state")
    }

    fn err(&self, line: u32, msg: impl Into<String>) -> CompileError {
        CompileError::new(self.source_name.clone(), line, msg)
    }

    /// Compiles a top-level chunk into a vararg `Prototype` with no
    /// parameters, the root the VM loads into its first frame.
    pub fn compile_chunk(source_name: impl Into<String>, block: &Block) -> Result<Rc<Prototype>, CompileError> {
        let source_name = source_name.into();
        let mut compiler = Compiler::new(source_name.clone());
        compiler.stack.push(FuncState::new(source_name, 0));
        compiler.fs().is_vararg = true;
        compiler.compile_block(block)?;
        compiler.emit_implicit_return(0);
        let fs = compiler.stack.pop().unwrap();
        Ok(Rc::new(compiler.finish(fs)))
    }

    fn emit_implicit_return(&mut self, line: u32) {
        let top = self.fs().reg_top;
        self.fs().emit(Instruction::abc(q_asm::Opcode::RETURN, top as u32, 1, 0), line);
    }

    /// Compiles a nested function body into a finished `Prototype`, returning
    /// also the upvalue capture sources the enclosing `CLOSURE` instruction
    /// needs to emit one pseudo-instruction per.
    fn compile_nested_function(&mut self, body: &FunctionBody, is_method: bool) -> Result<(Rc<Prototype>, Vec<UpvalueSource>), CompileError> {
        let mut fs = FuncState::new(self.source_name.clone(), body.line);
        fs.is_vararg = body.is_vararg;
        self.stack.push(fs);

        if is_method {
            self.fs().declare_local(Rc::from("self"), body.line)?;
        }
        for param in &body.params {
            self.fs().declare_local(param.clone(), body.line)?;
        }
        self.fs().num_params = self.fs().locals.len() as u8;

        self.compile_block(&body.block)?;
        self.emit_implicit_return(body.line);

        let fs = self.stack.pop().unwrap();
        let sources = fs.upvalues.iter().map(|u| u.source).collect();
        Ok((Rc::new(self.finish(fs)), sources))
    }

    fn finish(&mut self, mut fs: FuncState) -> Prototype {
        fs.patch_labels();
        emit::collapse_jump_chains(&mut fs.code);
        let protos = std::mem::take(&mut fs.protos);
        Prototype {
            source_name: fs.source_name.clone(),
            line_defined: fs.line_defined,
            last_line_defined: fs.lines.last().map(|l| l.line).unwrap_or(fs.line_defined),
            num_params: fs.num_params,
            is_vararg: fs.is_vararg,
            max_stack_size: fs.max_stack_size,
            code: fs.code,
            constants: fs.constants_take(),
            protos,
            upvalues: fs.upvalues,
            locals: fs.locals_debug,
            lines: fs.lines,
        }
    }

    /// Resolves `name` as an upvalue of the *currently innermost* function,
    /// recursively capturing through enclosing functions as needed. Returns
    /// `None` if `name` is not found in any enclosing local/upvalue scope
    /// (so it must be a global).
    fn resolve_upvalue_for_current(&mut self, name: &str) -> Option<u8> {
        let level = self.stack.len() - 1;
        let info = self.resolve_upvalue_at(level, name)?;
        Some(self.stack[level].add_upvalue(Rc::from(name), info))
    }

    fn resolve_upvalue_at(&mut self, level: usize, name: &str) -> Option<UpvalueInfo> {
        if level == 0 {
            return None;
        }
        let parent = level - 1;
        if let Some(reg) = self.stack[parent].resolve_local(name) {
            if let Some(scope) = self.stack[parent].blocks.last_mut() {
                scope.has_upvalue_capture = true;
            }
            return Some(UpvalueInfo { name: Rc::from(name), source: UpvalueSource::ParentLocal(reg) });
        }
        if let Some(idx) = self.stack[parent].upvalues.iter().position(|u| &*u.name == name) {
            return Some(UpvalueInfo { name: Rc::from(name), source: UpvalueSource::ParentUpvalue(idx as u8) });
        }
        let info = self.resolve_upvalue_at(parent, name)?;
        let idx = self.stack[parent].add_upvalue(Rc::from(name), info);
        Some(UpvalueInfo { name: Rc::from(name), source: UpvalueSource::ParentUpvalue(idx) })
    }
}

/// Compiles source text into a root prototype ready to load into a frame.
pub fn compile(source: &str, source_name: impl Into<String>) -> Result<Rc<Prototype>, CompileError> {
    let source_name = source_name.into();
    let block = crate::parser::parse(source, source_name.clone())?;
    Compiler::compile_chunk(source_name, &block)
}
