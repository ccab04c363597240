//! Statement and expression lowering: the bulk of the compiler. Register allocation follows a stack discipline with a high-water
//! top; expression contexts flow down through `want` parameters and
//! [`Place`] values flow back up.

use std::rc::Rc;

use q_asm::{Instruction, Opcode};

use super::emit::{discharge_to_any_register, discharge_to_register, discharge_to_rk, emit_move};
use super::expr::{Place, WantResults};
use super::fold;
use super::funcstate::FuncState;
use super::Compiler;
use crate::ast::{BinOp, Block, Expr, FunctionBody, Stat, UnOp};
use crate::consts::FIELDS_PER_FLUSH;
use crate::error::CompileError;
use crate::proto::{Prototype, UpvalueSource};
use crate::value::Value;

impl Compiler {
    pub(super) fn compile_block(&mut self, block: &Block) -> Result<(), CompileError> {
        let mark = self.fs().reg_top;
        for stat in &block.stats {
            self.compile_stat(stat)?;
        }
        self.fs().free_to(mark);
        Ok(())
    }

    fn compile_stat(&mut self, stat: &Stat) -> Result<(), CompileError> {
        match stat {
            Stat::Local { names, values, line } => self.compile_local(names, values, *line),
            Stat::Assign { targets, values, line } => self.compile_assign(targets, values, *line),
            Stat::ExprStat(expr) => {
                let mark = self.fs().reg_top;
                self.compile_expr_want(expr, WantResults::Discard)?;
                self.fs().free_to(mark);
                Ok(())
            }
            Stat::Do(block) => {
                self.fs().enter_block(false);
                self.compile_block(block)?;
                self.fs().leave_block();
                Ok(())
            }
            Stat::While { cond, body, line } => self.compile_while(cond, body, *line),
            Stat::Repeat { body, cond, line } => self.compile_repeat(body, cond, *line),
            Stat::If { arms, else_block, line } => self.compile_if(arms, else_block, *line),
            Stat::NumericFor { var, init, limit, step, body, line } => {
                self.compile_numeric_for(var, init, limit, step.as_ref(), body, *line)
            }
            Stat::GenericFor { names, exprs, body, line } => self.compile_generic_for(names, exprs, body, *line),
            Stat::FunctionDecl { target, is_method, body, line } => {
                self.compile_function_decl(target, *is_method, body, *line)
            }
            Stat::LocalFunction { name, body, line } => self.compile_local_function(name, body, *line),
            Stat::Return { values, line } => self.compile_return(values, *line),
            Stat::Break { line } => self.compile_break(*line),
        }
    }

    // -- locals / assignment -------------------------------------------------

    fn compile_local(&mut self, names: &[Rc<str>], values: &[Expr], line: u32) -> Result<(), CompileError> {
        let regs = self.compile_expr_list_to_n(values, names.len(), line)?;
        for (name, reg) in names.iter().zip(regs) {
            // The expression list already placed values starting at the
            // current reg_top; declaring the local after the fact just
            // attaches the name to that register.
            self.fs().locals.push(super::funcstate::LocalVar {
                name: name.clone(),
                register: reg,
                start_pc: self.fs().current_pc(),
            });
        }
        Ok(())
    }

    /// Compiles an RHS expression list, producing exactly `want` values
    /// placed in consecutive fresh registers starting at the current
    /// register top — the shared machinery behind `local` declarations and
    /// generic-for's hidden triple.
    fn compile_expr_list_to_n(&mut self, values: &[Expr], want: usize, line: u32) -> Result<Vec<u8>, CompileError> {
        let base = self.fs().reg_top;
        if values.is_empty() {
            for _ in 0..want {
                let r = self.fs().reserve(1, line)?;
                self.fs().emit(Instruction::abc(Opcode::LOADNIL, r as u32, r as u32, 0), line);
            }
            return Ok((0..want as u8).map(|i| base + i).collect());
        }
        for (i, expr) in values.iter().enumerate() {
            let is_last = i + 1 == values.len();
            if is_last && want > values.len() && is_multret(expr) {
                let extra = (want - values.len() + 1) as u8;
                self.compile_multret_expr(expr, extra)?;
                // The CALL/VARARG above already wrote `extra` results starting
                // at `reg_top`'s value when it was issued; just claim the
                // registers it filled instead of padding over them with nil.
                let target_top = base + want as u8;
                if self.fs().reg_top < target_top {
                    self.fs().reserve(target_top - self.fs().reg_top, line)?;
                }
            } else {
                let place = self.compile_expr(expr)?;
                let target = self.fs().reg_top;
                discharge_to_register(self.fs(), place, target, line)?;
                if self.fs().reg_top == target {
                    self.fs().reserve(1, line)?;
                }
            }
        }
        // Fill or truncate to exactly `want`.
        while (self.fs().reg_top as usize) < base as usize + want {
            let r = self.fs().reserve(1, line)?;
            self.fs().emit(Instruction::abc(Opcode::LOADNIL, r as u32, r as u32, 0), line);
        }
        self.fs().free_to(base + want as u8);
        Ok((0..want as u8).map(|i| base + i).collect())
    }

    fn compile_assign(&mut self, targets: &[Expr], values: &[Expr], line: u32) -> Result<(), CompileError> {
        // Evaluate all LHS target descriptors first (table/key registers),
        // then RHS into temporaries, then write targets in reverse order so
        // `a, b = b, a` works.
        enum Target {
            Local(u8),
            Global(u32),
            Upvalue(u8),
            /// Named field (`a.b = x`): `key` is a raw constant index, written
            /// with `SETTABLEKS`.
            TableField { table: u8, key: u32 },
            /// Computed index (`a[k] = x`): `key` is an `Rk` operand, written
            /// with `SETTABLE`.
            TableIndex { table: u8, key: u32 },
        }

        let mark = self.fs().reg_top;
        let mut descs = Vec::with_capacity(targets.len());
        for t in targets {
            descs.push(match t {
                Expr::Name(name) => {
                    if let Some(reg) = self.fs().resolve_local(name) {
                        Target::Local(reg)
                    } else if let Some(idx) = self.resolve_upvalue_for_current(name) {
                        Target::Upvalue(idx)
                    } else {
                        let k = self.fs().add_constant(Value::string(name.clone()), line)?;
                        Target::Global(k)
                    }
                }
                Expr::Field { object, name, .. } => {
                    let obj_place = self.compile_expr(object)?;
                    let table = discharge_to_any_register(self.fs(), obj_place, line)?;
                    let key = self.fs().add_constant(Value::string(name.clone()), line)?;
                    Target::TableField { table, key }
                }
                Expr::Index { object, key, .. } => {
                    let obj_place = self.compile_expr(object)?;
                    let table = discharge_to_any_register(self.fs(), obj_place, line)?;
                    let key_place = self.compile_expr(key)?;
                    let key_rk = discharge_to_rk(self.fs(), key_place, line)?;
                    Target::TableIndex { table, key: key_rk }
                }
                _ => return Err(self.err(line, "invalid assignment target")),
            });
        }

        let regs = self.compile_expr_list_to_n(values, targets.len(), line)?;

        for (target, reg) in descs.into_iter().zip(regs).rev() {
            match target {
                Target::Local(dst) => emit_move(self.fs(), dst, reg, line),
                Target::Upvalue(idx) => {
                    self.fs().emit(Instruction::abc(Opcode::SETUPVAL, reg as u32, idx as u32, 0), line);
                }
                Target::Global(k) => {
                    self.fs().emit(Instruction::abx(Opcode::SETGLOBAL, reg as u32, k), line);
                }
                Target::TableField { table, key } => {
                    self.fs().emit(Instruction::abc(Opcode::SETTABLEKS, table as u32, key, reg as u32), line);
                }
                Target::TableIndex { table, key } => {
                    self.fs().emit(Instruction::abc(Opcode::SETTABLE, table as u32, key, reg as u32), line);
                }
            }
        }
        self.fs().free_to(mark);
        Ok(())
    }

    // -- control flow ---------------------------------------------------------

    fn compile_while(&mut self, cond: &Expr, body: &Block, line: u32) -> Result<(), CompileError> {
        let top_pc = self.fs().current_pc();
        self.fs().enter_block(true);
        let break_label = self.fs().blocks.last().unwrap().break_label.unwrap();
        self.compile_condition_jump_if_false(cond, break_label, line)?;
        self.compile_block(body)?;
        let jmp_pc = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 0), line);
        let back = top_pc as i32 - jmp_pc as i32 - 1;
        self.fs().code[jmp_pc as usize].set_sbx(back);
        self.fs().bind_label_here(break_label);
        let scope = self.fs().leave_block();
        if scope.has_upvalue_capture {
            self.fs().emit(Instruction::abc(Opcode::CLOSE, scope.reg_base as u32, 0, 0), line);
        }
        self.fs().patch_labels();
        Ok(())
    }

    fn compile_repeat(&mut self, body: &Block, cond: &Expr, line: u32) -> Result<(), CompileError> {
        let top_pc = self.fs().current_pc();
        self.fs().enter_block(true);
        let break_label = self.fs().blocks.last().unwrap().break_label.unwrap();
        self.compile_block(body)?;
        // `until` condition sees the body's locals, so test before popping
        // the block's scope.
        self.compile_condition_jump_if_false_to_pc(cond, top_pc, line)?;
        self.fs().bind_label_here(break_label);
        let scope = self.fs().leave_block();
        if scope.has_upvalue_capture {
            self.fs().emit(Instruction::abc(Opcode::CLOSE, scope.reg_base as u32, 0, 0), line);
        }
        self.fs().patch_labels();
        Ok(())
    }

    fn compile_if(&mut self, arms: &[(Expr, Block)], else_block: &Option<Block>, line: u32) -> Result<(), CompileError> {
        let end_label = self.fs().new_label();
        for (i, (cond, block)) in arms.iter().enumerate() {
            let next_label = self.fs().new_label();
            self.compile_condition_jump_if_false(cond, next_label, line)?;
            self.fs().enter_block(false);
            self.compile_block(block)?;
            self.fs().leave_block();
            let is_last_arm = i + 1 == arms.len() && else_block.is_none();
            if !is_last_arm {
                let jmp_pc = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 0), line);
                self.fs().mark_pending(end_label, jmp_pc);
            }
            self.fs().bind_label_here(next_label);
        }
        if let Some(block) = else_block {
            self.fs().enter_block(false);
            self.compile_block(block)?;
            self.fs().leave_block();
        }
        self.fs().bind_label_here(end_label);
        self.fs().patch_labels();
        Ok(())
    }

    /// Emits a condition test followed by a `JMP` to `label` taken when the
    /// condition is false (used by `while`/`if`).
    fn compile_condition_jump_if_false(&mut self, cond: &Expr, label: super::funcstate::LabelId, line: u32) -> Result<(), CompileError> {
        let mark = self.fs().reg_top;
        let place = self.compile_expr(cond)?;
        let reg = discharge_to_any_register(self.fs(), place, line)?;
        self.fs().emit(Instruction::abc(Opcode::TEST, reg as u32, 0, 1), line);
        let jmp_pc = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 0), line);
        self.fs().mark_pending(label, jmp_pc);
        self.fs().free_to(mark);
        Ok(())
    }

    fn compile_condition_jump_if_false_to_pc(&mut self, cond: &Expr, target_pc: u32, line: u32) -> Result<(), CompileError> {
        let mark = self.fs().reg_top;
        let place = self.compile_expr(cond)?;
        let reg = discharge_to_any_register(self.fs(), place, line)?;
        self.fs().emit(Instruction::abc(Opcode::TEST, reg as u32, 0, 1), line);
        let jmp_pc = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 0), line);
        let offset = target_pc as i32 - jmp_pc as i32 - 1;
        self.fs().code[jmp_pc as usize].set_sbx(offset);
        self.fs().free_to(mark);
        Ok(())
    }

    fn compile_break(&mut self, line: u32) -> Result<(), CompileError> {
        let mut has_capture = false;
        let mut label = None;
        for scope in self.fs().blocks.iter().rev() {
            if scope.has_upvalue_capture {
                has_capture = true;
            }
            if scope.is_loop {
                label = scope.break_label;
                break;
            }
        }
        let label = label.ok_or_else(|| self.err(line, "break outside a loop"))?;
        if has_capture {
            let base = self.fs().blocks.last().unwrap().reg_base;
            self.fs().emit(Instruction::abc(Opcode::CLOSE, base as u32, 0, 0), line);
        }
        let jmp_pc = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 0), line);
        self.fs().mark_pending(label, jmp_pc);
        Ok(())
    }

    fn compile_numeric_for(
        &mut self,
        var: &Rc<str>,
        init: &Expr,
        limit: &Expr,
        step: Option<&Expr>,
        body: &Block,
        line: u32,
    ) -> Result<(), CompileError> {
        self.fs().enter_block(true);
        let base = self.fs().reserve(3, line)?; // init, limit, step hidden locals
        let init_place = self.compile_expr(init)?;
        discharge_to_register(self.fs(), init_place, base, line)?;
        let limit_place = self.compile_expr(limit)?;
        discharge_to_register(self.fs(), limit_place, base + 1, line)?;
        let step_place = match step {
            Some(e) => self.compile_expr(e)?,
            None => Place::Number(1.0),
        };
        discharge_to_register(self.fs(), step_place, base + 2, line)?;

        let prep_pc = self.fs().emit(Instruction::asbx(Opcode::FORPREP, base as u32, 0), line);
        let var_reg = self.fs().declare_local(var.clone(), line)?;
        debug_assert_eq!(var_reg, base + 3);
        self.compile_block(body)?;
        let loop_pc = self.fs().emit(Instruction::asbx(Opcode::FORLOOP, base as u32, 0), line);
        let back = prep_pc as i32 + 1 - loop_pc as i32 - 1;
        self.fs().code[loop_pc as usize].set_sbx(back);
        let forward = loop_pc as i32 - prep_pc as i32 - 1;
        self.fs().code[prep_pc as usize].set_sbx(forward);

        let break_label = self.fs().blocks.last().unwrap().break_label.unwrap();
        self.fs().bind_label_here(break_label);
        self.fs().leave_block();
        self.fs().patch_labels();
        Ok(())
    }

    fn compile_generic_for(&mut self, names: &[Rc<str>], exprs: &[Expr], body: &Block, line: u32) -> Result<(), CompileError> {
        self.fs().enter_block(true);
        let regs = self.compile_expr_list_to_n(exprs, 3, line)?;
        let base = regs[0];
        for name in names {
            self.fs().declare_local(name.clone(), line)?;
        }

        // JMP straight to the TFORLOOP test, then the body, then the test
        // and its back-edge — the standard Lua-family shape so the loop
        // condition is only ever evaluated once per iteration.
        let jmp_to_test = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 0), line);
        let body_start = self.fs().current_pc();
        self.compile_block(body)?;
        let test_pc = self.fs().current_pc();
        let forward = test_pc as i32 - jmp_to_test as i32 - 1;
        self.fs().code[jmp_to_test as usize].set_sbx(forward);

        self.fs().emit(Instruction::abc(Opcode::TFORLOOP, base as u32, 0, names.len() as u32), line);
        let back_pc = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 0), line);
        let back = body_start as i32 - back_pc as i32 - 1;
        self.fs().code[back_pc as usize].set_sbx(back);

        let break_label = self.fs().blocks.last().unwrap().break_label.unwrap();
        self.fs().bind_label_here(break_label);
        self.fs().leave_block();
        self.fs().patch_labels();
        Ok(())
    }

    fn compile_function_decl(&mut self, target: &Expr, is_method: bool, body: &FunctionBody, line: u32) -> Result<(), CompileError> {
        let place = self.compile_function_body(body, is_method)?;
        match target {
            Expr::Name(name) => {
                if let Some(reg) = self.fs().resolve_local(name) {
                    discharge_to_register(self.fs(), place, reg, line)?;
                } else if let Some(idx) = self.resolve_upvalue_for_current(name) {
                    let reg = discharge_to_any_register(self.fs(), place, line)?;
                    self.fs().emit(Instruction::abc(Opcode::SETUPVAL, reg as u32, idx as u32, 0), line);
                } else {
                    let k = self.fs().add_constant(Value::string(name.clone()), line)?;
                    let reg = discharge_to_any_register(self.fs(), place, line)?;
                    self.fs().emit(Instruction::abx(Opcode::SETGLOBAL, reg as u32, k), line);
                }
            }
            Expr::Field { object, name, .. } => {
                let obj_place = self.compile_expr(object)?;
                let table = discharge_to_any_register(self.fs(), obj_place, line)?;
                let key = self.fs().add_constant(Value::string(name.clone()), line)?;
                let reg = discharge_to_any_register(self.fs(), place, line)?;
                self.fs().emit(Instruction::abc(Opcode::SETTABLEKS, table as u32, key, reg as u32), line);
            }
            _ => return Err(self.err(line, "invalid function declaration target")),
        }
        Ok(())
    }

    fn compile_local_function(&mut self, name: &Rc<str>, body: &FunctionBody, line: u32) -> Result<(), CompileError> {
        // Declare the local first so the function body can call itself
        // recursively by name.
        let reg = self.fs().declare_local(name.clone(), line)?;
        let place = self.compile_function_body(body, false)?;
        discharge_to_register(self.fs(), place, reg, line)?;
        Ok(())
    }

    fn compile_return(&mut self, values: &[Expr], line: u32) -> Result<(), CompileError> {
        let mark = self.fs().reg_top;
        if values.is_empty() {
            self.fs().emit(Instruction::abc(Opcode::RETURN, mark as u32, 1, 0), line);
            return Ok(());
        }
        // `return f(...)` in tail position: the call itself becomes the
        // return, no separate RETURN needed.
        if values.len() == 1 && matches!(values[0], Expr::Call { .. } | Expr::MethodCall { .. }) {
            self.compile_call(&values[0], WantResults::All)?;
            let call_pc = self.fs().current_pc() - 1;
            self.fs().code[call_pc as usize].set_opcode(Opcode::TAILCALL);
            self.fs().free_to(mark);
            return Ok(());
        }
        if values.len() == 1 && is_multret(&values[0]) {
            self.compile_multret_expr(&values[0], 0)?;
            self.fs().emit(Instruction::abc(Opcode::RETURN, mark as u32, 0, 0), line);
            self.fs().free_to(mark);
            return Ok(());
        }
        for v in values {
            let place = self.compile_expr(v)?;
            let target = self.fs().reg_top;
            discharge_to_register(self.fs(), place, target, line)?;
            if self.fs().reg_top == target {
                self.fs().reserve(1, line)?;
            }
        }
        let count = values.len() as u32 + 1;
        self.fs().emit(Instruction::abc(Opcode::RETURN, mark as u32, count, 0), line);
        self.fs().free_to(mark);
        Ok(())
    }

    // -- expressions ----------------------------------------------------------

    pub(super) fn compile_expr(&mut self, expr: &Expr) -> Result<Place, CompileError> {
        let mut expr = expr.clone();
        fold::fold(&mut expr);
        self.compile_expr_inner(&expr)
    }

    fn compile_expr_inner(&mut self, expr: &Expr) -> Result<Place, CompileError> {
        let line = expr_line(expr);
        match expr {
            Expr::Nil => Ok(Place::Nil),
            Expr::True => Ok(Place::True),
            Expr::False => Ok(Place::False),
            Expr::Number(n) => Ok(Place::Number(*n)),
            Expr::Str(s) => {
                let k = self.fs().add_constant(Value::string(s.clone()), line)?;
                Ok(Place::Const(k))
            }
            Expr::Vararg => {
                let r = self.fs().reserve(1, line)?;
                self.fs().emit(Instruction::abc(Opcode::VARARG, r as u32, 2, 0), line);
                Ok(Place::Temp(r))
            }
            Expr::Name(name) => self.compile_name(name, line),
            Expr::Field { object, name, .. } => {
                let obj = self.compile_expr(object)?;
                let table = discharge_to_any_register(self.fs(), obj, line)?;
                let key = self.fs().add_constant(Value::string(name.clone()), line)?;
                let dst = self.fs().reserve(1, line)?;
                self.fs().emit(Instruction::abc(Opcode::GETTABLEKS, dst as u32, table as u32, key), line);
                Ok(Place::Temp(dst))
            }
            Expr::Index { object, key, .. } => {
                let obj = self.compile_expr(object)?;
                let table = discharge_to_any_register(self.fs(), obj, line)?;
                let key_place = self.compile_expr(key)?;
                let key_rk = discharge_to_rk(self.fs(), key_place, line)?;
                let dst = self.fs().reserve(1, line)?;
                self.fs().emit(Instruction::abc(Opcode::GETTABLE, dst as u32, table as u32, key_rk), line);
                Ok(Place::Temp(dst))
            }
            Expr::Call { .. } | Expr::MethodCall { .. } => self.compile_call(expr, WantResults::Exact(1)),
            Expr::Function(body) => self.compile_function_body(body, false),
            Expr::TableConstructor { array_items, keyed_items, line } => {
                self.compile_table_constructor(array_items, keyed_items, *line)
            }
            Expr::Unary { op, operand, line } => self.compile_unary(*op, operand, *line),
            Expr::Binary { op, lhs, rhs, line } => self.compile_binary(*op, lhs, rhs, *line),
            Expr::And { lhs, rhs } => self.compile_and(lhs, rhs),
            Expr::Or { lhs, rhs } => self.compile_or(lhs, rhs),
        }
    }

    fn compile_name(&mut self, name: &str, line: u32) -> Result<Place, CompileError> {
        if let Some(reg) = self.fs().resolve_local(name) {
            return Ok(Place::Fixed(reg));
        }
        if let Some(idx) = self.resolve_upvalue_for_current(name) {
            let dst = self.fs().reserve(1, line)?;
            self.fs().emit(Instruction::abc(Opcode::GETUPVAL, dst as u32, idx as u32, 0), line);
            return Ok(Place::Temp(dst));
        }
        let k = self.fs().add_constant(Value::string(name), line)?;
        let dst = self.fs().reserve(1, line)?;
        self.fs().emit(Instruction::abx(Opcode::GETGLOBAL, dst as u32, k), line);
        Ok(Place::Temp(dst))
    }

    fn compile_unary(&mut self, op: UnOp, operand: &Expr, line: u32) -> Result<Place, CompileError> {
        let place = self.compile_expr(operand)?;
        let src = discharge_to_any_register(self.fs(), place, line)?;
        let dst = self.fs().reserve(1, line)?;
        let opcode = match op {
            UnOp::Neg => Opcode::UNM,
            UnOp::Not => Opcode::NOT,
            UnOp::Len => Opcode::LEN,
        };
        self.fs().emit(Instruction::abc(opcode, dst as u32, src as u32, 0), line);
        Ok(Place::Temp(dst))
    }

    fn compile_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, line: u32) -> Result<Place, CompileError> {
        if op == BinOp::Concat {
            return self.compile_concat(lhs, rhs, line);
        }
        let lhs_place = self.compile_expr(lhs)?;
        let lhs_rk = discharge_to_rk(self.fs(), lhs_place, line)?;
        let rhs_place = self.compile_expr(rhs)?;
        let rhs_rk = discharge_to_rk(self.fs(), rhs_place, line)?;

        let arith = match op {
            BinOp::Add => Some(Opcode::ADD),
            BinOp::Sub => Some(Opcode::SUB),
            BinOp::Mul => Some(Opcode::MUL),
            BinOp::Div => Some(Opcode::DIV),
            BinOp::Mod => Some(Opcode::MOD),
            BinOp::Pow => Some(Opcode::POW),
            _ => None,
        };
        if let Some(opcode) = arith {
            let dst = self.fs().reserve(1, line)?;
            self.fs().emit(Instruction::abc(opcode, dst as u32, lhs_rk, rhs_rk), line);
            return Ok(Place::Temp(dst));
        }

        // Comparisons compile to `OP A B C; if result != A then skip next
        // JMP`. Used standalone (not as a branch condition) they materialize
        // a boolean via LOADBOOL/LOADBOOL-skip.
        let (opcode, want_true) = match op {
            BinOp::Eq => (Opcode::EQ, 1u32),
            BinOp::Ne => (Opcode::EQ, 0u32),
            BinOp::Lt => (Opcode::LT, 1u32),
            BinOp::Gt => (Opcode::LT, 1u32), // a > b compiles as b < a
            BinOp::Le => (Opcode::LE, 1u32),
            BinOp::Ge => (Opcode::LE, 1u32), // a >= b compiles as b <= a
            _ => unreachable!(),
        };
        let (op_b, op_c) = if matches!(op, BinOp::Gt | BinOp::Ge) { (rhs_rk, lhs_rk) } else { (lhs_rk, rhs_rk) };
        self.fs().emit(Instruction::abc(opcode, want_true, op_b, op_c), line);
        let jmp_pc = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 1), line);
        let dst = self.fs().reserve(1, line)?;
        self.fs().emit(Instruction::abc(Opcode::LOADBOOL, dst as u32, 0, 1), line);
        self.fs().emit(Instruction::abc(Opcode::LOADBOOL, dst as u32, 1, 0), line);
        let _ = jmp_pc;
        Ok(Place::Temp(dst))
    }

    fn compile_concat(&mut self, lhs: &Expr, rhs: &Expr, line: u32) -> Result<Place, CompileError> {
        // CONCAT takes a contiguous register run R[B..C]; flatten the
        // right-associative chain into one run when possible.
        let mut parts = Vec::new();
        flatten_concat(lhs, &mut parts);
        flatten_concat(rhs, &mut parts);
        let base = self.fs().reg_top;
        for part in &parts {
            let place = self.compile_expr(part)?;
            let target = self.fs().reg_top;
            discharge_to_register(self.fs(), place, target, line)?;
            if self.fs().reg_top == target {
                self.fs().reserve(1, line)?;
            }
        }
        let dst = self.fs().reserve(1, line)?;
        self.fs().emit(
            Instruction::abc(Opcode::CONCAT, dst as u32, base as u32, (base as u32 + parts.len() as u32).saturating_sub(1)),
            line,
        );
        Ok(Place::Temp(dst))
    }

    fn compile_and(&mut self, lhs: &Expr, rhs: &Expr) -> Result<Place, CompileError> {
        let line = expr_line(lhs);
        let lhs_place = self.compile_expr(lhs)?;
        let reg = match lhs_place {
            // `Fixed` is a local's home register, not a scratch one;
            // discharging it is a no-op, so writing the rhs there later
            // would clobber the local itself. Copy it to a temp first.
            Place::Fixed(r) => {
                let dst = self.fs().reserve(1, line)?;
                emit_move(self.fs(), dst, r, line);
                dst
            }
            other => discharge_to_any_register(self.fs(), other, line)?,
        };
        self.fs().emit(Instruction::abc(Opcode::TEST, reg as u32, 0, 1), line);
        let skip_pc = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 0), line);
        let rhs_place = self.compile_expr(rhs)?;
        discharge_to_register(self.fs(), rhs_place, reg, line)?;
        let after = self.fs().current_pc();
        let offset = after as i32 - skip_pc as i32 - 1;
        self.fs().code[skip_pc as usize].set_sbx(offset);
        Ok(Place::Temp(reg))
    }

    fn compile_or(&mut self, lhs: &Expr, rhs: &Expr) -> Result<Place, CompileError> {
        let line = expr_line(lhs);
        let lhs_place = self.compile_expr(lhs)?;
        let reg = match lhs_place {
            Place::Fixed(r) => {
                let dst = self.fs().reserve(1, line)?;
                emit_move(self.fs(), dst, r, line);
                dst
            }
            other => discharge_to_any_register(self.fs(), other, line)?,
        };
        self.fs().emit(Instruction::abc(Opcode::TEST, reg as u32, 0, 0), line);
        let skip_pc = self.fs().emit(Instruction::asbx(Opcode::JMP, 0, 0), line);
        let rhs_place = self.compile_expr(rhs)?;
        discharge_to_register(self.fs(), rhs_place, reg, line)?;
        let after = self.fs().current_pc();
        let offset = after as i32 - skip_pc as i32 - 1;
        self.fs().code[skip_pc as usize].set_sbx(offset);
        Ok(Place::Temp(reg))
    }

    /// Compiles a call/method-call/vararg expression wanting a specific
    /// result count (`WantResults::Exact(1)` for a normal expression
    /// position, `Discard`/`All` for statement and tail positions).
    fn compile_call(&mut self, expr: &Expr, want: WantResults) -> Result<Place, CompileError> {
        let line = expr_line(expr);
        let base = self.fs().reg_top;
        let (callee, args, is_method) = match expr {
            Expr::Call { callee, args, .. } => (callee.as_ref(), args.as_slice(), false),
            Expr::MethodCall { object, method, args, .. } => {
                let obj_place = self.compile_expr(object)?;
                let obj_reg = discharge_to_any_register(self.fs(), obj_place, line)?;
                let key = self.fs().add_constant(Value::string(method.clone()), line)?;
                let self_base = self.fs().reserve(2, line)?;
                self.fs().emit(
                    Instruction::abc(Opcode::SELFOP, self_base as u32, obj_reg as u32, q_asm::rk_from_const(key)),
                    line,
                );
                for (i, a) in args.iter().enumerate() {
                    let is_last = i + 1 == args.len();
                    let target = self.fs().reg_top;
                    if is_last && is_multret(a) {
                        self.compile_multret_expr(a, 0)?;
                    } else {
                        let place = self.compile_expr(a)?;
                        discharge_to_register(self.fs(), place, target, line)?;
                        if self.fs().reg_top == target {
                            self.fs().reserve(1, line)?;
                        }
                    }
                }
                let nargs = if args.last().map(is_multret).unwrap_or(false) { 0 } else { self.fs().reg_top - self_base };
                let want_c = want_to_c(want);
                self.fs().emit(Instruction::abc(Opcode::CALL, self_base as u32, nargs as u32, want_c), line);
                return Ok(place_for_call(self_base, want));
            }
            _ => unreachable!(),
        };
        let callee_place = self.compile_expr(callee)?;
        let callee_reg = discharge_to_any_register(self.fs(), callee_place, line)?;
        debug_assert_eq!(callee_reg, base);
        for (i, a) in args.iter().enumerate() {
            let is_last = i + 1 == args.len();
            let target = self.fs().reg_top;
            if is_last && is_multret(a) {
                self.compile_multret_expr(a, 0)?;
            } else {
                let place = self.compile_expr(a)?;
                discharge_to_register(self.fs(), place, target, line)?;
                if self.fs().reg_top == target {
                    self.fs().reserve(1, line)?;
                }
            }
        }
        let nargs = if args.last().map(is_multret).unwrap_or(false) { 0 } else { self.fs().reg_top - base };
        let want_c = want_to_c(want);
        self.fs().emit(Instruction::abc(Opcode::CALL, base as u32, nargs as u32, want_c), line);
        let _ = is_method;
        Ok(place_for_call(base, want))
    }

    /// Compiles a call/vararg expression in "multret" position: it must end
    /// up at the current register top and request `extra` more results than
    /// a single value would (0 meaning "all the way to top").
    fn compile_multret_expr(&mut self, expr: &Expr, extra: u8) -> Result<(), CompileError> {
        let want = if extra == 0 { WantResults::All } else { WantResults::Exact(extra) };
        match expr {
            Expr::Call { .. } | Expr::MethodCall { .. } => {
                self.compile_call(expr, want)?;
            }
            Expr::Vararg => {
                let r = self.fs().reserve(1, expr_line(expr))?;
                let b = match want {
                    WantResults::All => 0,
                    WantResults::Exact(n) => n as u32 + 1,
                    WantResults::Discard => 1,
                };
                self.fs().emit(Instruction::abc(Opcode::VARARG, r as u32, b, 0), expr_line(expr));
            }
            _ => unreachable!("compile_multret_expr called on a non-multret expression"),
        }
        Ok(())
    }

    fn compile_table_constructor(&mut self, array_items: &[Expr], keyed_items: &[(Expr, Expr)], line: u32) -> Result<Place, CompileError> {
        let table_reg = self.fs().reserve(1, line)?;
        self.fs().emit(Instruction::abc(Opcode::NEWTABLE, table_reg as u32, int2fb(array_items.len()), int2fb(keyed_items.len())), line);

        let mut pending = 0usize;
        let mut flushed_blocks = 0u32;
        let item_base = self.fs().reg_top;
        for (i, item) in array_items.iter().enumerate() {
            let is_last = i + 1 == array_items.len();
            let target = self.fs().reg_top;
            if is_last && is_multret(item) {
                self.compile_multret_expr(item, 0)?;
                self.fs().emit(Instruction::abc(Opcode::SETLIST, table_reg as u32, 0, flushed_blocks + 1), line);
                pending = 0;
            } else {
                let place = self.compile_expr(item)?;
                discharge_to_register(self.fs(), place, target, line)?;
                if self.fs().reg_top == target {
                    self.fs().reserve(1, line)?;
                }
                pending += 1;
                if pending == FIELDS_PER_FLUSH {
                    flushed_blocks += 1;
                    self.fs().emit(Instruction::abc(Opcode::SETLIST, table_reg as u32, pending as u32, flushed_blocks), line);
                    self.fs().free_to(item_base);
                    pending = 0;
                }
            }
        }
        if pending > 0 {
            flushed_blocks += 1;
            self.fs().emit(Instruction::abc(Opcode::SETLIST, table_reg as u32, pending as u32, flushed_blocks), line);
            self.fs().free_to(item_base);
        }

        for (key, value) in keyed_items {
            let key_place = match key {
                Expr::Str(s) => {
                    let k = self.fs().add_constant(Value::string(s.clone()), line)?;
                    let v_place = self.compile_expr(value)?;
                    let v_rk = discharge_to_rk(self.fs(), v_place, line)?;
                    self.fs().emit(Instruction::abc(Opcode::SETTABLEKS, table_reg as u32, k, v_rk), line);
                    continue;
                }
                other => self.compile_expr(other)?,
            };
            let key_rk = discharge_to_rk(self.fs(), key_place, line)?;
            let v_place = self.compile_expr(value)?;
            let v_rk = discharge_to_rk(self.fs(), v_place, line)?;
            self.fs().emit(Instruction::abc(Opcode::SETTABLE, table_reg as u32, key_rk, v_rk), line);
        }

        self.fs().free_to(table_reg + 1);
        Ok(Place::Temp(table_reg))
    }

    fn compile_function_body(&mut self, body: &FunctionBody, is_method: bool) -> Result<Place, CompileError> {
        let (proto, upvalues) = self.compile_nested_function(body, is_method)?;
        let proto_idx = self.fs().protos_push(proto);
        let dst = self.fs().reserve(1, body.line)?;
        self.fs().emit(Instruction::abx(Opcode::CLOSURE, dst as u32, proto_idx), body.line);
        // Upvalue capture pseudo-instructions follow immediately: one MOVE
        // (parent local) or GETUPVAL (re-exported parent upvalue) per
        // upvalue, consumed by the VM's CLOSURE handler rather than
        // executed as ordinary instructions.
        for uv in upvalues {
            match uv {
                UpvalueSource::ParentLocal(reg) => {
                    self.fs().emit(Instruction::abc(Opcode::MOVE, 0, reg as u32, 0), body.line);
                }
                UpvalueSource::ParentUpvalue(idx) => {
                    self.fs().emit(Instruction::abc(Opcode::GETUPVAL, 0, idx as u32, 0), body.line);
                }
            }
        }
        Ok(Place::Temp(dst))
    }
}

fn expr_line(expr: &Expr) -> u32 {
    match expr {
        Expr::Index { line, .. }
        | Expr::Field { line, .. }
        | Expr::Call { line, .. }
        | Expr::MethodCall { line, .. }
        | Expr::TableConstructor { line, .. }
        | Expr::Binary { line, .. }
        | Expr::Unary { line, .. } => *line,
        Expr::Function(body) => body.line,
        _ => 0,
    }
}

fn is_multret(expr: &Expr) -> bool {
    matches!(expr, Expr::Call { .. } | Expr::MethodCall { .. } | Expr::Vararg)
}

fn flatten_concat(expr: &Expr, out: &mut Vec<Expr>) {
    if let Expr::Binary { op: BinOp::Concat, lhs, rhs, .. } = expr {
        flatten_concat(lhs, out);
        flatten_concat(rhs, out);
    } else {
        out.push(expr.clone());
    }
}

fn want_to_c(want: WantResults) -> u32 {
    match want {
        WantResults::Discard => 1,
        WantResults::Exact(n) => n as u32 + 1,
        WantResults::All => 0,
    }
}

fn place_for_call(base: u8, want: WantResults) -> Place {
    match want {
        WantResults::All => Place::OpenMulti(base),
        _ => Place::Temp(base),
    }
}

/// Encodes a size hint as a "floating-point byte" (mantissa × 2^exp), the
/// same compact encoding `NEWTABLE`'s array/hash hints use.
fn int2fb(mut n: usize) -> u32 {
    let mut exp = 0u32;
    while n > 0x1f {
        n = (n + 1) >> 1;
        exp += 1;
    }
    if exp == 0 {
        n as u32
    } else {
        (((n as u32 - 0x10) << 5) | exp << 0) | 0
    }
}
