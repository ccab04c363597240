//! A compact recursive-descent parser producing [`crate::ast`] nodes.
//!
//! Out of scope per design: grammar is assumed external and stable. This is
//! the minimal enabling implementation the compiler needs to have an AST to
//! lower — standard Pratt-style expression parsing over the operator set.

use std::rc::Rc;

use crate::ast::*;
use crate::error::CompileError;
use crate::lexer::{Lexer, Token};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    tok: Token,
    line: u32,
    source_name: String,
}

type PResult<T> = Result<T, CompileError>;

impl<'a> Parser<'a> {
    pub fn new(source: &'a str, source_name: impl Into<String>) -> PResult<Self> {
        let source_name = source_name.into();
        let mut lexer = Lexer::new(source, source_name.clone());
        let (tok, line) = lexer.next_token()?;
        Ok(Self { lexer, tok, line, source_name })
    }

    fn err(&self, msg: impl Into<String>) -> CompileError {
        CompileError::new(self.source_name.clone(), self.line, msg)
    }

    fn incomplete(&self, msg: impl Into<String>) -> CompileError {
        CompileError::incomplete(self.source_name.clone(), self.line, msg)
    }

    fn bump(&mut self) -> PResult<Token> {
        let prev = std::mem::replace(&mut self.tok, Token::Eof);
        let (tok, line) = self.lexer.next_token()?;
        self.tok = tok;
        self.line = line;
        Ok(prev)
    }

    fn expect(&mut self, want: &Token, what: &str) -> PResult<()> {
        if &self.tok == want {
            self.bump()?;
            Ok(())
        } else if self.tok == Token::Eof {
            Err(self.incomplete(format!("expected {what}, got end of input")))
        } else {
            Err(self.err(format!("expected {what}")))
        }
    }

    fn expect_name(&mut self) -> PResult<Rc<str>> {
        match self.bump()? {
            Token::Name(n) => Ok(n),
            Token::Eof => Err(self.incomplete("expected name, got end of input")),
            _ => Err(self.err("expected name")),
        }
    }

    pub fn parse_chunk(&mut self) -> PResult<Block> {
        let block = self.parse_block()?;
        if self.tok != Token::Eof {
            return Err(self.err("unexpected trailing tokens"));
        }
        Ok(block)
    }

    fn block_end(&self) -> bool {
        matches!(
            self.tok,
            Token::Eof | Token::End | Token::Else | Token::Elseif | Token::Until
        )
    }

    fn parse_block(&mut self) -> PResult<Block> {
        let mut stats = Vec::new();
        while !self.block_end() {
            if self.tok == Token::Return {
                stats.push(self.parse_return()?);
                break;
            }
            if self.tok == Token::Semi {
                self.bump()?;
                continue;
            }
            stats.push(self.parse_stat()?);
        }
        Ok(Block { stats })
    }

    fn parse_return(&mut self) -> PResult<Stat> {
        let line = self.line;
        self.bump()?;
        let mut values = Vec::new();
        if !self.block_end() && self.tok != Token::Semi {
            values.push(self.parse_expr()?);
            while self.tok == Token::Comma {
                self.bump()?;
                values.push(self.parse_expr()?);
            }
        }
        if self.tok == Token::Semi {
            self.bump()?;
        }
        Ok(Stat::Return { values, line })
    }

    fn parse_stat(&mut self) -> PResult<Stat> {
        let line = self.line;
        match self.tok.clone() {
            Token::Local => {
                self.bump()?;
                if self.tok == Token::Function {
                    self.bump()?;
                    let name = self.expect_name()?;
                    let body = self.parse_function_body()?;
                    return Ok(Stat::LocalFunction { name, body, line });
                }
                let mut names = vec![self.expect_name()?];
                while self.tok == Token::Comma {
                    self.bump()?;
                    names.push(self.expect_name()?);
                }
                let mut values = Vec::new();
                if self.tok == Token::Assign {
                    self.bump()?;
                    values.push(self.parse_expr()?);
                    while self.tok == Token::Comma {
                        self.bump()?;
                        values.push(self.parse_expr()?);
                    }
                }
                Ok(Stat::Local { names, values, line })
            }
            Token::Do => {
                self.bump()?;
                let block = self.parse_block()?;
                self.expect(&Token::End, "'end'")?;
                Ok(Stat::Do(block))
            }
            Token::While => {
                self.bump()?;
                let cond = self.parse_expr()?;
                self.expect(&Token::Do, "'do'")?;
                let body = self.parse_block()?;
                self.expect(&Token::End, "'end'")?;
                Ok(Stat::While { cond, body, line })
            }
            Token::Repeat => {
                self.bump()?;
                let body = self.parse_block()?;
                self.expect(&Token::Until, "'until'")?;
                let cond = self.parse_expr()?;
                Ok(Stat::Repeat { body, cond, line })
            }
            Token::If => self.parse_if(),
            Token::For => self.parse_for(),
            Token::Function => {
                self.bump()?;
                let mut target = Expr::Name(self.expect_name()?);
                let mut is_method = false;
                loop {
                    match self.tok.clone() {
                        Token::Dot => {
                            self.bump()?;
                            let name = self.expect_name()?;
                            target = Expr::Field { object: Box::new(target), name, line: self.line };
                        }
                        Token::Colon => {
                            self.bump()?;
                            let name = self.expect_name()?;
                            target = Expr::Field { object: Box::new(target), name, line: self.line };
                            is_method = true;
                            break;
                        }
                        _ => break,
                    }
                }
                let body = self.parse_function_body()?;
                Ok(Stat::FunctionDecl { target, is_method, body, line })
            }
            Token::Break => {
                self.bump()?;
                Ok(Stat::Break { line })
            }
            _ => self.parse_assign_or_call(),
        }
    }

    fn parse_if(&mut self) -> PResult<Stat> {
        let line = self.line;
        self.bump()?;
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(&Token::Then, "'then'")?;
        let block = self.parse_block()?;
        arms.push((cond, block));
        let mut else_block = None;
        loop {
            match self.tok {
                Token::Elseif => {
                    self.bump()?;
                    let cond = self.parse_expr()?;
                    self.expect(&Token::Then, "'then'")?;
                    let block = self.parse_block()?;
                    arms.push((cond, block));
                }
                Token::Else => {
                    self.bump()?;
                    else_block = Some(self.parse_block()?);
                    break;
                }
                _ => break,
            }
        }
        self.expect(&Token::End, "'end'")?;
        Ok(Stat::If { arms, else_block, line })
    }

    fn parse_for(&mut self) -> PResult<Stat> {
        let line = self.line;
        self.bump()?;
        let first = self.expect_name()?;
        if self.tok == Token::Assign {
            self.bump()?;
            let init = self.parse_expr()?;
            self.expect(&Token::Comma, "','")?;
            let limit = self.parse_expr()?;
            let step = if self.tok == Token::Comma {
                self.bump()?;
                Some(self.parse_expr()?)
            } else {
                None
            };
            self.expect(&Token::Do, "'do'")?;
            let body = self.parse_block()?;
            self.expect(&Token::End, "'end'")?;
            Ok(Stat::NumericFor { var: first, init, limit, step, body, line })
        } else {
            let mut names = vec![first];
            while self.tok == Token::Comma {
                self.bump()?;
                names.push(self.expect_name()?);
            }
            self.expect(&Token::In, "'in'")?;
            let mut exprs = vec![self.parse_expr()?];
            while self.tok == Token::Comma {
                self.bump()?;
                exprs.push(self.parse_expr()?);
            }
            self.expect(&Token::Do, "'do'")?;
            let body = self.parse_block()?;
            self.expect(&Token::End, "'end'")?;
            Ok(Stat::GenericFor { names, exprs, body, line })
        }
    }

    fn parse_assign_or_call(&mut self) -> PResult<Stat> {
        let line = self.line;
        let first = self.parse_suffixed_expr()?;
        if self.tok == Token::Assign || self.tok == Token::Comma {
            let mut targets = vec![first];
            while self.tok == Token::Comma {
                self.bump()?;
                targets.push(self.parse_suffixed_expr()?);
            }
            self.expect(&Token::Assign, "'='")?;
            let mut values = vec![self.parse_expr()?];
            while self.tok == Token::Comma {
                self.bump()?;
                values.push(self.parse_expr()?);
            }
            Ok(Stat::Assign { targets, values, line })
        } else {
            Ok(Stat::ExprStat(first))
        }
    }

    fn parse_function_body(&mut self) -> PResult<FunctionBody> {
        let line = self.line;
        self.expect(&Token::LParen, "'('")?;
        let mut params = Vec::new();
        let mut is_vararg = false;
        if self.tok != Token::RParen {
            loop {
                if self.tok == Token::DotDotDot {
                    self.bump()?;
                    is_vararg = true;
                    break;
                }
                params.push(self.expect_name()?);
                if self.tok == Token::Comma {
                    self.bump()?;
                } else {
                    break;
                }
            }
        }
        self.expect(&Token::RParen, "')'")?;
        let block = self.parse_block()?;
        self.expect(&Token::End, "'end'")?;
        Ok(FunctionBody { params, is_vararg, block, line })
    }

    // Expression parsing: precedence climbing.
    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.tok == Token::Or {
            self.bump()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Or { lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_compare()?;
        while self.tok == Token::And {
            self.bump()?;
            let rhs = self.parse_compare()?;
            lhs = Expr::And { lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_compare(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_concat()?;
        loop {
            let op = match self.tok {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_concat()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_concat(&mut self) -> PResult<Expr> {
        let lhs = self.parse_additive()?;
        if self.tok == Token::Concat {
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_concat()?; // right-associative
            return Ok(Expr::Binary { op: BinOp::Concat, lhs: Box::new(lhs), rhs: Box::new(rhs), line });
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.tok {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.tok {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let line = self.line;
        let op = match self.tok {
            Token::Minus => Some(UnOp::Neg),
            Token::Not => Some(UnOp::Not),
            Token::Hash => Some(UnOp::Len),
            _ => None,
        };
        if let Some(op) = op {
            self.bump()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary { op, operand: Box::new(operand), line });
        }
        self.parse_pow()
    }

    fn parse_pow(&mut self) -> PResult<Expr> {
        let lhs = self.parse_suffixed_expr()?;
        if self.tok == Token::Caret {
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_unary()?; // right-associative, binds tighter than unary on lhs
            return Ok(Expr::Binary { op: BinOp::Pow, lhs: Box::new(lhs), rhs: Box::new(rhs), line });
        }
        Ok(lhs)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let line = self.line;
        match self.bump()? {
            Token::Nil => Ok(Expr::Nil),
            Token::True => Ok(Expr::True),
            Token::False => Ok(Expr::False),
            Token::Number(n) => Ok(Expr::Number(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::DotDotDot => Ok(Expr::Vararg),
            Token::Name(n) => Ok(Expr::Name(n)),
            Token::Function => Ok(Expr::Function(Rc::new(self.parse_function_body()?))),
            Token::LParen => {
                let e = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(e)
            }
            Token::LBrace => self.parse_table_constructor(line),
            Token::Eof => Err(self.incomplete("unexpected end of input in expression")),
            _ => Err(self.err("unexpected token in expression")),
        }
    }

    fn parse_table_constructor(&mut self, line: u32) -> PResult<Expr> {
        let mut array_items = Vec::new();
        let mut keyed_items = Vec::new();
        while self.tok != Token::RBrace {
            if self.tok == Token::LBracket {
                self.bump()?;
                let key = self.parse_expr()?;
                self.expect(&Token::RBracket, "']'")?;
                self.expect(&Token::Assign, "'='")?;
                let value = self.parse_expr()?;
                keyed_items.push((key, value));
            } else if let Token::Name(name) = self.tok.clone() {
                // Lookahead: `name = expr` is a keyed field, else an array item.
                let save_tok = self.tok.clone();
                let save_line = self.line;
                self.bump()?;
                if self.tok == Token::Assign {
                    self.bump()?;
                    let value = self.parse_expr()?;
                    keyed_items.push((Expr::Str(name), value));
                } else {
                    // Not a keyed field; reparse as a full expression starting
                    // from the name we already consumed.
                    let mut expr = Expr::Name(match save_tok {
                        Token::Name(n) => n,
                        _ => unreachable!(),
                    });
                    expr = self.continue_suffixed(expr, save_line)?;
                    let expr = self.continue_binary_from_suffixed(expr)?;
                    array_items.push(expr);
                }
            } else {
                array_items.push(self.parse_expr()?);
            }
            if self.tok == Token::Comma || self.tok == Token::Semi {
                self.bump()?;
            } else {
                break;
            }
        }
        self.expect(&Token::RBrace, "'}'")?;
        Ok(Expr::TableConstructor { array_items, keyed_items, line })
    }

    /// Continues parsing binary operators after a suffixed expression that
    /// was reconstructed mid-stream (used only by the table-constructor
    /// lookahead above, since normal expression parsing goes top-down).
    fn continue_binary_from_suffixed(&mut self, lhs: Expr) -> PResult<Expr> {
        // Re-enter precedence climbing at the lowest applicable level by
        // simulating `parse_pow`'s caller chain with `lhs` as the seed.
        let mut lhs = lhs;
        if self.tok == Token::Caret {
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op: BinOp::Pow, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        loop {
            let op = match self.tok {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        loop {
            let op = match self.tok {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        if self.tok == Token::Concat {
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_concat()?;
            lhs = Expr::Binary { op: BinOp::Concat, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        loop {
            let op = match self.tok {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => break,
            };
            let line = self.line;
            self.bump()?;
            let rhs = self.parse_concat()?;
            lhs = Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs), line };
        }
        while self.tok == Token::And {
            self.bump()?;
            let rhs = self.parse_compare()?;
            lhs = Expr::And { lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        while self.tok == Token::Or {
            self.bump()?;
            let rhs = self.parse_and()?;
            lhs = Expr::Or { lhs: Box::new(lhs), rhs: Box::new(rhs) };
        }
        Ok(lhs)
    }

    fn parse_suffixed_expr(&mut self) -> PResult<Expr> {
        let line = self.line;
        let primary = self.parse_primary()?;
        self.continue_suffixed(primary, line)
    }

    fn continue_suffixed(&mut self, mut expr: Expr, _line: u32) -> PResult<Expr> {
        loop {
            match self.tok.clone() {
                Token::Dot => {
                    let line = self.line;
                    self.bump()?;
                    let name = self.expect_name()?;
                    expr = Expr::Field { object: Box::new(expr), name, line };
                }
                Token::LBracket => {
                    let line = self.line;
                    self.bump()?;
                    let key = self.parse_expr()?;
                    self.expect(&Token::RBracket, "']'")?;
                    expr = Expr::Index { object: Box::new(expr), key: Box::new(key), line };
                }
                Token::Colon => {
                    let line = self.line;
                    self.bump()?;
                    let method = self.expect_name()?;
                    let args = self.parse_call_args()?;
                    expr = Expr::MethodCall { object: Box::new(expr), method, args, line };
                }
                Token::LParen | Token::Str(_) | Token::LBrace => {
                    let line = self.line;
                    let args = self.parse_call_args()?;
                    expr = Expr::Call { callee: Box::new(expr), args, line };
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> PResult<Vec<Expr>> {
        match self.tok.clone() {
            Token::LParen => {
                self.bump()?;
                let mut args = Vec::new();
                if self.tok != Token::RParen {
                    args.push(self.parse_expr()?);
                    while self.tok == Token::Comma {
                        self.bump()?;
                        args.push(self.parse_expr()?);
                    }
                }
                self.expect(&Token::RParen, "')'")?;
                Ok(args)
            }
            Token::Str(s) => {
                self.bump()?;
                Ok(vec![Expr::Str(s)])
            }
            Token::LBrace => {
                let line = self.line;
                self.bump()?;
                Ok(vec![self.parse_table_constructor(line)?])
            }
            _ => Err(self.err("expected function arguments")),
        }
    }
}

/// Convenience entry point for compiling a whole chunk of source.
pub fn parse(source: &str, source_name: impl Into<String>) -> PResult<Block> {
    Parser::new(source, source_name)?.parse_chunk()
}
