// BBASIC: an interpreter for a subset of BBC BASIC II.
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

//! Recursive-descent parser turning tokenised source lines into the
//! statement/expression arena and the parser-facing line list consumed
//! by `Program::build`.

use crate::ast::{Arena, Builtin, BinOp, ExprId, ExprKind, LValue, PrintItem, StmtId, StmtKind, UnOp};
use crate::lexer::{self, Token};
use crate::program::ParsedLine;
use crate::value::Value;

#[derive(Debug)]
pub struct ParseError {
    pub line: i32,
    pub message: String,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "Syntax error at line {}: {}", self.line, self.message)
    }
}

type PResult<T> = Result<T, ParseError>;

/// Parses a complete program's source text (one statement-bearing line
/// per `\n`-terminated line, each beginning with a line number) into the
/// arena and per-line statement chains `Program::build` flattens.
pub fn parse_program(arena: &mut Arena, src: &str) -> PResult<Vec<ParsedLine>> {
    let mut lines = Vec::new();
    for raw in src.lines() {
        if raw.trim().is_empty() {
            continue;
        }
        let tokens = lexer::tokenize(raw);
        let mut p = Parser { tokens, pos: 0, arena, line: 0 };
        let number = match p.tokens.get(0) {
            Some(Token::LineNumber(n)) => *n,
            _ => return Err(p.err("expected a line number")),
        };
        p.pos = 1;
        p.line = number;

        let first = p.parse_statement()?;
        let mut last = first;
        while p.eat_colon() {
            let next = p.parse_statement()?;
            p.arena.link_stmts(last, Some(next));
            last = next;
        }
        p.expect_eof()?;
        lines.push(ParsedLine { number, first, last });
    }
    Ok(lines)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    arena: &'a mut Arena,
    line: i32,
}

impl<'a> Parser<'a> {
    fn err(&self, message: &str) -> ParseError {
        ParseError { line: self.line, message: message.to_string() }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        self.pos += 1;
        t
    }

    fn eat_colon(&mut self) -> bool {
        if matches!(self.peek(), Token::Colon) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_eof(&self) -> PResult<()> {
        if matches!(self.peek(), Token::Eof) {
            Ok(())
        } else {
            Err(self.err("trailing tokens on line"))
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Token::Keyword(k) if k == kw)
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.is_keyword(kw) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> PResult<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            Err(self.err(&format!("expected '{}'", kw)))
        }
    }

    fn eat_symbol(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Token::Symbol(s) if s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_symbol(&mut self, sym: &str) -> PResult<()> {
        if self.eat_symbol(sym) {
            Ok(())
        } else {
            Err(self.err(&format!("expected '{}'", sym)))
        }
    }

    fn ident(&mut self) -> PResult<String> {
        match self.advance() {
            Token::Ident(s) => Ok(s),
            _ => Err(self.err("expected an identifier")),
        }
    }

    fn add_stmt(&mut self, kind: StmtKind) -> StmtId {
        self.arena.add_stmt(self.line, kind)
    }

    // ---- statements ----------------------------------------------------

    fn parse_statement(&mut self) -> PResult<StmtId> {
        if self.eat_keyword("LET") {
            return self.parse_assignment();
        }
        if self.eat_keyword("PRINT") || matches!(self.peek(), Token::Keyword(k) if k == "PRINT#") {
            return self.parse_print_like(false);
        }
        if matches!(self.peek(), Token::Keyword(k) if k == "INPUT" || k == "INPUT#") {
            return self.parse_input();
        }
        if self.eat_keyword("IF") {
            return self.parse_if();
        }
        if self.eat_keyword("FOR") {
            return self.parse_for();
        }
        if self.eat_keyword("NEXT") {
            return self.parse_next();
        }
        if self.eat_keyword("REPEAT") {
            return Ok(self.add_stmt(StmtKind::Repeat));
        }
        if self.eat_keyword("UNTIL") {
            let cond = self.parse_expr()?;
            return Ok(self.add_stmt(StmtKind::Until(cond)));
        }
        if self.eat_keyword("GOTO") {
            let target = self.parse_expr()?;
            return Ok(self.add_stmt(StmtKind::Goto(target)));
        }
        if self.eat_keyword("GOSUB") {
            let target = self.parse_expr()?;
            return Ok(self.add_stmt(StmtKind::Gosub(target)));
        }
        if self.eat_keyword("RETURN") {
            return Ok(self.add_stmt(StmtKind::Return));
        }
        if self.eat_keyword("ON") {
            return self.parse_on();
        }
        if self.eat_keyword("DEF") {
            return self.parse_def();
        }
        if self.eat_keyword("ENDPROC") {
            return Ok(self.add_stmt(StmtKind::EndProc));
        }
        if matches!(self.peek(), Token::Keyword(k) if k == "PROC") {
            self.pos += 1;
            return self.parse_proc_call();
        }
        if self.eat_keyword("LOCAL") {
            return self.parse_local();
        }
        if self.eat_keyword("DIM") {
            return self.parse_dim();
        }
        if self.eat_keyword("READ") {
            return self.parse_read();
        }
        if self.eat_keyword("DATA") {
            return self.parse_data();
        }
        if self.eat_keyword("RESTORE") {
            return self.parse_restore();
        }
        if self.eat_keyword("TRACE") {
            return self.parse_trace();
        }
        if self.eat_keyword("END") {
            return Ok(self.add_stmt(StmtKind::End));
        }
        if self.eat_keyword("STOP") {
            return Ok(self.add_stmt(StmtKind::Stop));
        }
        if self.eat_keyword("REPORT") {
            return Ok(self.add_stmt(StmtKind::Report));
        }
        if matches!(self.peek(), Token::Keyword(k) if k == "CLOSE#") {
            self.pos += 1;
            let fd = self.parse_expr()?;
            return Ok(self.add_stmt(StmtKind::Close(fd)));
        }
        if self.eat_symbol("=") {
            // A bare `=expr` statement is the FN return form.
            let e = self.parse_expr()?;
            return Ok(self.add_stmt(StmtKind::FnReturn(e)));
        }
        if matches!(self.peek(), Token::Keyword(k) if k == "BPUT#") {
            self.pos += 1;
            let fd = self.parse_expr()?;
            self.expect_symbol(",")?;
            let byte = self.parse_expr()?;
            return Ok(self.add_stmt(StmtKind::BputHash(fd, byte)));
        }

        // Otherwise it's an assignment (variable, array element, or
        // PTR# pseudo-lvalue) or a bare expression statement (an FN
        // call used for its side effects).
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<StmtId> {
        if matches!(self.peek(), Token::Keyword(k) if k == "PTR#") {
            self.pos += 1;
            self.expect_symbol("(")?;
            let fd = self.parse_expr()?;
            self.expect_symbol(")")?;
            self.expect_symbol("=")?;
            let rhs = self.parse_expr()?;
            return Ok(self.add_stmt(StmtKind::Assign(LValue::PtrHash(fd), rhs)));
        }
        let start = self.pos;
        if let Token::Ident(name) = self.peek().clone() {
            self.pos += 1;
            let lvalue = if self.eat_symbol("(") {
                let subs = self.parse_expr_list(")")?;
                LValue::ArrayElem(name, subs)
            } else {
                LValue::Variable(name)
            };
            if self.eat_symbol("=") {
                let rhs = self.parse_expr()?;
                return Ok(self.add_stmt(StmtKind::Assign(lvalue, rhs)));
            }
        }
        // Not an assignment after all -- rewind and parse as a bare
        // expression statement (an FN/PROC call for its side effects).
        self.pos = start;
        let e = self.parse_expr()?;
        Ok(self.add_stmt(StmtKind::Expr(e)))
    }

    fn parse_print_like(&mut self, _input: bool) -> PResult<StmtId> {
        if matches!(self.peek(), Token::Keyword(k) if k == "PRINT#") {
            self.pos += 1;
            let fd = self.parse_expr()?;
            self.eat_symbol(",");
            let mut values = vec![self.parse_expr()?];
            while self.eat_symbol(",") {
                values.push(self.parse_expr()?);
            }
            // Encoded as a channel-tagged print list: the fd leads,
            // `PrintItem::Semicolon` separates it from the payload
            // expressions the dispatcher writes out as binary records.
            let mut items = vec![PrintItem::Expr(fd), PrintItem::Semicolon];
            items.extend(values.into_iter().map(PrintItem::Expr));
            return Ok(self.add_stmt(StmtKind::Print(items)));
        }
        self.expect_keyword("PRINT")?;
        let items = self.parse_print_items()?;
        Ok(self.add_stmt(StmtKind::Print(items)))
    }

    fn parse_print_items(&mut self) -> PResult<Vec<PrintItem>> {
        let mut items = Vec::new();
        loop {
            match self.peek().clone() {
                Token::Symbol(s) if s == ";" => {
                    self.pos += 1;
                    items.push(PrintItem::Semicolon);
                }
                Token::Symbol(s) if s == "," => {
                    self.pos += 1;
                    items.push(PrintItem::Comma);
                }
                Token::Symbol(s) if s == "'" => {
                    self.pos += 1;
                    items.push(PrintItem::Apostrophe);
                }
                Token::Colon | Token::Eof => break,
                _ => items.push(PrintItem::Expr(self.parse_expr()?)),
            }
        }
        Ok(items)
    }

    fn parse_input(&mut self) -> PResult<StmtId> {
        let is_hash = matches!(self.peek(), Token::Keyword(k) if k == "INPUT#");
        self.pos += 1;
        if is_hash {
            let fd = self.parse_expr()?;
            self.eat_symbol(",");
            let mut targets = vec![LValue::PtrHash(fd)];
            loop {
                targets.push(self.parse_lvalue()?);
                if !self.eat_symbol(",") {
                    break;
                }
            }
            // `LValue::PtrHash(fd)` leads the target list so the
            // dispatcher can recover the channel before reading records
            // into the remaining lvalues.
            return Ok(self.add_stmt(StmtKind::Read(targets)));
        }
        let line_flag = self.eat_keyword("LINE");
        let items = self.parse_print_items()?;
        Ok(self.add_stmt(StmtKind::Input(items, line_flag)))
    }

    fn parse_lvalue(&mut self) -> PResult<LValue> {
        let name = self.ident()?;
        if self.eat_symbol("(") {
            let subs = self.parse_expr_list(")")?;
            Ok(LValue::ArrayElem(name, subs))
        } else {
            Ok(LValue::Variable(name))
        }
    }

    fn parse_if(&mut self) -> PResult<StmtId> {
        let cond = self.parse_expr()?;
        self.expect_keyword("THEN")?;
        let then_branch = self.parse_statement()?;
        let mut then_last = then_branch;
        while self.eat_colon() && !self.is_keyword("ELSE") {
            let s = self.parse_statement()?;
            self.arena.link_stmts(then_last, Some(s));
            then_last = s;
        }
        let else_branch = if self.eat_keyword("ELSE") {
            let first = self.parse_statement()?;
            let mut last = first;
            while self.eat_colon() {
                let s = self.parse_statement()?;
                self.arena.link_stmts(last, Some(s));
                last = s;
            }
            Some(first)
        } else {
            None
        };
        Ok(self.add_stmt(StmtKind::If(cond, then_branch, else_branch)))
    }

    fn parse_for(&mut self) -> PResult<StmtId> {
        let var = self.ident()?;
        self.expect_symbol("=")?;
        let from = self.parse_expr()?;
        self.expect_keyword("TO")?;
        let term = self.parse_expr()?;
        let step = if self.eat_keyword("STEP") {
            self.parse_expr()?
        } else {
            self.arena.add_expr(ExprKind::ConstInt(1))
        };
        let assign = self.add_stmt(StmtKind::Assign(LValue::Variable(var.clone()), from));
        let for_stmt = self.add_stmt(StmtKind::For(crate::ast::ForFields { var, term, step }));
        self.arena.link_stmts(assign, Some(for_stmt));
        Ok(assign)
    }

    fn parse_next(&mut self) -> PResult<StmtId> {
        let var = if let Token::Ident(name) = self.peek().clone() {
            self.pos += 1;
            Some(name)
        } else {
            None
        };
        Ok(self.add_stmt(StmtKind::Next(var)))
    }

    fn parse_on(&mut self) -> PResult<StmtId> {
        if self.eat_keyword("ERROR") {
            if self.eat_keyword("OFF") {
                return Ok(self.add_stmt(StmtKind::OnError(None)));
            }
            let trap = self.parse_statement()?;
            return Ok(self.add_stmt(StmtKind::OnError(Some(trap))));
        }
        let selector = self.parse_expr()?;
        let is_gosub = self.eat_keyword("GOSUB");
        if !is_gosub {
            self.expect_keyword("GOTO")?;
        }
        let mut targets = vec![self.parse_expr()?];
        while self.eat_symbol(",") {
            targets.push(self.parse_expr()?);
        }
        let else_branch = if self.eat_keyword("ELSE") {
            Some(self.parse_statement()?)
        } else {
            None
        };
        let kind = if is_gosub {
            StmtKind::OnGosub(selector, targets, else_branch)
        } else {
            StmtKind::OnGoto(selector, targets, else_branch)
        };
        Ok(self.add_stmt(kind))
    }

    fn parse_def(&mut self) -> PResult<StmtId> {
        if self.eat_keyword("PROC") {
            let name = self.ident()?;
            let params = self.parse_params()?;
            return Ok(self.add_stmt(StmtKind::DefProc(name, params, StmtId(0))));
        }
        // `DEF FNname(...) stmt : stmt : ... : =expr`, the name token
        // already carries the `FN` prefix (e.g. "FNF") because the lexer
        // reads it as one contiguous word. The body is parsed the same
        // way a line's own colon-chain is, but stays reachable only
        // through this node's own field, never through `next` -- a bare
        // `DEF FNx(...) = expr` just makes `first` a single `FnReturn`.
        let name = self.ident()?;
        let params = self.parse_params()?;
        let first = self.parse_statement()?;
        let mut last = first;
        while self.eat_colon() {
            let s = self.parse_statement()?;
            self.arena.link_stmts(last, Some(s));
            last = s;
        }
        Ok(self.add_stmt(StmtKind::DefFn(name, params, first)))
    }

    fn parse_params(&mut self) -> PResult<Vec<String>> {
        let mut params = Vec::new();
        if self.eat_symbol("(") {
            if !self.eat_symbol(")") {
                loop {
                    params.push(self.ident()?);
                    if !self.eat_symbol(",") {
                        break;
                    }
                }
                self.expect_symbol(")")?;
            }
        }
        Ok(params)
    }

    fn parse_proc_call(&mut self) -> PResult<StmtId> {
        let name = self.ident()?;
        let args = if self.eat_symbol("(") {
            self.parse_expr_list(")")?
        } else {
            Vec::new()
        };
        Ok(self.add_stmt(StmtKind::ProcCall(name, args)))
    }

    fn parse_local(&mut self) -> PResult<StmtId> {
        let mut names = vec![self.ident()?];
        while self.eat_symbol(",") {
            names.push(self.ident()?);
        }
        Ok(self.add_stmt(StmtKind::Local(names)))
    }

    fn parse_dim(&mut self) -> PResult<StmtId> {
        let name = self.ident()?;
        self.expect_symbol("(")?;
        let dims = self.parse_expr_list(")")?;
        Ok(self.add_stmt(StmtKind::Dim(name, dims)))
    }

    fn parse_read(&mut self) -> PResult<StmtId> {
        let mut targets = vec![self.parse_lvalue()?];
        while self.eat_symbol(",") {
            targets.push(self.parse_lvalue()?);
        }
        Ok(self.add_stmt(StmtKind::Read(targets)))
    }

    fn parse_data(&mut self) -> PResult<StmtId> {
        let mut values = Vec::new();
        loop {
            match self.peek().clone() {
                Token::Int(n) => {
                    self.pos += 1;
                    values.push(Value::Int(n));
                }
                Token::Float(f) => {
                    self.pos += 1;
                    values.push(Value::Float(f));
                }
                Token::Str(s) => {
                    self.pos += 1;
                    values.push(Value::Str(s));
                }
                Token::Symbol(s) if s == "-" => {
                    self.pos += 1;
                    match self.advance() {
                        Token::Int(n) => values.push(Value::Int(-n)),
                        Token::Float(f) => values.push(Value::Float(-f)),
                        _ => return Err(self.err("expected a number after '-' in DATA")),
                    }
                }
                Token::Colon | Token::Eof => break,
                _ => return Err(self.err("expected a DATA literal")),
            }
            if !self.eat_symbol(",") {
                break;
            }
        }
        Ok(self.add_stmt(StmtKind::Data(values)))
    }

    fn parse_restore(&mut self) -> PResult<StmtId> {
        let target = match self.peek().clone() {
            Token::Int(n) => {
                self.pos += 1;
                Some(self.arena.add_expr(ExprKind::ConstInt(n)))
            }
            _ => None,
        };
        Ok(self.add_stmt(StmtKind::Restore(target)))
    }

    fn parse_trace(&mut self) -> PResult<StmtId> {
        let on = if self.eat_keyword("OFF") {
            false
        } else {
            self.eat_keyword("ON");
            true
        };
        let threshold = if !matches!(self.peek(), Token::Colon | Token::Eof) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(self.add_stmt(StmtKind::Trace(on, threshold)))
    }

    // ---- expressions -----------------------------------------------------

    fn parse_expr(&mut self) -> PResult<ExprId> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<ExprId> {
        let mut lhs = self.parse_and()?;
        loop {
            if self.eat_keyword("OR") {
                let rhs = self.parse_and()?;
                lhs = self.arena.add_expr(ExprKind::Binary(BinOp::Or, lhs, rhs));
            } else if self.eat_keyword("EOR") {
                let rhs = self.parse_and()?;
                lhs = self.arena.add_expr(ExprKind::Binary(BinOp::Eor, lhs, rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_and(&mut self) -> PResult<ExprId> {
        let mut lhs = self.parse_compare()?;
        while self.eat_keyword("AND") {
            let rhs = self.parse_compare()?;
            lhs = self.arena.add_expr(ExprKind::Binary(BinOp::And, lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_compare(&mut self) -> PResult<ExprId> {
        let lhs = self.parse_add()?;
        let op = match self.peek().clone() {
            Token::Symbol(s) if s == "=" => Some(BinOp::Eq),
            Token::Symbol(s) if s == "<>" => Some(BinOp::Ne),
            Token::Symbol(s) if s == "<=" => Some(BinOp::Le),
            Token::Symbol(s) if s == ">=" => Some(BinOp::Ge),
            Token::Symbol(s) if s == "<" => Some(BinOp::Lt),
            Token::Symbol(s) if s == ">" => Some(BinOp::Gt),
            _ => None,
        };
        if let Some(op) = op {
            self.pos += 1;
            let rhs = self.parse_add()?;
            return Ok(self.arena.add_expr(ExprKind::Binary(op, lhs, rhs)));
        }
        Ok(lhs)
    }

    fn parse_add(&mut self) -> PResult<ExprId> {
        let mut lhs = self.parse_mul()?;
        loop {
            if self.eat_symbol("+") {
                let rhs = self.parse_mul()?;
                lhs = self.arena.add_expr(ExprKind::Binary(BinOp::Add, lhs, rhs));
            } else if self.eat_symbol("-") {
                let rhs = self.parse_mul()?;
                lhs = self.arena.add_expr(ExprKind::Binary(BinOp::Sub, lhs, rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_mul(&mut self) -> PResult<ExprId> {
        let mut lhs = self.parse_unary()?;
        loop {
            if self.eat_symbol("*") {
                let rhs = self.parse_unary()?;
                lhs = self.arena.add_expr(ExprKind::Binary(BinOp::Mul, lhs, rhs));
            } else if self.eat_symbol("/") {
                let rhs = self.parse_unary()?;
                lhs = self.arena.add_expr(ExprKind::Binary(BinOp::Div, lhs, rhs));
            } else if self.eat_keyword("DIV") {
                let rhs = self.parse_unary()?;
                lhs = self.arena.add_expr(ExprKind::Binary(BinOp::IDiv, lhs, rhs));
            } else if self.eat_keyword("MOD") {
                let rhs = self.parse_unary()?;
                lhs = self.arena.add_expr(ExprKind::Binary(BinOp::Mod, lhs, rhs));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn parse_unary(&mut self) -> PResult<ExprId> {
        if self.eat_symbol("-") {
            let operand = self.parse_unary()?;
            return Ok(self.arena.add_expr(ExprKind::Unary(UnOp::Neg, operand)));
        }
        if self.eat_keyword("NOT") {
            let operand = self.parse_unary()?;
            return Ok(self.arena.add_expr(ExprKind::Unary(UnOp::Not, operand)));
        }
        self.parse_pow()
    }

    fn parse_pow(&mut self) -> PResult<ExprId> {
        let base = self.parse_primary()?;
        if self.eat_symbol("^") {
            let exp = self.parse_unary()?;
            return Ok(self.arena.add_expr(ExprKind::Binary(BinOp::Pow, base, exp)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> PResult<ExprId> {
        match self.advance() {
            Token::Int(n) => Ok(self.arena.add_expr(ExprKind::ConstInt(n))),
            Token::Float(f) => Ok(self.arena.add_expr(ExprKind::ConstFloat(f))),
            Token::Str(s) => Ok(self.arena.add_expr(ExprKind::ConstStr(s))),
            Token::Symbol(s) if s == "(" => {
                let e = self.parse_expr()?;
                self.expect_symbol(")")?;
                Ok(e)
            }
            Token::Keyword(k) if k == "IF" => self.parse_cond_expr(),
            Token::Keyword(k) if k == "TRUE" => Ok(self.arena.add_expr(ExprKind::ConstInt(-1))),
            Token::Keyword(k) if k == "FALSE" => Ok(self.arena.add_expr(ExprKind::ConstInt(0))),
            Token::Ident(name) => self.parse_name(name),
            other => Err(ParseError { line: self.line, message: format!("unexpected token {:?}", other) }),
        }
    }

    /// The `IF cond THEN a ELSE b` expression form used by the
    /// single-line `DEF FN ... = ...` shorthand.
    fn parse_cond_expr(&mut self) -> PResult<ExprId> {
        let cond = self.parse_expr()?;
        self.expect_keyword("THEN")?;
        let then_e = self.parse_expr()?;
        self.expect_keyword("ELSE")?;
        let else_e = self.parse_expr()?;
        Ok(self.arena.add_expr(ExprKind::Cond(cond, then_e, else_e)))
    }

    fn parse_name(&mut self, name: String) -> PResult<ExprId> {
        if let Some(builtin) = builtin_from_name(&name) {
            let args = if self.eat_symbol("(") {
                self.parse_expr_list(")")?
            } else {
                Vec::new()
            };
            return Ok(self.arena.add_expr(ExprKind::Builtin(builtin, args)));
        }
        if name.to_ascii_uppercase().starts_with("FN") && name.len() > 2 {
            let args = if self.eat_symbol("(") {
                self.parse_expr_list(")")?
            } else {
                Vec::new()
            };
            return Ok(self.arena.add_expr(ExprKind::FnCall(name, args)));
        }
        if self.eat_symbol("(") {
            let subs = self.parse_expr_list(")")?;
            return Ok(self.arena.add_expr(ExprKind::ArrayRef(name, subs)));
        }
        Ok(self.arena.add_expr(ExprKind::Variable(name)))
    }

    fn parse_expr_list(&mut self, close: &str) -> PResult<Vec<ExprId>> {
        let mut items = Vec::new();
        if self.eat_symbol(close) {
            return Ok(items);
        }
        loop {
            items.push(self.parse_expr()?);
            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol(close)?;
        Ok(items)
    }
}

fn builtin_from_name(name: &str) -> Option<Builtin> {
    use Builtin::*;
    Some(match name.to_ascii_uppercase().as_str() {
        "ABS" => Abs,
        "SGN" => Sgn,
        "INT" => Int,
        "ACS" => Acs,
        "ASN" => Asn,
        "ATN" => Atn,
        "COS" => Cos,
        "SIN" => Sin,
        "TAN" => Tan,
        "EXP" => Exp,
        "SQR" => Sqr,
        "LN" => Ln,
        "LOG" => Log,
        "DEG" => Deg,
        "RAD" => Rad,
        "RND" => Rnd,
        "ASC" => Asc,
        "CHR$" => ChrDollar,
        "LEN" => Len,
        "STR$" => StrDollar,
        "VAL" => Val,
        "STRING$" => StringDollar,
        "SPC" => Spc,
        "LEFT$" => LeftDollar,
        "RIGHT$" => RightDollar,
        "MID$" => MidDollar,
        "INSTR" => Instr,
        "GET" => Get,
        "GET$" => GetDollar,
        "INKEY" => Inkey,
        "INKEY$" => InkeyDollar,
        "OPENIN" => Openin,
        "OPENOUT" => Openout,
        "OPENUP" => Openup,
        "PTR#" => PtrHash,
        "EXT#" => ExtHash,
        "EOF#" => EofHash,
        "BGET#" => BgetHash,
        "ERR" => Err,
        "ERL" => Erl,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::Program;

    fn build(src: &str) -> Program {
        let mut arena = Arena::new();
        let lines = parse_program(&mut arena, src).unwrap();
        Program::build(arena, lines).unwrap()
    }

    #[test]
    fn parses_hello_world() {
        let prog = build("10 PRINT \"HELLO\"");
        let entry = prog.entry.unwrap();
        assert!(matches!(prog.arena.stmt(entry).kind, StmtKind::Print(_)));
    }

    #[test]
    fn parses_for_next_sum() {
        let prog = build("10 T=0\n20 FOR I=1 TO 10\n30 T=T+I\n40 NEXT\n50 PRINT T");
        assert_eq!(prog.lines.len(), 5);
    }

    #[test]
    fn parses_def_fn_with_conditional_body() {
        let prog = build("10 DEF FNF(N) = IF N<2 THEN 1 ELSE N*FNF(N-1)\n20 PRINT FNF(6)");
        let entry = prog.entry.unwrap();
        assert!(matches!(prog.arena.stmt(entry).kind, StmtKind::DefFn(..)));
    }

    #[test]
    fn parses_def_fn_with_multi_statement_body() {
        let prog = build("10 DEF FNADD(A,B) LOCAL C:C=A+B:=C\n20 PRINT FNADD(2,3)");
        let entry = prog.entry.unwrap();
        let body = match &prog.arena.stmt(entry).kind {
            StmtKind::DefFn(_, params, body) => {
                assert_eq!(params, &["A".to_string(), "B".to_string()]);
                *body
            }
            other => panic!("expected DefFn, got {:?}", other),
        };
        assert!(matches!(prog.arena.stmt(body).kind, StmtKind::Local(_)));
        let assign = prog.arena.stmt(body).next.unwrap();
        assert!(matches!(prog.arena.stmt(assign).kind, StmtKind::Assign(..)));
        let ret = prog.arena.stmt(assign).next.unwrap();
        assert!(matches!(prog.arena.stmt(ret).kind, StmtKind::FnReturn(_)));
    }

    #[test]
    fn parses_on_error_trap() {
        let prog = build("10 ON ERROR GOTO 40\n20 X=1/0\n30 END\n40 PRINT ERR");
        let entry = prog.entry.unwrap();
        assert!(matches!(prog.arena.stmt(entry).kind, StmtKind::OnError(Some(_))));
    }

    #[test]
    fn parses_proc_def_and_call() {
        let prog = build(
            "10 DEF PROC P(N)\n20 LOCAL I\n30 I=0\n40 REPEAT I=I+1 : PRINT I : UNTIL I=N\n50 ENDPROC\n60 PROC P(3)",
        );
        assert_eq!(prog.lines.len(), 6);
    }
}
