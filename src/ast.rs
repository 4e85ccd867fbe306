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

//! Arena-indexed expression and statement trees.
//!
//! Expressions and statements are owned by `Vec`s in `Program`
//! (`ExprNode`/`StmtNode`) and referred to by these ids, rather than by
//! pointer or `Rc`. `ON ERROR`'s trap-splicing and `GOTO`'s arbitrary
//! re-entry are then just index writes, and dropping the arena frees
//! everything in one pass regardless of cycles in the `next` links.

use crate::value::Value;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExprId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct StmtId(pub usize);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add, Sub, Mul, Div, IDiv, Mod, Pow, And, Or, Eor,
    Eq, Ne, Lt, Gt, Le, Ge,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

/// Single-enum dispatch table for all built-in functions, per the design
/// note preferring one matcher over one evaluator function per builtin.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Builtin {
    Abs, Sgn, Int,
    Acs, Asn, Atn, Cos, Sin, Tan,
    Exp, Sqr, Ln, Log, Deg, Rad,
    Rnd,
    Asc, ChrDollar, Len, StrDollar, Val, StringDollar, Spc,
    LeftDollar, RightDollar, MidDollar, Instr,
    Get, GetDollar, Inkey, InkeyDollar,
    Openin, Openout, Openup,
    PtrHash, ExtHash, EofHash, BgetHash,
    Err, Erl,
}

#[derive(Clone, Debug)]
pub enum ExprKind {
    ConstInt(i32),
    ConstFloat(f64),
    ConstStr(String),
    Variable(String),
    ArrayRef(String, Vec<ExprId>),
    Unary(UnOp, ExprId),
    Binary(BinOp, ExprId, ExprId),
    Builtin(Builtin, Vec<ExprId>),
    FnCall(String, Vec<ExprId>),
    /// `IF cond THEN a ELSE b` used as an expression, the single-line
    /// `DEF FN name(...) = IF ... THEN ... ELSE ...` shorthand.
    Cond(ExprId, ExprId, ExprId),
}

#[derive(Clone, Debug)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub next: Option<ExprId>,
}

#[derive(Clone, Debug)]
pub enum LValue {
    Variable(String),
    ArrayElem(String, Vec<ExprId>),
    PtrHash(ExprId),
}

#[derive(Clone, Debug)]
pub enum PrintItem {
    Apostrophe,
    Semicolon,
    Comma,
    Expr(ExprId),
}

#[derive(Clone, Debug)]
pub struct ForFields {
    pub var: String,
    pub term: ExprId,
    pub step: ExprId,
}

#[derive(Clone, Debug)]
pub enum StmtKind {
    Assign(LValue, ExprId),
    If(ExprId, StmtId, Option<StmtId>),
    For(ForFields),
    Next(Option<String>),
    Repeat,
    Until(ExprId),
    Goto(ExprId),
    Gosub(ExprId),
    OnGoto(ExprId, Vec<ExprId>, Option<StmtId>),
    OnGosub(ExprId, Vec<ExprId>, Option<StmtId>),
    Return,
    DefProc(String, Vec<String>, StmtId),
    /// The body is a statement chain reachable only through this field,
    /// the same way `If`'s branches are -- see `FnReturn`, which ends it.
    DefFn(String, Vec<String>, StmtId),
    ProcCall(String, Vec<ExprId>),
    FnReturn(ExprId),
    EndProc,
    Local(Vec<String>),
    Print(Vec<PrintItem>),
    Input(Vec<PrintItem>, bool),
    Read(Vec<LValue>),
    Restore(Option<ExprId>),
    Data(Vec<Value>),
    OnError(Option<StmtId>),
    Trace(bool, Option<ExprId>),
    End,
    Stop,
    Report,
    Dim(String, Vec<ExprId>),
    Close(ExprId),
    BputHash(ExprId, ExprId),
    Expr(ExprId),
}

#[derive(Clone, Debug)]
pub struct StmtNode {
    pub line: i32,
    pub kind: StmtKind,
    pub next: Option<StmtId>,
}

/// Owns every expression/statement node.
#[derive(Default)]
pub struct Arena {
    exprs: Vec<ExprNode>,
    stmts: Vec<StmtNode>,
}

impl Arena {
    pub fn new() -> Arena {
        Arena { exprs: Vec::new(), stmts: Vec::new() }
    }

    pub fn add_expr(&mut self, kind: ExprKind) -> ExprId {
        self.exprs.push(ExprNode { kind, next: None });
        ExprId(self.exprs.len() - 1)
    }

    pub fn expr(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id.0]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.exprs[id.0]
    }

    pub fn add_stmt(&mut self, line: i32, kind: StmtKind) -> StmtId {
        self.stmts.push(StmtNode { line, kind, next: None });
        StmtId(self.stmts.len() - 1)
    }

    pub fn stmt(&self, id: StmtId) -> &StmtNode {
        &self.stmts[id.0]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut StmtNode {
        &mut self.stmts[id.0]
    }

    pub fn link_stmts(&mut self, a: StmtId, b: Option<StmtId>) {
        self.stmts[a.0].next = b;
    }

    pub fn link_exprs(&mut self, a: ExprId, b: Option<ExprId>) {
        self.exprs[a.0].next = b;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_assigns_sequential_ids() {
        let mut arena = Arena::new();
        let a = arena.add_expr(ExprKind::ConstInt(1));
        let b = arena.add_expr(ExprKind::ConstInt(2));
        assert_eq!(a, ExprId(0));
        assert_eq!(b, ExprId(1));
    }

    #[test]
    fn stmt_next_link_can_be_respliced() {
        let mut arena = Arena::new();
        let a = arena.add_stmt(10, StmtKind::End);
        let b = arena.add_stmt(20, StmtKind::End);
        let c = arena.add_stmt(30, StmtKind::End);
        arena.link_stmts(a, Some(b));
        assert_eq!(arena.stmt(a).next, Some(b));
        arena.link_stmts(a, Some(c));
        assert_eq!(arena.stmt(a).next, Some(c));
    }
}
