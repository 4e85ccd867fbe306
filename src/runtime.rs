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

//! Owns every piece of mutable interpreter state and drives the main
//! statement loop.
//!
//! Only the interrupt flag needs to be shared across threads (the
//! `SIGINT` handler flips it from signal context); everything else here
//! is single-threaded, matching the program's single control flow.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::ast::{ExprId, StmtId, StmtKind};
use crate::dispatcher::{self, Flow};
use crate::error::BasicError;
use crate::error::ErrorRegister;
use crate::files::FileRegistry;
use crate::program::Program;
use crate::symbols::SymbolTable;
use crate::value::Value;

#[derive(Clone)]
pub struct ForState {
    pub var: String,
    pub term: ExprId,
    pub step: ExprId,
    pub for_marker: StmtId,
}

#[derive(Default)]
pub struct TraceState {
    pub enabled: bool,
    pub threshold: i32,
}

pub struct Runtime {
    pub program: Program,
    pub symbols: SymbolTable,
    pub files: FileRegistry,
    pub errors: ErrorRegister,
    pub data_cursor: usize,
    pub rng: StdRng,
    pub last_random: Value,
    pub current_line: i32,
    pub interrupt: Arc<AtomicBool>,
    pub trace: TraceState,
    pub gosub_stack: Vec<StmtId>,
    pub for_stack: Vec<ForState>,
    pub repeat_stack: Vec<StmtId>,
    pub proc_stack: Vec<StmtId>,
    pub on_error: Option<StmtId>,
}

impl Runtime {
    pub fn new(program: Program) -> Runtime {
        Runtime::with_interrupt(program, Arc::new(AtomicBool::new(false)))
    }

    pub fn with_interrupt(program: Program, interrupt: Arc<AtomicBool>) -> Runtime {
        let mut symbols = SymbolTable::new();
        register_definitions(&program, &mut symbols);
        Runtime {
            program,
            symbols,
            files: FileRegistry::new(),
            errors: ErrorRegister::new(),
            data_cursor: 0,
            rng: StdRng::seed_from_u64(0x5EED),
            last_random: Value::Int(0),
            current_line: 0,
            interrupt,
            trace: TraceState::default(),
            gosub_stack: Vec::new(),
            for_stack: Vec::new(),
            repeat_stack: Vec::new(),
            proc_stack: Vec::new(),
            on_error: None,
        }
    }

    /// Runs from the program's first statement until `END`, an uncaught
    /// `STOP`, falling off the end, or an untrapped error.
    pub fn run(&mut self) -> Result<(), BasicError> {
        info!("starting program ({} lines)", self.program.lines.len());
        let mut cur = self.program.entry;
        while let Some(id) = cur {
            if let Err(e) = dispatcher::check_interrupt(self) {
                self.handle_error(e, &mut cur)?;
                continue;
            }
            match dispatcher::exec(self, id) {
                Ok(Flow::Next) => cur = self.program.arena.stmt(id).next,
                Ok(Flow::Jump(next)) => cur = Some(next),
                Ok(Flow::End) => {
                    info!("program ended normally");
                    return Ok(());
                }
                Err(e) => {
                    self.handle_error(e, &mut cur)?;
                    continue;
                }
            }
        }
        info!("program ran off the end");
        Ok(())
    }

    /// On a trapped error, splices `cur` to the handler and keeps
    /// running; on `Stop` or an untrapped error, propagates it to the
    /// caller (`main` reports it and sets the process exit code).
    ///
    /// The trap stays installed across successive errors -- only
    /// `ON ERROR OFF` (or a fresh `ON ERROR GOTO`) clears it.
    fn handle_error(&mut self, err: BasicError, cur: &mut Option<StmtId>) -> Result<(), BasicError> {
        if err == BasicError::Stop {
            return Err(err);
        }
        self.errors.set(&err, self.current_line);
        debug!("error {:?} at line {}", err, self.current_line);
        match self.on_error {
            Some(trap) => {
                self.errors.clear_current();
                *cur = Some(trap);
                Ok(())
            }
            None => Err(err),
        }
    }
}

/// Scans the whole statement chain once and registers every `DEF PROC` /
/// `DEF FN` into the base frame before execution starts, so forward
/// references (a `PROC` called before its `DEF` appears in the source)
/// resolve correctly.
fn register_definitions(program: &Program, symbols: &mut SymbolTable) {
    let mut cur = program.entry;
    while let Some(id) = cur {
        match &program.arena.stmt(id).kind {
            StmtKind::DefProc(name, params, body) => {
                symbols.define_proc(name, params.clone(), *body);
            }
            StmtKind::DefFn(name, params, body) => {
                symbols.define_func(name, params.clone(), *body);
            }
            _ => {}
        }
        cur = program.arena.stmt(id).next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Arena, ExprKind, LValue, PrintItem};
    use crate::program::ParsedLine;

    fn build_line(arena: &mut Arena, number: i32, kinds: Vec<StmtKind>) -> ParsedLine {
        let mut first = None;
        let mut last = None;
        for k in kinds {
            let id = arena.add_stmt(number, k);
            if first.is_none() {
                first = Some(id);
            }
            if let Some(prev) = last {
                arena.link_stmts(prev, Some(id));
            }
            last = Some(id);
        }
        ParsedLine { number, first: first.unwrap(), last: last.unwrap() }
    }

    #[test]
    fn hello_world_runs_to_completion() {
        let mut arena = Arena::new();
        let greeting = arena.add_expr(ExprKind::ConstStr("HELLO".to_string()));
        let line = build_line(&mut arena, 10, vec![StmtKind::Print(vec![PrintItem::Expr(greeting)]), StmtKind::End]);
        let prog = Program::build(arena, vec![line]).unwrap();
        let mut rt = Runtime::new(prog);
        assert!(rt.run().is_ok());
    }

    #[test]
    fn for_next_sum_reaches_expected_total() {
        let mut arena = Arena::new();
        let zero = arena.add_expr(ExprKind::ConstInt(0));
        let one = arena.add_expr(ExprKind::ConstInt(1));
        let ten = arena.add_expr(ExprKind::ConstInt(10));
        let t_var = arena.add_expr(ExprKind::Variable("T".to_string()));
        let i_var = arena.add_expr(ExprKind::Variable("I".to_string()));
        let sum = arena.add_expr(ExprKind::Binary(crate::ast::BinOp::Add, t_var, i_var));

        let l10 = build_line(&mut arena, 10, vec![StmtKind::Assign(LValue::Variable("T".to_string()), zero)]);
        let l20_assign_id = arena.add_stmt(20, StmtKind::Assign(LValue::Variable("I".to_string()), one));
        let l20_for_id = arena.add_stmt(
            20,
            StmtKind::For(crate::ast::ForFields { var: "I".to_string(), term: ten, step: one }),
        );
        arena.link_stmts(l20_assign_id, Some(l20_for_id));
        let l20 = ParsedLine { number: 20, first: l20_assign_id, last: l20_for_id };

        let l30 = build_line(&mut arena, 30, vec![StmtKind::Assign(LValue::Variable("T".to_string()), sum)]);
        let l40 = build_line(&mut arena, 40, vec![StmtKind::Next(None)]);
        let t_var2 = arena.add_expr(ExprKind::Variable("T".to_string()));
        let l50 = build_line(&mut arena, 50, vec![StmtKind::Print(vec![PrintItem::Expr(t_var2)]), StmtKind::End]);

        let prog = Program::build(arena, vec![l10, l20, l30, l40, l50]).unwrap();
        let mut rt = Runtime::new(prog);
        assert!(rt.run().is_ok());
        assert!(matches!(
            rt.symbols.get("T"),
            Some(crate::symbols::Symbol::Variable(Value::Int(55)))
        ));
    }

    #[test]
    fn on_error_trap_catches_division_by_zero() {
        let mut arena = Arena::new();
        let one = arena.add_expr(ExprKind::ConstInt(1));
        let zero = arena.add_expr(ExprKind::ConstInt(0));
        let bad = arena.add_expr(ExprKind::Binary(crate::ast::BinOp::Div, one, zero));
        let err = arena.add_expr(ExprKind::Builtin(crate::ast::Builtin::Err, vec![]));

        // `ON ERROR GOTO 40`; the handler target is patched in below once
        // line 40's statement id is known, mirroring how the parser
        // resolves a forward `GOTO` only after `Program::build` links
        // the whole line chain.
        let on_error_stmt = arena.add_stmt(10, StmtKind::OnError(None));
        let l10 = ParsedLine { number: 10, first: on_error_stmt, last: on_error_stmt };

        let l20 = build_line(&mut arena, 20, vec![StmtKind::Assign(LValue::Variable("X".to_string()), bad)]);
        let l30 = build_line(&mut arena, 30, vec![StmtKind::End]);
        let l40 = build_line(&mut arena, 40, vec![StmtKind::Print(vec![PrintItem::Expr(err)]), StmtKind::End]);

        let prog = Program::build(arena, vec![l10, l20, l30, l40]).unwrap();
        let mut rt = Runtime::new(prog);
        let trap_target = rt.program.line_entry(40).unwrap();
        if let StmtKind::OnError(slot) = &mut rt.program.arena.stmt_mut(on_error_stmt).kind {
            *slot = Some(trap_target);
        }
        assert!(rt.run().is_ok());
        assert_eq!(rt.errors.err(), BasicError::DivisionByZero.code());
    }

    #[test]
    fn on_error_trap_survives_repeated_errors() {
        let mut arena = Arena::new();
        let line = build_line(&mut arena, 10, vec![StmtKind::End]);
        let target = line.first;
        let prog = Program::build(arena, vec![line]).unwrap();
        let mut rt = Runtime::new(prog);
        rt.on_error = Some(target);

        let mut cur = None;
        assert!(rt.handle_error(BasicError::DivisionByZero, &mut cur).is_ok());
        assert_eq!(cur, Some(target));
        assert_eq!(rt.on_error, Some(target));

        // A second trapped error on the same handler must not abort --
        // only `ON ERROR OFF` clears the trap.
        cur = None;
        assert!(rt.handle_error(BasicError::DivisionByZero, &mut cur).is_ok());
        assert_eq!(cur, Some(target));
        assert_eq!(rt.on_error, Some(target));
    }
}
