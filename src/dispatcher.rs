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

//! The statement executor. One call to `exec` runs a single statement
//! and reports where control goes next; `Runtime::run` drives the loop,
//! checking the interrupt flag and any installed `ON ERROR` trap between
//! statements.

use std::sync::atomic::Ordering;

use log::trace;

use crate::ast::{ForFields, LValue, PrintItem, StmtId, StmtKind};
use crate::error::BasicError::{self, *};
use crate::error::EvalResult;
use crate::eval::eval_expr;
use crate::runtime::Runtime;
use crate::symbols::{NameKind, Symbol};
use crate::value::Value;

/// Where to resume after a statement. `Goto` always carries a resolved
/// `StmtId`; the `GOTO`/`GOSUB` line lookup itself happens in `exec`.
pub enum Flow {
    Next,
    Jump(StmtId),
    End,
}

pub fn exec(rt: &mut Runtime, id: StmtId) -> EvalResult<Flow> {
    let line = rt.program.arena.stmt(id).line;
    rt.current_line = line;
    let kind = rt.program.arena.stmt(id).kind.clone();
    if rt.trace.enabled && line >= rt.trace.threshold {
        trace!("{:5} {:?}", line, kind);
        eprintln!("[{}]", line);
    }

    match kind {
        StmtKind::Assign(lvalue, expr) => {
            let value = eval_expr(rt, expr)?;
            assign(rt, &lvalue, value)?;
            Ok(Flow::Next)
        }
        StmtKind::If(cond, then_id, else_id) => {
            if !eval_expr(rt, cond)?.is_zero() {
                Ok(Flow::Jump(then_id))
            } else if let Some(else_id) = else_id {
                Ok(Flow::Jump(else_id))
            } else {
                Ok(Flow::Next)
            }
        }
        StmtKind::For(fields) => exec_for(rt, id, &fields),
        StmtKind::Next(name) => exec_next(rt, name.as_deref()),
        StmtKind::Repeat => {
            rt.repeat_stack.push(id);
            Ok(Flow::Next)
        }
        StmtKind::Until(cond) => {
            let target = rt.repeat_stack.last().copied().ok_or(NoRepeat)?;
            if eval_expr(rt, cond)?.is_zero() {
                Ok(Flow::Jump(target))
            } else {
                rt.repeat_stack.pop();
                Ok(Flow::Next)
            }
        }
        StmtKind::Goto(target) => {
            let line = eval_expr(rt, target)?.as_int()?;
            Ok(Flow::Jump(rt.program.line_entry(line)?))
        }
        StmtKind::Gosub(target) => {
            let line = eval_expr(rt, target)?.as_int()?;
            let dest = rt.program.line_entry(line)?;
            rt.gosub_stack.push(id);
            Ok(Flow::Jump(dest))
        }
        StmtKind::Return => {
            let caller = rt.gosub_stack.pop().ok_or(NoGosub)?;
            resume_after(rt, caller)
        }
        StmtKind::OnGoto(selector, targets, else_branch) => {
            let n = eval_expr(rt, selector)?.as_int()?;
            exec_on(rt, n, &targets, else_branch)
        }
        StmtKind::OnGosub(selector, targets, else_branch) => {
            let n = eval_expr(rt, selector)?.as_int()?;
            if (1..=targets.len() as i32).contains(&n) {
                let line = eval_expr(rt, targets[n as usize - 1])?.as_int()?;
                let dest = rt.program.line_entry(line)?;
                rt.gosub_stack.push(id);
                Ok(Flow::Jump(dest))
            } else if let Some(stmt) = else_branch {
                // The `ELSE` fallback is an ordinary jump, not a call --
                // nothing is pushed for it to `RETURN` to.
                Ok(Flow::Jump(stmt))
            } else {
                Err(OnRange)
            }
        }
        StmtKind::DefProc(_, _, body) => {
            // Falling into a `DEF PROC` linearly skips straight past its
            // body to the statement after the matching `ENDPROC`.
            let _ = body;
            match rt.program.skip_targets.get(&id) {
                Some(&after) => Ok(Flow::Jump(after)),
                None => Ok(Flow::End),
            }
        }
        StmtKind::DefFn(name, params, body) => {
            rt.symbols.define_func(&name, params, body);
            Ok(Flow::Next)
        }
        StmtKind::ProcCall(name, args) => exec_proc_call(rt, id, &name, &args),
        StmtKind::FnReturn(_) => {
            // A bare `=expr` outside of a `DEF FN` body has nothing to
            // return to; only reachable if control falls into it, which
            // BBC BASIC reports as "No FN".
            Err(NoFn)
        }
        StmtKind::EndProc => {
            let caller = rt.proc_stack.pop().ok_or(NoProc)?;
            resume_after(rt, caller)
        }
        StmtKind::Local(names) => {
            for name in &names {
                rt.symbols.declare_local(name);
            }
            Ok(Flow::Next)
        }
        StmtKind::Print(items) => {
            exec_print(rt, &items)?;
            Ok(Flow::Next)
        }
        StmtKind::Input(items, line_mode) => {
            exec_input(rt, &items, line_mode)?;
            Ok(Flow::Next)
        }
        StmtKind::Read(targets) => {
            exec_read(rt, &targets)?;
            Ok(Flow::Next)
        }
        StmtKind::Restore(target) => {
            exec_restore(rt, target)?;
            Ok(Flow::Next)
        }
        StmtKind::Data(_) => Ok(Flow::Next),
        StmtKind::OnError(trap) => {
            rt.on_error = trap;
            rt.errors.clear_current();
            Ok(Flow::Next)
        }
        StmtKind::Trace(on, threshold) => {
            rt.trace.enabled = on;
            if let Some(e) = threshold {
                rt.trace.threshold = eval_expr(rt, e)?.as_int()?;
            }
            Ok(Flow::Next)
        }
        StmtKind::End => Ok(Flow::End),
        StmtKind::Stop => Err(Stop),
        StmtKind::Report => {
            if let Some(msg) = rt.errors.last_message() {
                println!("{}", msg);
            }
            Ok(Flow::Next)
        }
        StmtKind::Dim(name, dims) => {
            let sizes: Vec<i32> = dims
                .iter()
                .map(|&e| eval_expr(rt, e).and_then(|v| v.as_int()))
                .collect::<EvalResult<_>>()?;
            rt.symbols.dim(&name, sizes)?;
            Ok(Flow::Next)
        }
        StmtKind::Close(fd) => {
            let fd = eval_expr(rt, fd)?.as_int()?;
            rt.files.close(fd)?;
            Ok(Flow::Next)
        }
        StmtKind::BputHash(fd, byte) => {
            let fd = eval_expr(rt, fd)?.as_int()?;
            let byte = eval_expr(rt, byte)?.as_int()?;
            rt.files.bput(fd, byte as u8)?;
            Ok(Flow::Next)
        }
        StmtKind::Expr(e) => {
            eval_expr(rt, e)?;
            Ok(Flow::Next)
        }
    }
}

/// Resumes at the statement after `caller` (a `GOSUB`/`PROC` call site),
/// falling off the end of the program if there is none.
fn resume_after(rt: &Runtime, caller: StmtId) -> EvalResult<Flow> {
    match rt.program.arena.stmt(caller).next {
        Some(next) => Ok(Flow::Jump(next)),
        None => Ok(Flow::End),
    }
}

fn assign(rt: &mut Runtime, lvalue: &LValue, value: Value) -> EvalResult<()> {
    match lvalue {
        LValue::Variable(name) => {
            if name == "TIME" {
                rt.symbols.set_time(value.as_int()? as i64);
                return Ok(());
            }
            if name == "COUNT" {
                rt.symbols.reset_count();
                return Ok(());
            }
            if let NameKind::Resident(idx) = crate::symbols::classify_name(name) {
                rt.symbols.resident_set(idx, value.as_int()?);
                return Ok(());
            }
            rt.symbols.set(name, value, false);
            Ok(())
        }
        LValue::ArrayElem(name, subs) => {
            let indices: Vec<i32> = subs
                .iter()
                .map(|&e| eval_expr(rt, e).and_then(|v| v.as_int()))
                .collect::<EvalResult<_>>()?;
            let arr = rt.symbols.array_mut(name)?;
            let idx = arr.flat_index(&indices)?;
            arr.elems[idx] = value;
            Ok(())
        }
        LValue::PtrHash(fd) => {
            let fd = eval_expr(rt, *fd)?.as_int()?;
            rt.files.set_ptr(fd, value.as_int()?)
        }
    }
}

fn exec_for(rt: &mut Runtime, for_marker: StmtId, fields: &ForFields) -> EvalResult<Flow> {
    // `for_marker` is this `StmtKind::For` node itself; its `next` is the
    // first statement of the loop body, which is where `NEXT` jumps back
    // to on each further iteration.
    rt.for_stack.push(crate::runtime::ForState {
        var: fields.var.clone(),
        term: fields.term,
        step: fields.step,
        for_marker,
    });
    Ok(Flow::Next)
}

fn exec_next(rt: &mut Runtime, name: Option<&str>) -> EvalResult<Flow> {
    let frame = match name {
        Some(n) => {
            let pos = rt.for_stack.iter().rposition(|f| f.var == n).ok_or(CantMatchFor)?;
            rt.for_stack.truncate(pos + 1);
            rt.for_stack.last().unwrap().clone()
        }
        None => rt.for_stack.last().cloned().ok_or(NoFor)?,
    };
    let step = eval_expr(rt, frame.step)?;
    let current = match rt.symbols.get(&frame.var) {
        Some(Symbol::Variable(v)) => v.clone(),
        _ => return Err(NoFor),
    };
    let next_value = current.add(&step)?;
    let term = eval_expr(rt, frame.term)?;
    rt.symbols.set(&frame.var, next_value.clone(), false);

    // Continues while stepping upward keeps the variable at or below the
    // terminal value (downward: at or above it).
    let continues = if step.as_float()? >= 0.0 {
        next_value.gt(&term)?.is_zero()
    } else {
        next_value.lt(&term)?.is_zero()
    };

    if continues {
        // Resume at the first statement of the loop body.
        match rt.program.arena.stmt(frame.for_marker).next {
            Some(body_start) => Ok(Flow::Jump(body_start)),
            None => Ok(Flow::End),
        }
    } else {
        rt.for_stack.pop();
        Ok(Flow::Next)
    }
}

fn exec_on(
    rt: &mut Runtime,
    n: i32,
    targets: &[crate::ast::ExprId],
    else_branch: Option<StmtId>,
) -> EvalResult<Flow> {
    if n < 1 || n as usize > targets.len() {
        return match else_branch {
            Some(stmt) => Ok(Flow::Jump(stmt)),
            None => Err(OnRange),
        };
    }
    let line = eval_expr(rt, targets[n as usize - 1])?.as_int()?;
    Ok(Flow::Jump(rt.program.line_entry(line)?))
}

fn exec_proc_call(rt: &mut Runtime, call_id: StmtId, name: &str, args: &[crate::ast::ExprId]) -> EvalResult<Flow> {
    let (params, body) = match rt.symbols.get(name) {
        Some(Symbol::Proc { params, body }) => (params.clone(), *body),
        Some(_) => return Err(TypeMismatch),
        None => return Err(NoSuchProc),
    };
    if params.len() != args.len() {
        return Err(Arguments);
    }
    let values: Vec<Value> = args
        .iter()
        .map(|&e| eval_expr(rt, e))
        .collect::<EvalResult<_>>()?;
    rt.symbols.push_frame();
    for (param, value) in params.iter().zip(values) {
        rt.symbols.declare_local(param);
        rt.symbols.set(param, value, true);
    }
    rt.proc_stack.push(call_id);
    Ok(Flow::Jump(body))
}

fn exec_print(rt: &mut Runtime, items: &[PrintItem]) -> EvalResult<()> {
    // `PRINT#fd,...`: the parser encodes this as `[Expr(fd), Semicolon,
    // Expr(v1), Expr(v2), ...]`.
    if let [PrintItem::Expr(fd), PrintItem::Semicolon, rest @ ..] = items {
        let fd = eval_expr(rt, *fd)?.as_int()?;
        for item in rest {
            if let PrintItem::Expr(e) = item {
                let v = eval_expr(rt, *e)?;
                rt.files.print_hash(fd, &v)?;
            }
        }
        return Ok(());
    }

    let fmt = rt.symbols.format();
    let mut column_break_pending = false;
    for item in items {
        match item {
            PrintItem::Semicolon => column_break_pending = false,
            PrintItem::Comma => {
                // Pads with spaces to the next `@%` field boundary, tracked
                // by `COUNT` rather than a fixed tab stop.
                let width = fmt.width as usize;
                if width > 0 {
                    while rt.symbols.count % width != 0 {
                        print!(" ");
                        rt.symbols.count += 1;
                    }
                }
                column_break_pending = false;
            }
            PrintItem::Apostrophe => {
                println!();
                rt.symbols.reset_count();
                column_break_pending = false;
            }
            PrintItem::Expr(e) => {
                let v = eval_expr(rt, *e)?;
                let s = v.to_string_formatted(&fmt, v.is_numeric());
                print!("{}", s);
                rt.symbols.count += s.len();
                column_break_pending = true;
            }
        }
    }
    if column_break_pending || items.is_empty() {
        println!();
        rt.symbols.reset_count();
    }
    Ok(())
}

fn exec_input(rt: &mut Runtime, items: &[PrintItem], _line_mode: bool) -> EvalResult<()> {
    use std::io::{self, BufRead, Write};
    let mut prompt = String::new();
    let mut targets = Vec::new();
    for item in items {
        match item {
            PrintItem::Expr(e) => {
                // A string-constant expression is a prompt; a variable
                // reference is an input target. The parser cannot tell
                // these apart syntactically, so both are accepted here
                // and only bare names are treated as targets.
                if let crate::ast::ExprKind::Variable(name) = &rt.program.arena.expr(*e).kind {
                    targets.push(name.clone());
                } else {
                    prompt.push_str(&eval_expr(rt, *e)?.to_string_formatted(&rt.symbols.format(), false));
                }
            }
            PrintItem::Semicolon | PrintItem::Comma => {}
            PrintItem::Apostrophe => prompt.push('\n'),
        }
    }
    if !prompt.is_empty() {
        print!("{}", prompt);
        let _ = io::stdout().flush();
    }
    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line).map_err(|_| BasicError::Eof)?;
    let line = line.trim_end_matches(['\n', '\r'].as_ref());
    let mut fields = line.split(',');
    for target in targets {
        let raw = fields.next().unwrap_or("").trim();
        let value = match crate::symbols::classify_name(&target) {
            NameKind::Str => Value::Str(raw.to_string()),
            NameKind::Integer | NameKind::Resident(_) => {
                Value::Int(raw.parse().unwrap_or(0))
            }
            NameKind::Float => Value::Float(raw.parse().unwrap_or(0.0)),
        };
        assign(rt, &LValue::Variable(target), value)?;
    }
    Ok(())
}

fn exec_read(rt: &mut Runtime, targets: &[LValue]) -> EvalResult<()> {
    if let [LValue::PtrHash(fd), rest @ ..] = targets {
        let fd = eval_expr(rt, *fd)?.as_int()?;
        for target in rest {
            let value = rt.files.input_hash(fd)?;
            assign(rt, target, value)?;
        }
        return Ok(());
    }
    for target in targets {
        if rt.data_cursor >= rt.program.data_chain.len() {
            return Err(OutOfData);
        }
        let value = rt.program.data_chain[rt.data_cursor].clone();
        rt.data_cursor += 1;
        assign(rt, target, value)?;
    }
    Ok(())
}

fn exec_restore(rt: &mut Runtime, target: Option<crate::ast::ExprId>) -> EvalResult<()> {
    match target {
        Some(e) => {
            let line = eval_expr(rt, e)?.as_int()?;
            rt.data_cursor = rt.program.data_head(line)?;
        }
        None => rt.data_cursor = 0,
    }
    Ok(())
}

/// Called once per statement by `Runtime::run` before dispatch, so a
/// `SIGINT` during a tight loop still surfaces as `Escape`.
pub fn check_interrupt(rt: &Runtime) -> EvalResult<()> {
    if rt.interrupt.swap(false, Ordering::SeqCst) {
        Err(Escape)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Arena, ExprKind};
    use crate::program::{ParsedLine, Program};
    use crate::runtime::Runtime;

    fn one_line_program(mut arena: Arena, kinds: Vec<StmtKind>) -> Program {
        let mut first = None;
        let mut last = None;
        for k in kinds {
            let id = arena.add_stmt(10, k);
            if first.is_none() {
                first = Some(id);
            }
            if let Some(prev) = last {
                arena.link_stmts(prev, Some(id));
            }
            last = Some(id);
        }
        let line = ParsedLine { number: 10, first: first.unwrap(), last: last.unwrap() };
        Program::build(arena, vec![line]).unwrap()
    }

    #[test]
    fn assign_then_print_runs_clean() {
        let mut arena = Arena::new();
        let one = arena.add_expr(ExprKind::ConstInt(41));
        let var = arena.add_expr(ExprKind::Variable("X".to_string()));
        let prog = one_line_program(
            arena,
            vec![StmtKind::Assign(LValue::Variable("X".to_string()), one), StmtKind::Print(vec![PrintItem::Expr(var)])],
        );
        let mut rt = Runtime::new(prog);
        let entry = rt.program.entry.unwrap();
        assert!(matches!(exec(&mut rt, entry), Ok(Flow::Next)));
    }

    #[test]
    fn return_without_gosub_is_an_error() {
        let arena = Arena::new();
        let prog = one_line_program(arena, vec![StmtKind::Return]);
        let mut rt = Runtime::new(prog);
        let entry = rt.program.entry.unwrap();
        match exec(&mut rt, entry) {
            Err(NoGosub) => (),
            other => panic!("expected NoGosub, got {}", other.is_ok()),
        }
    }

    #[test]
    fn print_comma_pads_to_field_width_and_tracks_count() {
        let mut arena = Arena::new();
        let s = arena.add_expr(ExprKind::ConstStr("AB".to_string()));
        let n = arena.add_expr(ExprKind::ConstInt(1));
        // A trailing `;` suppresses the newline so the accumulated count
        // survives past `exec` for inspection below.
        let prog = one_line_program(
            arena,
            vec![StmtKind::Print(vec![
                PrintItem::Expr(s),
                PrintItem::Comma,
                PrintItem::Expr(n),
                PrintItem::Semicolon,
            ])],
        );
        let mut rt = Runtime::new(prog);
        let entry = rt.program.entry.unwrap();
        assert!(matches!(exec(&mut rt, entry), Ok(Flow::Next)));
        // "AB" (2 bytes) + 8 spaces to reach column 10 + a width-10
        // right-padded "1" lands COUNT on the next field boundary.
        assert_eq!(rt.symbols.count, 20);
    }

    #[test]
    fn print_apostrophe_resets_count() {
        let mut arena = Arena::new();
        let s = arena.add_expr(ExprKind::ConstStr("HELLO".to_string()));
        let prog = one_line_program(
            arena,
            vec![StmtKind::Print(vec![PrintItem::Expr(s), PrintItem::Apostrophe, PrintItem::Semicolon])],
        );
        let mut rt = Runtime::new(prog);
        let entry = rt.program.entry.unwrap();
        assert!(matches!(exec(&mut rt, entry), Ok(Flow::Next)));
        assert_eq!(rt.symbols.count, 0);
    }
}
