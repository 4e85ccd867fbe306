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

//! The built program: the statement arena plus the line map and the
//! DATA chain/map, flattened from the parser's per-line statement lists.

use std::collections::HashMap;

use crate::ast::{Arena, StmtId, StmtKind};
use crate::error::BasicError;
use crate::value::Value;

/// One source line as handed over by the parser: its number and the
/// chain of statements it introduced (already `next`-linked to each
/// other within the line).
pub struct ParsedLine {
    pub number: i32,
    pub first: StmtId,
    pub last: StmtId,
}

pub struct Program {
    pub arena: Arena,
    pub entry: Option<StmtId>,
    pub lines: HashMap<i32, StmtId>,
    pub data_map: HashMap<i32, usize>,
    pub data_chain: Vec<Value>,
    /// For each `DEF PROC` statement, the statement to resume at when
    /// linear execution falls into it rather than arriving via a call.
    pub skip_targets: HashMap<StmtId, StmtId>,
}

impl Program {
    /// Flattens the parser's per-line chains into one next-linked stream
    /// in line-number order, building the line map and DATA chain/map as
    /// it goes. A duplicate line number is a *Bad program* error caught
    /// here, before execution starts.
    pub fn build(mut arena: Arena, mut parsed: Vec<ParsedLine>) -> Result<Program, BasicError> {
        parsed.sort_by_key(|l| l.number);

        let mut lines = HashMap::new();
        for line in &parsed {
            if lines.insert(line.number, line.first).is_some() {
                return Err(BasicError::BadProgram);
            }
        }

        for pair in parsed.windows(2) {
            arena.link_stmts(pair[0].last, Some(pair[1].first));
        }

        let entry = parsed.first().map(|l| l.first);

        if let Some(e) = entry {
            Self::link_branch_fallthrough(&mut arena, e, None);
        }

        let mut data_chain = Vec::new();
        let mut data_map = HashMap::new();
        let mut cur = entry;
        while let Some(id) = cur {
            let line = arena.stmt(id).line;
            match &arena.stmt(id).kind {
                StmtKind::Data(values) => {
                    data_map.entry(line).or_insert(data_chain.len());
                    data_chain.extend(values.iter().cloned());
                }
                // `DEF FN` bodies are their own orphaned chain too, with
                // the same need to resolve an `IF` branch's fallthrough
                // before `eval::run_fn_body` walks it.
                StmtKind::DefFn(_, _, body) => {
                    let body = *body;
                    Self::link_branch_fallthrough(&mut arena, body, None);
                }
                _ => {}
            }
            cur = arena.stmt(id).next;
        }

        let skip_targets = Self::compute_defproc_targets(&mut arena, entry);

        Ok(Program { arena, entry, lines, data_map, data_chain, skip_targets })
    }

    /// `IF`'s `THEN`/`ELSE` clauses are parsed as their own statement
    /// chains, reachable only through the `If` node's own fields, not
    /// through `next`. Once falling off the end of one of those chains,
    /// execution has to resume wherever the `IF` statement itself would
    /// have resumed -- so every chain tail (and the `If` node's own
    /// `next`, when the `IF` is itself a chain tail) gets patched to the
    /// enclosing `fallthrough`. Recurses into nested `IF`s so a branch's
    /// own tail is resolved before the branch that encloses it needs it.
    fn link_branch_fallthrough(arena: &mut Arena, start: StmtId, fallthrough: Option<StmtId>) {
        let mut cur = start;
        loop {
            let next = arena.stmt(cur).next;
            if let StmtKind::If(_, then_id, else_id) = arena.stmt(cur).kind.clone() {
                let branch_fallthrough = next.or(fallthrough);
                Self::link_branch_fallthrough(arena, then_id, branch_fallthrough);
                if let Some(else_id) = else_id {
                    Self::link_branch_fallthrough(arena, else_id, branch_fallthrough);
                }
            }
            match next {
                Some(n) => cur = n,
                None => {
                    if arena.stmt(cur).next.is_none() {
                        arena.stmt_mut(cur).next = fallthrough;
                    }
                    break;
                }
            }
        }
    }

    /// Patches each `DEF PROC` statement's stored body pointer to the
    /// statement right after it, and records where linear execution
    /// should resume if it falls into the `DEF PROC` without a call --
    /// the statement after the matching `ENDPROC`.
    fn compute_defproc_targets(
        arena: &mut Arena,
        entry: Option<StmtId>,
    ) -> HashMap<StmtId, StmtId> {
        let mut skip_targets = HashMap::new();
        let mut cur = entry;
        while let Some(id) = cur {
            let next = arena.stmt(id).next;
            let is_defproc = matches!(arena.stmt(id).kind, StmtKind::DefProc(..));
            if is_defproc {
                if let Some(body) = next {
                    if let StmtKind::DefProc(_, _, slot) = &mut arena.stmt_mut(id).kind {
                        *slot = body;
                    }
                }
                let mut depth: i32 = 0;
                let mut scan = next;
                while let Some(sid) = scan {
                    let scan_next = arena.stmt(sid).next;
                    match &arena.stmt(sid).kind {
                        StmtKind::DefProc(..) => depth += 1,
                        StmtKind::EndProc if depth == 0 => {
                            if let Some(after) = scan_next {
                                skip_targets.insert(id, after);
                            }
                            break;
                        }
                        StmtKind::EndProc => depth -= 1,
                        _ => {}
                    }
                    scan = scan_next;
                }
            }
            cur = next;
        }
        skip_targets
    }

    pub fn line_entry(&self, line: i32) -> Result<StmtId, BasicError> {
        self.lines.get(&line).copied().ok_or(BasicError::NoSuchLine)
    }

    pub fn data_head(&self, line: i32) -> Result<usize, BasicError> {
        self.data_map.get(&line).copied().ok_or(BasicError::NoSuchLine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StmtKind;

    fn line(arena: &mut Arena, number: i32, kind: StmtKind) -> ParsedLine {
        let id = arena.add_stmt(number, kind);
        ParsedLine { number, first: id, last: id }
    }

    #[test]
    fn duplicate_line_number_is_bad_program() {
        let mut arena = Arena::new();
        let a = line(&mut arena, 10, StmtKind::End);
        let b = line(&mut arena, 10, StmtKind::End);
        match Program::build(arena, vec![a, b]) {
            Err(BasicError::BadProgram) => (),
            other => panic!("expected BadProgram, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn lines_are_linked_in_number_order() {
        let mut arena = Arena::new();
        let b = line(&mut arena, 20, StmtKind::End);
        let a = line(&mut arena, 10, StmtKind::End);
        let prog = Program::build(arena, vec![b, a]).unwrap();
        let first = prog.entry.unwrap();
        assert_eq!(prog.arena.stmt(first).line, 10);
        let next = prog.arena.stmt(first).next.unwrap();
        assert_eq!(prog.arena.stmt(next).line, 20);
    }

    #[test]
    fn data_chain_collects_in_source_order() {
        let mut arena = Arena::new();
        let a = line(&mut arena, 10, StmtKind::Data(vec![Value::Int(1), Value::Int(2)]));
        let b = line(&mut arena, 20, StmtKind::Data(vec![Value::Int(3)]));
        let prog = Program::build(arena, vec![a, b]).unwrap();
        assert_eq!(prog.data_chain.len(), 3);
        assert_eq!(prog.data_head(20).unwrap(), 2);
    }
}
