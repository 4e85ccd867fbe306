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

//! Expression evaluation: operator dispatch, the builtin table, and user
//! `FN` calls.
//!
//! A user function call pushes a frame, binds arguments, then runs the
//! `DEF FN` body statement-by-statement (`run_fn_body`, mirroring
//! `Runtime::run`'s own loop) until a `FnReturn` yields the result.
//! Recursion such as `FNF(N-1)` falls out of the host call stack for free,
//! the same way nested `eval_expr` calls do.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::ast::{BinOp, Builtin, ExprId, ExprKind, StmtId, StmtKind, UnOp};
use crate::dispatcher::{self, Flow};
use crate::error::BasicError::{self, *};
use crate::error::EvalResult;
use crate::runtime::Runtime;
use crate::symbols::Symbol;
use crate::terminal::{self, ReadOutcome};
use crate::value::Value;

pub fn eval_expr(rt: &mut Runtime, id: ExprId) -> EvalResult<Value> {
    let kind = rt.program.arena.expr(id).kind.clone();
    match kind {
        ExprKind::ConstInt(n) => Ok(Value::Int(n)),
        ExprKind::ConstFloat(f) => Ok(Value::Float(f)),
        ExprKind::ConstStr(s) => Ok(Value::Str(s)),
        ExprKind::Variable(name) => eval_variable(rt, &name),
        ExprKind::ArrayRef(name, subs) => eval_array_ref(rt, &name, &subs),
        ExprKind::Unary(op, e) => {
            let v = eval_expr(rt, e)?;
            match op {
                UnOp::Neg => v.neg(),
                UnOp::Not => v.not(),
            }
        }
        ExprKind::Binary(op, a, b) => {
            let lhs = eval_expr(rt, a)?;
            let rhs = eval_expr(rt, b)?;
            eval_binop(op, &lhs, &rhs)
        }
        ExprKind::Builtin(b, args) => eval_builtin(rt, b, &args),
        ExprKind::FnCall(name, args) => eval_fn_call(rt, &name, &args),
        ExprKind::Cond(cond, then_e, else_e) => {
            if eval_expr(rt, cond)?.is_zero() {
                eval_expr(rt, else_e)
            } else {
                eval_expr(rt, then_e)
            }
        }
    }
}

fn eval_variable(rt: &mut Runtime, name: &str) -> EvalResult<Value> {
    if name == "TIME" {
        return Ok(Value::Int(rt.symbols.time() as i32));
    }
    if name == "COUNT" {
        return Ok(Value::Int(rt.symbols.count as i32));
    }
    if let crate::symbols::NameKind::Resident(idx) = crate::symbols::classify_name(name) {
        return Ok(rt.symbols.resident_get(idx));
    }
    match rt.symbols.get(name) {
        Some(Symbol::Variable(v)) => Ok(v.clone()),
        Some(_) => Err(TypeMismatch),
        None => default_value_for(name),
    }
}

/// An unset variable reads as a type-appropriate zero rather than an
/// error, matching the original's lazily-allocated variable slots.
fn default_value_for(name: &str) -> EvalResult<Value> {
    use crate::symbols::NameKind;
    Ok(match crate::symbols::classify_name(name) {
        NameKind::Str => Value::Str(String::new()),
        NameKind::Integer => Value::Int(0),
        NameKind::Float => Value::Float(0.0),
        NameKind::Resident(_) => Value::Int(0),
    })
}

fn eval_array_ref(rt: &mut Runtime, name: &str, subs: &[ExprId]) -> EvalResult<Value> {
    let indices = eval_int_list(rt, subs)?;
    let arr = rt.symbols.array(name)?;
    let idx = arr.flat_index(&indices)?;
    Ok(arr.elems[idx].clone())
}

fn eval_int_list(rt: &mut Runtime, exprs: &[ExprId]) -> EvalResult<Vec<i32>> {
    let mut out = Vec::with_capacity(exprs.len());
    for &e in exprs {
        out.push(eval_expr(rt, e)?.as_int()?);
    }
    Ok(out)
}

fn eval_binop(op: BinOp, a: &Value, b: &Value) -> EvalResult<Value> {
    match op {
        BinOp::Add => a.add(b),
        BinOp::Sub => a.sub(b),
        BinOp::Mul => a.mul(b),
        BinOp::Div => a.div(b),
        BinOp::IDiv => a.idiv(b),
        BinOp::Mod => a.imod(b),
        BinOp::Pow => a.pow(b),
        BinOp::And => a.bitand(b),
        BinOp::Or => a.bitor(b),
        BinOp::Eor => a.bitxor(b),
        BinOp::Eq => a.eq(b),
        BinOp::Ne => a.ne(b),
        BinOp::Lt => a.lt(b),
        BinOp::Gt => a.gt(b),
        BinOp::Le => a.le(b),
        BinOp::Ge => a.ge(b),
    }
}

fn eval_fn_call(rt: &mut Runtime, name: &str, args: &[ExprId]) -> EvalResult<Value> {
    let (params, body) = match rt.symbols.get(name) {
        Some(Symbol::Func { params, body }) => (params.clone(), *body),
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
    let result = run_fn_body(rt, body);
    rt.symbols.pop_frame();
    result
}

/// Runs a `DEF FN` body statement-by-statement until it reaches a
/// `FnReturn`, whose expression becomes the call's value. Falling off the
/// end of the chain without one reports `NoFn`, the same code BBC BASIC
/// uses for a bare `=` outside any `DEF FN`.
fn run_fn_body(rt: &mut Runtime, entry: StmtId) -> EvalResult<Value> {
    let mut cur = entry;
    loop {
        if let StmtKind::FnReturn(e) = rt.program.arena.stmt(cur).kind {
            return eval_expr(rt, e);
        }
        match dispatcher::exec(rt, cur)? {
            Flow::Next => match rt.program.arena.stmt(cur).next {
                Some(next) => cur = next,
                None => return Err(NoFn),
            },
            Flow::Jump(next) => cur = next,
            Flow::End => return Err(NoFn),
        }
    }
}

fn eval_builtin(rt: &mut Runtime, b: Builtin, args: &[ExprId]) -> EvalResult<Value> {
    // `Builtin::Err` would otherwise shadow the `Result::Err` constructor
    // (and `BasicError::Err`) if glob-imported here, so it's matched via
    // its full path instead of a `use Builtin::*`.
    use Builtin::{
        Abs, Acs, Asc, Asn, Atn, BgetHash, ChrDollar, Cos, Deg, Erl, EofHash, ExtHash, Exp, Get,
        GetDollar, Inkey, InkeyDollar, Instr, Int, LeftDollar, Len, Ln, Log, MidDollar, Openin,
        Openout, Openup, PtrHash, Rad, RightDollar, Rnd, Sgn, Sin, Spc, Sqr, StrDollar,
        StringDollar, Tan, Val,
    };
    match b {
        Abs => {
            let v = eval_expr(rt, args[0])?;
            Ok(match v {
                Value::Int(n) => Value::Int(n.wrapping_abs()),
                Value::Float(f) => Value::Float(f.abs()),
                Value::Str(_) => return Err(TypeMismatch),
            })
        }
        Sgn => {
            let v = eval_expr(rt, args[0])?;
            let f = v.as_float()?;
            Ok(Value::Int(if f > 0.0 { 1 } else if f < 0.0 { -1 } else { 0 }))
        }
        Int => Ok(Value::Int(eval_expr(rt, args[0])?.as_float()?.floor() as i32)),
        Acs => unary_float(rt, args, f64::acos, true),
        Asn => unary_float(rt, args, f64::asin, true),
        Atn => unary_float(rt, args, f64::atan, false),
        Cos => unary_float(rt, args, f64::cos, false),
        Sin => unary_float(rt, args, f64::sin, false),
        Tan => unary_float(rt, args, f64::tan, false),
        Exp => unary_float(rt, args, f64::exp, false),
        Sqr => {
            let f = eval_expr(rt, args[0])?.as_float()?;
            if f < 0.0 {
                return Err(NegativeRoot);
            }
            Ok(Value::Float(f.sqrt()))
        }
        Ln => {
            let f = eval_expr(rt, args[0])?.as_float()?;
            if f <= 0.0 {
                return Err(LogRange);
            }
            Ok(Value::Float(f.ln()))
        }
        Log => {
            let f = eval_expr(rt, args[0])?.as_float()?;
            if f <= 0.0 {
                return Err(LogRange);
            }
            Ok(Value::Float(f.log10()))
        }
        Deg => Ok(Value::Float(eval_expr(rt, args[0])?.as_float()?.to_degrees())),
        Rad => Ok(Value::Float(eval_expr(rt, args[0])?.as_float()?.to_radians())),
        Rnd => eval_rnd(rt, args),
        Asc => {
            let s = eval_expr(rt, args[0])?;
            let s = s.as_str()?;
            Ok(Value::Int(s.chars().next().map(|c| c as i32).unwrap_or(-1)))
        }
        ChrDollar => {
            let n = eval_expr(rt, args[0])?.as_int()?;
            let c = char::from_u32(n as u32).ok_or(Arguments)?;
            Ok(Value::Str(c.to_string()))
        }
        Len => Ok(Value::Int(eval_expr(rt, args[0])?.as_str()?.chars().count() as i32)),
        StrDollar => {
            let v = eval_expr(rt, args[0])?;
            let fmt = rt.symbols.format();
            Ok(Value::Str(v.to_string_formatted(&fmt, false)))
        }
        Val => {
            let s = eval_expr(rt, args[0])?;
            Ok(Value::Float(parse_leading_number(s.as_str()?)))
        }
        StringDollar => {
            let n = eval_expr(rt, args[0])?.as_int()?;
            let s = eval_expr(rt, args[1])?;
            let s = s.as_str()?;
            if n < 0 {
                return Err(Arguments);
            }
            Ok(Value::Str(s.repeat(n as usize)))
        }
        Spc => {
            let n = eval_expr(rt, args[0])?.as_int()?;
            if n < 0 {
                return Err(Arguments);
            }
            Ok(Value::Str(" ".repeat(n as usize)))
        }
        LeftDollar => {
            let s = eval_expr(rt, args[0])?;
            let s = s.as_str()?;
            let n = if args.len() > 1 {
                eval_expr(rt, args[1])?.as_int()?
            } else {
                s.chars().count() as i32 - 1
            };
            if n < 0 {
                return Err(Arguments);
            }
            Ok(Value::Str(s.chars().take(n as usize).collect()))
        }
        RightDollar => {
            let s = eval_expr(rt, args[0])?;
            let s = s.as_str()?;
            let chars: Vec<char> = s.chars().collect();
            let n = if args.len() > 1 {
                eval_expr(rt, args[1])?.as_int()?
            } else {
                1
            };
            if n < 0 {
                return Err(Arguments);
            }
            let n = (n as usize).min(chars.len());
            Ok(Value::Str(chars[chars.len() - n..].iter().collect()))
        }
        MidDollar => {
            let s = eval_expr(rt, args[0])?;
            let s = s.as_str()?;
            let chars: Vec<char> = s.chars().collect();
            let start = eval_expr(rt, args[1])?.as_int()?;
            if start < 1 {
                return Err(Arguments);
            }
            let start = (start as usize - 1).min(chars.len());
            let len = if args.len() > 2 {
                let n = eval_expr(rt, args[2])?.as_int()?;
                if n < 0 {
                    return Err(Arguments);
                }
                n as usize
            } else {
                chars.len() - start
            };
            let end = (start + len).min(chars.len());
            Ok(Value::Str(chars[start..end].iter().collect()))
        }
        Instr => {
            let hay = eval_expr(rt, args[0])?;
            let hay = hay.as_str()?.to_string();
            let needle = eval_expr(rt, args[1])?;
            let needle = needle.as_str()?;
            let start = if args.len() > 2 {
                let n = eval_expr(rt, args[2])?.as_int()?;
                if n < 1 {
                    return Err(Arguments);
                }
                (n - 1) as usize
            } else {
                0
            };
            let chars: Vec<char> = hay.chars().collect();
            if start > chars.len() {
                return Ok(Value::Int(0));
            }
            let haystack: String = chars[start..].iter().collect();
            Ok(Value::Int(match haystack.find(needle) {
                Some(byte_pos) => (haystack[..byte_pos].chars().count() + start + 1) as i32,
                None => 0,
            }))
        }
        Get => match terminal::get_char(None)? {
            ReadOutcome::Byte(b) => Ok(Value::Int(b as i32)),
            ReadOutcome::Timeout => Ok(Value::Int(-1)),
            ReadOutcome::Eof => Err(BasicError::Eof),
        },
        GetDollar => match terminal::get_char(None)? {
            ReadOutcome::Byte(b) => Ok(Value::Str((b as char).to_string())),
            ReadOutcome::Timeout => Ok(Value::Str(String::new())),
            ReadOutcome::Eof => Err(BasicError::Eof),
        },
        Inkey => {
            let n = eval_expr(rt, args[0])?.as_int()?;
            match terminal::get_char(Some(n))? {
                ReadOutcome::Byte(b) => Ok(Value::Int(b as i32)),
                ReadOutcome::Timeout => Ok(Value::Int(-1)),
                ReadOutcome::Eof => Ok(Value::Int(-1)),
            }
        }
        InkeyDollar => {
            let n = eval_expr(rt, args[0])?.as_int()?;
            match terminal::get_char(Some(n))? {
                ReadOutcome::Byte(b) => Ok(Value::Str((b as char).to_string())),
                ReadOutcome::Timeout => Ok(Value::Str(String::new())),
                ReadOutcome::Eof => Ok(Value::Str(String::new())),
            }
        }
        Openin => {
            let path = eval_expr(rt, args[0])?;
            Ok(Value::Int(rt.files.open_in(path.as_str()?)))
        }
        Openout => {
            let path = eval_expr(rt, args[0])?;
            Ok(Value::Int(rt.files.open_out(path.as_str()?)))
        }
        Openup => {
            let path = eval_expr(rt, args[0])?;
            Ok(Value::Int(rt.files.open_up(path.as_str()?)))
        }
        PtrHash => {
            let fd = eval_expr(rt, args[0])?.as_int()?;
            Ok(Value::Int(rt.files.ptr(fd)?))
        }
        ExtHash => {
            let fd = eval_expr(rt, args[0])?.as_int()?;
            Ok(Value::Int(rt.files.ext(fd)?))
        }
        EofHash => {
            let fd = eval_expr(rt, args[0])?.as_int()?;
            Ok(Value::Int(rt.files.eof(fd)?))
        }
        BgetHash => {
            let fd = eval_expr(rt, args[0])?.as_int()?;
            Ok(Value::Int(rt.files.bget(fd)?))
        }
        Builtin::Err => Ok(Value::Int(rt.errors.err())),
        Erl => Ok(Value::Int(rt.errors.erl())),
    }
}

fn unary_float(
    rt: &mut Runtime,
    args: &[ExprId],
    f: impl Fn(f64) -> f64,
    domain_checked: bool,
) -> EvalResult<Value> {
    let x = eval_expr(rt, args[0])?.as_float()?;
    if domain_checked && !(-1.0..=1.0).contains(&x) {
        return Err(LogRange);
    }
    Ok(Value::Float(f(x)))
}

/// `RND`'s overloaded contract: `RND(1)` a float in `[0,1)`, `RND(n)` for
/// `n>1` a uniform integer in `1..=n`, `RND(0)` repeats the last value
/// produced, `RND` of a negative number reseeds the generator
/// deterministically from that value (and returns it unchanged).
fn eval_rnd(rt: &mut Runtime, args: &[ExprId]) -> EvalResult<Value> {
    if args.is_empty() {
        let v = Value::Int(rt.rng.gen());
        rt.last_random = v.clone();
        return Ok(v);
    }
    let n = eval_expr(rt, args[0])?.as_int()?;
    let result = if n < 0 {
        rt.rng = StdRng::seed_from_u64(n as i64 as u64);
        Value::Int(n)
    } else if n == 0 {
        rt.last_random.clone()
    } else if n == 1 {
        Value::Float(rt.rng.gen::<f64>())
    } else {
        Value::Int(rt.rng.gen_range(1, n + 1))
    };
    if n != 0 {
        rt.last_random = result.clone();
    }
    Ok(result)
}

/// `VAL`: parses the longest numeric prefix, `0` if none.
fn parse_leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let bytes = s.as_bytes();
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let mut seen_digit = false;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
        seen_digit = true;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
            seen_digit = true;
        }
    }
    if !seen_digit {
        return 0.0;
    }
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut look = end + 1;
        if look < bytes.len() && (bytes[look] == b'+' || bytes[look] == b'-') {
            look += 1;
        }
        if look < bytes.len() && bytes[look].is_ascii_digit() {
            while look < bytes.len() && bytes[look].is_ascii_digit() {
                look += 1;
            }
            end = look;
        }
    }
    s[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn val_parses_leading_numeric_prefix() {
        assert_eq!(parse_leading_number("42abc"), 42.0);
        assert_eq!(parse_leading_number("  -3.5xyz"), -3.5);
        assert_eq!(parse_leading_number("xyz"), 0.0);
        assert_eq!(parse_leading_number("1.5e2"), 150.0);
    }
}
