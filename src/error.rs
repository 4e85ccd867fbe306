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

//! BBC error codes, and the runtime error register.

use std::fmt;

/// A runtime error, carrying the BBC numeric code and message text.
///
/// Codes follow the Acorn/Acorn-compatible numbering used by the original
/// interpreter this was distilled from.
#[derive(Clone, Debug, PartialEq)]
pub enum BasicError {
    TypeMismatch,
    Subscript,
    DivisionByZero,
    NegativeRoot,
    LogRange,
    Channel,
    Eof,
    Arguments,
    NoFor,
    NoGosub,
    NoProc,
    NoFn,
    NoRepeat,
    CantMatchFor,
    NoSuchLine,
    NoSuchVariable,
    NoSuchProc,
    OutOfData,
    BadProgram,
    BadDim,
    Syntax,
    Escape,
    TooBig,
    StringTooLong,
    NotLocal,
    OnRange,
    Stop,
}

use BasicError::*;

impl BasicError {
    /// The numeric code reported by `ERR` and returned as a process exit
    /// status on an uncaught error.
    pub fn code(&self) -> i32 {
        match self {
            TypeMismatch => 6,
            NoSuchVariable => 26,
            BadDim => 10,
            Subscript => 15,
            Syntax => 16,
            Escape => 17,
            DivisionByZero => 18,
            StringTooLong => 19,
            BadProgram => 11,
            NoSuchProc => 29,
            NoFn => 30,
            NoRepeat => 32,
            NoFor => 33,
            CantMatchFor => 34,
            OnRange => 35,
            NoGosub => 38,
            NoProc => 40,
            NoSuchLine => 41,
            OutOfData => 42,
            NotLocal => 44,
            NegativeRoot => 21,
            LogRange => 22,
            Arguments => 27,
            Channel => 192,
            Eof => 191,
            TooBig => 20,
            Stop => 0,
        }
    }

    /// User-facing message, matching the text printed by the original
    /// interpreter on an uncaught error.
    pub fn message(&self) -> &'static str {
        match self {
            TypeMismatch => "Type mismatch",
            Subscript => "Subscript outside range",
            DivisionByZero => "Division by zero",
            NegativeRoot => "-ve root",
            LogRange => "Log range",
            Channel => "Channel",
            Eof => "EOF",
            Arguments => "Arguments",
            NoFor => "No FOR",
            NoGosub => "No GOSUB",
            NoProc => "No PROC",
            NoFn => "No FN",
            NoRepeat => "No REPEAT",
            CantMatchFor => "Can't match FOR",
            NoSuchLine => "No such line",
            NoSuchVariable => "No such variable",
            NoSuchProc => "No such FN/PROC",
            OutOfData => "Out of DATA",
            BadProgram => "Bad program",
            BadDim => "Bad DIM",
            Syntax => "Syntax error",
            Escape => "Escape",
            TooBig => "Too big",
            StringTooLong => "String too long",
            NotLocal => "Not LOCAL",
            OnRange => "ON range",
            Stop => "STOP",
        }
    }
}

impl fmt::Display for BasicError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

/// `{current_code, current_line, last_reported_code, last_reported_line}`.
///
/// Setting an error updates both pairs. Clearing (on trap) only touches
/// the current pair, so `ERR`/`ERL` keep reporting the trapped error while
/// the handler runs.
#[derive(Clone, Debug, Default)]
pub struct ErrorRegister {
    current: Option<(i32, i32)>,
    last_reported: Option<(i32, i32)>,
}

impl ErrorRegister {
    pub fn new() -> ErrorRegister {
        ErrorRegister { current: None, last_reported: None }
    }

    pub fn set(&mut self, err: &BasicError, line: i32) {
        let pair = (err.code(), line);
        self.current = Some(pair);
        self.last_reported = Some(pair);
    }

    /// Clears the current slot only, as happens when an `ON ERROR` trap
    /// takes control. `ERR`/`ERL` continue to report the trapped error.
    pub fn clear_current(&mut self) {
        self.current = None;
    }

    pub fn is_set(&self) -> bool {
        self.current.is_some()
    }

    /// Value exposed by the `ERR` pseudo-variable: 0 if nothing has ever
    /// been reported.
    pub fn err(&self) -> i32 {
        self.last_reported.map(|(c, _)| c).unwrap_or(0)
    }

    /// Value exposed by the `ERL` pseudo-variable.
    pub fn erl(&self) -> i32 {
        self.last_reported.map(|(_, l)| l).unwrap_or(0)
    }

    pub fn last_message(&self) -> Option<String> {
        self.last_reported.map(|(code, _)| {
            code_to_message(code).to_string()
        })
    }
}

fn code_to_message(code: i32) -> &'static str {
    // Only codes reachable via BasicError::code() are meaningful here;
    // anything else reports the generic Acorn text.
    for err in ALL_ERRORS.iter() {
        if err.code() == code {
            return err.message();
        }
    }
    "Error"
}

const ALL_ERRORS: [BasicError; 26] = [
    TypeMismatch, Subscript, DivisionByZero, NegativeRoot, LogRange,
    Channel, Eof, Arguments, NoFor, NoGosub, NoProc, NoFn, NoRepeat,
    CantMatchFor, NoSuchLine, NoSuchVariable, NoSuchProc, OutOfData,
    BadProgram, BadDim, Syntax, Escape, TooBig, StringTooLong, NotLocal,
    OnRange,
];

/// Outcome of executing one statement or running a full statement stream.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecStatus {
    Ok,
    Exit,
    Error(BasicError),
}

pub type EvalResult<T> = Result<T, BasicError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_updates_both_slots() {
        let mut reg = ErrorRegister::new();
        reg.set(&DivisionByZero, 20);
        assert_eq!(reg.err(), 18);
        assert_eq!(reg.erl(), 20);
        assert!(reg.is_set());
    }

    #[test]
    fn clear_current_preserves_last_reported() {
        let mut reg = ErrorRegister::new();
        reg.set(&DivisionByZero, 20);
        reg.clear_current();
        assert!(!reg.is_set());
        assert_eq!(reg.err(), 18);
        assert_eq!(reg.erl(), 20);
    }

    #[test]
    fn no_error_reports_zero() {
        let reg = ErrorRegister::new();
        assert_eq!(reg.err(), 0);
        assert_eq!(reg.erl(), 0);
    }
}
