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

use std::env::args;
use std::fs;
use std::process::exit;

use log::info;

use bbasic::ast::Arena;
use bbasic::options::{self, Action, Options};
use bbasic::parser;
use bbasic::program::Program;
use bbasic::runtime::Runtime;
use bbasic::{signal, terminal};

fn main() {
    let opts = match options::parse(args().skip(1)) {
        Action::Help => {
            println!("{}", options::USAGE);
            exit(0);
        }
        Action::Version => {
            println!("bbasic {}", env!("CARGO_PKG_VERSION"));
            exit(0);
        }
        Action::Usage(msg) => {
            eprintln!("bbasic: {}", msg);
            eprintln!("{}", options::USAGE);
            exit(1);
        }
        Action::Run(opts) => opts,
    };

    init_logging(&opts);

    let source = match read_source(&opts) {
        Some(text) => text,
        None => {
            eprintln!("bbasic: no input provided");
            exit(1);
        }
    };

    let interrupt = signal::install();

    let mut arena = Arena::new();
    let parsed = match parser::parse_program(&mut arena, &source) {
        Ok(lines) => lines,
        Err(e) => {
            eprintln!("bbasic: {}", e);
            exit(1);
        }
    };

    let program = match Program::build(arena, parsed) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("bbasic: {}", e);
            exit(1);
        }
    };

    let mut rt = Runtime::with_interrupt(program, interrupt);
    let status = rt.run();
    terminal::tty_reset();

    match status {
        Ok(()) => {
            info!("exiting cleanly");
            exit(0);
        }
        Err(e) => {
            eprintln!("bbasic: {}", e);
            let code = e.code();
            exit(if code != 0 { code } else { 1 });
        }
    }
}

fn init_logging(opts: &Options) {
    let level = if opts.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Resolves the program text: `--inline` wins over `FILE`, matching the
/// mutual-exclusion already enforced by `options::parse`.
fn read_source(opts: &Options) -> Option<String> {
    if let Some(text) = &opts.inline {
        return Some(text.clone());
    }
    if let Some(path) = &opts.file {
        return fs::read_to_string(path).ok();
    }
    None
}
