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

//! Command line handling: `bbasic [OPTIONS] [FILE]`.
//!
//! Parsed by hand over `std::env::args()`, in the same style as the
//! original `main.rs` rather than through a CLI-parsing crate -- the
//! surface here is five flags, not worth a dependency.

pub const USAGE: &str = "\
usage: bbasic [OPTIONS] [FILE]

options:
  -d, --debug          enable debug logging
  -i, --inline STRING  program text given inline (mutually exclusive with FILE)
  -h, --help           print this message and exit
  -V, --version        print version information and exit";

pub enum Action {
    Run(Options),
    Help,
    Version,
    Usage(String),
}

#[derive(Default, Debug, Clone)]
pub struct Options {
    pub debug: bool,
    pub inline: Option<String>,
    pub file: Option<String>,
}

/// Parses an argv-style iterator (program name already stripped).
pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Action {
    let mut opts = Options::default();
    let mut iter = args.into_iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Action::Help,
            "-V" | "--version" => return Action::Version,
            "-d" | "--debug" => opts.debug = true,
            "-i" | "--inline" => match iter.next() {
                Some(text) => opts.inline = Some(text),
                None => return Action::Usage("--inline requires an argument".to_string()),
            },
            other if other.starts_with('-') => {
                return Action::Usage(format!("unrecognised option '{}'", other));
            }
            other => {
                if opts.file.is_some() {
                    return Action::Usage("multiple input files given".to_string());
                }
                opts.file = Some(other.to_string());
            }
        }
    }

    if opts.inline.is_some() && opts.file.is_some() {
        return Action::Usage("FILE and --inline are mutually exclusive".to_string());
    }

    Action::Run(opts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(s: &[&str]) -> Vec<String> {
        s.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn help_flag_short_circuits() {
        assert!(matches!(parse(argv(&["-h"])), Action::Help));
        assert!(matches!(parse(argv(&["--help"])), Action::Help));
    }

    #[test]
    fn file_and_inline_are_mutually_exclusive() {
        assert!(matches!(
            parse(argv(&["-i", "PRINT 1", "prog.bas"])),
            Action::Usage(_)
        ));
    }

    #[test]
    fn debug_flag_and_file_combine() {
        match parse(argv(&["-d", "prog.bas"])) {
            Action::Run(opts) => {
                assert!(opts.debug);
                assert_eq!(opts.file.as_deref(), Some("prog.bas"));
            }
            _ => panic!("expected Run"),
        }
    }

    #[test]
    fn no_input_parses_to_empty_options() {
        match parse(argv(&[])) {
            Action::Run(opts) => {
                assert!(opts.file.is_none());
                assert!(opts.inline.is_none());
            }
            _ => panic!("expected Run"),
        }
    }
}
