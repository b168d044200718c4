//! Output mode flags and terminal styling shared by every subcommand.
//!
//! Global flags are exported as environment variables by `main` so any
//! module can check them without threading the parsed CLI through.

use std::io::IsTerminal;

fn flag(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| v == "1")
}

/// `--json`: machine-readable output on stdout.
pub fn is_json() -> bool {
    flag("GAZETTE_JSON")
}

/// `--quiet`: suppress non-essential output.
pub fn is_quiet() -> bool {
    flag("GAZETTE_QUIET")
}

pub fn is_verbose() -> bool {
    flag("GAZETTE_VERBOSE")
}

/// Colors are off under `--no-color`, `NO_COLOR`, or when stderr is not a
/// terminal.
pub fn use_color() -> bool {
    !flag("GAZETTE_NO_COLOR")
        && std::env::var_os("NO_COLOR").is_none()
        && std::io::stderr().is_terminal()
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(_) => println!("{value}"),
    }
}

/// ANSI styling that degrades to plain text.
#[derive(Debug, Clone, Copy)]
pub struct Styled {
    color: bool,
}

impl Styled {
    pub fn new() -> Self {
        Self { color: use_color() }
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    fn paint(&self, code: &str, text: &str) -> String {
        if self.color {
            format!("\x1b[{code}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    pub fn ok_sym(&self) -> String {
        self.paint("32", "[OK]")
    }

    pub fn warn_sym(&self) -> String {
        self.paint("33", "[!!]")
    }

    pub fn err_sym(&self) -> String {
        self.paint("31", "[XX]")
    }

    pub fn bold(&self, text: &str) -> String {
        self.paint("1", text)
    }

    pub fn dim(&self, text: &str) -> String {
        self.paint("2", text)
    }
}

impl Default for Styled {
    fn default() -> Self {
        Self::new()
    }
}
