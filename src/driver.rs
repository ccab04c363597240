//! Incremental REPL driver. Reads lines into a buffer and tries to
//! compile-and-run what's accumulated so far; on a [`CompileError`] marked
//! `incomplete`, reads another line instead of reporting an error, so a
//! multi-line `if ... end` can be typed across several prompts. Exit codes:
//! 0 ok, 1 warning, 2 error, 3 fatal.

use std::io::{self, BufRead, Write};
use std::path::Path;

use crate::error::RuntimeError;
use crate::state::{RunError, State};

pub const EXIT_OK: i32 = 0;
pub const EXIT_WARNING: i32 = 1;
pub const EXIT_ERROR: i32 = 2;
pub const EXIT_FATAL: i32 = 3;

/// A `quit(code)`/`bye`/`stop` halt carries its requested exit code as
/// `"exit:{code}"` (see `crate::stdlib::base::quit`); anything else is a
/// genuine fatal halt.
fn exit_code_of(err: &RuntimeError) -> Option<i32> {
    match err {
        RuntimeError::Halt(msg) => msg.strip_prefix("exit:").and_then(|n| n.parse().ok()),
        RuntimeError::Recoverable(_) => None,
    }
}

fn report_run_error(err: &RunError) -> i32 {
    match err {
        RunError::Compile(e) => {
            eprintln!("{e}");
            EXIT_ERROR
        }
        RunError::Runtime(e) => match exit_code_of(e) {
            Some(code) => code,
            None => {
                eprintln!("{e}");
                if matches!(e, RuntimeError::Halt(_)) { EXIT_FATAL } else { EXIT_ERROR }
            }
        },
        RunError::Io(e) => {
            eprintln!("{e}");
            EXIT_FATAL
        }
    }
}

/// Runs `path` as a script to completion, returning the process exit code.
pub fn run_file(state: &mut State, path: &Path) -> i32 {
    match state.do_file(path) {
        Ok(_) => EXIT_OK,
        Err(e) => report_run_error(&e),
    }
}

enum Outcome {
    StillIncomplete,
    Done(i32),
}

/// The interactive read-eval-print loop itself.
pub struct Repl<'a> {
    state: &'a mut State,
    buffer: String,
}

impl<'a> Repl<'a> {
    pub fn new(state: &'a mut State) -> Self {
        Self { state, buffer: String::new() }
    }

    /// Drives stdin/stdout until EOF or a halt that isn't a resumable
    /// per-statement error, returning the process exit code to use.
    pub fn run_interactive(&mut self) -> i32 {
        let stdin = io::stdin();
        let mut out = io::stdout();
        loop {
            let prompt = if self.buffer.is_empty() { "> " } else { ">> " };
            let _ = write!(out, "{prompt}");
            let _ = out.flush();

            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) => return EXIT_OK,
                Ok(_) => {}
                Err(_) => return EXIT_FATAL,
            }
            if !self.buffer.is_empty() {
                self.buffer.push('\n');
            }
            self.buffer.push_str(line.trim_end_matches('\n'));

            match self.try_run() {
                Outcome::StillIncomplete => continue,
                Outcome::Done(code) => {
                    self.buffer.clear();
                    if code != EXIT_OK && code != EXIT_WARNING && code != EXIT_ERROR {
                        return code;
                    }
                }
            }
        }
    }

    fn try_run(&mut self) -> Outcome {
        match self.state.do_string(&self.buffer, "=stdin") {
            Ok(_) => Outcome::Done(EXIT_OK),
            Err(RunError::Compile(e)) if e.incomplete => Outcome::StillIncomplete,
            Err(e) => Outcome::Done(report_run_error(&e)),
        }
    }
}
