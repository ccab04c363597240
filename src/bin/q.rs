//! `q`: run a script file, or drop into the interactive REPL when given
//! none. No flag-parsing library — `std::env::args` is enough for "a path, or
//! nothing".

use std::process::ExitCode;

use q::driver::{self, Repl};
use q::{State, VmOptions};

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let mut state = State::new(VmOptions::default());
    q::stdlib::install(&mut state);

    let mut args = std::env::args().skip(1);
    let code = match args.next() {
        Some(path) => driver::run_file(&mut state, std::path::Path::new(&path)),
        None => Repl::new(&mut state).run_interactive(),
    };

    ExitCode::from(code as u8)
}
