//! OS library, namespaced `o` (`OsLibName = "o"` in `qsinit.go`, left
//! commented out there). Time/environment queries only — process control
//! (`exit`) lives on `quit`/`bye`/`stop` in the base library instead.

use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

use crate::error::RuntimeError;
use crate::value::{NativeFn, Value};
use crate::vm::Interpreter;

static PROCESS_START: Lazy<std::time::Instant> = Lazy::new(std::time::Instant::now);

pub const ENTRIES: &[(&str, NativeFn)] = &[("time", time), ("clock", clock), ("getenv", getenv)];

fn time(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let secs = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0);
    interp.push_result(Value::Number(secs));
    Ok(1)
}

/// CPU-ish wall-clock seconds since the `State` was created, not true
/// process CPU time — good enough for script-level benchmarking loops.
fn clock(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    interp.push_result(Value::Number(PROCESS_START.elapsed().as_secs_f64()));
    Ok(1)
}

/// `getenv(name)`: `(value)` if set, `nil` otherwise — never raises.
fn getenv(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let name = match interp.arg(0) {
        Value::Str(s) => s,
        _ => {
            interp.push_result(Value::Nil);
            return Ok(1);
        }
    };
    match std::env::var(&*name) {
        Ok(v) => interp.push_result(Value::string(v)),
        Err(_) => interp.push_result(Value::Nil),
    }
    Ok(1)
}
