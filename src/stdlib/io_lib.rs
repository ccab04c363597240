//! I/O library, namespaced `i` (`IoLibName = "i"` in `qsinit.go`). `put` in
//! the base library covers the common "write a line" case; this module adds
//! the two operations that round-trip through the process's actual stdio
//! rather than always appending a newline.

use std::io::{self, BufRead, Write};

use crate::error::RuntimeError;
use crate::value::{NativeFn, Value};
use crate::vm::Interpreter;

pub const ENTRIES: &[(&str, NativeFn)] = &[("write", write_fn), ("read", read_fn)];

/// `i.write(...)`: writes every argument's display form with no separator
/// and no trailing newline, then flushes. `(true)` on success, `(nil,
/// message)` on a write error — I/O errors never raise.
fn write_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let n = interp.arg_count();
    let mut stdout = io::stdout();
    for i in 0..n {
        if let Err(e) = write!(stdout, "{}", interp.arg(i).display_string()) {
            interp.push_result(Value::Nil);
            interp.push_result(Value::string(e.to_string()));
            return Ok(2);
        }
    }
    let _ = stdout.flush();
    interp.push_result(Value::Bool(true));
    Ok(1)
}

/// `i.read()`: one line from stdin with the trailing newline stripped, or
/// `(nil, "eof")` at end of input.
fn read_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) => {
            interp.push_result(Value::Nil);
            interp.push_result(Value::string("eof"));
            Ok(2)
        }
        Ok(_) => {
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            interp.push_result(Value::string(line));
            Ok(1)
        }
        Err(e) => {
            interp.push_result(Value::Nil);
            interp.push_result(Value::string(e.to_string()));
            Ok(2)
        }
    }
}
