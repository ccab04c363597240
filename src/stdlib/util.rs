//! Shared argument-checking helpers for the stdlib modules: every builtin
//! reads its arguments positionally off the current native call, so the
//! standardized "bad argument #N to 'f' (T expected, got U)" message is
//! worth building once.

use std::cell::RefCell;
use std::rc::Rc;

use crate::channel::Channel;
use crate::coroutine::Coroutine;
use crate::error::RuntimeError;
use crate::list::List;
use crate::value::Value;
use crate::vm::Interpreter;

pub(crate) fn bad_argument(interp: &Interpreter, index: usize, fname: &str, expected: &str, got: &Value) -> RuntimeError {
    interp.runtime_error(
        interp.current_line(),
        format!("bad argument #{index} to '{fname}' ({expected} expected, got {})", got.type_name()),
    )
}

pub(crate) fn expect_list(interp: &Interpreter, i: usize, fname: &str) -> Result<Rc<RefCell<List>>, RuntimeError> {
    let v = interp.arg(i);
    v.as_list().cloned().ok_or_else(|| bad_argument(interp, i + 1, fname, "list", &v))
}

pub(crate) fn expect_number(interp: &Interpreter, i: usize, fname: &str) -> Result<f64, RuntimeError> {
    let v = interp.arg(i);
    v.as_number().ok_or_else(|| bad_argument(interp, i + 1, fname, "number", &v))
}

pub(crate) fn expect_string(interp: &Interpreter, i: usize, fname: &str) -> Result<Rc<str>, RuntimeError> {
    match interp.arg(i) {
        Value::Str(s) => Ok(s),
        other => Err(bad_argument(interp, i + 1, fname, "string", &other)),
    }
}

pub(crate) fn expect_channel(interp: &Interpreter, i: usize, fname: &str) -> Result<Rc<Channel>, RuntimeError> {
    match interp.arg(i) {
        Value::Channel(c) => Ok(c),
        other => Err(bad_argument(interp, i + 1, fname, "channel", &other)),
    }
}

pub(crate) fn expect_thread(interp: &Interpreter, i: usize, fname: &str) -> Result<Rc<Coroutine>, RuntimeError> {
    match interp.arg(i) {
        Value::Thread(c) => Ok(c),
        other => Err(bad_argument(interp, i + 1, fname, "thread", &other)),
    }
}
