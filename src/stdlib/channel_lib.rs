//! Channel library, namespaced `c` (`ChannelLibName = "c"` in `qsinit.go`).
//! `make`/`send`/`receive`/`close` wrap [`crate::channel::Channel`] directly;
//! `select` is the one operation with no one-to-one `Channel` method, built
//! on `crossbeam_channel::Select` over each candidate channel's receiver —
//! it waits on the first ready case and runs that case's handler.

use std::rc::Rc;

use crossbeam_channel::Select;

use crate::channel::{Capacity, Channel};
use crate::error::RuntimeError;
use crate::value::{NativeFn, Value};
use crate::vm::Interpreter;

use super::util::{bad_argument, expect_channel};

pub const ENTRIES: &[(&str, NativeFn)] = &[
    ("make", make),
    ("send", send),
    ("receive", receive),
    ("try_send", try_send),
    ("try_receive", try_receive),
    ("close", close),
    ("select", select_fn),
];

/// `c.make()` is unbounded; `c.make(n)` is bounded at `n` (`n == 0` is a
/// Go-style synchronous rendezvous channel).
fn make(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let capacity = match interp.arg(0) {
        Value::Nil => Capacity::Unbounded,
        Value::Number(n) => Capacity::Bounded(n.max(0.0) as usize),
        other => return Err(bad_argument(interp, 1, "make", "number or nil", &other)),
    };
    interp.push_result(Value::Channel(Rc::new(Channel::new(capacity))));
    Ok(1)
}

fn send(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let ch = expect_channel(interp, 0, "send")?;
    let v = interp.arg(1);
    match ch.send(v) {
        Ok(()) => Ok(0),
        Err(msg) => Err(interp.runtime_error(interp.current_line(), msg)),
    }
}

fn receive(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let ch = expect_channel(interp, 0, "receive")?;
    let (ok, v) = ch.receive();
    interp.push_result(Value::Bool(ok));
    interp.push_result(v);
    Ok(2)
}

fn try_send(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let ch = expect_channel(interp, 0, "try_send")?;
    let v = interp.arg(1);
    match ch.try_send(v) {
        Ok(sent) => {
            interp.push_result(Value::Bool(sent));
            Ok(1)
        }
        Err(msg) => Err(interp.runtime_error(interp.current_line(), msg)),
    }
}

fn try_receive(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let ch = expect_channel(interp, 0, "try_receive")?;
    match ch.try_receive() {
        Some((ok, v)) => {
            interp.push_result(Value::Bool(ok));
            interp.push_result(v);
            Ok(2)
        }
        None => {
            interp.push_result(Value::Bool(false));
            interp.push_result(Value::Nil);
            Ok(2)
        }
    }
}

fn close(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let ch = expect_channel(interp, 0, "close")?;
    ch.close();
    Ok(0)
}

/// `c.select(ch1, handler1, ch2, handler2, ...)`: blocks until any channel
/// is ready, then calls that channel's handler with `(ok, value)` and
/// returns whatever the handler returns.
fn select_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let argc = interp.arg_count();
    if argc == 0 || argc % 2 != 0 {
        return Err(interp.runtime_error(interp.current_line(), "select expects (channel, handler) pairs"));
    }
    let n = argc / 2;
    let mut channels = Vec::with_capacity(n);
    let mut handlers = Vec::with_capacity(n);
    for i in 0..n {
        channels.push(expect_channel(interp, i * 2, "select")?);
        handlers.push(interp.arg(i * 2 + 1));
    }

    let mut sel = Select::new();
    for ch in &channels {
        sel.recv(ch.receiver());
    }
    let oper = sel.select();
    let idx = oper.index();
    let (ok, v) = match oper.recv(channels[idx].receiver()) {
        Ok(v) => (true, v),
        Err(_) => (false, Value::Nil),
    };

    let line = interp.current_line();
    let handler = handlers[idx].clone();
    let results = interp.call_value(handler, vec![Value::Bool(ok), v], line)?;
    let count = results.len();
    for r in results {
        interp.push_result(r);
    }
    Ok(count)
}
