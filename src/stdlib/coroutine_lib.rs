//! Coroutine library, namespaced `g` (`CoroutineLibName = "g"` in
//! `qsinit.go`). `create`/`resume`/`yield`/`status` are the four primitives;
//! `resume` is the one with real work to do, swapping the target
//! [`Coroutine`]'s reified [`Stack`] into the live interpreter and driving it
//! until it yields, returns, or errors.

use crate::coroutine::{Coroutine, ResumeSlot, Stack, Status};
use crate::error::RuntimeError;
use crate::value::{Closure, NativeFn, Value};
use crate::vm::{Interpreter, RunOutcome};

use super::util::{bad_argument, expect_thread};

pub const ENTRIES: &[(&str, NativeFn)] = &[("create", create), ("resume", resume), ("yield", yield_fn), ("status", status)];

/// `g.create(f)`: wraps a closure as a fresh, suspended coroutine. `f` must
/// be callable; a native closure is accepted too (it just runs to
/// completion on first resume without ever yielding).
fn create(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let f = interp.arg(0);
    let closure = match f {
        Value::Closure(c) => c,
        other => return Err(bad_argument(interp, 1, "create", "function", &other)),
    };
    interp.push_result(Value::Thread(std::rc::Rc::new(Coroutine::new(closure))));
    Ok(1)
}

/// `g.resume(co, ...)`: `(true, ...)` on a completed run or a fresh `yield`,
/// `(false, err)` if the coroutine raised. Resuming a dead or already-
/// running coroutine is itself reported as `(false, err)` rather than
/// propagated — a script-catchable condition, not a halt.
fn resume(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let co = expect_thread(interp, 0, "resume")?;
    let args = interp.args_from(1);

    if let Err(e) = co.check_resumable() {
        interp.push_result(Value::Bool(false));
        interp.push_result(Value::string(e.to_string()));
        return Ok(2);
    }

    let caller_stack = interp.swap_stack(co.swap_stack(Stack::default()));
    co.set_status(Status::Running);

    let outcome = if co.is_first_resume() {
        match co.take_entry().expect("is_first_resume just confirmed an entry closure") {
            Closure::Script(sc) => {
                interp.push_script_frame(sc, 0, args, 0, 0);
                interp.drive(0, true)
            }
            Closure::Native(nc) => interp.invoke_native(nc, args).map(RunOutcome::Returned),
        }
    } else {
        if let Some(ResumeSlot { dest, want }) = co.resume_slot() {
            interp.deliver_resume(dest, want, args);
        }
        interp.drive(0, true)
    };

    match outcome {
        Ok(RunOutcome::Returned(vals)) => {
            co.set_status(Status::Dead);
            let finished = interp.swap_stack(caller_stack);
            co.swap_stack(finished);
            interp.push_result(Value::Bool(true));
            let n = vals.len();
            for v in vals {
                interp.push_result(v);
            }
            Ok(1 + n)
        }
        Ok(RunOutcome::Yielded(vals)) => {
            co.set_status(Status::Suspended);
            co.set_resume_slot(interp.take_yield_resume_slot());
            let suspended = interp.swap_stack(caller_stack);
            co.swap_stack(suspended);
            interp.push_result(Value::Bool(true));
            let n = vals.len();
            for v in vals {
                interp.push_result(v);
            }
            Ok(1 + n)
        }
        Err(RuntimeError::Recoverable(obj)) => {
            co.set_status(Status::Dead);
            let finished = interp.swap_stack(caller_stack);
            co.swap_stack(finished);
            interp.push_result(Value::Bool(false));
            interp.push_result(obj.into_value());
            Ok(2)
        }
        Err(halt) => {
            co.set_status(Status::Dead);
            let finished = interp.swap_stack(caller_stack);
            co.swap_stack(finished);
            Err(halt)
        }
    }
}

/// `g.yield(...)`: marks the currently running native call as yielding;
/// the `CALL`/`TAILCALL` handler that invoked it turns this into
/// `Step::Yield` once this native returns (see `crate::vm::Interpreter::
/// signal_yield`). Whatever `resume` is next called with lands back here
/// as this call's own results, delivered by `Interpreter::deliver_resume`.
fn yield_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let vals = interp.args_from(0);
    interp.signal_yield(vals);
    Ok(0)
}

fn status(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let co = expect_thread(interp, 0, "status")?;
    let s = match co.status() {
        Status::Suspended => "suspended",
        Status::Running => "running",
        Status::Normal => "normal",
        Status::Dead => "dead",
    };
    interp.push_result(Value::string(s));
    Ok(1)
}
