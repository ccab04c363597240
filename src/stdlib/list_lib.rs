//! List-operations library, namespaced `l` (`TabLibName = "l"` in
//! `qsinit.go`, left commented out there). Thin wrappers over
//! [`crate::list::List`]'s own `insert`/`remove`/`max_n`.

use crate::error::RuntimeError;
use crate::value::{NativeFn, Value};
use crate::vm::Interpreter;

use super::util::{expect_list, expect_number};

pub const ENTRIES: &[(&str, NativeFn)] = &[("insert", insert), ("remove", remove), ("maxn", maxn)];

/// `l.insert(t, v)` appends; `l.insert(t, pos, v)` inserts at `pos`,
/// shifting later elements up.
fn insert(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let list = expect_list(interp, 0, "insert")?;
    if interp.arg_count() >= 3 {
        let pos = expect_number(interp, 1, "insert")? as i64;
        let v = interp.arg(2);
        list.borrow_mut().insert(pos, v);
    } else {
        let v = interp.arg(1);
        let pos = list.borrow().max_n() + 1;
        list.borrow_mut().insert(pos, v);
    }
    Ok(0)
}

/// `l.remove(t)` pops the last element; `l.remove(t, pos)` removes at `pos`,
/// shifting later elements down.
fn remove(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let list = expect_list(interp, 0, "remove")?;
    let pos = if interp.arg_count() >= 2 { expect_number(interp, 1, "remove")? as i64 } else { list.borrow().max_n() };
    interp.push_result(list.borrow_mut().remove(pos));
    Ok(1)
}

fn maxn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let list = expect_list(interp, 0, "maxn")?;
    interp.push_result(Value::Number(list.borrow().max_n() as f64));
    Ok(1)
}
