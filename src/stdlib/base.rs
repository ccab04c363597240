//! Base library: `assert`, `error`, `type`,
//! `tostring`/`tonumber`, protected calls, the `next`/`pairs`/`ipairs`
//! iteration protocol, raw table access, metatable control, chunk loading,
//! and the small set of process-level utilities (`put`, `logd`/`logi`/`logw`/
//! `loge`, `quit`/`bye`/`stop`). Registered directly into globals — unlike
//! `math`/`string`/`os`/etc. this library has no namespace table of its own,
//! matching `qsinit.go`'s `BaseLibName = ""`.

use std::rc::Rc;

use tracing::{debug, error, info, warn};

use crate::error::RuntimeError;
use crate::list::Cursor;
use crate::value::{Closure, NativeClosure, NativeFn, ScriptClosure, Value};
use crate::vm::Interpreter;

use super::util::{bad_argument, expect_list};

pub const ENTRIES: &[(&str, NativeFn)] = &[
    ("assert", assert_fn),
    ("error", error_fn),
    ("type", type_fn),
    ("tostring", tostring),
    ("tonumber", tonumber),
    ("pcall", pcall),
    ("xpcall", xpcall),
    ("select", select),
    ("next", next_fn),
    ("pairs", pairs),
    ("ipairs", ipairs),
    ("unpack", unpack),
    ("collectgarbage", collectgarbage),
    ("rawget", rawget),
    ("rawset", rawset),
    ("rawequal", rawequal),
    ("setmetatable", setmetatable),
    ("getmetatable", getmetatable),
    ("load", load),
    ("loadstring", load),
    ("loadfile", loadfile),
    ("put", put),
    ("logd", logd),
    ("logi", logi),
    ("logw", logw),
    ("loge", loge),
    ("quit", quit),
    ("bye", quit),
    ("stop", quit),
];

fn assert_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let v = interp.arg(0);
    if v.is_truthy() {
        let n = interp.arg_count();
        for i in 0..n {
            interp.push_result(interp.arg(i));
        }
        Ok(n)
    } else {
        let msg = if interp.arg_count() >= 2 { interp.arg(1) } else { Value::string("assertion failed!") };
        Err(RuntimeError::thrown(msg))
    }
}

/// `error(v, level)`: a string `v` at a nonzero level (the default) is
/// stamped with the calling frame's source/line, the standard source-prefix
/// form `tostring(err)` shows after a `pcall` catches it.
fn error_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let v = interp.arg(0);
    let level = if interp.arg_count() >= 2 { interp.arg(1).as_number().unwrap_or(1.0) } else { 1.0 };
    if level != 0.0 {
        if let Value::Str(s) = &v {
            let line = interp.current_line();
            return Err(interp.runtime_error(line, s.to_string()));
        }
    }
    Err(RuntimeError::thrown(v))
}

fn type_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    interp.push_result(Value::string(interp.arg(0).type_name()));
    Ok(1)
}

fn tostring(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let v = interp.arg(0);
    if let Some(mm) = interp.metamethod(&v, crate::consts::MM_TOSTRING) {
        let line = interp.current_line();
        let mut results = interp.call_value(mm, vec![v], line)?;
        interp.push_result(results.drain(..).next().unwrap_or(Value::Nil));
    } else {
        interp.push_result(Value::string(v.display_string()));
    }
    Ok(1)
}

fn tonumber(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let v = interp.arg(0);
    let result = match &v {
        Value::Number(n) => Some(*n),
        Value::Str(s) => {
            if interp.arg_count() >= 2 {
                let base = interp.arg(1).as_number().unwrap_or(10.0) as u32;
                i64::from_str_radix(s.trim(), base).ok().map(|n| n as f64)
            } else {
                s.trim().parse::<f64>().ok()
            }
        }
        _ => None,
    };
    interp.push_result(result.map(Value::Number).unwrap_or(Value::Nil));
    Ok(1)
}

/// `pcall(f, ...)`: delegates to `Interpreter::protected_call`, then
/// translates its `Result` into the `(ok, ...)` tuple convention rather than propagating a recoverable error as a Rust `Err`. A
/// `RuntimeError::Halt` still propagates — no protected call can paper over
/// the interpreter itself being unable to continue.
fn pcall(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let f = interp.arg(0);
    let args = interp.args_from(1);
    let line = interp.current_line();
    match interp.protected_call(f, args, line) {
        Ok(vals) => {
            interp.push_result(Value::Bool(true));
            let n = vals.len();
            for v in vals {
                interp.push_result(v);
            }
            Ok(1 + n)
        }
        Err(RuntimeError::Recoverable(obj)) => {
            interp.push_result(Value::Bool(false));
            interp.push_result(obj.into_value());
            Ok(2)
        }
        Err(halt) => Err(halt),
    }
}

fn xpcall(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let f = interp.arg(0);
    let handler = interp.arg(1);
    let args = interp.args_from(2);
    let line = interp.current_line();
    match interp.protected_call_with_handler(f, args, handler, line) {
        Ok(vals) => {
            interp.push_result(Value::Bool(true));
            let n = vals.len();
            for v in vals {
                interp.push_result(v);
            }
            Ok(1 + n)
        }
        Err(RuntimeError::Recoverable(obj)) => {
            interp.push_result(Value::Bool(false));
            interp.push_result(obj.into_value());
            Ok(2)
        }
        Err(halt) => Err(halt),
    }
}

fn select(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let first = interp.arg(0);
    if let Value::Str(s) = &first {
        if &**s == "#" {
            interp.push_result(Value::Number(interp.arg_count().saturating_sub(1) as f64));
            return Ok(1);
        }
    }
    let n = first.as_number().ok_or_else(|| bad_argument(interp, 1, "select", "number", &first))? as i64;
    let argc = interp.arg_count() as i64;
    let start = if n < 0 { (argc - 1 + n).max(1) } else { n };
    let rest = interp.args_from(start.max(1) as usize);
    let count = rest.len();
    for v in rest {
        interp.push_result(v);
    }
    Ok(count)
}

/// `next(t, key)`: linear scan over [`crate::list::List::next`]'s cursor
/// walk (array, then strings, then general dict), since `List` exposes
/// iteration only through that cursor, not a key-indexed lookup.
fn next_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let list = expect_list(interp, 0, "next")?;
    let key = interp.arg(1);
    let list = list.borrow();

    if matches!(key, Value::Nil) {
        return match list.next(Cursor::Start).1 {
            Some((k, v)) => {
                interp.push_result(k);
                interp.push_result(v);
                Ok(2)
            }
            None => {
                interp.push_result(Value::Nil);
                Ok(1)
            }
        };
    }

    let mut cursor = Cursor::Start;
    loop {
        let (next_cursor, pair) = list.next(cursor);
        match pair {
            None => {
                interp.push_result(Value::Nil);
                return Ok(1);
            }
            Some((k, _)) if k.raw_eq(&key) => {
                return match list.next(next_cursor).1 {
                    Some((k2, v2)) => {
                        interp.push_result(k2);
                        interp.push_result(v2);
                        Ok(2)
                    }
                    None => {
                        interp.push_result(Value::Nil);
                        Ok(1)
                    }
                };
            }
            Some(_) => cursor = next_cursor,
        }
    }
}

fn native_closure(name: &str, func: NativeFn) -> Value {
    Value::Closure(Closure::Native(Rc::new(NativeClosure { name: name.to_string(), func, upvalues: Vec::new() })))
}

fn pairs(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let t = interp.arg(0);
    interp.push_result(native_closure("next", next_fn));
    interp.push_result(t);
    interp.push_result(Value::Nil);
    Ok(3)
}

fn inext(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let list = expect_list(interp, 0, "inext")?;
    let i = interp.arg(1).as_number().unwrap_or(0.0) + 1.0;
    let v = list.borrow().raw_get(&Value::Number(i));
    if matches!(v, Value::Nil) {
        interp.push_result(Value::Nil);
        Ok(1)
    } else {
        interp.push_result(Value::Number(i));
        interp.push_result(v);
        Ok(2)
    }
}

fn ipairs(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let t = interp.arg(0);
    interp.push_result(native_closure("inext", inext));
    interp.push_result(t);
    interp.push_result(Value::Number(0.0));
    Ok(3)
}

fn unpack(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let list = expect_list(interp, 0, "unpack")?;
    let list = list.borrow();
    let i = if interp.arg_count() >= 2 { interp.arg(1).as_number().unwrap_or(1.0) as i64 } else { 1 };
    let j = if interp.arg_count() >= 3 { interp.arg(2).as_number().unwrap_or(0.0) as i64 } else { list.max_n() };
    let mut count = 0;
    for idx in i..=j {
        interp.push_result(list.raw_get(&Value::Number(idx as f64)));
        count += 1;
    }
    Ok(count)
}

/// No-op: the `Rc`/`RefCell` object graph is reclaimed automatically, there
/// is no generational collector to tune or force a cycle of.
fn collectgarbage(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    interp.push_result(Value::Number(0.0));
    Ok(1)
}

fn rawget(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let list = expect_list(interp, 0, "rawget")?;
    let key = interp.arg(1);
    interp.push_result(list.borrow().raw_get(&key));
    Ok(1)
}

fn rawset(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let t = interp.arg(0);
    let list = expect_list(interp, 0, "rawset")?;
    let key = interp.arg(1);
    let value = interp.arg(2);
    list.borrow_mut().raw_set(key, value);
    interp.push_result(t);
    Ok(1)
}

fn rawequal(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    interp.push_result(Value::Bool(interp.arg(0).raw_eq(&interp.arg(1))));
    Ok(1)
}

fn setmetatable(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let t = interp.arg(0);
    let list = expect_list(interp, 0, "setmetatable")?;
    if let Some(cur) = list.borrow().metatable.clone() {
        if !matches!(cur.borrow().raw_get(&Value::string(crate::consts::MM_METATABLE)), Value::Nil) {
            return Err(interp.runtime_error(interp.current_line(), "cannot change a protected metatable"));
        }
    }
    let mt = interp.arg(1);
    let new_mt = match mt {
        Value::Nil => None,
        Value::List(l) => Some(l),
        other => return Err(bad_argument(interp, 2, "setmetatable", "nil or list", &other)),
    };
    list.borrow_mut().metatable = new_mt;
    interp.push_result(t);
    Ok(1)
}

fn getmetatable(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let t = interp.arg(0);
    match interp.metatable_of(&t) {
        Some(mt) => {
            let protected = mt.borrow().raw_get(&Value::string(crate::consts::MM_METATABLE));
            if matches!(protected, Value::Nil) {
                interp.push_result(Value::List(mt));
            } else {
                interp.push_result(protected);
            }
        }
        None => interp.push_result(Value::Nil),
    }
    Ok(1)
}

/// `load(source)`: compiles `source` into a callable closure without
/// running it — `(nil, message)` on a compile error, never raising, the same
/// convention the I/O builtins use for recoverable failures.
fn load(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let src = match interp.arg(0) {
        Value::Str(s) => s,
        other => return Err(bad_argument(interp, 1, "load", "string", &other)),
    };
    match crate::compiler::compile(&src, "=(load)") {
        Ok(proto) => {
            interp.push_result(Value::Closure(Closure::Script(Rc::new(ScriptClosure { proto, upvalues: Vec::new() }))));
            Ok(1)
        }
        Err(e) => {
            interp.push_result(Value::Nil);
            interp.push_result(Value::string(e.to_string()));
            Ok(2)
        }
    }
}

fn loadfile(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let path = match interp.arg(0) {
        Value::Str(s) => s,
        other => return Err(bad_argument(interp, 1, "loadfile", "string", &other)),
    };
    match std::fs::read_to_string(&*path) {
        Ok(src) => match crate::compiler::compile(&src, &path) {
            Ok(proto) => {
                interp.push_result(Value::Closure(Closure::Script(Rc::new(ScriptClosure { proto, upvalues: Vec::new() }))));
                Ok(1)
            }
            Err(e) => {
                interp.push_result(Value::Nil);
                interp.push_result(Value::string(e.to_string()));
                Ok(2)
            }
        },
        Err(e) => {
            interp.push_result(Value::Nil);
            interp.push_result(Value::string(e.to_string()));
            Ok(2)
        }
    }
}

/// `put(...)`: writes every argument's display form to stdout, tab-separated
/// and newline-terminated — a base-library output primitive, distinct from
/// the `i` namespace's I/O functions.
fn put(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let n = interp.arg_count();
    let parts: Vec<String> = (0..n).map(|i| interp.arg(i).display_string()).collect();
    println!("{}", parts.join("\t"));
    Ok(0)
}

fn log_message(interp: &Interpreter) -> String {
    let n = interp.arg_count();
    (0..n).map(|i| interp.arg(i).display_string()).collect::<Vec<_>>().join(" ")
}

fn logd(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    debug!("{}", log_message(interp));
    Ok(0)
}

fn logi(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    info!("{}", log_message(interp));
    Ok(0)
}

fn logw(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    warn!("{}", log_message(interp));
    Ok(0)
}

fn loge(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    error!("{}", log_message(interp));
    Ok(0)
}

/// `quit([code])`/`bye`/`stop`: a halt the embedder's driver is meant to
/// treat as a clean shutdown request rather than a crash, distinguished from
/// other halts by the `"exit:"` message prefix (see `crate::driver`).
fn quit(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let code = interp.arg(0).as_number().unwrap_or(0.0) as i32;
    Err(RuntimeError::Halt(format!("exit:{code}")))
}
