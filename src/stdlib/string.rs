//! String library, namespaced `s` (`StringLibName = "s"` in `qsinit.go`,
//! left commented out there). Plain substring search and a small `%s`/`%d`/
//! `%f` format subset — full Lua-style pattern matching is out of scope (see
//! DESIGN.md).

use crate::error::RuntimeError;
use crate::value::{NativeFn, Value};
use crate::vm::Interpreter;

use super::util::{bad_argument, expect_number, expect_string};

pub const ENTRIES: &[(&str, NativeFn)] = &[
    ("len", len),
    ("sub", sub),
    ("upper", upper),
    ("lower", lower),
    ("rep", rep),
    ("reverse", reverse),
    ("byte", byte),
    ("char", char_fn),
    ("find", find),
    ("format", format_fn),
    ("trim", trim),
];

fn len(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let s = expect_string(interp, 0, "len")?;
    interp.push_result(Value::Number(s.len() as f64));
    Ok(1)
}

/// Converts a Lua-style (possibly negative, 1-based) index into a 0-based
/// byte offset clamped to `[0, len]`.
fn normalize(i: i64, len: usize) -> usize {
    let len = len as i64;
    let idx = if i < 0 { (len + i + 1).max(1) } else { i.max(1) };
    (idx - 1).clamp(0, len) as usize
}

fn sub(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let s = expect_string(interp, 0, "sub")?;
    let len = s.len();
    let i = if interp.arg_count() >= 2 { expect_number(interp, 1, "sub")? as i64 } else { 1 };
    let j = if interp.arg_count() >= 3 { expect_number(interp, 2, "sub")? as i64 } else { -1 };
    let start = normalize(i, len);
    let end = if j < 0 { (len as i64 + j + 1).max(0) as usize } else { (j as usize).min(len) };
    let slice = if start < end { &s[start..end] } else { "" };
    interp.push_result(Value::string(slice));
    Ok(1)
}

fn upper(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let s = expect_string(interp, 0, "upper")?;
    interp.push_result(Value::string(s.to_uppercase()));
    Ok(1)
}

fn lower(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let s = expect_string(interp, 0, "lower")?;
    interp.push_result(Value::string(s.to_lowercase()));
    Ok(1)
}

fn rep(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let s = expect_string(interp, 0, "rep")?;
    let n = expect_number(interp, 1, "rep")? as usize;
    interp.push_result(Value::string(s.repeat(n)));
    Ok(1)
}

fn reverse(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let s = expect_string(interp, 0, "reverse")?;
    interp.push_result(Value::string(s.chars().rev().collect::<String>()));
    Ok(1)
}

fn byte(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let s = expect_string(interp, 0, "byte")?;
    let i = if interp.arg_count() >= 2 { expect_number(interp, 1, "byte")? as i64 } else { 1 };
    let idx = normalize(i, s.len());
    match s.as_bytes().get(idx) {
        Some(b) => {
            interp.push_result(Value::Number(*b as f64));
            Ok(1)
        }
        None => Ok(0),
    }
}

fn char_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let n = interp.arg_count();
    let mut s = String::with_capacity(n);
    for i in 0..n {
        let code = expect_number(interp, i, "char")? as u32;
        s.push(char::from_u32(code).unwrap_or('\u{fffd}'));
    }
    interp.push_result(Value::string(s));
    Ok(1)
}

/// Plain (non-pattern) substring search, returning the 1-based start/end
/// byte positions or `nil` if not found.
fn find(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let s = expect_string(interp, 0, "find")?;
    let needle = expect_string(interp, 1, "find")?;
    let from = if interp.arg_count() >= 3 { normalize(expect_number(interp, 2, "find")? as i64, s.len()) } else { 0 };
    match s.get(from..).and_then(|rest| rest.find(&*needle)) {
        Some(pos) => {
            let start = from + pos + 1;
            let end = start + needle.len() - 1;
            interp.push_result(Value::Number(start as f64));
            interp.push_result(Value::Number(end as f64));
            Ok(2)
        }
        None => {
            interp.push_result(Value::Nil);
            Ok(1)
        }
    }
}

/// A `%s`/`%d`/`%f`/`%%` subset of `string.format` — enough for the common
/// "`build a message`" case without pulling in a pattern/format-spec engine.
fn format_fn(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let fmt = expect_string(interp, 0, "format")?;
    let mut out = String::with_capacity(fmt.len());
    let mut arg_idx = 1;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                out.push_str(&interp.arg(arg_idx).display_string());
                arg_idx += 1;
            }
            Some('d') => {
                let n = expect_number(interp, arg_idx, "format")?;
                out.push_str(&format!("{}", n as i64));
                arg_idx += 1;
            }
            Some('f') => {
                let n = expect_number(interp, arg_idx, "format")?;
                out.push_str(&format!("{n}"));
                arg_idx += 1;
            }
            Some(other) => return Err(bad_argument(interp, 1, "format", &format!("known format spec, got '%{other}'"), &Value::string(fmt.to_string()))),
            None => break,
        }
    }
    interp.push_result(Value::string(out));
    Ok(1)
}

fn trim(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let s = expect_string(interp, 0, "trim")?;
    interp.push_result(Value::string(s.trim()));
    Ok(1)
}
