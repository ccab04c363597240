//! Math library, namespaced `m` — `MathLibName = "m"` in `qsinit.go` (left
//! commented out there; wired up here as a real module table).

use rand::Rng;

use crate::error::RuntimeError;
use crate::value::{NativeFn, Value};
use crate::vm::Interpreter;

use super::util::expect_number;

pub const ENTRIES: &[(&str, NativeFn)] = &[
    ("abs", abs),
    ("ceil", ceil),
    ("floor", floor),
    ("sqrt", sqrt),
    ("sin", sin),
    ("cos", cos),
    ("tan", tan),
    ("asin", asin),
    ("acos", acos),
    ("atan", atan),
    ("exp", exp),
    ("log", log),
    ("min", min),
    ("max", max),
    ("pow", pow),
    ("fmod", fmod),
    ("random", random),
    ("randomseed", randomseed),
    ("pi", pi),
    ("huge", huge),
];

fn unary(interp: &mut Interpreter, fname: &str, f: impl Fn(f64) -> f64) -> Result<usize, RuntimeError> {
    let x = expect_number(interp, 0, fname)?;
    interp.push_result(Value::Number(f(x)));
    Ok(1)
}

fn abs(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "abs", f64::abs)
}
fn ceil(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "ceil", f64::ceil)
}
fn floor(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "floor", f64::floor)
}
fn sqrt(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "sqrt", f64::sqrt)
}
fn sin(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "sin", f64::sin)
}
fn cos(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "cos", f64::cos)
}
fn tan(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "tan", f64::tan)
}
fn asin(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "asin", f64::asin)
}
fn acos(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "acos", f64::acos)
}
fn atan(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "atan", f64::atan)
}
fn exp(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    unary(interp, "exp", f64::exp)
}

fn log(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let x = expect_number(interp, 0, "log")?;
    let result = if interp.arg_count() >= 2 {
        let base = expect_number(interp, 1, "log")?;
        x.log(base)
    } else {
        x.ln()
    };
    interp.push_result(Value::Number(result));
    Ok(1)
}

fn min(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let n = interp.arg_count();
    let mut best = expect_number(interp, 0, "min")?;
    for i in 1..n {
        best = best.min(expect_number(interp, i, "min")?);
    }
    interp.push_result(Value::Number(best));
    Ok(1)
}

fn max(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let n = interp.arg_count();
    let mut best = expect_number(interp, 0, "max")?;
    for i in 1..n {
        best = best.max(expect_number(interp, i, "max")?);
    }
    interp.push_result(Value::Number(best));
    Ok(1)
}

fn pow(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let x = expect_number(interp, 0, "pow")?;
    let y = expect_number(interp, 1, "pow")?;
    interp.push_result(Value::Number(x.powf(y)));
    Ok(1)
}

/// Shares `crate::compiler::fold::float_mod` with the `MOD` opcode so `math.fmod` agrees
/// with `%` bit-for-bit.
fn fmod(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let x = expect_number(interp, 0, "fmod")?;
    let y = expect_number(interp, 1, "fmod")?;
    interp.push_result(Value::Number(crate::compiler::fold::float_mod(x, y)));
    Ok(1)
}

/// `random()` → `[0,1)`; `random(m)` → integer in `[1,m]`; `random(lo,hi)` →
/// integer in `[lo,hi]`, matching the `math.random` shape `qslibmath.go`
/// describes (`rand` is sourced from `fuel-vm`'s own optional `random`
/// feature, `fuel-vm/Cargo.toml`).
fn random(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    let mut rng = rand::thread_rng();
    let result = match interp.arg_count() {
        0 => rng.gen::<f64>(),
        1 => {
            let m = expect_number(interp, 0, "random")? as i64;
            rng.gen_range(1..=m.max(1)) as f64
        }
        _ => {
            let lo = expect_number(interp, 0, "random")? as i64;
            let hi = expect_number(interp, 1, "random")? as i64;
            rng.gen_range(lo..=hi.max(lo)) as f64
        }
    };
    interp.push_result(Value::Number(result));
    Ok(1)
}

/// No-op: `rand::thread_rng` seeds itself from the OS on first use, so
/// there's no seed state here to overwrite.
fn randomseed(_interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    Ok(0)
}

fn pi(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    interp.push_result(Value::Number(std::f64::consts::PI));
    Ok(1)
}

fn huge(interp: &mut Interpreter) -> Result<usize, RuntimeError> {
    interp.push_result(Value::Number(f64::INFINITY));
    Ok(1)
}
