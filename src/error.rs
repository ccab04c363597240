//! Compile-time and runtime error types.
//!
//! Follows `fuel-vm`'s split almost exactly: a [`RuntimeError`] distinguishes
//! a *recoverable* script-level error (something `error()`/a failed
//! operation raised, which unwinds to the nearest protected frame) from a
//! *halting* one the embedder cannot resume from (out of memory under the
//! configured cap, a debug assertion). Compile errors are a separate enum,
//! never seen by running script code.

use std::fmt;

use thiserror::Error;

use crate::value::Value;

/// A compiler-time failure, carrying the source location as a
/// `{source, line, message}` triple.
#[derive(Debug, Error, Clone)]
#[error("{source_name}:{line}: {message}")]
pub struct CompileError {
    /// Name of the chunk being compiled (file name or `"=stdin"`).
    pub source_name: String,
    /// 1-based source line the error was detected at.
    pub line: u32,
    /// Human-readable description.
    pub message: String,
    /// True when the error means "this statement is not yet complete" —
    /// the signal the [`crate::driver`] incremental REPL loop watches for
    /// before deciding to read another line versus reporting a real error.
    pub incomplete: bool,
}

impl CompileError {
    pub(crate) fn new(source_name: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            line,
            message: message.into(),
            incomplete: false,
        }
    }

    pub(crate) fn incomplete(source_name: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            line,
            message: message.into(),
            incomplete: true,
        }
    }
}

/// A value raised by `error(obj, level)` or synthesized by the VM itself
/// for a builtin argument-type mismatch, division panic path, etc.
///
/// Kept distinct from a bare [`Value`] so `RuntimeError` can carry structured
/// `{source, line, message}` objects without every caller
/// having to build a list by hand.
#[derive(Debug, Clone)]
pub enum ErrorObject {
    /// An arbitrary script value thrown via `error(v)`.
    Value(Value),
    /// A structured VM-raised error: source name, line, message.
    Structured { source: String, line: u32, message: String },
}

impl ErrorObject {
    /// The string form scripts see when they don't introspect the error
    /// object.
    pub fn to_display_string(&self) -> String {
        match self {
            ErrorObject::Value(v) => v.display_string(),
            ErrorObject::Structured { source, line, message } => {
                format!("{source}:{line}: {message}")
            }
        }
    }

    /// Convert into the [`Value`] a script-level `pcall` sees as its second
    /// return value.
    pub fn into_value(self) -> Value {
        match self {
            ErrorObject::Value(v) => v,
            ErrorObject::Structured { .. } => Value::string(self.to_display_string()),
        }
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// Runtime error description: either specified-and-recoverable (unwinds to
/// a protected call boundary) or a halt the embedder must treat as fatal.
#[derive(Debug, Error, Clone)]
pub enum RuntimeError {
    /// A script-level or VM-detected error with a well-formed fallback:
    /// `pcall` catches this.
    #[error("{0}")]
    Recoverable(ErrorObject),
    /// The interpreter cannot continue: memory cap exceeded, register/stack
    /// overflow past any sane program, internal invariant violated.
    #[error("fatal: {0}")]
    Halt(String),
}

impl RuntimeError {
    /// Build a recoverable error carrying a plain string message, stamped
    /// with the given source location — the common case for builtin
    /// argument checks.
    pub fn raised(source: impl Into<String>, line: u32, message: impl Into<String>) -> Self {
        Self::Recoverable(ErrorObject::Structured {
            source: source.into(),
            line,
            message: message.into(),
        })
    }

    /// Build a recoverable error from an arbitrary script value, as thrown
    /// by `error(v)`.
    pub fn thrown(value: Value) -> Self {
        Self::Recoverable(ErrorObject::Value(value))
    }

    /// The standardized "bad argument #N to 'f' (T expected, got U)" message.
    pub fn bad_argument(source: &str, line: u32, index: usize, fname: &str, expected: &str, got: &str) -> Self {
        Self::raised(
            source,
            line,
            format!("bad argument #{index} to '{fname}' ({expected} expected, got {got})"),
        )
    }

    /// True if `pcall` should catch this rather than let it propagate past
    /// the host boundary.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Recoverable(_))
    }
}
