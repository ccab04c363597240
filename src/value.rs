//! The dynamically typed [`Value`] union.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::channel::Channel;
use crate::coroutine::Coroutine;
use crate::list::List;
use crate::proto::Prototype;
use crate::vm::Interpreter;
use crate::RuntimeError;

/// A native (host-implemented) function: reads arguments from the current
/// frame via positional accessors on `Interpreter` and returns how many
/// result values it pushed.
pub type NativeFn = fn(&mut Interpreter) -> Result<usize, RuntimeError>;

/// An upvalue: either still pointing into a live register slot (`Open`) or
/// owning its value after the originating frame returned (`Closed`).
#[derive(Debug, Clone)]
pub enum Upvalue {
    /// Points at `frame_registers[index]` of a still-live frame. Shared
    /// across every closure that captured the same local, so writes through
    /// one are visible through all — this is what makes a counter closure's
    /// captured local persist across repeated calls to the returned function.
    Open(Rc<RefCell<Value>>),
    /// Closed permanently once its originating frame returned.
    Closed(Rc<RefCell<Value>>),
}

impl Upvalue {
    pub fn get(&self) -> Value {
        match self {
            Upvalue::Open(cell) | Upvalue::Closed(cell) => cell.borrow().clone(),
        }
    }

    pub fn set(&self, v: Value) {
        match self {
            Upvalue::Open(cell) | Upvalue::Closed(cell) => *cell.borrow_mut() = v,
        }
    }

    pub fn cell(&self) -> Rc<RefCell<Value>> {
        match self {
            Upvalue::Open(cell) | Upvalue::Closed(cell) => cell.clone(),
        }
    }
}

/// A script closure: an immutable [`Prototype`] bound to captured upvalues
/// and the global environment it resolves free globals against.
#[derive(Debug)]
pub struct ScriptClosure {
    pub proto: Rc<Prototype>,
    pub upvalues: Vec<Upvalue>,
}

/// A native closure: a function pointer plus any upvalues a module
/// constructor chose to capture (e.g. a channel handle for a method-style
/// builtin).
pub struct NativeClosure {
    pub name: String,
    pub func: NativeFn,
    pub upvalues: Vec<Value>,
}

impl fmt::Debug for NativeClosure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClosure").field("name", &self.name).finish()
    }
}

/// Either flavor of callable value.
#[derive(Debug, Clone)]
pub enum Closure {
    Script(Rc<ScriptClosure>),
    Native(Rc<NativeClosure>),
}

impl Closure {
    pub fn name(&self) -> String {
        match self {
            Closure::Script(c) => c.proto.source_name.clone(),
            Closure::Native(c) => c.name.clone(),
        }
    }
}

/// Opaque host-provided data with an optional associated metatable.
#[derive(Debug)]
pub struct UserData {
    pub tag: &'static str,
    pub metatable: RefCell<Option<Rc<RefCell<List>>>>,
}

/// The dynamically typed value union.
///
/// Nil and bool are unboxed; numbers are IEEE-754 doubles; strings are
/// immutable and reference-counted (compared by content); lists, closures,
/// userdata, threads, and channels are shared by reference and compared by
/// identity — "two distinct lists/closures are never equal even when
/// structurally identical."
#[derive(Clone)]
pub enum Value {
    Nil,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    List(Rc<RefCell<List>>),
    Closure(Closure),
    UserData(Rc<UserData>),
    Thread(Rc<Coroutine>),
    Channel(Rc<Channel>),
}

impl Value {
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn list(list: List) -> Self {
        Value::List(Rc::new(RefCell::new(list)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Closure(_) => "function",
            Value::UserData(_) => "userdata",
            Value::Thread(_) => "thread",
            Value::Channel(_) => "channel",
        }
    }

    /// Truthiness: everything but `nil` and `false` is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&Rc<RefCell<List>>> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&Closure> {
        match self {
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    /// The canonical decimal form used by `tostring` and by `CONCAT`'s
    /// implicit number coercion.
    pub fn display_string(&self) -> String {
        match self {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::Str(s) => s.to_string(),
            Value::List(l) => format!("list: {:p}", Rc::as_ptr(l)),
            Value::Closure(Closure::Script(c)) => format!("function: {:p}", Rc::as_ptr(c)),
            Value::Closure(Closure::Native(c)) => format!("function: builtin:{}", c.name),
            Value::UserData(u) => format!("userdata: {:p}", Rc::as_ptr(u)),
            Value::Thread(t) => format!("thread: {:p}", Rc::as_ptr(t)),
            Value::Channel(c) => format!("channel: {:p}", Rc::as_ptr(c)),
        }
    }

    /// Raw identity/value equality, bypassing any `__eq` metamethod — used
    /// by `Next`/table-key comparisons and the VM's raw-equality fast path.
    pub fn raw_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(Closure::Script(a)), Value::Closure(Closure::Script(b))) => Rc::ptr_eq(a, b),
            (Value::Closure(Closure::Native(a)), Value::Closure(Closure::Native(b))) => Rc::ptr_eq(a, b),
            (Value::UserData(a), Value::UserData(b)) => Rc::ptr_eq(a, b),
            (Value::Thread(a), Value::Thread(b)) => Rc::ptr_eq(a, b),
            (Value::Channel(a), Value::Channel(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// A key usable in the general (hash) dict: integers and non-numeric
    /// keys hash/compare by value, everything reference-shared compares by
    /// pointer. Returns `None` for `nil` and `NaN`, which can never be keys.
    pub fn as_table_key(&self) -> Option<TableKey> {
        match self {
            Value::Nil => None,
            Value::Bool(b) => Some(TableKey::Bool(*b)),
            Value::Number(n) if n.is_nan() => None,
            Value::Number(n) => Some(TableKey::Number(n.to_bits())),
            Value::Str(s) => Some(TableKey::Str(s.clone())),
            Value::List(l) => Some(TableKey::Ptr(Rc::as_ptr(l) as usize)),
            Value::Closure(Closure::Script(c)) => Some(TableKey::Ptr(Rc::as_ptr(c) as usize)),
            Value::Closure(Closure::Native(c)) => Some(TableKey::Ptr(Rc::as_ptr(c) as usize)),
            Value::UserData(u) => Some(TableKey::Ptr(Rc::as_ptr(u) as usize)),
            Value::Thread(t) => Some(TableKey::Ptr(Rc::as_ptr(t) as usize)),
            Value::Channel(c) => Some(TableKey::Ptr(Rc::as_ptr(c) as usize)),
        }
    }
}

/// Hashable/comparable projection of a [`Value`] suitable as a `HashMap` key
/// for the associative list's general dict.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum TableKey {
    Bool(bool),
    Number(u64),
    Str(Rc<str>),
    Ptr(usize),
}

/// Formats a double the way the runtime's `tostring` does: integral values
/// print without a trailing `.0`, matching `qslibstr.go`'s number
/// formatting in the original source.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "nan".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "inf".to_string()
        } else {
            "-inf".to_string()
        }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.type_name(), self.display_string())
    }
}
