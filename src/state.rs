//! The embedder-facing surface: construct a `State`, load and run chunks,
//! register native functions, and poke at
//! globals/metatables from host code. Everything here is a thin wrapper
//! around [`crate::vm::Interpreter`] and [`crate::compiler::compile`] —
//! the interpreter itself has no notion of "the embedder," only of frames
//! and registers.

use std::cell::RefCell;
use std::rc::Rc;

use crate::compiler;
use crate::error::{CompileError, ErrorObject, RuntimeError};
use crate::list::List;
use crate::value::{Closure, NativeClosure, NativeFn, Value};
use crate::vm::Interpreter;

/// Construction-time knobs, analogous to `fuel-vm`'s
/// `InterpreterParams`/`ConsensusParameters` pair: a small struct of tunables
/// passed once at `State::new` and otherwise immutable for the State's life.
#[derive(Debug, Clone)]
pub struct VmOptions {
    /// Hard cap on bytes the interpreter will let itself allocate for
    /// growable values (lists, strings) before raising a fatal halt. `None`
    /// means no cap.
    pub memory_cap: Option<usize>,
    /// Initial size of the shared register file; grows on demand past this,
    /// so it's a preallocation hint rather than a limit.
    pub initial_register_file: usize,
    /// Enables per-instruction `tracing` events. Off by default — even at
    /// `TRACE` level this is a lot of spans for a hot loop.
    pub trace_dispatch: bool,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            memory_cap: None,
            initial_register_file: crate::consts::DEFAULT_STACK_SIZE,
            trace_dispatch: false,
        }
    }
}

/// One embeddable runtime instance: its own globals, register file, and
/// call-frame stack, independent of any other `State` in the same process
/// (coroutines spawned from it share its globals; channels can cross into
/// another `State` running on another OS thread).
pub struct State {
    interp: Interpreter,
}

impl State {
    /// `NewState(opts)`.
    pub fn new(options: VmOptions) -> Self {
        Self { interp: Interpreter::new(options) }
    }

    /// Drops the interpreter's state. Exists for symmetry with the
    /// embedder's `NewState`/`Close` pairing; `Drop` would do the same thing,
    /// but an explicit call documents the intended lifecycle at the call
    /// site.
    pub fn close(self) {}

    pub fn options(&self) -> &VmOptions {
        &self.interp.options
    }

    // -- loading & running --------------------------------------------------

    pub fn load_string(&self, source: &str, chunk_name: &str) -> Result<Value, CompileError> {
        let proto = compiler::compile(source, chunk_name)?;
        Ok(Value::Closure(Closure::Script(Rc::new(crate::value::ScriptClosure { proto, upvalues: Vec::new() }))))
    }

    pub fn load_file(&self, path: &std::path::Path) -> Result<Value, LoadError> {
        let source = std::fs::read_to_string(path).map_err(LoadError::Io)?;
        let chunk_name = path.display().to_string();
        self.load_string(&source, &chunk_name).map_err(LoadError::Compile)
    }

    /// Compiles and runs `source` as a fresh chunk, returning its results.
    pub fn do_string(&mut self, source: &str, chunk_name: &str) -> Result<Vec<Value>, RunError> {
        let closure = self.load_string(source, chunk_name).map_err(RunError::Compile)?;
        self.call(closure, Vec::new()).map_err(RunError::Runtime)
    }

    pub fn do_file(&mut self, path: &std::path::Path) -> Result<Vec<Value>, RunError> {
        let closure = self.load_file(path).map_err(|e| match e {
            LoadError::Compile(c) => RunError::Compile(c),
            LoadError::Io(e) => RunError::Io(e),
        })?;
        self.call(closure, Vec::new()).map_err(RunError::Runtime)
    }

    /// `Call(f, args...)`: invokes any callable value — script closure,
    /// native closure, or anything with `__call` — and runs it to
    /// completion. Not resumable.
    pub fn call(&mut self, f: Value, args: Vec<Value>) -> Result<Vec<Value>, RuntimeError> {
        match f {
            Value::Closure(Closure::Script(sc)) => self.interp.call_script(sc, args),
            other => self.interp.call_value(other, args, 0),
        }
    }

    /// `PCall(f, args...)`: like `call`, but a recoverable error comes back
    /// as `Ok(Err(obj))` instead of propagating — the embedder-level
    /// equivalent of the `pcall` builtin.
    pub fn pcall(&mut self, f: Value, args: Vec<Value>) -> Result<Result<Vec<Value>, ErrorObject>, RuntimeError> {
        match self.interp.protected_call(f, args, 0) {
            Ok(vals) => Ok(Ok(vals)),
            Err(RuntimeError::Recoverable(obj)) => Ok(Err(obj)),
            Err(halt) => Err(halt),
        }
    }

    // -- globals & registration ----------------------------------------------

    pub fn set_global(&mut self, name: &str, v: Value) {
        self.interp.set_global(name, v);
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.interp.get_global(name)
    }

    /// Registers a single native function as a global.
    pub fn register(&mut self, name: &str, func: NativeFn) {
        let closure = Value::Closure(Closure::Native(Rc::new(NativeClosure {
            name: name.to_string(),
            func,
            upvalues: Vec::new(),
        })));
        self.set_global(name, closure);
    }

    /// Registers a whole module as a global list of name → native function,
    /// the shape every `stdlib` sub-module (`math`, `string`, ...) builds
    /// and installs through.
    pub fn register_module(&mut self, name: &str, entries: &[(&str, NativeFn)]) {
        let mut list = List::new();
        for (fname, func) in entries {
            let closure = Value::Closure(Closure::Native(Rc::new(NativeClosure {
                name: fname.to_string(),
                func: *func,
                upvalues: Vec::new(),
            })));
            list.raw_set(Value::string(*fname), closure);
        }
        self.set_global(name, Value::list(list));
    }

    pub fn new_list(&self) -> Value {
        Value::list(List::new())
    }

    pub fn new_userdata(&self, tag: &'static str) -> Value {
        Value::UserData(Rc::new(crate::value::UserData { tag, metatable: RefCell::new(None) }))
    }

    pub fn set_metatable(&self, v: &Value, mt: Option<Rc<RefCell<List>>>) {
        match v {
            Value::List(l) => l.borrow_mut().metatable = mt,
            Value::UserData(u) => *u.metatable.borrow_mut() = mt,
            _ => {}
        }
    }

    pub fn get_metatable(&self, v: &Value) -> Option<Rc<RefCell<List>>> {
        self.interp.metatable_of(v)
    }

    pub(crate) fn interp_mut(&mut self) -> &mut Interpreter {
        &mut self.interp
    }

    pub(crate) fn interp(&self) -> &Interpreter {
        &self.interp
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("{0}")]
    Io(#[source] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("{0}")]
    Io(#[source] std::io::Error),
}
