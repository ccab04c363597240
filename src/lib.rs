//! Q: an embeddable, dynamically typed scripting language.
//!
//! The crate is organized leaves-first, the same order the design follows:
//! [`value`] and [`list`] are the data model; [`proto`] and [`frame`] are the
//! compiled-artifact and call-stack shapes; [`ast`]/[`lexer`]/[`parser`] turn
//! source text into a tree; [`compiler`] lowers that tree to bytecode
//! (encoded by the sibling `q-asm` crate); [`vm`] executes it; [`pcall`],
//! [`coroutine`], and [`channel`] layer the protected-call and concurrency
//! primitives on top; [`tokenizer`] is the standalone argument-string parser;
//! [`state`] and [`driver`] are the embedder- and REPL-facing surfaces.

pub mod ast;
pub mod channel;
pub mod compiler;
pub mod consts;
pub mod coroutine;
pub mod driver;
pub mod error;
pub mod frame;
pub mod lexer;
pub mod list;
pub mod parser;
pub mod pcall;
pub mod proto;
pub mod state;
pub mod stdlib;
pub mod tokenizer;
pub mod value;
pub mod vm;

pub use error::{CompileError, ErrorObject, RuntimeError};
pub use list::List;
pub use state::{State, VmOptions};
pub use value::{Closure, NativeFn, Value};

/// Re-exports the surface an embedder actually needs, so `use q::prelude::*`
/// is the one import most host applications write.
pub mod prelude {
    pub use crate::error::{CompileError, ErrorObject, RuntimeError};
    pub use crate::list::List;
    pub use crate::state::{State, VmOptions};
    pub use crate::value::{Closure, NativeFn, Value};
}
