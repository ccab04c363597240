//! VM and compiler limits.
//!
//! Mirrors `fuel-vm`'s `consts.rs` role (a flat file of named tunables) but
//! sized for a register-bytecode scripting VM rather than a fixed-register
//! blockchain interpreter.

/// Registers available per call frame. Bounded by the 8-bit `A` field.
pub const MAX_REGISTERS: usize = 250;

/// Largest constant-pool index reachable through an `Rk` operand.
pub const MAX_CONSTANTS: usize = q_asm::MAXINDEXRK as usize + 1;

/// Largest number of local variables visible in one function body at once.
pub const MAX_LOCALS: usize = MAX_REGISTERS;

/// Largest forward/backward jump distance in instructions.
pub const MAX_JUMP_DISTANCE: i32 = (1 << 17) - 1;

/// How many `MOVE`s the peephole pass will coalesce into a single `MOVEN`.
pub const MOVEN_MAX_RUN: usize = q_asm::BITRK as usize;

/// How many hops the jump-to-jump collapsing pass will follow before giving
/// up.
pub const JUMP_COLLAPSE_BOUND: usize = 5;

/// Array-constructor fields are flushed to `SETLIST` in batches of this size.
pub const FIELDS_PER_FLUSH: usize = 50;

/// Upper bound on an associative list's dense array part; integer keys at or
/// beyond this boundary always live in the general (hash) dict.
pub const MAX_ARRAY_INDEX: i64 = 1 << 26;

/// Depth limit for metamethod chain resolution (`__index`/`__newindex`
/// chains of tables) before giving up and raising.
pub const METATABLE_CHAIN_LIMIT: usize = 100;

/// Default register file capacity for a freshly created coroutine stack,
/// grown on demand.
pub const DEFAULT_STACK_SIZE: usize = 256;

/// `__index` metamethod key.
pub const MM_INDEX: &str = "__index";
/// `__newindex` metamethod key.
pub const MM_NEWINDEX: &str = "__newindex";
/// `__call` metamethod key.
pub const MM_CALL: &str = "__call";
/// `__tostring` metamethod key.
pub const MM_TOSTRING: &str = "__tostring";
/// `__metatable` metamethod key (hides the real metatable from `getmetatable`).
pub const MM_METATABLE: &str = "__metatable";
/// `__eq` metamethod key.
pub const MM_EQ: &str = "__eq";
/// `__lt` metamethod key.
pub const MM_LT: &str = "__lt";
/// `__le` metamethod key.
pub const MM_LE: &str = "__le";
/// `__concat` metamethod key.
pub const MM_CONCAT: &str = "__concat";
/// `__len` metamethod key.
pub const MM_LEN: &str = "__len";
/// `__unm` metamethod key.
pub const MM_UNM: &str = "__unm";

/// Binary-arithmetic metamethod keys, indexed the same way as
/// [`crate::value::ArithOp`].
pub const MM_ARITH: [&str; 6] = ["__add", "__sub", "__mul", "__div", "__mod", "__pow"];
