//! Instruction encoding for the Q bytecode virtual machine.
//!
//! This crate is the `fuel-asm`-equivalent layer beneath the compiler and VM:
//! it owns the opcode set and the 32-bit instruction packing/unpacking, and
//! nothing else. The compiler emits [`Instruction`] values; the VM decodes
//! and dispatches them.

pub mod instruction;
pub mod opcode;

pub use instruction::{
    is_k,
    k_index,
    reg_index,
    rk_from_const,
    Instruction,
    BITRK,
    MAXINDEXRK,
    MAXSTACK,
};
pub use opcode::{
    Layout,
    Opcode,
};
