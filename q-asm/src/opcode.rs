//! The Q bytecode opcode set.
//!
//! Three instruction layouts share a 6-bit opcode: `ABC` (8-bit `A`, two
//! 9-bit `B`/`C` fields, each possibly an [`Rk`](crate::instruction::is_k)
//! operand), `ABx` (8-bit `A`, 18-bit unsigned `Bx`), and `AsBx` (8-bit `A`,
//! 18-bit signed `sBx`, biased). [`Opcode::layout`] reports which one a given
//! opcode uses; the VM dispatch loop and the compiler's emitter both consult
//! it instead of hardcoding per-opcode knowledge twice.

/// Which of the three 32-bit layouts an opcode is encoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// `A`, `B`, `C` — registers or Rk-tagged constants.
    Abc,
    /// `A`, unsigned 18-bit `Bx` — constant or prototype index.
    ABx,
    /// `A`, signed 18-bit `sBx` — relative program-counter offset.
    AsBx,
}

macro_rules! opcodes {
    ($($name:ident = $value:expr, $layout:ident;)*) => {
        /// A single opcode in the Q instruction set. Discriminants are stable
        /// and match the `op` field packed into an encoded [`Instruction`](crate::instruction::Instruction).
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[repr(u8)]
        pub enum Opcode {
            $($name = $value,)*
        }

        impl Opcode {
            /// Recover an opcode from its packed byte. Panics on an
            /// unassigned value — decoding untrusted bytecode is not a
            /// supported use case for this embeddable VM.
            pub const fn from_u8(b: u8) -> Self {
                match b {
                    $($value => Self::$name,)*
                    _ => panic!("unassigned opcode byte"),
                }
            }

            /// The layout used to encode/decode this opcode's operands.
            pub const fn layout(self) -> Layout {
                match self {
                    $(Self::$name => Layout::$layout,)*
                }
            }
        }
    };
}

opcodes! {
    MOVE        = 0,  Abc;
    MOVEN       = 1,  Abc;
    LOADK       = 2,  ABx;
    LOADBOOL    = 3,  Abc;
    LOADNIL     = 4,  Abc;
    GETUPVAL    = 5,  Abc;
    SETUPVAL    = 6,  Abc;
    GETGLOBAL   = 7,  ABx;
    SETGLOBAL   = 8,  ABx;
    GETTABLE    = 9,  Abc;
    GETTABLEKS  = 10, Abc;
    SETTABLE    = 11, Abc;
    SETTABLEKS  = 12, Abc;
    NEWTABLE    = 13, Abc;
    SELFOP      = 14, Abc;
    ADD         = 15, Abc;
    SUB         = 16, Abc;
    MUL         = 17, Abc;
    DIV         = 18, Abc;
    MOD         = 19, Abc;
    POW         = 20, Abc;
    UNM         = 21, Abc;
    NOT         = 22, Abc;
    LEN         = 23, Abc;
    CONCAT      = 24, Abc;
    JMP         = 25, AsBx;
    EQ          = 26, Abc;
    LT          = 27, Abc;
    LE          = 28, Abc;
    TEST        = 29, Abc;
    TESTSET     = 30, Abc;
    CALL        = 31, Abc;
    TAILCALL    = 32, Abc;
    RETURN      = 33, Abc;
    FORPREP     = 34, AsBx;
    FORLOOP     = 35, AsBx;
    TFORLOOP    = 36, Abc;
    SETLIST     = 37, Abc;
    CLOSE       = 38, Abc;
    CLOSURE     = 39, ABx;
    VARARG      = 40, Abc;
    NOP         = 41, Abc;
}

impl Opcode {
    /// All opcodes, in discriminant order. Used by encoder round-trip tests.
    pub const ALL: &'static [Opcode] = &[
        Opcode::MOVE,
        Opcode::MOVEN,
        Opcode::LOADK,
        Opcode::LOADBOOL,
        Opcode::LOADNIL,
        Opcode::GETUPVAL,
        Opcode::SETUPVAL,
        Opcode::GETGLOBAL,
        Opcode::SETGLOBAL,
        Opcode::GETTABLE,
        Opcode::GETTABLEKS,
        Opcode::SETTABLE,
        Opcode::SETTABLEKS,
        Opcode::NEWTABLE,
        Opcode::SELFOP,
        Opcode::ADD,
        Opcode::SUB,
        Opcode::MUL,
        Opcode::DIV,
        Opcode::MOD,
        Opcode::POW,
        Opcode::UNM,
        Opcode::NOT,
        Opcode::LEN,
        Opcode::CONCAT,
        Opcode::JMP,
        Opcode::EQ,
        Opcode::LT,
        Opcode::LE,
        Opcode::TEST,
        Opcode::TESTSET,
        Opcode::CALL,
        Opcode::TAILCALL,
        Opcode::RETURN,
        Opcode::FORPREP,
        Opcode::FORLOOP,
        Opcode::TFORLOOP,
        Opcode::SETLIST,
        Opcode::CLOSE,
        Opcode::CLOSURE,
        Opcode::VARARG,
        Opcode::NOP,
    ];
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_u8() {
        for op in Opcode::ALL {
            assert_eq!(Opcode::from_u8(*op as u8), *op);
        }
    }
}
