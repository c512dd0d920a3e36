use serde::Serialize;

use crate::instructions::OperandKinds;
use crate::memory::BitsRef;
use crate::registers::Reg;

/// A decoded operand. Immediates keep their raw 16-bit pattern; the
/// instruction using them decides between signed and unsigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operand {
    Reg(Reg),
    Imm(u16),
    /// `[base]`
    Mem(Reg),
    /// `[base + disp]`
    Indexed { base: Reg, disp: i16 },
}

impl Operand {
    pub fn kind(&self) -> OperandKinds {
        match self {
            Operand::Reg(_) => OperandKinds::REG,
            Operand::Imm(_) => OperandKinds::IMM,
            Operand::Mem(_) => OperandKinds::MEM,
            Operand::Indexed { .. } => OperandKinds::INDEXED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decoded<O> {
    pub op: O,
    pub operands: Vec<Operand>,
    /// Encoded width in bytes.
    pub width: u16,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid instruction bits {bits}")]
    InvalidOpcode { bits: String },
    #[error("instruction needs {needed} bits, only {available} available")]
    Truncated { needed: usize, available: usize },
}

pub trait Decoder {
    type Op;

    /// Decode the instruction at the start of `window`. The window may be
    /// longer than the instruction; it is shorter only at the end of memory.
    fn decode(&self, window: &BitsRef) -> Result<Decoded<Self::Op>, DecodeError>;
}

/// Error raised while turning an instruction back into bits.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("value {value} does not fit in {bits}-bit field (allowed {min}..={max})")]
    OutOfRange { value: i64, bits: u32, min: i64, max: i64 },
    #[error("operand {index} has an unsupported kind")]
    Shape { index: usize },
    #[error("register {0} cannot be encoded here")]
    Register(Reg),
    #[error("displacement {value} is not a multiple of {unit}")]
    Misaligned { value: i64, unit: u16 },
}
