//! Per-ISA opcode tables, decoders and encoders. The assembler and the
//! execution engine both go through these, so they always agree on layout.

pub mod accumulator;
pub mod cisc;
pub mod risc;
pub mod stack;

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::decoder::{DecodeError, Decoded, EncodeError, Operand};
use crate::instructions::{by_code, by_op, InstrDesc, OperandKinds};
use crate::memory::{bits_to_string, Bits, BitsRef};
use crate::registers::Reg;
use crate::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Isa {
    Stack,
    Accumulator,
    #[default]
    Risc,
    Cisc,
}

impl Isa {
    /// Scale of branch displacements in bytes.
    pub fn displacement_unit(self) -> u16 {
        match self {
            Isa::Risc => 2,
            _ => 1,
        }
    }

    /// Longest encoding in bytes.
    pub fn max_width(self) -> u16 {
        match self {
            Isa::Stack | Isa::Accumulator => 3,
            Isa::Risc => 2,
            Isa::Cisc => 6,
        }
    }

    /// Encoded width in bytes of an instruction with the given operands.
    /// Widths never depend on operand values, so the assembler can size
    /// statements before labels are known.
    pub fn instruction_width(self, kinds: &[OperandKinds]) -> u16 {
        match self {
            Isa::Stack | Isa::Accumulator => {
                if kinds.is_empty() {
                    1
                } else {
                    3
                }
            }
            Isa::Risc => 2,
            Isa::Cisc => cisc::width(kinds),
        }
    }

    pub fn mnemonics(self) -> Vec<&'static str> {
        match self {
            Isa::Stack => stack::TABLE.iter().map(|d| d.mnemonic).collect(),
            Isa::Accumulator => accumulator::TABLE.iter().map(|d| d.mnemonic).collect(),
            Isa::Risc => risc::TABLE.iter().map(|d| d.mnemonic).collect(),
            Isa::Cisc => cisc::TABLE.iter().map(|d| d.mnemonic).collect(),
        }
    }
}

impl FromStr for Isa {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stack" => Ok(Isa::Stack),
            "accumulator" => Ok(Isa::Accumulator),
            "risc" => Ok(Isa::Risc),
            "cisc" => Ok(Isa::Cisc),
            _ => Err(ConfigError::UnknownIsa(s.to_string())),
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Isa::Stack => "stack",
            Isa::Accumulator => "accumulator",
            Isa::Risc => "risc",
            Isa::Cisc => "cisc",
        })
    }
}

pub(crate) fn push_bits(out: &mut Bits, value: u32, width: usize) {
    for i in (0..width).rev() {
        out.push((value >> i) & 1 == 1);
    }
}

pub(crate) fn invalid(bits: &BitsRef) -> DecodeError {
    DecodeError::InvalidOpcode {
        bits: bits_to_string(bits),
    }
}

pub(crate) fn need(window: &BitsRef, bits: usize) -> Result<(), DecodeError> {
    if window.len() < bits {
        return Err(DecodeError::Truncated {
            needed: bits,
            available: window.len(),
        });
    }
    Ok(())
}

/// Raw pattern to a field of `bits` width holding a two's-complement value.
pub(crate) fn signed_field(raw: u16, bits: u32) -> Result<u32, EncodeError> {
    let value = raw as i16 as i64;
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    if value < min || value > max {
        return Err(EncodeError::OutOfRange { value, bits, min, max });
    }
    Ok((value as u32) & ((1u32 << bits) - 1))
}

pub(crate) fn unsigned_field(raw: u16, bits: u32) -> Result<u32, EncodeError> {
    let max = (1i64 << bits) - 1;
    if raw as i64 > max {
        return Err(EncodeError::OutOfRange {
            value: raw as i64,
            bits,
            min: 0,
            max,
        });
    }
    Ok(raw as u32)
}

/// An 8-bit field that takes either a signed or an unsigned byte.
pub(crate) fn byte_field(raw: u16) -> Result<u32, EncodeError> {
    if raw <= 0xFF || (-128..0).contains(&(raw as i16)) {
        return Ok(raw as u32 & 0xFF);
    }
    Err(EncodeError::OutOfRange {
        value: raw as i16 as i64,
        bits: 8,
        min: -128,
        max: 255,
    })
}

pub(crate) fn sign_extend(v: u32, bits: u32) -> u16 {
    let s = 32 - bits;
    (((v << s) as i32) >> s) as u16
}

// Stack and accumulator machines share one layout: a `code:6 | form:2`
// byte optionally followed by a 16-bit field.
const FORM_IMPLICIT: u8 = 0;
const FORM_IMMEDIATE: u8 = 1;
const FORM_INDEXED: u8 = 2;

pub(crate) fn decode_bytecoded<O: Copy>(
    table: &'static [InstrDesc<O>],
    window: &BitsRef,
    index_base: Reg,
) -> Result<Decoded<O>, DecodeError> {
    need(window, 8)?;
    let first = window[..8].load_be::<u8>();
    let (code, form) = (first >> 2, first & 0b11);
    let desc = by_code(table, code).ok_or_else(|| invalid(&window[..8]))?;
    let (operands, width) = match form {
        FORM_IMPLICIT => (Vec::new(), 1u16),
        FORM_IMMEDIATE | FORM_INDEXED => {
            need(window, 24)?;
            let field = window[8..24].load_be::<u16>();
            let operand = if form == FORM_IMMEDIATE {
                Operand::Imm(field)
            } else {
                Operand::Indexed {
                    base: index_base,
                    disp: field as i16,
                }
            };
            (vec![operand], 3)
        }
        _ => return Err(invalid(&window[..8])),
    };
    let kinds: Vec<OperandKinds> = operands.iter().map(Operand::kind).collect();
    if !desc.accepts(&kinds) {
        return Err(invalid(&window[..width as usize * 8]));
    }
    Ok(Decoded {
        op: desc.op,
        operands,
        width,
    })
}

pub(crate) fn encode_bytecoded<O: Copy + PartialEq>(
    table: &'static [InstrDesc<O>],
    d: &Decoded<O>,
    index_base: Reg,
) -> Result<Bits, EncodeError> {
    let desc = by_op(table, d.op).ok_or(EncodeError::Shape { index: 0 })?;
    let kinds: Vec<OperandKinds> = d.operands.iter().map(Operand::kind).collect();
    if !desc.accepts(&kinds) {
        return Err(EncodeError::Shape { index: 0 });
    }
    let (form, field) = match d.operands.as_slice() {
        [] => (FORM_IMPLICIT, None),
        [Operand::Imm(v)] => (FORM_IMMEDIATE, Some(*v)),
        [Operand::Indexed { base, disp }] if *base == index_base => (FORM_INDEXED, Some(*disp as u16)),
        [Operand::Indexed { base, .. }] => return Err(EncodeError::Register(*base)),
        _ => return Err(EncodeError::Shape { index: 0 }),
    };
    let mut out = Bits::new();
    push_bits(&mut out, ((desc.code << 2) | form) as u32, 8);
    if let Some(v) = field {
        push_bits(&mut out, v as u32, 16);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isa_names_parse() {
        for isa in [Isa::Stack, Isa::Accumulator, Isa::Risc, Isa::Cisc] {
            assert_eq!(isa.to_string().parse::<Isa>().unwrap(), isa);
        }
        assert!("mips".parse::<Isa>().is_err());
    }

    #[test]
    fn field_range_checks() {
        assert_eq!(signed_field((-3i16) as u16, 8), Ok(0xFD));
        assert!(signed_field(128, 8).is_err());
        assert_eq!(byte_field(0xFFFF), Ok(0xFF));
        assert_eq!(byte_field(200), Ok(200));
        assert!(byte_field(256).is_err());
        assert!(unsigned_field(256, 8).is_err());
        assert_eq!(sign_extend(0x3FF, 10), 0xFFFF);
        assert_eq!(sign_extend(0x1FF, 10), 0x01FF);
    }
}
