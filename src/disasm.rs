use serde::Serialize;

use crate::decoder::{DecodeError, Decoded, Decoder, Operand};
use crate::instructions::{by_op, InstrDesc};
use crate::isa::accumulator::{self, AccumulatorDecoder};
use crate::isa::cisc::{self, CiscDecoder};
use crate::isa::risc::{self, RiscDecoder};
use crate::isa::stack::{self, StackDecoder};
use crate::isa::Isa;
use crate::memory::{bits_to_string, BitsRef};

/// One decoded instruction of a program image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Line {
    pub addr: u16,
    pub width: u16,
    pub bits: String,
    pub text: String,
}

/// `unit` scales branch immediates from bytes back to source steps.
fn fmt_operand(op: &Operand, branch: bool, unit: i16) -> String {
    match op {
        Operand::Reg(r) => format!("%{r}"),
        Operand::Imm(v) if branch => format!("${}", *v as i16 / unit),
        Operand::Imm(v) => format!("${v}"),
        Operand::Mem(r) => format!("[%{r}]"),
        Operand::Indexed { base, disp } if branch => format!("%{base}{}", fmt_disp(*disp)),
        Operand::Indexed { base, disp } => format!("[%{base}{}]", fmt_disp(*disp)),
    }
}

fn fmt_disp(disp: i16) -> String {
    if disp < 0 {
        format!("-${}", (disp as i32).unsigned_abs())
    } else {
        format!("+${disp}")
    }
}

/// Canonical source text of a decoded instruction.
pub fn fmt_decoded<O: Copy + PartialEq>(isa: Isa, table: &[InstrDesc<O>], d: &Decoded<O>) -> String {
    let Some(desc) = by_op(table, d.op) else {
        return "???".to_string();
    };
    if d.operands.is_empty() {
        return desc.mnemonic.to_string();
    }
    let unit = isa.displacement_unit() as i16;
    let operands: Vec<String> = d
        .operands
        .iter()
        .map(|o| fmt_operand(o, desc.branch, unit))
        .collect();
    format!("{} {}", desc.mnemonic, operands.join(", "))
}

fn decode_with<D>(
    isa: Isa,
    dec: &D,
    table: &[InstrDesc<D::Op>],
    bits: &BitsRef,
) -> Result<(String, u16), DecodeError>
where
    D: Decoder,
    D::Op: Copy + PartialEq,
{
    let d = dec.decode(bits)?;
    Ok((fmt_decoded(isa, table, &d), d.width))
}

/// Text and width of the instruction at the start of `bits`.
pub fn decode_one(isa: Isa, bits: &BitsRef) -> Result<(String, u16), DecodeError> {
    match isa {
        Isa::Stack => decode_with(isa, &StackDecoder, stack::TABLE, bits),
        Isa::Accumulator => decode_with(isa, &AccumulatorDecoder, accumulator::TABLE, bits),
        Isa::Risc => decode_with(isa, &RiscDecoder, risc::TABLE, bits),
        Isa::Cisc => decode_with(isa, &CiscDecoder, cisc::TABLE, bits),
    }
}

pub fn disassemble(isa: Isa, bits: &BitsRef) -> Result<String, DecodeError> {
    decode_one(isa, bits).map(|(text, _)| text)
}

/// Linear sweep from the start of `bits`. Stops at the first pattern that
/// does not decode, which is usually where inline data begins.
pub fn disassemble_program(isa: Isa, bits: &BitsRef, origin: u16) -> Vec<Line> {
    let mut lines = Vec::new();
    let mut pos = 0usize;
    while pos < bits.len() {
        let Ok((text, width)) = decode_one(isa, &bits[pos..]) else {
            break;
        };
        let end = pos + width as usize * 8;
        lines.push(Line {
            addr: origin.wrapping_add((pos / 8) as u16),
            width,
            bits: bits_to_string(&bits[pos..end]),
            text,
        });
        pos = end;
    }
    lines
}
