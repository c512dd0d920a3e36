//! Variable-length two-address register/memory machine.
//!
//! Word 0 is `op:6 | dmode:2 dreg:3 | smode:2 sreg:3`. Immediates and
//! displacements follow as extension words, first operand's first.

use bitvec::prelude::*;
use serde::Serialize;

use crate::decoder::{DecodeError, Decoded, Decoder, EncodeError, Operand};
use crate::instructions::{by_code, by_op, InstrDesc, OperandKinds, Shape};
use crate::memory::{Bits, BitsRef};
use crate::registers::Reg;

use super::{invalid, need, push_bits};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Op {
    Nop,
    Mov,
    Push,
    Pop,
    PushF,
    PopF,
    Enter,
    Leave,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Not,
    Inc,
    Dec,
    Lsh,
    Rsh,
    Cmp,
    Test,
    Jmp,
    Je,
    Jne,
    Jg,
    Jge,
    Jl,
    Jle,
    Call,
    Ret,
    In,
    Out,
    Load4,
    Store4,
    Add4,
    Sub4,
    Mul4,
    Div4,
    Out4,
    In4,
}

const I: OperandKinds = OperandKinds::IMM;
const RM: OperandKinds = OperandKinds::RM;
const ANY: OperandKinds = OperandKinds::ANY;
const MEMORY: OperandKinds = OperandKinds::MEMORY;
const TARGET: OperandKinds = OperandKinds::TARGET;

const NONE: &[Shape] = &[&[]];
const DST_SRC: &[Shape] = &[&[RM, ANY]];
const UNARY: &[Shape] = &[&[RM]];
const JUMP: &[Shape] = &[&[TARGET]];

const fn d(op: Op, mnemonic: &'static str, code: u8, shapes: &'static [Shape]) -> InstrDesc<Op> {
    InstrDesc { op, mnemonic, code, shapes, branch: false }
}

const fn br(op: Op, mnemonic: &'static str, code: u8) -> InstrDesc<Op> {
    InstrDesc { op, mnemonic, code, shapes: JUMP, branch: true }
}

pub const TABLE: &[InstrDesc<Op>] = &[
    d(Op::Nop, "nop", 0, NONE),
    d(Op::Mov, "mov", 1, DST_SRC),
    d(Op::Push, "push", 2, &[&[ANY]]),
    d(Op::Pop, "pop", 3, UNARY),
    d(Op::PushF, "pushf", 4, NONE),
    d(Op::PopF, "popf", 5, NONE),
    d(Op::Enter, "enter", 6, &[&[I]]),
    d(Op::Leave, "leave", 7, NONE),
    d(Op::Add, "add", 8, DST_SRC),
    d(Op::Sub, "sub", 9, DST_SRC),
    d(Op::Mul, "mul", 10, DST_SRC),
    d(Op::Div, "div", 11, DST_SRC),
    d(Op::And, "and", 12, DST_SRC),
    d(Op::Or, "or", 13, DST_SRC),
    d(Op::Xor, "xor", 14, DST_SRC),
    d(Op::Not, "not", 15, UNARY),
    d(Op::Inc, "inc", 16, UNARY),
    d(Op::Dec, "dec", 17, UNARY),
    d(Op::Lsh, "lsh", 18, DST_SRC),
    d(Op::Rsh, "rsh", 19, DST_SRC),
    d(Op::Cmp, "cmp", 20, &[&[ANY, ANY]]),
    d(Op::Test, "test", 21, &[&[ANY, ANY]]),
    br(Op::Jmp, "jmp", 22),
    br(Op::Je, "je", 23),
    br(Op::Jne, "jne", 24),
    br(Op::Jg, "jg", 25),
    br(Op::Jge, "jge", 26),
    br(Op::Jl, "jl", 27),
    br(Op::Jle, "jle", 28),
    br(Op::Call, "call", 29),
    d(Op::Ret, "ret", 30, NONE),
    d(Op::In, "in", 31, &[&[RM, I]]),
    d(Op::Out, "out", 32, &[&[I, ANY]]),
    d(Op::Load4, "load4", 33, &[&[MEMORY]]),
    d(Op::Store4, "store4", 34, &[&[MEMORY]]),
    d(Op::Add4, "add4", 35, &[&[RM, RM]]),
    d(Op::Sub4, "sub4", 36, &[&[RM, RM]]),
    d(Op::Mul4, "mul4", 37, &[&[RM, RM]]),
    d(Op::Div4, "div4", 38, &[&[RM, RM]]),
    d(Op::Out4, "out4", 39, &[&[I, RM]]),
    d(Op::In4, "in4", 40, &[&[RM, I]]),
];

const MODE_REG: u16 = 0;
const MODE_IMM: u16 = 1;
const MODE_MEM: u16 = 2;
const MODE_INDEXED: u16 = 3;

fn has_extension(kind: OperandKinds) -> bool {
    kind.intersects(OperandKinds::IMM | OperandKinds::INDEXED)
}

/// Encoded width in bytes for the given operand kinds.
pub fn width(kinds: &[OperandKinds]) -> u16 {
    2 + 2 * kinds.iter().filter(|k| has_extension(**k)).count() as u16
}

pub struct CiscDecoder;

impl Decoder for CiscDecoder {
    type Op = Op;

    fn decode(&self, window: &BitsRef) -> Result<Decoded<Op>, DecodeError> {
        need(window, 16)?;
        let w = window[..16].load_be::<u16>();
        let desc = by_code(TABLE, (w >> 10) as u8).ok_or_else(|| invalid(&window[..16]))?;
        let arity = desc.shapes[0].len();
        let slots = [(w >> 5) & 0x1F, w & 0x1F];

        let mut operands = Vec::with_capacity(arity);
        let mut next = 16;
        for (i, slot) in slots.iter().enumerate() {
            if i >= arity {
                if *slot != 0 {
                    return Err(invalid(&window[..16]));
                }
                continue;
            }
            let (mode, reg) = (slot >> 3, Reg::R((slot & 7) as u8));
            let operand = match mode {
                MODE_REG => Operand::Reg(reg),
                MODE_MEM => Operand::Mem(reg),
                _ => {
                    need(window, next + 16)?;
                    let ext = window[next..next + 16].load_be::<u16>();
                    next += 16;
                    if mode == MODE_IMM {
                        if slot & 7 != 0 {
                            return Err(invalid(&window[..16]));
                        }
                        Operand::Imm(ext)
                    } else {
                        Operand::Indexed { base: reg, disp: ext as i16 }
                    }
                }
            };
            operands.push(operand);
        }

        let kinds: Vec<OperandKinds> = operands.iter().map(Operand::kind).collect();
        if !desc.accepts(&kinds) {
            return Err(invalid(&window[..next]));
        }
        Ok(Decoded { op: desc.op, operands, width: (next / 8) as u16 })
    }
}

fn slot(operand: &Operand, ext: &mut Vec<u16>) -> Result<u16, EncodeError> {
    let gpr = |r: &Reg| match r {
        Reg::R(n) => Ok(*n as u16),
        other => Err(EncodeError::Register(*other)),
    };
    Ok(match operand {
        Operand::Reg(r) => (MODE_REG << 3) | gpr(r)?,
        Operand::Imm(v) => {
            ext.push(*v);
            MODE_IMM << 3
        }
        Operand::Mem(r) => (MODE_MEM << 3) | gpr(r)?,
        Operand::Indexed { base, disp } => {
            let n = gpr(base)?;
            ext.push(*disp as u16);
            (MODE_INDEXED << 3) | n
        }
    })
}

pub fn encode(d: &Decoded<Op>) -> Result<Bits, EncodeError> {
    let desc = by_op(TABLE, d.op).ok_or(EncodeError::Shape { index: 0 })?;
    let kinds: Vec<OperandKinds> = d.operands.iter().map(Operand::kind).collect();
    if !desc.accepts(&kinds) {
        return Err(EncodeError::Shape { index: 0 });
    }
    let mut ext = Vec::new();
    let mut slots = [0u16; 2];
    for (i, operand) in d.operands.iter().enumerate() {
        slots[i] = slot(operand, &mut ext)?;
    }

    let mut out = Bits::new();
    let word0 = ((desc.code as u16) << 10) | (slots[0] << 5) | slots[1];
    push_bits(&mut out, word0 as u32, 16);
    for word in ext {
        push_bits(&mut out, word as u32, 16);
    }
    Ok(out)
}
