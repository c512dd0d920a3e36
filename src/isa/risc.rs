//! Fixed-width 16-bit register machine.
//!
//! Every instruction is one word with the opcode in bits 15..11. Unused
//! bits must be zero, so each layout carries the mask of bits it owns.

use bitvec::prelude::*;
use serde::Serialize;

use crate::decoder::{DecodeError, Decoded, Decoder, EncodeError, Operand};
use crate::instructions::{by_op, Cond, InstrDesc, OperandKinds, Shape};
use crate::memory::{Bits, BitsRef};
use crate::registers::Reg;

use super::{byte_field, invalid, need, push_bits, sign_extend, signed_field};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Op {
    Nop,
    Mov,
    MovLow,
    MovHigh,
    Load,
    Store,
    Push,
    PushF,
    Pop,
    PopF,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Lsh,
    Rsh,
    Not,
    Cmp,
    Test,
    Jmp,
    Call,
    Je,
    Jne,
    Jg,
    Jge,
    Jl,
    Jle,
    Ret,
    Out,
    In,
}

impl Op {
    pub fn cond(self) -> Option<Cond> {
        Some(match self {
            Op::Je => Cond::Eq,
            Op::Jne => Cond::Ne,
            Op::Jg => Cond::Gt,
            Op::Jge => Cond::Ge,
            Op::Jl => Cond::Lt,
            Op::Jle => Cond::Le,
            _ => return None,
        })
    }

    fn from_cond(c: Cond) -> Op {
        match c {
            Cond::Eq => Op::Je,
            Cond::Ne => Op::Jne,
            Cond::Gt => Op::Jg,
            Cond::Ge => Op::Jge,
            Cond::Lt => Op::Jl,
            Cond::Le => Op::Jle,
        }
    }
}

const R: OperandKinds = OperandKinds::REG;
const I: OperandKinds = OperandKinds::IMM;
const M: OperandKinds = OperandKinds::MEM;

const NONE: &[Shape] = &[&[]];
const RR: &[Shape] = &[&[R, R]];
const RI: &[Shape] = &[&[R, I]];
const RRR: &[Shape] = &[&[R, R, R]];
const ONE_REG: &[Shape] = &[&[R]];
const CMP: &[Shape] = &[&[R, R], &[R, I]];
const TARGET: &[Shape] = &[&[I], &[R]];
const DISP: &[Shape] = &[&[I]];

const fn d(op: Op, mnemonic: &'static str, code: u8, shapes: &'static [Shape]) -> InstrDesc<Op> {
    InstrDesc { op, mnemonic, code, shapes, branch: false }
}

const fn br(op: Op, mnemonic: &'static str, code: u8, shapes: &'static [Shape]) -> InstrDesc<Op> {
    InstrDesc { op, mnemonic, code, shapes, branch: true }
}

// Several mnemonics share an opcode and are told apart by a mode bit or
// condition field; `code` here is the opcode.
pub const TABLE: &[InstrDesc<Op>] = &[
    d(Op::Nop, "nop", 0, NONE),
    d(Op::Mov, "mov", 1, RR),
    d(Op::MovLow, "mov_low", 2, RI),
    d(Op::MovHigh, "mov_high", 3, RI),
    d(Op::Load, "load", 4, &[&[R, M]]),
    d(Op::Store, "store", 5, &[&[M, R]]),
    d(Op::Push, "push", 6, ONE_REG),
    d(Op::PushF, "pushf", 6, NONE),
    d(Op::Pop, "pop", 7, ONE_REG),
    d(Op::PopF, "popf", 7, NONE),
    d(Op::Add, "add", 8, RRR),
    d(Op::Sub, "sub", 9, RRR),
    d(Op::Mul, "mul", 10, RRR),
    d(Op::Div, "div", 11, RRR),
    d(Op::And, "and", 12, RRR),
    d(Op::Or, "or", 13, RRR),
    d(Op::Xor, "xor", 14, RRR),
    d(Op::Lsh, "lsh", 15, RRR),
    d(Op::Rsh, "rsh", 16, RRR),
    d(Op::Not, "not", 17, RR),
    d(Op::Cmp, "cmp", 18, CMP),
    d(Op::Test, "test", 20, RR),
    br(Op::Jmp, "jmp", 21, TARGET),
    br(Op::Call, "call", 22, TARGET),
    br(Op::Je, "je", 23, DISP),
    br(Op::Jne, "jne", 23, DISP),
    br(Op::Jg, "jg", 23, DISP),
    br(Op::Jge, "jge", 23, DISP),
    br(Op::Jl, "jl", 23, DISP),
    br(Op::Jle, "jle", 23, DISP),
    d(Op::Ret, "ret", 24, NONE),
    d(Op::Out, "out", 25, &[&[I, R]]),
    d(Op::In, "in", 26, RI),
];

const OP_CMP_IMM: u16 = 19;
const OP_BITS: u16 = 0xF800;

// Field masks within the instruction word.
const F_RD: u16 = 0x0700;
const F_RA: u16 = 0x00E0;
const F_RB: u16 = 0x001C;
const F_IMM8: u16 = 0x00FF;
const F_MODE: u16 = 0x0400;
const F_R97: u16 = 0x0380;
const F_DISP10: u16 = 0x03FF;

fn gpr(n: u16) -> Operand {
    Operand::Reg(Reg::R((n & 7) as u8))
}

fn rd(w: u16) -> u16 {
    (w >> 8) & 7
}

fn ra(w: u16) -> u16 {
    (w >> 5) & 7
}

fn rb(w: u16) -> u16 {
    (w >> 2) & 7
}

fn r97(w: u16) -> u16 {
    (w >> 7) & 7
}

/// Branch displacement in bytes from a field counted in instruction words.
fn disp_bytes(field: u16, bits: u32) -> Operand {
    Operand::Imm(sign_extend(field as u32, bits).wrapping_mul(2))
}

pub struct RiscDecoder;

impl Decoder for RiscDecoder {
    type Op = Op;

    fn decode(&self, window: &BitsRef) -> Result<Decoded<Op>, DecodeError> {
        need(window, 16)?;
        let raw = &window[..16];
        let w = raw.load_be::<u16>();
        let opcode = w >> 11;

        let (op, operands, used) = match opcode {
            0 => (Op::Nop, vec![], 0),
            1 => (Op::Mov, vec![gpr(rd(w)), gpr(ra(w))], F_RD | F_RA),
            2 | 3 => {
                let op = if opcode == 2 { Op::MovLow } else { Op::MovHigh };
                (op, vec![gpr(rd(w)), Operand::Imm(w & F_IMM8)], F_RD | F_IMM8)
            }
            4 => (
                Op::Load,
                vec![gpr(rd(w)), Operand::Mem(Reg::R(ra(w) as u8))],
                F_RD | F_RA,
            ),
            5 => (
                Op::Store,
                vec![Operand::Mem(Reg::R(rd(w) as u8)), gpr(ra(w))],
                F_RD | F_RA,
            ),
            6 | 7 => {
                let flags = w & F_MODE != 0;
                match (opcode, flags) {
                    (6, true) => (Op::PushF, vec![], F_MODE),
                    (6, false) => (Op::Push, vec![gpr(r97(w))], F_R97),
                    (_, true) => (Op::PopF, vec![], F_MODE),
                    (_, false) => (Op::Pop, vec![gpr(r97(w))], F_R97),
                }
            }
            8..=16 => {
                let op = [Op::Add, Op::Sub, Op::Mul, Op::Div, Op::And, Op::Or, Op::Xor, Op::Lsh, Op::Rsh]
                    [(opcode - 8) as usize];
                (op, vec![gpr(rd(w)), gpr(ra(w)), gpr(rb(w))], F_RD | F_RA | F_RB)
            }
            17 => (Op::Not, vec![gpr(rd(w)), gpr(ra(w))], F_RD | F_RA),
            18 => (Op::Cmp, vec![gpr(rd(w)), gpr(ra(w))], F_RD | F_RA),
            OP_CMP_IMM => (
                Op::Cmp,
                vec![gpr(rd(w)), Operand::Imm(sign_extend((w & F_IMM8) as u32, 8))],
                F_RD | F_IMM8,
            ),
            20 => (Op::Test, vec![gpr(rd(w)), gpr(ra(w))], F_RD | F_RA),
            21 | 22 => {
                let op = if opcode == 21 { Op::Jmp } else { Op::Call };
                if w & F_MODE != 0 {
                    (op, vec![gpr(r97(w))], F_MODE | F_R97)
                } else {
                    (op, vec![disp_bytes(w & F_DISP10, 10)], F_DISP10)
                }
            }
            23 => {
                let cond = Cond::from_index(rd(w) as u8).ok_or_else(|| invalid(raw))?;
                (Op::from_cond(cond), vec![disp_bytes(w & F_IMM8, 8)], F_RD | F_IMM8)
            }
            24 => (Op::Ret, vec![], 0),
            25 => (Op::Out, vec![Operand::Imm(w & F_IMM8), gpr(rd(w))], F_RD | F_IMM8),
            26 => (Op::In, vec![gpr(rd(w)), Operand::Imm(w & F_IMM8)], F_RD | F_IMM8),
            _ => return Err(invalid(raw)),
        };

        if w & !(OP_BITS | used) != 0 {
            return Err(invalid(raw));
        }
        Ok(Decoded { op, operands, width: 2 })
    }
}

fn reg_field(operand: &Operand, index: usize) -> Result<u16, EncodeError> {
    match operand {
        Operand::Reg(Reg::R(n)) | Operand::Mem(Reg::R(n)) => Ok(*n as u16),
        Operand::Reg(r) | Operand::Mem(r) => Err(EncodeError::Register(*r)),
        _ => Err(EncodeError::Shape { index }),
    }
}

fn imm_field(operand: &Operand, index: usize) -> Result<u16, EncodeError> {
    match operand {
        Operand::Imm(v) => Ok(*v),
        _ => Err(EncodeError::Shape { index }),
    }
}

/// Byte displacement to a word-counted field.
fn disp_field(raw: u16, bits: u32) -> Result<u16, EncodeError> {
    let bytes = raw as i16;
    if bytes % 2 != 0 {
        return Err(EncodeError::Misaligned { value: bytes as i64, unit: 2 });
    }
    Ok(signed_field((bytes / 2) as u16, bits)? as u16)
}

pub fn encode(d: &Decoded<Op>) -> Result<Bits, EncodeError> {
    let desc = by_op(TABLE, d.op).ok_or(EncodeError::Shape { index: 0 })?;
    let kinds: Vec<OperandKinds> = d.operands.iter().map(Operand::kind).collect();
    if !desc.accepts(&kinds) {
        return Err(EncodeError::Shape { index: 0 });
    }
    let ops = &d.operands;
    let reg = |i: usize| reg_field(&ops[i], i);
    let imm = |i: usize| imm_field(&ops[i], i);

    let mut opcode = desc.code as u16;
    let body: u16 = match d.op {
        Op::Nop | Op::Ret => 0,
        Op::Mov | Op::Not | Op::Test | Op::Load | Op::Store => (reg(0)? << 8) | (reg(1)? << 5),
        Op::MovLow | Op::MovHigh | Op::In => (reg(0)? << 8) | byte_field(imm(1)?)? as u16,
        Op::Push | Op::Pop => reg(0)? << 7,
        Op::PushF | Op::PopF => F_MODE,
        Op::Cmp => match ops[1] {
            Operand::Imm(v) => {
                opcode = OP_CMP_IMM;
                (reg(0)? << 8) | signed_field(v, 8)? as u16
            }
            _ => (reg(0)? << 8) | (reg(1)? << 5),
        },
        Op::Jmp | Op::Call => match ops[0] {
            Operand::Imm(v) => disp_field(v, 10)?,
            _ => F_MODE | (reg(0)? << 7),
        },
        Op::Out => (reg(1)? << 8) | byte_field(imm(0)?)? as u16,
        Op::Je | Op::Jne | Op::Jg | Op::Jge | Op::Jl | Op::Jle => {
            let cond = d.op.cond().ok_or(EncodeError::Shape { index: 0 })?;
            ((cond.index() as u16) << 8) | disp_field(imm(0)?, 8)?
        }
        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::And | Op::Or | Op::Xor | Op::Lsh | Op::Rsh => {
            (reg(0)? << 8) | (reg(1)? << 5) | (reg(2)? << 2)
        }
    };

    let mut out = Bits::new();
    push_bits(&mut out, ((opcode << 11) | body) as u32, 16);
    Ok(out)
}
