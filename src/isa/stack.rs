use serde::Serialize;

use crate::decoder::{DecodeError, Decoded, Decoder, EncodeError};
use crate::instructions::{InstrDesc, OperandKinds, Shape};
use crate::memory::{Bits, BitsRef};
use crate::registers::Reg;

use super::{decode_bytecoded, encode_bytecoded};

/// Stack machine operations. Operands live on the operand stack (`TOS`),
/// return addresses and saved flags on the call stack (`SP`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Op {
    Nop,
    Mov,
    Load,
    Store,
    LoadF,
    StoreF,
    Push,
    Pop,
    PushF,
    PopF,
    Swap,
    Dup,
    Dup2,
    Drop,
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Not,
    Lsh,
    Rsh,
    Cmp,
    CmpE,
    CmpB,
    CmpA,
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
    Out,
    In,
}

const NONE: &[Shape] = &[&[]];
const IMM: &[Shape] = &[&[OperandKinds::IMM]];
const OPT_IMM: &[Shape] = &[&[], &[OperandKinds::IMM]];

const fn d(op: Op, mnemonic: &'static str, code: u8, shapes: &'static [Shape]) -> InstrDesc<Op> {
    InstrDesc { op, mnemonic, code, shapes, branch: false }
}

const fn br(op: Op, mnemonic: &'static str, code: u8, shapes: &'static [Shape]) -> InstrDesc<Op> {
    InstrDesc { op, mnemonic, code, shapes, branch: true }
}

pub const TABLE: &[InstrDesc<Op>] = &[
    d(Op::Nop, "nop", 0, NONE),
    d(Op::Mov, "mov", 1, IMM),
    d(Op::Load, "load", 2, OPT_IMM),
    d(Op::Store, "store", 3, OPT_IMM),
    d(Op::LoadF, "loadf", 4, NONE),
    d(Op::StoreF, "storef", 5, NONE),
    d(Op::Push, "push", 6, NONE),
    d(Op::Pop, "pop", 7, NONE),
    d(Op::PushF, "pushf", 8, NONE),
    d(Op::PopF, "popf", 9, NONE),
    d(Op::Swap, "swap", 10, NONE),
    d(Op::Dup, "dup", 11, NONE),
    d(Op::Dup2, "dup2", 12, NONE),
    d(Op::Drop, "drop", 13, NONE),
    d(Op::Add, "add", 14, NONE),
    d(Op::Sub, "sub", 15, NONE),
    d(Op::Mul, "mul", 16, NONE),
    d(Op::Div, "div", 17, NONE),
    d(Op::And, "and", 18, NONE),
    d(Op::Or, "or", 19, NONE),
    d(Op::Xor, "xor", 20, NONE),
    d(Op::Not, "not", 21, NONE),
    d(Op::Lsh, "lsh", 22, NONE),
    d(Op::Rsh, "rsh", 23, NONE),
    d(Op::Cmp, "cmp", 24, NONE),
    d(Op::CmpE, "cmpe", 25, NONE),
    d(Op::CmpB, "cmpb", 26, NONE),
    d(Op::CmpA, "cmpa", 27, NONE),
    d(Op::Test, "test", 28, NONE),
    br(Op::Jmp, "jmp", 29, OPT_IMM),
    br(Op::Je, "je", 30, IMM),
    br(Op::Jne, "jne", 31, IMM),
    br(Op::Jg, "jg", 32, IMM),
    br(Op::Jge, "jge", 33, IMM),
    br(Op::Jl, "jl", 34, IMM),
    br(Op::Jle, "jle", 35, IMM),
    br(Op::Call, "call", 36, OPT_IMM),
    d(Op::Ret, "ret", 37, NONE),
    d(Op::Out, "out", 38, IMM),
    d(Op::In, "in", 39, IMM),
];

pub struct StackDecoder;

impl Decoder for StackDecoder {
    type Op = Op;

    fn decode(&self, window: &BitsRef) -> Result<Decoded<Op>, DecodeError> {
        // No indexed form on this machine; the table rejects it.
        decode_bytecoded(TABLE, window, Reg::Tos)
    }
}

pub fn encode(d: &Decoded<Op>) -> Result<Bits, EncodeError> {
    encode_bytecoded(TABLE, d, Reg::Tos)
}
