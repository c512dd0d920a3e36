use serde::Serialize;

use crate::decoder::{DecodeError, Decoded, Decoder, EncodeError};
use crate::instructions::{InstrDesc, OperandKinds, Shape};
use crate::memory::{Bits, BitsRef};
use crate::registers::Reg;

use super::{decode_bytecoded, encode_bytecoded};

/// Accumulator machine operations. An omitted source operand means the
/// word at `[IR]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Op {
    Nop,
    Mov,
    Load,
    Store,
    LoadF,
    StoreF,
    LoadI,
    StoreI,
    Push,
    PushF,
    PushI,
    Pop,
    PopF,
    PopI,
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
    Inc,
    Dec,
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
    Out,
    In,
}

const NONE: &[Shape] = &[&[]];
const IMM: &[Shape] = &[&[OperandKinds::IMM]];
const OPT_IMM: &[Shape] = &[&[], &[OperandKinds::IMM]];
const OPT_IDX: &[Shape] = &[&[], &[OperandKinds::INDEXED]];
const SOURCE: &[Shape] = &[&[], &[OperandKinds::IMM.union(OperandKinds::INDEXED)]];

const fn d(op: Op, mnemonic: &'static str, code: u8, shapes: &'static [Shape]) -> InstrDesc<Op> {
    InstrDesc { op, mnemonic, code, shapes, branch: false }
}

const fn br(op: Op, mnemonic: &'static str, code: u8, shapes: &'static [Shape]) -> InstrDesc<Op> {
    InstrDesc { op, mnemonic, code, shapes, branch: true }
}

pub const TABLE: &[InstrDesc<Op>] = &[
    d(Op::Nop, "nop", 0, NONE),
    d(Op::Mov, "mov", 1, IMM),
    d(Op::Load, "load", 2, OPT_IDX),
    d(Op::Store, "store", 3, SOURCE),
    d(Op::LoadF, "loadf", 4, NONE),
    d(Op::StoreF, "storef", 5, NONE),
    d(Op::LoadI, "loadi", 6, NONE),
    d(Op::StoreI, "storei", 7, NONE),
    d(Op::Push, "push", 8, NONE),
    d(Op::PushF, "pushf", 9, NONE),
    d(Op::PushI, "pushi", 10, NONE),
    d(Op::Pop, "pop", 11, NONE),
    d(Op::PopF, "popf", 12, NONE),
    d(Op::PopI, "popi", 13, NONE),
    d(Op::Add, "add", 14, SOURCE),
    d(Op::Sub, "sub", 15, SOURCE),
    d(Op::Mul, "mul", 16, SOURCE),
    d(Op::Div, "div", 17, SOURCE),
    d(Op::And, "and", 18, SOURCE),
    d(Op::Or, "or", 19, SOURCE),
    d(Op::Xor, "xor", 20, SOURCE),
    d(Op::Not, "not", 21, NONE),
    d(Op::Lsh, "lsh", 22, NONE),
    d(Op::Rsh, "rsh", 23, NONE),
    d(Op::Inc, "inc", 24, NONE),
    d(Op::Dec, "dec", 25, NONE),
    d(Op::Cmp, "cmp", 26, SOURCE),
    d(Op::Test, "test", 27, SOURCE),
    br(Op::Jmp, "jmp", 28, OPT_IMM),
    br(Op::Je, "je", 29, IMM),
    br(Op::Jne, "jne", 30, IMM),
    br(Op::Jg, "jg", 31, IMM),
    br(Op::Jge, "jge", 32, IMM),
    br(Op::Jl, "jl", 33, IMM),
    br(Op::Jle, "jle", 34, IMM),
    br(Op::Call, "call", 35, OPT_IMM),
    d(Op::Ret, "ret", 36, NONE),
    d(Op::Out, "out", 37, IMM),
    d(Op::In, "in", 38, IMM),
];

pub struct AccumulatorDecoder;

impl Decoder for AccumulatorDecoder {
    type Op = Op;

    fn decode(&self, window: &BitsRef) -> Result<Decoded<Op>, DecodeError> {
        decode_bytecoded(TABLE, window, Reg::Ir)
    }
}

pub fn encode(d: &Decoded<Op>) -> Result<Bits, EncodeError> {
    encode_bytecoded(TABLE, d, Reg::Ir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Operand;
    use crate::memory::bits_to_string;

    #[test]
    fn codes_are_unique() {
        for (i, a) in TABLE.iter().enumerate() {
            assert!(a.code < 64);
            assert!(TABLE[i + 1..].iter().all(|b| b.code != a.code && b.op != a.op));
        }
    }

    #[test]
    fn indexed_source_round_trips() {
        let d = Decoded {
            op: Op::Add,
            operands: vec![Operand::Indexed { base: Reg::Ir, disp: -2 }],
            width: 3,
        };
        let bits = encode(&d).unwrap();
        assert_eq!(bits_to_string(&bits[..8]), "00111010");
        assert_eq!(AccumulatorDecoder.decode(&bits).unwrap(), d);
    }

    #[test]
    fn implicit_form_is_one_byte() {
        let d = Decoded { op: Op::StoreI, operands: vec![], width: 1 };
        let bits = encode(&d).unwrap();
        assert_eq!(bits_to_string(&bits), "00011100");
        assert_eq!(AccumulatorDecoder.decode(&bits).unwrap(), d);
    }
}
