//! Vocabulary shared by every ISA table: operand shapes, the ALU and
//! branch conditions.

use bitflags::bitflags;

use crate::registers::Flags;

bitflags! {
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperandKinds: u8 {
const REG = 1 << 0;
const IMM = 1 << 1;
const MEM = 1 << 2;
const INDEXED = 1 << 3;
}
}

impl OperandKinds {
    pub const MEMORY: Self = Self::MEM.union(Self::INDEXED);
    pub const RM: Self = Self::REG.union(Self::MEMORY);
    pub const ANY: Self = Self::RM.union(Self::IMM);
    /// Branch targets: displacement, register, or register plus offset.
    pub const TARGET: Self = Self::REG.union(Self::IMM).union(Self::INDEXED);

    pub fn describe(self) -> String {
        let mut parts = Vec::new();
        if self.contains(Self::REG) {
            parts.push("register");
        }
        if self.contains(Self::IMM) {
            parts.push("immediate");
        }
        if self.contains(Self::MEM) {
            parts.push("[register]");
        }
        if self.contains(Self::INDEXED) {
            parts.push("[register+offset]");
        }
        parts.join(" or ")
    }
}

/// One accepted operand list of an instruction.
pub type Shape = &'static [OperandKinds];

#[derive(Debug, Clone, Copy)]
pub struct InstrDesc<O: 'static> {
    pub op: O,
    pub mnemonic: &'static str,
    pub code: u8,
    /// Accepted operand lists, tried in order.
    pub shapes: &'static [Shape],
    /// Immediate operands are branch displacements rather than values.
    pub branch: bool,
}

impl<O> InstrDesc<O> {
    pub fn accepts(&self, kinds: &[OperandKinds]) -> bool {
        self.shapes.iter().any(|shape| fits(shape, kinds))
    }

    pub fn arities(&self) -> Vec<usize> {
        let mut v: Vec<usize> = self.shapes.iter().map(|s| s.len()).collect();
        v.dedup();
        v
    }
}

fn fits(shape: Shape, kinds: &[OperandKinds]) -> bool {
    shape.len() == kinds.len() && shape.iter().zip(kinds).all(|(allowed, k)| allowed.contains(*k))
}

pub fn by_mnemonic<'a, O>(table: &'a [InstrDesc<O>], mnemonic: &str) -> Option<&'a InstrDesc<O>> {
    table.iter().find(|d| d.mnemonic.eq_ignore_ascii_case(mnemonic))
}

pub fn by_op<O: PartialEq>(table: &[InstrDesc<O>], op: O) -> Option<&InstrDesc<O>> {
    table.iter().find(|d| d.op == op)
}

pub fn by_code<O>(table: &[InstrDesc<O>], code: u8) -> Option<&InstrDesc<O>> {
    table.iter().find(|d| d.code == code)
}

/// Two-operand arithmetic and logic; every result wraps modulo 2^16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Xor,
    Lsh,
    Rsh,
}

impl AluOp {
    /// `None` only for division by zero.
    pub fn apply(self, a: u16, b: u16) -> Option<u16> {
        Some(match self {
            AluOp::Add => a.wrapping_add(b),
            AluOp::Sub => a.wrapping_sub(b),
            AluOp::Mul => a.wrapping_mul(b),
            AluOp::Div => {
                if b == 0 {
                    return None;
                }
                (a as i16).wrapping_div(b as i16) as u16
            }
            AluOp::And => a & b,
            AluOp::Or => a | b,
            AluOp::Xor => a ^ b,
            AluOp::Lsh => a.checked_shl(b as u32).unwrap_or(0),
            AluOp::Rsh => a.checked_shr(b as u32).unwrap_or(0),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cond {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Cond {
    pub const ALL: [Cond; 6] = [Cond::Eq, Cond::Ne, Cond::Gt, Cond::Ge, Cond::Lt, Cond::Le];

    pub fn holds(self, f: Flags) -> bool {
        match self {
            Cond::Eq => f.contains(Flags::EQUAL),
            Cond::Ne => !f.contains(Flags::EQUAL),
            Cond::Gt => f.contains(Flags::GREATER),
            Cond::Ge => f.intersects(Flags::GREATER | Flags::EQUAL),
            Cond::Lt => f.contains(Flags::LESS),
            Cond::Le => f.intersects(Flags::LESS | Flags::EQUAL),
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Cond::Eq => "je",
            Cond::Ne => "jne",
            Cond::Gt => "jg",
            Cond::Ge => "jge",
            Cond::Lt => "jl",
            Cond::Le => "jle",
        }
    }

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(i: u8) -> Option<Cond> {
        Cond::ALL.get(i as usize).copied()
    }
}
