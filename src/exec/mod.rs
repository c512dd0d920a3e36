//! Instruction semantics, one executor per ISA.

pub mod accumulator;
pub mod cisc;
pub mod risc;
pub mod stack;

use crate::cpu::Trap;
use crate::decoder::{Decoded, Operand};
use crate::instructions::Cond;
use crate::machine::Machine;
use crate::ports::Destination;

pub use accumulator::AccumulatorExecutor;
pub use cisc::CiscExecutor;
pub use risc::RiscExecutor;
pub use stack::StackExecutor;

/// What the CPU does with `IP` once an instruction has executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Advance by the instruction width.
    Next,
    Jump(u16),
    /// Suspend until `count` values arrive on `port`. IP stays put.
    Input { port: u16, dest: Destination, count: u8 },
}

pub trait Executor {
    type Op;

    /// Execute `d`, fetched from address `ip`.
    fn exec(&self, m: &mut Machine, ip: u16, d: &Decoded<Self::Op>) -> Result<Flow, Trap>;
}

/// Target of a relative branch.
pub(crate) fn relative(ip: u16, disp: u16) -> Flow {
    Flow::Jump(ip.wrapping_add(disp))
}

pub(crate) fn branch_if(m: &Machine, cond: Cond, target: Flow) -> Flow {
    if cond.holds(m.flags()) {
        target
    } else {
        Flow::Next
    }
}

/// Resolve a jump operand: immediates are displacements, registers hold an
/// absolute address, and `[base+disp]` is the address itself (no load).
pub(crate) fn target(m: &Machine, ip: u16, operand: &Operand) -> Result<Flow, Trap> {
    Ok(match operand {
        Operand::Imm(disp) => relative(ip, *disp),
        Operand::Reg(r) => Flow::Jump(m.reg(*r)?),
        mem => match m.effective_address(mem)? {
            Some(addr) => Flow::Jump(addr),
            None => Flow::Next,
        },
    })
}

/// Push the return address and jump.
pub(crate) fn call(m: &mut Machine, ip: u16, width: u16, to: Flow) -> Result<Flow, Trap> {
    m.push(ip.wrapping_add(width))?;
    Ok(to)
}

/// Operand `i`; decoders guarantee arity, so a miss means a malformed table.
pub(crate) fn arg(operands: &[Operand], i: usize, ip: u16) -> Result<&Operand, Trap> {
    operands.get(i).ok_or(Trap::MissingOperand { ip })
}

pub(crate) fn immediate(operand: &Operand, ip: u16) -> Result<u16, Trap> {
    match operand {
        Operand::Imm(p) => Ok(*p),
        _ => Err(Trap::MissingOperand { ip }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::{InstrDesc, OperandKinds};
    use crate::isa::{accumulator, cisc, risc, stack, Isa};
    use crate::memory::{MemoryArchitecture, MemoryModel};
    use crate::ports::PortBank;
    use crate::registers::{Reg, RegisterProfile, Registers};

    fn sample(kinds: OperandKinds, base: Reg) -> Operand {
        if kinds.contains(OperandKinds::REG) {
            Operand::Reg(Reg::R(1))
        } else if kinds.contains(OperandKinds::IMM) {
            Operand::Imm(2)
        } else if kinds.contains(OperandKinds::MEM) {
            Operand::Mem(base)
        } else {
            Operand::Indexed { base, disp: 0 }
        }
    }

    /// Every shape of every table entry reaches an arm that reads its operands.
    fn every_entry_has_an_arm<X: Executor>(isa: Isa, table: &[InstrDesc<X::Op>], x: X, base: Reg)
    where
        X::Op: Copy,
    {
        for desc in table {
            for shape in desc.shapes {
                let mut regs = Registers::new(isa, RegisterProfile::Extended);
                regs.set_sp(128);
                let mut m = Machine {
                    regs,
                    memory: MemoryModel::new(MemoryArchitecture::Neumann, 256),
                    ports: PortBank::default(),
                };
                let operands = shape.iter().map(|k| sample(*k, base)).collect();
                let d = Decoded { op: desc.op, operands, width: 2 };
                let result = x.exec(&mut m, 0x10, &d);
                assert_ne!(result, Err(Trap::MissingOperand { ip: 0x10 }), "{} {:?}", desc.mnemonic, shape);
            }
        }
    }

    #[test]
    fn stack_table_is_covered() {
        every_entry_has_an_arm(Isa::Stack, stack::TABLE, StackExecutor, Reg::Tos);
    }

    #[test]
    fn accumulator_table_is_covered() {
        every_entry_has_an_arm(Isa::Accumulator, accumulator::TABLE, AccumulatorExecutor, Reg::Ir);
    }

    #[test]
    fn risc_table_is_covered() {
        every_entry_has_an_arm(Isa::Risc, risc::TABLE, RiscExecutor, Reg::R(1));
    }

    #[test]
    fn cisc_table_is_covered() {
        every_entry_has_an_arm(Isa::Cisc, cisc::TABLE, CiscExecutor, Reg::R(1));
    }
}
