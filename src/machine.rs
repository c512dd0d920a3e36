//! State an executor mutates, plus the addressing and stack helpers every
//! ISA shares.

use tracing::trace;

use crate::cpu::Trap;
use crate::decoder::Operand;
use crate::instructions::AluOp;
use crate::memory::MemoryModel;
use crate::ports::{Destination, PortBank};
use crate::registers::{Flags, Reg, Registers};

#[derive(Debug, Clone)]
pub struct Machine {
    pub regs: Registers,
    pub memory: MemoryModel,
    pub ports: PortBank,
}

impl Machine {
    pub fn reg(&self, r: Reg) -> Result<u16, Trap> {
        self.regs.get(r).ok_or(Trap::MissingRegister(r))
    }

    pub fn set_reg(&mut self, r: Reg, val: u16) -> Result<(), Trap> {
        if self.regs.set(r, val) {
            Ok(())
        } else {
            Err(Trap::MissingRegister(r))
        }
    }

    pub fn flags(&self) -> Flags {
        self.regs.flags()
    }

    pub fn set_flags(&mut self, f: Flags) {
        self.regs.set_flags(f);
    }

    pub fn read_word(&self, addr: u16) -> Result<u16, Trap> {
        Ok(self.memory.data().read_word(addr)?)
    }

    pub fn write_word(&mut self, addr: u16, val: u16) -> Result<(), Trap> {
        Ok(self.memory.data_mut().write_word(addr, val)?)
    }

    /// Call stack: grows downward from `SP`.
    pub fn push(&mut self, val: u16) -> Result<(), Trap> {
        let sp = self.regs.sp().wrapping_sub(2);
        self.write_word(sp, val)?;
        self.regs.set_sp(sp);
        trace!(sp, val, "push");
        Ok(())
    }

    pub fn pop(&mut self) -> Result<u16, Trap> {
        let sp = self.regs.sp();
        let val = self.read_word(sp)?;
        self.regs.set_sp(sp.wrapping_add(2));
        trace!(sp, val, "pop");
        Ok(val)
    }

    /// Operand stack of the stack machine: grows upward, top word at `TOS-2`.
    pub fn push_operand(&mut self, val: u16) -> Result<(), Trap> {
        let tos = self.reg(Reg::Tos)?;
        self.write_word(tos, val)?;
        self.set_reg(Reg::Tos, tos.wrapping_add(2))?;
        trace!(tos, val, "push operand");
        Ok(())
    }

    pub fn pop_operand(&mut self) -> Result<u16, Trap> {
        let tos = self.reg(Reg::Tos)?.wrapping_sub(2);
        let val = self.read_word(tos)?;
        self.set_reg(Reg::Tos, tos)?;
        trace!(tos, val, "pop operand");
        Ok(val)
    }

    /// Address named by a memory operand. For `[base+disp]` this is also
    /// the absolute target of a register-relative jump.
    pub fn effective_address(&self, operand: &Operand) -> Result<Option<u16>, Trap> {
        Ok(match operand {
            Operand::Mem(base) => Some(self.reg(*base)?),
            Operand::Indexed { base, disp } => Some(self.reg(*base)?.wrapping_add(*disp as u16)),
            Operand::Reg(_) | Operand::Imm(_) => None,
        })
    }

    /// Writable location of an operand; `None` for immediates.
    pub fn locate(&self, operand: &Operand) -> Result<Option<Destination>, Trap> {
        Ok(match operand {
            Operand::Reg(r) => Some(Destination::Register(*r)),
            Operand::Imm(_) => None,
            mem => self.effective_address(mem)?.map(Destination::Memory),
        })
    }

    pub fn load(&mut self, loc: Destination) -> Result<u16, Trap> {
        match loc {
            Destination::Register(r) => self.reg(r),
            Destination::Memory(addr) => self.read_word(addr),
            Destination::OperandStack => self.pop_operand(),
        }
    }

    pub fn store(&mut self, loc: Destination, val: u16) -> Result<(), Trap> {
        match loc {
            Destination::Register(r) => self.set_reg(r, val),
            Destination::Memory(addr) => self.write_word(addr, val),
            Destination::OperandStack => self.push_operand(val),
        }
    }

    pub fn get(&mut self, operand: &Operand) -> Result<u16, Trap> {
        match operand {
            Operand::Imm(v) => Ok(*v),
            other => match self.locate(other)? {
                Some(loc) => self.load(loc),
                None => Ok(0),
            },
        }
    }

    pub fn set(&mut self, operand: &Operand, val: u16, ip: u16) -> Result<(), Trap> {
        let loc = self.locate(operand)?.ok_or(Trap::ImmediateDestination { ip })?;
        self.store(loc, val)
    }

    pub fn alu(&self, op: AluOp, a: u16, b: u16, ip: u16) -> Result<u16, Trap> {
        op.apply(a, b).ok_or(Trap::DivisionByZero { ip })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Isa;
    use crate::memory::MemoryArchitecture;
    use crate::registers::RegisterProfile;

    fn machine(isa: Isa) -> Machine {
        let mut regs = Registers::new(isa, RegisterProfile::Special);
        regs.set_sp(64);
        regs.set(Reg::Tos, 32);
        Machine {
            regs,
            memory: MemoryModel::new(MemoryArchitecture::Neumann, 64),
            ports: PortBank::default(),
        }
    }

    #[test]
    fn call_stack_push_then_pop_is_balanced() {
        let mut m = machine(Isa::Cisc);
        m.push(0xABCD).unwrap();
        assert_eq!(m.regs.sp(), 62);
        assert_eq!(m.read_word(62).unwrap(), 0xABCD);
        assert_eq!(m.pop().unwrap(), 0xABCD);
        assert_eq!(m.regs.sp(), 64);
    }

    #[test]
    fn operand_stack_grows_upward() {
        let mut m = machine(Isa::Stack);
        m.push_operand(1).unwrap();
        m.push_operand(2).unwrap();
        assert_eq!(m.reg(Reg::Tos).unwrap(), 36);
        assert_eq!(m.read_word(34).unwrap(), 2);
        assert_eq!(m.pop_operand().unwrap(), 2);
        assert_eq!(m.pop_operand().unwrap(), 1);
    }

    #[test]
    fn pop_from_top_of_memory_is_a_bounds_fault() {
        let mut m = machine(Isa::Risc);
        assert!(matches!(m.pop(), Err(Trap::Memory(_))));
        assert_eq!(m.regs.sp(), 64);
    }

    #[test]
    fn indexed_operands_resolve_with_signed_displacement() {
        let mut m = machine(Isa::Risc);
        m.set_reg(Reg::R(1), 10).unwrap();
        m.write_word(8, 0x0102).unwrap();
        let op = Operand::Indexed { base: Reg::R(1), disp: -2 };
        assert_eq!(m.effective_address(&op).unwrap(), Some(8));
        assert_eq!(m.get(&op).unwrap(), 0x0102);
        m.set(&op, 7, 0).unwrap();
        assert_eq!(m.read_word(8).unwrap(), 7);
        assert_eq!(m.set(&Operand::Imm(1), 7, 4), Err(Trap::ImmediateDestination { ip: 4 }));
        assert_eq!(m.get(&Operand::Reg(Reg::R(5))), Err(Trap::MissingRegister(Reg::R(5))));
    }
}
