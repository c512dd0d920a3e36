use crate::cpu::Trap;
use crate::decoder::{Decoded, Operand};
use crate::instructions::{AluOp, Cond};
use crate::isa::risc::Op;
use crate::machine::Machine;
use crate::ports::Destination;
use crate::registers::{Flags, Reg};

use super::{arg, branch_if, call, immediate, relative, target, Executor, Flow};

pub struct RiscExecutor;

/// `rd = rs op rt`.
fn three(m: &mut Machine, op: AluOp, ops: &[Operand], ip: u16) -> Result<(), Trap> {
    let a = m.get(arg(ops, 1, ip)?)?;
    let b = m.get(arg(ops, 2, ip)?)?;
    let v = m.alu(op, a, b, ip)?;
    m.set(arg(ops, 0, ip)?, v, ip)
}

fn branch(m: &Machine, cond: Cond, ops: &[Operand], ip: u16) -> Result<Flow, Trap> {
    let disp = immediate(arg(ops, 0, ip)?, ip)?;
    Ok(branch_if(m, cond, relative(ip, disp)))
}

impl Executor for RiscExecutor {
    type Op = Op;

    fn exec(&self, m: &mut Machine, ip: u16, d: &Decoded<Op>) -> Result<Flow, Trap> {
        let ops = &d.operands;

        match d.op {
            Op::Nop => {}
            Op::Mov | Op::Load | Op::Store => {
                let v = m.get(arg(ops, 1, ip)?)?;
                m.set(arg(ops, 0, ip)?, v, ip)?;
            }
            Op::MovLow => {
                let v = immediate(arg(ops, 1, ip)?, ip)? & 0xFF;
                m.set(arg(ops, 0, ip)?, v, ip)?;
            }
            Op::MovHigh => {
                let dst = arg(ops, 0, ip)?;
                let low = m.get(dst)? & 0xFF;
                let v = (immediate(arg(ops, 1, ip)?, ip)? << 8) | low;
                m.set(dst, v, ip)?;
            }
            Op::Push => {
                let v = m.get(arg(ops, 0, ip)?)?;
                m.push(v)?;
            }
            Op::PushF => m.push(m.flags().bits())?,
            Op::Pop => {
                let v = m.pop()?;
                m.set(arg(ops, 0, ip)?, v, ip)?;
            }
            Op::PopF => {
                let v = m.pop()?;
                m.set_flags(Flags::from_bits_retain(v));
            }
            Op::Not => {
                let v = m.get(arg(ops, 1, ip)?)?;
                m.set(arg(ops, 0, ip)?, !v, ip)?;
            }
            Op::Cmp | Op::Test => {
                let a = m.get(arg(ops, 0, ip)?)?;
                let b = m.get(arg(ops, 1, ip)?)?;
                let f = if d.op == Op::Cmp { Flags::compare_signed(a, b) } else { Flags::test(a, b) };
                m.set_flags(f);
            }
            Op::Jmp => return target(m, ip, arg(ops, 0, ip)?),
            Op::Call => {
                let to = target(m, ip, arg(ops, 0, ip)?)?;
                return call(m, ip, d.width, to);
            }
            Op::Ret => return Ok(Flow::Jump(m.pop()?)),
            Op::Out => {
                let port = immediate(arg(ops, 0, ip)?, ip)?;
                let v = m.get(arg(ops, 1, ip)?)?;
                m.ports.port_mut(port).write(v);
            }
            Op::In => {
                let reg = match arg(ops, 0, ip)? {
                    Operand::Reg(r) => *r,
                    _ => return Err(Trap::MissingOperand { ip }),
                };
                // Fail now rather than after the value arrives.
                m.reg(reg)?;
                let port = immediate(arg(ops, 1, ip)?, ip)?;
                return Ok(Flow::Input { port, dest: Destination::Register(reg), count: 1 });
            }
            Op::Add => three(m, AluOp::Add, ops, ip)?,
            Op::Sub => three(m, AluOp::Sub, ops, ip)?,
            Op::Mul => three(m, AluOp::Mul, ops, ip)?,
            Op::Div => three(m, AluOp::Div, ops, ip)?,
            Op::And => three(m, AluOp::And, ops, ip)?,
            Op::Or => three(m, AluOp::Or, ops, ip)?,
            Op::Xor => three(m, AluOp::Xor, ops, ip)?,
            Op::Lsh => three(m, AluOp::Lsh, ops, ip)?,
            Op::Rsh => three(m, AluOp::Rsh, ops, ip)?,
            Op::Je => return branch(m, Cond::Eq, ops, ip),
            Op::Jne => return branch(m, Cond::Ne, ops, ip),
            Op::Jg => return branch(m, Cond::Gt, ops, ip),
            Op::Jge => return branch(m, Cond::Ge, ops, ip),
            Op::Jl => return branch(m, Cond::Lt, ops, ip),
            Op::Jle => return branch(m, Cond::Le, ops, ip),
        }
        Ok(Flow::Next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::Isa;
    use crate::memory::{MemoryArchitecture, MemoryModel};
    use crate::ports::PortBank;
    use crate::registers::{RegisterProfile, Registers};

    fn machine() -> Machine {
        let mut regs = Registers::new(Isa::Risc, RegisterProfile::Special);
        regs.set_sp(64);
        Machine {
            regs,
            memory: MemoryModel::new(MemoryArchitecture::Neumann, 64),
            ports: PortBank::default(),
        }
    }

    fn run(m: &mut Machine, op: Op, operands: Vec<Operand>) -> Result<Flow, Trap> {
        RiscExecutor.exec(m, 0x10, &Decoded { op, operands, width: 2 })
    }

    #[test]
    fn mov_low_and_high_compose_a_word() {
        let mut m = machine();
        let r0 = Operand::Reg(Reg::R(0));
        m.set_reg(Reg::R(0), 0xAAAA).unwrap();
        run(&mut m, Op::MovLow, vec![r0, Operand::Imm(0x34)]).unwrap();
        assert_eq!(m.reg(Reg::R(0)).unwrap(), 0x0034);
        run(&mut m, Op::MovHigh, vec![r0, Operand::Imm(0x12)]).unwrap();
        assert_eq!(m.reg(Reg::R(0)).unwrap(), 0x1234);
    }

    #[test]
    fn division_by_zero_traps_without_writing() {
        let mut m = machine();
        m.set_reg(Reg::R(1), 9).unwrap();
        let ops = vec![Operand::Reg(Reg::R(0)), Operand::Reg(Reg::R(1)), Operand::Reg(Reg::R(2))];
        assert_eq!(run(&mut m, Op::Div, ops), Err(Trap::DivisionByZero { ip: 0x10 }));
        assert_eq!(m.reg(Reg::R(0)).unwrap(), 0);
    }

    #[test]
    fn conditional_branch_falls_through_when_flags_disagree() {
        let mut m = machine();
        m.set_flags(Flags::LESS);
        assert_eq!(run(&mut m, Op::Je, vec![Operand::Imm(8)]), Ok(Flow::Next));
        assert_eq!(run(&mut m, Op::Jl, vec![Operand::Imm(0xFFFC)]), Ok(Flow::Jump(0x0C)));
    }

    #[test]
    fn call_pushes_the_following_address() {
        let mut m = machine();
        m.set_reg(Reg::R(3), 0x30).unwrap();
        assert_eq!(run(&mut m, Op::Call, vec![Operand::Reg(Reg::R(3))]), Ok(Flow::Jump(0x30)));
        assert_eq!(m.regs.sp(), 62);
        assert_eq!(run(&mut m, Op::Ret, vec![]), Ok(Flow::Jump(0x12)));
    }
}
