use crate::cpu::Trap;
use crate::decoder::{Decoded, Operand};
use crate::instructions::{AluOp, Cond};
use crate::isa::cisc::Op;
use crate::machine::Machine;
use crate::ports::Destination;
use crate::registers::{Flags, Reg};

use super::{arg, branch_if, call, immediate, target, Executor, Flow};

/// Words in a vector operand.
pub const LANES: usize = 4;

pub struct CiscExecutor;

fn location(m: &Machine, operand: &Operand, ip: u16) -> Result<Destination, Trap> {
    m.locate(operand)?.ok_or(Trap::ImmediateDestination { ip })
}

/// The four consecutive registers or memory words named by a vector operand.
fn lanes(m: &Machine, operand: &Operand, ip: u16) -> Result<[Destination; LANES], Trap> {
    let first = location(m, operand, ip)?;
    let mut out = [first; LANES];
    for i in 1..LANES {
        out[i] = out[i - 1].next();
    }
    Ok(out)
}

fn read_lanes(m: &mut Machine, locs: &[Destination; LANES]) -> Result<[u16; LANES], Trap> {
    let mut vals = [0u16; LANES];
    for (v, loc) in vals.iter_mut().zip(locs) {
        *v = m.load(*loc)?;
    }
    Ok(vals)
}

fn write_lanes(m: &mut Machine, locs: &[Destination; LANES], vals: &[u16; LANES]) -> Result<(), Trap> {
    for (loc, v) in locs.iter().zip(vals) {
        m.store(*loc, *v)?;
    }
    Ok(())
}

fn bank() -> [Destination; LANES] {
    [0, 1, 2, 3].map(|n| Destination::Register(Reg::R(n)))
}

/// `dst = dst op src`.
fn scalar(m: &mut Machine, op: AluOp, ops: &[Operand], ip: u16) -> Result<(), Trap> {
    let dst = arg(ops, 0, ip)?;
    let a = m.get(dst)?;
    let b = m.get(arg(ops, 1, ip)?)?;
    let v = m.alu(op, a, b, ip)?;
    m.set(dst, v, ip)
}

/// Lane-wise `dst = dst op src` over four words.
fn vector(m: &mut Machine, op: AluOp, ops: &[Operand], ip: u16) -> Result<(), Trap> {
    let dst = lanes(m, arg(ops, 0, ip)?, ip)?;
    let src = lanes(m, arg(ops, 1, ip)?, ip)?;
    let a = read_lanes(m, &dst)?;
    let b = read_lanes(m, &src)?;
    let mut out = [0u16; LANES];
    for i in 0..LANES {
        out[i] = m.alu(op, a[i], b[i], ip)?;
    }
    write_lanes(m, &dst, &out)
}

fn branch(m: &Machine, cond: Cond, ops: &[Operand], ip: u16) -> Result<Flow, Trap> {
    let to = target(m, ip, arg(ops, 0, ip)?)?;
    Ok(branch_if(m, cond, to))
}

impl Executor for CiscExecutor {
    type Op = Op;

    fn exec(&self, m: &mut Machine, ip: u16, d: &Decoded<Op>) -> Result<Flow, Trap> {
        let ops = &d.operands;

        match d.op {
            Op::Nop => {}
            Op::Mov => {
                let v = m.get(arg(ops, 1, ip)?)?;
                m.set(arg(ops, 0, ip)?, v, ip)?;
            }
            Op::Push => {
                let v = m.get(arg(ops, 0, ip)?)?;
                m.push(v)?;
            }
            Op::Pop => {
                let v = m.pop()?;
                m.set(arg(ops, 0, ip)?, v, ip)?;
            }
            Op::PushF => m.push(m.flags().bits())?,
            Op::PopF => {
                let v = m.pop()?;
                m.set_flags(Flags::from_bits_retain(v));
            }
            Op::Enter => {
                let n = immediate(arg(ops, 0, ip)?, ip)?;
                m.push(m.reg(Reg::Bp)?)?;
                let sp = m.regs.sp();
                m.set_reg(Reg::Bp, sp)?;
                m.regs.set_sp(sp.wrapping_sub(n));
            }
            Op::Leave => {
                let frame = m.reg(Reg::Bp)?;
                m.regs.set_sp(frame);
                let bp = m.pop()?;
                m.set_reg(Reg::Bp, bp)?;
            }
            Op::Not | Op::Inc | Op::Dec => {
                let dst = arg(ops, 0, ip)?;
                let v = m.get(dst)?;
                let v = match d.op {
                    Op::Not => !v,
                    Op::Inc => v.wrapping_add(1),
                    _ => v.wrapping_sub(1),
                };
                m.set(dst, v, ip)?;
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
            Op::In | Op::In4 => {
                let dest = location(m, arg(ops, 0, ip)?, ip)?;
                let count = if d.op == Op::In4 { LANES as u8 } else { 1 };
                // Fail now rather than after the values arrive.
                if let Destination::Register(Reg::R(n)) = dest {
                    m.reg(Reg::R(n + count - 1))?;
                }
                let port = immediate(arg(ops, 1, ip)?, ip)?;
                return Ok(Flow::Input { port, dest, count });
            }
            Op::Out => {
                let port = immediate(arg(ops, 0, ip)?, ip)?;
                let v = m.get(arg(ops, 1, ip)?)?;
                m.ports.port_mut(port).write(v);
            }
            Op::Out4 => {
                let port = immediate(arg(ops, 0, ip)?, ip)?;
                let locs = lanes(m, arg(ops, 1, ip)?, ip)?;
                for v in read_lanes(m, &locs)? {
                    m.ports.port_mut(port).write(v);
                }
            }
            Op::Load4 => {
                let locs = lanes(m, arg(ops, 0, ip)?, ip)?;
                let vals = read_lanes(m, &locs)?;
                write_lanes(m, &bank(), &vals)?;
            }
            Op::Store4 => {
                let locs = lanes(m, arg(ops, 0, ip)?, ip)?;
                let vals = read_lanes(m, &bank())?;
                write_lanes(m, &locs, &vals)?;
            }
            Op::Add => scalar(m, AluOp::Add, ops, ip)?,
            Op::Sub => scalar(m, AluOp::Sub, ops, ip)?,
            Op::Mul => scalar(m, AluOp::Mul, ops, ip)?,
            Op::Div => scalar(m, AluOp::Div, ops, ip)?,
            Op::And => scalar(m, AluOp::And, ops, ip)?,
            Op::Or => scalar(m, AluOp::Or, ops, ip)?,
            Op::Xor => scalar(m, AluOp::Xor, ops, ip)?,
            Op::Lsh => scalar(m, AluOp::Lsh, ops, ip)?,
            Op::Rsh => scalar(m, AluOp::Rsh, ops, ip)?,
            Op::Add4 => vector(m, AluOp::Add, ops, ip)?,
            Op::Sub4 => vector(m, AluOp::Sub, ops, ip)?,
            Op::Mul4 => vector(m, AluOp::Mul, ops, ip)?,
            Op::Div4 => vector(m, AluOp::Div, ops, ip)?,
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
    use crate::isa::cisc::width;
    use crate::isa::Isa;
    use crate::memory::{MemoryArchitecture, MemoryModel};
    use crate::ports::PortBank;
    use crate::registers::{RegisterProfile, Registers};

    fn machine() -> Machine {
        let mut regs = Registers::new(Isa::Cisc, RegisterProfile::Extended);
        regs.set_sp(128);
        regs.set(Reg::Bp, 128);
        Machine {
            regs,
            memory: MemoryModel::new(MemoryArchitecture::Neumann, 128),
            ports: PortBank::default(),
        }
    }

    fn run(m: &mut Machine, op: Op, operands: Vec<Operand>) -> Result<Flow, Trap> {
        let kinds: Vec<_> = operands.iter().map(Operand::kind).collect();
        let width = width(&kinds);
        CiscExecutor.exec(m, 0x20, &Decoded { op, operands, width })
    }

    fn r(n: u8) -> Operand {
        Operand::Reg(Reg::R(n))
    }

    #[test]
    fn enter_and_leave_restore_the_frame() {
        let mut m = machine();
        run(&mut m, Op::Enter, vec![Operand::Imm(6)]).unwrap();
        assert_eq!(m.reg(Reg::Bp).unwrap(), 126);
        assert_eq!(m.regs.sp(), 120);
        run(&mut m, Op::Leave, vec![]).unwrap();
        assert_eq!(m.reg(Reg::Bp).unwrap(), 128);
        assert_eq!(m.regs.sp(), 128);
    }

    #[test]
    fn memory_destination_arithmetic() {
        let mut m = machine();
        m.set_reg(Reg::R(1), 40).unwrap();
        m.write_word(42, 5).unwrap();
        let slot = Operand::Indexed { base: Reg::R(1), disp: 2 };
        run(&mut m, Op::Sub, vec![slot, Operand::Imm(7)]).unwrap();
        assert_eq!(m.read_word(42).unwrap(), 0xFFFE);
    }

    #[test]
    fn vector_add_spans_four_registers() {
        let mut m = machine();
        for n in 0..8 {
            m.set_reg(Reg::R(n), n as u16 + 1).unwrap();
        }
        run(&mut m, Op::Add4, vec![r(0), r(4)]).unwrap();
        let sums: Vec<u16> = (0..4).map(|n| m.reg(Reg::R(n)).unwrap()).collect();
        assert_eq!(sums, [6, 8, 10, 12]);
    }

    #[test]
    fn vector_divide_by_zero_leaves_destination_untouched() {
        let mut m = machine();
        for n in 0..4 {
            m.set_reg(Reg::R(n), 10).unwrap();
            m.set_reg(Reg::R(n + 4), 2).unwrap();
        }
        m.set_reg(Reg::R(7), 0).unwrap();
        assert_eq!(run(&mut m, Op::Div4, vec![r(0), r(4)]), Err(Trap::DivisionByZero { ip: 0x20 }));
        assert_eq!(m.reg(Reg::R(0)).unwrap(), 10);
    }

    #[test]
    fn vector_register_past_the_profile_is_missing() {
        let mut m = machine();
        assert_eq!(run(&mut m, Op::Add4, vec![r(6), r(0)]), Err(Trap::MissingRegister(Reg::R(8))));
    }

    #[test]
    fn load4_and_store4_move_the_low_bank() {
        let mut m = machine();
        for (i, v) in [0x48u16, 0x69, 0x21, 0x0A].iter().enumerate() {
            m.write_word(64 + 2 * i as u16, *v).unwrap();
        }
        m.set_reg(Reg::R(5), 64).unwrap();
        run(&mut m, Op::Load4, vec![Operand::Mem(Reg::R(5))]).unwrap();
        assert_eq!(m.reg(Reg::R(3)).unwrap(), 0x0A);
        run(&mut m, Op::Store4, vec![Operand::Indexed { base: Reg::R(5), disp: 16 }]).unwrap();
        assert_eq!(m.read_word(80).unwrap(), 0x48);
        assert_eq!(m.read_word(86).unwrap(), 0x0A);
        run(&mut m, Op::Out4, vec![Operand::Imm(2), Operand::Mem(Reg::R(5))]).unwrap();
        assert_eq!(m.ports.render("2").trim_start(), "Hi!\n");
    }

    #[test]
    fn register_relative_jump_does_not_read_memory() {
        let mut m = machine();
        m.set_reg(Reg::R(2), 0x40).unwrap();
        let to = Operand::Indexed { base: Reg::R(2), disp: 4 };
        assert_eq!(run(&mut m, Op::Jmp, vec![to]), Ok(Flow::Jump(0x44)));
        m.set_flags(Flags::EQUAL | Flags::ZERO);
        assert_eq!(run(&mut m, Op::Jne, vec![Operand::Imm(8)]), Ok(Flow::Next));
        assert_eq!(run(&mut m, Op::Je, vec![Operand::Imm(0xFFF0)]), Ok(Flow::Jump(0x10)));
    }
}
