use crate::cpu::Trap;
use crate::decoder::{Decoded, Operand};
use crate::instructions::{AluOp, Cond};
use crate::isa::accumulator::Op;
use crate::machine::Machine;
use crate::ports::Destination;
use crate::registers::{Flags, Reg};

use super::{arg, branch_if, call, immediate, relative, Executor, Flow};

pub struct AccumulatorExecutor;

/// Implicit operand: the word at `[IR]`.
const AT_IR: Operand = Operand::Mem(Reg::Ir);

fn source<'a>(d: &'a Decoded<Op>) -> &'a Operand {
    d.operands.first().unwrap_or(&AT_IR)
}

/// `ACC = ACC op source`.
fn combine(m: &mut Machine, op: AluOp, d: &Decoded<Op>, acc: u16, ip: u16) -> Result<(), Trap> {
    let s = m.get(source(d))?;
    m.set_reg(Reg::Acc, m.alu(op, acc, s, ip)?)
}

fn branch(m: &Machine, cond: Cond, d: &Decoded<Op>, ip: u16) -> Result<Flow, Trap> {
    let disp = immediate(arg(&d.operands, 0, ip)?, ip)?;
    Ok(branch_if(m, cond, relative(ip, disp)))
}

impl Executor for AccumulatorExecutor {
    type Op = Op;

    fn exec(&self, m: &mut Machine, ip: u16, d: &Decoded<Op>) -> Result<Flow, Trap> {
        let acc = m.reg(Reg::Acc)?;

        match d.op {
            Op::Nop => {}
            Op::Mov | Op::Load => {
                let v = m.get(source(d))?;
                m.set_reg(Reg::Acc, v)?;
            }
            Op::Store => match d.operands.first() {
                Some(Operand::Imm(v)) => m.set(&AT_IR, *v, ip)?,
                Some(mem) => m.set(mem, acc, ip)?,
                None => m.set(&AT_IR, acc, ip)?,
            },
            Op::LoadF => m.set_reg(Reg::Acc, m.flags().bits())?,
            Op::StoreF => m.set_flags(Flags::from_bits_retain(acc)),
            Op::LoadI => m.set_reg(Reg::Acc, m.reg(Reg::Ir)?)?,
            Op::StoreI => m.set_reg(Reg::Ir, acc)?,
            Op::Push => m.push(acc)?,
            Op::PushF => m.push(m.flags().bits())?,
            Op::PushI => m.push(m.reg(Reg::Ir)?)?,
            Op::Pop => {
                let v = m.pop()?;
                m.set_reg(Reg::Acc, v)?;
            }
            Op::PopF => {
                let v = m.pop()?;
                m.set_flags(Flags::from_bits_retain(v));
            }
            Op::PopI => {
                let v = m.pop()?;
                m.set_reg(Reg::Ir, v)?;
            }
            Op::Not => m.set_reg(Reg::Acc, !acc)?,
            Op::Lsh => m.set_reg(Reg::Acc, m.alu(AluOp::Lsh, acc, 1, ip)?)?,
            Op::Rsh => m.set_reg(Reg::Acc, m.alu(AluOp::Rsh, acc, 1, ip)?)?,
            Op::Inc => m.set_reg(Reg::Acc, acc.wrapping_add(1))?,
            Op::Dec => m.set_reg(Reg::Acc, acc.wrapping_sub(1))?,
            Op::Cmp => {
                let s = m.get(source(d))?;
                m.set_flags(Flags::compare_signed(acc, s));
            }
            Op::Test => {
                let s = m.get(source(d))?;
                m.set_flags(Flags::test(acc, s));
            }
            Op::Jmp | Op::Call => {
                let to = match d.operands.first() {
                    Some(Operand::Imm(disp)) => relative(ip, *disp),
                    _ => Flow::Jump(acc),
                };
                if d.op == Op::Call {
                    return call(m, ip, d.width, to);
                }
                return Ok(to);
            }
            Op::Ret => return Ok(Flow::Jump(m.pop()?)),
            Op::Out => {
                let port = immediate(arg(&d.operands, 0, ip)?, ip)?;
                m.ports.port_mut(port).write(acc);
            }
            Op::In => {
                let port = immediate(arg(&d.operands, 0, ip)?, ip)?;
                return Ok(Flow::Input { port, dest: Destination::Register(Reg::Acc), count: 1 });
            }
            Op::Add => combine(m, AluOp::Add, d, acc, ip)?,
            Op::Sub => combine(m, AluOp::Sub, d, acc, ip)?,
            Op::Mul => combine(m, AluOp::Mul, d, acc, ip)?,
            Op::Div => combine(m, AluOp::Div, d, acc, ip)?,
            Op::And => combine(m, AluOp::And, d, acc, ip)?,
            Op::Or => combine(m, AluOp::Or, d, acc, ip)?,
            Op::Xor => combine(m, AluOp::Xor, d, acc, ip)?,
            Op::Je => return branch(m, Cond::Eq, d, ip),
            Op::Jne => return branch(m, Cond::Ne, d, ip),
            Op::Jg => return branch(m, Cond::Gt, d, ip),
            Op::Jge => return branch(m, Cond::Ge, d, ip),
            Op::Jl => return branch(m, Cond::Lt, d, ip),
            Op::Jle => return branch(m, Cond::Le, d, ip),
        }
        Ok(Flow::Next)
    }
}
