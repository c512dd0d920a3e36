use crate::cpu::Trap;
use crate::decoder::{Decoded, Operand};
use crate::instructions::{AluOp, Cond};
use crate::isa::stack::Op;
use crate::machine::Machine;
use crate::ports::Destination;
use crate::registers::Flags;

use super::{arg, branch_if, call, immediate, relative, Executor, Flow};

pub struct StackExecutor;

/// `a op b` where `b` is on top of the operand stack.
fn binary(m: &mut Machine, op: AluOp, ip: u16) -> Result<(), Trap> {
    let b = m.pop_operand()?;
    let a = m.pop_operand()?;
    m.push_operand(m.alu(op, a, b, ip)?)
}

fn branch(m: &Machine, cond: Cond, ip: u16, disp: Option<u16>) -> Result<Flow, Trap> {
    let disp = disp.ok_or(Trap::MissingOperand { ip })?;
    Ok(branch_if(m, cond, relative(ip, disp)))
}

/// Absolute target popped from the operand stack, or a displacement.
fn jump_target(m: &mut Machine, ip: u16, operands: &[Operand]) -> Result<Flow, Trap> {
    match operands.first() {
        Some(Operand::Imm(disp)) => Ok(relative(ip, *disp)),
        _ => Ok(Flow::Jump(m.pop_operand()?)),
    }
}

impl Executor for StackExecutor {
    type Op = Op;

    fn exec(&self, m: &mut Machine, ip: u16, d: &Decoded<Op>) -> Result<Flow, Trap> {
        let imm = d.operands.first().and_then(|o| match o {
            Operand::Imm(v) => Some(*v),
            _ => None,
        });

        match d.op {
            Op::Nop => {}
            Op::Mov => m.push_operand(imm.ok_or(Trap::MissingOperand { ip })?)?,
            Op::Load => {
                let addr = match imm {
                    Some(addr) => addr,
                    None => m.pop_operand()?,
                };
                let v = m.read_word(addr)?;
                m.push_operand(v)?;
            }
            Op::Store => {
                let v = match imm {
                    Some(v) => v,
                    None => m.pop_operand()?,
                };
                let addr = m.pop_operand()?;
                m.write_word(addr, v)?;
            }
            Op::LoadF => m.push_operand(m.flags().bits())?,
            Op::StoreF => {
                let v = m.pop_operand()?;
                m.set_flags(Flags::from_bits_retain(v));
            }
            Op::Push => {
                let v = m.pop_operand()?;
                m.push(v)?;
            }
            Op::Pop => {
                let v = m.pop()?;
                m.push_operand(v)?;
            }
            Op::PushF => m.push(m.flags().bits())?,
            Op::PopF => {
                let v = m.pop()?;
                m.set_flags(Flags::from_bits_retain(v));
            }
            Op::Swap => {
                let b = m.pop_operand()?;
                let a = m.pop_operand()?;
                m.push_operand(b)?;
                m.push_operand(a)?;
            }
            Op::Dup => {
                let a = m.pop_operand()?;
                m.push_operand(a)?;
                m.push_operand(a)?;
            }
            Op::Dup2 => {
                let b = m.pop_operand()?;
                let a = m.pop_operand()?;
                for v in [a, b, a, b] {
                    m.push_operand(v)?;
                }
            }
            Op::Drop => {
                m.pop_operand()?;
            }
            Op::Not => {
                let a = m.pop_operand()?;
                m.push_operand(!a)?;
            }
            Op::Lsh | Op::Rsh => {
                let a = m.pop_operand()?;
                let shift = if d.op == Op::Lsh { AluOp::Lsh } else { AluOp::Rsh };
                m.push_operand(m.alu(shift, a, 1, ip)?)?;
            }
            Op::Cmp | Op::Test => {
                let b = m.pop_operand()?;
                let a = m.pop_operand()?;
                let f = if d.op == Op::Cmp { Flags::compare_signed(a, b) } else { Flags::test(a, b) };
                m.set_flags(f);
            }
            Op::CmpE | Op::CmpB | Op::CmpA => {
                let b = m.pop_operand()?;
                let a = m.pop_operand()?;
                let holds = match d.op {
                    Op::CmpE => a == b,
                    Op::CmpB => a < b,
                    _ => a > b,
                };
                m.push_operand(if holds { 0xFFFF } else { 0 })?;
                m.set_flags(Flags::compare_unsigned(a, b));
            }
            Op::Jmp => return jump_target(m, ip, &d.operands),
            Op::Call => {
                let to = jump_target(m, ip, &d.operands)?;
                return call(m, ip, d.width, to);
            }
            Op::Ret => return Ok(Flow::Jump(m.pop()?)),
            Op::Out => {
                let port = immediate(arg(&d.operands, 0, ip)?, ip)?;
                let v = m.pop_operand()?;
                m.ports.port_mut(port).write(v);
            }
            Op::In => {
                let port = immediate(arg(&d.operands, 0, ip)?, ip)?;
                return Ok(Flow::Input { port, dest: Destination::OperandStack, count: 1 });
            }
            Op::Add => binary(m, AluOp::Add, ip)?,
            Op::Sub => binary(m, AluOp::Sub, ip)?,
            Op::Mul => binary(m, AluOp::Mul, ip)?,
            Op::Div => binary(m, AluOp::Div, ip)?,
            Op::And => binary(m, AluOp::And, ip)?,
            Op::Or => binary(m, AluOp::Or, ip)?,
            Op::Xor => binary(m, AluOp::Xor, ip)?,
            Op::Je => return branch(m, Cond::Eq, ip, imm),
            Op::Jne => return branch(m, Cond::Ne, ip, imm),
            Op::Jg => return branch(m, Cond::Gt, ip, imm),
            Op::Jge => return branch(m, Cond::Ge, ip, imm),
            Op::Jl => return branch(m, Cond::Lt, ip, imm),
            Op::Jle => return branch(m, Cond::Le, ip, imm),
        }
        Ok(Flow::Next)
    }
}
