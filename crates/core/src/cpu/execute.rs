//! Per-class instruction handlers.
//!
//! `execute` matches on every [`Mnemonic`]; adding a class to the enum is a
//! compile error here until it is handled or listed as unimplemented.

use super::{Cpu, ExecError, StepOutcome};
use crate::instruction::{Instruction, Mnemonic, Operand, Register, Register16, RepeatMode, Width};
use crate::logging::{log, LogCategory, LogLevel};

impl Cpu {
    /// Run the handler for `ins`. IP already points past the instruction;
    /// `address` is where it was fetched from.
    pub(super) fn execute(
        &mut self,
        ins: &Instruction,
        address: u32,
    ) -> Result<StepOutcome, ExecError> {
        use Mnemonic::*;

        let dest = ins.dest();
        let src = ins.src();
        let width = ins.width();

        match ins.mnemonic {
            // Arithmetic
            Add | Adc => {
                let carry = ins.mnemonic == Adc && self.flags.carry;
                let result =
                    self.alu_add(self.read_operand(dest), self.read_operand(src), carry, width);
                self.write_operand(dest, result);
            }
            Sub | Sbb | Cmp => {
                let borrow = ins.mnemonic == Sbb && self.flags.carry;
                let result =
                    self.alu_sub(self.read_operand(dest), self.read_operand(src), borrow, width);
                if ins.mnemonic != Cmp {
                    self.write_operand(dest, result);
                }
            }
            Inc | Dec => {
                let carry = self.flags.carry;
                let value = self.read_operand(dest);
                let result = if ins.mnemonic == Inc {
                    self.alu_add(value, 1, false, width)
                } else {
                    self.alu_sub(value, 1, false, width)
                };
                self.flags.carry = carry;
                self.write_operand(dest, result);
            }
            Neg => {
                let value = self.read_operand(dest);
                let result = self.alu_sub(0, value, false, width);
                self.write_operand(dest, result);
            }
            Mul | Imul => {
                let operand = self.read_operand(dest);
                self.alu_multiply(ins.mnemonic == Imul, operand, width);
            }
            Div | Idiv => {
                let divisor = self.read_operand(dest);
                if self.alu_divide(ins.mnemonic == Idiv, divisor, width).is_err() {
                    return Err(self.divide_error(address));
                }
            }
            Daa => self.alu_daa(),
            Das => self.alu_das(),
            Aaa => self.alu_ascii_adjust(false),
            Aas => self.alu_ascii_adjust(true),
            Aam => {
                let base = self.read_operand(dest) as u8;
                if self.alu_aam(base).is_err() {
                    return Err(self.divide_error(address));
                }
            }
            Aad => {
                let base = self.read_operand(dest) as u8;
                self.alu_aad(base);
            }
            Cbw => self.regs.ax = (self.regs.ax as u8 as i8 as i16) as u16,
            Cwd => self.regs.dx = if self.regs.ax & 0x8000 != 0 { 0xFFFF } else { 0 },

            // Logic
            And | Or | Xor | Test => {
                let result =
                    self.alu_logic(ins.mnemonic, self.read_operand(dest), self.read_operand(src), width);
                if ins.mnemonic != Test {
                    self.write_operand(dest, result);
                }
            }
            Not => {
                let value = self.read_operand(dest);
                self.write_operand(dest, !value);
            }
            Rol | Ror | Rcl | Rcr | Shl | Shr | Sar => {
                let count = self.read_operand(src) as u8;
                let value = self.read_operand(dest);
                let result = self.alu_shift(ins.mnemonic, value, count, dest.width());
                self.write_operand(dest, result);
            }

            // Data movement
            Mov => {
                let value = self.read_operand(src);
                self.write_operand(dest, value);
            }
            Xchg => {
                let a = self.read_operand(dest);
                let b = self.read_operand(src);
                self.write_operand(dest, b);
                self.write_operand(src, a);
            }
            Lea => {
                if let Some((_, offset)) = self.effective_address(src) {
                    self.write_operand(dest, offset);
                }
            }
            Lds | Les => {
                if let Some((segment, offset)) = self.far_target(src) {
                    self.write_operand(dest, offset);
                    if ins.mnemonic == Lds {
                        self.regs.ds = segment;
                    } else {
                        self.regs.es = segment;
                    }
                }
            }
            Push | Pushf => {
                let value = match *dest {
                    // The 8086 pushes the already-decremented stack pointer
                    Operand::Register(Register::Word(Register16::SP)) => self.regs.sp.wrapping_sub(2),
                    _ => self.read_operand(dest),
                };
                self.push(value);
            }
            Pop | Popf => {
                let value = self.pop();
                self.write_operand(dest, value);
            }
            Lahf => {
                let low = self.flags.pack() & 0x00FF;
                self.regs.ax = (self.regs.ax & 0x00FF) | (low << 8);
            }
            Sahf => self.flags.set_low_byte((self.regs.ax >> 8) as u8),
            Xlat => {
                let offset = self.regs.bx.wrapping_add(self.regs.ax & 0x00FF);
                let value = self.read_byte(self.data_segment(ins), offset);
                self.regs.ax = (self.regs.ax & 0xFF00) | value as u16;
            }
            In => {
                let port = self.read_operand(src);
                let value = match dest.width() {
                    Width::Byte => self.ports.in_byte(port) as u16,
                    _ => self.ports.in_word(port),
                };
                self.write_operand(dest, value);
            }
            Out => {
                let port = self.read_operand(dest);
                let value = self.read_operand(src);
                match src.width() {
                    Width::Byte => self.ports.out_byte(port, value as u8),
                    _ => self.ports.out_word(port, value),
                }
            }

            // Control transfer
            Jmp => self.jump(dest),
            Call => {
                let target = self.near_target(dest);
                self.push(self.regs.ip);
                self.regs.ip = target;
            }
            JmpFar => {
                if let Some((segment, offset)) = self.far_target(dest) {
                    self.regs.cs = segment;
                    self.regs.ip = offset;
                }
            }
            CallFar => {
                if let Some((segment, offset)) = self.far_target(dest) {
                    self.push(self.regs.cs);
                    self.push(self.regs.ip);
                    self.regs.cs = segment;
                    self.regs.ip = offset;
                }
            }
            Ret => {
                self.regs.ip = self.pop();
                self.regs.sp = self.regs.sp.wrapping_add(self.read_operand(dest));
            }
            RetFar => {
                self.regs.ip = self.pop();
                self.regs.cs = self.pop();
                self.regs.sp = self.regs.sp.wrapping_add(self.read_operand(dest));
            }
            Jo | Jno | Jb | Jnb | Jz | Jnz | Jbe | Ja | Js | Jns | Jp | Jnp | Jl | Jge | Jle | Jg => {
                if self.flags.condition(ins.mnemonic) == Some(true) {
                    self.jump(dest);
                }
            }
            Loop | Loope | Loopne => {
                self.regs.cx = self.regs.cx.wrapping_sub(1);
                let taken = self.regs.cx != 0
                    && match ins.mnemonic {
                        Loope => self.flags.zero,
                        Loopne => !self.flags.zero,
                        _ => true,
                    };
                if taken {
                    self.jump(dest);
                }
            }
            Jcxz => {
                if self.regs.cx == 0 {
                    self.jump(dest);
                }
            }
            Int => self.interrupt(self.read_operand(dest) as u8),
            Int3 => self.interrupt(3),
            Into => {
                if self.flags.overflow {
                    self.interrupt(4);
                }
            }
            Iret => {
                self.regs.ip = self.pop();
                self.regs.cs = self.pop();
                let flags = self.pop();
                self.write_operand(&Operand::Flags, flags);
            }

            // Strings
            Movsb | Movsw | Cmpsb | Cmpsw | Stosb | Stosw | Lodsb | Lodsw | Scasb | Scasw => {
                self.string(ins);
            }

            // Flags
            Clc => self.flags.carry = false,
            Stc => self.flags.carry = true,
            Cmc => self.flags.carry = !self.flags.carry,
            Cli => self.flags.interrupt = false,
            Sti => self.flags.interrupt = true,
            Cld => self.flags.direction = false,
            Std => self.flags.direction = true,

            // Processor control
            Hlt => {
                self.halted = true;
                return Ok(StepOutcome::Halted);
            }
            Nop | Wait | Lock => {}

            Esc | Prefix | Group | Invalid => {
                log(LogCategory::Stubs, LogLevel::Warn, || {
                    format!("unimplemented '{}' at {:05X}", ins.mnemonic, address)
                });
                return Err(ExecError::Unimplemented {
                    mnemonic: ins.mnemonic,
                    address,
                });
            }
        }

        Ok(StepOutcome::Continued)
    }

    fn divide_error(&self, address: u32) -> ExecError {
        log(LogCategory::Cpu, LogLevel::Warn, || {
            format!("divide error at {:05X}", address)
        });
        ExecError::DivideError { address }
    }

    /// Target IP of a near branch: relative to the current IP, or absolute
    /// from a register/memory operand
    fn near_target(&self, operand: &Operand) -> u16 {
        match operand {
            Operand::Relative(rel) => self.regs.ip.wrapping_add(rel.value()),
            _ => self.read_operand(operand),
        }
    }

    fn jump(&mut self, operand: &Operand) {
        self.regs.ip = self.near_target(operand);
    }

    /// One iteration of a string instruction, or one repeat round.
    ///
    /// A repeated instruction performs a single iteration per step and
    /// rewinds IP onto itself while it should go on, so every iteration is a
    /// separate fetch and an interrupt-free run loop sees CX count down.
    fn string(&mut self, ins: &Instruction) {
        let compares = ins.mnemonic.is_compare_string();

        if ins.repeat == RepeatMode::None {
            self.string_iteration(ins, compares);
            return;
        }

        if self.regs.cx == 0 {
            return;
        }
        self.string_iteration(ins, compares);
        self.regs.cx = self.regs.cx.wrapping_sub(1);

        let again = self.regs.cx != 0
            && (!compares
                || match ins.repeat {
                    RepeatMode::RepeatNotEqual => !self.flags.zero,
                    _ => self.flags.zero,
                });
        if again {
            self.regs.ip = self.regs.ip.wrapping_sub(ins.len() as u16);
        }
    }

    fn string_iteration(&mut self, ins: &Instruction, compares: bool) {
        let dest = ins.dest();
        let src = ins.src();
        let width = ins.width();

        if compares {
            self.alu_sub(self.read_operand(dest), self.read_operand(src), false, width);
        } else {
            let value = self.read_operand(src);
            self.write_operand(dest, value);
        }

        let step = width.bytes();
        let delta = if self.flags.direction {
            step.wrapping_neg()
        } else {
            step
        };
        for operand in [dest, src] {
            match operand {
                Operand::StringSource { .. } => self.regs.si = self.regs.si.wrapping_add(delta),
                Operand::StringDestination { .. } => {
                    self.regs.di = self.regs.di.wrapping_add(delta)
                }
                _ => {}
            }
        }
    }
}
