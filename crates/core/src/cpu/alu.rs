//! Flag-producing arithmetic shared by the handlers.
//!
//! Every routine takes zero-extended operands and the operation width, and
//! returns the truncated result.

use super::Cpu;
use crate::instruction::{Mnemonic, Width};

/// Why a division could not produce a quotient
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct DivideOverflow;

impl Cpu {
    pub(super) fn alu_add(&mut self, a: u16, b: u16, carry_in: bool, width: Width) -> u16 {
        let mask = width.mask();
        let (a, b) = (a as u32 & mask, b as u32 & mask);
        let full = a + b + carry_in as u32;
        let result = full & mask;

        self.flags.carry = full > mask;
        self.flags.overflow = (a ^ result) & (b ^ result) & width.sign_bit() != 0;
        self.flags.adjust = (a ^ b ^ result) & 0x10 != 0;
        self.flags.set_szp(result, width);
        result as u16
    }

    pub(super) fn alu_sub(&mut self, a: u16, b: u16, borrow_in: bool, width: Width) -> u16 {
        let mask = width.mask();
        let (a, b) = (a as u32 & mask, b as u32 & mask);
        let subtrahend = b + borrow_in as u32;
        let result = a.wrapping_sub(subtrahend) & mask;

        self.flags.carry = subtrahend > a;
        self.flags.overflow = (a ^ b) & (a ^ result) & width.sign_bit() != 0;
        self.flags.adjust = (a ^ b ^ result) & 0x10 != 0;
        self.flags.set_szp(result, width);
        result as u16
    }

    /// and/or/xor/test: CF and OF cleared
    pub(super) fn alu_logic(&mut self, op: Mnemonic, a: u16, b: u16, width: Width) -> u16 {
        let result = match op {
            Mnemonic::Or => a | b,
            Mnemonic::Xor => a ^ b,
            _ => a & b,
        };
        let result = result as u32 & width.mask();

        self.flags.carry = false;
        self.flags.overflow = false;
        self.flags.adjust = false;
        self.flags.set_szp(result, width);
        result as u16
    }

    /// Rotates and shifts. The count is used as given; the 8086 does not mask it.
    pub(super) fn alu_shift(&mut self, op: Mnemonic, value: u16, count: u8, width: Width) -> u16 {
        if count == 0 {
            return value;
        }

        let mask = width.mask();
        let sign = width.sign_bit();
        let original = value as u32 & mask;
        let mut result = original;
        let mut carry = self.flags.carry;

        for _ in 0..count {
            match op {
                Mnemonic::Rol => {
                    carry = result & sign != 0;
                    result = ((result << 1) | carry as u32) & mask;
                }
                Mnemonic::Ror => {
                    carry = result & 1 != 0;
                    result = (result >> 1) | if carry { sign } else { 0 };
                }
                Mnemonic::Rcl => {
                    let out = result & sign != 0;
                    result = ((result << 1) | carry as u32) & mask;
                    carry = out;
                }
                Mnemonic::Rcr => {
                    let out = result & 1 != 0;
                    result = (result >> 1) | if carry { sign } else { 0 };
                    carry = out;
                }
                Mnemonic::Shl => {
                    carry = result & sign != 0;
                    result = (result << 1) & mask;
                }
                Mnemonic::Shr => {
                    carry = result & 1 != 0;
                    result >>= 1;
                }
                Mnemonic::Sar => {
                    carry = result & 1 != 0;
                    result = (result >> 1) | (result & sign);
                }
                _ => return value,
            }
        }

        let msb = result & sign != 0;
        self.flags.carry = carry;
        self.flags.overflow = match op {
            Mnemonic::Rol | Mnemonic::Rcl | Mnemonic::Shl => msb != carry,
            Mnemonic::Ror | Mnemonic::Rcr => msb != (result & (sign >> 1) != 0),
            Mnemonic::Shr => count == 1 && original & sign != 0,
            _ => false,
        };
        if matches!(op, Mnemonic::Shl | Mnemonic::Shr | Mnemonic::Sar) {
            self.flags.set_szp(result, width);
        }
        result as u16
    }

    /// mul/imul into AX or DX:AX; CF = OF = upper half significant
    pub(super) fn alu_multiply(&mut self, signed: bool, operand: u16, width: Width) {
        match width {
            Width::Byte => {
                let al = self.regs.ax & 0xFF;
                let (product, wide) = if signed {
                    let p = (al as u8 as i8 as i16) * (operand as u8 as i8 as i16);
                    (p as u16, p != p as i8 as i16)
                } else {
                    let p = al * (operand & 0xFF);
                    (p, p > 0xFF)
                };
                self.regs.ax = product;
                self.flags.carry = wide;
                self.flags.overflow = wide;
            }
            _ => {
                let (low, high, wide) = if signed {
                    let p = (self.regs.ax as i16 as i32) * (operand as i16 as i32);
                    (p as u16, (p >> 16) as u16, p != p as i16 as i32)
                } else {
                    let p = (self.regs.ax as u32) * (operand as u32);
                    (p as u16, (p >> 16) as u16, p > 0xFFFF)
                };
                self.regs.ax = low;
                self.regs.dx = high;
                self.flags.carry = wide;
                self.flags.overflow = wide;
            }
        }
    }

    /// div/idiv: AX by a byte (AL quotient, AH remainder) or DX:AX by a word
    /// (AX quotient, DX remainder)
    pub(super) fn alu_divide(
        &mut self,
        signed: bool,
        divisor: u16,
        width: Width,
    ) -> Result<(), DivideOverflow> {
        match width {
            Width::Byte => {
                let (quotient, remainder) = if signed {
                    let divisor = divisor as u8 as i8 as i32;
                    if divisor == 0 {
                        return Err(DivideOverflow);
                    }
                    let dividend = self.regs.ax as i16 as i32;
                    let q = dividend / divisor;
                    // The 8086 faults on the most negative quotient too
                    if q <= i8::MIN as i32 || q > i8::MAX as i32 {
                        return Err(DivideOverflow);
                    }
                    (q as u8, (dividend % divisor) as u8)
                } else {
                    let divisor = divisor & 0xFF;
                    if divisor == 0 {
                        return Err(DivideOverflow);
                    }
                    let q = self.regs.ax / divisor;
                    if q > 0xFF {
                        return Err(DivideOverflow);
                    }
                    (q as u8, (self.regs.ax % divisor) as u8)
                };
                self.regs.ax = ((remainder as u16) << 8) | quotient as u16;
            }
            _ => {
                let dividend = ((self.regs.dx as u32) << 16) | self.regs.ax as u32;
                let (quotient, remainder) = if signed {
                    let divisor = divisor as i16 as i64;
                    if divisor == 0 {
                        return Err(DivideOverflow);
                    }
                    let dividend = dividend as i32 as i64;
                    let q = dividend / divisor;
                    if q <= i16::MIN as i64 || q > i16::MAX as i64 {
                        return Err(DivideOverflow);
                    }
                    (q as u16, (dividend % divisor) as u16)
                } else {
                    let divisor = divisor as u32;
                    if divisor == 0 {
                        return Err(DivideOverflow);
                    }
                    let q = dividend / divisor;
                    if q > 0xFFFF {
                        return Err(DivideOverflow);
                    }
                    (q as u16, (dividend % divisor) as u16)
                };
                self.regs.ax = quotient;
                self.regs.dx = remainder;
            }
        }
        Ok(())
    }

    fn al(&self) -> u8 {
        (self.regs.ax & 0xFF) as u8
    }

    fn set_al(&mut self, value: u8) {
        self.regs.ax = (self.regs.ax & 0xFF00) | value as u16;
    }

    pub(super) fn alu_daa(&mut self) {
        let old_al = self.al();
        let old_carry = self.flags.carry;
        let mut al = old_al;

        if al & 0x0F > 9 || self.flags.adjust {
            let (sum, carried) = al.overflowing_add(6);
            al = sum;
            self.flags.carry = old_carry || carried;
            self.flags.adjust = true;
        } else {
            self.flags.adjust = false;
        }
        if old_al > 0x99 || old_carry {
            al = al.wrapping_add(0x60);
            self.flags.carry = true;
        } else {
            self.flags.carry = false;
        }

        self.set_al(al);
        self.flags.set_szp(al as u32, Width::Byte);
    }

    pub(super) fn alu_das(&mut self) {
        let old_al = self.al();
        let old_carry = self.flags.carry;
        let mut al = old_al;
        self.flags.carry = false;

        if al & 0x0F > 9 || self.flags.adjust {
            let (diff, borrowed) = al.overflowing_sub(6);
            al = diff;
            self.flags.carry = old_carry || borrowed;
            self.flags.adjust = true;
        } else {
            self.flags.adjust = false;
        }
        if old_al > 0x99 || old_carry {
            al = al.wrapping_sub(0x60);
            self.flags.carry = true;
        }

        self.set_al(al);
        self.flags.set_szp(al as u32, Width::Byte);
    }

    /// aaa (`subtract == false`) and aas
    pub(super) fn alu_ascii_adjust(&mut self, subtract: bool) {
        let mut al = self.al();
        let mut ah = (self.regs.ax >> 8) as u8;
        let adjust = al & 0x0F > 9 || self.flags.adjust;

        if adjust {
            if subtract {
                al = al.wrapping_sub(6);
                ah = ah.wrapping_sub(1);
            } else {
                al = al.wrapping_add(6);
                ah = ah.wrapping_add(1);
            }
        }
        self.flags.adjust = adjust;
        self.flags.carry = adjust;
        self.regs.ax = ((ah as u16) << 8) | (al & 0x0F) as u16;
    }

    pub(super) fn alu_aam(&mut self, base: u8) -> Result<(), DivideOverflow> {
        if base == 0 {
            return Err(DivideOverflow);
        }
        let al = self.al();
        let (high, low) = (al / base, al % base);
        self.regs.ax = ((high as u16) << 8) | low as u16;
        self.flags.set_szp(low as u32, Width::Byte);
        Ok(())
    }

    pub(super) fn alu_aad(&mut self, base: u8) {
        let ah = (self.regs.ax >> 8) as u8;
        let al = self.al().wrapping_add(ah.wrapping_mul(base));
        self.regs.ax = al as u16;
        self.flags.set_szp(al as u32, Width::Byte);
    }
}
