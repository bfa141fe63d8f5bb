//! Register file.
//!
//! The byte registers are views into the first four word registers:
//! `AL..BL` are the low halves of `AX..BX`, `AH..BH` the high halves.

use serde::{Deserialize, Serialize};

use crate::instruction::{Register16, Register8, SegmentRegister};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Registers {
    pub ax: u16,
    pub cx: u16,
    pub dx: u16,
    pub bx: u16,
    pub sp: u16,
    pub bp: u16,
    pub si: u16,
    pub di: u16,

    pub es: u16,
    pub cs: u16,
    pub ss: u16,
    pub ds: u16,

    pub ip: u16,
}

impl Registers {
    #[inline]
    pub fn word(&self, reg: Register16) -> u16 {
        match reg {
            Register16::AX => self.ax,
            Register16::CX => self.cx,
            Register16::DX => self.dx,
            Register16::BX => self.bx,
            Register16::SP => self.sp,
            Register16::BP => self.bp,
            Register16::SI => self.si,
            Register16::DI => self.di,
        }
    }

    #[inline]
    pub fn set_word(&mut self, reg: Register16, value: u16) {
        let slot = match reg {
            Register16::AX => &mut self.ax,
            Register16::CX => &mut self.cx,
            Register16::DX => &mut self.dx,
            Register16::BX => &mut self.bx,
            Register16::SP => &mut self.sp,
            Register16::BP => &mut self.bp,
            Register16::SI => &mut self.si,
            Register16::DI => &mut self.di,
        };
        *slot = value;
    }

    /// Byte register `k` lives in word register `k & 3`, high half when `k & 4`
    #[inline]
    fn alias(reg: Register8) -> (Register16, bool) {
        let index = reg.index();
        (Register16::from_index(index & 0x03), index & 0x04 != 0)
    }

    #[inline]
    pub fn byte(&self, reg: Register8) -> u8 {
        let (word, high) = Self::alias(reg);
        let value = self.word(word);
        if high {
            (value >> 8) as u8
        } else {
            (value & 0xFF) as u8
        }
    }

    #[inline]
    pub fn set_byte(&mut self, reg: Register8, value: u8) {
        let (word, high) = Self::alias(reg);
        let old = self.word(word);
        let new = if high {
            (old & 0x00FF) | ((value as u16) << 8)
        } else {
            (old & 0xFF00) | value as u16
        };
        self.set_word(word, new);
    }

    #[inline]
    pub fn segment(&self, seg: SegmentRegister) -> u16 {
        match seg {
            SegmentRegister::ES => self.es,
            SegmentRegister::CS => self.cs,
            SegmentRegister::SS => self.ss,
            SegmentRegister::DS => self.ds,
        }
    }

    #[inline]
    pub fn set_segment(&mut self, seg: SegmentRegister, value: u16) {
        match seg {
            SegmentRegister::ES => self.es = value,
            SegmentRegister::CS => self.cs = value,
            SegmentRegister::SS => self.ss = value,
            SegmentRegister::DS => self.ds = value,
        }
    }
}
