//! FLAGS register.

use serde::{Deserialize, Serialize};

use crate::instruction::{Mnemonic, Width};

pub const FLAG_CF: u16 = 0x0001;
pub const FLAG_PF: u16 = 0x0004;
pub const FLAG_AF: u16 = 0x0010;
pub const FLAG_ZF: u16 = 0x0040;
pub const FLAG_SF: u16 = 0x0080;
pub const FLAG_TF: u16 = 0x0100;
pub const FLAG_IF: u16 = 0x0200;
pub const FLAG_DF: u16 = 0x0400;
pub const FLAG_OF: u16 = 0x0800;

/// Bits that always read back as 1
pub const FLAGS_RESERVED: u16 = 0xF02A;

/// Status and control flags as named bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Flags {
    pub carry: bool,
    pub parity: bool,
    pub adjust: bool,
    pub zero: bool,
    pub sign: bool,
    pub trap: bool,
    pub interrupt: bool,
    pub direction: bool,
    pub overflow: bool,
}

#[inline]
fn bit(set: bool, mask: u16) -> u16 {
    if set {
        mask
    } else {
        0
    }
}

/// Even number of set bits in the low byte
#[inline]
pub fn parity(value: u32) -> bool {
    (value as u8).count_ones() % 2 == 0
}

impl Flags {
    /// Pack into the 16-bit FLAGS word, reserved bits set
    pub fn pack(&self) -> u16 {
        FLAGS_RESERVED
            | bit(self.carry, FLAG_CF)
            | bit(self.parity, FLAG_PF)
            | bit(self.adjust, FLAG_AF)
            | bit(self.zero, FLAG_ZF)
            | bit(self.sign, FLAG_SF)
            | bit(self.trap, FLAG_TF)
            | bit(self.interrupt, FLAG_IF)
            | bit(self.direction, FLAG_DF)
            | bit(self.overflow, FLAG_OF)
    }

    /// Inverse of `pack`; reserved bits are ignored
    pub fn unpack(word: u16) -> Self {
        Self {
            carry: word & FLAG_CF != 0,
            parity: word & FLAG_PF != 0,
            adjust: word & FLAG_AF != 0,
            zero: word & FLAG_ZF != 0,
            sign: word & FLAG_SF != 0,
            trap: word & FLAG_TF != 0,
            interrupt: word & FLAG_IF != 0,
            direction: word & FLAG_DF != 0,
            overflow: word & FLAG_OF != 0,
        }
    }

    /// Load SF, ZF, AF, PF and CF from the low byte (sahf)
    pub fn set_low_byte(&mut self, byte: u8) {
        let low = Self::unpack(byte as u16);
        self.sign = low.sign;
        self.zero = low.zero;
        self.adjust = low.adjust;
        self.parity = low.parity;
        self.carry = low.carry;
    }

    /// Sign, zero and parity of a result
    #[inline]
    pub fn set_szp(&mut self, result: u32, width: Width) {
        let result = result & width.mask();
        self.zero = result == 0;
        self.sign = result & width.sign_bit() != 0;
        self.parity = parity(result);
    }

    /// Predicate of a conditional jump class; `None` for anything else
    pub fn condition(&self, mnemonic: Mnemonic) -> Option<bool> {
        let taken = match mnemonic {
            Mnemonic::Jo => self.overflow,
            Mnemonic::Jno => !self.overflow,
            Mnemonic::Jb => self.carry,
            Mnemonic::Jnb => !self.carry,
            Mnemonic::Jz => self.zero,
            Mnemonic::Jnz => !self.zero,
            Mnemonic::Jbe => self.carry || self.zero,
            Mnemonic::Ja => !self.carry && !self.zero,
            Mnemonic::Js => self.sign,
            Mnemonic::Jns => !self.sign,
            Mnemonic::Jp => self.parity,
            Mnemonic::Jnp => !self.parity,
            Mnemonic::Jl => self.sign != self.overflow,
            Mnemonic::Jge => self.sign == self.overflow,
            Mnemonic::Jle => self.zero || self.sign != self.overflow,
            Mnemonic::Jg => !self.zero && self.sign == self.overflow,
            _ => return None,
        };
        Some(taken)
    }
}
