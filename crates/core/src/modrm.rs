//! ModRM byte resolution.
//!
//! ```text
//!   7  6   5  4  3   2  1  0
//! [ mod ] [  reg  ] [  r/m  ]
//! ```
//!
//! With `mod == 11` the r/m field names a second register. Otherwise it
//! selects one of eight base/index combinations, displaced by nothing (00),
//! a signed byte (01) or a word (10). `mod == 00, r/m == 110` is the lone
//! exception: it means "absolute 16-bit offset follows", not `[bp]`.

use crate::instruction::BaseIndex;

pub const MODRM_MOD_MASK: u8 = 0b11_000_000;
pub const MODRM_REG_MASK: u8 = 0b00_111_000;
pub const MODRM_RM_MASK: u8 = 0b00_000_111;

const RM_DIRECT: u8 = 0b110;

/// How the r/m field is to be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmMode {
    /// `mod == 11`: r/m is a register
    Register(u8),
    /// `mod == 00, r/m == 110`: absolute 16-bit offset follows
    Direct,
    /// `mod == 00`
    Indirect(BaseIndex),
    /// `mod == 01`: signed 8-bit displacement follows
    Displaced8(BaseIndex),
    /// `mod == 10`: 16-bit displacement follows
    Displaced16(BaseIndex),
}

/// Split ModRM byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModRm {
    pub raw: u8,
    pub mode: u8,
    pub reg: u8,
    pub rm: u8,
}

impl ModRm {
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        Self {
            raw: byte,
            mode: (byte & MODRM_MOD_MASK) >> 6,
            reg: (byte & MODRM_REG_MASK) >> 3,
            rm: byte & MODRM_RM_MASK,
        }
    }

    /// Reassemble from fields (each masked to its width)
    #[inline]
    pub fn from_parts(mode: u8, reg: u8, rm: u8) -> Self {
        Self::from_byte(((mode & 0x03) << 6) | ((reg & 0x07) << 3) | (rm & 0x07))
    }

    #[inline]
    pub fn is_register(&self) -> bool {
        self.mode == 0b11
    }

    pub fn rm_mode(&self) -> RmMode {
        match self.mode {
            0b11 => RmMode::Register(self.rm),
            0b00 if self.rm == RM_DIRECT => RmMode::Direct,
            0b00 => RmMode::Indirect(BaseIndex::from_rm(self.rm)),
            0b01 => RmMode::Displaced8(BaseIndex::from_rm(self.rm)),
            _ => RmMode::Displaced16(BaseIndex::from_rm(self.rm)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_split() {
        let modrm = ModRm::from_byte(0x1D);
        assert_eq!(modrm.mode, 0b00);
        assert_eq!(modrm.reg, 0b011);
        assert_eq!(modrm.rm, 0b101);
        assert_eq!(modrm.rm_mode(), RmMode::Indirect(BaseIndex::Di));

        let modrm = ModRm::from_byte(0xC3);
        assert!(modrm.is_register());
        assert_eq!(modrm.reg, 0);
        assert_eq!(modrm.rm_mode(), RmMode::Register(3));
    }

    #[test]
    fn test_bp_exception_only_in_mode_zero() {
        assert_eq!(ModRm::from_byte(0b00_000_110).rm_mode(), RmMode::Direct);
        assert_eq!(
            ModRm::from_byte(0b01_000_110).rm_mode(),
            RmMode::Displaced8(BaseIndex::Bp)
        );
        assert_eq!(
            ModRm::from_byte(0b10_000_110).rm_mode(),
            RmMode::Displaced16(BaseIndex::Bp)
        );
        assert_eq!(ModRm::from_byte(0b11_000_110).rm_mode(), RmMode::Register(6));
    }

    #[test]
    fn test_all_bytes_round_trip() {
        for byte in 0..=255u8 {
            let modrm = ModRm::from_byte(byte);
            assert_eq!(ModRm::from_parts(modrm.mode, modrm.reg, modrm.rm).raw, byte);
        }
    }
}
