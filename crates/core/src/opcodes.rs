//! Static opcode tables.
//!
//! One literal entry per primary opcode, plus one 8-entry table for every
//! opcode that multiplexes classes through the ModRM reg field. Keep this
//! as data: each row can be checked against the 8086 opcode map by eye.
//!
//! Operand specifiers follow the usual opcode-map shorthand:
//!
//! | code   | operand                                                  |
//! |--------|----------------------------------------------------------|
//! | Eb/Ew  | ModRM r/m, register or memory                            |
//! | Gb/Gw  | ModRM reg, general register                              |
//! | Sw     | ModRM reg, segment register                              |
//! | M / Mp | ModRM r/m, memory only (near / far pointer)              |
//! | Ib/Iw  | immediate; Ibs is imm8 sign-extended to a word           |
//! | Jb/Jw  | relative branch offset                                   |
//! | Ob/Ow  | absolute offset in the data segment                      |
//! | Ap     | immediate segment:offset                                 |
//! | Xb/Xw  | DS:SI string source; Yb/Yw ES:DI string destination      |

use crate::instruction::{Mnemonic, Register16, Register8, SegmentRegister, Width};

/// How one operand is encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMethod {
    None,
    Eb,
    Ew,
    Gb,
    Gw,
    Sw,
    M,
    Mp,
    Ib,
    Iw,
    Ibs,
    Jb,
    Jw,
    Ob,
    Ow,
    Ap,
    /// Implicit shift/rotate count of 1
    One,
    Reg8(Register8),
    Reg16(Register16),
    Seg(SegmentRegister),
    Xb,
    Xw,
    Yb,
    Yw,
    Flags,
}

impl AddressingMethod {
    /// True when the operand lives in (or next to) the ModRM byte
    pub fn uses_modrm(self) -> bool {
        matches!(
            self,
            Am::Eb | Am::Ew | Am::Gb | Am::Gw | Am::Sw | Am::M | Am::Mp
        )
    }

    pub fn width(self) -> Width {
        match self {
            Am::None | Am::Ap => Width::None,
            Am::Eb | Am::Gb | Am::Ib | Am::Jb | Am::Ob | Am::One | Am::Reg8(_) | Am::Xb | Am::Yb => {
                Width::Byte
            }
            Am::Ew
            | Am::Gw
            | Am::Sw
            | Am::M
            | Am::Mp
            | Am::Iw
            | Am::Ibs
            | Am::Jw
            | Am::Ow
            | Am::Reg16(_)
            | Am::Seg(_)
            | Am::Xw
            | Am::Yw
            | Am::Flags => Width::Word,
        }
    }
}

use AddressingMethod as Am;

/// 8-entry table selected by ModRM reg
pub type GroupTable = [OpcodeEntry; 8];

/// One opcode table row
#[derive(Debug, Clone, Copy)]
pub struct OpcodeEntry {
    pub mnemonic: Mnemonic,
    /// Destination, source, third
    pub operands: [AddressingMethod; 3],
    /// Secondary table for `Mnemonic::Group` rows
    pub group: Option<&'static GroupTable>,
}

impl OpcodeEntry {
    pub const fn new(mnemonic: Mnemonic, operands: [AddressingMethod; 3]) -> Self {
        Self {
            mnemonic,
            operands,
            group: None,
        }
    }

    pub const fn group(table: &'static GroupTable) -> Self {
        Self {
            mnemonic: Mnemonic::Group,
            operands: [Am::None; 3],
            group: Some(table),
        }
    }

    /// A ModRM byte follows the opcode
    pub fn uses_modrm(&self) -> bool {
        self.group.is_some() || self.operands.iter().any(|m| m.uses_modrm())
    }
}

macro_rules! op {
    ($m:ident) => {
        OpcodeEntry::new(Mnemonic::$m, [Am::None, Am::None, Am::None])
    };
    ($m:ident, $a:expr) => {
        OpcodeEntry::new(Mnemonic::$m, [$a, Am::None, Am::None])
    };
    ($m:ident, $a:expr, $b:expr) => {
        OpcodeEntry::new(Mnemonic::$m, [$a, $b, Am::None])
    };
}

macro_rules! grp {
    ($table:ident) => {
        OpcodeEntry::group(&$table)
    };
}

const AL: Am = Am::Reg8(Register8::AL);
const CL: Am = Am::Reg8(Register8::CL);
const DL: Am = Am::Reg8(Register8::DL);
const BL: Am = Am::Reg8(Register8::BL);
const AH: Am = Am::Reg8(Register8::AH);
const CH: Am = Am::Reg8(Register8::CH);
const DH: Am = Am::Reg8(Register8::DH);
const BH: Am = Am::Reg8(Register8::BH);
const AX: Am = Am::Reg16(Register16::AX);
const CX: Am = Am::Reg16(Register16::CX);
const DX: Am = Am::Reg16(Register16::DX);
const BX: Am = Am::Reg16(Register16::BX);
const SP: Am = Am::Reg16(Register16::SP);
const BP: Am = Am::Reg16(Register16::BP);
const SI: Am = Am::Reg16(Register16::SI);
const DI: Am = Am::Reg16(Register16::DI);
const ES: Am = Am::Seg(SegmentRegister::ES);
const CS: Am = Am::Seg(SegmentRegister::CS);
const SS: Am = Am::Seg(SegmentRegister::SS);
const DS: Am = Am::Seg(SegmentRegister::DS);

const INVALID: OpcodeEntry = op!(Invalid);
const PREFIX: OpcodeEntry = op!(Prefix);

/// Primary opcode map
#[rustfmt::skip]
pub static PRIMARY: [OpcodeEntry; 256] = [
    // 0x00
    op!(Add, Am::Eb, Am::Gb), op!(Add, Am::Ew, Am::Gw), op!(Add, Am::Gb, Am::Eb), op!(Add, Am::Gw, Am::Ew),
    op!(Add, AL, Am::Ib),     op!(Add, AX, Am::Iw),     op!(Push, ES),            op!(Pop, ES),
    op!(Or, Am::Eb, Am::Gb),  op!(Or, Am::Ew, Am::Gw),  op!(Or, Am::Gb, Am::Eb),  op!(Or, Am::Gw, Am::Ew),
    op!(Or, AL, Am::Ib),      op!(Or, AX, Am::Iw),      op!(Push, CS),            INVALID,
    // 0x10
    op!(Adc, Am::Eb, Am::Gb), op!(Adc, Am::Ew, Am::Gw), op!(Adc, Am::Gb, Am::Eb), op!(Adc, Am::Gw, Am::Ew),
    op!(Adc, AL, Am::Ib),     op!(Adc, AX, Am::Iw),     op!(Push, SS),            op!(Pop, SS),
    op!(Sbb, Am::Eb, Am::Gb), op!(Sbb, Am::Ew, Am::Gw), op!(Sbb, Am::Gb, Am::Eb), op!(Sbb, Am::Gw, Am::Ew),
    op!(Sbb, AL, Am::Ib),     op!(Sbb, AX, Am::Iw),     op!(Push, DS),            op!(Pop, DS),
    // 0x20
    op!(And, Am::Eb, Am::Gb), op!(And, Am::Ew, Am::Gw), op!(And, Am::Gb, Am::Eb), op!(And, Am::Gw, Am::Ew),
    op!(And, AL, Am::Ib),     op!(And, AX, Am::Iw),     PREFIX,                   op!(Daa),
    op!(Sub, Am::Eb, Am::Gb), op!(Sub, Am::Ew, Am::Gw), op!(Sub, Am::Gb, Am::Eb), op!(Sub, Am::Gw, Am::Ew),
    op!(Sub, AL, Am::Ib),     op!(Sub, AX, Am::Iw),     PREFIX,                   op!(Das),
    // 0x30
    op!(Xor, Am::Eb, Am::Gb), op!(Xor, Am::Ew, Am::Gw), op!(Xor, Am::Gb, Am::Eb), op!(Xor, Am::Gw, Am::Ew),
    op!(Xor, AL, Am::Ib),     op!(Xor, AX, Am::Iw),     PREFIX,                   op!(Aaa),
    op!(Cmp, Am::Eb, Am::Gb), op!(Cmp, Am::Ew, Am::Gw), op!(Cmp, Am::Gb, Am::Eb), op!(Cmp, Am::Gw, Am::Ew),
    op!(Cmp, AL, Am::Ib),     op!(Cmp, AX, Am::Iw),     PREFIX,                   op!(Aas),
    // 0x40
    op!(Inc, AX), op!(Inc, CX), op!(Inc, DX), op!(Inc, BX), op!(Inc, SP), op!(Inc, BP), op!(Inc, SI), op!(Inc, DI),
    op!(Dec, AX), op!(Dec, CX), op!(Dec, DX), op!(Dec, BX), op!(Dec, SP), op!(Dec, BP), op!(Dec, SI), op!(Dec, DI),
    // 0x50
    op!(Push, AX), op!(Push, CX), op!(Push, DX), op!(Push, BX), op!(Push, SP), op!(Push, BP), op!(Push, SI), op!(Push, DI),
    op!(Pop, AX),  op!(Pop, CX),  op!(Pop, DX),  op!(Pop, BX),  op!(Pop, SP),  op!(Pop, BP),  op!(Pop, SI),  op!(Pop, DI),
    // 0x60
    INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, INVALID,
    INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, INVALID,
    // 0x70
    op!(Jo, Am::Jb), op!(Jno, Am::Jb), op!(Jb, Am::Jb),  op!(Jnb, Am::Jb), op!(Jz, Am::Jb), op!(Jnz, Am::Jb), op!(Jbe, Am::Jb), op!(Ja, Am::Jb),
    op!(Js, Am::Jb), op!(Jns, Am::Jb), op!(Jp, Am::Jb),  op!(Jnp, Am::Jb), op!(Jl, Am::Jb), op!(Jge, Am::Jb), op!(Jle, Am::Jb), op!(Jg, Am::Jb),
    // 0x80
    grp!(GROUP_80),            grp!(GROUP_81),            grp!(GROUP_82),            grp!(GROUP_83),
    op!(Test, Am::Eb, Am::Gb), op!(Test, Am::Ew, Am::Gw), op!(Xchg, Am::Eb, Am::Gb), op!(Xchg, Am::Ew, Am::Gw),
    op!(Mov, Am::Eb, Am::Gb),  op!(Mov, Am::Ew, Am::Gw),  op!(Mov, Am::Gb, Am::Eb),  op!(Mov, Am::Gw, Am::Ew),
    op!(Mov, Am::Ew, Am::Sw),  op!(Lea, Am::Gw, Am::M),   op!(Mov, Am::Sw, Am::Ew),  grp!(GROUP_8F),
    // 0x90
    op!(Nop),            op!(Xchg, AX, CX), op!(Xchg, AX, DX), op!(Xchg, AX, BX),
    op!(Xchg, AX, SP),   op!(Xchg, AX, BP), op!(Xchg, AX, SI), op!(Xchg, AX, DI),
    op!(Cbw),            op!(Cwd),          op!(CallFar, Am::Ap), op!(Wait),
    op!(Pushf, Am::Flags), op!(Popf, Am::Flags), op!(Sahf),    op!(Lahf),
    // 0xA0
    op!(Mov, AL, Am::Ob),       op!(Mov, AX, Am::Ow),       op!(Mov, Am::Ob, AL),       op!(Mov, Am::Ow, AX),
    op!(Movsb, Am::Yb, Am::Xb), op!(Movsw, Am::Yw, Am::Xw), op!(Cmpsb, Am::Xb, Am::Yb), op!(Cmpsw, Am::Xw, Am::Yw),
    op!(Test, AL, Am::Ib),      op!(Test, AX, Am::Iw),      op!(Stosb, Am::Yb, AL),     op!(Stosw, Am::Yw, AX),
    op!(Lodsb, AL, Am::Xb),     op!(Lodsw, AX, Am::Xw),     op!(Scasb, AL, Am::Yb),     op!(Scasw, AX, Am::Yw),
    // 0xB0
    op!(Mov, AL, Am::Ib), op!(Mov, CL, Am::Ib), op!(Mov, DL, Am::Ib), op!(Mov, BL, Am::Ib),
    op!(Mov, AH, Am::Ib), op!(Mov, CH, Am::Ib), op!(Mov, DH, Am::Ib), op!(Mov, BH, Am::Ib),
    op!(Mov, AX, Am::Iw), op!(Mov, CX, Am::Iw), op!(Mov, DX, Am::Iw), op!(Mov, BX, Am::Iw),
    op!(Mov, SP, Am::Iw), op!(Mov, BP, Am::Iw), op!(Mov, SI, Am::Iw), op!(Mov, DI, Am::Iw),
    // 0xC0
    INVALID,                 INVALID,              op!(Ret, Am::Iw),         op!(Ret),
    op!(Les, Am::Gw, Am::M), op!(Lds, Am::Gw, Am::M), grp!(GROUP_C6),        grp!(GROUP_C7),
    INVALID,                 INVALID,              op!(RetFar, Am::Iw),      op!(RetFar),
    op!(Int3),               op!(Int, Am::Ib),     op!(Into),                op!(Iret),
    // 0xD0
    grp!(GROUP_D0), grp!(GROUP_D1), grp!(GROUP_D2), grp!(GROUP_D3),
    op!(Aam, Am::Ib), op!(Aad, Am::Ib), INVALID,    op!(Xlat),
    op!(Esc, Am::Ew), op!(Esc, Am::Ew), op!(Esc, Am::Ew), op!(Esc, Am::Ew),
    op!(Esc, Am::Ew), op!(Esc, Am::Ew), op!(Esc, Am::Ew), op!(Esc, Am::Ew),
    // 0xE0
    op!(Loopne, Am::Jb), op!(Loope, Am::Jb), op!(Loop, Am::Jb),     op!(Jcxz, Am::Jb),
    op!(In, AL, Am::Ib), op!(In, AX, Am::Ib), op!(Out, Am::Ib, AL), op!(Out, Am::Ib, AX),
    op!(Call, Am::Jw),   op!(Jmp, Am::Jw),   op!(JmpFar, Am::Ap),   op!(Jmp, Am::Jb),
    op!(In, AL, DX),     op!(In, AX, DX),    op!(Out, DX, AL),      op!(Out, DX, AX),
    // 0xF0
    op!(Lock), INVALID,  PREFIX,   PREFIX,   op!(Hlt), op!(Cmc), grp!(GROUP_F6), grp!(GROUP_F7),
    op!(Clc),  op!(Stc), op!(Cli), op!(Sti), op!(Cld), op!(Std), grp!(GROUP_FE), grp!(GROUP_FF),
];

#[rustfmt::skip]
const GROUP_1_BYTE: GroupTable = [
    op!(Add, Am::Eb, Am::Ib), op!(Or, Am::Eb, Am::Ib),  op!(Adc, Am::Eb, Am::Ib), op!(Sbb, Am::Eb, Am::Ib),
    op!(And, Am::Eb, Am::Ib), op!(Sub, Am::Eb, Am::Ib), op!(Xor, Am::Eb, Am::Ib), op!(Cmp, Am::Eb, Am::Ib),
];

/// Immediate group 1, byte: `op Eb, Ib`
pub static GROUP_80: GroupTable = GROUP_1_BYTE;

/// Immediate group 1, word: `op Ew, Iw`
#[rustfmt::skip]
pub static GROUP_81: GroupTable = [
    op!(Add, Am::Ew, Am::Iw), op!(Or, Am::Ew, Am::Iw),  op!(Adc, Am::Ew, Am::Iw), op!(Sbb, Am::Ew, Am::Iw),
    op!(And, Am::Ew, Am::Iw), op!(Sub, Am::Ew, Am::Iw), op!(Xor, Am::Ew, Am::Iw), op!(Cmp, Am::Ew, Am::Iw),
];

/// 0x82 is an alias of 0x80 on the 8086
pub static GROUP_82: GroupTable = GROUP_1_BYTE;

/// Immediate group 1, sign-extended byte: `op Ew, Ibs`
#[rustfmt::skip]
pub static GROUP_83: GroupTable = [
    op!(Add, Am::Ew, Am::Ibs), op!(Or, Am::Ew, Am::Ibs),  op!(Adc, Am::Ew, Am::Ibs), op!(Sbb, Am::Ew, Am::Ibs),
    op!(And, Am::Ew, Am::Ibs), op!(Sub, Am::Ew, Am::Ibs), op!(Xor, Am::Ew, Am::Ibs), op!(Cmp, Am::Ew, Am::Ibs),
];

#[rustfmt::skip]
pub static GROUP_8F: GroupTable = [
    op!(Pop, Am::Ew), INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, INVALID,
];

#[rustfmt::skip]
pub static GROUP_C6: GroupTable = [
    op!(Mov, Am::Eb, Am::Ib), INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, INVALID,
];

#[rustfmt::skip]
pub static GROUP_C7: GroupTable = [
    op!(Mov, Am::Ew, Am::Iw), INVALID, INVALID, INVALID, INVALID, INVALID, INVALID, INVALID,
];

/// Shift/rotate group 2 by 1, byte
#[rustfmt::skip]
pub static GROUP_D0: GroupTable = [
    op!(Rol, Am::Eb, Am::One), op!(Ror, Am::Eb, Am::One), op!(Rcl, Am::Eb, Am::One), op!(Rcr, Am::Eb, Am::One),
    op!(Shl, Am::Eb, Am::One), op!(Shr, Am::Eb, Am::One), INVALID,                   op!(Sar, Am::Eb, Am::One),
];

/// Shift/rotate group 2 by 1, word
#[rustfmt::skip]
pub static GROUP_D1: GroupTable = [
    op!(Rol, Am::Ew, Am::One), op!(Ror, Am::Ew, Am::One), op!(Rcl, Am::Ew, Am::One), op!(Rcr, Am::Ew, Am::One),
    op!(Shl, Am::Ew, Am::One), op!(Shr, Am::Ew, Am::One), INVALID,                   op!(Sar, Am::Ew, Am::One),
];

/// Shift/rotate group 2 by CL, byte
#[rustfmt::skip]
pub static GROUP_D2: GroupTable = [
    op!(Rol, Am::Eb, CL), op!(Ror, Am::Eb, CL), op!(Rcl, Am::Eb, CL), op!(Rcr, Am::Eb, CL),
    op!(Shl, Am::Eb, CL), op!(Shr, Am::Eb, CL), INVALID,              op!(Sar, Am::Eb, CL),
];

/// Shift/rotate group 2 by CL, word
#[rustfmt::skip]
pub static GROUP_D3: GroupTable = [
    op!(Rol, Am::Ew, CL), op!(Ror, Am::Ew, CL), op!(Rcl, Am::Ew, CL), op!(Rcr, Am::Ew, CL),
    op!(Shl, Am::Ew, CL), op!(Shr, Am::Ew, CL), INVALID,              op!(Sar, Am::Ew, CL),
];

/// Unary group 3, byte
#[rustfmt::skip]
pub static GROUP_F6: GroupTable = [
    op!(Test, Am::Eb, Am::Ib), INVALID,        op!(Not, Am::Eb),  op!(Neg, Am::Eb),
    op!(Mul, Am::Eb),          op!(Imul, Am::Eb), op!(Div, Am::Eb), op!(Idiv, Am::Eb),
];

/// Unary group 3, word
#[rustfmt::skip]
pub static GROUP_F7: GroupTable = [
    op!(Test, Am::Ew, Am::Iw), INVALID,        op!(Not, Am::Ew),  op!(Neg, Am::Ew),
    op!(Mul, Am::Ew),          op!(Imul, Am::Ew), op!(Div, Am::Ew), op!(Idiv, Am::Ew),
];

/// inc/dec byte
#[rustfmt::skip]
pub static GROUP_FE: GroupTable = [
    op!(Inc, Am::Eb), op!(Dec, Am::Eb), INVALID, INVALID, INVALID, INVALID, INVALID, INVALID,
];

/// inc/dec/call/jmp/push word
#[rustfmt::skip]
pub static GROUP_FF: GroupTable = [
    op!(Inc, Am::Ew),  op!(Dec, Am::Ew),     op!(Call, Am::Ew), op!(CallFar, Am::Mp),
    op!(Jmp, Am::Ew),  op!(JmpFar, Am::Mp),  op!(Push, Am::Ew), INVALID,
];

/// Primary table row for `opcode`
#[inline]
pub fn lookup(opcode: u8) -> &'static OpcodeEntry {
    &PRIMARY[opcode as usize]
}

/// Resolve a row through its group table, if it has one
#[inline]
pub fn resolve(opcode: u8, modrm_reg: u8) -> &'static OpcodeEntry {
    let entry = lookup(opcode);
    match entry.group {
        Some(table) => &table[(modrm_reg & 0x07) as usize],
        None => entry,
    }
}
