//! Decoded instruction model shared by the decoder, the execution engine,
//! the disassembler and the encoder.
//!
//! An [`Instruction`] is a plain value: the decoder builds a fresh one per
//! step and everything downstream only reads it.

/// Raw byte capacity of an [`Instruction`]
pub const MAX_INSTRUCTION_LEN: usize = 16;

/// Operand width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Width {
    None,
    Byte,
    Word,
}

impl Width {
    /// All-ones mask for the width
    #[inline]
    pub fn mask(self) -> u32 {
        match self {
            Width::None => 0,
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
        }
    }

    #[inline]
    pub fn sign_bit(self) -> u32 {
        match self {
            Width::None => 0,
            Width::Byte => 0x80,
            Width::Word => 0x8000,
        }
    }

    /// Size in bytes (0 for `None`)
    #[inline]
    pub fn bytes(self) -> u16 {
        match self {
            Width::None => 0,
            Width::Byte => 1,
            Width::Word => 2,
        }
    }
}

/// 8-bit register, numbered as in the ModRM reg field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register8 {
    AL = 0,
    CL = 1,
    DL = 2,
    BL = 3,
    AH = 4,
    CH = 5,
    DH = 6,
    BH = 7,
}

/// 16-bit register, numbered as in the ModRM reg field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register16 {
    AX = 0,
    CX = 1,
    DX = 2,
    BX = 3,
    SP = 4,
    BP = 5,
    SI = 6,
    DI = 7,
}

/// Segment register, numbered as in the ModRM reg field of `mov Sw`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentRegister {
    ES = 0,
    CS = 1,
    SS = 2,
    DS = 3,
}

const REG8: [Register8; 8] = [
    Register8::AL,
    Register8::CL,
    Register8::DL,
    Register8::BL,
    Register8::AH,
    Register8::CH,
    Register8::DH,
    Register8::BH,
];

const REG16: [Register16; 8] = [
    Register16::AX,
    Register16::CX,
    Register16::DX,
    Register16::BX,
    Register16::SP,
    Register16::BP,
    Register16::SI,
    Register16::DI,
];

const SEGMENTS: [SegmentRegister; 4] = [
    SegmentRegister::ES,
    SegmentRegister::CS,
    SegmentRegister::SS,
    SegmentRegister::DS,
];

impl Register8 {
    /// Register for a 3-bit field value (only the low 3 bits are used)
    #[inline]
    pub fn from_index(index: u8) -> Self {
        REG8[(index & 0x07) as usize]
    }

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        ["al", "cl", "dl", "bl", "ah", "ch", "dh", "bh"][self as usize]
    }
}

impl Register16 {
    /// Register for a 3-bit field value (only the low 3 bits are used)
    #[inline]
    pub fn from_index(index: u8) -> Self {
        REG16[(index & 0x07) as usize]
    }

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        ["ax", "cx", "dx", "bx", "sp", "bp", "si", "di"][self as usize]
    }
}

impl SegmentRegister {
    /// `None` for 4..=7, which have no segment register on the 8086
    #[inline]
    pub fn from_index(index: u8) -> Option<Self> {
        SEGMENTS.get(index as usize).copied()
    }

    #[inline]
    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        ["es", "cs", "ss", "ds"][self as usize]
    }
}

/// General register operand of either width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Byte(Register8),
    Word(Register16),
}

impl Register {
    pub fn width(self) -> Width {
        match self {
            Register::Byte(_) => Width::Byte,
            Register::Word(_) => Width::Word,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::Byte(r) => r.name(),
            Register::Word(r) => r.name(),
        }
    }
}

/// Base/index combination selected by ModRM r/m in the memory modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseIndex {
    BxSi = 0,
    BxDi = 1,
    BpSi = 2,
    BpDi = 3,
    Si = 4,
    Di = 5,
    Bp = 6,
    Bx = 7,
}

impl BaseIndex {
    pub fn from_rm(rm: u8) -> Self {
        match rm & 0x07 {
            0 => BaseIndex::BxSi,
            1 => BaseIndex::BxDi,
            2 => BaseIndex::BpSi,
            3 => BaseIndex::BpDi,
            4 => BaseIndex::Si,
            5 => BaseIndex::Di,
            6 => BaseIndex::Bp,
            _ => BaseIndex::Bx,
        }
    }

    #[inline]
    pub fn rm(self) -> u8 {
        self as u8
    }

    /// Registers summed to form the offset
    pub fn registers(self) -> (Register16, Option<Register16>) {
        match self {
            BaseIndex::BxSi => (Register16::BX, Some(Register16::SI)),
            BaseIndex::BxDi => (Register16::BX, Some(Register16::DI)),
            BaseIndex::BpSi => (Register16::BP, Some(Register16::SI)),
            BaseIndex::BpDi => (Register16::BP, Some(Register16::DI)),
            BaseIndex::Si => (Register16::SI, None),
            BaseIndex::Di => (Register16::DI, None),
            BaseIndex::Bp => (Register16::BP, None),
            BaseIndex::Bx => (Register16::BX, None),
        }
    }

    /// bp-based combinations address the stack segment by default
    pub fn default_segment(self) -> SegmentRegister {
        match self {
            BaseIndex::BpSi | BaseIndex::BpDi | BaseIndex::Bp => SegmentRegister::SS,
            _ => SegmentRegister::DS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            BaseIndex::BxSi => "bx+si",
            BaseIndex::BxDi => "bx+di",
            BaseIndex::BpSi => "bp+si",
            BaseIndex::BpDi => "bp+di",
            BaseIndex::Si => "si",
            BaseIndex::Di => "di",
            BaseIndex::Bp => "bp",
            BaseIndex::Bx => "bx",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Immediate {
    Imm8(u8),
    Imm16(u16),
    /// imm8 sign-extended into a 16-bit operation (opcode 0x83)
    SignExtended(i8),
}

impl Immediate {
    /// Value at the width the instruction operates on
    pub fn value(self) -> u16 {
        match self {
            Immediate::Imm8(v) => v as u16,
            Immediate::Imm16(v) => v,
            Immediate::SignExtended(v) => v as i16 as u16,
        }
    }

    pub fn width(self) -> Width {
        match self {
            Immediate::Imm8(_) => Width::Byte,
            Immediate::Imm16(_) | Immediate::SignExtended(_) => Width::Word,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Displacement {
    Disp8(i8),
    Disp16(i16),
}

impl Displacement {
    #[inline]
    pub fn value(self) -> u16 {
        match self {
            Displacement::Disp8(d) => d as i16 as u16,
            Displacement::Disp16(d) => d as u16,
        }
    }
}

/// Relative branch offset, measured from the end of the instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relative {
    Rel8(i8),
    Rel16(i16),
}

impl Relative {
    #[inline]
    pub fn value(self) -> u16 {
        match self {
            Relative::Rel8(d) => d as i16 as u16,
            Relative::Rel16(d) => d as u16,
        }
    }
}

/// One decoded operand.
///
/// Memory variants carry the segment register they resolve against (the
/// override if one was decoded, otherwise the architectural default).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Operand {
    #[default]
    None,
    Register(Register),
    Immediate(Immediate),
    /// `[base/index]` with no displacement
    Indirect {
        base: BaseIndex,
        segment: SegmentRegister,
        width: Width,
    },
    /// `[base/index + disp]`
    Displaced {
        base: BaseIndex,
        displacement: Displacement,
        segment: SegmentRegister,
        width: Width,
    },
    /// `[offset]`
    Direct {
        offset: u16,
        segment: SegmentRegister,
        width: Width,
    },
    /// Immediate `segment:offset` (far jmp/call)
    FarPointer { segment: u16, offset: u16 },
    Relative(Relative),
    Segment(SegmentRegister),
    /// Implicit DS:SI (segment overridable)
    StringSource { segment: SegmentRegister, width: Width },
    /// Implicit ES:DI
    StringDestination { width: Width },
    Flags,
}

impl Operand {
    /// Width tag used to select the execution-time accessor
    pub fn width(&self) -> Width {
        match *self {
            Operand::None => Width::None,
            Operand::Register(r) => r.width(),
            Operand::Immediate(i) => i.width(),
            Operand::Indirect { width, .. }
            | Operand::Displaced { width, .. }
            | Operand::Direct { width, .. }
            | Operand::StringSource { width, .. }
            | Operand::StringDestination { width } => width,
            Operand::FarPointer { .. } => Width::None,
            Operand::Relative(Relative::Rel8(_)) => Width::Byte,
            Operand::Relative(Relative::Rel16(_)) => Width::Word,
            Operand::Segment(_) | Operand::Flags => Width::Word,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Operand::None)
    }

    /// True for operands addressed through ModRM memory modes or an absolute offset
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            Operand::Indirect { .. } | Operand::Displaced { .. } | Operand::Direct { .. }
        )
    }
}

/// Repeat prefix state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RepeatMode {
    #[default]
    None,
    /// 0xF3: rep / repe / repz
    Repeat,
    /// 0xF2: repne / repnz
    RepeatNotEqual,
}

macro_rules! mnemonics {
    ($($name:ident => $text:literal,)*) => {
        /// Instruction class.
        ///
        /// `Prefix`, `Group` and `Invalid` only appear in opcode tables; the
        /// decoder never hands them to the execution engine.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Mnemonic {
            $($name,)*
        }

        impl Mnemonic {
            pub const ALL: &'static [Mnemonic] = &[$(Mnemonic::$name,)*];

            /// Assembler spelling
            pub fn name(self) -> &'static str {
                match self {
                    $(Mnemonic::$name => $text,)*
                }
            }
        }
    };
}

mnemonics! {
    // arithmetic
    Add => "add", Adc => "adc", Sub => "sub", Sbb => "sbb", Cmp => "cmp",
    Inc => "inc", Dec => "dec", Neg => "neg",
    Mul => "mul", Imul => "imul", Div => "div", Idiv => "idiv",
    Daa => "daa", Das => "das", Aaa => "aaa", Aas => "aas", Aam => "aam", Aad => "aad",
    Cbw => "cbw", Cwd => "cwd",
    // logic, shifts and rotates
    And => "and", Or => "or", Xor => "xor", Test => "test", Not => "not",
    Rol => "rol", Ror => "ror", Rcl => "rcl", Rcr => "rcr",
    Shl => "shl", Shr => "shr", Sar => "sar",
    // data movement
    Mov => "mov", Xchg => "xchg", Lea => "lea", Lds => "lds", Les => "les",
    Push => "push", Pop => "pop", Pushf => "pushf", Popf => "popf",
    Lahf => "lahf", Sahf => "sahf", Xlat => "xlat",
    In => "in", Out => "out",
    // control transfer
    Jmp => "jmp", JmpFar => "jmp far", Call => "call", CallFar => "call far",
    Ret => "ret", RetFar => "retf",
    Jo => "jo", Jno => "jno", Jb => "jb", Jnb => "jnb", Jz => "jz", Jnz => "jnz",
    Jbe => "jbe", Ja => "ja", Js => "js", Jns => "jns", Jp => "jp", Jnp => "jnp",
    Jl => "jl", Jge => "jge", Jle => "jle", Jg => "jg",
    Loop => "loop", Loope => "loope", Loopne => "loopne", Jcxz => "jcxz",
    Int => "int", Int3 => "int3", Into => "into", Iret => "iret",
    // strings
    Movsb => "movsb", Movsw => "movsw", Cmpsb => "cmpsb", Cmpsw => "cmpsw",
    Stosb => "stosb", Stosw => "stosw", Lodsb => "lodsb", Lodsw => "lodsw",
    Scasb => "scasb", Scasw => "scasw",
    // flags
    Clc => "clc", Stc => "stc", Cmc => "cmc", Cli => "cli", Sti => "sti",
    Cld => "cld", Std => "std",
    // processor control
    Hlt => "hlt", Nop => "nop", Wait => "wait", Lock => "lock", Esc => "esc",
    // table-only tags
    Prefix => "(prefix)", Group => "(group)", Invalid => "(invalid)",
}

impl Mnemonic {
    /// Classes the execution engine reports as unimplemented.
    ///
    /// Coprocessor escapes are decoded so their length is right, but there is
    /// no floating-point unit behind them.
    pub const UNIMPLEMENTED: &'static [Mnemonic] = &[Mnemonic::Esc];

    /// Tags that only exist inside the opcode tables
    pub fn is_table_only(self) -> bool {
        matches!(self, Mnemonic::Prefix | Mnemonic::Group | Mnemonic::Invalid)
    }

    pub fn is_string(self) -> bool {
        matches!(
            self,
            Mnemonic::Movsb
                | Mnemonic::Movsw
                | Mnemonic::Cmpsb
                | Mnemonic::Cmpsw
                | Mnemonic::Stosb
                | Mnemonic::Stosw
                | Mnemonic::Lodsb
                | Mnemonic::Lodsw
                | Mnemonic::Scasb
                | Mnemonic::Scasw
        )
    }

    /// String instructions that compare and so honour repe/repne
    pub fn is_compare_string(self) -> bool {
        matches!(
            self,
            Mnemonic::Cmpsb | Mnemonic::Cmpsw | Mnemonic::Scasb | Mnemonic::Scasw
        )
    }

    /// Branches whose single operand is a relative displacement
    pub fn is_relative_branch(self) -> bool {
        matches!(
            self,
            Mnemonic::Jmp
                | Mnemonic::Call
                | Mnemonic::Jo
                | Mnemonic::Jno
                | Mnemonic::Jb
                | Mnemonic::Jnb
                | Mnemonic::Jz
                | Mnemonic::Jnz
                | Mnemonic::Jbe
                | Mnemonic::Ja
                | Mnemonic::Js
                | Mnemonic::Jns
                | Mnemonic::Jp
                | Mnemonic::Jnp
                | Mnemonic::Jl
                | Mnemonic::Jge
                | Mnemonic::Jle
                | Mnemonic::Jg
                | Mnemonic::Loop
                | Mnemonic::Loope
                | Mnemonic::Loopne
                | Mnemonic::Jcxz
        )
    }
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    /// Segment override prefix, if one was present
    pub segment_override: Option<SegmentRegister>,
    pub repeat: RepeatMode,
    /// Destination, source, third
    pub operands: [Operand; 3],
    bytes: [u8; MAX_INSTRUCTION_LEN],
    len: u8,
}

impl Default for Instruction {
    fn default() -> Self {
        Self::new(Mnemonic::Invalid)
    }
}

impl Instruction {
    pub fn new(mnemonic: Mnemonic) -> Self {
        Self {
            mnemonic,
            segment_override: None,
            repeat: RepeatMode::None,
            operands: [Operand::None; 3],
            bytes: [0; MAX_INSTRUCTION_LEN],
            len: 0,
        }
    }

    /// Build an instruction from explicit operands (encoder input, tests)
    pub fn with_operands(mnemonic: Mnemonic, dest: Operand, src: Operand) -> Self {
        let mut ins = Self::new(mnemonic);
        ins.operands[0] = dest;
        ins.operands[1] = src;
        ins
    }

    #[inline]
    pub fn dest(&self) -> &Operand {
        &self.operands[0]
    }

    #[inline]
    pub fn src(&self) -> &Operand {
        &self.operands[1]
    }

    /// Encoded length in bytes
    #[inline]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// Raw encoded bytes, prefixes included
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Record the raw bytes; anything beyond the capacity is dropped.
    pub(crate) fn set_bytes(&mut self, raw: &[u8]) {
        let len = raw.len().min(MAX_INSTRUCTION_LEN);
        self.bytes[..len].copy_from_slice(&raw[..len]);
        self.len = len as u8;
    }

    /// Operand width of the instruction (first operand that has one)
    pub fn width(&self) -> Width {
        self.operands
            .iter()
            .map(Operand::width)
            .find(|w| *w != Width::None)
            .unwrap_or(Width::None)
    }

    /// Target offset of a relative branch placed at `origin`.
    ///
    /// The displacement counts from the address after the instruction.
    pub fn branch_target(&self, origin: u16) -> Option<u16> {
        match self.operands[0] {
            Operand::Relative(rel) if self.mnemonic.is_relative_branch() => Some(
                origin
                    .wrapping_add(self.len as u16)
                    .wrapping_add(rel.value()),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_numbering_matches_modrm() {
        assert_eq!(Register8::from_index(3), Register8::BL);
        assert_eq!(Register8::from_index(4), Register8::AH);
        assert_eq!(Register16::from_index(4), Register16::SP);
        assert_eq!(Register16::from_index(0x0F), Register16::DI);
        assert_eq!(SegmentRegister::from_index(2), Some(SegmentRegister::SS));
        assert_eq!(SegmentRegister::from_index(4), None);
    }

    #[test]
    fn test_base_index_default_segments() {
        for rm in 0..8 {
            let base = BaseIndex::from_rm(rm);
            assert_eq!(base.rm(), rm);
            let uses_bp = base.registers().0 == Register16::BP;
            let expected = if uses_bp {
                SegmentRegister::SS
            } else {
                SegmentRegister::DS
            };
            assert_eq!(base.default_segment(), expected, "{:?}", base);
        }
    }

    #[test]
    fn test_operand_widths() {
        assert_eq!(Operand::None.width(), Width::None);
        assert_eq!(
            Operand::Register(Register::Byte(Register8::CL)).width(),
            Width::Byte
        );
        assert_eq!(
            Operand::Immediate(Immediate::SignExtended(-1)).width(),
            Width::Word
        );
        assert_eq!(Immediate::SignExtended(-2).value(), 0xFFFE);
        assert_eq!(Operand::Flags.width(), Width::Word);
        assert_eq!(Operand::StringDestination { width: Width::Byte }.width(), Width::Byte);
    }

    #[test]
    fn test_branch_target_counts_from_end() {
        let mut ins = Instruction::new(Mnemonic::Jz);
        ins.operands[0] = Operand::Relative(Relative::Rel8(-2));
        ins.set_bytes(&[0x74, 0xFE]);
        assert_eq!(ins.branch_target(0), Some(0));
        assert_eq!(ins.branch_target(0x100), Some(0x100));

        let mut jmp = Instruction::new(Mnemonic::Jmp);
        jmp.operands[0] = Operand::Relative(Relative::Rel16(0x10));
        jmp.set_bytes(&[0xE9, 0x10, 0x00]);
        assert_eq!(jmp.branch_target(0xFFFE), Some(0x0011));

        assert_eq!(Instruction::new(Mnemonic::Nop).branch_target(0), None);
    }

    #[test]
    fn test_mnemonic_names_are_unique() {
        let mut names: Vec<&str> = Mnemonic::ALL.iter().map(|m| m.name()).collect();
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
        assert!(total >= 100);
    }
}
