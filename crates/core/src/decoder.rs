//! Table-driven instruction decoder.
//!
//! `decode` consumes prefixes, looks the opcode up in [`crate::opcodes`]
//! (going through a group table when the row has one), builds each operand
//! from its addressing specifier, then rewinds and copies the raw bytes into
//! the instruction so disassemblers and tracers can show them.

use thiserror::Error;

use crate::instruction::{
    Displacement, Immediate, Instruction, Mnemonic, Operand, Register, Register16, Register8,
    Relative, RepeatMode, SegmentRegister, Width, MAX_INSTRUCTION_LEN,
};
use crate::logging::{log, LogCategory, LogLevel};
use crate::modrm::{ModRm, RmMode};
use crate::opcodes::{lookup, AddressingMethod, OpcodeEntry};
use crate::stream::{ByteSource, ByteStream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode 0x{opcode:02X}")]
    InvalidOpcode { opcode: u8 },
    #[error("invalid group encoding 0x{opcode:02X} /{reg}")]
    InvalidGroupEntry { opcode: u8, reg: u8 },
    #[error("opcode 0x{opcode:02X} requires a memory operand")]
    RegisterOperandNotAllowed { opcode: u8 },
    #[error("opcode 0x{opcode:02X} names segment register {reg}")]
    InvalidSegmentRegister { opcode: u8, reg: u8 },
    #[error("instruction too long ({len} bytes)")]
    TooLong { len: usize },
}

/// Per-instruction decode state
struct DecodeContext {
    opcode: u8,
    modrm: Option<ModRm>,
    segment_override: Option<SegmentRegister>,
}

impl DecodeContext {
    /// The ModRM byte, fetched on first use only
    fn modrm<S: ByteSource + ?Sized>(&mut self, stream: &mut ByteStream<'_, S>) -> ModRm {
        match self.modrm {
            Some(modrm) => modrm,
            None => {
                let modrm = ModRm::from_byte(stream.fetch_u8());
                self.modrm = Some(modrm);
                modrm
            }
        }
    }

    #[inline]
    fn segment_or(&self, default: SegmentRegister) -> SegmentRegister {
        self.segment_override.unwrap_or(default)
    }
}

/// Decode one instruction at the stream's position.
///
/// On success the stream is left just past the instruction and
/// `Instruction::len()` is the number of bytes consumed. Decoding the same
/// position of an unchanged source always gives the same result.
pub fn decode<S: ByteSource + ?Sized>(
    stream: &mut ByteStream<'_, S>,
) -> Result<Instruction, DecodeError> {
    let start = stream.position();
    let result = decode_inner(stream, start);
    if let Err(err) = &result {
        log(LogCategory::Decoder, LogLevel::Debug, || {
            format!("decode failed at {:05X}: {}", start, err)
        });
    }
    result
}

/// Decode into a caller-owned instruction, returning the bytes consumed.
///
/// `instruction` is left untouched on failure.
pub fn decode_into<S: ByteSource + ?Sized>(
    stream: &mut ByteStream<'_, S>,
    instruction: &mut Instruction,
) -> Result<usize, DecodeError> {
    let decoded = decode(stream)?;
    *instruction = decoded;
    Ok(decoded.len())
}

/// Decode the instruction at `position` of `source`
pub fn decode_at<S: ByteSource + ?Sized>(
    source: &S,
    position: u32,
) -> Result<Instruction, DecodeError> {
    decode(&mut ByteStream::at(source, position))
}

fn decode_inner<S: ByteSource + ?Sized>(
    stream: &mut ByteStream<'_, S>,
    start: u32,
) -> Result<Instruction, DecodeError> {
    let mut segment_override = None;
    let mut repeat = RepeatMode::None;

    let (opcode, entry) = loop {
        let byte = stream.fetch_u8();
        let entry = lookup(byte);
        if entry.mnemonic != Mnemonic::Prefix {
            break (byte, entry);
        }
        match byte {
            0x26 => segment_override = Some(SegmentRegister::ES),
            0x2E => segment_override = Some(SegmentRegister::CS),
            0x36 => segment_override = Some(SegmentRegister::SS),
            0x3E => segment_override = Some(SegmentRegister::DS),
            0xF2 => repeat = RepeatMode::RepeatNotEqual,
            0xF3 => repeat = RepeatMode::Repeat,
            _ => {}
        }
        let consumed = stream.position().wrapping_sub(start) as usize;
        if consumed >= MAX_INSTRUCTION_LEN {
            return Err(DecodeError::TooLong { len: consumed + 1 });
        }
    };

    let mut ctx = DecodeContext {
        opcode,
        modrm: None,
        segment_override,
    };

    let entry: &OpcodeEntry = match entry.group {
        Some(table) => {
            let reg = ctx.modrm(stream).reg;
            let slot = &table[reg as usize];
            if slot.mnemonic == Mnemonic::Invalid {
                return Err(DecodeError::InvalidGroupEntry { opcode, reg });
            }
            slot
        }
        None => entry,
    };
    if entry.mnemonic == Mnemonic::Invalid {
        return Err(DecodeError::InvalidOpcode { opcode });
    }

    let mut ins = Instruction::new(entry.mnemonic);
    ins.segment_override = segment_override;
    ins.repeat = repeat;
    for (slot, method) in ins.operands.iter_mut().zip(entry.operands) {
        *slot = decode_operand(method, &mut ctx, stream)?;
    }

    let end = stream.position();
    let len = end.wrapping_sub(start) as usize;
    if len > MAX_INSTRUCTION_LEN {
        return Err(DecodeError::TooLong { len });
    }

    let mut raw = [0u8; MAX_INSTRUCTION_LEN];
    stream.seek(start);
    for byte in raw.iter_mut().take(len) {
        *byte = stream.fetch_u8();
    }
    ins.set_bytes(&raw[..len]);

    Ok(ins)
}

fn decode_operand<S: ByteSource + ?Sized>(
    method: AddressingMethod,
    ctx: &mut DecodeContext,
    stream: &mut ByteStream<'_, S>,
) -> Result<Operand, DecodeError> {
    use AddressingMethod as Am;

    let operand = match method {
        Am::None => Operand::None,
        Am::Eb => rm_operand(ctx, stream, Width::Byte),
        Am::Ew => rm_operand(ctx, stream, Width::Word),
        Am::Gb => {
            let reg = ctx.modrm(stream).reg;
            Operand::Register(Register::Byte(Register8::from_index(reg)))
        }
        Am::Gw => {
            let reg = ctx.modrm(stream).reg;
            Operand::Register(Register::Word(Register16::from_index(reg)))
        }
        Am::Sw => {
            let reg = ctx.modrm(stream).reg;
            let seg = SegmentRegister::from_index(reg).ok_or(DecodeError::InvalidSegmentRegister {
                opcode: ctx.opcode,
                reg,
            })?;
            Operand::Segment(seg)
        }
        Am::M | Am::Mp => {
            let operand = rm_operand(ctx, stream, Width::Word);
            if !operand.is_memory() {
                return Err(DecodeError::RegisterOperandNotAllowed { opcode: ctx.opcode });
            }
            operand
        }
        Am::Ib => Operand::Immediate(Immediate::Imm8(stream.fetch_u8())),
        Am::Iw => Operand::Immediate(Immediate::Imm16(stream.fetch_u16())),
        Am::Ibs => Operand::Immediate(Immediate::SignExtended(stream.fetch_i8())),
        Am::Jb => Operand::Relative(Relative::Rel8(stream.fetch_i8())),
        Am::Jw => Operand::Relative(Relative::Rel16(stream.fetch_i16())),
        Am::Ob | Am::Ow => Operand::Direct {
            offset: stream.fetch_u16(),
            segment: ctx.segment_or(SegmentRegister::DS),
            width: method.width(),
        },
        Am::Ap => {
            let offset = stream.fetch_u16();
            let segment = stream.fetch_u16();
            Operand::FarPointer { segment, offset }
        }
        Am::One => Operand::Immediate(Immediate::Imm8(1)),
        Am::Reg8(reg) => Operand::Register(Register::Byte(reg)),
        Am::Reg16(reg) => Operand::Register(Register::Word(reg)),
        Am::Seg(seg) => Operand::Segment(seg),
        Am::Xb | Am::Xw => Operand::StringSource {
            segment: ctx.segment_or(SegmentRegister::DS),
            width: method.width(),
        },
        Am::Yb | Am::Yw => Operand::StringDestination {
            width: method.width(),
        },
        Am::Flags => Operand::Flags,
    };
    Ok(operand)
}

/// Register or memory operand named by ModRM r/m, displacement included
fn rm_operand<S: ByteSource + ?Sized>(
    ctx: &mut DecodeContext,
    stream: &mut ByteStream<'_, S>,
    width: Width,
) -> Operand {
    let modrm = ctx.modrm(stream);
    match modrm.rm_mode() {
        RmMode::Register(rm) => match width {
            Width::Byte => Operand::Register(Register::Byte(Register8::from_index(rm))),
            _ => Operand::Register(Register::Word(Register16::from_index(rm))),
        },
        RmMode::Direct => Operand::Direct {
            offset: stream.fetch_u16(),
            segment: ctx.segment_or(SegmentRegister::DS),
            width,
        },
        RmMode::Indirect(base) => Operand::Indirect {
            base,
            segment: ctx.segment_or(base.default_segment()),
            width,
        },
        RmMode::Displaced8(base) => Operand::Displaced {
            base,
            displacement: Displacement::Disp8(stream.fetch_i8()),
            segment: ctx.segment_or(base.default_segment()),
            width,
        },
        RmMode::Displaced16(base) => Operand::Displaced {
            base,
            displacement: Displacement::Disp16(stream.fetch_i16()),
            segment: ctx.segment_or(base.default_segment()),
            width,
        },
    }
}
