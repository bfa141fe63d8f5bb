//! Instruction encoder, the inverse of [`crate::decoder`].
//!
//! Every table row (primary or group slot) whose class matches is tried
//! against the instruction's operands; the shortest encoding wins and table
//! order breaks ties. Operand variants are taken literally: an `Imm8` only
//! fits `Ib`, a `Disp16` is always emitted as two bytes, and so on, so
//! bytes produced by an assembler's canonical choices survive a
//! decode/encode round trip unchanged.
//!
//! Prefixes come out in one fixed order, repeat before segment override,
//! whatever order they were decoded in. `2E F3 A4` re-encodes as `F3 2E A4`.

use thiserror::Error;

use crate::instruction::{
    BaseIndex, Displacement, Immediate, Instruction, Mnemonic, Operand, Register, Relative,
    RepeatMode, SegmentRegister, Width,
};
use crate::opcodes::{AddressingMethod, OpcodeEntry, PRIMARY};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("no encoding of '{mnemonic}' takes these operands")]
    NoEncoding { mnemonic: Mnemonic },
    #[error("cannot encode {0}")]
    Unencodable(&'static str),
}

/// Encode one instruction, prefixes included
pub fn encode(ins: &Instruction) -> Result<Vec<u8>, EncodeError> {
    if ins.mnemonic.is_table_only() {
        return Err(EncodeError::Unencodable("a table-only class"));
    }

    let mut best: Option<Vec<u8>> = None;
    for (opcode, entry) in PRIMARY.iter().enumerate() {
        let opcode = opcode as u8;
        match entry.group {
            Some(table) => {
                for (reg, slot) in table.iter().enumerate() {
                    if slot.mnemonic == ins.mnemonic {
                        keep_shorter(&mut best, encode_entry(ins, opcode, Some(reg as u8), slot));
                    }
                }
            }
            None if entry.mnemonic == ins.mnemonic => {
                keep_shorter(&mut best, encode_entry(ins, opcode, None, entry));
            }
            None => {}
        }
    }

    let body = best.ok_or(EncodeError::NoEncoding {
        mnemonic: ins.mnemonic,
    })?;

    let mut bytes = Vec::with_capacity(body.len() + 2);
    match ins.repeat {
        RepeatMode::None => {}
        RepeatMode::Repeat => bytes.push(0xF3),
        RepeatMode::RepeatNotEqual => bytes.push(0xF2),
    }
    if let Some(segment) = segment_prefix(ins) {
        bytes.push(match segment {
            SegmentRegister::ES => 0x26,
            SegmentRegister::CS => 0x2E,
            SegmentRegister::SS => 0x36,
            SegmentRegister::DS => 0x3E,
        });
    }
    bytes.extend(body);
    Ok(bytes)
}

fn keep_shorter(best: &mut Option<Vec<u8>>, candidate: Option<Vec<u8>>) {
    if let Some(candidate) = candidate {
        let shorter = best.as_ref().map_or(true, |b| candidate.len() < b.len());
        if shorter {
            *best = Some(candidate);
        }
    }
}

/// Explicit override, or the segment of a memory operand that does not use
/// its default
fn segment_prefix(ins: &Instruction) -> Option<SegmentRegister> {
    ins.segment_override
        .or_else(|| ins.operands.iter().find_map(implied_override))
}

fn implied_override(operand: &Operand) -> Option<SegmentRegister> {
    let (segment, default) = match *operand {
        Operand::Indirect { base, segment, .. } | Operand::Displaced { base, segment, .. } => {
            (segment, base.default_segment())
        }
        Operand::Direct { segment, .. } | Operand::StringSource { segment, .. } => {
            (segment, SegmentRegister::DS)
        }
        _ => return None,
    };
    (segment != default).then_some(segment)
}

/// ModRM fields and trailing bytes collected while matching one row
#[derive(Default)]
struct Fields {
    reg: Option<u8>,
    /// mod and r/m bits of the ModRM byte
    rm: Option<u8>,
    /// Displacement and immediate bytes, in operand order
    tail: Vec<u8>,
}

impl Fields {
    fn memory(&mut self, operand: &Operand) {
        match *operand {
            // mod 00 r/m 110 is a direct address, so [bp] needs a zero disp8
            Operand::Indirect {
                base: BaseIndex::Bp,
                ..
            } => {
                self.rm = Some(0x40 | BaseIndex::Bp.rm());
                self.tail.push(0);
            }
            Operand::Indirect { base, .. } => self.rm = Some(base.rm()),
            Operand::Displaced {
                base,
                displacement: Displacement::Disp8(d),
                ..
            } => {
                self.rm = Some(0x40 | base.rm());
                self.tail.push(d as u8);
            }
            Operand::Displaced {
                base,
                displacement: Displacement::Disp16(d),
                ..
            } => {
                self.rm = Some(0x80 | base.rm());
                self.tail.extend(d.to_le_bytes());
            }
            Operand::Direct { offset, .. } => {
                self.rm = Some(0x06);
                self.tail.extend(offset.to_le_bytes());
            }
            _ => {}
        }
    }

    /// Record `operand` under `method`, or `None` if it does not fit
    fn place(&mut self, operand: &Operand, method: AddressingMethod) -> Option<()> {
        use AddressingMethod as Am;

        match (method, *operand) {
            (Am::None, Operand::None) => {}
            (Am::Eb, Operand::Register(Register::Byte(r))) => self.rm = Some(0xC0 | r.index()),
            (Am::Ew, Operand::Register(Register::Word(r))) => self.rm = Some(0xC0 | r.index()),
            (Am::Eb, op) if op.is_memory() && op.width() == Width::Byte => self.memory(&op),
            (Am::Ew, op) if op.is_memory() && op.width() == Width::Word => self.memory(&op),
            (Am::M | Am::Mp, op) if op.is_memory() => self.memory(&op),
            (Am::Gb, Operand::Register(Register::Byte(r))) => self.reg = Some(r.index()),
            (Am::Gw, Operand::Register(Register::Word(r))) => self.reg = Some(r.index()),
            (Am::Sw, Operand::Segment(s)) => self.reg = Some(s.index()),
            (Am::Ib, Operand::Immediate(Immediate::Imm8(v))) => self.tail.push(v),
            (Am::Iw, Operand::Immediate(Immediate::Imm16(v))) => self.tail.extend(v.to_le_bytes()),
            (Am::Ibs, Operand::Immediate(Immediate::SignExtended(v))) => self.tail.push(v as u8),
            (Am::Jb, Operand::Relative(Relative::Rel8(d))) => self.tail.push(d as u8),
            (Am::Jw, Operand::Relative(Relative::Rel16(d))) => self.tail.extend(d.to_le_bytes()),
            (
                Am::Ob,
                Operand::Direct {
                    offset,
                    width: Width::Byte,
                    ..
                },
            )
            | (
                Am::Ow,
                Operand::Direct {
                    offset,
                    width: Width::Word,
                    ..
                },
            ) => self.tail.extend(offset.to_le_bytes()),
            (Am::Ap, Operand::FarPointer { segment, offset }) => {
                self.tail.extend(offset.to_le_bytes());
                self.tail.extend(segment.to_le_bytes());
            }
            (Am::One, Operand::Immediate(Immediate::Imm8(1))) => {}
            (Am::Reg8(a), Operand::Register(Register::Byte(b))) if a == b => {}
            (Am::Reg16(a), Operand::Register(Register::Word(b))) if a == b => {}
            (Am::Seg(a), Operand::Segment(b)) if a == b => {}
            (Am::Xb, Operand::StringSource { width: Width::Byte, .. })
            | (Am::Xw, Operand::StringSource { width: Width::Word, .. })
            | (Am::Yb, Operand::StringDestination { width: Width::Byte })
            | (Am::Yw, Operand::StringDestination { width: Width::Word }) => {}
            (Am::Flags, Operand::Flags) => {}
            _ => return None,
        }
        Some(())
    }
}

/// Bytes for `ins` through one table row, without prefixes
fn encode_entry(
    ins: &Instruction,
    opcode: u8,
    group_reg: Option<u8>,
    entry: &OpcodeEntry,
) -> Option<Vec<u8>> {
    let mut fields = Fields {
        reg: group_reg,
        ..Fields::default()
    };
    for (operand, method) in ins.operands.iter().zip(entry.operands) {
        fields.place(operand, method)?;
    }

    let mut bytes = Vec::with_capacity(2 + fields.tail.len());
    bytes.push(opcode);
    if group_reg.is_some() || entry.uses_modrm() {
        let rm = fields.rm?;
        bytes.push(((fields.reg.unwrap_or(0) & 0x07) << 3) | rm);
    }
    bytes.extend(fields.tail);
    Some(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode_at;
    use crate::instruction::{Register16, Register8};

    fn ax() -> Operand {
        Operand::Register(Register::Word(Register16::AX))
    }

    #[test]
    fn test_round_trip_canonical_forms() {
        let programs: &[&[u8]] = &[
            &[0x00, 0x19],
            &[0x01, 0xD8],
            &[0x86, 0xD9],
            &[0x8B, 0x00],
            &[0x89, 0x07],
            &[0x8B, 0x46, 0xFE],
            &[0x8B, 0x46, 0x00],
            &[0x88, 0x80, 0x34, 0x12],
            &[0xC7, 0x06, 0x00, 0x20, 0x34, 0x12],
            &[0xA1, 0x00, 0x20],
            &[0x8E, 0xC0],
            &[0x8C, 0xD8],
            &[0x06],
            &[0x1F],
            &[0x50],
            &[0xFF, 0x37],
            &[0x8F, 0x06, 0x00, 0x20],
            &[0x05, 0x34, 0x12],
            &[0x81, 0xC3, 0x34, 0x12],
            &[0x83, 0xC3, 0xFF],
            &[0x80, 0x53, 0xFE, 0x07],
            &[0x3A, 0x06, 0x10, 0x00],
            &[0x74, 0x10],
            &[0xE9, 0x00, 0x01],
            &[0xEB, 0x05],
            &[0xE8, 0xFD, 0xFF],
            &[0x9A, 0x00, 0x00, 0x50, 0x00],
            &[0xEA, 0x00, 0x01, 0x00, 0xF0],
            &[0xFF, 0x1F],
            &[0xFF, 0xE0],
            &[0xC3],
            &[0xC2, 0x04, 0x00],
            &[0xCB],
            &[0xCD, 0x21],
            &[0xCC],
            &[0xCF],
            &[0xE2, 0xFE],
            &[0xE4, 0x60],
            &[0xEE],
            &[0xED],
            &[0xF3, 0xA5],
            &[0xF2, 0xAE],
            &[0x26, 0xAC],
            &[0x2E, 0x8B, 0x07],
            &[0xD1, 0xE0],
            &[0xD2, 0x3F],
            &[0x8D, 0x77, 0x10],
            &[0xC4, 0x3E, 0x00, 0x20],
            &[0xC5, 0x76, 0x00],
            &[0xA8, 0x80],
            &[0xF7, 0x07, 0x01, 0x00],
            &[0xF7, 0xD0],
            &[0xF6, 0xE1],
            &[0xF7, 0x34],
            &[0xD4, 0x0A],
            &[0xD7],
            &[0x9C],
            &[0x98],
            &[0xF4],
            &[0x90],
            &[0xF0],
            &[0x9B],
            &[0xFE, 0x07],
            &[0x49],
            &[0xB1, 0x05],
            &[0x92],
            &[0xD8, 0xC0],
        ];

        for bytes in programs {
            let ins = decode_at(*bytes, 0).expect("decode");
            assert_eq!(ins.len(), bytes.len(), "{:02X?}", bytes);
            let encoded = encode(&ins).expect("encode");
            assert_eq!(&encoded[..], *bytes, "{:?}", ins);
        }
    }

    #[test]
    fn test_built_instruction() {
        let ins = Instruction::with_operands(
            Mnemonic::Mov,
            ax(),
            Operand::Immediate(Immediate::Imm16(0x1234)),
        );
        assert_eq!(encode(&ins).unwrap(), vec![0xB8, 0x34, 0x12]);
    }

    #[test]
    fn test_picks_shortest_form() {
        // inc ax: 0x40 rather than FF /0
        let inc = Instruction::with_operands(Mnemonic::Inc, ax(), Operand::None);
        assert_eq!(encode(&inc).unwrap(), vec![0x40]);

        // xchg ax, cx: 0x91 rather than 87 /r
        let xchg = Instruction::with_operands(
            Mnemonic::Xchg,
            ax(),
            Operand::Register(Register::Word(Register16::CX)),
        );
        assert_eq!(encode(&xchg).unwrap(), vec![0x91]);

        // mov al, [0x0010]: A0 rather than 8A /r
        let load = decode_at(&[0x8A, 0x06, 0x10, 0x00], 0).unwrap();
        assert_eq!(encode(&load).unwrap(), vec![0xA0, 0x10, 0x00]);

        // 0x82 is an alias; the encoder emits 0x80
        let alias = decode_at(&[0x82, 0x07, 0x01], 0).unwrap();
        assert_eq!(encode(&alias).unwrap(), vec![0x80, 0x07, 0x01]);
    }

    #[test]
    fn test_bp_without_displacement() {
        let ins = Instruction::with_operands(
            Mnemonic::Mov,
            ax(),
            Operand::Indirect {
                base: BaseIndex::Bp,
                segment: SegmentRegister::SS,
                width: Width::Word,
            },
        );
        assert_eq!(encode(&ins).unwrap(), vec![0x8B, 0x46, 0x00]);
    }

    #[test]
    fn test_non_default_segment_gets_prefix() {
        let ins = Instruction::with_operands(
            Mnemonic::Mov,
            Operand::Register(Register::Byte(Register8::AL)),
            Operand::Indirect {
                base: BaseIndex::Bx,
                segment: SegmentRegister::ES,
                width: Width::Byte,
            },
        );
        assert_eq!(encode(&ins).unwrap(), vec![0x26, 0x8A, 0x07]);
    }

    #[test]
    fn test_prefix_order_is_fixed() {
        let swapped = decode_at(&[0x2E, 0xF3, 0xA4], 0).unwrap();
        assert_eq!(encode(&swapped).unwrap(), vec![0xF3, 0x2E, 0xA4]);

        let canonical = decode_at(&[0xF3, 0x2E, 0xA4], 0).unwrap();
        assert_eq!(encode(&canonical).unwrap(), vec![0xF3, 0x2E, 0xA4]);
    }

    #[test]
    fn test_failures() {
        let bad = Instruction::with_operands(
            Mnemonic::Mov,
            Operand::Immediate(Immediate::Imm8(1)),
            Operand::Register(Register::Byte(Register8::AL)),
        );
        assert_eq!(
            encode(&bad),
            Err(EncodeError::NoEncoding {
                mnemonic: Mnemonic::Mov
            })
        );

        // Only a count of 1 has a short form, and there is no imm8 count on the 8086
        let shift = Instruction::with_operands(
            Mnemonic::Shl,
            ax(),
            Operand::Immediate(Immediate::Imm8(2)),
        );
        assert!(matches!(encode(&shift), Err(EncodeError::NoEncoding { .. })));

        assert!(matches!(
            encode(&Instruction::new(Mnemonic::Prefix)),
            Err(EncodeError::Unencodable(_))
        ));
    }
}
