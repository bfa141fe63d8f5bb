//! Intel-syntax rendering of decoded instructions.
//!
//! Output follows NASM conventions: memory operands carry a `byte`/`word`
//! size keyword, a segment override is written inside the brackets, and
//! relative branches show their absolute target offset.

use std::fmt::Write;

use crate::instruction::{
    Displacement, Immediate, Instruction, Mnemonic, Operand, RepeatMode, Width,
};

/// Render `ins`, placed at offset `origin`, as one line of assembly
pub fn disassemble(ins: &Instruction, origin: u16) -> String {
    let mut out = String::new();

    let operands: Vec<String> = ins
        .operands
        .iter()
        .filter_map(|operand| format_operand(ins, operand, origin))
        .collect();

    // An override with no bracketed operand to carry it (string ops, xlat)
    // is written as a bare prefix.
    if let Some(segment) = ins.segment_override {
        if !ins.operands.iter().any(Operand::is_memory) {
            out.push_str(segment.name());
            out.push(' ');
        }
    }

    if let Some(prefix) = repeat_prefix(ins) {
        out.push_str(prefix);
        out.push(' ');
    }

    out.push_str(ins.mnemonic.name());
    if !operands.is_empty() {
        out.push(' ');
        out.push_str(&operands.join(", "));
    }
    out
}

fn repeat_prefix(ins: &Instruction) -> Option<&'static str> {
    match ins.repeat {
        RepeatMode::None => None,
        RepeatMode::Repeat if ins.mnemonic.is_compare_string() => Some("repe"),
        RepeatMode::Repeat => Some("rep"),
        RepeatMode::RepeatNotEqual => Some("repne"),
    }
}

/// Memory operands whose size is implied by the instruction
fn omits_size(mnemonic: Mnemonic) -> bool {
    matches!(
        mnemonic,
        Mnemonic::Lea | Mnemonic::Lds | Mnemonic::Les | Mnemonic::JmpFar | Mnemonic::CallFar
    )
}

fn format_operand(ins: &Instruction, operand: &Operand, origin: u16) -> Option<String> {
    let text = match *operand {
        // Implicit operands are part of the mnemonic
        Operand::None
        | Operand::Flags
        | Operand::StringSource { .. }
        | Operand::StringDestination { .. } => return None,
        // The accumulator of stos/lods/scas is implied by the suffix
        Operand::Register(_) if ins.mnemonic.is_string() => return None,
        Operand::Register(reg) => reg.name().to_string(),
        Operand::Segment(seg) => seg.name().to_string(),
        Operand::Immediate(imm) => match imm {
            Immediate::Imm8(v) => format!("0x{:02X}", v),
            Immediate::Imm16(v) => format!("0x{:04X}", v),
            Immediate::SignExtended(v) if v < 0 => format!("-0x{:02X}", (v as i16).unsigned_abs()),
            Immediate::SignExtended(v) => format!("0x{:02X}", v),
        },
        Operand::Relative(_) => {
            let target = ins.branch_target(origin).unwrap_or(0);
            format!("0x{:04X}", target)
        }
        Operand::FarPointer { segment, offset } => format!("0x{:04X}:0x{:04X}", segment, offset),
        Operand::Indirect { base, width, .. } => memory(ins, width, base.name().to_string()),
        Operand::Displaced {
            base,
            displacement,
            width,
            ..
        } => {
            let mut address = base.name().to_string();
            let value = match displacement {
                Displacement::Disp8(d) => d as i16,
                Displacement::Disp16(d) => d,
            };
            if value < 0 {
                let _ = write!(address, "-0x{:02X}", value.unsigned_abs());
            } else {
                let _ = write!(address, "+0x{:02X}", value);
            }
            memory(ins, width, address)
        }
        Operand::Direct { offset, width, .. } => memory(ins, width, format!("0x{:04X}", offset)),
    };
    Some(text)
}

fn memory(ins: &Instruction, width: Width, address: String) -> String {
    let size = match width {
        _ if omits_size(ins.mnemonic) => "",
        Width::Byte => "byte ",
        Width::Word => "word ",
        Width::None => "",
    };
    match ins.segment_override {
        Some(segment) => format!("{}[{}:{}]", size, segment.name(), address),
        None => format!("{}[{}]", size, address),
    }
}
