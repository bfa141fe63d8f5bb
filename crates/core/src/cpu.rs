//! 8086 execution engine.
//!
//! A [`Cpu`] owns its [`Bus`] and [`Ports`]. Each [`Cpu::step`] flattens
//! CS:IP, decodes one instruction from the bus, advances IP past it and then
//! runs the handler for its class. Control transfers therefore see the
//! post-fetch IP, as on hardware.
//!
//! Offsets wrap within their 64K segment before being flattened: a word at
//! `ss:FFFF` is read from `ss:FFFF` and `ss:0000`.

mod alu;
mod execute;
pub mod flags;
pub mod registers;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::bus::{flat_address, Bus};
use crate::decoder::{decode_at, DecodeError};
use crate::disasm::disassemble;
use crate::instruction::{BaseIndex, Instruction, Mnemonic, Operand, Register, SegmentRegister, Width};
use crate::logging::{log, LogCategory, LogConfig, LogLevel};
use crate::ports::Ports;
use crate::stream::FnSource;

pub use flags::Flags;
pub use registers::Registers;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("decode error at {address:05X}: {source}")]
    Decode {
        address: u32,
        #[source]
        source: DecodeError,
    },
    #[error("unimplemented instruction '{mnemonic}' at {address:05X}")]
    Unimplemented { mnemonic: Mnemonic, address: u32 },
    #[error("divide error at {address:05X}")]
    DivideError { address: u32 },
}

/// Result of one successful step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Continued,
    Halted,
}

/// Serializable register/flag snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuState {
    pub registers: Registers,
    /// Packed FLAGS word
    pub flags: u16,
    pub halted: bool,
    pub instructions: u64,
}

#[derive(Debug)]
pub struct Cpu {
    pub regs: Registers,
    pub flags: Flags,
    pub bus: Bus,
    pub ports: Ports,

    /// Instructions retired since reset
    pub instructions: u64,

    halted: bool,
}

impl Cpu {
    pub fn new(bus: Bus) -> Self {
        Self::with_ports(bus, Ports::new())
    }

    pub fn with_ports(bus: Bus, ports: Ports) -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            flags: Flags::default(),
            bus,
            ports,
            instructions: 0,
            halted: false,
        };
        cpu.reset();
        cpu
    }

    /// Power-on state: CS:IP = FFFF:0000, everything else cleared.
    /// Memory, ports and listeners are kept.
    pub fn reset(&mut self) {
        self.regs = Registers {
            cs: 0xFFFF,
            ..Registers::default()
        };
        self.flags = Flags::default();
        self.instructions = 0;
        self.halted = false;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Halt or resume; a halted CPU does not fetch
    pub fn set_halted(&mut self, halted: bool) {
        self.halted = halted;
    }

    /// Flat address of the next instruction
    #[inline]
    pub fn pc(&self) -> u32 {
        flat_address(self.regs.cs, self.regs.ip)
    }

    /// Decode the instruction at CS:IP without running it or notifying
    /// listeners. Bytes past CS:FFFF come from CS:0000.
    pub fn next_instruction(&self) -> Result<Instruction, DecodeError> {
        let (cs, ip) = (self.regs.cs, self.regs.ip);
        let code = FnSource(|position: u32| {
            self.bus
                .peek_byte(flat_address(cs, ip.wrapping_add(position as u16)))
        });
        decode_at(&code, 0)
    }

        /// Execute one instruction.
    ///
    /// On error IP still points at the failing instruction.
    pub fn step(&mut self) -> Result<StepOutcome, ExecError> {
        if self.halted {
            return Ok(StepOutcome::Halted);
        }

        let cs = self.regs.cs;
        let start_ip = self.regs.ip;
        let address = flat_address(cs, start_ip);
        let ins = self
            .next_instruction()
            .map_err(|source| ExecError::Decode { address, source })?;

        for (i, &byte) in ins.bytes().iter().enumerate() {
            let offset = start_ip.wrapping_add(i as u16);
            self.bus.notify_fetch(flat_address(cs, offset), byte);
        }

        if LogConfig::global().should_log(LogCategory::Cpu, LogLevel::Trace) {
            let state = self.register_line();
            log(LogCategory::Cpu, LogLevel::Trace, || {
                format!(
                    "{:04X}:{:04X}  {:<32} {}",
                    self.regs.cs,
                    start_ip,
                    disassemble(&ins, start_ip),
                    state
                )
            });
        }

        self.regs.ip = start_ip.wrapping_add(ins.len() as u16);
        match self.execute(&ins, address) {
            Ok(outcome) => {
                self.instructions += 1;
                Ok(outcome)
            }
            Err(err) => {
                self.regs.ip = start_ip;
                Err(err)
            }
        }
    }

    /// One-line register dump used by tracing and the front end
    pub fn register_line(&self) -> String {
        let r = &self.regs;
        format!(
            "AX={:04X} BX={:04X} CX={:04X} DX={:04X} SP={:04X} BP={:04X} SI={:04X} DI={:04X} \
             DS={:04X} ES={:04X} SS={:04X} CS={:04X} IP={:04X} FL={:04X}",
            r.ax,
            r.bx,
            r.cx,
            r.dx,
            r.sp,
            r.bp,
            r.si,
            r.di,
            r.ds,
            r.es,
            r.ss,
            r.cs,
            r.ip,
            self.flags.pack()
        )
    }

    pub fn state(&self) -> CpuState {
        CpuState {
            registers: self.regs,
            flags: self.flags.pack(),
            halted: self.halted,
            instructions: self.instructions,
        }
    }

    pub fn set_state(&mut self, state: &CpuState) {
        self.regs = state.registers;
        self.flags = Flags::unpack(state.flags);
        self.halted = state.halted;
        self.instructions = state.instructions;
    }

    /// JSON snapshot of the CPU; memory is not included
    pub fn save_state(&self) -> Value {
        serde_json::json!({
            "version": 1,
            "cpu": self.state(),
        })
    }

    pub fn load_state(&mut self, value: &Value) -> Result<(), serde_json::Error> {
        if let Some(cpu) = value.get("cpu") {
            let state: CpuState = serde_json::from_value(cpu.clone())?;
            self.set_state(&state);
        }
        Ok(())
    }

    // Memory access by segment:offset

    #[inline]
    pub fn read_byte(&self, segment: u16, offset: u16) -> u8 {
        self.bus.fetch_byte(flat_address(segment, offset))
    }

    #[inline]
    pub fn write_byte(&mut self, segment: u16, offset: u16, value: u8) {
        self.bus.store_byte(flat_address(segment, offset), value);
    }

    /// Little-endian word; the high byte's offset wraps inside the segment
    #[inline]
    pub fn read_word(&self, segment: u16, offset: u16) -> u16 {
        let low = self.read_byte(segment, offset) as u16;
        let high = self.read_byte(segment, offset.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    #[inline]
    pub fn write_word(&mut self, segment: u16, offset: u16, value: u16) {
        self.write_byte(segment, offset, (value & 0xFF) as u8);
        self.write_byte(segment, offset.wrapping_add(1), (value >> 8) as u8);
    }

    fn read_memory(&self, segment: u16, offset: u16, width: Width) -> u16 {
        match width {
            Width::Byte => self.read_byte(segment, offset) as u16,
            _ => self.read_word(segment, offset),
        }
    }

    fn write_memory(&mut self, segment: u16, offset: u16, width: Width, value: u16) {
        match width {
            Width::Byte => self.write_byte(segment, offset, value as u8),
            _ => self.write_word(segment, offset, value),
        }
    }

    // Stack

    #[inline]
    pub fn push(&mut self, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(2);
        self.write_word(self.regs.ss, self.regs.sp, value);
    }

    #[inline]
    pub fn pop(&mut self) -> u16 {
        let value = self.read_word(self.regs.ss, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    /// Enter interrupt `vector` through the table at 0000:0000
    pub fn interrupt(&mut self, vector: u8) {
        self.push(self.flags.pack());
        self.push(self.regs.cs);
        self.push(self.regs.ip);

        self.flags.interrupt = false;
        self.flags.trap = false;

        let entry = (vector as u16) * 4;
        self.regs.ip = self.read_word(0, entry);
        self.regs.cs = self.read_word(0, entry.wrapping_add(2));
    }

    // Operand access

    /// Offset formed by a base/index combination
    fn base_offset(&self, base: BaseIndex) -> u16 {
        let (first, second) = base.registers();
        let offset = self.regs.word(first);
        match second {
            Some(reg) => offset.wrapping_add(self.regs.word(reg)),
            None => offset,
        }
    }

    /// Segment register value and offset of a memory operand
    fn effective_address(&self, operand: &Operand) -> Option<(u16, u16)> {
        match *operand {
            Operand::Indirect { base, segment, .. } => {
                Some((self.regs.segment(segment), self.base_offset(base)))
            }
            Operand::Displaced {
                base,
                displacement,
                segment,
                ..
            } => Some((
                self.regs.segment(segment),
                self.base_offset(base).wrapping_add(displacement.value()),
            )),
            Operand::Direct {
                offset, segment, ..
            } => Some((self.regs.segment(segment), offset)),
            Operand::StringSource { segment, .. } => {
                Some((self.regs.segment(segment), self.regs.si))
            }
            Operand::StringDestination { .. } => Some((self.regs.es, self.regs.di)),
            _ => None,
        }
    }

    /// Read an operand at its own width (bytes come back zero-extended)
    pub(crate) fn read_operand(&self, operand: &Operand) -> u16 {
        match *operand {
            Operand::Register(Register::Byte(reg)) => self.regs.byte(reg) as u16,
            Operand::Register(Register::Word(reg)) => self.regs.word(reg),
            Operand::Immediate(imm) => imm.value(),
            Operand::Relative(rel) => rel.value(),
            Operand::Segment(seg) => self.regs.segment(seg),
            Operand::Flags => self.flags.pack(),
            Operand::None | Operand::FarPointer { .. } => 0,
            _ => match self.effective_address(operand) {
                Some((segment, offset)) => self.read_memory(segment, offset, operand.width()),
                None => 0,
            },
        }
    }

    pub(crate) fn write_operand(&mut self, operand: &Operand, value: u16) {
        match *operand {
            Operand::Register(Register::Byte(reg)) => self.regs.set_byte(reg, value as u8),
            Operand::Register(Register::Word(reg)) => self.regs.set_word(reg, value),
            Operand::Segment(seg) => self.regs.set_segment(seg, value),
            Operand::Flags => self.flags = Flags::unpack(value),
            Operand::None
            | Operand::Immediate(_)
            | Operand::Relative(_)
            | Operand::FarPointer { .. } => {}
            _ => {
                if let Some((segment, offset)) = self.effective_address(operand) {
                    self.write_memory(segment, offset, operand.width(), value);
                }
            }
        }
    }

    /// `segment:offset` named by a far pointer or a memory dword
    fn far_target(&self, operand: &Operand) -> Option<(u16, u16)> {
        match *operand {
            Operand::FarPointer { segment, offset } => Some((segment, offset)),
            _ => {
                let (segment, offset) = self.effective_address(operand)?;
                let target_offset = self.read_word(segment, offset);
                let target_segment = self.read_word(segment, offset.wrapping_add(2));
                Some((target_segment, target_offset))
            }
        }
    }

    /// Segment register value for instructions with an implicit DS operand
    fn data_segment(&self, ins: &Instruction) -> u16 {
        self.regs
            .segment(ins.segment_override.unwrap_or(SegmentRegister::DS))
    }
}
