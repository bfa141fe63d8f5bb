//! 16-bit 8086 emulator core.
//!
//! The pieces fit together as a fetch/decode/execute pipeline:
//!
//! - [`stream`] reads bytes from any [`stream::ByteSource`]
//! - [`decoder`] turns them into an [`Instruction`] using the tables in [`opcodes`]
//!   and the ModRM helpers in [`modrm`]
//! - [`cpu`] executes instructions against a [`Bus`] and [`Ports`]
//! - [`disasm`] and [`encoder`] map instructions to text and back to bytes
//! - [`loader`] places flat or MZ images into memory

pub mod bus;
pub mod cpu;
pub mod decoder;
pub mod disasm;
pub mod encoder;
pub mod instruction;
pub mod loader;
pub mod logging;
pub mod modrm;
pub mod opcodes;
pub mod ports;
pub mod stream;

pub use bus::{flat_address, Bus, ListenerId};
pub use cpu::{Cpu, CpuState, ExecError, Flags, Registers, StepOutcome};
pub use decoder::{decode, decode_at, DecodeError};
pub use disasm::disassemble;
pub use encoder::{encode, EncodeError};
pub use instruction::{Instruction, Mnemonic, Operand};
pub use loader::{load_image, LoadError, LoadOptions, LoadedImage};
pub use ports::{PortHandler, Ports};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_and_run_to_halt() {
        // mov cx, 4 ; add ax, cx ; loop -4 ; hlt
        let program = [0xB9, 0x04, 0x00, 0x01, 0xC8, 0xE2, 0xFC, 0xF4];
        let mut bus = Bus::default();
        let image = load_image(&mut bus, &program, LoadOptions::default()).expect("load");

        let mut cpu = Cpu::new(bus);
        image.apply(&mut cpu.regs);

        let mut steps = 0;
        while cpu.step().expect("step") == StepOutcome::Continued {
            steps += 1;
            assert!(steps < 100);
        }
        assert_eq!(cpu.regs.ax, 4 + 3 + 2 + 1);
        assert_eq!(cpu.regs.cx, 0);
        assert!(cpu.is_halted());
    }

    #[test]
    fn test_decode_disassemble_encode_agree() {
        let bytes = [0x26, 0x89, 0x47, 0x10];
        let ins = decode_at(&bytes, 0).expect("decode");
        assert_eq!(disassemble(&ins, 0), "mov word [es:bx+0x10], ax");
        assert_eq!(encode(&ins).expect("encode"), bytes.to_vec());
    }
}
