//! Execution tests, one file per instruction area.

mod tests_io;
mod tests_stack;

use super::{Cpu, StepOutcome};
use crate::bus::Bus;

/// Where test programs are loaded (0000:0100)
pub(super) const ORIGIN: u16 = 0x0100;

/// CPU with `program` at 0000:0100, all segments zero and SP at FFFE
pub(super) fn cpu_with_program(program: &[u8]) -> Cpu {
    let mut cpu = Cpu::new(Bus::default());
    cpu.bus.load(ORIGIN as u32, program);
    cpu.regs.cs = 0;
    cpu.regs.ip = ORIGIN;
    cpu.regs.sp = 0xFFFE;
    cpu
}

/// Step `count` times, failing the test on any error
pub(super) fn run(cpu: &mut Cpu, count: usize) {
    for _ in 0..count {
        cpu.step().expect("step");
    }
}

/// Step until IP leaves `ip`, returning how many steps that took
pub(super) fn steps_at(cpu: &mut Cpu, ip: u16) -> usize {
    let mut steps = 0;
    while cpu.regs.ip == ip {
        assert_eq!(cpu.step().expect("step"), StepOutcome::Continued);
        steps += 1;
        assert!(steps < 0x20000, "runaway repeat");
    }
    steps
}
