//! Tests for stack, call/return and interrupt instructions

use super::{cpu_with_program, run, ORIGIN};
use crate::cpu::flags::FLAGS_RESERVED;

#[test]
fn test_push_pop_are_inverses() {
    // push ax ; pop bx
    let mut cpu = cpu_with_program(&[0x50, 0x5B]);

    for value in [0x0000u16, 0x0001, 0x1234, 0x8000, 0xFFFF] {
        cpu.regs.ip = ORIGIN;
        cpu.regs.ax = value;
        let sp = cpu.regs.sp;

        cpu.step().unwrap();
        assert_eq!(cpu.regs.sp, sp.wrapping_sub(2));
        assert_eq!(cpu.read_word(cpu.regs.ss, cpu.regs.sp), value);

        cpu.step().unwrap();
        assert_eq!(cpu.regs.bx, value);
        assert_eq!(cpu.regs.sp, sp);
    }
}

#[test]
fn test_push_sp_pushes_decremented_value() {
    let mut cpu = cpu_with_program(&[0x54]);
    cpu.step().unwrap();
    assert_eq!(cpu.regs.sp, 0xFFFC);
    assert_eq!(cpu.read_word(0, 0xFFFC), 0xFFFC);
}

#[test]
fn test_stack_wraps_in_segment() {
    // push ax with SP = 0
    let mut cpu = cpu_with_program(&[0x50]);
    cpu.regs.ss = 0x1000;
    cpu.regs.sp = 0x0000;
    cpu.regs.ax = 0xBEEF;

    cpu.step().unwrap();
    assert_eq!(cpu.regs.sp, 0xFFFE);
    assert_eq!(cpu.read_word(0x1000, 0xFFFE), 0xBEEF);
}

#[test]
fn test_segment_push_pop() {
    // push ds ; pop es
    let mut cpu = cpu_with_program(&[0x1E, 0x07]);
    cpu.regs.ds = 0x1234;

    run(&mut cpu, 2);
    assert_eq!(cpu.regs.es, 0x1234);
    assert_eq!(cpu.regs.sp, 0xFFFE);
}

#[test]
fn test_pop_to_memory() {
    // push ax ; pop word [0x2000]
    let mut cpu = cpu_with_program(&[0x50, 0x8F, 0x06, 0x00, 0x20]);
    cpu.regs.ax = 0xCAFE;

    run(&mut cpu, 2);
    assert_eq!(cpu.read_word(0, 0x2000), 0xCAFE);
}

#[test]
fn test_pushf_popf() {
    // pushf ; popf
    let mut cpu = cpu_with_program(&[0x9C, 0x9D]);
    cpu.flags.carry = true;
    cpu.flags.direction = true;

    cpu.step().unwrap();
    let pushed = cpu.read_word(0, cpu.regs.sp);
    assert_eq!(pushed, FLAGS_RESERVED | 0x0401);

    cpu.flags.carry = false;
    cpu.flags.direction = false;
    cpu.write_word(0, cpu.regs.sp, 0x0841);

    cpu.step().unwrap();
    assert!(cpu.flags.carry);
    assert!(cpu.flags.zero);
    assert!(cpu.flags.overflow);
    assert!(!cpu.flags.direction);
    assert_eq!(cpu.flags.pack(), FLAGS_RESERVED | 0x0841);
}

#[test]
fn test_call_and_ret() {
    // call +3 ; nop ; nop ; nop ; ret
    let mut cpu = cpu_with_program(&[0xE8, 0x03, 0x00, 0x90, 0x90, 0x90, 0xC3]);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, ORIGIN + 6);
    assert_eq!(cpu.regs.sp, 0xFFFC);
    assert_eq!(cpu.read_word(0, 0xFFFC), ORIGIN + 3);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, ORIGIN + 3);
    assert_eq!(cpu.regs.sp, 0xFFFE);
}

#[test]
fn test_call_indirect_register() {
    // call bx
    let mut cpu = cpu_with_program(&[0xFF, 0xD3]);
    cpu.regs.bx = 0x0400;

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0400);
    assert_eq!(cpu.read_word(0, cpu.regs.sp), ORIGIN + 2);
}

#[test]
fn test_ret_with_immediate_releases_arguments() {
    // ret 4
    let mut cpu = cpu_with_program(&[0xC2, 0x04, 0x00]);
    cpu.regs.sp = 0xFFF0;
    cpu.write_word(0, 0xFFF0, 0x0200);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0200);
    assert_eq!(cpu.regs.sp, 0xFFF6);
}

#[test]
fn test_far_call_and_retf() {
    // call 0x0050:0x0000 ; (at 0050:0000) retf
    let mut cpu = cpu_with_program(&[0x9A, 0x00, 0x00, 0x50, 0x00]);
    cpu.bus.load(0x0500, &[0xCB]);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x0050);
    assert_eq!(cpu.regs.ip, 0x0000);
    assert_eq!(cpu.read_word(0, cpu.regs.sp), ORIGIN + 5);
    assert_eq!(cpu.read_word(0, cpu.regs.sp + 2), 0x0000);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x0000);
    assert_eq!(cpu.regs.ip, ORIGIN + 5);
    assert_eq!(cpu.regs.sp, 0xFFFE);
}

#[test]
fn test_far_call_through_memory() {
    // call far [0x2000]
    let mut cpu = cpu_with_program(&[0xFF, 0x1E, 0x00, 0x20]);
    cpu.write_word(0, 0x2000, 0x0010);
    cpu.write_word(0, 0x2002, 0x0800);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x0800);
    assert_eq!(cpu.regs.ip, 0x0010);
}

#[test]
fn test_int_and_iret() {
    // int 0x21 ; (handler at 0000:0300) iret
    let mut cpu = cpu_with_program(&[0xCD, 0x21]);
    cpu.write_word(0, 0x21 * 4, 0x0300);
    cpu.write_word(0, 0x21 * 4 + 2, 0x0000);
    cpu.bus.load(0x0300, &[0xCF]);
    cpu.flags.interrupt = true;
    cpu.flags.carry = true;

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0300);
    assert_eq!(cpu.regs.cs, 0x0000);
    assert!(!cpu.flags.interrupt);
    assert_eq!(cpu.regs.sp, 0xFFF8);
    assert_eq!(cpu.read_word(0, 0xFFF8), ORIGIN + 2);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, ORIGIN + 2);
    assert!(cpu.flags.interrupt);
    assert!(cpu.flags.carry);
    assert_eq!(cpu.regs.sp, 0xFFFE);
}

#[test]
fn test_into_only_with_overflow() {
    // into ; into
    let mut cpu = cpu_with_program(&[0xCE, 0xCE]);
    cpu.write_word(0, 4 * 4, 0x0700);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, ORIGIN + 1);

    cpu.flags.overflow = true;
    cpu.step().unwrap();
    assert_eq!(cpu.regs.ip, 0x0700);
}

#[test]
fn test_int3_uses_vector_three() {
    let mut cpu = cpu_with_program(&[0xCC]);
    cpu.write_word(0, 3 * 4, 0x0123);
    cpu.write_word(0, 3 * 4 + 2, 0x0040);

    cpu.step().unwrap();
    assert_eq!(cpu.regs.cs, 0x0040);
    assert_eq!(cpu.regs.ip, 0x0123);
}
