//! Tests for port I/O and bus observation from the CPU

use std::cell::RefCell;
use std::rc::Rc;

use super::{cpu_with_program, run, ORIGIN};

#[test]
fn test_out_reaches_handler() {
    // mov al, 'A' ; out 0x80, al
    let mut cpu = cpu_with_program(&[0xB0, 0x41, 0xE6, 0x80]);
    let written = Rc::new(RefCell::new(Vec::new()));
    let w = Rc::clone(&written);
    cpu.ports.set_handler(
        0x80,
        (
            move |port: u16, value: u8| w.borrow_mut().push((port, value)),
            |_: u16| 0u8,
        ),
    );

    run(&mut cpu, 2);
    assert_eq!(*written.borrow(), vec![(0x80, 0x41)]);
    assert_eq!(cpu.ports.latched(0x80), 0x41);
}

#[test]
fn test_in_from_handler() {
    // in al, 0x60
    let mut cpu = cpu_with_program(&[0xE4, 0x60]);
    cpu.ports
        .set_handler(0x60, (|_: u16, _: u8| {}, |_: u16| 0x1Cu8));
    cpu.regs.ax = 0xFF00;

    cpu.step().unwrap();
    assert_eq!(cpu.regs.ax, 0xFF1C);
}

#[test]
fn test_word_io_through_dx() {
    // mov dx, 0x0300 ; out dx, ax ; xor ax, ax ; in ax, dx
    let mut cpu = cpu_with_program(&[0xBA, 0x00, 0x03, 0xEF, 0x31, 0xC0, 0xED]);
    cpu.regs.ax = 0xBEEF;

    run(&mut cpu, 4);
    assert_eq!(cpu.ports.latched(0x0300), 0xEF);
    assert_eq!(cpu.ports.latched(0x0301), 0xBE);
    assert_eq!(cpu.regs.ax, 0xBEEF);
}

#[test]
fn test_listeners_see_fetches_and_stores() {
    // mov [0x2000], al
    let mut cpu = cpu_with_program(&[0xA2, 0x00, 0x20]);
    cpu.regs.ax = 0x0077;

    let fetches = Rc::new(RefCell::new(Vec::new()));
    let stores = Rc::new(RefCell::new(Vec::new()));
    let f = Rc::clone(&fetches);
    let s = Rc::clone(&stores);
    cpu.bus.add_listener(
        move |addr, value| f.borrow_mut().push((addr, value)),
        move |addr, value| s.borrow_mut().push((addr, value)),
    );

    cpu.step().unwrap();

    let origin = ORIGIN as u32;
    assert_eq!(
        *fetches.borrow(),
        vec![(origin, 0xA2), (origin + 1, 0x00), (origin + 2, 0x20)]
    );
    assert_eq!(*stores.borrow(), vec![(0x2000, 0x77)]);
}
