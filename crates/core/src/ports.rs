//! I/O port space.
//!
//! 65536 byte-wide ports. Every port has a latch byte, so a port nobody has
//! claimed still reads back what was last written to it. A port can also
//! carry a [`PortHandler`] that sees each access first.

use crate::logging::{log, LogCategory, LogLevel};

pub const PORT_COUNT: usize = 0x1_0000;

/// Device behind one or more ports.
///
/// Closure pairs `(FnMut(u16, u8), FnMut(u16) -> u8)` implement this too.
pub trait PortHandler {
    fn output(&mut self, port: u16, value: u8);
    fn input(&mut self, port: u16) -> u8;
}

impl<O, I> PortHandler for (O, I)
where
    O: FnMut(u16, u8),
    I: FnMut(u16) -> u8,
{
    fn output(&mut self, port: u16, value: u8) {
        (self.0)(port, value)
    }

    fn input(&mut self, port: u16) -> u8 {
        (self.1)(port)
    }
}

pub struct Ports {
    handlers: Vec<Option<Box<dyn PortHandler>>>,
    latches: Vec<u8>,
}

impl Ports {
    pub fn new() -> Self {
        let mut handlers = Vec::with_capacity(PORT_COUNT);
        handlers.resize_with(PORT_COUNT, || None);
        Self {
            handlers,
            latches: vec![0; PORT_COUNT],
        }
    }

    /// Attach a handler, returning the one it replaces
    pub fn set_handler<H>(&mut self, port: u16, handler: H) -> Option<Box<dyn PortHandler>>
    where
        H: PortHandler + 'static,
    {
        self.handlers[port as usize].replace(Box::new(handler))
    }

    pub fn remove_handler(&mut self, port: u16) -> Option<Box<dyn PortHandler>> {
        self.handlers[port as usize].take()
    }

    pub fn has_handler(&self, port: u16) -> bool {
        self.handlers[port as usize].is_some()
    }

    /// Last value latched on `port`, without touching its handler
    pub fn latched(&self, port: u16) -> u8 {
        self.latches[port as usize]
    }

    /// `out port, value`
    pub fn out_byte(&mut self, port: u16, value: u8) {
        self.latches[port as usize] = value;
        match self.handlers[port as usize].as_mut() {
            Some(handler) => handler.output(port, value),
            None => log(LogCategory::Ports, LogLevel::Trace, || {
                format!("out {:04X} <- {:02X} (no handler)", port, value)
            }),
        }
    }

    /// `in port`. A handler's value is latched as well.
    pub fn in_byte(&mut self, port: u16) -> u8 {
        match self.handlers[port as usize].as_mut() {
            Some(handler) => {
                let value = handler.input(port);
                self.latches[port as usize] = value;
                value
            }
            None => {
                let value = self.latches[port as usize];
                log(LogCategory::Ports, LogLevel::Trace, || {
                    format!("in {:04X} -> {:02X} (no handler)", port, value)
                });
                value
            }
        }
    }

    /// Word output: low byte to `port`, high byte to `port + 1`
    pub fn out_word(&mut self, port: u16, value: u16) {
        self.out_byte(port, (value & 0xFF) as u8);
        self.out_byte(port.wrapping_add(1), (value >> 8) as u8);
    }

    pub fn in_word(&mut self, port: u16) -> u16 {
        let low = self.in_byte(port) as u16;
        let high = self.in_byte(port.wrapping_add(1)) as u16;
        (high << 8) | low
    }
}

impl Default for Ports {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Ports {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handled = self.handlers.iter().filter(|h| h.is_some()).count();
        f.debug_struct("Ports").field("handlers", &handled).finish()
    }
}
