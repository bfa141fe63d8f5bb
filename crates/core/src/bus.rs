//! Flat memory with ordered fetch/store observers.
//!
//! The bus owns the backing bytes. Listeners are plain closures called in
//! registration order, synchronously, with `(address, value)` after every
//! fetch and every store. They only observe: anything they want to record
//! goes through their own interior mutability.

use crate::logging::{log, LogCategory, LogLevel};
use crate::stream::ByteSource;

/// Default memory size: the full 20-bit address space
pub const DEFAULT_MEMORY_SIZE: usize = 0x10_0000;

/// Flatten `segment:offset` into a bus address.
///
/// The sum is not masked to 20 bits: `FFFF:FFFF` gives `0x10FFEF`. With the
/// default 1MB of memory such addresses are out of range, so reads return 0
/// and writes are dropped instead of wrapping to low memory.
#[inline]
pub fn flat_address(segment: u16, offset: u16) -> u32 {
    ((segment as u32) << 4) + (offset as u32)
}

/// Handle returned by [`Bus::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u32);

type Hook = Box<dyn Fn(u32, u8)>;

struct Listener {
    id: ListenerId,
    on_fetch: Hook,
    on_store: Hook,
}

pub struct Bus {
    memory: Vec<u8>,
    listeners: Vec<Listener>,
    next_listener: u32,
}

impl Bus {
    /// Zero-filled memory of `size` bytes
    pub fn new(size: usize) -> Self {
        Self::with_memory(vec![0; size])
    }

    /// Take ownership of an existing memory image
    pub fn with_memory(memory: Vec<u8>) -> Self {
        Self {
            memory,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.memory.len()
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Direct access to the backing bytes; listeners are not notified
    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Register a fetch/store observer pair
    pub fn add_listener<F, S>(&mut self, on_fetch: F, on_store: S) -> ListenerId
    where
        F: Fn(u32, u8) + 'static,
        S: Fn(u32, u8) + 'static,
    {
        let id = ListenerId(self.next_listener);
        self.next_listener = self.next_listener.wrapping_add(1);
        self.listeners.push(Listener {
            id,
            on_fetch: Box::new(on_fetch),
            on_store: Box::new(on_store),
        });
        id
    }

    /// Unregister a listener; the others keep their relative order
    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| l.id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Read a byte without notifying listeners
    #[inline]
    pub fn peek_byte(&self, address: u32) -> u8 {
        match self.memory.get(address as usize) {
            Some(&value) => value,
            None => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("read out of range: {:06X} (size {:X})", address, self.memory.len())
                });
                0
            }
        }
    }

    /// Read a byte and notify every listener
    #[inline]
    pub fn fetch_byte(&self, address: u32) -> u8 {
        let value = self.peek_byte(address);
        self.notify_fetch(address, value);
        value
    }

    /// Write a byte and notify every listener. Writes past the end are dropped.
    #[inline]
    pub fn store_byte(&mut self, address: u32, value: u8) {
        match self.memory.get_mut(address as usize) {
            Some(slot) => *slot = value,
            None => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!(
                        "write out of range: {:06X} <- {:02X} (size {:X})",
                        address,
                        value,
                        self.memory.len()
                    )
                });
            }
        }
        for listener in &self.listeners {
            (listener.on_store)(address, value);
        }
    }

    /// Report a fetch that was served without going through `fetch_byte`
    /// (instruction bytes read by the decoder)
    #[inline]
    pub fn notify_fetch(&self, address: u32, value: u8) {
        for listener in &self.listeners {
            (listener.on_fetch)(address, value);
        }
    }

    /// Little-endian word: low byte at `address`
    pub fn fetch_word(&self, address: u32) -> u16 {
        let low = self.fetch_byte(address) as u16;
        let high = self.fetch_byte(address.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    pub fn store_word(&mut self, address: u32, value: u16) {
        self.store_byte(address, (value & 0xFF) as u8);
        self.store_byte(address.wrapping_add(1), (value >> 8) as u8);
    }

    /// Copy `data` into memory at `address` without notifying listeners.
    ///
    /// Returns the number of bytes that fit.
    pub fn load(&mut self, address: u32, data: &[u8]) -> usize {
        let start = (address as usize).min(self.memory.len());
        let end = start.saturating_add(data.len()).min(self.memory.len());
        let count = end - start;
        self.memory[start..end].copy_from_slice(&data[..count]);
        count
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE)
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("size", &self.memory.len())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// The decoder reads instruction bytes silently; the CPU reports them once
/// the instruction length is known.
impl ByteSource for Bus {
    #[inline]
    fn byte_at(&self, offset: u32) -> u8 {
        self.peek_byte(offset)
    }
}
