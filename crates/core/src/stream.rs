//! Sequential byte reader used by the decoder.
//!
//! The stream itself knows nothing about where bytes live. A [`ByteSource`]
//! answers "what byte is at offset N", which lets the same decoder run over a
//! flat buffer (disassembling a file) or over the [`Bus`](crate::bus::Bus)
//! (executing at CS:IP).
//!
//! Reads past the end of a finite source yield zero. The decoder never
//! needs to know where the data stops; a truncated instruction at the end of
//! a buffer simply decodes with zero-filled operands.

/// Byte-at-offset accessor backing a [`ByteStream`]
pub trait ByteSource {
    fn byte_at(&self, offset: u32) -> u8;
}

impl ByteSource for [u8] {
    #[inline]
    fn byte_at(&self, offset: u32) -> u8 {
        self.get(offset as usize).copied().unwrap_or(0)
    }
}

impl ByteSource for Vec<u8> {
    #[inline]
    fn byte_at(&self, offset: u32) -> u8 {
        self.as_slice().byte_at(offset)
    }
}

impl<const N: usize> ByteSource for [u8; N] {
    #[inline]
    fn byte_at(&self, offset: u32) -> u8 {
        self.as_slice().byte_at(offset)
    }
}

/// Adapts any `Fn(u32) -> u8` into a [`ByteSource`]
pub struct FnSource<F>(pub F);

impl<F: Fn(u32) -> u8> ByteSource for FnSource<F> {
    #[inline]
    fn byte_at(&self, offset: u32) -> u8 {
        (self.0)(offset)
    }
}

/// Cursor over a [`ByteSource`]
pub struct ByteStream<'a, S: ByteSource + ?Sized> {
    source: &'a S,
    position: u32,
}

impl<'a, S: ByteSource + ?Sized> ByteStream<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self::at(source, 0)
    }

    /// Create a stream starting at `position`
    pub fn at(source: &'a S, position: u32) -> Self {
        Self { source, position }
    }

    #[inline]
    pub fn position(&self) -> u32 {
        self.position
    }

    /// Move the cursor; used to re-read an instruction once its length is known
    #[inline]
    pub fn seek(&mut self, position: u32) {
        self.position = position;
    }

    /// Look at the next byte without consuming it
    #[inline]
    pub fn peek_u8(&self) -> u8 {
        self.source.byte_at(self.position)
    }

    #[inline]
    pub fn fetch_u8(&mut self) -> u8 {
        let val = self.source.byte_at(self.position);
        self.position = self.position.wrapping_add(1);
        val
    }

    /// Little-endian: low byte first
    #[inline]
    pub fn fetch_u16(&mut self) -> u16 {
        let low = self.fetch_u8() as u16;
        let high = self.fetch_u8() as u16;
        (high << 8) | low
    }

    #[inline]
    pub fn fetch_i8(&mut self) -> i8 {
        self.fetch_u8() as i8
    }

    #[inline]
    pub fn fetch_i16(&mut self) -> i16 {
        self.fetch_u16() as i16
    }
}
