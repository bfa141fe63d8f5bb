//! Program image loading.
//!
//! Two formats are recognised. An image starting with `MZ` is a DOS
//! executable: its load module is copied one paragraph-aligned block after
//! `segment:origin`'s paragraph, segment fixups from the relocation table are
//! applied, and the initial SS:SP and CS:IP come from the header. Anything
//! else is a flat image copied verbatim to `segment:origin`.
//!
//! Loading writes memory directly; bus listeners are not notified.

use thiserror::Error;

use crate::bus::{flat_address, Bus};
use crate::cpu::Registers;
use crate::logging::{log, LogCategory, LogLevel};

/// Size of the fixed part of an MZ header
const MZ_HEADER_LEN: usize = 28;
const MZ_PAGE: usize = 512;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("image of {len} bytes does not fit in {capacity} bytes of memory")]
    TooLarge { len: usize, capacity: usize },
    #[error("invalid executable header: {0}")]
    InvalidHeader(&'static str),
}

/// Segment images load into unless told otherwise; clear of the interrupt
/// vector table and BIOS data area in the first 0x500 bytes
pub const DEFAULT_LOAD_SEGMENT: u16 = 0x1000;

/// Where an image goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub segment: u16,
    pub origin: u16,
}

impl Default for LoadOptions {
    /// 1000:0100, a flat program's usual origin in a segment of its own
    fn default() -> Self {
        Self {
            segment: DEFAULT_LOAD_SEGMENT,
            origin: 0x0100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Flat,
    Mz,
}

/// A loaded image and the register values it starts with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    pub format: ImageFormat,
    /// Flat address of the first byte copied
    pub address: u32,
    /// Bytes copied into memory
    pub len: usize,
    /// Segment fixups applied
    pub relocations: usize,
    pub cs: u16,
    pub ip: u16,
    pub ss: u16,
    pub sp: u16,
    pub ds: u16,
    pub es: u16,
}

impl LoadedImage {
    /// Set the entry registers; general registers are left alone
    pub fn apply(&self, regs: &mut Registers) {
        regs.cs = self.cs;
        regs.ip = self.ip;
        regs.ss = self.ss;
        regs.sp = self.sp;
        regs.ds = self.ds;
        regs.es = self.es;
    }
}

/// Copy `image` into `bus` as described by `options`
pub fn load_image(bus: &mut Bus, image: &[u8], options: LoadOptions) -> Result<LoadedImage, LoadError> {
    if image.starts_with(b"MZ") {
        load_mz(bus, image, options)
    } else {
        load_flat(bus, image, options)
    }
}

fn check_fits(bus: &Bus, address: u32, len: usize) -> Result<(), LoadError> {
    let capacity = bus.size().saturating_sub(address as usize);
    if len > capacity {
        return Err(LoadError::TooLarge { len, capacity });
    }
    Ok(())
}

fn load_flat(bus: &mut Bus, image: &[u8], options: LoadOptions) -> Result<LoadedImage, LoadError> {
    let address = flat_address(options.segment, options.origin);
    check_fits(bus, address, image.len())?;
    let len = bus.load(address, image);

    log(LogCategory::Bus, LogLevel::Info, || {
        format!(
            "loaded {} byte flat image at {:04X}:{:04X}",
            len, options.segment, options.origin
        )
    });

    Ok(LoadedImage {
        format: ImageFormat::Flat,
        address,
        len,
        relocations: 0,
        cs: options.segment,
        ip: options.origin,
        ss: options.segment,
        sp: 0xFFFE,
        ds: options.segment,
        es: options.segment,
    })
}

/// Little-endian word at `offset`; the caller has checked the bounds
#[inline]
fn word(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

/// Fixed MZ header fields this loader uses
struct MzHeader {
    last_page_len: u16,
    pages: u16,
    relocation_count: usize,
    header_paragraphs: usize,
    ss: u16,
    sp: u16,
    ip: u16,
    cs: u16,
    relocation_offset: usize,
}

impl MzHeader {
    fn parse(data: &[u8]) -> Result<Self, LoadError> {
        if data.len() < MZ_HEADER_LEN {
            return Err(LoadError::InvalidHeader("truncated header"));
        }
        Ok(Self {
            last_page_len: word(data, 2),
            pages: word(data, 4),
            relocation_count: word(data, 6) as usize,
            header_paragraphs: word(data, 8) as usize,
            ss: word(data, 14),
            sp: word(data, 16),
            ip: word(data, 20),
            cs: word(data, 22),
            relocation_offset: word(data, 24) as usize,
        })
    }

    fn header_len(&self) -> usize {
        self.header_paragraphs * 16
    }

    /// File bytes covered by the page counts, header included
    fn file_len(&self) -> usize {
        let pages = self.pages as usize;
        match self.last_page_len as usize {
            0 => pages * MZ_PAGE,
            last => pages.saturating_sub(1) * MZ_PAGE + last,
        }
    }
}

fn load_mz(bus: &mut Bus, data: &[u8], options: LoadOptions) -> Result<LoadedImage, LoadError> {
    let header = MzHeader::parse(data)?;

    let header_len = header.header_len();
    if header_len < MZ_HEADER_LEN || header_len > data.len() {
        return Err(LoadError::InvalidHeader("header size out of range"));
    }
    let file_len = header.file_len().min(data.len());
    if file_len < header_len {
        return Err(LoadError::InvalidHeader("image smaller than its header"));
    }
    let table_end = header.relocation_offset + header.relocation_count * 4;
    if header.relocation_count > 0 && table_end > data.len() {
        return Err(LoadError::InvalidHeader("relocation table out of range"));
    }

    // The load module starts on the first paragraph at or after segment:origin
    let load_segment = options
        .segment
        .wrapping_add(options.origin.wrapping_add(15) >> 4);
    let address = flat_address(load_segment, 0);
    let module = &data[header_len..file_len];
    check_fits(bus, address, module.len())?;
    let len = bus.load(address, module);

    for i in 0..header.relocation_count {
        let entry = header.relocation_offset + i * 4;
        let offset = word(data, entry);
        let segment = word(data, entry + 2);
        let target = flat_address(load_segment.wrapping_add(segment), offset);
        let value = u16::from_le_bytes([bus.peek_byte(target), bus.peek_byte(target + 1)]);
        bus.load(target, &value.wrapping_add(load_segment).to_le_bytes());
    }

    log(LogCategory::Bus, LogLevel::Info, || {
        format!(
            "loaded {} byte MZ module at segment {:04X} ({} relocations)",
            len, load_segment, header.relocation_count
        )
    });

    Ok(LoadedImage {
        format: ImageFormat::Mz,
        address,
        len,
        relocations: header.relocation_count,
        cs: load_segment.wrapping_add(header.cs),
        ip: header.ip,
        ss: load_segment.wrapping_add(header.ss),
        sp: header.sp,
        ds: options.segment,
        es: options.segment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal MZ file: 2-paragraph header, relocation table at 28
    fn build_mz(code: &[u8], cs: u16, ip: u16, ss: u16, sp: u16, relocs: &[(u16, u16)]) -> Vec<u8> {
        let header_len = 32;
        let total = header_len + code.len();
        let mut exe = vec![0u8; total];

        exe[0..2].copy_from_slice(b"MZ");
        exe[2..4].copy_from_slice(&((total % 512) as u16).to_le_bytes());
        exe[4..6].copy_from_slice(&(total.div_ceil(512) as u16).to_le_bytes());
        exe[6..8].copy_from_slice(&(relocs.len() as u16).to_le_bytes());
        exe[8..10].copy_from_slice(&2u16.to_le_bytes());
        exe[14..16].copy_from_slice(&ss.to_le_bytes());
        exe[16..18].copy_from_slice(&sp.to_le_bytes());
        exe[20..22].copy_from_slice(&ip.to_le_bytes());
        exe[22..24].copy_from_slice(&cs.to_le_bytes());
        exe[24..26].copy_from_slice(&28u16.to_le_bytes());
        // One entry fits between the fixed header and the code
        if let Some(&(offset, segment)) = relocs.first() {
            exe[28..30].copy_from_slice(&offset.to_le_bytes());
            exe[30..32].copy_from_slice(&segment.to_le_bytes());
        }
        exe[header_len..].copy_from_slice(code);
        exe
    }

    #[test]
    fn test_flat_default_origin() {
        let mut bus = Bus::default();
        let image = load_image(&mut bus, &[0xB8, 0x34, 0x12], LoadOptions::default()).unwrap();

        assert_eq!(image.format, ImageFormat::Flat);
        assert_eq!(image.address, 0x10100);
        assert_eq!(image.len, 3);
        assert_eq!((image.cs, image.ip, image.sp), (0x1000, 0x0100, 0xFFFE));
        assert_eq!(&bus.memory()[0x10100..0x10103], &[0xB8, 0x34, 0x12]);
        // Interrupt vectors stay untouched
        assert!(bus.memory()[..0x500].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_flat_at_segment() {
        let mut bus = Bus::default();
        let options = LoadOptions {
            segment: 0x1000,
            origin: 0x0000,
        };
        let image = load_image(&mut bus, &[0x90, 0xF4], options).unwrap();

        assert_eq!(image.address, 0x10000);
        assert_eq!((image.cs, image.ds, image.es, image.ss), (0x1000, 0x1000, 0x1000, 0x1000));

        let mut regs = Registers::default();
        image.apply(&mut regs);
        assert_eq!(regs.cs, 0x1000);
        assert_eq!(regs.ip, 0);
        assert_eq!(regs.sp, 0xFFFE);
    }

    #[test]
    fn test_flat_too_large() {
        let mut bus = Bus::new(0x10200);
        let err = load_image(&mut bus, &[0u8; 0x180], LoadOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            LoadError::TooLarge {
                len: 0x180,
                capacity: 0x100
            }
        ));
    }

    #[test]
    fn test_mz_entry_point() {
        let mut bus = Bus::default();
        let exe = build_mz(&[0xB8, 0x34, 0x12, 0xF4], 0, 2, 0x0001, 0x0100, &[]);
        let image = load_image(&mut bus, &exe, LoadOptions::default()).unwrap();

        assert_eq!(image.format, ImageFormat::Mz);
        // Module goes one paragraph block after 1000:0100
        assert_eq!(image.address, 0x10100);
        assert_eq!(image.len, 4);
        assert_eq!((image.cs, image.ip), (0x1010, 2));
        assert_eq!((image.ss, image.sp), (0x1011, 0x0100));
        assert_eq!((image.ds, image.es), (0x1000, 0x1000));
        assert_eq!(&bus.memory()[0x10100..0x10104], &[0xB8, 0x34, 0x12, 0xF4]);
    }

    #[test]
    fn test_mz_relocation() {
        let mut bus = Bus::default();
        // add ax, seg ; hlt
        let exe = build_mz(&[0x05, 0x02, 0x00, 0xF4], 0, 0, 0, 0xFFFE, &[(1, 0)]);
        let options = LoadOptions {
            segment: 0x0200,
            origin: 0x0100,
        };
        let image = load_image(&mut bus, &exe, options).unwrap();

        assert_eq!(image.relocations, 1);
        assert_eq!(image.cs, 0x0210);
        let fixed = u16::from_le_bytes([bus.memory()[0x2101], bus.memory()[0x2102]]);
        assert_eq!(fixed, 0x0212);
    }

    #[test]
    fn test_mz_header_validation() {
        let mut bus = Bus::default();
        assert!(matches!(
            load_image(&mut bus, b"MZ", LoadOptions::default()),
            Err(LoadError::InvalidHeader(_))
        ));

        let mut bad = build_mz(&[0xF4], 0, 0, 0, 0, &[]);
        bad[8..10].copy_from_slice(&0x100u16.to_le_bytes());
        assert!(matches!(
            load_image(&mut bus, &bad, LoadOptions::default()),
            Err(LoadError::InvalidHeader(_))
        ));

        let mut bad = build_mz(&[0xF4], 0, 0, 0, 0, &[]);
        bad[6..8].copy_from_slice(&50u16.to_le_bytes());
        assert!(matches!(
            load_image(&mut bus, &bad, LoadOptions::default()),
            Err(LoadError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_loading_is_silent() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut bus = Bus::default();
        let stores = Rc::new(Cell::new(0));
        let s = Rc::clone(&stores);
        bus.add_listener(|_, _| {}, move |_, _| s.set(s.get() + 1));

        let exe = build_mz(&[0x05, 0x00, 0x00], 0, 0, 0, 0, &[(1, 0)]);
        load_image(&mut bus, &exe, LoadOptions::default()).unwrap();
        assert_eq!(stores.get(), 0);
    }
}
