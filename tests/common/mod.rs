// Shared fixtures for the integration tests
// Builds raw TIFF blobs byte by byte, without going through the engine.

#![allow(dead_code)]

use tagdir::{ByteOrder, Format};

/// One raw entry record.
#[derive(Debug, Clone, Copy)]
pub struct Raw {
    pub tag: u16,
    pub format: Format,
    pub count: u32,
    pub field: [u8; 4],
}

impl Raw {
    pub fn short(order: ByteOrder, tag: u16, value: u16) -> Self {
        let mut field = [0u8; 4];
        order.patch_u16(&mut field, 0, value);
        Self { tag, format: Format::Short, count: 1, field }
    }

    pub fn long(order: ByteOrder, tag: u16, value: u32) -> Self {
        let mut field = [0u8; 4];
        order.patch_u32(&mut field, 0, value);
        Self { tag, format: Format::Long, count: 1, field }
    }

    /// An entry whose value lives at `offset`.
    pub fn at(order: ByteOrder, tag: u16, format: Format, count: u32, offset: u32) -> Self {
        let mut field = [0u8; 4];
        order.patch_u32(&mut field, 0, offset);
        Self { tag, format, count, field }
    }

    pub fn inline(tag: u16, format: Format, count: u32, bytes: &[u8]) -> Self {
        let mut field = [0u8; 4];
        field[..bytes.len()].copy_from_slice(bytes);
        Self { tag, format, count, field }
    }
}

/// A TIFF blob under construction. Offsets are relative to the header.
pub struct Image {
    pub order: ByteOrder,
    pub bytes: Vec<u8>,
}

impl Image {
    pub fn new(order: ByteOrder) -> Self {
        let mut bytes = order.marker().to_vec();
        let mut rest = Vec::new();
        order.put_u16(&mut rest, 42);
        order.put_u32(&mut rest, 0);
        bytes.extend_from_slice(&rest);
        Self { order, bytes }
    }

    pub fn set_ifd0(&mut self, offset: u32) {
        self.order.patch_u32(&mut self.bytes, 4, offset);
    }

    /// Append `data` at the next even position and return its offset.
    pub fn append(&mut self, data: &[u8]) -> u32 {
        if self.bytes.len() % 2 == 1 {
            self.bytes.push(0);
        }
        let at = self.bytes.len() as u32;
        self.bytes.extend_from_slice(data);
        at
    }

    /// Append a directory with `entries` (kept in the given order) and a zero
    /// next pointer.
    pub fn directory(&mut self, entries: &[Raw]) -> u32 {
        let data = directory_bytes(self.order, entries, 0);
        self.append(&data)
    }

    pub fn set_next(&mut self, dir: u32, next: u32) {
        let count = self.order.u16(&self.bytes[dir as usize..]) as usize;
        let at = dir as usize + 2 + count * 12;
        self.order.patch_u32(&mut self.bytes, at, next);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Directory bytes without any value area.
pub fn directory_bytes(order: ByteOrder, entries: &[Raw], next: u32) -> Vec<u8> {
    let mut out = Vec::new();
    order.put_u16(&mut out, entries.len() as u16);
    for e in entries {
        order.put_u16(&mut out, e.tag);
        order.put_u16(&mut out, e.format.code());
        order.put_u32(&mut out, e.count);
        out.extend_from_slice(&e.field);
    }
    order.put_u32(&mut out, next);
    out
}

/// Tags of the directory at `offset`, in stored order.
pub fn tags_at(bytes: &[u8], order: ByteOrder, offset: usize) -> Vec<u16> {
    let count = order.u16(&bytes[offset..]) as usize;
    (0..count).map(|i| order.u16(&bytes[offset + 2 + i * 12..])).collect()
}

/// The raw record for `tag` in the directory at `offset`.
pub fn record(bytes: &[u8], order: ByteOrder, offset: usize, tag: u16) -> Option<Raw> {
    let count = order.u16(&bytes[offset..]) as usize;
    (0..count).find_map(|i| {
        let at = offset + 2 + i * 12;
        if order.u16(&bytes[at..]) != tag {
            return None;
        }
        let format = Format::from_u16(order.u16(&bytes[at + 2..]))?;
        let mut field = [0u8; 4];
        field.copy_from_slice(&bytes[at + 8..at + 12]);
        Some(Raw { tag, format, count: order.u32(&bytes[at + 4..]), field })
    })
}

/// Next pointer of the directory at `offset`.
pub fn next_of(bytes: &[u8], order: ByteOrder, offset: usize) -> u32 {
    let count = order.u16(&bytes[offset..]) as usize;
    order.u32(&bytes[offset + 2 + count * 12..])
}

/// A small EXIF blob: IFD0 with Make, Model, Orientation, an ExifIFD with
/// ISO and DateTimeOriginal, and IFD1 with a thumbnail.
pub fn camera_tiff(order: ByteOrder) -> Vec<u8> {
    let mut image = Image::new(order);
    let make = image.append(b"Acme Optics\0");
    let model = image.append(b"Model X\0");
    let date = image.append(b"2023:01:02 03:04:05\0");
    let thumb = image.append(&[0xff, 0xd8, 0x01, 0x02, 0x03, 0xff, 0xd9]);

    let exif = image.directory(&[
        Raw::short(order, 0x8827, 200),
        Raw::at(order, 0x9003, Format::Ascii, 20, date),
    ]);
    let ifd1 = image.directory(&[
        Raw::short(order, 0x0103, 6),
        Raw::long(order, 0x0201, thumb),
        Raw::long(order, 0x0202, 7),
    ]);
    let ifd0 = image.directory(&[
        Raw::at(order, 0x010f, Format::Ascii, 12, make),
        Raw::at(order, 0x0110, Format::Ascii, 8, model),
        Raw::short(order, 0x0112, 1),
        Raw::long(order, 0x8769, exif),
    ]);
    image.set_next(ifd0, ifd1);
    image.set_ifd0(ifd0);
    image.into_bytes()
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
