//! Byte order, passed explicitly to every read and write.

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Byte order of multi-byte integers.
///
/// Chosen once per top-level call and handed down through every codec and
/// assembler call; blocks with their own byte order get their own value
/// rather than mutating shared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ByteOrder {
    /// Intel order, `II`.
    Little,
    /// Motorola order, `MM`.
    #[default]
    Big,
}

impl ByteOrder {
    /// Detect from a two-byte `II`/`MM` marker.
    pub fn from_marker(marker: &[u8]) -> Option<Self> {
        match marker {
            [b'I', b'I', ..] => Some(ByteOrder::Little),
            [b'M', b'M', ..] => Some(ByteOrder::Big),
            _ => None,
        }
    }

    /// The two-byte marker for this order.
    pub fn marker(self) -> [u8; 2] {
        match self {
            ByteOrder::Little => *b"II",
            ByteOrder::Big => *b"MM",
        }
    }

    /// Read a u16 from the front of `data`. The caller guarantees the length.
    pub fn u16(self, mut data: &[u8]) -> u16 {
        match self {
            ByteOrder::Little => data.get_u16_le(),
            ByteOrder::Big => data.get_u16(),
        }
    }

    /// Read a u32 from the front of `data`. The caller guarantees the length.
    pub fn u32(self, mut data: &[u8]) -> u32 {
        match self {
            ByteOrder::Little => data.get_u32_le(),
            ByteOrder::Big => data.get_u32(),
        }
    }

    /// Read a u64 from the front of `data`. The caller guarantees the length.
    pub fn u64(self, mut data: &[u8]) -> u64 {
        match self {
            ByteOrder::Little => data.get_u64_le(),
            ByteOrder::Big => data.get_u64(),
        }
    }

    /// Append a u16.
    pub fn put_u16<B: BufMut>(self, buf: &mut B, value: u16) {
        match self {
            ByteOrder::Little => buf.put_u16_le(value),
            ByteOrder::Big => buf.put_u16(value),
        }
    }

    /// Append a u32.
    pub fn put_u32<B: BufMut>(self, buf: &mut B, value: u32) {
        match self {
            ByteOrder::Little => buf.put_u32_le(value),
            ByteOrder::Big => buf.put_u32(value),
        }
    }

    /// Append a u64.
    pub fn put_u64<B: BufMut>(self, buf: &mut B, value: u64) {
        match self {
            ByteOrder::Little => buf.put_u64_le(value),
            ByteOrder::Big => buf.put_u64(value),
        }
    }

    /// Overwrite the u16 at `at`.
    pub fn patch_u16(self, buf: &mut [u8], at: usize, value: u16) {
        let bytes = match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        buf[at..at + 2].copy_from_slice(&bytes);
    }

    /// Overwrite the u32 at `at`.
    pub fn patch_u32(self, buf: &mut [u8], at: usize, value: u32) {
        let bytes = match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        buf[at..at + 4].copy_from_slice(&bytes);
    }
}
