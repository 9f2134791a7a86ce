//! Directory records and the directory reader.
//!
//! A directory is laid out as:
//!
//! ```text
//! +-------------+-----------------------------+-------------+
//! | count (u16) | count x 12-byte entry       | next (u32)  |
//! +-------------+-----------------------------+-------------+
//! entry: tag (u16) | format (u16) | count (u32) | value or offset (4 bytes)
//! ```
//!
//! Values up to four bytes live in the entry itself; larger values live
//! elsewhere and the last four bytes hold their offset from the coordinate
//! base.

pub mod reader;

pub use reader::read_directory;

use crate::codec::{decode, ByteOrder, Format, Value};
use crate::error::{Error, Result};
use crate::source::Source;

/// Size of the entry count field.
pub const COUNT_SIZE: usize = 2;
/// Size of one entry record.
pub const ENTRY_SIZE: usize = 12;
/// Size of the next-directory pointer.
pub const NEXT_SIZE: usize = 4;
/// Largest value stored inside the entry record.
pub const INLINE_SIZE: usize = 4;

/// Bytes taken by a directory with `entries` records, excluding its values.
pub fn directory_size(entries: usize) -> usize {
    COUNT_SIZE + entries * ENTRY_SIZE + NEXT_SIZE
}

/// One entry record as read from a source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Tag ID.
    pub tag: u16,
    /// Element format.
    pub format: Format,
    /// Element count.
    pub count: u32,
    /// Inline value or offset field, as stored.
    pub field: [u8; 4],
}

impl Entry {
    /// Byte length of the value, if it fits in memory.
    pub fn byte_len(&self) -> Option<usize> {
        self.format.byte_len(self.count)
    }

    /// Whether the value lives inside the record.
    pub fn is_inline(&self) -> bool {
        self.byte_len().is_some_and(|len| len <= INLINE_SIZE)
    }

    /// The offset field interpreted in `order`.
    pub fn offset(&self, order: ByteOrder) -> u32 {
        order.u32(&self.field)
    }

    /// Raw value bytes, fetched from `source` when stored out of line.
    pub fn data<S: Source + ?Sized>(&self, source: &S, base: u64, order: ByteOrder, dir: &str) -> Result<Vec<u8>> {
        let len = self.byte_len().ok_or_else(|| {
            Error::io_read(dir, std::io::Error::new(std::io::ErrorKind::InvalidData, "value length overflows"))
        })?;
        if len <= INLINE_SIZE {
            return Ok(self.field[..len].to_vec());
        }
        let at = base + self.offset(order) as u64;
        source.read_at(at, len).map_err(|e| Error::io_read(dir, e))
    }

    /// Decoded value.
    pub fn value<S: Source + ?Sized>(&self, source: &S, base: u64, order: ByteOrder, dir: &str) -> Result<Value> {
        let data = self.data(source, base, order, dir)?;
        decode(&data, self.format, self.count, order)
    }
}

/// A directory read from a source.
#[derive(Debug, Clone)]
pub struct Directory {
    /// Directory name, e.g. `IFD0` or `ExifIFD`.
    pub name: String,
    /// Coordinate base for offsets stored in the directory.
    pub base: u64,
    /// Offset of the directory from the base.
    pub offset: u64,
    /// Byte order of the directory.
    pub order: ByteOrder,
    /// Entries sorted by tag with duplicates resolved.
    pub entries: Vec<Entry>,
    /// Offset of the next directory, or 0.
    pub next: u32,
    /// Anomalies tolerated while reading.
    pub warnings: Vec<String>,
}

impl Directory {
    /// Find an entry by tag.
    pub fn get(&self, tag: u16) -> Option<&Entry> {
        self.entries.binary_search_by_key(&tag, |e| e.tag).ok().map(|i| &self.entries[i])
    }

    /// Raw value bytes of `entry`.
    pub fn data<S: Source + ?Sized>(&self, source: &S, entry: &Entry) -> Result<Vec<u8>> {
        entry.data(source, self.base, self.order, &self.name)
    }

    /// Decoded value of the entry with `tag`, if present.
    pub fn value<S: Source + ?Sized>(&self, source: &S, tag: u16) -> Result<Option<Value>> {
        self.get(tag).map(|e| e.value(source, self.base, self.order, &self.name)).transpose()
    }
}

/// Name of the directory following `name` in a chain.
///
/// A trailing index is incremented (`IFD0` to `IFD1`); names without one
/// get `1` appended (`SubIFD` to `SubIFD1`).
pub fn sibling_name(name: &str) -> String {
    let stem = name.trim_end_matches(|c: char| c.is_ascii_digit());
    match name[stem.len()..].parse::<u32>() {
        Ok(index) => format!("{}{}", stem, index + 1),
        Err(_) => format!("{}1", name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_name() {
        assert_eq!(sibling_name("IFD0"), "IFD1");
        assert_eq!(sibling_name("IFD9"), "IFD10");
        assert_eq!(sibling_name("SubIFD"), "SubIFD1");
        assert_eq!(sibling_name("SubIFD1"), "SubIFD2");
    }

    #[test]
    fn test_entry_inline_and_offset() {
        let short = Entry { tag: 0x0100, format: Format::Short, count: 2, field: [0, 1, 0, 2] };
        assert!(short.is_inline());
        let empty: &[u8] = &[];
        let data = short.data(empty, 0, ByteOrder::Big, "IFD0").unwrap();
        assert_eq!(data, vec![0, 1, 0, 2]);

        let text = Entry { tag: 0x0110, format: Format::Ascii, count: 6, field: [0, 0, 0, 2] };
        assert!(!text.is_inline());
        assert_eq!(text.offset(ByteOrder::Big), 2);
        let source = b"xxModel\0".to_vec();
        assert_eq!(text.value(&source, 0, ByteOrder::Big, "IFD0").unwrap(), Value::Ascii("Model".into()));

        let err = text.data(&source, 100, ByteOrder::Big, "IFD0").unwrap_err();
        assert!(matches!(err, Error::IoRead { .. }));
    }

    #[test]
    fn test_directory_size() {
        assert_eq!(directory_size(0), 6);
        assert_eq!(directory_size(4), 54);
    }
}
