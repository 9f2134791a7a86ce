//! Directory reader.

use super::{Directory, Entry, COUNT_SIZE, ENTRY_SIZE, NEXT_SIZE};
use crate::codec::{ByteOrder, Format};
use crate::config::{DuplicatePolicy, Options};
use crate::error::{Error, Result};
use crate::source::Source;

/// Read the directory at `offset` from `base`.
///
/// Entries come back sorted by tag with duplicates resolved by
/// [`Options::duplicate_policy`]. Out-of-sequence and duplicate tags,
/// skipped leading zero records and a missing next pointer are tolerated and
/// reported in [`Directory::warnings`].
pub fn read_directory<S: Source + ?Sized>(
    source: &S,
    name: &str,
    base: u64,
    offset: u64,
    order: ByteOrder,
    options: &Options,
) -> Result<Directory> {
    let start = base + offset;
    let head = source
        .read_at(start, COUNT_SIZE)
        .map_err(|_| Error::truncated(name, format!("no entry count at offset {:#x}", start)))?;
    let count = order.u16(&head) as usize;

    let table = source.read_at(start + COUNT_SIZE as u64, count * ENTRY_SIZE).map_err(|_| {
        Error::truncated(
            name,
            format!("{} entries at offset {:#x} run past end of data ({} bytes)", count, start, source.len()),
        )
    })?;

    let mut warnings = Vec::new();
    let next = match source.read_at(start + (COUNT_SIZE + count * ENTRY_SIZE) as u64, NEXT_SIZE) {
        Ok(bytes) => order.u32(&bytes),
        Err(_) => {
            warnings.push(format!("Missing next-directory pointer in {}", name));
            0
        }
    };

    let mut entries = Vec::with_capacity(count);
    let mut leading_zeros = 0usize;
    let mut last_tag: Option<u16> = None;
    let mut out_of_order = false;

    for record in table.chunks_exact(ENTRY_SIZE) {
        if entries.is_empty() && options.tolerate_leading_zeros && record.iter().all(|&b| b == 0) {
            leading_zeros += 1;
            continue;
        }
        let tag = order.u16(record);
        let code = order.u16(&record[2..]);
        let format = Format::from_u16(code).ok_or_else(|| Error::BadFormat {
            dir: name.to_string(),
            tag,
            format: code,
        })?;
        let entry_count = order.u32(&record[4..]);
        let mut field = [0u8; 4];
        field.copy_from_slice(&record[8..12]);

        if let Some(last) = last_tag {
            if tag == last {
                warnings.push(format!("Duplicate tag {:#06x} in {}", tag, name));
            } else if tag < last {
                warnings.push(format!("Tag {:#06x} out of sequence in {}", tag, name));
                out_of_order = true;
            }
        }
        last_tag = Some(tag);
        entries.push(Entry { tag, format, count: entry_count, field });
    }

    if leading_zeros > 0 {
        warnings.push(format!("Skipped {} leading zero entries in {}", leading_zeros, name));
    }
    if out_of_order {
        entries.sort_by_key(|e| e.tag);
    }
    resolve_duplicates(&mut entries, options.duplicate_policy);

    for warning in &warnings {
        log::warn!("{}", warning);
    }

    Ok(Directory { name: name.to_string(), base, offset, order, entries, next, warnings })
}

/// Keep one entry per tag. The sort above is stable, so entries with the
/// same tag are still in source order.
fn resolve_duplicates(entries: &mut Vec<Entry>, policy: DuplicatePolicy) {
    match policy {
        DuplicatePolicy::FirstWins => entries.dedup_by_key(|e| e.tag),
        DuplicatePolicy::LastWins => {
            entries.reverse();
            entries.dedup_by_key(|e| e.tag);
            entries.reverse();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(order: ByteOrder, tag: u16, format: u16, count: u32, field: [u8; 4]) -> Vec<u8> {
        let mut buf = Vec::new();
        order.put_u16(&mut buf, tag);
        order.put_u16(&mut buf, format);
        order.put_u32(&mut buf, count);
        buf.extend_from_slice(&field);
        buf
    }

    fn directory(order: ByteOrder, records: &[Vec<u8>], next: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        order.put_u16(&mut buf, records.len() as u16);
        for r in records {
            buf.extend_from_slice(r);
        }
        order.put_u32(&mut buf, next);
        buf
    }

    #[test]
    fn test_read_simple_directory() {
        let order = ByteOrder::Little;
        let data = directory(
            order,
            &[record(order, 0x0100, 3, 1, [0x80, 0x02, 0, 0]), record(order, 0x0101, 3, 1, [0xe0, 0x01, 0, 0])],
            0x1234,
        );
        let dir = read_directory(&data, "IFD0", 0, 0, order, &Options::default()).unwrap();
        assert_eq!(dir.entries.len(), 2);
        assert_eq!(dir.next, 0x1234);
        assert!(dir.warnings.is_empty());
        assert_eq!(dir.value(&data, 0x0100).unwrap(), Some(crate::codec::Value::Unsigned(vec![640])));
    }

    #[test]
    fn test_truncated_directory() {
        let order = ByteOrder::Big;
        let mut data = directory(order, &[record(order, 0x0100, 3, 1, [0; 4])], 0);
        data[1] = 9;
        let err = read_directory(&data, "IFD0", 0, 0, order, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::TruncatedDirectory { ref dir, .. } if dir == "IFD0"));

        let err = read_directory(&data, "IFD0", 0, 100, order, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::TruncatedDirectory { .. }));
    }

    #[test]
    fn test_bad_format() {
        let order = ByteOrder::Big;
        let data = directory(order, &[record(order, 0x0100, 3, 1, [0; 4]), record(order, 0x0101, 99, 1, [0; 4])], 0);
        let err = read_directory(&data, "ExifIFD", 0, 0, order, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::BadFormat { tag: 0x0101, format: 99, .. }));
    }

    #[test]
    fn test_leading_zero_records() {
        let order = ByteOrder::Big;
        let data = directory(order, &[vec![0; 12], vec![0; 12], record(order, 0x0100, 3, 1, [0; 4])], 0);
        let dir = read_directory(&data, "IFD0", 0, 0, order, &Options::default()).unwrap();
        assert_eq!(dir.entries.len(), 1);
        assert_eq!(dir.warnings.len(), 1);

        let strict = Options::default().tolerate_leading_zeros(false);
        let err = read_directory(&data, "IFD0", 0, 0, order, &strict).unwrap_err();
        assert!(matches!(err, Error::BadFormat { format: 0, .. }));
    }

    #[test]
    fn test_zero_record_after_first_entry_is_bad() {
        let order = ByteOrder::Big;
        let data = directory(order, &[record(order, 0x0100, 3, 1, [0; 4]), vec![0; 12]], 0);
        assert!(read_directory(&data, "IFD0", 0, 0, order, &Options::default()).is_err());
    }

    #[test]
    fn test_out_of_sequence_and_duplicates() {
        let order = ByteOrder::Big;
        let data = directory(
            order,
            &[
                record(order, 0x0110, 3, 1, [0, 1, 0, 0]),
                record(order, 0x0100, 3, 1, [0, 2, 0, 0]),
                record(order, 0x0100, 3, 1, [0, 3, 0, 0]),
            ],
            0,
        );
        let dir = read_directory(&data, "IFD0", 0, 0, order, &Options::default()).unwrap();
        assert_eq!(dir.entries.iter().map(|e| e.tag).collect::<Vec<_>>(), vec![0x0100, 0x0110]);
        assert_eq!(dir.get(0x0100).unwrap().field, [0, 2, 0, 0]);
        assert_eq!(dir.warnings.len(), 2);

        let last = Options::default().duplicate_policy(DuplicatePolicy::LastWins);
        let dir = read_directory(&data, "IFD0", 0, 0, order, &last).unwrap();
        assert_eq!(dir.get(0x0100).unwrap().field, [0, 3, 0, 0]);
    }

    #[test]
    fn test_missing_next_pointer_tolerated() {
        let order = ByteOrder::Big;
        let mut data = directory(order, &[record(order, 0x0100, 3, 1, [0; 4])], 0);
        data.truncate(data.len() - 4);
        let dir = read_directory(&data, "IFD1", 0, 0, order, &Options::default()).unwrap();
        assert_eq!(dir.next, 0);
        assert_eq!(dir.warnings.len(), 1);
    }
}
