// Integration tests for directory rewrites
// Merge order, value area layout, relocation, deletion and creation

mod common;

use common::{camera_tiff, init_logging, next_of, record, tags_at, Image, Raw};
use tagdir::ifd::read_directory;
use tagdir::schema::{TagSchema, TagTable, MAIN_TABLE};
use tagdir::tiff::{self, HEADER_SIZE};
use tagdir::{
    ByteOrder, DirectoryLocation, EditSet, Format, Options, Registry, Rewrite, Rewriter, Value,
};

fn plain_registry() -> Registry {
    Registry::builder()
        .table(TagTable::new("Plain", [TagSchema::subdirectory(0x8769, "ExifOffset", "ExifIFD", "Bare")]))
        .table(TagTable::new("Bare", []))
        .build()
}

/// Replace one tag, add another and relocate a nested directory
#[test]
fn test_end_to_end_scenario() {
    init_logging();
    let order = ByteOrder::Big;
    let mut image = Image::new(order);
    let model = image.append(b"Model X\0");
    let sub = image.directory(&[Raw::short(order, 0x0001, 5)]);
    let ifd0 = image.directory(&[
        Raw::short(order, 0x0100, 640),
        Raw::at(order, 0x0110, Format::Ascii, 8, model),
        Raw::long(order, 0x8769, sub),
    ]);
    let source = image.into_bytes();

    let registry = plain_registry();
    let rewriter = Rewriter::new(&registry, Options::default()).unwrap();
    let mut edits = EditSet::new();
    edits.set("IFD0", 0x0100, 1024u16);
    edits.set("IFD0", 0x0132, "Edited ok");

    let location = DirectoryLocation::at("IFD0", "Plain", ifd0 as u64, order);
    let Rewrite::Changed(output) = rewriter.rewrite(&source, &location, &edits, 8).unwrap() else {
        panic!("expected a rebuilt region");
    };
    let data = &output.data;

    assert_eq!(output.base, 8);
    assert_eq!(output.changes, 2);
    assert_eq!(order.u16(data), 4);
    assert_eq!(tags_at(data, order, 0), vec![0x0100, 0x0110, 0x0132, 0x8769]);

    // replaced value stays inline
    let width = record(data, order, 0, 0x0100).unwrap();
    assert_eq!(width.format, Format::Short);
    assert_eq!(&width.field, &[0x04, 0x00, 0, 0]);

    // value area: 8-byte string, then the 10-byte string
    let header = 2 + 4 * 12 + 4;
    assert_eq!(order.u32(&record(data, order, 0, 0x0110).unwrap().field), header as u32 + 8);
    assert_eq!(&data[header..header + 8], b"Model X\0");
    let modify = record(data, order, 0, 0x0132).unwrap();
    assert_eq!(modify.count, 10);
    assert_eq!(order.u32(&modify.field), header as u32 + 16);
    assert_eq!(&data[header + 8..header + 18], b"Edited ok\0");

    // nested directory directly after the value area
    let pointer = order.u32(&record(data, order, 0, 0x8769).unwrap().field);
    assert_eq!(pointer, 8 + 72);
    assert_eq!(tags_at(data, order, 72), vec![0x0001]);
    assert_eq!(data.len(), 72 + 18);
}

/// A rebuilt blob has every offset pointing at the right bytes
#[test]
fn test_canonical_layout() {
    let order = ByteOrder::Little;
    let source = camera_tiff(order);
    let registry = Registry::standard();
    let rewriter = Rewriter::new(&registry, Options::default()).unwrap();
    let ifd0 = order.u32(&source[4..]) as u64;

    let output = rewriter
        .assemble(&source, &DirectoryLocation::at("IFD0", MAIN_TABLE, ifd0, order), &EditSet::new(), 8)
        .unwrap();
    assert_eq!(output.changes, 0);
    let mut blob = source[..HEADER_SIZE].to_vec();
    order.patch_u32(&mut blob, 4, 8);
    blob.extend_from_slice(&output.data);

    assert_eq!(tags_at(&blob, order, 8), vec![0x010f, 0x0110, 0x0112, 0x8769]);
    assert_eq!(next_of(&blob, order, 8), 82);
    assert_eq!(tags_at(&blob, order, 82), vec![0x0103, 0x0201, 0x0202]);
    assert_eq!(next_of(&blob, order, 82), 0);

    let exif = order.u32(&record(&blob, order, 8, 0x8769).unwrap().field);
    assert_eq!(exif, 124);
    let dir = read_directory(&blob, "ExifIFD", 0, exif as u64, order, &Options::default()).unwrap();
    assert_eq!(dir.value(&blob, 0x9003).unwrap(), Some(Value::Ascii("2023:01:02 03:04:05".into())));

    let thumb = order.u32(&record(&blob, order, 82, 0x0201).unwrap().field) as usize;
    assert_eq!(thumb, 174);
    assert_eq!(&blob[thumb..thumb + 7], &[0xff, 0xd8, 0x01, 0x02, 0x03, 0xff, 0xd9]);
    assert_eq!(blob.len(), 182);
}

/// Rebuilding a rebuilt blob is a no-op
#[test]
fn test_idempotent_rebuild() {
    for order in [ByteOrder::Little, ByteOrder::Big] {
        let registry = Registry::standard();
        let mut edits = EditSet::new();
        edits.set("IFD0", 0x0131, "tagdir");
        edits.set("ExifIFD", 0x9286, vec![0u8; 10]);
        let once = tiff::rewrite_tiff(&camera_tiff(order), &registry, &Options::default(), &edits).unwrap();

        let rewriter = Rewriter::new(&registry, Options::default()).unwrap();
        let location = DirectoryLocation::at("IFD0", MAIN_TABLE, 8, order);
        let again = rewriter.assemble(&once, &location, &EditSet::new(), 8).unwrap();
        assert_eq!(again.changes, 0);
        assert_eq!(&once[8..], again.data.as_slice());

        // the same edits again change values to what they already are
        let twice = tiff::rewrite_tiff(&once, &registry, &Options::default(), &edits).unwrap();
        assert_eq!(once, twice);
    }
}

/// Without edits the input comes back untouched
#[test]
fn test_unchanged_returns_input() {
    let source = camera_tiff(ByteOrder::Big);
    let registry = Registry::standard();
    let result = tiff::rewrite_tiff(&source, &registry, &Options::default(), &EditSet::new()).unwrap();
    assert_eq!(result, source);

    let rewriter = Rewriter::new(&registry, Options::default()).unwrap();
    let ifd0 = ByteOrder::Big.u32(&source[4..]) as u64;
    let location = DirectoryLocation::at("IFD0", MAIN_TABLE, ifd0, ByteOrder::Big);
    let mut edits = EditSet::new();
    edits.set("IFD0", 0x0131, "only if present").edit_only();
    assert!(!rewriter.rewrite(&source, &location, &edits, 8).unwrap().is_changed());
}

/// Deleting a tag removes exactly one entry
#[test]
fn test_delete_decrements_count() {
    let order = ByteOrder::Little;
    let registry = Registry::standard();
    let mut edits = EditSet::new();
    edits.delete("IFD0", 0x0110);
    let out = tiff::rewrite_tiff(&camera_tiff(order), &registry, &Options::default(), &edits).unwrap();
    assert_eq!(tags_at(&out, order, 8), vec![0x010f, 0x0112, 0x8769]);
}

/// Directories left without entries disappear with their pointers
#[test]
fn test_empty_directories_collapse() {
    let order = ByteOrder::Big;
    let registry = Registry::standard();
    let mut edits = EditSet::new();
    edits.delete("ExifIFD", 0x8827);
    edits.delete("ExifIFD", 0x9003);
    edits.delete("IFD1", 0x0103);
    edits.delete("IFD1", 0x0201);
    let out = tiff::rewrite_tiff(&camera_tiff(order), &registry, &Options::default(), &edits).unwrap();

    assert_eq!(tags_at(&out, order, 8), vec![0x010f, 0x0110, 0x0112]);
    assert_eq!(next_of(&out, order, 8), 0);
    // IFD0 with its two strings and nothing else
    assert_eq!(out.len(), 8 + 2 + 3 * 12 + 4 + 12 + 8);
}

/// Entries come out in ascending tag order whatever the input order
#[test]
fn test_entries_sorted() {
    let order = ByteOrder::Big;
    let mut image = Image::new(order);
    let ifd0 = image.directory(&[Raw::short(order, 0x0128, 2), Raw::short(order, 0x0103, 1)]);
    image.set_ifd0(ifd0);
    let source = image.into_bytes();

    let registry = Registry::standard();
    let rewriter = Rewriter::new(&registry, Options::default()).unwrap();
    let mut edits = EditSet::new();
    edits.set("IFD0", 0x8298, "(c) someone");
    edits.set("IFD0", 0x00fe, 0u32);
    edits.set("IFD0", 0x0115, 3u16);

    let location = DirectoryLocation::at("IFD0", MAIN_TABLE, ifd0 as u64, order);
    let output = rewriter.assemble(&source, &location, &edits, 8).unwrap();
    let tags = tags_at(&output.data, order, 0);
    assert_eq!(tags, vec![0x00fe, 0x0103, 0x0115, 0x0128, 0x8298]);
    assert!(tags.windows(2).all(|w| w[0] < w[1]));
    assert!(output.warnings.iter().any(|w| w.contains("out of sequence")));
}

/// A tag moved to another directory is removed where it was
#[test]
fn test_move_between_directories() {
    let order = ByteOrder::Little;
    let mut image = Image::new(order);
    let exif = image.directory(&[Raw::short(order, 0xa001, 1)]);
    let ifd0 = image.directory(&[
        Raw::short(order, 0x0112, 1),
        Raw::short(order, 0x8827, 100),
        Raw::long(order, 0x8769, exif),
    ]);
    image.set_ifd0(ifd0);
    let source = image.into_bytes();

    let registry = Registry::standard();
    let mut edits = EditSet::new();
    edits.set("ExifIFD", 0x8827, 400u16).remove_from("IFD0");
    let out = tiff::rewrite_tiff(&source, &registry, &Options::default(), &edits).unwrap();

    assert_eq!(tags_at(&out, order, 8), vec![0x0112, 0x8769]);
    let exif = order.u32(&record(&out, order, 8, 0x8769).unwrap().field) as usize;
    assert_eq!(tags_at(&out, order, exif), vec![0x8827, 0xa001]);
    let iso = record(&out, order, exif, 0x8827).unwrap();
    assert_eq!(order.u16(&iso.field), 400);
}

/// Global deletes reach every directory
#[test]
fn test_delete_everywhere() {
    let order = ByteOrder::Big;
    let registry = Registry::standard();
    let mut edits = EditSet::new();
    edits.delete_everywhere(0x0103);
    edits.delete_everywhere(0x8827);
    let out = tiff::rewrite_tiff(&camera_tiff(order), &registry, &Options::default(), &edits).unwrap();

    let ifd1 = next_of(&out, order, 8) as usize;
    assert_eq!(tags_at(&out, order, ifd1), vec![0x0201, 0x0202]);
    let exif = order.u32(&record(&out, order, 8, 0x8769).unwrap().field) as usize;
    assert_eq!(tags_at(&out, order, exif), vec![0x9003]);
}

/// Edits to missing directories create them, and only them
#[test]
fn test_create_gps_directory() {
    let order = ByteOrder::Little;
    let registry = Registry::standard();
    let mut edits = EditSet::new();
    edits.set("GPS", 0x0001, "north");
    edits.set("GPS", 0x0002, "37.5");
    let out = tiff::rewrite_tiff(&camera_tiff(order), &registry, &Options::default(), &edits).unwrap();

    assert_eq!(tags_at(&out, order, 8), vec![0x010f, 0x0110, 0x0112, 0x8769, 0x8825]);
    let gps = order.u32(&record(&out, order, 8, 0x8825).unwrap().field) as u64;
    let dir = read_directory(&out, "GPS", 0, gps, order, &Options::default()).unwrap();
    assert_eq!(dir.value(&out, 0x0001).unwrap(), Some(Value::Ascii("N".into())));
    assert_eq!(dir.value(&out, 0x0002).unwrap(), Some(Value::Rational(vec![(37, 1), (30, 1), (0, 1)])));

    // IFD1 is still the last directory of the chain
    let ifd1 = next_of(&out, order, 8) as usize;
    assert_eq!(next_of(&out, order, ifd1), 0);
}

/// A nested directory is created through its parent chain
#[test]
fn test_create_nested_from_scratch() {
    let registry = Registry::standard();
    let mut edits = EditSet::new();
    edits.set("InteropIFD", 0x0001, "R98");
    let blob = tiff::create_tiff(&registry, &Options::default(), &edits, ByteOrder::Big).unwrap();
    let order = ByteOrder::Big;

    assert_eq!(tags_at(&blob, order, 8), vec![0x8769]);
    assert_eq!(next_of(&blob, order, 8), 0);
    let exif = order.u32(&record(&blob, order, 8, 0x8769).unwrap().field) as usize;
    assert_eq!(tags_at(&blob, order, exif), vec![0xa005]);
    let interop = order.u32(&record(&blob, order, exif, 0xa005).unwrap().field) as usize;
    let index = record(&blob, order, interop, 0x0001).unwrap();
    assert_eq!(index.count, 4);
    assert_eq!(&index.field, b"R98\0");
}

/// Values that do not fit their tag are skipped with a warning
#[test]
fn test_bad_value_is_skipped() {
    let order = ByteOrder::Big;
    let registry = Registry::standard();
    let rewriter = Rewriter::new(&registry, Options::default()).unwrap();
    let source = camera_tiff(order);
    let location = DirectoryLocation::at("IFD0", MAIN_TABLE, order.u32(&source[4..]) as u64, order);

    let mut edits = EditSet::new();
    edits.set("IFD0", 0x0112, "upside down");
    let result = rewriter.rewrite(&source, &location, &edits, 8).unwrap();
    assert!(!result.is_changed());
    assert_eq!(result.warnings().len(), 1);

    edits.set("IFD0", 0x0112, "Rotate 180");
    let Rewrite::Changed(output) = rewriter.rewrite(&source, &location, &edits, 8).unwrap() else {
        panic!("expected a change");
    };
    assert_eq!(order.u16(&record(&output.data, order, 0, 0x0112).unwrap().field), 3);
}

/// Next pointers of SubIFD chains and arrays of SubIFDs survive
#[test]
fn test_subifd_array() {
    let order = ByteOrder::Little;
    let mut image = Image::new(order);
    let first = image.directory(&[Raw::long(order, 0x0100, 100)]);
    let second = image.directory(&[Raw::long(order, 0x0100, 200)]);
    let array = image.append(&{
        let mut b = Vec::new();
        order.put_u32(&mut b, first);
        order.put_u32(&mut b, second);
        b
    });
    let ifd0 = image.directory(&[Raw::at(order, 0x014a, Format::Long, 2, array)]);
    image.set_ifd0(ifd0);
    let source = image.into_bytes();

    let registry = Registry::standard();
    let mut edits = EditSet::new();
    edits.set("SubIFD1", 0x0101, 50u32);
    let out = tiff::rewrite_tiff(&source, &registry, &Options::default(), &edits).unwrap();

    let pointers = record(&out, order, 8, 0x014a).unwrap();
    assert_eq!(pointers.count, 2);
    let at = order.u32(&pointers.field) as usize;
    let first = order.u32(&out[at..]) as usize;
    let second = order.u32(&out[at + 4..]) as usize;
    assert_eq!(tags_at(&out, order, first), vec![0x0100]);
    assert_eq!(tags_at(&out, order, second), vec![0x0100, 0x0101]);
}

/// Replacement values keep the element count of the entry they replace
#[test]
fn test_replacement_keeps_existing_count() {
    let order = ByteOrder::Big;
    let mut image = Image::new(order);
    let mut samples = Vec::new();
    for _ in 0..3 {
        order.put_u16(&mut samples, 8);
    }
    let bits = image.append(&samples);
    let ifd0 = image.directory(&[Raw::at(order, 0x0102, Format::Short, 3, bits), Raw::short(order, 0x0112, 1)]);
    image.set_ifd0(ifd0);
    let source = image.into_bytes();

    let registry = Registry::standard();
    let rewriter = Rewriter::new(&registry, Options::default()).unwrap();
    let location = DirectoryLocation::at("IFD0", MAIN_TABLE, ifd0 as u64, order);

    let mut edits = EditSet::new();
    edits.set("IFD0", 0x0102, 16u16);
    let result = rewriter.rewrite(&source, &location, &edits, 8).unwrap();
    assert!(!result.is_changed());
    assert!(result.warnings()[0].contains("expected 3 values"));

    edits.set("IFD0", 0x0102, Value::Unsigned(vec![16, 16, 16]));
    let Rewrite::Changed(output) = rewriter.rewrite(&source, &location, &edits, 8).unwrap() else {
        panic!("expected a change");
    };
    let entry = record(&output.data, order, 0, 0x0102).unwrap();
    assert_eq!(entry.format, Format::Short);
    assert_eq!(entry.count, 3);
    let at = order.u32(&entry.field) as usize - 8;
    assert_eq!(&output.data[at..at + 6], &[0, 16, 0, 16, 0, 16]);
}

/// Global deletes skip directories whose table does not know the tag
#[test]
fn test_delete_everywhere_follows_tables() {
    let order = ByteOrder::Little;
    let mut image = Image::new(order);
    let exif = image.directory(&[Raw::short(order, 0x8827, 100), Raw::short(order, 0xa001, 1)]);
    let ifd0 = image.directory(&[
        Raw::short(order, 0x0112, 1),
        Raw::long(order, 0x8769, exif),
        Raw::short(order, 0x8827, 100),
    ]);
    image.set_ifd0(ifd0);
    let source = image.into_bytes();

    let mut edits = EditSet::new();
    edits.delete_everywhere(0x8827);
    let out = tiff::rewrite_tiff(&source, &Registry::standard(), &Options::default(), &edits).unwrap();

    assert_eq!(tags_at(&out, order, 8), vec![0x0112, 0x8769, 0x8827]);
    let exif = order.u32(&record(&out, order, 8, 0x8769).unwrap().field) as usize;
    assert_eq!(tags_at(&out, order, exif), vec![0xa001]);
}

/// Offset tags cannot be set to a raw value, even when absent
#[test]
fn test_offsets_cannot_be_set() {
    let order = ByteOrder::Big;
    let source = camera_tiff(order);
    let registry = Registry::standard();
    let rewriter = Rewriter::new(&registry, Options::default()).unwrap();
    let location = DirectoryLocation::at("IFD0", MAIN_TABLE, order.u32(&source[4..]) as u64, order);

    let mut edits = EditSet::new();
    edits.set("IFD0", 0x0111, 1234u32);
    let output = rewriter.assemble(&source, &location, &edits, 8).unwrap();
    assert_eq!(output.changes, 0);
    assert!(!tags_at(&output.data, order, 0).contains(&0x0111));
    assert!(output.warnings.iter().any(|w| w.contains("derived from its payload")));
}
