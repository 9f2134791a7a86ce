//! Tag schema registry.
//!
//! A [`Registry`] maps table names to immutable [`TagTable`]s. It is built
//! once (usually [`Registry::standard`], optionally extended with vendor
//! tables through [`RegistryBuilder`]) and passed by reference to every
//! rewrite. Nothing in a table is mutated after construction.
//!
//! The engine only needs the structural facts about a tag: its format and
//! count, whether it points at a sub-directory, and whether it is one half
//! of an offset/byte-count pair. Human-readable value conversion is limited
//! to the small closed set in [`Conversion`].

use crate::codec::{Format, Value};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};

/// Name of the table used by IFD0, IFD1 and SubIFDs.
pub const MAIN_TABLE: &str = "Main";
/// Name of the Exif sub-directory table.
pub const EXIF_TABLE: &str = "Exif";
/// Name of the GPS sub-directory table.
pub const GPS_TABLE: &str = "GPS";
/// Name of the interoperability sub-directory table.
pub const INTEROP_TABLE: &str = "Interop";

/// Element count policy for a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Count {
    /// The count follows from the value. Numeric replacements keep the
    /// count of the entry they replace.
    Natural,
    /// The tag always holds exactly this many elements.
    Fixed(u32),
    /// Replacement values keep the count of the entry they replace, strings
    /// and blobs included.
    KeepExisting,
}

/// How text supplied for a tag turns into a typed value.
#[derive(Debug, Clone, Copy)]
pub enum Conversion {
    /// Integers; text is parsed by the codec for the tag's width.
    Numeric,
    /// Rationals; text may be decimal or `n/d`.
    Rational,
    /// Free text stored as ASCII.
    Text,
    /// A tag-specific conversion from text.
    Custom(fn(&str) -> Result<Value>),
}

/// Whether a payload read failure is fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadClass {
    /// Image or other essential data; read failures abort.
    Data,
    /// Preview or thumbnail data; read failures may be downgraded.
    Preview,
}

/// What offsets inside an embedded block are relative to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Addressing {
    /// The coordinate base of the containing directory.
    Parent,
    /// The start of the block itself.
    Block,
}

/// Byte order of an embedded block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRule {
    /// Same as the containing directory.
    Inherit,
    /// Read an `II`/`MM` marker at this offset within the block.
    Detect(usize),
}

/// How a sub-directory hangs off its container entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Embedding {
    /// The entry holds one or more directory offsets.
    Pointer,
    /// The entry's value is a block: `header_len` bytes of header followed
    /// by the directory.
    Block {
        /// Bytes preceding the directory.
        header_len: usize,
        /// Base for offsets inside the block.
        addressing: Addressing,
        /// Byte order of the block.
        order: OrderRule,
    },
}

/// A sub-directory reached through a container tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubdirSpec {
    /// Directory name used for edits and diagnostics.
    pub name: &'static str,
    /// Table describing the directory's tags.
    pub table: &'static str,
    /// How the directory is embedded.
    pub embedding: Embedding,
}

/// Structural role of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// An ordinary value.
    Value,
    /// A pointer to (or block holding) a nested directory.
    SubDirectory(SubdirSpec),
    /// Offsets of bulk payload whose sizes live in the `byte_counts` tag.
    DataOffsets {
        /// Partner tag holding the byte counts.
        byte_counts: u16,
        /// Failure policy for reading the payload.
        class: PayloadClass,
    },
    /// Byte counts matching the offsets in the `offsets` tag.
    ByteCounts {
        /// Partner tag holding the offsets.
        offsets: u16,
    },
}

/// Immutable description of one tag.
#[derive(Debug, Clone)]
pub struct TagSchema {
    /// Tag ID.
    pub tag: u16,
    /// Tag name.
    pub name: &'static str,
    /// Format written for new or replaced values.
    pub format: Format,
    /// Element count policy.
    pub count: Count,
    /// Structural role.
    pub kind: TagKind,
    /// Text conversion.
    pub conversion: Conversion,
    /// Whether the tag holds a list of values.
    pub list: bool,
}

impl TagSchema {
    /// A plain value tag; the conversion follows from the format.
    pub fn new(tag: u16, name: &'static str, format: Format) -> Self {
        let conversion = match format {
            Format::Ascii | Format::Undefined => Conversion::Text,
            Format::Rational | Format::SRational | Format::Float | Format::Double => {
                Conversion::Rational
            }
            _ => Conversion::Numeric,
        };
        Self { tag, name, format, count: Count::Natural, kind: TagKind::Value, conversion, list: false }
    }

    /// Set the count policy.
    pub fn count(mut self, count: Count) -> Self {
        self.count = count;
        self
    }

    /// Set the structural role.
    pub fn kind(mut self, kind: TagKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the text conversion.
    pub fn conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    /// Mark the tag as holding a list.
    pub fn list(mut self) -> Self {
        self.list = true;
        self
    }

    /// A pointer tag leading to a sub-directory.
    pub fn subdirectory(tag: u16, name: &'static str, dir: &'static str, table: &'static str) -> Self {
        Self::new(tag, name, Format::Long).kind(TagKind::SubDirectory(SubdirSpec {
            name: dir,
            table,
            embedding: Embedding::Pointer,
        }))
    }

    /// Turn a caller-supplied value into the value handed to the codec.
    pub fn convert(&self, value: &Value) -> Result<Value> {
        match (self.conversion, value) {
            (Conversion::Custom(convert), Value::Text(text)) => convert(text),
            (Conversion::Text, Value::Text(text)) if self.format == Format::Ascii => {
                Ok(Value::Ascii(text.clone()))
            }
            (Conversion::Numeric | Conversion::Rational, Value::Ascii(text)) => Err(Error::invalid_value(
                self.format.name(),
                format!("{} expects a number, got string '{}'", self.name, text),
            )),
            _ => Ok(value.clone()),
        }
    }

    /// The sub-directory this tag leads to, if any.
    pub fn subdir(&self) -> Option<&SubdirSpec> {
        match &self.kind {
            TagKind::SubDirectory(spec) => Some(spec),
            _ => None,
        }
    }
}

/// An immutable table of tag schemas.
#[derive(Debug, Clone)]
pub struct TagTable {
    name: &'static str,
    next: Option<&'static str>,
    tags: BTreeMap<u16, TagSchema>,
}

impl TagTable {
    /// Create a table from its schemas.
    pub fn new(name: &'static str, tags: impl IntoIterator<Item = TagSchema>) -> Self {
        Self { name, next: None, tags: tags.into_iter().map(|t| (t.tag, t)).collect() }
    }

    /// Name the table used by the next directory in a chain.
    pub fn with_next(mut self, next: &'static str) -> Self {
        self.next = Some(next);
        self
    }

    /// Table name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Table for the next directory in the chain, if directories using this
    /// table form chains.
    pub fn next(&self) -> Option<&'static str> {
        self.next
    }

    /// Look up a tag.
    pub fn get(&self, tag: u16) -> Option<&TagSchema> {
        self.tags.get(&tag)
    }

    /// Container tags and the sub-directories they lead to.
    pub fn subdirectories(&self) -> impl Iterator<Item = (u16, &SubdirSpec)> + '_ {
        self.tags.values().filter_map(|t| t.subdir().map(|s| (t.tag, s)))
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns true if the table has no tags.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Registry of tag tables, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tables: HashMap<&'static str, TagTable>,
}

impl Registry {
    /// Start an empty registry.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// The standard TIFF/EXIF tables.
    pub fn standard() -> Self {
        RegistryBuilder::standard().build()
    }

    /// Look up a table.
    pub fn table(&self, name: &str) -> Option<&TagTable> {
        self.tables.get(name)
    }
}

/// Builds a [`Registry`].
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    tables: HashMap<&'static str, TagTable>,
}

impl RegistryBuilder {
    /// Start from the standard tables.
    pub fn standard() -> Self {
        let mut builder = Self::default();
        builder.tables.insert(MAIN_TABLE, main_table());
        builder.tables.insert(EXIF_TABLE, exif_table());
        builder.tables.insert(GPS_TABLE, gps_table());
        builder.tables.insert(INTEROP_TABLE, interop_table());
        builder
    }

    /// Add or replace a table.
    pub fn table(mut self, table: TagTable) -> Self {
        self.tables.insert(table.name, table);
        self
    }

    /// Freeze the registry.
    pub fn build(self) -> Registry {
        Registry { tables: self.tables }
    }
}

fn main_table() -> TagTable {
    use Format::*;
    TagTable::new(
        MAIN_TABLE,
        [
            TagSchema::new(0x00fe, "SubfileType", Long).count(Count::Fixed(1)),
            TagSchema::new(0x0100, "ImageWidth", Long).count(Count::Fixed(1)),
            TagSchema::new(0x0101, "ImageHeight", Long).count(Count::Fixed(1)),
            TagSchema::new(0x0102, "BitsPerSample", Short),
            TagSchema::new(0x0103, "Compression", Short).count(Count::Fixed(1)),
            TagSchema::new(0x0106, "PhotometricInterpretation", Short).count(Count::Fixed(1)),
            TagSchema::new(0x010e, "ImageDescription", Ascii),
            TagSchema::new(0x010f, "Make", Ascii),
            TagSchema::new(0x0110, "Model", Ascii),
            TagSchema::new(0x0111, "StripOffsets", Long)
                .kind(TagKind::DataOffsets { byte_counts: 0x0117, class: PayloadClass::Data }),
            TagSchema::new(0x0112, "Orientation", Short)
                .count(Count::Fixed(1))
                .conversion(Conversion::Custom(orientation)),
            TagSchema::new(0x0115, "SamplesPerPixel", Short).count(Count::Fixed(1)),
            TagSchema::new(0x0116, "RowsPerStrip", Long).count(Count::Fixed(1)),
            TagSchema::new(0x0117, "StripByteCounts", Long)
                .kind(TagKind::ByteCounts { offsets: 0x0111 }),
            TagSchema::new(0x011a, "XResolution", Rational).count(Count::Fixed(1)),
            TagSchema::new(0x011b, "YResolution", Rational).count(Count::Fixed(1)),
            TagSchema::new(0x011c, "PlanarConfiguration", Short).count(Count::Fixed(1)),
            TagSchema::new(0x0128, "ResolutionUnit", Short).count(Count::Fixed(1)),
            TagSchema::new(0x0131, "Software", Ascii),
            TagSchema::new(0x0132, "ModifyDate", Ascii),
            TagSchema::new(0x013b, "Artist", Ascii).list(),
            TagSchema::new(0x0142, "TileWidth", Long).count(Count::Fixed(1)),
            TagSchema::new(0x0143, "TileLength", Long).count(Count::Fixed(1)),
            TagSchema::new(0x0144, "TileOffsets", Long)
                .kind(TagKind::DataOffsets { byte_counts: 0x0145, class: PayloadClass::Data }),
            TagSchema::new(0x0145, "TileByteCounts", Long)
                .kind(TagKind::ByteCounts { offsets: 0x0144 }),
            TagSchema::subdirectory(0x014a, "SubIFDs", "SubIFD", MAIN_TABLE),
            TagSchema::new(0x0201, "ThumbnailOffset", Long)
                .count(Count::Fixed(1))
                .kind(TagKind::DataOffsets { byte_counts: 0x0202, class: PayloadClass::Preview }),
            TagSchema::new(0x0202, "ThumbnailLength", Long)
                .count(Count::Fixed(1))
                .kind(TagKind::ByteCounts { offsets: 0x0201 }),
            TagSchema::new(0x0213, "YCbCrPositioning", Short).count(Count::Fixed(1)),
            TagSchema::new(0x8298, "Copyright", Ascii),
            TagSchema::subdirectory(0x8769, "ExifOffset", "ExifIFD", EXIF_TABLE),
            TagSchema::subdirectory(0x8825, "GPSInfo", "GPS", GPS_TABLE),
        ],
    )
    .with_next(MAIN_TABLE)
}

fn exif_table() -> TagTable {
    use Format::*;
    TagTable::new(
        EXIF_TABLE,
        [
            TagSchema::new(0x829a, "ExposureTime", Rational).count(Count::Fixed(1)),
            TagSchema::new(0x829d, "FNumber", Rational).count(Count::Fixed(1)),
            TagSchema::new(0x8827, "ISO", Short),
            TagSchema::new(0x9000, "ExifVersion", Undefined).count(Count::Fixed(4)),
            TagSchema::new(0x9003, "DateTimeOriginal", Ascii).count(Count::Fixed(20)),
            TagSchema::new(0x9004, "CreateDate", Ascii).count(Count::Fixed(20)),
            TagSchema::new(0x9201, "ShutterSpeedValue", SRational).count(Count::Fixed(1)),
            TagSchema::new(0x920a, "FocalLength", Rational).count(Count::Fixed(1)),
            TagSchema::new(0x927c, "MakerNote", Undefined),
            TagSchema::new(0x9286, "UserComment", Undefined),
            TagSchema::new(0xa001, "ColorSpace", Short).count(Count::Fixed(1)),
            TagSchema::new(0xa002, "ExifImageWidth", Long).count(Count::Fixed(1)),
            TagSchema::new(0xa003, "ExifImageHeight", Long).count(Count::Fixed(1)),
            TagSchema::subdirectory(0xa005, "InteropOffset", "InteropIFD", INTEROP_TABLE),
            TagSchema::new(0xa420, "ImageUniqueID", Ascii).count(Count::Fixed(33)),
        ],
    )
}

fn gps_table() -> TagTable {
    use Format::*;
    TagTable::new(
        GPS_TABLE,
        [
            TagSchema::new(0x0000, "GPSVersionID", Byte).count(Count::Fixed(4)),
            TagSchema::new(0x0001, "GPSLatitudeRef", Ascii)
                .count(Count::Fixed(2))
                .conversion(Conversion::Custom(latitude_ref)),
            TagSchema::new(0x0002, "GPSLatitude", Rational)
                .count(Count::Fixed(3))
                .conversion(Conversion::Custom(coordinate)),
            TagSchema::new(0x0003, "GPSLongitudeRef", Ascii)
                .count(Count::Fixed(2))
                .conversion(Conversion::Custom(longitude_ref)),
            TagSchema::new(0x0004, "GPSLongitude", Rational)
                .count(Count::Fixed(3))
                .conversion(Conversion::Custom(coordinate)),
            TagSchema::new(0x0005, "GPSAltitudeRef", Byte).count(Count::Fixed(1)),
            TagSchema::new(0x0006, "GPSAltitude", Rational).count(Count::Fixed(1)),
            TagSchema::new(0x0012, "GPSMapDatum", Ascii),
        ],
    )
}

fn interop_table() -> TagTable {
    use Format::*;
    TagTable::new(
        INTEROP_TABLE,
        [
            TagSchema::new(0x0001, "InteropIndex", Ascii).count(Count::Fixed(4)),
            TagSchema::new(0x0002, "InteropVersion", Undefined).count(Count::Fixed(4)),
        ],
    )
}

fn orientation(text: &str) -> Result<Value> {
    let code = match text.trim() {
        "Horizontal (normal)" => 1,
        "Mirror horizontal" => 2,
        "Rotate 180" => 3,
        "Mirror vertical" => 4,
        "Mirror horizontal and rotate 270 CW" => 5,
        "Rotate 90 CW" => 6,
        "Mirror horizontal and rotate 90 CW" => 7,
        "Rotate 270 CW" => 8,
        other => other
            .parse::<u16>()
            .ok()
            .filter(|n| (1..=8).contains(n))
            .ok_or_else(|| Error::invalid_value("SHORT", format!("unknown orientation '{}'", other)))?,
    };
    Ok(Value::from(code))
}

fn hemisphere(text: &str, positive: &'static str, negative: &'static str) -> Result<Value> {
    let t = text.trim();
    let upper = t.to_ascii_uppercase();
    if upper.starts_with(positive) {
        return Ok(Value::Ascii(positive.to_string()));
    }
    if upper.starts_with(negative) {
        return Ok(Value::Ascii(negative.to_string()));
    }
    match t.parse::<f64>() {
        Ok(v) if v < 0.0 => Ok(Value::Ascii(negative.to_string())),
        Ok(_) => Ok(Value::Ascii(positive.to_string())),
        Err(_) => Err(Error::invalid_value("ASCII", format!("unknown hemisphere '{}'", t))),
    }
}

fn latitude_ref(text: &str) -> Result<Value> {
    hemisphere(text, "N", "S")
}

fn longitude_ref(text: &str) -> Result<Value> {
    hemisphere(text, "E", "W")
}

/// Decimal degrees, or space separated degrees/minutes/seconds, as three
/// unsigned values. The sign belongs in the matching reference tag.
fn coordinate(text: &str) -> Result<Value> {
    let parts: Vec<f64> = text
        .split_whitespace()
        .map(|p| p.parse::<f64>().map(f64::abs))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::invalid_value("RATIONAL", format!("bad coordinate '{}'", text)))?;
    match parts.as_slice() {
        [decimal] => {
            let degrees = decimal.trunc();
            let minutes_full = (decimal - degrees) * 60.0;
            let minutes = minutes_full.trunc();
            let seconds = (minutes_full - minutes) * 60.0;
            Ok(Value::Float(vec![degrees, minutes, seconds]))
        }
        [d, m, s] => Ok(Value::Float(vec![*d, *m, *s])),
        _ => Err(Error::invalid_value("RATIONAL", format!("bad coordinate '{}'", text))),
    }
}
