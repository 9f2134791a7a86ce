//! # tagdir - A read-modify-write engine for tag directories
//!
//! tagdir rewrites TIFF-style tag directories: the structure behind TIFF
//! files and EXIF metadata blocks. A directory is a count, a run of 12-byte
//! entries and a pointer to the next directory. Entries hold small values
//! inline and point at everything else: larger values, nested directories,
//! image strips and thumbnails.
//!
//! Rewriting such a tree means every offset changes, and no offset is known
//! until the whole tree is laid out. tagdir builds each directory with its
//! offsets relative to its own start, records every offset slot in a
//! relocation ledger, splices blocks together bottom-up and relocates all
//! slots once at the end.
//!
//! ## Round trips
//!
//! Rebuilding a tree without edits reproduces the canonical layout: entries
//! in ascending tag order, values padded to even lengths, children after
//! their parent chain and payloads last. Offsets of strips, tiles and
//! thumbnails are always written as LONG, because their final positions are
//! only known once the whole tree is laid out. A source that stores such
//! offsets as SHORT therefore comes back with LONG offsets, and the byte
//! counts next to them stay SHORT when every count fits.
//!
//! ## Architecture
//!
//! - **Codec**: value formats, explicit byte order and rational approximation
//! - **Directory reader**: parses directories from any random-access source
//! - **Schema registry**: immutable tables describing tags and sub-directories
//! - **EditSet**: the requested additions, replacements and deletions
//! - **Writer**: merges directories with edits and assembles the output
//!
//! ## Example Usage
//!
//! ```rust
//! use tagdir::{tiff, EditSet, Options, Registry};
//!
//! # fn main() -> Result<(), tagdir::Error> {
//! let registry = Registry::standard();
//!
//! // Build a new TIFF structure from nothing
//! let mut edits = EditSet::new();
//! edits.set("IFD0", 0x010f, "Acme");
//! edits.set("ExifIFD", 0x8827, 400u16);
//! let original = tiff::create_tiff(&registry, &Options::default(), &edits, tagdir::ByteOrder::Little)?;
//!
//! // Edit it
//! let mut edits = EditSet::new();
//! edits.set("IFD0", 0x0110, "Model 2");
//! edits.delete("ExifIFD", 0x8827);
//! let rewritten = tiff::rewrite_tiff(&original, &registry, &Options::default(), &edits)?;
//! assert_ne!(original, rewritten);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod codec;
pub mod config;
pub mod edit;
pub mod error;
pub mod fixup;
pub mod ifd;
pub mod schema;
pub mod source;
pub mod tiff;
mod writer;

// Re-exports
pub use codec::{ByteOrder, Format, Value};
pub use config::{DuplicatePolicy, Options};
pub use edit::{EditSet, EditValue, TagEdit};
pub use error::{Error, Result};
pub use ifd::{Directory, Entry};
pub use schema::Registry;
pub use source::{FileSource, Source};
pub use writer::Report;

use writer::{ChainStart, Engine};

/// Where a directory tree lives in a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryLocation {
    /// Name of the first directory, e.g. `IFD0`.
    pub name: String,
    /// Registry table describing the first directory.
    pub table: String,
    /// Offset of the first directory from `base`, or `None` to build a new
    /// tree.
    pub offset: Option<u64>,
    /// Coordinate base of offsets stored in the source.
    pub base: u64,
    /// Byte order of the tree.
    pub order: ByteOrder,
}

impl DirectoryLocation {
    /// A tree whose first directory is at `offset` from the start of the
    /// source.
    pub fn at(name: impl Into<String>, table: impl Into<String>, offset: u64, order: ByteOrder) -> Self {
        Self { name: name.into(), table: table.into(), offset: Some(offset), base: 0, order }
    }

    /// A tree that does not exist yet.
    pub fn new_tree(name: impl Into<String>, table: impl Into<String>, order: ByteOrder) -> Self {
        Self { name: name.into(), table: table.into(), offset: None, base: 0, order }
    }

    /// Set the coordinate base of the source offsets.
    pub fn base(mut self, base: u64) -> Self {
        self.base = base;
        self
    }
}

/// A rebuilt directory region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    /// The region bytes. Empty when the whole tree was deleted.
    pub data: Vec<u8>,
    /// Position the region must be placed at; every offset in `data` is
    /// already relative to the coordinate base, assuming this placement.
    pub base: u64,
    /// Number of changes made.
    pub changes: usize,
    /// Tolerated anomalies and skipped edits.
    pub warnings: Vec<String>,
}

/// Result of [`Rewriter::rewrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// Nothing changed; the original bytes can be copied as they are.
    Unchanged(Report),
    /// The region was rebuilt.
    Changed(Output),
}

impl Rewrite {
    /// Returns true if the region was rebuilt.
    pub fn is_changed(&self) -> bool {
        matches!(self, Rewrite::Changed(_))
    }

    /// Warnings collected during the rewrite.
    pub fn warnings(&self) -> &[String] {
        match self {
            Rewrite::Unchanged(report) => &report.warnings,
            Rewrite::Changed(output) => &output.warnings,
        }
    }
}

/// Rewrites directory trees against a registry.
///
/// A `Rewriter` holds no per-call state, so one instance can serve any
/// number of rewrites.
///
/// # Example
///
/// ```rust
/// use tagdir::{ByteOrder, DirectoryLocation, EditSet, Options, Registry, Rewrite, Rewriter};
///
/// # fn main() -> Result<(), tagdir::Error> {
/// let registry = Registry::standard();
/// let rewriter = Rewriter::new(&registry, Options::default())?;
///
/// let mut edits = EditSet::new();
/// edits.set("IFD0", 0x0131, "tagdir");
///
/// let empty: &[u8] = &[];
/// let location = DirectoryLocation::new_tree("IFD0", "Main", ByteOrder::Big);
/// match rewriter.rewrite(empty, &location, &edits, 8)? {
///     Rewrite::Changed(output) => assert_eq!(output.changes, 1),
///     Rewrite::Unchanged(_) => unreachable!(),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Rewriter<'r> {
    registry: &'r Registry,
    options: Options,
}

impl<'r> Rewriter<'r> {
    /// Creates a rewriter. Fails if `options` are invalid.
    pub fn new(registry: &'r Registry, options: Options) -> Result<Self> {
        options.validate()?;
        Ok(Self { registry, options })
    }

    /// The options in use.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Read the first directory of the tree at `location`.
    pub fn read<S: Source + ?Sized>(&self, source: &S, location: &DirectoryLocation) -> Result<Directory> {
        let offset = location
            .offset
            .ok_or_else(|| Error::invalid_argument(format!("{} has no source offset", location.name)))?;
        ifd::read_directory(source, &location.name, location.base, offset, location.order, &self.options)
    }

    /// Apply `edits` to the tree at `location`.
    ///
    /// Returns [`Rewrite::Unchanged`] when no edit took effect, so the caller
    /// can keep the original bytes. Otherwise the rebuilt region is laid out
    /// to be placed at `out_base`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A directory is truncated or uses an unknown format
    /// - An offset/byte-count pair cannot be resolved
    /// - Payload bytes cannot be read
    /// - The output does not fit a 32-bit offset space
    pub fn rewrite<S: Source + ?Sized>(
        &self,
        source: &S,
        location: &DirectoryLocation,
        edits: &EditSet,
        out_base: u64,
    ) -> Result<Rewrite> {
        let output = self.assemble(source, location, edits, out_base)?;
        if output.changes == 0 {
            log::info!("No changes to {}", location.name);
            return Ok(Rewrite::Unchanged(Report { changes: 0, warnings: output.warnings }));
        }
        Ok(Rewrite::Changed(output))
    }

    /// Rebuild the tree at `location` whether or not anything changes.
    pub fn assemble<S: Source + ?Sized>(
        &self,
        source: &S,
        location: &DirectoryLocation,
        edits: &EditSet,
        out_base: u64,
    ) -> Result<Output> {
        let table = self
            .registry
            .table(&location.table)
            .ok_or_else(|| Error::invalid_argument(format!("unknown tag table '{}'", location.table)))?;
        let mut engine = Engine::new(source, self.registry, &self.options, edits);
        let start = ChainStart {
            name: location.name.clone(),
            table: Some(table),
            order: location.order,
            base: location.base,
            offset: location.offset,
            depth: 0,
        };
        let block = engine.build_chain(&start)?;
        let data = engine.finish(block, &location.name, location.order, out_base)?;
        let report = engine.into_report();
        log::info!(
            "Assembled {}: {} bytes, {} changes, {} warnings",
            location.name,
            data.len(),
            report.changes,
            report.warnings.len()
        );
        Ok(Output { data, base: out_base, changes: report.changes, warnings: report.warnings })
    }
}
