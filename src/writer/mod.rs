//! The directory rewrite engine.
//!
//! One [`Engine`] runs per rewrite. The assembler walks a chain of
//! directories; for each one the merge step combines the source entries with
//! the requested edits, and the resolver handles entries that lead elsewhere
//! (sub-directories, vendor blocks, payload offsets). Every part produces a
//! [`Block`]: bytes whose offset slots are relative to the block start, a
//! ledger of those slots, and the payloads still waiting to be appended.
//!
//! Blocks are spliced bottom-up. Payloads bubble up to the outermost block
//! and are appended last; the root ledger is applied once with the final
//! output base.

mod assembler;
mod merge;
mod resolver;

pub(crate) use assembler::ChainStart;

use crate::codec::{ByteOrder, Format};
use crate::config::Options;
use crate::edit::EditSet;
use crate::error::{Error, Result};
use crate::fixup::Fixup;
use crate::ifd::{read_directory, Directory};
use crate::schema::{Embedding, PayloadClass, Registry, TagTable};
use crate::source::Source;
use std::collections::{BTreeMap, HashSet};

/// Outcome counters and warnings for one rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// Number of changes made to the tree.
    pub changes: usize,
    /// Tolerated anomalies and skipped edits, in the order they occurred.
    pub warnings: Vec<String>,
}

/// Where the bytes of a deferred payload come from.
#[derive(Debug, Clone)]
pub(crate) enum PayloadSource {
    /// A range of the source, read during the final pass.
    Original { offset: u64, len: usize },
    /// Caller-supplied bytes.
    Substituted(Vec<u8>),
}

/// A payload waiting to be appended at the end of the output.
#[derive(Debug, Clone)]
pub(crate) struct PendingPayload {
    pub dir: String,
    pub tag: u16,
    pub class: PayloadClass,
    pub source: PayloadSource,
}

/// A pending payload bound to the slots that reference it.
#[derive(Debug, Clone)]
pub(crate) struct PayloadSlot {
    /// Position of the 32-bit offset to the payload.
    pub offset_slot: usize,
    /// Position and width of the matching byte count, when one was emitted.
    pub count_slot: Option<(usize, Format)>,
    /// Byte order of the directory holding the slots.
    pub order: ByteOrder,
    pub payload: PendingPayload,
}

impl PayloadSlot {
    fn shifted(mut self, by: usize) -> Self {
        self.offset_slot += by;
        if let Some((pos, _)) = self.count_slot.as_mut() {
            *pos += by;
        }
        self
    }
}

/// Bytes under construction with their relocation ledger and the payloads
/// still to be appended.
#[derive(Debug, Default)]
pub(crate) struct Block {
    pub data: Vec<u8>,
    pub fixup: Fixup,
    pub payloads: Vec<PayloadSlot>,
}

impl Block {
    fn with_order(order: ByteOrder) -> Self {
        let mut block = Self::default();
        block.fixup.set_order(order);
        block
    }

    fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Append `child`, rebasing its ledger. Its payloads go to `payloads`
    /// with their slots moved to the new position. Returns the splice offset.
    fn append(&mut self, child: Block, payloads: &mut Vec<PayloadSlot>) -> usize {
        let at = self.data.len();
        let Block { data, mut fixup, payloads: child_payloads } = child;
        self.data.extend_from_slice(&data);
        fixup.splice(at);
        self.fixup.add_fixup(fixup);
        payloads.extend(child_payloads.into_iter().map(|slot| slot.shifted(at)));
        at
    }
}

/// A sub-directory reachable from a directory being merged.
#[derive(Debug, Clone)]
pub(crate) struct Target<'a> {
    pub name: String,
    pub table: Option<&'a TagTable>,
    pub embedding: Embedding,
}

/// Per-rewrite state.
pub(crate) struct Engine<'a, S: Source + ?Sized> {
    source: &'a S,
    registry: &'a Registry,
    options: &'a Options,
    edits: &'a EditSet,
    visited: HashSet<u64>,
    claimed: HashSet<String>,
    report: Report,
}

impl<'a, S: Source + ?Sized> Engine<'a, S> {
    pub(crate) fn new(source: &'a S, registry: &'a Registry, options: &'a Options, edits: &'a EditSet) -> Self {
        Self {
            source,
            registry,
            options,
            edits,
            visited: HashSet::new(),
            claimed: HashSet::new(),
            report: Report::default(),
        }
    }

    pub(crate) fn into_report(self) -> Report {
        self.report
    }

    fn warn(&mut self, message: String) {
        log::warn!("{}", message);
        self.report.warnings.push(message);
    }

    fn changed(&mut self) {
        self.report.changes += 1;
    }

    /// Read a directory once. A second visit to the same position is a loop.
    fn load(&mut self, name: &str, base: u64, offset: u64, order: ByteOrder) -> Result<Directory> {
        let at = base + offset;
        if !self.visited.insert(at) {
            return Err(Error::CircularReference { dir: name.to_string(), offset: at });
        }
        let dir = read_directory(self.source, name, base, offset, order, self.options)?;
        self.report.warnings.extend(dir.warnings.iter().cloned());
        Ok(dir)
    }

    /// Drop a failed sub-tree when the options allow it, otherwise fail.
    fn skip_or_fail(&mut self, name: &str, err: Error) -> Result<()> {
        let recoverable = err.is_structural() || matches!(err, Error::IoRead { .. });
        if self.options.skip_bad_subdirectories && recoverable {
            self.warn(format!("Dropped bad directory {}: {}", name, err));
            self.changed();
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Sub-directories reachable from `dir`, keyed by container tag.
    /// Explicit additions override the table.
    fn targets(&self, dir: &str, table: Option<&'a TagTable>) -> BTreeMap<u16, Target<'a>> {
        let mut targets = BTreeMap::new();
        if let Some(table) = table {
            for (tag, spec) in table.subdirectories() {
                let target = Target {
                    name: spec.name.to_string(),
                    table: self.registry.table(spec.table),
                    embedding: spec.embedding,
                };
                targets.insert(tag, target);
            }
        }
        for addition in self.edits.additions_for(dir) {
            let target = Target {
                name: addition.name.clone(),
                table: self.registry.table(&addition.table),
                embedding: Embedding::Pointer,
            };
            targets.insert(addition.tag, target);
        }
        targets
    }

    /// Record that the sub-directories in `targets` belong to the directory
    /// being merged, so no deeper directory creates them.
    fn claim(&mut self, targets: &BTreeMap<u16, Target<'a>>) {
        self.claimed.extend(targets.values().map(|t| t.name.clone()));
    }

    /// Whether creating edits target `name` or any unclaimed directory
    /// below it.
    fn needs(&self, name: &str, table: Option<&'a TagTable>) -> bool {
        let mut path = Vec::new();
        self.needs_below(name, table, &mut path)
    }

    fn needs_below(&self, name: &str, table: Option<&'a TagTable>, path: &mut Vec<String>) -> bool {
        if self.edits.has_creating_edits(name) {
            return true;
        }
        if path.iter().any(|p| p == name) || path.len() >= self.options.max_depth {
            return false;
        }
        path.push(name.to_string());
        let found = self
            .targets(name, table)
            .into_values()
            .any(|t| {
                t.embedding == Embedding::Pointer
                    && !self.claimed.contains(&t.name)
                    && self.needs_below(&t.name, t.table, path)
            });
        path.pop();
        found
    }

    /// Append the deferred payloads of `block` to its end and point their
    /// slots at them.
    fn finalize_payloads(&mut self, block: &mut Block) -> Result<()> {
        for slot in std::mem::take(&mut block.payloads) {
            let PendingPayload { dir, tag, class, source } = slot.payload;
            let bytes = match source {
                PayloadSource::Substituted(bytes) => bytes,
                PayloadSource::Original { offset, len } => match self.source.read_at(offset, len) {
                    Ok(bytes) => bytes,
                    Err(err) if class == PayloadClass::Preview && self.options.lenient_previews => {
                        self.warn(format!("Could not read preview data for tag {:#06x} in {}: {}", tag, dir, err));
                        slot.order.patch_u32(&mut block.data, slot.offset_slot, 0);
                        if let Some((pos, format)) = slot.count_slot {
                            patch_count(&mut block.data, pos, format, slot.order, 0);
                        }
                        self.changed();
                        continue;
                    }
                    Err(err) => return Err(Error::io_read(dir, err)),
                },
            };
            let at = block.data.len();
            let offset = u32::try_from(at).map_err(|_| Error::oversize(dir.as_str(), at as u64))?;
            block.data.extend_from_slice(&bytes);
            if block.data.len() % 2 == 1 {
                block.data.push(0);
            }
            slot.order.patch_u32(&mut block.data, slot.offset_slot, offset);
            let mut fixup = Fixup::new();
            fixup.set_order(slot.order);
            fixup.add_position(slot.offset_slot);
            block.fixup.add_fixup(fixup);
        }
        Ok(())
    }

    /// Finish the outermost block: append payloads and relocate every slot
    /// by `out_base`.
    pub(crate) fn finish(&mut self, mut block: Block, name: &str, order: ByteOrder, out_base: u64) -> Result<Vec<u8>> {
        if block.is_empty() {
            return Ok(Vec::new());
        }
        self.finalize_payloads(&mut block)?;
        let end = out_base + block.data.len() as u64;
        if end > u32::MAX as u64 {
            return Err(Error::oversize(name, end));
        }
        block.fixup.add_shift(out_base as i64);
        block.fixup.apply(&mut block.data, order)?;
        Ok(block.data)
    }
}

fn patch_count(buf: &mut [u8], pos: usize, format: Format, order: ByteOrder, value: u32) {
    match format {
        Format::Short => order.patch_u16(buf, pos, value as u16),
        _ => order.patch_u32(buf, pos, value),
    }
}
