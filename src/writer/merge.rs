//! Directory merge.
//!
//! Two cursors move through a directory in tag order: one over the source
//! entries, one over the requested tags. Requested tags are the edits for
//! the directory, containers of sub-directories that must be created and
//! byte-count partners of substituted payloads. Because both sides are
//! sorted and unique, the merged entries come out strictly increasing.

use super::resolver::{pair_entry, PairRole};
use super::{Block, Engine, PendingPayload, Target};
use crate::codec::{encode, ByteOrder, Encoded, Format, Value};
use crate::edit::{EditSet, EditValue, TagEdit};
use crate::error::{Error, Result};
use crate::ifd::{Directory, Entry};
use crate::schema::{Count, Embedding, TagKind, TagSchema, TagTable};
use crate::source::Source;
use std::collections::{BTreeMap, HashMap};

/// An offset slot resolved after layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    /// Start of a child block, by index into [`Merged::children`].
    Child(usize),
    /// Start of a deferred payload, by index into [`Merged::payloads`].
    Payload(usize),
}

/// Value of a merged entry.
#[derive(Debug)]
pub(crate) enum OutValue {
    /// Final value bytes.
    Bytes(Vec<u8>),
    /// 32-bit offsets filled in once their targets are placed.
    Pointers(Vec<Pending>),
    /// Byte counts of deferred payloads.
    Counts { values: Vec<u32>, payloads: Vec<usize> },
    /// A block whose ledger and payloads join the directory's.
    Embedded(Block),
}

#[derive(Debug)]
pub(crate) struct OutEntry {
    pub tag: u16,
    pub format: Format,
    pub count: u32,
    pub value: OutValue,
}

impl OutEntry {
    fn bytes(tag: u16, format: Format, count: u32, bytes: Vec<u8>) -> Self {
        Self { tag, format, count, value: OutValue::Bytes(bytes) }
    }
}

/// A merged directory before layout.
#[derive(Debug, Default)]
pub(crate) struct Merged {
    pub entries: Vec<OutEntry>,
    pub children: Vec<Block>,
    pub payloads: Vec<PendingPayload>,
}

/// The directory being merged.
#[derive(Debug, Clone)]
pub(crate) struct DirContext<'a> {
    pub name: String,
    pub table: Option<&'a TagTable>,
    pub order: ByteOrder,
    pub base: u64,
    pub depth: usize,
}

impl<'a> DirContext<'a> {
    fn schema(&self, tag: u16) -> Option<&'a TagSchema> {
        self.table.and_then(|t| t.get(tag))
    }

    /// Whether an existing `tag` here is removed by a move or a global delete.
    pub(crate) fn removes(&self, edits: &EditSet, tag: u16) -> bool {
        edits.moved_from(&self.name, tag) || (edits.deleted_everywhere(tag) && self.schema(tag).is_some())
    }
}

enum Request<'e> {
    Edit(&'e TagEdit),
    Create,
}

/// Lookups shared by every step of one directory merge.
struct Plan<'a> {
    targets: BTreeMap<u16, Target<'a>>,
    pairs: HashMap<u16, PairRole>,
}

impl<'a, S: Source + ?Sized> Engine<'a, S> {
    /// Merge `source` (absent for a new directory) with the edits for it.
    pub(super) fn merge_directory(&mut self, ctx: &DirContext<'a>, source: Option<&Directory>) -> Result<Merged> {
        let blank;
        let dir = match source {
            Some(dir) => dir,
            None => {
                blank = Directory {
                    name: ctx.name.clone(),
                    base: ctx.base,
                    offset: 0,
                    order: ctx.order,
                    entries: Vec::new(),
                    next: 0,
                    warnings: Vec::new(),
                };
                &blank
            }
        };

        let mut merged = Merged::default();
        let targets = self.targets(&ctx.name, ctx.table);
        self.claim(&targets);
        let pairs = self.plan_pairs(ctx, dir, &mut merged)?;
        let plan = Plan { targets, pairs };
        let requested = self.requested(ctx, dir, &plan);

        let mut index = 0;
        let mut requested = requested.into_iter().peekable();
        loop {
            let next_tag = requested.peek().map(|(tag, _)| *tag);
            let out = match (dir.entries.get(index), next_tag) {
                (None, None) => break,
                (Some(entry), Some(tag)) if entry.tag == tag => {
                    index += 1;
                    match requested.next() {
                        Some((_, Request::Edit(edit))) => {
                            self.apply_edit(ctx, dir, Some(entry), entry.tag, edit, &plan, &mut merged)?
                        }
                        _ => self.carry(ctx, dir, entry, &plan, &mut merged)?,
                    }
                }
                (Some(entry), Some(tag)) if entry.tag < tag => {
                    index += 1;
                    self.pass_through(ctx, dir, entry, &plan, &mut merged)?
                }
                (Some(entry), None) => {
                    index += 1;
                    self.pass_through(ctx, dir, entry, &plan, &mut merged)?
                }
                (_, Some(tag)) => match requested.next() {
                    Some((_, Request::Edit(edit))) if edit.creates() || plan.pairs.contains_key(&tag) => {
                        self.apply_edit(ctx, dir, None, tag, edit, &plan, &mut merged)?
                    }
                    Some((_, Request::Create)) => self.create(ctx, tag, &plan, &mut merged)?,
                    _ => None,
                },
            };
            if let Some(out) = out {
                merged.entries.push(out);
            }
        }
        Ok(merged)
    }

    fn requested(&self, ctx: &DirContext<'a>, dir: &Directory, plan: &Plan<'a>) -> BTreeMap<u16, Request<'a>> {
        let edits = self.edits;
        let mut requested: BTreeMap<u16, Request<'a>> =
            edits.for_directory(&ctx.name).map(|(tag, edit)| (tag, Request::Edit(edit))).collect();

        for (tag, target) in &plan.targets {
            if dir.get(*tag).is_none()
                && !requested.contains_key(tag)
                && target.embedding == Embedding::Pointer
                && self.needs(&target.name, target.table)
            {
                requested.insert(*tag, Request::Create);
            }
        }
        for (tag, role) in &plan.pairs {
            if matches!(role, PairRole::Counts { .. }) && dir.get(*tag).is_none() {
                requested.entry(*tag).or_insert(Request::Create);
            }
        }
        requested
    }

    /// An existing entry with no edit of its own.
    fn pass_through(
        &mut self,
        ctx: &DirContext<'a>,
        dir: &Directory,
        entry: &Entry,
        plan: &Plan<'a>,
        merged: &mut Merged,
    ) -> Result<Option<OutEntry>> {
        if ctx.removes(self.edits, entry.tag) && !plan.pairs.contains_key(&entry.tag) {
            log::debug!("Removing tag {:#06x} from {}", entry.tag, ctx.name);
            self.changed();
            return Ok(None);
        }
        self.carry(ctx, dir, entry, plan, merged)
    }

    /// Carry an existing entry forward, rewriting whatever it leads to.
    fn carry(
        &mut self,
        ctx: &DirContext<'a>,
        dir: &Directory,
        entry: &Entry,
        plan: &Plan<'a>,
        merged: &mut Merged,
    ) -> Result<Option<OutEntry>> {
        if let Some(target) = plan.targets.get(&entry.tag) {
            return self.rewrite_subdirectory(ctx, dir, entry, target, merged);
        }
        if let Some(role) = plan.pairs.get(&entry.tag) {
            let out = pair_entry(entry.tag, role);
            if out.is_none() {
                self.changed();
            }
            return Ok(out);
        }
        let bytes = dir.data(self.source, entry)?;
        Ok(Some(OutEntry::bytes(entry.tag, entry.format, entry.count, bytes)))
    }

    /// Materialize a requested tag that has no source entry.
    fn create(&mut self, ctx: &DirContext<'a>, tag: u16, plan: &Plan<'a>, merged: &mut Merged) -> Result<Option<OutEntry>> {
        if let Some(target) = plan.targets.get(&tag) {
            return self.create_subdirectory(ctx, tag, target, merged);
        }
        Ok(plan.pairs.get(&tag).and_then(|role| pair_entry(tag, role)))
    }

    #[allow(clippy::too_many_arguments)]
    fn apply_edit(
        &mut self,
        ctx: &DirContext<'a>,
        dir: &Directory,
        existing: Option<&Entry>,
        tag: u16,
        edit: &TagEdit,
        plan: &Plan<'a>,
        merged: &mut Merged,
    ) -> Result<Option<OutEntry>> {
        match edit.value() {
            EditValue::Delete => {
                if let Some(PairRole::Counts { .. }) = plan.pairs.get(&tag) {
                    self.warn(format!(
                        "Byte counts {:#06x} in {} follow their offsets; delete the offsets tag instead",
                        tag, ctx.name
                    ));
                    return self.keep(ctx, dir, existing, tag, plan, merged);
                }
                if existing.is_some() {
                    log::debug!("Deleting tag {:#06x} from {}", tag, ctx.name);
                    self.changed();
                }
                Ok(None)
            }
            EditValue::Payload(_) => match plan.pairs.get(&tag) {
                Some(role @ PairRole::Offsets(_)) => Ok(pair_entry(tag, role)),
                _ => {
                    self.warn(format!("Tag {:#06x} in {} does not reference a payload", tag, ctx.name));
                    self.keep(ctx, dir, existing, tag, plan, merged)
                }
            },
            EditValue::Set(values) => {
                if plan.targets.contains_key(&tag) {
                    self.warn(format!("Cannot set directory pointer {:#06x} in {}", tag, ctx.name));
                    return self.keep(ctx, dir, existing, tag, plan, merged);
                }
                let derived = matches!(
                    ctx.schema(tag).map(|s| s.kind),
                    Some(TagKind::DataOffsets { .. } | TagKind::ByteCounts { .. })
                );
                if derived {
                    self.warn(format!("Tag {:#06x} in {} is derived from its payload", tag, ctx.name));
                    return self.keep(ctx, dir, existing, tag, plan, merged);
                }
                match self.encode_edit(ctx, existing, tag, values) {
                    Ok(Some((format, encoded))) => {
                        self.changed();
                        Ok(Some(OutEntry::bytes(tag, format, encoded.count, encoded.bytes)))
                    }
                    Ok(None) => {
                        if existing.is_some() {
                            self.changed();
                        }
                        Ok(None)
                    }
                    Err(err) => {
                        self.warn(format!("Could not set tag {:#06x} in {}: {}", tag, ctx.name, err));
                        self.keep(ctx, dir, existing, tag, plan, merged)
                    }
                }
            }
        }
    }

    /// Keep whatever was there before a skipped edit.
    fn keep(
        &mut self,
        ctx: &DirContext<'a>,
        dir: &Directory,
        existing: Option<&Entry>,
        tag: u16,
        plan: &Plan<'a>,
        merged: &mut Merged,
    ) -> Result<Option<OutEntry>> {
        match existing {
            Some(entry) => self.carry(ctx, dir, entry, plan, merged),
            None => Ok(plan.pairs.get(&tag).and_then(|role| pair_entry(tag, role))),
        }
    }

    /// Encode the values of a set edit. `None` means the edit empties the tag.
    fn encode_edit(
        &mut self,
        ctx: &DirContext<'a>,
        existing: Option<&Entry>,
        tag: u16,
        values: &[Value],
    ) -> Result<Option<(Format, Encoded)>> {
        if values.iter().all(is_empty_value) {
            return Ok(None);
        }
        let schema = ctx.schema(tag);
        let mut values = values
            .iter()
            .map(|v| schema.map_or_else(|| Ok(v.clone()), |s| s.convert(v)))
            .collect::<Result<Vec<_>>>()?;

        let format = schema
            .map(|s| s.format)
            .or(existing.map(|e| e.format))
            .unwrap_or_else(|| values[0].natural_format());
        let count = match schema.map(|s| s.count) {
            Some(Count::Fixed(n)) => Some(n),
            Some(Count::KeepExisting) => existing.map(|e| e.count),
            Some(Count::Natural) | None => existing.filter(|_| is_numeric(format)).map(|e| e.count),
        };

        let list = schema.is_some_and(|s| s.list);
        if values.len() > 1 && !list {
            self.warn(format!("Tag {:#06x} in {} takes one value; using the last", tag, ctx.name));
            values.drain(..values.len() - 1);
        }
        if let [value] = values.as_slice() {
            return encode(value, format, count, ctx.order).map(|e| Some((format, e)));
        }

        let mut bytes = Vec::new();
        let mut total = 0u32;
        for value in &values {
            let encoded = encode(value, format, None, ctx.order)?;
            bytes.extend_from_slice(&encoded.bytes);
            total += encoded.count;
        }
        if let Some(n) = count {
            if n != total {
                if !matches!(format, Format::Ascii | Format::Undefined) {
                    return Err(Error::invalid_value(
                        format.name(),
                        format!("expected {} values, got {}", n, total),
                    ));
                }
                bytes.resize(n as usize, 0);
                if format == Format::Ascii {
                    if let Some(last) = bytes.last_mut() {
                        *last = 0;
                    }
                }
                total = n;
            }
        }
        Ok(Some((format, Encoded { bytes, count: total })))
    }
}

/// Formats whose count is a number of values rather than a byte length.
fn is_numeric(format: Format) -> bool {
    !matches!(format, Format::Ascii | Format::Undefined)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Text(s) | Value::Ascii(s) => s.is_empty(),
        Value::Bytes(b) => b.is_empty(),
        Value::Unsigned(v) => v.is_empty(),
        Value::Signed(v) => v.is_empty(),
        Value::Rational(v) => v.is_empty(),
        Value::SRational(v) => v.is_empty(),
        Value::Float(v) => v.is_empty(),
    }
}
