//! Entries that lead elsewhere: sub-directory pointers, embedded vendor
//! blocks and offset/byte-count pairs.

use super::merge::{DirContext, Merged, OutEntry, OutValue, Pending};
use super::{Block, ChainStart, Engine, PayloadSource, PendingPayload, Target};
use crate::codec::{ByteOrder, Format};
use crate::edit::{EditValue, TagEdit};
use crate::error::{Error, Result};
use crate::ifd::{sibling_name, Directory, Entry, COUNT_SIZE};
use crate::schema::{Addressing, Embedding, OrderRule, PayloadClass, TagKind};
use crate::source::Source;
use std::collections::{BTreeSet, HashMap};

/// What a tag of an offset/byte-count pair turns into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PairRole {
    /// Offsets of the listed payloads.
    Offsets(Vec<usize>),
    /// Byte counts of the listed payloads.
    Counts {
        format: Format,
        values: Vec<u32>,
        payloads: Vec<usize>,
    },
    /// The pair is gone.
    Drop,
}

/// The entry a pair role produces, if any. Offsets are always LONG since
/// their values are only known after the final layout.
pub(crate) fn pair_entry(tag: u16, role: &PairRole) -> Option<OutEntry> {
    match role {
        PairRole::Offsets(payloads) => Some(OutEntry {
            tag,
            format: Format::Long,
            count: payloads.len() as u32,
            value: OutValue::Pointers(payloads.iter().map(|&i| Pending::Payload(i)).collect()),
        }),
        PairRole::Counts { format, values, payloads } => Some(OutEntry {
            tag,
            format: *format,
            count: values.len() as u32,
            value: OutValue::Counts { values: values.clone(), payloads: payloads.clone() },
        }),
        PairRole::Drop => None,
    }
}

/// SHORT byte counts stay SHORT while every value fits.
fn counts_format(existing: Option<&Entry>, values: &[u32]) -> Format {
    let short = existing.is_some_and(|e| e.format == Format::Short);
    if short && values.iter().all(|&v| v <= u16::MAX as u32) {
        Format::Short
    } else {
        Format::Long
    }
}

fn defer(merged: &mut Merged, ctx: &DirContext<'_>, tag: u16, class: PayloadClass, source: PayloadSource) -> usize {
    merged.payloads.push(PendingPayload { dir: ctx.name.clone(), tag, class, source });
    merged.payloads.len() - 1
}

impl<'a, S: Source + ?Sized> Engine<'a, S> {
    /// Decide the fate of every offset/byte-count pair in `dir` and queue
    /// the payloads that survive.
    pub(super) fn plan_pairs(
        &mut self,
        ctx: &DirContext<'a>,
        dir: &Directory,
        merged: &mut Merged,
    ) -> Result<HashMap<u16, PairRole>> {
        let mut roles = HashMap::new();
        let Some(table) = ctx.table else {
            return Ok(roles);
        };
        let edits = self.edits;
        let mut candidates: BTreeSet<u16> = dir.entries.iter().map(|e| e.tag).collect();
        candidates.extend(edits.for_directory(&ctx.name).map(|(tag, _)| tag));

        for tag in candidates {
            let Some(TagKind::DataOffsets { byte_counts, class }) = table.get(tag).map(|s| s.kind) else {
                continue;
            };
            let offsets = dir.get(tag);
            let counts = dir.get(byte_counts);
            let edit = edits.get(&ctx.name, tag);

            match edit.map(TagEdit::value) {
                Some(EditValue::Delete) => {
                    roles.insert(tag, PairRole::Drop);
                    roles.insert(byte_counts, PairRole::Drop);
                }
                Some(EditValue::Payload(bytes)) => {
                    if offsets.is_none() && !edit.is_some_and(TagEdit::creates) {
                        continue;
                    }
                    if bytes.is_empty() {
                        return Err(Error::missing_payload(&ctx.name, tag, "substituted payload is empty"));
                    }
                    let len = u32::try_from(bytes.len())
                        .map_err(|_| Error::oversize(ctx.name.as_str(), bytes.len() as u64))?;
                    let index = defer(merged, ctx, tag, class, PayloadSource::Substituted(bytes.clone()));
                    log::debug!("Substituting {} byte payload for tag {:#06x} in {}", len, tag, ctx.name);
                    self.changed();
                    let format = counts_format(counts, &[len]);
                    roles.insert(tag, PairRole::Offsets(vec![index]));
                    roles.insert(byte_counts, PairRole::Counts { format, values: vec![len], payloads: vec![index] });
                }
                _ => {
                    let Some(offsets) = offsets else {
                        continue;
                    };
                    if edit.is_none() && ctx.removes(edits, tag) {
                        roles.insert(tag, PairRole::Drop);
                        roles.insert(byte_counts, PairRole::Drop);
                        continue;
                    }
                    let Some(counts) = counts else {
                        return Err(Error::missing_payload(
                            &ctx.name,
                            tag,
                            format!("byte counts tag {:#06x} is missing", byte_counts),
                        ));
                    };
                    let starts = self.integers(dir, offsets, tag)?;
                    let sizes = self.integers(dir, counts, tag)?;
                    if starts.len() != sizes.len() {
                        return Err(Error::PairMismatch {
                            dir: ctx.name.clone(),
                            tag,
                            offsets: starts.len(),
                            counts: sizes.len(),
                        });
                    }

                    let mut payloads = Vec::with_capacity(starts.len());
                    let mut values = Vec::with_capacity(sizes.len());
                    for (start, size) in starts.into_iter().zip(sizes) {
                        let len = u32::try_from(size).map_err(|_| Error::oversize(ctx.name.as_str(), size))?;
                        let source = PayloadSource::Original { offset: dir.base + start, len: len as usize };
                        payloads.push(defer(merged, ctx, tag, class, source));
                        values.push(len);
                    }
                    let format = counts_format(Some(counts), &values);
                    roles.insert(tag, PairRole::Offsets(payloads.clone()));
                    roles.insert(byte_counts, PairRole::Counts { format, values, payloads });
                }
            }
        }
        Ok(roles)
    }

    fn integers(&self, dir: &Directory, entry: &Entry, tag: u16) -> Result<Vec<u64>> {
        let value = entry.value(self.source, dir.base, dir.order, &dir.name)?;
        value.as_unsigned().ok_or_else(|| {
            Error::missing_payload(&dir.name, tag, format!("tag {:#06x} does not hold integers", entry.tag))
        })
    }

    /// Rewrite the sub-directory (or vendor block) behind an existing entry.
    pub(super) fn rewrite_subdirectory(
        &mut self,
        ctx: &DirContext<'a>,
        dir: &Directory,
        entry: &Entry,
        target: &Target<'a>,
        merged: &mut Merged,
    ) -> Result<Option<OutEntry>> {
        match target.embedding {
            Embedding::Pointer => self.rewrite_pointers(ctx, dir, entry, target, merged),
            Embedding::Block { header_len, addressing, order } => {
                self.rewrite_block(ctx, dir, entry, target, header_len, addressing, order)
            }
        }
    }

    fn rewrite_pointers(
        &mut self,
        ctx: &DirContext<'a>,
        dir: &Directory,
        entry: &Entry,
        target: &Target<'a>,
        merged: &mut Merged,
    ) -> Result<Option<OutEntry>> {
        let value = match entry.value(self.source, dir.base, dir.order, &dir.name) {
            Ok(value) => value,
            Err(err) => {
                self.skip_or_fail(&target.name, err)?;
                return Ok(None);
            }
        };
        let starts = match value.as_unsigned() {
            Some(starts) if entry.format.is_unsigned_int() => starts,
            _ => {
                let err = Error::BadFormat { dir: dir.name.clone(), tag: entry.tag, format: entry.format.code() };
                self.skip_or_fail(&target.name, err)?;
                return Ok(None);
            }
        };

        let mut pointers = Vec::with_capacity(starts.len());
        let mut name = target.name.clone();
        for start in starts {
            if start == 0 {
                self.warn(format!("Dropped null pointer to {} in {}", name, dir.name));
                self.changed();
            } else {
                let chain = ChainStart {
                    name: name.clone(),
                    table: target.table,
                    order: ctx.order,
                    base: dir.base,
                    offset: Some(start),
                    depth: ctx.depth + 1,
                };
                match self.build_chain(&chain) {
                    Ok(block) if block.is_empty() => {}
                    Ok(block) => {
                        merged.children.push(block);
                        pointers.push(Pending::Child(merged.children.len() - 1));
                    }
                    Err(err) => self.skip_or_fail(&name, err)?,
                }
            }
            name = sibling_name(&name);
        }

        if pointers.is_empty() {
            return Ok(None);
        }
        let format = if entry.format == Format::Ifd { Format::Ifd } else { Format::Long };
        Ok(Some(OutEntry {
            tag: entry.tag,
            format,
            count: pointers.len() as u32,
            value: OutValue::Pointers(pointers),
        }))
    }

    /// Create a pointer-embedded sub-directory that has no source.
    pub(super) fn create_subdirectory(
        &mut self,
        ctx: &DirContext<'a>,
        tag: u16,
        target: &Target<'a>,
        merged: &mut Merged,
    ) -> Result<Option<OutEntry>> {
        let chain = ChainStart {
            name: target.name.clone(),
            table: target.table,
            order: ctx.order,
            base: ctx.base,
            offset: None,
            depth: ctx.depth + 1,
        };
        let block = self.build_chain(&chain)?;
        if block.is_empty() {
            return Ok(None);
        }
        log::debug!("Created {} under {}", target.name, ctx.name);
        merged.children.push(block);
        Ok(Some(OutEntry {
            tag,
            format: Format::Long,
            count: 1,
            value: OutValue::Pointers(vec![Pending::Child(merged.children.len() - 1)]),
        }))
    }

    #[allow(clippy::too_many_arguments)]
    fn rewrite_block(
        &mut self,
        ctx: &DirContext<'a>,
        dir: &Directory,
        entry: &Entry,
        target: &Target<'a>,
        header_len: usize,
        addressing: Addressing,
        rule: OrderRule,
    ) -> Result<Option<OutEntry>> {
        let raw = match dir.data(self.source, entry) {
            Ok(raw) => raw,
            Err(err) => {
                self.skip_or_fail(&target.name, err)?;
                return Ok(None);
            }
        };
        if raw.len() < header_len + COUNT_SIZE {
            let err = Error::truncated(
                target.name.as_str(),
                format!("{} byte block cannot hold a {} byte header and a directory", raw.len(), header_len),
            );
            return self.keep_block(entry, raw, err);
        }

        let order = match rule {
            OrderRule::Inherit => ctx.order,
            OrderRule::Detect(at) => match raw.get(at..at + 2).and_then(ByteOrder::from_marker) {
                Some(order) => order,
                None => {
                    self.warn(format!("No byte order mark in {}; using the parent order", target.name));
                    ctx.order
                }
            },
        };
        let position = entry.offset(dir.order) as u64;
        let (base, offset) = match addressing {
            Addressing::Block => (dir.base + position, header_len as u64),
            Addressing::Parent => (dir.base, position + header_len as u64),
        };
        let chain = ChainStart {
            name: target.name.clone(),
            table: target.table,
            order,
            base,
            offset: Some(offset),
            depth: ctx.depth + 1,
        };
        let inner = match self.build_chain(&chain) {
            Ok(inner) => inner,
            Err(err) => return self.keep_block(entry, raw, err),
        };
        if inner.is_empty() {
            return Ok(None);
        }

        let mut block = Block::with_order(order);
        block.data.extend_from_slice(&raw[..header_len]);
        let mut payloads = Vec::new();
        block.append(inner, &mut payloads);
        block.payloads = payloads;

        let value = match addressing {
            Addressing::Block => {
                self.finalize_payloads(&mut block)?;
                let Block { mut data, fixup, .. } = block;
                fixup.apply(&mut data, order)?;
                OutValue::Bytes(data)
            }
            Addressing::Parent => OutValue::Embedded(block),
        };
        let len = match &value {
            OutValue::Bytes(data) => data.len(),
            OutValue::Embedded(block) => block.data.len(),
            _ => 0,
        };
        let count = u32::try_from(len).map_err(|_| Error::oversize(target.name.as_str(), len as u64))?;
        Ok(Some(OutEntry { tag: entry.tag, format: Format::Undefined, count, value }))
    }

    /// Copy an unreadable vendor block unchanged when bad sub-directories may
    /// be skipped.
    fn keep_block(&mut self, entry: &Entry, raw: Vec<u8>, err: Error) -> Result<Option<OutEntry>> {
        let recoverable = err.is_structural() || matches!(err, Error::IoRead { .. });
        if !(self.options.skip_bad_subdirectories && recoverable) {
            return Err(err);
        }
        self.warn(format!("Copied unreadable block {:#06x} unchanged: {}", entry.tag, err));
        let count = raw.len() as u32;
        Ok(Some(OutEntry { tag: entry.tag, format: Format::Undefined, count, value: OutValue::Bytes(raw) }))
    }
}
