//! Chain assembly and directory layout.
//!
//! A chain is a run of directories linked by their next pointers (IFD0,
//! IFD1, ...). Each directory is laid out as
//!
//! ```text
//! +-------+-----------+------+--------------------+
//! | count | entries   | next | value area         |
//! +-------+-----------+------+--------------------+
//! ```
//!
//! followed, once the whole chain is placed, by the child blocks of each
//! directory in directory order. Payloads are handed up to the caller.

use super::merge::{DirContext, Merged, OutValue, Pending};
use super::{Block, Engine, PayloadSlot};
use crate::codec::{ByteOrder, Format};
use crate::error::{Error, Result};
use crate::fixup::Fixup;
use crate::ifd::{directory_size, sibling_name, INLINE_SIZE};
use crate::schema::TagTable;
use crate::source::Source;
use std::collections::HashMap;

/// Where a chain starts and how to read it.
#[derive(Debug, Clone)]
pub(crate) struct ChainStart<'a> {
    /// Name of the first directory.
    pub name: String,
    /// Table of the first directory.
    pub table: Option<&'a TagTable>,
    pub order: ByteOrder,
    /// Coordinate base of offsets read from the source.
    pub base: u64,
    /// Source offset of the first directory; `None` builds from scratch.
    pub offset: Option<u64>,
    pub depth: usize,
}

/// A laid out directory.
struct Emitted {
    block: Block,
    /// Position of the next-directory pointer.
    next_slot: usize,
    /// Child blocks with the position of the slot that points at each.
    children: Vec<(usize, Block)>,
}

impl<'a, S: Source + ?Sized> Engine<'a, S> {
    /// Merge and lay out the chain starting at `start`.
    ///
    /// Returns an empty block when nothing in the chain survives.
    pub(crate) fn build_chain(&mut self, start: &ChainStart<'a>) -> Result<Block> {
        if start.depth > self.options.max_depth {
            return Err(Error::DepthExceeded { dir: start.name.clone(), limit: self.options.max_depth });
        }

        let mut dirs: Vec<(String, Merged, bool)> = Vec::new();
        let mut name = start.name.clone();
        let mut table = start.table;
        let mut offset = start.offset;
        loop {
            let source = match offset {
                Some(at) => match self.load(&name, start.base, at, start.order) {
                    Ok(dir) => Some(dir),
                    Err(err) if !dirs.is_empty() => {
                        self.skip_or_fail(&name, err)?;
                        break;
                    }
                    Err(err) => return Err(err),
                },
                None => None,
            };
            log::debug!("Merging {} ({})", name, if source.is_some() { "existing" } else { "new" });

            let ctx = DirContext { name: name.clone(), table, order: start.order, base: start.base, depth: start.depth };
            let merged = self.merge_directory(&ctx, source.as_ref())?;
            let next = source.as_ref().map_or(0, |dir| dir.next);
            dirs.push((name.clone(), merged, source.is_some()));

            let Some(next_table) = table.and_then(TagTable::next).and_then(|n| self.registry.table(n)) else {
                if next != 0 {
                    log::debug!("Dropping next pointer of {}", name);
                }
                break;
            };
            let next_name = sibling_name(&name);
            offset = if next != 0 {
                Some(next as u64)
            } else if start.depth == 0 && self.needs(&next_name, Some(next_table)) {
                None
            } else {
                break;
            };
            name = next_name;
            table = Some(next_table);
        }

        while let Some((name, merged, existed)) = dirs.pop() {
            if !merged.entries.is_empty() {
                dirs.push((name, merged, existed));
                break;
            }
            if existed {
                log::debug!("Removing empty directory {}", name);
                self.changed();
            }
        }
        if dirs.is_empty() {
            return Ok(Block::default());
        }

        let order = start.order;
        let mut block = Block::with_order(order);
        let mut groups: Vec<Vec<PayloadSlot>> = Vec::with_capacity(dirs.len());
        let mut children: Vec<Vec<(usize, Block)>> = Vec::with_capacity(dirs.len());
        let mut previous_next: Option<usize> = None;

        for (name, merged, _) in dirs {
            let emitted = emit_directory(&name, merged, order)?;
            let mut group = Vec::new();
            let at = block.append(emitted.block, &mut group);
            if let Some(slot) = previous_next {
                link(&mut block, slot, at, order, &name)?;
            }
            previous_next = Some(at + emitted.next_slot);
            children.push(emitted.children.into_iter().map(|(slot, child)| (at + slot, child)).collect());
            groups.push(group);
        }
        for (group, kids) in groups.iter_mut().zip(children) {
            for (slot, child) in kids {
                let at = block.append(child, group);
                link(&mut block, slot, at, order, &start.name)?;
            }
        }

        // payloads of later directories come first
        block.payloads = groups.into_iter().rev().flatten().collect();
        if block.data.len() > u32::MAX as usize {
            return Err(Error::oversize(start.name.as_str(), block.data.len() as u64));
        }
        Ok(block)
    }
}

/// Point the slot at `slot` to `target` and record it for relocation.
fn link(block: &mut Block, slot: usize, target: usize, order: ByteOrder, name: &str) -> Result<()> {
    let offset = u32::try_from(target).map_err(|_| Error::oversize(name, target as u64))?;
    order.patch_u32(&mut block.data, slot, offset);
    block.fixup.add_position(slot);
    Ok(())
}

/// Lay out one merged directory. Offsets in the result are relative to its
/// first byte.
fn emit_directory(name: &str, merged: Merged, order: ByteOrder) -> Result<Emitted> {
    let Merged { entries, children, payloads } = merged;
    let count = u16::try_from(entries.len()).map_err(|_| Error::oversize(name, entries.len() as u64))?;
    let header = directory_size(entries.len());

    let mut data = Vec::with_capacity(header);
    let mut area = Vec::new();
    let mut fixup = Fixup::new();
    let mut slots = Vec::new();
    let mut child_slots = Vec::new();
    let mut offset_slots = HashMap::new();
    let mut count_slots = HashMap::new();

    order.put_u16(&mut data, count);
    for entry in entries {
        order.put_u16(&mut data, entry.tag);
        order.put_u16(&mut data, entry.format.code());
        order.put_u32(&mut data, entry.count);
        let field = data.len();
        data.extend_from_slice(&[0; 4]);

        let mut layout = Layout { data: &mut data, area: &mut area, fixup: &mut fixup, header, order };
        match entry.value {
            OutValue::Bytes(bytes) => {
                layout.place(field, &bytes);
            }
            OutValue::Pointers(pending) => {
                let at = layout.place(field, &vec![0; 4 * pending.len()]);
                for (i, target) in pending.into_iter().enumerate() {
                    match target {
                        Pending::Child(child) => child_slots.push((at + 4 * i, child)),
                        Pending::Payload(payload) => {
                            offset_slots.insert(payload, at + 4 * i);
                        }
                    }
                }
            }
            OutValue::Counts { values, payloads: indices } => {
                let width = entry.format.size();
                let mut bytes = Vec::with_capacity(values.len() * width);
                for &value in &values {
                    match entry.format {
                        Format::Short => order.put_u16(&mut bytes, value as u16),
                        _ => order.put_u32(&mut bytes, value),
                    }
                }
                let at = layout.place(field, &bytes);
                for (i, payload) in indices.into_iter().enumerate() {
                    count_slots.insert(payload, (at + width * i, entry.format));
                }
            }
            OutValue::Embedded(inner) => {
                let at = layout.place(field, &inner.data);
                let Block { fixup: mut inner_fixup, payloads: inner_payloads, .. } = inner;
                inner_fixup.splice(at);
                fixup.add_fixup(inner_fixup);
                slots.extend(inner_payloads.into_iter().map(|slot| slot.shifted(at)));
            }
        }
    }
    let next_slot = data.len();
    data.extend_from_slice(&[0; 4]);
    data.extend_from_slice(&area);

    for (index, payload) in payloads.into_iter().enumerate() {
        let Some(&offset_slot) = offset_slots.get(&index) else {
            log::debug!("No offset slot for payload of tag {:#06x} in {}", payload.tag, name);
            continue;
        };
        let count_slot = count_slots.get(&index).copied();
        slots.push(PayloadSlot { offset_slot, count_slot, order, payload });
    }

    let mut children: Vec<Option<Block>> = children.into_iter().map(Some).collect();
    let mut placed = Vec::with_capacity(child_slots.len());
    for (slot, index) in child_slots {
        let child = children
            .get_mut(index)
            .and_then(Option::take)
            .ok_or_else(|| Error::internal(format!("child {} of {} referenced twice", index, name)))?;
        placed.push((slot, child));
    }

    Ok(Emitted { block: Block { data, fixup, payloads: slots }, next_slot, children: placed })
}

/// The value area of a directory being emitted.
struct Layout<'b> {
    data: &'b mut Vec<u8>,
    area: &'b mut Vec<u8>,
    fixup: &'b mut Fixup,
    header: usize,
    order: ByteOrder,
}

impl Layout<'_> {
    /// Store a value for the entry whose field is at `field`. Short values go
    /// in the field; longer ones go in the value area, padded to an even
    /// length, with the field pointing at them. Returns where the value
    /// starts.
    fn place(&mut self, field: usize, bytes: &[u8]) -> usize {
        if bytes.len() <= INLINE_SIZE {
            self.data[field..field + bytes.len()].copy_from_slice(bytes);
            return field;
        }
        let at = self.header + self.area.len();
        self.order.patch_u32(self.data, field, at as u32);
        self.fixup.add_position(field);
        self.area.extend_from_slice(bytes);
        if self.area.len() % 2 == 1 {
            self.area.push(0);
        }
        at
    }
}
