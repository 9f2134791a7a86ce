//! Relocation ledger.
//!
//! While a region is being assembled, every slot that stores an offset is
//! written relative to the start of the buffer it lives in, and its position
//! is recorded in a [`Fixup`]. Buffers are spliced into larger buffers
//! bottom-up; each splice rebases the child ledger. Once the final placement
//! of the outermost buffer is known, [`Fixup::apply`] adds the accumulated
//! shift to every recorded slot.
//!
//! ```text
//! root (start 0, shift = out_base)
//!  ├── positions: [14, 26, ...]
//!  └── child (start = splice offset, shift += splice offset)
//!       └── positions relative to the child's own start
//! ```

use crate::codec::ByteOrder;
use crate::error::{Error, Result};

/// A composable record of offset slots awaiting relocation.
///
/// `apply` consumes the ledger, so a ledger can only ever be applied once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fixup {
    start: usize,
    shift: i64,
    order: Option<ByteOrder>,
    positions: Vec<usize>,
    children: Vec<Fixup>,
}

impl Fixup {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a 32-bit offset slot at `position`, relative to `start`.
    pub fn add_position(&mut self, position: usize) {
        self.positions.push(position);
    }

    /// Merge a nested ledger. Its positions stay relative to its own start.
    pub fn add_fixup(&mut self, child: Fixup) {
        if !child.is_empty() {
            self.children.push(child);
        }
    }

    /// Byte order of the slots in this ledger and its children, when it
    /// differs from the order passed to [`Fixup::apply`].
    pub fn set_order(&mut self, order: ByteOrder) {
        self.order = Some(order);
    }

    /// Byte order override, if any.
    pub fn order(&self) -> Option<ByteOrder> {
        self.order
    }

    /// Move the ledger's origin by `delta` bytes within its parent.
    pub fn rebase(&mut self, delta: usize) {
        self.start += delta;
    }

    /// Add `delta` to the value every slot will receive.
    pub fn add_shift(&mut self, delta: i64) {
        self.shift += delta;
    }

    /// Rebase and shift by the same amount.
    ///
    /// This is the usual splice: the child's slots hold offsets relative to
    /// the child's own start, which moves to `offset` within the parent.
    pub fn splice(&mut self, offset: usize) {
        self.rebase(offset);
        self.add_shift(offset as i64);
    }

    /// Current origin.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Current shift.
    pub fn shift(&self) -> i64 {
        self.shift
    }

    /// Total number of recorded slots, including nested ledgers.
    pub fn len(&self) -> usize {
        self.positions.len() + self.children.iter().map(Fixup::len).sum::<usize>()
    }

    /// Returns true if no slots are recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Absolute slot positions with their accumulated shift, in recording order.
    pub fn resolved(&self) -> Vec<(usize, i64)> {
        self.slots(ByteOrder::default()).into_iter().map(|(p, s, _)| (p, s)).collect()
    }

    fn slots(&self, order: ByteOrder) -> Vec<(usize, i64, ByteOrder)> {
        let mut out = Vec::with_capacity(self.len());
        self.collect(0, 0, order, &mut out);
        out
    }

    fn collect(&self, base: usize, shift: i64, order: ByteOrder, out: &mut Vec<(usize, i64, ByteOrder)>) {
        let start = base + self.start;
        let shift = shift + self.shift;
        let order = self.order.unwrap_or(order);
        out.extend(self.positions.iter().map(|&p| (start + p, shift, order)));
        for child in &self.children {
            child.collect(start, shift, order, out);
        }
    }

    /// Add the accumulated shift to every recorded slot in `buf`.
    ///
    /// Must run once, after all nested buffers have been spliced in. Ledgers
    /// without their own order use `order`.
    pub fn apply(self, buf: &mut [u8], order: ByteOrder) -> Result<()> {
        for (position, shift, order) in self.slots(order) {
            if position + 4 > buf.len() {
                return Err(Error::internal(format!(
                    "fixup position {} outside buffer of {} bytes",
                    position,
                    buf.len()
                )));
            }
            let current = order.u32(&buf[position..]) as i64;
            let relocated = current + shift;
            if !(0..=u32::MAX as i64).contains(&relocated) {
                return Err(Error::oversize("fixup", relocated.max(0) as u64));
            }
            order.patch_u32(buf, position, relocated as u32);
        }
        Ok(())
    }
}
