//! Whole TIFF/EXIF blobs.
//!
//! A blob starts with an 8-byte header: the byte order mark (`II` or `MM`),
//! the magic number 42 and the offset of IFD0. Offsets in the blob are
//! relative to the start of the header.

use crate::codec::ByteOrder;
use crate::config::Options;
use crate::edit::EditSet;
use crate::error::{Error, Result};
use crate::schema::{Registry, MAIN_TABLE};
use crate::{DirectoryLocation, Rewrite, Rewriter};

/// Size of the TIFF header.
pub const HEADER_SIZE: usize = 8;

const MAGIC: u16 = 42;

/// A parsed TIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    /// Byte order of the whole blob.
    pub order: ByteOrder,
    /// Offset of IFD0.
    pub ifd0: u32,
}

impl TiffHeader {
    /// Parse the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::invalid_argument(format!("{} bytes is too short for a TIFF header", bytes.len())));
        }
        let order = ByteOrder::from_marker(&bytes[..2])
            .ok_or_else(|| Error::invalid_argument("missing II/MM byte order mark"))?;
        let magic = order.u16(&bytes[2..]);
        if magic != MAGIC {
            return Err(Error::invalid_argument(format!("bad TIFF magic number {}", magic)));
        }
        Ok(Self { order, ifd0: order.u32(&bytes[4..]) })
    }

    /// Encode the header.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.extend_from_slice(&self.order.marker());
        self.order.put_u16(&mut buf, MAGIC);
        self.order.put_u32(&mut buf, self.ifd0);
        buf
    }
}

/// Apply `edits` to a TIFF/EXIF blob.
///
/// The IFD0 chain and everything it references is rebuilt right after the
/// header. Bytes not reachable from IFD0 are dropped. When no edit takes
/// effect the input comes back unchanged; when every directory is deleted
/// the result is empty.
pub fn rewrite_tiff(bytes: &[u8], registry: &Registry, options: &Options, edits: &EditSet) -> Result<Vec<u8>> {
    let header = TiffHeader::parse(bytes)?;
    let rewriter = Rewriter::new(registry, options.clone())?;
    let location = DirectoryLocation::at("IFD0", MAIN_TABLE, header.ifd0 as u64, header.order);
    match rewriter.rewrite(bytes, &location, edits, HEADER_SIZE as u64)? {
        Rewrite::Unchanged(_) => Ok(bytes.to_vec()),
        Rewrite::Changed(output) => Ok(with_header(header.order, output.data)),
    }
}

/// Build a TIFF/EXIF blob holding only what `edits` create.
pub fn create_tiff(registry: &Registry, options: &Options, edits: &EditSet, order: ByteOrder) -> Result<Vec<u8>> {
    let rewriter = Rewriter::new(registry, options.clone())?;
    let location = DirectoryLocation::new_tree("IFD0", MAIN_TABLE, order);
    let empty: &[u8] = &[];
    let output = rewriter.assemble(empty, &location, edits, HEADER_SIZE as u64)?;
    Ok(with_header(order, output.data))
}

fn with_header(order: ByteOrder, data: Vec<u8>) -> Vec<u8> {
    if data.is_empty() {
        return data;
    }
    let mut out = TiffHeader { order, ifd0: HEADER_SIZE as u32 }.encode();
    out.extend_from_slice(&data);
    out
}
