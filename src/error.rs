//! Error types for the tagdir engine.

use std::io;

/// The result type used throughout tagdir.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for directory read and rewrite operations.
///
/// Structural and I/O variants carry the name of the directory being
/// processed (`IFD0`, `ExifIFD`, ...) so callers can report where a
/// malformed tree broke.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The declared entry count runs past the available data.
    #[error("Truncated directory {dir}: {detail}")]
    TruncatedDirectory {
        /// Directory name.
        dir: String,
        /// What was missing.
        detail: String,
    },

    /// An entry uses a format code outside the known range.
    #[error("Bad format code {format} for tag {tag:#06x} in {dir}")]
    BadFormat {
        /// Directory name.
        dir: String,
        /// Tag of the offending entry.
        tag: u16,
        /// The unknown format code.
        format: u16,
    },

    /// A payload substitution or offset/byte-count pair could not be resolved.
    #[error("Missing payload for tag {tag:#06x} in {dir}: {detail}")]
    MissingPayload {
        /// Directory name.
        dir: String,
        /// The offset-bearing tag.
        tag: u16,
        /// What could not be resolved.
        detail: String,
    },

    /// Reading lazily fetched bytes from the source failed.
    #[error("Read error in {dir}: {source}")]
    IoRead {
        /// Directory name.
        dir: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The assembled region does not fit a 32-bit offset space.
    #[error("Offset space exceeded in {dir}: {size} bytes")]
    OversizeOffsetSpace {
        /// Directory name.
        dir: String,
        /// Offending size or offset.
        size: u64,
    },

    /// A value cannot be encoded in the requested format.
    #[error("Invalid value for {format}: {reason}")]
    InvalidValue {
        /// Target format name.
        format: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The two halves of an offset/byte-count pair disagree on element count.
    #[error("Offset/byte-count mismatch for tag {tag:#06x} in {dir}: {offsets} offsets, {counts} byte counts")]
    PairMismatch {
        /// Directory name.
        dir: String,
        /// The offset-bearing tag.
        tag: u16,
        /// Number of offsets.
        offsets: usize,
        /// Number of byte counts.
        counts: usize,
    },

    /// A directory pointer leads back into a directory already being processed.
    #[error("Circular directory reference in {dir} at offset {offset:#x}")]
    CircularReference {
        /// Directory name.
        dir: String,
        /// Absolute offset of the repeated directory.
        offset: u64,
    },

    /// Sub-directories nest deeper than the configured limit.
    #[error("Directory nesting too deep at {dir} (limit {limit})")]
    DepthExceeded {
        /// Directory name.
        dir: String,
        /// Configured limit.
        limit: usize,
    },

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An I/O error outside any directory context.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A configuration document could not be parsed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An internal invariant was violated.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new truncated directory error.
    pub fn truncated(dir: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::TruncatedDirectory { dir: dir.into(), detail: detail.into() }
    }

    /// Creates a new missing payload error.
    pub fn missing_payload(dir: impl Into<String>, tag: u16, detail: impl Into<String>) -> Self {
        Error::MissingPayload { dir: dir.into(), tag, detail: detail.into() }
    }

    /// Wraps an I/O error with the directory it occurred in.
    pub fn io_read(dir: impl Into<String>, source: io::Error) -> Self {
        Error::IoRead { dir: dir.into(), source }
    }

    /// Creates a new offset space error.
    pub fn oversize(dir: impl Into<String>, size: u64) -> Self {
        Error::OversizeOffsetSpace { dir: dir.into(), size }
    }

    /// Creates a new invalid value error.
    pub fn invalid_value(format: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidValue { format, reason: reason.into() }
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Returns true for structural errors that abort the directory being processed.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Error::TruncatedDirectory { .. }
                | Error::BadFormat { .. }
                | Error::OversizeOffsetSpace { .. }
                | Error::PairMismatch { .. }
                | Error::CircularReference { .. }
                | Error::DepthExceeded { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
