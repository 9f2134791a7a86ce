//! Entry format codes.

use serde::{Deserialize, Serialize};

/// The data type of a directory entry.
///
/// The numeric codes are the ones stored in the 16-bit format field of an
/// entry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum Format {
    /// 8-bit unsigned integer.
    Byte = 1,
    /// NUL-terminated 7-bit ASCII.
    Ascii = 2,
    /// 16-bit unsigned integer.
    Short = 3,
    /// 32-bit unsigned integer.
    Long = 4,
    /// Two 32-bit unsigned integers (numerator, denominator).
    Rational = 5,
    /// 8-bit signed integer.
    SByte = 6,
    /// Opaque bytes.
    Undefined = 7,
    /// 16-bit signed integer.
    SShort = 8,
    /// 32-bit signed integer.
    SLong = 9,
    /// Two 32-bit signed integers.
    SRational = 10,
    /// IEEE single precision.
    Float = 11,
    /// IEEE double precision.
    Double = 12,
    /// 32-bit directory offset.
    Ifd = 13,
    /// 64-bit unsigned integer.
    Long8 = 16,
    /// 64-bit signed integer.
    SLong8 = 17,
    /// 64-bit directory offset.
    Ifd8 = 18,
}

impl Format {
    /// Convert from the on-disk code.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1 => Some(Format::Byte),
            2 => Some(Format::Ascii),
            3 => Some(Format::Short),
            4 => Some(Format::Long),
            5 => Some(Format::Rational),
            6 => Some(Format::SByte),
            7 => Some(Format::Undefined),
            8 => Some(Format::SShort),
            9 => Some(Format::SLong),
            10 => Some(Format::SRational),
            11 => Some(Format::Float),
            12 => Some(Format::Double),
            13 => Some(Format::Ifd),
            16 => Some(Format::Long8),
            17 => Some(Format::SLong8),
            18 => Some(Format::Ifd8),
            _ => None,
        }
    }

    /// The on-disk code.
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Size in bytes of one element.
    pub fn size(self) -> usize {
        match self {
            Format::Byte | Format::Ascii | Format::SByte | Format::Undefined => 1,
            Format::Short | Format::SShort => 2,
            Format::Long | Format::SLong | Format::Float | Format::Ifd => 4,
            Format::Rational
            | Format::SRational
            | Format::Double
            | Format::Long8
            | Format::SLong8
            | Format::Ifd8 => 8,
        }
    }

    /// Name used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Format::Byte => "BYTE",
            Format::Ascii => "ASCII",
            Format::Short => "SHORT",
            Format::Long => "LONG",
            Format::Rational => "RATIONAL",
            Format::SByte => "SBYTE",
            Format::Undefined => "UNDEFINED",
            Format::SShort => "SSHORT",
            Format::SLong => "SLONG",
            Format::SRational => "SRATIONAL",
            Format::Float => "FLOAT",
            Format::Double => "DOUBLE",
            Format::Ifd => "IFD",
            Format::Long8 => "LONG8",
            Format::SLong8 => "SLONG8",
            Format::Ifd8 => "IFD8",
        }
    }

    /// Whether values of this format are unsigned integers.
    pub fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            Format::Byte | Format::Short | Format::Long | Format::Ifd | Format::Long8 | Format::Ifd8
        )
    }

    /// Total byte length of `count` elements, or `None` on overflow.
    pub fn byte_len(self, count: u32) -> Option<usize> {
        (count as usize).checked_mul(self.size())
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
