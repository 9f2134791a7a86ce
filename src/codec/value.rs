//! Typed values and their fixed binary layouts.

use super::format::Format;
use super::order::ByteOrder;
use super::rational::{rationalize_bounded, MAX_SIGNED, MAX_UNSIGNED};
use crate::error::{Error, Result};

/// A typed entry value.
///
/// `Text` carries caller-supplied text that is parsed for whatever format
/// the target tag uses; the other variants are already typed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Unsigned integers of any width.
    Unsigned(Vec<u64>),
    /// Signed integers of any width.
    Signed(Vec<i64>),
    /// Unsigned rationals.
    Rational(Vec<(u32, u32)>),
    /// Signed rationals.
    SRational(Vec<(i32, i32)>),
    /// Floating point numbers.
    Float(Vec<f64>),
    /// A string, stored NUL-terminated.
    Ascii(String),
    /// Opaque bytes.
    Bytes(Vec<u8>),
    /// Text to be parsed for the target format.
    Text(String),
}

impl Value {
    /// The format used when no schema says otherwise.
    pub fn natural_format(&self) -> Format {
        match self {
            Value::Unsigned(values) => {
                if values.iter().all(|&v| v <= u16::MAX as u64) {
                    Format::Short
                } else {
                    Format::Long
                }
            }
            Value::Signed(_) => Format::SLong,
            Value::Rational(_) => Format::Rational,
            Value::SRational(_) => Format::SRational,
            Value::Float(_) => Format::Double,
            Value::Ascii(_) | Value::Text(_) => Format::Ascii,
            Value::Bytes(_) => Format::Undefined,
        }
    }

    /// Integer view of the value, used for offsets, byte counts and pointers.
    pub fn as_unsigned(&self) -> Option<Vec<u64>> {
        match self {
            Value::Unsigned(values) => Some(values.clone()),
            Value::Signed(values) => values.iter().map(|&v| u64::try_from(v).ok()).collect(),
            Value::Bytes(bytes) => Some(bytes.iter().map(|&b| b as u64).collect()),
            _ => None,
        }
    }

    /// The string for `Ascii` and `Text` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Ascii(s) | Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<u16> for Value {
    fn from(value: u16) -> Self {
        Value::Unsigned(vec![value as u64])
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Unsigned(vec![value as u64])
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Signed(vec![value as i64])
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(vec![value])
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Bytes(value)
    }
}

/// Encoded bytes plus the element count to store in the entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    /// The value bytes, unpadded.
    pub bytes: Vec<u8>,
    /// Element count for the entry record.
    pub count: u32,
}

/// Encode `value` as `format`.
///
/// When `count` is given, strings and opaque blobs are truncated or
/// zero-padded to that many bytes (strings keep their terminating NUL), and
/// numeric values must supply exactly that many elements.
pub fn encode(value: &Value, format: Format, count: Option<u32>, order: ByteOrder) -> Result<Encoded> {
    let mut bytes = Vec::new();
    let elements = match format {
        Format::Ascii => {
            let mut raw = match value {
                Value::Ascii(s) | Value::Text(s) => s.as_bytes().to_vec(),
                Value::Bytes(b) => b.clone(),
                other => return Err(mismatch(format, other)),
            };
            if raw.last() != Some(&0) {
                raw.push(0);
            }
            if let Some(n) = count {
                fit_string(&mut raw, n as usize);
            }
            bytes = raw;
            bytes.len()
        }
        Format::Undefined => {
            let mut raw = match value {
                Value::Bytes(b) => b.clone(),
                Value::Ascii(s) | Value::Text(s) => s.as_bytes().to_vec(),
                Value::Unsigned(_) | Value::Signed(_) => {
                    unsigned_values(value, Format::Byte)?.into_iter().map(|v| v as u8).collect()
                }
                other => return Err(mismatch(format, other)),
            };
            if let Some(n) = count {
                raw.resize(n as usize, 0);
            }
            bytes = raw;
            bytes.len()
        }
        Format::Byte | Format::Short | Format::Long | Format::Ifd | Format::Long8 | Format::Ifd8 => {
            let values = unsigned_values(value, format)?;
            for &v in &values {
                put_unsigned(&mut bytes, format, v, order);
            }
            values.len()
        }
        Format::SByte | Format::SShort | Format::SLong | Format::SLong8 => {
            let values = signed_values(value, format)?;
            for &v in &values {
                put_unsigned(&mut bytes, format, v as u64, order);
            }
            values.len()
        }
        Format::Rational => {
            let values = rational_values(value)?;
            for &(n, d) in &values {
                order.put_u32(&mut bytes, n);
                order.put_u32(&mut bytes, d);
            }
            values.len()
        }
        Format::SRational => {
            let values = srational_values(value)?;
            for &(n, d) in &values {
                order.put_u32(&mut bytes, n as u32);
                order.put_u32(&mut bytes, d as u32);
            }
            values.len()
        }
        Format::Float => {
            let values = float_values(value, format)?;
            for &v in &values {
                order.put_u32(&mut bytes, (v as f32).to_bits());
            }
            values.len()
        }
        Format::Double => {
            let values = float_values(value, format)?;
            for &v in &values {
                order.put_u64(&mut bytes, v.to_bits());
            }
            values.len()
        }
    };

    if !matches!(format, Format::Ascii | Format::Undefined) {
        if elements == 0 {
            return Err(Error::invalid_value(format.name(), "no values"));
        }
        if let Some(n) = count {
            if n as usize != elements {
                return Err(Error::invalid_value(
                    format.name(),
                    format!("expected {} values, got {}", n, elements),
                ));
            }
        }
    }

    let count = u32::try_from(elements)
        .map_err(|_| Error::invalid_value(format.name(), "too many elements"))?;
    Ok(Encoded { bytes, count })
}

/// Encode `value` and write it into `buf` at `at`, returning the encoding.
///
/// Used to overwrite a slot whose position is already final, so no
/// relocation is needed afterwards.
pub fn encode_into(
    buf: &mut [u8],
    at: usize,
    value: &Value,
    format: Format,
    count: Option<u32>,
    order: ByteOrder,
) -> Result<Encoded> {
    let encoded = encode(value, format, count, order)?;
    let end = at
        .checked_add(encoded.bytes.len())
        .filter(|&end| end <= buf.len())
        .ok_or_else(|| Error::internal(format!("patch at {} overruns buffer of {}", at, buf.len())))?;
    buf[at..end].copy_from_slice(&encoded.bytes);
    Ok(encoded)
}

/// Decode `count` elements of `format` from `bytes`.
pub fn decode(bytes: &[u8], format: Format, count: u32, order: ByteOrder) -> Result<Value> {
    let len = format
        .byte_len(count)
        .ok_or_else(|| Error::invalid_value(format.name(), "count overflows"))?;
    if bytes.len() < len {
        return Err(Error::invalid_value(
            format.name(),
            format!("need {} bytes, have {}", len, bytes.len()),
        ));
    }
    let data = &bytes[..len];
    let size = format.size();

    let value = match format {
        Format::Ascii => {
            let end = data.iter().rposition(|&b| b != 0).map_or(0, |p| p + 1);
            Value::Ascii(String::from_utf8_lossy(&data[..end]).into_owned())
        }
        Format::Undefined => Value::Bytes(data.to_vec()),
        Format::Byte => Value::Unsigned(data.iter().map(|&b| b as u64).collect()),
        Format::SByte => Value::Signed(data.iter().map(|&b| b as i8 as i64).collect()),
        Format::Short => Value::Unsigned(data.chunks(size).map(|c| order.u16(c) as u64).collect()),
        Format::SShort => {
            Value::Signed(data.chunks(size).map(|c| order.u16(c) as i16 as i64).collect())
        }
        Format::Long | Format::Ifd => {
            Value::Unsigned(data.chunks(size).map(|c| order.u32(c) as u64).collect())
        }
        Format::SLong => Value::Signed(data.chunks(size).map(|c| order.u32(c) as i32 as i64).collect()),
        Format::Long8 | Format::Ifd8 => Value::Unsigned(data.chunks(size).map(|c| order.u64(c)).collect()),
        Format::SLong8 => Value::Signed(data.chunks(size).map(|c| order.u64(c) as i64).collect()),
        Format::Rational => Value::Rational(
            data.chunks(size).map(|c| (order.u32(c), order.u32(&c[4..]))).collect(),
        ),
        Format::SRational => Value::SRational(
            data.chunks(size)
                .map(|c| (order.u32(c) as i32, order.u32(&c[4..]) as i32))
                .collect(),
        ),
        Format::Float => {
            Value::Float(data.chunks(size).map(|c| f32::from_bits(order.u32(c)) as f64).collect())
        }
        Format::Double => Value::Float(data.chunks(size).map(|c| f64::from_bits(order.u64(c))).collect()),
    };
    Ok(value)
}

fn mismatch(format: Format, value: &Value) -> Error {
    Error::invalid_value(format.name(), format!("cannot store {:?}", value))
}

/// Truncate (keeping a terminating NUL) or zero-pad a NUL-terminated string.
fn fit_string(raw: &mut Vec<u8>, len: usize) {
    if raw.len() > len {
        raw.truncate(len);
        if let Some(last) = raw.last_mut() {
            *last = 0;
        }
    } else {
        raw.resize(len, 0);
    }
}

fn put_unsigned(buf: &mut Vec<u8>, format: Format, value: u64, order: ByteOrder) {
    match format.size() {
        1 => buf.push(value as u8),
        2 => order.put_u16(buf, value as u16),
        4 => order.put_u32(buf, value as u32),
        _ => order.put_u64(buf, value),
    }
}

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| c.is_whitespace() || c == ',').filter(|t| !t.is_empty())
}

fn parse_integer(token: &str, format: Format) -> Result<i128> {
    let parsed = if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        i128::from_str_radix(hex, 16).ok()
    } else {
        token.parse::<i128>().ok().or_else(|| {
            token
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite() && f.fract() == 0.0)
                .map(|f| f as i128)
        })
    };
    parsed.ok_or_else(|| Error::invalid_value(format.name(), format!("'{}' is not an integer", token)))
}

fn parse_float(token: &str, format: Format) -> Result<f64> {
    token
        .parse::<f64>()
        .ok()
        .filter(|f| !f.is_nan())
        .ok_or_else(|| Error::invalid_value(format.name(), format!("'{}' is not a number", token)))
}

fn unsigned_max(format: Format) -> u64 {
    match format.size() {
        1 => u8::MAX as u64,
        2 => u16::MAX as u64,
        4 => u32::MAX as u64,
        _ => u64::MAX,
    }
}

fn signed_range(format: Format) -> (i64, i64) {
    match format.size() {
        1 => (i8::MIN as i64, i8::MAX as i64),
        2 => (i16::MIN as i64, i16::MAX as i64),
        4 => (i32::MIN as i64, i32::MAX as i64),
        _ => (i64::MIN, i64::MAX),
    }
}

fn unsigned_values(value: &Value, format: Format) -> Result<Vec<u64>> {
    let wide: Vec<i128> = match value {
        Value::Unsigned(v) => v.iter().map(|&x| x as i128).collect(),
        Value::Signed(v) => v.iter().map(|&x| x as i128).collect(),
        Value::Bytes(b) => b.iter().map(|&x| x as i128).collect(),
        Value::Float(v) => v
            .iter()
            .map(|&f| {
                if f.is_finite() && f.fract() == 0.0 {
                    Ok(f as i128)
                } else {
                    Err(Error::invalid_value(format.name(), format!("{} is not an integer", f)))
                }
            })
            .collect::<Result<_>>()?,
        Value::Text(s) => tokens(s).map(|t| parse_integer(t, format)).collect::<Result<_>>()?,
        other => return Err(mismatch(format, other)),
    };
    let max = unsigned_max(format);
    wide.into_iter()
        .map(|v| {
            if v < 0 || v > max as i128 {
                Err(Error::invalid_value(format.name(), format!("{} out of range", v)))
            } else {
                Ok(v as u64)
            }
        })
        .collect()
}

fn signed_values(value: &Value, format: Format) -> Result<Vec<i64>> {
    let wide: Vec<i128> = match value {
        Value::Unsigned(v) => v.iter().map(|&x| x as i128).collect(),
        Value::Signed(v) => v.iter().map(|&x| x as i128).collect(),
        Value::Float(v) => v
            .iter()
            .map(|&f| {
                if f.is_finite() && f.fract() == 0.0 {
                    Ok(f as i128)
                } else {
                    Err(Error::invalid_value(format.name(), format!("{} is not an integer", f)))
                }
            })
            .collect::<Result<_>>()?,
        Value::Text(s) => tokens(s).map(|t| parse_integer(t, format)).collect::<Result<_>>()?,
        other => return Err(mismatch(format, other)),
    };
    let (min, max) = signed_range(format);
    wide.into_iter()
        .map(|v| {
            if v < min as i128 || v > max as i128 {
                Err(Error::invalid_value(format.name(), format!("{} out of range", v)))
            } else {
                Ok(v as i64)
            }
        })
        .collect()
}

fn float_values(value: &Value, format: Format) -> Result<Vec<f64>> {
    match value {
        Value::Float(v) => Ok(v.clone()),
        Value::Unsigned(v) => Ok(v.iter().map(|&x| x as f64).collect()),
        Value::Signed(v) => Ok(v.iter().map(|&x| x as f64).collect()),
        Value::Rational(v) => Ok(v.iter().map(|&(n, d)| n as f64 / d as f64).collect()),
        Value::SRational(v) => Ok(v.iter().map(|&(n, d)| n as f64 / d as f64).collect()),
        Value::Text(s) => tokens(s).map(|t| parse_float(t, format)).collect(),
        other => Err(mismatch(format, other)),
    }
}

/// Parse `n/d` or a decimal number into a float ratio.
fn parse_ratio(token: &str, format: Format) -> Result<f64> {
    match token.split_once('/') {
        Some((n, d)) => {
            let n = parse_float(n, format)?;
            let d = parse_float(d, format)?;
            Ok(n / d)
        }
        None => parse_float(token, format),
    }
}

fn rational_values(value: &Value) -> Result<Vec<(u32, u32)>> {
    let format = Format::Rational;
    let floats: Vec<f64> = match value {
        Value::Rational(v) => return Ok(v.clone()),
        Value::Text(s) => tokens(s).map(|t| parse_ratio(t, format)).collect::<Result<_>>()?,
        other => float_values(other, format)?,
    };
    floats
        .into_iter()
        .map(|f| {
            if f < 0.0 {
                return Err(Error::invalid_value(format.name(), format!("{} is negative", f)));
            }
            let (n, d) = rationalize_bounded(f, MAX_UNSIGNED);
            Ok((n as u32, d as u32))
        })
        .collect()
}

fn srational_values(value: &Value) -> Result<Vec<(i32, i32)>> {
    let format = Format::SRational;
    let floats: Vec<f64> = match value {
        Value::SRational(v) => return Ok(v.clone()),
        Value::Text(s) => tokens(s).map(|t| parse_ratio(t, format)).collect::<Result<_>>()?,
        other => float_values(other, format)?,
    };
    Ok(floats
        .into_iter()
        .map(|f| {
            let (n, d) = rationalize_bounded(f, MAX_SIGNED);
            (n as i32, d as i32)
        })
        .collect())
}
