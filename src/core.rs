use crate::*;

/// BSON element type tags.
///
/// Every encoded element starts with one of these bytes, followed by the
/// NUL-terminated key and the value payload.
///
/// - `TAG_TIMESTAMP` doubles as the carrier for `u64` values (raw bit pattern).
/// - `TAG_DOCUMENT_ROOT` is never written; it tells the decoder that it sits
///   at the top of a buffer and there is no element header to honour.
pub const TAG_DOCUMENT_ROOT: u8 = 0x00;
pub const TAG_DOUBLE: u8 = 0x01;
pub const TAG_STRING: u8 = 0x02;
pub const TAG_DOCUMENT: u8 = 0x03;
pub const TAG_ARRAY: u8 = 0x04;
pub const TAG_BINARY: u8 = 0x05;
/// Deprecated in BSON, decoded as null.
pub const TAG_UNDEFINED: u8 = 0x06;
pub const TAG_OBJECT_ID: u8 = 0x07;
pub const TAG_BOOLEAN: u8 = 0x08;
/// Signed milliseconds since the unix epoch.
pub const TAG_DATE_TIME: u8 = 0x09;
pub const TAG_NULL: u8 = 0x0A;
pub const TAG_REGEX: u8 = 0x0B;
pub const TAG_DB_POINTER: u8 = 0x0C;
pub const TAG_JAVASCRIPT: u8 = 0x0D;
pub const TAG_SYMBOL: u8 = 0x0E;
pub const TAG_JAVASCRIPT_WITH_SCOPE: u8 = 0x0F;
pub const TAG_INT32: u8 = 0x10;
/// Also carries `u64` values.
pub const TAG_TIMESTAMP: u8 = 0x11;
pub const TAG_INT64: u8 = 0x12;
pub const TAG_DECIMAL128: u8 = 0x13;
pub const TAG_MIN_KEY: u8 = 0xFF;
pub const TAG_MAX_KEY: u8 = 0x7F;

/// Smallest possible framed document: the length prefix plus the terminator.
pub const MIN_DOCUMENT_LEN: usize = 5;

/// Human readable name of a tag, used in error messages.
pub fn tag_name(tag: u8) -> &'static str {
    match tag {
        TAG_DOCUMENT_ROOT => "document root",
        TAG_DOUBLE => "double",
        TAG_STRING => "string",
        TAG_DOCUMENT => "document",
        TAG_ARRAY => "array",
        TAG_BINARY => "binary",
        TAG_UNDEFINED => "undefined",
        TAG_OBJECT_ID => "object id",
        TAG_BOOLEAN => "boolean",
        TAG_DATE_TIME => "datetime",
        TAG_NULL => "null",
        TAG_REGEX => "regex",
        TAG_DB_POINTER => "db pointer",
        TAG_JAVASCRIPT => "javascript",
        TAG_SYMBOL => "symbol",
        TAG_JAVASCRIPT_WITH_SCOPE => "javascript with scope",
        TAG_INT32 => "int32",
        TAG_TIMESTAMP => "timestamp",
        TAG_INT64 => "int64",
        TAG_DECIMAL128 => "decimal128",
        TAG_MIN_KEY => "min key",
        TAG_MAX_KEY => "max key",
        _ => "unknown",
    }
}

// --- Fixed-width integers ---

#[inline]
fn ensure(reader: &Bytes, len: usize) -> Result<()> {
    if reader.remaining() < len {
        return Err(BsonError::InsufficientData);
    }
    Ok(())
}

/// Reads a single byte (a tag or a binary subtype).
#[inline]
pub fn read_u8(reader: &mut Bytes) -> Result<u8> {
    ensure(reader, 1)?;
    Ok(reader.get_u8())
}

#[inline]
pub fn write_i32_le(writer: &mut BytesMut, value: i32) {
    writer.put_i32_le(value);
}

#[inline]
pub fn read_i32_le(reader: &mut Bytes) -> Result<i32> {
    ensure(reader, 4)?;
    Ok(reader.get_i32_le())
}

#[inline]
pub fn write_i64_le(writer: &mut BytesMut, value: i64) {
    writer.put_i64_le(value);
}

#[inline]
pub fn read_i64_le(reader: &mut Bytes) -> Result<i64> {
    ensure(reader, 8)?;
    Ok(reader.get_i64_le())
}

/// Writes the raw two's-complement bit pattern, no range translation.
#[inline]
pub fn write_u64_le(writer: &mut BytesMut, value: u64) {
    writer.put_u64_le(value);
}

#[inline]
pub fn read_u64_le(reader: &mut Bytes) -> Result<u64> {
    ensure(reader, 8)?;
    Ok(reader.get_u64_le())
}

#[inline]
pub fn read_f64_le(reader: &mut Bytes) -> Result<f64> {
    ensure(reader, 8)?;
    Ok(reader.get_f64_le())
}

/// Reads `len` raw bytes without copying.
pub fn read_bytes(reader: &mut Bytes, len: usize) -> Result<Bytes> {
    ensure(reader, len)?;
    Ok(reader.split_to(len))
}

// --- Keys and strings ---

/// Writes a NUL-terminated string. Embedded NUL bytes cannot be represented.
pub fn write_cstring(writer: &mut BytesMut, value: &str) -> Result<()> {
    if value.as_bytes().contains(&0) {
        return Err(BsonError::Encode(format!(
            "Key {:?} contains an interior NUL byte",
            value
        )));
    }
    writer.put_slice(value.as_bytes());
    writer.put_u8(0);
    Ok(())
}

pub fn read_cstring(reader: &mut Bytes) -> Result<String> {
    let end = reader
        .iter()
        .position(|b| *b == 0)
        .ok_or(BsonError::InsufficientData)?;
    let raw = reader.split_to(end);
    reader.advance(1);
    String::from_utf8(raw.to_vec())
        .map_err(|e| BsonError::Decode(format!("Invalid UTF-8 in key: {}", e)))
}

/// Writes an element header. A `None` key means the value sits at the
/// document root, which carries neither a tag nor a key; only framed
/// values can stand there.
pub fn write_key(writer: &mut BytesMut, tag: u8, key: Option<&str>) -> Result<()> {
    match key {
        Some(key) => {
            writer.put_u8(tag);
            write_cstring(writer, key)
        }
        None if tag == TAG_DOCUMENT || tag == TAG_ARRAY => Ok(()),
        None => Err(BsonError::MissingKey(tag_name(tag))),
    }
}

/// Writes a BSON string payload: `int32 (len + 1) | bytes | 0x00`.
pub fn write_string(writer: &mut BytesMut, value: &str) -> Result<()> {
    let len = i32::try_from(value.len() + 1).map_err(|_| {
        BsonError::Encode(format!("String of {} bytes is too long", value.len()))
    })?;
    writer.put_i32_le(len);
    writer.put_slice(value.as_bytes());
    writer.put_u8(0);
    Ok(())
}

pub fn read_string(reader: &mut Bytes) -> Result<String> {
    let len = read_i32_le(reader)?;
    if len < 1 {
        return Err(BsonError::Decode(format!("Invalid string length {}", len)));
    }
    let mut raw = read_bytes(reader, len as usize)?;
    let body = raw.split_to(len as usize - 1);
    if raw[0] != 0 {
        return Err(BsonError::Decode(
            "String is not NUL-terminated".to_string(),
        ));
    }
    String::from_utf8(body.to_vec())
        .map_err(|e| BsonError::Decode(format!("Invalid UTF-8 in string: {}", e)))
}

// --- Documents ---

/// Writes `scratch` as a framed document: `int32 (len + 5) | scratch | 0x00`.
pub fn write_framed(writer: &mut BytesMut, scratch: &[u8]) -> Result<()> {
    let total = i32::try_from(scratch.len() + MIN_DOCUMENT_LEN).map_err(|_| {
        BsonError::Encode(format!("Document of {} bytes is too large", scratch.len()))
    })?;
    writer.reserve(scratch.len() + MIN_DOCUMENT_LEN);
    writer.put_i32_le(total);
    writer.put_slice(scratch);
    writer.put_u8(0);
    Ok(())
}

/// Checks that `raw` is a self-consistent framed document or array.
pub fn validate_framed(raw: &[u8], kind: &'static str) -> Result<()> {
    if raw.len() < MIN_DOCUMENT_LEN {
        return Err(BsonError::InvalidInline {
            kind,
            reason: format!("{} bytes is shorter than the minimum of 5", raw.len()),
        });
    }
    let declared = i32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
    if declared < 0 || declared as usize != raw.len() {
        return Err(BsonError::InvalidInline {
            kind,
            reason: format!(
                "length prefix {} does not match buffer length {}",
                declared,
                raw.len()
            ),
        });
    }
    Ok(())
}

/// Splits one framed document (prefix and terminator included) off the reader.
pub fn read_document(reader: &mut Bytes) -> Result<Bytes> {
    ensure(reader, 4)?;
    let len = i32::from_le_bytes([reader[0], reader[1], reader[2], reader[3]]);
    if len < MIN_DOCUMENT_LEN as i32 {
        return Err(BsonError::Decode(format!("Invalid document length {}", len)));
    }
    let document = read_bytes(reader, len as usize)?;
    if document[document.len() - 1] != 0 {
        return Err(BsonError::Decode(
            "Document is not terminated by 0x00".to_string(),
        ));
    }
    Ok(document)
}

/// The element list of a framed document, terminator included.
#[inline]
pub fn document_elements(document: &Bytes) -> Bytes {
    document.slice(4..)
}

/// Reads the next element header, or `None` at the terminating 0x00.
pub fn next_element(elements: &mut Bytes) -> Result<Option<(u8, String)>> {
    let tag = read_u8(elements)?;
    if tag == 0 {
        if !elements.is_empty() {
            return Err(BsonError::Decode(format!(
                "{} bytes follow the document terminator",
                elements.len()
            )));
        }
        return Ok(None);
    }
    let key = read_cstring(elements)?;
    Ok(Some((tag, key)))
}

// --- Scalars ---

/// A scalar payload as it appears on the wire, before coercion to a host type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireScalar {
    Int32(i32),
    Int64(i64),
    Timestamp(u64),
    Double(f64),
    Boolean(bool),
}

/// Reads a numeric or boolean payload. Returns `Ok(None)` without consuming
/// anything when `tag` is not a scalar tag.
pub fn read_scalar(reader: &mut Bytes, tag: u8) -> Result<Option<WireScalar>> {
    let scalar = match tag {
        TAG_INT32 => WireScalar::Int32(read_i32_le(reader)?),
        TAG_INT64 => WireScalar::Int64(read_i64_le(reader)?),
        TAG_TIMESTAMP => WireScalar::Timestamp(read_u64_le(reader)?),
        TAG_DOUBLE => WireScalar::Double(read_f64_le(reader)?),
        TAG_BOOLEAN => match read_u8(reader)? {
            0 => WireScalar::Boolean(false),
            1 => WireScalar::Boolean(true),
            other => {
                return Err(BsonError::Decode(format!(
                    "Expected boolean byte (0 or 1), got {}",
                    other
                )))
            }
        },
        _ => return Ok(None),
    };
    Ok(Some(scalar))
}

/// Skips one value payload whose tag has already been read, without
/// materializing it.
pub fn skip_value(reader: &mut Bytes, tag: u8) -> Result<()> {
    match tag {
        TAG_NULL | TAG_UNDEFINED | TAG_MIN_KEY | TAG_MAX_KEY => Ok(()),
        TAG_BOOLEAN => read_bytes(reader, 1).map(drop),
        TAG_INT32 => read_bytes(reader, 4).map(drop),
        TAG_DOUBLE | TAG_DATE_TIME | TAG_TIMESTAMP | TAG_INT64 => read_bytes(reader, 8).map(drop),
        TAG_OBJECT_ID => read_bytes(reader, 12).map(drop),
        TAG_DECIMAL128 => read_bytes(reader, 16).map(drop),
        TAG_STRING | TAG_JAVASCRIPT | TAG_SYMBOL => {
            let len = read_i32_le(reader)?;
            if len < 1 {
                return Err(BsonError::Decode(format!("Invalid string length {}", len)));
            }
            read_bytes(reader, len as usize).map(drop)
        }
        TAG_DOCUMENT | TAG_ARRAY | TAG_DOCUMENT_ROOT => read_document(reader).map(drop),
        TAG_BINARY => {
            let len = read_i32_le(reader)?;
            if len < 0 {
                return Err(BsonError::Decode(format!("Invalid binary length {}", len)));
            }
            // subtype byte + payload
            read_bytes(reader, len as usize + 1).map(drop)
        }
        TAG_REGEX => {
            read_cstring(reader)?;
            read_cstring(reader)?;
            Ok(())
        }
        TAG_DB_POINTER => {
            skip_value(reader, TAG_STRING)?;
            read_bytes(reader, 12).map(drop)
        }
        TAG_JAVASCRIPT_WITH_SCOPE => {
            let total = read_i32_le(reader)?;
            if total < 4 {
                return Err(BsonError::Decode(format!(
                    "Invalid code with scope length {}",
                    total
                )));
            }
            read_bytes(reader, total as usize - 4).map(drop)
        }
        other => Err(BsonError::Decode(format!(
            "Cannot skip value with unknown tag 0x{:02X}",
            other
        ))),
    }
}

/// Consumes one value payload and returns the exact bytes it occupied.
pub fn capture_value(reader: &mut Bytes, tag: u8) -> Result<Bytes> {
    let start = reader.clone();
    skip_value(reader, tag)?;
    let consumed = start.len() - reader.len();
    Ok(start.slice(..consumed))
}
