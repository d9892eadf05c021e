//! Per-cell conversion from wire bytes to [`Value`].
//!
//! Dispatch happens in two steps. The column's data type picks how raw bytes
//! become a native value; the item strategy then picks how that native value
//! is represented. Decimal cells additionally go through the decimal strategy
//! unless items are forced to text.

use super::columns::Column;
use super::cursor::Cursor;
use super::types::{
    date_from_wire, parse_time, parse_timestamp, unpack_binary_decimal, unpack_packed_decimal,
    DataType, DecimalParts, Value,
};
use crate::error::{CodecError, CodecResult};

/// Decodes one non-null cell, advancing the cursor past it.
pub type ItemFn = fn(&Column, &mut Cursor<'_>, DecimalFn) -> CodecResult<Value>;

/// Represents an unpacked decimal.
pub type DecimalFn = fn(DecimalParts) -> Value;

/// A cell after the wire transform, before representation.
enum Native<'a> {
    Int(i64),
    Float(f64),
    Decimal(DecimalParts),
    Chars(&'a [u8]),
    Bytes(&'a [u8]),
    Date { raw: i32, offset: usize },
    Time { raw: &'a [u8], offset: usize },
    Timestamp { raw: &'a [u8], offset: usize },
}

fn read_native<'a>(column: &Column, cur: &mut Cursor<'a>) -> CodecResult<Native<'a>> {
    let offset = cur.offset();
    let native = match column.data_type {
        DataType::ByteInt => Native::Int(i64::from(cur.read_i8()?)),
        DataType::SmallInt => Native::Int(i64::from(cur.read_i16()?)),
        DataType::Integer => Native::Int(i64::from(cur.read_i32()?)),
        DataType::BigInt => Native::Int(cur.read_i64()?),
        DataType::Float => Native::Float(cur.read_f64()?),
        DataType::Decimal => {
            let bytes = cur.read_bytes(column.length)?;
            Native::Decimal(unpack_binary_decimal(
                bytes,
                column.precision,
                column.scale,
                offset,
            )?)
        }
        DataType::PackedDecimal => {
            let bytes = cur.read_bytes(column.length)?;
            Native::Decimal(unpack_packed_decimal(
                bytes,
                column.precision,
                column.scale,
                offset,
            )?)
        }
        DataType::Char => Native::Chars(cur.read_bytes(column.length)?),
        DataType::VarChar | DataType::LongVarChar => Native::Chars(cur.read_var_bytes()?),
        DataType::Byte => Native::Bytes(cur.read_bytes(column.length)?),
        DataType::VarByte => Native::Bytes(cur.read_var_bytes()?),
        DataType::Date => Native::Date {
            raw: cur.read_i32()?,
            offset,
        },
        DataType::Time => Native::Time {
            raw: cur.read_bytes(column.length)?,
            offset,
        },
        DataType::Timestamp => Native::Timestamp {
            raw: cur.read_bytes(column.length)?,
            offset,
        },
    };
    Ok(native)
}

/// Advance past a NULL cell. Fixed-width fields still occupy their width;
/// variable fields carry a (zero) length prefix.
pub fn skip_null(column: &Column, cur: &mut Cursor<'_>) -> CodecResult<()> {
    if column.data_type.is_variable() {
        cur.read_var_bytes().map(|_| ())
    } else {
        cur.skip(column.length)
    }
}

#[inline]
fn chars_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn date_value(raw: i32, offset: usize) -> CodecResult<chrono::NaiveDate> {
    date_from_wire(raw).ok_or_else(|| CodecError::value(offset, format!("invalid date {}", raw)))
}

// ============================================================================
// Item Strategies
// ============================================================================

/// Every non-null cell becomes text. Decimals are rendered exactly.
pub fn unpack_item_as_str(
    column: &Column,
    cur: &mut Cursor<'_>,
    _decimal: DecimalFn,
) -> CodecResult<Value> {
    let text = match read_native(column, cur)? {
        Native::Int(i) => i.to_string(),
        Native::Float(f) => f.to_string(),
        Native::Decimal(parts) => parts.to_string(),
        Native::Chars(raw) | Native::Time { raw, .. } | Native::Timestamp { raw, .. } => {
            chars_to_string(raw)
        }
        Native::Bytes(raw) => Value::Bytes(raw.to_vec()).to_string(),
        Native::Date { raw, offset } => date_value(raw, offset)?.format("%Y-%m-%d").to_string(),
    };
    Ok(Value::Text(text))
}

/// Native Rust types: integers, floats, strings, byte vectors and dates.
pub fn unpack_item_with_builtin_types(
    column: &Column,
    cur: &mut Cursor<'_>,
    decimal: DecimalFn,
) -> CodecResult<Value> {
    let value = match read_native(column, cur)? {
        Native::Int(i) => Value::Int(i),
        Native::Float(f) => Value::Float(f),
        Native::Decimal(parts) => decimal(parts),
        Native::Chars(raw) | Native::Time { raw, .. } | Native::Timestamp { raw, .. } => {
            Value::Text(chars_to_string(raw))
        }
        Native::Bytes(raw) => Value::Bytes(raw.to_vec()),
        Native::Date { raw, offset } => Value::Date(date_value(raw, offset)?),
    };
    Ok(value)
}

/// Like the built-in strategy, with times and timestamps parsed into
/// their typed forms.
pub fn unpack_item_with_domain_types(
    column: &Column,
    cur: &mut Cursor<'_>,
    decimal: DecimalFn,
) -> CodecResult<Value> {
    let value = match read_native(column, cur)? {
        Native::Int(i) => Value::Int(i),
        Native::Float(f) => Value::Float(f),
        Native::Decimal(parts) => decimal(parts),
        Native::Chars(raw) => Value::Text(chars_to_string(raw)),
        Native::Bytes(raw) => Value::Bytes(raw.to_vec()),
        Native::Date { raw, offset } => Value::Date(date_value(raw, offset)?),
        Native::Time { raw, offset } => {
            let text = chars_to_string(raw);
            Value::Time(
                parse_time(&text)
                    .ok_or_else(|| CodecError::value(offset, format!("invalid time {:?}", text)))?,
            )
        }
        Native::Timestamp { raw, offset } => {
            let text = chars_to_string(raw);
            Value::Timestamp(parse_timestamp(&text).ok_or_else(|| {
                CodecError::value(offset, format!("invalid timestamp {:?}", text))
            })?)
        }
    };
    Ok(value)
}

// ============================================================================
// Decimal Strategies
// ============================================================================

pub fn decimal_to_string(parts: DecimalParts) -> Value {
    Value::Text(parts.to_string())
}

pub fn decimal_to_float(parts: DecimalParts) -> Value {
    Value::Float(parts.to_f64())
}

pub fn decimal_to_decimal(parts: DecimalParts) -> Value {
    Value::Decimal(parts.to_decimal())
}
