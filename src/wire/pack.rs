//! Row encoding: the inverse of [`super::unpack`].

use bytes::{BufMut, BytesMut};
use chrono::{NaiveDate, Timelike};

use super::columns::{Column, Columns};
use super::cursor::LengthWidth;
use super::stmt_info::put_length;
use super::types::{date_to_wire, parse_time, parse_timestamp, DataType, Decimal, Value};
use crate::error::{CodecError, CodecResult};

/// Encode one row (without its length prefix).
pub fn pack_row(columns: &Columns, values: &[Value]) -> CodecResult<BytesMut> {
    if values.len() != columns.len() {
        return Err(CodecError::value(
            0,
            format!("expected {} values, got {}", columns.len(), values.len()),
        ));
    }

    let indicator_len = columns.indicator_len();
    let data_len: usize = columns.iter().map(|c| c.length).sum();
    let mut buf = BytesMut::with_capacity(indicator_len + data_len);
    buf.put_bytes(0, indicator_len);

    for (idx, (column, value)) in columns.iter().zip(values).enumerate() {
        if value.is_null() {
            if !column.nullable {
                return Err(CodecError::InvalidValue {
                    offset: buf.len(),
                    column: Some(idx),
                    reason: format!("column {:?} is NOT NULL", column.name),
                });
            }
            buf[idx / 8] |= 1 << (idx % 8);
            if column.data_type.is_variable() {
                buf.put_u16_le(0);
            } else {
                buf.put_bytes(0, column.length);
            }
            continue;
        }
        let offset = buf.len();
        pack_value(&mut buf, column, value).map_err(|reason| CodecError::InvalidValue {
            offset,
            column: Some(idx),
            reason,
        })?;
    }

    Ok(buf)
}

/// Encode rows as a length-prefixed stream.
pub fn pack_rows<I, R>(columns: &Columns, rows: I, width: LengthWidth) -> CodecResult<BytesMut>
where
    I: IntoIterator<Item = R>,
    R: AsRef<[Value]>,
{
    let mut buf = BytesMut::new();
    for row in rows {
        let packed = pack_row(columns, row.as_ref())?;
        put_length(&mut buf, packed.len(), width, 0).map_err(|_| {
            CodecError::value(
                buf.len(),
                format!("row of {} bytes exceeds the length prefix", packed.len()),
            )
        })?;
        buf.put_slice(&packed);
    }
    Ok(buf)
}

fn pack_value(buf: &mut BytesMut, column: &Column, value: &Value) -> Result<(), String> {
    match column.data_type {
        DataType::ByteInt => {
            let v = as_int(value)?;
            buf.put_i8(i8::try_from(v).map_err(|_| out_of_range(v, "BYTEINT"))?);
        }
        DataType::SmallInt => {
            let v = as_int(value)?;
            buf.put_i16_le(i16::try_from(v).map_err(|_| out_of_range(v, "SMALLINT"))?);
        }
        DataType::Integer => {
            let v = as_int(value)?;
            buf.put_i32_le(i32::try_from(v).map_err(|_| out_of_range(v, "INTEGER"))?);
        }
        DataType::BigInt => buf.put_i64_le(as_int(value)?),
        DataType::Float => buf.put_f64_le(as_float(value)?),
        DataType::Decimal => {
            let unscaled = decimal_for(column, value)?.unscaled;
            match column.length {
                1 => buf.put_i8(unscaled as i8),
                2 => buf.put_i16_le(unscaled as i16),
                4 => buf.put_i32_le(unscaled as i32),
                8 => buf.put_i64_le(unscaled as i64),
                _ => buf.put_i128_le(unscaled),
            }
        }
        DataType::PackedDecimal => {
            let unscaled = decimal_for(column, value)?.unscaled;
            put_packed(buf, unscaled, column.length);
        }
        DataType::Char => put_fixed(buf, as_text(value)?.as_bytes(), column.length, b' ')?,
        DataType::VarChar | DataType::LongVarChar => {
            put_var(buf, as_text(value)?.as_bytes(), column.length)?
        }
        DataType::Byte => put_fixed(buf, as_blob(value)?, column.length, 0)?,
        DataType::VarByte => put_var(buf, as_blob(value)?, column.length)?,
        DataType::Date => {
            let date = match value {
                Value::Date(d) => *d,
                Value::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .map_err(|e| format!("invalid date {:?}: {}", s, e))?,
                other => return Err(mismatch(other, "DATE")),
            };
            buf.put_i32_le(date_to_wire(date));
        }
        DataType::Time => {
            let text = match value {
                Value::Time(t) => {
                    with_fraction(t.format("%H:%M:%S").to_string(), t.nanosecond(), column.length)
                }
                Value::Text(s) if parse_time(s).is_some() => s.clone(),
                other => return Err(mismatch(other, "TIME")),
            };
            put_fixed(buf, text.as_bytes(), column.length, b' ')?;
        }
        DataType::Timestamp => {
            let text = match value {
                Value::Timestamp(ts) => with_fraction(
                    ts.format("%Y-%m-%d %H:%M:%S").to_string(),
                    ts.nanosecond(),
                    column.length,
                ),
                Value::Text(s) if parse_timestamp(s).is_some() => s.clone(),
                other => return Err(mismatch(other, "TIMESTAMP")),
            };
            put_fixed(buf, text.as_bytes(), column.length, b' ')?;
        }
    }
    Ok(())
}

fn mismatch(value: &Value, target: &str) -> String {
    format!("cannot pack {:?} as {}", value, target)
}

fn out_of_range(v: i64, target: &str) -> String {
    format!("{} out of range for {}", v, target)
}

fn as_int(value: &Value) -> Result<i64, String> {
    match value {
        Value::Int(i) => Ok(*i),
        Value::Text(s) => s
            .trim()
            .parse()
            .map_err(|e| format!("invalid integer {:?}: {}", s, e)),
        other => Err(mismatch(other, "integer")),
    }
}

fn as_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Int(i) => Ok(*i as f64),
        Value::Decimal(d) => Ok(d.to_f64()),
        Value::Text(s) => s
            .trim()
            .parse()
            .map_err(|e| format!("invalid float {:?}: {}", s, e)),
        other => Err(mismatch(other, "FLOAT")),
    }
}

fn as_text(value: &Value) -> Result<&str, String> {
    match value {
        Value::Text(s) => Ok(s),
        other => Err(mismatch(other, "character")),
    }
}

fn as_blob(value: &Value) -> Result<&[u8], String> {
    match value {
        Value::Bytes(b) => Ok(b),
        Value::Text(s) => Ok(s.as_bytes()),
        other => Err(mismatch(other, "byte")),
    }
}

/// The value at the column's scale, checked against its precision.
/// Rescaling must be exact; digits are never rounded away.
fn decimal_for(column: &Column, value: &Value) -> Result<Decimal, String> {
    let decimal = match value {
        Value::Decimal(d) => *d,
        Value::Int(i) => Decimal::new(i128::from(*i), 0),
        Value::Float(f) if f.is_finite() => f.to_string().parse()?,
        Value::Text(s) => s.parse()?,
        other => return Err(mismatch(other, "DECIMAL")),
    };
    let scaled = decimal.rescale(column.scale).ok_or_else(|| {
        format!(
            "{} cannot be represented with scale {}",
            decimal, column.scale
        )
    })?;
    if scaled.digit_count() > column.precision as usize {
        return Err(format!(
            "{} exceeds precision {}",
            decimal, column.precision
        ));
    }
    Ok(scaled)
}

/// BCD digits high nibble first, zero padded on the left, sign `C`/`D` last.
fn put_packed(buf: &mut BytesMut, unscaled: i128, width: usize) {
    let nibble_count = width * 2;
    let mut nibbles = vec![0u8; nibble_count];
    nibbles[nibble_count - 1] = if unscaled < 0 { 0xD } else { 0xC };

    let mut n = unscaled.unsigned_abs();
    let mut pos = nibble_count - 1;
    while n > 0 && pos > 0 {
        pos -= 1;
        nibbles[pos] = (n % 10) as u8;
        n /= 10;
    }
    for pair in nibbles.chunks(2) {
        buf.put_u8(pair[0] << 4 | pair[1]);
    }
}

fn put_fixed(buf: &mut BytesMut, bytes: &[u8], width: usize, pad: u8) -> Result<(), String> {
    if bytes.len() > width {
        return Err(format!("{} bytes do not fit width {}", bytes.len(), width));
    }
    buf.put_slice(bytes);
    buf.put_bytes(pad, width - bytes.len());
    Ok(())
}

fn put_var(buf: &mut BytesMut, bytes: &[u8], max: usize) -> Result<(), String> {
    if (max > 0 && bytes.len() > max) || bytes.len() > u16::MAX as usize {
        return Err(format!(
            "{} bytes exceed the declared maximum {}",
            bytes.len(),
            max
        ));
    }
    buf.put_u16_le(bytes.len() as u16);
    buf.put_slice(bytes);
    Ok(())
}

/// Append as many fractional-second digits as the field width leaves room for.
fn with_fraction(mut text: String, nanos: u32, width: usize) -> String {
    let digits = width.saturating_sub(text.len() + 1).min(9);
    if digits > 0 {
        let frac = nanos / 10u32.pow(9 - digits as u32);
        text.push('.');
        text.push_str(&format!("{:0width$}", frac, width = digits));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[test]
    fn test_pack_indicators_and_fixed_nulls() {
        let columns = Columns::new(vec![
            Column::new("a", DataType::Integer, 4, 0),
            Column::new("b", DataType::Integer, 4, 0),
        ]);
        let packed = pack_row(&columns, &[Value::Int(7), Value::Null]).unwrap();
        assert_eq!(&packed[..], &[0x02, 7, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_pack_not_null_rejects_null() {
        let columns = Columns::new(vec![Column::new("a", DataType::Integer, 4, 0).not_null()]);
        let err = pack_row(&columns, &[Value::Null]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::InvalidValue {
                column: Some(0),
                ..
            }
        ));
    }

    #[test]
    fn test_pack_integer_range() {
        let columns = Columns::new(vec![Column::new("a", DataType::ByteInt, 1, 0)]);
        assert!(pack_row(&columns, &[Value::Int(127)]).is_ok());
        assert!(pack_row(&columns, &[Value::Int(128)]).is_err());
    }

    #[test]
    fn test_pack_packed_decimal_layout() {
        let columns = Columns::new(vec![Column::new("p", DataType::PackedDecimal, 5, 2)]);
        let packed = pack_row(&columns, &[Value::Text("-123.45".to_string())]).unwrap();
        assert_eq!(&packed[1..], &[0x12, 0x34, 0x5D]);

        let packed = pack_row(&columns, &[Value::Int(7)]).unwrap();
        assert_eq!(&packed[1..], &[0x00, 0x70, 0x0C]);
    }

    #[test]
    fn test_pack_decimal_rejects_rounding_and_overflow() {
        let columns = Columns::new(vec![Column::new("d", DataType::Decimal, 4, 1)]);
        assert!(pack_row(&columns, &[Value::Text("1.25".to_string())]).is_err());
        assert!(pack_row(&columns, &[Value::Text("1000.0".to_string())]).is_err());

        let packed = pack_row(&columns, &[Value::Float(12.5)]).unwrap();
        assert_eq!(&packed[1..], &125i16.to_le_bytes());
    }

    #[test]
    fn test_pack_char_padding_and_overflow() {
        let columns = Columns::new(vec![Column::new("c", DataType::Char, 4, 0)]);
        let packed = pack_row(&columns, &[Value::Text("ab".to_string())]).unwrap();
        assert_eq!(&packed[1..], b"ab  ");
        assert!(pack_row(&columns, &[Value::Text("abcde".to_string())]).is_err());
    }

    #[test]
    fn test_pack_byte_zero_padding() {
        let columns = Columns::new(vec![Column::new("b", DataType::Byte, 4, 0)]);
        let packed = pack_row(&columns, &[Value::Bytes(vec![0xCA, 0xFE])]).unwrap();
        assert_eq!(&packed[..], &[0x00, 0xCA, 0xFE, 0x00, 0x00]);
        assert!(pack_row(&columns, &[Value::Bytes(vec![0; 5])]).is_err());
    }

    #[test]
    fn test_pack_time_fraction_from_width() {
        let columns = Columns::new(vec![Column::new("t", DataType::Time, 12, 0)]);
        let t = NaiveTime::from_hms_micro_opt(1, 2, 3, 456_789).unwrap();
        let packed = pack_row(&columns, &[Value::Time(t)]).unwrap();
        assert_eq!(&packed[1..], b"01:02:03.456");
    }

    #[test]
    fn test_pack_rows_prefixes() {
        let columns = Columns::new(vec![Column::new("v", DataType::VarChar, 10, 0)]);
        let rows = vec![
            vec![Value::Text("hi".to_string())],
            vec![Value::Null],
        ];
        let packed = pack_rows(&columns, &rows, LengthWidth::U16).unwrap();
        assert_eq!(
            &packed[..],
            &[5, 0, 0x00, 2, 0, b'h', b'i', 3, 0, 0x01, 0, 0]
        );
    }

    #[test]
    fn test_pack_value_count_mismatch() {
        let columns = Columns::new(vec![Column::new("v", DataType::VarChar, 10, 0)]);
        assert!(pack_row(&columns, &[]).is_err());
    }
}
