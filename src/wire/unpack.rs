//! Row and row-stream decoding.
//!
//! A row is a NULL-indicator vector (`ceil(columns / 8)` bytes, bit `i % 8`
//! of byte `i / 8` set when column `i` is NULL) followed by the column
//! values. A stream is a back-to-back sequence of length-prefixed rows.

use bytes::Bytes;
use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;

use super::columns::{Column, Columns};
use super::convert::{skip_null, DecimalFn, ItemFn};
use super::cursor::{Cursor, LengthWidth};
use super::types::Value;
use crate::error::{CodecError, CodecResult};

/// Positional cell values. Inline for rows of up to 16 columns.
pub type Values = SmallVec<[Value; 16]>;

/// A decoded row in the configured shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Row {
    /// Rendered cells joined by the delimiter.
    Text(String),
    /// Column name to value, in column order.
    Map(IndexMap<String, Value>),
    List(Values),
    /// The row bytes as received, without their length prefix.
    Raw(Bytes),
}

impl Row {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Row::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Row::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Row::List(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&Bytes> {
        match self {
            Row::Raw(b) => Some(b),
            _ => None,
        }
    }
}

/// Everything a row decoder reads from its encoder.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'e> {
    pub columns: &'e Columns,
    pub item: ItemFn,
    pub decimal: DecimalFn,
    pub delimiter: &'e str,
    pub null_value: Option<&'e str>,
}

impl RowContext<'_> {
    /// Value used for NULL cells in structured shapes.
    fn null_cell(&self) -> Value {
        match self.null_value {
            Some(marker) => Value::Text(marker.to_string()),
            None => Value::Null,
        }
    }
}

/// Decodes the row held by the cursor, which must span exactly one row.
pub type RowFn = fn(&RowContext<'_>, &mut Cursor<'_>) -> CodecResult<Row>;

/// Decodes a whole stream of length-prefixed rows.
pub type RowsFn = fn(&RowContext<'_>, RowFn, &[u8], LengthWidth) -> CodecResult<Vec<Row>>;

/// Walk the cells of one row, calling `f` with `None` for NULL cells.
fn for_each_cell<F>(ctx: &RowContext<'_>, cur: &mut Cursor<'_>, mut f: F) -> CodecResult<()>
where
    F: FnMut(usize, &Column, Option<Value>),
{
    let indicators = cur.read_bytes(ctx.columns.indicator_len())?;

    for (idx, column) in ctx.columns.iter().enumerate() {
        let is_null = indicators[idx / 8] & (1 << (idx % 8)) != 0;
        if is_null {
            skip_null(column, cur).map_err(|e| e.with_column(idx))?;
            f(idx, column, None);
        } else {
            let value = (ctx.item)(column, cur, ctx.decimal).map_err(|e| e.with_column(idx))?;
            f(idx, column, Some(value));
        }
    }

    if !cur.is_empty() {
        return Err(CodecError::trailing(cur.offset(), cur.remaining()));
    }
    Ok(())
}

pub fn unpack_row_str(ctx: &RowContext<'_>, cur: &mut Cursor<'_>) -> CodecResult<Row> {
    let mut line = String::new();
    let null_text = ctx.null_value.unwrap_or("");
    for_each_cell(ctx, cur, |idx, _, value| {
        if idx > 0 {
            line.push_str(ctx.delimiter);
        }
        match value {
            Some(v) => {
                use std::fmt::Write;
                // Writing to a String cannot fail
                let _ = write!(line, "{}", v);
            }
            None => line.push_str(null_text),
        }
    })?;
    Ok(Row::Text(line))
}

/// Later columns with a duplicate name overwrite earlier ones.
pub fn unpack_row_dict(ctx: &RowContext<'_>, cur: &mut Cursor<'_>) -> CodecResult<Row> {
    let mut map = IndexMap::with_capacity(ctx.columns.len());
    for_each_cell(ctx, cur, |_, column, value| {
        map.insert(
            column.name.clone(),
            value.unwrap_or_else(|| ctx.null_cell()),
        );
    })?;
    Ok(Row::Map(map))
}

pub fn unpack_row_list(ctx: &RowContext<'_>, cur: &mut Cursor<'_>) -> CodecResult<Row> {
    let mut values = Values::with_capacity(ctx.columns.len());
    for_each_cell(ctx, cur, |_, _, value| {
        values.push(value.unwrap_or_else(|| ctx.null_cell()));
    })?;
    Ok(Row::List(values))
}

/// The row bytes untouched; the indicator vector is not interpreted.
pub fn unpack_row_raw(_ctx: &RowContext<'_>, cur: &mut Cursor<'_>) -> CodecResult<Row> {
    let bytes = cur.read_bytes(cur.remaining())?;
    Ok(Row::Raw(Bytes::copy_from_slice(bytes)))
}

/// Slice off the next length-prefixed row.
fn next_row<'a>(cur: &mut Cursor<'a>, width: LengthWidth) -> CodecResult<Cursor<'a>> {
    let len = cur.read_length(width)?;
    cur.sub_cursor(len)
}

/// Decode every row in the stream. Any failure discards the whole batch:
/// a misaligned row invalidates the offsets of all rows after it.
pub fn unpack_rows(
    ctx: &RowContext<'_>,
    row_fn: RowFn,
    data: &[u8],
    width: LengthWidth,
) -> CodecResult<Vec<Row>> {
    let _span = tracing::trace_span!("unpack_rows", bytes = data.len()).entered();

    let mut cur = Cursor::new(data);
    let mut rows = Vec::new();
    while !cur.is_empty() {
        let result = next_row(&mut cur, width).and_then(|mut row| row_fn(ctx, &mut row));
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                tracing::debug!(error = %e, row = rows.len(), "row stream decode failed");
                return Err(e);
            }
        }
    }

    tracing::trace!(rows = rows.len(), "decoded row stream");
    Ok(rows)
}

/// Split the stream into raw row spans without decoding them.
pub fn unpack_rows_raw(
    _ctx: &RowContext<'_>,
    _row_fn: RowFn,
    data: &[u8],
    width: LengthWidth,
) -> CodecResult<Vec<Row>> {
    let _span = tracing::trace_span!("unpack_rows_raw", bytes = data.len()).entered();

    let mut cur = Cursor::new(data);
    let mut rows = Vec::new();
    while !cur.is_empty() {
        let mut row = next_row(&mut cur, width)?;
        let bytes = row.read_bytes(row.remaining())?;
        rows.push(Row::Raw(Bytes::copy_from_slice(bytes)));
    }
    Ok(rows)
}

/// Number of rows in the stream, checking every boundary.
pub fn count_rows(data: &[u8], width: LengthWidth) -> CodecResult<usize> {
    let mut cur = Cursor::new(data);
    let mut count = 0;
    while !cur.is_empty() {
        next_row(&mut cur, width)?;
        count += 1;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Truncation;
    use crate::wire::convert::{decimal_to_string, unpack_item_with_builtin_types};
    use crate::wire::types::DataType;

    fn two_ints() -> Columns {
        Columns::new(vec![
            Column::new("a", DataType::Integer, 4, 0),
            Column::new("b", DataType::Integer, 4, 0),
        ])
    }

    fn ctx<'e>(columns: &'e Columns, null_value: Option<&'e str>) -> RowContext<'e> {
        RowContext {
            columns,
            item: unpack_item_with_builtin_types,
            decimal: decimal_to_string,
            delimiter: ",",
            null_value,
        }
    }

    fn row_bytes(indicator: u8, a: i32, b: i32) -> Vec<u8> {
        let mut out = vec![indicator];
        out.extend_from_slice(&a.to_le_bytes());
        out.extend_from_slice(&b.to_le_bytes());
        out
    }

    #[test]
    fn test_list_row() {
        let columns = two_ints();
        let data = row_bytes(0x00, 1, -2);
        let row = unpack_row_list(&ctx(&columns, None), &mut Cursor::new(&data)).unwrap();
        assert_eq!(row.as_list().unwrap(), &[Value::Int(1), Value::Int(-2)]);
    }

    #[test]
    fn test_null_bit_wins_over_bytes() {
        let columns = two_ints();
        let data = row_bytes(0x01, 99, 5);
        let row = unpack_row_list(&ctx(&columns, None), &mut Cursor::new(&data)).unwrap();
        assert_eq!(row.as_list().unwrap(), &[Value::Null, Value::Int(5)]);

        let row = unpack_row_dict(&ctx(&columns, Some("?")), &mut Cursor::new(&data)).unwrap();
        let map = row.as_map().unwrap();
        assert_eq!(map["a"], Value::Text("?".to_string()));
        assert_eq!(map["b"], Value::Int(5));
    }

    #[test]
    fn test_text_row_no_trailing_delimiter() {
        let columns = two_ints();
        let data = row_bytes(0x02, 7, 0);
        let row = unpack_row_str(&ctx(&columns, Some("NULL")), &mut Cursor::new(&data)).unwrap();
        assert_eq!(row, Row::Text("7,NULL".to_string()));

        let row = unpack_row_str(&ctx(&columns, None), &mut Cursor::new(&data)).unwrap();
        assert_eq!(row, Row::Text("7,".to_string()));
    }

    #[test]
    fn test_dict_duplicate_names_overwrite() {
        let columns = Columns::new(vec![
            Column::new("x", DataType::Integer, 4, 0),
            Column::new("x", DataType::Integer, 4, 0),
        ]);
        let data = row_bytes(0x00, 1, 2);
        let row = unpack_row_dict(&ctx(&columns, None), &mut Cursor::new(&data)).unwrap();
        let map = row.as_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["x"], Value::Int(2));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let columns = two_ints();
        let mut data = row_bytes(0x00, 1, 2);
        data.push(0xEE);
        let err = unpack_row_list(&ctx(&columns, None), &mut Cursor::new(&data)).unwrap_err();
        assert_eq!(
            err,
            CodecError::TruncatedInput {
                offset: 9,
                column: None,
                kind: Truncation::Trailing { remaining: 1 },
            }
        );
    }

    #[test]
    fn test_short_row_reports_column() {
        let columns = two_ints();
        let data = row_bytes(0x00, 1, 2);
        let err = unpack_row_list(&ctx(&columns, None), &mut Cursor::new(&data[..7])).unwrap_err();
        assert!(matches!(
            err,
            CodecError::TruncatedInput {
                column: Some(1),
                offset: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_raw_row_ignores_indicators() {
        let columns = two_ints();
        let data = [0xFF, 1, 2, 3];
        let row = unpack_row_raw(&ctx(&columns, None), &mut Cursor::new(&data)).unwrap();
        assert_eq!(row.as_raw().unwrap().as_ref(), &data);
    }

    fn stream(rows: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for row in rows {
            out.extend_from_slice(&(row.len() as u16).to_le_bytes());
            out.extend_from_slice(row);
        }
        out
    }

    #[test]
    fn test_stream_and_count() {
        let columns = two_ints();
        let data = stream(&[row_bytes(0, 1, 2), row_bytes(0x02, 3, 0), row_bytes(0, 5, 6)]);
        let ctx = ctx(&columns, None);

        let rows = unpack_rows(&ctx, unpack_row_list, &data, LengthWidth::U16).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].as_list().unwrap(), &[Value::Int(3), Value::Null]);
        assert_eq!(count_rows(&data, LengthWidth::U16).unwrap(), 3);

        let raw = unpack_rows_raw(&ctx, unpack_row_list, &data, LengthWidth::U16).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[2].as_raw().unwrap().as_ref(), row_bytes(0, 5, 6).as_slice());
    }

    #[test]
    fn test_stream_row_past_end_aborts() {
        let columns = two_ints();
        let mut data = stream(&[row_bytes(0, 1, 2)]);
        data.extend_from_slice(&20u16.to_le_bytes());
        data.extend_from_slice(&[0u8; 5]);
        let ctx = ctx(&columns, None);

        assert!(matches!(
            unpack_rows(&ctx, unpack_row_list, &data, LengthWidth::U16),
            Err(CodecError::TruncatedInput { .. })
        ));
        assert!(unpack_rows_raw(&ctx, unpack_row_list, &data, LengthWidth::U16).is_err());
        assert!(count_rows(&data, LengthWidth::U16).is_err());
    }

    #[test]
    fn test_partial_length_prefix() {
        let mut data = stream(&[row_bytes(0, 1, 2)]);
        data.push(0x01);
        assert!(matches!(
            count_rows(&data, LengthWidth::U16),
            Err(CodecError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn test_empty_stream() {
        let columns = two_ints();
        let rows = unpack_rows(&ctx(&columns, None), unpack_row_list, &[], LengthWidth::U16).unwrap();
        assert!(rows.is_empty());
    }
}
