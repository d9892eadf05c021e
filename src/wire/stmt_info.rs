//! Statement-info encoding and decoding.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! count          u16 | u32
//! count x {
//!     type_code  u16
//!     length     u16     precision for decimal types, byte width otherwise
//!     scale      i16
//!     flags      u8      bit 0 = nullable
//!     ext_length u16
//!     ext        ext_length bytes:
//!                  name, default, format   (each u16 length + UTF-8)
//! }
//! ```

use bytes::{BufMut, BytesMut};

use super::columns::{Column, Columns};
use super::cursor::{Cursor, LengthWidth};
use super::types::{TypeCode, MAX_DECIMAL_PRECISION};
use crate::error::{CodecError, CodecResult};

/// Column flag: the column accepts NULL.
pub const FLAG_NULLABLE: u8 = 0x01;

/// Decode statement info into a column schema.
///
/// Every variable block is consumed by its declared length, never by
/// scanning for a terminator.
pub fn unpack_stmt_info(data: &[u8], count_width: LengthWidth) -> CodecResult<Columns> {
    let mut cur = Cursor::new(data);
    let count = cur.read_length(count_width)?;

    // Each descriptor is at least 9 bytes; don't trust `count` for the allocation.
    let mut columns = Vec::with_capacity(count.min(cur.remaining() / 9));
    for idx in 0..count {
        columns.push(unpack_column(&mut cur, idx)?);
    }

    tracing::debug!(
        columns = columns.len(),
        bytes = cur.position(),
        "decoded statement info"
    );
    Ok(Columns::new(columns))
}

fn unpack_column(cur: &mut Cursor<'_>, idx: usize) -> CodecResult<Column> {
    let code = TypeCode(cur.read_u16()?);
    let length = cur.read_u16()?;
    let scale = cur.read_i16()?;
    let flags = cur.read_u8()?;
    let ext_len = cur.read_u16()? as usize;
    let mut ext = cur.sub_cursor(ext_len)?;

    let data_type = code.data_type().ok_or(CodecError::UnknownTypeCode {
        code: code.0,
        column: idx,
    })?;

    // Non-decimal types decode with scale 0 whatever the header says.
    let scale = if data_type.is_decimal() {
        let scale = u8::try_from(scale).map_err(|_| CodecError::InvalidColumn {
            column: idx,
            reason: format!("scale {} out of range", scale),
        })?;
        if length == 0 || length > MAX_DECIMAL_PRECISION {
            return Err(CodecError::InvalidColumn {
                column: idx,
                reason: format!("decimal precision {} not in 1..=38", length),
            });
        }
        if u16::from(scale) > length {
            return Err(CodecError::InvalidColumn {
                column: idx,
                reason: format!("scale {} exceeds precision {}", scale, length),
            });
        }
        scale
    } else {
        0
    };

    let name = read_ext_string(&mut ext)?.unwrap_or_default();
    let default = read_ext_string(&mut ext)?;
    let format = read_ext_string(&mut ext)?;
    // Anything left in the block is qualifiers this decoder does not interpret.

    let mut column = Column::new(name, data_type, length, scale);
    column.type_code = code;
    column.nullable = flags & FLAG_NULLABLE != 0 || code.is_nullable_variant();
    column.default = default;
    column.format = format;
    Ok(column)
}

/// Next string in the extended block; `None` when empty or the block is exhausted.
fn read_ext_string(ext: &mut Cursor<'_>) -> CodecResult<Option<String>> {
    if ext.is_empty() {
        return Ok(None);
    }
    let bytes = ext.read_var_bytes()?;
    if bytes.is_empty() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(bytes).into_owned()))
}

/// Encode a schema as statement info.
pub fn pack_stmt_info(columns: &Columns, count_width: LengthWidth) -> CodecResult<BytesMut> {
    let mut buf = BytesMut::new();
    put_length(&mut buf, columns.len(), count_width, 0)?;

    for (idx, column) in columns.iter().enumerate() {
        let mut ext = BytesMut::new();
        for part in [
            Some(column.name.as_str()),
            column.default.as_deref(),
            column.format.as_deref(),
        ] {
            let part = part.unwrap_or("");
            let len = u16::try_from(part.len()).map_err(|_| CodecError::InvalidColumn {
                column: idx,
                reason: "extended attribute longer than 65535 bytes".to_string(),
            })?;
            ext.put_u16_le(len);
            ext.put_slice(part.as_bytes());
        }

        let declared = u16::try_from(column.declared_length()).map_err(|_| {
            CodecError::InvalidColumn {
                column: idx,
                reason: format!("length {} does not fit u16", column.declared_length()),
            }
        })?;
        let ext_len = u16::try_from(ext.len()).map_err(|_| CodecError::InvalidColumn {
            column: idx,
            reason: "extended block longer than 65535 bytes".to_string(),
        })?;

        buf.put_u16_le(column.type_code.0);
        buf.put_u16_le(declared);
        buf.put_i16_le(i16::from(column.scale));
        buf.put_u8(if column.nullable { FLAG_NULLABLE } else { 0 });
        buf.put_u16_le(ext_len);
        buf.put_slice(&ext);
    }

    Ok(buf)
}

pub(crate) fn put_length(
    buf: &mut BytesMut,
    len: usize,
    width: LengthWidth,
    column: usize,
) -> CodecResult<()> {
    if len > width.max_value() {
        return Err(CodecError::InvalidColumn {
            column,
            reason: format!("length {} does not fit a {}-byte prefix", len, width.size()),
        });
    }
    match width {
        LengthWidth::U16 => buf.put_u16_le(len as u16),
        LengthWidth::U32 => buf.put_u32_le(len as u32),
    }
    Ok(())
}
