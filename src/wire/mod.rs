//! Row wire format: column schemas, cursors and the row codecs.
//!
//! Architecture:
//! - `cursor`: Bounds-checked little-endian reads over a byte slice
//! - `types`: Type codes, decimals, dates and the decoded `Value`
//! - `columns`: Column descriptors and the name index
//! - `stmt_info`: Statement-info (schema) block encoding/decoding
//! - `convert`: Per-item and per-decimal conversion strategies
//! - `unpack`: Row and row-stream decoding in each shape
//! - `pack`: Row encoding, the inverse of `unpack`

pub mod columns;
pub mod convert;
pub mod cursor;
pub mod pack;
pub mod stmt_info;
pub mod types;
pub mod unpack;


pub use columns::{Column, Columns};
pub use cursor::{Cursor, LengthWidth};
pub use pack::{pack_row, pack_rows};
pub use stmt_info::{pack_stmt_info, unpack_stmt_info};
pub use types::{DataType, Decimal, DecimalParts, TypeCode, Value};
pub use unpack::{count_rows, Row, Values};
