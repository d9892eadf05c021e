//! Rowpack - binary row codec for tabular database wire protocols.
//!
//! Decodes statement info into a column schema, then turns length-prefixed
//! row buffers into text lines, maps, lists or raw byte spans as configured
//! by an [`Encoder`]. The pack path writes the same formats back.

pub mod encoder;
pub mod error;
pub mod wire;

#[cfg(feature = "python")]
mod python;

pub use encoder::{DecimalStrategy, Encoder, ItemStrategy, RowShape, Settings, WireLayout};
pub use error::{CodecError, CodecResult};
pub use wire::{Column, Columns, DataType, Decimal, LengthWidth, Row, TypeCode, Value};

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Rowpack - binary row codec
#[cfg(feature = "python")]
#[pymodule]
fn rowpack(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<python::PyEncoder>()?;

    m.add("ROW_ENCODING_STRING", Settings::ROW_ENCODING_STRING)?;
    m.add("ROW_ENCODING_DICT", Settings::ROW_ENCODING_DICT)?;
    m.add("ROW_ENCODING_LIST", Settings::ROW_ENCODING_LIST)?;
    m.add("ROW_ENCODING_RAW", Settings::ROW_ENCODING_RAW)?;
    m.add("ITEM_ENCODING_STRING", Settings::ITEM_ENCODING_STRING)?;
    m.add("ITEM_ENCODING_BUILTIN_TYPES", Settings::ITEM_ENCODING_BUILTIN_TYPES)?;
    m.add("ITEM_ENCODING_DOMAIN_TYPES", Settings::ITEM_ENCODING_DOMAIN_TYPES)?;
    m.add("DECIMAL_AS_STRING", Settings::DECIMAL_AS_STRING)?;
    m.add("DECIMAL_AS_FLOAT", Settings::DECIMAL_AS_FLOAT)?;
    m.add("DECIMAL_AS_DECIMAL", Settings::DECIMAL_AS_DECIMAL)?;
    Ok(())
}
