//! Error types for the row codec.
//!
//! Every failure is local to one call: a bad settings integer fails that
//! `Encoder` construction, a malformed buffer fails that decode call.

use thiserror::Error;

/// Which settings bit-field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingField {
    RowShape,
    ItemStrategy,
    DecimalStrategy,
    /// Bits set outside all three fields.
    Reserved,
}

impl std::fmt::Display for SettingField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SettingField::RowShape => "row shape",
            SettingField::ItemStrategy => "item strategy",
            SettingField::DecimalStrategy => "decimal strategy",
            SettingField::Reserved => "reserved bits",
        };
        f.write_str(name)
    }
}

/// How a buffer failed to line up with its declared length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    /// A read needed more bytes than were left.
    Short { needed: usize, available: usize },
    /// Bytes were left over after every column was consumed.
    Trailing { remaining: usize },
}

impl std::fmt::Display for Truncation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Truncation::Short { needed, available } => {
                write!(f, "needed {} bytes, {} available", needed, available)
            }
            Truncation::Trailing { remaining } => {
                write!(f, "{} bytes left after last column", remaining)
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("Unrecognized {field} setting: {bits:#010x}")]
    UnrecognizedSetting { field: SettingField, bits: u32 },

    #[error("Unknown type code {code} for column {column}")]
    UnknownTypeCode { code: u16, column: usize },

    #[error("Truncated input at offset {offset}{}: {kind}", fmt_column(.column))]
    TruncatedInput {
        offset: usize,
        column: Option<usize>,
        kind: Truncation,
    },

    #[error("Invalid decimal encoding at offset {offset}{}: {reason}", fmt_column(.column))]
    InvalidDecimalEncoding {
        offset: usize,
        column: Option<usize>,
        reason: String,
    },

    #[error("Invalid column {column}: {reason}")]
    InvalidColumn { column: usize, reason: String },

    #[error("Invalid value at offset {offset}{}: {reason}", fmt_column(.column))]
    InvalidValue {
        offset: usize,
        column: Option<usize>,
        reason: String,
    },

    #[error("Column not found: {0}")]
    NotFound(String),
}

fn fmt_column(column: &Option<usize>) -> String {
    match column {
        Some(idx) => format!(" (column {})", idx),
        None => String::new(),
    }
}

impl CodecError {
    /// Attach a column index to a cell-level error that does not carry one.
    pub fn with_column(mut self, idx: usize) -> Self {
        match &mut self {
            CodecError::TruncatedInput { column, .. }
            | CodecError::InvalidDecimalEncoding { column, .. }
            | CodecError::InvalidValue { column, .. } => {
                if column.is_none() {
                    *column = Some(idx);
                }
            }
            _ => {}
        }
        self
    }

    pub(crate) fn short(offset: usize, needed: usize, available: usize) -> Self {
        CodecError::TruncatedInput {
            offset,
            column: None,
            kind: Truncation::Short { needed, available },
        }
    }

    pub(crate) fn trailing(offset: usize, remaining: usize) -> Self {
        CodecError::TruncatedInput {
            offset,
            column: None,
            kind: Truncation::Trailing { remaining },
        }
    }

    pub(crate) fn decimal(offset: usize, reason: impl Into<String>) -> Self {
        CodecError::InvalidDecimalEncoding {
            offset,
            column: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn value(offset: usize, reason: impl Into<String>) -> Self {
        CodecError::InvalidValue {
            offset,
            column: None,
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "python")]
impl From<CodecError> for pyo3::PyErr {
    fn from(err: CodecError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyKeyError, PyRuntimeError, PyValueError};
        match err {
            CodecError::UnrecognizedSetting { .. } | CodecError::InvalidValue { .. } => {
                PyValueError::new_err(err.to_string())
            }
            CodecError::NotFound(_) => PyKeyError::new_err(err.to_string()),
            _ => PyRuntimeError::new_err(err.to_string()),
        }
    }
}

pub type CodecResult<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_column_stamps_once() {
        let err = CodecError::short(10, 4, 2).with_column(3).with_column(7);
        match err {
            CodecError::TruncatedInput { column, offset, .. } => {
                assert_eq!(column, Some(3));
                assert_eq!(offset, 10);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_display_includes_context() {
        let err = CodecError::short(12, 4, 1).with_column(2);
        assert_eq!(
            err.to_string(),
            "Truncated input at offset 12 (column 2): needed 4 bytes, 1 available"
        );

        let err = CodecError::UnrecognizedSetting {
            field: SettingField::RowShape,
            bits: 0x03,
        };
        assert_eq!(
            err.to_string(),
            "Unrecognized row shape setting: 0x00000003"
        );
    }
}
