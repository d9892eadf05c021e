//! Column schema for a prepared statement's result set.

use std::collections::HashMap;
use std::ops::Index;

use serde::Serialize;

use super::types::{decimal_width, packed_width, DataType, TypeCode};
use crate::error::{CodecError, CodecResult};

/// One result column as described by statement info.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    /// Raw wire code, kept so the schema can be written back unchanged.
    #[serde(skip)]
    pub type_code: TypeCode,
    pub data_type: DataType,
    /// Bytes the value occupies on the wire. For variable types this is the
    /// declared maximum, excluding the length prefix.
    pub length: usize,
    /// Digits, for decimal types. Zero otherwise.
    pub precision: u16,
    pub scale: u8,
    pub nullable: bool,
    /// 1-based position in the result set.
    pub position: usize,
    pub default: Option<String>,
    pub format: Option<String>,
}

impl Column {
    /// A column of the given type. `length` is the precision for decimal
    /// types and the byte width for everything else; widths of fixed
    /// numeric types come from the type.
    pub fn new(name: impl Into<String>, data_type: DataType, length: u16, scale: u8) -> Self {
        let (precision, width) = match data_type {
            DataType::Decimal => (length, decimal_width(length)),
            DataType::PackedDecimal => (length, packed_width(length)),
            _ => (0, data_type.natural_width().unwrap_or(length as usize)),
        };
        Self {
            name: name.into(),
            type_code: data_type.code(true),
            data_type,
            length: width,
            precision,
            scale,
            nullable: true,
            position: 0,
            default: None,
            format: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self.type_code = self.data_type.code(false);
        self
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// The `length` field as carried in statement info.
    pub fn declared_length(&self) -> usize {
        if self.data_type.is_decimal() {
            self.precision as usize
        } else {
            self.length
        }
    }
}

/// Ordered columns plus a name index.
///
/// Built once per statement and replaced wholesale; never edited.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Columns {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
}

impl Columns {
    /// Positions are assigned from wire order. With duplicate names the
    /// last occurrence wins for lookup.
    pub fn new(columns: Vec<Column>) -> Self {
        let mut columns = columns;
        let mut index = HashMap::with_capacity(columns.len());
        for (i, column) in columns.iter_mut().enumerate() {
            column.position = i + 1;
            index.insert(column.name.clone(), i);
        }
        Self { columns, index }
    }

    /// Zero-based index of the column with this name.
    pub fn lookup(&self, name: &str) -> CodecResult<usize> {
        self.index
            .get(name)
            .copied()
            .ok_or_else(|| CodecError::NotFound(name.to_string()))
    }

    pub fn get(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Column> {
        self.columns.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Size of the NULL-indicator prefix of each row.
    #[inline]
    pub fn indicator_len(&self) -> usize {
        self.columns.len().div_ceil(8)
    }
}

impl Index<usize> for Columns {
    type Output = Column;

    fn index(&self, idx: usize) -> &Column {
        &self.columns[idx]
    }
}

impl<'a> IntoIterator for &'a Columns {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

impl FromIterator<Column> for Columns {
    fn from_iter<I: IntoIterator<Item = Column>>(iter: I) -> Self {
        Columns::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positions_and_lookup() {
        let columns = Columns::new(vec![
            Column::new("id", DataType::Integer, 4, 0).not_null(),
            Column::new("name", DataType::VarChar, 30, 0),
        ]);

        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].position, 1);
        assert_eq!(columns[1].position, 2);
        assert_eq!(columns.lookup("name").unwrap(), 1);
        assert_eq!(
            columns.lookup("missing"),
            Err(CodecError::NotFound("missing".to_string()))
        );
        assert_eq!(columns.names(), vec!["id", "name"]);
    }

    #[test]
    fn test_duplicate_names_last_wins() {
        let columns = Columns::new(vec![
            Column::new("a", DataType::Integer, 4, 0),
            Column::new("a", DataType::SmallInt, 2, 0),
        ]);
        assert_eq!(columns.lookup("a").unwrap(), 1);
    }

    #[test]
    fn test_empty_schema() {
        let columns = Columns::new(Vec::new());
        assert!(columns.is_empty());
        assert_eq!(columns.indicator_len(), 0);
    }

    #[test]
    fn test_widths_from_type() {
        let dec = Column::new("amount", DataType::Decimal, 18, 2);
        assert_eq!(dec.length, 8);
        assert_eq!(dec.precision, 18);
        assert_eq!(dec.declared_length(), 18);

        let packed = Column::new("p", DataType::PackedDecimal, 7, 2);
        assert_eq!(packed.length, 4);

        let int = Column::new("n", DataType::Integer, 99, 0);
        assert_eq!(int.length, 4);

        assert_eq!(
            (0..9).map(|i| Column::new(i.to_string(), DataType::ByteInt, 1, 0))
                .collect::<Columns>()
                .indicator_len(),
            2
        );
    }
}
