//! Encoder configuration: settings, strategy resolution and the decode entry points.
//!
//! An [`Encoder`] is built once per cursor. Its settings integer selects the
//! row shape, item strategy and decimal strategy; these resolve to a fixed set
//! of decode functions that every later call reuses.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::error::{CodecError, CodecResult, SettingField};
use crate::wire::columns::Columns;
use crate::wire::convert::{
    decimal_to_decimal, decimal_to_float, decimal_to_string, unpack_item_as_str,
    unpack_item_with_builtin_types, unpack_item_with_domain_types, DecimalFn, ItemFn,
};
use crate::wire::cursor::{Cursor, LengthWidth};
use crate::wire::pack;
use crate::wire::stmt_info;
use crate::wire::types::Value;
use crate::wire::unpack::{
    self, unpack_row_dict, unpack_row_list, unpack_row_raw, unpack_row_str, unpack_rows_raw, Row,
    RowContext, RowFn, RowsFn,
};

pub const DEFAULT_DELIMITER: &str = "|";
pub const DEFAULT_NULL_STR: &str = "NULL";

// ============================================================================
// Settings
// ============================================================================

/// Settings bitmask with three independent one-hot fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Settings(pub u32);

impl Settings {
    pub const ROW_ENCODING_MASK: u32 = 0x0000_00FF;
    pub const ROW_ENCODING_STRING: u32 = 0x0000_0001;
    pub const ROW_ENCODING_DICT: u32 = 0x0000_0002;
    pub const ROW_ENCODING_LIST: u32 = 0x0000_0004;
    pub const ROW_ENCODING_RAW: u32 = 0x0000_0008;

    pub const ITEM_ENCODING_MASK: u32 = 0x0000_FF00;
    pub const ITEM_ENCODING_STRING: u32 = 0x0000_0100;
    pub const ITEM_ENCODING_BUILTIN_TYPES: u32 = 0x0000_0200;
    pub const ITEM_ENCODING_DOMAIN_TYPES: u32 = 0x0000_0400;

    pub const DECIMAL_RETURN_MASK: u32 = 0x00FF_0000;
    pub const DECIMAL_AS_STRING: u32 = 0x0001_0000;
    pub const DECIMAL_AS_FLOAT: u32 = 0x0002_0000;
    pub const DECIMAL_AS_DECIMAL: u32 = 0x0004_0000;

    /// Sentinel meaning "use the defaults".
    pub const UNSET: Settings = Settings(0);

    pub const DEFAULT: Settings = Settings(
        Self::ROW_ENCODING_DICT | Self::ITEM_ENCODING_BUILTIN_TYPES | Self::DECIMAL_AS_STRING,
    );

    pub fn new(row: RowShape, item: ItemStrategy, decimal: DecimalStrategy) -> Self {
        Settings(row.bits() | item.bits() | decimal.bits())
    }

    /// Split into the three fields, validating each independently.
    pub fn decode(self) -> CodecResult<(RowShape, ItemStrategy, DecimalStrategy)> {
        let settings = if self == Self::UNSET { Self::DEFAULT } else { self };
        let bits = settings.0;

        let reserved = bits
            & !(Self::ROW_ENCODING_MASK | Self::ITEM_ENCODING_MASK | Self::DECIMAL_RETURN_MASK);
        if reserved != 0 {
            return Err(CodecError::UnrecognizedSetting {
                field: SettingField::Reserved,
                bits: reserved,
            });
        }

        Ok((
            RowShape::from_bits(bits & Self::ROW_ENCODING_MASK)?,
            ItemStrategy::from_bits(bits & Self::ITEM_ENCODING_MASK)?,
            DecimalStrategy::from_bits(bits & Self::DECIMAL_RETURN_MASK)?,
        ))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings::DEFAULT
    }
}

impl From<u32> for Settings {
    fn from(bits: u32) -> Self {
        Settings(bits)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowShape {
    /// Delimited text line.
    Text,
    /// Column name to value.
    Map,
    /// Positional values.
    List,
    /// Undecoded row bytes.
    Raw,
}

impl RowShape {
    pub fn from_bits(bits: u32) -> CodecResult<Self> {
        match bits {
            Settings::ROW_ENCODING_STRING => Ok(RowShape::Text),
            Settings::ROW_ENCODING_DICT => Ok(RowShape::Map),
            Settings::ROW_ENCODING_LIST => Ok(RowShape::List),
            Settings::ROW_ENCODING_RAW => Ok(RowShape::Raw),
            _ => Err(CodecError::UnrecognizedSetting {
                field: SettingField::RowShape,
                bits,
            }),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            RowShape::Text => Settings::ROW_ENCODING_STRING,
            RowShape::Map => Settings::ROW_ENCODING_DICT,
            RowShape::List => Settings::ROW_ENCODING_LIST,
            RowShape::Raw => Settings::ROW_ENCODING_RAW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemStrategy {
    /// Every value as text.
    String,
    /// Native Rust types.
    BuiltinTypes,
    /// Lossless domain types (typed times and timestamps).
    DomainTypes,
}

impl ItemStrategy {
    pub fn from_bits(bits: u32) -> CodecResult<Self> {
        match bits {
            Settings::ITEM_ENCODING_STRING => Ok(ItemStrategy::String),
            Settings::ITEM_ENCODING_BUILTIN_TYPES => Ok(ItemStrategy::BuiltinTypes),
            Settings::ITEM_ENCODING_DOMAIN_TYPES => Ok(ItemStrategy::DomainTypes),
            _ => Err(CodecError::UnrecognizedSetting {
                field: SettingField::ItemStrategy,
                bits,
            }),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            ItemStrategy::String => Settings::ITEM_ENCODING_STRING,
            ItemStrategy::BuiltinTypes => Settings::ITEM_ENCODING_BUILTIN_TYPES,
            ItemStrategy::DomainTypes => Settings::ITEM_ENCODING_DOMAIN_TYPES,
        }
    }

    fn resolve(self) -> ItemFn {
        match self {
            ItemStrategy::String => unpack_item_as_str,
            ItemStrategy::BuiltinTypes => unpack_item_with_builtin_types,
            ItemStrategy::DomainTypes => unpack_item_with_domain_types,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecimalStrategy {
    String,
    Float,
    Decimal,
}

impl DecimalStrategy {
    pub fn from_bits(bits: u32) -> CodecResult<Self> {
        match bits {
            Settings::DECIMAL_AS_STRING => Ok(DecimalStrategy::String),
            Settings::DECIMAL_AS_FLOAT => Ok(DecimalStrategy::Float),
            Settings::DECIMAL_AS_DECIMAL => Ok(DecimalStrategy::Decimal),
            _ => Err(CodecError::UnrecognizedSetting {
                field: SettingField::DecimalStrategy,
                bits,
            }),
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            DecimalStrategy::String => Settings::DECIMAL_AS_STRING,
            DecimalStrategy::Float => Settings::DECIMAL_AS_FLOAT,
            DecimalStrategy::Decimal => Settings::DECIMAL_AS_DECIMAL,
        }
    }

    fn resolve(self) -> DecimalFn {
        match self {
            DecimalStrategy::String => decimal_to_string,
            DecimalStrategy::Float => decimal_to_float,
            DecimalStrategy::Decimal => decimal_to_decimal,
        }
    }
}

/// Prefix widths of the wire formats this encoder reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WireLayout {
    /// Width of the column count in statement info.
    pub count_width: LengthWidth,
    /// Width of each row's length prefix in a row stream.
    pub row_length_width: LengthWidth,
}

/// Decode functions resolved from settings.
#[derive(Debug, Clone, Copy)]
struct Strategies {
    rows: RowsFn,
    row: RowFn,
    item: ItemFn,
    decimal: DecimalFn,
}

// ============================================================================
// Encoder
// ============================================================================

/// Decoder state for one statement/cursor.
///
/// Decoding borrows the encoder immutably; reconfiguring needs `&mut`, so a
/// setter can never race an in-flight decode.
#[derive(Debug, Clone)]
pub struct Encoder {
    columns: Columns,
    settings: Settings,
    row_shape: RowShape,
    item_strategy: ItemStrategy,
    decimal_strategy: DecimalStrategy,
    strategies: Strategies,
    delimiter: String,
    null_value: Option<String>,
    layout: WireLayout,
}

impl Encoder {
    /// An encoder with no columns. `Settings::UNSET` selects the defaults.
    pub fn new(settings: impl Into<Settings>) -> CodecResult<Self> {
        Self::with_columns(Columns::default(), settings)
    }

    pub fn with_columns(columns: Columns, settings: impl Into<Settings>) -> CodecResult<Self> {
        let settings = settings.into();
        let (row_shape, item_strategy, decimal_strategy) = settings.decode()?;
        let mut encoder = Self {
            columns,
            settings,
            row_shape,
            item_strategy,
            decimal_strategy,
            strategies: Self::resolve(row_shape, item_strategy, decimal_strategy),
            delimiter: DEFAULT_DELIMITER.to_string(),
            null_value: None,
            layout: WireLayout::default(),
        };
        encoder.apply_shape_defaults();
        encoder.log_resolved();
        Ok(encoder)
    }

    pub fn with_layout(mut self, layout: WireLayout) -> Self {
        self.layout = layout;
        self
    }

    fn resolve(
        row_shape: RowShape,
        item_strategy: ItemStrategy,
        decimal_strategy: DecimalStrategy,
    ) -> Strategies {
        let (rows, row): (RowsFn, RowFn) = match row_shape {
            RowShape::Text => (unpack::unpack_rows, unpack_row_str),
            RowShape::Map => (unpack::unpack_rows, unpack_row_dict),
            RowShape::List => (unpack::unpack_rows, unpack_row_list),
            RowShape::Raw => (unpack_rows_raw, unpack_row_raw),
        };
        Strategies {
            rows,
            row,
            item: item_strategy.resolve(),
            decimal: decimal_strategy.resolve(),
        }
    }

    fn apply_shape_defaults(&mut self) {
        match self.row_shape {
            RowShape::Text => {
                self.delimiter = DEFAULT_DELIMITER.to_string();
                self.null_value = Some(DEFAULT_NULL_STR.to_string());
            }
            RowShape::Map | RowShape::List => self.null_value = None,
            RowShape::Raw => {}
        }
    }

    /// Re-resolve the strategy set. On error the encoder is left unchanged.
    ///
    /// Resets the delimiter and null marker to the new shape's defaults.
    pub fn set_encoding(&mut self, settings: impl Into<Settings>) -> CodecResult<()> {
        let settings = settings.into();
        let (row_shape, item_strategy, decimal_strategy) = settings.decode()?;
        self.settings = settings;
        self.row_shape = row_shape;
        self.item_strategy = item_strategy;
        self.decimal_strategy = decimal_strategy;
        self.strategies = Self::resolve(row_shape, item_strategy, decimal_strategy);
        self.apply_shape_defaults();
        self.log_resolved();
        Ok(())
    }

    fn log_resolved(&self) {
        tracing::debug!(
            settings = self.settings.0,
            row_shape = ?self.row_shape,
            item_strategy = ?self.item_strategy,
            decimal_strategy = ?self.decimal_strategy,
            "resolved encoder settings"
        );
    }

    pub fn set_delimiter(&mut self, delimiter: impl Into<String>) {
        self.delimiter = delimiter.into();
    }

    /// Marker used for NULL cells; `None` yields `Value::Null` in structured
    /// shapes and an empty field in text rows.
    pub fn set_null(&mut self, null_value: Option<&str>) {
        self.null_value = null_value.map(str::to_string);
    }

    /// Replace the schema wholesale.
    pub fn set_columns(&mut self, columns: Columns) {
        tracing::debug!(columns = columns.len(), "installed column schema");
        self.columns = columns;
    }

    /// Drop the schema.
    pub fn clear(&mut self) {
        self.columns = Columns::default();
    }

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn settings(&self) -> Settings {
        self.settings
    }

    pub fn row_shape(&self) -> RowShape {
        self.row_shape
    }

    pub fn item_strategy(&self) -> ItemStrategy {
        self.item_strategy
    }

    pub fn decimal_strategy(&self) -> DecimalStrategy {
        self.decimal_strategy
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn null_value(&self) -> Option<&str> {
        self.null_value.as_deref()
    }

    pub fn layout(&self) -> WireLayout {
        self.layout
    }

    fn context(&self) -> RowContext<'_> {
        RowContext {
            columns: &self.columns,
            item: self.strategies.item,
            decimal: self.strategies.decimal,
            delimiter: &self.delimiter,
            null_value: self.null_value.as_deref(),
        }
    }

    /// Decode statement info and install it as this encoder's schema.
    /// On error the previous schema is kept.
    pub fn unpack_stmt_info(&mut self, data: &[u8]) -> CodecResult<&Columns> {
        let columns = stmt_info::unpack_stmt_info(data, self.layout.count_width)?;
        self.set_columns(columns);
        Ok(&self.columns)
    }

    /// Decode one row's bytes (without a length prefix).
    pub fn unpack_row(&self, data: &[u8]) -> CodecResult<Row> {
        (self.strategies.row)(&self.context(), &mut Cursor::new(data))
    }

    /// Decode a batch of length-prefixed rows.
    pub fn unpack_rows(&self, data: &[u8]) -> CodecResult<Vec<Row>> {
        (self.strategies.rows)(
            &self.context(),
            self.strategies.row,
            data,
            self.layout.row_length_width,
        )
    }

    pub fn count_rows(&self, data: &[u8]) -> CodecResult<usize> {
        unpack::count_rows(data, self.layout.row_length_width)
    }

    pub fn pack_stmt_info(&self) -> CodecResult<BytesMut> {
        stmt_info::pack_stmt_info(&self.columns, self.layout.count_width)
    }

    pub fn pack_row(&self, values: &[Value]) -> CodecResult<BytesMut> {
        pack::pack_row(&self.columns, values)
    }

    pub fn pack_rows<I, R>(&self, rows: I) -> CodecResult<BytesMut>
    where
        I: IntoIterator<Item = R>,
        R: AsRef<[Value]>,
    {
        pack::pack_rows(&self.columns, rows, self.layout.row_length_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_selects_defaults() {
        let encoder = Encoder::new(Settings::UNSET).unwrap();
        assert_eq!(encoder.row_shape(), RowShape::Map);
        assert_eq!(encoder.item_strategy(), ItemStrategy::BuiltinTypes);
        assert_eq!(encoder.decimal_strategy(), DecimalStrategy::String);
        assert_eq!(encoder.null_value(), None);
    }

    #[test]
    fn test_fields_decode_independently() {
        let settings = Settings::new(RowShape::List, ItemStrategy::DomainTypes, DecimalStrategy::Float);
        assert_eq!(
            settings.decode().unwrap(),
            (RowShape::List, ItemStrategy::DomainTypes, DecimalStrategy::Float)
        );
    }

    #[test]
    fn test_unrecognized_fields() {
        // Two row shapes at once
        let bits = Settings::ROW_ENCODING_STRING
            | Settings::ROW_ENCODING_LIST
            | Settings::ITEM_ENCODING_STRING
            | Settings::DECIMAL_AS_STRING;
        assert_eq!(
            Encoder::new(bits).unwrap_err(),
            CodecError::UnrecognizedSetting {
                field: SettingField::RowShape,
                bits: 0x05
            }
        );

        // Missing item strategy
        let bits = Settings::ROW_ENCODING_DICT | Settings::DECIMAL_AS_FLOAT;
        assert!(matches!(
            Encoder::new(bits),
            Err(CodecError::UnrecognizedSetting {
                field: SettingField::ItemStrategy,
                ..
            })
        ));

        // Bad decimal field
        let bits = Settings::ROW_ENCODING_DICT | Settings::ITEM_ENCODING_STRING | 0x0008_0000;
        assert!(matches!(
            Encoder::new(bits),
            Err(CodecError::UnrecognizedSetting {
                field: SettingField::DecimalStrategy,
                ..
            })
        ));

        // Reserved high bits
        let bits = Settings::DEFAULT.0 | 0x0100_0000;
        assert!(matches!(
            Encoder::new(bits),
            Err(CodecError::UnrecognizedSetting {
                field: SettingField::Reserved,
                ..
            })
        ));
    }

    #[test]
    fn test_set_encoding_failure_keeps_state() {
        let mut encoder = Encoder::new(Settings::DEFAULT).unwrap();
        encoder.set_null(Some("-"));
        assert!(encoder.set_encoding(0xFFu32).is_err());
        assert_eq!(encoder.row_shape(), RowShape::Map);
        assert_eq!(encoder.null_value(), Some("-"));
    }

    #[test]
    fn test_shape_defaults_on_resolve() {
        let text = Settings::new(RowShape::Text, ItemStrategy::String, DecimalStrategy::String);
        let mut encoder = Encoder::new(text).unwrap();
        assert_eq!(encoder.delimiter(), DEFAULT_DELIMITER);
        assert_eq!(encoder.null_value(), Some(DEFAULT_NULL_STR));

        encoder.set_delimiter("\t");
        encoder.set_null(Some(""));
        assert_eq!(encoder.delimiter(), "\t");

        // Raw keeps whatever was configured
        encoder
            .set_encoding(Settings::new(
                RowShape::Raw,
                ItemStrategy::String,
                DecimalStrategy::String,
            ))
            .unwrap();
        assert_eq!(encoder.delimiter(), "\t");
        assert_eq!(encoder.null_value(), Some(""));

        encoder.set_encoding(Settings::DEFAULT).unwrap();
        assert_eq!(encoder.null_value(), None);
    }

    #[test]
    fn test_wire_layout_from_config() {
        let layout: WireLayout =
            serde_json::from_str(r#"{"count_width": "u32", "row_length_width": "u16"}"#).unwrap();
        assert_eq!(layout.count_width, LengthWidth::U32);
        assert_eq!(layout.row_length_width, LengthWidth::U16);

        let layout: WireLayout = serde_json::from_str("{}").unwrap();
        assert_eq!(layout, WireLayout::default());
    }
}
