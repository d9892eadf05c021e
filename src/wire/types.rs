//! Wire type codes, decoded values and decimal unpacking.
//!
//! All integers on the wire are little-endian. Type codes come in pairs:
//! the even code is the NOT NULL variant and the odd code is nullable.

use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Serialize, Serializer};
use smallvec::SmallVec;

use crate::error::{CodecError, CodecResult};

/// Largest decimal precision the protocol carries; fits an `i128`.
pub const MAX_DECIMAL_PRECISION: u16 = 38;

// ============================================================================
// Type Codes
// ============================================================================

/// Raw wire type code as it appears in statement info.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeCode(pub u16);

impl TypeCode {
    // Variable-length character
    pub const VARCHAR_NN: TypeCode = TypeCode(448);
    pub const VARCHAR_N: TypeCode = TypeCode(449);
    pub const CHAR_NN: TypeCode = TypeCode(452);
    pub const CHAR_N: TypeCode = TypeCode(453);
    pub const LONG_VARCHAR_NN: TypeCode = TypeCode(456);
    pub const LONG_VARCHAR_N: TypeCode = TypeCode(457);

    // Numeric
    pub const FLOAT_NN: TypeCode = TypeCode(480);
    pub const FLOAT_N: TypeCode = TypeCode(481);
    pub const DECIMAL_NN: TypeCode = TypeCode(484);
    pub const DECIMAL_N: TypeCode = TypeCode(485);
    pub const INTEGER_NN: TypeCode = TypeCode(496);
    pub const INTEGER_N: TypeCode = TypeCode(497);
    pub const SMALLINT_NN: TypeCode = TypeCode(500);
    pub const SMALLINT_N: TypeCode = TypeCode(501);
    pub const BIGINT_NN: TypeCode = TypeCode(600);
    pub const BIGINT_N: TypeCode = TypeCode(601);
    pub const BYTEINT_NN: TypeCode = TypeCode(756);
    pub const BYTEINT_N: TypeCode = TypeCode(757);
    pub const PACKED_DECIMAL_NN: TypeCode = TypeCode(1536);
    pub const PACKED_DECIMAL_N: TypeCode = TypeCode(1537);

    // Binary
    pub const VARBYTE_NN: TypeCode = TypeCode(688);
    pub const VARBYTE_N: TypeCode = TypeCode(689);
    pub const BYTE_NN: TypeCode = TypeCode(692);
    pub const BYTE_N: TypeCode = TypeCode(693);

    // Date/time
    pub const DATE_NN: TypeCode = TypeCode(752);
    pub const DATE_N: TypeCode = TypeCode(753);
    pub const TIME_NN: TypeCode = TypeCode(760);
    pub const TIME_N: TypeCode = TypeCode(761);
    pub const TIMESTAMP_NN: TypeCode = TypeCode(764);
    pub const TIMESTAMP_N: TypeCode = TypeCode(765);

    /// The data type this code selects, or `None` if unrecognized.
    pub fn data_type(self) -> Option<DataType> {
        let ty = match self.0 & !1 {
            448 => DataType::VarChar,
            452 => DataType::Char,
            456 => DataType::LongVarChar,
            480 => DataType::Float,
            484 => DataType::Decimal,
            496 => DataType::Integer,
            500 => DataType::SmallInt,
            600 => DataType::BigInt,
            756 => DataType::ByteInt,
            1536 => DataType::PackedDecimal,
            688 => DataType::VarByte,
            692 => DataType::Byte,
            752 => DataType::Date,
            760 => DataType::Time,
            764 => DataType::Timestamp,
            _ => return None,
        };
        Some(ty)
    }

    /// Odd codes are the nullable variants.
    #[inline]
    pub fn is_nullable_variant(self) -> bool {
        self.0 & 1 == 1
    }
}

/// Wire layout family selected by a type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    ByteInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    /// Two's complement scaled integer.
    Decimal,
    /// BCD digits with a trailing sign nibble.
    PackedDecimal,
    Char,
    VarChar,
    LongVarChar,
    Byte,
    VarByte,
    Date,
    Time,
    Timestamp,
}

impl DataType {
    /// Wire type code for this type.
    pub fn code(self, nullable: bool) -> TypeCode {
        let base = match self {
            DataType::VarChar => 448,
            DataType::Char => 452,
            DataType::LongVarChar => 456,
            DataType::Float => 480,
            DataType::Decimal => 484,
            DataType::Integer => 496,
            DataType::SmallInt => 500,
            DataType::BigInt => 600,
            DataType::ByteInt => 756,
            DataType::PackedDecimal => 1536,
            DataType::VarByte => 688,
            DataType::Byte => 692,
            DataType::Date => 752,
            DataType::Time => 760,
            DataType::Timestamp => 764,
        };
        TypeCode(base | nullable as u16)
    }

    /// Byte width fixed by the type itself, independent of the declared length.
    pub fn natural_width(self) -> Option<usize> {
        match self {
            DataType::ByteInt => Some(1),
            DataType::SmallInt => Some(2),
            DataType::Integer | DataType::Date => Some(4),
            DataType::BigInt | DataType::Float => Some(8),
            _ => None,
        }
    }

    /// Types carried as a `u16` length prefix plus bytes.
    #[inline]
    pub fn is_variable(self) -> bool {
        matches!(
            self,
            DataType::VarChar | DataType::LongVarChar | DataType::VarByte
        )
    }

    #[inline]
    pub fn is_decimal(self) -> bool {
        matches!(self, DataType::Decimal | DataType::PackedDecimal)
    }

    #[inline]
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::ByteInt | DataType::SmallInt | DataType::Integer | DataType::BigInt
        )
    }

    #[inline]
    pub fn is_text_like(self) -> bool {
        matches!(
            self,
            DataType::Char | DataType::VarChar | DataType::LongVarChar
        )
    }
}

/// Byte width of a binary `DECIMAL` of the given precision.
pub fn decimal_width(precision: u16) -> usize {
    match precision {
        0..=2 => 1,
        3..=4 => 2,
        5..=9 => 4,
        10..=18 => 8,
        _ => 16,
    }
}

/// Byte width of a packed decimal of the given precision.
#[inline]
pub fn packed_width(precision: u16) -> usize {
    precision as usize / 2 + 1
}

// ============================================================================
// Decimals
// ============================================================================

/// Exact fixed-point value: `unscaled / 10^scale`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    pub unscaled: i128,
    pub scale: u8,
}

impl Decimal {
    pub fn new(unscaled: i128, scale: u8) -> Self {
        Self { unscaled, scale }
    }

    /// Nearest `f64`, via the exact decimal string so rounding happens once.
    pub fn to_f64(self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }

    /// The same value at another scale, or `None` if digits would be lost
    /// or the result overflows.
    pub fn rescale(self, scale: u8) -> Option<Decimal> {
        if scale >= self.scale {
            let factor = 10i128.checked_pow(u32::from(scale - self.scale))?;
            Some(Decimal::new(self.unscaled.checked_mul(factor)?, scale))
        } else {
            let factor = 10i128.checked_pow(u32::from(self.scale - scale))?;
            if self.unscaled % factor != 0 {
                return None;
            }
            Some(Decimal::new(self.unscaled / factor, scale))
        }
    }

    /// Number of significant digits in the unscaled value.
    pub fn digit_count(self) -> usize {
        let mut n = self.unscaled.unsigned_abs();
        let mut count = 1;
        while n >= 10 {
            n /= 10;
            count += 1;
        }
        count
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DecimalParts::from_unscaled(self.unscaled, self.scale).fmt(f)
    }
}

impl std::str::FromStr for Decimal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (int_part, frac_part) = body.split_once('.').unwrap_or((body, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(format!("invalid decimal literal: {s:?}"));
        }
        let scale = u8::try_from(frac_part.len())
            .map_err(|_| format!("scale too large: {s:?}"))?;
        let mut unscaled: i128 = 0;
        for b in int_part.bytes().chain(frac_part.bytes()) {
            if !b.is_ascii_digit() {
                return Err(format!("invalid decimal literal: {s:?}"));
            }
            unscaled = unscaled
                .checked_mul(10)
                .and_then(|v| v.checked_add(i128::from(b - b'0')))
                .ok_or_else(|| format!("decimal out of range: {s:?}"))?;
        }
        Ok(Decimal::new(if negative { -unscaled } else { unscaled }, scale))
    }
}

impl Serialize for Decimal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Sign, digits (most significant first) and scale of a wire decimal.
///
/// Both decimal encodings unpack into this form; every decimal output
/// strategy is a projection of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalParts {
    pub negative: bool,
    pub digits: SmallVec<[u8; 64]>,
    pub scale: u8,
}

impl DecimalParts {
    pub fn from_unscaled(unscaled: i128, scale: u8) -> Self {
        let mut digits: SmallVec<[u8; 64]> = SmallVec::new();
        let mut n = unscaled.unsigned_abs();
        loop {
            digits.push((n % 10) as u8);
            n /= 10;
            if n == 0 {
                break;
            }
        }
        digits.reverse();
        Self {
            negative: unscaled < 0,
            digits,
            scale,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.digits.iter().all(|&d| d == 0)
    }

    /// Exact fixed-point value. Both unpack routines reject more than 38
    /// digits, so the accumulation cannot overflow.
    pub fn to_decimal(&self) -> Decimal {
        let magnitude = self
            .digits
            .iter()
            .fold(0i128, |acc, &d| acc * 10 + i128::from(d));
        let unscaled = if self.negative { -magnitude } else { magnitude };
        Decimal::new(unscaled, self.scale)
    }

    pub fn to_f64(&self) -> f64 {
        self.to_string().parse().unwrap_or(f64::NAN)
    }
}

impl fmt::Display for DecimalParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = self.scale as usize;
        // Strip leading zeros but keep enough digits to fill the scale plus one.
        let first_significant = self
            .digits
            .iter()
            .position(|&d| d != 0)
            .unwrap_or(self.digits.len());
        let keep_from = first_significant.min(self.digits.len().saturating_sub(scale + 1));
        let digits = &self.digits[keep_from..];

        let mut out = String::with_capacity(digits.len() + scale + 3);
        if self.negative && !self.is_zero() {
            out.push('-');
        }
        let int_len = digits.len().saturating_sub(scale);
        if int_len == 0 {
            out.push('0');
        }
        for &d in &digits[..int_len] {
            out.push(char::from(b'0' + d));
        }
        if scale > 0 {
            out.push('.');
            for _ in digits.len()..scale {
                out.push('0');
            }
            for &d in &digits[int_len..] {
                out.push(char::from(b'0' + d));
            }
        }
        f.write_str(&out)
    }
}

/// Unpack a two's complement little-endian decimal of `bytes.len()` bytes.
/// Values with more digits than `precision` are rejected.
pub fn unpack_binary_decimal(
    bytes: &[u8],
    precision: u16,
    scale: u8,
    offset: usize,
) -> CodecResult<DecimalParts> {
    let unscaled = match bytes.len() {
        1 => i128::from(bytes[0] as i8),
        2 => i128::from(i16::from_le_bytes([bytes[0], bytes[1]])),
        4 => i128::from(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(bytes);
            i128::from(i64::from_le_bytes(raw))
        }
        16 => {
            let mut raw = [0u8; 16];
            raw.copy_from_slice(bytes);
            i128::from_le_bytes(raw)
        }
        n => {
            return Err(CodecError::decimal(
                offset,
                format!("unsupported decimal width {}", n),
            ))
        }
    };
    let parts = DecimalParts::from_unscaled(unscaled, scale);
    let limit = precision.min(MAX_DECIMAL_PRECISION) as usize;
    if parts.digits.len() > limit {
        return Err(CodecError::decimal(
            offset,
            format!(
                "{} digits exceed precision {}",
                parts.digits.len(),
                precision
            ),
        ));
    }
    Ok(parts)
}

/// Unpack a packed (BCD) decimal: digits high nibble first, the final low
/// nibble is the sign. `0xB`/`0xD` mark negative values, `0xA`/`0xC`/`0xE`/`0xF`
/// positive ones. With an even precision the leading nibble is padding and
/// must be zero.
pub fn unpack_packed_decimal(
    bytes: &[u8],
    precision: u16,
    scale: u8,
    offset: usize,
) -> CodecResult<DecimalParts> {
    if precision == 0 || precision > MAX_DECIMAL_PRECISION {
        return Err(CodecError::decimal(
            offset,
            format!("unsupported precision {}", precision),
        ));
    }
    if bytes.len() != packed_width(precision) {
        return Err(CodecError::decimal(
            offset,
            format!(
                "expected {} bytes for precision {}, got {}",
                packed_width(precision),
                precision,
                bytes.len()
            ),
        ));
    }

    let nibble_count = bytes.len() * 2;
    let nibble = |i: usize| -> u8 {
        let b = bytes[i / 2];
        if i % 2 == 0 {
            b >> 4
        } else {
            b & 0x0F
        }
    };

    let negative = match nibble(nibble_count - 1) {
        0xB | 0xD => true,
        0xA | 0xC | 0xE | 0xF => false,
        s => {
            return Err(CodecError::decimal(
                offset + bytes.len() - 1,
                format!("invalid sign nibble {:#x}", s),
            ))
        }
    };

    // Digit nibbles available minus the digits the precision allows.
    let pad = nibble_count - 1 - precision as usize;
    let mut digits: SmallVec<[u8; 64]> = SmallVec::with_capacity(precision as usize);
    for i in 0..nibble_count - 1 {
        let d = nibble(i);
        if d > 9 {
            return Err(CodecError::decimal(
                offset + i / 2,
                format!("invalid digit nibble {:#x}", d),
            ));
        }
        if i < pad {
            if d != 0 {
                return Err(CodecError::decimal(
                    offset,
                    format!("non-zero pad nibble {:#x}", d),
                ));
            }
            continue;
        }
        digits.push(d);
    }

    Ok(DecimalParts {
        negative,
        digits,
        scale,
    })
}

// ============================================================================
// Dates
// ============================================================================

/// Decode the integer date form `(year - 1900) * 10000 + month * 100 + day`.
pub fn date_from_wire(value: i32) -> Option<NaiveDate> {
    let year = value.div_euclid(10_000) + 1900;
    let mmdd = value.rem_euclid(10_000);
    NaiveDate::from_ymd_opt(year, (mmdd / 100) as u32, (mmdd % 100) as u32)
}

pub fn date_to_wire(date: NaiveDate) -> i32 {
    (date.year() - 1900) * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

pub fn parse_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim_end(), "%H:%M:%S%.f").ok()
}

pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim_end(), "%Y-%m-%d %H:%M:%S%.f").ok()
}

// ============================================================================
// Decoded Values
// ============================================================================

/// A decoded cell value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Decimal(d) => Some(d.to_f64()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }
}

/// Text form used by the delimited row shape. `Null` renders empty.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Text(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::Bytes(b) => {
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Time(t) => write!(f, "{}", t.format("%H:%M:%S%.f")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}
