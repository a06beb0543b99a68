//! Canonical text form of column values.
//!
//! The text profile is fixed and locale independent:
//!
//! | Type | Text |
//! |---|---|
//! | boolean | `true` / `false` |
//! | integers, decimal | plain digits, decimal keeps its scale |
//! | real, float | shortest round-trip form, `inf`, `-inf`, `NaN` |
//! | date | `YYYY-MM-DD` |
//! | time | `HH:MM:SS[.fraction]` |
//! | timestamp | `YYYY-MM-DD HH:MM:SS[.fraction]` |
//! | binary | Base64 of the bytes |
//! | object | Base64 of the bytes produced by the [`ObjectSerializer`] |

use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::core::{ColumnType, ObjectSerializer, RawBytesSerializer, SqlNullType, SqlValue};
use crate::error::{Result, TransferError};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S%.f";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";
const TIMESTAMP_FORMAT_ISO: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Converts typed values to and from their canonical text.
#[derive(Clone)]
pub struct ValueCodec {
    objects: Arc<dyn ObjectSerializer>,
}

impl Default for ValueCodec {
    fn default() -> Self {
        Self::new(Arc::new(RawBytesSerializer))
    }
}

impl std::fmt::Debug for ValueCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCodec").finish_non_exhaustive()
    }
}

impl ValueCodec {
    /// Create a codec using the given serializer for object columns.
    pub fn new(objects: Arc<dyn ObjectSerializer>) -> Self {
        Self { objects }
    }

    /// Encode a value of a column of type `column_type`. `None` for NULL.
    pub fn encode(&self, column_type: ColumnType, value: &SqlValue<'_>) -> Result<Option<String>> {
        if value.is_null() {
            return Ok(None);
        }
        if column_type == ColumnType::Object {
            let bytes = self.objects.to_bytes(value)?;
            return Ok(Some(BASE64.encode(bytes)));
        }

        let text = match value {
            SqlValue::Null(_) => return Ok(None),
            SqlValue::Bool(v) => v.to_string(),
            SqlValue::I16(v) => v.to_string(),
            SqlValue::I32(v) => v.to_string(),
            SqlValue::I64(v) => v.to_string(),
            SqlValue::F32(v) => v.to_string(),
            SqlValue::F64(v) => v.to_string(),
            SqlValue::Text(v) if column_type.is_binary() => BASE64.encode(v.as_bytes()),
            SqlValue::Text(v) => v.to_string(),
            SqlValue::Bytes(v) => BASE64.encode(v),
            SqlValue::Decimal(v) => v.to_plain_string(),
            SqlValue::DateTime(v) => v.format(TIMESTAMP_FORMAT).to_string(),
            SqlValue::Date(v) => v.format(DATE_FORMAT).to_string(),
            SqlValue::Time(v) => v.format(TIME_FORMAT).to_string(),
        };
        Ok(Some(text))
    }

    /// Decode the canonical text of a column of type `column_type`.
    pub fn decode(&self, column_type: ColumnType, text: &str) -> Result<SqlValue<'static>> {
        let value = match column_type {
            ColumnType::Boolean => SqlValue::Bool(parse_bool(text)?),
            ColumnType::TinyInt | ColumnType::SmallInt => SqlValue::I16(parse(column_type, text)?),
            ColumnType::Integer => SqlValue::I32(parse(column_type, text)?),
            ColumnType::BigInt => SqlValue::I64(parse(column_type, text)?),
            ColumnType::Decimal => SqlValue::Decimal(
                BigDecimal::from_str(text.trim()).map_err(|e| invalid(column_type, text, e))?,
            ),
            ColumnType::Real => SqlValue::F32(parse(column_type, text)?),
            ColumnType::Float => SqlValue::F64(parse(column_type, text)?),
            ColumnType::Char | ColumnType::Varchar | ColumnType::LongVarchar => {
                SqlValue::text_owned(text.to_string())
            }
            ColumnType::Date => SqlValue::Date(
                NaiveDate::parse_from_str(text.trim(), DATE_FORMAT)
                    .map_err(|e| invalid(column_type, text, e))?,
            ),
            ColumnType::Time => SqlValue::Time(
                NaiveTime::parse_from_str(text.trim(), TIME_FORMAT)
                    .map_err(|e| invalid(column_type, text, e))?,
            ),
            ColumnType::Timestamp => SqlValue::DateTime(parse_timestamp(text)?),
            ColumnType::Binary | ColumnType::Varbinary | ColumnType::LongVarbinary => {
                SqlValue::bytes_owned(BASE64.decode(text.trim())?)
            }
            ColumnType::Object => self.objects.from_bytes(BASE64.decode(text.trim())?)?,
        };
        Ok(value)
    }

    /// The NULL value matching a column type.
    pub fn null_for(column_type: ColumnType) -> SqlValue<'static> {
        let null_type = match column_type {
            ColumnType::Boolean => SqlNullType::Bool,
            ColumnType::TinyInt | ColumnType::SmallInt => SqlNullType::I16,
            ColumnType::Integer => SqlNullType::I32,
            ColumnType::BigInt => SqlNullType::I64,
            ColumnType::Decimal => SqlNullType::Decimal,
            ColumnType::Real => SqlNullType::F32,
            ColumnType::Float => SqlNullType::F64,
            ColumnType::Char | ColumnType::Varchar | ColumnType::LongVarchar => SqlNullType::String,
            ColumnType::Date => SqlNullType::Date,
            ColumnType::Time => SqlNullType::Time,
            ColumnType::Timestamp => SqlNullType::DateTime,
            ColumnType::Binary
            | ColumnType::Varbinary
            | ColumnType::LongVarbinary
            | ColumnType::Object => SqlNullType::Bytes,
        };
        SqlValue::Null(null_type)
    }
}

fn parse<T>(column_type: ColumnType, text: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse::<T>()
        .map_err(|e| invalid(column_type, text, e))
}

fn parse_bool(text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(ColumnType::Boolean, text, "expected true or false")),
    }
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    let trimmed = text.trim();
    NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT_ISO))
        .map_err(|e| invalid(ColumnType::Timestamp, text, e))
}

fn invalid(column_type: ColumnType, text: &str, reason: impl std::fmt::Display) -> TransferError {
    let shown: String = text.chars().take(64).collect();
    TransferError::format(format!(
        "invalid {:?} value '{}': {}",
        column_type, shown, reason
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(column_type: ColumnType, value: SqlValue<'static>) {
        let codec = ValueCodec::default();
        let text = codec.encode(column_type, &value).unwrap().unwrap();
        let decoded = codec.decode(column_type, &text).unwrap();
        assert_eq!(decoded, value, "{column_type:?} via '{text}'");
    }

    #[test]
    fn test_round_trip_all_types() {
        round_trip(ColumnType::Boolean, SqlValue::Bool(true));
        round_trip(ColumnType::SmallInt, SqlValue::I16(i16::MIN));
        round_trip(ColumnType::Integer, SqlValue::I32(i32::MAX));
        round_trip(ColumnType::BigInt, SqlValue::I64(-9_007_199_254_740_993));
        round_trip(
            ColumnType::Decimal,
            SqlValue::Decimal(BigDecimal::from_str("12345678901234567890.12345678").unwrap()),
        );
        round_trip(ColumnType::Real, SqlValue::F32(0.1));
        round_trip(ColumnType::Float, SqlValue::F64(1.0e-300));
        round_trip(ColumnType::Float, SqlValue::F64(f64::INFINITY));
        round_trip(ColumnType::Varchar, SqlValue::text_owned("héllo <&>".into()));
        round_trip(
            ColumnType::Date,
            SqlValue::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()),
        );
        round_trip(
            ColumnType::Time,
            SqlValue::Time(NaiveTime::from_hms_opt(23, 59, 1).unwrap()),
        );
        round_trip(
            ColumnType::Timestamp,
            SqlValue::DateTime(
                NaiveDate::from_ymd_opt(2004, 2, 29)
                    .unwrap()
                    .and_hms_opt(12, 0, 5)
                    .unwrap(),
            ),
        );
        round_trip(ColumnType::Varbinary, SqlValue::bytes_owned(vec![0, 255, 1, 2]));
        round_trip(ColumnType::Object, SqlValue::bytes_owned(b"serialized".to_vec()));
    }

    #[test]
    fn test_decimal_keeps_scale() {
        let codec = ValueCodec::default();
        let value = SqlValue::Decimal(BigDecimal::from_str("1.50").unwrap());
        assert_eq!(
            codec.encode(ColumnType::Decimal, &value).unwrap().as_deref(),
            Some("1.50")
        );
    }

    #[test]
    fn test_decimal_beyond_28_digits() {
        let codec = ValueCodec::default();
        for text in [
            "0.12345678901234567890123456789012",
            "123456789012345678901234567890.5",
            "12345678901234567890123456789012345678",
            "-0.00000000000000000000000000000000000001",
        ] {
            let value = codec.decode(ColumnType::Decimal, text).unwrap();
            assert_eq!(
                codec.encode(ColumnType::Decimal, &value).unwrap().as_deref(),
                Some(text)
            );
        }
    }

    #[test]
    fn test_temporal_profile() {
        let codec = ValueCodec::default();
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        assert_eq!(
            codec
                .encode(ColumnType::Timestamp, &SqlValue::DateTime(ts))
                .unwrap()
                .as_deref(),
            Some("2024-01-02 03:04:05")
        );
        assert_eq!(
            codec.decode(ColumnType::Timestamp, "2024-01-02T03:04:05").unwrap(),
            SqlValue::DateTime(ts)
        );
    }

    #[test]
    fn test_null_encodes_to_none() {
        let codec = ValueCodec::default();
        assert_eq!(
            codec
                .encode(ColumnType::Integer, &ValueCodec::null_for(ColumnType::Integer))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_decode_errors_are_format_errors() {
        let codec = ValueCodec::default();
        assert!(matches!(
            codec.decode(ColumnType::Integer, "12x"),
            Err(TransferError::Format(_))
        ));
        assert!(matches!(
            codec.decode(ColumnType::TinyInt, "70000"),
            Err(TransferError::Format(_))
        ));
        assert!(matches!(
            codec.decode(ColumnType::Binary, "***"),
            Err(TransferError::Base64(_))
        ));
        assert!(codec.decode(ColumnType::Boolean, "yes").is_err());
        assert_eq!(
            codec.decode(ColumnType::Boolean, "1").unwrap(),
            SqlValue::Bool(true)
        );
    }
}
