//! Binary attribute codec - XDR-style, big-endian.
//!
//! ```text
//! optional field:  [ presence:i32 = 1 ][ value ... ]
//! absent field:    []  or  [ presence:i32 = 0 ]
//!
//! int32 / bool / int16   4 bytes (bool and int16 widened to int32)
//! float32                4 bytes IEEE-754
//! float64 / int64        8 bytes
//! string                 [ len:u32 ][ bytes ][ zero pad to 4 ]
//! vector3                3 x float64
//! date-time group        7 x int32
//! entity type            7 x int32
//! ```
//!
//! Decoding an absent field yields `Ok(None)`. It is never confused with a
//! zero value.

use fedbridge_env::{DateTimeGroup, EntityTypeId, ScalarKind, Value};
use thiserror::Error;

/// Presence marker written in front of optional fields.
pub const PRESENT: i32 = 1;

/// Marker some senders use for an explicitly absent optional field.
pub const ABSENT: i32 = 0;

/// Codec errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecError {
    #[error("Truncated buffer: need {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        needed: usize,
        offset: usize,
        available: usize,
    },

    #[error("Invalid presence marker: {0}")]
    InvalidPresenceMarker(i32),

    #[error("Invalid boolean: {0}")]
    InvalidBool(i32),

    #[error("Value {value} out of range for {kind:?}")]
    OutOfRange { kind: ScalarKind, value: i64 },

    #[error("String is not valid UTF-8")]
    InvalidUtf8,
}

// ============================================================================
// WRITER
// ============================================================================

/// Big-endian XDR writer.
#[derive(Debug, Default)]
pub struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_i32(v as i32);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    /// Writes a length-prefixed string padded to a 4-byte boundary.
    pub fn write_string(&mut self, s: &str) {
        let bytes = s.as_bytes();
        self.buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        self.buf.extend_from_slice(bytes);
        let pad = (4 - bytes.len() % 4) % 4;
        self.buf.extend(std::iter::repeat(0u8).take(pad));
    }

    /// Writes a value without presence marker.
    pub fn write_value(&mut self, value: &Value) {
        match value {
            Value::Int32(v) => self.write_i32(*v),
            Value::Bool(v) => self.write_bool(*v),
            Value::Int16(v) => self.write_i32(*v as i32),
            Value::Float32(v) => self.write_f32(*v),
            Value::Float64(v) => self.write_f64(*v),
            Value::Int64(v) => self.write_i64(*v),
            Value::Text(v) => self.write_string(v),
            Value::Vector3(v) => v.iter().for_each(|c| self.write_f64(*c)),
            Value::DateTime(dt) => {
                for field in [
                    dt.year,
                    dt.month as i32,
                    dt.day as i32,
                    dt.hour as i32,
                    dt.minute as i32,
                    dt.second as i32,
                    dt.millisecond as i32,
                ] {
                    self.write_i32(field);
                }
            }
            Value::EntityType(id) => id.fields().iter().for_each(|f| self.write_i32(*f)),
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ============================================================================
// READER
// ============================================================================

/// Big-endian XDR reader over a borrowed buffer.
#[derive(Debug)]
pub struct XdrReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> XdrReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        if self.remaining() < N {
            return Err(CodecError::Truncated {
                needed: N,
                offset: self.pos,
                available: self.remaining(),
            });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_be_bytes(self.take::<4>()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_i32()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::InvalidBool(other)),
        }
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.take::<8>()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, CodecError> {
        Ok(f32::from_be_bytes(self.take::<4>()?))
    }

    pub fn read_f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_be_bytes(self.take::<8>()?))
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = u32::from_be_bytes(self.take::<4>()?) as usize;
        let padded = len + (4 - len % 4) % 4;
        if self.remaining() < padded {
            return Err(CodecError::Truncated {
                needed: padded,
                offset: self.pos,
                available: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + len];
        self.pos += padded;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    fn read_narrow<T: TryFrom<i32>>(&mut self, kind: ScalarKind) -> Result<T, CodecError> {
        let raw = self.read_i32()?;
        T::try_from(raw).map_err(|_| CodecError::OutOfRange {
            kind,
            value: raw as i64,
        })
    }

    /// Reads a value of the given kind without presence marker.
    pub fn read_value(&mut self, kind: ScalarKind) -> Result<Value, CodecError> {
        Ok(match kind {
            ScalarKind::Int32 => Value::Int32(self.read_i32()?),
            ScalarKind::Bool => Value::Bool(self.read_bool()?),
            ScalarKind::Int16 => Value::Int16(self.read_narrow(kind)?),
            ScalarKind::Float32 => Value::Float32(self.read_f32()?),
            ScalarKind::Float64 => Value::Float64(self.read_f64()?),
            ScalarKind::Int64 => Value::Int64(self.read_i64()?),
            ScalarKind::Text => Value::Text(self.read_string()?),
            ScalarKind::Vector3 => {
                Value::Vector3([self.read_f64()?, self.read_f64()?, self.read_f64()?])
            }
            ScalarKind::DateTime => Value::DateTime(DateTimeGroup {
                year: self.read_i32()?,
                month: self.read_narrow(kind)?,
                day: self.read_narrow(kind)?,
                hour: self.read_narrow(kind)?,
                minute: self.read_narrow(kind)?,
                second: self.read_narrow(kind)?,
                millisecond: self.read_narrow(kind)?,
            }),
            ScalarKind::EntityType => {
                let mut fields = [0i32; 7];
                for field in fields.iter_mut() {
                    *field = self.read_i32()?;
                }
                let id = EntityTypeId::from_fields(fields).ok_or(CodecError::OutOfRange {
                    kind,
                    value: fields.iter().copied().max().unwrap_or_default() as i64,
                })?;
                Value::EntityType(id)
            }
        })
    }
}

// ============================================================================
// FREE FUNCTIONS + SWAPPABLE CODEC
// ============================================================================

/// Encodes a value, prefixed with the presence marker when `optional`.
pub fn encode_value(value: &Value, optional: bool) -> Vec<u8> {
    let mut writer = XdrWriter::new();
    if optional {
        writer.write_i32(PRESENT);
    }
    writer.write_value(value);
    writer.into_bytes()
}

/// Decodes a value of `kind`.
///
/// # Returns
/// * `Ok(Some(value))` - A value was present
/// * `Ok(None)` - Optional field without value (empty buffer or marker 0)
/// * `Err(CodecError)` - Malformed buffer
pub fn decode_value(
    kind: ScalarKind,
    bytes: &[u8],
    optional: bool,
) -> Result<Option<Value>, CodecError> {
    let mut reader = XdrReader::new(bytes);
    if optional {
        if bytes.is_empty() {
            return Ok(None);
        }
        match reader.read_i32()? {
            PRESENT => {}
            ABSENT => return Ok(None),
            other => return Err(CodecError::InvalidPresenceMarker(other)),
        }
    }
    reader.read_value(kind).map(Some)
}

/// Encode/decode contract used by converters.
pub trait AttributeCodec: Send + Sync {
    fn encode(&self, value: &Value, optional: bool) -> Vec<u8>;

    fn decode(
        &self,
        kind: ScalarKind,
        bytes: &[u8],
        optional: bool,
    ) -> Result<Option<Value>, CodecError>;
}

/// The default XDR-style codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct XdrCodec;

impl AttributeCodec for XdrCodec {
    fn encode(&self, value: &Value, optional: bool) -> Vec<u8> {
        encode_value(value, optional)
    }

    fn decode(
        &self,
        kind: ScalarKind,
        bytes: &[u8],
        optional: bool,
    ) -> Result<Option<Value>, CodecError> {
        decode_value(kind, bytes, optional)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_int32_big_endian() {
        assert_eq!(encode_value(&Value::Int32(1), false), vec![0, 0, 0, 1]);
        assert_eq!(
            encode_value(&Value::Int32(-2), false),
            vec![0xff, 0xff, 0xff, 0xfe]
        );
    }

    #[test]
    fn test_optional_marker_prefix() {
        let bytes = encode_value(&Value::Int32(7), true);
        assert_eq!(bytes, vec![0, 0, 0, 1, 0, 0, 0, 7]);
    }

    #[test]
    fn test_bool_and_short_widened() {
        assert_eq!(encode_value(&Value::Bool(true), false), vec![0, 0, 0, 1]);
        assert_eq!(encode_value(&Value::Int16(-1), false), vec![0xff; 4]);
        assert_eq!(
            decode_value(ScalarKind::Int16, &[0, 1, 0, 0], false),
            Err(CodecError::OutOfRange {
                kind: ScalarKind::Int16,
                value: 65536
            })
        );
    }

    #[test]
    fn test_string_padding() {
        let bytes = encode_value(&Value::Text("abcde".into()), false);
        assert_eq!(bytes.len(), 4 + 8);
        assert_eq!(&bytes[..4], &[0, 0, 0, 5]);
        assert_eq!(&bytes[9..], &[0, 0, 0]);

        let aligned = encode_value(&Value::Text("abcd".into()), false);
        assert_eq!(aligned.len(), 8);
    }

    #[test]
    fn test_absent_is_not_zero() {
        assert_eq!(decode_value(ScalarKind::Int32, &[], true), Ok(None));
        assert_eq!(
            decode_value(ScalarKind::Int32, &[0, 0, 0, 0], true),
            Ok(None)
        );
        assert_eq!(
            decode_value(ScalarKind::Int32, &[0, 0, 0, 1, 0, 0, 0, 0], true),
            Ok(Some(Value::Int32(0)))
        );
    }

    #[test]
    fn test_bad_marker_and_truncation() {
        assert_eq!(
            decode_value(ScalarKind::Int32, &[0, 0, 0, 9, 0, 0, 0, 0], true),
            Err(CodecError::InvalidPresenceMarker(9))
        );
        assert!(matches!(
            decode_value(ScalarKind::Float64, &[0, 0, 0, 1], false),
            Err(CodecError::Truncated { needed: 8, .. })
        ));
        assert!(matches!(
            decode_value(ScalarKind::Int32, &[], false),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_entity_type_layout() {
        let id: EntityTypeId = "1.2.225.1.1.3.0".parse().unwrap();
        let bytes = encode_value(&Value::EntityType(id), true);
        assert_eq!(bytes.len(), 4 + 7 * 4);
        assert_eq!(&bytes[12..16], &[0, 0, 0, 225]);
    }

    fn value_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i32>().prop_map(Value::Int32),
            any::<bool>().prop_map(Value::Bool),
            any::<i16>().prop_map(Value::Int16),
            (-1.0e6f32..1.0e6).prop_map(Value::Float32),
            (-1.0e12f64..1.0e12).prop_map(Value::Float64),
            any::<i64>().prop_map(Value::Int64),
            "[a-zA-Z0-9 _.-]{0,24}".prop_map(Value::Text),
            prop::array::uniform3(-1.0e7f64..1.0e7).prop_map(Value::Vector3),
            (any::<i32>(), 1u8..=12, 1u8..=31, 0u8..24, 0u8..60, 0u8..60, 0u16..1000).prop_map(
                |(year, month, day, hour, minute, second, millisecond)| {
                    Value::DateTime(DateTimeGroup {
                        year,
                        month,
                        day,
                        hour,
                        minute,
                        second,
                        millisecond,
                    })
                }
            ),
            (
                any::<u8>(),
                any::<u8>(),
                any::<u16>(),
                any::<u8>(),
                any::<u8>(),
                any::<u8>(),
                any::<u8>()
            )
                .prop_map(|(kind, domain, country, category, subcategory, specific, extra)| {
                    Value::EntityType(EntityTypeId {
                        kind,
                        domain,
                        country,
                        category,
                        subcategory,
                        specific,
                        extra,
                    })
                }),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(value in value_strategy(), optional in any::<bool>()) {
            let bytes = encode_value(&value, optional);
            prop_assert_eq!(bytes.len() % 4, 0);
            let decoded = decode_value(value.kind(), &bytes, optional).unwrap();
            prop_assert_eq!(decoded, Some(value));
        }
    }
}
