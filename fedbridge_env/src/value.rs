//! Typed property values exchanged between the local model and converters.

use crate::error::EnvError;
use serde::{Deserialize, Serialize};

/// The wire shape of a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    Int32,
    Bool,
    /// 16-bit integer, widened to 32 bits on the wire
    Int16,
    Float32,
    Float64,
    Int64,
    Text,
    Vector3,
    DateTime,
    EntityType,
}

/// A property value of a local object or interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int32(i32),
    Bool(bool),
    Int16(i16),
    Float32(f32),
    Float64(f64),
    Int64(i64),
    Text(String),
    Vector3([f64; 3]),
    DateTime(DateTimeGroup),
    EntityType(EntityTypeId),
}

impl Value {
    /// Returns the wire shape of this value.
    pub fn kind(&self) -> ScalarKind {
        match self {
            Value::Int32(_) => ScalarKind::Int32,
            Value::Bool(_) => ScalarKind::Bool,
            Value::Int16(_) => ScalarKind::Int16,
            Value::Float32(_) => ScalarKind::Float32,
            Value::Float64(_) => ScalarKind::Float64,
            Value::Int64(_) => ScalarKind::Int64,
            Value::Text(_) => ScalarKind::Text,
            Value::Vector3(_) => ScalarKind::Vector3,
            Value::DateTime(_) => ScalarKind::DateTime,
            Value::EntityType(_) => ScalarKind::EntityType,
        }
    }

    /// Numeric view of scalar values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Int16(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Int64(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Calendar date-time group, millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DateTimeGroup {
    pub year: i32,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub millisecond: u16,
}

/// Seven-part enumerated type identifier (DIS entity type).
///
/// Textual form is `kind.domain.country.category.subcategory.specific.extra`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EntityTypeId {
    pub kind: u8,
    pub domain: u8,
    pub country: u16,
    pub category: u8,
    pub subcategory: u8,
    pub specific: u8,
    pub extra: u8,
}

impl EntityTypeId {
    /// Returns the seven fields widened for encoding.
    pub fn fields(&self) -> [i32; 7] {
        [
            self.kind as i32,
            self.domain as i32,
            self.country as i32,
            self.category as i32,
            self.subcategory as i32,
            self.specific as i32,
            self.extra as i32,
        ]
    }

    /// Rebuilds an identifier from seven widened fields.
    pub fn from_fields(fields: [i32; 7]) -> Option<Self> {
        let byte = |v: i32| u8::try_from(v).ok();
        Some(Self {
            kind: byte(fields[0])?,
            domain: byte(fields[1])?,
            country: u16::try_from(fields[2]).ok()?,
            category: byte(fields[3])?,
            subcategory: byte(fields[4])?,
            specific: byte(fields[5])?,
            extra: byte(fields[6])?,
        })
    }
}

impl std::fmt::Display for EntityTypeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}.{}.{}",
            self.kind,
            self.domain,
            self.country,
            self.category,
            self.subcategory,
            self.specific,
            self.extra
        )
    }
}

impl std::str::FromStr for EntityTypeId {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EnvError::UnknownName(format!("entity type '{}'", s));
        let parts: Vec<i32> = s
            .trim()
            .split('.')
            .map(|p| p.parse::<i32>().map_err(|_| invalid()))
            .collect::<Result<_, _>>()?;
        let fields: [i32; 7] = parts.try_into().map_err(|_| invalid())?;
        Self::from_fields(fields).ok_or_else(invalid)
    }
}
