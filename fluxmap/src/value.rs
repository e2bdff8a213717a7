//! Field values and the conversions between them and struct members.
//!
//! [`FieldValue`] is what a point carries: one of the four kinds InfluxDB
//! stores. [`MemberValue`] connects Rust member types to those kinds and is
//! what `#[derive(Measurement)]` calls into; [`TimestampValue`] does the same
//! for the timestamp member.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::error::CoercionError;

/// The declared kind of a member or column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 64-bit signed integer.
    Integer,
    /// 64-bit float.
    Float,
    /// Boolean.
    Boolean,
    /// UTF-8 text.
    Text,
    /// A point in time.
    Timestamp,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
        };
        f.write_str(name)
    }
}

/// A typed value carried by a point field or a tag before stringification.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Integer value.
    Integer(i64),
    /// Float value.
    Float(f64),
    /// Boolean value.
    Boolean(bool),
    /// Text value.
    Text(String),
}

impl FieldValue {
    /// Returns the kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Float(_) => ValueKind::Float,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Text(_) => ValueKind::Text,
        }
    }

    fn mismatch(&self, target: ValueKind) -> CoercionError {
        CoercionError::new(target, self.to_string())
    }
}

/// Canonical text form: integers and floats in decimal, booleans as
/// `true`/`false`, text verbatim.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Text(v) => f.write_str(v),
        }
    }
}

macro_rules! field_value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(value: $ty) -> Self {
                    Self::$variant(value.into())
                }
            }
        )*
    };
}

field_value_from! {
    i8 => Integer,
    i16 => Integer,
    i32 => Integer,
    i64 => Integer,
    u8 => Integer,
    u16 => Integer,
    u32 => Integer,
    f32 => Float,
    f64 => Float,
    bool => Boolean,
    String => Text,
    &str => Text,
}

/// A Rust type usable as a tag or field member.
///
/// `KIND` is the wire kind the member maps to. Non-`Option` types are
/// required: decoding a series without their column is an error. `Option<T>`
/// members are nullable, and `None` is omitted when encoding.
pub trait MemberValue: Sized {
    /// Declared kind of the member.
    const KIND: ValueKind;

    /// Whether decoding requires the member's column to be present.
    const REQUIRED: bool = true;

    /// Current value of the member, `None` when absent.
    fn to_field_value(&self) -> Option<FieldValue>;

    /// Builds the member from a value already coerced to `KIND`.
    ///
    /// # Errors
    ///
    /// Returns `CoercionError` when the value is of a different kind or out
    /// of the member type's range.
    fn from_field_value(value: FieldValue) -> Result<Self, CoercionError>;
}

macro_rules! integer_member {
    ($($ty:ty),* $(,)?) => {
        $(
            impl MemberValue for $ty {
                const KIND: ValueKind = ValueKind::Integer;

                fn to_field_value(&self) -> Option<FieldValue> {
                    Some(FieldValue::Integer(i64::from(*self)))
                }

                fn from_field_value(value: FieldValue) -> Result<Self, CoercionError> {
                    match value {
                        FieldValue::Integer(v) => <$ty>::try_from(v)
                            .map_err(|_| CoercionError::new(ValueKind::Integer, v.to_string())),
                        other => Err(other.mismatch(ValueKind::Integer)),
                    }
                }
            }
        )*
    };
}

integer_member!(i8, i16, i32, i64, u8, u16, u32);

impl MemberValue for f64 {
    const KIND: ValueKind = ValueKind::Float;

    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Float(*self))
    }

    fn from_field_value(value: FieldValue) -> Result<Self, CoercionError> {
        match value {
            FieldValue::Float(v) => Ok(v),
            other => Err(other.mismatch(ValueKind::Float)),
        }
    }
}

impl MemberValue for f32 {
    const KIND: ValueKind = ValueKind::Float;

    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Float(f64::from(*self)))
    }

    #[allow(clippy::cast_possible_truncation)] // f32 members accept the precision loss
    fn from_field_value(value: FieldValue) -> Result<Self, CoercionError> {
        match value {
            FieldValue::Float(v) => Ok(v as f32),
            other => Err(other.mismatch(ValueKind::Float)),
        }
    }
}

impl MemberValue for bool {
    const KIND: ValueKind = ValueKind::Boolean;

    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Boolean(*self))
    }

    fn from_field_value(value: FieldValue) -> Result<Self, CoercionError> {
        match value {
            FieldValue::Boolean(v) => Ok(v),
            other => Err(other.mismatch(ValueKind::Boolean)),
        }
    }
}

impl MemberValue for String {
    const KIND: ValueKind = ValueKind::Text;

    fn to_field_value(&self) -> Option<FieldValue> {
        Some(FieldValue::Text(self.clone()))
    }

    fn from_field_value(value: FieldValue) -> Result<Self, CoercionError> {
        match value {
            FieldValue::Text(v) => Ok(v),
            other => Err(other.mismatch(ValueKind::Text)),
        }
    }
}

impl<T: MemberValue> MemberValue for Option<T> {
    const KIND: ValueKind = T::KIND;
    const REQUIRED: bool = false;

    fn to_field_value(&self) -> Option<FieldValue> {
        self.as_ref().and_then(T::to_field_value)
    }

    fn from_field_value(value: FieldValue) -> Result<Self, CoercionError> {
        T::from_field_value(value).map(Some)
    }
}

/// A Rust type usable as the timestamp member.
pub trait TimestampValue: Sized {
    /// Current timestamp, `None` when unset.
    fn to_timestamp(&self) -> Option<DateTime<Utc>>;

    /// Builds the member from a decoded timestamp.
    fn from_timestamp(timestamp: DateTime<Utc>) -> Self;
}

impl TimestampValue for DateTime<Utc> {
    fn to_timestamp(&self) -> Option<DateTime<Utc>> {
        Some(*self)
    }

    fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        timestamp
    }
}

impl TimestampValue for Option<DateTime<Utc>> {
    fn to_timestamp(&self) -> Option<DateTime<Utc>> {
        *self
    }

    fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Some(timestamp)
    }
}
