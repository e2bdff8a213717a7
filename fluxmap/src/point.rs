//! The normalized point handed to the transport, and timestamp precision.
//!
//! Tag and field maps are insertion-ordered vectors with unique keys, so
//! encoding is deterministic. Setting a key that is already present replaces
//! its value in place.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};

use crate::error::{EncodeError, Result};
use crate::value::FieldValue;

/// Timestamp precision of a point or a timestamp column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    /// Nanoseconds (`ns`).
    #[default]
    Nanoseconds,
    /// Microseconds (`u`).
    Microseconds,
    /// Milliseconds (`ms`).
    Milliseconds,
    /// Seconds (`s`).
    Seconds,
    /// Minutes (`m`).
    Minutes,
    /// Hours (`h`).
    Hours,
}

impl Precision {
    /// The value of the `precision` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "u",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "m",
            Self::Hours => "h",
        }
    }

    /// Converts a timestamp to an epoch integer in this precision.
    ///
    /// Sub-precision parts are truncated toward negative infinity. Returns
    /// `None` for nanosecond timestamps outside the `i64` range.
    pub fn to_epoch(self, timestamp: DateTime<Utc>) -> Option<i64> {
        match self {
            Self::Nanoseconds => timestamp.timestamp_nanos_opt(),
            Self::Microseconds => Some(timestamp.timestamp_micros()),
            Self::Milliseconds => Some(timestamp.timestamp_millis()),
            Self::Seconds => Some(timestamp.timestamp()),
            Self::Minutes => Some(timestamp.timestamp().div_euclid(60)),
            Self::Hours => Some(timestamp.timestamp().div_euclid(3600)),
        }
    }

    /// Interprets an epoch integer in this precision.
    ///
    /// Returns `None` when the value is outside the representable range.
    pub fn from_epoch(self, value: i64) -> Option<DateTime<Utc>> {
        match self {
            Self::Nanoseconds => Some(DateTime::from_timestamp_nanos(value)),
            Self::Microseconds => DateTime::from_timestamp_micros(value),
            Self::Milliseconds => DateTime::from_timestamp_millis(value),
            Self::Seconds => DateTime::from_timestamp(value, 0),
            Self::Minutes => DateTime::from_timestamp(value.checked_mul(60)?, 0),
            Self::Hours => DateTime::from_timestamp(value.checked_mul(3600)?, 0),
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Precision {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ns" => Ok(Self::Nanoseconds),
            "u" | "us" => Ok(Self::Microseconds),
            "ms" => Ok(Self::Milliseconds),
            "s" => Ok(Self::Seconds),
            "m" => Ok(Self::Minutes),
            "h" => Ok(Self::Hours),
            other => Err(format!("unknown precision '{other}'")),
        }
    }
}

/// One record to be written: measurement, tags, fields, optional timestamp.
///
/// A `Point` always has a non-empty measurement and at least one field; the
/// only way to build one is [`Point::builder`], which checks both.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp: Option<DateTime<Utc>>,
    precision: Precision,
}

impl Point {
    /// Starts building a point for `measurement`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use fluxmap::{FieldValue, Point};
    ///
    /// # fn main() -> fluxmap::Result<()> {
    /// let point = Point::builder("cpu")
    ///     .tag("host", "web1")
    ///     .field("usage", 0.5)
    ///     .field("cores", 8)
    ///     .build()?;
    ///
    /// assert_eq!(point.tag("host"), Some("web1"));
    /// assert_eq!(point.field("cores"), Some(&FieldValue::Integer(8)));
    /// # Ok(())
    /// # }
    /// ```
    pub fn builder(measurement: impl Into<String>) -> PointBuilder {
        PointBuilder {
            measurement: measurement.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: None,
            precision: Precision::default(),
        }
    }

    /// The measurement name.
    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    /// Tags in insertion order.
    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    /// Fields in insertion order.
    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    /// Looks up a tag value by key.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Looks up a field value by key.
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// The explicit timestamp; `None` lets the server assign its own time.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
    }

    /// The precision the timestamp is written in.
    pub fn precision(&self) -> Precision {
        self.precision
    }
}

/// Builder for [`Point`].
#[derive(Debug, Clone)]
pub struct PointBuilder {
    measurement: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp: Option<DateTime<Utc>>,
    precision: Precision,
}

impl PointBuilder {
    /// Sets a tag, replacing any previous value for `key`.
    #[must_use]
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.tags, key.into(), value.into());
        self
    }

    /// Sets a field, replacing any previous value for `key`.
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        upsert(&mut self.fields, key.into(), value.into());
        self
    }

    /// Sets the explicit timestamp.
    #[must_use]
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Sets the precision the timestamp is written in.
    #[must_use]
    pub fn precision(mut self, precision: Precision) -> Self {
        self.precision = precision;
        self
    }

    /// Builds the point.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::EmptyMeasurement` if the measurement is empty and
    /// `EncodeError::EmptyPoint` if no field was set.
    pub fn build(self) -> Result<Point> {
        if self.measurement.is_empty() {
            return Err(EncodeError::EmptyMeasurement.into());
        }
        if self.fields.is_empty() {
            return Err(EncodeError::EmptyPoint {
                measurement: self.measurement,
            }
            .into());
        }

        Ok(Point {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
            timestamp: self.timestamp,
            precision: self.precision,
        })
    }
}

fn upsert<V>(entries: &mut Vec<(String, V)>, key: String, value: V) {
    match entries.iter_mut().find(|(k, _)| *k == key) {
        Some(entry) => entry.1 = value,
        None => entries.push((key, value)),
    }
}
