//! Struct to point encoding.
//!
//! Encoding reads every tag and field member through the resolved
//! descriptor:
//!
//! - an absent tag (or one whose text is empty) is left out of the tag set;
//! - an absent field is left out of the field set, and a point whose fields
//!   were all absent is rejected with [`EncodeError::EmptyPoint`];
//! - the timestamp is set only when the shape has one and it holds a value.
//!
//! The measurement name comes from the caller, so the same shape can be
//! written to differently named measurements. [`encode_default`] uses the
//! shape's own measurement name.

use crate::coerce;
use crate::error::{EncodeError, Result};
use crate::point::Point;
use crate::resolver::Resolver;
use crate::shape::Measurement;

/// Encodes `object` as a point of `measurement`, using the global resolver.
///
/// # Errors
///
/// Returns `ShapeError` if the shape of `T` is invalid, and `EncodeError` if
/// the measurement is empty or every field is absent.
///
/// # Examples
///
/// ```rust
/// use fluxmap::{FieldValue, Measurement};
///
/// #[derive(Default, Measurement)]
/// struct Load {
///     #[influx(tag)]
///     host: Option<String>,
///     #[influx(field)]
///     load1: f64,
/// }
///
/// # fn main() -> fluxmap::Result<()> {
/// let point = fluxmap::encode("load", &Load { host: None, load1: 0.75 })?;
/// assert_eq!(point.measurement(), "load");
/// assert!(point.tags().is_empty());
/// assert_eq!(point.field("load1"), Some(&FieldValue::Float(0.75)));
/// # Ok(())
/// # }
/// ```
pub fn encode<T: Measurement>(measurement: &str, object: &T) -> Result<Point> {
    encode_with(Resolver::global(), measurement, object)
}

/// Encodes `object` under its shape's own measurement name.
///
/// # Errors
///
/// Same as [`encode`].
pub fn encode_default<T: Measurement>(object: &T) -> Result<Point> {
    let descriptor = Resolver::global().resolve::<T>()?;
    encode_with(Resolver::global(), &descriptor.name, object)
}

/// Encodes `object` as a point of `measurement` with an explicit resolver.
///
/// # Errors
///
/// Same as [`encode`].
pub fn encode_with<T: Measurement>(
    resolver: &Resolver,
    measurement: &str,
    object: &T,
) -> Result<Point> {
    let descriptor = resolver.resolve::<T>()?;

    if measurement.is_empty() {
        return Err(EncodeError::EmptyMeasurement.into());
    }

    let mut builder = Point::builder(measurement);

    for tag in &descriptor.tags {
        let Some(value) = object.member_value(tag.member) else {
            continue;
        };
        let text = coerce::tag_text(&value);
        if !text.is_empty() {
            builder = builder.tag(tag.name.as_str(), text);
        }
    }

    let mut field_count = 0;
    for field in &descriptor.fields {
        if let Some(value) = object.member_value(field.member) {
            builder = builder.field(field.name.as_str(), value);
            field_count += 1;
        }
    }
    if field_count == 0 {
        return Err(EncodeError::EmptyPoint {
            measurement: measurement.to_string(),
        }
        .into());
    }

    if let Some(timestamp) = &descriptor.timestamp {
        builder = builder.precision(timestamp.precision);
        if let Some(value) = object.timestamp() {
            builder = builder.timestamp(value);
        }
    }

    builder.build()
}
