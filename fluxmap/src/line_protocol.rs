//! Line protocol serialization.
//!
//! ```text
//! measurement[,tag_key=tag_value...] field_key=field_value[,...] [timestamp]
//! ```
//!
//! Escaping follows the InfluxDB 1.x rules: measurements escape commas and
//! spaces; tag keys, tag values and field keys also escape `=`; string field
//! values are double-quoted with `"` and `\` escaped. Integers carry an `i`
//! suffix. Tags are written sorted by key, fields in insertion order.

use std::fmt::Write as _;

use crate::error::{LineProtocolError, Result};
use crate::point::{Point, Precision};
use crate::value::FieldValue;

/// Serializes one point to a line (without trailing newline).
///
/// # Errors
///
/// Returns `LineProtocolError` if a key is empty, a float field is not
/// finite, or the timestamp does not fit the point's precision.
///
/// # Examples
///
/// ```rust
/// use fluxmap::Point;
/// use fluxmap::line_protocol::encode_point;
///
/// # fn main() -> fluxmap::Result<()> {
/// let point = Point::builder("cpu load")
///     .tag("host", "web 1")
///     .field("value", 0.5)
///     .field("count", 3)
///     .field("state", "ok")
///     .build()?;
///
/// assert_eq!(
///     encode_point(&point)?,
///     r#"cpu\ load,host=web\ 1 value=0.5,count=3i,state="ok""#
/// );
/// # Ok(())
/// # }
/// ```
pub fn encode_point(point: &Point) -> Result<String> {
    let mut line = String::with_capacity(64);
    write_point(&mut line, point)?;
    Ok(line)
}

/// Serializes a batch of points, one per line.
///
/// Returns the body together with the batch precision, which must be sent as
/// the `precision` parameter of the write request.
///
/// # Errors
///
/// Returns `LineProtocolError::MixedPrecision` if the points do not share one
/// precision, and any error from [`encode_point`].
pub fn encode_points(points: &[Point]) -> Result<(String, Precision)> {
    let precision = points.first().map(Point::precision).unwrap_or_default();
    if let Some(other) = points.iter().map(Point::precision).find(|p| *p != precision) {
        return Err(LineProtocolError::MixedPrecision {
            first: precision.to_string(),
            other: other.to_string(),
        }
        .into());
    }

    let mut body = String::with_capacity(points.len() * 64);
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            body.push('\n');
        }
        write_point(&mut body, point)?;
    }
    Ok((body, precision))
}

fn write_point(out: &mut String, point: &Point) -> Result<()> {
    let measurement = point.measurement();
    escape_into(out, measurement, &[',', ' ']);

    let mut tags: Vec<_> = point.tags().iter().collect();
    tags.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, value) in tags {
        if key.is_empty() {
            return Err(empty_key(measurement));
        }
        out.push(',');
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        escape_into(out, value, &[',', '=', ' ']);
    }

    out.push(' ');
    for (i, (key, value)) in point.fields().iter().enumerate() {
        if key.is_empty() {
            return Err(empty_key(measurement));
        }
        if i > 0 {
            out.push(',');
        }
        escape_into(out, key, &[',', '=', ' ']);
        out.push('=');
        write_field_value(out, measurement, key, value)?;
    }

    if let Some(timestamp) = point.timestamp() {
        let epoch = point.precision().to_epoch(timestamp).ok_or_else(|| {
            LineProtocolError::TimestampOutOfRange {
                measurement: measurement.to_string(),
            }
        })?;
        let _ = write!(out, " {epoch}");
    }

    Ok(())
}

fn write_field_value(out: &mut String, measurement: &str, key: &str, value: &FieldValue) -> Result<()> {
    match value {
        FieldValue::Integer(v) => {
            let _ = write!(out, "{v}i");
        }
        FieldValue::Float(v) => {
            if !v.is_finite() {
                return Err(LineProtocolError::NonFiniteField {
                    measurement: measurement.to_string(),
                    field: key.to_string(),
                }
                .into());
            }
            let _ = write!(out, "{v}");
        }
        FieldValue::Boolean(v) => {
            let _ = write!(out, "{v}");
        }
        FieldValue::Text(v) => {
            out.push('"');
            escape_into(out, v, &['"', '\\']);
            out.push('"');
        }
    }
    Ok(())
}

fn escape_into(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

fn empty_key(measurement: &str) -> crate::error::FluxError {
    LineProtocolError::EmptyKey {
        measurement: measurement.to_string(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FluxError;
    use chrono::DateTime;

    #[test]
    fn test_encode_minimal_point() {
        let point = Point::builder("m").field("v", 1.0).build().unwrap();
        assert_eq!(encode_point(&point).unwrap(), "m v=1");
    }

    #[test]
    fn test_tags_sorted_fields_ordered() {
        let point = Point::builder("cpu")
            .tag("region", "eu")
            .tag("host", "a")
            .field("z", true)
            .field("a", -2)
            .build()
            .unwrap();
        assert_eq!(
            encode_point(&point).unwrap(),
            "cpu,host=a,region=eu z=true,a=-2i"
        );
    }

    #[test]
    fn test_escaping() {
        let point = Point::builder("we,ird")
            .tag("k=ey", "va,l ue")
            .field("f ield", r#"say "hi" \o/"#)
            .build()
            .unwrap();
        assert_eq!(
            encode_point(&point).unwrap(),
            r#"we\,ird,k\=ey=va\,l\ ue f\ ield="say \"hi\" \\o/""#
        );
    }

    #[test]
    fn test_timestamp_uses_precision() {
        let ts = DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap();

        let ns = Point::builder("m").field("v", 1).timestamp(ts).build().unwrap();
        assert_eq!(encode_point(&ns).unwrap(), "m v=1i 1700000000250000000");

        let ms = Point::builder("m")
            .field("v", 1)
            .timestamp(ts)
            .precision(Precision::Milliseconds)
            .build()
            .unwrap();
        assert_eq!(encode_point(&ms).unwrap(), "m v=1i 1700000000250");
    }

    #[test]
    fn test_rejects_non_finite_float() {
        let point = Point::builder("m").field("v", f64::NAN).build().unwrap();
        assert!(matches!(
            encode_point(&point),
            Err(FluxError::LineProtocol(LineProtocolError::NonFiniteField { .. }))
        ));
    }

    #[test]
    fn test_rejects_empty_key() {
        let point = Point::builder("m").tag("", "x").field("v", 1).build().unwrap();
        assert!(matches!(
            encode_point(&point),
            Err(FluxError::LineProtocol(LineProtocolError::EmptyKey { .. }))
        ));
    }

    #[test]
    fn test_encode_points_batch() {
        let a = Point::builder("m").field("v", 1).build().unwrap();
        let b = Point::builder("m").field("v", 2).build().unwrap();

        let (body, precision) = encode_points(&[a.clone(), b]).unwrap();
        assert_eq!(body, "m v=1i\nm v=2i");
        assert_eq!(precision, Precision::Nanoseconds);

        let seconds = Point::builder("m")
            .field("v", 3)
            .precision(Precision::Seconds)
            .build()
            .unwrap();
        assert!(matches!(
            encode_points(&[a, seconds]),
            Err(FluxError::LineProtocol(LineProtocolError::MixedPrecision { .. }))
        ));
    }
}
