//! Query result to struct decoding.
//!
//! # Algorithm
//!
//! 1. A result carrying an error string fails with
//!    [`DecodeError::QueryExecution`].
//! 2. A result with no series decodes to an empty vector.
//! 3. The target shape is resolved.
//! 4. Per series, each tag and field name is looked up in the column list.
//!    Tags missing from the columns fall back to the series-level tags
//!    (`GROUP BY` output), and otherwise stay at their default. Optional
//!    fields missing from the columns stay at their default; a missing
//!    required field fails with [`DecodeError::MissingColumn`].
//! 5. Per row, a value is built from `Default`, every present non-null cell
//!    is coerced to the member's kind and assigned, and the `time` column
//!    fills the timestamp member.
//!
//! Rows keep the server's order, series are processed in result order, and
//! any coercion failure fails the whole decode.

use std::collections::HashMap;

use serde_json::Value;

use crate::coerce;
use crate::error::{DecodeError, Result};
use crate::point::{Point, Precision};
use crate::resolver::{MeasurementDescriptor, Resolver, TIME_COLUMN};
use crate::result::{QueryResponse, QueryResult, Series};
use crate::shape::Measurement;
use crate::value::{FieldValue, ValueKind};

/// Decodes every row of `result` into `T`, using the global resolver.
///
/// # Errors
///
/// Returns `DecodeError::QueryExecution` if the result carries an error,
/// `ShapeError` if `T` is invalid, `DecodeError::MissingColumn` or
/// `DecodeError::RowLength` for malformed series, and `CoercionError` when a
/// cell cannot be converted to its member's kind.
///
/// # Examples
///
/// ```rust
/// use fluxmap::{Measurement, QueryResult, Series};
/// use serde_json::json;
///
/// #[derive(Debug, Default, PartialEq, Measurement)]
/// struct Temperature {
///     #[influx(tag)]
///     room: String,
///     #[influx(field)]
///     celsius: f64,
/// }
///
/// # fn main() -> fluxmap::Result<()> {
/// let result = QueryResult::from_series(vec![
///     Series::new("temperature", &["time", "room", "celsius"])
///         .with_row(vec![json!("2024-01-01T00:00:00Z"), json!("kitchen"), json!(21.5)]),
/// ]);
///
/// let rows: Vec<Temperature> = fluxmap::decode(&result)?;
/// assert_eq!(rows, [Temperature { room: "kitchen".into(), celsius: 21.5 }]);
/// # Ok(())
/// # }
/// ```
pub fn decode<T: Measurement>(result: &QueryResult) -> Result<Vec<T>> {
    decode_with(Resolver::global(), result)
}

/// Decodes every row of `result` into `T` with an explicit resolver.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_with<T: Measurement>(resolver: &Resolver, result: &QueryResult) -> Result<Vec<T>> {
    Ok(decode_series_with(resolver, result)?
        .into_iter()
        .flatten()
        .collect())
}

/// Decodes `result` keeping rows grouped by series.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_series<T: Measurement>(result: &QueryResult) -> Result<Vec<Vec<T>>> {
    decode_series_with(Resolver::global(), result)
}

/// Decodes `result` keeping rows grouped by series, with an explicit resolver.
///
/// # Errors
///
/// Same as [`decode`].
pub fn decode_series_with<T: Measurement>(
    resolver: &Resolver,
    result: &QueryResult,
) -> Result<Vec<Vec<T>>> {
    if let Some(message) = &result.error {
        return Err(DecodeError::QueryExecution {
            message: message.clone(),
        }
        .into());
    }
    if result.series.is_empty() {
        return Ok(Vec::new());
    }

    let descriptor = resolver.resolve::<T>()?;
    result
        .series
        .iter()
        .map(|series| decode_one_series(&descriptor, series))
        .collect()
}

/// Decodes a result expected to hold at most one row.
///
/// Returns `Ok(None)` when the result has no rows.
///
/// # Errors
///
/// Returns `DecodeError::MultipleRows` if the result holds more than one
/// row, across all series; otherwise the same errors as [`decode`].
pub fn decode_one<T: Measurement>(result: &QueryResult) -> Result<Option<T>> {
    let rows = result.row_count();
    if rows > 1 && result.error.is_none() {
        return Err(DecodeError::MultipleRows { rows }.into());
    }
    Ok(decode::<T>(result)?.into_iter().next())
}

/// Decodes every statement result of `response`, concatenated in order.
///
/// # Errors
///
/// Fails with the request-level error if present; otherwise the same errors
/// as [`decode`].
pub fn decode_response<T: Measurement>(response: &QueryResponse) -> Result<Vec<T>> {
    if let Some(message) = &response.error {
        return Err(DecodeError::QueryExecution {
            message: message.clone(),
        }
        .into());
    }

    let mut decoded = Vec::new();
    for result in &response.results {
        decoded.extend(decode::<T>(result)?);
    }
    Ok(decoded)
}

/// Where a tag member's value comes from within one series.
enum TagSource {
    Column(usize),
    SeriesTag(Value),
    Absent,
}

fn decode_one_series<T: Measurement>(
    descriptor: &MeasurementDescriptor,
    series: &Series,
) -> Result<Vec<T>> {
    let columns: HashMap<&str, usize> = series
        .columns
        .iter()
        .enumerate()
        .map(|(index, name)| (name.as_str(), index))
        .collect();

    let tags: Vec<_> = descriptor
        .tags
        .iter()
        .map(|tag| {
            let source = match columns.get(tag.name.as_str()) {
                Some(&index) => TagSource::Column(index),
                None => series
                    .tags
                    .get(&tag.name)
                    .map_or(TagSource::Absent, |v| TagSource::SeriesTag(Value::String(v.clone()))),
            };
            (tag, source)
        })
        .collect();

    let mut fields = Vec::with_capacity(descriptor.fields.len());
    for field in &descriptor.fields {
        match columns.get(field.name.as_str()) {
            Some(&index) => fields.push((field, index)),
            None if field.required => {
                return Err(DecodeError::MissingColumn {
                    shape: descriptor.type_name.to_string(),
                    series: series.name.clone(),
                    column: field.name.clone(),
                }
                .into());
            }
            None => {}
        }
    }

    let time = descriptor
        .timestamp
        .and_then(|ts| columns.get(TIME_COLUMN).map(|&index| (ts.precision, index)));

    let mut decoded = Vec::with_capacity(series.values.len());
    for (row_index, row) in series.values.iter().enumerate() {
        if row.len() != series.columns.len() {
            return Err(DecodeError::RowLength {
                series: series.name.clone(),
                row: row_index,
                expected: series.columns.len(),
                actual: row.len(),
            }
            .into());
        }

        let mut object = T::default();

        for (tag, source) in &tags {
            let raw = match source {
                TagSource::Column(index) => &row[*index],
                TagSource::SeriesTag(value) => value,
                TagSource::Absent => continue,
            };
            assign(&mut object, tag.member, tag.kind, &tag.name, raw)?;
        }

        for (field, index) in &fields {
            assign(&mut object, field.member, field.kind, &field.name, &row[*index])?;
        }

        if let Some((precision, index)) = time {
            let raw = &row[index];
            if !raw.is_null() {
                let timestamp = coerce::to_timestamp(raw, precision)
                    .map_err(|e| e.in_column(TIME_COLUMN))?;
                object.set_timestamp(timestamp);
            }
        }

        decoded.push(object);
    }

    Ok(decoded)
}

fn assign<T: Measurement>(
    object: &mut T,
    member: usize,
    kind: ValueKind,
    column: &str,
    raw: &Value,
) -> Result<()> {
    let Some(value) = coerce::coerce(raw, kind).map_err(|e| e.in_column(column))? else {
        return Ok(());
    };
    object
        .set_member_value(member, value)
        .map_err(|e| e.in_column(column))?;
    Ok(())
}

/// Rebuilds raw points from a query result.
///
/// Series tags become point tags, the `time` column becomes the timestamp,
/// and every other non-null cell becomes a field typed after its JSON value.
/// Tags only arrive as series tags for `GROUP BY *` queries; without it the
/// server reports them as ordinary columns, indistinguishable from fields.
/// Rows with no non-null cell besides `time` are skipped.
///
/// # Errors
///
/// Returns `DecodeError::QueryExecution` if the result carries an error,
/// and `CoercionError` for a malformed `time` cell.
pub fn points_from_result(result: &QueryResult) -> Result<Vec<Point>> {
    if let Some(message) = &result.error {
        return Err(DecodeError::QueryExecution {
            message: message.clone(),
        }
        .into());
    }

    let mut points = Vec::with_capacity(result.row_count());
    for series in &result.series {
        for row in &series.values {
            let mut builder = Point::builder(series.name.as_str());
            // `GROUP BY *` reports a tag the point lacks as an empty string.
            for (key, value) in series.tags.iter().filter(|(_, v)| !v.is_empty()) {
                builder = builder.tag(key.as_str(), value.as_str());
            }

            let mut has_field = false;
            for (column, raw) in series.columns.iter().zip(row) {
                if column == TIME_COLUMN {
                    if !raw.is_null() {
                        let timestamp = coerce::to_timestamp(raw, Precision::Nanoseconds)
                            .map_err(|e| e.in_column(TIME_COLUMN))?;
                        builder = builder.timestamp(timestamp);
                    }
                    continue;
                }
                if let Some(value) = raw_field_value(raw) {
                    builder = builder.field(column.as_str(), value);
                    has_field = true;
                }
            }

            if has_field {
                points.push(builder.build()?);
            }
        }
    }
    Ok(points)
}

fn raw_field_value(raw: &Value) -> Option<FieldValue> {
    match raw {
        Value::Null => None,
        Value::Bool(b) => Some(FieldValue::Boolean(*b)),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => FieldValue::Integer(i),
            None => FieldValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        other => Some(FieldValue::Text(other.to_string())),
    }
}
