//! Conversion rules from raw wire values to declared kinds.
//!
//! Raw values are the JSON scalars found in query responses. The rules are
//! stateless and shared by the encoder (stringifying tag values) and the
//! decoder (parsing column values into members):
//!
//! | Target    | Accepts                                                        |
//! |-----------|----------------------------------------------------------------|
//! | integer   | integral numbers, numeric text without a fractional part       |
//! | float     | any number, numeric text                                       |
//! | boolean   | native booleans, `true`/`false` text (ASCII case-insensitive)  |
//! | text      | anything, in canonical text form                               |
//! | timestamp | RFC 3339 text, epoch integers (or integer text) at a precision |
//!
//! `null` is never coerced; callers treat it as an absent value.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::CoercionError;
use crate::point::Precision;
use crate::value::{FieldValue, ValueKind};

/// Coerces `raw` to `kind`.
///
/// Returns `Ok(None)` for `null`. Timestamps are parsed at nanosecond
/// precision and returned as RFC 3339 text.
///
/// # Errors
///
/// Returns `CoercionError` when `raw` has no valid conversion to `kind`.
pub fn coerce(raw: &Value, kind: ValueKind) -> Result<Option<FieldValue>, CoercionError> {
    if raw.is_null() {
        return Ok(None);
    }

    let value = match kind {
        ValueKind::Integer => FieldValue::Integer(to_integer(raw)?),
        ValueKind::Float => FieldValue::Float(to_float(raw)?),
        ValueKind::Boolean => FieldValue::Boolean(to_boolean(raw)?),
        ValueKind::Text => FieldValue::Text(to_text(raw)),
        ValueKind::Timestamp => FieldValue::Text(
            to_timestamp(raw, Precision::Nanoseconds)?
                .to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true),
        ),
    };
    Ok(Some(value))
}

/// Converts a raw value to an integer without fractional loss.
///
/// # Errors
///
/// Returns `CoercionError` for fractional numbers, numbers outside the `i64`
/// range, non-numeric text, booleans, and compound values.
pub fn to_integer(raw: &Value) -> Result<i64, CoercionError> {
    let fail = || CoercionError::new(ValueKind::Integer, render(raw));

    match raw {
        Value::Number(n) => match n.as_i64() {
            Some(v) => Ok(v),
            None => n.as_f64().and_then(integral).ok_or_else(fail),
        },
        Value::String(s) => {
            let s = s.trim();
            match s.parse::<i64>() {
                Ok(v) => Ok(v),
                Err(_) => s.parse::<f64>().ok().and_then(integral).ok_or_else(fail),
            }
        }
        _ => Err(fail()),
    }
}

/// Converts a raw value to a float.
///
/// # Errors
///
/// Returns `CoercionError` for non-numeric or non-finite text, booleans, and
/// compound values.
pub fn to_float(raw: &Value) -> Result<f64, CoercionError> {
    let fail = || CoercionError::new(ValueKind::Float, render(raw));

    match raw {
        Value::Number(n) => n.as_f64().ok_or_else(fail),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(fail),
        _ => Err(fail()),
    }
}

/// Converts a raw value to a boolean.
///
/// # Errors
///
/// Returns `CoercionError` for anything but a native boolean or
/// `true`/`false` text.
pub fn to_boolean(raw: &Value) -> Result<bool, CoercionError> {
    match raw {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(CoercionError::new(ValueKind::Boolean, render(raw))),
    }
}

/// Returns the canonical text form of a raw value.
///
/// Strings are returned verbatim; numbers and booleans are stringified;
/// compound values are rendered as JSON.
pub fn to_text(raw: &Value) -> String {
    match raw {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Converts a raw time value to a timestamp.
///
/// Text is parsed as RFC 3339 first and as an epoch integer second. Numbers
/// are epoch integers. Both epoch forms are read at `precision`.
///
/// # Errors
///
/// Returns `CoercionError` for malformed or out-of-range timestamps.
pub fn to_timestamp(raw: &Value, precision: Precision) -> Result<DateTime<Utc>, CoercionError> {
    let fail = || CoercionError::new(ValueKind::Timestamp, render(raw));

    match raw {
        Value::String(s) => match DateTime::parse_from_rfc3339(s.trim()) {
            Ok(ts) => Ok(ts.with_timezone(&Utc)),
            Err(_) => s
                .trim()
                .parse::<i64>()
                .ok()
                .and_then(|v| precision.from_epoch(v))
                .ok_or_else(fail),
        },
        Value::Number(n) => n
            .as_i64()
            .and_then(|v| precision.from_epoch(v))
            .ok_or_else(fail),
        _ => Err(fail()),
    }
}

/// Text form of a value written as a tag.
pub fn tag_text(value: &FieldValue) -> String {
    value.to_string()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)] // bounds checked first
fn integral(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

fn render(raw: &Value) -> String {
    match raw {
        Value::String(s) => format!("\"{s}\""),
        other => other.to_string(),
    }
}
