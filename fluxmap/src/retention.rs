//! Retention policy definitions and the InfluxQL statements that manage them.
//!
//! Durations are rendered as InfluxQL duration literals (`168h`, `1h30m`).
//! A zero duration means the data is kept forever and is rendered as `INF`.
//! The server reports durations in Go form (`168h0m0s`), which
//! [`parse_duration`] reads back.

use std::fmt::Write as _;
use std::time::Duration;

use crate::error::{ClientError, Result};

/// Nanoseconds per duration unit, largest first.
const UNITS: [(&str, u128); 6] = [
    ("h", 3_600_000_000_000),
    ("m", 60_000_000_000),
    ("s", 1_000_000_000),
    ("ms", 1_000_000),
    ("u", 1_000),
    ("ns", 1),
];

/// A retention policy of one database.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use fluxmap::RetentionPolicy;
///
/// let week = RetentionPolicy::new("one_week", Duration::from_secs(7 * 24 * 3600))
///     .with_replication(2)
///     .as_default();
///
/// assert_eq!(
///     week.create_statement("telemetry"),
///     r#"CREATE RETENTION POLICY "one_week" ON "telemetry" DURATION 168h REPLICATION 2 DEFAULT"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Policy name.
    pub name: String,
    /// How long data is kept. Zero keeps data forever.
    pub duration: Duration,
    /// Time range covered by each shard group. `None` lets the server choose.
    pub shard_group_duration: Option<Duration>,
    /// Number of copies of each point kept in the cluster.
    pub replication: u32,
    /// Whether writes without an explicit policy go to this one.
    pub is_default: bool,
}

impl RetentionPolicy {
    /// Creates a non-default policy with replication 1.
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.into(),
            duration,
            shard_group_duration: None,
            replication: 1,
            is_default: false,
        }
    }

    /// Sets the replication factor.
    #[must_use]
    pub fn with_replication(mut self, replication: u32) -> Self {
        self.replication = replication;
        self
    }

    /// Sets the shard group duration.
    #[must_use]
    pub fn with_shard_group_duration(mut self, duration: Duration) -> Self {
        self.shard_group_duration = Some(duration);
        self
    }

    /// Marks the policy as the database default.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// `CREATE RETENTION POLICY` statement for this policy on `database`.
    pub fn create_statement(&self, database: &str) -> String {
        format!(
            "CREATE RETENTION POLICY {} ON {}{}",
            quote_identifier(&self.name),
            quote_identifier(database),
            self.clauses()
        )
    }

    /// `ALTER RETENTION POLICY` statement replacing the definition of `name`
    /// on `database` with this one.
    ///
    /// InfluxQL cannot rename a policy, so `self.name` is not used.
    pub fn alter_statement(&self, name: &str, database: &str) -> String {
        format!(
            "ALTER RETENTION POLICY {} ON {}{}",
            quote_identifier(name),
            quote_identifier(database),
            self.clauses()
        )
    }

    fn clauses(&self) -> String {
        let mut clauses = format!(
            " DURATION {} REPLICATION {}",
            format_duration(self.duration),
            self.replication
        );
        if let Some(shard) = self.shard_group_duration {
            let _ = write!(clauses, " SHARD DURATION {}", format_duration(shard));
        }
        if self.is_default {
            clauses.push_str(" DEFAULT");
        }
        clauses
    }
}

/// `DROP RETENTION POLICY` statement.
pub fn drop_statement(name: &str, database: &str) -> String {
    format!(
        "DROP RETENTION POLICY {} ON {}",
        quote_identifier(name),
        quote_identifier(database)
    )
}

/// Double-quotes an InfluxQL identifier, escaping `"` and `\`.
pub fn quote_identifier(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Renders `duration` as an InfluxQL duration literal, `INF` for zero.
pub fn format_duration(duration: Duration) -> String {
    let mut remaining = duration.as_nanos();
    if remaining == 0 {
        return "INF".to_string();
    }

    let mut out = String::new();
    for (unit, nanos) in UNITS {
        let count = remaining / nanos;
        if count > 0 {
            let _ = write!(out, "{count}{unit}");
            remaining %= nanos;
        }
    }
    out
}

/// Parses a duration as reported by the server (`168h0m0s`, `1h30m`,
/// `1.5s`, `500ms`). `0s`, `0` and `INF` parse to zero.
///
/// # Errors
///
/// Returns `ClientError::InvalidDuration` if `value` is not a duration.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let invalid = || ClientError::InvalidDuration {
        value: value.to_string(),
    };

    let trimmed = value.trim();
    if trimmed == "0" || trimmed.eq_ignore_ascii_case("inf") {
        return Ok(Duration::ZERO);
    }
    if trimmed.is_empty() {
        return Err(invalid().into());
    }

    let mut total: u128 = 0;
    let mut rest = trimmed;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .ok_or_else(invalid)?;
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let unit_nanos = match unit {
            "ns" => 1,
            "u" | "us" | "µs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            "d" => 86_400_000_000_000,
            "w" => 604_800_000_000_000,
            _ => return Err(invalid().into()),
        };
        total = scaled(number, unit_nanos)
            .and_then(|nanos| total.checked_add(nanos))
            .ok_or_else(invalid)?;
        rest = tail;
    }

    let secs = u64::try_from(total / 1_000_000_000).map_err(|_| invalid())?;
    let nanos = u32::try_from(total % 1_000_000_000).map_err(|_| invalid())?;
    Ok(Duration::new(secs, nanos))
}

/// `number * unit_nanos`, where `number` may carry a decimal fraction.
fn scaled(number: &str, unit_nanos: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(unit_nanos)?;

    if !fraction.is_empty() {
        let digits = u32::try_from(fraction.len()).ok()?;
        let scale = 10u128.checked_pow(digits)?;
        let fraction: u128 = fraction.parse().ok()?;
        nanos = nanos.checked_add(fraction.checked_mul(unit_nanos)? / scale)?;
    }
    Some(nanos)
}

/// One row of `SHOW RETENTION POLICIES`.
#[derive(Debug, Default, crate::Measurement)]
#[influx(measurement = "retention_policies")]
pub(crate) struct RetentionPolicyRow {
    #[influx(field)]
    name: String,
    #[influx(field)]
    duration: String,
    #[influx(field = "shardGroupDuration")]
    shard_group_duration: Option<String>,
    #[influx(field = "replicaN")]
    replication: Option<u32>,
    #[influx(field = "default")]
    is_default: Option<bool>,
}

impl TryFrom<RetentionPolicyRow> for RetentionPolicy {
    type Error = crate::error::FluxError;

    fn try_from(row: RetentionPolicyRow) -> Result<Self> {
        let shard_group_duration = match row.shard_group_duration.as_deref() {
            Some(value) => Some(parse_duration(value)?).filter(|d| !d.is_zero()),
            None => None,
        };
        Ok(Self {
            name: row.name,
            duration: parse_duration(&row.duration)?,
            shard_group_duration,
            replication: row.replication.unwrap_or(1),
            is_default: row.is_default.unwrap_or(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode;
    use crate::error::FluxError;
    use crate::result::{QueryResult, Series};
    use serde_json::json;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "INF");
        assert_eq!(format_duration(HOUR * 168), "168h");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("168h0m0s").unwrap(), HOUR * 168);
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("INF").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2w").unwrap(), HOUR * 24 * 14);
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for value in ["", "h", "12", "3x", ".s", "1h2", "1.2.3s"] {
            assert!(
                matches!(
                    parse_duration(value),
                    Err(FluxError::Client(ClientError::InvalidDuration { .. }))
                ),
                "accepted {value:?}"
            );
        }
    }

    #[test]
    fn test_parse_duration_sum_overflow_is_invalid() {
        // Each term fits in u128 nanoseconds, their sum does not.
        let huge = "500000000000000000000000w".repeat(2);
        assert!(matches!(
            parse_duration(&huge),
            Err(FluxError::Client(ClientError::InvalidDuration { .. }))
        ));
    }

    #[test]
    fn test_format_then_parse_keeps_duration() {
        let duration = Duration::from_secs(90_061);
        assert_eq!(parse_duration(&format_duration(duration)).unwrap(), duration);
    }

    #[test]
    fn test_statements() {
        let rp = RetentionPolicy::new("two_days", HOUR * 48).with_shard_group_duration(HOUR);
        assert_eq!(
            rp.create_statement("db"),
            r#"CREATE RETENTION POLICY "two_days" ON "db" DURATION 48h REPLICATION 1 SHARD DURATION 1h"#
        );
        assert_eq!(
            rp.alter_statement("old", "db"),
            r#"ALTER RETENTION POLICY "old" ON "db" DURATION 48h REPLICATION 1 SHARD DURATION 1h"#
        );
        assert_eq!(
            drop_statement("two_days", "db"),
            r#"DROP RETENTION POLICY "two_days" ON "db""#
        );

        let forever = RetentionPolicy::new("forever", Duration::ZERO);
        assert!(forever.create_statement("db").contains("DURATION INF"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("cpu"), r#""cpu""#);
        assert_eq!(quote_identifier(r#"we"ird\name"#), r#""we\"ird\\name""#);
    }

    #[test]
    fn test_rows_decode_into_policies() {
        let result = QueryResult::from_series(vec![
            Series::new(
                "",
                &["name", "duration", "shardGroupDuration", "replicaN", "default"],
            )
            .with_row(vec![json!("autogen"), json!("0s"), json!("168h0m0s"), json!(1), json!(true)])
            .with_row(vec![json!("week"), json!("168h0m0s"), json!("24h0m0s"), json!(2), json!(false)]),
        ]);

        let policies: Vec<RetentionPolicy> = decode::<RetentionPolicyRow>(&result)
            .unwrap()
            .into_iter()
            .map(RetentionPolicy::try_from)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(
            policies[0],
            RetentionPolicy::new("autogen", Duration::ZERO)
                .with_shard_group_duration(HOUR * 168)
                .as_default()
        );
        assert_eq!(
            policies[1],
            RetentionPolicy::new("week", HOUR * 168)
                .with_shard_group_duration(HOUR * 24)
                .with_replication(2)
        );
    }
}
