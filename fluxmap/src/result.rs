//! Query response model.
//!
//! These types deserialize directly from the JSON body of InfluxDB's
//! `/query` endpoint:
//!
//! ```json
//! {"results": [{"statement_id": 0, "series": [
//!     {"name": "cpu", "tags": {"host": "a"},
//!      "columns": ["time", "usage"],
//!      "values": [["2023-11-14T22:13:20Z", 0.5]]}
//! ]}]}
//! ```
//!
//! A multi-statement query yields one [`QueryResult`] per statement. A
//! result carries either series or an error string.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DecodeError, Result};

/// Complete response of one `/query` request.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResponse {
    /// One result per statement, in statement order.
    #[serde(default)]
    pub results: Vec<QueryResult>,

    /// Request-level error, e.g. an unparseable query.
    #[serde(default)]
    pub error: Option<String>,
}

impl QueryResponse {
    /// Returns the first server-reported error, request-level first.
    pub fn first_error(&self) -> Option<&str> {
        self.error
            .as_deref()
            .or_else(|| self.results.iter().find_map(|r| r.error.as_deref()))
    }

    /// Fails with the first server-reported error, if any.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::QueryExecution` carrying the server's message.
    pub fn check(&self) -> Result<()> {
        match self.first_error() {
            Some(message) => Err(DecodeError::QueryExecution {
                message: message.to_string(),
            }
            .into()),
            None => Ok(()),
        }
    }
}

/// Result of a single statement.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QueryResult {
    /// Zero-based index of the statement within the query.
    #[serde(default)]
    pub statement_id: usize,

    /// Series returned by the statement, in server order.
    #[serde(default)]
    pub series: Vec<Series>,

    /// Error reported for this statement instead of series.
    #[serde(default)]
    pub error: Option<String>,
}

impl QueryResult {
    /// Creates a successful result holding `series`.
    pub fn from_series(series: Vec<Series>) -> Self {
        Self {
            statement_id: 0,
            series,
            error: None,
        }
    }

    /// Creates a failed result holding the server's error message.
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            statement_id: 0,
            series: Vec::new(),
            error: Some(message.into()),
        }
    }

    /// Total number of rows across all series.
    pub fn row_count(&self) -> usize {
        self.series.iter().map(|s| s.values.len()).sum()
    }

    /// Returns `true` if the result holds no rows.
    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }
}

/// Rows returned for one measurement and tag combination.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Series {
    /// Measurement name.
    #[serde(default)]
    pub name: String,

    /// Series-level tags, present for `GROUP BY` queries.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,

    /// Column names, aligned with each row's values.
    #[serde(default)]
    pub columns: Vec<String>,

    /// Rows of raw values, in server order.
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

impl Series {
    /// Creates a series with `columns` and no rows.
    pub fn new(name: impl Into<String>, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            tags: BTreeMap::new(),
            columns: columns.iter().map(|c| (*c).to_string()).collect(),
            values: Vec::new(),
        }
    }

    /// Adds a series-level tag.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Appends a row.
    #[must_use]
    pub fn with_row(mut self, row: Vec<Value>) -> Self {
        self.values.push(row);
        self
    }

    /// Index of the column named `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}
