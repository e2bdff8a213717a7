//! Error types for the fluxmap client.

use thiserror::Error;

use crate::value::ValueKind;

/// The main error type for all fluxmap operations.
///
/// Mapping failures (shape, encode, decode, coercion) are local and
/// synchronous: an operation that returns one of them produced no output.
/// Transport and client errors come from talking to the server.
#[derive(Error, Debug)]
pub enum FluxError {
    /// A struct shape could not be turned into a measurement descriptor.
    #[error("shape error: {0}")]
    Shape(#[from] ShapeError),

    /// A value could not be encoded into a point.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// A query result could not be decoded into values.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A raw value could not be converted to the declared kind.
    #[error("coercion error: {0}")]
    Coercion(#[from] CoercionError),

    /// A point could not be serialized to line protocol.
    #[error("line protocol error: {0}")]
    LineProtocol(#[from] LineProtocolError),

    /// Communication with the server failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A database or retention policy precondition failed.
    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

/// Errors raised while resolving a measurement shape.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    /// The shape cannot describe a measurement at all.
    #[error("invalid shape {shape}: {reason}")]
    Invalid {
        /// Rust type name of the shape.
        shape: String,
        /// Why the shape is unusable.
        reason: String,
    },

    /// Two members of the shape collide.
    #[error("conflicting shape {shape}: {reason}")]
    Conflict {
        /// Rust type name of the shape.
        shape: String,
        /// Which members collide and how.
        reason: String,
    },
}

/// Errors raised while encoding a value into a point.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    /// Every field of the value was absent, so there is nothing to write.
    #[error("point for measurement '{measurement}' has no fields")]
    EmptyPoint {
        /// The measurement the point was meant for.
        measurement: String,
    },

    /// The measurement name is empty.
    #[error("measurement name must not be empty")]
    EmptyMeasurement,
}

/// Errors raised while decoding a query result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The server reported an error for the statement.
    #[error("query failed: {message}")]
    QueryExecution {
        /// Error message as reported by the server.
        message: String,
    },

    /// A series lacks the column of a required (non-optional) field.
    #[error("series '{series}' has no column '{column}' required by {shape}")]
    MissingColumn {
        /// Rust type name of the target shape.
        shape: String,
        /// The series name.
        series: String,
        /// The missing column.
        column: String,
    },

    /// A row does not have one value per column.
    #[error("row {row} of series '{series}' has {actual} values, expected {expected}")]
    RowLength {
        /// The series name.
        series: String,
        /// Zero-based row index within the series.
        row: usize,
        /// Number of columns.
        expected: usize,
        /// Number of values in the row.
        actual: usize,
    },

    /// A single-value decode found more than one row.
    #[error("expected at most one row, found {rows}")]
    MultipleRows {
        /// Total number of rows across all series.
        rows: usize,
    },
}

/// A raw value could not be converted to the target kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "cannot convert {value} to {target}{}",
    .column.as_ref().map(|c| format!(" in column '{c}'")).unwrap_or_default()
)]
pub struct CoercionError {
    /// The column the value came from, when known.
    pub column: Option<String>,
    /// The kind the value was being converted to.
    pub target: ValueKind,
    /// Text rendering of the offending raw value.
    pub value: String,
}

impl CoercionError {
    /// Creates an error for `value` that could not become `target`.
    pub fn new(target: ValueKind, value: impl Into<String>) -> Self {
        Self {
            column: None,
            target,
            value: value.into(),
        }
    }

    /// Attaches the column name, keeping one that is already set.
    #[must_use]
    pub fn in_column(mut self, column: &str) -> Self {
        if self.column.is_none() {
            self.column = Some(column.to_string());
        }
        self
    }
}

/// Errors raised while serializing points to line protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LineProtocolError {
    /// A float field is NaN or infinite, which line protocol cannot carry.
    #[error("field '{field}' of measurement '{measurement}' is not a finite number")]
    NonFiniteField {
        /// The measurement name.
        measurement: String,
        /// The field key.
        field: String,
    },

    /// A tag or field key is empty.
    #[error("measurement '{measurement}' has an empty key")]
    EmptyKey {
        /// The measurement name.
        measurement: String,
    },

    /// The timestamp does not fit an epoch integer at the requested precision.
    #[error("timestamp of measurement '{measurement}' is out of range")]
    TimestampOutOfRange {
        /// The measurement name.
        measurement: String,
    },

    /// A batch mixes points with different precisions.
    #[error("batch mixes precisions {first} and {other}")]
    MixedPrecision {
        /// Precision of the first point.
        first: String,
        /// The differing precision.
        other: String,
    },
}

/// Errors raised by a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to create the HTTP client.
    #[cfg(feature = "http")]
    #[error("failed to create HTTP client: {source}")]
    ClientCreate {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// HTTP request failed after retries.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {source}")]
    RequestFailed {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// Server returned a non-2xx status.
    #[error("server returned status {status}: {message}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// The server's error message, or the raw body.
        message: String,
    },

    /// The response body is not a valid query response.
    #[error("invalid query response: {source}")]
    InvalidResponse {
        /// The JSON parsing error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors raised by client-side precondition checks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// An operation on the current database was called before `use_database`.
    #[error("no database selected")]
    NoDatabaseSelected,

    /// The named database does not exist.
    #[error("unknown database '{name}'")]
    UnknownDatabase {
        /// The database name.
        name: String,
    },

    /// The named database already exists.
    #[error("database '{name}' already exists")]
    DatabaseAlreadyExists {
        /// The database name.
        name: String,
    },

    /// The server's internal database cannot be dropped.
    #[error("cannot drop internal database '{name}'")]
    InternalDatabase {
        /// The database name.
        name: String,
    },

    /// The named retention policy does not exist.
    #[error("unknown retention policy '{name}' on database '{database}'")]
    UnknownRetentionPolicy {
        /// The retention policy name.
        name: String,
        /// The database name.
        database: String,
    },

    /// The named retention policy already exists.
    #[error("retention policy '{name}' already exists on database '{database}'")]
    RetentionPolicyAlreadyExists {
        /// The retention policy name.
        name: String,
        /// The database name.
        database: String,
    },

    /// A duration string returned by the server could not be parsed.
    #[error("invalid duration '{value}'")]
    InvalidDuration {
        /// The unparseable duration.
        value: String,
    },
}

/// Type alias for `Result<T, FluxError>`.
pub type Result<T> = std::result::Result<T, FluxError>;
