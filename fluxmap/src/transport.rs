//! Transport boundary between the client and an InfluxDB server.
//!
//! [`Transport`] is the only thing the [`Client`](crate::Client) talks to.
//! [`HttpTransport`] implements it over the InfluxDB 1.x HTTP API; tests
//! substitute an in-memory implementation.

#[cfg(feature = "http")]
mod http;

#[cfg(feature = "http")]
pub use http::{ClientConfig, HttpTransport};

use crate::error::Result;
use crate::point::Point;
use crate::result::QueryResponse;

/// Server identity reported by a ping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server version, e.g. `1.8.10`.
    pub version: String,
    /// Build type, e.g. `OSS`.
    pub build: String,
}

/// Request/response exchange with an InfluxDB server.
pub trait Transport {
    /// Base URL of the server, for diagnostics.
    fn url(&self) -> &str;

    /// Checks that the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the server cannot be reached.
    fn ping(&self) -> Result<ServerInfo>;

    /// Runs a read statement and returns the raw response.
    ///
    /// Statement-level errors are left in the response for the caller.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the request fails or the body is not a
    /// query response.
    fn query(&self, database: Option<&str>, statement: &str) -> Result<QueryResponse>;

    /// Runs a mutating statement such as `CREATE DATABASE`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the request fails, and
    /// `DecodeError::QueryExecution` if the server reports an error.
    fn execute(&self, statement: &str) -> Result<()>;

    /// Writes points to `database`, optionally under a retention policy.
    ///
    /// # Errors
    ///
    /// Returns `LineProtocolError` if the points cannot be serialized and
    /// `TransportError` if the server rejects them.
    fn write(&self, database: &str, retention_policy: Option<&str>, points: &[Point]) -> Result<()>;
}
