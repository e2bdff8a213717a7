//! # fluxmap
//!
//! InfluxDB 1.x client with derive-driven mapping between Rust structs and
//! points.
//!
//! fluxmap manages databases and retention policies over the InfluxDB HTTP
//! API, writes points in line protocol, and maps query results back into
//! typed structs. The mapping is declared on the struct itself with
//! `#[derive(Measurement)]`.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fluxmap::{Client, ClientConfig, Measurement};
//! use fluxmap::chrono::{DateTime, Utc};
//!
//! #[derive(Debug, Default, Measurement)]
//! #[influx(measurement = "cpu")]
//! struct CpuSample {
//!     #[influx(tag)]
//!     host: String,
//!     #[influx(field = "usage")]
//!     usage_percent: f64,
//!     #[influx(timestamp)]
//!     time: Option<DateTime<Utc>>,
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = Client::connect(ClientConfig::new("http://localhost:8086"))?;
//! client.use_database("telemetry")?;
//!
//! client.write(&CpuSample {
//!     host: "web1".to_string(),
//!     usage_percent: 85.5,
//!     time: Some(Utc::now()),
//! })?;
//!
//! let samples: Vec<CpuSample> = client.all_points_in_current()?;
//! for sample in samples {
//!     println!("{} {}", sample.host, sample.usage_percent);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Measurement`] — Trait implemented by the derive; exposes the struct's shape
//! - [`Resolver`] — Validates shapes into cached [`MeasurementDescriptor`]s
//! - [`encode()`] — Struct to [`Point`]
//! - [`decode()`] — [`QueryResult`] to structs
//! - [`Client`] — Database, retention policy, write and query operations over a [`Transport`]
//!
//! ## Modules
//!
//! - [`shape`] — Marker vocabulary and the `Measurement` trait
//! - [`value`] — Field values and member type conversions
//! - [`resolver`] — Shape validation and descriptor cache
//! - [`coerce`] — Wire value coercion rules
//! - [`point`] — Point model, builder, and precision
//! - [`encode`] — Struct to point encoding
//! - [`result`] — Query response model
//! - [`decode`] — Query result to struct decoding
//! - [`line_protocol`] — Line protocol serialization
//! - [`transport`] — Transport boundary and the HTTP implementation
//! - [`retention`] — Retention policy definitions
//! - [`client`] — High-level client
//! - [`error`] — Error types

// Lets the derive's `::fluxmap::` paths resolve inside this crate.
extern crate self as fluxmap;

pub mod client;
pub mod coerce;
pub mod decode;
pub mod encode;
pub mod error;
pub mod line_protocol;
pub mod point;
pub mod resolver;
pub mod result;
pub mod retention;
pub mod shape;
pub mod transport;
pub mod value;

pub use chrono;
pub use fluxmap_derive::Measurement;

// Re-export primary API types at crate root for convenience.
pub use client::Client;
pub use decode::{decode, decode_one, decode_response, decode_series, points_from_result};
pub use encode::{encode, encode_default};
pub use error::{FluxError, Result};
pub use point::{Point, PointBuilder, Precision};
pub use resolver::{FieldDescriptor, MeasurementDescriptor, Resolver, TagDescriptor, TimestampDescriptor};
pub use result::{QueryResponse, QueryResult, Series};
pub use retention::RetentionPolicy;
pub use shape::{Marker, Measurement, MemberSpec, Shape};
#[cfg(feature = "http")]
pub use transport::{ClientConfig, HttpTransport};
pub use transport::{ServerInfo, Transport};
pub use value::{FieldValue, MemberValue, TimestampValue, ValueKind};
