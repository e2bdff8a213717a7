//! Declarative marker vocabulary and the [`Measurement`] trait.
//!
//! A shape is the static description of a struct as a measurement: its
//! default measurement name and the list of marked members. It is normally
//! generated by `#[derive(Measurement)]`:
//!
//! ```rust
//! use fluxmap::Measurement;
//! use fluxmap::chrono::{DateTime, Utc};
//!
//! #[derive(Default, Measurement)]
//! #[influx(measurement = "disk")]
//! struct DiskUsage {
//!     #[influx(tag)]
//!     host: String,
//!     #[influx(tag = "mount")]
//!     mount_point: Option<String>,
//!     #[influx(field)]
//!     used_bytes: i64,
//!     #[influx(field)]
//!     healthy: bool,
//!     #[influx(timestamp, precision = "s")]
//!     time: Option<DateTime<Utc>>,
//!     // Unmarked members are never written or read.
//!     cached_label: String,
//! }
//!
//! let shape = DiskUsage::shape();
//! assert_eq!(shape.measurement, "disk");
//! assert_eq!(shape.members.len(), 5);
//! ```
//!
//! Members are addressed by their index in [`Shape::members`]; the accessors
//! never look members up by name.

use chrono::{DateTime, Utc};

use crate::error::CoercionError;
use crate::point::Precision;
use crate::value::{FieldValue, ValueKind};

/// A declarative marker placed on a struct member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Marker {
    /// The member is a tag.
    Tag,
    /// The member is a field.
    Field,
    /// The member supplies the point timestamp at the given precision.
    Timestamp(Precision),
}

/// One marked member of a shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSpec {
    /// The member's Rust identifier.
    pub ident: &'static str,
    /// Serialized name override from the marker, if any.
    pub rename: Option<&'static str>,
    /// Every marker found on the member. Valid shapes have exactly one.
    pub markers: Vec<Marker>,
    /// Declared kind of the member's value.
    pub kind: ValueKind,
    /// Whether the member's column must be present when decoding.
    pub required: bool,
}

impl MemberSpec {
    /// Serialized name: the override if given, the identifier otherwise.
    pub fn name(&self) -> &'static str {
        self.rename.unwrap_or(self.ident)
    }
}

/// Static description of a struct as a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    /// Rust type name, used in error messages.
    pub type_name: &'static str,
    /// Default measurement name.
    pub measurement: &'static str,
    /// Marked members in declaration order. Unmarked members are not listed.
    pub members: Vec<MemberSpec>,
}

/// A struct that maps to and from points.
///
/// Implemented by `#[derive(Measurement)]`. Manual implementations are
/// validated by the [`Resolver`](crate::Resolver) exactly like derived ones.
pub trait Measurement: Default + 'static {
    /// Returns the static shape of the type.
    fn shape() -> Shape;

    /// Returns the value of the tag or field member at `index`, `None` when
    /// the member is absent.
    fn member_value(&self, index: usize) -> Option<FieldValue>;

    /// Assigns the tag or field member at `index`.
    ///
    /// # Errors
    ///
    /// Returns `CoercionError` if `value` does not fit the member's type.
    fn set_member_value(&mut self, index: usize, value: FieldValue) -> Result<(), CoercionError>;

    /// Returns the timestamp member's value, if the shape has one and it is set.
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// Assigns the timestamp member. A no-op for shapes without one.
    fn set_timestamp(&mut self, timestamp: DateTime<Utc>) {
        let _ = timestamp;
    }
}
