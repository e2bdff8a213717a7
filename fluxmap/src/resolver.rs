//! Shape resolution: validating a [`Shape`] into a [`MeasurementDescriptor`].
//!
//! Resolution is a pure function of the shape. [`Resolver`] memoizes it per
//! Rust type so each shape is validated once per process (or once per
//! resolver instance).
//!
//! # Rules
//!
//! 1. Every member carries exactly one marker.
//! 2. At most one member is the timestamp.
//! 3. At least one member is a field.
//! 4. Serialized tag and field names are non-empty, unique across tags and
//!    fields, and never `time` (the timestamp column).
//! 5. The measurement name is non-empty.
//!
//! Rules 1, 2 and 4 fail with [`ShapeError::Conflict`]; rules 3 and 5 with
//! [`ShapeError::Invalid`].
//!
//! # Concurrency
//!
//! The cache is read under a shared lock. On a miss, the descriptor is
//! computed with no lock held and inserted with insert-if-absent semantics:
//! two threads racing on the same type may both compute, but both get back
//! the one descriptor that won the insert.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use crate::error::{Result, ShapeError};
use crate::point::Precision;
use crate::shape::{Marker, Measurement, Shape};
use crate::value::ValueKind;

/// Name of the timestamp column in query results.
pub const TIME_COLUMN: &str = "time";

/// A tag member of a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDescriptor {
    /// Serialized tag key.
    pub name: String,
    /// Index of the member in the shape.
    pub member: usize,
    /// Declared kind of the member. Tags are always written as text.
    pub kind: ValueKind,
}

/// A field member of a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Serialized field key.
    pub name: String,
    /// Index of the member in the shape.
    pub member: usize,
    /// Declared kind of the member.
    pub kind: ValueKind,
    /// Whether decoding requires the column to be present.
    pub required: bool,
}

/// The timestamp member of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampDescriptor {
    /// Index of the member in the shape.
    pub member: usize,
    /// Precision the timestamp is written and read in.
    pub precision: Precision,
}

/// Validated mapping between a Rust type and a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementDescriptor {
    /// Rust type name of the shape.
    pub type_name: &'static str,
    /// Default measurement name.
    pub name: String,
    /// Tags in member declaration order.
    pub tags: Vec<TagDescriptor>,
    /// Fields in member declaration order.
    pub fields: Vec<FieldDescriptor>,
    /// The timestamp member, if declared.
    pub timestamp: Option<TimestampDescriptor>,
}

impl MeasurementDescriptor {
    /// Validates `shape` into a descriptor.
    ///
    /// # Errors
    ///
    /// Returns `ShapeError` when the shape breaks one of the module-level rules.
    pub fn from_shape(shape: &Shape) -> Result<Self> {
        let conflict = |reason: String| ShapeError::Conflict {
            shape: shape.type_name.to_string(),
            reason,
        };
        let invalid = |reason: String| ShapeError::Invalid {
            shape: shape.type_name.to_string(),
            reason,
        };

        if shape.measurement.is_empty() {
            return Err(invalid("measurement name is empty".to_string()).into());
        }

        let mut tags: Vec<TagDescriptor> = Vec::new();
        let mut fields: Vec<FieldDescriptor> = Vec::new();
        let mut timestamp: Option<(TimestampDescriptor, &str)> = None;

        for (index, member) in shape.members.iter().enumerate() {
            let marker = match member.markers.as_slice() {
                [marker] => *marker,
                [] => continue,
                _ => {
                    return Err(conflict(format!(
                        "member '{}' carries more than one marker",
                        member.ident
                    ))
                    .into());
                }
            };

            if let Marker::Timestamp(precision) = marker {
                if let Some((_, first)) = timestamp {
                    return Err(conflict(format!(
                        "members '{first}' and '{}' are both timestamps",
                        member.ident
                    ))
                    .into());
                }
                timestamp = Some((
                    TimestampDescriptor {
                        member: index,
                        precision,
                    },
                    member.ident,
                ));
                continue;
            }

            let name = member.name();
            if name.is_empty() {
                return Err(invalid(format!("member '{}' has an empty name", member.ident)).into());
            }
            if name == TIME_COLUMN {
                return Err(conflict(format!(
                    "member '{}' uses the reserved name '{TIME_COLUMN}'",
                    member.ident
                ))
                .into());
            }
            let taken = tags.iter().any(|t| t.name == name) || fields.iter().any(|f| f.name == name);
            if taken {
                return Err(conflict(format!(
                    "name '{name}' is used by more than one tag or field"
                ))
                .into());
            }

            match marker {
                Marker::Tag => tags.push(TagDescriptor {
                    name: name.to_string(),
                    member: index,
                    kind: member.kind,
                }),
                Marker::Field => fields.push(FieldDescriptor {
                    name: name.to_string(),
                    member: index,
                    kind: member.kind,
                    required: member.required,
                }),
                Marker::Timestamp(_) => {}
            }
        }

        if fields.is_empty() {
            return Err(invalid("a measurement needs at least one field".to_string()).into());
        }

        Ok(Self {
            type_name: shape.type_name,
            name: shape.measurement.to_string(),
            tags,
            fields,
            timestamp: timestamp.map(|(descriptor, _)| descriptor),
        })
    }

    /// Looks up a tag or field name, returning its member index.
    pub fn member_for(&self, name: &str) -> Option<usize> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.member)
            .or_else(|| self.fields.iter().find(|f| f.name == name).map(|f| f.member))
    }
}

/// Memoizing shape resolver.
///
/// Successful resolutions are cached by `TypeId`; failures are not cached
/// and are recomputed on every call.
#[derive(Debug, Default)]
pub struct Resolver {
    cache: RwLock<HashMap<TypeId, Arc<MeasurementDescriptor>>>,
}

impl Resolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide resolver used by [`encode`](crate::encode()) and
    /// [`decode`](crate::decode()).
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<Resolver> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// Resolves the shape of `T`, using the cache when possible.
    ///
    /// # Errors
    ///
    /// Returns `ShapeError` when the shape of `T` is invalid.
    pub fn resolve<T: Measurement>(&self) -> Result<Arc<MeasurementDescriptor>> {
        let key = TypeId::of::<T>();

        if let Some(descriptor) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Ok(Arc::clone(descriptor));
        }

        let shape = T::shape();
        let descriptor = Arc::new(MeasurementDescriptor::from_shape(&shape)?);

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let cached = cache.entry(key).or_insert_with(|| {
            tracing::debug!(
                shape = shape.type_name,
                measurement = %descriptor.name,
                tags = descriptor.tags.len(),
                fields = descriptor.fields.len(),
                "resolved measurement shape"
            );
            Arc::clone(&descriptor)
        });
        Ok(Arc::clone(cached))
    }

    /// Number of cached descriptors.
    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoercionError, FluxError};
    use crate::shape::MemberSpec;
    use crate::value::FieldValue;

    fn member(ident: &'static str, markers: Vec<Marker>, kind: ValueKind) -> MemberSpec {
        MemberSpec {
            ident,
            rename: None,
            markers,
            kind,
            required: true,
        }
    }

    fn shape(members: Vec<MemberSpec>) -> Shape {
        Shape {
            type_name: "Test",
            measurement: "test",
            members,
        }
    }

    #[test]
    fn test_resolve_classifies_members() {
        let mut host = member("host", vec![Marker::Tag], ValueKind::Text);
        host.rename = Some("hostname");
        let shape = shape(vec![
            host,
            member("cpu", vec![Marker::Field], ValueKind::Float),
            member("at", vec![Marker::Timestamp(Precision::Seconds)], ValueKind::Timestamp),
            member("count", vec![Marker::Field], ValueKind::Integer),
        ]);

        let descriptor = MeasurementDescriptor::from_shape(&shape).unwrap();

        assert_eq!(descriptor.name, "test");
        assert_eq!(descriptor.tags.len(), 1);
        assert_eq!(descriptor.tags[0].name, "hostname");
        assert_eq!(descriptor.tags[0].member, 0);
        let names: Vec<_> = descriptor.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["cpu", "count"]);
        assert_eq!(descriptor.fields[1].member, 3);
        assert_eq!(
            descriptor.timestamp,
            Some(TimestampDescriptor {
                member: 2,
                precision: Precision::Seconds
            })
        );
        assert_eq!(descriptor.member_for("hostname"), Some(0));
        assert_eq!(descriptor.member_for("host"), None);
    }

    #[test]
    fn test_resolve_rejects_shape_without_fields() {
        let shape = shape(vec![member("host", vec![Marker::Tag], ValueKind::Text)]);
        let result = MeasurementDescriptor::from_shape(&shape);
        assert!(matches!(
            result,
            Err(FluxError::Shape(ShapeError::Invalid { .. }))
        ));
    }

    #[test]
    fn test_resolve_rejects_two_timestamps() {
        let shape = shape(vec![
            member("v", vec![Marker::Field], ValueKind::Float),
            member("a", vec![Marker::Timestamp(Precision::Nanoseconds)], ValueKind::Timestamp),
            member("b", vec![Marker::Timestamp(Precision::Nanoseconds)], ValueKind::Timestamp),
        ]);
        let result = MeasurementDescriptor::from_shape(&shape);
        assert!(matches!(
            result,
            Err(FluxError::Shape(ShapeError::Conflict { ref reason, .. })) if reason.contains("'a' and 'b'")
        ));
    }

    #[test]
    fn test_resolve_rejects_duplicate_names() {
        let mut renamed = member("other", vec![Marker::Field], ValueKind::Float);
        renamed.rename = Some("v");
        let duplicate_field = shape(vec![member("v", vec![Marker::Field], ValueKind::Float), renamed]);
        assert!(matches!(
            MeasurementDescriptor::from_shape(&duplicate_field),
            Err(FluxError::Shape(ShapeError::Conflict { .. }))
        ));

        let mut tag = member("host_tag", vec![Marker::Tag], ValueKind::Text);
        tag.rename = Some("host");
        let mut second = member("host_again", vec![Marker::Tag], ValueKind::Text);
        second.rename = Some("host");
        let duplicate_tag = shape(vec![
            tag,
            second,
            member("v", vec![Marker::Field], ValueKind::Float),
        ]);
        assert!(matches!(
            MeasurementDescriptor::from_shape(&duplicate_tag),
            Err(FluxError::Shape(ShapeError::Conflict { .. }))
        ));

        let tag_and_field = shape(vec![
            member("v", vec![Marker::Tag], ValueKind::Text),
            {
                let mut f = member("value", vec![Marker::Field], ValueKind::Float);
                f.rename = Some("v");
                f
            },
        ]);
        assert!(matches!(
            MeasurementDescriptor::from_shape(&tag_and_field),
            Err(FluxError::Shape(ShapeError::Conflict { .. }))
        ));
    }

    #[test]
    fn test_resolve_rejects_double_marker_and_reserved_name() {
        let double = shape(vec![member(
            "v",
            vec![Marker::Tag, Marker::Field],
            ValueKind::Text,
        )]);
        assert!(matches!(
            MeasurementDescriptor::from_shape(&double),
            Err(FluxError::Shape(ShapeError::Conflict { .. }))
        ));

        let reserved = shape(vec![member("time", vec![Marker::Field], ValueKind::Integer)]);
        assert!(matches!(
            MeasurementDescriptor::from_shape(&reserved),
            Err(FluxError::Shape(ShapeError::Conflict { .. }))
        ));
    }

    #[test]
    fn test_resolve_rejects_empty_measurement() {
        let mut empty = shape(vec![member("v", vec![Marker::Field], ValueKind::Float)]);
        empty.measurement = "";
        assert!(matches!(
            MeasurementDescriptor::from_shape(&empty),
            Err(FluxError::Shape(ShapeError::Invalid { .. }))
        ));
    }

    #[derive(Default)]
    struct Manual {
        value: f64,
    }

    impl Measurement for Manual {
        fn shape() -> Shape {
            Shape {
                type_name: "Manual",
                measurement: "manual",
                members: vec![member("value", vec![Marker::Field], ValueKind::Float)],
            }
        }

        fn member_value(&self, index: usize) -> Option<FieldValue> {
            (index == 0).then_some(FieldValue::Float(self.value))
        }

        fn set_member_value(
            &mut self,
            index: usize,
            value: FieldValue,
        ) -> std::result::Result<(), CoercionError> {
            if let (0, FieldValue::Float(v)) = (index, value) {
                self.value = v;
            }
            Ok(())
        }
    }

    #[test]
    fn test_resolver_memoizes() {
        let resolver = Resolver::new();
        assert!(resolver.is_empty());

        let first = resolver.resolve::<Manual>().unwrap();
        let second = resolver.resolve::<Manual>().unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
        assert_eq!(resolver.len(), 1);
    }

    #[test]
    fn test_concurrent_first_resolution_converges() {
        let resolver = Resolver::new();

        let descriptors: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| resolver.resolve::<Manual>().unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(resolver.len(), 1);
        let cached = resolver.resolve::<Manual>().unwrap();
        for descriptor in &descriptors {
            assert!(Arc::ptr_eq(descriptor, &cached));
        }
    }
}
