//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values, never
/// by identity. To "modify" one, create a new one with the new values.
/// `Money` in this crate is the canonical example; an entity such as a
/// product is not (two products with the same attributes are still distinct).
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
