//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable, self-validating and compared by their
/// attributes. Factories (`from_str`, `parse`, `new`) are the only way to build
/// one, so holding a value means it is valid.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
