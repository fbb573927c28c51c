//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values; two
/// value objects with the same values are the same value. `Quantity`,
/// `Distance` and `KmsYear` are the value objects of this domain, as opposed
/// to entities like a vehicle, which keep their identity across edits.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
