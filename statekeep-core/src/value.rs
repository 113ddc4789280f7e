/*!
Property values and the handles they may reference.

A property value tree is generic over how it represents references to other
objects. Live values read from the simulation carry [`ObjectHandle`]s, the
sanitized stream carries [`RefIndex`] entries into the save's reference
table, and values being loaded carry [`crate::sanitizer::LoadedRef`]s.
*/

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque handle to a live object, issued by the object lifecycle collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHandle(pub u64);

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Index into the reference table of one save payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefIndex(pub u32);

/// Coarse type of a property value, used by schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Accepts any value
    Any,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    List,
    Record,
    Reference,
}

impl ValueKind {
    /// Whether a value of kind `other` may be stored in a field of this kind.
    ///
    /// `Null` is accepted everywhere since it is what an unreachable reference
    /// or an unset value turns into.
    pub fn accepts(self, other: Option<ValueKind>) -> bool {
        match (self, other) {
            (ValueKind::Any, _) | (_, None) => true,
            (expected, Some(actual)) => expected == actual,
        }
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue<R> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<PropertyValue<R>>),
    /// Nested record of named properties, kept in declaration order
    Record(Vec<Property<R>>),
    /// Reference to another object
    Reference(R),
}

/// A named property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property<R> {
    pub name: String,
    pub value: PropertyValue<R>,
}

/// Property read from or written to a live object.
pub type LiveProperty = Property<ObjectHandle>;
/// Value read from or written to a live object.
pub type LiveValue = PropertyValue<ObjectHandle>;

impl<R> Property<R> {
    pub fn new<S: Into<String>>(name: S, value: PropertyValue<R>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Rewrite every reference in this property, keeping the name.
    pub fn try_map_refs<S, E, F>(self, f: &mut F) -> std::result::Result<Property<S>, E>
    where
        F: FnMut(R) -> std::result::Result<PropertyValue<S>, E>,
    {
        Ok(Property {
            name: self.name,
            value: self.value.try_map_refs(f)?,
        })
    }
}

impl<R> PropertyValue<R> {
    /// Kind of this value, `None` for `Null`.
    pub fn kind(&self) -> Option<ValueKind> {
        Some(match self {
            PropertyValue::Null => return None,
            PropertyValue::Bool(_) => ValueKind::Bool,
            PropertyValue::Int(_) => ValueKind::Int,
            PropertyValue::Float(_) => ValueKind::Float,
            PropertyValue::Text(_) => ValueKind::Text,
            PropertyValue::Bytes(_) => ValueKind::Bytes,
            PropertyValue::List(_) => ValueKind::List,
            PropertyValue::Record(_) => ValueKind::Record,
            PropertyValue::Reference(_) => ValueKind::Reference,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }

    /// Rewrite every reference in the tree.
    ///
    /// The closure decides what each reference becomes; returning
    /// `PropertyValue::Null` drops the reference in place.
    pub fn try_map_refs<S, E, F>(self, f: &mut F) -> std::result::Result<PropertyValue<S>, E>
    where
        F: FnMut(R) -> std::result::Result<PropertyValue<S>, E>,
    {
        Ok(match self {
            PropertyValue::Null => PropertyValue::Null,
            PropertyValue::Bool(v) => PropertyValue::Bool(v),
            PropertyValue::Int(v) => PropertyValue::Int(v),
            PropertyValue::Float(v) => PropertyValue::Float(v),
            PropertyValue::Text(v) => PropertyValue::Text(v),
            PropertyValue::Bytes(v) => PropertyValue::Bytes(v),
            PropertyValue::List(items) => PropertyValue::List(
                items
                    .into_iter()
                    .map(|item| item.try_map_refs(&mut *f))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            PropertyValue::Record(fields) => PropertyValue::Record(
                fields
                    .into_iter()
                    .map(|field| field.try_map_refs(&mut *f))
                    .collect::<std::result::Result<_, _>>()?,
            ),
            PropertyValue::Reference(r) => f(r)?,
        })
    }

    /// Visit every reference in the tree in depth-first order.
    pub fn visit_refs<F: FnMut(&R)>(&self, f: &mut F) {
        match self {
            PropertyValue::List(items) => items.iter().for_each(|item| item.visit_refs(&mut *f)),
            PropertyValue::Record(fields) => fields
                .iter()
                .for_each(|field| field.value.visit_refs(&mut *f)),
            PropertyValue::Reference(r) => f(r),
            _ => {}
        }
    }

    /// Convert a reference-free value into another reference representation.
    ///
    /// Returns `None` if the value contains any reference.
    pub fn without_refs<S>(&self) -> Option<PropertyValue<S>>
    where
        R: Clone,
    {
        self.clone()
            .try_map_refs(&mut |_| Err::<PropertyValue<S>, ()>(()))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LiveValue {
        PropertyValue::Record(vec![
            Property::new("target", PropertyValue::Reference(ObjectHandle(7))),
            Property::new(
                "squad",
                PropertyValue::List(vec![
                    PropertyValue::Reference(ObjectHandle(8)),
                    PropertyValue::Int(3),
                ]),
            ),
        ])
    }

    #[test]
    fn test_visit_refs_in_order() {
        let mut seen = Vec::new();
        sample().visit_refs(&mut |h| seen.push(*h));
        assert_eq!(seen, vec![ObjectHandle(7), ObjectHandle(8)]);
    }

    #[test]
    fn test_map_refs_rewrites_nested_references() {
        let mapped: PropertyValue<RefIndex> = sample()
            .try_map_refs(&mut |h: ObjectHandle| {
                Ok::<_, ()>(PropertyValue::Reference(RefIndex(h.0 as u32 * 10)))
            })
            .unwrap();

        let mut seen = Vec::new();
        mapped.visit_refs(&mut |r| seen.push(*r));
        assert_eq!(seen, vec![RefIndex(70), RefIndex(80)]);
    }

    #[test]
    fn test_map_refs_can_null_references() {
        let mapped: PropertyValue<RefIndex> = PropertyValue::<ObjectHandle>::List(vec![
            PropertyValue::Reference(ObjectHandle(1)),
        ])
        .try_map_refs(&mut |_| Ok::<_, ()>(PropertyValue::Null))
        .unwrap();
        assert_eq!(mapped, PropertyValue::List(vec![PropertyValue::Null]));
    }

    #[test]
    fn test_kind_and_acceptance() {
        assert_eq!(PropertyValue::<RefIndex>::Int(1).kind(), Some(ValueKind::Int));
        assert_eq!(PropertyValue::<RefIndex>::Null.kind(), None);
        assert!(ValueKind::Int.accepts(None));
        assert!(ValueKind::Any.accepts(Some(ValueKind::Text)));
        assert!(!ValueKind::Int.accepts(Some(ValueKind::Float)));
    }

    #[test]
    fn test_without_refs() {
        let plain: LiveValue = PropertyValue::Text("crate".into());
        assert_eq!(
            plain.without_refs::<RefIndex>(),
            Some(PropertyValue::Text("crate".into()))
        );
        assert!(sample().without_refs::<RefIndex>().is_none());
    }
}
