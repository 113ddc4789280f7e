/*!
Reference sanitization.

Live property values point at other objects through [`ObjectHandle`]s, which
mean nothing outside the current session. Before encoding, every reference is
replaced by an index into a per-save [`ReferenceTable`] of stable identities;
on load the indices are turned back into live handles, or into deferred
references when the target does not exist yet.

The sanitizer never follows a reference into the referenced object, so
cyclic graphs need no special handling.
*/

use crate::identity::{ObjectIdentity, ObjectIdentityRegistry};
use crate::lifecycle::ObjectLifecycle;
use crate::value::{ObjectHandle, Property, PropertyValue, RefIndex};
use crate::{Result, StateError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::convert::Infallible;
use std::fmt;
use tracing::{debug, warn};

/// Ordered table of the identities referenced by one save.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceTable {
    entries: Vec<ObjectIdentity>,
    index: HashMap<ObjectIdentity, RefIndex>,
}

impl ReferenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from decoded entries.
    ///
    /// A table listing the same identity twice is corrupt.
    pub fn from_entries(entries: Vec<ObjectIdentity>) -> Result<Self> {
        let mut table = Self::new();
        for identity in entries {
            if table.index.contains_key(&identity) {
                return Err(StateError::format(format!(
                    "reference table lists {identity} twice"
                )));
            }
            table.intern(identity);
        }
        Ok(table)
    }

    /// Index of `identity`, adding it on first sight
    pub fn intern(&mut self, identity: ObjectIdentity) -> RefIndex {
        if let Some(&index) = self.index.get(&identity) {
            return index;
        }
        let index = RefIndex(self.entries.len() as u32);
        self.index.insert(identity.clone(), index);
        self.entries.push(identity);
        index
    }

    pub fn get(&self, index: RefIndex) -> Option<&ObjectIdentity> {
        self.entries.get(index.0 as usize)
    }

    pub fn index_of(&self, identity: &ObjectIdentity) -> Option<RefIndex> {
        self.index.get(identity).copied()
    }

    pub fn entries(&self) -> &[ObjectIdentity] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Properties of one object, keyed by the owner's identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordGroup<R> {
    pub owner: ObjectIdentity,
    /// Class used to recreate the owner on load
    pub class_name: String,
    /// Stable path used to find the owner on load
    pub path: String,
    pub properties: Vec<Property<R>>,
}

impl<R> RecordGroup<R> {
    pub fn new<C, P>(owner: ObjectIdentity, class_name: C, path: P) -> Self
    where
        C: Into<String>,
        P: Into<String>,
    {
        Self {
            owner,
            class_name: class_name.into(),
            path: path.into(),
            properties: Vec::new(),
        }
    }

    pub fn with_properties(mut self, properties: Vec<Property<R>>) -> Self {
        self.properties = properties;
        self
    }
}

/// Reference-free record stream plus the table its indices point into.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizedStream {
    pub table: ReferenceTable,
    pub groups: Vec<RecordGroup<RefIndex>>,
}

/// A reference read back from a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedRef {
    /// Target is live in this session
    Resolved(ObjectHandle),
    /// Target has not been found or recreated yet
    Deferred(ObjectIdentity),
}

/// A reference whose target never appeared during a load.
///
/// The reference was replaced by `Null`, or by the field default when it was
/// the whole property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReferenceWarning {
    pub owner: ObjectIdentity,
    pub property: String,
    pub target: ObjectIdentity,
}

impl fmt::Display for DanglingReferenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "property '{}' of {} references missing object {}",
            self.property, self.owner, self.target
        )
    }
}

/// Converts live references to table indices and back.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSanitizer {
    strict: bool,
}

impl ReferenceSanitizer {
    /// Create a sanitizer.
    ///
    /// # Arguments
    /// * `strict` - Fail on references that cannot be expressed instead of
    ///   writing them as `Null`
    pub fn new(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Replace every live reference by a reference table index.
    ///
    /// Referenced objects that are alive and persistable receive an identity
    /// if they have none. Other references are nulled, or rejected with
    /// [`StateError::UnresolvableReference`] in strict mode.
    ///
    /// # Arguments
    /// * `registry` - Identity registry of the current session
    /// * `world` - Lifecycle collaborator used to check reference targets
    /// * `live_groups` - Property groups as read from the live objects
    ///
    /// # Returns
    /// The sanitized stream with its reference table
    pub fn sanitize<W>(
        &self,
        registry: &mut ObjectIdentityRegistry,
        world: &W,
        live_groups: Vec<RecordGroup<ObjectHandle>>,
    ) -> Result<SanitizedStream>
    where
        W: ObjectLifecycle + ?Sized,
    {
        let mut table = ReferenceTable::new();
        let mut groups = Vec::with_capacity(live_groups.len());
        let mut nulled = 0usize;

        for group in live_groups {
            let RecordGroup {
                owner,
                class_name,
                path,
                properties,
            } = group;

            let mut sanitized = Vec::with_capacity(properties.len());
            for property in properties {
                let name = property.name.clone();
                let mut sanitize_ref = |target: ObjectHandle| -> Result<PropertyValue<RefIndex>> {
                    match world.describe(target).filter(|d| d.persistable) {
                        Some(descriptor) => {
                            let identity = registry.assign(target, &descriptor)?;
                            Ok(PropertyValue::Reference(table.intern(identity)))
                        }
                        None if self.strict => Err(StateError::UnresolvableReference {
                            property: name.clone(),
                            target,
                        }),
                        None => {
                            warn!(
                                owner = %owner,
                                property = %name,
                                target = %target,
                                "Reference to unavailable object written as null"
                            );
                            nulled += 1;
                            Ok(PropertyValue::Null)
                        }
                    }
                };
                let value = property.value.try_map_refs(&mut sanitize_ref)?;
                sanitized.push(Property::new(name, value));
            }

            groups.push(RecordGroup {
                owner,
                class_name,
                path,
                properties: sanitized,
            });
        }

        debug!(
            groups = groups.len(),
            references = table.len(),
            nulled,
            "Sanitized record stream"
        );
        Ok(SanitizedStream { table, groups })
    }

    /// Turn table indices back into references.
    ///
    /// Targets already live in the session become [`LoadedRef::Resolved`],
    /// everything else [`LoadedRef::Deferred`]. Targets owning a record of
    /// the same stream are always deferred: their owners are bound during
    /// apply, possibly to a different object than the registry knows now.
    pub fn desanitize(
        &self,
        registry: &ObjectIdentityRegistry,
        stream: SanitizedStream,
    ) -> Result<Vec<RecordGroup<LoadedRef>>> {
        let SanitizedStream { table, groups } = stream;
        let owners: HashSet<ObjectIdentity> = groups.iter().map(|g| g.owner.clone()).collect();

        let mut load_ref = |index: RefIndex| -> Result<PropertyValue<LoadedRef>> {
            let identity = table.get(index).ok_or_else(|| {
                StateError::format(format!(
                    "reference index {} out of range for a table of {} entries",
                    index.0,
                    table.len()
                ))
            })?;
            let live = if owners.contains(identity) {
                None
            } else {
                registry.resolve_identity(identity)
            };
            let loaded = match live {
                Some(handle) => LoadedRef::Resolved(handle),
                None => LoadedRef::Deferred(identity.clone()),
            };
            Ok(PropertyValue::Reference(loaded))
        };

        let mut loaded = Vec::with_capacity(groups.len());
        for group in groups {
            let properties = group
                .properties
                .into_iter()
                .map(|property| property.try_map_refs(&mut load_ref))
                .collect::<Result<Vec<_>>>()?;
            loaded.push(RecordGroup {
                owner: group.owner,
                class_name: group.class_name,
                path: group.path,
                properties,
            });
        }
        Ok(loaded)
    }

    /// Resolve deferred references once every object of the batch exists.
    ///
    /// A reference that is still unresolved becomes `Null` in place, so
    /// sibling values of the same list or record survive and an existing
    /// owner never keeps a handle to a vanished object. Each such reference
    /// produces one warning.
    pub fn resolve_deferred(
        &self,
        registry: &ObjectIdentityRegistry,
        groups: Vec<RecordGroup<LoadedRef>>,
    ) -> (Vec<RecordGroup<ObjectHandle>>, Vec<DanglingReferenceWarning>) {
        let mut warnings = Vec::new();

        let resolved = groups
            .into_iter()
            .map(|group| {
                let mut properties = Vec::with_capacity(group.properties.len());
                for property in group.properties {
                    let mut dangling = Vec::new();
                    let value = property
                        .value
                        .try_map_refs(&mut |reference: LoadedRef| {
                            let handle = match reference {
                                LoadedRef::Resolved(handle) => Some(handle),
                                LoadedRef::Deferred(identity) => {
                                    let handle = registry.resolve_identity(&identity);
                                    if handle.is_none() {
                                        dangling.push(identity);
                                    }
                                    handle
                                }
                            };
                            Ok::<_, Infallible>(
                                handle.map_or(PropertyValue::Null, PropertyValue::Reference),
                            )
                        })
                        .unwrap_or_else(|never| match never {});

                    for target in dangling {
                        warn!(
                            owner = %group.owner,
                            property = %property.name,
                            target = %target,
                            "Dangling reference replaced by null"
                        );
                        warnings.push(DanglingReferenceWarning {
                            owner: group.owner.clone(),
                            property: property.name.clone(),
                            target,
                        });
                    }
                    properties.push(Property::new(property.name, value));
                }

                RecordGroup {
                    owner: group.owner,
                    class_name: group.class_name,
                    path: group.path,
                    properties,
                }
            })
            .collect();

        (resolved, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IdentitySchemeKind;
    use crate::identity::OriginScope;
    use crate::lifecycle::{MemoryWorld, ObjectDescriptor};
    use uuid::Uuid;

    fn live_group(
        registry: &mut ObjectIdentityRegistry,
        world: &MemoryWorld,
        object: ObjectHandle,
        properties: Vec<Property<ObjectHandle>>,
    ) -> RecordGroup<ObjectHandle> {
        let descriptor = world.describe(object).unwrap();
        let owner = registry.assign(object, &descriptor).unwrap();
        RecordGroup::new(owner, descriptor.class_name, descriptor.path).with_properties(properties)
    }

    #[test]
    fn test_cycle_produces_one_entry_per_object() {
        let mut world = MemoryWorld::new();
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Generated);
        let a = world.spawn("A", "Node", OriginScope::Level);
        let b = world.spawn("B", "Node", OriginScope::Level);

        let groups = vec![
            live_group(&mut registry, &world, a, vec![Property::new("peer", PropertyValue::Reference(b))]),
            live_group(&mut registry, &world, b, vec![Property::new("peer", PropertyValue::Reference(a))]),
        ];
        let stream = ReferenceSanitizer::new(false)
            .sanitize(&mut registry, &world, groups)
            .unwrap();

        assert_eq!(stream.groups.len(), 2);
        assert_eq!(stream.table.len(), 2);
        let a_index = stream.table.index_of(registry.identity_of(a).unwrap()).unwrap();
        assert_eq!(
            stream.groups[1].properties[0].value,
            PropertyValue::Reference(a_index)
        );
    }

    #[test]
    fn test_unavailable_reference_is_nulled_in_lenient_mode() {
        let mut world = MemoryWorld::new();
        let mut registry = ObjectIdentityRegistry::default();
        let a = world.spawn("A", "Node", OriginScope::Level);
        let fx = world.insert(ObjectDescriptor::new("Fx", "Particle", OriginScope::Level).transient());
        let gone = ObjectHandle(999);

        let groups = vec![live_group(
            &mut registry,
            &world,
            a,
            vec![
                Property::new("fx", PropertyValue::Reference(fx)),
                Property::new("gone", PropertyValue::Reference(gone)),
            ],
        )];
        let stream = ReferenceSanitizer::new(false)
            .sanitize(&mut registry, &world, groups)
            .unwrap();

        assert!(stream.table.is_empty());
        assert!(stream.groups[0].properties.iter().all(|p| p.value.is_null()));
    }

    #[test]
    fn test_unavailable_reference_fails_in_strict_mode() {
        let mut world = MemoryWorld::new();
        let mut registry = ObjectIdentityRegistry::default();
        let a = world.spawn("A", "Node", OriginScope::Level);

        let groups = vec![live_group(
            &mut registry,
            &world,
            a,
            vec![Property::new("target", PropertyValue::Reference(ObjectHandle(42)))],
        )];
        let err = ReferenceSanitizer::new(true)
            .sanitize(&mut registry, &world, groups)
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::UnresolvableReference { ref property, target: ObjectHandle(42) } if property == "target"
        ));
    }

    #[test]
    fn test_desanitize_rejects_out_of_range_index() {
        let registry = ObjectIdentityRegistry::default();
        let owner = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);
        let stream = SanitizedStream {
            table: ReferenceTable::new(),
            groups: vec![RecordGroup::new(owner, "Node", "A").with_properties(vec![
                Property::new("peer", PropertyValue::Reference(RefIndex(3))),
            ])],
        };
        let err = ReferenceSanitizer::default()
            .desanitize(&registry, stream)
            .unwrap_err();
        assert!(matches!(err, StateError::Format(_)));
    }

    #[test]
    fn test_desanitize_defers_unknown_identities() {
        let mut registry = ObjectIdentityRegistry::default();
        let live = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);
        let missing = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);
        registry
            .bind(ObjectHandle(5), live.clone(), &ObjectDescriptor::new("L", "Node", OriginScope::Level))
            .unwrap();

        let table = ReferenceTable::from_entries(vec![live, missing.clone()]).unwrap();
        let owner = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);
        let stream = SanitizedStream {
            table,
            groups: vec![RecordGroup::new(owner, "Node", "A").with_properties(vec![
                Property::new("a", PropertyValue::Reference(RefIndex(0))),
                Property::new("b", PropertyValue::Reference(RefIndex(1))),
            ])],
        };
        let groups = ReferenceSanitizer::default()
            .desanitize(&registry, stream)
            .unwrap();
        assert_eq!(
            groups[0].properties[0].value,
            PropertyValue::Reference(LoadedRef::Resolved(ObjectHandle(5)))
        );
        assert_eq!(
            groups[0].properties[1].value,
            PropertyValue::Reference(LoadedRef::Deferred(missing))
        );
    }

    #[test]
    fn test_desanitize_defers_owners_of_the_same_stream() {
        let mut registry = ObjectIdentityRegistry::default();
        let peer = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);
        registry
            .bind(ObjectHandle(9), peer.clone(), &ObjectDescriptor::new("B", "Node", OriginScope::Level))
            .unwrap();

        let owner = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);
        let stream = SanitizedStream {
            table: ReferenceTable::from_entries(vec![peer.clone()]).unwrap(),
            groups: vec![
                RecordGroup::new(owner, "Node", "A").with_properties(vec![Property::new(
                    "peer",
                    PropertyValue::Reference(RefIndex(0)),
                )]),
                RecordGroup::new(peer.clone(), "Node", "B"),
            ],
        };
        let groups = ReferenceSanitizer::default()
            .desanitize(&registry, stream)
            .unwrap();
        assert_eq!(
            groups[0].properties[0].value,
            PropertyValue::Reference(LoadedRef::Deferred(peer))
        );
    }

    #[test]
    fn test_resolve_deferred_nulls_dangling_references_in_place() {
        let mut registry = ObjectIdentityRegistry::default();
        let late = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);
        let never = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);
        let owner = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);

        let groups = vec![RecordGroup::new(owner.clone(), "Node", "A").with_properties(vec![
            Property::new("late", PropertyValue::Reference(LoadedRef::Deferred(late.clone()))),
            Property::new("never", PropertyValue::Reference(LoadedRef::Deferred(never.clone()))),
            Property::new("count", PropertyValue::Int(2)),
        ])];

        // the deferred target appears after desanitization
        registry
            .bind(ObjectHandle(8), late, &ObjectDescriptor::new("Late", "Node", OriginScope::Level))
            .unwrap();

        let (resolved, warnings) = ReferenceSanitizer::default().resolve_deferred(&registry, groups);
        assert_eq!(
            resolved[0].properties,
            vec![
                Property::new("late", PropertyValue::Reference(ObjectHandle(8))),
                Property::new("never", PropertyValue::Null),
                Property::new("count", PropertyValue::Int(2)),
            ]
        );
        assert_eq!(
            warnings,
            vec![DanglingReferenceWarning {
                owner,
                property: "never".to_string(),
                target: never,
            }]
        );
    }

    #[test]
    fn test_resolve_deferred_keeps_siblings_of_nested_dangling_reference() {
        let registry = ObjectIdentityRegistry::default();
        let never = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);
        let owner = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);

        let groups = vec![RecordGroup::new(owner, "Node", "A").with_properties(vec![Property::new(
            "escort",
            PropertyValue::Record(vec![
                Property::new(
                    "squad",
                    PropertyValue::List(vec![
                        PropertyValue::Reference(LoadedRef::Resolved(ObjectHandle(3))),
                        PropertyValue::Reference(LoadedRef::Deferred(never)),
                    ]),
                ),
                Property::new("formation", PropertyValue::Text("wedge".into())),
            ]),
        )])];

        let (resolved, warnings) = ReferenceSanitizer::default().resolve_deferred(&registry, groups);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].property, "escort");
        assert_eq!(
            resolved[0].properties[0].value,
            PropertyValue::Record(vec![
                Property::new(
                    "squad",
                    PropertyValue::List(vec![
                        PropertyValue::Reference(ObjectHandle(3)),
                        PropertyValue::Null,
                    ]),
                ),
                Property::new("formation", PropertyValue::Text("wedge".into())),
            ])
        );
    }

    #[test]
    fn test_table_rejects_duplicate_entries() {
        let identity = ObjectIdentity::named("A", OriginScope::World);
        assert!(ReferenceTable::from_entries(vec![identity.clone(), identity]).is_err());
    }
}
