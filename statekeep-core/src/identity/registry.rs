/*!
Registry of identities attached to live objects.
*/

use super::scheme::{scheme_for, IdentityScheme};
use super::{IdentityKey, ObjectIdentity, OriginScope};
use crate::config::IdentitySchemeKind;
use crate::lifecycle::ObjectDescriptor;
use crate::value::ObjectHandle;
use crate::{Result, StateError};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Identity attached to one live object, plus the extra keys it answers to.
#[derive(Debug, Clone)]
struct Annotation {
    identity: ObjectIdentity,
    aliases: Vec<IdentityKey>,
}

impl Annotation {
    fn keys(&self) -> impl Iterator<Item = &IdentityKey> {
        std::iter::once(self.identity.key()).chain(self.aliases.iter())
    }
}

/// Assigns and resolves stable identities for persistable objects.
///
/// Identities are attached to object handles the first time they are
/// requested and stay attached until released. Within one scope no two live
/// objects share a key; an attempt to create such a pair is reported as
/// [`StateError::IdentityCollision`] and leaves the registry unchanged.
///
/// # Example
/// ```rust
/// use statekeep_core::identity::{ObjectIdentityRegistry, OriginScope};
/// use statekeep_core::lifecycle::ObjectDescriptor;
/// use statekeep_core::config::IdentitySchemeKind;
/// use statekeep_core::ObjectHandle;
///
/// let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Named);
/// let descriptor = ObjectDescriptor::new("Harbor.Crate_3", "Crate", OriginScope::Level);
/// let identity = registry.assign(ObjectHandle(1), &descriptor)?;
/// assert_eq!(registry.resolve_identity(&identity), Some(ObjectHandle(1)));
/// # Ok::<(), statekeep_core::StateError>(())
/// ```
#[derive(Debug)]
pub struct ObjectIdentityRegistry {
    scheme: Box<dyn IdentityScheme>,
    annotations: HashMap<ObjectHandle, Annotation>,
    index: HashMap<(OriginScope, IdentityKey), ObjectHandle>,
}

impl ObjectIdentityRegistry {
    /// Create a registry that derives new identities with `scheme`
    pub fn new(scheme: Box<dyn IdentityScheme>) -> Self {
        Self {
            scheme,
            annotations: HashMap::new(),
            index: HashMap::new(),
        }
    }

    /// Create a registry for one of the built-in schemes
    pub fn with_scheme(kind: IdentitySchemeKind) -> Self {
        Self::new(scheme_for(kind))
    }

    pub fn scheme_kind(&self) -> IdentitySchemeKind {
        self.scheme.scheme_kind()
    }

    /// Number of objects with an attached identity
    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    /// Return the identity of `object`, creating one if it has none.
    ///
    /// Repeated calls for the same live object return the same identity.
    pub fn assign(
        &mut self,
        object: ObjectHandle,
        descriptor: &ObjectDescriptor,
    ) -> Result<ObjectIdentity> {
        if let Some(annotation) = self.annotations.get(&object) {
            return Ok(annotation.identity.clone());
        }

        let identity = self.scheme.derive(descriptor)?;
        let annotation = Annotation {
            identity: identity.clone(),
            aliases: self.scheme.aliases(descriptor),
        };
        self.attach(object, annotation)?;

        debug!(object = %object, identity = %identity, "Assigned object identity");
        Ok(identity)
    }

    /// Attach a previously saved identity to a recreated object.
    ///
    /// If the object already carries a different identity, that identity is
    /// released first so the saved one takes over.
    pub fn bind(
        &mut self,
        object: ObjectHandle,
        identity: ObjectIdentity,
        descriptor: &ObjectDescriptor,
    ) -> Result<()> {
        if let Some(current) = self.annotations.get(&object) {
            if current.identity == identity {
                return Ok(());
            }
        }

        let annotation = Annotation {
            aliases: self.scheme.aliases(descriptor),
            identity,
        };
        self.check_free(object, &annotation)?;

        if let Some(previous) = self.detach(object) {
            debug!(
                object = %object,
                previous = %previous.identity,
                identity = %annotation.identity,
                "Replacing object identity with saved identity"
            );
        }
        self.attach(object, annotation)
    }

    /// Live object registered under `key` in `scope`
    pub fn resolve(&self, scope: OriginScope, key: &IdentityKey) -> Option<ObjectHandle> {
        self.index.get(&(scope, key.clone())).copied()
    }

    /// Live object carrying `identity`
    pub fn resolve_identity(&self, identity: &ObjectIdentity) -> Option<ObjectHandle> {
        self.resolve(identity.scope(), identity.key())
    }

    /// Identity attached to `object`, if any
    pub fn identity_of(&self, object: ObjectHandle) -> Option<&ObjectIdentity> {
        self.annotations.get(&object).map(|a| &a.identity)
    }

    /// Release an identity so it can be reused.
    ///
    /// Releasing an unknown or already released identity does nothing.
    /// Returns whether anything was released.
    pub fn release(&mut self, identity: &ObjectIdentity) -> bool {
        let Some(object) = self.resolve_identity(identity) else {
            return false;
        };
        // the key may be an alias of a different identity
        if self.identity_of(object) != Some(identity) {
            return false;
        }
        self.detach(object).is_some()
    }

    /// Release whatever identity `object` carries
    pub fn release_object(&mut self, object: ObjectHandle) -> bool {
        self.detach(object).is_some()
    }

    /// Drop every identity
    pub fn clear(&mut self) {
        self.annotations.clear();
        self.index.clear();
    }

    fn check_free(&self, object: ObjectHandle, annotation: &Annotation) -> Result<()> {
        let scope = annotation.identity.scope();
        for key in annotation.keys() {
            if let Some(&existing) = self.index.get(&(scope, key.clone())) {
                if existing != object {
                    warn!(
                        object = %object,
                        existing = %existing,
                        key = %key,
                        scope = %scope,
                        "Identity collision between live objects"
                    );
                    return Err(StateError::IdentityCollision {
                        key: key.clone(),
                        scope,
                        existing,
                    });
                }
            }
        }
        Ok(())
    }

    fn attach(&mut self, object: ObjectHandle, annotation: Annotation) -> Result<()> {
        self.check_free(object, &annotation)?;
        let scope = annotation.identity.scope();
        for key in annotation.keys() {
            self.index.insert((scope, key.clone()), object);
        }
        self.annotations.insert(object, annotation);
        Ok(())
    }

    fn detach(&mut self, object: ObjectHandle) -> Option<Annotation> {
        let annotation = self.annotations.remove(&object)?;
        let scope = annotation.identity.scope();
        for key in annotation.keys() {
            let entry = (scope, key.clone());
            if self.index.get(&entry) == Some(&object) {
                self.index.remove(&entry);
            }
        }
        Some(annotation)
    }
}

impl Default for ObjectIdentityRegistry {
    fn default() -> Self {
        Self::with_scheme(IdentitySchemeKind::Generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn descriptor(path: &str) -> ObjectDescriptor {
        ObjectDescriptor::new(path, "Crate", OriginScope::Level)
    }

    #[test]
    fn test_assign_is_idempotent() {
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Generated);
        let first = registry.assign(ObjectHandle(1), &descriptor("Crate_1")).unwrap();
        let second = registry.assign(ObjectHandle(1), &descriptor("Crate_1")).unwrap();
        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_distinct_objects_get_distinct_identities() {
        for kind in [
            IdentitySchemeKind::Named,
            IdentitySchemeKind::Generated,
            IdentitySchemeKind::LegacyHandle,
        ] {
            let mut registry = ObjectIdentityRegistry::with_scheme(kind);
            let a = registry.assign(ObjectHandle(1), &descriptor("Crate_1")).unwrap();
            let b = registry.assign(ObjectHandle(2), &descriptor("Crate_2")).unwrap();
            assert_ne!(a, b, "scheme {kind:?}");
        }
    }

    #[test]
    fn test_named_collision_is_reported() {
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Named);
        let first = registry.assign(ObjectHandle(1), &descriptor("Crate")).unwrap();

        let err = registry
            .assign(ObjectHandle(2), &descriptor("Crate"))
            .unwrap_err();
        assert!(matches!(
            err,
            StateError::IdentityCollision { existing: ObjectHandle(1), .. }
        ));

        // the original binding is untouched
        assert_eq!(registry.resolve_identity(&first), Some(ObjectHandle(1)));
        assert!(registry.identity_of(ObjectHandle(2)).is_none());
    }

    #[test]
    fn test_same_name_in_different_scopes_is_allowed() {
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Named);
        registry
            .assign(ObjectHandle(1), &ObjectDescriptor::new("Door", "Door", OriginScope::World))
            .unwrap();
        registry
            .assign(ObjectHandle(2), &ObjectDescriptor::new("Door", "Door", OriginScope::Level))
            .unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Generated);
        let a = registry.assign(ObjectHandle(1), &descriptor("Crate_1")).unwrap();
        let b = registry.assign(ObjectHandle(2), &descriptor("Crate_2")).unwrap();

        assert!(registry.release(&a));
        assert!(!registry.release(&a));

        assert_eq!(registry.resolve_identity(&a), None);
        assert_eq!(registry.resolve_identity(&b), Some(ObjectHandle(2)));
    }

    #[test]
    fn test_released_name_can_be_reused() {
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Named);
        let old = registry.assign(ObjectHandle(1), &descriptor("Crate")).unwrap();
        registry.release(&old);

        let new = registry.assign(ObjectHandle(2), &descriptor("Crate")).unwrap();
        assert_eq!(old, new);
        assert_eq!(registry.resolve_identity(&new), Some(ObjectHandle(2)));
    }

    #[test]
    fn test_bind_carries_identity_over_to_new_handle() {
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Generated);
        let saved = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);

        registry
            .bind(ObjectHandle(9), saved.clone(), &descriptor("Crate_9"))
            .unwrap();
        assert_eq!(registry.identity_of(ObjectHandle(9)), Some(&saved));

        // assign now returns the carried-over identity
        let assigned = registry.assign(ObjectHandle(9), &descriptor("Crate_9")).unwrap();
        assert_eq!(assigned, saved);
    }

    #[test]
    fn test_bind_replaces_previous_identity() {
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Generated);
        let fresh = registry.assign(ObjectHandle(3), &descriptor("Crate_3")).unwrap();
        let saved = ObjectIdentity::generated(Uuid::new_v4(), OriginScope::Level);

        registry
            .bind(ObjectHandle(3), saved.clone(), &descriptor("Crate_3"))
            .unwrap();
        assert_eq!(registry.resolve_identity(&fresh), None);
        assert_eq!(registry.resolve_identity(&saved), Some(ObjectHandle(3)));
    }

    #[test]
    fn test_bind_rejects_identity_held_by_other_object() {
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::Generated);
        let taken = registry.assign(ObjectHandle(1), &descriptor("Crate_1")).unwrap();
        let err = registry
            .bind(ObjectHandle(2), taken, &descriptor("Crate_2"))
            .unwrap_err();
        assert!(matches!(err, StateError::IdentityCollision { .. }));
    }

    #[test]
    fn test_legacy_resolve_accepts_both_key_formats() {
        let mut registry = ObjectIdentityRegistry::with_scheme(IdentitySchemeKind::LegacyHandle);
        let engine_handle = Uuid::new_v4();
        let desc = descriptor("Harbor.Crate_7").with_external_id(engine_handle);
        let identity = registry.assign(ObjectHandle(7), &desc).unwrap();

        let by_guid = registry.resolve(OriginScope::Level, &IdentityKey::Guid(engine_handle));
        let by_name = registry.resolve(
            OriginScope::Level,
            &IdentityKey::Name("Harbor.Crate_7".to_string()),
        );
        assert_eq!(by_guid, Some(ObjectHandle(7)));
        assert_eq!(by_name, Some(ObjectHandle(7)));
        assert_eq!(registry.identity_of(by_name.unwrap()), Some(&identity));

        // releasing through the alias key is not a release of the identity
        let alias_identity = ObjectIdentity::named("Harbor.Crate_7", OriginScope::Level);
        assert!(!registry.release(&alias_identity));
        assert!(registry.release(&identity));
        assert_eq!(
            registry.resolve(OriginScope::Level, &IdentityKey::Name("Harbor.Crate_7".into())),
            None
        );
    }
}
