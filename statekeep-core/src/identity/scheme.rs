/*!
Identity scheme adapters.

A scheme decides what identity a newly seen object receives. The registry
owns bookkeeping (uniqueness, release, lookup); schemes only derive keys.
*/

use super::{IdentityKey, ObjectIdentity};
use crate::config::IdentitySchemeKind;
use crate::lifecycle::ObjectDescriptor;
use crate::{Result, StateError};
use std::fmt;
use uuid::Uuid;

/// Namespace for identifiers derived from object paths when the engine
/// supplies no handle of its own.
const LEGACY_PATH_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_2a0e_93d4_4b57_8e61_0d2c_5a7b_e913);

/// Strategy for deriving the identity of an object that has none yet.
pub trait IdentityScheme: Send + Sync + fmt::Debug {
    /// Which configured scheme this adapter implements
    fn scheme_kind(&self) -> IdentitySchemeKind;

    /// Derive a fresh identity for the described object
    fn derive(&self, descriptor: &ObjectDescriptor) -> Result<ObjectIdentity>;

    /// Additional keys the object can be resolved by
    fn aliases(&self, _descriptor: &ObjectDescriptor) -> Vec<IdentityKey> {
        Vec::new()
    }
}

/// Identity taken from the object's stable path.
///
/// Readable across sessions, which makes it the scheme of choice for editor
/// and debug builds. Requires paths to be unique within a scope.
#[derive(Debug, Clone, Default)]
pub struct NamedScheme;

impl IdentityScheme for NamedScheme {
    fn scheme_kind(&self) -> IdentitySchemeKind {
        IdentitySchemeKind::Named
    }

    fn derive(&self, descriptor: &ObjectDescriptor) -> Result<ObjectIdentity> {
        if descriptor.path.is_empty() {
            return Err(StateError::validation(format!(
                "object of class '{}' has no stable name",
                descriptor.class_name
            )));
        }
        Ok(ObjectIdentity::named(descriptor.path.clone(), descriptor.scope))
    }
}

/// Opaque random identifier attached to the object on first request.
#[derive(Debug, Clone, Default)]
pub struct GeneratedScheme;

impl IdentityScheme for GeneratedScheme {
    fn scheme_kind(&self) -> IdentitySchemeKind {
        IdentitySchemeKind::Generated
    }

    fn derive(&self, descriptor: &ObjectDescriptor) -> Result<ObjectIdentity> {
        Ok(ObjectIdentity::generated(Uuid::new_v4(), descriptor.scope))
    }
}

/// Generated identities based on the engine's own object handle.
///
/// The engine-supplied identifier becomes the identity key, and the object's
/// path is registered as an alias so lookups by either key format land on
/// the same object.
#[derive(Debug, Clone, Default)]
pub struct LegacyHandleScheme;

impl LegacyHandleScheme {
    /// Deterministic identifier for objects the engine has not tagged
    pub fn path_guid(descriptor: &ObjectDescriptor) -> Uuid {
        let name = format!("{}:{}", descriptor.scope, descriptor.path);
        Uuid::new_v5(&LEGACY_PATH_NAMESPACE, name.as_bytes())
    }
}

impl IdentityScheme for LegacyHandleScheme {
    fn scheme_kind(&self) -> IdentitySchemeKind {
        IdentitySchemeKind::LegacyHandle
    }

    fn derive(&self, descriptor: &ObjectDescriptor) -> Result<ObjectIdentity> {
        let guid = match descriptor.external_id {
            Some(guid) => guid,
            None if descriptor.path.is_empty() => {
                return Err(StateError::validation(format!(
                    "object of class '{}' has neither an engine handle nor a stable name",
                    descriptor.class_name
                )))
            }
            None => Self::path_guid(descriptor),
        };
        Ok(ObjectIdentity::generated(guid, descriptor.scope))
    }

    fn aliases(&self, descriptor: &ObjectDescriptor) -> Vec<IdentityKey> {
        if descriptor.path.is_empty() {
            Vec::new()
        } else {
            vec![IdentityKey::Name(descriptor.path.clone())]
        }
    }
}

/// Build the adapter for a configured scheme
pub fn scheme_for(kind: IdentitySchemeKind) -> Box<dyn IdentityScheme> {
    match kind {
        IdentitySchemeKind::Named => Box::new(NamedScheme),
        IdentitySchemeKind::Generated => Box::new(GeneratedScheme),
        IdentitySchemeKind::LegacyHandle => Box::new(LegacyHandleScheme),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OriginScope;

    fn crate_descriptor() -> ObjectDescriptor {
        ObjectDescriptor::new("/Game/Harbor.Crate_3", "Crate", OriginScope::Level)
    }

    #[test]
    fn test_named_scheme_uses_path() {
        let identity = NamedScheme.derive(&crate_descriptor()).unwrap();
        assert_eq!(
            identity,
            ObjectIdentity::named("/Game/Harbor.Crate_3", OriginScope::Level)
        );
    }

    #[test]
    fn test_named_scheme_rejects_empty_path() {
        let descriptor = ObjectDescriptor::new("", "Crate", OriginScope::Level);
        assert!(matches!(
            NamedScheme.derive(&descriptor),
            Err(StateError::Validation(_))
        ));
    }

    #[test]
    fn test_generated_scheme_is_unique_per_call() {
        let a = GeneratedScheme.derive(&crate_descriptor()).unwrap();
        let b = GeneratedScheme.derive(&crate_descriptor()).unwrap();
        assert!(a.is_generated());
        assert_ne!(a, b);
    }

    #[test]
    fn test_legacy_scheme_prefers_engine_handle() {
        let handle = Uuid::new_v4();
        let descriptor = crate_descriptor().with_external_id(handle);
        let identity = LegacyHandleScheme.derive(&descriptor).unwrap();
        assert_eq!(identity.key(), &IdentityKey::Guid(handle));
        assert_eq!(
            LegacyHandleScheme.aliases(&descriptor),
            vec![IdentityKey::Name("/Game/Harbor.Crate_3".to_string())]
        );
    }

    #[test]
    fn test_legacy_scheme_path_fallback_is_deterministic() {
        let a = LegacyHandleScheme.derive(&crate_descriptor()).unwrap();
        let b = LegacyHandleScheme.derive(&crate_descriptor()).unwrap();
        assert_eq!(a, b);
    }
}
