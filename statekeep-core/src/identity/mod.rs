/*!
Stable object identities.

An [`ObjectIdentity`] names a persistable object independently of the handle
the simulation currently uses for it, so state saved in one session can be
matched to the objects of the next. Identities are issued by the
[`ObjectIdentityRegistry`] using one of the [`IdentityScheme`] adapters.
*/

pub mod registry;
pub mod scheme;


pub use registry::ObjectIdentityRegistry;
pub use scheme::{GeneratedScheme, IdentityScheme, LegacyHandleScheme, NamedScheme};

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifetime domain an object belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OriginScope {
    /// Lives as long as the loaded world
    World,
    /// Owned by a streamed level
    Level,
    /// Survives world and level transitions
    Persistent,
}

impl fmt::Display for OriginScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OriginScope::World => "world",
            OriginScope::Level => "level",
            OriginScope::Persistent => "persistent",
        };
        f.write_str(name)
    }
}

/// How an identity key was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentityKind {
    /// Derived from the object's stable name
    Named,
    /// Issued on first request and attached to the object
    Generated,
}

/// The portable part of an identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdentityKey {
    Name(String),
    Guid(Uuid),
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityKey::Name(name) => write!(f, "name:{name}"),
            IdentityKey::Guid(guid) => write!(f, "guid:{guid}"),
        }
    }
}

/// Stable identity of a persistable object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectIdentity {
    kind: IdentityKind,
    key: IdentityKey,
    scope: OriginScope,
}

impl ObjectIdentity {
    /// Identity keyed by a stable object name
    pub fn named<S: Into<String>>(name: S, scope: OriginScope) -> Self {
        Self {
            kind: IdentityKind::Named,
            key: IdentityKey::Name(name.into()),
            scope,
        }
    }

    /// Identity keyed by a 128-bit identifier
    pub fn generated(guid: Uuid, scope: OriginScope) -> Self {
        Self {
            kind: IdentityKind::Generated,
            key: IdentityKey::Guid(guid),
            scope,
        }
    }

    pub fn kind(&self) -> IdentityKind {
        self.kind
    }

    pub fn key(&self) -> &IdentityKey {
        &self.key
    }

    pub fn scope(&self) -> OriginScope {
        self.scope
    }

    pub fn is_named(&self) -> bool {
        self.kind == IdentityKind::Named
    }

    pub fn is_generated(&self) -> bool {
        self.kind == IdentityKind::Generated
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.key)
    }
}
