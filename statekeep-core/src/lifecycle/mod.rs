/*!
Object lifecycle collaborator.

The core never creates, destroys or inspects simulation objects on its own.
Everything it knows about them comes through [`ObjectLifecycle`], which the
host engine implements. [`MemoryWorld`] is a self-contained implementation
backed by a hash map.
*/

pub mod memory;

pub use memory::MemoryWorld;

use crate::identity::{ObjectIdentity, OriginScope};
use crate::value::{LiveProperty, ObjectHandle};
use crate::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the core needs to know about a live object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectDescriptor {
    /// Stable, human-readable path of the object within its scope
    pub path: String,
    /// Class name used to recreate the object on load
    pub class_name: String,
    pub scope: OriginScope,
    /// Whether the object takes part in save/load at all
    pub persistable: bool,
    /// Identifier assigned by the engine's own weak-reference mechanism
    pub external_id: Option<Uuid>,
}

impl ObjectDescriptor {
    pub fn new<P, C>(path: P, class_name: C, scope: OriginScope) -> Self
    where
        P: Into<String>,
        C: Into<String>,
    {
        Self {
            path: path.into(),
            class_name: class_name.into(),
            scope,
            persistable: true,
            external_id: None,
        }
    }

    pub fn with_external_id(mut self, external_id: Uuid) -> Self {
        self.external_id = Some(external_id);
        self
    }

    pub fn transient(mut self) -> Self {
        self.persistable = false;
        self
    }
}

/// Request to find or recreate the owner of a loaded record group.
#[derive(Debug, Clone, Copy)]
pub struct RecreateRequest<'a> {
    pub identity: &'a ObjectIdentity,
    pub class_name: &'a str,
    pub path: &'a str,
}

/// Interface the host simulation exposes to the persistence core.
pub trait ObjectLifecycle {
    /// All persistable objects currently alive in `scope`
    fn enumerate_persistable(&self, scope: OriginScope) -> Vec<ObjectHandle>;

    /// Describe a live object, `None` if the handle no longer refers to one
    fn describe(&self, object: ObjectHandle) -> Option<ObjectDescriptor>;

    /// Read the persistable properties of an object in declaration order
    fn get_properties(&self, object: ObjectHandle) -> Result<Vec<LiveProperty>>;

    /// Write properties to an object; properties not listed keep their value
    fn set_properties(&mut self, object: ObjectHandle, properties: Vec<LiveProperty>) -> Result<()>;

    /// Find the object a saved record belongs to, creating it if needed
    fn resolve_or_create(&mut self, request: RecreateRequest<'_>) -> Option<ObjectHandle>;
}
