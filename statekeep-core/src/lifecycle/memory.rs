/*!
In-memory object world.

A small [`ObjectLifecycle`] implementation used by the CLI, the benchmarks
and the test suites. Objects live in a hash map keyed by handle; handles are
never reused within one world.
*/

use super::{ObjectDescriptor, ObjectLifecycle, RecreateRequest};
use crate::identity::OriginScope;
use crate::value::{LiveProperty, LiveValue, ObjectHandle};
use crate::{Result, StateError};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct MemoryObject {
    descriptor: ObjectDescriptor,
    properties: Vec<LiveProperty>,
}

/// Hash-map backed world of simulation objects
#[derive(Debug, Clone, Default)]
pub struct MemoryWorld {
    objects: BTreeMap<ObjectHandle, MemoryObject>,
    next_handle: u64,
    failing_reads: HashSet<ObjectHandle>,
}

impl MemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a persistable object and return its handle
    pub fn spawn<P, C>(&mut self, path: P, class_name: C, scope: OriginScope) -> ObjectHandle
    where
        P: Into<String>,
        C: Into<String>,
    {
        self.insert(ObjectDescriptor::new(path, class_name, scope))
    }

    /// Create an object from a full descriptor
    pub fn insert(&mut self, descriptor: ObjectDescriptor) -> ObjectHandle {
        self.next_handle += 1;
        let handle = ObjectHandle(self.next_handle);
        self.objects.insert(
            handle,
            MemoryObject {
                descriptor,
                properties: Vec::new(),
            },
        );
        handle
    }

    /// Create an object carrying an engine-assigned identifier
    pub fn spawn_tagged<P, C>(
        &mut self,
        path: P,
        class_name: C,
        scope: OriginScope,
        external_id: Uuid,
    ) -> ObjectHandle
    where
        P: Into<String>,
        C: Into<String>,
    {
        self.insert(ObjectDescriptor::new(path, class_name, scope).with_external_id(external_id))
    }

    /// Remove an object; returns whether it existed
    pub fn destroy(&mut self, object: ObjectHandle) -> bool {
        self.failing_reads.remove(&object);
        self.objects.remove(&object).is_some()
    }

    /// Set or replace a single property
    pub fn set_property<S: Into<String>>(
        &mut self,
        object: ObjectHandle,
        name: S,
        value: LiveValue,
    ) -> Result<()> {
        let entry = self
            .objects
            .get_mut(&object)
            .ok_or(StateError::ObjectUnavailable(object))?;
        merge_property(&mut entry.properties, LiveProperty::new(name, value));
        Ok(())
    }

    /// Current value of a property
    pub fn property(&self, object: ObjectHandle, name: &str) -> Option<&LiveValue> {
        self.objects
            .get(&object)?
            .properties
            .iter()
            .find(|p| p.name == name)
            .map(|p| &p.value)
    }

    /// Make every property read of `object` fail
    pub fn fail_reads_for(&mut self, object: ObjectHandle) {
        self.failing_reads.insert(object);
    }

    /// Find a live object by path within a scope
    pub fn find(&self, scope: OriginScope, path: &str) -> Option<ObjectHandle> {
        self.objects
            .iter()
            .find(|(_, o)| o.descriptor.scope == scope && o.descriptor.path == path)
            .map(|(handle, _)| *handle)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = ObjectHandle> + '_ {
        self.objects.keys().copied()
    }
}

fn merge_property(properties: &mut Vec<LiveProperty>, property: LiveProperty) {
    match properties.iter_mut().find(|p| p.name == property.name) {
        Some(existing) => existing.value = property.value,
        None => properties.push(property),
    }
}

impl ObjectLifecycle for MemoryWorld {
    fn enumerate_persistable(&self, scope: OriginScope) -> Vec<ObjectHandle> {
        self.objects
            .iter()
            .filter(|(_, o)| o.descriptor.persistable && o.descriptor.scope == scope)
            .map(|(handle, _)| *handle)
            .collect()
    }

    fn describe(&self, object: ObjectHandle) -> Option<ObjectDescriptor> {
        self.objects.get(&object).map(|o| o.descriptor.clone())
    }

    fn get_properties(&self, object: ObjectHandle) -> Result<Vec<LiveProperty>> {
        if self.failing_reads.contains(&object) {
            return Err(StateError::storage(format!(
                "property read of object {object} failed"
            )));
        }
        self.objects
            .get(&object)
            .map(|o| o.properties.clone())
            .ok_or(StateError::ObjectUnavailable(object))
    }

    fn set_properties(&mut self, object: ObjectHandle, properties: Vec<LiveProperty>) -> Result<()> {
        let entry = self
            .objects
            .get_mut(&object)
            .ok_or(StateError::ObjectUnavailable(object))?;
        for property in properties {
            merge_property(&mut entry.properties, property);
        }
        Ok(())
    }

    fn resolve_or_create(&mut self, request: RecreateRequest<'_>) -> Option<ObjectHandle> {
        let scope = request.identity.scope();
        if let Some(handle) = self.find(scope, request.path) {
            return Some(handle);
        }
        if request.class_name.is_empty() {
            return None;
        }
        let handle = self.spawn(request.path, request.class_name, scope);
        debug!(
            object = %handle,
            class = request.class_name,
            path = request.path,
            "Recreated object"
        );
        Some(handle)
    }
}
