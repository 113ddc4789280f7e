/*!
Storage adapters for save payloads.

The core only produces and consumes payload bytes. Where they end up is the
business of a [`StorageAdapter`], which maps named save slots to an opaque
byte store.
*/

pub mod local;

pub use local::LocalFileStorage;

use crate::{Result, StateError};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Storage abstraction for save slots
///
/// This trait defines the interface that all storage implementations must provide.
/// Slot names are `/`-separated relative names; how they map to locations is up
/// to the implementation.
pub trait StorageAdapter {
    /// Save payload bytes to a slot, replacing any previous content
    ///
    /// # Arguments
    /// * `data` - The payload bytes to save
    /// * `path` - The slot name
    ///
    /// # Returns
    /// Result indicating success or failure
    fn save(&self, data: &[u8], path: &str) -> Result<()>;

    /// Load payload bytes from a slot
    ///
    /// # Arguments
    /// * `path` - The slot name to load from
    ///
    /// # Returns
    /// The loaded bytes or an error
    fn load(&self, path: &str) -> Result<Vec<u8>>;

    /// Check if a slot holds a payload
    fn exists(&self, path: &str) -> bool;

    /// Delete a slot; deleting an empty slot is not an error
    fn delete(&self, path: &str) -> Result<()>;

    /// Names of all occupied slots, sorted
    fn list(&self) -> Result<Vec<String>>;
}

/// In-memory storage adapter
///
/// Stores payloads in a shared map. Clones share the same slots, which makes
/// it handy for tests and for handing payloads between threads.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    data: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.data
            .lock()
            .map_err(|_| StateError::storage("memory storage lock poisoned"))
    }
}

impl StorageAdapter for MemoryStorage {
    fn save(&self, data: &[u8], path: &str) -> Result<()> {
        self.slots()?.insert(path.to_string(), data.to_vec());
        Ok(())
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        self.slots()?
            .get(path)
            .cloned()
            .ok_or_else(|| StateError::storage(format!("Save slot not found: {path}")))
    }

    fn exists(&self, path: &str) -> bool {
        self.slots().map(|s| s.contains_key(path)).unwrap_or(false)
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.slots()?.remove(path);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.slots()?.keys().cloned().collect())
    }
}
