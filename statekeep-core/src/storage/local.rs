/*!
Local filesystem storage adapter implementation.
*/

use super::StorageAdapter;
use crate::{Result, StateError};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// Local filesystem storage adapter
///
/// Stores each slot as a file below an optional base directory, creating
/// parent directories as needed. Writes go to a temporary file in the target
/// directory which is then renamed over the slot, so a crash mid-write never
/// leaves a half-written save behind.
///
/// # Example
/// ```rust
/// use statekeep_core::storage::{LocalFileStorage, StorageAdapter};
///
/// let dir = tempfile::tempdir()?;
/// let storage = LocalFileStorage::with_base_dir(dir.path());
/// storage.save(b"payload bytes", "profiles/alice/autosave.sav")?;
/// assert!(storage.exists("profiles/alice/autosave.sav"));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct LocalFileStorage {
    /// Optional base directory for all slots
    base_dir: Option<PathBuf>,
}

impl LocalFileStorage {
    /// Create a storage adapter resolving slots against the working directory
    pub fn new() -> Self {
        Self { base_dir: None }
    }

    /// Create a storage adapter with a base directory
    ///
    /// # Arguments
    /// * `base_dir` - The directory all slot names are resolved against
    pub fn with_base_dir<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: Some(base_dir.as_ref().to_path_buf()),
        }
    }

    fn root(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Resolve the full path for a slot name
    fn resolve_path(&self, path: &str) -> PathBuf {
        match &self.base_dir {
            Some(base) => base.join(path),
            None => PathBuf::from(path),
        }
    }

    /// Ensure the parent directory exists, creating it if necessary
    fn ensure_parent_dir(&self, path: &Path) -> Result<PathBuf> {
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.exists() {
            fs::create_dir_all(&parent).map_err(|e| {
                StateError::storage(format!(
                    "Failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        Ok(parent)
    }

    fn collect_slots(dir: &Path, root: &Path, out: &mut Vec<String>) -> Result<()> {
        let entries = fs::read_dir(dir).map_err(|e| {
            StateError::storage(format!("Failed to list {}: {}", dir.display(), e))
        })?;
        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                Self::collect_slots(&path, root, out)?;
            } else if let Ok(relative) = path.strip_prefix(root) {
                let name = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                out.push(name);
            }
        }
        Ok(())
    }
}

impl StorageAdapter for LocalFileStorage {
    fn save(&self, data: &[u8], path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        let parent = self.ensure_parent_dir(&full_path)?;

        let write_err = |e: std::io::Error| {
            StateError::storage(format!(
                "Failed to write save to {}: {}",
                full_path.display(),
                e
            ))
        };

        let mut temp = NamedTempFile::new_in(&parent).map_err(write_err)?;
        temp.write_all(data).map_err(write_err)?;
        temp.as_file().sync_all().map_err(write_err)?;
        temp.persist(&full_path).map_err(|e| write_err(e.error))?;

        debug!(path = %full_path.display(), bytes = data.len(), "Wrote save slot");
        Ok(())
    }

    fn load(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.resolve_path(path);

        fs::read(&full_path).map_err(|e| {
            StateError::storage(format!(
                "Failed to read save from {}: {}",
                full_path.display(),
                e
            ))
        })
    }

    fn exists(&self, path: &str) -> bool {
        self.resolve_path(path).is_file()
    }

    fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);

        if full_path.exists() {
            fs::remove_file(&full_path).map_err(|e| {
                StateError::storage(format!(
                    "Failed to delete save {}: {}",
                    full_path.display(),
                    e
                ))
            })?;
        }

        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        let root = self.root();
        let mut slots = Vec::new();
        if root.is_dir() {
            Self::collect_slots(&root, &root, &mut slots)?;
        }
        slots.sort();
        Ok(slots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_local_file_storage_basic_operations() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());

        let test_data = b"PSTA save bytes";
        let path = "slot_1.sav";

        assert!(storage.save(test_data, path).is_ok());
        assert!(storage.exists(path));
        assert_eq!(storage.load(path).unwrap(), test_data);

        assert!(storage.delete(path).is_ok());
        assert!(!storage.exists(path));
        // deleting again is fine
        assert!(storage.delete(path).is_ok());
    }

    #[test]
    fn test_local_file_storage_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());

        let path = "profiles/alice/chapter_2/autosave.sav";
        assert!(storage.save(b"data", path).is_ok());
        assert!(storage.exists(path));
        assert_eq!(storage.load(path).unwrap(), b"data");
    }

    #[test]
    fn test_save_replaces_existing_slot() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());

        storage.save(b"first", "quick.sav").unwrap();
        storage.save(b"second", "quick.sav").unwrap();
        assert_eq!(storage.load("quick.sav").unwrap(), b"second");
        // no temp files are left next to the slot
        assert_eq!(storage.list().unwrap(), vec!["quick.sav"]);
    }

    #[test]
    fn test_list_is_sorted_and_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());
        storage.save(b"x", "b.sav").unwrap();
        storage.save(b"x", "a/nested.sav").unwrap();

        assert_eq!(storage.list().unwrap(), vec!["a/nested.sav", "b.sav"]);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let storage = LocalFileStorage::with_base_dir(temp_dir.path());

        let result = storage.load("nonexistent.sav");
        assert!(matches!(result, Err(StateError::Storage(_))));
    }
}
