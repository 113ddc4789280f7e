/*!
# Statekeep Core

Stable object identity and save-state serialization for live simulations.

A running world is full of objects that point at each other through
in-memory handles. Those handles are meaningless in the next session, so this
crate gives every persistable object a durable identity and rewrites handles
into identity references on the way out and back on the way in:

- [`ObjectIdentityRegistry`] maps live handles to identities under a
  configurable [`IdentityScheme`](identity::IdentityScheme)
- [`ReferenceSanitizer`] turns handle references into indices into a
  reference table, and back
- [`SerializationFormatter`](format::SerializationFormatter) encodes the
  sanitized stream as structured JSON or compact binary under a versioned
  [`Schema`]
- [`StateSnapshotManager`] drives the whole pipeline and produces
  self-describing [`SavePayload`]s
- [`StorageAdapter`] implementations place payloads in named save slots

The host world is reached only through the [`ObjectLifecycle`] trait.
[`MemoryWorld`] is a ready-made implementation for tools and tests.

## Usage

```rust
use statekeep_core::{
    create_manager_from_config, MemoryWorld, OriginScope, PersistenceConfig, PropertyValue,
    Schema,
};

let mut world = MemoryWorld::new();
let a = world.spawn("Level/A", "Crate", OriginScope::Level);
let b = world.spawn("Level/B", "Crate", OriginScope::Level);
world.set_property(a, "partner", PropertyValue::Reference(b))?;
world.set_property(b, "partner", PropertyValue::Reference(a))?;

let mut manager = create_manager_from_config(PersistenceConfig::development(), Schema::new(1))?;
let payload = manager.save(&world, &[a, b])?;

let mut fresh = MemoryWorld::new();
let mut loader = create_manager_from_config(PersistenceConfig::development(), Schema::new(1))?;
let result = loader.load(&payload, &mut fresh)?;
assert_eq!(result.applied.len(), 2);
assert!(result.warnings.is_empty());
# Ok::<(), statekeep_core::StateError>(())
```
*/

pub mod compression;
pub mod config;
pub mod error;
pub mod format;
pub mod identity;
pub mod lifecycle;
pub mod metadata;
pub mod observability;
pub mod payload;
pub mod sanitizer;
pub mod schema;
pub mod snapshot;
pub mod storage;
pub mod value;

#[cfg(test)]
mod error_tests;

pub use compression::{CompressionCodec, GzipCompressor, NoCompression};
pub use config::{BuildTarget, FormatStrategy, IdentitySchemeKind, PersistenceConfig};
pub use error::{Result, StateError};
pub use identity::{IdentityKey, ObjectIdentity, ObjectIdentityRegistry, OriginScope};
pub use lifecycle::{MemoryWorld, ObjectDescriptor, ObjectLifecycle};
pub use metadata::SlotMetadata;
pub use payload::SavePayload;
pub use sanitizer::{DanglingReferenceWarning, RecordGroup, ReferenceSanitizer, SanitizedStream};
pub use schema::{ClassSchema, Schema};
pub use snapshot::{
    create_manager_from_config, decode_payload, ApplyResult, CancellationToken, PendingSave,
    SnapshotStage, StateSnapshotManager,
};
pub use storage::{LocalFileStorage, MemoryStorage, StorageAdapter};
pub use value::{LiveProperty, ObjectHandle, Property, PropertyValue, RefIndex, ValueKind};
