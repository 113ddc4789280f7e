/*!
Error types for the statekeep core.
*/

use crate::identity::{IdentityKey, OriginScope};
use crate::snapshot::SnapshotStage;
use crate::value::ObjectHandle;
use thiserror::Error;

/// Result type used throughout the statekeep core.
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur while assigning identities, saving or loading state.
#[derive(Error, Debug)]
pub enum StateError {
    /// Two live objects resolve to the same identity key in one scope
    #[error("Identity collision: key {key} in scope {scope} is already bound to object {existing}")]
    IdentityCollision {
        key: IdentityKey,
        scope: OriginScope,
        existing: ObjectHandle,
    },

    /// Corrupt, truncated or unrecognized payload bytes
    #[error("Format error: {0}")]
    Format(String),

    /// Payload was written with a schema newer than the reader supports
    #[error("Schema version {found} is newer than the supported version {supported}")]
    SchemaVersion { found: u32, supported: u32 },

    /// Unrecognized magic or container version
    #[error("Incompatible payload: {0}")]
    IncompatiblePayload(String),

    /// A save stage failed; no payload was produced
    #[error("Snapshot save failed during {stage}: {source}")]
    SnapshotSave {
        stage: SnapshotStage,
        #[source]
        source: Box<StateError>,
    },

    /// Strict sanitization met a reference it cannot express
    #[error("Unresolvable reference from property '{property}' to object {target}")]
    UnresolvableReference {
        property: String,
        target: ObjectHandle,
    },

    /// A requested object is not live or not persistable
    #[error("Object {0} is not available for persistence")]
    ObjectUnavailable(ObjectHandle),

    /// Compression/decompression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// The operation was cancelled before it touched any object
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O errors during file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Storage adapter errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),
}

impl StateError {
    /// Create a new format error
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::Format(msg.into())
    }

    /// Create a new incompatible payload error
    pub fn incompatible<S: Into<String>>(msg: S) -> Self {
        Self::IncompatiblePayload(msg.into())
    }

    /// Create a new compression error
    pub fn compression<S: Into<String>>(msg: S) -> Self {
        Self::Compression(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Wrap an error as a failed save stage
    pub fn snapshot_save(stage: SnapshotStage, source: StateError) -> Self {
        Self::SnapshotSave {
            stage,
            source: Box::new(source),
        }
    }

    /// The error that originally caused this one, looking through `SnapshotSave`
    pub fn root_cause(&self) -> &StateError {
        match self {
            Self::SnapshotSave { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// True for errors that mean the payload bytes themselves cannot be trusted
    pub fn is_payload_error(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::Format(_) | Self::SchemaVersion { .. } | Self::IncompatiblePayload(_)
        )
    }
}
