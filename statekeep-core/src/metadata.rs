/*!
Slot metadata carried inside a save payload.

Tools listing save slots need to show what a slot is and when it was
written without decoding the record stream, so this small JSON block sits
between the payload header and the body.
*/

use crate::{Result, StateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Descriptive data about one save
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SlotMetadata {
    /// Storage slot the payload was written to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot_name: Option<String>,

    /// Display title chosen by the game
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// When the save was taken
    pub saved_at: DateTime<Utc>,

    /// World or level that was active when saving
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_saved_world: Option<String>,
}

impl SlotMetadata {
    /// Metadata stamped with the current time
    ///
    /// # Example
    /// ```rust
    /// use statekeep_core::SlotMetadata;
    ///
    /// let metadata = SlotMetadata::new().with_title("Before the lighthouse");
    /// assert_eq!(metadata.title.as_deref(), Some("Before the lighthouse"));
    /// assert!(metadata.slot_name.is_none());
    /// ```
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Metadata for a save taken at `saved_at`
    pub fn at(saved_at: DateTime<Utc>) -> Self {
        Self {
            slot_name: None,
            title: None,
            saved_at,
            last_saved_world: None,
        }
    }

    pub fn with_slot_name<S: Into<String>>(mut self, slot_name: S) -> Self {
        self.slot_name = Some(slot_name.into());
        self
    }

    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_world<S: Into<String>>(mut self, world: S) -> Self {
        self.last_saved_world = Some(world.into());
        self
    }

    /// Reject present-but-empty names
    pub fn validate(&self) -> Result<()> {
        let empty = |value: &Option<String>| value.as_deref().is_some_and(str::is_empty);
        if empty(&self.slot_name) {
            return Err(StateError::validation("slot_name cannot be empty"));
        }
        if empty(&self.title) {
            return Err(StateError::validation("title cannot be empty"));
        }
        if empty(&self.last_saved_world) {
            return Err(StateError::validation("last_saved_world cannot be empty"));
        }
        Ok(())
    }

    /// Serialized form embedded in the payload
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse the embedded form; malformed bytes are a corrupt payload
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| StateError::format(format!("malformed slot metadata: {e}")))
    }
}

impl Default for SlotMetadata {
    fn default() -> Self {
        Self::new()
    }
}
