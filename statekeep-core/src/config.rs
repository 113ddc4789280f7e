//! Configuration module for persistence behaviour
//!
//! This module provides the configuration object that selects the identity
//! scheme, serialization format, sanitization strictness and compression for
//! a deployment target. A configuration is resolved once per process and
//! treated as constant afterwards.

use serde::{Deserialize, Serialize};

/// Identity scheme used for objects that have no identity yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentitySchemeKind {
    /// Keys derived from stable object names (editor and debug builds)
    Named,
    /// Random 128-bit keys attached to the object (shipping builds)
    Generated,
    /// Generated keys taken from the engine's own object handles
    LegacyHandle,
}

impl IdentitySchemeKind {
    /// Tag written to the payload header
    pub fn to_byte(self) -> u8 {
        match self {
            IdentitySchemeKind::Named => 0,
            IdentitySchemeKind::Generated => 1,
            IdentitySchemeKind::LegacyHandle => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(IdentitySchemeKind::Named),
            1 => Some(IdentitySchemeKind::Generated),
            2 => Some(IdentitySchemeKind::LegacyHandle),
            _ => None,
        }
    }
}

/// Wire format used for the property stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormatStrategy {
    /// Self-describing JSON, tolerant of schema drift
    Structured,
    /// Dense schema-ordered binary
    Compact,
}

impl FormatStrategy {
    /// Tag written to the payload header
    pub fn to_byte(self) -> u8 {
        match self {
            FormatStrategy::Structured => 0,
            FormatStrategy::Compact => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(FormatStrategy::Structured),
            1 => Some(FormatStrategy::Compact),
            _ => None,
        }
    }
}

/// Deployment targets with a preset configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildTarget {
    Editor,
    Development,
    Shipping,
}

/// Configuration structure for persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// Scheme used to derive new identities
    pub identity_scheme: IdentitySchemeKind,
    /// Wire format for the property stream
    pub format: FormatStrategy,
    /// Fail a save on references that cannot be expressed instead of nulling them
    pub strict_sanitization: bool,
    /// Compress the encoded body with gzip
    pub compression: bool,
    /// Gzip level (0-9)
    pub compression_level: u32,
    /// Append a SHA-256 checksum to every payload
    pub integrity_checksum: bool,
}

impl PersistenceConfig {
    /// Editor preset: readable names and JSON, no compression
    pub fn editor() -> Self {
        PersistenceConfig {
            identity_scheme: IdentitySchemeKind::Named,
            format: FormatStrategy::Structured,
            strict_sanitization: true,
            compression: false,
            compression_level: 6,
            integrity_checksum: true,
        }
    }

    /// Development preset: shipping identities with an inspectable format
    pub fn development() -> Self {
        PersistenceConfig {
            identity_scheme: IdentitySchemeKind::Generated,
            format: FormatStrategy::Structured,
            strict_sanitization: false,
            compression: true,
            compression_level: 1,
            integrity_checksum: true,
        }
    }

    /// Shipping preset: generated identities, compact binary, gzip
    pub fn shipping() -> Self {
        PersistenceConfig {
            identity_scheme: IdentitySchemeKind::Generated,
            format: FormatStrategy::Compact,
            strict_sanitization: false,
            compression: true,
            compression_level: 6,
            integrity_checksum: true,
        }
    }

    /// Preset for a deployment target
    pub fn for_target(target: BuildTarget) -> Self {
        match target {
            BuildTarget::Editor => Self::editor(),
            BuildTarget::Development => Self::development(),
            BuildTarget::Shipping => Self::shipping(),
        }
    }

    /// Parse a JSON configuration; omitted fields take the shipping defaults
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let config: PersistenceConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.compression_level > 9 {
            return Err(crate::StateError::validation(format!(
                "compression level must be between 0 and 9, got {}",
                self.compression_level
            )));
        }
        Ok(())
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self::shipping()
    }
}
