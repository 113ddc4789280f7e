/*!
Versioned property schemas.

A [`Schema`] lists, per object class, the properties the game persists and
the schema version each one was introduced in. Schemas only ever grow:
new fields are appended with a higher `since` version, which lets a reader
fill the gaps of an older payload with defaults while rejecting payloads
written by a newer schema.
*/

use crate::value::{Property, PropertyValue, RefIndex, ValueKind};
use crate::{Result, StateError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// First schema version
pub const INITIAL_SCHEMA_VERSION: u32 = 1;

fn initial_version() -> u32 {
    INITIAL_SCHEMA_VERSION
}

/// One persisted property of a class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub kind: ValueKind,
    /// Schema version that introduced the field
    #[serde(default = "initial_version")]
    pub since: u32,
    /// Value used when a payload does not carry the field
    #[serde(default = "null_value")]
    pub default: PropertyValue<RefIndex>,
}

fn null_value() -> PropertyValue<RefIndex> {
    PropertyValue::Null
}

/// Persisted properties of one object class, in declaration order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

impl ClassSchema {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field present since the first schema version
    pub fn with_field<S: Into<String>>(
        self,
        name: S,
        kind: ValueKind,
        default: PropertyValue<RefIndex>,
    ) -> Self {
        self.with_field_since(name, INITIAL_SCHEMA_VERSION, kind, default)
    }

    /// Add a field introduced in schema version `since`
    pub fn with_field_since<S: Into<String>>(
        mut self,
        name: S,
        since: u32,
        kind: ValueKind,
        default: PropertyValue<RefIndex>,
    ) -> Self {
        self.fields.push(FieldSchema {
            name: name.into(),
            kind,
            since,
            default,
        });
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields present in schema version `version`, in canonical wire order.
    ///
    /// Fields are grouped by the version that introduced them and keep their
    /// declaration order within a version, so the order for version N is a
    /// prefix of the order for every later version.
    pub fn canonical_fields(&self, version: u32) -> Vec<&FieldSchema> {
        let mut fields: Vec<&FieldSchema> =
            self.fields.iter().filter(|f| f.since <= version).collect();
        fields.sort_by_key(|f| f.since);
        fields
    }
}

/// Versioned set of class schemas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub version: u32,
    #[serde(default)]
    pub classes: BTreeMap<String, ClassSchema>,
}

impl Schema {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            classes: BTreeMap::new(),
        }
    }

    pub fn with_class(mut self, class: ClassSchema) -> Self {
        self.classes.insert(class.name.clone(), class);
        self
    }

    pub fn class(&self, name: &str) -> Option<&ClassSchema> {
        self.classes.get(name)
    }

    /// Parse a schema from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let schema: Schema = serde_json::from_str(json)?;
        schema.validate()?;
        Ok(schema)
    }

    /// Check internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.version < INITIAL_SCHEMA_VERSION {
            return Err(StateError::validation("schema version must be at least 1"));
        }
        for class in self.classes.values() {
            let mut names = HashSet::new();
            for field in &class.fields {
                if !names.insert(field.name.as_str()) {
                    return Err(StateError::validation(format!(
                        "class '{}' declares field '{}' twice",
                        class.name, field.name
                    )));
                }
                if field.since > self.version {
                    return Err(StateError::validation(format!(
                        "field '{}.{}' is introduced in version {} but the schema is version {}",
                        class.name, field.name, field.since, self.version
                    )));
                }
                if !field.kind.accepts(field.default.kind()) {
                    return Err(StateError::validation(format!(
                        "default of field '{}.{}' does not match its kind {:?}",
                        class.name, field.name, field.kind
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fail if a payload written with `payload_version` cannot be read
    pub fn check_readable(&self, payload_version: u32) -> Result<()> {
        if payload_version > self.version {
            return Err(StateError::SchemaVersion {
                found: payload_version,
                supported: self.version,
            });
        }
        Ok(())
    }

    /// Bring decoded properties of `class_name` in line with this schema.
    ///
    /// Known classes come back with exactly their declared fields in
    /// declaration order: missing fields and fields holding a value of the
    /// wrong kind get the declared default, undeclared properties are dropped.
    /// Classes the schema does not describe pass through untouched.
    pub fn conform(
        &self,
        class_name: &str,
        properties: Vec<Property<RefIndex>>,
    ) -> Vec<Property<RefIndex>> {
        let Some(class) = self.class(class_name) else {
            return properties;
        };

        let mut by_name: BTreeMap<String, PropertyValue<RefIndex>> = BTreeMap::new();
        for property in properties {
            if class.field(&property.name).is_none() {
                debug!(
                    class = class_name,
                    property = %property.name,
                    "Skipping property unknown to schema"
                );
                continue;
            }
            by_name.insert(property.name, property.value);
        }

        class
            .fields
            .iter()
            .map(|field| {
                let value = match by_name.remove(&field.name) {
                    Some(value) if field.kind.accepts(value.kind()) => value,
                    Some(_) => {
                        debug!(
                            class = class_name,
                            property = %field.name,
                            "Replacing value of unexpected kind with default"
                        );
                        field.default.clone()
                    }
                    None => field.default.clone(),
                };
                Property::new(field.name.clone(), value)
            })
            .collect()
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(INITIAL_SCHEMA_VERSION)
    }
}
