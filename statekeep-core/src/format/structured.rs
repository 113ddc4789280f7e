/*!
Self-describing JSON formatter.
*/

use super::SerializationFormatter;
use crate::config::FormatStrategy;
use crate::identity::ObjectIdentity;
use crate::sanitizer::{RecordGroup, ReferenceTable, SanitizedStream};
use crate::schema::Schema;
use crate::value::RefIndex;
use crate::{Result, StateError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Format tag embedded in every structured body
pub const STRUCTURED_FORMAT_TAG: &str = "statekeep/structured";

#[derive(Serialize)]
struct BodyOut<'a> {
    format: &'a str,
    schema_version: u32,
    references: &'a [ObjectIdentity],
    records: &'a [RecordGroup<RefIndex>],
}

#[derive(Deserialize)]
struct BodyIn {
    format: String,
    schema_version: u32,
    #[serde(default)]
    references: Vec<ObjectIdentity>,
    #[serde(default)]
    records: Vec<RecordGroup<RefIndex>>,
}

/// JSON formatter that keeps property names and declaration order.
///
/// Reading is lenient: unknown top-level fields are ignored, and records of
/// classes the reader's schema knows are conformed to it (missing fields get
/// their default, undeclared ones are dropped).
#[derive(Debug, Clone, Default)]
pub struct StructuredFormatter {
    pretty: bool,
}

impl StructuredFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indented output, for payloads meant to be read by people
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl SerializationFormatter for StructuredFormatter {
    fn encoding(&self) -> FormatStrategy {
        FormatStrategy::Structured
    }

    fn encode(&self, stream: &SanitizedStream, schema: &Schema) -> Result<Vec<u8>> {
        let body = BodyOut {
            format: STRUCTURED_FORMAT_TAG,
            schema_version: schema.version,
            references: stream.table.entries(),
            records: &stream.groups,
        };
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&body)?
        } else {
            serde_json::to_vec(&body)?
        };
        Ok(bytes)
    }

    fn decode(&self, body: &[u8], target: &Schema) -> Result<SanitizedStream> {
        let parsed: BodyIn = serde_json::from_slice(body)
            .map_err(|e| StateError::format(format!("Malformed structured body: {e}")))?;

        if parsed.format != STRUCTURED_FORMAT_TAG {
            return Err(StateError::format(format!(
                "Unknown structured format tag '{}'",
                parsed.format
            )));
        }
        target.check_readable(parsed.schema_version)?;

        let table = ReferenceTable::from_entries(parsed.references)?;
        let groups = parsed
            .records
            .into_iter()
            .map(|group| {
                let properties = target.conform(&group.class_name, group.properties);
                RecordGroup { properties, ..group }
            })
            .collect::<Vec<_>>();

        debug!(
            records = groups.len(),
            references = table.len(),
            payload_schema = parsed.schema_version,
            reader_schema = target.version,
            "Decoded structured body"
        );
        Ok(SanitizedStream { table, groups })
    }

    fn format_name(&self) -> &str {
        "structured"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::OriginScope;
    use crate::schema::ClassSchema;
    use crate::value::{Property, PropertyValue, ValueKind};

    fn stream() -> SanitizedStream {
        let a = ObjectIdentity::named("A", OriginScope::Level);
        let b = ObjectIdentity::named("B", OriginScope::Level);
        let table = ReferenceTable::from_entries(vec![b.clone()]).unwrap();
        SanitizedStream {
            table,
            groups: vec![RecordGroup::new(a, "Door", "A").with_properties(vec![
                Property::new("open", PropertyValue::Bool(true)),
                Property::new("lock", PropertyValue::Reference(RefIndex(0))),
            ])],
        }
    }

    #[test]
    fn test_roundtrip_without_schema() {
        let formatter = StructuredFormatter::new();
        let schema = Schema::new(1);
        let bytes = formatter.encode(&stream(), &schema).unwrap();
        assert_eq!(formatter.decode(&bytes, &schema).unwrap(), stream());
    }

    #[test]
    fn test_unknown_top_level_fields_are_ignored() {
        let formatter = StructuredFormatter::new();
        let schema = Schema::new(1);
        let bytes = formatter.encode(&stream(), &schema).unwrap();

        let mut value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        value["written_by"] = serde_json::json!("tools 2.1");
        let patched = serde_json::to_vec(&value).unwrap();

        assert_eq!(formatter.decode(&patched, &schema).unwrap(), stream());
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let formatter = StructuredFormatter::new();
        let bytes = formatter.encode(&stream(), &Schema::new(3)).unwrap();
        let err = formatter.decode(&bytes, &Schema::new(2)).unwrap_err();
        assert!(matches!(err, StateError::SchemaVersion { found: 3, supported: 2 }));
    }

    #[test]
    fn test_older_payload_gets_defaults() {
        let formatter = StructuredFormatter::new();
        let bytes = formatter.encode(&stream(), &Schema::new(1)).unwrap();

        let reader = Schema::new(2).with_class(
            ClassSchema::new("Door")
                .with_field("open", ValueKind::Bool, PropertyValue::Bool(false))
                .with_field("lock", ValueKind::Reference, PropertyValue::Null)
                .with_field_since("hinge", 2, ValueKind::Text, PropertyValue::Text("left".into())),
        );
        let decoded = formatter.decode(&bytes, &reader).unwrap();
        let hinge = &decoded.groups[0].properties[2];
        assert_eq!(hinge.name, "hinge");
        assert_eq!(hinge.value, PropertyValue::Text("left".into()));
    }

    #[test]
    fn test_garbage_is_a_format_error() {
        let formatter = StructuredFormatter::new();
        let err = formatter.decode(b"{\"format\": 12", &Schema::new(1)).unwrap_err();
        assert!(matches!(err, StateError::Format(_)));

        let err = formatter
            .decode(br#"{"format": "other", "schema_version": 1}"#, &Schema::new(1))
            .unwrap_err();
        assert!(matches!(err, StateError::Format(_)));
    }
}
