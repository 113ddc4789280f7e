/*!
Dense binary formatter.

Body layout: `"SKCB" | revision u8 | schema version u32 LE | bincode body`.
Each record stores one optional value per field of its class, in the class's
canonical order for the writer's schema version. Because schemas only append
fields with a higher `since`, a reader with a newer schema recovers the
writer's slot order from its own schema and fills the trailing fields with
defaults.
*/

use super::SerializationFormatter;
use crate::config::FormatStrategy;
use crate::identity::ObjectIdentity;
use crate::sanitizer::{RecordGroup, ReferenceTable, SanitizedStream};
use crate::schema::Schema;
use crate::value::{Property, PropertyValue, RefIndex};
use crate::{Result, StateError};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tag at the start of every compact body
pub const COMPACT_FORMAT_TAG: [u8; 4] = *b"SKCB";
/// Current layout revision of the compact body
pub const COMPACT_FORMAT_REVISION: u8 = 1;

const PREFIX_LEN: usize = 4 + 1 + 4;

#[derive(Serialize, Deserialize)]
struct CompactBody {
    references: Vec<ObjectIdentity>,
    records: Vec<CompactRecord>,
}

#[derive(Serialize, Deserialize)]
struct CompactRecord {
    owner: ObjectIdentity,
    class_name: String,
    path: String,
    /// `None` means "not set, use the schema default"
    slots: Vec<Option<PropertyValue<RefIndex>>>,
}

/// Schema-ordered bincode formatter.
///
/// Only classes and fields declared by the writer's schema are stored;
/// undeclared properties are dropped at encode time.
#[derive(Debug, Clone, Default)]
pub struct CompactFormatter;

impl CompactFormatter {
    pub fn new() -> Self {
        Self
    }

    fn encode_record(group: &RecordGroup<RefIndex>, schema: &Schema) -> Result<CompactRecord> {
        let class = schema.class(&group.class_name).ok_or_else(|| {
            StateError::format(format!(
                "class '{}' is not declared in schema version {}",
                group.class_name, schema.version
            ))
        })?;

        for property in &group.properties {
            if class.field(&property.name).is_none() {
                debug!(
                    class = %group.class_name,
                    property = %property.name,
                    "Dropping property not declared in schema"
                );
            }
        }

        let slots = class
            .canonical_fields(schema.version)
            .into_iter()
            .map(|field| {
                match group.properties.iter().find(|p| p.name == field.name) {
                    Some(property) if field.kind.accepts(property.value.kind()) => {
                        Ok(Some(property.value.clone()))
                    }
                    Some(property) => Err(StateError::format(format!(
                        "field '{}.{}' expects {:?} but holds {:?}",
                        group.class_name,
                        field.name,
                        field.kind,
                        property.value.kind()
                    ))),
                    None => Ok(None),
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(CompactRecord {
            owner: group.owner.clone(),
            class_name: group.class_name.clone(),
            path: group.path.clone(),
            slots,
        })
    }

    fn decode_record(
        record: CompactRecord,
        payload_version: u32,
        target: &Schema,
    ) -> Result<RecordGroup<RefIndex>> {
        let class = target.class(&record.class_name).ok_or_else(|| {
            StateError::format(format!(
                "record of unknown class '{}' in compact body",
                record.class_name
            ))
        })?;

        let fields = class.canonical_fields(payload_version);
        if fields.len() != record.slots.len() {
            return Err(StateError::format(format!(
                "record of class '{}' has {} slots, schema version {} declares {}",
                record.class_name,
                record.slots.len(),
                payload_version,
                fields.len()
            )));
        }

        let stored = fields
            .into_iter()
            .zip(record.slots)
            .filter_map(|(field, slot)| slot.map(|value| Property::new(field.name.clone(), value)))
            .collect();

        Ok(RecordGroup {
            properties: target.conform(&record.class_name, stored),
            owner: record.owner,
            class_name: record.class_name,
            path: record.path,
        })
    }
}

impl SerializationFormatter for CompactFormatter {
    fn encoding(&self) -> FormatStrategy {
        FormatStrategy::Compact
    }

    fn encode(&self, stream: &SanitizedStream, schema: &Schema) -> Result<Vec<u8>> {
        let records = stream
            .groups
            .iter()
            .map(|group| Self::encode_record(group, schema))
            .collect::<Result<Vec<_>>>()?;
        let body = CompactBody {
            references: stream.table.entries().to_vec(),
            records,
        };

        let encoded = bincode::serde::encode_to_vec(&body, bincode::config::standard())
            .map_err(|e| StateError::format(format!("Failed to encode compact body: {e}")))?;

        let mut out = Vec::with_capacity(PREFIX_LEN + encoded.len());
        out.extend_from_slice(&COMPACT_FORMAT_TAG);
        out.push(COMPACT_FORMAT_REVISION);
        out.extend_from_slice(&schema.version.to_le_bytes());
        out.extend_from_slice(&encoded);
        Ok(out)
    }

    fn decode(&self, body: &[u8], target: &Schema) -> Result<SanitizedStream> {
        if body.len() < PREFIX_LEN {
            return Err(StateError::format(format!(
                "compact body truncated: {} bytes",
                body.len()
            )));
        }
        if body[0..4] != COMPACT_FORMAT_TAG {
            return Err(StateError::format("unknown compact format tag"));
        }
        if body[4] != COMPACT_FORMAT_REVISION {
            return Err(StateError::format(format!(
                "unsupported compact revision {}",
                body[4]
            )));
        }
        let payload_version = u32::from_le_bytes([body[5], body[6], body[7], body[8]]);
        target.check_readable(payload_version)?;

        let (parsed, consumed): (CompactBody, usize) =
            bincode::serde::decode_from_slice(&body[PREFIX_LEN..], bincode::config::standard())
                .map_err(|e| StateError::format(format!("Malformed compact body: {e}")))?;
        if consumed != body.len() - PREFIX_LEN {
            return Err(StateError::format(format!(
                "{} trailing bytes after compact body",
                body.len() - PREFIX_LEN - consumed
            )));
        }

        let table = ReferenceTable::from_entries(parsed.references)?;
        let groups = parsed
            .records
            .into_iter()
            .map(|record| Self::decode_record(record, payload_version, target))
            .collect::<Result<Vec<_>>>()?;

        debug!(
            records = groups.len(),
            references = table.len(),
            payload_schema = payload_version,
            reader_schema = target.version,
            "Decoded compact body"
        );
        Ok(SanitizedStream { table, groups })
    }

    fn format_name(&self) -> &str {
        "compact"
    }
}
