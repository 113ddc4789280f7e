/*!
Serialization formatters for sanitized record streams.

A formatter turns a [`SanitizedStream`] into body bytes and back. Two
strategies ship with the crate:

- [`StructuredFormatter`]: self-describing JSON, tolerant of schema drift
  and readable with any JSON tool
- [`CompactFormatter`]: dense bincode body with values laid out in the
  schema's canonical field order

Both embed a format tag and the writer's schema version in the body, and both
refuse payloads written with a schema newer than the reader's.
*/

pub mod compact;
pub mod structured;

pub use compact::CompactFormatter;
pub use structured::StructuredFormatter;

use crate::config::FormatStrategy;
use crate::sanitizer::SanitizedStream;
use crate::schema::Schema;
use crate::Result;
use std::sync::Arc;

/// Encoding abstraction for sanitized record streams
///
/// Implementations must be stateless so a single instance can encode on a
/// background thread while the owning manager keeps working.
pub trait SerializationFormatter: Send + Sync {
    /// Strategy implemented, recorded in the payload header
    fn encoding(&self) -> FormatStrategy;

    /// Encode a stream
    ///
    /// # Arguments
    /// * `stream` - Reference-free records and their reference table
    /// * `schema` - Schema of the writing build
    ///
    /// # Returns
    /// The encoded body bytes
    fn encode(&self, stream: &SanitizedStream, schema: &Schema) -> Result<Vec<u8>>;

    /// Decode a body into a stream conforming to `target`
    ///
    /// # Arguments
    /// * `body` - Bytes produced by [`SerializationFormatter::encode`]
    /// * `target` - Schema of the reading build
    ///
    /// # Returns
    /// The decoded stream, or `Format` / `SchemaVersion` errors
    fn decode(&self, body: &[u8], target: &Schema) -> Result<SanitizedStream>;

    /// Name used in logs and tooling
    fn format_name(&self) -> &str;
}

/// Formatter for a configured strategy
pub fn formatter_for(strategy: FormatStrategy) -> Arc<dyn SerializationFormatter> {
    match strategy {
        FormatStrategy::Structured => Arc::new(StructuredFormatter::new()),
        FormatStrategy::Compact => Arc::new(CompactFormatter::new()),
    }
}
