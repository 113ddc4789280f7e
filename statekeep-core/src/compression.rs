/*!
Compression codecs for encoded payload bodies.

The codec used for a save is recorded in the payload header, so a reader
picks the matching codec regardless of its own configuration.
*/

use crate::{Result, StateError};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{Read, Write};
use std::sync::Arc;

/// Compression algorithm recorded in the payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionKind {
    None,
    Gzip,
}

impl CompressionKind {
    pub fn to_byte(self) -> u8 {
        match self {
            CompressionKind::None => 0,
            CompressionKind::Gzip => 1,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(CompressionKind::None),
            1 => Some(CompressionKind::Gzip),
            _ => None,
        }
    }
}

/// Codec applied to an encoded body before it is framed into a payload.
///
/// Codecs are shared with background encode jobs, hence `Send + Sync`.
pub trait CompressionCodec: Send + Sync {
    /// Compress an encoded record stream
    fn compress(&self, body: &[u8]) -> Result<Vec<u8>>;

    /// Restore the encoded record stream of a payload body.
    ///
    /// Damaged input is a [`StateError::Compression`] error.
    fn decompress(&self, body: &[u8]) -> Result<Vec<u8>>;

    /// Header tag of this codec
    fn kind(&self) -> CompressionKind;

    /// Name used in logs
    fn algorithm_name(&self) -> &str;
}

/// Gzip codec through flate2.
///
/// The level only affects writing; any level is read back by
/// `codec_for(CompressionKind::Gzip)`.
///
/// # Example
/// ```rust
/// use statekeep_core::compression::{codec_for, CompressionCodec, CompressionKind, GzipCompressor};
///
/// let body = b"door open, key in drawer, guard asleep";
/// let compressed = GzipCompressor::max().compress(body)?;
/// let restored = codec_for(CompressionKind::Gzip).decompress(&compressed)?;
/// assert_eq!(body, &restored[..]);
/// # Ok::<(), statekeep_core::StateError>(())
/// ```
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    compression_level: Compression,
}

impl GzipCompressor {
    /// Level 6
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
        }
    }

    /// Level between 0 (store) and 9, as validated by `PersistenceConfig`
    pub fn with_level(level: u32) -> Self {
        Self {
            compression_level: Compression::new(level),
        }
    }

    pub fn fast() -> Self {
        Self::with_level(1)
    }

    pub fn max() -> Self {
        Self::with_level(9)
    }

    pub fn level(&self) -> u32 {
        self.compression_level.level()
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionCodec for GzipCompressor {
    fn compress(&self, body: &[u8]) -> Result<Vec<u8>> {
        let mut encoder =
            GzEncoder::new(Vec::with_capacity(body.len() / 2), self.compression_level);
        encoder
            .write_all(body)
            .map_err(|e| StateError::compression(format!("gzip write of body failed: {e}")))?;
        encoder
            .finish()
            .map_err(|e| StateError::compression(format!("gzip finish failed: {e}")))
    }

    fn decompress(&self, body: &[u8]) -> Result<Vec<u8>> {
        let mut restored = Vec::with_capacity(body.len() * 2);
        GzDecoder::new(body)
            .read_to_end(&mut restored)
            .map_err(|e| StateError::compression(format!("gzip body is damaged: {e}")))?;
        Ok(restored)
    }

    fn kind(&self) -> CompressionKind {
        CompressionKind::Gzip
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass-through codec for uncompressed payloads
#[derive(Debug, Clone, Default)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionCodec for NoCompression {
    fn compress(&self, body: &[u8]) -> Result<Vec<u8>> {
        Ok(body.to_vec())
    }

    fn decompress(&self, body: &[u8]) -> Result<Vec<u8>> {
        Ok(body.to_vec())
    }

    fn kind(&self) -> CompressionKind {
        CompressionKind::None
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}

/// Codec able to read bodies tagged with `kind`
pub fn codec_for(kind: CompressionKind) -> Arc<dyn CompressionCodec> {
    match kind {
        CompressionKind::None => Arc::new(NoCompression),
        CompressionKind::Gzip => Arc::new(GzipCompressor::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FormatStrategy, IdentitySchemeKind};
    use crate::payload::{PayloadHeader, SavePayload, PAYLOAD_FORMAT_VERSION};

    fn framed(codec: &dyn CompressionCodec, body: &[u8]) -> SavePayload {
        let header = PayloadHeader {
            format_version: PAYLOAD_FORMAT_VERSION,
            identity_scheme: IdentitySchemeKind::Generated,
            compression: codec.kind(),
            schema_id: 1,
            record_count: 1,
            encoding: FormatStrategy::Compact,
            has_checksum: false,
            body_len: 0,
            has_metadata: false,
            metadata_len: 0,
        };
        SavePayload::assemble(header, None, &codec.compress(body).unwrap()).unwrap()
    }

    #[test]
    fn test_reader_follows_the_header_tag() {
        let body = b"SKCB guard_07 patrol A B C D alert 0; ".repeat(10);
        let writers: [Arc<dyn CompressionCodec>; 3] = [
            Arc::new(GzipCompressor::fast()),
            Arc::new(GzipCompressor::max()),
            Arc::new(NoCompression),
        ];
        for codec in writers {
            let payload = framed(codec.as_ref(), &body);
            let reader = codec_for(payload.header().compression);
            assert_eq!(reader.kind(), codec.kind());
            assert_eq!(reader.decompress(payload.body()).unwrap(), body);
        }
    }

    #[test]
    fn test_gzip_shrinks_repetitive_bodies() {
        let body = b"crate crate crate barrel crate barrel".repeat(20);
        let gzip = framed(&GzipCompressor::new(), &body);
        let stored = framed(&NoCompression, &body);
        assert!(gzip.body().len() < stored.body().len());
        assert_eq!(stored.body(), &body[..]);
    }

    #[test]
    fn test_uncompressed_body_read_as_gzip_is_a_compression_error() {
        let payload = framed(&NoCompression, b"not a gzip stream");
        let err = codec_for(CompressionKind::Gzip)
            .decompress(payload.body())
            .unwrap_err();
        assert!(matches!(err, StateError::Compression(_)));
    }

    #[test]
    fn test_tag_bytes() {
        for kind in [CompressionKind::None, CompressionKind::Gzip] {
            assert_eq!(CompressionKind::from_byte(kind.to_byte()), Some(kind));
        }
        assert_eq!(CompressionKind::from_byte(9), None);
        assert_eq!(GzipCompressor::with_level(4).level(), 4);
    }
}
