/*!
Save payload container.

Layout (all integers little-endian):

```text
[0..4]    magic "PSTA"
[4..6]    container format version (u16)
[6]       identity scheme tag
[7]       compression tag
[8..12]   schema id (u32)
[12..16]  record count (u32)
[16]      encoding tag
[17]      flags (bit 0: checksum present, bit 1: metadata present)
[18..22]  body length (u32)
[22..26]  metadata length (u32), when flagged
[..]      slot metadata (JSON), when flagged
[..]      body
[..+32]   SHA-256 over everything before it, when flagged
```

A payload is immutable once assembled and wraps [`Bytes`], so clones are
cheap and it can be handed to other threads as is.
*/

use crate::compression::CompressionKind;
use crate::config::{FormatStrategy, IdentitySchemeKind};
use crate::metadata::SlotMetadata;
use crate::{Result, StateError};
use bytes::Bytes;
use sha2::digest::Output;
use sha2::{Digest, Sha256};

/// Magic bytes identifying a save payload
pub const PAYLOAD_MAGIC: [u8; 4] = *b"PSTA";

/// Current container layout version
pub const PAYLOAD_FORMAT_VERSION: u16 = 1;

/// Size of the fixed header in bytes
pub const PAYLOAD_HEADER_SIZE: usize = 22;

/// Size of the trailing checksum in bytes
pub const CHECKSUM_SIZE: usize = 32;

/// Size of the metadata length prefix in bytes
pub const METADATA_LEN_SIZE: usize = 4;

const FLAG_CHECKSUM: u8 = 0b0000_0001;
const FLAG_METADATA: u8 = 0b0000_0010;
const KNOWN_FLAGS: u8 = FLAG_CHECKSUM | FLAG_METADATA;

/// Parsed payload header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub format_version: u16,
    pub identity_scheme: IdentitySchemeKind,
    pub compression: CompressionKind,
    /// Schema version the body was written with
    pub schema_id: u32,
    pub record_count: u32,
    pub encoding: FormatStrategy,
    pub has_checksum: bool,
    pub body_len: u32,
    pub has_metadata: bool,
    pub metadata_len: u32,
}

impl PayloadHeader {
    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&PAYLOAD_MAGIC);
        out.extend_from_slice(&self.format_version.to_le_bytes());
        out.push(self.identity_scheme.to_byte());
        out.push(self.compression.to_byte());
        out.extend_from_slice(&self.schema_id.to_le_bytes());
        out.extend_from_slice(&self.record_count.to_le_bytes());
        out.push(self.encoding.to_byte());
        let mut flags = 0;
        if self.has_checksum {
            flags |= FLAG_CHECKSUM;
        }
        if self.has_metadata {
            flags |= FLAG_METADATA;
        }
        out.push(flags);
        out.extend_from_slice(&self.body_len.to_le_bytes());
        if self.has_metadata {
            out.extend_from_slice(&self.metadata_len.to_le_bytes());
        }
    }

    /// Parse and validate the fixed header.
    ///
    /// # Errors
    ///
    /// - `IncompatiblePayload` for a wrong magic or an unsupported container
    ///   version
    /// - `Format` for truncated bytes or unknown tag values
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 || bytes[..4] != PAYLOAD_MAGIC {
            return Err(StateError::incompatible("missing PSTA magic bytes"));
        }
        if bytes.len() < PAYLOAD_HEADER_SIZE {
            return Err(StateError::format(format!(
                "payload is too short ({} bytes, need at least {} for the header)",
                bytes.len(),
                PAYLOAD_HEADER_SIZE
            )));
        }

        let format_version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if format_version == 0 || format_version > PAYLOAD_FORMAT_VERSION {
            return Err(StateError::incompatible(format!(
                "container format version {}, this build supports up to {}",
                format_version, PAYLOAD_FORMAT_VERSION
            )));
        }

        let identity_scheme = IdentitySchemeKind::from_byte(bytes[6]).ok_or_else(|| {
            StateError::format(format!("unknown identity scheme tag {}", bytes[6]))
        })?;
        let compression = CompressionKind::from_byte(bytes[7])
            .ok_or_else(|| StateError::format(format!("unknown compression tag {}", bytes[7])))?;
        let schema_id = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let record_count = u32::from_le_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        let encoding = FormatStrategy::from_byte(bytes[16])
            .ok_or_else(|| StateError::format(format!("unknown encoding tag {}", bytes[16])))?;
        let flags = bytes[17];
        if flags & !KNOWN_FLAGS != 0 {
            return Err(StateError::format(format!("unknown header flags {flags:#010b}")));
        }
        let body_len = u32::from_le_bytes([bytes[18], bytes[19], bytes[20], bytes[21]]);
        let has_metadata = flags & FLAG_METADATA != 0;
        let metadata_len = if has_metadata {
            let end = PAYLOAD_HEADER_SIZE + METADATA_LEN_SIZE;
            let prefix = bytes.get(PAYLOAD_HEADER_SIZE..end).ok_or_else(|| {
                StateError::format("payload ends inside the metadata length")
            })?;
            u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]])
        } else {
            0
        };

        Ok(Self {
            format_version,
            identity_scheme,
            compression,
            schema_id,
            record_count,
            encoding,
            has_checksum: flags & FLAG_CHECKSUM != 0,
            body_len,
            has_metadata,
            metadata_len,
        })
    }

    /// Offset of the metadata JSON, when present
    fn metadata_offset(&self) -> usize {
        PAYLOAD_HEADER_SIZE + METADATA_LEN_SIZE
    }

    /// Offset of the body
    pub fn body_offset(&self) -> usize {
        if self.has_metadata {
            self.metadata_offset() + self.metadata_len as usize
        } else {
            PAYLOAD_HEADER_SIZE
        }
    }

    /// Total payload size implied by this header
    pub fn total_len(&self) -> usize {
        self.body_offset()
            + self.body_len as usize
            + if self.has_checksum { CHECKSUM_SIZE } else { 0 }
    }
}

/// Immutable, self-describing save payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePayload {
    header: PayloadHeader,
    metadata: Option<SlotMetadata>,
    bytes: Bytes,
}

impl SavePayload {
    /// Build a payload around an encoded (and possibly compressed) body.
    ///
    /// The length and metadata fields of `header` are overwritten to match
    /// `metadata` and `body`.
    pub fn assemble(
        mut header: PayloadHeader,
        metadata: Option<SlotMetadata>,
        body: &[u8],
    ) -> Result<Self> {
        let encoded_metadata = metadata.as_ref().map(SlotMetadata::to_bytes).transpose()?;
        header.has_metadata = encoded_metadata.is_some();
        header.metadata_len =
            section_len(encoded_metadata.as_deref().unwrap_or_default(), "metadata")?;
        header.body_len = section_len(body, "body")?;

        let mut out = Vec::with_capacity(header.total_len());
        header.write_to(&mut out);
        if let Some(encoded) = &encoded_metadata {
            out.extend_from_slice(encoded);
        }
        out.extend_from_slice(body);
        if header.has_checksum {
            let digest = Sha256::digest(&out);
            out.extend_from_slice(&digest);
        }

        Ok(Self {
            header,
            metadata,
            bytes: Bytes::from(out),
        })
    }

    /// Parse payload bytes, validating header and length but not the checksum.
    pub fn from_bytes<B: Into<Bytes>>(bytes: B) -> Result<Self> {
        let bytes = bytes.into();
        let header = PayloadHeader::parse(&bytes)?;
        let expected = header.total_len();
        if bytes.len() < expected {
            return Err(StateError::format(format!(
                "payload truncated: {} bytes, header announces {}",
                bytes.len(),
                expected
            )));
        }
        if bytes.len() > expected {
            return Err(StateError::format(format!(
                "{} trailing bytes after payload",
                bytes.len() - expected
            )));
        }
        let metadata = if header.has_metadata {
            let start = header.metadata_offset();
            Some(SlotMetadata::from_bytes(
                &bytes[start..start + header.metadata_len as usize],
            )?)
        } else {
            None
        };
        Ok(Self {
            header,
            metadata,
            bytes,
        })
    }

    pub fn header(&self) -> &PayloadHeader {
        &self.header
    }

    /// Slot metadata embedded at save time
    pub fn metadata(&self) -> Option<&SlotMetadata> {
        self.metadata.as_ref()
    }

    /// The encoded body, still compressed if the header says so
    pub fn body(&self) -> &[u8] {
        let start = self.header.body_offset();
        &self.bytes[start..start + self.header.body_len as usize]
    }

    fn covered_len(&self) -> usize {
        self.header.body_offset() + self.header.body_len as usize
    }

    /// Stored checksum, if any
    pub fn checksum(&self) -> Option<&[u8]> {
        if !self.header.has_checksum {
            return None;
        }
        let start = self.covered_len();
        Some(&self.bytes[start..start + CHECKSUM_SIZE])
    }

    /// Stored checksum as lowercase hex
    pub fn checksum_hex(&self) -> Option<String> {
        self.checksum()
            .map(|sum| format!("{:x}", <Output<Sha256>>::clone_from_slice(sum)))
    }

    /// Recompute the checksum and compare it with the stored one.
    ///
    /// Payloads written without a checksum always pass.
    pub fn verify_integrity(&self) -> Result<()> {
        let Some(stored) = self.checksum() else {
            return Ok(());
        };
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes[..self.covered_len()]);
        let computed = hasher.finalize();
        if computed.as_slice() == stored {
            Ok(())
        } else {
            Err(StateError::format(format!(
                "checksum mismatch: expected {}, computed {:x}",
                self.checksum_hex().unwrap_or_default(),
                computed
            )))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn section_len(section: &[u8], name: &str) -> Result<u32> {
    u32::try_from(section.len()).map_err(|_| {
        StateError::format(format!("{name} of {} bytes does not fit a payload", section.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(has_checksum: bool) -> PayloadHeader {
        PayloadHeader {
            format_version: PAYLOAD_FORMAT_VERSION,
            identity_scheme: IdentitySchemeKind::Generated,
            compression: CompressionKind::None,
            schema_id: 4,
            record_count: 2,
            encoding: FormatStrategy::Compact,
            has_checksum,
            body_len: 0,
            has_metadata: false,
            metadata_len: 0,
        }
    }

    #[test]
    fn test_assemble_and_parse() {
        let payload = SavePayload::assemble(header(true), None, b"body bytes").unwrap();
        assert_eq!(&payload.as_bytes()[..4], b"PSTA");
        assert_eq!(payload.len(), PAYLOAD_HEADER_SIZE + 10 + CHECKSUM_SIZE);

        let parsed = SavePayload::from_bytes(payload.as_bytes().to_vec()).unwrap();
        assert_eq!(parsed.header().schema_id, 4);
        assert_eq!(parsed.header().record_count, 2);
        assert_eq!(parsed.body(), b"body bytes");
        assert!(parsed.verify_integrity().is_ok());
        assert_eq!(parsed.checksum_hex().unwrap().len(), 64);
    }

    #[test]
    fn test_without_checksum() {
        let payload = SavePayload::assemble(header(false), None, b"abc").unwrap();
        assert!(payload.checksum().is_none());
        assert!(payload.verify_integrity().is_ok());
        assert_eq!(payload.len(), PAYLOAD_HEADER_SIZE + 3);
    }

    #[test]
    fn test_flipped_body_byte_fails_checksum() {
        let payload = SavePayload::assemble(header(true), None, b"body bytes").unwrap();
        let mut bytes = payload.as_bytes().to_vec();
        bytes[PAYLOAD_HEADER_SIZE + 2] ^= 0xFF;

        let parsed = SavePayload::from_bytes(bytes).unwrap();
        let err = parsed.verify_integrity().unwrap_err();
        assert!(matches!(err, StateError::Format(ref msg) if msg.contains("checksum mismatch")));
    }

    #[test]
    fn test_checksum_hex_matches_digest() {
        let payload = SavePayload::assemble(header(true), None, b"body bytes").unwrap();
        let covered = &payload.as_bytes()[..PAYLOAD_HEADER_SIZE + 10];
        assert_eq!(
            payload.checksum_hex().unwrap(),
            format!("{:x}", Sha256::digest(covered))
        );
    }

    #[test]
    fn test_metadata_sits_between_header_and_body() {
        use chrono::{TimeZone, Utc};

        let saved_at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
        let metadata = SlotMetadata::at(saved_at)
            .with_slot_name("slot_2.sav")
            .with_title("Lighthouse");
        let payload =
            SavePayload::assemble(header(true), Some(metadata.clone()), b"body bytes").unwrap();
        assert!(payload.header().has_metadata);
        assert_eq!(payload.as_bytes()[17], 0b11);

        let parsed = SavePayload::from_bytes(payload.as_bytes().to_vec()).unwrap();
        assert_eq!(parsed.metadata(), Some(&metadata));
        assert_eq!(parsed.body(), b"body bytes");
        assert_eq!(
            parsed.header().body_offset(),
            PAYLOAD_HEADER_SIZE + METADATA_LEN_SIZE + parsed.header().metadata_len as usize
        );
        assert!(parsed.verify_integrity().is_ok());
    }

    #[test]
    fn test_edited_metadata_fails_checksum() {
        let metadata = SlotMetadata::new().with_title("Lighthouse");
        let payload = SavePayload::assemble(header(true), Some(metadata), b"body").unwrap();
        let mut bytes = payload.as_bytes().to_vec();
        let at = bytes.windows(10).position(|w| w == b"Lighthouse").unwrap();
        bytes[at] = b'l';

        let parsed = SavePayload::from_bytes(bytes).unwrap();
        assert_eq!(parsed.metadata().unwrap().title.as_deref(), Some("lighthouse"));
        assert!(matches!(parsed.verify_integrity(), Err(StateError::Format(_))));
    }

    #[test]
    fn test_truncated_metadata_prefix_is_a_format_error() {
        let payload =
            SavePayload::assemble(header(false), Some(SlotMetadata::new()), b"x").unwrap();
        let bytes = payload.as_bytes()[..PAYLOAD_HEADER_SIZE + 2].to_vec();
        assert!(matches!(
            SavePayload::from_bytes(bytes),
            Err(StateError::Format(_))
        ));
    }

    #[test]
    fn test_wrong_magic_is_incompatible() {
        let err = SavePayload::from_bytes(b"MEGA\x01\x00rest".to_vec()).unwrap_err();
        assert!(matches!(err, StateError::IncompatiblePayload(_)));
    }

    #[test]
    fn test_future_container_version_is_incompatible() {
        let payload = SavePayload::assemble(header(false), None, b"x").unwrap();
        let mut bytes = payload.as_bytes().to_vec();
        bytes[4..6].copy_from_slice(&99u16.to_le_bytes());
        let err = SavePayload::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, StateError::IncompatiblePayload(ref msg) if msg.contains("99")));
    }

    #[test]
    fn test_truncation_and_trailing_bytes() {
        let payload = SavePayload::assemble(header(true), None, b"body").unwrap();
        let bytes = payload.as_bytes().to_vec();

        let short = SavePayload::from_bytes(bytes[..bytes.len() - 1].to_vec()).unwrap_err();
        assert!(matches!(short, StateError::Format(_)));

        let header_only = SavePayload::from_bytes(bytes[..10].to_vec()).unwrap_err();
        assert!(matches!(header_only, StateError::Format(_)));

        let mut long = bytes.clone();
        long.push(0);
        assert!(matches!(
            SavePayload::from_bytes(long),
            Err(StateError::Format(_))
        ));
    }

    #[test]
    fn test_unknown_tags_are_format_errors() {
        let payload = SavePayload::assemble(header(false), None, b"x").unwrap();
        for (offset, value) in [(6usize, 9u8), (7, 9), (16, 9), (17, 0x80)] {
            let mut bytes = payload.as_bytes().to_vec();
            bytes[offset] = value;
            assert!(
                matches!(SavePayload::from_bytes(bytes), Err(StateError::Format(_))),
                "offset {offset}"
            );
        }
    }
}
