/*!
Tests for error types and their helpers.
*/

#[cfg(test)]
mod tests {
    use crate::error::StateError;
    use crate::identity::{IdentityKey, OriginScope};
    use crate::snapshot::SnapshotStage;
    use crate::value::ObjectHandle;
    use std::error::Error as _;
    use std::io;

    #[test]
    fn test_state_error_display() {
        let error = StateError::validation("compression level 12 is out of range");
        assert_eq!(
            error.to_string(),
            "Validation error: compression level 12 is out of range"
        );

        let error = StateError::format("truncated body");
        assert_eq!(error.to_string(), "Format error: truncated body");

        let error = StateError::SchemaVersion {
            found: 7,
            supported: 5,
        };
        assert_eq!(
            error.to_string(),
            "Schema version 7 is newer than the supported version 5"
        );
    }

    #[test]
    fn test_identity_collision_names_everything() {
        let error = StateError::IdentityCollision {
            key: IdentityKey::Name("/Game/Harbor.Crate_3".to_string()),
            scope: OriginScope::Level,
            existing: ObjectHandle(12),
        };
        let text = error.to_string();
        assert!(text.contains("name:/Game/Harbor.Crate_3"));
        assert!(text.contains("level"));
        assert!(text.contains("#12"));
    }

    #[test]
    fn test_unresolvable_reference_display() {
        let error = StateError::UnresolvableReference {
            property: "target".to_string(),
            target: ObjectHandle(4),
        };
        assert!(error.to_string().contains("'target'"));
        assert!(error.to_string().contains("#4"));
    }

    #[test]
    fn test_snapshot_save_wraps_stage_and_source() {
        let error = StateError::snapshot_save(
            SnapshotStage::Compressing,
            StateError::compression("deflate stream broke"),
        );
        assert_eq!(
            error.to_string(),
            "Snapshot save failed during compressing: Compression error: deflate stream broke"
        );
        assert!(error.source().is_some());
        assert!(matches!(error.root_cause(), StateError::Compression(_)));
    }

    #[test]
    fn test_root_cause_looks_through_nesting() {
        let nested = StateError::snapshot_save(
            SnapshotStage::Encoding,
            StateError::snapshot_save(SnapshotStage::Sanitizing, StateError::Cancelled),
        );
        assert!(matches!(nested.root_cause(), StateError::Cancelled));

        let plain = StateError::storage("disk full");
        assert!(matches!(plain.root_cause(), StateError::Storage(_)));
    }

    #[test]
    fn test_is_payload_error() {
        assert!(StateError::format("bad").is_payload_error());
        assert!(StateError::incompatible("bad magic").is_payload_error());
        assert!(StateError::SchemaVersion {
            found: 3,
            supported: 2
        }
        .is_payload_error());
        assert!(
            StateError::snapshot_save(SnapshotStage::Encoding, StateError::format("x"))
                .is_payload_error()
        );

        assert!(!StateError::storage("missing slot").is_payload_error());
        assert!(!StateError::Cancelled.is_payload_error());
        assert!(!StateError::ObjectUnavailable(ObjectHandle(1)).is_payload_error());
    }

    #[test]
    fn test_state_error_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "Access denied");
        let state_error = StateError::from(io_error);

        match state_error {
            StateError::Io(ref io_err) => {
                assert_eq!(io_err.kind(), io::ErrorKind::PermissionDenied);
            }
            _ => panic!("Expected Io error variant"),
        }
    }

    #[test]
    fn test_state_error_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let state_error = StateError::from(json_error);
        assert!(matches!(state_error, StateError::Json(_)));
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<StateError>();
        assert_sync::<StateError>();
    }

    #[test]
    fn test_error_result_type() {
        fn returns_error() -> crate::Result<()> {
            Err(StateError::Cancelled)
        }

        assert!(matches!(returns_error(), Err(StateError::Cancelled)));
    }
}
