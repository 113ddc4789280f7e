/*!
Snapshot manager that orchestrates save and load operations.

A save walks `CollectingIdentities → Sanitizing → Encoding → Compressing →
Complete`; a load walks `Validating → Decompressing → Decoding →
Desanitizing → Applying → Complete`. Any failure moves the manager to
`Failed`. Everything that can reject a payload runs before the first object
is touched, so a payload that fails to load leaves the world unchanged.
*/

use crate::compression::{codec_for, CompressionCodec, GzipCompressor, NoCompression};
use crate::config::{IdentitySchemeKind, PersistenceConfig};
use crate::format::{formatter_for, SerializationFormatter};
use crate::identity::{ObjectIdentity, ObjectIdentityRegistry, OriginScope};
use crate::lifecycle::{ObjectDescriptor, ObjectLifecycle, RecreateRequest};
use crate::metadata::SlotMetadata;
use crate::payload::{PayloadHeader, SavePayload, PAYLOAD_FORMAT_VERSION};
use crate::sanitizer::{
    DanglingReferenceWarning, LoadedRef, RecordGroup, ReferenceSanitizer, SanitizedStream,
};
use crate::schema::Schema;
use crate::storage::StorageAdapter;
use crate::value::ObjectHandle;
use crate::{Result, StateError};
use futures::channel::oneshot;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, error, info, warn};

/// State of the most recent save or load operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotStage {
    Idle,
    CollectingIdentities,
    Sanitizing,
    Encoding,
    Compressing,
    Complete,
    Failed,
    Validating,
    Decompressing,
    Decoding,
    Desanitizing,
    Applying,
}

impl SnapshotStage {
    const ALL: [SnapshotStage; 12] = [
        SnapshotStage::Idle,
        SnapshotStage::CollectingIdentities,
        SnapshotStage::Sanitizing,
        SnapshotStage::Encoding,
        SnapshotStage::Compressing,
        SnapshotStage::Complete,
        SnapshotStage::Failed,
        SnapshotStage::Validating,
        SnapshotStage::Decompressing,
        SnapshotStage::Decoding,
        SnapshotStage::Desanitizing,
        SnapshotStage::Applying,
    ];

    fn as_str(self) -> &'static str {
        match self {
            SnapshotStage::Idle => "idle",
            SnapshotStage::CollectingIdentities => "collecting identities",
            SnapshotStage::Sanitizing => "sanitizing",
            SnapshotStage::Encoding => "encoding",
            SnapshotStage::Compressing => "compressing",
            SnapshotStage::Complete => "complete",
            SnapshotStage::Failed => "failed",
            SnapshotStage::Validating => "validating",
            SnapshotStage::Decompressing => "decompressing",
            SnapshotStage::Decoding => "decoding",
            SnapshotStage::Desanitizing => "desanitizing",
            SnapshotStage::Applying => "applying",
        }
    }
}

impl fmt::Display for SnapshotStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage shared with background encode jobs
#[derive(Debug, Clone)]
struct StageCell(Arc<AtomicU8>);

impl StageCell {
    fn new() -> Self {
        Self(Arc::new(AtomicU8::new(0)))
    }

    fn set(&self, stage: SnapshotStage) {
        let index = SnapshotStage::ALL
            .iter()
            .position(|s| *s == stage)
            .unwrap_or(0);
        self.0.store(index as u8, Ordering::Release);
    }

    fn get(&self) -> SnapshotStage {
        SnapshotStage::ALL
            .get(self.0.load(Ordering::Acquire) as usize)
            .copied()
            .unwrap_or(SnapshotStage::Idle)
    }
}

/// Cooperative cancellation flag for loads.
///
/// Honoured until the apply phase starts; once objects are being modified
/// the load runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Outcome of a load.
///
/// The apply phase is best effort across objects, so a load can succeed
/// while individual objects were skipped or failed.
#[derive(Debug, Default)]
pub struct ApplyResult {
    /// Objects whose properties were written
    pub applied: Vec<ObjectHandle>,
    /// References whose target never appeared
    pub warnings: Vec<DanglingReferenceWarning>,
    /// Records whose owner could not be found or recreated
    pub skipped: Vec<ObjectIdentity>,
    /// Records whose owner was found but could not be updated
    pub failed: Vec<(ObjectIdentity, StateError)>,
    /// Schema version the payload was written with
    pub schema_version: u32,
    /// Slot metadata the payload was written with
    pub metadata: Option<SlotMetadata>,
}

impl ApplyResult {
    /// True when every record was applied without warnings
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.skipped.is_empty() && self.failed.is_empty()
    }
}

/// Encode and compress stages, detached from the manager so they can run on
/// the rayon pool.
#[derive(Clone)]
struct EncodePipeline {
    formatter: Arc<dyn SerializationFormatter>,
    codec: Arc<dyn CompressionCodec>,
    schema: Arc<Schema>,
    identity_scheme: IdentitySchemeKind,
    checksum: bool,
}

impl EncodePipeline {
    fn run(
        &self,
        stream: &SanitizedStream,
        metadata: SlotMetadata,
        stage: &StageCell,
    ) -> Result<SavePayload> {
        stage.set(SnapshotStage::Encoding);
        let body = self
            .formatter
            .encode(stream, &self.schema)
            .map_err(|e| StateError::snapshot_save(SnapshotStage::Encoding, e))?;

        stage.set(SnapshotStage::Compressing);
        let compressed = self
            .codec
            .compress(&body)
            .map_err(|e| StateError::snapshot_save(SnapshotStage::Compressing, e))?;

        let header = PayloadHeader {
            format_version: PAYLOAD_FORMAT_VERSION,
            identity_scheme: self.identity_scheme,
            compression: self.codec.kind(),
            schema_id: self.schema.version,
            record_count: stream.groups.len() as u32,
            encoding: self.formatter.encoding(),
            has_checksum: self.checksum,
            body_len: 0,
            has_metadata: true,
            metadata_len: 0,
        };
        let payload = SavePayload::assemble(header, Some(metadata), &compressed)
            .map_err(|e| StateError::snapshot_save(SnapshotStage::Compressing, e))?;

        debug!(
            records = stream.groups.len(),
            encoded_bytes = body.len(),
            payload_bytes = payload.len(),
            format = self.formatter.format_name(),
            compression = self.codec.algorithm_name(),
            "Encoded save payload"
        );
        Ok(payload)
    }
}

/// A save whose encode and compress stages run in the background.
///
/// Resolves to the payload once the background job finishes. Can be awaited
/// or waited on with [`PendingSave::wait`].
#[must_use = "the payload is only available through the pending save"]
pub struct PendingSave {
    receiver: oneshot::Receiver<Result<SavePayload>>,
}

impl PendingSave {
    /// Block the current thread until the payload is ready
    pub fn wait(self) -> Result<SavePayload> {
        futures::executor::block_on(self)
    }
}

impl Future for PendingSave {
    type Output = Result<SavePayload>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(StateError::snapshot_save(
                SnapshotStage::Encoding,
                StateError::Cancelled,
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Orchestrates saves and loads for one world.
///
/// The manager owns the session's identity registry, so the same manager
/// should be used for every save and load of a world. Operations take
/// `&mut self`, which serializes them.
///
/// # Example
/// ```rust
/// use statekeep_core::{
///     MemoryWorld, OriginScope, PersistenceConfig, PropertyValue, Schema, StateSnapshotManager,
/// };
///
/// let mut world = MemoryWorld::new();
/// let door = world.spawn("Harbor.Door_1", "Door", OriginScope::Level);
/// world.set_property(door, "open", PropertyValue::Bool(true))?;
///
/// let mut manager = StateSnapshotManager::new(PersistenceConfig::editor(), Schema::new(1))?;
/// let payload = manager.save(&world, &[door])?;
///
/// let mut fresh = MemoryWorld::new();
/// let mut loader = StateSnapshotManager::new(PersistenceConfig::editor(), Schema::new(1))?;
/// let result = loader.load(&payload, &mut fresh)?;
/// assert_eq!(result.applied.len(), 1);
/// # Ok::<(), statekeep_core::StateError>(())
/// ```
pub struct StateSnapshotManager {
    config: PersistenceConfig,
    registry: ObjectIdentityRegistry,
    sanitizer: ReferenceSanitizer,
    pipeline: EncodePipeline,
    stage: StageCell,
}

impl StateSnapshotManager {
    /// Create a manager for a configuration and the build's schema
    ///
    /// # Arguments
    /// * `config` - Persistence configuration of the deployment target
    /// * `schema` - Property schema of the running build
    ///
    /// # Returns
    /// The manager, or a `Validation` error for an invalid config or schema
    pub fn new(config: PersistenceConfig, schema: Schema) -> Result<Self> {
        config.validate()?;
        schema.validate()?;

        let codec: Arc<dyn CompressionCodec> = if config.compression {
            Arc::new(GzipCompressor::with_level(config.compression_level))
        } else {
            Arc::new(NoCompression)
        };

        Ok(Self {
            registry: ObjectIdentityRegistry::with_scheme(config.identity_scheme),
            sanitizer: ReferenceSanitizer::new(config.strict_sanitization),
            pipeline: EncodePipeline {
                formatter: formatter_for(config.format),
                codec,
                schema: Arc::new(schema),
                identity_scheme: config.identity_scheme,
                checksum: config.integrity_checksum,
            },
            stage: StageCell::new(),
            config,
        })
    }

    /// Replace the formatter used for saving
    pub fn with_formatter(mut self, formatter: Arc<dyn SerializationFormatter>) -> Self {
        self.pipeline.formatter = formatter;
        self
    }

    /// Replace the compression codec used for saving
    pub fn with_codec(mut self, codec: Arc<dyn CompressionCodec>) -> Self {
        self.pipeline.codec = codec;
        self
    }

    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    pub fn schema(&self) -> &Schema {
        &self.pipeline.schema
    }

    pub fn registry(&self) -> &ObjectIdentityRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ObjectIdentityRegistry {
        &mut self.registry
    }

    /// State of the last operation
    pub fn stage(&self) -> SnapshotStage {
        self.stage.get()
    }

    /// Release the identity of a permanently destroyed object
    pub fn release_object(&mut self, object: ObjectHandle) -> bool {
        self.registry.release_object(object)
    }

    /// Save a set of objects into a payload
    ///
    /// # Arguments
    /// * `world` - Lifecycle collaborator owning the objects
    /// * `objects` - Objects to save; duplicates are saved once
    ///
    /// # Returns
    /// The payload, or `SnapshotSave` naming the stage that failed
    pub fn save<W>(&mut self, world: &W, objects: &[ObjectHandle]) -> Result<SavePayload>
    where
        W: ObjectLifecycle + ?Sized,
    {
        self.save_with_metadata(world, objects, SlotMetadata::new())
    }

    /// Save a set of objects, embedding `metadata` in the payload
    pub fn save_with_metadata<W>(
        &mut self,
        world: &W,
        objects: &[ObjectHandle],
        metadata: SlotMetadata,
    ) -> Result<SavePayload>
    where
        W: ObjectLifecycle + ?Sized,
    {
        let result = metadata
            .validate()
            .map_err(|e| StateError::snapshot_save(SnapshotStage::CollectingIdentities, e))
            .and_then(|()| self.collect(world, objects))
            .and_then(|stream| self.pipeline.run(&stream, metadata, &self.stage));
        conclude_save(result, &self.stage)
    }

    /// Save every persistable object of a scope
    pub fn save_scope<W>(&mut self, world: &W, scope: OriginScope) -> Result<SavePayload>
    where
        W: ObjectLifecycle + ?Sized,
    {
        let objects = world.enumerate_persistable(scope);
        self.save(world, &objects)
    }

    /// Save with encoding and compression on the rayon pool.
    ///
    /// Identities are assigned and properties read before this returns, so
    /// the world may change freely while the payload is being produced.
    pub fn save_deferred<W>(&mut self, world: &W, objects: &[ObjectHandle]) -> Result<PendingSave>
    where
        W: ObjectLifecycle + ?Sized,
    {
        let stream = self
            .collect(world, objects)
            .map_err(|e| fail_save(e, &self.stage))?;
        let metadata = SlotMetadata::new();

        let pipeline = self.pipeline.clone();
        let stage = self.stage.clone();
        let (sender, receiver) = oneshot::channel();

        rayon::spawn(move || {
            let result = pipeline.run(&stream, metadata, &stage);
            let result = conclude_save(result, &stage);
            // the receiver may have been dropped; the payload is discarded then
            let _ = sender.send(result);
        });

        Ok(PendingSave { receiver })
    }

    /// Save and write the payload to a storage slot.
    ///
    /// Nothing is written unless the save completed.
    pub fn save_to_storage<W, S>(
        &mut self,
        storage: &S,
        slot: &str,
        world: &W,
        objects: &[ObjectHandle],
    ) -> Result<SavePayload>
    where
        W: ObjectLifecycle + ?Sized,
        S: StorageAdapter + ?Sized,
    {
        self.save_to_storage_with_metadata(storage, slot, SlotMetadata::new(), world, objects)
    }

    /// Save into a storage slot with a title or world name attached.
    ///
    /// The slot name in `metadata` is set to `slot`.
    pub fn save_to_storage_with_metadata<W, S>(
        &mut self,
        storage: &S,
        slot: &str,
        metadata: SlotMetadata,
        world: &W,
        objects: &[ObjectHandle],
    ) -> Result<SavePayload>
    where
        W: ObjectLifecycle + ?Sized,
        S: StorageAdapter + ?Sized,
    {
        let payload = self.save_with_metadata(world, objects, metadata.with_slot_name(slot))?;
        storage.save(payload.as_bytes(), slot)?;
        info!(slot, bytes = payload.len(), "Wrote save payload to storage");
        Ok(payload)
    }

    /// Read a payload from a storage slot and load it
    pub fn load_from_storage<W, S>(
        &mut self,
        storage: &S,
        slot: &str,
        resolver: &mut W,
    ) -> Result<ApplyResult>
    where
        W: ObjectLifecycle + ?Sized,
        S: StorageAdapter + ?Sized,
    {
        let bytes = storage.load(slot)?;
        let payload = SavePayload::from_bytes(bytes).map_err(|e| {
            self.stage.set(SnapshotStage::Failed);
            e
        })?;
        self.load(&payload, resolver)
    }

    /// Load a payload into the world behind `resolver`
    pub fn load<W>(&mut self, payload: &SavePayload, resolver: &mut W) -> Result<ApplyResult>
    where
        W: ObjectLifecycle + ?Sized,
    {
        self.load_with_cancel(payload, resolver, &CancellationToken::new())
    }

    /// Load a payload, giving up if `cancel` fires before the apply phase
    ///
    /// # Arguments
    /// * `payload` - Payload to load
    /// * `resolver` - Lifecycle collaborator that finds or recreates owners
    /// * `cancel` - Token checked between stages
    ///
    /// # Returns
    /// What was applied, or the error that stopped the load before any
    /// object was modified
    pub fn load_with_cancel<W>(
        &mut self,
        payload: &SavePayload,
        resolver: &mut W,
        cancel: &CancellationToken,
    ) -> Result<ApplyResult>
    where
        W: ObjectLifecycle + ?Sized,
    {
        let result = self.load_inner(payload, resolver, cancel);
        match &result {
            Ok(applied) => {
                self.stage.set(SnapshotStage::Complete);
                info!(
                    applied = applied.applied.len(),
                    warnings = applied.warnings.len(),
                    skipped = applied.skipped.len(),
                    failed = applied.failed.len(),
                    schema_version = applied.schema_version,
                    "Load complete"
                );
            }
            Err(e) => {
                self.stage.set(SnapshotStage::Failed);
                error!(error = %e, "Load failed");
            }
        }
        record_load_metrics(&result);
        result
    }

    fn collect<W>(&mut self, world: &W, objects: &[ObjectHandle]) -> Result<SanitizedStream>
    where
        W: ObjectLifecycle + ?Sized,
    {
        self.stage.set(SnapshotStage::CollectingIdentities);
        let wrap = |e: StateError| StateError::snapshot_save(SnapshotStage::CollectingIdentities, e);

        let mut seen = HashSet::with_capacity(objects.len());
        let mut live_groups = Vec::with_capacity(objects.len());
        for &object in objects {
            if !seen.insert(object) {
                continue;
            }
            let descriptor = world
                .describe(object)
                .filter(|d| d.persistable)
                .ok_or(StateError::ObjectUnavailable(object))
                .map_err(wrap)?;
            let owner = self.registry.assign(object, &descriptor).map_err(wrap)?;
            let properties = world.get_properties(object).map_err(wrap)?;

            live_groups.push(
                RecordGroup::new(owner, descriptor.class_name, descriptor.path)
                    .with_properties(properties),
            );
        }
        debug!(objects = live_groups.len(), "Collected identities and properties");

        self.stage.set(SnapshotStage::Sanitizing);
        self.sanitizer
            .sanitize(&mut self.registry, world, live_groups)
            .map_err(|e| StateError::snapshot_save(SnapshotStage::Sanitizing, e))
    }

    fn load_inner<W>(
        &mut self,
        payload: &SavePayload,
        resolver: &mut W,
        cancel: &CancellationToken,
    ) -> Result<ApplyResult>
    where
        W: ObjectLifecycle + ?Sized,
    {
        let header = *payload.header();
        let formatter = if self.pipeline.formatter.encoding() == header.encoding {
            Arc::clone(&self.pipeline.formatter)
        } else {
            formatter_for(header.encoding)
        };

        let stream = decode_stages(payload, &self.pipeline.schema, formatter.as_ref(), &self.stage)?;
        check_cancelled(cancel)?;

        self.stage.set(SnapshotStage::Desanitizing);
        let groups = self.sanitizer.desanitize(&self.registry, stream)?;
        check_cancelled(cancel)?;

        self.stage.set(SnapshotStage::Applying);
        let mut applied = self.apply(groups, resolver, header.schema_id);
        applied.metadata = payload.metadata().cloned();
        Ok(applied)
    }

    fn apply<W>(
        &mut self,
        groups: Vec<RecordGroup<LoadedRef>>,
        resolver: &mut W,
        schema_version: u32,
    ) -> ApplyResult
    where
        W: ObjectLifecycle + ?Sized,
    {
        let mut result = ApplyResult {
            schema_version,
            ..ApplyResult::default()
        };

        let mut handles = Vec::with_capacity(groups.len());
        let mut bound = Vec::with_capacity(groups.len());
        for group in groups {
            let request = RecreateRequest {
                identity: &group.owner,
                class_name: &group.class_name,
                path: &group.path,
            };
            let Some(handle) = resolver.resolve_or_create(request) else {
                warn!(owner = %group.owner, class = %group.class_name, "Skipping record without owner");
                result.skipped.push(group.owner);
                continue;
            };

            match self.bind_owner(handle, &group, resolver) {
                Ok(()) => {
                    handles.push(handle);
                    bound.push(group);
                }
                Err(e) => {
                    warn!(owner = %group.owner, object = %handle, error = %e, "Could not bind saved identity");
                    result.failed.push((group.owner, e));
                }
            }
        }

        let (mut resolved, warnings) = self.sanitizer.resolve_deferred(&self.registry, bound);
        default_dangling_fields(&self.pipeline.schema, &mut resolved, &warnings);
        result.warnings = warnings;

        for (handle, group) in handles.into_iter().zip(resolved) {
            match resolver.set_properties(handle, group.properties) {
                Ok(()) => result.applied.push(handle),
                Err(e) => {
                    warn!(owner = %group.owner, object = %handle, error = %e, "Could not apply properties");
                    result.failed.push((group.owner, e));
                }
            }
        }
        result
    }

    /// Carry the saved identity over to the object found for a record
    fn bind_owner<W>(
        &mut self,
        handle: ObjectHandle,
        group: &RecordGroup<LoadedRef>,
        resolver: &W,
    ) -> Result<()>
    where
        W: ObjectLifecycle + ?Sized,
    {
        let descriptor = resolver.describe(handle).unwrap_or_else(|| {
            ObjectDescriptor::new(group.path.clone(), group.class_name.clone(), group.owner.scope())
        });

        match self.registry.bind(handle, group.owner.clone(), &descriptor) {
            // the previous holder was destroyed without releasing its identity
            Err(StateError::IdentityCollision { existing, .. })
                if resolver.describe(existing).is_none() =>
            {
                debug!(stale = %existing, object = %handle, "Releasing identity of destroyed object");
                self.registry.release_object(existing);
                self.registry.bind(handle, group.owner.clone(), &descriptor)
            }
            other => other,
        }
    }
}

/// Give properties that were a single dangling reference their field default
fn default_dangling_fields(
    schema: &Schema,
    groups: &mut [RecordGroup<ObjectHandle>],
    warnings: &[DanglingReferenceWarning],
) {
    for group in groups.iter_mut() {
        let Some(class) = schema.class(&group.class_name) else {
            continue;
        };
        for property in group.properties.iter_mut().filter(|p| p.value.is_null()) {
            let dangled = warnings
                .iter()
                .any(|w| w.owner == group.owner && w.property == property.name);
            if !dangled {
                continue;
            }
            if let Some(default) = class
                .field(&property.name)
                .and_then(|field| field.default.without_refs())
            {
                property.value = default;
            }
        }
    }
}

/// Validate, decompress and decode a payload without touching any object.
///
/// Used by tooling to inspect payloads against a schema.
pub fn decode_payload(payload: &SavePayload, schema: &Schema) -> Result<SanitizedStream> {
    let formatter = formatter_for(payload.header().encoding);
    decode_stages(payload, schema, formatter.as_ref(), &StageCell::new())
}

fn decode_stages(
    payload: &SavePayload,
    schema: &Schema,
    formatter: &dyn SerializationFormatter,
    stage: &StageCell,
) -> Result<SanitizedStream> {
    let header = payload.header();

    stage.set(SnapshotStage::Validating);
    schema.check_readable(header.schema_id)?;
    payload.verify_integrity()?;

    stage.set(SnapshotStage::Decompressing);
    let body = codec_for(header.compression)
        .decompress(payload.body())
        .map_err(|e| StateError::format(format!("payload body does not decompress: {e}")))?;

    stage.set(SnapshotStage::Decoding);
    let stream = formatter.decode(&body, schema)?;
    if stream.groups.len() != header.record_count as usize {
        return Err(StateError::format(format!(
            "header announces {} records, body holds {}",
            header.record_count,
            stream.groups.len()
        )));
    }
    Ok(stream)
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        info!("Load cancelled before apply");
        return Err(StateError::Cancelled);
    }
    Ok(())
}

fn conclude_save(result: Result<SavePayload>, stage: &StageCell) -> Result<SavePayload> {
    match result {
        Ok(payload) => {
            stage.set(SnapshotStage::Complete);
            info!(
                records = payload.header().record_count,
                bytes = payload.len(),
                schema_version = payload.header().schema_id,
                "Save complete"
            );
            record_save_metrics(Some(&payload));
            Ok(payload)
        }
        Err(e) => Err(fail_save(e, stage)),
    }
}

fn fail_save(e: StateError, stage: &StageCell) -> StateError {
    stage.set(SnapshotStage::Failed);
    error!(error = %e, cause = %e.root_cause(), "Save failed");
    record_save_metrics(None);
    e
}

fn record_save_metrics(payload: Option<&SavePayload>) {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = crate::observability::StateMetrics::global() {
            match payload {
                Some(payload) => metrics.record_save(payload.len()),
                None => metrics.record_save_failure(),
            }
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = payload;
}

fn record_load_metrics(result: &Result<ApplyResult>) {
    #[cfg(feature = "metrics")]
    {
        if let Some(metrics) = crate::observability::StateMetrics::global() {
            match result {
                Ok(applied) => metrics.record_load(applied.warnings.len()),
                Err(_) => metrics.record_load_failure(),
            }
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = result;
}

/// Create a manager matching a configuration
///
/// # Example
/// ```rust
/// use statekeep_core::config::{BuildTarget, PersistenceConfig};
/// use statekeep_core::{create_manager_from_config, Schema};
///
/// let config = PersistenceConfig::for_target(BuildTarget::Shipping);
/// let manager = create_manager_from_config(config, Schema::new(1))?;
/// assert_eq!(manager.schema().version, 1);
/// # Ok::<(), statekeep_core::StateError>(())
/// ```
pub fn create_manager_from_config(
    config: PersistenceConfig,
    schema: Schema,
) -> Result<StateSnapshotManager> {
    StateSnapshotManager::new(config, schema)
}
