//! Snapshot creation and management.
//!
//! A snapshot is an immutable blob (see [`codec`]) plus a metadata entry
//! (name, creation time, record count, storage path, byte size, trigger,
//! schema version). Snapshots are created on demand ("manual") or as a side
//! effect of destructive operations ("auto"); once written they are only
//! ever renamed (metadata) or deleted wholesale, never edited.
//!
//! Automatic snapshots are a best-effort safety net: a failure to snapshot
//! is logged and swallowed, and must never block or fail the create/delete
//! operation that triggered it.

pub mod codec;

use crate::error::{RegistryError, RegistryResult};
use crate::record::PatientRecord;
use crate::store::BlobStore;
use capr_types::{NonEmptyText, RecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Relative path of the metadata index within the blob store.
const INDEX_PATH: &str = "index.json";

/// What caused a snapshot to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotTrigger {
    Auto,
    Manual,
}

/// Metadata for one stored snapshot. Persisted in the index, not inside the
/// blob itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub id: RecordId,
    /// Display name; the only mutable field.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub patient_count: usize,
    pub file_path: String,
    pub file_size: u64,
    pub trigger: SnapshotTrigger,
    pub schema_version: u64,
}

/// Manages snapshot blobs and their metadata index.
#[derive(Debug, Clone)]
pub struct SnapshotService<B> {
    blobs: B,
}

impl<B: BlobStore> SnapshotService<B> {
    pub fn new(blobs: B) -> Self {
        Self { blobs }
    }

    /// Serialises `records` and stores it as a new snapshot.
    pub fn create_snapshot(
        &self,
        records: &[PatientRecord],
        name: &str,
        trigger: SnapshotTrigger,
    ) -> RegistryResult<SnapshotMetadata> {
        let bytes = codec::serialize(records)?;
        let id = RecordId::new();
        let file_path = format!("blobs/{id}.json");
        let file_size = self.blobs.write(&file_path, &bytes)?;

        let metadata = SnapshotMetadata {
            id,
            name: name.to_string(),
            created_at: Utc::now(),
            patient_count: records.len(),
            file_path,
            file_size,
            trigger,
            schema_version: codec::SNAPSHOT_SCHEMA_VERSION,
        };

        let mut index = self.read_index()?;
        index.push(metadata.clone());
        self.write_index(&index)?;

        Ok(metadata)
    }

    /// Best-effort automatic snapshot. Failures are logged and swallowed so
    /// the triggering operation is never blocked.
    pub fn auto_snapshot(&self, records: &[PatientRecord], name: &str) {
        if let Err(e) = self.create_snapshot(records, name, SnapshotTrigger::Auto) {
            tracing::warn!("automatic snapshot '{}' failed: {}", name, e);
        }
    }

    /// Lists snapshot metadata, newest first.
    pub fn list(&self) -> RegistryResult<Vec<SnapshotMetadata>> {
        let mut index = self.read_index()?;
        index.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(index)
    }

    /// Loads and decodes the records of one snapshot.
    pub fn load(&self, id: &RecordId) -> RegistryResult<Vec<PatientRecord>> {
        let metadata = self.find(id)?;
        let bytes = self.blobs.read(&metadata.file_path)?;
        codec::deserialize(&bytes)
    }

    /// Renames a snapshot. Only the metadata name changes; the blob is
    /// immutable.
    pub fn rename(&self, id: &RecordId, new_name: &str) -> RegistryResult<()> {
        let name = NonEmptyText::new(new_name)
            .map_err(|_| RegistryError::InvalidInput("snapshot name cannot be empty".into()))?;
        let mut index = self.read_index()?;
        let entry = index
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| RegistryError::SnapshotNotFound(id.to_string()))?;
        entry.name = name.into_inner();
        self.write_index(&index)
    }

    /// Deletes a snapshot: blob first, then its index entry.
    pub fn delete(&self, id: &RecordId) -> RegistryResult<()> {
        let metadata = self.find(id)?;
        self.blobs.delete(&metadata.file_path)?;

        let mut index = self.read_index()?;
        index.retain(|m| &m.id != id);
        self.write_index(&index)
    }

    fn find(&self, id: &RecordId) -> RegistryResult<SnapshotMetadata> {
        self.read_index()?
            .into_iter()
            .find(|m| &m.id == id)
            .ok_or_else(|| RegistryError::SnapshotNotFound(id.to_string()))
    }

    fn read_index(&self) -> RegistryResult<Vec<SnapshotMetadata>> {
        if self.blobs.stat(INDEX_PATH)?.is_none() {
            return Ok(Vec::new());
        }
        let bytes = self.blobs.read(INDEX_PATH)?;
        serde_json::from_slice(&bytes).map_err(RegistryError::Deserialization)
    }

    fn write_index(&self, index: &[SnapshotMetadata]) -> RegistryResult<()> {
        let bytes =
            serde_json::to_vec_pretty(index).map_err(RegistryError::Serialization)?;
        self.blobs.write(INDEX_PATH, &bytes)?;
        Ok(())
    }
}
