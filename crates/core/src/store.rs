//! Record and blob storage.
//!
//! The core talks to storage through two narrow traits: [`RecordStore`] for
//! the authoritative patient collection and [`BlobStore`] for snapshot blobs.
//! The filesystem implementations here store pretty-printed JSON in a sharded
//! directory layout:
//!
//! ```text
//! records/
//!   <s1>/
//!     <s2>/
//!       <id>/
//!         record.json
//! ```
//!
//! where `s1` and `s2` are the first four hex characters of the record id.
//! Reconciliation and restore are written against the traits so tests can
//! substitute failing or in-memory stores.

use crate::error::{RegistryError, RegistryResult};
use crate::record::PatientRecord;
use capr_types::RecordId;
use chrono::Utc;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// File name of the record payload inside each record directory.
const RECORD_FILE_NAME: &str = "record.json";

/// The authoritative patient collection.
///
/// Writes are individually committed; there are no transactions. `create`
/// assigns the identifier and both audit timestamps, `update` preserves the
/// identifier and creation timestamp and bumps the update timestamp.
pub trait RecordStore {
    /// Lists every record in the collection. Order is not specified.
    fn list(&self) -> RegistryResult<Vec<PatientRecord>>;

    /// Fetches one record by id, `Ok(None)` if absent.
    fn get(&self, id: &RecordId) -> RegistryResult<Option<PatientRecord>>;

    /// Persists a new record. Any `id`/`created_at`/`updated_at` on the input
    /// are ignored; the store assigns fresh ones. Returns the stored record.
    fn create(&self, record: &PatientRecord) -> RegistryResult<PatientRecord>;

    /// Overwrites the payload of an existing record. The stored `id` and
    /// `created_at` are preserved; `updated_at` is bumped.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::RecordNotFound` if `id` does not exist.
    fn update(&self, id: &RecordId, record: &PatientRecord) -> RegistryResult<PatientRecord>;

    /// Removes a record.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::RecordNotFound` if `id` does not exist.
    fn delete(&self, id: &RecordId) -> RegistryResult<()>;
}

/// Blob storage addressed by a path relative to the store root.
pub trait BlobStore {
    /// Writes `bytes` at `path`, creating parent directories as needed.
    /// Returns the byte size written.
    fn write(&self, path: &str, bytes: &[u8]) -> RegistryResult<u64>;

    /// Reads the blob at `path`.
    fn read(&self, path: &str) -> RegistryResult<Vec<u8>>;

    /// Deletes the blob at `path`. Deleting an absent blob is not an error.
    fn delete(&self, path: &str) -> RegistryResult<()>;

    /// Returns the byte size of the blob at `path`, `None` if absent.
    fn stat(&self, path: &str) -> RegistryResult<Option<u64>>;
}

/// Filesystem-backed [`RecordStore`] using the sharded JSON layout.
#[derive(Clone, Debug)]
pub struct FsRecordStore {
    root: PathBuf,
}

impl FsRecordStore {
    /// Creates a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> RegistryResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(RegistryError::StorageDirCreation)?;
        Ok(Self { root })
    }

    fn record_path(&self, id: &RecordId) -> PathBuf {
        id.sharded_dir(&self.root).join(RECORD_FILE_NAME)
    }

    /// Allocates a fresh id and its directory, retrying on the (pathological)
    /// case of a UUID collision or a pre-existing directory.
    fn allocate_record_dir(&self) -> RegistryResult<(RecordId, PathBuf)> {
        for _attempt in 0..5 {
            let id = RecordId::new();
            let candidate = id.sharded_dir(&self.root);

            if candidate.exists() {
                continue;
            }

            if let Some(parent) = candidate.parent() {
                fs::create_dir_all(parent).map_err(RegistryError::RecordDirCreation)?;
            }

            match fs::create_dir(&candidate) {
                Ok(()) => return Ok((id, candidate)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(RegistryError::RecordDirCreation(e)),
            }
        }

        Err(RegistryError::RecordDirCreation(io::Error::new(
            ErrorKind::AlreadyExists,
            "failed to allocate a unique record directory after 5 attempts",
        )))
    }

    fn write_record(&self, path: &Path, record: &PatientRecord) -> RegistryResult<()> {
        let json =
            serde_json::to_string_pretty(record).map_err(RegistryError::Serialization)?;
        fs::write(path, json).map_err(RegistryError::FileWrite)
    }
}

impl RecordStore for FsRecordStore {
    fn list(&self) -> RegistryResult<Vec<PatientRecord>> {
        let mut records = Vec::new();

        let s1_iter = match fs::read_dir(&self.root) {
            Ok(it) => it,
            Err(_) => return Ok(records),
        };
        for s1 in s1_iter.flatten() {
            let s1_path = s1.path();
            if !s1_path.is_dir() {
                continue;
            }

            let s2_iter = match fs::read_dir(&s1_path) {
                Ok(it) => it,
                Err(_) => continue,
            };
            for s2 in s2_iter.flatten() {
                let s2_path = s2.path();
                if !s2_path.is_dir() {
                    continue;
                }

                let id_iter = match fs::read_dir(&s2_path) {
                    Ok(it) => it,
                    Err(_) => continue,
                };
                for id_ent in id_iter.flatten() {
                    let record_path = id_ent.path().join(RECORD_FILE_NAME);
                    if !record_path.is_file() {
                        continue;
                    }

                    let contents =
                        fs::read_to_string(&record_path).map_err(RegistryError::FileRead)?;
                    match serde_json::from_str::<PatientRecord>(&contents) {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            tracing::warn!(
                                "skipping unparsable record {}: {}",
                                record_path.display(),
                                e
                            );
                        }
                    }
                }
            }
        }

        Ok(records)
    }

    fn get(&self, id: &RecordId) -> RegistryResult<Option<PatientRecord>> {
        let path = self.record_path(id);
        if !path.is_file() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(RegistryError::FileRead)?;
        let record =
            serde_json::from_str(&contents).map_err(RegistryError::Deserialization)?;
        Ok(Some(record))
    }

    fn create(&self, record: &PatientRecord) -> RegistryResult<PatientRecord> {
        let (id, dir) = self.allocate_record_dir()?;
        let now = Utc::now();

        let mut stored = record.as_unpersisted();
        stored.id = Some(id);
        stored.created_at = Some(now);
        stored.updated_at = Some(now);

        self.write_record(&dir.join(RECORD_FILE_NAME), &stored)?;
        Ok(stored)
    }

    fn update(&self, id: &RecordId, record: &PatientRecord) -> RegistryResult<PatientRecord> {
        let existing = self
            .get(id)?
            .ok_or_else(|| RegistryError::RecordNotFound(id.to_string()))?;

        let mut stored = record.as_unpersisted();
        stored.id = existing.id;
        stored.created_at = existing.created_at;
        stored.updated_at = Some(Utc::now());

        self.write_record(&self.record_path(id), &stored)?;
        Ok(stored)
    }

    fn delete(&self, id: &RecordId) -> RegistryResult<()> {
        let dir = id.sharded_dir(&self.root);
        if !dir.is_dir() {
            return Err(RegistryError::RecordNotFound(id.to_string()));
        }
        fs::remove_dir_all(&dir).map_err(RegistryError::FileDelete)
    }
}

/// Filesystem-backed [`BlobStore`] rooted at the snapshot directory.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Creates a blob store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> RegistryResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(RegistryError::StorageDirCreation)?;
        Ok(Self { root })
    }

    fn blob_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl BlobStore for FsBlobStore {
    fn write(&self, path: &str, bytes: &[u8]) -> RegistryResult<u64> {
        let full = self.blob_path(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(RegistryError::SnapshotBlobWrite)?;
        }
        fs::write(&full, bytes).map_err(RegistryError::SnapshotBlobWrite)?;
        Ok(bytes.len() as u64)
    }

    fn read(&self, path: &str) -> RegistryResult<Vec<u8>> {
        fs::read(self.blob_path(path)).map_err(RegistryError::SnapshotBlobRead)
    }

    fn delete(&self, path: &str) -> RegistryResult<()> {
        match fs::remove_file(self.blob_path(path)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RegistryError::SnapshotBlobDelete(e)),
        }
    }

    fn stat(&self, path: &str) -> RegistryResult<Option<u64>> {
        match fs::metadata(self.blob_path(path)) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RegistryError::SnapshotBlobRead(e)),
        }
    }
}
