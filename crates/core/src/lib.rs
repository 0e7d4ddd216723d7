//! # CAPR Core
//!
//! Core business logic for the CAPR community-acquired pneumonia registry.
//!
//! This crate contains pure data operations and storage management:
//! - Patient record storage with sharded JSON layout
//! - Versioned snapshot backup and restore
//! - Reconciliation of imported batches against the live collection
//! - Study code allocation
//! - Tabular export/import
//!
//! **No API concerns**: authentication, HTTP servers or UI rendering do not
//! belong here.

pub mod allocator;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod record;
pub mod restore;
pub mod settings;
pub mod snapshot;
pub mod spreadsheet;
pub mod store;

pub use capr_types::{NonEmptyText, RecordId, TextError};
pub use config::CoreConfig;
pub use error::{RegistryError, RegistryResult};
pub use reconcile::{reconcile, ConflictPair, Reconciliation};
pub use record::PatientRecord;
pub use restore::{RestoreExecutor, RestoreOutcome};
pub use snapshot::{SnapshotMetadata, SnapshotService, SnapshotTrigger};
pub use store::{BlobStore, FsBlobStore, FsRecordStore, RecordStore};

use std::path::Path;
use std::sync::Arc;

/// High-level registry operations, wiring the stores together and enforcing
/// the snapshot side effects of destructive operations.
#[derive(Clone)]
pub struct RegistryService {
    cfg: Arc<CoreConfig>,
    records: FsRecordStore,
    snapshots: SnapshotService<FsBlobStore>,
}

impl RegistryService {
    /// Opens (creating if needed) the registry under the configured data
    /// directory.
    pub fn new(cfg: Arc<CoreConfig>) -> RegistryResult<Self> {
        let records = FsRecordStore::new(cfg.records_dir())?;
        let snapshots = SnapshotService::new(FsBlobStore::new(cfg.snapshots_dir())?);
        Ok(Self {
            cfg,
            records,
            snapshots,
        })
    }

    pub fn records(&self) -> &FsRecordStore {
        &self.records
    }

    pub fn snapshots(&self) -> &SnapshotService<FsBlobStore> {
        &self.snapshots
    }

    pub fn list_patients(&self) -> RegistryResult<Vec<PatientRecord>> {
        self.records.list()
    }

    /// Creates a patient record. An empty study code is filled from the
    /// allocator; a non-empty one is kept as entered. A best-effort automatic
    /// snapshot of the whole collection is taken after the write.
    pub fn create_patient(&self, record: &PatientRecord) -> RegistryResult<PatientRecord> {
        let mut payload = record.as_unpersisted();
        if payload.study_code.trim().is_empty() {
            let existing = self.records.list()?;
            let mut codes = allocator::allocate_codes_for_records(
                &existing,
                self.cfg.study_code_prefix(),
                1,
            )?;
            // allocate_codes always yields exactly the requested count
            if let Some(code) = codes.pop() {
                payload.study_code = code;
            }
        }

        let stored = self.records.create(&payload)?;

        match self.records.list() {
            Ok(all) => self
                .snapshots
                .auto_snapshot(&all, "Automatic backup after create"),
            Err(e) => tracing::warn!("skipping auto snapshot, listing records failed: {e}"),
        }

        Ok(stored)
    }

    /// Deletes a patient record. The automatic snapshot is taken **before**
    /// the deletion as a safety net; its failure never blocks the delete.
    pub fn delete_patient(&self, id: &RecordId) -> RegistryResult<()> {
        match self.records.list() {
            Ok(all) => self
                .snapshots
                .auto_snapshot(&all, "Automatic backup before delete"),
            Err(e) => tracing::warn!("skipping auto snapshot, listing records failed: {e}"),
        }

        self.records.delete(id)
    }

    /// Classifies a snapshot's records against the live collection.
    pub fn reconcile_snapshot(&self, snapshot_id: &RecordId) -> RegistryResult<Reconciliation> {
        let incoming = self.snapshots.load(snapshot_id)?;
        let existing = self.records.list()?;
        Ok(reconcile::reconcile(incoming, &existing))
    }

    /// Classifies an imported spreadsheet against the live collection.
    pub fn reconcile_spreadsheet(&self, path: &Path) -> RegistryResult<Reconciliation> {
        let incoming = spreadsheet::read_csv(path)?;
        let existing = self.records.list()?;
        Ok(reconcile::reconcile(incoming, &existing))
    }

    /// Applies a confirmed restore decision.
    pub fn restore(&self, batch: &[PatientRecord]) -> RegistryResult<RestoreOutcome> {
        RestoreExecutor::new(&self.records, self.cfg.study_code_prefix()).apply(batch)
    }

    /// Exports the whole collection to a tabular file.
    pub fn export_csv(&self, path: &Path) -> RegistryResult<usize> {
        let records = self.records.list()?;
        spreadsheet::write_csv(path, &records)?;
        Ok(records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> RegistryService {
        let cfg = CoreConfig::new(PathBuf::from(temp.path()), "CAP".into()).unwrap();
        RegistryService::new(Arc::new(cfg)).unwrap()
    }

    fn record(code: &str) -> PatientRecord {
        PatientRecord {
            hospital_record_code: code.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_allocates_code_and_snapshots_after() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let stored = service.create_patient(&record("HX-1")).unwrap();
        assert_eq!(stored.study_code, "CAP001");

        let snapshots = service.snapshots().list().unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].trigger, SnapshotTrigger::Auto);
        assert_eq!(snapshots[0].patient_count, 1);
    }

    #[test]
    fn test_create_keeps_entered_code() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let mut incoming = record("HX-1");
        incoming.study_code = "CAP042".into();
        let stored = service.create_patient(&incoming).unwrap();
        assert_eq!(stored.study_code, "CAP042");
    }

    #[test]
    fn test_delete_snapshots_before_removal() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        let stored = service.create_patient(&record("HX-1")).unwrap();
        service.delete_patient(stored.id.as_ref().unwrap()).unwrap();

        assert!(service.list_patients().unwrap().is_empty());
        // The pre-delete snapshot still contains the record.
        let snapshots = service.snapshots().list().unwrap();
        let pre_delete = snapshots
            .iter()
            .find(|m| m.name.contains("before delete"))
            .unwrap();
        let contents = service.snapshots().load(&pre_delete.id).unwrap();
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0].hospital_record_code, "HX-1");
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        service.create_patient(&record("HX-1")).unwrap();
        service.create_patient(&record("HX-2")).unwrap();
        let backup = service
            .snapshots()
            .create_snapshot(
                &service.list_patients().unwrap(),
                "manual",
                SnapshotTrigger::Manual,
            )
            .unwrap();

        // Lose one record, then reconcile the backup against the remainder.
        let victim = service
            .list_patients()
            .unwrap()
            .into_iter()
            .find(|r| r.hospital_record_code == "HX-2")
            .unwrap();
        service.delete_patient(victim.id.as_ref().unwrap()).unwrap();

        let reconciliation = service.reconcile_snapshot(&backup.id).unwrap();
        assert_eq!(reconciliation.new_records.len(), 1);
        assert_eq!(reconciliation.identical.len(), 1);
        assert!(reconciliation.conflicts.is_empty());

        let outcome = service.restore(&reconciliation.new_records).unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(service.list_patients().unwrap().len(), 2);
    }

    #[test]
    fn test_spreadsheet_import_reconciliation() {
        let temp = TempDir::new().unwrap();
        let service = service(&temp);

        service.create_patient(&record("HX-1")).unwrap();
        let path = temp.path().join("sheet.csv");
        service.export_csv(&path).unwrap();

        let reconciliation = service.reconcile_spreadsheet(&path).unwrap();
        assert_eq!(reconciliation.identical.len(), 1);
        assert!(reconciliation.new_records.is_empty());
        assert!(reconciliation.conflicts.is_empty());
    }
}
