//! Applying a confirmed reconciliation decision to the record store.
//!
//! The executor receives the records a human has chosen to admit (new
//! records plus whichever conflicts were approved for overwrite) and writes
//! them back under the identity rules:
//!
//! - a record matched by hospital record code overwrites the existing record
//!   and **keeps the existing study code** (a patient's code is sticky once
//!   assigned, the incoming one is discarded);
//! - an unmatched record is created with a freshly allocated study code. The
//!   whole batch's codes are computed once up front, so the Nth unmatched
//!   record in input order always receives the Nth allocated code.
//!
//! Writes are sequential, one in flight at a time, in input order. There is
//! no rollback: if a write fails, earlier writes stay committed, the rest of
//! the batch is not attempted, and the error propagates to the caller.

use crate::allocator::allocate_codes_for_records;
use crate::error::{RegistryError, RegistryResult};
use crate::reconcile::natural_key_lookup;
use crate::record::PatientRecord;
use crate::store::RecordStore;

/// Counts of writes applied by one restore batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RestoreOutcome {
    pub created: usize,
    pub updated: usize,
}

/// Applies restore decisions against a [`RecordStore`].
pub struct RestoreExecutor<'a, S> {
    store: &'a S,
    study_code_prefix: &'a str,
}

impl<'a, S: RecordStore> RestoreExecutor<'a, S> {
    pub fn new(store: &'a S, study_code_prefix: &'a str) -> Self {
        Self {
            store,
            study_code_prefix,
        }
    }

    /// Admits `batch` into the store, in input order.
    ///
    /// Matches are re-resolved against the store's current state rather than
    /// trusting a classification computed earlier; the lookup is built the
    /// same way as in reconciliation.
    ///
    /// # Errors
    ///
    /// Propagates the first failed write. Earlier writes are not rolled
    /// back; later records are not attempted.
    pub fn apply(&self, batch: &[PatientRecord]) -> RegistryResult<RestoreOutcome> {
        let existing = self.store.list()?;
        let lookup = natural_key_lookup(&existing);

        // Pre-compute the whole batch's fresh codes so a multi-record
        // admission gets sequential codes from one scan.
        let unmatched = batch
            .iter()
            .filter(|record| !lookup.contains_key(record.natural_key()))
            .count();
        let mut codes = allocate_codes_for_records(&existing, self.study_code_prefix, unmatched)?
            .into_iter();

        let mut outcome = RestoreOutcome::default();

        for record in batch {
            match lookup.get(record.natural_key()) {
                Some(current) => {
                    let id = current
                        .id
                        .as_ref()
                        .ok_or(RegistryError::RecordNotPersisted)?;
                    let mut payload = record.as_unpersisted();
                    payload.study_code = current.study_code.clone();
                    self.store.update(id, &payload)?;
                    outcome.updated += 1;
                }
                None => {
                    let code = codes.next().ok_or_else(|| {
                        RegistryError::InvalidInput(
                            "allocated study codes exhausted mid-batch".into(),
                        )
                    })?;
                    let mut payload = record.as_unpersisted();
                    payload.study_code = code;
                    self.store.create(&payload)?;
                    outcome.created += 1;
                }
            }
        }

        tracing::info!(
            "restore applied: {} created, {} updated",
            outcome.created,
            outcome.updated
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsRecordStore;
    use capr_types::RecordId;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn record(code: &str) -> PatientRecord {
        PatientRecord {
            hospital_record_code: code.into(),
            ..Default::default()
        }
    }

    fn store(temp: &TempDir) -> FsRecordStore {
        FsRecordStore::new(temp.path().join("records")).unwrap()
    }

    #[test]
    fn test_existing_study_code_is_sticky() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let mut live = record("HX-1");
        live.study_code = "CAP001".into();
        let live = store.create(&live).unwrap();

        let mut incoming = record("HX-1");
        incoming.study_code = "CAP777".into();
        incoming.administrative.age = Some(80);

        let outcome = RestoreExecutor::new(&store, "CAP")
            .apply(&[incoming])
            .unwrap();
        assert_eq!(outcome, RestoreOutcome { created: 0, updated: 1 });

        let stored = store.get(live.id.as_ref().unwrap()).unwrap().unwrap();
        assert_eq!(stored.study_code, "CAP001");
        assert_eq!(stored.administrative.age, Some(80));
    }

    #[test]
    fn test_counts_for_mixed_batch() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        for i in 1..=4 {
            let mut live = record(&format!("HX-{i}"));
            live.study_code = format!("CAP00{i}");
            store.create(&live).unwrap();
        }

        // 2 new + 3 matched-with-changes; the identical 4th match is
        // excluded from the batch, as the caller does after reconciliation.
        let mut batch = vec![record("NEW-1"), record("NEW-2")];
        for i in 1..=3 {
            let mut changed = record(&format!("HX-{i}"));
            changed.vitals.temperature_c = Some(39.1);
            batch.push(changed);
        }

        let outcome = RestoreExecutor::new(&store, "CAP").apply(&batch).unwrap();
        assert_eq!(outcome, RestoreOutcome { created: 2, updated: 3 });
        assert_eq!(store.list().unwrap().len(), 6);
    }

    #[test]
    fn test_new_records_get_sequential_codes_in_input_order() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let mut seeded = record("HX-1");
        seeded.study_code = "CAP005".into();
        store.create(&seeded).unwrap();

        let mut a = record("A-1");
        a.administrative.patient_name = "a".into();
        let mut b = record("B-1");
        b.administrative.patient_name = "b".into();
        let mut c = record("C-1");
        c.administrative.patient_name = "c".into();

        RestoreExecutor::new(&store, "CAP")
            .apply(&[a, b, c])
            .unwrap();

        let mut stored = store.list().unwrap();
        stored.retain(|r| r.hospital_record_code != "HX-1");
        stored.sort_by(|x, y| {
            x.administrative
                .patient_name
                .cmp(&y.administrative.patient_name)
        });
        let codes: Vec<_> = stored.iter().map(|r| r.study_code.clone()).collect();
        assert_eq!(codes, vec!["CAP006", "CAP007", "CAP008"]);
    }

    #[test]
    fn test_incoming_code_discarded_on_create() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let mut incoming = record("HX-1");
        incoming.study_code = "CAP900".into();
        RestoreExecutor::new(&store, "CAP")
            .apply(&[incoming])
            .unwrap();

        let stored = store.list().unwrap();
        assert_eq!(stored[0].study_code, "CAP001");
    }

    #[test]
    fn test_restored_records_get_fresh_audit_timestamps() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let stale = chrono::DateTime::parse_from_rfc3339("2020-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let foreign_id = RecordId::new();
        let mut incoming = record("HX-1");
        incoming.id = Some(foreign_id.clone());
        incoming.created_at = Some(stale);
        incoming.updated_at = Some(stale);

        RestoreExecutor::new(&store, "CAP")
            .apply(&[incoming])
            .unwrap();

        let stored = &store.list().unwrap()[0];
        assert!(stored.created_at.unwrap() > stale);
        assert_ne!(stored.id, Some(foreign_id));
    }

    /// Store wrapper that fails the nth create, for partial-failure tests.
    struct FlakyStore<'a> {
        inner: &'a FsRecordStore,
        creates_before_failure: Cell<usize>,
    }

    impl RecordStore for FlakyStore<'_> {
        fn list(&self) -> RegistryResult<Vec<PatientRecord>> {
            self.inner.list()
        }
        fn get(&self, id: &RecordId) -> RegistryResult<Option<PatientRecord>> {
            self.inner.get(id)
        }
        fn create(&self, record: &PatientRecord) -> RegistryResult<PatientRecord> {
            let remaining = self.creates_before_failure.get();
            if remaining == 0 {
                return Err(RegistryError::FileWrite(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "store unavailable",
                )));
            }
            self.creates_before_failure.set(remaining - 1);
            self.inner.create(record)
        }
        fn update(&self, id: &RecordId, record: &PatientRecord) -> RegistryResult<PatientRecord> {
            self.inner.update(id, record)
        }
        fn delete(&self, id: &RecordId) -> RegistryResult<()> {
            self.inner.delete(id)
        }
    }

    #[test]
    fn test_partial_failure_keeps_earlier_writes() {
        let temp = TempDir::new().unwrap();
        let fs = store(&temp);
        let flaky = FlakyStore {
            inner: &fs,
            creates_before_failure: Cell::new(1),
        };

        let batch = vec![record("HX-1"), record("HX-2"), record("HX-3")];
        let result = RestoreExecutor::new(&flaky, "CAP").apply(&batch);

        assert!(matches!(result, Err(RegistryError::FileWrite(_))));
        // First write committed, remainder never attempted.
        let stored = fs.list().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].hospital_record_code, "HX-1");
    }
}
