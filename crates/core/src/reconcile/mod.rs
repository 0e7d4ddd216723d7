//! Reconciliation of an incoming record batch against the authoritative set.
//!
//! Incoming records (from a snapshot restore or a spreadsheet import) are
//! classified against the live collection using the hospital record code as
//! the natural key:
//!
//! - no non-empty code, or no match → **new**;
//! - matched and field-for-field equal under normalisation → **identical**;
//! - matched with differences → **conflict**, carrying the full field diff.
//!
//! Reconciliation is a pure read: it never mutates the store. Applying a
//! decision is the restore executor's job.

pub mod diff;

use crate::record::PatientRecord;
use diff::{record_diffs, FieldDiff};
use std::collections::HashMap;

/// One matched-but-different incoming record, with its field-level diff.
/// Transient: exists only for the duration of a restore decision.
#[derive(Debug, Clone)]
pub struct ConflictPair {
    pub incoming: PatientRecord,
    pub existing: PatientRecord,
    pub diffs: Vec<FieldDiff>,
}

/// The three partitions of an incoming batch. Together they are a
/// permutation of the input: no record is dropped or duplicated.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub new_records: Vec<PatientRecord>,
    pub conflicts: Vec<ConflictPair>,
    pub identical: Vec<PatientRecord>,
}

impl Reconciliation {
    /// Total number of incoming records across all partitions.
    pub fn total(&self) -> usize {
        self.new_records.len() + self.conflicts.len() + self.identical.len()
    }
}

/// Builds the natural-key lookup over the authoritative set.
///
/// Keys are trimmed hospital record codes; empty codes are skipped. If the
/// authoritative set contains duplicate codes the later record in iteration
/// order wins. That ambiguity is a known data-quality issue in the collection
/// itself; this subsystem tolerates it rather than correcting it.
pub fn natural_key_lookup(existing: &[PatientRecord]) -> HashMap<&str, &PatientRecord> {
    let mut lookup = HashMap::new();
    for record in existing {
        let key = record.natural_key();
        if !key.is_empty() {
            lookup.insert(key, record);
        }
    }
    lookup
}

/// Classifies each incoming record against the authoritative set.
pub fn reconcile(incoming: Vec<PatientRecord>, existing: &[PatientRecord]) -> Reconciliation {
    let lookup = natural_key_lookup(existing);
    let mut result = Reconciliation::default();

    for record in incoming {
        let key = record.natural_key();
        let matched = if key.is_empty() {
            None
        } else {
            lookup.get(key).copied()
        };

        match matched {
            None => result.new_records.push(record),
            Some(current) => {
                let diffs = record_diffs(current, &record);
                if diffs.is_empty() {
                    result.identical.push(record);
                } else {
                    result.conflicts.push(ConflictPair {
                        incoming: record,
                        existing: current.clone(),
                        diffs,
                    });
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: &str) -> PatientRecord {
        PatientRecord {
            hospital_record_code: code.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_unmatched_and_empty_codes_are_new() {
        let existing = vec![record("HX-1")];
        let incoming = vec![record("HX-2"), record(""), record("   ")];

        let result = reconcile(incoming, &existing);
        assert_eq!(result.new_records.len(), 3);
        assert!(result.conflicts.is_empty());
        assert!(result.identical.is_empty());
    }

    #[test]
    fn test_identical_match() {
        let existing = vec![record("HX-1")];
        let result = reconcile(vec![record("HX-1")], &existing);
        assert!(result.new_records.is_empty());
        assert!(result.conflicts.is_empty());
        assert_eq!(result.identical.len(), 1);
    }

    #[test]
    fn test_conflict_carries_diffs() {
        let existing = vec![record("HX-1")];
        let mut incoming = record("HX-1");
        incoming.administrative.age = Some(59);

        let result = reconcile(vec![incoming], &existing);
        assert_eq!(result.conflicts.len(), 1);
        let pair = &result.conflicts[0];
        assert_eq!(pair.diffs.len(), 1);
        assert_eq!(pair.diffs[0].label, "Age");
        assert_eq!(pair.existing.hospital_record_code, "HX-1");
    }

    #[test]
    fn test_partition_completeness() {
        let existing = vec![record("HX-1"), record("HX-2")];
        let mut conflicting = record("HX-2");
        conflicting.vitals.temperature_c = Some(38.9);

        let incoming = vec![record("HX-1"), conflicting, record("HX-9"), record("")];
        let result = reconcile(incoming, &existing);

        assert_eq!(result.total(), 4);
        assert_eq!(result.new_records.len(), 2);
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.identical.len(), 1);
    }

    #[test]
    fn test_audit_fields_do_not_affect_matching() {
        // A restored record carries no timestamps; the live one does. They
        // must still classify as identical.
        let mut live = record("HX-1");
        live.id = Some(capr_types::RecordId::new());
        live.created_at = Some(chrono::Utc::now());
        live.updated_at = live.created_at;
        live.study_code = "CAP001".into();

        let result = reconcile(vec![record("HX-1")], &[live]);
        assert_eq!(result.identical.len(), 1);
    }

    #[test]
    fn test_duplicate_natural_key_keeps_last() {
        let mut first = record("HX-1");
        first.administrative.ward = "A".into();
        let mut second = record("HX-1");
        second.administrative.ward = "B".into();

        let existing = vec![first, second];
        let mut incoming = record("HX-1");
        incoming.administrative.ward = "B".into();

        // Matching against the later duplicate: identical, not a conflict.
        let result = reconcile(vec![incoming], &existing);
        assert_eq!(result.identical.len(), 1);
    }

    #[test]
    fn test_matching_key_is_trimmed() {
        let existing = vec![record("HX-1")];
        let result = reconcile(vec![record("  HX-1  ")], &existing);
        assert_eq!(result.identical.len(), 1);
    }
}
