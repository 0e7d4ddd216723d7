//! Field-level diffing between two patient records.
//!
//! Every clinical field is compared pairwise by its display label, in a fixed
//! section order (administrative → history → vitals → labs → computed indices
//! → imaging → microbiology → severity score → outcome). The output order is
//! part of the contract: conflict dialogs and tests rely on it being
//! reproducible.
//!
//! Values are normalised to a canonical display string before comparison, so
//! "different" always means "would display differently":
//!
//! - absent values, empty strings and whitespace-only strings all normalise
//!   to one empty sentinel;
//! - booleans normalise to "yes"/"no";
//! - numeric **zero folds into the empty sentinel**. This suppresses noisy
//!   diffs on never-filled numeric fields at the cost of not distinguishing
//!   a recorded 0 from "not recorded" (kept as-is pending product
//!   clarification, see DESIGN.md);
//! - structured array fields (lesions, isolates) are compared whole, via
//!   canonical JSON with sorted object keys. Array order is significant and
//!   is not normalised. A differing structured field yields a single diff
//!   entry labelled with its section name.

use crate::record::PatientRecord;
use serde::Serialize;

/// Display string for an absent/empty value.
pub const EMPTY_CELL: &str = "(not recorded)";

/// Label under which a changed hospital record code on the incoming side is
/// reported. The identity fields themselves are otherwise excluded from
/// diffing; identity is the match key, not a mutable field.
pub const HOSPITAL_CODE_LABEL: &str = "Hospital record number";

/// One differing field: a human-readable label and the before/after display
/// strings. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDiff {
    pub label: String,
    pub old_value: String,
    pub new_value: String,
}

/// A value that can render itself as a canonical display cell.
pub(crate) trait DisplayCell {
    fn cell(&self) -> String;
}

impl DisplayCell for String {
    fn cell(&self) -> String {
        let trimmed = self.trim();
        if trimmed.is_empty() {
            EMPTY_CELL.to_string()
        } else {
            trimmed.to_string()
        }
    }
}

impl DisplayCell for Option<bool> {
    fn cell(&self) -> String {
        match self {
            None => EMPTY_CELL.to_string(),
            Some(true) => "yes".to_string(),
            Some(false) => "no".to_string(),
        }
    }
}

impl DisplayCell for Option<u32> {
    fn cell(&self) -> String {
        match self {
            None | Some(0) => EMPTY_CELL.to_string(),
            Some(n) => n.to_string(),
        }
    }
}

impl DisplayCell for Option<f64> {
    fn cell(&self) -> String {
        match self {
            None => EMPTY_CELL.to_string(),
            Some(n) if *n == 0.0 => EMPTY_CELL.to_string(),
            Some(n) => n.to_string(),
        }
    }
}

/// Canonical display cell for a structured array field.
///
/// An empty list normalises to the same sentinel as empty scalars. Otherwise
/// the items are rendered as canonical JSON: `serde_json::Value` objects keep
/// their keys in a sorted map, so key order never produces a spurious diff,
/// while array order is preserved and significant.
pub(crate) fn structured_cell<T: Serialize>(items: &[T]) -> String {
    if items.is_empty() {
        return EMPTY_CELL.to_string();
    }
    match serde_json::to_value(items) {
        Ok(value) => value.to_string(),
        // Serialisation of our own plain data structs cannot fail in
        // practice; fold the pathological case into the sentinel rather than
        // aborting a whole reconciliation over one field.
        Err(_) => EMPTY_CELL.to_string(),
    }
}

fn push_diff(diffs: &mut Vec<FieldDiff>, label: &str, old_value: String, new_value: String) {
    if old_value != new_value {
        diffs.push(FieldDiff {
            label: label.to_string(),
            old_value,
            new_value,
        });
    }
}

fn scalar<T: DisplayCell>(diffs: &mut Vec<FieldDiff>, label: &str, old: &T, new: &T) {
    push_diff(diffs, label, old.cell(), new.cell());
}

/// Computes the ordered field-level diff between an existing record and an
/// incoming one.
///
/// `existing` supplies the old values, `incoming` the new ones. Study codes
/// are never diffed; a changed hospital record code is reported under
/// [`HOSPITAL_CODE_LABEL`].
pub fn record_diffs(existing: &PatientRecord, incoming: &PatientRecord) -> Vec<FieldDiff> {
    let mut diffs = Vec::new();
    let d = &mut diffs;

    scalar(
        d,
        HOSPITAL_CODE_LABEL,
        &existing.hospital_record_code,
        &incoming.hospital_record_code,
    );

    let (oa, na) = (&existing.administrative, &incoming.administrative);
    scalar(d, "Patient name", &oa.patient_name, &na.patient_name);
    scalar(d, "Sex", &oa.sex, &na.sex);
    scalar(d, "Age", &oa.age, &na.age);
    scalar(d, "Height (cm)", &oa.height_cm, &na.height_cm);
    scalar(d, "Weight (kg)", &oa.weight_kg, &na.weight_kg);
    scalar(d, "Admission date", &oa.admission_date, &na.admission_date);
    scalar(d, "Ward", &oa.ward, &na.ward);
    scalar(
        d,
        "Attending physician",
        &oa.attending_physician,
        &na.attending_physician,
    );

    let (oh, nh) = (&existing.history, &incoming.history);
    scalar(
        d,
        "Symptom onset (days)",
        &oh.symptom_onset_days,
        &nh.symptom_onset_days,
    );
    scalar(d, "Fever", &oh.fever, &nh.fever);
    scalar(d, "Cough", &oh.cough, &nh.cough);
    scalar(d, "Sputum", &oh.sputum, &nh.sputum);
    scalar(d, "Dyspnoea", &oh.dyspnoea, &nh.dyspnoea);
    scalar(d, "Chest pain", &oh.chest_pain, &nh.chest_pain);
    scalar(d, "Smoker", &oh.smoker, &nh.smoker);
    scalar(d, "COPD", &oh.copd, &nh.copd);
    scalar(d, "Diabetes", &oh.diabetes, &nh.diabetes);
    scalar(d, "Hypertension", &oh.hypertension, &nh.hypertension);
    scalar(
        d,
        "Coronary disease",
        &oh.coronary_disease,
        &nh.coronary_disease,
    );
    scalar(
        d,
        "Immunosuppressed",
        &oh.immunosuppressed,
        &nh.immunosuppressed,
    );
    scalar(d, "History notes", &oh.notes, &nh.notes);

    let (ov, nv) = (&existing.vitals, &incoming.vitals);
    scalar(d, "Temperature (C)", &ov.temperature_c, &nv.temperature_c);
    scalar(d, "Heart rate", &ov.heart_rate, &nv.heart_rate);
    scalar(
        d,
        "Respiratory rate",
        &ov.respiratory_rate,
        &nv.respiratory_rate,
    );
    scalar(d, "Systolic BP", &ov.systolic_bp, &nv.systolic_bp);
    scalar(d, "Diastolic BP", &ov.diastolic_bp, &nv.diastolic_bp);
    scalar(d, "SpO2 (%)", &ov.spo2_percent, &nv.spo2_percent);
    scalar(d, "Confusion", &ov.confusion, &nv.confusion);

    let (ol, nl) = (&existing.labs, &incoming.labs);
    scalar(d, "WBC", &ol.wbc, &nl.wbc);
    scalar(
        d,
        "Neutrophil (%)",
        &ol.neutrophil_percent,
        &nl.neutrophil_percent,
    );
    scalar(d, "Haemoglobin", &ol.haemoglobin, &nl.haemoglobin);
    scalar(d, "Haematocrit", &ol.haematocrit, &nl.haematocrit);
    scalar(d, "Platelets", &ol.platelets, &nl.platelets);
    scalar(d, "CRP", &ol.crp, &nl.crp);
    scalar(d, "Procalcitonin", &ol.procalcitonin, &nl.procalcitonin);
    scalar(d, "Urea", &ol.urea, &nl.urea);
    scalar(d, "Creatinine", &ol.creatinine, &nl.creatinine);
    scalar(d, "Sodium", &ol.sodium, &nl.sodium);
    scalar(d, "Glucose", &ol.glucose, &nl.glucose);
    scalar(d, "Albumin", &ol.albumin, &nl.albumin);
    scalar(d, "Arterial pH", &ol.arterial_ph, &nl.arterial_ph);
    scalar(d, "PaO2", &ol.pao2, &nl.pao2);

    let (oc, nc) = (&existing.computed_indices, &incoming.computed_indices);
    scalar(d, "BMI", &oc.bmi, &nc.bmi);
    scalar(
        d,
        "PaO2/FiO2 ratio",
        &oc.pao2_fio2_ratio,
        &nc.pao2_fio2_ratio,
    );
    scalar(d, "CURB-65", &oc.curb65, &nc.curb65);

    let (oi, ni) = (&existing.imaging, &incoming.imaging);
    push_diff(
        d,
        "Imaging findings",
        structured_cell(&oi.lesions),
        structured_cell(&ni.lesions),
    );
    scalar(
        d,
        "Pleural effusion",
        &oi.pleural_effusion,
        &ni.pleural_effusion,
    );
    scalar(d, "Imaging notes", &oi.report_notes, &ni.report_notes);

    let (om, nm) = (&existing.microbiology, &incoming.microbiology);
    push_diff(
        d,
        "Bacterial isolates",
        structured_cell(&om.isolates),
        structured_cell(&nm.isolates),
    );
    scalar(
        d,
        "Blood culture taken",
        &om.blood_culture_taken,
        &nm.blood_culture_taken,
    );
    scalar(
        d,
        "Sputum culture taken",
        &om.sputum_culture_taken,
        &nm.sputum_culture_taken,
    );

    let (os, ns) = (&existing.severity_score, &incoming.severity_score);
    scalar(d, "PSI score", &os.psi_score, &ns.psi_score);
    scalar(d, "PSI class", &os.psi_class, &ns.psi_class);

    let (oo, no) = (&existing.outcome, &incoming.outcome);
    scalar(d, "Outcome status", &oo.status, &no.status);
    scalar(d, "Discharge date", &oo.discharge_date, &no.discharge_date);
    scalar(
        d,
        "Days in hospital",
        &oo.days_in_hospital,
        &no.days_in_hospital,
    );
    scalar(d, "ICU admission", &oo.icu_admission, &no.icu_admission);
    scalar(d, "Outcome notes", &oo.notes, &no.notes);

    diffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Isolate, LesionEntry};

    fn matched_pair() -> (PatientRecord, PatientRecord) {
        let existing = PatientRecord {
            hospital_record_code: "HX-100".into(),
            ..Default::default()
        };
        (existing.clone(), existing)
    }

    #[test]
    fn test_identical_records_have_no_diffs() {
        let (existing, incoming) = matched_pair();
        assert!(record_diffs(&existing, &incoming).is_empty());
    }

    #[test]
    fn test_single_scalar_change_yields_single_diff() {
        let (existing, mut incoming) = matched_pair();
        incoming.administrative.age = Some(68);

        let diffs = record_diffs(&existing, &incoming);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].label, "Age");
        assert_eq!(diffs[0].old_value, EMPTY_CELL);
        assert_eq!(diffs[0].new_value, "68");
    }

    #[test]
    fn test_numeric_zero_folds_into_empty() {
        let (mut existing, mut incoming) = matched_pair();
        existing.labs.crp = None;
        incoming.labs.crp = Some(0.0);
        existing.vitals.heart_rate = Some(0);
        incoming.vitals.heart_rate = None;

        assert!(record_diffs(&existing, &incoming).is_empty());
    }

    #[test]
    fn test_boolean_normalises_to_yes_no() {
        let (existing, mut incoming) = matched_pair();
        incoming.history.fever = Some(true);

        let diffs = record_diffs(&existing, &incoming);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].label, "Fever");
        assert_eq!(diffs[0].new_value, "yes");

        // Explicit false differs from not recorded.
        let mut incoming_no = existing.clone();
        incoming_no.history.fever = Some(false);
        let diffs = record_diffs(&existing, &incoming_no);
        assert_eq!(diffs[0].new_value, "no");
    }

    #[test]
    fn test_whitespace_only_string_is_empty() {
        let (existing, mut incoming) = matched_pair();
        incoming.administrative.ward = "   ".into();
        assert!(record_diffs(&existing, &incoming).is_empty());
    }

    #[test]
    fn test_structured_field_diffs_as_whole() {
        let (existing, mut incoming) = matched_pair();
        incoming.imaging.lesions.push(LesionEntry {
            location: "right lower lobe".into(),
            laterality: "right".into(),
            morphology: "consolidation".into(),
            extent: "segmental".into(),
        });

        let diffs = record_diffs(&existing, &incoming);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].label, "Imaging findings");
        assert_eq!(diffs[0].old_value, EMPTY_CELL);
        assert!(diffs[0].new_value.contains("right lower lobe"));
    }

    #[test]
    fn test_structured_array_order_is_significant() {
        let (mut existing, mut incoming) = matched_pair();
        let a = Isolate {
            organism: "S. pneumoniae".into(),
            ..Default::default()
        };
        let b = Isolate {
            organism: "H. influenzae".into(),
            ..Default::default()
        };
        existing.microbiology.isolates = vec![a.clone(), b.clone()];
        incoming.microbiology.isolates = vec![b, a];

        let diffs = record_diffs(&existing, &incoming);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].label, "Bacterial isolates");
    }

    #[test]
    fn test_changed_hospital_code_reported_under_dedicated_label() {
        let (existing, mut incoming) = matched_pair();
        incoming.hospital_record_code = "HX-100 ".into();
        // Trailing whitespace normalises away: no diff.
        assert!(record_diffs(&existing, &incoming).is_empty());

        incoming.hospital_record_code = "HX-101".into();
        let diffs = record_diffs(&existing, &incoming);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].label, HOSPITAL_CODE_LABEL);
    }

    #[test]
    fn test_study_code_is_never_diffed() {
        let (existing, mut incoming) = matched_pair();
        incoming.study_code = "CAP999".into();
        assert!(record_diffs(&existing, &incoming).is_empty());
    }

    #[test]
    fn test_diff_order_follows_section_order() {
        let (existing, mut incoming) = matched_pair();
        incoming.outcome.status = "discharged".into();
        incoming.administrative.age = Some(50);
        incoming.labs.crp = Some(120.0);

        let labels: Vec<_> = record_diffs(&existing, &incoming)
            .into_iter()
            .map(|diff| diff.label)
            .collect();
        assert_eq!(labels, vec!["Age", "CRP", "Outcome status"]);
    }
}
