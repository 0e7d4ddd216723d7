//! The patient record data model.
//!
//! A [`PatientRecord`] is the unit of storage, snapshotting and
//! reconciliation. It carries three identity fields, nine clinical sections
//! and two store-assigned audit timestamps.
//!
//! ## Identity
//!
//! - `id`: store-assigned, opaque, immutable once set, never reused. `None`
//!   on records that have not been persisted yet (form drafts, snapshot or
//!   spreadsheet imports before admission).
//! - `study_code`: the human-facing enrolment code (e.g. "CAP007"). Intended
//!   unique but not enforced at write time; uniqueness for new admissions is
//!   the allocator's job.
//! - `hospital_record_code`: free-text hospital record number. This is the
//!   *natural key* for reconciliation: two records with the same non-empty
//!   code are the same patient, regardless of `id` or `study_code`.
//!
//! All structs serialise with camelCase keys; this is the wire and snapshot
//! format.

use capr_types::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A complete patient record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PatientRecord {
    /// Store-assigned identifier; `None` until first persistence.
    #[serde(default)]
    pub id: Option<RecordId>,
    /// Human-assigned study enrolment code, e.g. "CAP007".
    #[serde(default)]
    pub study_code: String,
    /// Hospital record number; the natural key for reconciliation matching.
    #[serde(default)]
    pub hospital_record_code: String,

    #[serde(default)]
    pub administrative: Administrative,
    #[serde(default)]
    pub history: History,
    #[serde(default)]
    pub vitals: Vitals,
    #[serde(default)]
    pub labs: Labs,
    #[serde(default)]
    pub computed_indices: ComputedIndices,
    #[serde(default)]
    pub imaging: Imaging,
    #[serde(default)]
    pub microbiology: Microbiology,
    #[serde(default)]
    pub severity_score: SeverityScore,
    #[serde(default)]
    pub outcome: Outcome,

    /// Server-assigned creation timestamp; `None` until first persistence.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Server-assigned last-update timestamp; `None` until first persistence.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PatientRecord {
    /// Returns the hospital record code trimmed of surrounding whitespace.
    ///
    /// Reconciliation keys on the trimmed form so that stray whitespace from
    /// a spreadsheet cell never splits one patient into two.
    pub fn natural_key(&self) -> &str {
        self.hospital_record_code.trim()
    }

    /// Returns a copy with identity and audit fields cleared, ready to be
    /// persisted as a fresh write (create or overwrite).
    ///
    /// The store assigns `id`/`created_at`/`updated_at`; restored timestamps
    /// are display-only and must never survive re-admission.
    pub fn as_unpersisted(&self) -> PatientRecord {
        let mut record = self.clone();
        record.id = None;
        record.created_at = None;
        record.updated_at = None;
        record
    }
}

/// Administrative and demographic details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Administrative {
    #[serde(default)]
    pub patient_name: String,
    #[serde(default)]
    pub sex: String,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    /// Admission date as entered, "YYYY-MM-DD".
    #[serde(default)]
    pub admission_date: String,
    #[serde(default)]
    pub ward: String,
    #[serde(default)]
    pub attending_physician: String,
}

/// Presenting history and comorbidities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct History {
    #[serde(default)]
    pub symptom_onset_days: Option<u32>,
    #[serde(default)]
    pub fever: Option<bool>,
    #[serde(default)]
    pub cough: Option<bool>,
    #[serde(default)]
    pub sputum: Option<bool>,
    #[serde(default)]
    pub dyspnoea: Option<bool>,
    #[serde(default)]
    pub chest_pain: Option<bool>,
    #[serde(default)]
    pub smoker: Option<bool>,
    #[serde(default)]
    pub copd: Option<bool>,
    #[serde(default)]
    pub diabetes: Option<bool>,
    #[serde(default)]
    pub hypertension: Option<bool>,
    #[serde(default)]
    pub coronary_disease: Option<bool>,
    #[serde(default)]
    pub immunosuppressed: Option<bool>,
    #[serde(default)]
    pub notes: String,
}

/// Vital signs on admission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Vitals {
    #[serde(default)]
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub heart_rate: Option<u32>,
    #[serde(default)]
    pub respiratory_rate: Option<u32>,
    #[serde(default)]
    pub systolic_bp: Option<u32>,
    #[serde(default)]
    pub diastolic_bp: Option<u32>,
    #[serde(default)]
    pub spo2_percent: Option<f64>,
    #[serde(default)]
    pub confusion: Option<bool>,
}

/// Admission laboratory panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Labs {
    #[serde(default)]
    pub wbc: Option<f64>,
    #[serde(default)]
    pub neutrophil_percent: Option<f64>,
    #[serde(default)]
    pub haemoglobin: Option<f64>,
    #[serde(default)]
    pub haematocrit: Option<f64>,
    #[serde(default)]
    pub platelets: Option<f64>,
    #[serde(default)]
    pub crp: Option<f64>,
    #[serde(default)]
    pub procalcitonin: Option<f64>,
    #[serde(default)]
    pub urea: Option<f64>,
    #[serde(default)]
    pub creatinine: Option<f64>,
    #[serde(default)]
    pub sodium: Option<f64>,
    #[serde(default)]
    pub glucose: Option<f64>,
    #[serde(default)]
    pub albumin: Option<f64>,
    #[serde(default)]
    pub arterial_ph: Option<f64>,
    #[serde(default)]
    pub pao2: Option<f64>,
}

/// Indices derived from raw measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ComputedIndices {
    #[serde(default)]
    pub bmi: Option<f64>,
    #[serde(default)]
    pub pao2_fio2_ratio: Option<f64>,
    #[serde(default)]
    pub curb65: Option<u32>,
}

/// Chest imaging findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Imaging {
    /// Individual lesion entries; order as reported.
    #[serde(default)]
    pub lesions: Vec<LesionEntry>,
    #[serde(default)]
    pub pleural_effusion: Option<bool>,
    #[serde(default)]
    pub report_notes: String,
}

/// One lesion entry in an imaging report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct LesionEntry {
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub laterality: String,
    #[serde(default)]
    pub morphology: String,
    #[serde(default)]
    pub extent: String,
}

/// Microbiology results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Microbiology {
    /// Bacterial isolates with their antibiograms; order as reported.
    #[serde(default)]
    pub isolates: Vec<Isolate>,
    #[serde(default)]
    pub blood_culture_taken: Option<bool>,
    #[serde(default)]
    pub sputum_culture_taken: Option<bool>,
}

/// A single bacterial isolate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Isolate {
    #[serde(default)]
    pub organism: String,
    #[serde(default)]
    pub specimen: String,
    #[serde(default)]
    pub antibiogram: Vec<AntibiogramEntry>,
}

/// One antibiotic susceptibility result within an isolate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AntibiogramEntry {
    #[serde(default)]
    pub antibiotic: String,
    /// "S", "I" or "R" as reported by the lab.
    #[serde(default)]
    pub susceptibility: String,
}

/// Pneumonia severity scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SeverityScore {
    #[serde(default)]
    pub psi_score: Option<u32>,
    #[serde(default)]
    pub psi_class: String,
}

/// Episode outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// e.g. "discharged", "transferred", "deceased".
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub discharge_date: String,
    #[serde(default)]
    pub days_in_hospital: Option<u32>,
    #[serde(default)]
    pub icu_admission: Option<bool>,
    #[serde(default)]
    pub notes: String,
}
