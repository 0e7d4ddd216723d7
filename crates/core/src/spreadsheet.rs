//! Tabular export and re-import of patient records.
//!
//! One row per patient, one named column per scalar field, matched by exact
//! header string (case-sensitive, not positional). Imaging lesions are
//! flattened into indexed columns up to a fixed cap on export; items beyond
//! the cap are silently dropped. Microbiology is summarised to flat text.
//!
//! The round trip is deliberately lossy: imported records always start with
//! **empty** imaging and microbiology structured lists. The flattened
//! columns are for human consumption and are not reconstructed. Imported
//! records feed the reconciler exactly like a snapshot restore.
//!
//! Boolean import recognises a small truthy vocabulary ("yes"/"1"/"true",
//! case-insensitive); any other non-empty token reads as false, and an empty
//! cell reads as not recorded.

use crate::error::{RegistryError, RegistryResult};
use crate::record::PatientRecord;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Maximum number of lesion entries flattened into export columns.
pub const LESION_COLUMN_CAP: usize = 5;

/// Tokens read back as `true`, compared case-insensitively.
const TRUTHY_TOKENS: &[&str] = &["yes", "1", "true"];

fn lesion_headers() -> Vec<String> {
    let mut headers = Vec::new();
    for i in 1..=LESION_COLUMN_CAP {
        headers.push(format!("Lesion {i} location"));
        headers.push(format!("Lesion {i} laterality"));
        headers.push(format!("Lesion {i} morphology"));
        headers.push(format!("Lesion {i} extent"));
    }
    headers
}

/// The full export header row, in column order.
pub fn export_headers() -> Vec<String> {
    let mut headers: Vec<String> = [
        "Study code",
        "Hospital record number",
        "Patient name",
        "Sex",
        "Age",
        "Height (cm)",
        "Weight (kg)",
        "Admission date",
        "Ward",
        "Attending physician",
        "Symptom onset (days)",
        "Fever",
        "Cough",
        "Sputum",
        "Dyspnoea",
        "Chest pain",
        "Smoker",
        "COPD",
        "Diabetes",
        "Hypertension",
        "Coronary disease",
        "Immunosuppressed",
        "History notes",
        "Temperature (C)",
        "Heart rate",
        "Respiratory rate",
        "Systolic BP",
        "Diastolic BP",
        "SpO2 (%)",
        "Confusion",
        "WBC",
        "Neutrophil (%)",
        "Haemoglobin",
        "Haematocrit",
        "Platelets",
        "CRP",
        "Procalcitonin",
        "Urea",
        "Creatinine",
        "Sodium",
        "Glucose",
        "Albumin",
        "Arterial pH",
        "PaO2",
        "BMI",
        "PaO2/FiO2 ratio",
        "CURB-65",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    headers.extend(lesion_headers());
    headers.extend(
        [
            "Pleural effusion",
            "Imaging notes",
            "Isolated organisms",
            "Blood culture taken",
            "Sputum culture taken",
            "PSI score",
            "PSI class",
            "Outcome status",
            "Discharge date",
            "Days in hospital",
            "ICU admission",
            "Outcome notes",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    headers
}

fn bool_cell(value: Option<bool>) -> String {
    match value {
        None => String::new(),
        Some(true) => "yes".into(),
        Some(false) => "no".into(),
    }
}

fn u32_cell(value: Option<u32>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

fn f64_cell(value: Option<f64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

/// Flattens one record into a row matching [`export_headers`].
pub fn export_row(record: &PatientRecord) -> Vec<String> {
    let a = &record.administrative;
    let h = &record.history;
    let v = &record.vitals;
    let l = &record.labs;
    let c = &record.computed_indices;
    let i = &record.imaging;
    let m = &record.microbiology;
    let s = &record.severity_score;
    let o = &record.outcome;

    let mut row = vec![
        record.study_code.clone(),
        record.hospital_record_code.clone(),
        a.patient_name.clone(),
        a.sex.clone(),
        u32_cell(a.age),
        f64_cell(a.height_cm),
        f64_cell(a.weight_kg),
        a.admission_date.clone(),
        a.ward.clone(),
        a.attending_physician.clone(),
        u32_cell(h.symptom_onset_days),
        bool_cell(h.fever),
        bool_cell(h.cough),
        bool_cell(h.sputum),
        bool_cell(h.dyspnoea),
        bool_cell(h.chest_pain),
        bool_cell(h.smoker),
        bool_cell(h.copd),
        bool_cell(h.diabetes),
        bool_cell(h.hypertension),
        bool_cell(h.coronary_disease),
        bool_cell(h.immunosuppressed),
        h.notes.clone(),
        f64_cell(v.temperature_c),
        u32_cell(v.heart_rate),
        u32_cell(v.respiratory_rate),
        u32_cell(v.systolic_bp),
        u32_cell(v.diastolic_bp),
        f64_cell(v.spo2_percent),
        bool_cell(v.confusion),
        f64_cell(l.wbc),
        f64_cell(l.neutrophil_percent),
        f64_cell(l.haemoglobin),
        f64_cell(l.haematocrit),
        f64_cell(l.platelets),
        f64_cell(l.crp),
        f64_cell(l.procalcitonin),
        f64_cell(l.urea),
        f64_cell(l.creatinine),
        f64_cell(l.sodium),
        f64_cell(l.glucose),
        f64_cell(l.albumin),
        f64_cell(l.arterial_ph),
        f64_cell(l.pao2),
        f64_cell(c.bmi),
        f64_cell(c.pao2_fio2_ratio),
        u32_cell(c.curb65),
    ];

    // Items beyond the cap are silently dropped.
    for index in 0..LESION_COLUMN_CAP {
        match i.lesions.get(index) {
            Some(lesion) => {
                row.push(lesion.location.clone());
                row.push(lesion.laterality.clone());
                row.push(lesion.morphology.clone());
                row.push(lesion.extent.clone());
            }
            None => row.extend(std::iter::repeat(String::new()).take(4)),
        }
    }

    let organisms = m
        .isolates
        .iter()
        .map(|isolate| isolate.organism.as_str())
        .filter(|organism| !organism.is_empty())
        .collect::<Vec<_>>()
        .join("; ");

    row.extend([
        bool_cell(i.pleural_effusion),
        i.report_notes.clone(),
        organisms,
        bool_cell(m.blood_culture_taken),
        bool_cell(m.sputum_culture_taken),
        u32_cell(s.psi_score),
        s.psi_class.clone(),
        o.status.clone(),
        o.discharge_date.clone(),
        u32_cell(o.days_in_hospital),
        bool_cell(o.icu_admission),
        o.notes.clone(),
    ]);

    row
}

/// One parsed data row, with cells looked up by exact header string.
struct Row<'a> {
    header_index: &'a HashMap<String, usize>,
    cells: &'a csv::StringRecord,
}

impl Row<'_> {
    /// Missing columns and missing cells default to the empty string.
    fn get(&self, header: &str) -> &str {
        self.header_index
            .get(header)
            .and_then(|&index| self.cells.get(index))
            .map(str::trim)
            .unwrap_or("")
    }

    fn text(&self, header: &str) -> String {
        self.get(header).to_string()
    }

    fn opt_bool(&self, header: &str) -> Option<bool> {
        let cell = self.get(header);
        if cell.is_empty() {
            return None;
        }
        Some(
            TRUTHY_TOKENS
                .iter()
                .any(|token| cell.eq_ignore_ascii_case(token)),
        )
    }

    fn opt_u32(&self, header: &str) -> Option<u32> {
        self.get(header).parse().ok()
    }

    fn opt_f64(&self, header: &str) -> Option<f64> {
        self.get(header).parse().ok()
    }
}

/// Maps one data row back to a record.
///
/// Structured imaging/microbiology lists are **not** reconstructed; they
/// start empty on every imported record.
fn import_row(row: &Row<'_>) -> PatientRecord {
    let mut record = PatientRecord {
        study_code: row.text("Study code"),
        hospital_record_code: row.text("Hospital record number"),
        ..Default::default()
    };

    let a = &mut record.administrative;
    a.patient_name = row.text("Patient name");
    a.sex = row.text("Sex");
    a.age = row.opt_u32("Age");
    a.height_cm = row.opt_f64("Height (cm)");
    a.weight_kg = row.opt_f64("Weight (kg)");
    a.admission_date = row.text("Admission date");
    a.ward = row.text("Ward");
    a.attending_physician = row.text("Attending physician");

    let h = &mut record.history;
    h.symptom_onset_days = row.opt_u32("Symptom onset (days)");
    h.fever = row.opt_bool("Fever");
    h.cough = row.opt_bool("Cough");
    h.sputum = row.opt_bool("Sputum");
    h.dyspnoea = row.opt_bool("Dyspnoea");
    h.chest_pain = row.opt_bool("Chest pain");
    h.smoker = row.opt_bool("Smoker");
    h.copd = row.opt_bool("COPD");
    h.diabetes = row.opt_bool("Diabetes");
    h.hypertension = row.opt_bool("Hypertension");
    h.coronary_disease = row.opt_bool("Coronary disease");
    h.immunosuppressed = row.opt_bool("Immunosuppressed");
    h.notes = row.text("History notes");

    let v = &mut record.vitals;
    v.temperature_c = row.opt_f64("Temperature (C)");
    v.heart_rate = row.opt_u32("Heart rate");
    v.respiratory_rate = row.opt_u32("Respiratory rate");
    v.systolic_bp = row.opt_u32("Systolic BP");
    v.diastolic_bp = row.opt_u32("Diastolic BP");
    v.spo2_percent = row.opt_f64("SpO2 (%)");
    v.confusion = row.opt_bool("Confusion");

    let l = &mut record.labs;
    l.wbc = row.opt_f64("WBC");
    l.neutrophil_percent = row.opt_f64("Neutrophil (%)");
    l.haemoglobin = row.opt_f64("Haemoglobin");
    l.haematocrit = row.opt_f64("Haematocrit");
    l.platelets = row.opt_f64("Platelets");
    l.crp = row.opt_f64("CRP");
    l.procalcitonin = row.opt_f64("Procalcitonin");
    l.urea = row.opt_f64("Urea");
    l.creatinine = row.opt_f64("Creatinine");
    l.sodium = row.opt_f64("Sodium");
    l.glucose = row.opt_f64("Glucose");
    l.albumin = row.opt_f64("Albumin");
    l.arterial_ph = row.opt_f64("Arterial pH");
    l.pao2 = row.opt_f64("PaO2");

    let c = &mut record.computed_indices;
    c.bmi = row.opt_f64("BMI");
    c.pao2_fio2_ratio = row.opt_f64("PaO2/FiO2 ratio");
    c.curb65 = row.opt_u32("CURB-65");

    record.imaging.pleural_effusion = row.opt_bool("Pleural effusion");
    record.imaging.report_notes = row.text("Imaging notes");

    record.microbiology.blood_culture_taken = row.opt_bool("Blood culture taken");
    record.microbiology.sputum_culture_taken = row.opt_bool("Sputum culture taken");

    record.severity_score.psi_score = row.opt_u32("PSI score");
    record.severity_score.psi_class = row.text("PSI class");

    let o = &mut record.outcome;
    o.status = row.text("Outcome status");
    o.discharge_date = row.text("Discharge date");
    o.days_in_hospital = row.opt_u32("Days in hospital");
    o.icu_admission = row.opt_bool("ICU admission");
    o.notes = row.text("Outcome notes");

    record
}

/// Writes `records` as a CSV file with the fixed header row.
pub fn write_csv(path: &Path, records: &[PatientRecord]) -> RegistryResult<()> {
    let file = File::create(path).map_err(RegistryError::FileWrite)?;
    let mut writer = csv::Writer::from_writer(file);

    writer.write_record(export_headers())?;
    for record in records {
        writer.write_record(export_row(record))?;
    }
    writer.flush().map_err(RegistryError::FileWrite)?;
    Ok(())
}

/// Reads a CSV file back into records. The first row is the header; columns
/// are matched by exact header string.
pub fn read_csv(path: &Path) -> RegistryResult<Vec<PatientRecord>> {
    let file = File::open(path).map_err(RegistryError::FileRead)?;
    let mut reader = csv::Reader::from_reader(file);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(RegistryError::SpreadsheetMissingHeader);
    }
    let header_index: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(index, header)| (header.to_string(), index))
        .collect();

    let mut records = Vec::new();
    for result in reader.records() {
        let cells = result?;
        records.push(import_row(&Row {
            header_index: &header_index,
            cells: &cells,
        }));
    }
    Ok(records)
}
