//! Study code allocation.
//!
//! Study codes are a fixed textual prefix plus a zero-padded three-digit
//! counter ("CAP007"). Allocation is a pure function of the codes currently
//! in use and the count requested: scan every existing code, extract the
//! numeric suffix of any code matching the prefix case-insensitively, take
//! the maximum, and hand out the next `n` values in order.
//!
//! Nothing is reserved: callers must persist promptly, and two concurrent
//! allocations can compute the same maximum. That race is accepted; this
//! scan is the only mechanism preventing collisions for newly created
//! records, and codes are never reused or reassigned once persisted.

use crate::error::{RegistryError, RegistryResult};
use crate::record::PatientRecord;

/// Width of the zero-padded numeric suffix.
const CODE_SUFFIX_WIDTH: usize = 3;

/// Extracts the numeric suffix of `code` if it matches `prefix`
/// case-insensitively and the remainder is a plain number.
///
/// Study codes are free text in the store, so `code` may be anything,
/// including non-ASCII; codes without a char boundary at the prefix length
/// cannot match and are skipped.
fn numeric_suffix(code: &str, prefix: &str) -> Option<u32> {
    let code = code.trim();
    if code.len() <= prefix.len() {
        return None;
    }
    let head = code.get(..prefix.len())?;
    if !head.eq_ignore_ascii_case(prefix) {
        return None;
    }
    code[prefix.len()..].parse::<u32>().ok()
}

/// Formats a study code from its counter value.
pub fn format_study_code(prefix: &str, n: u32) -> String {
    format!("{prefix}{n:0width$}", width = CODE_SUFFIX_WIDTH)
}

/// Allocates `count` fresh study codes given the codes already in use.
///
/// Codes not matching the prefix pattern are ignored. An empty code set
/// starts at 1. The returned codes are strictly increasing in order.
///
/// # Errors
///
/// Returns `RegistryError::StudyCodeExhausted` if the counter would pass
/// `u32::MAX`; wrapping around would reassign codes already in use.
pub fn allocate_codes<'a>(
    existing_codes: impl IntoIterator<Item = &'a str>,
    prefix: &str,
    count: usize,
) -> RegistryResult<Vec<String>> {
    let max = existing_codes
        .into_iter()
        .filter_map(|code| numeric_suffix(code, prefix))
        .max()
        .unwrap_or(0);

    (1..=count as u32)
        .map(|offset| {
            max.checked_add(offset)
                .map(|n| format_study_code(prefix, n))
                .ok_or(RegistryError::StudyCodeExhausted)
        })
        .collect()
}

/// Convenience wrapper: allocates against the study codes of the
/// authoritative record set.
pub fn allocate_codes_for_records(
    records: &[PatientRecord],
    prefix: &str,
    count: usize,
) -> RegistryResult<Vec<String>> {
    allocate_codes(
        records.iter().map(|r| r.study_code.as_str()),
        prefix,
        count,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_continues_from_max() {
        let codes = ["CAP001", "CAP003", "CAP007"];
        let allocated = allocate_codes(codes, "CAP", 3).unwrap();
        assert_eq!(allocated, vec!["CAP008", "CAP009", "CAP010"]);
    }

    #[test]
    fn test_empty_set_starts_at_one() {
        let allocated = allocate_codes([], "CAP", 2).unwrap();
        assert_eq!(allocated, vec!["CAP001", "CAP002"]);
    }

    #[test]
    fn test_zero_count_yields_empty() {
        let codes = ["CAP005"];
        assert!(allocate_codes(codes, "CAP", 0).unwrap().is_empty());
    }

    #[test]
    fn test_prefix_match_is_case_insensitive() {
        let codes = ["cap009", "CAP002"];
        assert_eq!(allocate_codes(codes, "CAP", 1).unwrap(), vec!["CAP010"]);
    }

    #[test]
    fn test_foreign_codes_are_ignored() {
        let codes = ["CAP004", "HX-900", "", "CAPX12", "OTHER100"];
        assert_eq!(allocate_codes(codes, "CAP", 1).unwrap(), vec!["CAP005"]);
    }

    #[test]
    fn test_non_ascii_codes_are_skipped_not_panicked_on() {
        // A multi-byte character straddling the prefix byte length must not
        // split the string mid-character.
        let codes = ["ab€cd", "Δ12", "CAP002"];
        assert_eq!(allocate_codes(codes, "CAP", 1).unwrap(), vec!["CAP003"]);
    }

    #[test]
    fn test_counter_exhaustion_is_an_error() {
        let codes = ["CAP4294967295"];
        assert!(matches!(
            allocate_codes(codes, "CAP", 1),
            Err(RegistryError::StudyCodeExhausted)
        ));
    }

    #[test]
    fn test_padding_grows_beyond_three_digits() {
        let codes = ["CAP999"];
        assert_eq!(
            allocate_codes(codes, "CAP", 2).unwrap(),
            vec!["CAP1000", "CAP1001"]
        );
    }

    #[test]
    fn test_allocate_for_records() {
        let records = vec![
            PatientRecord {
                study_code: "CAP012".into(),
                ..Default::default()
            },
            PatientRecord {
                study_code: String::new(),
                ..Default::default()
            },
        ];
        assert_eq!(
            allocate_codes_for_records(&records, "CAP", 1).unwrap(),
            vec!["CAP013"]
        );
    }
}
