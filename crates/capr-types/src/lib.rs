//! Shared leaf types for the CAPR registry.
//!
//! This crate contains small validated types used across the workspace:
//! text that is guaranteed non-empty, and the canonical record identifier
//! with its sharded storage-path derivation. It deliberately has no
//! knowledge of the clinical data model or any storage backend.

mod record_id;

pub use record_id::{RecordId, RecordIdError};

/// Errors from validated text construction.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    #[error("text cannot be empty")]
    Empty,
}

/// Text guaranteed to hold at least one non-whitespace character, trimmed at
/// construction.
///
/// Used wherever a user-supplied name or label must not be blank (snapshot
/// display names, for instance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Trims `input` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns `TextError::Empty` if nothing remains after trimming.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_empty_text_trims_input() {
        let text = NonEmptyText::new("  ward 3  ").unwrap();
        assert_eq!(text.as_str(), "ward 3");
    }

    #[test]
    fn test_non_empty_text_rejects_whitespace() {
        assert!(matches!(NonEmptyText::new("   "), Err(TextError::Empty)));
        assert!(matches!(NonEmptyText::new(""), Err(TextError::Empty)));
    }
}
