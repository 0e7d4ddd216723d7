//! Canonical record identifiers.
//!
//! Every persisted patient record and snapshot is addressed by a `RecordId`:
//! a UUID in the registry's canonical form (32 lowercase hex characters, no
//! hyphens). Keeping the representation canonical means path derivation is
//! deterministic and externally supplied identifiers are validated exactly
//! once, at the boundary.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use uuid::Uuid;

/// Errors from parsing record identifiers.
#[derive(Debug, thiserror::Error)]
pub enum RecordIdError {
    /// The input was not 32 lowercase hex characters.
    #[error("record id must be 32 lowercase hex characters without hyphens, got: '{0}'")]
    InvalidInput(String),
}

/// The registry's canonical record identifier (32 lowercase hex characters).
///
/// Once constructed, the contained UUID is guaranteed to be in canonical form.
/// Use [`RecordId::new`] when allocating an identifier for a new record and
/// [`RecordId::parse`] when accepting one from outside the core (CLI input,
/// an imported snapshot, a directory name).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a fresh identifier (RFC 4122 version 4).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses an identifier that must already be canonical.
    ///
    /// Other common UUID forms (hyphenated, uppercase) are **not** normalised;
    /// callers must provide the canonical representation.
    ///
    /// # Errors
    ///
    /// Returns [`RecordIdError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> Result<Self, RecordIdError> {
        if !Self::is_canonical(input) {
            return Err(RecordIdError::InvalidInput(input.to_string()));
        }
        // is_canonical guarantees 32 valid hex characters, so this cannot fail.
        let uuid = Uuid::parse_str(input).map_err(|_| RecordIdError::InvalidInput(input.into()))?;
        Ok(Self(uuid))
    }

    /// Returns true if `input` is in canonical form: exactly 32 bytes of
    /// lowercase hex.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 32
            && input
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    /// Derives the sharded storage directory for this identifier.
    ///
    /// The layout is `<base>/<s1>/<s2>/<id>` where `s1` and `s2` are the first
    /// two pairs of hex characters, keeping directory fan-out manageable as
    /// the registry grows.
    pub fn sharded_dir(&self, base: &Path) -> PathBuf {
        let s = self.to_string();
        base.join(&s[0..2]).join(&s[2..4]).join(&s)
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for RecordId {
    type Err = RecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for RecordId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RecordId::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_canonical() {
        let id = RecordId::new();
        assert!(RecordId::is_canonical(&id.to_string()));
    }

    #[test]
    fn test_parse_round_trip() {
        let id = RecordId::new();
        let parsed = RecordId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_parse_rejects_non_canonical() {
        assert!(RecordId::parse("not-a-uuid").is_err());
        // Hyphenated and uppercase forms are rejected, not normalised.
        assert!(RecordId::parse("550e8400-e29b-41d4-a716-446655440000").is_err());
        assert!(RecordId::parse("550E8400E29B41D4A716446655440000").is_err());
    }

    #[test]
    fn test_sharded_dir_layout() {
        let id = RecordId::parse("550e8400e29b41d4a716446655440000").unwrap();
        let dir = id.sharded_dir(Path::new("/data"));
        assert_eq!(
            dir,
            PathBuf::from("/data/55/0e/550e8400e29b41d4a716446655440000")
        );
    }
}
