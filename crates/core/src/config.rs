//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and passed into core
//! services. The intent is to avoid reading process-wide environment variables
//! during operations, which leads to inconsistent behaviour in multi-threaded
//! runtimes and test harnesses.

use crate::error::{RegistryError, RegistryResult};
use std::path::{Path, PathBuf};

/// Default study-code prefix for newly admitted patients.
pub const DEFAULT_STUDY_CODE_PREFIX: &str = "CAP";

/// Subdirectory of the data dir holding patient record storage.
pub const RECORDS_DIR_NAME: &str = "records";

/// Subdirectory of the data dir holding snapshot blobs and metadata.
pub const SNAPSHOTS_DIR_NAME: &str = "snapshots";

/// File name of the on-disk settings cache.
pub const SETTINGS_CACHE_FILE: &str = "settings-cache.yaml";

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    study_code_prefix: String,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidInput` if `study_code_prefix` is empty
    /// or contains characters that cannot appear in a study code (study codes
    /// are the prefix plus a zero-padded counter, so digits in the prefix
    /// would make the numeric suffix ambiguous).
    pub fn new(data_dir: PathBuf, study_code_prefix: String) -> RegistryResult<Self> {
        let prefix = study_code_prefix.trim();
        if prefix.is_empty() {
            return Err(RegistryError::InvalidInput(
                "study_code_prefix cannot be empty".into(),
            ));
        }
        if prefix.chars().any(|c| c.is_ascii_digit()) {
            return Err(RegistryError::InvalidInput(
                "study_code_prefix cannot contain digits".into(),
            ));
        }

        Ok(Self {
            data_dir,
            study_code_prefix: prefix.to_string(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn records_dir(&self) -> PathBuf {
        self.data_dir.join(RECORDS_DIR_NAME)
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOTS_DIR_NAME)
    }

    pub fn settings_cache_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_CACHE_FILE)
    }

    pub fn study_code_prefix(&self) -> &str {
        &self.study_code_prefix
    }
}

/// Parse the study-code prefix from an optional value (e.g. an environment
/// override read by the binary at startup).
///
/// `None` or an empty/whitespace value falls back to
/// [`DEFAULT_STUDY_CODE_PREFIX`].
pub fn study_code_prefix_from_env_value(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_STUDY_CODE_PREFIX.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_empty_prefix() {
        let result = CoreConfig::new(PathBuf::from("/data"), "  ".into());
        assert!(matches!(result, Err(RegistryError::InvalidInput(_))));
    }

    #[test]
    fn test_config_rejects_digit_prefix() {
        let result = CoreConfig::new(PathBuf::from("/data"), "CAP2".into());
        assert!(matches!(result, Err(RegistryError::InvalidInput(_))));
    }

    #[test]
    fn test_config_paths() {
        let cfg = CoreConfig::new(PathBuf::from("/data"), "CAP".into()).unwrap();
        assert_eq!(cfg.records_dir(), PathBuf::from("/data/records"));
        assert_eq!(cfg.snapshots_dir(), PathBuf::from("/data/snapshots"));
        assert_eq!(cfg.study_code_prefix(), "CAP");
    }

    #[test]
    fn test_prefix_from_env_value() {
        assert_eq!(study_code_prefix_from_env_value(None), "CAP");
        assert_eq!(study_code_prefix_from_env_value(Some("  ".into())), "CAP");
        assert_eq!(
            study_code_prefix_from_env_value(Some("PNEU".into())),
            "PNEU"
        );
    }
}
