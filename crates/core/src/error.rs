//! Registry error types.
//!
//! One error enum for the whole core, with a variant per failure site so that
//! callers (and log lines) can tell exactly which operation failed without
//! string-matching messages.

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("failed to create storage directory: {0}")]
    StorageDirCreation(std::io::Error),
    #[error("failed to create record directory: {0}")]
    RecordDirCreation(std::io::Error),
    #[error("failed to write record file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to read record file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to delete record: {0}")]
    FileDelete(std::io::Error),
    #[error("failed to serialize record: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize record: {0}")]
    Deserialization(serde_json::Error),
    #[error("failed to serialize settings cache: {0}")]
    YamlSerialization(serde_yaml::Error),
    #[error("failed to deserialize settings cache: {0}")]
    YamlDeserialization(serde_yaml::Error),

    #[error("study code counter exhausted; cannot allocate past the maximum")]
    StudyCodeExhausted,

    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("record has no identifier; it has not been persisted")]
    RecordNotPersisted,

    #[error("failed to write snapshot blob: {0}")]
    SnapshotBlobWrite(std::io::Error),
    #[error("failed to read snapshot blob: {0}")]
    SnapshotBlobRead(std::io::Error),
    #[error("failed to delete snapshot blob: {0}")]
    SnapshotBlobDelete(std::io::Error),
    #[error("snapshot blob is not valid JSON: {0}")]
    SnapshotMalformed(serde_json::Error),
    #[error("snapshot schema version {0} is not supported")]
    SnapshotSchemaVersion(u64),
    #[error("snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] csv::Error),
    #[error("spreadsheet has no header row")]
    SpreadsheetMissingHeader,

    #[error("invalid record id: {0}")]
    RecordId(#[from] capr_types::RecordIdError),
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
