//! Snapshot blob encoding and decoding.
//!
//! A snapshot blob is pretty-printed UTF-8 JSON, human-auditable by design.
//! The current layout is a versioned envelope:
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "patients": [ ... ]
//! }
//! ```
//!
//! Earlier snapshots were a bare top-level array with no version tag; the
//! decoder still accepts that layout and migrates it on read. An envelope
//! with an unrecognised version is rejected outright rather than misread as
//! the current schema.
//!
//! Audit timestamps are carried as RFC 3339 strings (or null). Decoded
//! timestamps are display-only: a record re-admitted through the restore
//! executor always receives fresh audit timestamps from the store.

use crate::error::{RegistryError, RegistryResult};
use crate::record::PatientRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version written by this build.
pub const SNAPSHOT_SCHEMA_VERSION: u64 = 1;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotEnvelope {
    schema_version: u64,
    patients: Vec<PatientRecord>,
}

/// Encodes a record list into a snapshot blob.
///
/// # Errors
///
/// Returns `RegistryError::Serialization` if encoding fails (not expected for
/// our own data structs).
pub fn serialize(records: &[PatientRecord]) -> RegistryResult<Vec<u8>> {
    let envelope = SnapshotEnvelope {
        schema_version: SNAPSHOT_SCHEMA_VERSION,
        patients: records.to_vec(),
    };
    serde_json::to_vec_pretty(&envelope).map_err(RegistryError::Serialization)
}

/// Decodes a snapshot blob, migrating legacy layouts where possible.
///
/// # Errors
///
/// - `RegistryError::SnapshotMalformed` if the blob is not valid JSON or its
///   records do not deserialize; fatal to the restore in progress;
/// - `RegistryError::SnapshotSchemaVersion` if the envelope declares a
///   version this build does not understand.
pub fn deserialize(bytes: &[u8]) -> RegistryResult<Vec<PatientRecord>> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(RegistryError::SnapshotMalformed)?;

    match value {
        // Legacy layout: bare array of records, no version tag.
        Value::Array(_) => {
            serde_json::from_value(value).map_err(RegistryError::SnapshotMalformed)
        }
        Value::Object(_) => {
            let declared = value
                .get("schemaVersion")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            if declared != SNAPSHOT_SCHEMA_VERSION {
                return Err(RegistryError::SnapshotSchemaVersion(declared));
            }
            let envelope: SnapshotEnvelope =
                serde_json::from_value(value).map_err(RegistryError::SnapshotMalformed)?;
            Ok(envelope.patients)
        }
        // Scalar top level: not a layout this registry ever wrote. Decoding
        // as a record list yields the type error to report.
        _ => serde_json::from_value(value).map_err(RegistryError::SnapshotMalformed),
    }
}
