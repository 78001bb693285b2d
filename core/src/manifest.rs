//! The manifest: the one normative JSON document a shard signs.
//!
//! §3.2 fixes the field table exactly. [`Manifest`] mirrors it one-to-one;
//! [`Manifest::to_canonical_bytes`] is the only path that produces the byte
//! sequence a signature ever covers, and [`validate_schema`] is the only
//! path that decides whether an on-disk manifest is well-formed -- both
//! collect every problem rather than stopping at the first.

use serde::{Deserialize, Serialize};

use crate::canon::canonical_json_bytes;
use crate::error::{ErrorCode, ShardError};

pub const SPEC_VERSION: &str = "shard/1";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Metadata {
    pub title: String,
    pub namespace: String,
    /// RFC 3339 timestamp, fixed before Merkle computation (§4.7 step 6).
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Publisher {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct License {
    pub spdx: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceEntry {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Integrity {
    pub algorithm: String,
    pub merkle_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Statistics {
    pub entities: u64,
    pub claims: u64,
}

/// The manifest document, field-for-field per §3.2.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    pub spec_version: String,
    pub shard_id: String,
    pub metadata: Metadata,
    pub publisher: Publisher,
    pub license: License,
    pub sources: Vec<SourceEntry>,
    pub integrity: Integrity,
    pub statistics: Statistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,
    /// Present iff the extensions directory contains at least one file
    /// (§3.1 hash-stability invariant: empty extensions are invisible).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Vec<String>>,
}

impl Manifest {
    /// Serialize to the exact canonical JSON byte sequence a signature covers.
    ///
    /// # Errors
    ///
    /// Never fails in practice (every field is already an integer or
    /// string), but returns [`crate::canon::CanonError`] if that invariant
    /// is ever violated by a future field addition.
    pub fn to_canonical_bytes(&self) -> Result<Vec<u8>, crate::canon::CanonError> {
        let value = serde_json::to_value(self).expect("Manifest always serializes to JSON");
        canonical_json_bytes(&value)
    }

    /// Parse raw manifest bytes as UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::EManifestSyntax`] if the bytes are not valid UTF-8 JSON.
    pub fn parse_value(bytes: &[u8]) -> Result<serde_json::Value, ShardError> {
        let text = std::str::from_utf8(bytes).map_err(|e| {
            ShardError::shard(ErrorCode::EManifestSyntax, format!("manifest is not valid UTF-8: {e}"))
        })?;
        serde_json::from_str(text).map_err(|e| {
            ShardError::shard(ErrorCode::EManifestSyntax, format!("manifest is not valid JSON: {e}"))
        })
    }

    /// Validate `value` against the §3.2 schema, collecting every problem
    /// instead of stopping at the first, then construct a [`Manifest`].
    ///
    /// # Errors
    ///
    /// A non-empty `Vec<ShardError>`, every entry tagged
    /// [`ErrorCode::EManifestSchema`], if any required field is missing or
    /// the wrong type.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, Vec<ShardError>> {
        let errors = validate_schema(value);
        if !errors.is_empty() {
            return Err(errors);
        }
        serde_json::from_value(value.clone()).map_err(|e| {
            vec![ShardError::shard(
                ErrorCode::EManifestSchema,
                format!("manifest failed structural validation: {e}"),
            )]
        })
    }
}

fn err(msg: impl Into<String>) -> ShardError {
    ShardError::shard(ErrorCode::EManifestSchema, msg)
}

/// Check every required field's presence and type, per §3.2's table,
/// returning every violation found rather than the first.
#[must_use]
pub fn validate_schema(value: &serde_json::Value) -> Vec<ShardError> {
    let mut errors = Vec::new();
    let Some(obj) = value.as_object() else {
        errors.push(err("manifest root is not a JSON object"));
        return errors;
    };

    require_string(obj, "spec_version", &mut errors);
    require_string(obj, "shard_id", &mut errors);

    match obj.get("metadata").and_then(|v| v.as_object()) {
        Some(meta) => {
            require_string(meta, "title", &mut errors);
            require_string(meta, "namespace", &mut errors);
            require_string(meta, "created_at", &mut errors);
        }
        None => errors.push(err("missing or non-object field: metadata")),
    }

    match obj.get("publisher").and_then(|v| v.as_object()) {
        Some(publisher) => {
            require_string(publisher, "id", &mut errors);
            require_string(publisher, "name", &mut errors);
        }
        None => errors.push(err("missing or non-object field: publisher")),
    }

    match obj.get("license").and_then(|v| v.as_object()) {
        Some(license) => require_string(license, "spdx", &mut errors),
        None => errors.push(err("missing or non-object field: license")),
    }

    match obj.get("sources").and_then(|v| v.as_array()) {
        Some(sources) => {
            for (i, entry) in sources.iter().enumerate() {
                match entry.as_object() {
                    Some(o) => {
                        require_string(o, "path", &mut errors);
                        require_string(o, "sha256", &mut errors);
                    }
                    None => errors.push(err(format!("sources[{i}] is not an object"))),
                }
            }
        }
        None => errors.push(err("missing or non-array field: sources")),
    }

    match obj.get("integrity").and_then(|v| v.as_object()) {
        Some(integrity) => {
            require_string(integrity, "algorithm", &mut errors);
            require_string(integrity, "merkle_root", &mut errors);
        }
        None => errors.push(err("missing or non-object field: integrity")),
    }

    match obj.get("statistics").and_then(|v| v.as_object()) {
        Some(stats) => {
            require_non_negative_int(stats, "entities", &mut errors);
            require_non_negative_int(stats, "claims", &mut errors);
        }
        None => errors.push(err("missing or non-object field: statistics")),
    }

    if let Some(suite) = obj.get("suite") {
        if !suite.is_string() {
            errors.push(err("suite must be a string when present"));
        }
    }

    if let Some(extensions) = obj.get("extensions") {
        match extensions.as_array() {
            Some(list) if list.is_empty() => {
                errors.push(err("extensions must be omitted, not an empty array, when there are none"));
            }
            Some(list) => {
                for (i, item) in list.iter().enumerate() {
                    if !item.is_string() {
                        errors.push(err(format!("extensions[{i}] must be a string")));
                    }
                }
            }
            None => errors.push(err("extensions must be an array when present")),
        }
    }

    errors
}

fn require_string(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    errors: &mut Vec<ShardError>,
) {
    match obj.get(field) {
        Some(v) if v.is_string() => {}
        Some(_) => errors.push(err(format!("field '{field}' must be a string"))),
        None => errors.push(err(format!("missing required field '{field}'"))),
    }
}

fn require_non_negative_int(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    errors: &mut Vec<ShardError>,
) {
    match obj.get(field) {
        Some(v) if v.as_u64().is_some() => {}
        Some(_) => errors.push(err(format!("field '{field}' must be a non-negative integer"))),
        None => errors.push(err(format!("missing required field '{field}'"))),
    }
}
