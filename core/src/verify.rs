//! The verifier: a one-way state machine from `INIT` to `PASS`, collecting
//! every error encountered at the deepest reachable stage rather than
//! stopping at the first (§4.8). A later gate is only attempted once the
//! gate before it is clean, because a dirty layout or an unparsed manifest
//! leaves nothing safe to check further -- but within any one gate, every
//! violation is reported.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{sort_errors, ErrorCode, ShardError};
use crate::manifest::Manifest;
use crate::merkle::{compute_merkle_root, MerkleLimits, MerkleSuite};
use crate::shard::read_shard_layout;
use crate::sign::SignatureSuite;
use crate::table::{read_table, Value, CLAIMS_SCHEMA, ENTITIES_SCHEMA, PROVENANCE_SCHEMA, SPANS_SCHEMA};

/// How far a verification run got before it either reached [`Self::Pass`]
/// or stalled at the first gate with an unresolved error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VerifyState {
    Init,
    LayoutOk,
    ManifestOk,
    SigOk,
    MerkleOk,
    TablesOk,
    RefsOk,
    BytesOk,
    Pass,
}

/// The outcome of one verification run: the deepest state reached and every
/// error collected along the way.
#[derive(Debug)]
pub struct VerifyReport {
    pub state: VerifyState,
    pub errors: Vec<ShardError>,
}

impl VerifyReport {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.state == VerifyState::Pass && self.errors.is_empty()
    }
}

/// Run the full verification state machine against `shard_dir`.
///
/// `trusted_public_key` is the key the caller expects to have signed this
/// shard. Per §4.8 step 4, the signature is checked against the embedded
/// `sig/publisher.pub` *first*; only once that signature is valid is the
/// embedded key compared byte for byte against `trusted_public_key` (a
/// shard's own embedded key is not itself a root of trust, per §4.4, but
/// that trust distrust is the second check, not the first).
///
/// # Errors
///
/// This function itself only returns `Err` for conditions outside the
/// state machine's own error vocabulary (there are none in this
/// implementation); ordinary verification failures are reported inside a
/// successfully returned [`VerifyReport`].
pub fn verify(
    shard_dir: &Path,
    trusted_public_key: &[u8],
    limits: &MerkleLimits,
) -> Result<VerifyReport, ShardError> {
    tracing::debug!(shard_dir = %shard_dir.display(), "verifying shard");

    let contents = match read_shard_layout(shard_dir) {
        Ok(c) => c,
        Err(mut errors) => {
            sort_errors(&mut errors);
            tracing::warn!(errors = errors.len(), "layout check failed");
            return Ok(VerifyReport { state: VerifyState::Init, errors });
        }
    };

    let manifest_value = match Manifest::parse_value(&contents.manifest_bytes) {
        Ok(v) => v,
        Err(e) => return Ok(VerifyReport { state: VerifyState::LayoutOk, errors: vec![e] }),
    };
    let manifest = match Manifest::from_value(&manifest_value) {
        Ok(m) => m,
        Err(mut errors) => {
            sort_errors(&mut errors);
            return Ok(VerifyReport { state: VerifyState::LayoutOk, errors });
        }
    };

    let suite = match SignatureSuite::detect(manifest.suite.as_deref(), contents.public_key_bytes.len()) {
        Ok(s) => s,
        Err(e) => return Ok(VerifyReport { state: VerifyState::ManifestOk, errors: vec![e] }),
    };

    if let Err(e) = suite.verify(&contents.public_key_bytes, &contents.manifest_bytes, &contents.signature_bytes) {
        return Ok(VerifyReport { state: VerifyState::ManifestOk, errors: vec![e] });
    }

    if contents.public_key_bytes != trusted_public_key {
        return Ok(VerifyReport {
            state: VerifyState::ManifestOk,
            errors: vec![ShardError::shard(
                ErrorCode::ESigInvalid,
                "embedded publisher key does not match the trusted key supplied by the caller",
            )],
        });
    }

    let merkle_suite = match suite {
        SignatureSuite::Ed25519Legacy => MerkleSuite::Legacy,
        SignatureSuite::PostQuantum => MerkleSuite::PostQuantum,
    };
    let computed = match compute_merkle_root(shard_dir, merkle_suite, limits) {
        Ok(c) => c,
        Err(e) => return Ok(VerifyReport { state: VerifyState::SigOk, errors: vec![e] }),
    };
    if computed.root_hex != manifest.integrity.merkle_root {
        return Ok(VerifyReport {
            state: VerifyState::SigOk,
            errors: vec![ShardError::shard(
                ErrorCode::EMerkleMismatch,
                format!(
                    "computed root {} does not match manifest root {}",
                    computed.root_hex, manifest.integrity.merkle_root
                ),
            )],
        });
    }
    let expected_shard_id = format!("shard_blake3_{}", computed.root_hex);
    if manifest.shard_id != expected_shard_id {
        return Ok(VerifyReport {
            state: VerifyState::SigOk,
            errors: vec![ShardError::shard(
                ErrorCode::EMerkleMismatch,
                format!("manifest shard_id '{}' does not derive from its own merkle root", manifest.shard_id),
            )],
        });
    }

    let mut table_errors = Vec::new();
    let entities = read_table(&contents.entities_bytes, &ENTITIES_SCHEMA).map_err(|e| table_errors.push(e)).ok();
    let claims = read_table(&contents.claims_bytes, &CLAIMS_SCHEMA).map_err(|e| table_errors.push(e)).ok();
    let provenance = read_table(&contents.provenance_bytes, &PROVENANCE_SCHEMA).map_err(|e| table_errors.push(e)).ok();
    let spans = read_table(&contents.spans_bytes, &SPANS_SCHEMA).map_err(|e| table_errors.push(e)).ok();
    if !table_errors.is_empty() {
        sort_errors(&mut table_errors);
        return Ok(VerifyReport { state: VerifyState::MerkleOk, errors: table_errors });
    }
    let entities = entities.unwrap();
    let claims = claims.unwrap();
    let provenance = provenance.unwrap();
    let spans = spans.unwrap();

    let mut ref_errors = Vec::new();
    let entity_ids: BTreeSet<&str> = entities
        .iter()
        .map(|row| str_col(row, 0, "entities"))
        .collect();
    let claim_ids: BTreeSet<&str> = claims.iter().map(|row| str_col(row, 0, "claims")).collect();
    let source_hashes: BTreeSet<&str> = manifest.sources.iter().map(|s| s.sha256.as_str()).collect();

    for (i, row) in claims.iter().enumerate() {
        let subject = str_col(row, 1, "claims");
        if !entity_ids.contains(subject) {
            ref_errors.push(ShardError::at_row(ErrorCode::ERefOrphan, "claims", i, format!("subject '{subject}' has no entity row")));
        }
        let object_type = str_col(row, 4, "claims");
        if object_type == "entity" {
            let object = str_col(row, 3, "claims");
            if !entity_ids.contains(object) {
                ref_errors.push(ShardError::at_row(ErrorCode::ERefOrphan, "claims", i, format!("object '{object}' has no entity row")));
            }
        }
    }
    for (i, row) in provenance.iter().enumerate() {
        let claim = str_col(row, 1, "provenance");
        if !claim_ids.contains(claim) {
            ref_errors.push(ShardError::at_row(ErrorCode::ERefOrphan, "provenance", i, format!("claim_id '{claim}' has no claim row")));
        }
        let hash = str_col(row, 2, "provenance");
        if !source_hashes.contains(hash) {
            ref_errors.push(ShardError::at_row(ErrorCode::ERefOrphan, "provenance", i, format!("source_hash '{hash}' is not in manifest sources")));
        }
    }
    for (i, row) in spans.iter().enumerate() {
        let hash = str_col(row, 1, "spans");
        if !source_hashes.contains(hash) {
            ref_errors.push(ShardError::at_row(ErrorCode::ERefOrphan, "spans", i, format!("source_hash '{hash}' is not in manifest sources")));
        }
    }
    if !ref_errors.is_empty() {
        sort_errors(&mut ref_errors);
        return Ok(VerifyReport { state: VerifyState::TablesOk, errors: ref_errors });
    }

    let content_by_hash: BTreeMap<&str, &[u8]> = manifest
        .sources
        .iter()
        .filter_map(|s| contents.content_files.get(&s.path).map(|bytes| (s.sha256.as_str(), bytes.as_slice())))
        .collect();

    let mut byte_errors = Vec::new();
    for (i, row) in spans.iter().enumerate() {
        let hash = str_col(row, 1, "spans");
        let start = u64_col(row, 2);
        let end = u64_col(row, 3);
        let text = str_col(row, 4, "spans");
        match slice_and_compare(&content_by_hash, hash, start, end, text) {
            Ok(()) => {}
            Err(msg) => byte_errors.push(ShardError::at_row(ErrorCode::ERefSource, "spans", i, msg)),
        }
    }
    for (i, row) in provenance.iter().enumerate() {
        let hash = str_col(row, 2, "provenance");
        let start = u64_col(row, 3);
        let end = u64_col(row, 4);
        if let Err(msg) = bounds_only(&content_by_hash, hash, start, end) {
            byte_errors.push(ShardError::at_row(ErrorCode::ERefSource, "provenance", i, msg));
        }
    }
    if !byte_errors.is_empty() {
        sort_errors(&mut byte_errors);
        tracing::warn!(errors = byte_errors.len(), "byte-range fidelity check failed");
        return Ok(VerifyReport { state: VerifyState::RefsOk, errors: byte_errors });
    }

    tracing::debug!(shard_dir = %shard_dir.display(), "shard passed");
    Ok(VerifyReport { state: VerifyState::Pass, errors: Vec::new() })
}

fn str_col<'a>(row: &'a [Value], index: usize, table: &str) -> &'a str {
    match &row[index] {
        Value::Str(s) => s.as_str(),
        Value::U64(_) => panic!("{table}: column {index} expected string"),
    }
}

fn u64_col(row: &[Value], index: usize) -> u64 {
    match &row[index] {
        Value::U64(n) => *n,
        Value::Str(_) => panic!("column {index} expected u64"),
    }
}

fn slice_and_compare(
    content_by_hash: &BTreeMap<&str, &[u8]>,
    hash: &str,
    start: u64,
    end: u64,
    text: &str,
) -> Result<(), String> {
    let bytes = content_by_hash.get(hash).ok_or_else(|| format!("source_hash '{hash}' has no readable content file"))?;
    let start = usize::try_from(start).map_err(|_| "byte_start overflows usize".to_string())?;
    let end = usize::try_from(end).map_err(|_| "byte_end overflows usize".to_string())?;
    if start > end || end > bytes.len() {
        return Err(format!("byte range {start}..{end} out of bounds for a {}-byte file", bytes.len()));
    }
    let decoded = std::str::from_utf8(&bytes[start..end]).map_err(|_| "byte range is not valid UTF-8".to_string())?;
    if decoded != text {
        return Err("byte range does not decode to the recorded evidence text".to_string());
    }
    Ok(())
}

fn bounds_only(content_by_hash: &BTreeMap<&str, &[u8]>, hash: &str, start: u64, end: u64) -> Result<(), String> {
    let bytes = content_by_hash.get(hash).ok_or_else(|| format!("source_hash '{hash}' has no readable content file"))?;
    let start = usize::try_from(start).map_err(|_| "byte_start overflows usize".to_string())?;
    let end = usize::try_from(end).map_err(|_| "byte_end overflows usize".to_string())?;
    if start > end || end > bytes.len() {
        return Err(format!("byte range {start}..{end} out of bounds for a {}-byte file", bytes.len()));
    }
    Ok(())
}
