//! The compiler pipeline: candidate stream → tables → Merkle → manifest →
//! sign → self-verify (§4.7).
//!
//! The compiler does not accumulate errors the way the verifier does --
//! §7's propagation policy has it report the first fatal failure and clean
//! up. Only the final self-verify step reuses the verifier's accumulating
//! behavior, because that is literally a call into [`crate::verify::verify`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use crate::error::{ErrorCode, ShardError};
use crate::identity::{claim_id, entity_id, provenance_id, span_id, ObjectType};
use crate::manifest::{Integrity, License, Manifest, Metadata, Publisher, SourceEntry, Statistics, SPEC_VERSION};
use crate::merkle::{compute_merkle_root, MerkleLimits, MerkleSuite};
use crate::shard::{write_shard_dir, ShardWriteInput};
use crate::sign::{SignatureSuite, SigningKeypair};
use crate::table::{write_table, Row, Value, CLAIMS_SCHEMA, ENTITIES_SCHEMA, PROVENANCE_SCHEMA, SPANS_SCHEMA};
use crate::verify::verify;

/// The compiler's fixed tier policy (§9 open question: accepted set is a
/// build-time compiler policy). This implementation accepts the full
/// `0..=3` range named by the claims table schema (§3.3).
pub const MIN_TIER: u8 = 0;
pub const MAX_TIER: u8 = 3;

/// Entity type recorded when a candidate does not name one explicitly.
pub const DEFAULT_ENTITY_TYPE: &str = "unspecified";

/// One record from the candidate stream (§6.3).
#[derive(Debug, Clone)]
pub struct Candidate {
    pub namespace: String,
    pub subject_label: String,
    /// Entity type recorded for the subject entity row, if known.
    pub subject_type: Option<String>,
    pub predicate: String,
    pub object: String,
    pub object_type: ObjectType,
    /// Entity type recorded for the object entity row, if `object_type` is
    /// [`ObjectType::Entity`]; ignored otherwise.
    pub object_entity_type: Option<String>,
    pub tier: u8,
    pub evidence_text: String,
    pub source_hash: String,
    pub byte_start: u64,
    pub byte_end: u64,
}

/// A source byte stream to be sealed under `content/`.
#[derive(Debug, Clone)]
pub struct ContentFile {
    pub relpath: String,
    pub bytes: Vec<u8>,
}

/// Shard-level metadata supplied alongside the candidate stream (§6.3).
#[derive(Debug, Clone)]
pub struct ShardMetadata {
    pub title: String,
    pub namespace: String,
    pub publisher_id: String,
    pub publisher_name: String,
    pub license_spdx: String,
    /// RFC 3339 timestamp. `None` ⇒ the compiler fixes "now" before Merkle
    /// computation, per §4.7 step 6.
    pub created_at: Option<String>,
}

/// Everything the compiler needs for one `compile()` call.
pub struct CompileInput {
    pub candidates: Vec<Candidate>,
    pub content_files: Vec<ContentFile>,
    pub metadata: ShardMetadata,
    /// The Merkle suite and signature suite are paired (§4.3); this key
    /// alone determines both.
    pub signing_key: SigningKeypair,
    pub out_dir: PathBuf,
    pub table_compression: bool,
    pub merkle_limits: MerkleLimits,
}

fn fatal(code: ErrorCode, msg: impl Into<String>) -> ShardError {
    ShardError::shard(code, msg)
}

/// Run the full compiler pipeline, writing a sealed, self-verified shard to
/// `input.out_dir`.
///
/// # Errors
///
/// The first fatal [`ShardError`] encountered. On self-verify failure
/// (§4.7 step 11), the partially written output directory is removed before
/// returning.
pub fn compile(input: CompileInput) -> Result<PathBuf, ShardError> {
    tracing::info!(
        candidates = input.candidates.len(),
        content_files = input.content_files.len(),
        out_dir = %input.out_dir.display(),
        "compiling shard"
    );

    for candidate in &input.candidates {
        if candidate.tier < MIN_TIER || candidate.tier > MAX_TIER {
            return Err(fatal(
                ErrorCode::ESchemaType,
                format!(
                    "tier {} outside accepted range {MIN_TIER}..={MAX_TIER}",
                    candidate.tier
                ),
            ));
        }
    }

    let content_by_hash = index_content_files(&input.content_files);

    let mut entities: BTreeMap<String, (String, String, String)> = BTreeMap::new();
    let mut claims: BTreeMap<String, (String, String, String, String, u64)> = BTreeMap::new();
    let mut spans: BTreeMap<String, (String, u64, u64, String)> = BTreeMap::new();
    let mut provenance: Vec<(String, String, String, u64, u64)> = Vec::new();

    for candidate in &input.candidates {
        let subject_id = entity_id(&candidate.namespace, &candidate.subject_label)?;
        entities.entry(subject_id.clone()).or_insert_with(|| {
            let ns = crate::identity::canon(&candidate.namespace).unwrap_or_default();
            let lbl = crate::identity::canon(&candidate.subject_label).unwrap_or_default();
            (
                ns,
                lbl,
                candidate
                    .subject_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string()),
            )
        });

        let (object_entity_id, object_literal_value) = match candidate.object_type {
            ObjectType::Entity => {
                let obj_id = entity_id(&candidate.namespace, &candidate.object)?;
                entities.entry(obj_id.clone()).or_insert_with(|| {
                    let ns = crate::identity::canon(&candidate.namespace).unwrap_or_default();
                    let lbl = crate::identity::canon(&candidate.object).unwrap_or_default();
                    (
                        ns,
                        lbl,
                        candidate
                            .object_entity_type
                            .clone()
                            .unwrap_or_else(|| DEFAULT_ENTITY_TYPE.to_string()),
                    )
                });
                (Some(obj_id), None)
            }
            ObjectType::LiteralString => (None, Some(candidate.object.clone())),
        };

        let cid = claim_id(
            &subject_id,
            &candidate.predicate,
            candidate.object_type,
            object_entity_id.as_deref(),
            object_literal_value.as_deref(),
        )?;

        let object_value = match candidate.object_type {
            ObjectType::Entity => object_entity_id.clone().unwrap(),
            ObjectType::LiteralString => crate::identity::canon(&candidate.object)?,
        };
        claims.entry(cid.clone()).or_insert_with(|| {
            (
                subject_id.clone(),
                object_value,
                candidate.object_type.as_str().to_string(),
                candidate.predicate.clone(),
                u64::from(candidate.tier),
            )
        });

        let content = content_by_hash.get(&candidate.source_hash).ok_or_else(|| {
            fatal(
                ErrorCode::ERefSource,
                format!("source_hash {} does not match any content file", candidate.source_hash),
            )
        })?;
        verify_slice_matches_text(content, candidate.byte_start, candidate.byte_end, &candidate.evidence_text)?;

        let sid = span_id(&candidate.source_hash, candidate.byte_start, candidate.byte_end, &candidate.evidence_text);
        spans.entry(sid).or_insert_with(|| {
            (
                candidate.source_hash.clone(),
                candidate.byte_start,
                candidate.byte_end,
                candidate.evidence_text.clone(),
            )
        });

        let pid = provenance_id(&candidate.source_hash, candidate.byte_start, candidate.byte_end);
        provenance.push((pid, cid, candidate.source_hash.clone(), candidate.byte_start, candidate.byte_end));
    }

    let entities_rows: Vec<Row> = entities
        .iter()
        .map(|(id, (ns, lbl, ty))| vec![Value::Str(id.clone()), Value::Str(ns.clone()), Value::Str(lbl.clone()), Value::Str(ty.clone())])
        .collect();
    let claims_rows: Vec<Row> = claims
        .iter()
        .map(|(id, (subject, object, object_type, predicate, tier))| {
            vec![
                Value::Str(id.clone()),
                Value::Str(subject.clone()),
                Value::Str(predicate.clone()),
                Value::Str(object.clone()),
                Value::Str(object_type.clone()),
                Value::U64(*tier),
            ]
        })
        .collect();
    let spans_rows: Vec<Row> = spans
        .iter()
        .map(|(id, (hash, start, end, text))| {
            vec![
                Value::Str(id.clone()),
                Value::Str(hash.clone()),
                Value::U64(*start),
                Value::U64(*end),
                Value::Str(text.clone()),
            ]
        })
        .collect();
    let provenance_rows: Vec<Row> = provenance
        .into_iter()
        .map(|(id, claim, hash, start, end)| {
            vec![
                Value::Str(id),
                Value::Str(claim),
                Value::Str(hash),
                Value::U64(start),
                Value::U64(end),
            ]
        })
        .collect();

    let entities_bytes = write_table(&ENTITIES_SCHEMA, entities_rows, input.table_compression)?;
    let claims_bytes = write_table(&CLAIMS_SCHEMA, claims_rows, input.table_compression)?;
    let provenance_bytes = write_table(&PROVENANCE_SCHEMA, provenance_rows, input.table_compression)?;
    let spans_bytes = write_table(&SPANS_SCHEMA, spans_rows, input.table_compression)?;

    let sources: Vec<SourceEntry> = input
        .content_files
        .iter()
        .map(|f| SourceEntry {
            path: f.relpath.clone(),
            sha256: sha256_hex(&f.bytes),
        })
        .collect();

    let created_at = input
        .metadata
        .created_at
        .clone()
        .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());

    let content_files_for_write: Vec<(String, Vec<u8>)> = input
        .content_files
        .iter()
        .map(|f| (f.relpath.clone(), f.bytes.clone()))
        .collect();

    let merkle_suite = match input.signing_key.suite() {
        SignatureSuite::Ed25519Legacy => MerkleSuite::Legacy,
        SignatureSuite::PostQuantum => MerkleSuite::PostQuantum,
    };
    let suite_name = input.signing_key.suite().manifest_name().map(str::to_string);

    let placeholder_manifest = Manifest {
        spec_version: SPEC_VERSION.to_string(),
        shard_id: "pending".to_string(),
        metadata: Metadata {
            title: input.metadata.title.clone(),
            namespace: input.metadata.namespace.clone(),
            created_at: created_at.clone(),
        },
        publisher: Publisher {
            id: input.metadata.publisher_id.clone(),
            name: input.metadata.publisher_name.clone(),
        },
        license: License { spdx: input.metadata.license_spdx.clone() },
        sources: sources.clone(),
        integrity: Integrity { algorithm: "blake3".to_string(), merkle_root: "0".repeat(64) },
        statistics: Statistics {
            entities: u64::try_from(entities.len()).unwrap_or(u64::MAX),
            claims: u64::try_from(claims.len()).unwrap_or(u64::MAX),
        },
        suite: suite_name.clone(),
        extensions: None,
    };
    let placeholder_bytes = placeholder_manifest.to_canonical_bytes().map_err(|e| {
        fatal(ErrorCode::EManifestSyntax, format!("failed to serialize manifest: {e}"))
    })?;

    let placeholder_signature = vec![0u8; input.signing_key.suite().expected_signature_len()];

    write_shard_dir(
        &input.out_dir,
        &ShardWriteInput {
            manifest_bytes: placeholder_bytes,
            signature_bytes: placeholder_signature,
            public_key_bytes: input.signing_key.public_key_bytes(),
            content_files: content_files_for_write,
            entities_bytes,
            claims_bytes,
            provenance_bytes,
            spans_bytes,
            extension_files: Vec::new(),
        },
    )?;

    let merkle = match compute_merkle_root(&input.out_dir, merkle_suite, &input.merkle_limits) {
        Ok(m) => m,
        Err(e) => {
            cleanup(&input.out_dir);
            return Err(e);
        }
    };

    let shard_id = format!("shard_blake3_{}", merkle.root_hex);
    let final_manifest = Manifest {
        shard_id,
        integrity: Integrity { algorithm: "blake3".to_string(), merkle_root: merkle.root_hex },
        ..placeholder_manifest
    };
    let final_bytes = match final_manifest.to_canonical_bytes() {
        Ok(b) => b,
        Err(e) => {
            cleanup(&input.out_dir);
            return Err(fatal(ErrorCode::EManifestSyntax, format!("failed to serialize manifest: {e}")));
        }
    };

    if let Err(e) = std::fs::write(input.out_dir.join(crate::shard::MANIFEST_FILENAME), &final_bytes) {
        cleanup(&input.out_dir);
        return Err(fatal(ErrorCode::ELayoutMissing, format!("failed to rewrite manifest: {e}")));
    }

    let signature = input.signing_key.sign(&final_bytes);
    if let Err(e) = std::fs::write(
        input.out_dir.join(crate::shard::SIG_DIR).join(crate::shard::MANIFEST_SIG_FILENAME),
        &signature,
    ) {
        cleanup(&input.out_dir);
        return Err(fatal(ErrorCode::ELayoutMissing, format!("failed to write signature: {e}")));
    }

    let public_key_bytes = input.signing_key.public_key_bytes();
    let self_verify_result = verify(&input.out_dir, &public_key_bytes, &input.merkle_limits);

    match self_verify_result {
        Ok(report) if report.errors.is_empty() => {
            tracing::info!(out_dir = %input.out_dir.display(), "shard sealed and self-verified");
            Ok(input.out_dir)
        }
        Ok(report) => {
            tracing::warn!(errors = report.errors.len(), "self-verify failed, discarding output");
            cleanup(&input.out_dir);
            Err(report
                .errors
                .into_iter()
                .next()
                .unwrap_or_else(|| fatal(ErrorCode::EMerkleMismatch, "self-verify failed")))
        }
        Err(e) => {
            tracing::warn!(error = %e.message, "self-verify call failed, discarding output");
            cleanup(&input.out_dir);
            Err(e)
        }
    }
}

fn cleanup(out_dir: &std::path::Path) {
    let _ = std::fs::remove_dir_all(out_dir);
}

fn index_content_files(files: &[ContentFile]) -> BTreeMap<String, Vec<u8>> {
    let mut map = BTreeMap::new();
    for f in files {
        let hash = sha256_hex(&f.bytes);
        map.insert(hash, f.bytes.clone());
    }
    map
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn verify_slice_matches_text(
    content: &[u8],
    byte_start: u64,
    byte_end: u64,
    evidence_text: &str,
) -> Result<(), ShardError> {
    let start = usize::try_from(byte_start).map_err(|_| out_of_bounds())?;
    let end = usize::try_from(byte_end).map_err(|_| out_of_bounds())?;
    if start > end || end > content.len() {
        return Err(out_of_bounds());
    }
    let slice = &content[start..end];
    let decoded = std::str::from_utf8(slice).map_err(|_| mismatch())?;
    if decoded != evidence_text {
        return Err(mismatch());
    }
    Ok(())
}

fn out_of_bounds() -> ShardError {
    fatal(ErrorCode::ERefSource, "byte range out of bounds for referenced content file")
}

fn mismatch() -> ShardError {
    fatal(ErrorCode::ERefSource, "evidence text does not match the exact content byte slice")
}
