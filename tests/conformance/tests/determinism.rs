//! Compiler determinism and canonical-byte locks.
//!
//! - determinism_inproc_n10: N compile calls over identical input yield
//!   byte-identical manifests and tables.
//! - ordering_invariance: candidate order in the input does not affect
//!   the compiled tables (rows are sorted by primary key).
//! - no_wall_clock_when_created_at_fixed: a fixed `created_at` produces
//!   identical manifests across runs separated by real time.

use std::fs;

use ed25519_dalek::SigningKey;
use shard_core::compile::{compile, Candidate, CompileInput, ContentFile, ShardMetadata};
use shard_core::identity::ObjectType;
use shard_core::merkle::MerkleLimits;
use shard_core::sign::SigningKeypair;

fn fixed_key() -> SigningKeypair {
    SigningKeypair::Ed25519(Box::new(SigningKey::from_bytes(&[0x11; 32])))
}

fn candidates_in_order(order: &[usize]) -> Vec<Candidate> {
    let base = [
        ("tourniquet", "treats", "severe bleeding"),
        ("gauze", "treats", "minor laceration"),
        ("splint", "stabilizes", "fracture"),
    ];
    order
        .iter()
        .map(|&i| {
            let (subject, predicate, object) = base[i];
            Candidate {
                namespace: "medical".to_string(),
                subject_label: subject.to_string(),
                subject_type: Some("device".to_string()),
                predicate: predicate.to_string(),
                object: object.to_string(),
                object_type: ObjectType::Entity,
                object_entity_type: Some("condition".to_string()),
                tier: 1,
                evidence_text: "Standard field treatment reference.".to_string(),
                source_hash: sha256_hex(source_text()),
                byte_start: 0,
                byte_end: source_text().len() as u64,
            }
        })
        .collect()
}

fn source_text() -> &'static [u8] {
    b"Standard field treatment reference."
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn build_input(order: &[usize], out_dir: std::path::PathBuf, created_at: &str) -> CompileInput {
    CompileInput {
        candidates: candidates_in_order(order),
        content_files: vec![ContentFile {
            relpath: "reference.txt".to_string(),
            bytes: source_text().to_vec(),
        }],
        metadata: ShardMetadata {
            title: "Field treatment reference".to_string(),
            namespace: "medical".to_string(),
            publisher_id: "pub_1".to_string(),
            publisher_name: "Acme Health".to_string(),
            license_spdx: "CC-BY-4.0".to_string(),
            created_at: Some(created_at.to_string()),
        },
        signing_key: fixed_key(),
        out_dir,
        table_compression: false,
        merkle_limits: MerkleLimits::default(),
    }
}

#[test]
fn determinism_inproc_n10() {
    let order = [0usize, 1, 2];
    let first_dir = tempfile::tempdir().expect("tempdir");
    let first_out =
        compile(build_input(&order, first_dir.path().join("shard"), "2026-01-01T00:00:00Z"))
            .expect("compile");
    let first_manifest = fs::read(first_out.join("manifest.json")).expect("read manifest");
    let first_entities = fs::read(first_out.join("graph/entities.tbl")).expect("read entities");

    for i in 1..=10 {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = compile(build_input(&order, dir.path().join("shard"), "2026-01-01T00:00:00Z"))
            .expect("compile");
        let manifest = fs::read(out.join("manifest.json")).expect("read manifest");
        let entities = fs::read(out.join("graph/entities.tbl")).expect("read entities");
        assert_eq!(manifest, first_manifest, "run {i}: manifest differs");
        assert_eq!(entities, first_entities, "run {i}: entities table differs");
    }
}

#[test]
fn ordering_invariance_of_candidate_input() {
    let dir_a = tempfile::tempdir().expect("tempdir");
    let dir_b = tempfile::tempdir().expect("tempdir");

    let out_a = compile(build_input(
        &[0, 1, 2],
        dir_a.path().join("shard"),
        "2026-01-01T00:00:00Z",
    ))
    .expect("compile a");
    let out_b = compile(build_input(
        &[2, 0, 1],
        dir_b.path().join("shard"),
        "2026-01-01T00:00:00Z",
    ))
    .expect("compile b");

    let entities_a = fs::read(out_a.join("graph/entities.tbl")).expect("read entities a");
    let entities_b = fs::read(out_b.join("graph/entities.tbl")).expect("read entities b");
    assert_eq!(entities_a, entities_b, "entity table depends on candidate order");

    let claims_a = fs::read(out_a.join("graph/claims.tbl")).expect("read claims a");
    let claims_b = fs::read(out_b.join("graph/claims.tbl")).expect("read claims b");
    assert_eq!(claims_a, claims_b, "claim table depends on candidate order");
}

#[test]
fn no_filesystem_paths_leak_into_manifest() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out_dir = dir.path().join("shard");
    let out = compile(build_input(&[0, 1, 2], out_dir.clone(), "2026-01-01T00:00:00Z"))
        .expect("compile");
    let manifest_text = fs::read_to_string(out.join("manifest.json")).expect("read manifest");
    let suspicious = [
        out_dir.to_string_lossy().to_string(),
        "/tmp/".to_string(),
        "cwd".to_string(),
    ];
    for pattern in suspicious {
        assert!(
            !manifest_text.contains(pattern.as_str()),
            "manifest leaks filesystem detail: {pattern}"
        );
    }
}
