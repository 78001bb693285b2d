//! Scenario tests: a shard is compiled once, then corrupted in one
//! specific way, and verification must fail at the expected gate rather
//! than silently pass or panic.

use ed25519_dalek::SigningKey;
use shard_core::compile::{compile, Candidate, CompileInput, ContentFile, ShardMetadata};
use shard_core::error::ErrorCode;
use shard_core::identity::ObjectType;
use shard_core::merkle::MerkleLimits;
use shard_core::sign::SigningKeypair;
use shard_core::verify::{verify, VerifyState};

fn source_text() -> Vec<u8> {
    b"Direct pressure controls most bleeding within a few minutes.".to_vec()
}

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Compiles a single shard into `out_dir` and returns its trusted public key.
fn build_shard(out_dir: std::path::PathBuf) -> (std::path::PathBuf, Vec<u8>) {
    let source = source_text();
    let source_hash = sha256_hex(&source);
    let candidates = vec![Candidate {
        namespace: "medical".to_string(),
        subject_label: "direct pressure".to_string(),
        subject_type: Some("technique".to_string()),
        predicate: "controls".to_string(),
        object: "bleeding".to_string(),
        object_type: ObjectType::Entity,
        object_entity_type: Some("condition".to_string()),
        tier: 1,
        evidence_text: "Direct pressure controls most bleeding within a few minutes.".to_string(),
        source_hash,
        byte_start: 0,
        byte_end: 62,
    }];
    let signing_key = SigningKeypair::Ed25519(Box::new(SigningKey::from_bytes(&[0x77; 32])));
    let public_key = signing_key.public_key_bytes();
    let input = CompileInput {
        candidates,
        content_files: vec![ContentFile { relpath: "bleeding_control.txt".to_string(), bytes: source }],
        metadata: ShardMetadata {
            title: "Bleeding control".to_string(),
            namespace: "medical".to_string(),
            publisher_id: "pub_acme_health".to_string(),
            publisher_name: "Acme Health".to_string(),
            license_spdx: "CC-BY-4.0".to_string(),
            created_at: Some("2026-01-01T00:00:00Z".to_string()),
        },
        signing_key,
        out_dir,
        table_compression: false,
        merkle_limits: MerkleLimits::default(),
    };
    let shard_dir = compile(input).expect("base shard compilation failed");
    (shard_dir, public_key)
}

#[test]
fn content_byte_flip_breaks_merkle() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (shard_dir, public_key) = build_shard(dir.path().join("shard"));

    let target = shard_dir.join("content/bleeding_control.txt");
    let mut bytes = std::fs::read(&target).expect("read content");
    bytes[0] ^= 0xFF;
    std::fs::write(&target, bytes).expect("write tampered content");

    let report = verify(&shard_dir, &public_key, &MerkleLimits::default()).expect("verify runs");
    assert!(!report.passed());
    assert_eq!(report.state, VerifyState::SigOk);
    assert!(report.errors.iter().any(|e| e.code == ErrorCode::EMerkleMismatch));
}

#[test]
fn truncated_table_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (shard_dir, public_key) = build_shard(dir.path().join("shard"));

    let target = shard_dir.join("graph/claims.tbl");
    let mut bytes = std::fs::read(&target).expect("read claims table");
    let cut = bytes.len().saturating_sub(3);
    bytes.truncate(cut);
    std::fs::write(&target, bytes).expect("write truncated table");

    let report = verify(&shard_dir, &public_key, &MerkleLimits::default()).expect("verify runs");
    assert!(!report.passed());
    assert_ne!(report.state, VerifyState::Pass);
}

#[test]
fn wrong_signature_is_rejected_before_merkle_check() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (shard_dir, public_key) = build_shard(dir.path().join("shard"));

    let sig_path = shard_dir.join("sig/manifest.sig");
    let original = std::fs::read(&sig_path).expect("read signature");
    let replacement = vec![0x5Au8; original.len()];
    std::fs::write(&sig_path, replacement).expect("write tampered signature");

    let report = verify(&shard_dir, &public_key, &MerkleLimits::default()).expect("verify runs");
    assert!(!report.passed());
    assert_eq!(report.state, VerifyState::ManifestOk);
    assert!(report.errors.iter().any(|e| e.code == ErrorCode::ESigInvalid));
}

#[test]
fn missing_required_file_is_reported_at_layout_gate() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (shard_dir, public_key) = build_shard(dir.path().join("shard"));

    std::fs::remove_file(shard_dir.join("graph/spans.tbl")).expect("remove spans table");

    let report = verify(&shard_dir, &public_key, &MerkleLimits::default()).expect("verify runs");
    assert!(!report.passed());
    assert_eq!(report.state, VerifyState::Init);
    assert!(report.errors.iter().any(|e| e.code == ErrorCode::ELayoutMissing));
}

#[test]
fn manifest_tampered_after_signing_fails_signature_check() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (shard_dir, public_key) = build_shard(dir.path().join("shard"));

    let manifest_path = shard_dir.join("manifest.json");
    let mut bytes = std::fs::read(&manifest_path).expect("read manifest");
    bytes.push(b'\n');
    std::fs::write(&manifest_path, bytes).expect("write dirty manifest");

    let report = verify(&shard_dir, &public_key, &MerkleLimits::default()).expect("verify runs");
    assert!(!report.passed());
    assert_eq!(report.state, VerifyState::ManifestOk);
    assert!(report.errors.iter().any(|e| e.code == ErrorCode::ESigInvalid));
}

#[test]
fn untrusted_public_key_is_rejected_after_signature_math() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (shard_dir, _public_key) = build_shard(dir.path().join("shard"));

    let bogus_key = vec![0u8; 32];
    let report = verify(&shard_dir, &bogus_key, &MerkleLimits::default()).expect("verify runs");
    assert!(!report.passed());
    assert_eq!(report.state, VerifyState::ManifestOk);
    assert!(report.errors.iter().any(|e| e.code == ErrorCode::ESigInvalid));
}
