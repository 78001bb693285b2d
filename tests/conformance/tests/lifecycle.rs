//! End-to-end lifecycle: a freshly compiled shard must self-verify, and
//! its table contents must reflect the candidates it was built from.

use ed25519_dalek::SigningKey;
use shard_core::compile::{compile, Candidate, CompileInput, ContentFile, ShardMetadata};
use shard_core::identity::{entity_id, ObjectType};
use shard_core::merkle::MerkleLimits;
use shard_core::sign::SigningKeypair;
use shard_core::table::{read_table, Value, CLAIMS_SCHEMA, ENTITIES_SCHEMA};
use shard_core::verify::verify;

fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[test]
fn compiled_shard_passes_full_verification() {
    let dir = tempfile::tempdir().expect("tempdir");
    let source = b"Elevate the limb above heart level to reduce swelling.".to_vec();
    let source_hash = sha256_hex(&source);

    let candidates = vec![Candidate {
        namespace: "medical".to_string(),
        subject_label: "limb elevation".to_string(),
        subject_type: Some("technique".to_string()),
        predicate: "reduces".to_string(),
        object: "swelling".to_string(),
        object_type: ObjectType::Entity,
        object_entity_type: Some("symptom".to_string()),
        tier: 0,
        evidence_text: "Elevate the limb above heart level to reduce swelling.".to_string(),
        source_hash,
        byte_start: 0,
        byte_end: 56,
    }];

    let signing_key = SigningKeypair::Ed25519(Box::new(SigningKey::from_bytes(&[0x22; 32])));
    let public_key = signing_key.public_key_bytes();

    let input = CompileInput {
        candidates,
        content_files: vec![ContentFile { relpath: "first_aid.txt".to_string(), bytes: source }],
        metadata: ShardMetadata {
            title: "First aid basics".to_string(),
            namespace: "medical".to_string(),
            publisher_id: "pub_acme_health".to_string(),
            publisher_name: "Acme Health".to_string(),
            license_spdx: "CC-BY-4.0".to_string(),
            created_at: Some("2026-01-01T00:00:00Z".to_string()),
        },
        signing_key,
        out_dir: dir.path().join("shard"),
        table_compression: true,
        merkle_limits: MerkleLimits::default(),
    };

    let shard_dir = compile(input).expect("compile");
    let report = verify(&shard_dir, &public_key, &MerkleLimits::default()).expect("verify runs");
    assert!(report.passed(), "expected a clean pass, got {report:?}");

    let entities_bytes = std::fs::read(shard_dir.join("graph/entities.tbl")).expect("read entities");
    let entities = read_table(&entities_bytes, &ENTITIES_SCHEMA).expect("decode entities");
    let subject = entity_id("medical", "limb elevation").expect("entity id");
    let found = entities.iter().any(|row| matches!(&row[0], Value::Str(id) if id == &subject));
    assert!(found, "compiled entity table is missing the subject entity");

    let claims_bytes = std::fs::read(shard_dir.join("graph/claims.tbl")).expect("read claims");
    let claims = read_table(&claims_bytes, &CLAIMS_SCHEMA).expect("decode claims");
    assert_eq!(claims.len(), 1, "expected exactly one claim row");
}

#[test]
fn table_compression_does_not_change_decoded_rows() {
    let source = b"Elevate the limb above heart level to reduce swelling.".to_vec();
    let source_hash = sha256_hex(&source);
    let candidate = Candidate {
        namespace: "medical".to_string(),
        subject_label: "limb elevation".to_string(),
        subject_type: Some("technique".to_string()),
        predicate: "reduces".to_string(),
        object: "swelling".to_string(),
        object_type: ObjectType::Entity,
        object_entity_type: Some("symptom".to_string()),
        tier: 0,
        evidence_text: "Elevate the limb above heart level to reduce swelling.".to_string(),
        source_hash,
        byte_start: 0,
        byte_end: 56,
    };

    let mut rows_by_compression = Vec::new();
    for compress in [false, true] {
        let dir = tempfile::tempdir().expect("tempdir");
        let signing_key = SigningKeypair::Ed25519(Box::new(SigningKey::from_bytes(&[0x33; 32])));
        let input = CompileInput {
            candidates: vec![candidate.clone()],
            content_files: vec![ContentFile {
                relpath: "first_aid.txt".to_string(),
                bytes: source.clone(),
            }],
            metadata: ShardMetadata {
                title: "First aid basics".to_string(),
                namespace: "medical".to_string(),
                publisher_id: "pub_acme_health".to_string(),
                publisher_name: "Acme Health".to_string(),
                license_spdx: "CC-BY-4.0".to_string(),
                created_at: Some("2026-01-01T00:00:00Z".to_string()),
            },
            signing_key,
            out_dir: dir.path().join("shard"),
            table_compression: compress,
            merkle_limits: MerkleLimits::default(),
        };
        let shard_dir = compile(input).expect("compile");
        let bytes = std::fs::read(shard_dir.join("graph/entities.tbl")).expect("read entities");
        rows_by_compression.push(read_table(&bytes, &ENTITIES_SCHEMA).expect("decode entities"));
    }

    assert_eq!(
        rows_by_compression[0], rows_by_compression[1],
        "compressed and uncompressed tables must decode to identical rows"
    );
}
