//! Generator for the gold shard fixture: a small trauma-protocols shard
//! covering the tourniquet/severe-bleeding example, signed with a fixed
//! Ed25519 key so the fixture is reproducible across generator runs.
//!
//! Usage: `gold_shard_generator <output_dir>`
//!
//! The output directory must not already exist.

use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};
use shard_core::compile::{compile, Candidate, CompileInput, ContentFile, ShardMetadata};
use shard_core::identity::ObjectType;
use shard_core::merkle::MerkleLimits;
use shard_core::sign::SigningKeypair;

/// Fixed 32-byte seed so every generator run signs with the same key.
const FIXED_SEED: [u8; 32] = [0x42; 32];

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: gold_shard_generator <output_dir>");
        std::process::exit(1);
    }
    let output_dir = std::path::Path::new(&args[1]);
    let shard_dir = output_dir.join("shard");

    let source = b"Apply tourniquet only when direct pressure fails to control severe bleeding.\nReassess the wound every ten minutes.".to_vec();
    let source_hash = sha256_hex(&source);

    let candidates = vec![
        Candidate {
            namespace: "medical".to_string(),
            subject_label: "tourniquet".to_string(),
            subject_type: Some("device".to_string()),
            predicate: "treats".to_string(),
            object: "severe bleeding".to_string(),
            object_type: ObjectType::Entity,
            object_entity_type: Some("condition".to_string()),
            tier: 1,
            evidence_text: "Apply tourniquet only when direct pressure fails to control severe bleeding."
                .to_string(),
            source_hash: source_hash.clone(),
            byte_start: 0,
            byte_end: 77,
        },
        Candidate {
            namespace: "medical".to_string(),
            subject_label: "wound".to_string(),
            subject_type: Some("injury".to_string()),
            predicate: "requires_reassessment_interval".to_string(),
            object: "ten minutes".to_string(),
            object_type: ObjectType::LiteralString,
            object_entity_type: None,
            tier: 2,
            evidence_text: "Reassess the wound every ten minutes.".to_string(),
            source_hash,
            byte_start: 78,
            byte_end: 116,
        },
    ];

    let signing_key = SigningKeypair::Ed25519(Box::new(SigningKey::from_bytes(&FIXED_SEED)));
    let public_key = signing_key.public_key_bytes();

    let input = CompileInput {
        candidates,
        content_files: vec![ContentFile { relpath: "trauma_protocols.txt".to_string(), bytes: source }],
        metadata: ShardMetadata {
            title: "Trauma protocols".to_string(),
            namespace: "medical".to_string(),
            publisher_id: "pub_acme_health".to_string(),
            publisher_name: "Acme Health".to_string(),
            license_spdx: "CC-BY-4.0".to_string(),
            created_at: Some("2026-01-01T00:00:00Z".to_string()),
        },
        signing_key,
        out_dir: shard_dir,
        table_compression: false,
        merkle_limits: MerkleLimits::default(),
    };

    let written = compile(input).expect("gold shard compilation failed");

    println!("shard written to: {}", written.display());
    println!("public_key_hex={}", hex::encode(&public_key));
    std::fs::write(output_dir.join("trusted_key.pub"), &public_key)
        .expect("failed to write trusted key alongside the shard");
}
