//! Generator for a family of deliberately-corrupted shards, each derived
//! from a freshly compiled gold shard by breaking exactly one invariant
//! after the fact. Used by scenario tests asserting that verification
//! fails at the expected gate rather than silently passing.
//!
//! Usage: `tampered_shard_generator <output_dir>`
//!
//! Writes one subdirectory per tamper kind under <output_dir>:
//!   content_byte/   -- flips a byte in a sealed content file
//!   truncated_table/ -- truncates a graph table file mid-row
//!   wrong_signature/ -- overwrites sig/manifest.sig with random bytes
//!   missing_file/    -- deletes a required layout file
//!   dirty_manifest/  -- appends trailing whitespace to manifest.json

use ed25519_dalek::SigningKey;
use sha2::{Digest, Sha256};
use shard_core::compile::{compile, Candidate, CompileInput, ContentFile, ShardMetadata};
use shard_core::identity::ObjectType;
use shard_core::merkle::MerkleLimits;
use shard_core::sign::SigningKeypair;

const FIXED_SEED: [u8; 32] = [0x77; 32];

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn build_base_shard(out_dir: &std::path::Path) -> std::path::PathBuf {
    let source = b"Direct pressure controls most bleeding within a few minutes.".to_vec();
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

    let signing_key = SigningKeypair::Ed25519(Box::new(SigningKey::from_bytes(&FIXED_SEED)));

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
        out_dir: out_dir.to_path_buf(),
        table_compression: false,
        merkle_limits: MerkleLimits::default(),
    };

    compile(input).expect("base shard compilation failed")
}

fn copy_dir_recursive(src: &std::path::Path, dst: &std::path::Path) {
    std::fs::create_dir_all(dst).expect("create tamper dir");
    for entry in std::fs::read_dir(src).expect("read base shard dir") {
        let entry = entry.expect("dir entry");
        let dst_path = dst.join(entry.file_name());
        if entry.file_type().expect("file type").is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path);
        } else {
            std::fs::copy(entry.path(), &dst_path).expect("copy file");
        }
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: tampered_shard_generator <output_dir>");
        std::process::exit(1);
    }
    let output_dir = std::path::Path::new(&args[1]);
    std::fs::create_dir_all(output_dir).expect("create output dir");

    let base_dir = output_dir.join("_base");
    let base_shard = build_base_shard(&base_dir);

    // content_byte: flip one byte in the sealed content file.
    {
        let variant = output_dir.join("content_byte");
        copy_dir_recursive(&base_shard, &variant);
        let target = variant.join("content/bleeding_control.txt");
        let mut bytes = std::fs::read(&target).expect("read content file");
        bytes[0] ^= 0xFF;
        std::fs::write(&target, bytes).expect("write tampered content file");
        println!("variant=content_byte path={}", variant.display());
    }

    // truncated_table: chop the claims table mid-row.
    {
        let variant = output_dir.join("truncated_table");
        copy_dir_recursive(&base_shard, &variant);
        let target = variant.join("graph/claims.tbl");
        let mut bytes = std::fs::read(&target).expect("read claims table");
        let cut = bytes.len().saturating_sub(3);
        bytes.truncate(cut);
        std::fs::write(&target, bytes).expect("write truncated claims table");
        println!("variant=truncated_table path={}", variant.display());
    }

    // wrong_signature: overwrite the signature with unrelated bytes of the same length.
    {
        let variant = output_dir.join("wrong_signature");
        copy_dir_recursive(&base_shard, &variant);
        let target = variant.join("sig/manifest.sig");
        let original = std::fs::read(&target).expect("read signature");
        let replacement = vec![0x5Au8; original.len()];
        std::fs::write(&target, replacement).expect("write tampered signature");
        println!("variant=wrong_signature path={}", variant.display());
    }

    // missing_file: delete a file the layout scanner requires.
    {
        let variant = output_dir.join("missing_file");
        copy_dir_recursive(&base_shard, &variant);
        std::fs::remove_file(variant.join("graph/spans.tbl")).expect("remove spans table");
        println!("variant=missing_file path={}", variant.display());
    }

    // dirty_manifest: append trailing whitespace, breaking canonical-bytes equality
    // without breaking JSON parsing.
    {
        let variant = output_dir.join("dirty_manifest");
        copy_dir_recursive(&base_shard, &variant);
        let target = variant.join("manifest.json");
        let mut bytes = std::fs::read(&target).expect("read manifest");
        bytes.push(b'\n');
        std::fs::write(&target, bytes).expect("write dirty manifest");
        println!("variant=dirty_manifest path={}", variant.display());
    }

    println!("tampered shards written to: {}", output_dir.display());
}
