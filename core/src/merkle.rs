//! The Merkle engine: suite-aware hashing over the sealed file set.
//!
//! Two suites share a file-set selection rule (§4.3) but diverge in domain
//! separation of leaves, internal nodes, and the odd-node rule at each level.
//! Both stream file bytes in bounded chunks and enforce policy limits so a
//! hostile shard cannot force unbounded memory use before it is rejected.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{ErrorCode, ShardError};

/// Which Merkle construction a shard was sealed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerkleSuite {
    /// Ed25519-paired suite: `BLAKE3(left||right)`, odd leaf duplicated.
    Legacy,
    /// ML-DSA-paired suite: domain-separated nodes, odd leaf promoted.
    PostQuantum,
}

impl MerkleSuite {
    fn node_hash(self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        if matches!(self, Self::PostQuantum) {
            hasher.update(&[0x01]);
        }
        hasher.update(left);
        hasher.update(right);
        *hasher.finalize().as_bytes()
    }

    fn empty_root(self) -> [u8; 32] {
        match self {
            Self::Legacy => *blake3::hash(b"").as_bytes(),
            Self::PostQuantum => *blake3::hash(&[0x01]).as_bytes(),
        }
    }
}

/// Resource limits enforced while walking and hashing the file set (§4.3, §5).
#[derive(Debug, Clone, Copy)]
pub struct MerkleLimits {
    pub max_file_bytes: u64,
    pub max_total_bytes: u64,
    pub max_file_count: usize,
}

impl MerkleLimits {
    pub const DEFAULT_MAX_FILE_BYTES: u64 = 64 * 1024 * 1024;
    pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 512 * 1024 * 1024;
    pub const DEFAULT_MAX_FILE_COUNT: usize = 100_000;
}

impl Default for MerkleLimits {
    fn default() -> Self {
        Self {
            max_file_bytes: Self::DEFAULT_MAX_FILE_BYTES,
            max_total_bytes: Self::DEFAULT_MAX_TOTAL_BYTES,
            max_file_count: Self::DEFAULT_MAX_FILE_COUNT,
        }
    }
}

/// Outcome of computing a root over a shard directory's file set.
#[derive(Debug, Clone)]
pub struct MerkleComputation {
    pub root_hex: String,
    pub file_count: usize,
    pub total_bytes: u64,
}

const READ_CHUNK: usize = 64 * 1024;

/// Walk `shard_dir`, select the covered file set, and compute the Merkle
/// root under `suite`.
///
/// Selection rule (both suites): every file under `shard_dir` except
/// `manifest.json` at the root and anything under `sig/`. Symbolic links
/// anywhere are refused. Leaves are ordered by relative POSIX path UTF-8
/// byte order; the filesystem walk order does not affect the result.
///
/// # Errors
///
/// - [`ErrorCode::ELayoutDirty`] if a symlink is present in the covered set.
/// - [`ErrorCode::EBufferDiscontinuity`] is never raised here; policy limit
///   violations raise [`ErrorCode::ELayoutDirty`] as a resource-abuse signal
///   distinct from a structural layout defect -- see module docs.
pub fn compute_merkle_root(
    shard_dir: &Path,
    suite: MerkleSuite,
    limits: &MerkleLimits,
) -> Result<MerkleComputation, ShardError> {
    let files = select_covered_files(shard_dir)?;

    if files.len() > limits.max_file_count {
        return Err(ShardError::shard(
            ErrorCode::ELayoutDirty,
            format!(
                "file count {} exceeds policy limit {}",
                files.len(),
                limits.max_file_count
            ),
        ));
    }

    let mut total_bytes: u64 = 0;
    let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(files.len());

    for (relpath, abs_path) in &files {
        let metadata = fs::metadata(abs_path).map_err(|e| {
            ShardError::at_path(
                ErrorCode::ELayoutMissing,
                relpath.clone(),
                format!("failed to read metadata: {e}"),
            )
        })?;
        let size = metadata.len();
        if size > limits.max_file_bytes {
            return Err(ShardError::at_path(
                ErrorCode::ELayoutDirty,
                relpath.clone(),
                format!("file size {size} exceeds policy limit {}", limits.max_file_bytes),
            ));
        }
        total_bytes = total_bytes.saturating_add(size);
        if total_bytes > limits.max_total_bytes {
            return Err(ShardError::shard(
                ErrorCode::ELayoutDirty,
                format!(
                    "total scanned bytes exceeds policy limit {}",
                    limits.max_total_bytes
                ),
            ));
        }

        let mut hasher = blake3::Hasher::new();
        if matches!(suite, MerkleSuite::PostQuantum) {
            hasher.update(&[0x00]);
        }
        hasher.update(relpath.as_bytes());
        hasher.update(&[0x00]);

        let mut file = fs::File::open(abs_path).map_err(|e| {
            ShardError::at_path(
                ErrorCode::ELayoutMissing,
                relpath.clone(),
                format!("failed to open: {e}"),
            )
        })?;
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = file.read(&mut buf).map_err(|e| {
                ShardError::at_path(
                    ErrorCode::ELayoutMissing,
                    relpath.clone(),
                    format!("failed to read: {e}"),
                )
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        leaves.push(*hasher.finalize().as_bytes());
    }

    let root = fold_tree(suite, leaves);
    Ok(MerkleComputation {
        root_hex: hex::encode(root),
        file_count: files.len(),
        total_bytes,
    })
}

fn fold_tree(suite: MerkleSuite, leaves: Vec<[u8; 32]>) -> [u8; 32] {
    if leaves.is_empty() {
        return suite.empty_root();
    }

    let mut level = leaves;
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        let mut pairs = level.chunks_exact(2);
        for pair in &mut pairs {
            next.push(suite.node_hash(&pair[0], &pair[1]));
        }
        if let [odd] = pairs.remainder() {
            match suite {
                MerkleSuite::Legacy => next.push(suite.node_hash(odd, odd)),
                MerkleSuite::PostQuantum => next.push(*odd),
            }
        }
        level = next;
    }
    level[0]
}

/// Enumerate the covered file set, sorted by relative POSIX path.
///
/// # Errors
///
/// [`ErrorCode::ELayoutDirty`] if any symlink is found anywhere under
/// `shard_dir` (covered or not -- the invariant is "no symlinks in the
/// shard", not merely "no symlinks in the covered set").
fn select_covered_files(shard_dir: &Path) -> Result<Vec<(String, PathBuf)>, ShardError> {
    let mut out = Vec::new();

    for entry in walkdir::WalkDir::new(shard_dir)
        .follow_links(false)
        .into_iter()
    {
        let entry = entry.map_err(|e| {
            ShardError::shard(ErrorCode::ELayoutMissing, format!("failed to walk shard directory: {e}"))
        })?;

        if entry.path_is_symlink() {
            let rel = relpath(shard_dir, entry.path());
            return Err(ShardError::at_path(
                ErrorCode::ELayoutDirty,
                rel,
                "symbolic links are not permitted anywhere in a shard",
            ));
        }

        if entry.file_type().is_dir() {
            continue;
        }

        let rel = relpath(shard_dir, entry.path());
        if rel == "manifest.json" || rel.starts_with("sig/") {
            continue;
        }

        out.push((rel, entry.path().to_path_buf()));
    }

    out.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));
    Ok(out)
}

fn relpath(base: &Path, full: &Path) -> String {
    full.strip_prefix(base)
        .unwrap_or(full)
        .to_string_lossy()
        .replace('\\', "/")
}
