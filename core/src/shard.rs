//! On-disk shard layout: the bit-exact directory tree from §6.1.
//!
//! Grounded on the same write-temp-then-rename, fail-closed-on-read pattern
//! used for artifact bundles elsewhere in this codebase, generalized from a
//! flat metadata-plus-artifacts layout to the shard's fixed subdirectories.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{ErrorCode, Location, ShardError};

/// The columnar file extension this implementation commits to (§6.1: "the
/// same across all tables in one shard").
pub const TABLE_EXTENSION: &str = "tbl";

pub const MANIFEST_FILENAME: &str = "manifest.json";
pub const SIG_DIR: &str = "sig";
pub const MANIFEST_SIG_FILENAME: &str = "manifest.sig";
pub const PUBLISHER_KEY_FILENAME: &str = "publisher.pub";
pub const CONTENT_DIR: &str = "content";
pub const GRAPH_DIR: &str = "graph";
pub const EVIDENCE_DIR: &str = "evidence";
pub const EXT_DIR: &str = "ext";

/// Everything needed to write a fresh shard directory.
pub struct ShardWriteInput {
    pub manifest_bytes: Vec<u8>,
    pub signature_bytes: Vec<u8>,
    pub public_key_bytes: Vec<u8>,
    /// relpath under `content/` -> bytes.
    pub content_files: Vec<(String, Vec<u8>)>,
    pub entities_bytes: Vec<u8>,
    pub claims_bytes: Vec<u8>,
    pub provenance_bytes: Vec<u8>,
    pub spans_bytes: Vec<u8>,
    /// relpath under `ext/` -> bytes; empty vec ⇒ no `ext/` directory at all.
    pub extension_files: Vec<(String, Vec<u8>)>,
}

/// Write a shard directory from scratch. `root` must not already exist.
///
/// # Errors
///
/// [`ErrorCode::ELayoutDirty`] if `root` already exists; otherwise any I/O
/// failure is reported as [`ErrorCode::ELayoutMissing`] at the offending path.
pub fn write_shard_dir(root: &Path, input: &ShardWriteInput) -> Result<(), ShardError> {
    if root.exists() {
        return Err(ShardError::shard(
            ErrorCode::ELayoutDirty,
            format!("output directory {} already exists", root.display()),
        ));
    }

    fs::create_dir_all(root.join(SIG_DIR)).map_err(io_err(root))?;
    fs::create_dir_all(root.join(CONTENT_DIR)).map_err(io_err(root))?;
    fs::create_dir_all(root.join(GRAPH_DIR)).map_err(io_err(root))?;
    fs::create_dir_all(root.join(EVIDENCE_DIR)).map_err(io_err(root))?;

    write_atomic(root.join(MANIFEST_FILENAME), &input.manifest_bytes)?;
    write_atomic(
        root.join(SIG_DIR).join(MANIFEST_SIG_FILENAME),
        &input.signature_bytes,
    )?;
    write_atomic(
        root.join(SIG_DIR).join(PUBLISHER_KEY_FILENAME),
        &input.public_key_bytes,
    )?;

    for (relpath, bytes) in &input.content_files {
        let path = root.join(CONTENT_DIR).join(relpath);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err(root))?;
        }
        write_atomic(path, bytes)?;
    }

    write_atomic(
        root.join(GRAPH_DIR).join(format!("entities.{TABLE_EXTENSION}")),
        &input.entities_bytes,
    )?;
    write_atomic(
        root.join(GRAPH_DIR).join(format!("claims.{TABLE_EXTENSION}")),
        &input.claims_bytes,
    )?;
    write_atomic(
        root.join(GRAPH_DIR).join(format!("provenance.{TABLE_EXTENSION}")),
        &input.provenance_bytes,
    )?;
    write_atomic(
        root.join(EVIDENCE_DIR).join(format!("spans.{TABLE_EXTENSION}")),
        &input.spans_bytes,
    )?;

    if !input.extension_files.is_empty() {
        fs::create_dir_all(root.join(EXT_DIR)).map_err(io_err(root))?;
        for (relpath, bytes) in &input.extension_files {
            write_atomic(root.join(EXT_DIR).join(relpath), bytes)?;
        }
    }

    Ok(())
}

fn io_err(root: &Path) -> impl Fn(std::io::Error) -> ShardError + '_ {
    move |e| ShardError::shard(ErrorCode::ELayoutMissing, format!("{}: {e}", root.display()))
}

fn write_atomic(path: PathBuf, content: &[u8]) -> Result<(), ShardError> {
    let dir = path.parent().ok_or_else(|| {
        ShardError::shard(ErrorCode::ELayoutMissing, format!("no parent directory for {}", path.display()))
    })?;
    let temp_name = format!(".tmp_{}", path.file_name().unwrap_or_default().to_string_lossy());
    let temp_path = dir.join(temp_name);

    fs::write(&temp_path, content).map_err(|e| {
        ShardError::at_path(ErrorCode::ELayoutMissing, rel_display(&path), format!("write failed: {e}"))
    })?;
    fs::rename(&temp_path, &path).map_err(|e| {
        ShardError::at_path(ErrorCode::ELayoutMissing, rel_display(&path), format!("rename failed: {e}"))
    })?;
    Ok(())
}

fn rel_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// What [`read_shard_layout`] hands back on a structurally sound read: the
/// raw bytes of every file in the shard, keyed by their fixed roles.
pub struct ShardContents {
    pub manifest_bytes: Vec<u8>,
    pub signature_bytes: Vec<u8>,
    pub public_key_bytes: Vec<u8>,
    pub content_files: BTreeMap<String, Vec<u8>>,
    pub entities_bytes: Vec<u8>,
    pub claims_bytes: Vec<u8>,
    pub provenance_bytes: Vec<u8>,
    pub spans_bytes: Vec<u8>,
    pub extension_files: BTreeMap<String, Vec<u8>>,
}

/// Validate the layout of `root` and read every covered file.
///
/// Collects every [`ErrorCode::ELayoutMissing`] and [`ErrorCode::ELayoutDirty`]
/// violation rather than stopping at the first, per §4.8 step 1. On any
/// violation, returns `Err` with the full list; a clean layout returns `Ok`.
///
/// # Errors
///
/// A non-empty `Vec<ShardError>` describing every layout violation found.
pub fn read_shard_layout(root: &Path) -> Result<ShardContents, Vec<ShardError>> {
    let mut errors = Vec::new();

    for entry in walkdir::WalkDir::new(root).follow_links(false).into_iter() {
        let Ok(entry) = entry else { continue };
        if entry.path() == root {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        if entry.path_is_symlink() {
            errors.push(ShardError::at_path(
                ErrorCode::ELayoutDirty,
                rel,
                "symbolic links are not permitted anywhere in a shard",
            ));
            continue;
        }
        if entry.file_type().is_dir() {
            continue;
        }
        if !is_permitted_path(&rel) {
            errors.push(ShardError::at_path(
                ErrorCode::ELayoutDirty,
                rel,
                "unexpected file outside the permitted shard layout",
            ));
        }
    }

    let manifest_bytes = require_file(root, MANIFEST_FILENAME, &mut errors);
    let signature_bytes = require_file(root, &format!("{SIG_DIR}/{MANIFEST_SIG_FILENAME}"), &mut errors);
    let public_key_bytes = require_file(root, &format!("{SIG_DIR}/{PUBLISHER_KEY_FILENAME}"), &mut errors);
    let entities_bytes = require_file(root, &format!("{GRAPH_DIR}/entities.{TABLE_EXTENSION}"), &mut errors);
    let claims_bytes = require_file(root, &format!("{GRAPH_DIR}/claims.{TABLE_EXTENSION}"), &mut errors);
    let provenance_bytes =
        require_file(root, &format!("{GRAPH_DIR}/provenance.{TABLE_EXTENSION}"), &mut errors);
    let spans_bytes = require_file(root, &format!("{EVIDENCE_DIR}/spans.{TABLE_EXTENSION}"), &mut errors);

    let content_files = read_dir_files(root, CONTENT_DIR);
    let extension_files = read_dir_files(root, EXT_DIR);

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(ShardContents {
        manifest_bytes: manifest_bytes.unwrap_or_default(),
        signature_bytes: signature_bytes.unwrap_or_default(),
        public_key_bytes: public_key_bytes.unwrap_or_default(),
        content_files,
        entities_bytes: entities_bytes.unwrap_or_default(),
        claims_bytes: claims_bytes.unwrap_or_default(),
        provenance_bytes: provenance_bytes.unwrap_or_default(),
        spans_bytes: spans_bytes.unwrap_or_default(),
        extension_files,
    })
}

fn is_permitted_path(rel: &str) -> bool {
    match rel {
        MANIFEST_FILENAME => true,
        r if r == format!("{SIG_DIR}/{MANIFEST_SIG_FILENAME}") => true,
        r if r == format!("{SIG_DIR}/{PUBLISHER_KEY_FILENAME}") => true,
        r if r.starts_with(&format!("{CONTENT_DIR}/")) => true,
        r if r == format!("{GRAPH_DIR}/entities.{TABLE_EXTENSION}") => true,
        r if r == format!("{GRAPH_DIR}/claims.{TABLE_EXTENSION}") => true,
        r if r == format!("{GRAPH_DIR}/provenance.{TABLE_EXTENSION}") => true,
        r if r == format!("{EVIDENCE_DIR}/spans.{TABLE_EXTENSION}") => true,
        r if r.starts_with(&format!("{EXT_DIR}/")) => true,
        _ => false,
    }
}

fn require_file(root: &Path, relpath: &str, errors: &mut Vec<ShardError>) -> Option<Vec<u8>> {
    let path = root.join(relpath);
    match fs::read(&path) {
        Ok(bytes) => Some(bytes),
        Err(_) => {
            errors.push(ShardError::new(
                ErrorCode::ELayoutMissing,
                Location::Path(relpath.to_string()),
                "required file is missing",
            ));
            None
        }
    }
}

fn read_dir_files(root: &Path, subdir: &str) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    let dir = root.join(subdir);
    if !dir.is_dir() {
        return out;
    }
    for entry in walkdir::WalkDir::new(&dir).follow_links(false).into_iter().flatten() {
        if entry.file_type().is_dir() || entry.path_is_symlink() {
            continue;
        }
        if let Ok(bytes) = fs::read(entry.path()) {
            let rel = entry
                .path()
                .strip_prefix(&dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            out.insert(rel, bytes);
        }
    }
    out
}
