//! Structured error codes shared by the compiler and verifier.
//!
//! Codes are additive-only: once published, a variant is never renamed or
//! removed. A failure is always a code plus a location plus a human message,
//! never a bare `String` or a panic.

use std::fmt;

/// A location a [`ShardError`] is attached to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Location {
    /// A path relative to the shard root.
    Path(String),
    /// A row index within a named table.
    Row { table: &'static str, index: usize },
    /// No specific location (whole-shard failure).
    Shard,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{p}"),
            Self::Row { table, index } => write!(f, "{table}[{index}]"),
            Self::Shard => write!(f, "<shard>"),
        }
    }
}

/// The fixed set of structured error codes.
///
/// Ordering matches declaration order, which is also the order errors are
/// sorted by per the verifier's "sorted by code then location" contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCode {
    ELayoutMissing,
    ELayoutDirty,
    EManifestSyntax,
    EManifestSchema,
    ESigMissing,
    ESigInvalid,
    EMerkleMismatch,
    ESchemaType,
    ESchemaNull,
    ERefOrphan,
    ERefSource,
    EIdentityInput,
    EBufferDiscontinuity,
}

impl ErrorCode {
    /// The wire string (e.g. `"E_LAYOUT_MISSING"`) used in CLI and JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ELayoutMissing => "E_LAYOUT_MISSING",
            Self::ELayoutDirty => "E_LAYOUT_DIRTY",
            Self::EManifestSyntax => "E_MANIFEST_SYNTAX",
            Self::EManifestSchema => "E_MANIFEST_SCHEMA",
            Self::ESigMissing => "E_SIG_MISSING",
            Self::ESigInvalid => "E_SIG_INVALID",
            Self::EMerkleMismatch => "E_MERKLE_MISMATCH",
            Self::ESchemaType => "E_SCHEMA_TYPE",
            Self::ESchemaNull => "E_SCHEMA_NULL",
            Self::ERefOrphan => "E_REF_ORPHAN",
            Self::ERefSource => "E_REF_SOURCE",
            Self::EIdentityInput => "E_IDENTITY_INPUT",
            Self::EBufferDiscontinuity => "E_BUFFER_DISCONTINUITY",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured failure: code, location, human message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardError {
    pub code: ErrorCode,
    pub location: Location,
    pub message: String,
}

impl ShardError {
    #[must_use]
    pub fn new(code: ErrorCode, location: Location, message: impl Into<String>) -> Self {
        Self {
            code,
            location,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn at_path(code: ErrorCode, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, Location::Path(path.into()), message)
    }

    #[must_use]
    pub fn at_row(
        code: ErrorCode,
        table: &'static str,
        index: usize,
        message: impl Into<String>,
    ) -> Self {
        Self::new(code, Location::Row { table, index }, message)
    }

    #[must_use]
    pub fn shard(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(code, Location::Shard, message)
    }
}

impl fmt::Display for ShardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.code, self.location, self.message)
    }
}

impl std::error::Error for ShardError {}

/// Sort a collection of errors by code, then location, per the verifier's
/// stable-output contract (§5, §4.8).
pub fn sort_errors(errors: &mut [ShardError]) {
    errors.sort_by(|a, b| a.code.cmp(&b.code).then_with(|| a.location.cmp(&b.location)));
}

/// Convenience conversion for surfacing filesystem paths in [`Location::Path`].
#[must_use]
pub fn path_location(base: &std::path::Path, full: &std::path::Path) -> Location {
    let rel = full.strip_prefix(base).unwrap_or(full);
    Location::Path(rel.to_string_lossy().replace('\\', "/"))
}

/// A single-shot error for compiler paths that abort on first fatal failure
/// (§4.7 step 11, §7 propagation policy) rather than accumulate.
#[derive(Debug)]
pub struct CompileError(pub ShardError);

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for CompileError {}

impl From<ShardError> for CompileError {
    fn from(e: ShardError) -> Self {
        Self(e)
    }
}
