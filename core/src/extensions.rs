//! Extensions: supplementary tables that are Merkle-covered but otherwise
//! opaque to the core (§4.9).
//!
//! The core never inspects extension table contents. It only validates the
//! `<name>@<version>.<ext>` filename shape and offers a single dispatch
//! point where a caller that *does* understand a particular extension can
//! register a validator -- one call site, not an inheritance hierarchy
//! (§9 "dynamic dispatch on extension types -> tagged containers").

use std::collections::HashMap;

use crate::error::{ErrorCode, ShardError};

/// Join keys an extension table may use, per §6.4. `Provenance` must never
/// be a sole key; `Span` is acceptable only as a secondary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKey {
    EvidenceAddr,
    ClaimId,
    EntityId,
    ShardId,
    SourceHash,
    Span,
    Provenance,
}

impl JoinKey {
    #[must_use]
    pub const fn is_stable_primary(self) -> bool {
        !matches!(self, Self::Span | Self::Provenance)
    }
}

/// A parsed `<name>@<version>` extension identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ExtensionName {
    pub name: String,
    pub version: String,
    pub ext: String,
}

impl ExtensionName {
    /// The registry key a validator is looked up by: `<name>@<version>`.
    #[must_use]
    pub fn registry_key(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// Parse a filename of the form `<name>@<version>.<ext>`.
#[must_use]
pub fn parse_extension_filename(filename: &str) -> Option<ExtensionName> {
    let (stem, ext) = filename.rsplit_once('.')?;
    let (name, version) = stem.split_once('@')?;
    if name.is_empty() || version.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ExtensionName {
        name: name.to_string(),
        version: version.to_string(),
        ext: ext.to_string(),
    })
}

/// Validate that every file under the extensions directory has a
/// well-formed `<name>@<version>.<ext>` name. Unknown names are still
/// permitted -- only the shape is checked, never the content.
///
/// # Errors
///
/// [`ErrorCode::ELayoutDirty`] listing every malformed filename found.
pub fn validate_extension_filenames(filenames: &[String]) -> Result<(), Vec<ShardError>> {
    let mut errors = Vec::new();
    for filename in filenames {
        if parse_extension_filename(filename).is_none() {
            errors.push(ShardError::at_path(
                ErrorCode::ELayoutDirty,
                format!("ext/{filename}"),
                "extension filename must match '<name>@<version>.<ext>'",
            ));
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// A validator a caller registers for one specific `<name>@<version>` extension.
pub trait ExtensionValidator {
    fn validate(&self, bytes: &[u8]) -> Result<(), ShardError>;
}

/// The single dispatch point for extension-specific validation. The core
/// verifier never calls into this directly -- it is opt-in machinery for
/// callers that want to check a known extension's contents.
#[derive(Default)]
pub struct ExtensionRegistry {
    validators: HashMap<String, Box<dyn ExtensionValidator>>,
}

impl ExtensionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, key: impl Into<String>, validator: Box<dyn ExtensionValidator>) {
        self.validators.insert(key.into(), validator);
    }

    /// Run every registered validator against the matching extension file.
    /// Files with no registered validator are treated as inert bytes and
    /// skipped, per §4.9.
    ///
    /// # Errors
    ///
    /// Every validation failure collected, never short-circuited.
    pub fn validate_all(
        &self,
        extension_files: &std::collections::BTreeMap<String, Vec<u8>>,
    ) -> Result<(), Vec<ShardError>> {
        let mut errors = Vec::new();
        for (filename, bytes) in extension_files {
            let Some(parsed) = parse_extension_filename(filename) else {
                continue;
            };
            if let Some(validator) = self.validators.get(&parsed.registry_key()) {
                if let Err(e) = validator.validate(bytes) {
                    errors.push(e);
                }
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
