//! Canonical hashing: domain-separated SHA-256 and the `ContentHash` wire type.
//!
//! Every cross-cutting hash in this crate (identifiers, extension join keys,
//! sources[] digests) that is not the Merkle root itself goes through
//! [`canonical_hash`] with an explicit [`HashDomain`]. The Merkle root uses
//! BLAKE3 directly (see [`crate::merkle`]) because its domain separation is
//! baked into the leaf/node byte layout rather than a SHA-256 prefix.

use sha2::{Digest, Sha256};

/// A content-addressed hash with an explicit algorithm tag.
///
/// Format: `"algorithm:hex_digest"` (e.g. `"sha256:abcdef..."`). The inner
/// string always has exactly one `:` separator with non-empty, validly
/// charactered substrings on both sides -- enforced by [`ContentHash::parse`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentHash {
    full: String,
    colon: usize,
}

impl ContentHash {
    /// Parse from `"algorithm:hex_digest"` format.
    ///
    /// Returns `None` if there isn't exactly one `:`, if the algorithm isn't
    /// non-empty lowercase ASCII alphanumeric, or if the digest isn't
    /// non-empty lowercase hex.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        let colon = s.find(':')?;
        if s[colon + 1..].contains(':') {
            return None;
        }

        let algorithm = &s[..colon];
        let digest = &s[colon + 1..];

        if algorithm.is_empty()
            || !algorithm
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return None;
        }

        if digest.is_empty()
            || !digest
                .bytes()
                .all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return None;
        }

        Some(Self {
            full: s.to_string(),
            colon,
        })
    }

    /// The algorithm portion (e.g. `"sha256"`).
    #[must_use]
    pub fn algorithm(&self) -> &str {
        &self.full[..self.colon]
    }

    /// The hex digest portion.
    #[must_use]
    pub fn hex_digest(&self) -> &str {
        &self.full[self.colon + 1..]
    }

    /// The full `"algorithm:hex_digest"` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.full
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

/// Declares `HashDomain`, `as_bytes()`, `ALL`, and `Display` from one list.
macro_rules! define_hash_domains {
    (
        $(
            $(#[$meta:meta])*
            $variant:ident => $bytes:expr
        ),+ $(,)?
    ) => {
        /// Typed domain separator for [`canonical_hash`].
        ///
        /// Every variant is a unique, null-terminated byte string used as a
        /// SHA-256 prefix. Adding a domain is a single addition to this list.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum HashDomain {
            $(
                $(#[$meta])*
                $variant,
            )+
        }

        impl HashDomain {
            /// The raw domain-separator bytes (null-terminated).
            #[must_use]
            pub const fn as_bytes(&self) -> &'static [u8] {
                match self {
                    $( Self::$variant => $bytes, )+
                }
            }

            /// All domain variants in declaration order.
            pub const ALL: &[HashDomain] = &[
                $( Self::$variant, )+
            ];
        }

        impl std::fmt::Display for HashDomain {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $( Self::$variant => write!(f, stringify!($variant)), )+
                }
            }
        }
    };
}

define_hash_domains! {
    /// `evidence_addr` -- stable joinable address, independent of evidence text.
    EvidenceAddr => b"SHARD::EVIDENCE_ADDR::V1\0",

    /// `span_id` -- commits to evidence text in addition to the byte range.
    SpanId => b"SHARD::SPAN_ID::V1\0",

    /// `provenance_id` -- unstable, never a sole join key.
    ProvenanceId => b"SHARD::PROVENANCE_ID::V1\0",

    /// `entity_id` -- derived from canonicalized namespace and label.
    EntityId => b"SHARD::ENTITY_ID::V1\0",

    /// `claim_id` -- derived from subject/predicate/object.
    ClaimId => b"SHARD::CLAIM_ID::V1\0",
}

/// Compute `sha256(domain_prefix || data)` and return it as a [`ContentHash`].
#[must_use]
pub fn canonical_hash(domain: HashDomain, data: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(data);
    let digest = hasher.finalize();
    let full = format!("sha256:{}", hex::encode(digest));
    ContentHash { full, colon: 6 }
}

/// Raw SHA-256 digest bytes of `domain || data`, with no hex/tag wrapping.
///
/// Used by [`crate::identity::b32l15`], which needs the raw bytes rather
/// than a [`ContentHash`].
#[must_use]
pub fn canonical_hash_bytes(domain: HashDomain, data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain.as_bytes());
    hasher.update(data);
    hasher.finalize().into()
}
