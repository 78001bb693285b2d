//! Signature suites: Ed25519 (legacy) and axm-blake3-mldsa44 (post-quantum).
//!
//! Both suites sign the raw bytes of the manifest file exactly once, read
//! from disk a single time and reused for every subsequent manifest-derived
//! check (§4.4 TOCTOU note). This module only deals with key/signature bytes
//! and suite bookkeeping; callers own the "read the manifest file once" part.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _, SecretKey as _,
};

use crate::error::{ErrorCode, ShardError};

/// The wire name stored in `manifest.suite` for the post-quantum suite.
/// Absence of the field means [`SignatureSuite::Ed25519Legacy`] (§3.2).
pub const SUITE_NAME_POST_QUANTUM: &str = "axm-blake3-mldsa44";

pub const ED25519_PUBLIC_KEY_LEN: usize = 32;
pub const ED25519_SIGNATURE_LEN: usize = 64;
pub const MLDSA44_PUBLIC_KEY_LEN: usize = 1312;
pub const MLDSA44_SIGNATURE_LEN: usize = 2420;
pub const MLDSA44_SECRET_KEY_LEN_SK_ONLY: usize = 2528;
pub const MLDSA44_SECRET_KEY_LEN_SK_PK: usize = 2528 + MLDSA44_PUBLIC_KEY_LEN;

/// Which signature suite a shard was sealed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureSuite {
    Ed25519Legacy,
    PostQuantum,
}

impl SignatureSuite {
    #[must_use]
    pub const fn manifest_name(self) -> Option<&'static str> {
        match self {
            Self::Ed25519Legacy => None,
            Self::PostQuantum => Some(SUITE_NAME_POST_QUANTUM),
        }
    }

    #[must_use]
    pub const fn expected_public_key_len(self) -> usize {
        match self {
            Self::Ed25519Legacy => ED25519_PUBLIC_KEY_LEN,
            Self::PostQuantum => MLDSA44_PUBLIC_KEY_LEN,
        }
    }

    #[must_use]
    pub const fn expected_signature_len(self) -> usize {
        match self {
            Self::Ed25519Legacy => ED25519_SIGNATURE_LEN,
            Self::PostQuantum => MLDSA44_SIGNATURE_LEN,
        }
    }

    /// Infer a suite purely from a public key's byte length, per §4.3.
    #[must_use]
    pub fn from_key_len(len: usize) -> Option<Self> {
        match len {
            ED25519_PUBLIC_KEY_LEN => Some(Self::Ed25519Legacy),
            MLDSA44_PUBLIC_KEY_LEN => Some(Self::PostQuantum),
            _ => None,
        }
    }

    /// Resolve the suite for a shard whose manifest may or may not name one.
    ///
    /// If the manifest names a suite, it must agree with what the embedded
    /// public key's size implies; disagreement is `E_SIG_INVALID` (§4.3).
    ///
    /// # Errors
    ///
    /// [`ErrorCode::ESigInvalid`] on an unrecognized key size or a
    /// manifest/key-size conflict.
    pub fn detect(manifest_suite: Option<&str>, public_key_len: usize) -> Result<Self, ShardError> {
        let from_key = Self::from_key_len(public_key_len).ok_or_else(|| {
            ShardError::shard(
                ErrorCode::ESigInvalid,
                format!("public key length {public_key_len} does not match any known suite"),
            )
        })?;

        match manifest_suite {
            None => {
                if from_key == Self::Ed25519Legacy {
                    Ok(Self::Ed25519Legacy)
                } else {
                    Err(ShardError::shard(
                        ErrorCode::ESigInvalid,
                        "manifest omits suite but key size implies post-quantum",
                    ))
                }
            }
            Some(name) if name == SUITE_NAME_POST_QUANTUM => {
                if from_key == Self::PostQuantum {
                    Ok(Self::PostQuantum)
                } else {
                    Err(ShardError::shard(
                        ErrorCode::ESigInvalid,
                        "manifest names post-quantum suite but key size implies legacy",
                    ))
                }
            }
            Some(other) => Err(ShardError::shard(
                ErrorCode::ESigInvalid,
                format!("unknown signature suite '{other}'"),
            )),
        }
    }

    /// Verify `signature` over `message` against `public_key`, both raw bytes.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::ESigInvalid`] if the key/signature bytes are malformed
    /// for this suite, or if verification fails.
    pub fn verify(
        self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<(), ShardError> {
        match self {
            Self::Ed25519Legacy => {
                let key_bytes: [u8; 32] = public_key.try_into().map_err(|_| {
                    ShardError::shard(ErrorCode::ESigInvalid, "ed25519 public key must be 32 bytes")
                })?;
                let verifying_key = VerifyingKey::from_bytes(&key_bytes).map_err(|e| {
                    ShardError::shard(ErrorCode::ESigInvalid, format!("invalid ed25519 public key: {e}"))
                })?;
                let sig_bytes: [u8; 64] = signature.try_into().map_err(|_| {
                    ShardError::shard(ErrorCode::ESigInvalid, "ed25519 signature must be 64 bytes")
                })?;
                let sig = ed25519_dalek::Signature::from_bytes(&sig_bytes);
                verifying_key
                    .verify(message, &sig)
                    .map_err(|e| ShardError::shard(ErrorCode::ESigInvalid, format!("ed25519 verify failed: {e}")))
            }
            Self::PostQuantum => {
                let pk = dilithium2::PublicKey::from_bytes(public_key).map_err(|e| {
                    ShardError::shard(ErrorCode::ESigInvalid, format!("invalid mldsa44 public key: {e:?}"))
                })?;
                let sig = dilithium2::DetachedSignature::from_bytes(signature).map_err(|e| {
                    ShardError::shard(
                        ErrorCode::ESigInvalid,
                        format!("invalid mldsa44 signature: {e:?}"),
                    )
                })?;
                dilithium2::verify_detached_signature(&sig, message, &pk)
                    .map_err(|e| ShardError::shard(ErrorCode::ESigInvalid, format!("mldsa44 verify failed: {e:?}")))
            }
        }
    }
}

/// A signing keypair for one suite, held in memory only for the duration of
/// a compile call.
pub enum SigningKeypair {
    Ed25519(Box<SigningKey>),
    PostQuantum {
        public_key: dilithium2::PublicKey,
        secret_key: dilithium2::SecretKey,
    },
}

impl SigningKeypair {
    #[must_use]
    pub fn suite(&self) -> SignatureSuite {
        match self {
            Self::Ed25519(_) => SignatureSuite::Ed25519Legacy,
            Self::PostQuantum { .. } => SignatureSuite::PostQuantum,
        }
    }

    #[must_use]
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.verifying_key().to_bytes().to_vec(),
            Self::PostQuantum { public_key, .. } => public_key.as_bytes().to_vec(),
        }
    }

    /// Load an Ed25519 keypair from a 32- or 64-byte opaque secret key.
    ///
    /// # Errors
    ///
    /// [`ErrorCode::ESigInvalid`] on a malformed secret key.
    pub fn load_ed25519(secret_bytes: &[u8]) -> Result<Self, ShardError> {
        let seed: [u8; 32] = match secret_bytes.len() {
            32 => secret_bytes.try_into().unwrap(),
            64 => secret_bytes[..32].try_into().unwrap(),
            other => {
                return Err(ShardError::shard(
                    ErrorCode::ESigInvalid,
                    format!("ed25519 secret key must be 32 or 64 bytes, got {other}"),
                ))
            }
        };
        Ok(Self::Ed25519(Box::new(SigningKey::from_bytes(&seed))))
    }

    /// Generate a fresh post-quantum keypair. Used by the compiler when no
    /// externally supplied signing key is given for the post-quantum suite.
    #[must_use]
    pub fn generate_post_quantum() -> Self {
        let (public_key, secret_key) = dilithium2::keypair();
        Self::PostQuantum {
            public_key,
            secret_key,
        }
    }

    /// Load a post-quantum keypair from a secret key, per §4.4's secret key
    /// format: either 2528 bytes (secret only -- `external_public_key` must
    /// be supplied) or 3840 bytes (secret‖public, self-contained).
    ///
    /// # Errors
    ///
    /// [`ErrorCode::ESigInvalid`] on a malformed secret key, or on a
    /// 2528-byte secret key with no `external_public_key` supplied.
    pub fn load_post_quantum(
        secret_bytes: &[u8],
        external_public_key: Option<&[u8]>,
    ) -> Result<Self, ShardError> {
        let (sk_bytes, public_key_bytes): (&[u8], &[u8]) = match secret_bytes.len() {
            MLDSA44_SECRET_KEY_LEN_SK_PK => {
                let (sk, pk) = secret_bytes.split_at(MLDSA44_SECRET_KEY_LEN_SK_ONLY);
                (sk, pk)
            }
            MLDSA44_SECRET_KEY_LEN_SK_ONLY => {
                let pk = external_public_key.ok_or_else(|| {
                    ShardError::shard(
                        ErrorCode::ESigInvalid,
                        "a 2528-byte mldsa44 secret key requires an external public key",
                    )
                })?;
                (secret_bytes, pk)
            }
            other => {
                return Err(ShardError::shard(
                    ErrorCode::ESigInvalid,
                    format!(
                        "mldsa44 secret key must be {MLDSA44_SECRET_KEY_LEN_SK_ONLY} or {MLDSA44_SECRET_KEY_LEN_SK_PK} bytes, got {other}"
                    ),
                ))
            }
        };

        let secret_key = dilithium2::SecretKey::from_bytes(sk_bytes).map_err(|e| {
            ShardError::shard(ErrorCode::ESigInvalid, format!("invalid mldsa44 secret key: {e:?}"))
        })?;
        let public_key = dilithium2::PublicKey::from_bytes(public_key_bytes).map_err(|e| {
            ShardError::shard(ErrorCode::ESigInvalid, format!("invalid mldsa44 public key: {e:?}"))
        })?;
        Ok(Self::PostQuantum {
            public_key,
            secret_key,
        })
    }

    /// Sign `message`, producing a detached signature.
    ///
    /// Both suites are deterministic: identical key and message always
    /// produce identical signature bytes (§4.4), which is what makes
    /// reproducible builds possible.
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            Self::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
            Self::PostQuantum { secret_key, .. } => {
                let sig = dilithium2::detached_sign(message, secret_key);
                sig.as_bytes().to_vec()
            }
        }
    }
}
