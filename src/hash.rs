//! Key hashing: the cryptographic digest stored in bucket slots, and the
//! cheap integer hash used purely for bucket addressing.
//!
//! The two are deliberately distinct functions: addressing wants
//! something fast and well-distributed, not collision resistant; the
//! stored digest wants an exact-match fingerprint, not an address.

use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// Returns the byte width of the digest produced by `name`.
///
/// Only `sha1` is wired up; any other name is a configuration error at
/// `create` time.
pub fn digest_width(name: &str) -> Result<usize> {
    match name {
        "sha1" => Ok(20),
        other => Err(Error::InvalidConfig {
            reason: format!("unknown key_hash '{other}'"),
        }),
    }
}

/// Computes the cryptographic digest of `key` under the named hash
/// function, for storage in a bucket's `key` field.
pub fn key_digest(name: &str, key: &str) -> Result<Vec<u8>> {
    match name {
        "sha1" => {
            let mut hasher = Sha1::new();
            hasher.update(key.as_bytes());
            Ok(hasher.finalize().to_vec())
        }
        other => Err(Error::InvalidConfig {
            reason: format!("unknown key_hash '{other}'"),
        }),
    }
}

/// The non-cryptographic integer hash used to derive a bucket slot.
///
/// SeaHash has no dependency on process-local randomization: an on-disk
/// address must be stable across processes and restarts.
pub fn bucket_hash(key: &str) -> u64 {
    seahash::hash(key.as_bytes())
}

/// Derives the bucket slot index (0-based, within `[0, hash_limit]`) for
/// `key` under a shard with the given `hash_limit`.
///
/// `hash_limit` must be of the form `2^n - 1`; callers validate this at
/// configuration time (`INVALID_CONFIG` otherwise), so the mask here is
/// assumed branch-free and correct.
pub fn bucket_slot(key: &str, hash_limit: u64) -> u64 {
    bucket_hash(key) & hash_limit
}

/// Returns `true` if `n` is of the form `2^k - 1` for some `k >= 0`
/// (`0` is valid: a single-bucket shard).
pub fn is_valid_hash_limit(n: u64) -> bool {
    (n & (n + 1)) == 0
}
