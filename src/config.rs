//! Database configuration.
//!
//! A plain, `serde`-serializable struct with documented fields and sane
//! defaults, validated once at `create` time rather than scattered
//! through the write path.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::is_valid_hash_limit;

/// Database-wide configuration, written into `maras_meta.db` at `create`
/// and re-read on every subsequent `open`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Per-shard bucket count mask. Must be `2^n - 1`; `hash_limit + 1`
    /// buckets exist per shard file.
    pub hash_limit: u64,

    /// Name of the cryptographic hash used for key digests stored in
    /// bucket slots.
    pub key_hash: String,

    /// Bucket pack format descriptor (e.g. `>KsQ`): `K` for the key
    /// digest, `s` for a one-byte tag, `Q` for a big-endian `u64`.
    pub fmt: String,

    /// Ordered list of bucket field names, naming the positions in
    /// `fmt`.
    pub entry_map: Vec<String>,

    /// Byte length reserved for each file's header region.
    pub header_len: usize,

    /// Path separator used within keys.
    pub key_delim: char,

    /// Soft cap on simultaneously open file descriptors.
    pub open_fd: usize,

    /// If true, fsync after every write.
    pub sync: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hash_limit: 0xfffff,
            key_hash: "sha1".to_string(),
            fmt: ">KsQ".to_string(),
            entry_map: vec!["key".to_string(), "type".to_string(), "prev".to_string()],
            header_len: 1024,
            key_delim: '/',
            open_fd: 512,
            sync: true,
        }
    }
}

impl Config {
    /// Validates the configuration, surfacing `INVALID_CONFIG` for a
    /// `hash_limit` not of the form `2^n - 1`, an unknown `key_hash`, or
    /// an empty `entry_map`.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_hash_limit(self.hash_limit) {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "hash_limit {:#x} is not of the form 2^n - 1",
                    self.hash_limit
                ),
            });
        }
        crate::hash::digest_width(&self.key_hash)?;
        if self.entry_map.is_empty() {
            return Err(Error::InvalidConfig {
                reason: "entry_map must not be empty".to_string(),
            });
        }
        if !self.entry_map.iter().any(|f| f == "key") {
            return Err(Error::InvalidConfig {
                reason: "entry_map must include a 'key' field".to_string(),
            });
        }
        if !self.entry_map.iter().any(|f| f == "prev") {
            return Err(Error::InvalidConfig {
                reason: "entry_map must include a 'prev' field".to_string(),
            });
        }
        if self.header_len == 0 {
            return Err(Error::InvalidConfig {
                reason: "header_len must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_bad_hash_limit() {
        let mut cfg = Config::default();
        cfg.hash_limit = 0x100;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_empty_entry_map() {
        let mut cfg = Config::default();
        cfg.entry_map.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_unknown_hash() {
        let mut cfg = Config::default();
        cfg.key_hash = "blake3".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_entry_map_without_prev() {
        let mut cfg = Config::default();
        cfg.entry_map = vec!["key".to_string(), "type".to_string()];
        cfg.fmt = ">Ks".to_string();
        assert!(cfg.validate().is_err());
    }
}
