//! The shard set: the family of `midx_n` files under one key-derived
//! directory, probed in increasing shard number to resolve collisions
//! between different keys hashing to the same bucket slot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::bucket::Bucket;
use crate::config::Config;
use crate::error::Result;
use crate::fd_cache::FdCache;
use crate::hash::key_digest;
use crate::shard::{ProbeOutcome, ShardFile};

/// Where a key resolved to within a shard set: which shard file, the
/// bucket slot within it, the key's digest, and whether the slot was
/// already occupied by this exact key.
pub struct Resolved {
    pub shard: Arc<ShardFile>,
    pub bucket: Bucket,
    pub slot_offset: u64,
    pub digest: Vec<u8>,
    pub outcome: ProbeOutcome,
}

/// One index's collection of shard files, rooted under the database
/// directory and one index subdirectory.
pub struct ShardSet {
    root: PathBuf,
    config: Config,
    key_size: usize,
    fd_cache: FdCache,
    shards: Mutex<HashMap<PathBuf, Arc<ShardFile>>>,
}

impl ShardSet {
    pub fn new(root: PathBuf, config: Config, key_size: usize) -> Self {
        Self {
            root,
            fd_cache: FdCache::new(config.open_fd),
            config,
            key_size,
            shards: Mutex::new(HashMap::new()),
        }
    }

    /// The hash-map directory for `key`: the path rooted at the shard
    /// set's root, derived from every key segment before the final
    /// delimiter.
    pub fn hm_dir(&self, key: &str) -> PathBuf {
        let delim = self.config.key_delim;
        let trimmed = key.trim_matches(delim);
        let parent = match trimmed.rfind(delim) {
            Some(idx) => &trimmed[..idx],
            None => "",
        };
        let mut dir = self.root.clone();
        for segment in parent.split(delim).filter(|s| !s.is_empty()) {
            dir.push(segment);
        }
        dir
    }

    fn shard_path(dir: &Path, num: u32) -> PathBuf {
        dir.join(format!("midx_{num}"))
    }

    fn open_shard(&self, dir: &Path, num: u32) -> Result<Arc<ShardFile>> {
        let path = Self::shard_path(dir, num);
        let mut shards = self.shards.lock();
        if let Some(shard) = shards.get(&path) {
            return Ok(Arc::clone(shard));
        }
        let shard = ShardFile::open_or_create(
            &path,
            &self.fd_cache,
            &self.config.key_hash,
            self.config.hash_limit,
            &self.config.fmt,
            &self.config.entry_map,
            self.config.header_len,
            self.key_size,
            num,
            dir,
        )?;
        let shard = Arc::new(shard);
        shards.insert(path, Arc::clone(&shard));
        Ok(shard)
    }

    /// Resolves `key` to a shard and bucket slot, probing `midx_1`,
    /// `midx_2`, … until the slot is empty or matches this key's
    /// digest. Creates shards as needed.
    pub fn resolve(&self, key: &str) -> Result<Resolved> {
        let dir = self.hm_dir(key);
        let digest = key_digest(&self.config.key_hash, key)?;
        let mut num = 1u32;
        loop {
            let shard = self.open_shard(&dir, num)?;
            let (outcome, bucket, slot_offset) = shard.probe(key, &digest)?;
            match outcome {
                ProbeOutcome::Empty | ProbeOutcome::SameKey => {
                    return Ok(Resolved {
                        shard,
                        bucket,
                        slot_offset,
                        digest,
                        outcome,
                    });
                }
                ProbeOutcome::Collision => {
                    num += 1;
                }
            }
        }
    }

    /// Looks up the current head bucket for `key` without creating any
    /// new shard files, for reads that must not allocate storage.
    pub fn find(&self, key: &str) -> Result<Option<Resolved>> {
        let dir = self.hm_dir(key);
        if !dir.exists() {
            return Ok(None);
        }
        let digest = key_digest(&self.config.key_hash, key)?;
        let mut num = 1u32;
        loop {
            let path = Self::shard_path(&dir, num);
            if !path.exists() {
                return Ok(None);
            }
            let shard = self.open_shard(&dir, num)?;
            let (outcome, bucket, slot_offset) = shard.probe(key, &digest)?;
            match outcome {
                ProbeOutcome::SameKey => {
                    return Ok(Some(Resolved {
                        shard,
                        bucket,
                        slot_offset,
                        digest,
                        outcome,
                    }));
                }
                ProbeOutcome::Empty => return Ok(None),
                ProbeOutcome::Collision => num += 1,
            }
        }
    }
}
