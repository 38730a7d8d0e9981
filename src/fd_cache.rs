//! LRU file descriptor cache, keyed by absolute path.
//!
//! One cache instance is shared by every shard file and every value
//! file under one index; `open_fd` is a soft cap on how many stay open
//! at once, with least-recently-used eviction once the cap is reached.

use std::fs::{File, OpenOptions};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};

pub type FileHandle = Arc<Mutex<File>>;

pub struct FdCache {
    cache: Mutex<LruCache<PathBuf, FileHandle>>,
}

impl FdCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap();
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached handle for `path`, opening (and creating the
    /// parent directory and file, if needed) on a cache miss.
    pub fn open(&self, path: &Path) -> Result<FileHandle> {
        let mut cache = self.cache.lock();
        if let Some(handle) = cache.get(path) {
            return Ok(Arc::clone(handle));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let handle: FileHandle = Arc::new(Mutex::new(file));
        if let Some((evicted_path, _)) = cache.push(path.to_path_buf(), Arc::clone(&handle)) {
            if evicted_path != path {
                trace!(path = %evicted_path.display(), "evicted file descriptor from cache");
            }
        }
        Ok(handle)
    }

    /// Number of descriptors currently cached.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
