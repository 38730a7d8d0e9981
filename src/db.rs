//! The database façade: holds the header metadata, the registered
//! indexes, and the value store, and orchestrates the write sequence
//! for `insert` across all of them.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::RngCore;
use tracing::instrument;

use crate::config::Config;
use crate::error::{AlreadyExistsSnafu, Error, IndexAlreadyExistsSnafu, IndexNotFoundSnafu, NotFoundSnafu, Result};
use crate::hash::digest_width;
use crate::header;
use crate::record::RevisionEntry;
use crate::shard_set::ShardSet;
use crate::value_store::{ShardCoordinates, ValueStore};

const META_FILE_NAME: &str = "maras_meta.db";

/// The bucket reference returned by `insert` for one index: where the
/// new revision landed, and the bucket slot that now points at it.
#[derive(Debug, Clone)]
pub struct BucketRef {
    pub shard_path: PathBuf,
    pub slot_offset: u64,
    pub head_offset: u64,
    pub start: u64,
    pub size: u64,
}

struct IndexHandle {
    name: String,
    shard_set: Arc<ShardSet>,
}

/// A single-writer, on-disk key/value database: one hash-based index
/// (or more) over an append-only value log.
pub struct Database {
    root: PathBuf,
    config: Config,
    value_store: ValueStore,
    indexes: Mutex<Vec<IndexHandle>>,
    rev_counter: AtomicU64,
}

impl Database {
    fn meta_path(root: &Path) -> PathBuf {
        root.join(META_FILE_NAME)
    }

    /// Creates a new database directory and meta file.
    ///
    /// Fails with `ALREADY_EXISTS` if the meta file is already present.
    #[instrument(skip(config))]
    pub fn create(root: impl Into<PathBuf>, config: Config) -> Result<Self> {
        config.validate()?;
        let root = root.into();
        let meta_path = Self::meta_path(&root);
        if meta_path.exists() {
            return AlreadyExistsSnafu { path: meta_path }.fail();
        }
        std::fs::create_dir_all(&root).map_err(|source| Error::Io { path: root.clone(), source })?;

        let mut file = std::fs::File::options()
            .create(true)
            .read(true)
            .write(true)
            .open(&meta_path)
            .map_err(|source| Error::Io { path: meta_path.clone(), source })?;
        header::write_new(&mut file, &config, config.header_len, &meta_path)?;

        Ok(Self {
            root,
            value_store: ValueStore::new(config.open_fd, config.sync),
            config,
            indexes: Mutex::new(Vec::new()),
            rev_counter: AtomicU64::new(0),
        })
    }

    /// Opens an existing database directory.
    ///
    /// Fails with `NOT_FOUND` if the meta file is absent.
    #[instrument]
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let meta_path = Self::meta_path(&root);
        if !meta_path.is_file() {
            return NotFoundSnafu { path: meta_path }.fail();
        }
        let mut file = std::fs::File::options()
            .read(true)
            .open(&meta_path)
            .map_err(|source| Error::Io { path: meta_path.clone(), source })?;
        // header_len isn't known yet, so the default is used to read
        // the first chunk before the real config (with its own
        // header_len) is parsed out of it.
        let default_header_len = Config::default().header_len;
        let config: Config = header::read_existing(&mut file, default_header_len, &meta_path)?;

        Ok(Self {
            root,
            value_store: ValueStore::new(config.open_fd, config.sync),
            config,
            indexes: Mutex::new(Vec::new()),
            rev_counter: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers a named index, allocating its shard-set manager.
    ///
    /// Fails with `ALREADY_EXISTS` if an index of that name is already
    /// registered.
    #[instrument(skip(self))]
    pub fn add_index(&self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let mut indexes = self.indexes.lock();
        if indexes.iter().any(|i| i.name == name) {
            return IndexAlreadyExistsSnafu { name }.fail();
        }
        let key_size = digest_width(&self.config.key_hash)?;
        let shard_set = Arc::new(ShardSet::new(
            self.root.join(&name),
            self.config.clone(),
            key_size,
        ));
        indexes.push(IndexHandle { name, shard_set });
        Ok(())
    }

    fn index(&self, name: &str) -> Result<Arc<ShardSet>> {
        let indexes = self.indexes.lock();
        indexes
            .iter()
            .find(|i| i.name == name)
            .map(|i| Arc::clone(&i.shard_set))
            .ok_or_else(|| IndexNotFoundSnafu { name: name.to_string() }.build())
    }

    /// Inserts `data` under `key` into every registered index, returning
    /// one [`BucketRef`] per index.
    #[instrument(skip(self, data))]
    pub fn insert(
        &self,
        data: &[u8],
        key: &str,
        id: Option<String>,
    ) -> Result<Vec<(String, BucketRef)>> {
        let id = id.unwrap_or_else(|| self.generate_id());
        let indexes: Vec<(String, Arc<ShardSet>)> = {
            let guard = self.indexes.lock();
            guard
                .iter()
                .map(|i| (i.name.clone(), Arc::clone(&i.shard_set)))
                .collect()
        };

        let mut results = Vec::with_capacity(indexes.len());
        for (name, shard_set) in indexes {
            let resolved = shard_set.resolve(key)?;
            let coords = ShardCoordinates {
                dir: PathBuf::from(&resolved.shard.header().dir),
                shard_num: resolved.shard.header().num,
            };
            let (start, size) = self.value_store.insert(key, data, &id, &coords)?;
            let rev_token = self.rev_counter.fetch_add(1, Ordering::SeqCst) + 1;
            let bucket = resolved.shard.commit_insert(
                resolved.slot_offset,
                key,
                &resolved.digest,
                None,
                resolved.bucket.prev,
                start,
                size,
                &id,
                rev_token,
            )?;
            results.push((
                name,
                BucketRef {
                    shard_path: resolved.shard.path().to_path_buf(),
                    slot_offset: resolved.slot_offset,
                    head_offset: bucket.prev,
                    start,
                    size,
                },
            ));
        }
        Ok(results)
    }

    /// Reads the current head revision's payload for `key` in the
    /// named index: resolve the bucket, read its head revision entry,
    /// then fetch the payload from the value store.
    pub fn get(&self, index: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let shard_set = self.index(index)?;
        let Some(resolved) = shard_set.find(key)? else {
            return Ok(None);
        };
        if resolved.bucket.prev == 0 {
            return Ok(None);
        }
        let entry = resolved.shard.read_revision(resolved.bucket.prev)?;
        let coords = ShardCoordinates {
            dir: PathBuf::from(&resolved.shard.header().dir),
            shard_num: resolved.shard.header().num,
        };
        let data = self.value_store.get(entry.st, entry.sz, &coords)?;
        Ok(Some(data))
    }

    /// Walks the full revision chain for `key` in the named index,
    /// most-recent-first.
    pub fn history(&self, index: &str, key: &str) -> Result<Vec<RevisionEntry>> {
        let shard_set = self.index(index)?;
        let Some(resolved) = shard_set.find(key)? else {
            return Ok(Vec::new());
        };
        if resolved.bucket.prev == 0 {
            return Ok(Vec::new());
        }
        resolved.shard.revision_chain(resolved.bucket.prev)
    }

    fn generate_id(&self) -> String {
        let width = digest_width(&self.config.key_hash).unwrap_or(20);
        let mut bytes = vec![0u8; width];
        rand::thread_rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }
}
