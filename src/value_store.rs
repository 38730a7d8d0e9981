//! The append-only value store.
//!
//! One value file (`stor_<num>`) per shard, holding
//! `serialize({d: payload, id_: record id})` records concatenated with
//! no separator. Record boundaries live only in the `(st, sz)` pairs
//! recorded by the index, not in the value file itself.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{CorruptStoreSnafu, Error, Result};
use crate::fd_cache::FdCache;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct ValueRecord {
    d: Vec<u8>,
    id_: String,
}

/// Coordinates identifying which shard's value file an operation
/// targets: the shard directory and the shard number (`stor_<num>`
/// lives alongside `midx_<num>`).
#[derive(Debug, Clone)]
pub struct ShardCoordinates {
    pub dir: PathBuf,
    pub shard_num: u32,
}

impl ShardCoordinates {
    pub fn value_file_path(&self) -> PathBuf {
        self.dir.join(format!("stor_{}", self.shard_num))
    }
}

/// Append-only value store shared by every shard of one index.
pub struct ValueStore {
    files: FdCache,
    sync: bool,
}

impl ValueStore {
    pub fn new(open_fd: usize, sync: bool) -> Self {
        Self {
            files: FdCache::new(open_fd),
            sync,
        }
    }

    /// Appends `{data, id}` to the value file for `coords`, returning
    /// `(start, size)` of the written record.
    ///
    /// The entire serialized record is emitted with a single
    /// `write_all` call.
    pub fn insert(&self, key: &str, data: &[u8], id: &str, coords: &ShardCoordinates) -> Result<(u64, u64)> {
        let path = coords.value_file_path();
        let record = ValueRecord {
            d: data.to_vec(),
            id_: id.to_string(),
        };
        let payload = rmp_serde::to_vec_named(&record).map_err(|source| Error::Encode { source })?;

        let handle = self.files.open(&path)?;
        let mut file = handle.lock();
        let start = file
            .seek(SeekFrom::End(0))
            .map_err(|source| Error::Io { path: path.clone(), source })?;
        file.write_all(&payload)
            .map_err(|source| Error::Io { path: path.clone(), source })?;
        if self.sync {
            file.sync_all()
                .map_err(|source| Error::Io { path: path.clone(), source })?;
        }
        let size = payload.len() as u64;
        trace!(key, path = %path.display(), start, size, "appended value record");
        Ok((start, size))
    }

    /// Reads back exactly `size` bytes at `start` in the value file for
    /// `coords` and deserializes the payload.
    pub fn get(&self, start: u64, size: u64, coords: &ShardCoordinates) -> Result<Vec<u8>> {
        let path = coords.value_file_path();
        let handle = self.files.open(&path)?;
        let mut file = handle.lock();
        file.seek(SeekFrom::Start(start))
            .map_err(|source| Error::Io { path: path.clone(), source })?;
        let mut buf = vec![0u8; size as usize];
        let read = read_fill(&mut file, &mut buf, &path)?;
        if read != buf.len() {
            return CorruptStoreSnafu {
                path,
                expected: buf.len(),
                actual: read,
            }
            .fail();
        }
        let record: ValueRecord = rmp_serde::from_slice(&buf).map_err(|source| Error::Decode { source })?;
        Ok(record.d)
    }
}

fn read_fill(file: &mut File, buf: &mut [u8], path: &Path) -> Result<usize> {
    let mut total = 0;
    loop {
        match file
            .read(&mut buf[total..])
            .map_err(|source| Error::Io { path: path.to_path_buf(), source })?
        {
            0 => return Ok(total),
            n => {
                total += n;
                if total == buf.len() {
                    return Ok(total);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let coords = ShardCoordinates {
            dir: dir.path().to_path_buf(),
            shard_num: 1,
        };
        let store = ValueStore::new(8, false);
        let (start, size) = store.insert("/a/b", b"hello world", "id1", &coords).unwrap();
        let data = store.get(start, size, &coords).unwrap();
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn two_inserts_do_not_overlap() {
        let dir = tempfile::tempdir().unwrap();
        let coords = ShardCoordinates {
            dir: dir.path().to_path_buf(),
            shard_num: 1,
        };
        let store = ValueStore::new(8, false);
        let (s1, sz1) = store.insert("/a/b", b"first", "id1", &coords).unwrap();
        let (s2, sz2) = store.insert("/a/b", b"second-payload", "id2", &coords).unwrap();
        assert_eq!(store.get(s1, sz1, &coords).unwrap(), b"first");
        assert_eq!(store.get(s2, sz2, &coords).unwrap(), b"second-payload");
    }

    #[test]
    fn short_read_is_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let coords = ShardCoordinates {
            dir: dir.path().to_path_buf(),
            shard_num: 1,
        };
        let store = ValueStore::new(8, false);
        let (start, size) = store.insert("/a/b", b"hello", "id1", &coords).unwrap();
        let result = store.get(start, size + 100, &coords);
        assert!(matches!(result, Err(Error::CorruptStore { .. })));
    }
}
