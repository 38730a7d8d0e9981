//! A single shard file (`midx_<num>`): header, bucket array, and a
//! tail region of revision entries.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::bucket::{Bucket, BucketSchema};
use crate::error::{Error, Result};
use crate::fd_cache::{FdCache, FileHandle};
use crate::hash::bucket_slot;
use crate::record::RevisionEntry;

/// The serialized header record carried in every shard file's header
/// region, sufficient to interpret the file standalone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardHeader {
    pub hash: String,
    pub h_limit: u64,
    pub header_len: usize,
    pub fmt: String,
    pub bucket_size: usize,
    pub entry_map: Vec<String>,
    pub dir: String,
    pub num: u32,
}

/// Result of probing one shard's bucket slot for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The slot is empty; this key may claim it in this shard.
    Empty,
    /// The slot holds a bucket for this exact key.
    SameKey,
    /// The slot is occupied by a different key; probe the next shard.
    Collision,
}

pub struct ShardFile {
    path: PathBuf,
    header: ShardHeader,
    schema: BucketSchema,
    handle: FileHandle,
}

impl ShardFile {
    /// Opens `path`, creating it (and its parent directory) if absent.
    pub fn open_or_create(
        path: &Path,
        fd_cache: &FdCache,
        hash_name: &str,
        hash_limit: u64,
        fmt: &str,
        entry_map: &[String],
        header_len: usize,
        key_size: usize,
        shard_num: u32,
        dir: &Path,
    ) -> Result<Self> {
        let schema = BucketSchema::new(fmt, entry_map, key_size)?;
        let exists = path.exists();
        let handle = fd_cache.open(path)?;

        let header = if exists {
            let mut file = handle.lock();
            crate::header::read_existing(&mut file, header_len, path)?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
            let header = ShardHeader {
                hash: hash_name.to_string(),
                h_limit: hash_limit,
                header_len,
                fmt: fmt.to_string(),
                bucket_size: schema.bucket_size(),
                entry_map: entry_map.to_vec(),
                dir: dir.display().to_string(),
                num: shard_num,
            };
            let mut file = handle.lock();
            crate::header::write_new(&mut file, &header, header_len, path)?;
            let bucket_array_len =
                header_len as u64 + (hash_limit + 1) * schema.bucket_size() as u64;
            file.set_len(bucket_array_len).map_err(|source| Error::Io {
                path: path.to_path_buf(),
                source,
            })?;
            trace!(
                path = %path.display(),
                bucket_array_len,
                "created shard file"
            );
            header
        };

        Ok(Self {
            path: path.to_path_buf(),
            header,
            schema,
            handle,
        })
    }

    pub fn header(&self) -> &ShardHeader {
        &self.header
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &BucketSchema {
        &self.schema
    }

    /// The bucket slot offset for `key`.
    pub fn slot_offset(&self, key: &str) -> u64 {
        self.header.header_len as u64
            + bucket_slot(key, self.header.h_limit) * self.header.bucket_size as u64
    }

    fn read_bucket_at(&self, slot_offset: u64) -> Result<Bucket> {
        let mut file = self.handle.lock();
        file.seek(SeekFrom::Start(slot_offset))
            .map_err(|source| Error::Io { path: self.path.clone(), source })?;
        let mut raw = vec![0u8; self.header.bucket_size];
        let read = read_fill(&mut file, &mut raw, &self.path)?;
        Ok(self.schema.unpack(&raw[..read], &self.path.display().to_string(), slot_offset))
    }

    fn write_bucket_at(&self, slot_offset: u64, bucket: &Bucket) -> Result<()> {
        let packed = self.schema.pack(bucket);
        let mut file = self.handle.lock();
        file.seek(SeekFrom::Start(slot_offset))
            .map_err(|source| Error::Io { path: self.path.clone(), source })?;
        file.write_all(&packed)
            .map_err(|source| Error::Io { path: self.path.clone(), source })?;
        Ok(())
    }

    pub fn sync(&self) -> Result<()> {
        let file = self.handle.lock();
        file.sync_all()
            .map_err(|source| Error::Io { path: self.path.clone(), source })
    }

    /// Probes this shard's bucket slot for `key`/`digest`.
    pub fn probe(&self, key: &str, digest: &[u8]) -> Result<(ProbeOutcome, Bucket, u64)> {
        let offset = self.slot_offset(key);
        let bucket = self.read_bucket_at(offset)?;
        let outcome = if bucket.is_empty() {
            ProbeOutcome::Empty
        } else if bucket.key == digest {
            ProbeOutcome::SameKey
        } else {
            ProbeOutcome::Collision
        };
        Ok((outcome, bucket, offset))
    }

    /// Executes the insert path for one shard: write the revision
    /// entry, then overwrite the bucket slot to point at it.
    #[allow(clippy::too_many_arguments)]
    pub fn commit_insert(
        &self,
        slot_offset: u64,
        key: &str,
        digest: &[u8],
        type_tag: Option<u8>,
        prev_head: u64,
        value_start: u64,
        value_size: u64,
        id: &str,
        rev_token: u64,
    ) -> Result<Bucket> {
        let entry = RevisionEntry {
            key: key.to_string(),
            st: value_start,
            sz: value_size,
            rev: rev_token,
            t: type_tag,
            p: if prev_head == 0 { None } else { Some(prev_head) },
            id: id.to_string(),
        };
        let i_pos = {
            let mut file = self.handle.lock();
            entry.append(&mut file, &self.path)?
        };

        let bucket = Bucket {
            key: digest.to_vec(),
            type_tag,
            prev: i_pos,
        };
        self.write_bucket_at(slot_offset, &bucket)?;
        Ok(bucket)
    }

    pub fn read_revision(&self, offset: u64) -> Result<RevisionEntry> {
        let mut file = self.handle.lock();
        RevisionEntry::read_at(&mut file, offset, &self.path)
    }

    /// Walks the revision chain from `head_offset` back through `p`,
    /// returning entries most-recent-first.
    pub fn revision_chain(&self, head_offset: u64) -> Result<Vec<RevisionEntry>> {
        let mut chain = Vec::new();
        let mut next = Some(head_offset);
        while let Some(offset) = next {
            let entry = self.read_revision(offset)?;
            next = entry.p;
            chain.push(entry);
        }
        Ok(chain)
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
    use crate::fd_cache::FdCache;

    fn entry_map() -> Vec<String> {
        vec!["key".to_string(), "type".to_string(), "prev".to_string()]
    }

    #[test]
    fn creates_and_reopens_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midx_1");
        let cache = FdCache::new(8);
        {
            let shard = ShardFile::open_or_create(
                &path, &cache, "sha1", 0xff, ">KsQ", &entry_map(), 1024, 20, 1, dir.path(),
            )
            .unwrap();
            assert_eq!(shard.header().num, 1);
        }
        let cache2 = FdCache::new(8);
        let reopened = ShardFile::open_or_create(
            &path, &cache2, "sha1", 0xff, ">KsQ", &entry_map(), 1024, 20, 1, dir.path(),
        )
        .unwrap();
        assert_eq!(reopened.header().h_limit, 0xff);
        assert_eq!(reopened.header().bucket_size, 20 + 1 + 8);
    }

    #[test]
    fn empty_slot_probes_empty_then_insert_makes_it_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("midx_1");
        let cache = FdCache::new(8);
        let shard = ShardFile::open_or_create(
            &path, &cache, "sha1", 0xff, ">KsQ", &entry_map(), 1024, 20, 1, dir.path(),
        )
        .unwrap();

        let digest = crate::hash::key_digest("sha1", "/a/b").unwrap();
        let (outcome, _bucket, offset) = shard.probe("/a/b", &digest).unwrap();
        assert_eq!(outcome, ProbeOutcome::Empty);

        shard
            .commit_insert(offset, "/a/b", &digest, None, 0, 10, 20, "id1", 1)
            .unwrap();

        let (outcome, bucket, _) = shard.probe("/a/b", &digest).unwrap();
        assert_eq!(outcome, ProbeOutcome::SameKey);
        assert_ne!(bucket.prev, 0);

        let chain = shard.revision_chain(bucket.prev).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].st, 10);
    }
}
