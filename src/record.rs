//! The revision entry: the variable-width, length-prefixed record
//! written into a shard file's tail region.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CorruptRecordSnafu, Error, RecordTooLargeSnafu, Result, ShortWriteSnafu};

/// One version of one key's data reference, plus the link to the
/// previous revision entry for the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionEntry {
    /// The full key string.
    pub key: String,
    /// Value-store offset.
    pub st: u64,
    /// Value-store size.
    pub sz: u64,
    /// Monotonic revision token.
    pub rev: u64,
    /// Type tag, nullable.
    pub t: Option<u8>,
    /// Offset of the previous revision entry for this key, nullable.
    pub p: Option<u64>,
    /// Record id.
    pub id: String,
}

impl RevisionEntry {
    /// Encodes this entry as `[2-byte BE length][payload]`.
    ///
    /// A payload over `u16::MAX` bytes cannot be framed by a 2-byte
    /// length prefix at all, so that's surfaced as an encode failure
    /// before any bytes are written.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = rmp_serde::to_vec_named(self).map_err(|source| Error::Encode { source })?;
        if payload.len() > u16::MAX as usize {
            return RecordTooLargeSnafu {
                path: PathBuf::new(),
                len: payload.len(),
            }
            .fail();
        }
        let mut buf = Vec::with_capacity(2 + payload.len());
        buf.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Writes the encoded entry at the end of `file`, returning the
    /// offset it was written at.
    ///
    /// The entire length-prefixed record is written with one
    /// `write_all` call; a short write is impossible to observe through
    /// `std::io::Write::write_all` (it either writes everything or
    /// fails), but the byte count is still checked in case a future
    /// writer swaps in a partial-write-tolerant primitive.
    pub fn append(&self, file: &mut File, path: &Path) -> Result<u64> {
        let buf = self.encode()?;
        let offset = file
            .seek(SeekFrom::End(0))
            .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        let written = write_all_counted(file, &buf, path)?;
        if written != buf.len() {
            return ShortWriteSnafu {
                path: path.to_path_buf(),
                expected: buf.len(),
                actual: written,
            }
            .fail();
        }
        Ok(offset)
    }

    /// Reads and decodes the revision entry at `offset` in `file`.
    pub fn read_at(file: &mut File, offset: u64, path: &Path) -> Result<Self> {
        file.seek(SeekFrom::Start(offset))
            .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
        let mut len_buf = [0u8; 2];
        file.read_exact(&mut len_buf).map_err(|_| {
            CorruptRecordSnafu {
                path: path.to_path_buf(),
                offset,
            }
            .build()
        })?;
        let len = u16::from_be_bytes(len_buf) as usize;
        let mut payload = vec![0u8; len];
        file.read_exact(&mut payload).map_err(|_| {
            CorruptRecordSnafu {
                path: path.to_path_buf(),
                offset,
            }
            .build()
        })?;
        rmp_serde::from_slice(&payload).map_err(|source| Error::Decode { source })
    }
}

fn write_all_counted(file: &mut File, buf: &[u8], path: &Path) -> Result<usize> {
    file.write_all(buf)
        .map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    Ok(buf.len())
}
