//! Shared header region format used by the database meta file and every
//! shard file: `serialize(header) ++ "_||_||_" ++ zero padding`, all
//! packed into exactly `header_len` bytes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};

use crate::error::{CorruptHeaderSnafu, Error, InvalidConfigSnafu, Result};

pub const HEADER_DELIM: &[u8] = b"_||_||_";

/// Packs `value` into a `header_len`-byte buffer: the MessagePack
/// encoding of `value`, the delimiter, and zero padding.
pub fn encode<T: Serialize>(value: &T, header_len: usize) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec_named(value).map_err(|source| Error::Encode { source })?;
    let needed = payload.len() + HEADER_DELIM.len();
    if needed > header_len {
        return InvalidConfigSnafu {
            reason: format!(
                "header payload ({needed} bytes) does not fit in header_len ({header_len} bytes)"
            ),
        }
        .fail();
    }
    let mut buf = vec![0u8; header_len];
    buf[..payload.len()].copy_from_slice(&payload);
    buf[payload.len()..needed].copy_from_slice(HEADER_DELIM);
    Ok(buf)
}

/// Writes a freshly encoded header to the start of `file`.
pub fn write_new<T: Serialize>(file: &mut File, value: &T, header_len: usize, path: &Path) -> Result<()> {
    let buf = encode(value, header_len)?;
    file.seek(SeekFrom::Start(0)).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    file.write_all(&buf).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    Ok(())
}

/// Reads and parses the header region of an already-existing file.
///
/// Reads successive `header_len`-sized chunks from the start of the file
/// until the delimiter is found; if it never appears the file is
/// corrupt and `CORRUPT_HEADER` is surfaced rather than guessed at.
pub fn read_existing<T: DeserializeOwned>(
    file: &mut File,
    header_len: usize,
    path: &Path,
) -> Result<T> {
    file.seek(SeekFrom::Start(0)).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    let mut accumulated = Vec::new();
    let mut chunk = vec![0u8; header_len];
    loop {
        let read = read_fill(file, &mut chunk, path)?;
        if read == 0 {
            return CorruptHeaderSnafu {
                path: path.to_path_buf(),
                header_len,
            }
            .fail();
        }
        accumulated.extend_from_slice(&chunk[..read]);
        if let Some(idx) = find_delim(&accumulated) {
            return rmp_serde::from_slice(&accumulated[..idx]).map_err(|source| Error::Decode { source });
        }
        if read < header_len {
            return CorruptHeaderSnafu {
                path: path.to_path_buf(),
                header_len,
            }
            .fail();
        }
    }
}

fn find_delim(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_DELIM.len()).position(|w| w == HEADER_DELIM)
}

fn read_fill(file: &mut File, buf: &mut [u8], path: &Path) -> Result<usize> {
    let mut total = 0;
    loop {
        match file.read(&mut buf[total..]).map_err(|source| Error::Io { path: path.to_path_buf(), source })? {
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
