//! Error types for the database, index, and value store layers.
//!
//! A corrupt bucket slot is deliberately not one of these variants: it's
//! logged and treated as an empty slot rather than propagated as an
//! error.

use std::io;
use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("database already exists at {}", path.display()))]
    AlreadyExists { path: PathBuf },

    #[snafu(display("no database found at {}", path.display()))]
    NotFound { path: PathBuf },

    #[snafu(display("index '{}' is already registered", name))]
    IndexAlreadyExists { name: String },

    #[snafu(display("index '{}' is not registered", name))]
    IndexNotFound { name: String },

    #[snafu(display(
        "header delimiter not found within {} bytes of {}",
        header_len,
        path.display()
    ))]
    CorruptHeader { path: PathBuf, header_len: usize },

    #[snafu(display(
        "truncated revision entry at offset {} in {}",
        offset,
        path.display()
    ))]
    CorruptRecord { path: PathBuf, offset: u64 },

    #[snafu(display(
        "record payload of {} bytes exceeds the 16-bit length prefix in {}",
        len,
        path.display()
    ))]
    RecordTooLarge { path: PathBuf, len: usize },

    #[snafu(display(
        "short read from value file {}: expected {} bytes, got {}",
        path.display(),
        expected,
        actual
    ))]
    CorruptStore {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[snafu(display(
        "short write to {}: expected {} bytes, wrote {}",
        path.display(),
        expected,
        actual
    ))]
    ShortWrite {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[snafu(display("invalid configuration: {}", reason))]
    InvalidConfig { reason: String },

    #[snafu(display("I/O error at {}: {}", path.display(), source))]
    Io { path: PathBuf, source: io::Error },

    #[snafu(display("failed to encode record: {}", source))]
    Encode { source: rmp_serde::encode::Error },

    #[snafu(display("failed to decode record: {}", source))]
    Decode { source: rmp_serde::decode::Error },
}

pub type Result<T> = std::result::Result<T, Error>;
