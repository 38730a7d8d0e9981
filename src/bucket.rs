//! Fixed-width bucket codec.
//!
//! A bucket's on-disk layout is driven by a format descriptor (`fmt`,
//! e.g. `>KsQ`) and an entry map naming each positional field. `K`
//! denotes the key digest width, `s` a one-byte field, `Q` a
//! big-endian `u64`. The codec computes the packed width once, at
//! shard-open time, by packing a representative record.

use tracing::warn;

use crate::error::{InvalidConfigSnafu, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// The key digest, `key_size` bytes wide.
    Digest,
    /// A single reserved byte (the type tag slot in the default format).
    Byte,
    /// A big-endian `u64` (the `prev` revision-entry offset).
    U64,
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// Compiled bucket layout: which named fields occupy which byte ranges.
#[derive(Debug, Clone)]
pub struct BucketSchema {
    fields: Vec<FieldSpec>,
    key_size: usize,
    bucket_size: usize,
}

impl BucketSchema {
    /// Parses `fmt`/`entry_map` into a concrete, fixed-width layout.
    ///
    /// `entry_map` must have exactly as many names as `fmt` has type
    /// tokens (after the optional leading `>` byte-order marker); a
    /// mismatch, an empty map, or an unrecognized token is
    /// `INVALID_CONFIG`.
    pub fn new(fmt: &str, entry_map: &[String], key_size: usize) -> Result<Self> {
        let body = fmt.strip_prefix('>').unwrap_or(fmt);
        let mut kinds = Vec::with_capacity(body.len());
        for token in body.chars() {
            let kind = match token {
                'K' => FieldKind::Digest,
                's' => FieldKind::Byte,
                'Q' => FieldKind::U64,
                other => {
                    return InvalidConfigSnafu {
                        reason: format!("unsupported bucket format token '{other}'"),
                    }
                    .fail()
                }
            };
            kinds.push(kind);
        }
        if kinds.is_empty() {
            return InvalidConfigSnafu {
                reason: "bucket format must name at least one field".to_string(),
            }
            .fail();
        }
        if kinds.len() != entry_map.len() {
            return InvalidConfigSnafu {
                reason: format!(
                    "fmt names {} fields but entry_map names {}",
                    kinds.len(),
                    entry_map.len()
                ),
            }
            .fail();
        }

        let mut bucket_size = 0usize;
        let fields = kinds
            .into_iter()
            .zip(entry_map.iter().cloned())
            .map(|(kind, name)| {
                bucket_size += match kind {
                    FieldKind::Digest => key_size,
                    FieldKind::Byte => 1,
                    FieldKind::U64 => 8,
                };
                FieldSpec { name, kind }
            })
            .collect();

        if !entry_map.iter().any(|n| n == "key") {
            return InvalidConfigSnafu {
                reason: "entry_map must include a 'key' field".to_string(),
            }
            .fail();
        }
        if !entry_map.iter().any(|n| n == "prev") {
            return InvalidConfigSnafu {
                reason: "entry_map must include a 'prev' field".to_string(),
            }
            .fail();
        }

        Ok(Self {
            fields,
            key_size,
            bucket_size,
        })
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Packs `values` into exactly `bucket_size` bytes, in entry-map
    /// order.
    pub fn pack(&self, values: &Bucket) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.bucket_size);
        for field in &self.fields {
            match field.kind {
                FieldKind::Digest => {
                    let mut digest = values.key.clone();
                    digest.resize(self.key_size, 0);
                    buf.extend_from_slice(&digest);
                }
                FieldKind::Byte => buf.push(values.type_tag.unwrap_or(0)),
                FieldKind::U64 => buf.extend_from_slice(&values.prev.to_be_bytes()),
            }
        }
        debug_assert_eq!(buf.len(), self.bucket_size);
        buf
    }

    /// Unpacks `raw` (exactly `bucket_size` bytes) into a [`Bucket`].
    ///
    /// A length mismatch or otherwise malformed slot is not a hard
    /// error: it's logged as a warning and treated as an empty bucket.
    pub fn unpack(&self, raw: &[u8], shard_path: &str, slot_offset: u64) -> Bucket {
        if raw.len() != self.bucket_size {
            warn!(
                path = shard_path,
                slot_offset, "corrupt bucket: length mismatch, treating as empty"
            );
            return Bucket::empty(self.key_size);
        }
        let mut bucket = Bucket::empty(self.key_size);
        let mut offset = 0;
        for field in &self.fields {
            match field.kind {
                FieldKind::Digest => {
                    bucket.key = raw[offset..offset + self.key_size].to_vec();
                    offset += self.key_size;
                }
                FieldKind::Byte => {
                    let tag = raw[offset];
                    bucket.type_tag = if tag == 0 { None } else { Some(tag) };
                    offset += 1;
                }
                FieldKind::U64 => {
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(&raw[offset..offset + 8]);
                    bucket.prev = u64::from_be_bytes(bytes);
                    offset += 8;
                }
            }
        }
        bucket
    }
}

/// The in-memory, decoded form of one bucket slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// The key digest. All-zero means the slot is logically empty.
    pub key: Vec<u8>,
    /// Optional type tag, carried end-to-end per the entry map.
    pub type_tag: Option<u8>,
    /// File offset of the most recent revision entry for this key, or
    /// 0 if none.
    pub prev: u64,
}

impl Bucket {
    pub fn empty(key_size: usize) -> Self {
        Self {
            key: vec![0u8; key_size],
            type_tag: None,
            prev: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.key.iter().all(|&b| b == 0)
    }
}
