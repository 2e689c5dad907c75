use vellum_store::Transaction;

use crate::error::EngineError;

/// Reserved key for the index metadata page. A single zero byte sorts
/// before every term key, the analog of the metadata living in block zero.
pub const META_KEY: &[u8] = &[0x00];

const META_MAGIC: u32 = 0x5649_4458; // "VIDX"
const META_VERSION: u32 = 1;
const META_LEN: usize = 20;

pub const FLAG_MULTIKEY: u32 = 0x1;
pub const FLAG_TRUNCATED: u32 = 0x2;

/// Persisted composite-index metadata.
///
/// The flags field is owned by this page layout; both flags are monotonic —
/// once set they are never cleared short of a full rebuild. Concurrent
/// check-then-set sequences may race, but every losing write still asserts
/// the same bit, so the races are idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexMeta {
    pub version: u32,
    pub flags: u32,
    pub entry_count: u64,
}

impl IndexMeta {
    pub fn new() -> Self {
        IndexMeta {
            version: META_VERSION,
            flags: 0,
            entry_count: 0,
        }
    }

    pub fn is_multikey(&self) -> bool {
        self.flags & FLAG_MULTIKEY != 0
    }

    pub fn is_truncated(&self) -> bool {
        self.flags & FLAG_TRUNCATED != 0
    }

    pub fn encode(&self) -> [u8; META_LEN] {
        let mut out = [0u8; META_LEN];
        out[0..4].copy_from_slice(&META_MAGIC.to_be_bytes());
        out[4..8].copy_from_slice(&self.version.to_be_bytes());
        out[8..12].copy_from_slice(&self.flags.to_be_bytes());
        out[12..20].copy_from_slice(&self.entry_count.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, EngineError> {
        if bytes.len() != META_LEN {
            return Err(EngineError::Corrupt(format!(
                "index metadata page has {} bytes, expected {META_LEN}",
                bytes.len()
            )));
        }
        let read_u32 =
            |at: usize| u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let magic = read_u32(0);
        if magic != META_MAGIC {
            return Err(EngineError::Corrupt(format!(
                "bad index metadata magic: {magic:#x}"
            )));
        }
        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[12..20]);
        Ok(IndexMeta {
            version: read_u32(4),
            flags: read_u32(8),
            entry_count: u64::from_be_bytes(count),
        })
    }
}

impl Default for IndexMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// Load the metadata page, initializing an empty one for a fresh index.
pub fn load_meta<T: Transaction>(txn: &T, ks: &T::Ks) -> Result<IndexMeta, EngineError> {
    match txn.get(ks, META_KEY)? {
        Some(bytes) => IndexMeta::decode(&bytes),
        None => Ok(IndexMeta::new()),
    }
}

pub fn store_meta<T: Transaction>(
    txn: &T,
    ks: &T::Ks,
    meta: &IndexMeta,
) -> Result<(), EngineError> {
    txn.put(ks, META_KEY, &meta.encode())?;
    Ok(())
}

/// Set a metadata flag if it is not set yet. Returns whether a write
/// happened. Callers hold a write transaction, whose commit is the
/// durability point for the flag.
pub fn mark_flag<T: Transaction>(txn: &T, ks: &T::Ks, flag: u32) -> Result<bool, EngineError> {
    let mut meta = load_meta(txn, ks)?;
    if meta.flags & flag != 0 {
        return Ok(false);
    }
    meta.flags |= flag;
    store_meta(txn, ks, &meta)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vellum_store::{MemoryStore, Store};

    #[test]
    fn encode_decode_roundtrip() {
        let meta = IndexMeta {
            version: 1,
            flags: FLAG_MULTIKEY | FLAG_TRUNCATED,
            entry_count: 42,
        };
        assert_eq!(IndexMeta::decode(&meta.encode()).unwrap(), meta);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(IndexMeta::decode(&[0u8; 3]).is_err());
        assert!(IndexMeta::decode(&[0u8; META_LEN]).is_err());
    }

    #[test]
    fn fresh_index_has_empty_meta() {
        let store = MemoryStore::new();
        store.create_keyspace("ix").unwrap();
        let txn = store.begin(true).unwrap();
        let ks = txn.keyspace("ix").unwrap();
        let meta = load_meta(&txn, &ks).unwrap();
        assert!(!meta.is_multikey());
        assert!(!meta.is_truncated());
    }

    #[test]
    fn mark_flag_is_monotonic() {
        let store = MemoryStore::new();
        store.create_keyspace("ix").unwrap();

        let txn = store.begin(false).unwrap();
        let ks = txn.keyspace("ix").unwrap();
        assert!(mark_flag(&txn, &ks, FLAG_MULTIKEY).unwrap());
        // Second set is a no-op, not an error.
        assert!(!mark_flag(&txn, &ks, FLAG_MULTIKEY).unwrap());
        txn.commit().unwrap();

        let txn = store.begin(true).unwrap();
        let ks = txn.keyspace("ix").unwrap();
        assert!(load_meta(&txn, &ks).unwrap().is_multikey());
    }
}
