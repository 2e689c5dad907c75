use std::ops::Bound;

use crate::error::StoreError;

/// Half-open or fully bounded byte range for ordered scans.
///
/// Index range predicates compile down to one of these: the encoded lower
/// bound of the first matching term and the encoded upper bound of the last,
/// with inclusivity carried per edge.
#[derive(Debug, Clone)]
pub struct ScanRange {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
}

impl ScanRange {
    /// Scan everything in the keyspace.
    pub fn full() -> Self {
        ScanRange {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// All keys starting with `prefix`.
    ///
    /// The upper edge is the prefix with its last byte incremented; a prefix
    /// of all-0xFF bytes degrades to an unbounded upper edge.
    pub fn prefix(prefix: &[u8]) -> Self {
        let mut upper = prefix.to_vec();
        loop {
            match upper.last_mut() {
                Some(0xFF) => {
                    upper.pop();
                }
                Some(last) => {
                    *last += 1;
                    break;
                }
                None => {
                    return ScanRange {
                        lower: Bound::Included(prefix.to_vec()),
                        upper: Bound::Unbounded,
                    };
                }
            }
        }
        ScanRange {
            lower: Bound::Included(prefix.to_vec()),
            upper: Bound::Excluded(upper),
        }
    }
}

pub trait Store {
    type Txn<'a>: Transaction
    where
        Self: 'a;

    fn begin(&self, read_only: bool) -> Result<Self::Txn<'_>, StoreError>;
    fn create_keyspace(&self, name: &str) -> Result<(), StoreError>;
    fn drop_keyspace(&self, name: &str) -> Result<(), StoreError>;
}

pub trait Transaction {
    /// Backend-specific keyspace handle. Cheaply cloneable.
    type Ks: Clone;

    /// Resolve a keyspace by name. Must be called before reads on it.
    fn keyspace(&self, name: &str) -> Result<Self::Ks, StoreError>;

    // Reads
    fn get(&self, ks: &Self::Ks, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// Ordered scan over `range`, ascending by key bytes, or descending when
    /// `reverse` is set. Reads observe the transaction's snapshot plus its
    /// own writes.
    fn scan_range<'a>(
        &'a self,
        ks: &Self::Ks,
        range: ScanRange,
        reverse: bool,
    ) -> Result<Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + 'a>, StoreError>;

    // Writes
    fn put(&self, ks: &Self::Ks, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn put_batch(&self, ks: &Self::Ks, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), StoreError>;
    fn delete(&self, ks: &Self::Ks, key: &[u8]) -> Result<(), StoreError>;

    // Lifecycle
    fn commit(self) -> Result<(), StoreError>;
    fn rollback(self) -> Result<(), StoreError>;
}
