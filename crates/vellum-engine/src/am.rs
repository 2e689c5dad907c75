use bson::Bson;
use roaring::RoaringTreemap;

use crate::error::EngineError;
use crate::meta::IndexMeta;
use crate::rowid::RowId;
use crate::scan_key::CompositeScanKey;

/// One tuple produced by an inverted-index scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanTuple {
    pub row: RowId,
    /// Whether the caller must re-evaluate the predicate against the heap
    /// row (lossy term match).
    pub recheck: bool,
    /// Column values in index order, for order-by merging.
    pub order_values: Vec<Bson>,
    /// Reconstructed indexed values, present only for index-only scans.
    pub index_tuple: Option<Vec<Bson>>,
}

/// Set of row ids produced by a bitmap scan. Insertion is naturally
/// deduplicating, which is why bitmap retrieval bypasses the array tracker.
#[derive(Debug, Default)]
pub struct RowBitmap {
    bitmap: RoaringTreemap,
}

impl RowBitmap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the row was not already present.
    pub fn insert(&mut self, row: RowId) -> bool {
        self.bitmap.insert(row.pack())
    }

    pub fn contains(&self, row: RowId) -> bool {
        self.bitmap.contains(row.pack())
    }

    pub fn len(&self) -> u64 {
        self.bitmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bitmap.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RowId> + '_ {
        self.bitmap.iter().map(RowId::unpack)
    }
}

/// One inner scan over the wrapped inverted index.
pub trait InvertedScan {
    /// Whether this scan was asked to reconstruct index tuples
    /// (index-only scans).
    fn wants_index_tuple(&self) -> bool;

    /// Re-position the scan with a new composite key. May be called any
    /// number of times.
    fn rescan(&mut self, key: &CompositeScanKey) -> Result<(), EngineError>;

    /// Pull the next tuple in traversal order, or `None` when exhausted.
    fn get_tuple(&mut self) -> Result<Option<ScanTuple>, EngineError>;

    /// Drain all matching rows into `bitmap`; returns the number of rows
    /// added.
    fn get_bitmap(&mut self, bitmap: &mut RowBitmap) -> Result<u64, EngineError>;
}

/// The wrapped inverted-index engine's access-method surface, the fixed
/// vtable the adapter composes over.
pub trait InvertedIndexAm {
    fn begin_scan<'a>(
        &'a self,
        nkeys: usize,
        norderbys: usize,
        wants_index_tuple: bool,
    ) -> Result<Box<dyn InvertedScan + 'a>, EngineError>;

    /// Current persisted index metadata (multi-key and truncation status).
    fn meta(&self) -> Result<IndexMeta, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_bitmap_dedupes() {
        let mut bitmap = RowBitmap::new();
        assert!(bitmap.insert(RowId::new(1, 1)));
        assert!(!bitmap.insert(RowId::new(1, 1)));
        assert!(bitmap.insert(RowId::new(1, 2)));
        assert_eq!(bitmap.len(), 2);
        assert!(bitmap.contains(RowId::new(1, 2)));
    }

    #[test]
    fn row_bitmap_iterates_in_row_order() {
        let mut bitmap = RowBitmap::new();
        bitmap.insert(RowId::new(2, 1));
        bitmap.insert(RowId::new(1, 9));
        let rows: Vec<RowId> = bitmap.iter().collect();
        assert_eq!(rows, vec![RowId::new(1, 9), RowId::new(2, 1)]);
    }
}
