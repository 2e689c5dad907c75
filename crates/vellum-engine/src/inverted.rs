use std::cmp::Ordering;
use std::ops::Bound;

use bson::{Bson, Document, doc};
use vellum_store::{ScanRange, Transaction};

use crate::am::{InvertedIndexAm, InvertedScan, RowBitmap, ScanTuple};
use crate::encoding::encode_term;
use crate::error::EngineError;
use crate::index::IndexDescriptor;
use crate::meta::{self, FLAG_MULTIKEY, FLAG_TRUNCATED, IndexMeta};
use crate::order::compare_values;
use crate::path::extract_path_values;
use crate::rowid::RowId;
use crate::scan_key::{CompositeScanKey, ScanPredicate};

/// Marker byte for posting keys; the metadata page key (0x00) sorts first.
const TERM_PREFIX: u8 = 0x01;

/// Terms longer than this are truncated on disk. Truncation keeps ordering
/// approximate at the key layer, so it flips the index-wide truncation flag
/// and disqualifies index-only scans.
const MAX_TERM_BYTES: usize = 1024;

/// Store-backed inverted index over encoded composite terms.
///
/// Posting key layout: `[0x01][term bytes][packed row id, 8 bytes BE]`.
/// The posting value holds the original column values, so scans evaluate
/// predicates exactly even where the key bytes were truncated.
pub struct TermIndex<'t, T: Transaction> {
    txn: &'t T,
    ks: T::Ks,
    index: IndexDescriptor,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    pub rows: u64,
    pub entries: u64,
    pub multikey: bool,
}

impl<'t, T: Transaction> TermIndex<'t, T> {
    pub fn open(txn: &'t T, index: &IndexDescriptor) -> Result<Self, EngineError> {
        let ks = txn.keyspace(&index.keyspace)?;
        Ok(TermIndex {
            txn,
            ks,
            index: index.clone(),
        })
    }

    pub fn descriptor(&self) -> &IndexDescriptor {
        &self.index
    }

    /// Bulk-build the index from a row stream. Performs the multi-key check
    /// across all rows and persists the aggregated flags once.
    pub fn build<'d>(
        &self,
        rows: impl Iterator<Item = (RowId, &'d Document)>,
    ) -> Result<BuildStats, EngineError> {
        let mut stats = BuildStats::default();
        let mut truncated = false;
        let mut batch = Vec::new();
        for (row, doc) in rows {
            let generated = self.entries_for(row, doc)?;
            stats.rows += 1;
            stats.entries += generated.entries.len() as u64;
            stats.multikey |= generated.saw_array;
            truncated |= generated.truncated;
            batch.extend(generated.entries);
        }
        self.txn.put_batch(&self.ks, &batch)?;

        let mut index_meta = meta::load_meta(self.txn, &self.ks)?;
        index_meta.entry_count += stats.entries;
        if stats.multikey {
            index_meta.flags |= FLAG_MULTIKEY;
        }
        if truncated {
            index_meta.flags |= FLAG_TRUNCATED;
        }
        meta::store_meta(self.txn, &self.ks, &index_meta)?;
        Ok(stats)
    }

    /// Index a single row. The per-row array check feeds the monotonic
    /// multi-key flag; the write transaction's commit makes it durable.
    pub fn insert(&self, row: RowId, doc: &Document) -> Result<(), EngineError> {
        let generated = self.entries_for(row, doc)?;
        self.txn.put_batch(&self.ks, &generated.entries)?;

        if generated.saw_array {
            meta::mark_flag(self.txn, &self.ks, FLAG_MULTIKEY)?;
        }
        if generated.truncated {
            meta::mark_flag(self.txn, &self.ks, FLAG_TRUNCATED)?;
        }
        let mut index_meta = meta::load_meta(self.txn, &self.ks)?;
        index_meta.entry_count += generated.entries.len() as u64;
        meta::store_meta(self.txn, &self.ks, &index_meta)?;
        Ok(())
    }

    fn entries_for(&self, row: RowId, doc: &Document) -> Result<GeneratedEntries, EngineError> {
        let mut saw_array = false;
        let mut per_column: Vec<Vec<Bson>> = Vec::with_capacity(self.index.columns.len());
        for column in &self.index.columns {
            let mut extracted = extract_path_values(doc, &column.path);
            saw_array |= extracted.saw_array;
            if extracted.values.is_empty() {
                // A missing path indexes as null.
                extracted.values.push(Bson::Null);
            }
            per_column.push(extracted.values);
        }

        let mut entries = Vec::new();
        let mut truncated = false;
        let mut combo = vec![0usize; per_column.len()];
        loop {
            let values: Vec<Bson> = per_column
                .iter()
                .zip(&combo)
                .map(|(vals, i)| vals[*i].clone())
                .collect();

            let mut term = Vec::new();
            for value in &values {
                encode_term(value, &mut term);
            }
            if term.len() > MAX_TERM_BYTES {
                term.truncate(MAX_TERM_BYTES);
                truncated = true;
            }

            let mut key = Vec::with_capacity(1 + term.len() + 8);
            key.push(TERM_PREFIX);
            key.extend_from_slice(&term);
            key.extend_from_slice(&row.to_bytes());
            entries.push((key, encode_posting_values(&values)?));

            // Advance the cartesian product over multi-valued columns.
            let mut pos = per_column.len();
            loop {
                if pos == 0 {
                    return Ok(GeneratedEntries {
                        entries,
                        saw_array,
                        truncated,
                    });
                }
                pos -= 1;
                combo[pos] += 1;
                if combo[pos] < per_column[pos].len() {
                    break;
                }
                combo[pos] = 0;
            }
        }
    }
}

struct GeneratedEntries {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    saw_array: bool,
    truncated: bool,
}

fn encode_posting_values(values: &[Bson]) -> Result<Vec<u8>, EngineError> {
    let doc = doc! { "v": values.to_vec() };
    let raw = bson::RawDocumentBuf::try_from(&doc)
        .map_err(|e| EngineError::Internal(format!("encode posting values: {e}")))?;
    Ok(raw.as_bytes().to_vec())
}

fn decode_posting_values(bytes: &[u8]) -> Result<Vec<Bson>, EngineError> {
    let doc: Document = bson::deserialize_from_slice(bytes)
        .map_err(|e| EngineError::Corrupt(format!("malformed posting values: {e}")))?;
    match doc.get("v") {
        Some(Bson::Array(values)) => Ok(values.clone()),
        _ => Err(EngineError::Corrupt(
            "posting values missing the value array".to_string(),
        )),
    }
}

impl<T: Transaction> InvertedIndexAm for TermIndex<'_, T> {
    fn begin_scan<'a>(
        &'a self,
        _nkeys: usize,
        norderbys: usize,
        wants_index_tuple: bool,
    ) -> Result<Box<dyn InvertedScan + 'a>, EngineError> {
        Ok(Box::new(TermIndexScan {
            index: self,
            norderbys,
            wants_index_tuple,
            entries: Vec::new().into_iter(),
        }))
    }

    fn meta(&self) -> Result<IndexMeta, EngineError> {
        meta::load_meta(self.txn, &self.ks)
    }
}

struct TermIndexScan<'a, 't, T: Transaction> {
    index: &'a TermIndex<'t, T>,
    norderbys: usize,
    wants_index_tuple: bool,
    entries: std::vec::IntoIter<(RowId, Vec<Bson>)>,
}

impl<T: Transaction> InvertedScan for TermIndexScan<'_, '_, T> {
    fn wants_index_tuple(&self) -> bool {
        self.wants_index_tuple
    }

    fn rescan(&mut self, key: &CompositeScanKey) -> Result<(), EngineError> {
        let range = posting_byte_range(key);
        let reverse = matches!(key.direction, crate::scan_key::ScanDirection::Backward);
        let mut matched = Vec::new();
        for entry in self.index.txn.scan_range(&self.index.ks, range, reverse)? {
            let (raw_key, raw_value) = entry?;
            if raw_key.len() < 9 || raw_key[0] != TERM_PREFIX {
                continue;
            }
            let mut packed = [0u8; 8];
            packed.copy_from_slice(&raw_key[raw_key.len() - 8..]);
            let row = RowId::from_bytes(packed);
            let values = decode_posting_values(&raw_value)?;
            if predicates_match(key, &values) {
                matched.push((row, values));
            }
        }
        self.entries = matched.into_iter();
        Ok(())
    }

    fn get_tuple(&mut self) -> Result<Option<ScanTuple>, EngineError> {
        Ok(self.entries.next().map(|(row, values)| ScanTuple {
            row,
            recheck: false,
            order_values: if self.norderbys > 0 {
                values.clone()
            } else {
                Vec::new()
            },
            index_tuple: self.wants_index_tuple.then(|| values.clone()),
        }))
    }

    fn get_bitmap(&mut self, bitmap: &mut RowBitmap) -> Result<u64, EngineError> {
        let mut added = 0;
        for (row, _) in self.entries.by_ref() {
            if bitmap.insert(row) {
                added += 1;
            }
        }
        Ok(added)
    }
}

/// Byte range pruning for a composite key: the equality prefix narrows the
/// window exactly, the first range column widens it to its edge terms, and
/// everything after is resolved by exact predicate evaluation per posting.
fn posting_byte_range(key: &CompositeScanKey) -> ScanRange {
    let mut prefix = vec![TERM_PREFIX];
    let mut i = 0;
    while let Some(ScanPredicate::Eq(value)) = key.predicates.get(i) {
        encode_term(value, &mut prefix);
        i += 1;
    }

    match key.predicates.get(i) {
        Some(ScanPredicate::Range { lower, upper }) => {
            let lower_bytes = match lower {
                Some((value, _)) => {
                    let mut low = prefix.clone();
                    encode_term(value, &mut low);
                    low
                }
                None => prefix.clone(),
            };
            let upper_bound = match upper {
                Some((value, _)) => {
                    let mut up = prefix.clone();
                    encode_term(value, &mut up);
                    ScanRange::prefix(&up).upper
                }
                None => ScanRange::prefix(&prefix).upper,
            };
            ScanRange {
                lower: Bound::Included(lower_bytes),
                upper: upper_bound,
            }
        }
        _ => ScanRange::prefix(&prefix),
    }
}

fn predicates_match(key: &CompositeScanKey, values: &[Bson]) -> bool {
    key.predicates
        .iter()
        .zip(values)
        .all(|(predicate, value)| match predicate {
            ScanPredicate::Eq(query) => compare_values(value, query) == Ordering::Equal,
            ScanPredicate::Range { lower, upper } => {
                let above = match lower {
                    Some((edge, inclusive)) => match compare_values(value, edge) {
                        Ordering::Greater => true,
                        Ordering::Equal => *inclusive,
                        Ordering::Less => false,
                    },
                    None => true,
                };
                let below = match upper {
                    Some((edge, inclusive)) => match compare_values(value, edge) {
                        Ordering::Less => true,
                        Ordering::Equal => *inclusive,
                        Ordering::Greater => false,
                    },
                    None => true,
                };
                above && below
            }
            ScanPredicate::FullScan => true,
        })
}
