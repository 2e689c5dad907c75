use vellum_query::{SortDirection, SortKey};

use crate::am::{InvertedIndexAm, InvertedScan, RowBitmap, ScanTuple};
use crate::error::EngineError;
use crate::index::IndexDescriptor;
use crate::meta::IndexMeta;
use crate::scan_key::{
    ColumnPredicate, CompositeScanKey, ScanDirection, describe_bounds, rewrite_scan_keys,
};
use crate::tracker::{ArrayTracker, active_tracker_ops};

/// Explain-level view of one composite scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanDiagnostics {
    pub is_multi_key: bool,
    pub index_bounds: Vec<String>,
    pub num_duplicates: u64,
    pub is_backward_scan: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unopened,
    Scanning,
    Ended,
}

/// Begin a scan over `index`. Non-composite indexes delegate straight to
/// the wrapped engine with no state wrapping; composite indexes get the
/// full adapter state machine.
pub fn begin_scan<'a>(
    am: &'a dyn InvertedIndexAm,
    index: &'a IndexDescriptor,
    nkeys: usize,
    norderbys: usize,
    wants_index_tuple: bool,
) -> Result<IndexScan<'a>, EngineError> {
    if !index.is_composite() {
        let inner = am.begin_scan(nkeys, norderbys, wants_index_tuple)?;
        return Ok(IndexScan::Passthrough(inner));
    }
    Ok(IndexScan::Composite(CompositeScanState {
        am,
        index,
        inner: None,
        key: None,
        meta: None,
        tracker: None,
        num_duplicates: 0,
        direction: ScanDirection::Forward,
        norderbys,
        wants_index_tuple,
        phase: Phase::Unopened,
    }))
}

pub enum IndexScan<'a> {
    Composite(CompositeScanState<'a>),
    Passthrough(Box<dyn InvertedScan + 'a>),
}

/// Per-scan state for the composite index adapter.
///
/// Lifecycle: `Unopened` at begin; `rescan` (re-enterable) resolves
/// multi-key status once, rewrites the scan keys, lazily creates the inner
/// scan, and arms the array tracker; `get_tuple`/`get_bitmap` consume;
/// `end` releases everything.
pub struct CompositeScanState<'a> {
    am: &'a dyn InvertedIndexAm,
    index: &'a IndexDescriptor,
    inner: Option<Box<dyn InvertedScan + 'a>>,
    key: Option<CompositeScanKey>,
    /// Multi-key + truncation status, resolved on first rescan and cached
    /// for every rescan of the same scan.
    meta: Option<IndexMeta>,
    tracker: Option<Box<dyn ArrayTracker>>,
    num_duplicates: u64,
    direction: ScanDirection,
    norderbys: usize,
    wants_index_tuple: bool,
    phase: Phase,
}

impl CompositeScanState<'_> {
    pub fn rescan(
        &mut self,
        keys: &[ColumnPredicate],
        order_bys: &[SortKey],
    ) -> Result<(), EngineError> {
        if self.phase == Phase::Ended {
            return Err(EngineError::Internal(
                "rescan on an ended composite scan".to_string(),
            ));
        }

        // Scan direction is fixed here for the lifetime of this rescan; a
        // descending leading sort key flips the whole traversal.
        self.direction = match order_bys.first() {
            Some(key) if key.direction == SortDirection::Desc => ScanDirection::Backward,
            _ => ScanDirection::Forward,
        };

        if self.meta.is_none() {
            self.meta = Some(self.am.meta()?);
        }
        let meta = self.meta.as_ref().copied().unwrap_or_default();
        let multikey = meta.is_multikey();

        let key = rewrite_scan_keys(self.index, keys, multikey, self.direction).ok_or_else(
            || EngineError::Internal("composite rescan on a non-composite index".to_string()),
        )?;

        // The inner scan is created on first rescan, not at begin, so it is
        // sized for the single rewritten key.
        if self.inner.is_none() {
            self.inner = Some(
                self.am
                    .begin_scan(1, self.norderbys, self.wants_index_tuple)?,
            );
        }
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| EngineError::Internal("inner scan missing after creation".into()))?;

        self.wants_index_tuple = inner.wants_index_tuple();

        let ordered = self.norderbys > 0 || !order_bys.is_empty();
        if self.wants_index_tuple && !ordered {
            return Err(EngineError::Internal(
                "index-only scan requires an ordered composite scan".to_string(),
            ));
        }
        if self.wants_index_tuple && meta.is_truncated() {
            return Err(EngineError::Internal(
                "index-only scan on an index with truncated terms".to_string(),
            ));
        }

        self.tracker = if ordered && multikey {
            Some(active_tracker_ops().create())
        } else {
            None
        };
        self.num_duplicates = 0;

        inner.rescan(&key)?;
        self.key = Some(key);
        self.phase = Phase::Scanning;
        Ok(())
    }

    /// Pull the next unique tuple. The traversal direction was fixed at
    /// rescan; callers always request forward motion.
    pub fn get_tuple(
        &mut self,
        direction: ScanDirection,
    ) -> Result<Option<ScanTuple>, EngineError> {
        if self.phase != Phase::Scanning {
            return Err(EngineError::Internal(
                "get_tuple on a composite scan that was not rescanned".to_string(),
            ));
        }
        if direction != ScanDirection::Forward {
            return Err(EngineError::Internal(
                "composite scans fix their direction at rescan; backward get_tuple is invalid"
                    .to_string(),
            ));
        }
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| EngineError::Internal("inner scan missing in get_tuple".into()))?;

        loop {
            let Some(tuple) = inner.get_tuple()? else {
                return Ok(None);
            };
            if let Some(tracker) = self.tracker.as_mut() {
                if !tracker.add(tuple.row) {
                    // Already emitted for another array element; skip
                    // silently and account for it in diagnostics.
                    self.num_duplicates += 1;
                    continue;
                }
            }
            return Ok(Some(tuple));
        }
    }

    /// Bitmap retrieval delegates wholesale: bitmaps deduplicate on
    /// insertion, so the tracker never participates.
    pub fn get_bitmap(&mut self, bitmap: &mut RowBitmap) -> Result<u64, EngineError> {
        if self.phase != Phase::Scanning {
            return Err(EngineError::Internal(
                "get_bitmap on a composite scan that was not rescanned".to_string(),
            ));
        }
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| EngineError::Internal("inner scan missing in get_bitmap".into()))?;
        inner.get_bitmap(bitmap)
    }

    /// Terminal transition: release the inner scan and tracker state.
    pub fn end(&mut self) {
        self.inner = None;
        self.tracker = None;
        self.phase = Phase::Ended;
    }

    pub fn diagnostics(&self) -> ScanDiagnostics {
        ScanDiagnostics {
            is_multi_key: self.meta.map(|m| m.is_multikey()).unwrap_or(false),
            index_bounds: self
                .key
                .as_ref()
                .map(|key| describe_bounds(self.index, key))
                .unwrap_or_default(),
            num_duplicates: self.num_duplicates,
            is_backward_scan: self.direction == ScanDirection::Backward,
        }
    }
}
