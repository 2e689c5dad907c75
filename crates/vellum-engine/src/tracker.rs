use std::sync::OnceLock;

use roaring::RoaringTreemap;

use crate::error::EngineError;
use crate::rowid::RowId;

/// Per-scan deduplication state for multi-valued index entries.
///
/// `add` returns true when the row id has not been seen in this scan yet.
pub trait ArrayTracker {
    fn add(&mut self, row: RowId) -> bool;
}

/// Factory for [`ArrayTracker`] state, one instance per ordered multi-key
/// scan. Implementations are process-wide singletons.
pub trait ArrayTrackerOps: Sync {
    fn create(&self) -> Box<dyn ArrayTracker>;
    fn name(&self) -> &'static str;
}

/// Default tracker: 64-bit compressed bitmap keyed by the packed row id.
pub struct BitmapTrackerOps;

struct BitmapTracker {
    bitmap: RoaringTreemap,
}

impl ArrayTracker for BitmapTracker {
    fn add(&mut self, row: RowId) -> bool {
        self.bitmap.insert(row.pack())
    }
}

impl ArrayTrackerOps for BitmapTrackerOps {
    fn create(&self) -> Box<dyn ArrayTracker> {
        Box::new(BitmapTracker {
            bitmap: RoaringTreemap::new(),
        })
    }

    fn name(&self) -> &'static str {
        "bitmap"
    }
}

static DEFAULT_OPS: BitmapTrackerOps = BitmapTrackerOps;
static REGISTERED_OPS: OnceLock<&'static dyn ArrayTrackerOps> = OnceLock::new();

/// Install an alternate tracker implementation, process-wide, exactly once.
///
/// Must happen at process start, before any scan runs; a second registration
/// is a configuration error. (A "null" implementation is unrepresentable —
/// the trait object discharges that part of the contract statically.)
pub fn register_array_tracker(ops: &'static dyn ArrayTrackerOps) -> Result<(), EngineError> {
    REGISTERED_OPS.set(ops).map_err(|_| {
        EngineError::Configuration(
            "an array tracker implementation is already registered".to_string(),
        )
    })
}

/// The active tracker implementation: the registered override, or the
/// built-in bitmap default.
pub fn active_tracker_ops() -> &'static dyn ArrayTrackerOps {
    REGISTERED_OPS.get().copied().unwrap_or(&DEFAULT_OPS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bitmap_tracker_detects_duplicates() {
        let mut tracker = BitmapTrackerOps.create();
        let a = RowId::new(1, 1);
        let b = RowId::new(1, 2);
        assert!(tracker.add(a));
        assert!(tracker.add(b));
        assert!(!tracker.add(a));
        assert!(!tracker.add(b));
        assert!(tracker.add(RowId::new(2, 1)));
    }

    #[test]
    fn rows_with_same_offset_on_different_pages_are_distinct() {
        let mut tracker = BitmapTrackerOps.create();
        assert!(tracker.add(RowId::new(1, 7)));
        assert!(tracker.add(RowId::new(2, 7)));
    }

    #[test]
    fn double_registration_is_rejected() {
        // First call may or may not win depending on test ordering within
        // the process; the second is guaranteed to fail.
        let _ = register_array_tracker(&BitmapTrackerOps);
        let err = register_array_tracker(&BitmapTrackerOps).unwrap_err();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn active_ops_always_available() {
        let mut tracker = active_tracker_ops().create();
        assert!(tracker.add(RowId::new(9, 9)));
    }
}
