mod adapter;
mod am;
mod bounds;
mod encoding;
mod error;
mod index;
mod inverted;
mod meta;
mod order;
mod path;
mod rowid;
mod scan_key;
mod tracker;
mod typeclass;

pub use adapter::{CompositeScanState, IndexScan, ScanDiagnostics, begin_scan};
pub use am::{InvertedIndexAm, InvertedScan, RowBitmap, ScanTuple};
pub use bounds::{Bound, BoundEdge, lower_bound, upper_bound};
pub use encoding::{encode_bound, encode_term};
pub use error::EngineError;
pub use index::{IndexColumn, IndexDescriptor, IndexKind};
pub use inverted::{BuildStats, TermIndex};
pub use meta::{FLAG_MULTIKEY, FLAG_TRUNCATED, IndexMeta};
pub use order::{as_f64, compare_values, is_number};
pub use path::{PathValues, extract_path_values};
pub use rowid::RowId;
pub use scan_key::{
    ColumnPredicate, CompositeScanKey, ScanDirection, ScanPredicate, describe_bounds,
    rewrite_scan_keys,
};
pub use tracker::{ArrayTracker, ArrayTrackerOps, BitmapTrackerOps, register_array_tracker};
