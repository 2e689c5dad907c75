use std::cmp::Ordering;

use bson::Bson;

use crate::bounds::{BoundEdge, lower_bound, upper_bound};
use crate::error::EngineError;
use crate::index::IndexDescriptor;
use crate::order::compare_values;
use crate::typeclass::TypeClass;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDirection {
    Forward,
    Backward,
}

/// A single-column search predicate, as handed down by the planner.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanPredicate {
    Eq(Bson),
    /// One- or two-sided range; each edge carries its inclusivity.
    Range {
        lower: Option<(Bson, bool)>,
        upper: Option<(Bson, bool)>,
    },
    /// No constraint: the column spans its entire type-class chain.
    FullScan,
}

impl ScanPredicate {
    pub fn is_constraining(&self) -> bool {
        !matches!(self, ScanPredicate::FullScan)
    }

    /// `column > value`, bracketed to the value's type class: the implied
    /// upper edge is the class ceiling from the bound resolver, so the range
    /// never bleeds into the next class.
    pub fn gt(value: Bson) -> Result<ScanPredicate, EngineError> {
        let upper = class_ceiling_edge(TypeClass::of(&value))?;
        Ok(ScanPredicate::Range {
            lower: Some((value, false)),
            upper: Some(upper),
        })
    }

    /// `column >= value`, bracketed to the value's type class.
    pub fn gte(value: Bson) -> Result<ScanPredicate, EngineError> {
        let upper = class_ceiling_edge(TypeClass::of(&value))?;
        Ok(ScanPredicate::Range {
            lower: Some((value, true)),
            upper: Some(upper),
        })
    }

    /// `column < value`, bracketed to the value's type class.
    pub fn lt(value: Bson) -> Result<ScanPredicate, EngineError> {
        let lower = class_floor_edge(TypeClass::of(&value))?;
        Ok(ScanPredicate::Range {
            lower: Some(lower),
            upper: Some((value, false)),
        })
    }

    /// `column <= value`, bracketed to the value's type class.
    pub fn lte(value: Bson) -> Result<ScanPredicate, EngineError> {
        let lower = class_floor_edge(TypeClass::of(&value))?;
        Ok(ScanPredicate::Range {
            lower: Some(lower),
            upper: Some((value, true)),
        })
    }
}

fn class_floor_edge(class: TypeClass) -> Result<(Bson, bool), EngineError> {
    let bound = lower_bound(class);
    match bound.edge {
        BoundEdge::Value(value) => Ok((value, bound.inclusive)),
        BoundEdge::ClassFloor => Err(EngineError::UnsupportedType(format!(
            "range predicates are not supported on type {}",
            class.name()
        ))),
    }
}

fn class_ceiling_edge(class: TypeClass) -> Result<(Bson, bool), EngineError> {
    let bound = upper_bound(class);
    match bound.edge {
        BoundEdge::Value(value) => Ok((value, bound.inclusive)),
        BoundEdge::ClassFloor => Err(EngineError::UnsupportedType(format!(
            "range predicates are not supported on type {}",
            class.name()
        ))),
    }
}

/// A predicate bound to an index column number.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnPredicate {
    pub column: usize,
    pub predicate: ScanPredicate,
}

/// The single encoded scan key that replaces N per-column keys on a
/// composite index: one dense predicate per column, the array-aware flag,
/// and the traversal direction fixed for the whole scan.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeScanKey {
    pub predicates: Vec<ScanPredicate>,
    pub array_aware: bool,
    pub direction: ScanDirection,
}

/// Merge per-column predicates into one composite scan key.
///
/// Returns `None` when the index is not composite-classified — the caller
/// keeps its original keys unmodified. Columns with no explicit predicate
/// are widened to a full scan of their type-class chain; multiple
/// predicates on one column are intersected.
pub fn rewrite_scan_keys(
    index: &IndexDescriptor,
    keys: &[ColumnPredicate],
    multikey: bool,
    direction: ScanDirection,
) -> Option<CompositeScanKey> {
    if !index.is_composite() {
        return None;
    }

    let mut predicates = vec![ScanPredicate::FullScan; index.columns.len()];
    for key in keys {
        if key.column >= predicates.len() {
            continue;
        }
        let merged = merge(&predicates[key.column], &key.predicate);
        predicates[key.column] = merged;
    }

    Some(CompositeScanKey {
        predicates,
        array_aware: multikey,
        direction,
    })
}

fn merge(existing: &ScanPredicate, incoming: &ScanPredicate) -> ScanPredicate {
    match (existing, incoming) {
        (ScanPredicate::FullScan, other) => other.clone(),
        (kept, ScanPredicate::FullScan) => kept.clone(),
        // Equality is the tightest constraint; the first one wins.
        (ScanPredicate::Eq(v), _) => ScanPredicate::Eq(v.clone()),
        (_, ScanPredicate::Eq(v)) => ScanPredicate::Eq(v.clone()),
        (
            ScanPredicate::Range {
                lower: la,
                upper: ua,
            },
            ScanPredicate::Range {
                lower: lb,
                upper: ub,
            },
        ) => ScanPredicate::Range {
            lower: tighter_edge(la, lb, Ordering::Greater),
            upper: tighter_edge(ua, ub, Ordering::Less),
        },
    }
}

fn tighter_edge(
    a: &Option<(Bson, bool)>,
    b: &Option<(Bson, bool)>,
    keep: Ordering,
) -> Option<(Bson, bool)> {
    match (a, b) {
        (None, None) => None,
        (Some(edge), None) | (None, Some(edge)) => Some(edge.clone()),
        (Some((va, ia)), Some((vb, ib))) => match compare_values(va, vb) {
            Ordering::Equal => Some((va.clone(), *ia && *ib)),
            order if order == keep => Some((va.clone(), *ia)),
            _ => Some((vb.clone(), *ib)),
        },
    }
}

/// Serialized per-column bound strings for explain output, e.g.
/// `a: [5, 5]`, `b: [MinKey, MaxKey]`.
pub fn describe_bounds(index: &IndexDescriptor, key: &CompositeScanKey) -> Vec<String> {
    index
        .columns
        .iter()
        .zip(&key.predicates)
        .map(|(column, predicate)| {
            let range = match predicate {
                ScanPredicate::Eq(v) => format!("[{v}, {v}]"),
                ScanPredicate::Range { lower, upper } => {
                    let (open, low) = match lower {
                        Some((v, true)) => ('[', v.to_string()),
                        Some((v, false)) => ('(', v.to_string()),
                        None => ('[', "MinKey".to_string()),
                    };
                    let (high, close) = match upper {
                        Some((v, true)) => (v.to_string(), ']'),
                        Some((v, false)) => (v.to_string(), ')'),
                        None => ("MaxKey".to_string(), ']'),
                    };
                    format!("{open}{low}, {high}{close}")
                }
                ScanPredicate::FullScan => "[MinKey, MaxKey]".to_string(),
            };
            format!("{}: {range}", column.path)
        })
        .collect()
}
