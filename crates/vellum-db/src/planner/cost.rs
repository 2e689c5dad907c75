use vellum_engine::{IndexDescriptor, IndexKind};

use crate::config::DatabaseConfig;

/// Shape of the candidate path node being costed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    IndexScan,
    /// Unsupported for composite scans; always rejected.
    IndexOnlyScan,
    BitmapScan,
}

/// Operator of one candidate clause, already normalized by the operator
/// family lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseOperator {
    Eq,
    Range,
    Exists,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexClause {
    pub column: usize,
    pub operator: ClauseOperator,
}

/// A candidate index path handed to the cost estimator.
#[derive(Debug, Clone)]
pub struct IndexPathCandidate<'a> {
    pub index: &'a IndexDescriptor,
    pub kind: PathKind,
    pub clauses: Vec<IndexClause>,
    /// Predicate of a partial index, when the index has one. A matching
    /// partial predicate keeps the index viable with zero explicit clauses.
    pub partial_predicate: Option<IndexClause>,
}

/// Planner-facing cost outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostEstimate {
    pub startup: f64,
    pub total: f64,
    pub selectivity: f64,
    pub correlation: f64,
    pub pages: f64,
}

impl CostEstimate {
    /// Infinite total cost with zero selectivity: the planner will always
    /// find a cheaper plan (a sequential scan at worst).
    fn rejected() -> Self {
        CostEstimate {
            startup: 0.0,
            total: f64::INFINITY,
            selectivity: 0.0,
            correlation: 0.0,
            pages: 0.0,
        }
    }

    pub fn is_rejected(&self) -> bool {
        self.total.is_infinite()
    }
}

/// Validate whether the index path is usable for the query shape and assign
/// its cost.
pub fn estimate_cost(
    candidate: &IndexPathCandidate<'_>,
    entry_count: u64,
    config: &DatabaseConfig,
) -> CostEstimate {
    if !is_valid_for_query(candidate) {
        return CostEstimate::rejected();
    }

    let mut estimate = inverted_index_cost(candidate, entry_count);

    // Full-text matches must always win over alternative plans, and the
    // session override forces the same for every index.
    if config.force_index_scans || has_text_match(candidate) {
        estimate.startup = 0.0;
        estimate.total = 0.0;
    }
    estimate
}

fn is_valid_for_query(candidate: &IndexPathCandidate<'_>) -> bool {
    if candidate.kind == PathKind::IndexOnlyScan {
        return false;
    }

    let matched: Vec<&IndexClause> = candidate
        .clauses
        .iter()
        .filter(|clause| clause_matches_index(candidate.index, clause))
        .collect();

    if matched.is_empty() {
        // With no usable clauses the index survives only when its partial
        // predicate itself matches a known operator + column combination.
        let partial_ok = candidate
            .partial_predicate
            .as_ref()
            .is_some_and(|clause| clause_matches_index(candidate.index, clause));
        if !partial_ok {
            return false;
        }
    }

    if candidate.index.is_composite() {
        // Composite scans must anchor on the leading column.
        let leading = matched.iter().any(|clause| {
            clause.column == 0
                && matches!(clause.operator, ClauseOperator::Eq | ClauseOperator::Range)
        });
        if !leading {
            return false;
        }
    }

    true
}

fn clause_matches_index(index: &IndexDescriptor, clause: &IndexClause) -> bool {
    if clause.column >= index.columns.len() {
        return false;
    }
    match index.kind {
        IndexKind::TextPath => clause.operator == ClauseOperator::Text,
        IndexKind::SinglePath | IndexKind::CompositePath => matches!(
            clause.operator,
            ClauseOperator::Eq | ClauseOperator::Range | ClauseOperator::Exists
        ),
    }
}

fn has_text_match(candidate: &IndexPathCandidate<'_>) -> bool {
    candidate.index.kind == IndexKind::TextPath
        && candidate
            .clauses
            .iter()
            .any(|clause| clause.operator == ClauseOperator::Text)
}

/// The wrapped inverted index's own cost model: entry-count driven, with
/// equality clauses assumed far more selective than ranges.
fn inverted_index_cost(candidate: &IndexPathCandidate<'_>, entry_count: u64) -> CostEstimate {
    let entries = entry_count.max(1) as f64;
    let selectivity = candidate
        .clauses
        .iter()
        .map(|clause| match clause.operator {
            ClauseOperator::Eq => 0.005,
            ClauseOperator::Range => 0.1,
            ClauseOperator::Exists => 0.5,
            ClauseOperator::Text => 0.05,
        })
        .fold(1.0_f64, |acc, s| acc * s)
        .clamp(1.0 / entries, 1.0);

    let pages = (entries / 128.0).ceil();
    let startup = pages.log2().max(1.0);
    let total = startup + entries * selectivity * 0.01;
    CostEstimate {
        startup,
        total,
        selectivity,
        correlation: 0.0,
        pages,
    }
}
