use vellum_engine::IndexDescriptor;
use vellum_query::SortKey;

/// Per-column predicate summary for the index being considered, produced by
/// the clause-matching pass.
#[derive(Debug, Clone)]
pub struct ColumnPredicates {
    pub equality: Vec<bool>,
    pub range: Vec<bool>,
}

impl ColumnPredicates {
    pub fn none(columns: usize) -> Self {
        ColumnPredicates {
            equality: vec![false; columns],
            range: vec![false; columns],
        }
    }

    pub fn with_equality(columns: usize, on: &[usize]) -> Self {
        let mut p = Self::none(columns);
        for &c in on {
            p.equality[c] = true;
        }
        p
    }

    pub fn with_range(columns: usize, on: &[usize]) -> Self {
        let mut p = Self::none(columns);
        for &c in on {
            p.range[c] = true;
        }
        p
    }
}

/// Outcome of order-by pushdown validation.
///
/// `last_contiguous_orderby_column` tracks the contiguous run of matched
/// columns starting at the first matched one; `max_matched_column` may sit
/// beyond it when a gap was bridged by equality-constrained columns. Both
/// are -1 when nothing matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushdownDecision {
    pub pushdown: bool,
    pub max_matched_column: i32,
    pub last_contiguous_orderby_column: i32,
    pub reverse: bool,
}

const NO_PUSHDOWN: PushdownDecision = PushdownDecision {
    pushdown: false,
    max_matched_column: -1,
    last_contiguous_orderby_column: -1,
    reverse: false,
};

/// Decide whether the requested sort order can be satisfied by composite
/// index traversal.
///
/// The walk stops at the first sort key that fails to map cleanly onto the
/// index (unknown column, unsupported backward traversal, mixed directions,
/// out-of-order or unbridged gap); pushdown covers the matched prefix, and
/// is refused outright when not even the leading sort key matched.
///
/// Multi-key indexes are stricter: an equality or range filter on any
/// column at or before an order-by column can exclude array elements whose
/// siblings would change the merge order, so pushdown is refused entirely;
/// group-by pushdown on a multi-key index is refused categorically.
pub fn validate_order_by_pushdown(
    index: &IndexDescriptor,
    sort_keys: &[SortKey],
    predicates: &ColumnPredicates,
    multikey: bool,
    has_group_by: bool,
) -> PushdownDecision {
    if sort_keys.is_empty() {
        return NO_PUSHDOWN;
    }
    if multikey && has_group_by {
        return NO_PUSHDOWN;
    }

    let mut determined_reverse: Option<bool> = None;
    let mut prev_column: Option<usize> = None;
    let mut max_matched: i32 = -1;
    let mut last_contiguous: i32 = -1;
    let mut contiguity_broken = false;

    for sort in sort_keys {
        let Some((column, column_direction)) = index.column_number(&sort.path) else {
            break;
        };

        let reverse = sort.direction != column_direction;
        match determined_reverse {
            None => {
                if reverse && !index.supports_backward {
                    break;
                }
                determined_reverse = Some(reverse);
            }
            Some(direction) if direction != reverse => break,
            Some(_) => {}
        }

        let bridge_start = match prev_column {
            Some(prev) => {
                if column <= prev {
                    break;
                }
                prev + 1
            }
            None => 0,
        };
        let bridged = (bridge_start..column).all(|c| predicates.equality.get(c) == Some(&true));
        if !bridged {
            break;
        }

        if multikey {
            let intervening_filter = (0..column).any(|c| {
                predicates.equality.get(c) == Some(&true)
                    || predicates.range.get(c) == Some(&true)
            });
            if intervening_filter {
                return NO_PUSHDOWN;
            }
            let filter_on_sort_column = predicates.equality.get(column) == Some(&true)
                || predicates.range.get(column) == Some(&true);
            if filter_on_sort_column {
                break;
            }
        }

        max_matched = column as i32;
        if !contiguity_broken
            && (last_contiguous < 0 || column as i32 == last_contiguous + 1)
        {
            last_contiguous = column as i32;
        } else {
            contiguity_broken = true;
        }
        prev_column = Some(column);
    }

    PushdownDecision {
        pushdown: max_matched >= 0,
        max_matched_column: max_matched,
        last_contiguous_orderby_column: last_contiguous,
        reverse: determined_reverse.unwrap_or(false) && max_matched >= 0,
    }
}
