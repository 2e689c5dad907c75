use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};

use bson::{Bson, Document, doc};
use vellum_engine::compare_values;
use vellum_query::{BucketAutoSpec, Granularity};

use crate::aggregation::bucket_auto::BUCKET_ID_FIELD;
use crate::aggregation::granularity::{find_closest, validate_numeric_boundary};
use crate::error::DbError;
use crate::executor::partition::PartitionCursor;

/// Per-partition bucket-assignment state, advanced one row per call in
/// ascending groupBy order.
#[derive(Debug, Default)]
struct BucketAutoState {
    total_rows: i64,
    n_buckets: i32,
    expect_rows_limit: i64,
    remainder: i64,
    bucket_id: i32,
    row_index: i64,
    actual_rows_limit: i64,
    lower_bound: Option<Bson>,
    upper_bound: Option<Bson>,
}

/// Run the bucket-auto window function over one ordered partition.
///
/// Returns one `{bucket_id: {min, max}}` fragment per row, aligned with the
/// cursor's row order. The interrupt flag is polled between rows; partial
/// bucket state is discarded with the error on any failure.
pub fn execute_bucket_auto(
    cursor: &mut PartitionCursor,
    spec: &BucketAutoSpec,
    interrupt: Option<&AtomicBool>,
) -> Result<Vec<Document>, DbError> {
    let mut state = BucketAutoState::default();
    let mut out = Vec::with_capacity(cursor.len());

    while cursor.current().is_some() {
        if let Some(flag) = interrupt {
            if flag.load(AtomicOrdering::Relaxed) {
                return Err(DbError::Interrupted);
            }
        }

        let current = cursor
            .current()
            .map(|row| row.group_value.clone())
            .unwrap_or(Bson::Null);

        if spec.granularity.is_some() {
            validate_numeric_boundary(&current)?;
        }

        if state.bucket_id == 0 && state.row_index == 0 && state.total_rows == 0 {
            // First call for this partition.
            state.total_rows = cursor.len() as i64;
            state.n_buckets = spec.buckets;
            state.expect_rows_limit = state.total_rows / state.n_buckets as i64;
            if state.expect_rows_limit == 0 {
                // Fewer rows than requested buckets: one row per bucket.
                state.expect_rows_limit = 1;
                state.n_buckets = state.total_rows as i32;
            }
            state.remainder = state.total_rows % state.n_buckets as i64;
        }

        state.row_index += 1;

        if state.row_index == 1 {
            state.bucket_id += 1;

            state.actual_rows_limit = state.expect_rows_limit;
            if state.remainder > 0 {
                // Uneven division: the first buckets absorb the remainder.
                state.actual_rows_limit += 1;
                state.remainder -= 1;
            }
            if state.total_rows < state.actual_rows_limit {
                state.actual_rows_limit = state.total_rows;
            }

            set_lower_bound(&current, spec.granularity, &mut state)?;
            set_upper_bound(cursor, spec.granularity, &mut state)?;
        }

        if state.row_index == state.actual_rows_limit {
            // Last row of the bucket; the next row opens a new one.
            state.row_index = 0;
        }

        state.total_rows -= 1;

        let lower = state.lower_bound.clone().ok_or_else(|| {
            DbError::Internal("bucket lower bound missing at emit".to_string())
        })?;
        let upper = state.upper_bound.clone().ok_or_else(|| {
            DbError::Internal("bucket upper bound missing at emit".to_string())
        })?;
        let mut fragment = Document::new();
        fragment.insert(BUCKET_ID_FIELD, doc! { "min": lower, "max": upper });
        out.push(fragment);

        cursor.advance();
    }

    Ok(out)
}

/// For the first bucket the lower bound is the first value, snapped down to
/// the granularity series when one is set; every later bucket starts where
/// the previous one ended.
fn set_lower_bound(
    current: &Bson,
    granularity: Option<Granularity>,
    state: &mut BucketAutoState,
) -> Result<(), DbError> {
    if state.bucket_id > 1 {
        state.lower_bound = state.upper_bound.take();
        return Ok(());
    }

    state.lower_bound = match granularity {
        Some(series) => {
            let n = validate_numeric_boundary(current)?;
            Some(Bson::Double(find_closest(series, n, false)?))
        }
        None => Some(current.clone()),
    };
    Ok(())
}

/// The upper bound starts at the bucket's max value (snapped up to the
/// granularity series when set), then the bucket expands over subsequent
/// rows that tie the boundary — or, with granularity, fall inside it —
/// consuming remainder as it grows.
fn set_upper_bound(
    cursor: &PartitionCursor,
    granularity: Option<Granularity>,
    state: &mut BucketAutoState,
) -> Result<(), DbError> {
    let max_offset = (state.actual_rows_limit - 1).max(0) as usize;
    let max_of_bucket = cursor
        .peek_value(max_offset)
        .cloned()
        .ok_or_else(|| DbError::Internal("failed to get max value of bucket".to_string()))?;

    let mut upper = match granularity {
        Some(series) => {
            let n = validate_numeric_boundary(&max_of_bucket)?;
            Bson::Double(find_closest(series, n, true)?)
        }
        None => max_of_bucket.clone(),
    };

    let mut start_offset = state.actual_rows_limit as usize;
    while let Some(next) = cursor.peek_value(start_offset) {
        if granularity.is_some() {
            if compare_values(&upper, next) == Ordering::Greater {
                state.actual_rows_limit += 1;
                if state.remainder > 0 {
                    state.remainder -= 1;
                }
                start_offset += 1;
            } else {
                break;
            }
        } else {
            match compare_values(&max_of_bucket, next) {
                Ordering::Greater => {
                    return Err(DbError::Internal(
                        "max value of current bucket is larger than value in next bucket"
                            .to_string(),
                    ));
                }
                Ordering::Equal => {
                    state.actual_rows_limit += 1;
                    if state.remainder > 0 {
                        state.remainder -= 1;
                    }
                    start_offset += 1;
                }
                Ordering::Less => {
                    upper = next.clone();
                    break;
                }
            }
        }
    }

    state.upper_bound = Some(upper);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::partition::PartitionRow;

    fn cursor_of(values: &[i32]) -> PartitionCursor {
        PartitionCursor::new(
            values
                .iter()
                .map(|v| PartitionRow {
                    doc: doc! { "v": *v },
                    group_value: Bson::Int32(*v),
                })
                .collect(),
        )
    }

    fn spec(buckets: i32, granularity: Option<Granularity>) -> BucketAutoSpec {
        BucketAutoSpec {
            group_by: Bson::String("$v".into()),
            buckets,
            output: None,
            granularity,
        }
    }

    fn bucket_ranges(fragments: &[Document]) -> Vec<(Bson, Bson)> {
        let mut ranges: Vec<(Bson, Bson)> = Vec::new();
        for fragment in fragments {
            let id = fragment.get_document(BUCKET_ID_FIELD).unwrap();
            let range = (id.get("min").unwrap().clone(), id.get("max").unwrap().clone());
            if ranges.last() != Some(&range) {
                ranges.push(range);
            }
        }
        ranges
    }

    #[test]
    fn ten_rows_three_buckets_split_four_three_three() {
        let mut cursor = cursor_of(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let fragments = execute_bucket_auto(&mut cursor, &spec(3, None), None).unwrap();
        assert_eq!(fragments.len(), 10);

        let ranges = bucket_ranges(&fragments);
        assert_eq!(ranges.len(), 3);
        // Remainder goes to the first bucket: sizes {4, 3, 3}.
        let sizes: Vec<usize> = ranges
            .iter()
            .map(|r| fragments
                .iter()
                .filter(|f| {
                    let id = f.get_document(BUCKET_ID_FIELD).unwrap();
                    id.get("min").unwrap() == &r.0
                })
                .count())
            .collect();
        assert_eq!(sizes, vec![4, 3, 3]);

        // First lower bound is the min value; each lower bound afterwards is
        // the previous bucket's upper bound.
        assert_eq!(ranges[0].0, Bson::Int32(1));
        assert_eq!(ranges[0].1, ranges[1].0);
        assert_eq!(ranges[1].1, ranges[2].0);
        // Last bucket closes on its own max.
        assert_eq!(ranges[2].1, Bson::Int32(10));
    }

    #[test]
    fn fewer_rows_than_buckets_yields_one_row_buckets() {
        let mut cursor = cursor_of(&[3, 1]);
        let fragments = execute_bucket_auto(&mut cursor, &spec(5, None), None).unwrap();
        let ranges = bucket_ranges(&fragments);
        assert_eq!(ranges.len(), 2);
    }

    #[test]
    fn ties_expand_the_bucket_past_its_even_share() {
        // Four of six rows share one value; the first bucket must absorb
        // every tie of its boundary value.
        let mut cursor = cursor_of(&[1, 2, 2, 2, 2, 3]);
        let fragments = execute_bucket_auto(&mut cursor, &spec(3, None), None).unwrap();
        let ranges = bucket_ranges(&fragments);
        // Bucket 1 covers [1, 3) after expansion over the ties; the rest of
        // the rows land in a single trailing bucket.
        assert_eq!(ranges[0].0, Bson::Int32(1));
        assert_eq!(ranges[0].1, Bson::Int32(3));
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[1].0, Bson::Int32(3));
        assert_eq!(ranges[1].1, Bson::Int32(3));
    }

    #[test]
    fn deterministic_across_reruns() {
        let fragments_a =
            execute_bucket_auto(&mut cursor_of(&[7, 3, 9, 1, 5]), &spec(2, None), None).unwrap();
        let fragments_b =
            execute_bucket_auto(&mut cursor_of(&[7, 3, 9, 1, 5]), &spec(2, None), None).unwrap();
        assert_eq!(fragments_a, fragments_b);
    }

    #[test]
    fn granularity_snaps_bounds_to_the_series() {
        let mut cursor = cursor_of(&[2, 3, 5, 7]);
        let fragments =
            execute_bucket_auto(&mut cursor, &spec(2, Some(Granularity::R5)), None).unwrap();
        let ranges = bucket_ranges(&fragments);
        // Lower bound of the first bucket snaps below 2 (R5: 1.6); the first
        // bucket's upper bound snaps above 3 (R5: 4.0).
        assert_eq!(ranges[0].0, Bson::Double(1.6));
        assert_eq!(ranges[0].1, Bson::Double(4.0));
        // Final bucket: max 7 snaps to the next decade boundary 10.
        assert_eq!(ranges.last().unwrap().1, Bson::Double(10.0));
    }

    #[test]
    fn granularity_expansion_consumes_rows_inside_the_boundary() {
        // With R5, the first bucket's upper bound from max=2 is 2.5; the
        // value 2.4 falls inside the rounded boundary and is absorbed.
        let mut cursor = PartitionCursor::new(
            [1.0, 2.0, 2.4, 6.0]
                .iter()
                .map(|v| PartitionRow {
                    doc: doc! { "v": *v },
                    group_value: Bson::Double(*v),
                })
                .collect(),
        );
        let fragments =
            execute_bucket_auto(&mut cursor, &spec(2, Some(Granularity::R5)), None).unwrap();
        let ranges = bucket_ranges(&fragments);
        assert_eq!(ranges[0].1, Bson::Double(2.5));
        let first_bucket_rows = fragments
            .iter()
            .filter(|f| {
                f.get_document(BUCKET_ID_FIELD).unwrap().get("max").unwrap()
                    == &Bson::Double(2.5)
            })
            .count();
        assert_eq!(first_bucket_rows, 3);
    }

    #[test]
    fn non_numeric_value_under_granularity_is_a_user_error() {
        let mut cursor = PartitionCursor::new(vec![PartitionRow {
            doc: doc! { "v": "nope" },
            group_value: Bson::String("nope".into()),
        }]);
        let err = execute_bucket_auto(&mut cursor, &spec(2, Some(Granularity::E6)), None)
            .unwrap_err();
        let DbError::Stage(stage) = err else {
            panic!("expected stage error");
        };
        assert_eq!(stage.code, 40258);
    }

    #[test]
    fn negative_value_under_granularity_is_a_user_error() {
        let mut cursor = cursor_of(&[-4]);
        let err = execute_bucket_auto(&mut cursor, &spec(1, Some(Granularity::R10)), None)
            .unwrap_err();
        let DbError::Stage(stage) = err else {
            panic!("expected stage error");
        };
        assert_eq!(stage.code, 40260);
    }

    #[test]
    fn interrupt_flag_aborts_between_rows() {
        let flag = AtomicBool::new(true);
        let mut cursor = cursor_of(&[1, 2, 3]);
        let err = execute_bucket_auto(&mut cursor, &spec(2, None), Some(&flag)).unwrap_err();
        assert!(matches!(err, DbError::Interrupted));
    }

    #[test]
    fn bucket_sizes_sum_to_total_rows() {
        for total in [1usize, 4, 9, 10, 17, 23] {
            let values: Vec<i32> = (0..total as i32).collect();
            let mut cursor = cursor_of(&values);
            let fragments = execute_bucket_auto(&mut cursor, &spec(4, None), None).unwrap();
            assert_eq!(fragments.len(), total);
            let ranges = bucket_ranges(&fragments);
            assert!(ranges.len() <= 4);
            if total < 4 {
                assert_eq!(ranges.len(), total);
            }
        }
    }
}
