use bson::{Bson, doc};
use vellum_db::{Database, DatabaseConfig, DbError, explain_scan};
use vellum_engine::{ColumnPredicate, IndexColumn, IndexDescriptor, ScanPredicate};
use vellum_query::SortKey;
use vellum_store::MemoryStore;

fn tags_db() -> Database<MemoryStore> {
    let db = Database::open(MemoryStore::new(), DatabaseConfig::default()).unwrap();
    db.create_collection("posts").unwrap();
    db.insert_many(
        "posts",
        &[
            doc! { "_id": 1, "tags": ["rust", "db"], "rank": 3 },
            doc! { "_id": 2, "tags": ["db"], "rank": 1 },
            doc! { "_id": 3, "tags": ["rust", "engine", "db"], "rank": 2 },
        ],
    )
    .unwrap();
    db.create_index(
        "posts",
        IndexDescriptor::composite(
            "tags_rank",
            vec![IndexColumn::asc("tags"), IndexColumn::asc("rank")],
        ),
    )
    .unwrap();
    db
}

#[test]
fn ordered_find_on_multikey_index_returns_each_doc_once() {
    let db = tags_db();
    // Pure order-by on the leading multikey column: pushdown is safe, the
    // tracker dedupes the per-element postings.
    let result = db
        .find_with_index("posts", "tags_rank", &[], &[SortKey::asc("tags")])
        .unwrap();

    // All three posts match at least one tag; none appears twice.
    let ids: Vec<i32> = result
        .docs
        .iter()
        .map(|d| d.get_i32("_id").unwrap())
        .collect();
    let mut unique = ids.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(unique.len(), 3);

    assert!(result.diagnostics.is_multi_key);
    assert!(result.diagnostics.num_duplicates > 0);
}

#[test]
fn equality_find_narrows_to_matching_docs() {
    let db = tags_db();
    let result = db
        .find_with_index(
            "posts",
            "tags_rank",
            &[ColumnPredicate {
                column: 0,
                predicate: ScanPredicate::Eq(Bson::String("rust".into())),
            }],
            &[],
        )
        .unwrap();
    let ids: Vec<i32> = result
        .docs
        .iter()
        .map(|d| d.get_i32("_id").unwrap())
        .collect();
    assert_eq!(ids, vec![1, 3]);
}

#[test]
fn explain_shape_follows_the_scan() {
    let db = tags_db();
    let result = db
        .find_with_index(
            "posts",
            "tags_rank",
            &[ColumnPredicate {
                column: 0,
                predicate: ScanPredicate::Eq(Bson::String("db".into())),
            }],
            &[],
        )
        .unwrap();

    let explain = explain_scan(&result.diagnostics);
    assert_eq!(explain.get_bool("isMultiKey").unwrap(), true);
    let bounds = explain.get_array("indexBounds").unwrap();
    assert_eq!(bounds.len(), 2);
    let first = bounds[0].as_str().unwrap();
    assert!(first.starts_with("tags: ["), "{first}");
    assert_eq!(bounds[1].as_str().unwrap(), "rank: [MinKey, MaxKey]");
    // Unordered equality scan: no tracker, no duplicate count emitted.
    assert!(explain.get("numDuplicates").is_none());
    assert!(explain.get("isBackwardScan").is_none());
}

#[test]
fn non_leading_predicate_alone_is_rejected_by_the_cost_model() {
    let db = tags_db();
    let err = db
        .find_with_index(
            "posts",
            "tags_rank",
            &[ColumnPredicate {
                column: 1,
                predicate: ScanPredicate::Eq(Bson::Int32(1)),
            }],
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidQuery(_)));
}

#[test]
fn multikey_orderby_with_leading_filter_falls_back_to_residual_sort() {
    let db = tags_db();
    // Filter on the leading multikey column plus a sort on the second
    // column: pushdown is unsafe, so the scan runs unordered and the sort
    // happens above it.
    let result = db
        .find_with_index(
            "posts",
            "tags_rank",
            &[ColumnPredicate {
                column: 0,
                predicate: ScanPredicate::Eq(Bson::String("db".into())),
            }],
            &[SortKey::asc("rank")],
        )
        .unwrap();

    let ranks: Vec<i32> = result
        .docs
        .iter()
        .map(|d| d.get_i32("rank").unwrap())
        .collect();
    assert_eq!(ranks, vec![1, 2, 3]);
    // No pushdown: the scan itself reports no backward/ordered behavior,
    // and duplicates were not filtered by a tracker.
    assert!(!result.diagnostics.is_backward_scan);
}

#[test]
fn descending_sort_runs_the_scan_backward() {
    let db = Database::open(MemoryStore::new(), DatabaseConfig::default()).unwrap();
    db.create_collection("events").unwrap();
    db.insert_many(
        "events",
        &[
            doc! { "_id": 1, "at": 10 },
            doc! { "_id": 2, "at": 30 },
            doc! { "_id": 3, "at": 20 },
        ],
    )
    .unwrap();
    db.create_index(
        "events",
        IndexDescriptor::composite("at", vec![IndexColumn::asc("at")]),
    )
    .unwrap();

    let result = db
        .find_with_index(
            "events",
            "at",
            &[ColumnPredicate {
                column: 0,
                predicate: ScanPredicate::gt(Bson::Int32(0)).unwrap(),
            }],
            &[SortKey::desc("at")],
        )
        .unwrap();

    let ats: Vec<i32> = result
        .docs
        .iter()
        .map(|d| d.get_i32("at").unwrap())
        .collect();
    assert_eq!(ats, vec![30, 20, 10]);
    assert!(result.diagnostics.is_backward_scan);
}

#[test]
fn inserts_after_index_creation_are_visible_to_scans() {
    let db = tags_db();
    db.insert_many("posts", &[doc! { "_id": 4, "tags": ["rust"], "rank": 9 }])
        .unwrap();

    let result = db
        .find_with_index(
            "posts",
            "tags_rank",
            &[ColumnPredicate {
                column: 0,
                predicate: ScanPredicate::Eq(Bson::String("rust".into())),
            }],
            &[],
        )
        .unwrap();
    assert_eq!(result.docs.len(), 3);
}

#[test]
fn scalar_only_index_stays_non_multikey() {
    let db = Database::open(MemoryStore::new(), DatabaseConfig::default()).unwrap();
    db.create_collection("plain").unwrap();
    db.insert_many("plain", &[doc! { "a": 1 }, doc! { "a": 2 }])
        .unwrap();
    db.create_index(
        "plain",
        IndexDescriptor::composite("a", vec![IndexColumn::asc("a")]),
    )
    .unwrap();

    let result = db
        .find_with_index(
            "plain",
            "a",
            &[ColumnPredicate {
                column: 0,
                predicate: ScanPredicate::gte(Bson::Int32(0)).unwrap(),
            }],
            &[SortKey::asc("a")],
        )
        .unwrap();
    assert!(!result.diagnostics.is_multi_key);
    assert_eq!(result.diagnostics.num_duplicates, 0);
}
