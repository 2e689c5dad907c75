use bson::{Bson, doc};
use vellum_engine::{
    ColumnPredicate, IndexColumn, IndexDescriptor, IndexScan, RowBitmap, RowId, ScanDirection,
    ScanPredicate, TermIndex, begin_scan,
};
use vellum_query::SortKey;
use vellum_store::{MemoryStore, Store, Transaction as _};

fn tags_index() -> IndexDescriptor {
    IndexDescriptor::composite(
        "tags_qty",
        vec![IndexColumn::asc("tags"), IndexColumn::asc("qty")],
    )
}

fn seeded(index: &IndexDescriptor, docs: &[bson::Document]) -> MemoryStore {
    let store = MemoryStore::new();
    store.create_keyspace(&index.keyspace).unwrap();
    let txn = store.begin(false).unwrap();
    let term_index = TermIndex::open(&txn, index).unwrap();
    let rows: Vec<(RowId, &bson::Document)> = docs
        .iter()
        .enumerate()
        .map(|(i, d)| (RowId::new(0, i as u16 + 1), d))
        .collect();
    term_index.build(rows.into_iter()).unwrap();
    txn.commit().unwrap();
    store
}

#[test]
fn ordered_multikey_scan_emits_each_row_once() {
    let index = tags_index();
    let store = seeded(
        &index,
        &[
            doc! { "tags": ["a", "b", "c"], "qty": 1 },
            doc! { "tags": ["b"], "qty": 2 },
            doc! { "tags": ["a", "c"], "qty": 3 },
        ],
    );

    let txn = store.begin(true).unwrap();
    let term_index = TermIndex::open(&txn, &index).unwrap();
    let scan = begin_scan(&term_index, &index, 1, 1, false).unwrap();
    let IndexScan::Composite(mut state) = scan else {
        panic!("composite index must produce a composite scan");
    };

    state.rescan(&[], &[SortKey::asc("tags")]).unwrap();

    let mut rows = Vec::new();
    while let Some(tuple) = state.get_tuple(ScanDirection::Forward).unwrap() {
        rows.push(tuple.row);
    }

    // Every row exactly once, even though rows 1 and 3 have several
    // matching array elements.
    let mut unique = rows.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(rows.len(), 3);
    assert_eq!(unique.len(), 3);

    let diag = state.diagnostics();
    assert!(diag.is_multi_key);
    // Rows 1 and 3 carry 2 extra postings each within the scanned range.
    assert_eq!(diag.num_duplicates, 3);
}

#[test]
fn rescan_restarts_the_dedup_cycle() {
    let index = tags_index();
    let store = seeded(&index, &[doc! { "tags": ["x", "y"], "qty": 1 }]);

    let txn = store.begin(true).unwrap();
    let term_index = TermIndex::open(&txn, &index).unwrap();
    let IndexScan::Composite(mut state) = begin_scan(&term_index, &index, 1, 1, false).unwrap()
    else {
        panic!("expected composite scan");
    };

    for _ in 0..2 {
        state.rescan(&[], &[SortKey::asc("tags")]).unwrap();
        let mut count = 0;
        while state.get_tuple(ScanDirection::Forward).unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 1);
        assert_eq!(state.diagnostics().num_duplicates, 1);
    }
}

#[test]
fn equality_rescan_narrows_results() {
    let index = tags_index();
    let store = seeded(
        &index,
        &[
            doc! { "tags": ["a"], "qty": 1 },
            doc! { "tags": ["b"], "qty": 2 },
        ],
    );

    let txn = store.begin(true).unwrap();
    let term_index = TermIndex::open(&txn, &index).unwrap();
    let IndexScan::Composite(mut state) = begin_scan(&term_index, &index, 1, 1, false).unwrap()
    else {
        panic!("expected composite scan");
    };

    state
        .rescan(
            &[ColumnPredicate {
                column: 0,
                predicate: ScanPredicate::Eq(Bson::String("b".into())),
            }],
            &[SortKey::asc("tags")],
        )
        .unwrap();

    let tuple = state.get_tuple(ScanDirection::Forward).unwrap().unwrap();
    assert_eq!(tuple.row, RowId::new(0, 2));
    assert!(state.get_tuple(ScanDirection::Forward).unwrap().is_none());
}

#[test]
fn bitmap_scan_dedupes_without_tracker() {
    let index = tags_index();
    let store = seeded(&index, &[doc! { "tags": ["a", "b", "c", "d"], "qty": 9 }]);

    let txn = store.begin(true).unwrap();
    let term_index = TermIndex::open(&txn, &index).unwrap();
    let IndexScan::Composite(mut state) = begin_scan(&term_index, &index, 1, 0, false).unwrap()
    else {
        panic!("expected composite scan");
    };

    state.rescan(&[], &[]).unwrap();
    let mut bitmap = RowBitmap::new();
    state.get_bitmap(&mut bitmap).unwrap();
    assert_eq!(bitmap.len(), 1);
    assert_eq!(state.diagnostics().num_duplicates, 0);
}
