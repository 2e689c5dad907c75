use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use bson::Document;
use vellum_engine::{
    BuildStats, ColumnPredicate, IndexDescriptor, IndexScan, InvertedIndexAm, RowBitmap, RowId,
    ScanDiagnostics, ScanDirection, ScanPredicate, TermIndex, begin_scan, compare_values,
};
use vellum_query::SortKey;
use vellum_store::{ScanRange, Store, Transaction};

use crate::aggregation::compile_pipeline;
use crate::config::DatabaseConfig;
use crate::cursor::CursorStore;
use crate::error::DbError;
use crate::executor::Executor;
use crate::expression::{Expr, evaluate};
use crate::planner::cost::{
    ClauseOperator, IndexClause, IndexPathCandidate, PathKind, estimate_cost,
};
use crate::planner::orderby::{ColumnPredicates, validate_order_by_pushdown};
use crate::registry::{AccessMethodRegistry, CatalogIdCache, COMPOSITE_ACCESS_METHOD};
use crate::sweep::{self, SweepHandle};

/// Result of an index-backed find: the documents plus the scan's explain
/// diagnostics.
#[derive(Debug)]
pub struct FindResult {
    pub docs: Vec<Document>,
    pub diagnostics: ScanDiagnostics,
}

struct CollectionState {
    indexes: Vec<IndexDescriptor>,
    next_row: u64,
}

/// Session facade wiring the composite index engine, planner checks, and
/// the aggregation executor over one store.
pub struct Database<S: Store> {
    store: S,
    config: DatabaseConfig,
    registry: AccessMethodRegistry,
    catalog_ids: CatalogIdCache,
    cursors: Option<Arc<CursorStore>>,
    _sweeper: Option<SweepHandle>,
    interrupt: Arc<AtomicBool>,
    collections: RwLock<HashMap<String, CollectionState>>,
}

fn doc_keyspace(collection: &str) -> String {
    format!("c.{collection}")
}

impl<S: Store> Database<S> {
    pub fn open(store: S, config: DatabaseConfig) -> Result<Self, DbError> {
        let registry = AccessMethodRegistry::new();
        registry.register(COMPOSITE_ACCESS_METHOD)?;

        let cursors = match &config.cursor_dir {
            Some(dir) => Some(Arc::new(CursorStore::new(
                dir.clone(),
                config.max_open_cursors,
                Duration::from_secs(config.cursor_ttl_secs),
            )?)),
            None => None,
        };
        let sweeper = cursors
            .as_ref()
            .and_then(|store| sweep::spawn(Arc::clone(store), config.cursor_sweep_interval_secs));

        Ok(Database {
            store,
            config,
            registry,
            catalog_ids: CatalogIdCache::new(),
            cursors,
            _sweeper: sweeper,
            interrupt: Arc::new(AtomicBool::new(false)),
            collections: RwLock::new(HashMap::new()),
        })
    }

    /// Cooperative cancellation flag, polled between per-document steps of
    /// window evaluation.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn cursor_store(&self) -> Option<&Arc<CursorStore>> {
        self.cursors.as_ref()
    }

    pub fn create_collection(&self, name: &str) -> Result<(), DbError> {
        self.store.create_keyspace(&doc_keyspace(name))?;
        self.catalog_ids.resolve(name);
        let mut collections = self
            .collections
            .write()
            .map_err(|_| DbError::Internal("collection catalog poisoned".into()))?;
        collections.entry(name.to_string()).or_insert(CollectionState {
            indexes: Vec::new(),
            next_row: 0,
        });
        Ok(())
    }

    /// Create a composite index and bulk-build it over the collection's
    /// current documents.
    pub fn create_index(
        &self,
        collection: &str,
        index: IndexDescriptor,
    ) -> Result<BuildStats, DbError> {
        if !index.is_composite() {
            return Err(DbError::Configuration(
                "only composite-classified indexes are supported".to_string(),
            ));
        }
        self.registry.lookup(COMPOSITE_ACCESS_METHOD.name)?;
        self.store.create_keyspace(&index.keyspace)?;
        self.catalog_ids.resolve(&index.name);

        let txn = self.store.begin(false)?;
        let doc_ks = txn.keyspace(&doc_keyspace(collection))?;
        let mut rows: Vec<(RowId, Document)> = Vec::new();
        for entry in txn.scan_range(&doc_ks, ScanRange::full(), false)? {
            let (key, value) = entry?;
            if key.len() != 8 {
                continue;
            }
            let mut packed = [0u8; 8];
            packed.copy_from_slice(&key);
            let doc: Document = bson::deserialize_from_slice(&value)
                .map_err(|e| DbError::Internal(format!("decode stored document: {e}")))?;
            rows.push((RowId::from_bytes(packed), doc));
        }

        let term_index = TermIndex::open(&txn, &index)?;
        let stats = term_index.build(rows.iter().map(|(row, doc)| (*row, doc)))?;
        txn.commit()?;

        let mut collections = self
            .collections
            .write()
            .map_err(|_| DbError::Internal("collection catalog poisoned".into()))?;
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| DbError::InvalidQuery(format!("unknown collection: {collection}")))?;
        state.indexes.push(index);
        Ok(stats)
    }

    pub fn insert_many(&self, collection: &str, docs: &[Document]) -> Result<(), DbError> {
        let mut collections = self
            .collections
            .write()
            .map_err(|_| DbError::Internal("collection catalog poisoned".into()))?;
        let state = collections
            .get_mut(collection)
            .ok_or_else(|| DbError::InvalidQuery(format!("unknown collection: {collection}")))?;

        let txn = self.store.begin(false)?;
        let doc_ks = txn.keyspace(&doc_keyspace(collection))?;
        for doc in docs {
            let n = state.next_row;
            state.next_row += 1;
            let row = RowId::new((n >> 8) as u32, (n & 0xFF) as u16 + 1);

            let raw = bson::RawDocumentBuf::try_from(doc)
                .map_err(|e| DbError::Internal(format!("encode document: {e}")))?;
            txn.put(&doc_ks, &row.to_bytes(), raw.as_bytes())?;

            for index in &state.indexes {
                let term_index = TermIndex::open(&txn, index)?;
                term_index.insert(row, doc)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Execute an index-backed find through the composite scan adapter,
    /// after the planner-side cost and order-by pushdown checks.
    pub fn find_with_index(
        &self,
        collection: &str,
        index_name: &str,
        predicates: &[ColumnPredicate],
        sort_keys: &[SortKey],
    ) -> Result<FindResult, DbError> {
        let index = self.lookup_index(collection, index_name)?;
        self.registry.lookup(COMPOSITE_ACCESS_METHOD.name)?;

        let txn = self.store.begin(true)?;
        let term_index = TermIndex::open(&txn, &index)?;
        let index_meta = term_index.meta()?;

        let summary = predicate_summary(&index, predicates);
        let decision = validate_order_by_pushdown(
            &index,
            sort_keys,
            &summary,
            index_meta.is_multikey(),
            false,
        );

        let mut clauses: Vec<IndexClause> = predicates
            .iter()
            .filter_map(|p| {
                let operator = match &p.predicate {
                    ScanPredicate::Eq(_) => ClauseOperator::Eq,
                    ScanPredicate::Range { .. } => ClauseOperator::Range,
                    ScanPredicate::FullScan => return None,
                };
                Some(IndexClause {
                    column: p.column,
                    operator,
                })
            })
            .collect();
        if clauses.is_empty() && decision.pushdown {
            // Pure order-by query: the pushdown itself anchors the scan as
            // a full-range clause on the leading column.
            clauses.push(IndexClause {
                column: 0,
                operator: ClauseOperator::Range,
            });
        }

        let candidate = IndexPathCandidate {
            index: &index,
            kind: PathKind::IndexScan,
            clauses,
            partial_predicate: None,
        };
        let cost = estimate_cost(&candidate, index_meta.entry_count, &self.config);
        if cost.is_rejected() {
            return Err(DbError::InvalidQuery(format!(
                "index {index_name} is not applicable to this query shape"
            )));
        }

        let pushdown_keys: &[SortKey] = if decision.pushdown { sort_keys } else { &[] };

        let scan = begin_scan(
            &term_index,
            &index,
            predicates.len().max(1),
            pushdown_keys.len(),
            false,
        )?;
        let IndexScan::Composite(mut state) = scan else {
            return Err(DbError::Internal(
                "composite descriptor produced a passthrough scan".to_string(),
            ));
        };
        state.rescan(predicates, pushdown_keys)?;

        // Ordered scans pull tuple-at-a-time through the dedup tracker;
        // unordered scans take the bitmap path, which dedupes on insertion.
        let doc_ks = txn.keyspace(&doc_keyspace(collection))?;
        let mut rows: Vec<RowId> = Vec::new();
        if pushdown_keys.is_empty() {
            let mut bitmap = RowBitmap::new();
            state.get_bitmap(&mut bitmap)?;
            rows.extend(bitmap.iter());
        } else {
            while let Some(tuple) = state.get_tuple(ScanDirection::Forward)? {
                rows.push(tuple.row);
            }
        }

        let mut docs = Vec::with_capacity(rows.len());
        for row in rows {
            let bytes = txn.get(&doc_ks, &row.to_bytes())?.ok_or_else(|| {
                DbError::Internal(format!("index entry points at missing row {row}"))
            })?;
            let doc: Document = bson::deserialize_from_slice(&bytes)
                .map_err(|e| DbError::Internal(format!("decode stored document: {e}")))?;
            docs.push(doc);
        }
        let diagnostics = state.diagnostics();
        state.end();

        if !decision.pushdown && !sort_keys.is_empty() {
            sort_documents(&mut docs, sort_keys)?;
        }

        Ok(FindResult { docs, diagnostics })
    }

    /// Run an aggregation pipeline over a collection.
    pub fn aggregate(
        &self,
        collection: &str,
        pipeline: &[Document],
    ) -> Result<Vec<Document>, DbError> {
        let docs = self.all_documents(collection)?;
        let plan = compile_pipeline(collection, pipeline)?;
        Executor::new()
            .with_collection(collection, docs)
            .with_interrupt(Arc::clone(&self.interrupt))
            .execute(&plan)
    }

    fn all_documents(&self, collection: &str) -> Result<Vec<Document>, DbError> {
        let txn = self.store.begin(true)?;
        let doc_ks = txn.keyspace(&doc_keyspace(collection))?;
        let mut docs = Vec::new();
        for entry in txn.scan_range(&doc_ks, ScanRange::full(), false)? {
            let (_, value) = entry?;
            let doc: Document = bson::deserialize_from_slice(&value)
                .map_err(|e| DbError::Internal(format!("decode stored document: {e}")))?;
            docs.push(doc);
        }
        Ok(docs)
    }

    fn lookup_index(
        &self,
        collection: &str,
        index_name: &str,
    ) -> Result<IndexDescriptor, DbError> {
        let collections = self
            .collections
            .read()
            .map_err(|_| DbError::Internal("collection catalog poisoned".into()))?;
        let state = collections
            .get(collection)
            .ok_or_else(|| DbError::InvalidQuery(format!("unknown collection: {collection}")))?;
        state
            .indexes
            .iter()
            .find(|ix| ix.name == index_name)
            .cloned()
            .ok_or_else(|| {
                DbError::Configuration(format!(
                    "index {index_name} not found on collection {collection}"
                ))
            })
    }
}

fn predicate_summary(index: &IndexDescriptor, predicates: &[ColumnPredicate]) -> ColumnPredicates {
    let mut summary = ColumnPredicates::none(index.columns.len());
    for predicate in predicates {
        if predicate.column >= index.columns.len() {
            continue;
        }
        match predicate.predicate {
            ScanPredicate::Eq(_) => summary.equality[predicate.column] = true,
            ScanPredicate::Range { .. } => summary.range[predicate.column] = true,
            ScanPredicate::FullScan => {}
        }
    }
    summary
}

/// Residual in-memory sort for queries whose order could not be pushed to
/// the index.
fn sort_documents(docs: &mut [Document], sort_keys: &[SortKey]) -> Result<(), DbError> {
    let exprs: Vec<(Expr, vellum_query::SortDirection)> = sort_keys
        .iter()
        .map(|key| (Expr::Path(key.path.clone()), key.direction))
        .collect();

    let mut keyed: Vec<(Vec<bson::Bson>, Document)> = Vec::with_capacity(docs.len());
    for doc in docs.iter() {
        let mut values = Vec::with_capacity(exprs.len());
        for (expr, _) in &exprs {
            values.push(evaluate(expr, doc)?);
        }
        keyed.push((values, doc.clone()));
    }
    keyed.sort_by(|a, b| {
        for (i, (_, direction)) in exprs.iter().enumerate() {
            let order = compare_values(&a.0[i], &b.0[i]);
            let order = match direction {
                vellum_query::SortDirection::Asc => order,
                vellum_query::SortDirection::Desc => order.reverse(),
            };
            if order != std::cmp::Ordering::Equal {
                return order;
            }
        }
        std::cmp::Ordering::Equal
    });
    for (slot, (_, doc)) in docs.iter_mut().zip(keyed) {
        *slot = doc;
    }
    Ok(())
}
