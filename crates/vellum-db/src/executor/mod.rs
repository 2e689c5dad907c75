pub mod partition;
pub mod window;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use bson::{Bson, Document, doc};
use vellum_engine::compare_values;

use crate::aggregation::group::{AccumulatorState, GroupSpec};
use crate::error::DbError;
use crate::executor::partition::{PartitionCursor, PartitionRow};
use crate::expression::evaluate;
use crate::planner::plan::{PlanNode, WindowFunc};

/// Field window values travel under between the Window node and the
/// MergeField node that folds them into the document.
const WINDOW_VALUE_FIELD: &str = "__window";

/// Pull-through executor over compiled plans.
///
/// Collections are provided as buffered document sets; the interrupt flag
/// is polled between per-document evaluation steps of window functions.
pub struct Executor {
    collections: HashMap<String, Vec<Document>>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Executor {
    pub fn new() -> Self {
        Executor {
            collections: HashMap::new(),
            interrupt: None,
        }
    }

    pub fn with_collection(mut self, name: impl Into<String>, docs: Vec<Document>) -> Self {
        self.collections.insert(name.into(), docs);
        self
    }

    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn execute(&self, node: &PlanNode) -> Result<Vec<Document>, DbError> {
        match node {
            PlanNode::CollectionScan { collection } => self
                .collections
                .get(collection)
                .cloned()
                .ok_or_else(|| {
                    DbError::InvalidQuery(format!("unknown collection: {collection}"))
                }),

            PlanNode::Subquery { input } => self.execute(input),

            PlanNode::Window {
                func: WindowFunc::BucketAuto { spec, group_by },
                input,
                ..
            } => {
                let docs = self.execute(input)?;
                let rows = docs
                    .into_iter()
                    .map(|doc| {
                        let group_value = evaluate(group_by, &doc)?;
                        Ok(PartitionRow { doc, group_value })
                    })
                    .collect::<Result<Vec<_>, DbError>>()?;

                let mut cursor = PartitionCursor::new(rows);
                let fragments = window::execute_bucket_auto(
                    &mut cursor,
                    spec,
                    self.interrupt.as_deref(),
                )?;

                let out = cursor
                    .into_rows()
                    .into_iter()
                    .zip(fragments)
                    .map(|(row, fragment)| {
                        let mut doc = row.doc;
                        doc.insert(WINDOW_VALUE_FIELD, fragment);
                        doc
                    })
                    .collect();
                Ok(out)
            }

            PlanNode::MergeField { field, input } => {
                let docs = self.execute(input)?;
                docs.into_iter()
                    .map(|mut doc| {
                        let fragment = doc.remove(WINDOW_VALUE_FIELD).ok_or_else(|| {
                            DbError::Internal(
                                "merge stage found no window value to fold in".to_string(),
                            )
                        })?;
                        let Bson::Document(fragment) = fragment else {
                            return Err(DbError::Internal(
                                "window value is not a document fragment".to_string(),
                            ));
                        };
                        let value = fragment.get(field).cloned().ok_or_else(|| {
                            DbError::Internal(format!(
                                "window fragment is missing the {field} field"
                            ))
                        })?;
                        doc.insert(field.clone(), value);
                        Ok(doc)
                    })
                    .collect()
            }

            PlanNode::Group { spec, input } => {
                let docs = self.execute(input)?;
                self.execute_group(spec, docs)
            }
        }
    }

    fn execute_group(
        &self,
        spec: &GroupSpec,
        docs: Vec<Document>,
    ) -> Result<Vec<Document>, DbError> {
        // Group keys are arbitrary BSON; equality goes through the value
        // comparator, with first-seen ordering preserved.
        let mut groups: Vec<(Bson, Vec<AccumulatorState>)> = Vec::new();

        for doc in &docs {
            let key = evaluate(&spec.id, doc)?;
            let slot = groups
                .iter()
                .position(|(k, _)| compare_values(k, &key) == std::cmp::Ordering::Equal);
            let slot = match slot {
                Some(i) => i,
                None => {
                    groups.push((key, vec![AccumulatorState::default(); spec.fields.len()]));
                    groups.len() - 1
                }
            };
            for (field, state) in spec.fields.iter().zip(groups[slot].1.iter_mut()) {
                let value = evaluate(&field.argument, doc)?;
                field.accumulator.fold(state, value);
            }
        }

        Ok(groups
            .into_iter()
            .map(|(key, states)| {
                let mut out = doc! { "_id": key };
                for (field, state) in spec.fields.iter().zip(states) {
                    out.insert(field.name.clone(), field.accumulator.finish(state));
                }
                out
            })
            .collect())
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}
