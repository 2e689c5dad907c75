pub mod bucket_auto;
pub mod granularity;
pub mod group;

use bson::{Bson, Document};

use crate::error::DbError;
use crate::planner::plan::PlanNode;

/// Compile an aggregation pipeline into a relational plan, one stage at a
/// time, each stage consuming the previous stage's tree.
pub fn compile_pipeline(collection: &str, stages: &[Document]) -> Result<PlanNode, DbError> {
    let mut node = PlanNode::CollectionScan {
        collection: collection.to_string(),
    };
    for stage in stages {
        let mut entries = stage.iter();
        let (name, value) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(DbError::InvalidQuery(
                    "a pipeline stage must contain exactly one stage operator".to_string(),
                ));
            }
        };
        node = match name.as_str() {
            "$bucketAuto" => bucket_auto::compile_bucket_auto(value, node)?,
            "$group" => match value {
                Bson::Document(spec) => group::compile_group(spec, node)?,
                other => {
                    return Err(DbError::InvalidQuery(format!(
                        "$group requires an object argument, found {other}"
                    )));
                }
            },
            other => {
                return Err(DbError::InvalidQuery(format!(
                    "unrecognized pipeline stage: {other}"
                )));
            }
        };
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn empty_pipeline_is_a_bare_scan() {
        let plan = compile_pipeline("items", &[]).unwrap();
        assert!(matches!(plan, PlanNode::CollectionScan { .. }));
    }

    #[test]
    fn unknown_stage_is_rejected() {
        let err = compile_pipeline("items", &[doc! { "$facet": {} }]).unwrap_err();
        assert!(matches!(err, DbError::InvalidQuery(_)));
    }

    #[test]
    fn multi_operator_stage_is_rejected() {
        let err = compile_pipeline(
            "items",
            &[doc! { "$group": { "_id": "$a" }, "$bucketAuto": {} }],
        )
        .unwrap_err();
        assert!(matches!(err, DbError::InvalidQuery(_)));
    }
}
