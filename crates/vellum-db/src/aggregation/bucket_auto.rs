use bson::{Bson, Document, doc};
use vellum_query::BucketAutoSpec;

use crate::aggregation::group;
use crate::error::DbError;
use crate::expression::parse_expr;
use crate::planner::plan::{PlanNode, WindowFrame, WindowFunc};

/// Field the window function's value is merged under, and the grouping key
/// downstream.
pub const BUCKET_ID_FIELD: &str = "bucket_id";

/// Compile a `$bucketAuto` stage into the relational tree.
///
/// The rewrite proceeds in three steps: push everything before the stage
/// into a subquery; attach the bucket-auto window function ordered by the
/// evaluated groupBy expression over the unbounded partition frame, then
/// wrap again and merge the produced bucket id into the document stream;
/// finally delegate to the grouping-stage compiler with a synthesized spec
/// keyed on the bucket id.
pub fn compile_bucket_auto(stage: &Bson, input: PlanNode) -> Result<PlanNode, DbError> {
    let spec = BucketAutoSpec::parse(stage)?;
    let group_by = parse_expr(&spec.group_by)?;

    let input = PlanNode::Subquery {
        input: Box::new(input),
    };

    let window = PlanNode::Window {
        func: WindowFunc::BucketAuto {
            spec: spec.clone(),
            group_by: group_by.clone(),
        },
        order_by: group_by,
        frame: WindowFrame::WholePartition,
        input: Box::new(input),
    };

    let merged = PlanNode::MergeField {
        field: BUCKET_ID_FIELD.to_string(),
        input: Box::new(PlanNode::Subquery {
            input: Box::new(window),
        }),
    };

    let group_spec = synthesize_group_spec(spec.output.as_ref());
    group::compile_group(&group_spec, merged)
}

/// Group on the bucket id; carry the stage's `output` fields, or a count
/// aggregate when none were given.
fn synthesize_group_spec(output: Option<&Document>) -> Document {
    let mut spec = doc! { "_id": format!("${BUCKET_ID_FIELD}") };
    match output {
        Some(fields) => {
            for (key, value) in fields.iter() {
                spec.insert(key.clone(), value.clone());
            }
        }
        None => {
            spec.insert("count", doc! { "$sum": 1 });
        }
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::group::Accumulator;
    use crate::expression::Expr;

    fn scan() -> PlanNode {
        PlanNode::CollectionScan {
            collection: "items".into(),
        }
    }

    #[test]
    fn compiles_to_group_over_merged_window() {
        let stage = Bson::Document(doc! { "groupBy": "$price", "buckets": 3 });
        let plan = compile_bucket_auto(&stage, scan()).unwrap();

        let PlanNode::Group { spec, input } = plan else {
            panic!("top node must be the grouping stage");
        };
        assert_eq!(spec.id, Expr::Path(BUCKET_ID_FIELD.into()));
        assert_eq!(spec.fields.len(), 1);
        assert_eq!(spec.fields[0].name, "count");
        assert_eq!(spec.fields[0].accumulator, Accumulator::Sum);

        let PlanNode::MergeField { field, input } = *input else {
            panic!("group input must merge the bucket id");
        };
        assert_eq!(field, BUCKET_ID_FIELD);

        let PlanNode::Subquery { input } = *input else {
            panic!("merge reads from a subquery");
        };
        let PlanNode::Window {
            order_by, frame, ..
        } = *input
        else {
            panic!("subquery wraps the window function");
        };
        assert_eq!(order_by, Expr::Path("price".into()));
        assert_eq!(frame, WindowFrame::WholePartition);
    }

    #[test]
    fn output_fields_replace_the_default_count() {
        let stage = Bson::Document(doc! {
            "groupBy": "$price",
            "buckets": 2,
            "output": { "total": { "$sum": "$qty" }, "top": { "$max": "$qty" } },
        });
        let plan = compile_bucket_auto(&stage, scan()).unwrap();
        let PlanNode::Group { spec, .. } = plan else {
            panic!("expected group node");
        };
        let names: Vec<&str> = spec.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["total", "top"]);
    }

    #[test]
    fn stage_validation_errors_pass_through() {
        let err = compile_bucket_auto(&Bson::Document(doc! { "buckets": 2 }), scan())
            .unwrap_err();
        let DbError::Stage(stage) = err else {
            panic!("expected a stage error");
        };
        assert_eq!(stage.code, 40246);
    }
}
