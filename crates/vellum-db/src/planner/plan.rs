use vellum_query::BucketAutoSpec;

use crate::aggregation::group::GroupSpec;
use crate::expression::Expr;

/// Relational query tree produced by stage compilation.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanNode {
    /// Yields the documents of a collection.
    CollectionScan { collection: String },

    /// Materialization boundary. Stages that aggregate push everything
    /// before them under one of these before adding their own nodes.
    Subquery { input: Box<PlanNode> },

    /// Window function over the whole stream, ordered by `order_by` with an
    /// unbounded partition frame. Yields each input document plus the
    /// function's value for that row.
    Window {
        func: WindowFunc,
        order_by: Expr,
        frame: WindowFrame,
        input: Box<PlanNode>,
    },

    /// Merge the window function's value into the document stream under
    /// `field`.
    MergeField { field: String, input: Box<PlanNode> },

    /// Grouping stage keyed on the spec's `_id` expression.
    Group {
        spec: GroupSpec,
        input: Box<PlanNode>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum WindowFunc {
    BucketAuto {
        spec: BucketAutoSpec,
        group_by: Expr,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowFrame {
    /// ROWS BETWEEN UNBOUNDED PRECEDING AND UNBOUNDED FOLLOWING.
    WholePartition,
}
