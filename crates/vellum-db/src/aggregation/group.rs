use bson::{Bson, Document};
use vellum_engine::{compare_values, is_number};

use crate::error::DbError;
use crate::expression::{Expr, parse_expr};
use crate::planner::plan::PlanNode;

/// Parsed grouping-stage specification: the `_id` key expression plus
/// named accumulator fields.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSpec {
    pub id: Expr,
    pub fields: Vec<GroupField>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupField {
    pub name: String,
    pub accumulator: Accumulator,
    pub argument: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulator {
    Sum,
    Min,
    Max,
    Avg,
}

impl GroupSpec {
    pub fn parse(spec: &Document) -> Result<Self, DbError> {
        let mut id = None;
        let mut fields = Vec::new();
        for (key, value) in spec.iter() {
            if key == "_id" {
                id = Some(parse_expr(value)?);
                continue;
            }
            let Bson::Document(acc_doc) = value else {
                return Err(DbError::InvalidQuery(format!(
                    "the group field {key} must be an accumulator object"
                )));
            };
            let mut entries = acc_doc.iter();
            let (acc_key, argument) = match (entries.next(), entries.next()) {
                (Some(entry), None) => entry,
                _ => {
                    return Err(DbError::InvalidQuery(format!(
                        "the group field {key} must contain exactly one accumulator"
                    )));
                }
            };
            let accumulator = match acc_key.as_str() {
                "$sum" => Accumulator::Sum,
                "$min" => Accumulator::Min,
                "$max" => Accumulator::Max,
                "$avg" => Accumulator::Avg,
                other => {
                    return Err(DbError::InvalidQuery(format!(
                        "unknown group accumulator: {other}"
                    )));
                }
            };
            fields.push(GroupField {
                name: key.clone(),
                accumulator,
                argument: parse_expr(argument)?,
            });
        }

        let id = id.ok_or_else(|| {
            DbError::InvalidQuery("a group specification must include _id".to_string())
        })?;
        Ok(GroupSpec { id, fields })
    }
}

/// Compile a grouping stage over `input`.
pub fn compile_group(spec: &Document, input: PlanNode) -> Result<PlanNode, DbError> {
    Ok(PlanNode::Group {
        spec: GroupSpec::parse(spec)?,
        input: Box::new(input),
    })
}

/// Running accumulator state for one group field.
#[derive(Debug, Default, Clone)]
pub struct AccumulatorState {
    numeric_sum: f64,
    numeric_count: u64,
    all_integer: bool,
    started: bool,
    extreme: Option<Bson>,
}

impl Accumulator {
    pub fn fold(self, state: &mut AccumulatorState, value: Bson) {
        match self {
            Accumulator::Sum | Accumulator::Avg => {
                // Non-numeric inputs do not contribute.
                if !is_number(&value) {
                    return;
                }
                if !state.started {
                    state.all_integer = true;
                    state.started = true;
                }
                state.all_integer &= matches!(value, Bson::Int32(_) | Bson::Int64(_));
                state.numeric_sum += vellum_engine::as_f64(&value);
                state.numeric_count += 1;
            }
            Accumulator::Min => {
                if matches!(value, Bson::Null) {
                    return;
                }
                let replace = match &state.extreme {
                    Some(current) => {
                        compare_values(&value, current) == std::cmp::Ordering::Less
                    }
                    None => true,
                };
                if replace {
                    state.extreme = Some(value);
                }
            }
            Accumulator::Max => {
                if matches!(value, Bson::Null) {
                    return;
                }
                let replace = match &state.extreme {
                    Some(current) => {
                        compare_values(&value, current) == std::cmp::Ordering::Greater
                    }
                    None => true,
                };
                if replace {
                    state.extreme = Some(value);
                }
            }
        }
    }

    pub fn finish(self, state: AccumulatorState) -> Bson {
        match self {
            Accumulator::Sum => {
                if state.started && state.all_integer && state.numeric_sum.fract() == 0.0 {
                    Bson::Int64(state.numeric_sum as i64)
                } else {
                    Bson::Double(state.numeric_sum)
                }
            }
            Accumulator::Avg => {
                if state.numeric_count == 0 {
                    Bson::Null
                } else {
                    Bson::Double(state.numeric_sum / state.numeric_count as f64)
                }
            }
            Accumulator::Min | Accumulator::Max => state.extreme.unwrap_or(Bson::Null),
        }
    }
}
