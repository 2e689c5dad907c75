use bson::{Bson, Document};
use vellum_engine::{as_f64, is_number};

use crate::error::DbError;

/// Evaluable expression over a document: a field path, a literal, or a
/// numeric operator over sub-expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Dotted path, stored without the `$` sigil.
    Path(String),
    Literal(Bson),
    Op(NumericOp, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl NumericOp {
    fn name(self) -> &'static str {
        match self {
            NumericOp::Add => "$add",
            NumericOp::Subtract => "$subtract",
            NumericOp::Multiply => "$multiply",
            NumericOp::Divide => "$divide",
        }
    }

    fn from_key(key: &str) -> Option<Self> {
        match key {
            "$add" => Some(NumericOp::Add),
            "$subtract" => Some(NumericOp::Subtract),
            "$multiply" => Some(NumericOp::Multiply),
            "$divide" => Some(NumericOp::Divide),
            _ => None,
        }
    }
}

/// Parse an expression value: `"$path"`, `{ $op: [...] }`,
/// `{ $literal: v }`, or a plain literal.
pub fn parse_expr(value: &Bson) -> Result<Expr, DbError> {
    match value {
        Bson::String(s) if s.starts_with('$') => Ok(Expr::Path(s[1..].to_string())),
        Bson::Document(doc) => parse_operator_doc(doc),
        other => Ok(Expr::Literal(other.clone())),
    }
}

fn parse_operator_doc(doc: &Document) -> Result<Expr, DbError> {
    let mut iter = doc.iter();
    let (key, value) = match (iter.next(), iter.next()) {
        (Some(entry), None) => entry,
        _ => {
            return Err(DbError::InvalidQuery(
                "an expression object must contain exactly one operator".to_string(),
            ));
        }
    };

    if key == "$literal" {
        return Ok(Expr::Literal(value.clone()));
    }

    let op = NumericOp::from_key(key).ok_or_else(|| {
        DbError::InvalidQuery(format!("unrecognized expression operator: {key}"))
    })?;
    let args = match value {
        Bson::Array(items) => items.iter().map(parse_expr).collect::<Result<Vec<_>, _>>()?,
        single => vec![parse_expr(single)?],
    };
    if args.is_empty() {
        return Err(DbError::InvalidQuery(format!(
            "{} requires at least one argument",
            op.name()
        )));
    }
    Ok(Expr::Op(op, args))
}

/// Evaluate against a document. Missing paths resolve to null, and null
/// propagates through numeric operators.
pub fn evaluate(expr: &Expr, doc: &Document) -> Result<Bson, DbError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path(path) => Ok(lookup_path(doc, path)),
        Expr::Op(op, args) => {
            let mut acc: Option<f64> = None;
            for arg in args {
                let value = evaluate(arg, doc)?;
                if matches!(value, Bson::Null) {
                    return Ok(Bson::Null);
                }
                if !is_number(&value) {
                    return Err(DbError::InvalidQuery(format!(
                        "{} only supports numeric arguments, found {value}",
                        op.name()
                    )));
                }
                let n = as_f64(&value);
                acc = Some(match (acc, op) {
                    (None, _) => n,
                    (Some(a), NumericOp::Add) => a + n,
                    (Some(a), NumericOp::Subtract) => a - n,
                    (Some(a), NumericOp::Multiply) => a * n,
                    (Some(a), NumericOp::Divide) => a / n,
                });
            }
            Ok(Bson::Double(acc.unwrap_or(0.0)))
        }
    }
}

fn lookup_path(doc: &Document, path: &str) -> Bson {
    let mut current = doc;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        match current.get(segment) {
            Some(Bson::Document(inner)) if segments.peek().is_some() => current = inner,
            Some(value) if segments.peek().is_none() => return value.clone(),
            _ => return Bson::Null,
        }
    }
    Bson::Null
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn path_expression() {
        let expr = parse_expr(&Bson::String("$price".into())).unwrap();
        assert_eq!(expr, Expr::Path("price".into()));
        let value = evaluate(&expr, &doc! { "price": 7 }).unwrap();
        assert_eq!(value, Bson::Int32(7));
    }

    #[test]
    fn nested_path_and_missing_path() {
        let expr = parse_expr(&Bson::String("$a.b".into())).unwrap();
        assert_eq!(evaluate(&expr, &doc! { "a": { "b": 2 } }).unwrap(), Bson::Int32(2));
        assert_eq!(evaluate(&expr, &doc! { "a": 1 }).unwrap(), Bson::Null);
    }

    #[test]
    fn numeric_operator() {
        let expr = parse_expr(&Bson::Document(doc! { "$multiply": ["$price", 2] })).unwrap();
        let value = evaluate(&expr, &doc! { "price": 3 }).unwrap();
        assert_eq!(value, Bson::Double(6.0));
    }

    #[test]
    fn null_propagates_through_operators() {
        let expr = parse_expr(&Bson::Document(doc! { "$add": ["$missing", 1] })).unwrap();
        assert_eq!(evaluate(&expr, &doc! {}).unwrap(), Bson::Null);
    }

    #[test]
    fn non_numeric_operand_is_invalid() {
        let expr = parse_expr(&Bson::Document(doc! { "$add": ["$name", 1] })).unwrap();
        let err = evaluate(&expr, &doc! { "name": "x" }).unwrap_err();
        assert!(matches!(err, DbError::InvalidQuery(_)));
    }

    #[test]
    fn unknown_operator_rejected() {
        let err = parse_expr(&Bson::Document(doc! { "$frobnicate": 1 })).unwrap_err();
        assert!(matches!(err, DbError::InvalidQuery(_)));
    }

    #[test]
    fn literal_wrapper() {
        let expr = parse_expr(&Bson::Document(doc! { "$literal": "$x" })).unwrap();
        assert_eq!(expr, Expr::Literal(Bson::String("$x".into())));
    }
}
