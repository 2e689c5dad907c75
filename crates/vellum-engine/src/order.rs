use std::cmp::Ordering;

use bson::Bson;

use crate::typeclass::TypeClass;

/// Total-order comparison across all BSON values.
///
/// Values of different type classes compare by class rank; within a class
/// the value domain's natural order applies. Numeric values compare by
/// magnitude regardless of representation (int32/int64/double/decimal128),
/// with NaN below all other numbers.
pub fn compare_values(a: &Bson, b: &Bson) -> Ordering {
    let class_a = TypeClass::of(a);
    let class_b = TypeClass::of(b);
    if class_a != class_b {
        return class_a.rank().cmp(&class_b.rank());
    }

    match (a, b) {
        // Exact integer comparison when neither side is floating point.
        (Bson::Int32(_) | Bson::Int64(_), Bson::Int32(_) | Bson::Int64(_)) => {
            as_i64(a).cmp(&as_i64(b))
        }
        _ if class_a == TypeClass::Number => compare_f64(as_f64(a), as_f64(b)),

        (Bson::String(x), Bson::String(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Bson::Symbol(x), Bson::Symbol(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Bson::String(x), Bson::Symbol(y)) => x.as_bytes().cmp(y.as_bytes()),
        (Bson::Symbol(x), Bson::String(y)) => x.as_bytes().cmp(y.as_bytes()),

        (Bson::Document(x), Bson::Document(y)) => {
            let mut xi = x.iter();
            let mut yi = y.iter();
            loop {
                match (xi.next(), yi.next()) {
                    (None, None) => return Ordering::Equal,
                    (None, Some(_)) => return Ordering::Less,
                    (Some(_), None) => return Ordering::Greater,
                    (Some((xk, xv)), Some((yk, yv))) => {
                        let key_order = xk.as_bytes().cmp(yk.as_bytes());
                        if key_order != Ordering::Equal {
                            return key_order;
                        }
                        let value_order = compare_values(xv, yv);
                        if value_order != Ordering::Equal {
                            return value_order;
                        }
                    }
                }
            }
        }

        (Bson::Array(x), Bson::Array(y)) => {
            for (xv, yv) in x.iter().zip(y.iter()) {
                let order = compare_values(xv, yv);
                if order != Ordering::Equal {
                    return order;
                }
            }
            x.len().cmp(&y.len())
        }

        (Bson::Binary(x), Bson::Binary(y)) => x
            .bytes
            .len()
            .cmp(&y.bytes.len())
            .then_with(|| u8::from(x.subtype).cmp(&u8::from(y.subtype)))
            .then_with(|| x.bytes.cmp(&y.bytes)),

        (Bson::ObjectId(x), Bson::ObjectId(y)) => x.bytes().cmp(&y.bytes()),
        (Bson::Boolean(x), Bson::Boolean(y)) => x.cmp(y),
        (Bson::DateTime(x), Bson::DateTime(y)) => {
            x.timestamp_millis().cmp(&y.timestamp_millis())
        }
        (Bson::Timestamp(x), Bson::Timestamp(y)) => x
            .time
            .cmp(&y.time)
            .then_with(|| x.increment.cmp(&y.increment)),
        (Bson::RegularExpression(x), Bson::RegularExpression(y)) => x
            .pattern
            .as_str()
            .cmp(y.pattern.as_str())
            .then_with(|| x.options.as_str().cmp(y.options.as_str())),
        (Bson::JavaScriptCode(x), Bson::JavaScriptCode(y)) => x.cmp(y),
        (Bson::JavaScriptCodeWithScope(x), Bson::JavaScriptCodeWithScope(y)) => {
            x.code.cmp(&y.code).then_with(|| {
                compare_values(
                    &Bson::Document(x.scope.clone()),
                    &Bson::Document(y.scope.clone()),
                )
            })
        }

        // DBPointer is a deprecated opaque reference type; its interior is
        // not inspectable, so within-class order degrades to equality.
        (Bson::DbPointer(_), Bson::DbPointer(_)) => Ordering::Equal,

        // Same-class sentinels and null/undefined pairs.
        _ => Ordering::Equal,
    }
}

/// Numeric value of a BSON number as f64. Decimal128 goes through its
/// decimal string form; unparseable forms collapse to NaN (smallest).
pub fn as_f64(value: &Bson) -> f64 {
    match value {
        Bson::Int32(n) => *n as f64,
        Bson::Int64(n) => *n as f64,
        Bson::Double(f) => *f,
        Bson::Decimal128(d) => d.to_string().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

/// True when the value belongs to the numeric type class.
pub fn is_number(value: &Bson) -> bool {
    TypeClass::of(value) == TypeClass::Number
}

fn as_i64(value: &Bson) -> i64 {
    match value {
        Bson::Int32(n) => *n as i64,
        Bson::Int64(n) => *n,
        _ => 0,
    }
}

fn compare_f64(a: f64, b: f64) -> Ordering {
    match a.partial_cmp(&b) {
        Some(order) => order,
        // NaN sorts below every other number; two NaNs tie.
        None => match (a.is_nan(), b.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => Ordering::Equal,
        },
    }
}
