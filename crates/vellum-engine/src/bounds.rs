use bson::spec::BinarySubtype;
use bson::{Bson, Document};

use crate::typeclass::TypeClass;

/// Edge value of a type-class range.
///
/// Most classes have a constructable smallest BSON literal; the ones that do
/// not (regex, dbPointer — their value types cannot be built synthetically)
/// use `ClassFloor`, which sorts below every concrete value of the class.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundEdge {
    ClassFloor,
    Value(Bson),
}

/// Canonical sentinel marking one end of a type class's position in the
/// global total order.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub class: TypeClass,
    pub edge: BoundEdge,
    pub inclusive: bool,
}

impl Bound {
    fn inclusive(class: TypeClass, value: Bson) -> Self {
        Bound {
            class,
            edge: BoundEdge::Value(value),
            inclusive: true,
        }
    }

    fn floor(class: TypeClass) -> Self {
        Bound {
            class,
            edge: BoundEdge::ClassFloor,
            inclusive: true,
        }
    }

    fn exclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }
}

/// Smallest value of the class, inclusive.
pub fn lower_bound(class: TypeClass) -> Bound {
    match class {
        TypeClass::MinKey => Bound::inclusive(class, Bson::MinKey),
        TypeClass::Null => Bound::inclusive(class, Bson::Null),
        TypeClass::Number => Bound::inclusive(class, Bson::Double(f64::NEG_INFINITY)),
        TypeClass::String => Bound::inclusive(class, Bson::String(String::new())),
        TypeClass::Document => Bound::inclusive(class, Bson::Document(Document::new())),
        TypeClass::Array => Bound::inclusive(class, Bson::Array(Vec::new())),
        TypeClass::Binary => Bound::inclusive(
            class,
            Bson::Binary(bson::Binary {
                subtype: BinarySubtype::Generic,
                bytes: Vec::new(),
            }),
        ),
        TypeClass::ObjectId => {
            Bound::inclusive(class, Bson::ObjectId(bson::oid::ObjectId::from_bytes([0; 12])))
        }
        TypeClass::Boolean => Bound::inclusive(class, Bson::Boolean(false)),
        TypeClass::DateTime => {
            Bound::inclusive(class, Bson::DateTime(bson::DateTime::from_millis(i64::MIN)))
        }
        TypeClass::Timestamp => Bound::inclusive(
            class,
            Bson::Timestamp(bson::Timestamp {
                time: 0,
                increment: 0,
            }),
        ),
        TypeClass::Regex => Bound::floor(class),
        TypeClass::DbPointer => Bound::floor(class),
        TypeClass::Code => Bound::inclusive(class, Bson::JavaScriptCode(String::new())),
        TypeClass::CodeWithScope => Bound::inclusive(
            class,
            Bson::JavaScriptCodeWithScope(bson::JavaScriptCodeWithScope {
                code: String::new(),
                scope: Document::new(),
            }),
        ),
        TypeClass::MaxKey => Bound::inclusive(class, Bson::MaxKey),
    }
}

/// Largest value of the class.
///
/// Classes whose value domain has a closed maximum (numbers, booleans,
/// dates, timestamps, the key sentinels) return it inclusive. All other
/// classes chain: their upper bound is the lower bound of the *next* class,
/// exclusive. The chain is what guarantees gap-free, non-overlapping range
/// coverage across the whole type order.
pub fn upper_bound(class: TypeClass) -> Bound {
    match class {
        TypeClass::MinKey => Bound::inclusive(class, Bson::MinKey),
        TypeClass::Null => Bound::inclusive(class, Bson::Null),
        TypeClass::Number => Bound::inclusive(class, Bson::Double(f64::INFINITY)),
        TypeClass::Boolean => Bound::inclusive(class, Bson::Boolean(true)),
        TypeClass::DateTime => {
            Bound::inclusive(class, Bson::DateTime(bson::DateTime::from_millis(i64::MAX)))
        }
        TypeClass::Timestamp => Bound::inclusive(
            class,
            Bson::Timestamp(bson::Timestamp {
                time: u32::MAX,
                increment: u32::MAX,
            }),
        ),
        TypeClass::MaxKey => Bound::inclusive(class, Bson::MaxKey),
        TypeClass::String
        | TypeClass::Document
        | TypeClass::Array
        | TypeClass::Binary
        | TypeClass::ObjectId
        | TypeClass::Regex
        | TypeClass::DbPointer
        | TypeClass::Code
        | TypeClass::CodeWithScope => {
            // next() is always Some here: CodeWithScope chains to MaxKey.
            let next = class.next().unwrap_or(TypeClass::MaxKey);
            lower_bound(next).exclusive()
        }
    }
}
