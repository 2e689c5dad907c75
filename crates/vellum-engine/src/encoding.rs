use bson::Bson;

use crate::bounds::{Bound, BoundEdge};
use crate::typeclass::TypeClass;

// ── Sortable scalar encodings ──────────────────────────────────
//
// Index terms must compare correctly under plain byte-wise comparison.
// Signed integers: XOR the sign bit, then big-endian. IEEE 754 doubles:
// flip the sign bit when positive, flip all bits when negative.

#[inline]
pub(crate) fn encode_i64_sortable(n: i64) -> [u8; 8] {
    ((n as u64) ^ 0x8000_0000_0000_0000).to_be_bytes()
}

#[inline]
pub(crate) fn encode_f64_sortable(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let encoded = if (bits & 0x8000_0000_0000_0000) != 0 {
        !bits
    } else {
        bits ^ 0x8000_0000_0000_0000
    };
    encoded.to_be_bytes()
}

// Variable-length payloads are escaped (0x00 -> 0x00 0xFF) and terminated
// with 0x00 0x00, which keeps prefix ordering intact: a value that is a
// strict prefix of another sorts first.

fn write_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == 0x00 {
            out.push(0xFF);
        }
    }
    out.push(0x00);
    out.push(0x00);
}

/// Encode one value as a sortable index term: a type-class rank byte
/// followed by a class-specific payload. Byte order of encoded terms agrees
/// with the value total order for all scalar classes; container classes are
/// ordered by a canonical recursive form (field name, then value), with the
/// executor's comparator as the authority on exact container semantics.
pub fn encode_term(value: &Bson, out: &mut Vec<u8>) {
    out.push(TypeClass::of(value).rank());
    match value {
        Bson::MinKey | Bson::MaxKey | Bson::Null | Bson::Undefined | Bson::DbPointer(_) => {}

        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => {
            let f = crate::order::as_f64(value);
            if f.is_nan() {
                // NaN sorts below all other numbers.
                out.extend_from_slice(&[0u8; 8]);
            } else {
                out.extend_from_slice(&encode_f64_sortable(f));
            }
        }

        Bson::String(s) => write_escaped(s.as_bytes(), out),
        Bson::Symbol(s) => write_escaped(s.as_bytes(), out),
        Bson::JavaScriptCode(s) => write_escaped(s.as_bytes(), out),

        Bson::Document(doc) => {
            let mut canonical = Vec::new();
            for (key, val) in doc.iter() {
                canonical.extend_from_slice(key.as_bytes());
                canonical.push(0x00);
                encode_term(val, &mut canonical);
            }
            write_escaped(&canonical, out);
        }

        Bson::Array(items) => {
            let mut canonical = Vec::new();
            for item in items {
                encode_term(item, &mut canonical);
            }
            write_escaped(&canonical, out);
        }

        Bson::Binary(bin) => {
            // Length sorts before subtype and content.
            out.extend_from_slice(&(bin.bytes.len() as u32).to_be_bytes());
            out.push(u8::from(bin.subtype));
            write_escaped(&bin.bytes, out);
        }

        Bson::ObjectId(oid) => out.extend_from_slice(&oid.bytes()),
        Bson::Boolean(b) => out.push(*b as u8),
        Bson::DateTime(dt) => {
            out.extend_from_slice(&encode_i64_sortable(dt.timestamp_millis()));
        }
        Bson::Timestamp(ts) => {
            out.extend_from_slice(&ts.time.to_be_bytes());
            out.extend_from_slice(&ts.increment.to_be_bytes());
        }
        Bson::RegularExpression(re) => {
            write_escaped(re.pattern.as_str().as_bytes(), out);
            write_escaped(re.options.as_str().as_bytes(), out);
        }
        Bson::JavaScriptCodeWithScope(cws) => {
            write_escaped(cws.code.as_bytes(), out);
            let mut canonical = Vec::new();
            encode_term(&Bson::Document(cws.scope.clone()), &mut canonical);
            write_escaped(&canonical, out);
        }
    }
}

/// Encode a range edge. A `ClassFloor` edge is the bare rank byte, which
/// sorts at or below every concrete term of the class.
pub fn encode_bound(bound: &Bound, out: &mut Vec<u8>) {
    match &bound.edge {
        BoundEdge::ClassFloor => out.push(bound.class.rank()),
        BoundEdge::Value(value) => encode_term(value, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn term(value: &Bson) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_term(value, &mut buf);
        buf
    }

    #[test]
    fn scalar_terms_preserve_value_order() {
        let ordered = [
            Bson::MinKey,
            Bson::Null,
            Bson::Double(f64::NEG_INFINITY),
            Bson::Int32(-10),
            Bson::Int32(0),
            Bson::Double(2.5),
            Bson::Int64(100),
            Bson::Double(f64::INFINITY),
            Bson::String(String::new()),
            Bson::String("a".into()),
            Bson::String("ab".into()),
            Bson::String("b".into()),
            Bson::Boolean(false),
            Bson::Boolean(true),
            Bson::DateTime(bson::DateTime::from_millis(-5)),
            Bson::DateTime(bson::DateTime::from_millis(7)),
            Bson::MaxKey,
        ];
        for pair in ordered.windows(2) {
            assert!(
                term(&pair[0]) < term(&pair[1]),
                "{:?} !< {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn nan_term_sorts_below_all_numbers() {
        assert!(term(&Bson::Double(f64::NAN)) < term(&Bson::Double(f64::NEG_INFINITY)));
        assert!(term(&Bson::Double(f64::NAN)) > term(&Bson::Null));
    }

    #[test]
    fn string_prefix_sorts_first_even_with_nuls() {
        let plain = Bson::String("a".into());
        let with_nul = Bson::String("a\0b".into());
        let longer = Bson::String("ab".into());
        assert!(term(&plain) < term(&with_nul));
        assert!(term(&with_nul) < term(&longer));
    }

    #[test]
    fn document_terms_order_by_first_divergent_field() {
        let a = Bson::Document(doc! { "x": 1 });
        let b = Bson::Document(doc! { "x": 2 });
        assert!(term(&a) < term(&b));
    }

    #[test]
    fn class_floor_bound_sorts_at_or_below_class() {
        let floor = crate::bounds::lower_bound(crate::typeclass::TypeClass::Regex);
        let mut encoded = Vec::new();
        encode_bound(&floor, &mut encoded);
        // Bare rank byte: below every concrete term of the class, above the
        // previous class entirely.
        assert!(encoded < term(&Bson::MaxKey));
        assert!(encoded > term(&Bson::Timestamp(bson::Timestamp { time: u32::MAX, increment: u32::MAX })));
    }

    #[test]
    fn sortable_f64_roundtrip_order() {
        let values = [-1e300, -1.0, -0.5, 0.0, 0.5, 1.0, 1e300];
        for pair in values.windows(2) {
            assert!(encode_f64_sortable(pair[0]) < encode_f64_sortable(pair[1]));
        }
    }
}
