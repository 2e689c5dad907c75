use bson::{Bson, Document};

/// Values reached by a dotted field path, plus whether an array was
/// traversed or produced along the way.
///
/// Array traversal is implicit: `"tags"` over `{ tags: ["a", "b"] }` yields
/// both elements, `"items.sku"` fans out across the `items` array. The
/// array flag is what drives multi-key classification of an index.
#[derive(Debug, Default)]
pub struct PathValues {
    pub values: Vec<Bson>,
    pub saw_array: bool,
}

/// Extract every value a path resolves to within a document.
pub fn extract_path_values(doc: &Document, path: &str) -> PathValues {
    let mut out = PathValues::default();
    let segments: Vec<&str> = path.split('.').collect();
    collect_from_doc(doc, &segments, &mut out);
    out
}

fn collect_from_doc(doc: &Document, segments: &[&str], out: &mut PathValues) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    if let Some(value) = doc.get(*first) {
        collect_from_value(value, rest, out);
    }
}

fn collect_from_value(value: &Bson, rest: &[&str], out: &mut PathValues) {
    if rest.is_empty() {
        match value {
            Bson::Array(items) => {
                out.saw_array = true;
                for item in items {
                    out.values.push(item.clone());
                }
            }
            other => out.values.push(other.clone()),
        }
        return;
    }

    match value {
        Bson::Document(inner) => collect_from_doc(inner, rest, out),
        Bson::Array(items) => {
            out.saw_array = true;
            for item in items {
                if let Bson::Document(inner) = item {
                    collect_from_doc(inner, rest, out);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn scalar_path() {
        let doc = doc! { "status": "active" };
        let out = extract_path_values(&doc, "status");
        assert_eq!(out.values, vec![Bson::String("active".into())]);
        assert!(!out.saw_array);
    }

    #[test]
    fn nested_path() {
        let doc = doc! { "address": { "city": "Austin" } };
        let out = extract_path_values(&doc, "address.city");
        assert_eq!(out.values, vec![Bson::String("Austin".into())]);
        assert!(!out.saw_array);
    }

    #[test]
    fn array_leaf_fans_out() {
        let doc = doc! { "tags": ["rust", "db"] };
        let out = extract_path_values(&doc, "tags");
        assert_eq!(out.values.len(), 2);
        assert!(out.saw_array);
    }

    #[test]
    fn array_of_documents_fans_out() {
        let doc = doc! { "items": [ { "sku": "A1" }, { "sku": "B2" }, { "qty": 3 } ] };
        let out = extract_path_values(&doc, "items.sku");
        assert_eq!(
            out.values,
            vec![Bson::String("A1".into()), Bson::String("B2".into())]
        );
        assert!(out.saw_array);
    }

    #[test]
    fn missing_path_yields_nothing() {
        let doc = doc! { "a": 1 };
        let out = extract_path_values(&doc, "b.c");
        assert!(out.values.is_empty());
        assert!(!out.saw_array);
    }
}
