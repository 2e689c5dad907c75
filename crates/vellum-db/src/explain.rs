use bson::{Document, doc};
use vellum_engine::ScanDiagnostics;

/// Render scan diagnostics into the explain document. `numDuplicates` is
/// emitted only when duplicates were skipped, `isBackwardScan` only when
/// the traversal actually ran backward.
pub fn explain_scan(diag: &ScanDiagnostics) -> Document {
    let mut out = doc! {
        "isMultiKey": diag.is_multi_key,
        "indexBounds": diag.index_bounds.clone(),
    };
    if diag.num_duplicates > 0 {
        out.insert("numDuplicates", diag.num_duplicates as i64);
    }
    if diag.is_backward_scan {
        out.insert("isBackwardScan", true);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_scan_omits_optional_fields() {
        let out = explain_scan(&ScanDiagnostics {
            is_multi_key: false,
            index_bounds: vec!["a: [1, 1]".into()],
            num_duplicates: 0,
            is_backward_scan: false,
        });
        assert_eq!(out.get_bool("isMultiKey").unwrap(), false);
        assert!(out.get("numDuplicates").is_none());
        assert!(out.get("isBackwardScan").is_none());
    }

    #[test]
    fn noisy_scan_reports_everything() {
        let out = explain_scan(&ScanDiagnostics {
            is_multi_key: true,
            index_bounds: vec![],
            num_duplicates: 7,
            is_backward_scan: true,
        });
        assert_eq!(out.get_i64("numDuplicates").unwrap(), 7);
        assert_eq!(out.get_bool("isBackwardScan").unwrap(), true);
    }
}
