use serde::{Deserialize, Serialize};
use vellum_query::SortDirection;

/// How an index's operator class interprets its terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexKind {
    /// One logical column per physical term.
    SinglePath,
    /// Multiple logical columns encoded into one physical term.
    CompositePath,
    /// Full-text terms; always preferred by the cost model when matched.
    TextPath,
}

/// One logical column of an index: a document path plus the direction its
/// terms are laid out in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexColumn {
    pub path: String,
    pub direction: SortDirection,
}

impl IndexColumn {
    pub fn asc(path: impl Into<String>) -> Self {
        IndexColumn {
            path: path.into(),
            direction: SortDirection::Asc,
        }
    }
}

/// Catalog description of an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    /// Store keyspace holding the metadata page and term postings.
    pub keyspace: String,
    pub kind: IndexKind,
    pub columns: Vec<IndexColumn>,
    pub supports_backward: bool,
}

impl IndexDescriptor {
    pub fn composite(name: impl Into<String>, columns: Vec<IndexColumn>) -> Self {
        let name = name.into();
        IndexDescriptor {
            keyspace: format!("ix.{name}"),
            name,
            kind: IndexKind::CompositePath,
            columns,
            supports_backward: true,
        }
    }

    pub fn single(name: impl Into<String>, path: impl Into<String>) -> Self {
        let name = name.into();
        IndexDescriptor {
            keyspace: format!("ix.{name}"),
            name,
            kind: IndexKind::SinglePath,
            columns: vec![IndexColumn::asc(path)],
            supports_backward: false,
        }
    }

    pub fn is_composite(&self) -> bool {
        self.kind == IndexKind::CompositePath
    }

    /// Map a document path to its column number and declared direction.
    pub fn column_number(&self, path: &str) -> Option<(usize, SortDirection)> {
        self.columns
            .iter()
            .position(|c| c.path == path)
            .map(|i| (i, self.columns[i].direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_lookup() {
        let index = IndexDescriptor::composite(
            "ab",
            vec![IndexColumn::asc("a"), IndexColumn::asc("b")],
        );
        assert!(index.is_composite());
        assert_eq!(index.column_number("b").map(|(i, _)| i), Some(1));
        assert_eq!(index.column_number("c"), None);
    }
}
