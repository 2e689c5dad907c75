use bson::{Bson, Document};
use vellum_engine::compare_values;

/// One buffered row of a window partition: the document plus its evaluated
/// ordering value.
#[derive(Debug, Clone)]
pub struct PartitionRow {
    pub doc: Document,
    pub group_value: Bson,
}

/// Random-access cursor over an ordered, fully buffered partition.
///
/// Construction sorts the rows ascending by group value (stable, so ties
/// keep arrival order). `peek_value` reads at an offset from the current
/// row and signals partition edges with `None`.
#[derive(Debug)]
pub struct PartitionCursor {
    rows: Vec<PartitionRow>,
    pos: usize,
}

impl PartitionCursor {
    pub fn new(mut rows: Vec<PartitionRow>) -> Self {
        rows.sort_by(|a, b| compare_values(&a.group_value, &b.group_value));
        PartitionCursor { rows, pos: 0 }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn current(&self) -> Option<&PartitionRow> {
        self.rows.get(self.pos)
    }

    pub fn advance(&mut self) {
        self.pos += 1;
    }

    /// Group value `offset` rows past the current one, bounded by the
    /// partition.
    pub fn peek_value(&self, offset: usize) -> Option<&Bson> {
        self.rows.get(self.pos + offset).map(|row| &row.group_value)
    }

    pub fn into_rows(self) -> Vec<PartitionRow> {
        self.rows
    }

    pub fn rows(&self) -> &[PartitionRow] {
        &self.rows
    }
}
