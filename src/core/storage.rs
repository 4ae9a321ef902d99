use serde::{Deserialize, Serialize};

use crate::core::error::Result;

/// Logical tables of the wide-column layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Canonical records and index rows.
    Data,
    /// Raw block snapshots.
    Blocks,
    /// Balance-update markers.
    MetadataUpdates,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Data, Table::Blocks, Table::MetadataUpdates];

    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Data => "data",
            Table::Blocks => "blocks",
            Table::MetadataUpdates => "metadata_updates",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: String,
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn cell(&self, column: &str) -> Option<&Cell> {
        self.cells.iter().find(|c| c.column == column)
    }

    /// Column name of the first cell. Index rows carry the canonical key here.
    pub fn first_column(&self) -> Option<&str> {
        self.cells.first().map(|c| c.column.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Replace the row with a single cell.
    SetCell { column: String, value: String },
    DeleteRow,
}

impl Mutation {
    pub fn set(column: impl Into<String>, value: impl Into<String>) -> Self {
        Mutation::SetCell {
            column: column.into(),
            value: value.into(),
        }
    }
}

/// Parallel key/mutation lists applied by the bulk writer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkMutations {
    pub keys: Vec<String>,
    pub mutations: Vec<Mutation>,
}

impl BulkMutations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: impl Into<String>, mutation: Mutation) {
        self.keys.push(key.into());
        self.mutations.push(mutation);
    }

    pub fn extend(&mut self, other: BulkMutations) {
        self.keys.extend(other.keys);
        self.mutations.extend(other.mutations);
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Key range with an inclusive start and an exclusive end. An empty end is
/// unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl RowRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && (self.end.is_empty() || key < self.end.as_slice())
    }

    /// True once `key` has moved past the end of a forward scan.
    pub fn is_past_end(&self, key: &[u8]) -> bool {
        !self.end.is_empty() && key >= self.end.as_slice()
    }
}

pub trait RowStore: Send + Sync {
    /// Apply every mutation or none of them.
    fn apply_bulk(&self, table: Table, keys: &[String], mutations: &[Mutation]) -> Result<()>;

    fn read_row(&self, table: Table, key: &str) -> Result<Option<Row>>;

    /// Batched point lookup. Absent keys are left out of the result.
    fn read_rows(&self, table: Table, keys: &[String]) -> Result<Vec<Row>>;

    /// Ascending scan over `range`. The visitor returns `false` to stop.
    fn for_each_row(
        &self,
        table: Table,
        range: &RowRange,
        strip_values: bool,
        visit: &mut dyn FnMut(Row) -> bool,
    ) -> Result<()>;

    fn scan(
        &self,
        table: Table,
        range: &RowRange,
        limit: Option<usize>,
        strip_values: bool,
    ) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        if limit == Some(0) {
            return Ok(rows);
        }
        self.for_each_row(table, range, strip_values, &mut |row| {
            rows.push(row);
            limit.is_none_or(|limit| rows.len() < limit)
        })?;
        Ok(rows)
    }
}
