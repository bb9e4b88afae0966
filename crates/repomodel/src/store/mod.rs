//! # Row Storage
//!
//! Models persist as flat rows in named tables. This module defines the row
//! shape, the query and batch vocabulary, and the [`RowStore`] trait that
//! every backend implements.
//!
//! ## Backends
//!
//! - [`MemRowStore`]: in-memory, for tests. Supports simulated write
//!   failures so batch atomicity can be checked.
//! - [`JsonFileStore`]: one JSON file per store, rewritten atomically
//!   (write to a temp file, then rename).
//!
//! Both keep their tables in a [`Tables`] value, which owns the actual
//! select/write/batch semantics. A backend only decides where that value
//! lives.
//!
//! ## Batches
//!
//! [`RowStore::apply_batch`] applies a sequence of writes as one unit: either
//! every operation lands or none does. The ordered-set maintainer relies on
//! this to keep positions dense.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::{ModelError, Result};
use crate::value::Value;

pub mod fs_backend;
pub mod mem_backend;

pub use fs_backend::JsonFileStore;
pub use mem_backend::MemRowStore;

pub type RowId = u64;

/// A flat record: an optional id plus named column values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub id: Option<RowId>,
    pub columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: RowId) -> Self {
        Self {
            id: Some(id),
            columns: BTreeMap::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(column, value);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn int(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_int)
    }

    fn matches(&self, filters: &[(String, Value)]) -> bool {
        filters.iter().all(|(column, expected)| {
            self.get(column)
                .map(|v| v == expected || v.render() == expected.render())
                .unwrap_or(false)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Equality filters plus an optional sort column. Rows missing the sort
/// column come first; ties fall back to id.
#[derive(Debug, Clone)]
pub struct Query {
    pub table: String,
    pub filters: Vec<(String, Value)>,
    pub order_by: Option<(String, SortOrder)>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            order_by: None,
        }
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((column.into(), value.into()));
        self
    }

    pub fn filter_all(mut self, filters: &[(String, Value)]) -> Self {
        self.filters.extend(filters.iter().cloned());
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.order_by = Some((column.into(), order));
        self
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a.as_int(), b.as_int()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.render().cmp(&b.render()),
        },
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert a new row; a preset id is kept.
    Insert { table: String, row: Row },
    /// Replace the columns present in `row` on an existing row.
    Update { table: String, row: Row },
    Delete { table: String, id: RowId },
}

/// An ordered list of writes applied as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub ops: Vec<WriteOp>,
}

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, row: Row) {
        self.ops.push(WriteOp::Insert {
            table: table.into(),
            row,
        });
    }

    pub fn update(&mut self, table: impl Into<String>, row: Row) {
        self.ops.push(WriteOp::Update {
            table: table.into(),
            row,
        });
    }

    pub fn delete(&mut self, table: impl Into<String>, id: RowId) {
        self.ops.push(WriteOp::Delete {
            table: table.into(),
            id,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}

/// Abstract interface for row persistence.
///
/// All methods take `&self`; backends use interior mutability since the
/// model layer is single-threaded.
pub trait RowStore {
    /// Read one row. Returns Ok(None) when the id is unknown.
    fn read_row(&self, table: &str, id: RowId) -> Result<Option<Row>>;

    /// Rows matching every filter, in the requested order (by id otherwise).
    fn select(&self, query: &Query) -> Result<Vec<Row>>;

    /// Insert (no id) or merge into the existing row (id set). Columns the
    /// row does not carry are left as stored. Returns the row id.
    fn write_row(&self, table: &str, row: &Row) -> Result<RowId>;

    /// Delete a row. Returns false if it did not exist.
    fn delete_row(&self, table: &str, id: RowId) -> Result<bool>;

    /// Apply all operations or none. Returns the ids of inserted rows in
    /// operation order.
    fn apply_batch(&self, batch: &Batch) -> Result<Vec<RowId>>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Table {
    next_id: RowId,
    rows: BTreeMap<RowId, Row>,
}

impl Table {
    fn allocate(&mut self, requested: Option<RowId>) -> RowId {
        let id = requested.unwrap_or(self.next_id + 1);
        self.next_id = self.next_id.max(id);
        id
    }
}

/// Table contents shared by the backends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tables {
    tables: BTreeMap<String, Table>,
}

impl Tables {
    pub fn read(&self, table: &str, id: RowId) -> Option<Row> {
        self.tables.get(table).and_then(|t| t.rows.get(&id)).cloned()
    }

    pub fn select(&self, query: &Query) -> Vec<Row> {
        let Some(table) = self.tables.get(&query.table) else {
            return Vec::new();
        };
        let mut rows: Vec<Row> = table
            .rows
            .values()
            .filter(|row| row.matches(&query.filters))
            .cloned()
            .collect();

        if let Some((column, order)) = &query.order_by {
            rows.sort_by(|a, b| {
                let ord = compare_values(a.get(column), b.get(column)).then(a.id.cmp(&b.id));
                match order {
                    SortOrder::Asc => ord,
                    SortOrder::Desc => ord.reverse(),
                }
            });
        }
        rows
    }

    /// Upsert. An existing row keeps the columns `row` does not name; a row
    /// with an id that does not exist yet is inserted under it.
    pub fn write(&mut self, table: &str, row: &Row) -> RowId {
        let table = self.tables.entry(table.to_string()).or_default();
        if let Some(id) = row.id {
            if let Some(existing) = table.rows.get_mut(&id) {
                for (column, value) in &row.columns {
                    existing.columns.insert(column.clone(), value.clone());
                }
                return id;
            }
        }
        let id = table.allocate(row.id);
        let mut stored = row.clone();
        stored.id = Some(id);
        table.rows.insert(id, stored);
        id
    }

    pub fn delete(&mut self, table: &str, id: RowId) -> bool {
        self.tables
            .get_mut(table)
            .map(|t| t.rows.remove(&id).is_some())
            .unwrap_or(false)
    }

    /// Apply a batch in place. On error `self` may be partially modified, so
    /// callers apply to a copy and swap it in on success.
    pub fn apply(&mut self, batch: &Batch) -> Result<Vec<RowId>> {
        let mut inserted = Vec::new();
        for op in &batch.ops {
            match op {
                WriteOp::Insert { table, row } => {
                    let t = self.tables.entry(table.clone()).or_default();
                    if let Some(id) = row.id.filter(|id| t.rows.contains_key(id)) {
                        return Err(ModelError::Store(format!(
                            "row {}#{} already exists",
                            table, id
                        )));
                    }
                    let id = t.allocate(row.id);
                    let mut stored = row.clone();
                    stored.id = Some(id);
                    t.rows.insert(id, stored);
                    inserted.push(id);
                }
                WriteOp::Update { table, row } => {
                    let id = row.id.ok_or_else(|| {
                        ModelError::Store(format!("update in {} without row id", table))
                    })?;
                    let existing = self
                        .tables
                        .get_mut(table)
                        .and_then(|t| t.rows.get_mut(&id))
                        .ok_or_else(|| ModelError::RowNotFound {
                            table: table.clone(),
                            id,
                        })?;
                    for (column, value) in &row.columns {
                        existing.columns.insert(column.clone(), value.clone());
                    }
                }
                WriteOp::Delete { table, id } => {
                    if !self.delete(table, *id) {
                        return Err(ModelError::RowNotFound {
                            table: table.clone(),
                            id: *id,
                        });
                    }
                }
            }
        }
        Ok(inserted)
    }
}
