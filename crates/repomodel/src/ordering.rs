//! # Ordered Sets
//!
//! Keeps a dense, 1-based `position` column over the rows of one table (or
//! one scope within it). After every completed move or insert the positions
//! in use are exactly `{1..N}`.
//!
//! Every operation first renumbers the set (stable by current position,
//! ties broken by id) and then shifts one range:
//!
//! | Case | Shifted rows | Delta |
//! |------|--------------|-------|
//! | new row at `t` | `position >= t` | +1 |
//! | move `cur -> t`, `t < cur` | `[t, cur)` | +1 |
//! | move `cur -> t`, `t > cur` | `(cur, t]` | -1 |
//! | move `cur -> cur` | none | |
//!
//! Renumbering and shift are planned in memory, checked, and written as one
//! [`Batch`] containing only rows whose position actually changes. A store
//! that applies batches atomically therefore never exposes a half-shifted
//! set; a store that does not is repaired by the renumbering on the next
//! call.

use crate::error::{ModelError, Result};
use crate::store::{Batch, Query, Row, RowId, RowStore};
use crate::value::Value;

/// Where a row ended up after [`OrderedSet::place`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub id: RowId,
    pub position: i64,
}

/// What the plan does with the subject row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subject {
    Existing(RowId),
    New,
}

#[derive(Debug, PartialEq)]
struct Plan {
    /// Rows whose stored position differs from the planned one.
    changes: Vec<(RowId, i64)>,
    /// Final position of the subject row, if any.
    position: Option<i64>,
}

pub struct OrderedSet<'a> {
    store: &'a dyn RowStore,
    table: String,
    column: String,
    scope: Vec<(String, Value)>,
}

impl<'a> OrderedSet<'a> {
    pub fn new(store: &'a dyn RowStore, table: impl Into<String>) -> Self {
        Self {
            store,
            table: table.into(),
            column: "position".to_string(),
            scope: Vec::new(),
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = column.into();
        self
    }

    /// Restrict the set to rows where `column == value`.
    pub fn scope(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.scope.push((column.into(), value.into()));
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Stored (id, position) pairs in set order; rows without a position
    /// sort last.
    fn current(&self) -> Result<Vec<(RowId, Option<i64>)>> {
        let rows = self
            .store
            .select(&Query::table(&self.table).filter_all(&self.scope))?;
        let mut current: Vec<(RowId, Option<i64>)> = rows
            .iter()
            .filter_map(|row| row.id.map(|id| (id, row.int(&self.column))))
            .collect();
        current.sort_by_key(|(id, pos)| (pos.unwrap_or(i64::MAX), *id));
        Ok(current)
    }

    /// Ids and positions as stored, in set order.
    pub fn positions(&self) -> Result<Vec<(RowId, Option<i64>)>> {
        self.current()
    }

    /// Highest position in use, 0 for an empty set.
    pub fn last_position(&self) -> Result<i64> {
        Ok(self
            .current()?
            .iter()
            .filter_map(|(_, pos)| *pos)
            .max()
            .unwrap_or(0))
    }

    /// Renumber the set to 1..N. Returns the number of rows rewritten.
    pub fn fix_positions(&self) -> Result<usize> {
        let current = self.current()?;
        let plan = plan(&self.table, &current, None, None)?;
        if plan.changes.is_empty() {
            return Ok(0);
        }
        tracing::warn!(
            table = %self.table,
            rows = plan.changes.len(),
            "Repairing position ordering"
        );
        let mut batch = Batch::new();
        self.push_changes(&mut batch, &plan.changes);
        self.store.apply_batch(&batch)?;
        Ok(plan.changes.len())
    }

    /// Move an existing row. Targets below 1 clamp to 1; targets beyond the
    /// last position are rejected.
    pub fn move_to(&self, id: RowId, target: i64) -> Result<i64> {
        let current = self.current()?;
        if !current.iter().any(|(rid, _)| *rid == id) {
            return Err(ModelError::RowNotFound {
                table: self.table.clone(),
                id,
            });
        }
        self.execute(&current, Row::with_id(id), Subject::Existing(id), Some(target), true)
            .map(|p| p.position)
    }

    /// Insert a new row at `target` (1..=N+1).
    pub fn insert_at(&self, row: Row, target: i64) -> Result<Placement> {
        self.place(row, Some(target))
    }

    /// Insert a new row after the last position.
    pub fn append(&self, row: Row) -> Result<Placement> {
        self.place(row, None)
    }

    /// Write `row` and give it a position in the same batch.
    ///
    /// A row already in the set moves to `target` (or stays put without
    /// one). Any other row joins the set at `target`, or at the end.
    pub fn place(&self, mut row: Row, target: Option<i64>) -> Result<Placement> {
        for (column, value) in &self.scope {
            row.set(column.clone(), value.clone());
        }
        let current = self.current()?;

        match row.id {
            Some(id) if current.iter().any(|(rid, _)| *rid == id) => {
                self.execute(&current, row, Subject::Existing(id), target, true)
            }
            Some(id) => {
                let in_table = self.store.read_row(&self.table, id)?.is_some();
                self.execute(&current, row, Subject::New, target, in_table)
            }
            None => self.execute(&current, row, Subject::New, target, false),
        }
    }

    fn execute(
        &self,
        current: &[(RowId, Option<i64>)],
        mut row: Row,
        subject: Subject,
        target: Option<i64>,
        update: bool,
    ) -> Result<Placement> {
        let plan = plan(&self.table, current, Some(subject), target)?;
        let position = plan.position.ok_or_else(|| {
            ModelError::OrderingViolation {
                table: self.table.clone(),
                message: "subject row was not placed".to_string(),
            }
        })?;

        let subject_id = match subject {
            Subject::Existing(id) => Some(id),
            Subject::New => row.id,
        };
        let others: Vec<(RowId, i64)> = plan
            .changes
            .into_iter()
            .filter(|(id, _)| Some(*id) != subject_id)
            .collect();

        row.set(self.column.clone(), position);
        let mut batch = Batch::new();
        if update {
            batch.update(self.table.clone(), row);
        } else {
            batch.insert(self.table.clone(), row);
        }
        self.push_changes(&mut batch, &others);

        let inserted = self.store.apply_batch(&batch)?;
        let id = match (subject_id, update) {
            (Some(id), true) => id,
            _ => inserted.first().copied().ok_or_else(|| {
                ModelError::Store(format!("insert into {} returned no id", self.table))
            })?,
        };

        tracing::debug!(
            table = %self.table,
            id,
            position,
            shifted = others.len(),
            "Row placed"
        );
        Ok(Placement { id, position })
    }

    fn push_changes(&self, batch: &mut Batch, changes: &[(RowId, i64)]) {
        for (id, position) in changes {
            batch.update(
                self.table.clone(),
                Row::with_id(*id).with(self.column.clone(), *position),
            );
        }
    }

    /// Fail unless the stored positions are exactly 1..N.
    pub fn verify(&self) -> Result<()> {
        let positions: Vec<Option<i64>> = self.current()?.into_iter().map(|(_, p)| p).collect();
        check_dense(&self.table, positions.iter().map(|p| p.unwrap_or(0)).collect())
    }
}

fn check_dense(table: &str, mut positions: Vec<i64>) -> Result<()> {
    positions.sort_unstable();
    for (i, pos) in positions.iter().enumerate() {
        if *pos != i as i64 + 1 {
            return Err(ModelError::OrderingViolation {
                table: table.to_string(),
                message: format!("expected position {} but found {}", i + 1, pos),
            });
        }
    }
    Ok(())
}

/// Renumber `current` (already in set order) and apply one move or insert.
fn plan(
    table: &str,
    current: &[(RowId, Option<i64>)],
    subject: Option<Subject>,
    target: Option<i64>,
) -> Result<Plan> {
    let normalized: Vec<(RowId, i64)> = current
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (*id, i as i64 + 1))
        .collect();
    let n = normalized.len() as i64;

    let (shifted, position) = match subject {
        None => (normalized, None),
        Some(Subject::Existing(id)) => {
            let cur = normalized
                .iter()
                .find(|(rid, _)| *rid == id)
                .map(|(_, p)| *p)
                .ok_or_else(|| ModelError::RowNotFound {
                    table: table.to_string(),
                    id,
                })?;
            let to = bound(table, target.unwrap_or(cur), n)?;
            let shifted = normalized
                .into_iter()
                .map(|(rid, p)| {
                    let p = if rid == id {
                        to
                    } else if to < cur && p >= to && p < cur {
                        p + 1
                    } else if to > cur && p > cur && p <= to {
                        p - 1
                    } else {
                        p
                    };
                    (rid, p)
                })
                .collect();
            (shifted, Some(to))
        }
        Some(Subject::New) => {
            let to = bound(table, target.unwrap_or(n + 1), n + 1)?;
            let shifted = normalized
                .into_iter()
                .map(|(rid, p)| (rid, if p >= to { p + 1 } else { p }))
                .collect();
            (shifted, Some(to))
        }
    };

    let mut all: Vec<i64> = shifted.iter().map(|(_, p)| *p).collect();
    if matches!(subject, Some(Subject::New)) {
        all.extend(position);
    }
    check_dense(table, all)?;

    let changes = shifted
        .into_iter()
        .zip(current.iter())
        .filter(|((_, p), (_, stored))| *stored != Some(*p))
        .map(|(change, _)| change)
        .collect();

    Ok(Plan { changes, position })
}

fn bound(table: &str, target: i64, max: i64) -> Result<i64> {
    let target = target.max(1);
    if target > max {
        return Err(ModelError::Argument(format!(
            "position {} is beyond the end of {} (last usable position is {})",
            target, table, max
        )));
    }
    Ok(target)
}
