use super::{Batch, Query, Row, RowId, RowStore, Tables};
use crate::error::{ModelError, Result};
use std::cell::{Cell, RefCell};

/// In-memory row store for testing.
///
/// Uses `RefCell` for interior mutability since the model layer is
/// single-threaded. Writes can be made to fail, either always or after a
/// number of successful operations, to exercise batch atomicity.
#[derive(Default)]
pub struct MemRowStore {
    tables: RefCell<Tables>,
    simulate_write_error: Cell<bool>,
    fail_after: Cell<Option<usize>>,
}

impl MemRowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write until reset.
    pub fn set_simulate_write_error(&self, simulate: bool) {
        self.simulate_write_error.set(simulate);
    }

    /// Let `ops` write operations succeed, then fail the next one. Counts
    /// individual batch operations, so a batch can fail halfway through.
    pub fn fail_after(&self, ops: usize) {
        self.fail_after.set(Some(ops));
    }

    /// Copy of the current contents, for before/after comparisons.
    pub fn snapshot(&self) -> Tables {
        self.tables.borrow().clone()
    }

    fn check_write(&self, ops: usize) -> Result<()> {
        if self.simulate_write_error.get() {
            return Err(ModelError::Store("Simulated write error".to_string()));
        }
        if let Some(left) = self.fail_after.get() {
            if ops > left {
                self.fail_after.set(None);
                return Err(ModelError::Store(format!(
                    "Simulated write error after {} operations",
                    left
                )));
            }
            self.fail_after.set(Some(left - ops));
        }
        Ok(())
    }
}

impl RowStore for MemRowStore {
    fn read_row(&self, table: &str, id: RowId) -> Result<Option<Row>> {
        Ok(self.tables.borrow().read(table, id))
    }

    fn select(&self, query: &Query) -> Result<Vec<Row>> {
        Ok(self.tables.borrow().select(query))
    }

    fn write_row(&self, table: &str, row: &Row) -> Result<RowId> {
        self.check_write(1)?;
        Ok(self.tables.borrow_mut().write(table, row))
    }

    fn delete_row(&self, table: &str, id: RowId) -> Result<bool> {
        self.check_write(1)?;
        Ok(self.tables.borrow_mut().delete(table, id))
    }

    fn apply_batch(&self, batch: &Batch) -> Result<Vec<RowId>> {
        let mut working = self.tables.borrow().clone();
        let inserted = working.apply(batch)?;
        self.check_write(batch.len())?;
        *self.tables.borrow_mut() = working;
        Ok(inserted)
    }
}
