use super::{Batch, Query, Row, RowId, RowStore, Tables};
use crate::error::{ModelError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Row store persisted as a single `store.json` under a root directory.
///
/// Every write loads the file, applies the change in memory and writes the
/// whole file back atomically.
pub struct JsonFileStore {
    root: PathBuf,
    file_name: String,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            file_name: "store.json".to_string(),
        }
    }

    pub fn with_file_name(mut self, name: &str) -> Self {
        self.file_name = name.to_string();
        self
    }

    pub fn path(&self) -> PathBuf {
        self.root.join(&self.file_name)
    }

    fn ensure_dir(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path).map_err(ModelError::Io)?;
        }
        Ok(())
    }

    fn load(&self) -> Result<Tables> {
        let data_file = self.path();
        if !data_file.exists() {
            return Ok(Tables::default());
        }
        let content = fs::read_to_string(data_file).map_err(ModelError::Io)?;
        let tables: Tables = serde_json::from_str(&content).map_err(ModelError::Serialization)?;
        Ok(tables)
    }

    fn save(&self, tables: &Tables) -> Result<()> {
        self.ensure_dir(&self.root)?;
        let content = serde_json::to_string_pretty(tables).map_err(ModelError::Serialization)?;

        let tmp_file = self.root.join(format!(".store-{}.tmp", Uuid::new_v4()));
        fs::write(&tmp_file, content).map_err(ModelError::Io)?;
        fs::rename(&tmp_file, self.path()).map_err(ModelError::Io)?;
        tracing::trace!(path = %self.path().display(), "Store file written");
        Ok(())
    }
}

impl RowStore for JsonFileStore {
    fn read_row(&self, table: &str, id: RowId) -> Result<Option<Row>> {
        Ok(self.load()?.read(table, id))
    }

    fn select(&self, query: &Query) -> Result<Vec<Row>> {
        Ok(self.load()?.select(query))
    }

    fn write_row(&self, table: &str, row: &Row) -> Result<RowId> {
        let mut tables = self.load()?;
        let id = tables.write(table, row);
        self.save(&tables)?;
        Ok(id)
    }

    fn delete_row(&self, table: &str, id: RowId) -> Result<bool> {
        let mut tables = self.load()?;
        if !tables.delete(table, id) {
            return Ok(false);
        }
        self.save(&tables)?;
        Ok(true)
    }

    fn apply_batch(&self, batch: &Batch) -> Result<Vec<RowId>> {
        let mut tables = self.load()?;
        let inserted = tables.apply(batch)?;
        self.save(&tables)?;
        Ok(inserted)
    }
}
