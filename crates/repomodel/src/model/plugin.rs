//! Lifecycle hooks run by [`ModelStore`](crate::persist::ModelStore).
//!
//! Plugins are registered per model type. Every hook defaults to a no-op, so
//! a plugin only implements the stages it cares about. An error returned
//! from a `pre_*` hook aborts the operation before anything is written.

use super::Model;
use crate::error::Result;
use crate::persist::ModelStore;
use crate::store::RowId;

pub trait Plugin {
    /// Human-readable name for log output.
    fn name(&self) -> &str {
        "plugin"
    }

    /// Before a row is loaded into a fresh instance.
    fn pre_fetch(&self, _store: &ModelStore, _model: &mut Model) -> Result<()> {
        Ok(())
    }

    fn pre_store(&self, _store: &ModelStore, _model: &mut Model) -> Result<()> {
        Ok(())
    }

    /// After the model's own row was written; the id is set.
    fn post_store_internal(&self, _store: &ModelStore, _model: &mut Model) -> Result<()> {
        Ok(())
    }

    /// After external fields were handed to their handlers.
    fn post_store_external(&self, _store: &ModelStore, _model: &mut Model) -> Result<()> {
        Ok(())
    }

    fn post_store(&self, _store: &ModelStore, _model: &mut Model) -> Result<()> {
        Ok(())
    }

    fn pre_delete(&self, _store: &ModelStore, _model: &mut Model) -> Result<()> {
        Ok(())
    }

    /// The row is gone; only the former id remains.
    fn post_delete(&self, _store: &ModelStore, _id: RowId) -> Result<()> {
        Ok(())
    }
}
