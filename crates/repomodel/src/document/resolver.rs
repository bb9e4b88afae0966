use std::collections::HashMap;

use super::MappingConfig;
use crate::error::{ModelError, Result};
use crate::model::ModelHandle;
use crate::persist::ModelStore;

/// Turns a reference address back into a model.
pub trait ReferenceResolver {
    fn resolve(&self, address: &str) -> Result<ModelHandle>;
}

/// Fixed address table, mostly for tests and in-memory graphs.
impl ReferenceResolver for HashMap<String, ModelHandle> {
    fn resolve(&self, address: &str) -> Result<ModelHandle> {
        self.get(address)
            .cloned()
            .ok_or_else(|| ModelError::ReferenceNotFound(address.to_string()))
    }
}

/// Loads `{base_uri}/{resource}/{id}` addresses through a model store.
pub struct StoreResolver<'a> {
    store: &'a ModelStore,
    config: &'a MappingConfig,
}

impl<'a> StoreResolver<'a> {
    pub fn new(store: &'a ModelStore, config: &'a MappingConfig) -> Self {
        Self { store, config }
    }
}

impl ReferenceResolver for StoreResolver<'_> {
    fn resolve(&self, address: &str) -> Result<ModelHandle> {
        let (model_type, id) = self
            .config
            .parse_address(address)
            .ok_or_else(|| ModelError::ReferenceNotFound(address.to_string()))?;
        tracing::debug!(address, model = %model_type, id, "Resolving reference");
        self.store.load(&model_type, id).map_err(|e| match e {
            ModelError::RowNotFound { .. } => ModelError::ReferenceNotFound(address.to_string()),
            other => other,
        })
    }
}
