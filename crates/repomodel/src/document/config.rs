//! # Mapping Configuration
//!
//! Settings for the document mapping engine, managed by [`confique`]:
//! compiled defaults, an optional TOML file, and environment overrides.
//!
//! | Key | Default | Description |
//! |-----|---------|-------------|
//! | `root_element` | `Opus` | Name of the document root |
//! | `version` | `2.0` | `version` attribute written on the root |
//! | `base_uri` | empty | Prefix of reference addresses (env `REPOMODEL_BASE_URI`) |
//! | `exclude_empty` | `false` | Skip fields without a value when serializing |
//! | `exclude_fields` | none | Field names never serialized |
//! | `resource_names` | none | Model type -> resource segment of its address |
//! | `construction` | none | Model type -> element names passed to its constructor |
//!
//! A `construction` entry of `""` is a placeholder: the argument at that
//! position is always `None`.
//!
//! ```toml
//! base_uri = "http://repo.example/api"
//! exclude_fields = ["ServerState"]
//!
//! [resource_names]
//! Person = "person"
//!
//! [construction]
//! Person = ["LastName", ""]
//! ```

use confique::Config;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::Result;
use crate::store::RowId;

/// Configuration of the document mapping, stored in TOML.
#[derive(Config, Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MappingConfig {
    /// Name of the root element.
    #[config(default = "Opus")]
    pub root_element: String,

    /// Value of the root's `version` attribute.
    #[config(default = "2.0")]
    pub version: String,

    /// Prefix of reference addresses, without trailing slash.
    #[config(env = "REPOMODEL_BASE_URI", default = "")]
    pub base_uri: String,

    /// Drop fields whose value is empty.
    #[config(default = false)]
    pub exclude_empty: bool,

    pub exclude_fields: Option<Vec<String>>,

    pub resource_names: Option<HashMap<String, String>>,

    pub construction: Option<HashMap<String, Vec<String>>>,
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            root_element: "Opus".to_string(),
            version: "2.0".to_string(),
            base_uri: String::new(),
            exclude_empty: false,
            exclude_fields: None,
            resource_names: None,
            construction: None,
        }
    }
}

impl MappingConfig {
    /// Load from the environment and, if given, a TOML file. A missing file
    /// falls back to the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Self::builder().env();
        if let Some(path) = path {
            builder = builder.file(path);
        }
        Ok(builder.load()?)
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = base_uri.into();
        self
    }

    pub fn with_root_element(mut self, name: impl Into<String>) -> Self {
        self.root_element = name.into();
        self
    }

    pub fn with_exclude_empty(mut self, exclude: bool) -> Self {
        self.exclude_empty = exclude;
        self
    }

    pub fn exclude_field(mut self, field: impl Into<String>) -> Self {
        self.exclude_fields
            .get_or_insert_with(Vec::new)
            .push(field.into());
        self
    }

    pub fn with_resource(mut self, model_type: impl Into<String>, resource: impl Into<String>) -> Self {
        self.resource_names
            .get_or_insert_with(HashMap::new)
            .insert(model_type.into(), resource.into());
        self
    }

    pub fn with_construction<I, S>(mut self, model_type: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let args = args
            .into_iter()
            .map(|a| a.map(Into::into).unwrap_or_default())
            .collect();
        self.construction
            .get_or_insert_with(HashMap::new)
            .insert(model_type.into(), args);
        self
    }

    pub fn is_excluded(&self, field: &str) -> bool {
        self.exclude_fields
            .as_ref()
            .map(|fields| fields.iter().any(|f| f == field))
            .unwrap_or(false)
    }

    pub fn resource_name(&self, model_type: &str) -> Option<&str> {
        self.resource_names
            .as_ref()
            .and_then(|names| names.get(model_type))
            .map(String::as_str)
    }

    /// `{base_uri}/{resource}/{id}` for types with a resource name.
    pub fn address_for(&self, model_type: &str, id: RowId) -> Option<String> {
        let resource = self.resource_name(model_type)?;
        Some(format!(
            "{}/{}/{}",
            self.base_uri.trim_end_matches('/'),
            resource,
            id
        ))
    }

    /// Inverse of [`address_for`](Self::address_for).
    pub fn parse_address(&self, address: &str) -> Option<(String, RowId)> {
        let rest = address.strip_prefix(self.base_uri.trim_end_matches('/'))?;
        let (resource, id) = rest.trim_start_matches('/').rsplit_once('/')?;
        let id = id.parse().ok()?;
        let names = self.resource_names.as_ref()?;
        names
            .iter()
            .find(|(_, r)| r.as_str() == resource)
            .map(|(model_type, _)| (model_type.clone(), id))
    }

    /// Constructor rule of a type; placeholders become `None`.
    pub fn construction_args(&self, model_type: &str) -> Option<Vec<Option<&str>>> {
        let rule = self.construction.as_ref()?.get(model_type)?;
        Some(
            rule.iter()
                .map(|name| Some(name.as_str()).filter(|n| !n.is_empty()))
                .collect(),
        )
    }
}
