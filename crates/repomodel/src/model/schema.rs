//! Model type declarations.
//!
//! A [`ModelType`] lists the fields an instance starts with, which of them
//! are external (fetched and stored through a handler rather than the
//! type's own row), which are hidden, and the type's optional behaviors:
//! position ordering, display field, plugins, tree summaries and a
//! document constructor.
//!
//! Types are collected by a [`SchemaBuilder`]. `build()` checks every
//! cross-reference once, so an instance never sees a dangling name.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use super::plugin::Plugin;
use super::{Model, ModelHandle};
use crate::error::{ModelError, Result};
use crate::field::{Field, FieldValue};
use crate::persist::ExternalHandler;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Fetched when the instance is loaded.
    Eager,
    /// Fetched on first access, then cached.
    #[default]
    Lazy,
}

/// Declaration of a field whose value lives outside the type's own row.
#[derive(Clone)]
pub struct External {
    pub field: String,
    pub model: Option<String>,
    pub through: Option<String>,
    pub fetch: FetchMode,
    /// Fixed column values: used as filters on fetch, stamped on store.
    pub options: Vec<(String, Value)>,
    pub handler: Option<Rc<dyn ExternalHandler>>,
}

impl External {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            model: None,
            through: None,
            fetch: FetchMode::Lazy,
            options: Vec::new(),
            handler: None,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn through(mut self, through: impl Into<String>) -> Self {
        self.through = Some(through.into());
        self
    }

    pub fn eager(mut self) -> Self {
        self.fetch = FetchMode::Eager;
        self
    }

    pub fn option(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.push((column.into(), value.into()));
        self
    }

    pub fn handler(mut self, handler: impl ExternalHandler + 'static) -> Self {
        self.handler = Some(Rc::new(handler));
        self
    }
}

impl fmt::Debug for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("External")
            .field("field", &self.field)
            .field("model", &self.model)
            .field("through", &self.through)
            .field("fetch", &self.fetch)
            .field("options", &self.options)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Dense 1..N ordering over one integer field, optionally per scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderSpec {
    pub field: String,
    pub scope: Option<String>,
}

/// Replaces a field's expansion in `Model::to_tree`.
pub type Summary = Rc<dyn Fn(&FieldValue) -> Result<serde_json::Value>>;

/// Builds an instance from positional document arguments.
pub type Constructor = Rc<dyn Fn(&mut Model, &[Option<String>]) -> Result<()>>;

pub struct ModelType {
    name: String,
    table: Option<String>,
    fields: Vec<Field>,
    externals: Vec<External>,
    hidden: Vec<String>,
    order: Option<OrderSpec>,
    display_field: Option<String>,
    plugins: Vec<Rc<dyn Plugin>>,
    summaries: HashMap<String, Summary>,
    constructor: Option<Constructor>,
    link_to: Option<String>,
}

impl ModelType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: Vec::new(),
            externals: Vec::new(),
            hidden: Vec::new(),
            order: None,
            display_field: None,
            plugins: Vec::new(),
            summaries: HashMap::new(),
            constructor: None,
            link_to: None,
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.retain(|f| f.name() != field.name());
        self.fields.push(field);
        self
    }

    pub fn external(mut self, external: External) -> Self {
        self.externals.push(external);
        self
    }

    pub fn hidden(mut self, field: impl Into<String>) -> Self {
        self.hidden.push(field.into());
        self
    }

    pub fn ordered_by(mut self, field: impl Into<String>, scope: Option<&str>) -> Self {
        self.order = Some(OrderSpec {
            field: field.into(),
            scope: scope.map(str::to_string),
        });
        self
    }

    pub fn display_field(mut self, field: impl Into<String>) -> Self {
        self.display_field = Some(field.into());
        self
    }

    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Rc::new(plugin));
        self
    }

    pub fn summary<F>(mut self, field: impl Into<String>, summary: F) -> Self
    where
        F: Fn(&FieldValue) -> Result<serde_json::Value> + 'static,
    {
        self.summaries.insert(field.into(), Rc::new(summary));
        self
    }

    pub fn constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&mut Model, &[Option<String>]) -> Result<()> + 'static,
    {
        self.constructor = Some(Rc::new(constructor));
        self
    }

    /// Mark this type as a link model wrapping instances of `target`.
    pub fn link_to(mut self, target: impl Into<String>) -> Self {
        self.link_to = Some(target.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared table, or the snake_case type name.
    pub fn table_name(&self) -> String {
        self.table.clone().unwrap_or_else(|| snake_case(&self.name))
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn externals(&self) -> &[External] {
        &self.externals
    }

    pub fn external_for(&self, field: &str) -> Option<&External> {
        self.externals.iter().find(|e| e.field == field)
    }

    pub fn is_external(&self, field: &str) -> bool {
        self.external_for(field).is_some()
    }

    pub fn is_hidden(&self, field: &str) -> bool {
        self.hidden.iter().any(|h| h == field)
    }

    pub fn order(&self) -> Option<&OrderSpec> {
        self.order.as_ref()
    }

    pub fn display_field_name(&self) -> Option<&str> {
        self.display_field.as_deref()
    }

    pub fn plugins(&self) -> &[Rc<dyn Plugin>] {
        &self.plugins
    }

    pub fn summary_for(&self, field: &str) -> Option<&Summary> {
        self.summaries.get(field)
    }

    pub fn constructor_fn(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    pub fn link_target_type(&self) -> Option<&str> {
        self.link_to.as_deref()
    }

    pub fn is_link(&self) -> bool {
        self.link_to.is_some()
    }

    fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name() == name)
    }
}

impl fmt::Debug for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelType")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("fields", &self.fields.iter().map(Field::name).collect::<Vec<_>>())
            .field("externals", &self.externals)
            .field("hidden", &self.hidden)
            .field("order", &self.order)
            .field("link_to", &self.link_to)
            .finish()
    }
}

/// `OaiName` -> `oai_name`.
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[derive(Default)]
pub struct SchemaBuilder {
    types: Vec<ModelType>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn model(mut self, model_type: ModelType) -> Self {
        self.types.push(model_type);
        self
    }

    pub fn build(self) -> Result<Rc<Schema>> {
        let mut types: BTreeMap<String, ModelType> = BTreeMap::new();
        for ty in self.types {
            if types.contains_key(&ty.name) {
                return Err(ModelError::Schema(format!(
                    "model type '{}' registered twice",
                    ty.name
                )));
            }
            types.insert(ty.name.clone(), ty);
        }

        let link_targets: HashMap<String, Option<String>> = types
            .iter()
            .map(|(name, ty)| (name.clone(), ty.link_to.clone()))
            .collect();
        let known = |name: &str| link_targets.contains_key(name);

        for ty in types.values_mut() {
            let err = |msg: String| ModelError::Schema(format!("{}: {}", ty.name, msg));

            for ext in &ty.externals {
                if !ty.has_field(&ext.field) {
                    return Err(err(format!("external '{}' is not a field", ext.field)));
                }
                if let Some(model) = ext.model.as_deref().filter(|m| !known(*m)) {
                    return Err(err(format!("external '{}' names unknown model '{}'", ext.field, model)));
                }
                if let Some(through) = &ext.through {
                    match link_targets.get(through) {
                        Some(Some(_)) => {}
                        Some(None) => {
                            return Err(err(format!("through type '{}' is not a link model", through)))
                        }
                        None => {
                            return Err(err(format!("external '{}' names unknown link '{}'", ext.field, through)))
                        }
                    }
                }
            }
            for hidden in &ty.hidden {
                if !ty.has_field(hidden) {
                    return Err(err(format!("hidden '{}' is not a field", hidden)));
                }
            }
            if let Some(order) = &ty.order {
                if !ty.has_field(&order.field) {
                    return Err(err(format!("ordering field '{}' is not a field", order.field)));
                }
                if let Some(scope) = order.scope.as_deref().filter(|s| !ty.has_field(s)) {
                    return Err(err(format!("ordering scope '{}' is not a field", scope)));
                }
            }
            if let Some(display) = ty.display_field.as_deref().filter(|d| !ty.has_field(d)) {
                return Err(err(format!("display field '{}' is not a field", display)));
            }
            if let Some(target) = ty.link_to.as_deref().filter(|t| !known(*t)) {
                return Err(err(format!("links to unknown model '{}'", target)));
            }
            for field in &ty.fields {
                if let Some(model) = field.value_model_type().filter(|m| !known(*m)) {
                    return Err(err(format!("field '{}' holds unknown model '{}'", field.name(), model)));
                }
            }

            let annotations: Vec<(String, Option<String>, Option<String>)> = ty
                .externals
                .iter()
                .map(|ext| {
                    let model = ext.model.clone().or_else(|| {
                        ext.through
                            .as_ref()
                            .and_then(|t| link_targets.get(t).cloned().flatten())
                    });
                    (ext.field.clone(), model, ext.through.clone())
                })
                .collect();
            for (name, model, through) in annotations {
                if let Some(field) = ty.fields.iter_mut().find(|f| f.name() == name) {
                    field.annotate(model.as_deref(), through.as_deref());
                }
            }
        }

        tracing::debug!(types = types.len(), "Schema built");
        Ok(Rc::new(Schema {
            types: types
                .into_iter()
                .map(|(name, ty)| (name, Rc::new(ty)))
                .collect(),
        }))
    }
}

/// The set of registered model types.
#[derive(Debug)]
pub struct Schema {
    types: BTreeMap<String, Rc<ModelType>>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn model_type(&self, name: &str) -> Result<&Rc<ModelType>> {
        self.types
            .get(name)
            .ok_or_else(|| ModelError::UnknownModelType(name.to_string()))
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    /// A fresh, unsaved model of the given type.
    pub fn create(self: &Rc<Self>, name: &str) -> Result<Model> {
        let ty = self.model_type(name)?.clone();
        Ok(Model::new(ty, self.clone()))
    }

    pub fn instantiate(self: &Rc<Self>, name: &str) -> Result<ModelHandle> {
        self.create(name).map(ModelHandle::new)
    }

    /// A fresh link model of type `through` wrapping `target`.
    pub fn create_link(self: &Rc<Self>, through: &str, target: ModelHandle) -> Result<ModelHandle> {
        let mut link = self.create(through)?;
        link.set_link_target(target)?;
        Ok(ModelHandle::new(link))
    }
}
