//! # Field Registry
//!
//! A [`Model`] is an instance of a [`ModelType`]: an ordered set of named
//! [`Field`]s with uniform accessors. Every access goes through one entry
//! point, [`Model::invoke`], keyed by field name; the typed methods (`get`,
//! `set`, `add`, ...) are thin wrappers around it.
//!
//! ## External fields
//!
//! Fields declared external on the type are not part of the instance's own
//! row. Once a [`FieldFetcher`] is attached (the model store does this on
//! load), their values are fetched on first access and cached. Eager
//! externals are fetched by the store immediately.
//!
//! ## Links
//!
//! A link model wraps exactly one target model plus its own relation fields
//! (for example a document-person link carrying a `Role`). Names the link
//! does not own are tunneled to the target, so `describe()` on a link lists
//! both sets while `describe_untunneled()` lists only the link's own.
//!
//! Assigning a bare model to a field declared with a `through` type wraps
//! it in a new link automatically; an already wrapped value is kept.

pub mod handle;
pub mod plugin;
pub mod schema;

pub use handle::ModelHandle;
pub use plugin::Plugin;
pub use schema::{
    snake_case, Constructor, External, FetchMode, ModelType, OrderSpec, Schema, SchemaBuilder,
    Summary,
};

use std::rc::Rc;

use crate::error::{ModelError, Result};
use crate::field::{Field, FieldValue, Item};
use crate::store::RowId;

/// Supplies values of external fields on first access.
pub trait FieldFetcher {
    fn fetch(&self, model: &Model, field: &str) -> Result<FieldValue>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accessor {
    Get,
    Set,
    Add,
}

enum Route {
    Own(usize),
    Tunnel(ModelHandle),
}

pub struct Model {
    ty: Rc<ModelType>,
    schema: Rc<Schema>,
    id: Option<RowId>,
    fields: Vec<Field>,
    link_target: Option<ModelHandle>,
    fetcher: Option<Rc<dyn FieldFetcher>>,
}

impl Model {
    pub(crate) fn new(ty: Rc<ModelType>, schema: Rc<Schema>) -> Self {
        let prototypes = ty.fields().to_vec();
        let mut model = Self {
            ty,
            schema,
            id: None,
            fields: Vec::with_capacity(prototypes.len()),
            link_target: None,
            fetcher: None,
        };
        for field in prototypes {
            model.add_field(field);
        }
        model
    }

    pub fn type_name(&self) -> &str {
        self.ty.name()
    }

    pub fn model_type(&self) -> &Rc<ModelType> {
        &self.ty
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn id(&self) -> Option<RowId> {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: Option<RowId>) {
        self.id = id;
    }

    /// Id used when the model is referenced: a link answers with its
    /// target's id.
    pub fn address_id(&self) -> Option<RowId> {
        match &self.link_target {
            Some(target) => target.id(),
            None => self.id,
        }
    }

    pub fn is_new_record(&self) -> bool {
        self.id.is_none()
    }

    pub fn link_target(&self) -> Option<ModelHandle> {
        self.link_target.clone()
    }

    pub(crate) fn set_link_target(&mut self, target: ModelHandle) -> Result<()> {
        let expected = self.ty.link_target_type().ok_or_else(|| {
            ModelError::Argument(format!("{} is not a link model", self.type_name()))
        })?;
        let actual = target
            .try_type_name()
            .ok_or_else(|| ModelError::Argument("link target is in use".to_string()))?;
        if actual != expected {
            return Err(ModelError::Argument(format!(
                "{} links {} models, got {}",
                self.type_name(),
                expected,
                actual
            )));
        }
        self.link_target = Some(target);
        Ok(())
    }

    /// Register a field, replacing one of the same name. A name declared
    /// external on the type picks up the external's model and link types.
    pub fn add_field(&mut self, mut field: Field) {
        if let Some(ext) = self.ty.external_for(field.name()) {
            let model = ext.model.clone().or_else(|| {
                ext.through.as_deref().and_then(|t| {
                    self.schema
                        .model_type(t)
                        .ok()
                        .and_then(|lt| lt.link_target_type().map(str::to_string))
                })
            });
            field.annotate(model.as_deref(), ext.through.as_deref());
        }
        match self.fields.iter_mut().find(|f| f.name() == field.name()) {
            Some(slot) => *slot = field,
            None => self.fields.push(field),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Declaration of an own field.
    pub fn field(&self, name: &str) -> Result<&Field> {
        self.fields
            .iter()
            .find(|f| f.name() == name)
            .ok_or_else(|| ModelError::unknown_field(self.type_name(), name))
    }

    /// Declaration of a field, following the link for tunneled names.
    pub fn field_info(&self, name: &str) -> Result<Field> {
        if let Ok(field) = self.field(name) {
            return Ok(field.clone());
        }
        match &self.link_target {
            Some(target) if target.borrow().knows(name) => target.borrow().field_info(name),
            _ => Err(ModelError::unknown_field(self.type_name(), name)),
        }
    }

    pub fn owns(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.name() == name)
    }

    fn knows(&self, name: &str) -> bool {
        self.owns(name)
            || self
                .link_target
                .as_ref()
                .map(|t| t.borrow().knows(name))
                .unwrap_or(false)
    }

    /// Visible field names in registration order, tunneled names last.
    pub fn describe(&self) -> Vec<String> {
        let mut names = self.describe_untunneled();
        if let Some(target) = &self.link_target {
            for name in target.describe() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Visible names of the model's own fields.
    pub fn describe_untunneled(&self) -> Vec<String> {
        self.fields
            .iter()
            .map(Field::name)
            .filter(|name| !self.ty.is_hidden(name))
            .map(str::to_string)
            .collect()
    }

    fn route(&self, name: &str) -> Result<Route> {
        if let Some(idx) = self.fields.iter().position(|f| f.name() == name) {
            return Ok(Route::Own(idx));
        }
        if let Some(target) = &self.link_target {
            if target.borrow().knows(name) {
                return Ok(Route::Tunnel(target.clone()));
            }
        }
        Err(ModelError::unknown_field(self.type_name(), name))
    }

    /// Single dispatch entry point for field access.
    ///
    /// - `Get` takes no arguments and returns the value.
    /// - `Set` replaces the value; no arguments is only valid on a
    ///   multi-valued field (it empties it). Returns `Empty`.
    /// - `Add` appends the one argument, or with none builds a new instance
    ///   of the field's model type. Returns the stored item.
    pub fn invoke(&mut self, accessor: Accessor, name: &str, mut args: Vec<Item>) -> Result<FieldValue> {
        let idx = match self.route(name)? {
            Route::Tunnel(target) => return target.borrow_mut().invoke(accessor, name, args),
            Route::Own(idx) => idx,
        };

        match accessor {
            Accessor::Get => {
                if !args.is_empty() {
                    return Err(ModelError::Argument(format!(
                        "get of '{}' takes no arguments",
                        name
                    )));
                }
                self.ensure_fetched(idx)?;
                Ok(self.fields[idx].value().clone())
            }
            Accessor::Set => {
                let value = match args.len() {
                    0 if !self.fields[idx].is_multiple() => {
                        return Err(ModelError::Argument(format!(
                            "set of single-valued field '{}' needs a value",
                            name
                        )))
                    }
                    0 => FieldValue::Many(Vec::new()),
                    1 => FieldValue::One(args.remove(0)),
                    _ => FieldValue::Many(args),
                };
                self.assign_own(idx, value)?;
                Ok(FieldValue::Empty)
            }
            Accessor::Add => {
                if args.len() > 1 {
                    return Err(ModelError::Argument(format!(
                        "add to '{}' takes at most one argument, got {}",
                        name,
                        args.len()
                    )));
                }
                self.ensure_fetched(idx)?;
                let item = match args.pop() {
                    Some(item) => self.wrap(idx, item)?,
                    None => self.new_item(idx)?,
                };
                self.fields[idx].add_item(item.clone())?;
                Ok(FieldValue::One(item))
            }
        }
    }

    pub fn get(&mut self, name: &str) -> Result<FieldValue> {
        self.invoke(Accessor::Get, name, Vec::new())
    }

    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        match value.into() {
            FieldValue::Empty => self.invoke(Accessor::Set, name, Vec::new()).map(|_| ()),
            FieldValue::One(item) => self.invoke(Accessor::Set, name, vec![item]).map(|_| ()),
            many => self.assign(name, many),
        }
    }

    pub fn set_many(&mut self, name: &str, items: Vec<Item>) -> Result<()> {
        self.assign(name, FieldValue::Many(items))
    }

    /// Reset a field to its empty shape.
    pub fn clear(&mut self, name: &str) -> Result<()> {
        self.assign(name, FieldValue::Empty)
    }

    pub fn add(&mut self, name: &str, item: impl Into<Item>) -> Result<Item> {
        single(self.invoke(Accessor::Add, name, vec![item.into()])?)
    }

    /// Append a new empty instance of the field's model type and return it
    /// (the link, for `through` fields).
    pub fn add_new(&mut self, name: &str) -> Result<ModelHandle> {
        match single(self.invoke(Accessor::Add, name, Vec::new())?)? {
            Item::Model(m) | Item::Linked(m) => Ok(m),
            Item::Value(_) => Err(ModelError::Argument(format!(
                "field '{}' does not hold models",
                name
            ))),
        }
    }

    fn assign(&mut self, name: &str, value: FieldValue) -> Result<()> {
        match self.route(name)? {
            Route::Tunnel(target) => target.borrow_mut().assign(name, value),
            Route::Own(idx) => self.assign_own(idx, value),
        }
    }

    fn assign_own(&mut self, idx: usize, value: FieldValue) -> Result<()> {
        let value = match value {
            FieldValue::Empty => FieldValue::Empty,
            FieldValue::One(item) => FieldValue::One(self.wrap(idx, item)?),
            FieldValue::Many(items) => FieldValue::Many(
                items
                    .into_iter()
                    .map(|item| self.wrap(idx, item))
                    .collect::<Result<_>>()?,
            ),
        };
        self.fields[idx].set_value(value)
    }

    /// Check an item against the field's declaration, wrapping bare models
    /// of `through` fields into links.
    fn wrap(&self, idx: usize, item: Item) -> Result<Item> {
        let field = &self.fields[idx];
        let holds_models = field.value_model_type().is_some();
        match item {
            Item::Value(v) if !holds_models => Ok(Item::Value(v)),
            Item::Value(v) => Err(ModelError::Argument(format!(
                "field '{}' holds models, got value '{}'",
                field.name(),
                v.render()
            ))),
            _ if !holds_models => Err(ModelError::Argument(format!(
                "field '{}' holds scalar values, got a model",
                field.name()
            ))),
            Item::Linked(link) => Ok(Item::Linked(link)),
            Item::Model(model) => {
                let is_link = model
                    .try_is_link()
                    .ok_or_else(|| ModelError::Argument("a model cannot hold itself".to_string()))?;
                if is_link {
                    return Ok(Item::Linked(model));
                }
                match field.through_type() {
                    Some(through) => Ok(Item::Linked(self.schema.create_link(through, model)?)),
                    None => Ok(Item::Model(model)),
                }
            }
        }
    }

    fn new_item(&self, idx: usize) -> Result<Item> {
        let field = &self.fields[idx];
        let model = field.value_model_type().ok_or_else(|| {
            ModelError::Argument(format!(
                "add to '{}' needs a value: the field has no model type",
                field.name()
            ))
        })?;
        let instance = self.schema.instantiate(model)?;
        match field.through_type() {
            Some(through) => Ok(Item::Linked(self.schema.create_link(through, instance)?)),
            None => Ok(Item::Model(instance)),
        }
    }

    fn ensure_fetched(&mut self, idx: usize) -> Result<()> {
        if !self.fields[idx].is_pending() {
            return Ok(());
        }
        if let Some(fetcher) = self.fetcher.clone() {
            let name = self.fields[idx].name().to_string();
            tracing::debug!(model = self.type_name(), id = ?self.id, field = %name, "Fetching external field");
            let value = fetcher.fetch(self, &name)?;
            self.fields[idx].load_value(value)?;
        }
        self.fields[idx].set_pending(false);
        Ok(())
    }

    /// Attach the source of external field values. Every external field
    /// becomes pending until first accessed.
    pub fn attach_fetcher(&mut self, fetcher: Rc<dyn FieldFetcher>) {
        self.fetcher = Some(fetcher);
        let ty = self.ty.clone();
        for field in self.fields.iter_mut().filter(|f| ty.is_external(f.name())) {
            field.set_pending(true);
        }
    }

    /// Whether an own field still waits for its first fetch.
    pub fn is_pending(&self, name: &str) -> bool {
        self.fields
            .iter()
            .any(|f| f.name() == name && f.is_pending())
    }

    pub fn is_modified(&self) -> bool {
        self.fields.iter().any(Field::is_modified)
    }

    pub(crate) fn mark_clean(&mut self) {
        for field in &mut self.fields {
            field.mark_clean();
        }
    }

    pub(crate) fn load_field(&mut self, name: &str, value: FieldValue) -> Result<()> {
        let ty_name = self.ty.name().to_string();
        self.fields
            .iter_mut()
            .find(|f| f.name() == name)
            .ok_or_else(|| ModelError::unknown_field(ty_name, name))?
            .load_value(value)
    }

    /// Check mandatory flags and validators, descending into sub-models.
    /// Fields not yet fetched are skipped.
    pub fn validate(&self) -> Result<()> {
        for field in self.fields.iter().filter(|f| !f.is_pending()) {
            field.validate()?;
            for model in field.value().items().iter().filter_map(Item::as_model) {
                if let Some(sub) = model.try_borrow() {
                    sub.validate()?;
                }
            }
        }
        if let Some(target) = &self.link_target {
            target.borrow().validate()?;
        }
        Ok(())
    }

    /// Value of the type's display field, or the type name.
    pub fn display_name(&self) -> String {
        if let Some(target) = &self.link_target {
            return target.borrow().display_name();
        }
        self.ty
            .display_field_name()
            .and_then(|name| self.fields.iter().find(|f| f.name() == name))
            .and_then(|f| f.value().as_value())
            .filter(|v| !v.is_empty())
            .map(|v| v.render())
            .unwrap_or_else(|| self.type_name().to_string())
    }

    /// Nested value tree of every visible field. Fetches pending externals.
    pub fn to_tree(&mut self) -> Result<serde_json::Value> {
        let mut map = serde_json::Map::new();
        for name in self.describe() {
            let value = self.get(&name)?;
            let summary = if self.owns(&name) {
                self.ty.summary_for(&name).cloned()
            } else {
                None
            };
            let tree = match summary {
                Some(summary) => summary(&value)?,
                None => value_tree(&value)?,
            };
            map.insert(name, tree);
        }
        Ok(serde_json::Value::Object(map))
    }
}

fn single(value: FieldValue) -> Result<Item> {
    match value {
        FieldValue::One(item) => Ok(item),
        other => Err(ModelError::Argument(format!(
            "expected a single item, got {:?}",
            other
        ))),
    }
}

pub(crate) fn value_tree(value: &FieldValue) -> Result<serde_json::Value> {
    match value {
        FieldValue::Empty => Ok(serde_json::Value::Null),
        FieldValue::One(item) => item_tree(item),
        FieldValue::Many(items) => items
            .iter()
            .map(item_tree)
            .collect::<Result<Vec<_>>>()
            .map(serde_json::Value::Array),
    }
}

fn item_tree(item: &Item) -> Result<serde_json::Value> {
    match item {
        Item::Value(v) => Ok(v.to_json()),
        Item::Model(m) | Item::Linked(m) => m
            .try_borrow_mut()
            .ok_or_else(|| ModelError::Argument("cyclic model graph".to_string()))?
            .to_tree(),
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("type", &self.type_name())
            .field("id", &self.id)
            .field("fields", &self.fields)
            .field("link_target", &self.link_target)
            .finish()
    }
}
