//! Fields: named, typed value containers.
//!
//! A [`Field`] holds either nothing, one [`Item`], or (when declared
//! multi-valued) a sequence of items. The shape is enforced on every write:
//! a single-valued field never holds a sequence, a multi-valued field always
//! does (possibly empty).
//!
//! Items are a tagged union. [`Item::Model`] is a plain sub-model,
//! [`Item::Linked`] is a link model wrapping the real target. Which one a
//! field stores is decided by the owning registry from the field's `through`
//! declaration, never by the caller.

use std::fmt;
use std::rc::Rc;

use crate::error::{ModelError, Result};
use crate::model::ModelHandle;
use crate::value::{Value, ValueKind};

/// One element of a field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Value(Value),
    Model(ModelHandle),
    /// A link model; its target is the model the relation points to.
    Linked(ModelHandle),
}

impl Item {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Item::Value(v) => Some(v),
            _ => None,
        }
    }

    /// The stored model handle, link wrapper included.
    pub fn as_model(&self) -> Option<&ModelHandle> {
        match self {
            Item::Model(m) | Item::Linked(m) => Some(m),
            Item::Value(_) => None,
        }
    }

    /// The model the item points to, unwrapping a link.
    pub fn target(&self) -> Option<ModelHandle> {
        match self {
            Item::Model(m) => Some(m.clone()),
            Item::Linked(link) => link.borrow().link_target(),
            Item::Value(_) => None,
        }
    }

    pub fn is_model(&self) -> bool {
        !matches!(self, Item::Value(_))
    }
}

impl<T: Into<Value>> From<T> for Item {
    fn from(value: T) -> Self {
        Item::Value(value.into())
    }
}

impl From<ModelHandle> for Item {
    fn from(model: ModelHandle) -> Self {
        Item::Model(model)
    }
}

/// The value of a field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum FieldValue {
    #[default]
    Empty,
    One(Item),
    Many(Vec<Item>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::One(Item::Value(v)) => v.is_empty(),
            FieldValue::One(_) => false,
            FieldValue::Many(items) => items.is_empty(),
        }
    }

    /// All items, iterating a single value as a one-element sequence.
    pub fn items(&self) -> &[Item] {
        match self {
            FieldValue::Empty => &[],
            FieldValue::One(item) => std::slice::from_ref(item),
            FieldValue::Many(items) => items,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            FieldValue::One(item) => item.as_value(),
            _ => None,
        }
    }

    pub fn as_model(&self) -> Option<&ModelHandle> {
        match self {
            FieldValue::One(item) => item.as_model(),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn has_models(&self) -> bool {
        self.items().iter().any(Item::is_model)
    }
}

impl<T: Into<Value>> From<T> for FieldValue {
    fn from(value: T) -> Self {
        FieldValue::One(Item::Value(value.into()))
    }
}

impl From<Item> for FieldValue {
    fn from(item: Item) -> Self {
        FieldValue::One(item)
    }
}

impl From<ModelHandle> for FieldValue {
    fn from(model: ModelHandle) -> Self {
        FieldValue::One(Item::Model(model))
    }
}

impl From<Vec<Item>> for FieldValue {
    fn from(items: Vec<Item>) -> Self {
        FieldValue::Many(items)
    }
}

/// Checks a scalar value. Validators are consulted by `Model::validate`,
/// never on assignment.
pub trait Validator {
    fn validate(&self, value: &Value) -> std::result::Result<(), String>;
}

impl<F> Validator for F
where
    F: Fn(&Value) -> std::result::Result<(), String>,
{
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        self(value)
    }
}

/// Rejects empty text.
#[derive(Debug, Clone, Copy)]
pub struct NotEmpty;

impl Validator for NotEmpty {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        match value {
            Value::Text(s) if s.trim().is_empty() => Err("value must not be empty".to_string()),
            _ => Ok(()),
        }
    }
}

/// Accepts only the listed renderings.
#[derive(Debug, Clone)]
pub struct OneOf(pub Vec<String>);

impl OneOf {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(allowed.into_iter().map(Into::into).collect())
    }
}

impl Validator for OneOf {
    fn validate(&self, value: &Value) -> std::result::Result<(), String> {
        let rendered = value.render();
        if self.0.iter().any(|allowed| *allowed == rendered) {
            Ok(())
        } else {
            Err(format!(
                "'{}' is not one of [{}]",
                rendered,
                self.0.join(", ")
            ))
        }
    }
}

/// Normalizes a scalar value on assignment.
pub trait Filter {
    fn filter(&self, value: Value) -> Value;
}

impl<F> Filter for F
where
    F: Fn(Value) -> Value,
{
    fn filter(&self, value: Value) -> Value {
        self(value)
    }
}

/// Trims surrounding whitespace from text.
#[derive(Debug, Clone, Copy)]
pub struct Trim;

impl Filter for Trim {
    fn filter(&self, value: Value) -> Value {
        match value {
            Value::Text(s) => Value::Text(s.trim().to_string()),
            other => other,
        }
    }
}

/// A named value container with its declaration metadata.
#[derive(Clone)]
pub struct Field {
    name: String,
    value: FieldValue,
    kind: ValueKind,
    mandatory: bool,
    multiple: bool,
    checkbox: bool,
    value_model: Option<String>,
    through: Option<String>,
    validator: Option<Rc<dyn Validator>>,
    filter: Option<Rc<dyn Filter>>,
    modified: bool,
    pending: bool,
}

impl Field {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: FieldValue::Empty,
            kind: ValueKind::Text,
            mandatory: false,
            multiple: false,
            checkbox: false,
            value_model: None,
            through: None,
            validator: None,
            filter: None,
            modified: false,
            pending: false,
        }
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self.value = FieldValue::Many(Vec::new());
        self
    }

    /// Boolean field rendered as a checkbox; implies [`ValueKind::Bool`].
    pub fn checkbox(mut self) -> Self {
        self.checkbox = true;
        self.kind = ValueKind::Bool;
        self
    }

    pub fn kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Some(Rc::new(validator));
        self
    }

    pub fn filter(mut self, filter: impl Filter + 'static) -> Self {
        self.filter = Some(Rc::new(filter));
        self
    }

    /// Declare the type of model values this field holds.
    pub fn value_model(mut self, model: impl Into<String>) -> Self {
        self.value_model = Some(model.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &FieldValue {
        &self.value
    }

    pub fn value_kind(&self) -> ValueKind {
        self.kind
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn is_checkbox(&self) -> bool {
        self.checkbox
    }

    pub fn value_model_type(&self) -> Option<&str> {
        self.value_model.as_deref()
    }

    pub fn through_type(&self) -> Option<&str> {
        self.through.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.modified = false;
    }

    pub(crate) fn annotate(&mut self, value_model: Option<&str>, through: Option<&str>) {
        if let Some(model) = value_model {
            self.value_model = Some(model.to_string());
        }
        if let Some(through) = through {
            self.through = Some(through.to_string());
        }
    }

    /// Replace the value, enforcing the single/multi shape.
    pub fn set_value(&mut self, value: FieldValue) -> Result<()> {
        let value = match (self.multiple, value) {
            (true, FieldValue::Empty) => FieldValue::Many(Vec::new()),
            (true, FieldValue::One(item)) => FieldValue::Many(vec![self.filtered(item)]),
            (true, FieldValue::Many(items)) => {
                FieldValue::Many(items.into_iter().map(|i| self.filtered(i)).collect())
            }
            (false, FieldValue::Many(items)) => {
                return Err(ModelError::Argument(format!(
                    "field '{}' is single-valued and cannot hold {} values",
                    self.name,
                    items.len()
                )))
            }
            (false, FieldValue::One(item)) => FieldValue::One(self.filtered(item)),
            (false, FieldValue::Empty) => FieldValue::Empty,
        };
        self.value = value;
        self.modified = true;
        self.pending = false;
        Ok(())
    }

    /// Append one item. A single-valued field accepts an item only while empty.
    pub fn add_item(&mut self, item: Item) -> Result<()> {
        let item = self.filtered(item);
        match &mut self.value {
            FieldValue::Many(items) => items.push(item),
            FieldValue::Empty => self.value = FieldValue::One(item),
            FieldValue::One(_) => {
                return Err(ModelError::Argument(format!(
                    "field '{}' is single-valued and already holds a value",
                    self.name
                )))
            }
        }
        self.modified = true;
        Ok(())
    }

    /// Store a value fetched from a collaborator without marking it modified.
    pub(crate) fn load_value(&mut self, value: FieldValue) -> Result<()> {
        self.set_value(value)?;
        self.modified = false;
        Ok(())
    }

    fn filtered(&self, item: Item) -> Item {
        match (item, &self.filter) {
            (Item::Value(v), Some(filter)) => Item::Value(filter.filter(v)),
            (item, _) => item,
        }
    }

    /// Check the mandatory flag and the validator.
    pub fn validate(&self) -> Result<()> {
        if self.mandatory && self.value.is_empty() {
            return Err(ModelError::Validation {
                field: self.name.clone(),
                message: "value required".to_string(),
            });
        }
        if let Some(validator) = &self.validator {
            for value in self.value.items().iter().filter_map(Item::as_value) {
                validator
                    .validate(value)
                    .map_err(|message| ModelError::Validation {
                        field: self.name.clone(),
                        message,
                    })?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("value", &self.value)
            .field("kind", &self.kind)
            .field("mandatory", &self.mandatory)
            .field("multiple", &self.multiple)
            .field("value_model", &self.value_model)
            .field("through", &self.through)
            .field("has_validator", &self.validator.is_some())
            .field("has_filter", &self.filter.is_some())
            .field("modified", &self.modified)
            .finish()
    }
}
