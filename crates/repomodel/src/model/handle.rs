use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use super::Model;
use crate::error::Result;
use crate::field::{FieldValue, Item};
use crate::store::RowId;

/// Shared, single-threaded reference to a model instance.
///
/// Equality is identity: two handles are equal when they point at the same
/// instance.
#[derive(Clone)]
pub struct ModelHandle(Rc<RefCell<Model>>);

impl ModelHandle {
    pub fn new(model: Model) -> Self {
        Self(Rc::new(RefCell::new(model)))
    }

    pub fn borrow(&self) -> Ref<'_, Model> {
        self.0.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Model> {
        self.0.borrow_mut()
    }

    /// None while the instance is mutably borrowed elsewhere.
    pub fn try_borrow(&self) -> Option<Ref<'_, Model>> {
        self.0.try_borrow().ok()
    }

    pub fn try_borrow_mut(&self) -> Option<RefMut<'_, Model>> {
        self.0.try_borrow_mut().ok()
    }

    pub fn ptr_eq(&self, other: &ModelHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn try_type_name(&self) -> Option<String> {
        self.try_borrow().map(|m| m.type_name().to_string())
    }

    pub(crate) fn try_is_link(&self) -> Option<bool> {
        self.try_borrow().map(|m| m.model_type().is_link())
    }

    pub fn type_name(&self) -> String {
        self.borrow().type_name().to_string()
    }

    pub fn id(&self) -> Option<RowId> {
        self.borrow().id()
    }

    pub fn describe(&self) -> Vec<String> {
        self.borrow().describe()
    }

    pub fn get(&self, name: &str) -> Result<FieldValue> {
        self.borrow_mut().get(name)
    }

    pub fn set(&self, name: &str, value: impl Into<FieldValue>) -> Result<()> {
        self.borrow_mut().set(name, value)
    }

    pub fn set_many(&self, name: &str, items: Vec<Item>) -> Result<()> {
        self.borrow_mut().set_many(name, items)
    }

    pub fn add(&self, name: &str, item: impl Into<Item>) -> Result<Item> {
        self.borrow_mut().add(name, item)
    }

    pub fn add_new(&self, name: &str) -> Result<ModelHandle> {
        self.borrow_mut().add_new(name)
    }

    pub fn link_target(&self) -> Option<ModelHandle> {
        self.borrow().link_target()
    }

    pub fn to_tree(&self) -> Result<serde_json::Value> {
        self.borrow_mut().to_tree()
    }

    pub fn validate(&self) -> Result<()> {
        self.borrow().validate()
    }
}

impl PartialEq for ModelHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(model) => write!(f, "{}#{:?}", model.type_name(), model.id()),
            Err(_) => write!(f, "<model in use>"),
        }
    }
}
