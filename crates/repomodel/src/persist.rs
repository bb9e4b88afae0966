//! # Model Store
//!
//! Bridges models and a [`RowStore`]. Internal scalar fields map to columns
//! of the type's table (`OaiName` is stored as `oai_name`); external fields
//! go through the [`ExternalHandler`] declared on the type.
//!
//! ## Lifecycle
//!
//! `store()` runs, in order: `pre_store` plugins, the own row write (routed
//! through [`OrderedSet`] for position-ordered types), `post_store_internal`,
//! the external handlers, `post_store_external`, `post_store`.
//!
//! `load()` builds an instance from its row, attaches the store as the
//! instance's [`FieldFetcher`] (external fields are then fetched on first
//! access) and fetches eager externals right away.
//!
//! Multi-valued scalar fields are stored as one comma-joined column.

use std::rc::Rc;

use crate::error::{ModelError, Result};
use crate::field::{FieldValue, Item};
use crate::model::{snake_case, External, FetchMode, FieldFetcher, Model, ModelHandle, ModelType, Schema};
use crate::ordering::OrderedSet;
use crate::store::{Query, Row, RowId, RowStore, SortOrder};
use crate::value::Value;

/// Fetches and stores the value of one external field.
pub trait ExternalHandler {
    /// Items for the field of a persisted owner.
    fn fetch(&self, store: &ModelStore, owner: &Model, external: &External) -> Result<Vec<Item>>;

    /// Persist the field's items after the owner row was written.
    fn store(
        &self,
        store: &ModelStore,
        owner_id: RowId,
        external: &External,
        value: &FieldValue,
    ) -> Result<()>;
}

/// Sub-models stored in their own table with a column pointing back at the
/// owner. The external's options are extra filters on fetch and extra
/// column values on store.
#[derive(Debug, Clone)]
pub struct ChildRows {
    pub foreign_key: String,
}

impl ChildRows {
    pub fn new(foreign_key: impl Into<String>) -> Self {
        Self {
            foreign_key: foreign_key.into(),
        }
    }
}

impl ExternalHandler for ChildRows {
    fn fetch(&self, store: &ModelStore, owner: &Model, external: &External) -> Result<Vec<Item>> {
        let Some(owner_id) = owner.id() else {
            return Ok(Vec::new());
        };
        let model = external.model.as_deref().ok_or_else(|| {
            ModelError::Schema(format!("external '{}' has no model type", external.field))
        })?;
        let mut filters = vec![(self.foreign_key.clone(), Value::from(owner_id as i64))];
        filters.extend(external.options.iter().cloned());
        Ok(store
            .select(model, &filters)?
            .into_iter()
            .map(Item::Model)
            .collect())
    }

    fn store(
        &self,
        store: &ModelStore,
        owner_id: RowId,
        external: &External,
        value: &FieldValue,
    ) -> Result<()> {
        let mut stamp = vec![(self.foreign_key.clone(), Value::from(owner_id as i64))];
        stamp.extend(external.options.iter().cloned());
        for item in value.items() {
            if let Some(child) = item.as_model() {
                store.store_with(child, &stamp)?;
            }
        }
        Ok(())
    }
}

/// Link models stored in a join table holding the owner id, the target id
/// and the link's own fields. Storing replaces the owner's link set.
#[derive(Debug, Clone)]
pub struct LinkRows {
    pub owner_key: String,
    pub target_key: String,
}

impl LinkRows {
    pub fn new(owner_key: impl Into<String>, target_key: impl Into<String>) -> Self {
        Self {
            owner_key: owner_key.into(),
            target_key: target_key.into(),
        }
    }

    fn link_type<'s>(&self, store: &'s ModelStore, external: &External) -> Result<&'s Rc<ModelType>> {
        let through = external.through.as_deref().ok_or_else(|| {
            ModelError::Schema(format!("external '{}' has no link type", external.field))
        })?;
        store.schema().model_type(through)
    }
}

impl ExternalHandler for LinkRows {
    fn fetch(&self, store: &ModelStore, owner: &Model, external: &External) -> Result<Vec<Item>> {
        let Some(owner_id) = owner.id() else {
            return Ok(Vec::new());
        };
        let link_type = self.link_type(store, external)?;
        let target_type = link_type.link_target_type().ok_or_else(|| {
            ModelError::Schema(format!("{} is not a link model", link_type.name()))
        })?;

        let mut query = Query::table(link_type.table_name()).filter(&self.owner_key, owner_id as i64);
        if let Some(order) = link_type.order() {
            query = query.order_by(snake_case(&order.field), SortOrder::Asc);
        }
        let mut items = Vec::new();
        for row in store.rows().select(&query)? {
            let target_id = row.int(&self.target_key).ok_or_else(|| {
                ModelError::Store(format!(
                    "link row in {} without {}",
                    link_type.table_name(),
                    self.target_key
                ))
            })?;
            let target = store.load(target_type, target_id as RowId)?;
            let link = store.model_from_row(link_type.name(), &row)?;
            link.borrow_mut().set_link_target(target)?;
            items.push(Item::Linked(link));
        }
        Ok(items)
    }

    fn store(
        &self,
        store: &ModelStore,
        owner_id: RowId,
        external: &External,
        value: &FieldValue,
    ) -> Result<()> {
        let link_type = self.link_type(store, external)?;
        let table = link_type.table_name();
        let mut kept = Vec::new();

        for item in value.items() {
            let Item::Linked(link) = item else {
                continue;
            };
            let target = link.link_target().ok_or_else(|| {
                ModelError::Argument(format!("link in '{}' has no target", external.field))
            })?;
            let target_id = store.store(&target)?;
            let stamp = vec![
                (self.owner_key.clone(), Value::from(owner_id as i64)),
                (self.target_key.clone(), Value::from(target_id as i64)),
            ];
            kept.push(store.store_with(link, &stamp)?);
        }

        let existing = store
            .rows()
            .select(&Query::table(&table).filter(&self.owner_key, owner_id as i64))?;
        for stale in existing.iter().filter_map(|r| r.id).filter(|id| !kept.contains(id)) {
            tracing::debug!(table = %table, id = stale, "Removing stale link row");
            store.rows().delete_row(&table, stale)?;
        }
        Ok(())
    }
}

struct Inner {
    rows: Rc<dyn RowStore>,
    schema: Rc<Schema>,
}

/// Loads, stores and deletes models against a row store.
#[derive(Clone)]
pub struct ModelStore {
    inner: Rc<Inner>,
}

impl ModelStore {
    pub fn new(rows: Rc<dyn RowStore>, schema: Rc<Schema>) -> Self {
        Self {
            inner: Rc::new(Inner { rows, schema }),
        }
    }

    pub fn rows(&self) -> &dyn RowStore {
        self.inner.rows.as_ref()
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.inner.schema
    }

    /// Ordered set of a position-ordered type, scoped to `row` if the type
    /// declares a scope.
    pub fn ordered_set(&self, ty: &ModelType, row: Option<&Row>) -> Option<OrderedSet<'_>> {
        let order = ty.order()?;
        let mut set = OrderedSet::new(self.rows(), ty.table_name()).column(snake_case(&order.field));
        if let Some(scope) = &order.scope {
            let column = snake_case(scope);
            if let Some(value) = row.and_then(|r| r.get(&column)) {
                set = set.scope(column, value.clone());
            }
        }
        Some(set)
    }

    pub fn load(&self, type_name: &str, id: RowId) -> Result<ModelHandle> {
        let ty = self.schema().model_type(type_name)?;
        let row = self
            .rows()
            .read_row(&ty.table_name(), id)?
            .ok_or_else(|| ModelError::RowNotFound {
                table: ty.table_name(),
                id,
            })?;
        self.model_from_row(type_name, &row)
    }

    /// Models of a type matching column filters, in position order for
    /// ordered types and id order otherwise.
    pub fn select(&self, type_name: &str, filters: &[(String, Value)]) -> Result<Vec<ModelHandle>> {
        let ty = self.schema().model_type(type_name)?;
        let mut query = Query::table(ty.table_name()).filter_all(filters);
        if let Some(order) = ty.order() {
            query = query.order_by(snake_case(&order.field), SortOrder::Asc);
        }
        self.rows()
            .select(&query)?
            .iter()
            .map(|row| self.model_from_row(type_name, row))
            .collect()
    }

    /// First model whose field equals `value`.
    pub fn find_by(&self, type_name: &str, field: &str, value: impl Into<Value>) -> Result<Option<ModelHandle>> {
        let filters = [(snake_case(field), value.into())];
        Ok(self.select(type_name, &filters)?.into_iter().next())
    }

    pub fn model_from_row(&self, type_name: &str, row: &Row) -> Result<ModelHandle> {
        let mut model = self.schema().create(type_name)?;
        let ty = model.model_type().clone();
        for plugin in ty.plugins() {
            plugin.pre_fetch(self, &mut model)?;
        }
        model.set_id(row.id);

        let internal: Vec<_> = model
            .fields()
            .iter()
            .filter(|f| !ty.is_external(f.name()) && f.value_model_type().is_none())
            .map(|f| (f.name().to_string(), f.value_kind(), f.is_multiple()))
            .collect();
        for (name, kind, multiple) in internal {
            let Some(stored) = row.get(&snake_case(&name)) else {
                continue;
            };
            let value = if multiple {
                let rendered = stored.render();
                let items = rendered
                    .split(',')
                    .filter(|part| !part.is_empty())
                    .map(|part| kind.parse(part).map(Item::Value))
                    .collect::<Result<Vec<_>>>()?;
                FieldValue::Many(items)
            } else if stored.is_empty() {
                continue;
            } else if stored.kind() == kind {
                FieldValue::One(Item::Value(stored.clone()))
            } else {
                FieldValue::One(Item::Value(kind.parse(&stored.render())?))
            };
            model.load_field(&name, value)?;
        }

        model.attach_fetcher(Rc::new(self.clone()));
        let eager: Vec<String> = ty
            .externals()
            .iter()
            .filter(|e| e.fetch == FetchMode::Eager)
            .map(|e| e.field.clone())
            .collect();
        for name in eager {
            model.get(&name)?;
        }
        model.mark_clean();

        tracing::trace!(model = type_name, id = ?row.id, "Model loaded");
        Ok(ModelHandle::new(model))
    }

    /// Own row of a model: every internal scalar field, empty ones as empty
    /// text.
    fn row_of(&self, model: &Model) -> Row {
        let ty = model.model_type();
        let mut row = Row {
            id: model.id(),
            ..Row::default()
        };
        for field in model.fields() {
            if ty.is_external(field.name()) || field.value_model_type().is_some() {
                continue;
            }
            let value = match field.value() {
                FieldValue::Empty => Value::from(""),
                FieldValue::One(Item::Value(v)) => v.clone(),
                FieldValue::Many(items) => Value::Text(
                    items
                        .iter()
                        .filter_map(Item::as_value)
                        .map(Value::render)
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                FieldValue::One(_) => continue,
            };
            row.set(snake_case(field.name()), value);
        }
        row
    }

    pub fn store(&self, handle: &ModelHandle) -> Result<RowId> {
        self.store_with(handle, &[])
    }

    /// Store a model with extra column values. Extra columns that belong to
    /// one of the model's fields are copied into that field as well.
    pub fn store_with(&self, handle: &ModelHandle, extra: &[(String, Value)]) -> Result<RowId> {
        let ty = handle.borrow().model_type().clone();

        {
            let mut model = handle.borrow_mut();
            for (column, value) in extra {
                let field = model
                    .fields()
                    .iter()
                    .find(|f| snake_case(f.name()) == *column)
                    .map(|f| f.name().to_string());
                if let Some(name) = field {
                    model.set(&name, value.clone())?;
                }
            }
            for plugin in ty.plugins() {
                tracing::trace!(model = ty.name(), plugin = plugin.name(), "pre_store");
                plugin.pre_store(self, &mut model)?;
            }
        }

        let id = {
            let model = handle.borrow();
            let mut row = self.row_of(&model);
            for (column, value) in extra {
                row.set(column.clone(), value.clone());
            }
            drop(model);
            self.write_own_row(handle, &ty, row)?
        };

        {
            let mut model = handle.borrow_mut();
            model.set_id(Some(id));
            for plugin in ty.plugins() {
                plugin.post_store_internal(self, &mut model)?;
            }
        }

        for external in ty.externals() {
            let Some(handler) = &external.handler else {
                continue;
            };
            let value = {
                let model = handle.borrow();
                if model.is_pending(&external.field) {
                    continue;
                }
                model.field(&external.field)?.value().clone()
            };
            handler.store(self, id, external, &value)?;
        }

        let mut model = handle.borrow_mut();
        for plugin in ty.plugins() {
            plugin.post_store_external(self, &mut model)?;
        }
        for plugin in ty.plugins() {
            plugin.post_store(self, &mut model)?;
        }
        model.mark_clean();

        tracing::debug!(model = ty.name(), id, "Model stored");
        Ok(id)
    }

    fn write_own_row(&self, handle: &ModelHandle, ty: &ModelType, row: Row) -> Result<RowId> {
        let Some(set) = self.ordered_set(ty, Some(&row)) else {
            return self.rows().write_row(&ty.table_name(), &row);
        };
        let order = ty.order().map(|o| o.field.clone()).unwrap_or_default();
        let target = {
            let model = handle.borrow();
            let field = model.field(&order)?;
            match field.value().as_value() {
                Some(v) if field.is_modified() || model.is_new_record() => v.as_int(),
                _ => None,
            }
        };
        let mut row = row;
        row.columns.remove(&snake_case(&order));
        let placed = set.place(row, target)?;
        handle
            .borrow_mut()
            .load_field(&order, FieldValue::from(placed.position))?;
        Ok(placed.id)
    }

    /// Delete a persisted model's row. Position-ordered sets are renumbered
    /// afterwards.
    pub fn delete(&self, handle: &ModelHandle) -> Result<()> {
        let ty = handle.borrow().model_type().clone();
        let id = handle.id().ok_or_else(|| {
            ModelError::Argument(format!("cannot delete unsaved {}", ty.name()))
        })?;
        {
            let mut model = handle.borrow_mut();
            for plugin in ty.plugins() {
                plugin.pre_delete(self, &mut model)?;
            }
        }

        let row = self.rows().read_row(&ty.table_name(), id)?;
        if !self.rows().delete_row(&ty.table_name(), id)? {
            return Err(ModelError::RowNotFound {
                table: ty.table_name(),
                id,
            });
        }
        if let Some(set) = self.ordered_set(&ty, row.as_ref()) {
            set.fix_positions()?;
        }
        handle.borrow_mut().set_id(None);

        for plugin in ty.plugins() {
            tracing::trace!(model = ty.name(), plugin = plugin.name(), "post_delete");
            plugin.post_delete(self, id)?;
        }
        tracing::debug!(model = ty.name(), id, "Model deleted");
        Ok(())
    }
}

impl FieldFetcher for ModelStore {
    fn fetch(&self, model: &Model, field: &str) -> Result<FieldValue> {
        let ty = model.model_type();
        let Some(external) = ty.external_for(field) else {
            return Ok(FieldValue::Empty);
        };
        let Some(handler) = &external.handler else {
            return Ok(FieldValue::Empty);
        };
        let mut items = handler.fetch(self, model, external)?;
        if model.field(field)?.is_multiple() {
            return Ok(FieldValue::Many(items));
        }
        if items.len() > 1 {
            tracing::warn!(
                model = ty.name(),
                field,
                found = items.len(),
                "Single-valued external fetched several rows; keeping the first"
            );
        }
        Ok(if items.is_empty() {
            FieldValue::Empty
        } else {
            FieldValue::One(items.swap_remove(0))
        })
    }
}
