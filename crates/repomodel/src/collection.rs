//! # Collection Roles
//!
//! A collection role is a named classification scheme (for example DDC or
//! institutes) with one tree of [`Collection`](collection_type) nodes.
//! Roles form a position-ordered set; every store keeps their positions
//! dense.
//!
//! The role's root node is the external field `RootCollection`: the
//! collection row with the role's id and the position key `Root`. In
//! `to_tree()` the root is summarized as the `{Id, Name}` pairs of its
//! children instead of being expanded.

use std::rc::Rc;

use crate::error::{ModelError, Result};
use crate::field::{Field, FieldValue, Item, NotEmpty, OneOf, Trim};
use crate::model::{External, Model, ModelHandle, ModelType, Plugin, Schema};
use crate::ordering::OrderedSet;
use crate::persist::{ChildRows, ModelStore};
use crate::store::{Query, Row, RowId};
use crate::value::{Value, ValueKind};

pub const ROLE_TYPE: &str = "CollectionRole";
pub const COLLECTION_TYPE: &str = "Collection";
pub const ROLES_TABLE: &str = "collections_roles";
pub const COLLECTIONS_TABLE: &str = "collections";

/// Position key marking a role's root node.
pub const ROOT_KEY: &str = "Root";

const DISPLAY_FORMATS: [&str; 4] = ["Name", "Number", "Name, Number", "Number, Name"];

pub fn collection_role_type() -> ModelType {
    ModelType::new(ROLE_TYPE)
        .table(ROLES_TABLE)
        .field(Field::new("Name").mandatory().validator(NotEmpty).filter(Trim))
        .field(Field::new("OaiName").mandatory().validator(NotEmpty).filter(Trim))
        .field(Field::new("Position").kind(ValueKind::Int))
        .field(Field::new("Visible").checkbox())
        .field(Field::new("VisibleBrowsingStart").checkbox())
        .field(Field::new("VisibleFrontdoor").checkbox())
        .field(Field::new("VisibleOai").checkbox())
        .field(Field::new("DisplayBrowsing").validator(OneOf::new(DISPLAY_FORMATS)))
        .field(Field::new("DisplayFrontdoor").validator(OneOf::new(DISPLAY_FORMATS)))
        .field(Field::new("IsClassification").kind(ValueKind::Bool))
        .field(Field::new("AssignRoot").kind(ValueKind::Bool))
        .field(Field::new("AssignLeavesOnly").kind(ValueKind::Bool))
        .field(Field::new("RootCollection"))
        .field(Field::new("HideEmptyCollections").checkbox())
        .field(Field::new("Language"))
        .external(
            External::new("RootCollection")
                .model(COLLECTION_TYPE)
                .option("position_key", ROOT_KEY)
                .handler(ChildRows::new("role_id")),
        )
        .ordered_by("Position", None)
        .display_field("Name")
        .summary("RootCollection", summarize_root)
        .plugin(DeleteTree)
}

pub fn collection_type() -> ModelType {
    ModelType::new(COLLECTION_TYPE)
        .table(COLLECTIONS_TABLE)
        .field(Field::new("Name"))
        .field(Field::new("Number"))
        .field(Field::new("OaiSubset"))
        .field(Field::new("Visible").checkbox())
        .field(Field::new("RoleId").kind(ValueKind::Int))
        .field(Field::new("ParentId").kind(ValueKind::Int))
        .field(Field::new("PositionKey"))
        .field(Field::new("Children").multiple())
        .hidden("PositionKey")
        .external(
            External::new("Children")
                .model(COLLECTION_TYPE)
                .handler(ChildRows::new("parent_id")),
        )
        .display_field("Name")
        .plugin(InheritRole)
}

/// Schema holding just the collection types.
pub fn schema() -> Result<Rc<Schema>> {
    Schema::builder()
        .model(collection_role_type())
        .model(collection_type())
        .build()
}

fn summarize_root(value: &FieldValue) -> Result<serde_json::Value> {
    let Some(root) = value.as_model() else {
        return Ok(serde_json::Value::Null);
    };
    let children = root.get("Children")?;
    let mut summary = Vec::new();
    for child in children.items().iter().filter_map(Item::as_model) {
        let name = child.get("Name")?.as_value().map(Value::render);
        summary.push(serde_json::json!({ "Id": child.id(), "Name": name }));
    }
    Ok(serde_json::Value::Array(summary))
}

/// Removes a deleted role's collection tree.
struct DeleteTree;

impl Plugin for DeleteTree {
    fn name(&self) -> &str {
        "delete-tree"
    }

    fn post_delete(&self, store: &ModelStore, id: RowId) -> Result<()> {
        let rows = store
            .rows()
            .select(&Query::table(COLLECTIONS_TABLE).filter("role_id", id as i64))?;
        for row_id in rows.iter().filter_map(|r| r.id) {
            store.rows().delete_row(COLLECTIONS_TABLE, row_id)?;
        }
        tracing::info!(role = id, removed = rows.len(), "Collection tree deleted");
        Ok(())
    }
}

/// Children without a role take their parent's.
struct InheritRole;

impl Plugin for InheritRole {
    fn name(&self) -> &str {
        "inherit-role"
    }

    fn pre_store(&self, _store: &ModelStore, model: &mut Model) -> Result<()> {
        if model.is_pending("Children") {
            return Ok(());
        }
        let role = model.get("RoleId")?;
        if role.is_empty() {
            return Ok(());
        }
        for child in model.get("Children")?.items().iter().filter_map(Item::as_model) {
            if child.get("RoleId")?.is_empty() {
                child.set("RoleId", role.clone())?;
            }
        }
        Ok(())
    }
}

/// Queries over the collection roles of a model store.
pub struct CollectionRoles {
    store: ModelStore,
}

impl CollectionRoles {
    pub fn new(store: ModelStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    /// A new, unsaved role.
    pub fn create(&self) -> Result<ModelHandle> {
        self.store.schema().instantiate(ROLE_TYPE)
    }

    /// Role with the given name. No name, or no match, gives `None`.
    pub fn fetch_by_name(&self, name: Option<&str>) -> Result<Option<ModelHandle>> {
        match name {
            Some(name) => self.store.find_by(ROLE_TYPE, "Name", name),
            None => Ok(None),
        }
    }

    pub fn fetch_by_oai_name(&self, oai_name: Option<&str>) -> Result<Option<ModelHandle>> {
        match oai_name {
            Some(oai_name) => self.store.find_by(ROLE_TYPE, "OaiName", oai_name),
            None => Ok(None),
        }
    }

    /// All roles by position.
    pub fn fetch_all(&self) -> Result<Vec<ModelHandle>> {
        self.store.select(ROLE_TYPE, &[])
    }

    /// Roles visible to OAI harvesting, by position: visible, OAI-visible,
    /// with an OAI name, and with a collection that is a tree root or a
    /// visible node carrying an OAI subset.
    pub fn fetch_all_oai_enabled(&self) -> Result<Vec<ModelHandle>> {
        let filters = [
            ("visible".to_string(), Value::Bool(true)),
            ("visible_oai".to_string(), Value::Bool(true)),
        ];
        let mut enabled = Vec::new();
        for role in self.store.select(ROLE_TYPE, &filters)? {
            let named = role
                .get("OaiName")?
                .as_value()
                .is_some_and(|v| !v.is_empty());
            if named && self.has_oai_collection(role.id())? {
                enabled.push(role);
            }
        }
        Ok(enabled)
    }

    fn has_oai_collection(&self, role_id: Option<RowId>) -> Result<bool> {
        let Some(role_id) = role_id else {
            return Ok(false);
        };
        let rows = self
            .store
            .rows()
            .select(&Query::table(COLLECTIONS_TABLE).filter("role_id", role_id as i64))?;
        let filled = |row: &Row, column: &str| row.get(column).is_some_and(|v| !v.is_empty());
        Ok(rows.iter().any(|row| {
            !filled(row, "parent_id")
                || (row.get("visible").and_then(Value::as_bool) == Some(true)
                    && filled(row, "oai_subset"))
        }))
    }

    fn ordered_set(&self) -> OrderedSet<'_> {
        OrderedSet::new(self.store.rows(), ROLES_TABLE)
    }

    pub fn last_position(&self) -> Result<i64> {
        self.ordered_set().last_position()
    }

    /// Renumber role positions to 1..N.
    pub fn fix_positions(&self) -> Result<usize> {
        self.ordered_set().fix_positions()
    }

    /// Give `role` a root collection and return it: `collection` when given,
    /// a new node otherwise. A new node under a persisted role gets the
    /// role's id and the root key right away.
    pub fn add_root_collection(
        &self,
        role: &ModelHandle,
        collection: Option<ModelHandle>,
    ) -> Result<ModelHandle> {
        let root = match collection {
            Some(collection) => match role.add("RootCollection", collection)? {
                Item::Model(m) | Item::Linked(m) => m,
                Item::Value(_) => {
                    return Err(ModelError::Argument(
                        "root collection must be a model".to_string(),
                    ))
                }
            },
            None => role.add_new("RootCollection")?,
        };
        if let Some(role_id) = role.id() {
            if root.borrow().is_new_record() {
                root.set("PositionKey", ROOT_KEY)?;
                root.set("RoleId", role_id as i64)?;
            }
        }
        Ok(root)
    }
}
