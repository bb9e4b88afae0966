use std::rc::Rc;

use repomodel::collection::{self, COLLECTIONS_TABLE, ROOT_KEY};
use repomodel::{
    CollectionRoles, FieldValue, MemRowStore, ModelHandle, ModelStore, Query, Row, RowStore,
};

fn roles() -> CollectionRoles {
    let schema = collection::schema().unwrap();
    CollectionRoles::new(ModelStore::new(Rc::new(MemRowStore::new()), schema))
}

fn stored_role(roles: &CollectionRoles, name: &str) -> ModelHandle {
    let role = roles.create().unwrap();
    role.set("Name", format!("  {}  ", name)).unwrap();
    role.set("OaiName", name.to_lowercase()).unwrap();
    roles.store().store(&role).unwrap();
    role
}

fn names(roles: &CollectionRoles) -> Vec<String> {
    roles
        .fetch_all()
        .unwrap()
        .iter()
        .map(|r| r.get("Name").unwrap().as_value().unwrap().render())
        .collect()
}

#[test]
fn test_names_are_trimmed_on_set() {
    let roles = roles();
    let role = stored_role(&roles, "DDC");
    assert_eq!(role.get("Name").unwrap(), FieldValue::from("DDC"));
    assert!(roles.fetch_by_name(Some("DDC")).unwrap().is_some());
}

#[test]
fn test_root_collection_lifecycle() {
    let roles = roles();
    let role = stored_role(&roles, "DDC");
    let role_id = role.id().unwrap() as i64;

    let root = roles.add_root_collection(&role, None).unwrap();
    assert_eq!(root.get("RoleId").unwrap(), FieldValue::from(role_id));
    root.set("Name", "root").unwrap();
    root.add_new("Children").unwrap().set("Name", "000").unwrap();
    root.add_new("Children").unwrap().set("Name", "100").unwrap();
    roles.store().store(&role).unwrap();
    assert!(root.id().is_some());

    let loaded = roles.fetch_by_name(Some("DDC")).unwrap().unwrap();
    assert!(loaded.borrow().is_pending("RootCollection"));
    let fetched = loaded.get("RootCollection").unwrap();
    let fetched = fetched.as_model().unwrap();
    assert_eq!(fetched.id(), root.id());
    assert_eq!(fetched.get("PositionKey").unwrap(), FieldValue::from(ROOT_KEY));

    let root_id = fetched.id().unwrap() as i64;
    let children = fetched.get("Children").unwrap();
    assert_eq!(children.len(), 2);
    for child in children.items().iter().filter_map(|i| i.as_model()) {
        assert_eq!(child.get("RoleId").unwrap(), FieldValue::from(role_id));
        assert_eq!(child.get("ParentId").unwrap(), FieldValue::from(root_id));
    }
}

#[test]
fn test_tree_summarizes_root_children() {
    let roles = roles();
    let role = stored_role(&roles, "DDC");
    let root = roles.add_root_collection(&role, None).unwrap();
    root.add_new("Children").unwrap().set("Name", "000").unwrap();
    roles.store().store(&role).unwrap();

    let loaded = roles.fetch_by_name(Some("DDC")).unwrap().unwrap();
    let tree = loaded.to_tree().unwrap();
    assert_eq!(tree["Name"], serde_json::json!("DDC"));
    assert_eq!(tree["Position"], serde_json::json!(1));
    let summary = tree["RootCollection"].as_array().unwrap();
    assert_eq!(summary.len(), 1);
    assert_eq!(summary[0]["Name"], serde_json::json!("000"));
    assert!(summary[0]["Id"].is_u64());
}

#[test]
fn test_role_without_root_summarizes_to_null() {
    let roles = roles();
    let role = stored_role(&roles, "Institutes");
    let loaded = roles.fetch_by_name(Some("Institutes")).unwrap().unwrap();
    assert_eq!(loaded.to_tree().unwrap()["RootCollection"], serde_json::Value::Null);
    assert!(role.validate().is_ok());
}

#[test]
fn test_deleting_a_role_removes_its_tree() {
    let roles = roles();
    let role = stored_role(&roles, "DDC");
    let other = stored_role(&roles, "Institutes");
    let root = roles.add_root_collection(&role, None).unwrap();
    root.add_new("Children").unwrap().set("Name", "000").unwrap();
    roles.store().store(&role).unwrap();
    roles.add_root_collection(&other, None).unwrap();
    roles.store().store(&other).unwrap();

    let rows = roles.store().rows();
    assert_eq!(rows.select(&Query::table(COLLECTIONS_TABLE)).unwrap().len(), 3);

    roles.store().delete(&role).unwrap();
    let left = rows.select(&Query::table(COLLECTIONS_TABLE)).unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].int("role_id"), other.id().map(|id| id as i64));

    assert_eq!(names(&roles), vec!["Institutes"]);
    assert_eq!(roles.last_position().unwrap(), 1);
}

#[test]
fn test_moving_roles_keeps_positions_dense() {
    let roles = roles();
    for name in ["DDC", "Institutes", "Series", "Projects"] {
        stored_role(&roles, name);
    }

    let projects = roles.fetch_by_name(Some("Projects")).unwrap().unwrap();
    projects.set("Position", 2i64).unwrap();
    roles.store().store(&projects).unwrap();
    assert_eq!(names(&roles), vec!["DDC", "Projects", "Institutes", "Series"]);

    let ddc = roles.fetch_by_name(Some("DDC")).unwrap().unwrap();
    ddc.set("Position", 0i64).unwrap();
    roles.store().store(&ddc).unwrap();
    assert_eq!(ddc.get("Position").unwrap(), FieldValue::from(1i64));
    assert_eq!(names(&roles), vec!["DDC", "Projects", "Institutes", "Series"]);

    let series = roles.fetch_by_name(Some("Series")).unwrap().unwrap();
    series.set("Position", 1i64).unwrap();
    roles.store().store(&series).unwrap();
    assert_eq!(names(&roles), vec!["Series", "DDC", "Projects", "Institutes"]);
    assert_eq!(roles.fix_positions().unwrap(), 0);
}

#[test]
fn test_new_role_at_explicit_position() {
    let roles = roles();
    stored_role(&roles, "DDC");
    stored_role(&roles, "Institutes");

    let role = roles.create().unwrap();
    role.set("Name", "Series").unwrap();
    role.set("OaiName", "series").unwrap();
    role.set("Position", 1i64).unwrap();
    roles.store().store(&role).unwrap();
    assert_eq!(names(&roles), vec!["Series", "DDC", "Institutes"]);
}

fn oai_role(roles: &CollectionRoles, name: &str, oai_name: &str, visible: bool) -> ModelHandle {
    let role = roles.create().unwrap();
    role.set("Name", name).unwrap();
    if !oai_name.is_empty() {
        role.set("OaiName", oai_name).unwrap();
    }
    role.set("Visible", visible).unwrap();
    role.set("VisibleOai", true).unwrap();
    roles.store().store(&role).unwrap();
    role
}

fn with_root(roles: &CollectionRoles, role: &ModelHandle) {
    roles.add_root_collection(role, None).unwrap();
    roles.store().store(role).unwrap();
}

#[test]
fn test_oai_enabled_roles() {
    let roles = roles();
    stored_role(&roles, "Plain");
    let ddc = oai_role(&roles, "DDC", "ddc", true);
    with_root(&roles, &ddc);
    let hidden = oai_role(&roles, "Hidden", "hidden", false);
    with_root(&roles, &hidden);
    let unnamed = oai_role(&roles, "Unnamed", "", true);
    with_root(&roles, &unnamed);
    oai_role(&roles, "Empty", "empty", true);

    let enabled = roles.fetch_all_oai_enabled().unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id(), ddc.id());
}

#[test]
fn test_oai_enabled_needs_visible_subset_below_the_root() {
    let roles = roles();
    let role = oai_role(&roles, "Series", "series", true);
    let role_id = role.id().unwrap() as i64;
    let rows = roles.store().rows();
    let node = rows
        .write_row(
            COLLECTIONS_TABLE,
            &Row::new()
                .with("role_id", role_id)
                .with("parent_id", 99i64)
                .with("oai_subset", "series-a")
                .with("visible", false),
        )
        .unwrap();
    assert!(roles.fetch_all_oai_enabled().unwrap().is_empty());

    rows.write_row(COLLECTIONS_TABLE, &Row::with_id(node).with("visible", true))
        .unwrap();
    let enabled = roles.fetch_all_oai_enabled().unwrap();
    assert_eq!(enabled.len(), 1);
    assert_eq!(enabled[0].id(), role.id());

    rows.write_row(COLLECTIONS_TABLE, &Row::with_id(node).with("oai_subset", ""))
        .unwrap();
    assert!(roles.fetch_all_oai_enabled().unwrap().is_empty());
}
