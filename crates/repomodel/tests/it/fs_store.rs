use std::fs;
use std::rc::Rc;

use repomodel::collection;
use repomodel::{
    Batch, CollectionRoles, FieldValue, JsonFileStore, ModelError, ModelStore, Query, Row,
    RowStore,
};
use tempfile::TempDir;

fn no_leftover_tmp_files(dir: &TempDir) {
    for entry in fs::read_dir(dir.path()).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_str().unwrap().to_string();
        assert!(!name.ends_with(".tmp"), "Found leftover tmp file: {}", name);
    }
}

#[test]
fn test_fs_store_basic_row_io() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path());

    // 1. Write
    let id = store
        .write_row("persons", &Row::new().with("last_name", "Doe"))
        .unwrap();

    // 2. Read
    let row = store.read_row("persons", id).unwrap().unwrap();
    assert_eq!(row.get("last_name").map(|v| v.render()), Some("Doe".to_string()));

    // 3. Delete
    assert!(store.delete_row("persons", id).unwrap());
    assert!(store.read_row("persons", id).unwrap().is_none());
    assert!(!store.delete_row("persons", id).unwrap());
}

#[test]
fn test_fs_store_atomic_write_artifacts() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path());
    store
        .write_row("persons", &Row::new().with("last_name", "Doe"))
        .unwrap();

    assert!(store.path().exists());
    let on_disk = fs::read_to_string(store.path()).unwrap();
    assert!(on_disk.contains("Doe"));
    no_leftover_tmp_files(&dir);
}

#[test]
fn test_fs_store_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path().join("nested")).with_file_name("rows.json");
    assert!(store.read_row("persons", 1).unwrap().is_none());
    assert!(store.select(&Query::table("persons")).unwrap().is_empty());
    assert!(!store.path().exists());
}

#[test]
fn test_fs_store_corrupt_file_is_a_serialization_error() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path());
    fs::write(store.path(), "{ not json").unwrap();
    assert!(matches!(
        store.read_row("persons", 1),
        Err(ModelError::Serialization(_))
    ));
}

#[test]
fn test_fs_store_failed_batch_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let store = JsonFileStore::new(dir.path());
    let id = store
        .write_row("persons", &Row::new().with("last_name", "Doe"))
        .unwrap();
    let before = fs::read_to_string(store.path()).unwrap();

    let mut batch = Batch::new();
    batch.update("persons", Row::with_id(id).with("last_name", "Roe"));
    batch.delete("persons", id + 1);
    assert!(matches!(
        store.apply_batch(&batch),
        Err(ModelError::RowNotFound { .. })
    ));
    assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    no_leftover_tmp_files(&dir);
}

#[test]
fn test_roles_persist_across_store_instances() {
    let dir = TempDir::new().unwrap();
    let open = || {
        let schema = collection::schema().unwrap();
        CollectionRoles::new(ModelStore::new(Rc::new(JsonFileStore::new(dir.path())), schema))
    };

    {
        let roles = open();
        for name in ["DDC", "Institutes"] {
            let role = roles.create().unwrap();
            role.set("Name", name).unwrap();
            role.set("OaiName", name.to_lowercase()).unwrap();
            roles.store().store(&role).unwrap();
        }
        let role = roles.fetch_by_name(Some("DDC")).unwrap().unwrap();
        roles.add_root_collection(&role, None).unwrap().set("Name", "root").unwrap();
        roles.store().store(&role).unwrap();
    }

    let roles = open();
    let all = roles.fetch_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].get("OaiName").unwrap(), FieldValue::from("institutes"));
    let root = all[0].get("RootCollection").unwrap();
    assert_eq!(
        root.as_model().unwrap().get("Name").unwrap(),
        FieldValue::from("root")
    );
    no_leftover_tmp_files(&dir);
}
