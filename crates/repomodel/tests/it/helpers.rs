use std::rc::Rc;

use repomodel::{
    ChildRows, External, Field, LinkRows, MappingConfig, MemRowStore, ModelHandle, ModelStore,
    ModelType, NotEmpty, Row, RowStore, Schema, Trim, ValueKind,
};

pub const BASE_URI: &str = "http://repo.example/api";

pub fn person_type() -> ModelType {
    ModelType::new("Person")
        .table("persons")
        .field(Field::new("LastName").mandatory().filter(Trim))
        .field(Field::new("FirstName"))
        .field(Field::new("DateOfBirth").kind(ValueKind::Date))
        .display_field("LastName")
}

pub fn document_types() -> Vec<ModelType> {
    vec![
        ModelType::new("DocumentPerson")
            .table("link_persons_documents")
            .field(Field::new("Role"))
            .field(Field::new("SortOrder").kind(ValueKind::Int))
            .link_to("Person"),
        ModelType::new("File")
            .table("document_files")
            .field(Field::new("PathName").validator(NotEmpty))
            .field(Field::new("Label")),
        ModelType::new("Document")
            .table("documents")
            .field(Field::new("Type"))
            .field(Field::new("Keywords").multiple())
            .field(Field::new("ServerState"))
            .field(Field::new("CompletedDate").kind(ValueKind::Date))
            .field(Field::new("Files").multiple())
            .field(Field::new("PersonAuthor").multiple())
            .field(Field::new("Editor").value_model("Person"))
            .external(
                External::new("Files")
                    .model("File")
                    .handler(ChildRows::new("document_id")),
            )
            .external(
                External::new("PersonAuthor")
                    .through("DocumentPerson")
                    .handler(LinkRows::new("document_id", "person_id")),
            ),
    ]
}

pub fn schema_with(person: ModelType) -> Rc<Schema> {
    document_types()
        .into_iter()
        .fold(Schema::builder().model(person), |builder, ty| builder.model(ty))
        .build()
        .unwrap()
}

pub fn schema() -> Rc<Schema> {
    schema_with(person_type())
}

pub fn store() -> ModelStore {
    ModelStore::new(Rc::new(MemRowStore::new()), schema())
}

pub fn config() -> MappingConfig {
    MappingConfig::default()
        .with_base_uri(BASE_URI)
        .with_resource("Person", "person")
}

/// A person persisted under a fixed id.
pub fn seeded_person(store: &ModelStore, id: u64, last_name: &str) -> ModelHandle {
    store
        .rows()
        .write_row("persons", &Row::with_id(id).with("last_name", last_name))
        .unwrap();
    store.load("Person", id).unwrap()
}

pub fn text(model: &ModelHandle, field: &str) -> Option<String> {
    model.get(field).unwrap().as_value().map(|v| v.render())
}
