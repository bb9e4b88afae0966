use std::collections::HashMap;

use repomodel::document::{from_xml, to_xml};
use repomodel::{
    DocDate, Deserializer, Element, FieldValue, Item, Model, ModelError, ModelHandle,
    StoreResolver,
};

use crate::helpers::{config, person_type, schema, schema_with, seeded_person, store, text, BASE_URI};

fn model_element(xml: &str) -> Element {
    Element::parse(xml).unwrap().children.remove(0)
}

fn sample_document() -> ModelHandle {
    let doc = schema().instantiate("Document").unwrap();
    doc.set("Type", "article").unwrap();
    doc.add("Keywords", "a").unwrap();
    doc.add("Keywords", "b").unwrap();
    doc.set("CompletedDate", "2024-05-01".parse::<DocDate>().unwrap())
        .unwrap();
    doc.add_new("Files").unwrap().set("PathName", "a.pdf").unwrap();
    let author = doc.add_new("PersonAuthor").unwrap();
    author.set("Role", "author").unwrap();
    author.set("LastName", "Doe").unwrap();
    doc
}

#[test]
fn test_document_shape() {
    let xml = to_xml(&sample_document(), &config()).unwrap();
    assert!(xml.starts_with("<?xml"));

    let root = Element::parse(&xml).unwrap();
    assert_eq!(root.name, "Opus");
    assert_eq!(root.attribute("version"), Some("2.0"));
    assert_eq!(
        root.attribute("xmlns:xlink"),
        Some("http://www.w3.org/1999/xlink")
    );

    let doc = &root.children[0];
    assert_eq!(doc.name, "Document");
    assert_eq!(doc.attribute("Type"), Some("article"));
    assert_eq!(doc.attribute("Keywords"), Some("a,b"));
    assert_eq!(doc.attribute("CompletedDate"), Some("2024-05-01"));
    assert!(doc.attribute("Editor").is_none());
    let editor = doc.child("Editor").unwrap();
    assert!(editor.attributes.is_empty());
    assert!(editor.children.is_empty());
    assert_eq!(doc.child("Files").unwrap().attribute("PathName"), Some("a.pdf"));

    let author = doc.child("PersonAuthor").unwrap();
    assert_eq!(author.attribute("Role"), Some("author"));
    assert_eq!(author.attribute("LastName"), Some("Doe"));
}

#[test]
fn test_inline_graph_round_trips() {
    let original = sample_document();
    let config = config();
    let xml = to_xml(&original, &config).unwrap();
    let copy = from_xml(schema(), &config, None, &xml).unwrap();

    assert_eq!(copy.type_name(), "Document");
    assert_eq!(text(&copy, "Type").as_deref(), Some("article"));
    assert_eq!(copy.get("Keywords").unwrap(), original.get("Keywords").unwrap());
    assert_eq!(
        copy.get("CompletedDate").unwrap(),
        original.get("CompletedDate").unwrap()
    );

    let files = copy.get("Files").unwrap();
    assert_eq!(files.len(), 1);
    let file = files.items()[0].as_model().unwrap();
    assert_eq!(text(file, "PathName").as_deref(), Some("a.pdf"));

    let authors = copy.get("PersonAuthor").unwrap();
    let Item::Linked(link) = &authors.items()[0] else {
        panic!("author was not stored as a link: {:?}", authors);
    };
    assert_eq!(text(link, "Role").as_deref(), Some("author"));
    assert_eq!(text(link, "LastName").as_deref(), Some("Doe"));
    assert_eq!(link.link_target().unwrap().type_name(), "Person");
}

#[test]
fn test_persisted_target_is_written_as_reference() {
    let store = store();
    let person = seeded_person(&store, 42, "Doe");
    let doc = store.schema().instantiate("Document").unwrap();
    let link = doc.add("PersonAuthor", person).unwrap();
    link.as_model().unwrap().set("Role", "author").unwrap();

    let xml = to_xml(&doc, &config()).unwrap();
    let element = model_element(&xml);
    let reference = element.child("PersonAuthor").unwrap();
    assert_eq!(reference.attribute("xlink:type"), Some("simple"));
    assert_eq!(
        reference.attribute("xlink:href"),
        Some(format!("{}/person/42", BASE_URI).as_str())
    );
    assert_eq!(reference.attribute("Role"), Some("author"));
    assert!(reference.attribute("LastName").is_none());
}

#[test]
fn test_reference_resolves_to_the_same_instance() {
    let store = store();
    let person = seeded_person(&store, 42, "Doe");
    let mut known = HashMap::new();
    known.insert(format!("{}/person/42", BASE_URI), person.clone());

    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Opus version="2.0" xmlns:xlink="http://www.w3.org/1999/xlink">
  <Document Type="article">
    <PersonAuthor xlink:type="simple" xlink:href="{}/person/42" Role="author"/>
  </Document>
</Opus>"#,
        BASE_URI
    );
    let doc = from_xml(store.schema().clone(), &config(), Some(&known), &xml).unwrap();

    let authors = doc.get("PersonAuthor").unwrap();
    assert_eq!(authors.len(), 1);
    let Item::Linked(link) = &authors.items()[0] else {
        panic!("expected a link, got {:?}", authors);
    };
    assert!(link.link_target().unwrap().ptr_eq(&person));
    assert_eq!(text(link, "Role").as_deref(), Some("author"));
}

#[test]
fn test_store_resolver_loads_references() {
    let store = store();
    seeded_person(&store, 42, "Doe");
    let config = config();
    let resolver = StoreResolver::new(&store, &config);

    let xml = format!(
        r#"<Opus><Document><Editor xlink:href="{}/person/42"/></Document></Opus>"#,
        BASE_URI
    );
    let doc = from_xml(store.schema().clone(), &config, Some(&resolver), &xml).unwrap();
    let editor = doc.get("Editor").unwrap();
    let editor = editor.as_model().unwrap();
    assert_eq!(editor.id(), Some(42));
    assert_eq!(text(editor, "LastName").as_deref(), Some("Doe"));

    let missing = xml.replace("/person/42", "/person/7");
    assert!(matches!(
        from_xml(store.schema().clone(), &config, Some(&resolver), &missing),
        Err(ModelError::ReferenceNotFound(address)) if address.ends_with("/person/7")
    ));
}

#[test]
fn test_unknown_attribute_fails() {
    let result = from_xml(
        schema(),
        &config(),
        None,
        r#"<Opus><Document Type="article" Bogus="x"/></Opus>"#,
    );
    assert!(matches!(
        result,
        Err(ModelError::UnknownField { model, field }) if model == "Document" && field == "Bogus"
    ));
}

#[test]
fn test_unknown_model_type_fails() {
    let result = from_xml(schema(), &config(), None, "<Opus><Thesis/></Opus>");
    assert!(matches!(result, Err(ModelError::UnknownModelType(name)) if name == "Thesis"));
}

#[test]
fn test_model_type_override_reads_any_element_name() {
    let config = config();
    let doc = Deserializer::new(schema(), &config)
        .with_model_type("Document")
        .from_xml(r#"<Opus><Thesis Type="thesis"><Keywords>x</Keywords></Thesis></Opus>"#)
        .unwrap();
    assert_eq!(doc.type_name(), "Document");
    assert_eq!(text(&doc, "Type").as_deref(), Some("thesis"));
    assert_eq!(doc.get("Keywords").unwrap().len(), 1);
}

#[test]
fn test_model_type_override_must_name_a_known_type() {
    let config = config();
    let result = Deserializer::new(schema(), &config)
        .with_model_type("Thesis")
        .from_xml("<Opus><Document/></Opus>");
    assert!(matches!(result, Err(ModelError::UnknownModelType(name)) if name == "Thesis"));
}

#[test]
fn test_empty_model_field_round_trips_as_empty_element() {
    let config = config();
    let xml = to_xml(&sample_document(), &config).unwrap();
    assert!(xml.contains("<Editor/>"));
    let copy = from_xml(schema(), &config, None, &xml).unwrap();
    assert_eq!(copy.get("Editor").unwrap(), FieldValue::Empty);
}

#[test]
fn test_wrong_root_element_fails() {
    let result = from_xml(schema(), &config(), None, "<Export><Document/></Export>");
    assert!(matches!(result, Err(ModelError::Document(_))));

    let renamed = config().with_root_element("Export");
    let doc = from_xml(schema(), &renamed, None, "<Export><Document/></Export>").unwrap();
    assert_eq!(doc.type_name(), "Document");
}

#[test]
fn test_empty_elements_assign_nothing() {
    let doc = from_xml(
        schema(),
        &config(),
        None,
        "<Opus><Document><Type/><Editor/><Files/></Document></Opus>",
    )
    .unwrap();
    assert_eq!(doc.get("Type").unwrap(), FieldValue::Empty);
    assert_eq!(doc.get("Editor").unwrap(), FieldValue::Empty);
    assert!(doc.get("Files").unwrap().is_empty());
}

#[test]
fn test_scalar_child_elements_are_accepted() {
    let doc = from_xml(
        schema(),
        &config(),
        None,
        "<Opus><Document Keywords=\"x,y\"><Type>article</Type><Keywords>a,b</Keywords></Document></Opus>",
    )
    .unwrap();
    assert_eq!(text(&doc, "Type").as_deref(), Some("article"));
    // attributes are split on commas, child element text is not
    let keywords: Vec<String> = doc
        .get("Keywords")
        .unwrap()
        .items()
        .iter()
        .filter_map(Item::as_value)
        .map(|v| v.render())
        .collect();
    assert_eq!(keywords, vec!["x", "y", "a,b"]);
}

#[test]
fn test_constructor_receives_rule_arguments() {
    let person = person_type().constructor(|model: &mut Model, args: &[Option<String>]| {
        let last = args.first().cloned().flatten().unwrap_or_default();
        model.set("LastName", last.to_uppercase())?;
        if matches!(args.get(1), Some(None)) {
            model.set("FirstName", "-")?;
        }
        Ok(())
    });
    let config = config().with_construction("Person", [Some("LastName"), None]);

    let doc = from_xml(
        schema_with(person),
        &config,
        None,
        r#"<Opus><Document>
             <Editor FirstName="x"><LastName>doe</LastName></Editor>
             <PersonAuthor Role="author" LastName="roe"/>
           </Document></Opus>"#,
    )
    .unwrap();

    let editor = doc.get("Editor").unwrap();
    let editor = editor.as_model().unwrap();
    assert_eq!(text(editor, "LastName").as_deref(), Some("DOE"));
    // remaining attributes are assigned after construction
    assert_eq!(text(editor, "FirstName").as_deref(), Some("x"));

    let authors = doc.get("PersonAuthor").unwrap();
    let link = authors.items()[0].as_model().unwrap();
    assert_eq!(text(link, "LastName").as_deref(), Some("ROE"));
    assert_eq!(text(link, "FirstName").as_deref(), Some("-"));
    assert_eq!(text(link, "Role").as_deref(), Some("author"));
}

#[test]
fn test_construction_without_constructor_sets_fields() {
    let config = config().with_construction("Person", [Some("LastName")]);
    let doc = from_xml(
        schema(),
        &config,
        None,
        "<Opus><Document><Editor><LastName>Doe</LastName></Editor></Document></Opus>",
    )
    .unwrap();
    let editor = doc.get("Editor").unwrap();
    assert_eq!(text(editor.as_model().unwrap(), "LastName").as_deref(), Some("Doe"));
}

#[test]
fn test_exclusion_rules() {
    let doc = schema().instantiate("Document").unwrap();
    doc.set("Type", "").unwrap();
    doc.set("ServerState", "published").unwrap();

    let config = config().exclude_field("ServerState");
    let element = model_element(&to_xml(&doc, &config).unwrap());
    assert!(element.attribute("ServerState").is_none());
    assert_eq!(element.attribute("Type"), Some(""));

    let config = config.with_exclude_empty(true);
    let element = model_element(&to_xml(&doc, &config).unwrap());
    assert!(element.attribute("Type").is_none());
    assert!(element.child("Editor").is_none());
}

#[test]
fn test_invalid_date_attribute_fails() {
    let result = from_xml(
        schema(),
        &config(),
        None,
        r#"<Opus><Document CompletedDate="01.05.2024"/></Opus>"#,
    );
    assert!(matches!(result, Err(ModelError::Argument(_))));
}
