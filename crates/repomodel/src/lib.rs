//! # Repomodel
//!
//! Reflective domain models for a digital repository. Model types are
//! declared at runtime as named fields; instances are read and written
//! through one field-name keyed accessor, mapped to and from XML documents,
//! and persisted through a row store that keeps position-ordered sets dense.
//!
//! ## Layers
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Document mapping (document/)                                │
//! │  - Model graph <-> XML, references via xlink:href            │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Field registry (model/, field.rs, value.rs)                 │
//! │  - Schema of model types, instances, links, validation       │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Persistence (persist.rs, ordering.rs)                       │
//! │  - Model store, plugins, external field handlers             │
//! │  - Dense position ordering                                   │
//! └──────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Row storage (store/)                                        │
//! │  - RowStore trait, MemRowStore (tests), JsonFileStore        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`collection`] builds the collection role types on top of all of it.
//!
//! ## Example
//!
//! ```
//! use std::rc::Rc;
//! use repomodel::{Field, FieldValue, MemRowStore, ModelStore, ModelType, Schema};
//!
//! let schema = Schema::builder()
//!     .model(ModelType::new("Person").field(Field::new("LastName").mandatory()))
//!     .build()
//!     .unwrap();
//! let store = ModelStore::new(Rc::new(MemRowStore::new()), schema.clone());
//!
//! let person = schema.instantiate("Person").unwrap();
//! person.set("LastName", "Doe").unwrap();
//! let id = store.store(&person).unwrap();
//!
//! let loaded = store.load("Person", id).unwrap();
//! assert_eq!(loaded.get("LastName").unwrap(), FieldValue::from("Doe"));
//! ```
//!
//! Everything is single-threaded: instances are shared as [`ModelHandle`]s
//! (`Rc<RefCell<_>>`) and row stores use interior mutability.

pub mod collection;
pub mod document;
pub mod error;
pub mod field;
pub mod model;
pub mod ordering;
pub mod persist;
pub mod store;
pub mod value;

pub use collection::CollectionRoles;
pub use document::{
    Deserializer, Element, MappingConfig, ReferenceResolver, Serializer, StoreResolver,
};
pub use error::{ModelError, Result};
pub use field::{Field, FieldValue, Filter, Item, NotEmpty, OneOf, Trim, Validator};
pub use model::{
    Accessor, External, FetchMode, FieldFetcher, Model, ModelHandle, ModelType, Plugin, Schema,
};
pub use ordering::{OrderedSet, Placement};
pub use persist::{ChildRows, ExternalHandler, LinkRows, ModelStore};
pub use store::{Batch, JsonFileStore, MemRowStore, Query, Row, RowId, RowStore, SortOrder};
pub use value::{DocDate, Value, ValueKind};
