//! # Document Mapping
//!
//! Maps model graphs to XML documents and back.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <Opus version="2.0" xmlns:xlink="http://www.w3.org/1999/xlink">
//!   <Document Type="article" Keywords="a,b">
//!     <Files PathName="a.pdf"/>
//!     <PersonAuthor xlink:type="simple" xlink:href="http://x/person/42" Role="author"/>
//!   </Document>
//! </Opus>
//! ```
//!
//! ## Serializing
//!
//! Every visible field not excluded by the [`MappingConfig`] is written.
//! Scalar fields become attributes of the owning element (multi-valued ones
//! comma-joined, which loses values that themselves contain commas). Model
//! values become child elements named after the field. A persisted model
//! whose type has a resource name is written as an `xlink:href` reference
//! instead of being inlined; for a link only the link's own fields are kept
//! next to the reference.
//!
//! ## Deserializing
//!
//! The root must be `root_element`; its first child names the model type.
//! References are handed to the [`ReferenceResolver`] and the result is used
//! as is. Constructor rules pull named children (or attributes) out of an
//! element before the remaining attributes and children are assigned by
//! name: `add` for multi-valued fields, `set` otherwise. An element with no
//! attributes, children or text assigns nothing. Names missing from
//! `describe()` fail with `UnknownField`.

mod config;
mod deserialize;
mod element;
mod resolver;
mod serialize;

pub use config::MappingConfig;
pub use deserialize::Deserializer;
pub use element::Element;
pub use resolver::{ReferenceResolver, StoreResolver};
pub use serialize::Serializer;

use std::rc::Rc;

use crate::error::Result;
use crate::model::{ModelHandle, Schema};

pub const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Serialize a model graph to a document string.
pub fn to_xml(model: &ModelHandle, config: &MappingConfig) -> Result<String> {
    Serializer::new(config).to_xml(model)
}

/// Build a model graph from a document string.
pub fn from_xml(
    schema: Rc<Schema>,
    config: &MappingConfig,
    resolver: Option<&dyn ReferenceResolver>,
    xml: &str,
) -> Result<ModelHandle> {
    let mut deserializer = Deserializer::new(schema, config);
    if let Some(resolver) = resolver {
        deserializer = deserializer.with_resolver(resolver);
    }
    deserializer.from_xml(xml)
}
