use super::{Element, MappingConfig, XLINK_NS};
use crate::error::Result;
use crate::field::{FieldValue, Item};
use crate::model::ModelHandle;
use crate::value::Value;

/// Writes model graphs as documents.
pub struct Serializer<'a> {
    config: &'a MappingConfig,
}

impl<'a> Serializer<'a> {
    pub fn new(config: &'a MappingConfig) -> Self {
        Self { config }
    }

    /// Root element wrapping the model's element.
    pub fn to_element(&self, model: &ModelHandle) -> Result<Element> {
        let mut root = Element::new(self.config.root_element.as_str());
        root.set_attribute("version", self.config.version.as_str());
        root.set_attribute("xmlns:xlink", XLINK_NS);
        let type_name = model.type_name();
        root.push_child(self.model_element(&type_name, model)?);
        tracing::debug!(model = %type_name, id = ?model.id(), "Model serialized");
        Ok(root)
    }

    pub fn to_xml(&self, model: &ModelHandle) -> Result<String> {
        self.to_element(model)?.to_xml()
    }

    fn model_element(&self, name: &str, model: &ModelHandle) -> Result<Element> {
        let mut element = Element::new(name);
        let names = model.describe();
        self.fill(&mut element, model, &names)?;
        Ok(element)
    }

    /// Scalars become attributes, model values child elements. An empty
    /// model field is written as an empty element.
    fn fill(&self, element: &mut Element, model: &ModelHandle, names: &[String]) -> Result<()> {
        for name in names.iter().filter(|n| !self.config.is_excluded(n)) {
            let value = model.get(name)?;
            if self.config.exclude_empty && value.is_empty() {
                continue;
            }
            if value.has_models() {
                for item in value.items() {
                    element.push_child(self.item_element(name, item)?);
                }
                continue;
            }
            match &value {
                FieldValue::Empty => {
                    if model.borrow().field_info(name)?.value_model_type().is_some() {
                        element.push_child(Element::new(name.as_str()));
                    }
                }
                FieldValue::Many(items) if items.is_empty() => {}
                FieldValue::One(Item::Value(v)) => element.set_attribute(name.as_str(), v.render()),
                FieldValue::Many(items) => {
                    let joined = items
                        .iter()
                        .filter_map(Item::as_value)
                        .map(Value::render)
                        .collect::<Vec<_>>()
                        .join(",");
                    element.set_attribute(name.as_str(), joined);
                }
                FieldValue::One(_) => {}
            }
        }
        Ok(())
    }

    /// A persisted model with a resource name is written as a reference;
    /// a link keeps its own fields next to the reference.
    fn item_element(&self, name: &str, item: &Item) -> Result<Element> {
        let address = item.target().and_then(|target| {
            let id = target.id()?;
            self.config.address_for(&target.type_name(), id)
        });

        match (item, address) {
            (Item::Linked(link), Some(href)) => {
                let mut element = reference(name, href);
                let own = link.borrow().describe_untunneled();
                self.fill(&mut element, link, &own)?;
                Ok(element)
            }
            (_, Some(href)) => Ok(reference(name, href)),
            (Item::Model(model) | Item::Linked(model), None) => self.model_element(name, model),
            (Item::Value(v), None) => {
                let mut element = Element::new(name);
                element.text = v.render();
                Ok(element)
            }
        }
    }
}

fn reference(name: &str, href: String) -> Element {
    let mut element = Element::new(name);
    element.set_attribute("xlink:type", "simple");
    element.set_attribute("xlink:href", href);
    element
}
