use std::rc::Rc;

use super::{Element, MappingConfig, ReferenceResolver};
use crate::error::{ModelError, Result};
use crate::field::{Field, Item};
use crate::model::{Model, ModelHandle, Schema};

/// Builds model graphs from documents.
///
/// Any failure aborts the whole run; the partially built graph is dropped.
pub struct Deserializer<'a> {
    schema: Rc<Schema>,
    config: &'a MappingConfig,
    resolver: Option<&'a dyn ReferenceResolver>,
    model_type: Option<String>,
}

impl<'a> Deserializer<'a> {
    pub fn new(schema: Rc<Schema>, config: &'a MappingConfig) -> Self {
        Self {
            schema,
            config,
            resolver: None,
            model_type: None,
        }
    }

    pub fn with_resolver(mut self, resolver: &'a dyn ReferenceResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Build the top element as this type instead of the element's name.
    pub fn with_model_type(mut self, model_type: impl Into<String>) -> Self {
        self.model_type = Some(model_type.into());
        self
    }

    pub fn from_xml(&self, xml: &str) -> Result<ModelHandle> {
        self.from_element(Element::parse(xml)?)
    }

    pub fn from_element(&self, root: Element) -> Result<ModelHandle> {
        if root.name != self.config.root_element {
            return Err(ModelError::Document(format!(
                "expected root element '{}', found '{}'",
                self.config.root_element, root.name
            )));
        }
        let element = root
            .children
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Document("document has no model element".to_string()))?;
        let type_name = self
            .model_type
            .clone()
            .unwrap_or_else(|| element.name.clone());

        let model = self.build(&type_name, element)?;
        tracing::debug!(model = %type_name, "Document deserialized");
        Ok(model)
    }

    fn resolve(&self, element: &Element) -> Result<Option<ModelHandle>> {
        match (element.attribute("xlink:href"), self.resolver) {
            (Some(href), Some(resolver)) => resolver.resolve(href).map(Some),
            _ => Ok(None),
        }
    }

    fn build(&self, type_name: &str, mut element: Element) -> Result<ModelHandle> {
        if let Some(resolved) = self.resolve(&element)? {
            return Ok(resolved);
        }
        let mut model = self.schema.create(type_name)?;
        self.construct(&mut model, &mut element)?;
        let handle = ModelHandle::new(model);
        self.populate(&handle, element, None)?;
        Ok(handle)
    }

    /// Pull constructor arguments out of the element and run the type's
    /// constructor. Without a constructor the arguments are assigned to the
    /// fields they were read from.
    fn construct(&self, model: &mut Model, element: &mut Element) -> Result<()> {
        let type_name = model.type_name().to_string();
        let rule = self.config.construction_args(&type_name);
        let constructor = model.model_type().constructor_fn().cloned();
        if rule.is_none() && constructor.is_none() {
            return Ok(());
        }

        let rule = rule.unwrap_or_default();
        let args: Vec<Option<String>> = rule
            .iter()
            .map(|name| {
                name.and_then(|name| {
                    element
                        .take_child(name)
                        .map(|child| child.text)
                        .or_else(|| element.take_attribute(name))
                })
            })
            .collect();

        match constructor {
            Some(constructor) => constructor(model, &args),
            None => {
                for (name, arg) in rule.iter().zip(args) {
                    if let (Some(name), Some(arg)) = (name, arg) {
                        let field = model.field_info(name)?;
                        model.set(name, field.value_kind().parse(&arg)?)?;
                    }
                }
                Ok(())
            }
        }
    }

    /// Assign attributes and child elements. `only` restricts population to
    /// the given names (a link next to a resolved reference).
    fn populate(&self, model: &ModelHandle, element: Element, only: Option<&[String]>) -> Result<()> {
        let visible = model.describe();
        let check = |name: &str| -> Result<bool> {
            if !visible.iter().any(|n| n == name) {
                return Err(ModelError::unknown_field(model.type_name(), name));
            }
            Ok(only.map(|names| names.iter().any(|n| n == name)).unwrap_or(true))
        };

        for (name, raw) in element.attributes {
            if name.starts_with("xlink:") || name.starts_with("xmlns") {
                continue;
            }
            if check(&name)? {
                let field = model.borrow().field_info(&name)?;
                self.assign_text(model, &field, &raw, true)?;
            }
        }

        for child in element.children {
            if !check(&child.name)? || child.is_empty() {
                continue;
            }
            let field = model.borrow().field_info(&child.name)?;
            match field.value_model_type() {
                Some(sub_type) => self.assign_model(model, &field, sub_type, child)?,
                None => self.assign_text(model, &field, &child.text, false)?,
            }
        }
        Ok(())
    }

    fn assign_text(&self, model: &ModelHandle, field: &Field, raw: &str, split: bool) -> Result<()> {
        let kind = field.value_kind();
        if !field.is_multiple() {
            return model.set(field.name(), kind.parse(raw)?);
        }
        if split {
            for part in raw.split(',').filter(|p| !p.is_empty()) {
                model.add(field.name(), kind.parse(part)?)?;
            }
            Ok(())
        } else {
            model.add(field.name(), kind.parse(raw)?).map(|_| ())
        }
    }

    fn assign_model(&self, model: &ModelHandle, field: &Field, sub_type: &str, mut child: Element) -> Result<()> {
        let name = field.name();

        if let Some(target) = self.resolve(&child)? {
            let stored = if field.is_multiple() {
                model.add(name, target)?
            } else {
                model.set(name, target)?;
                stored_item(model, name)?
            };
            if let Item::Linked(link) = stored {
                let own = link.borrow().describe_untunneled();
                self.populate(&link, child, Some(&own))?;
            }
            return Ok(());
        }

        let instance = if field.is_multiple() {
            model.add_new(name)?
        } else {
            let mut sub = self.schema.create(sub_type)?;
            self.construct(&mut sub, &mut child)?;
            model.set(name, ModelHandle::new(sub))?;
            match stored_item(model, name)? {
                Item::Model(m) | Item::Linked(m) => m,
                Item::Value(_) => {
                    return Err(ModelError::Argument(format!(
                        "field '{}' did not store a model",
                        name
                    )))
                }
            }
        };
        if field.is_multiple() {
            self.construct_in(&instance, &mut child)?;
        }
        self.populate(&instance, child, None)
    }

    /// Run construction on a freshly added instance; for a link the rule of
    /// the link's target type applies to the target.
    fn construct_in(&self, instance: &ModelHandle, element: &mut Element) -> Result<()> {
        let target = instance.link_target();
        let subject = target.as_ref().unwrap_or(instance);
        let mut model = subject.borrow_mut();
        self.construct(&mut model, element)
    }
}

fn stored_item(model: &ModelHandle, name: &str) -> Result<Item> {
    model
        .get(name)?
        .items()
        .first()
        .cloned()
        .ok_or_else(|| ModelError::Argument(format!("field '{}' is empty after set", name)))
}
