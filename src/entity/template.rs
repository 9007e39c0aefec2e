//! Templates: schema-like declarations of attribute domains and of which
//! attributes an object may carry.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::{
    concrete_entity, core_builders, entity_accessors, ConcreteEntity, DataConcept, EntityCore,
    Reference, TemplateEntryView,
};
use crate::bounds::Bounds;
use crate::link::LinkOr;

macro_rules! attribute_template {
    ($(#[$doc:meta])* $name:ident, $tag:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type", rename = $tag)]
        pub struct $name {
            /// Identifiers, tags and audit info
            #[serde(flatten)]
            pub core: EntityCore,
            /// Template name
            pub name: String,
            /// Free-text description
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub description: Option<String>,
            /// Legal domain of attribute values
            pub bounds: Bounds,
        }

        impl $name {
            /// Create a template with the given bounds.
            #[must_use]
            pub fn new(name: impl Into<String>, bounds: Bounds) -> Self {
                Self {
                    core: EntityCore::default(),
                    name: name.into(),
                    description: None,
                    bounds,
                }
            }

            /// Set the description.
            #[must_use]
            pub fn with_description(mut self, description: impl Into<String>) -> Self {
                self.description = Some(description.into());
                self
            }

            core_builders!();
        }

        impl DataConcept for $name {
            entity_accessors!($name);

            fn attribute_bounds(&self) -> Option<&Bounds> {
                Some(&self.bounds)
            }
        }

        concrete_entity!($name);
    };
}

attribute_template!(
    /// Declares the legal domain of a condition.
    ConditionTemplate,
    "condition_template"
);
attribute_template!(
    /// Declares the legal domain of a parameter.
    ParameterTemplate,
    "parameter_template"
);
attribute_template!(
    /// Declares the legal domain of a property.
    PropertyTemplate,
    "property_template"
);

/// An attribute template permitted by an object template, optionally
/// narrowed to tighter bounds.
///
/// Serialized as the pair `[template, bounds | null]`. A bare template or
/// link is accepted on read and treated as un-narrowed.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateEntry<T> {
    /// Attribute template (embedded or by link)
    pub template: LinkOr<T>,
    /// Narrowed bounds, `None` to inherit the template's
    pub bounds: Option<Bounds>,
}

impl<T: ConcreteEntity> TemplateEntry<T> {
    /// Entry that inherits the attribute template's bounds.
    #[must_use]
    pub fn new(template: impl Into<LinkOr<T>>) -> Self {
        Self {
            template: template.into(),
            bounds: None,
        }
    }

    /// Entry narrowed to `bounds`.
    #[must_use]
    pub fn narrowed(template: impl Into<LinkOr<T>>, bounds: Bounds) -> Self {
        Self {
            template: template.into(),
            bounds: Some(bounds),
        }
    }

    fn view(&self, field: &'static str) -> TemplateEntryView<'_> {
        TemplateEntryView {
            template: self.template.reference(field),
            bounds: self.bounds.as_ref(),
        }
    }
}

impl<T: ConcreteEntity> Serialize for TemplateEntry<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.template, &self.bounds).serialize(serializer)
    }
}

impl<'de, T: ConcreteEntity> Deserialize<'de> for TemplateEntry<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        if value.is_array() {
            let (template, bounds) = <(LinkOr<T>, Option<Bounds>)>::deserialize(&value)
                .map_err(D::Error::custom)?;
            Ok(Self { template, bounds })
        } else {
            let template = LinkOr::<T>::deserialize(&value).map_err(D::Error::custom)?;
            Ok(Self {
                template,
                bounds: None,
            })
        }
    }
}

fn entry_views<'a, T: ConcreteEntity>(
    entries: &'a [TemplateEntry<T>],
    field: &'static str,
) -> impl Iterator<Item = TemplateEntryView<'a>> {
    entries.iter().map(move |entry| entry.view(field))
}

/// Declares which properties a material may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "material_template")]
pub struct MaterialTemplate {
    /// Identifiers, tags and audit info
    #[serde(flatten)]
    pub core: EntityCore,
    /// Template name
    pub name: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Permitted property templates
    #[serde(default)]
    pub properties: Vec<TemplateEntry<PropertyTemplate>>,
}

impl MaterialTemplate {
    /// Create an empty material template.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            description: None,
            properties: Vec::new(),
        }
    }

    /// Permit a property template.
    #[must_use]
    pub fn with_property(mut self, entry: TemplateEntry<PropertyTemplate>) -> Self {
        self.properties.push(entry);
        self
    }

    core_builders!();
}

impl DataConcept for MaterialTemplate {
    entity_accessors!(MaterialTemplate);

    fn references(&self) -> Vec<Reference<'_>> {
        self.template_entries()
            .into_iter()
            .map(|entry| entry.template)
            .collect()
    }

    fn template_entries(&self) -> Vec<TemplateEntryView<'_>> {
        entry_views(&self.properties, "properties").collect()
    }
}

concrete_entity!(MaterialTemplate);

/// Declares which conditions and parameters a process may carry and which
/// ingredients it may consume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "process_template")]
pub struct ProcessTemplate {
    /// Identifiers, tags and audit info
    #[serde(flatten)]
    pub core: EntityCore,
    /// Template name
    pub name: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Permitted condition templates
    #[serde(default)]
    pub conditions: Vec<TemplateEntry<ConditionTemplate>>,
    /// Permitted parameter templates
    #[serde(default)]
    pub parameters: Vec<TemplateEntry<ParameterTemplate>>,
    /// Ingredient names allowed on processes using this template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_names: Option<Vec<String>>,
    /// Ingredient labels allowed on processes using this template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_labels: Option<Vec<String>>,
}

impl ProcessTemplate {
    /// Create an empty process template.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            description: None,
            conditions: Vec::new(),
            parameters: Vec::new(),
            allowed_names: None,
            allowed_labels: None,
        }
    }

    /// Permit a condition template.
    #[must_use]
    pub fn with_condition(mut self, entry: TemplateEntry<ConditionTemplate>) -> Self {
        self.conditions.push(entry);
        self
    }

    /// Permit a parameter template.
    #[must_use]
    pub fn with_parameter(mut self, entry: TemplateEntry<ParameterTemplate>) -> Self {
        self.parameters.push(entry);
        self
    }

    /// Restrict ingredient names.
    #[must_use]
    pub fn with_allowed_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Restrict ingredient labels.
    #[must_use]
    pub fn with_allowed_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    core_builders!();
}

impl DataConcept for ProcessTemplate {
    entity_accessors!(ProcessTemplate);

    fn references(&self) -> Vec<Reference<'_>> {
        self.template_entries()
            .into_iter()
            .map(|entry| entry.template)
            .collect()
    }

    fn template_entries(&self) -> Vec<TemplateEntryView<'_>> {
        entry_views(&self.conditions, "conditions")
            .chain(entry_views(&self.parameters, "parameters"))
            .collect()
    }

    fn allowed_ingredients(&self) -> (Option<&[String]>, Option<&[String]>) {
        (self.allowed_names.as_deref(), self.allowed_labels.as_deref())
    }
}

concrete_entity!(ProcessTemplate);

/// Declares which conditions, parameters and properties a measurement may
/// carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "measurement_template")]
pub struct MeasurementTemplate {
    /// Identifiers, tags and audit info
    #[serde(flatten)]
    pub core: EntityCore,
    /// Template name
    pub name: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Permitted condition templates
    #[serde(default)]
    pub conditions: Vec<TemplateEntry<ConditionTemplate>>,
    /// Permitted parameter templates
    #[serde(default)]
    pub parameters: Vec<TemplateEntry<ParameterTemplate>>,
    /// Permitted property templates
    #[serde(default)]
    pub properties: Vec<TemplateEntry<PropertyTemplate>>,
}

impl MeasurementTemplate {
    /// Create an empty measurement template.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            description: None,
            conditions: Vec::new(),
            parameters: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// Permit a condition template.
    #[must_use]
    pub fn with_condition(mut self, entry: TemplateEntry<ConditionTemplate>) -> Self {
        self.conditions.push(entry);
        self
    }

    /// Permit a parameter template.
    #[must_use]
    pub fn with_parameter(mut self, entry: TemplateEntry<ParameterTemplate>) -> Self {
        self.parameters.push(entry);
        self
    }

    /// Permit a property template.
    #[must_use]
    pub fn with_property(mut self, entry: TemplateEntry<PropertyTemplate>) -> Self {
        self.properties.push(entry);
        self
    }

    core_builders!();
}

impl DataConcept for MeasurementTemplate {
    entity_accessors!(MeasurementTemplate);

    fn references(&self) -> Vec<Reference<'_>> {
        self.template_entries()
            .into_iter()
            .map(|entry| entry.template)
            .collect()
    }

    fn template_entries(&self) -> Vec<TemplateEntryView<'_>> {
        entry_views(&self.conditions, "conditions")
            .chain(entry_views(&self.parameters, "parameters"))
            .chain(entry_views(&self.properties, "properties"))
            .collect()
    }
}

concrete_entity!(MeasurementTemplate);
