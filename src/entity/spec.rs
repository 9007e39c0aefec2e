//! Specs: design-time intent for materials, processes, ingredients and
//! measurements.
//!
//! `ProcessSpec::ingredients` and `ProcessSpec::output_material` are back
//! references. The data store derives them from the other side of the
//! relation and fills them in on read; they are never sent on write.

use serde::{Deserialize, Serialize};

use super::{
    concrete_entity, core_builders, entity_accessors, AttributeView, DataConcept, EntityCore,
    IngredientView, MaterialTemplate, MeasurementTemplate, ProcessTemplate, Reference,
};
use crate::attribute::{views, Condition, Parameter, PropertyAndConditions};
use crate::file_link::FileLink;
use crate::link::LinkOr;
use crate::value::BaseValue;

/// Intended material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "material_spec")]
pub struct MaterialSpec {
    /// Identifiers, tags and audit info
    #[serde(flatten)]
    pub core: EntityCore,
    /// Material name
    pub name: String,
    /// Free-text notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Supporting files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_links: Vec<FileLink>,
    /// Material template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<LinkOr<MaterialTemplate>>,
    /// Process spec that produces this material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<LinkOr<ProcessSpec>>,
    /// Intended properties with the conditions they hold under
    #[serde(default)]
    pub properties: Vec<PropertyAndConditions>,
}

impl MaterialSpec {
    /// Create a bare material spec.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            notes: None,
            file_links: Vec::new(),
            template: None,
            process: None,
            properties: Vec::new(),
        }
    }

    /// Set the template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<LinkOr<MaterialTemplate>>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Set the producing process.
    #[must_use]
    pub fn with_process(mut self, process: impl Into<LinkOr<ProcessSpec>>) -> Self {
        self.process = Some(process.into());
        self
    }

    /// Add an intended property.
    #[must_use]
    pub fn with_property(mut self, property: PropertyAndConditions) -> Self {
        self.properties.push(property);
        self
    }

    core_builders!();
}

impl DataConcept for MaterialSpec {
    entity_accessors!(MaterialSpec);

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = Vec::new();
        refs.extend(self.template.as_ref().map(|t| t.reference("template")));
        refs.extend(self.process.as_ref().map(|p| p.reference("process")));
        refs
    }

    fn attributes(&self) -> Vec<AttributeView<'_>> {
        self.properties
            .iter()
            .flat_map(|pc| {
                std::iter::once(pc.property.view()).chain(pc.conditions.iter().map(Condition::view))
            })
            .collect()
    }

    fn template(&self) -> Option<Reference<'_>> {
        self.template.as_ref().map(|t| t.reference("template"))
    }
}

concrete_entity!(MaterialSpec);

/// Intended process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "process_spec")]
pub struct ProcessSpec {
    /// Identifiers, tags and audit info
    #[serde(flatten)]
    pub core: EntityCore,
    /// Process name
    pub name: String,
    /// Free-text notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Supporting files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_links: Vec<FileLink>,
    /// Process template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<LinkOr<ProcessTemplate>>,
    /// Intended conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Intended parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Ingredients consumed (back reference)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingredients: Vec<LinkOr<IngredientSpec>>,
    /// Material produced (back reference)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_material: Option<LinkOr<MaterialSpec>>,
}

impl ProcessSpec {
    /// Create a bare process spec.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            notes: None,
            file_links: Vec::new(),
            template: None,
            conditions: Vec::new(),
            parameters: Vec::new(),
            ingredients: Vec::new(),
            output_material: None,
        }
    }

    /// Set the template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<LinkOr<ProcessTemplate>>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Add a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    core_builders!();
}

impl DataConcept for ProcessSpec {
    entity_accessors!(ProcessSpec);

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = Vec::new();
        refs.extend(self.template.as_ref().map(|t| t.reference("template")));
        refs.extend(self.ingredients.iter().map(|i| i.back_reference("ingredients")));
        refs.extend(
            self.output_material
                .as_ref()
                .map(|m| m.back_reference("output_material")),
        );
        refs
    }

    fn attributes(&self) -> Vec<AttributeView<'_>> {
        views(&self.conditions, &self.parameters, &[])
    }

    fn template(&self) -> Option<Reference<'_>> {
        self.template.as_ref().map(|t| t.reference("template"))
    }
}

concrete_entity!(ProcessSpec);

/// Intended use of a material as an input to a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "ingredient_spec")]
pub struct IngredientSpec {
    /// Identifiers, tags and audit info
    #[serde(flatten)]
    pub core: EntityCore,
    /// Ingredient name, unique within its process
    pub name: String,
    /// Free-text notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Supporting files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_links: Vec<FileLink>,
    /// Material consumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<LinkOr<MaterialSpec>>,
    /// Process consuming the material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<LinkOr<ProcessSpec>>,
    /// Fraction of the process inputs by mass
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mass_fraction: Option<BaseValue>,
    /// Fraction of the process inputs by volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_fraction: Option<BaseValue>,
    /// Fraction of the process inputs by number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_fraction: Option<BaseValue>,
    /// Absolute amount consumed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute_quantity: Option<BaseValue>,
    /// Role labels, e.g. `solvent`
    #[serde(default)]
    pub labels: Vec<String>,
}

impl IngredientSpec {
    /// Create a bare ingredient spec.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            notes: None,
            file_links: Vec::new(),
            material: None,
            process: None,
            mass_fraction: None,
            volume_fraction: None,
            number_fraction: None,
            absolute_quantity: None,
            labels: Vec::new(),
        }
    }

    /// Set the consumed material.
    #[must_use]
    pub fn with_material(mut self, material: impl Into<LinkOr<MaterialSpec>>) -> Self {
        self.material = Some(material.into());
        self
    }

    /// Set the consuming process.
    #[must_use]
    pub fn with_process(mut self, process: impl Into<LinkOr<ProcessSpec>>) -> Self {
        self.process = Some(process.into());
        self
    }

    /// Set the mass fraction.
    #[must_use]
    pub fn with_mass_fraction(mut self, fraction: BaseValue) -> Self {
        self.mass_fraction = Some(fraction);
        self
    }

    /// Set the absolute quantity.
    #[must_use]
    pub fn with_absolute_quantity(mut self, quantity: BaseValue) -> Self {
        self.absolute_quantity = Some(quantity);
        self
    }

    /// Add a label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    core_builders!();
}

impl DataConcept for IngredientSpec {
    entity_accessors!(IngredientSpec);

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = Vec::new();
        refs.extend(self.material.as_ref().map(|m| m.reference("material")));
        refs.extend(self.process.as_ref().map(|p| p.reference("process")));
        refs
    }

    fn ingredient(&self) -> Option<IngredientView<'_>> {
        Some(IngredientView {
            name: &self.name,
            labels: &self.labels,
            fractions: [
                ("mass_fraction", self.mass_fraction.as_ref()),
                ("volume_fraction", self.volume_fraction.as_ref()),
                ("number_fraction", self.number_fraction.as_ref()),
            ],
            process: self.process.as_ref().map(|p| p.reference("process")),
        })
    }
}

concrete_entity!(IngredientSpec);

/// Intended characterization of a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "measurement_spec")]
pub struct MeasurementSpec {
    /// Identifiers, tags and audit info
    #[serde(flatten)]
    pub core: EntityCore,
    /// Measurement name
    pub name: String,
    /// Free-text notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Supporting files
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub file_links: Vec<FileLink>,
    /// Measurement template
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<LinkOr<MeasurementTemplate>>,
    /// Intended conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Intended parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

impl MeasurementSpec {
    /// Create a bare measurement spec.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            notes: None,
            file_links: Vec::new(),
            template: None,
            conditions: Vec::new(),
            parameters: Vec::new(),
        }
    }

    /// Set the template.
    #[must_use]
    pub fn with_template(mut self, template: impl Into<LinkOr<MeasurementTemplate>>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Add a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    core_builders!();
}

impl DataConcept for MeasurementSpec {
    entity_accessors!(MeasurementSpec);

    fn references(&self) -> Vec<Reference<'_>> {
        self.template().into_iter().collect()
    }

    fn attributes(&self) -> Vec<AttributeView<'_>> {
        views(&self.conditions, &self.parameters, &[])
    }

    fn template(&self) -> Option<Reference<'_>> {
        self.template.as_ref().map(|t| t.reference("template"))
    }
}

concrete_entity!(MeasurementSpec);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::Property;
    use crate::link::LinkByUid;

    #[test]
    fn test_material_spec_attributes_flatten_conditions() {
        let spec = MaterialSpec::new("alloy").with_property(PropertyAndConditions::new(
            Property::new("density"),
            vec![Condition::new("Temperature"), Condition::new("Pressure")],
        ));
        let names: Vec<&str> = spec.attributes().iter().map(|a| a.name).collect();
        assert_eq!(names, ["density", "Temperature", "Pressure"]);
    }

    #[test]
    fn test_process_spec_back_references_flagged() {
        let mut spec = ProcessSpec::new("mix").with_template(LinkByUid::from_id("pt"));
        spec.ingredients.push(LinkByUid::from_id("i-1").into());
        spec.output_material = Some(LinkByUid::from_id("m-1").into());

        let refs = spec.references();
        assert_eq!(refs.len(), 3);
        assert!(!refs[0].back_reference);
        assert!(refs[1..].iter().all(|r| r.back_reference));
    }

    #[test]
    fn test_ingredient_view() {
        let ingredient = IngredientSpec::new("flour")
            .with_mass_fraction(BaseValue::nominal_real(0.6, ""))
            .with_label("dry")
            .with_process(LinkByUid::from_id("p-1"));
        let view = ingredient.ingredient().unwrap();
        assert_eq!(view.name, "flour");
        assert_eq!(view.labels, ["dry".to_string()]);
        assert!(view.fractions[0].1.is_some());
        assert!(view.fractions[1].1.is_none());
        assert_eq!(view.process.unwrap().field, "process");
    }

    #[test]
    fn test_empty_back_references_not_serialized() {
        let json = serde_json::to_value(ProcessSpec::new("bake")).unwrap();
        assert!(json.get("ingredients").is_none());
        assert!(json.get("output_material").is_none());
        assert_eq!(json["conditions"], serde_json::json!([]));
    }
}
