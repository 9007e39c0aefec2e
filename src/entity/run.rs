//! Runs: realized, observed counterparts of specs.
//!
//! Each run links back to exactly one spec of its own kind; the field types
//! make a `MeasurementRun` pointing at a `ProcessSpec` unrepresentable.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{
    concrete_entity, core_builders, entity_accessors, AttributeView, DataConcept, EntityCore,
    IngredientSpec, IngredientView, MaterialSpec, MeasurementSpec, ProcessSpec, Reference,
};
use crate::attribute::{views, Condition, Parameter, Property};
use crate::file_link::FileLink;
use crate::link::LinkOr;
use crate::value::BaseValue;

/// How a material run came to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleType {
    /// Made in a lab
    Experimental,
    /// Produced by a simulation
    Virtual,
    /// Made at production scale
    Production,
    /// Not recorded
    #[default]
    Unknown,
}

/// Who performed a process or measurement, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "performed_source")]
pub struct PerformedSource {
    /// Person or instrument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performed_by: Option<String>,
    /// Date performed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performed_date: Option<NaiveDate>,
}

impl PerformedSource {
    /// Source with a performer and date.
    #[must_use]
    pub fn new(performed_by: impl Into<String>, performed_date: Option<NaiveDate>) -> Self {
        Self {
            performed_by: Some(performed_by.into()),
            performed_date,
        }
    }
}

/// A realized material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "material_run")]
pub struct MaterialRun {
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
    /// Process run that produced this material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<LinkOr<ProcessRun>>,
    /// Spec this material realizes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<LinkOr<MaterialSpec>>,
    /// Origin of the sample
    #[serde(default)]
    pub sample_type: SampleType,
    /// Measurements performed on this material (back reference)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub measurements: Vec<LinkOr<MeasurementRun>>,
}

impl MaterialRun {
    /// Create a bare material run.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            notes: None,
            file_links: Vec::new(),
            process: None,
            spec: None,
            sample_type: SampleType::Unknown,
            measurements: Vec::new(),
        }
    }

    /// Set the producing process.
    #[must_use]
    pub fn with_process(mut self, process: impl Into<LinkOr<ProcessRun>>) -> Self {
        self.process = Some(process.into());
        self
    }

    /// Set the spec.
    #[must_use]
    pub fn with_spec(mut self, spec: impl Into<LinkOr<MaterialSpec>>) -> Self {
        self.spec = Some(spec.into());
        self
    }

    /// Set the sample type.
    #[must_use]
    pub const fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    core_builders!();
}

impl DataConcept for MaterialRun {
    entity_accessors!(MaterialRun);

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = Vec::new();
        refs.extend(self.process.as_ref().map(|p| p.reference("process")));
        refs.extend(self.spec());
        refs.extend(
            self.measurements
                .iter()
                .map(|m| m.back_reference("measurements")),
        );
        refs
    }

    fn spec(&self) -> Option<Reference<'_>> {
        self.spec.as_ref().map(|s| s.reference("spec"))
    }
}

concrete_entity!(MaterialRun);

/// A realized process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "process_run")]
pub struct ProcessRun {
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
    /// Spec this process realizes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<LinkOr<ProcessSpec>>,
    /// Observed conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Performer and date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PerformedSource>,
    /// Ingredients consumed (back reference)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ingredients: Vec<LinkOr<IngredientRun>>,
    /// Material produced (back reference)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_material: Option<LinkOr<MaterialRun>>,
}

impl ProcessRun {
    /// Create a bare process run.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            notes: None,
            file_links: Vec::new(),
            spec: None,
            conditions: Vec::new(),
            parameters: Vec::new(),
            source: None,
            ingredients: Vec::new(),
            output_material: None,
        }
    }

    /// Set the spec.
    #[must_use]
    pub fn with_spec(mut self, spec: impl Into<LinkOr<ProcessSpec>>) -> Self {
        self.spec = Some(spec.into());
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

    /// Set the performer and date.
    #[must_use]
    pub fn with_source(mut self, source: PerformedSource) -> Self {
        self.source = Some(source);
        self
    }

    core_builders!();
}

impl DataConcept for ProcessRun {
    entity_accessors!(ProcessRun);

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = Vec::new();
        refs.extend(self.spec());
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

    fn spec(&self) -> Option<Reference<'_>> {
        self.spec.as_ref().map(|s| s.reference("spec"))
    }
}

concrete_entity!(ProcessRun);

/// A realized use of a material as an input to a process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "ingredient_run")]
pub struct IngredientRun {
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
    pub material: Option<LinkOr<MaterialRun>>,
    /// Process consuming the material
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<LinkOr<ProcessRun>>,
    /// Spec this ingredient realizes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<LinkOr<IngredientSpec>>,
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
    /// Role labels
    #[serde(default)]
    pub labels: Vec<String>,
}

impl IngredientRun {
    /// Create a bare ingredient run.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            notes: None,
            file_links: Vec::new(),
            material: None,
            process: None,
            spec: None,
            mass_fraction: None,
            volume_fraction: None,
            number_fraction: None,
            absolute_quantity: None,
            labels: Vec::new(),
        }
    }

    /// Set the consumed material.
    #[must_use]
    pub fn with_material(mut self, material: impl Into<LinkOr<MaterialRun>>) -> Self {
        self.material = Some(material.into());
        self
    }

    /// Set the consuming process.
    #[must_use]
    pub fn with_process(mut self, process: impl Into<LinkOr<ProcessRun>>) -> Self {
        self.process = Some(process.into());
        self
    }

    /// Set the spec.
    #[must_use]
    pub fn with_spec(mut self, spec: impl Into<LinkOr<IngredientSpec>>) -> Self {
        self.spec = Some(spec.into());
        self
    }

    /// Set the mass fraction.
    #[must_use]
    pub fn with_mass_fraction(mut self, fraction: BaseValue) -> Self {
        self.mass_fraction = Some(fraction);
        self
    }

    /// Set the volume fraction.
    #[must_use]
    pub fn with_volume_fraction(mut self, fraction: BaseValue) -> Self {
        self.volume_fraction = Some(fraction);
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

impl DataConcept for IngredientRun {
    entity_accessors!(IngredientRun);

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = Vec::new();
        refs.extend(self.material.as_ref().map(|m| m.reference("material")));
        refs.extend(self.process.as_ref().map(|p| p.reference("process")));
        refs.extend(self.spec());
        refs
    }

    fn spec(&self) -> Option<Reference<'_>> {
        self.spec.as_ref().map(|s| s.reference("spec"))
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

concrete_entity!(IngredientRun);

/// A realized characterization of a material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "measurement_run")]
pub struct MeasurementRun {
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
    /// Spec this measurement realizes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<LinkOr<MeasurementSpec>>,
    /// Material characterized
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material: Option<LinkOr<MaterialRun>>,
    /// Observed conditions
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    /// Observed properties
    #[serde(default)]
    pub properties: Vec<Property>,
    /// Performer and date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PerformedSource>,
}

impl MeasurementRun {
    /// Create a bare measurement run.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            core: EntityCore::default(),
            name: name.into(),
            notes: None,
            file_links: Vec::new(),
            spec: None,
            material: None,
            conditions: Vec::new(),
            parameters: Vec::new(),
            properties: Vec::new(),
            source: None,
        }
    }

    /// Set the spec.
    #[must_use]
    pub fn with_spec(mut self, spec: impl Into<LinkOr<MeasurementSpec>>) -> Self {
        self.spec = Some(spec.into());
        self
    }

    /// Set the characterized material.
    #[must_use]
    pub fn with_material(mut self, material: impl Into<LinkOr<MaterialRun>>) -> Self {
        self.material = Some(material.into());
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

    /// Add a property.
    #[must_use]
    pub fn with_property(mut self, property: Property) -> Self {
        self.properties.push(property);
        self
    }

    core_builders!();
}

impl DataConcept for MeasurementRun {
    entity_accessors!(MeasurementRun);

    fn references(&self) -> Vec<Reference<'_>> {
        let mut refs = Vec::new();
        refs.extend(self.spec());
        refs.extend(self.material.as_ref().map(|m| m.reference("material")));
        refs
    }

    fn attributes(&self) -> Vec<AttributeView<'_>> {
        views(&self.conditions, &self.parameters, &self.properties)
    }

    fn spec(&self) -> Option<Reference<'_>> {
        self.spec.as_ref().map(|s| s.reference("spec"))
    }
}

concrete_entity!(MeasurementRun);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::TypeTag;
    use crate::link::LinkByUid;

    #[test]
    fn test_measurement_run_rejects_process_spec() {
        let json = serde_json::json!({
            "type": "measurement_run",
            "name": "xrd",
            "spec": {"type": "process_spec", "name": "mix"}
        });
        let err = serde_json::from_value::<MeasurementRun>(json).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn test_measurement_run_accepts_matching_spec() {
        let json = serde_json::json!({
            "type": "measurement_run",
            "name": "xrd",
            "spec": {"type": "measurement_spec", "name": "xrd spec"}
        });
        let run: MeasurementRun = serde_json::from_value(json).unwrap();
        let spec = run.spec().unwrap();
        assert_eq!(spec.target, TypeTag::MeasurementSpec);
    }

    #[test]
    fn test_sample_type_wire_form() {
        let run = MaterialRun::new("cake").with_sample_type(SampleType::Virtual);
        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["sample_type"], "virtual");
        let bare: MaterialRun =
            serde_json::from_value(serde_json::json!({"type": "material_run", "name": "x"}))
                .unwrap();
        assert_eq!(bare.sample_type, SampleType::Unknown);
    }

    #[test]
    fn test_performed_source_date() {
        let source = PerformedSource::new("Alice", NaiveDate::from_ymd_opt(2024, 3, 1));
        let json = serde_json::to_value(&source).unwrap();
        assert_eq!(json["type"], "performed_source");
        assert_eq!(json["performed_date"], "2024-03-01");
    }

    #[test]
    fn test_material_run_references() {
        let mut run = MaterialRun::new("cake")
            .with_process(LinkByUid::from_id("p"))
            .with_spec(LinkByUid::from_id("s"));
        run.measurements.push(LinkByUid::from_id("m").into());
        let fields: Vec<(&str, bool)> = run
            .references()
            .iter()
            .map(|r| (r.field, r.back_reference))
            .collect();
        assert_eq!(
            fields,
            [("process", false), ("spec", false), ("measurements", true)]
        );
    }
}
