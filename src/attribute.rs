//! Named, templated facts attached to specs and runs.
//!
//! [`Condition`], [`Parameter`] and [`Property`] share one shape and differ
//! only in semantic role and in the attribute template kind they link to.

use serde::{Deserialize, Serialize};

use crate::entity::template::{ConditionTemplate, ParameterTemplate, PropertyTemplate};
use crate::entity::AttributeView;
use crate::file_link::FileLink;
use crate::link::LinkOr;
use crate::value::BaseValue;

/// Provenance of an attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Observed by an instrument
    Measured,
    /// Produced by a model
    Predicted,
    /// Aggregated from other values
    Summary,
    /// Set by design
    Specified,
    /// Derived by calculation
    Computed,
    /// Not recorded
    #[default]
    Unknown,
}

/// Semantic role of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// Environmental condition
    Condition,
    /// Controllable parameter
    Parameter,
    /// Measured or intended property
    Property,
}

macro_rules! attribute {
    ($(#[$doc:meta])* $name:ident, $tag:literal, $template:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "type", rename = $tag)]
        pub struct $name {
            /// Attribute name
            pub name: String,
            /// Value, if recorded
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub value: Option<BaseValue>,
            /// Template declaring the legal bounds
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub template: Option<LinkOr<$template>>,
            /// Provenance
            #[serde(default)]
            pub origin: Origin,
            /// Supporting files
            #[serde(default, skip_serializing_if = "Vec::is_empty")]
            pub file_links: Vec<FileLink>,
            /// Free-text notes
            #[serde(default, skip_serializing_if = "Option::is_none")]
            pub notes: Option<String>,
        }

        impl $name {
            /// Create an attribute with no value or template.
            #[must_use]
            pub fn new(name: impl Into<String>) -> Self {
                Self {
                    name: name.into(),
                    value: None,
                    template: None,
                    origin: Origin::Unknown,
                    file_links: Vec::new(),
                    notes: None,
                }
            }

            /// Set the value.
            #[must_use]
            pub fn with_value(mut self, value: BaseValue) -> Self {
                self.value = Some(value);
                self
            }

            /// Set the template (embedded or by link).
            #[must_use]
            pub fn with_template(mut self, template: impl Into<LinkOr<$template>>) -> Self {
                self.template = Some(template.into());
                self
            }

            /// Set the provenance.
            #[must_use]
            pub const fn with_origin(mut self, origin: Origin) -> Self {
                self.origin = origin;
                self
            }

            /// Set the notes.
            #[must_use]
            pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
                self.notes = Some(notes.into());
                self
            }

            pub(crate) fn view(&self) -> AttributeView<'_> {
                AttributeView {
                    kind: AttributeKind::$name,
                    name: &self.name,
                    value: self.value.as_ref(),
                    template: self.template.as_ref().map(|t| t.reference("template")),
                }
            }
        }
    };
}

attribute!(
    /// An environmental condition under which something happened.
    Condition,
    "condition",
    ConditionTemplate
);
attribute!(
    /// A controllable setting of a process or measurement.
    Parameter,
    "parameter",
    ParameterTemplate
);
attribute!(
    /// An intrinsic property of a material.
    Property,
    "property",
    PropertyTemplate
);

/// A property that travels together with the conditions it holds under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "property_and_conditions")]
pub struct PropertyAndConditions {
    /// The property
    pub property: Property,
    /// Conditions qualifying the property
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl PropertyAndConditions {
    /// Bundle a property with its conditions.
    #[must_use]
    pub const fn new(property: Property, conditions: Vec<Condition>) -> Self {
        Self {
            property,
            conditions,
        }
    }
}

pub(crate) fn views<'a>(
    conditions: &'a [Condition],
    parameters: &'a [Parameter],
    properties: &'a [Property],
) -> Vec<AttributeView<'a>> {
    conditions
        .iter()
        .map(Condition::view)
        .chain(parameters.iter().map(Parameter::view))
        .chain(properties.iter().map(Property::view))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkByUid;

    #[test]
    fn test_condition_wire_shape() {
        let condition = Condition::new("Temperature")
            .with_value(BaseValue::nominal_real(300.0, "K"))
            .with_template(LinkByUid::from_id("t-1"))
            .with_origin(Origin::Specified);
        let json = serde_json::to_value(&condition).unwrap();
        assert_eq!(json["type"], "condition");
        assert_eq!(json["origin"], "specified");
        assert_eq!(json["template"]["type"], "link_by_uid");
        assert!(json.get("notes").is_none());

        let back: Condition = serde_json::from_value(json).unwrap();
        assert_eq!(back, condition);
    }

    #[test]
    fn test_origin_defaults_to_unknown() {
        let parameter: Parameter =
            serde_json::from_value(serde_json::json!({"type": "parameter", "name": "speed"}))
                .unwrap();
        assert_eq!(parameter.origin, Origin::Unknown);
        assert!(parameter.value.is_none());
    }

    #[test]
    fn test_wrong_template_kind_rejected() {
        let json = serde_json::json!({
            "type": "property",
            "name": "density",
            "template": {
                "type": "condition_template",
                "name": "T",
                "bounds": {"type": "real_bounds", "lower_bound": 0.0, "upper_bound": 1.0}
            }
        });
        let err = serde_json::from_value::<Property>(json).unwrap_err();
        assert!(err.to_string().contains("type mismatch"));
    }

    #[test]
    fn test_property_and_conditions() {
        let pc = PropertyAndConditions::new(
            Property::new("density").with_value(BaseValue::nominal_real(2.7, "g/cm^3")),
            vec![Condition::new("Temperature")],
        );
        let json = serde_json::to_value(&pc).unwrap();
        assert_eq!(json["type"], "property_and_conditions");
        assert_eq!(json["conditions"][0]["type"], "condition");
    }
}
