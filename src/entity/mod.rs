//! The closed family of data concepts entities.
//!
//! ## Layout
//!
//! ```text
//! Templates   ConditionTemplate  ParameterTemplate  PropertyTemplate
//!             MaterialTemplate   ProcessTemplate    MeasurementTemplate
//!                  │                  │                  │
//! Specs       MaterialSpec ──< IngredientSpec >── ProcessSpec   MeasurementSpec
//!                  │                  │                  │            │
//! Runs        MaterialRun  ──< IngredientRun  >── ProcessRun    MeasurementRun
//! ```
//!
//! Every concrete type embeds an [`EntityCore`] (identifiers, tags, audit
//! info) by value. [`Entity`] is the tagged union over all of them.

pub mod run;
pub mod spec;
pub mod template;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::attribute::AttributeKind;
use crate::bounds::Bounds;
use crate::error::{Error, Result};
use crate::link::LinkByUid;
use crate::value::BaseValue;

pub use run::{IngredientRun, MaterialRun, MeasurementRun, PerformedSource, ProcessRun, SampleType};
pub use spec::{IngredientSpec, MaterialSpec, MeasurementSpec, ProcessSpec};
pub use template::{
    ConditionTemplate, MaterialTemplate, MeasurementTemplate, ParameterTemplate, ProcessTemplate,
    PropertyTemplate, TemplateEntry,
};

/// Scope under which the data store assigns its own identifiers.
pub const DEFAULT_SCOPE: &str = "id";

/// Discriminant of every concrete entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeTag {
    /// [`ConditionTemplate`]
    ConditionTemplate,
    /// [`ParameterTemplate`]
    ParameterTemplate,
    /// [`PropertyTemplate`]
    PropertyTemplate,
    /// [`MaterialTemplate`]
    MaterialTemplate,
    /// [`ProcessTemplate`]
    ProcessTemplate,
    /// [`MeasurementTemplate`]
    MeasurementTemplate,
    /// [`MaterialSpec`]
    MaterialSpec,
    /// [`ProcessSpec`]
    ProcessSpec,
    /// [`IngredientSpec`]
    IngredientSpec,
    /// [`MeasurementSpec`]
    MeasurementSpec,
    /// [`MaterialRun`]
    MaterialRun,
    /// [`ProcessRun`]
    ProcessRun,
    /// [`IngredientRun`]
    IngredientRun,
    /// [`MeasurementRun`]
    MeasurementRun,
}

/// Layer of the template → spec → run hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Schema-like declarations
    Template,
    /// Design-time intent
    Spec,
    /// Realized, observed instances
    Run,
}

impl TypeTag {
    /// Every concrete type, in writable order.
    pub const ALL: [Self; 14] = [
        Self::ConditionTemplate,
        Self::ParameterTemplate,
        Self::PropertyTemplate,
        Self::MaterialTemplate,
        Self::ProcessTemplate,
        Self::MeasurementTemplate,
        Self::ProcessSpec,
        Self::MaterialSpec,
        Self::IngredientSpec,
        Self::MeasurementSpec,
        Self::ProcessRun,
        Self::MaterialRun,
        Self::IngredientRun,
        Self::MeasurementRun,
    ];

    /// Wire discriminant, e.g. `material_run`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConditionTemplate => "condition_template",
            Self::ParameterTemplate => "parameter_template",
            Self::PropertyTemplate => "property_template",
            Self::MaterialTemplate => "material_template",
            Self::ProcessTemplate => "process_template",
            Self::MeasurementTemplate => "measurement_template",
            Self::MaterialSpec => "material_spec",
            Self::ProcessSpec => "process_spec",
            Self::IngredientSpec => "ingredient_spec",
            Self::MeasurementSpec => "measurement_spec",
            Self::MaterialRun => "material_run",
            Self::ProcessRun => "process_run",
            Self::IngredientRun => "ingredient_run",
            Self::MeasurementRun => "measurement_run",
        }
    }

    /// REST resource segment, e.g. `material-runs`.
    #[must_use]
    pub const fn resource(self) -> &'static str {
        match self {
            Self::ConditionTemplate => "condition-templates",
            Self::ParameterTemplate => "parameter-templates",
            Self::PropertyTemplate => "property-templates",
            Self::MaterialTemplate => "material-templates",
            Self::ProcessTemplate => "process-templates",
            Self::MeasurementTemplate => "measurement-templates",
            Self::MaterialSpec => "material-specs",
            Self::ProcessSpec => "process-specs",
            Self::IngredientSpec => "ingredient-specs",
            Self::MeasurementSpec => "measurement-specs",
            Self::MaterialRun => "material-runs",
            Self::ProcessRun => "process-runs",
            Self::IngredientRun => "ingredient-runs",
            Self::MeasurementRun => "measurement-runs",
        }
    }

    /// Inverse of [`TypeTag::resource`].
    #[must_use]
    pub fn from_resource(resource: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tag| tag.resource() == resource)
    }

    /// Layer this type belongs to.
    #[must_use]
    pub const fn layer(self) -> Layer {
        match self {
            Self::ConditionTemplate
            | Self::ParameterTemplate
            | Self::PropertyTemplate
            | Self::MaterialTemplate
            | Self::ProcessTemplate
            | Self::MeasurementTemplate => Layer::Template,
            Self::MaterialSpec | Self::ProcessSpec | Self::IngredientSpec | Self::MeasurementSpec => {
                Layer::Spec
            }
            Self::MaterialRun | Self::ProcessRun | Self::IngredientRun | Self::MeasurementRun => {
                Layer::Run
            }
        }
    }

    /// Rank for dependency-safe writes: lower ranks must exist before higher
    /// ones reference them. Deletes go in the reverse order.
    #[must_use]
    pub const fn writable_sort_order(self) -> u8 {
        match self {
            Self::ConditionTemplate | Self::ParameterTemplate | Self::PropertyTemplate => 0,
            Self::MaterialTemplate | Self::ProcessTemplate | Self::MeasurementTemplate => 1,
            Self::ProcessSpec => 2,
            Self::MaterialSpec => 3,
            Self::IngredientSpec => 4,
            Self::MeasurementSpec => 5,
            Self::ProcessRun => 6,
            Self::MaterialRun => 7,
            Self::IngredientRun => 8,
            Self::MeasurementRun => 9,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TypeTag {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == tag)
            .ok_or_else(|| Error::Decode(format!("unrecognized type tag '{tag}'")))
    }
}

/// Who touched a record and when, as reported by the data store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    /// Creator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    /// Creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last writer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    /// Last write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Fields shared by every entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityCore {
    /// Scope → identifier
    #[serde(default)]
    pub uids: BTreeMap<String, String>,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Audit trail, populated by the data store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_info: Option<AuditInfo>,
    /// Owning dataset, populated by the data store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<String>,
}

impl EntityCore {
    /// Identifier in the default scope.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.uids.get(DEFAULT_SCOPE).map(String::as_str)
    }

    /// Add (or replace) the identifier for `scope`.
    pub fn add_uid(&mut self, scope: impl Into<String>, id: impl Into<String>) {
        self.uids.insert(scope.into(), id.into());
    }

    /// Whether the two identifier sets intersect.
    #[must_use]
    pub fn shares_uid(&self, other: &Self) -> bool {
        self.uids
            .iter()
            .any(|(scope, id)| other.uids.get(scope) == Some(id))
    }
}

/// A reference held by an entity field.
#[derive(Debug, Clone, Copy)]
pub struct Reference<'a> {
    /// Field name on the owning entity
    pub field: &'static str,
    /// Concrete type the reference must resolve to
    pub target: TypeTag,
    /// Whether the field is derived by the data store from the other side
    pub back_reference: bool,
    /// Link or embedded object
    pub kind: ReferenceKind<'a>,
}

/// Link or embedded object.
#[derive(Debug, Clone, Copy)]
pub enum ReferenceKind<'a> {
    /// Reference by identifier
    Link(&'a LinkByUid),
    /// Embedded object
    Object(&'a dyn DataConcept),
}

/// Read-only view of one attribute.
#[derive(Debug, Clone, Copy)]
pub struct AttributeView<'a> {
    /// Role
    pub kind: AttributeKind,
    /// Attribute name
    pub name: &'a str,
    /// Value, if recorded
    pub value: Option<&'a BaseValue>,
    /// Attribute template reference
    pub template: Option<Reference<'a>>,
}

/// One permitted attribute template of an object template.
#[derive(Debug, Clone, Copy)]
pub struct TemplateEntryView<'a> {
    /// Attribute template
    pub template: Reference<'a>,
    /// Optional narrowing of the attribute template's bounds
    pub bounds: Option<&'a Bounds>,
}

/// Quantities and annotations of an ingredient spec or run.
#[derive(Debug, Clone)]
pub struct IngredientView<'a> {
    /// Ingredient name
    pub name: &'a str,
    /// Ingredient labels
    pub labels: &'a [String],
    /// `(field, value)` for each fractional quantity
    pub fractions: [(&'static str, Option<&'a BaseValue>); 3],
    /// Process consuming the ingredient
    pub process: Option<Reference<'a>>,
}

/// Behaviour shared by every concrete entity.
///
/// Object-safe, so heterogeneous graphs can be walked as
/// `&dyn DataConcept`.
pub trait DataConcept: fmt::Debug {
    /// Concrete type discriminant.
    fn type_tag(&self) -> TypeTag;

    /// Shared fields.
    fn core(&self) -> &EntityCore;

    /// Shared fields, mutably.
    fn core_mut(&mut self) -> &mut EntityCore;

    /// Entity name.
    fn name(&self) -> &str;

    /// Identifier in the default scope.
    fn uid(&self) -> Option<&str> {
        self.core().uid()
    }

    /// Link to this entity, `None` when it has no identifier yet.
    fn to_link(&self) -> Option<LinkByUid> {
        LinkByUid::from_uids(&self.core().uids)
    }

    /// Every entity-or-link field, including back references.
    fn references(&self) -> Vec<Reference<'_>> {
        Vec::new()
    }

    /// Conditions, parameters and properties, in declaration order.
    fn attributes(&self) -> Vec<AttributeView<'_>> {
        Vec::new()
    }

    /// Object template governing this entity's attributes.
    fn template(&self) -> Option<Reference<'_>> {
        None
    }

    /// Spec this run realizes.
    fn spec(&self) -> Option<Reference<'_>> {
        None
    }

    /// Declared bounds, for attribute templates.
    fn attribute_bounds(&self) -> Option<&Bounds> {
        None
    }

    /// Permitted attribute templates, for object templates.
    fn template_entries(&self) -> Vec<TemplateEntryView<'_>> {
        Vec::new()
    }

    /// Allowed ingredient names and labels, for process templates.
    fn allowed_ingredients(&self) -> (Option<&[String]>, Option<&[String]>) {
        (None, None)
    }

    /// Quantities and annotations, for ingredients.
    fn ingredient(&self) -> Option<IngredientView<'_>> {
        None
    }
}

/// A concrete entity type with a statically known discriminant.
pub trait ConcreteEntity:
    DataConcept + Clone + Serialize + DeserializeOwned + Into<Entity> + TryFrom<Entity, Error = Error>
{
    /// Discriminant of this type.
    const TYPE: TypeTag;
}

/// Tagged union over every concrete entity type.
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    /// [`ConditionTemplate`]
    ConditionTemplate(ConditionTemplate),
    /// [`ParameterTemplate`]
    ParameterTemplate(ParameterTemplate),
    /// [`PropertyTemplate`]
    PropertyTemplate(PropertyTemplate),
    /// [`MaterialTemplate`]
    MaterialTemplate(MaterialTemplate),
    /// [`ProcessTemplate`]
    ProcessTemplate(ProcessTemplate),
    /// [`MeasurementTemplate`]
    MeasurementTemplate(MeasurementTemplate),
    /// [`MaterialSpec`]
    MaterialSpec(MaterialSpec),
    /// [`ProcessSpec`]
    ProcessSpec(ProcessSpec),
    /// [`IngredientSpec`]
    IngredientSpec(IngredientSpec),
    /// [`MeasurementSpec`]
    MeasurementSpec(MeasurementSpec),
    /// [`MaterialRun`]
    MaterialRun(MaterialRun),
    /// [`ProcessRun`]
    ProcessRun(ProcessRun),
    /// [`IngredientRun`]
    IngredientRun(IngredientRun),
    /// [`MeasurementRun`]
    MeasurementRun(MeasurementRun),
}

macro_rules! dispatch {
    ($entity:expr, $inner:ident => $body:expr) => {
        match $entity {
            Entity::ConditionTemplate($inner) => $body,
            Entity::ParameterTemplate($inner) => $body,
            Entity::PropertyTemplate($inner) => $body,
            Entity::MaterialTemplate($inner) => $body,
            Entity::ProcessTemplate($inner) => $body,
            Entity::MeasurementTemplate($inner) => $body,
            Entity::MaterialSpec($inner) => $body,
            Entity::ProcessSpec($inner) => $body,
            Entity::IngredientSpec($inner) => $body,
            Entity::MeasurementSpec($inner) => $body,
            Entity::MaterialRun($inner) => $body,
            Entity::ProcessRun($inner) => $body,
            Entity::IngredientRun($inner) => $body,
            Entity::MeasurementRun($inner) => $body,
        }
    };
}

impl Entity {
    /// Discriminant of the wrapped entity.
    #[must_use]
    pub fn type_tag(&self) -> TypeTag {
        self.as_concept().type_tag()
    }

    /// The wrapped entity as a trait object.
    #[must_use]
    pub fn as_concept(&self) -> &dyn DataConcept {
        dispatch!(self, inner => inner)
    }

    /// The wrapped entity as a mutable trait object.
    pub fn as_concept_mut(&mut self) -> &mut dyn DataConcept {
        dispatch!(self, inner => inner)
    }

    /// Unwrap into a concrete type, failing on a variant mismatch.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] when the variant is not `T`.
    pub fn into_concrete<T: ConcreteEntity>(self) -> Result<T> {
        T::try_from(self)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        dispatch!(self, inner => inner.serialize(serializer))
    }
}

impl<'de> Deserialize<'de> for Entity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        crate::codec::decode(&value).map_err(D::Error::custom)
    }
}

/// Wire the concrete type into [`Entity`], [`ConcreteEntity`] and
/// [`LinkOr`](crate::link::LinkOr).
macro_rules! concrete_entity {
    ($ty:ident) => {
        impl $crate::entity::ConcreteEntity for $ty {
            const TYPE: $crate::entity::TypeTag = $crate::entity::TypeTag::$ty;
        }

        impl From<$ty> for $crate::entity::Entity {
            fn from(value: $ty) -> Self {
                Self::$ty(value)
            }
        }

        impl TryFrom<$crate::entity::Entity> for $ty {
            type Error = $crate::error::Error;

            fn try_from(entity: $crate::entity::Entity) -> $crate::error::Result<Self> {
                match entity {
                    $crate::entity::Entity::$ty(value) => Ok(value),
                    other => Err($crate::error::Error::TypeMismatch {
                        expected: $crate::entity::TypeTag::$ty,
                        found: other.type_tag().to_string(),
                    }),
                }
            }
        }

        impl From<$ty> for $crate::link::LinkOr<$ty> {
            fn from(value: $ty) -> Self {
                Self::Object(Box::new(value))
            }
        }
    };
}

/// The four accessors every concrete type implements identically.
macro_rules! entity_accessors {
    ($ty:ident) => {
        fn type_tag(&self) -> $crate::entity::TypeTag {
            $crate::entity::TypeTag::$ty
        }

        fn core(&self) -> &$crate::entity::EntityCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut $crate::entity::EntityCore {
            &mut self.core
        }

        fn name(&self) -> &str {
            &self.name
        }
    };
}

/// Builders for the shared [`EntityCore`] fields.
macro_rules! core_builders {
    () => {
        /// Add an identifier under `scope`.
        #[must_use]
        pub fn with_uid(mut self, scope: impl Into<String>, id: impl Into<String>) -> Self {
            self.core.add_uid(scope, id);
            self
        }

        /// Add a tag.
        #[must_use]
        pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
            self.core.tags.push(tag.into());
            self
        }
    };
}

pub(crate) use concrete_entity;
pub(crate) use core_builders;
pub(crate) use entity_accessors;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_round_trip() {
        for tag in TypeTag::ALL {
            assert_eq!(tag.as_str().parse::<TypeTag>().unwrap(), tag);
            assert_eq!(TypeTag::from_resource(tag.resource()), Some(tag));
        }
    }

    #[test]
    fn test_unknown_tag_is_decode_error() {
        let err = "material_batch".parse::<TypeTag>().unwrap_err();
        assert!(matches!(err, Error::Decode(msg) if msg.contains("material_batch")));
    }

    #[test]
    fn test_layers() {
        assert_eq!(TypeTag::ProcessTemplate.layer(), Layer::Template);
        assert_eq!(TypeTag::IngredientSpec.layer(), Layer::Spec);
        assert_eq!(TypeTag::MeasurementRun.layer(), Layer::Run);
    }

    #[test]
    fn test_writable_order_runs_after_specs_after_templates() {
        assert!(
            TypeTag::PropertyTemplate.writable_sort_order()
                < TypeTag::MaterialTemplate.writable_sort_order()
        );
        assert!(
            TypeTag::MaterialTemplate.writable_sort_order()
                < TypeTag::ProcessSpec.writable_sort_order()
        );
        assert!(
            TypeTag::MeasurementSpec.writable_sort_order()
                < TypeTag::ProcessRun.writable_sort_order()
        );
    }

    #[test]
    fn test_shares_uid() {
        let mut a = EntityCore::default();
        a.add_uid("id", "1");
        a.add_uid("lab", "A");
        let mut b = EntityCore::default();
        b.add_uid("lab", "A");
        let mut c = EntityCore::default();
        c.add_uid("id", "2");
        assert!(a.shares_uid(&b));
        assert!(!a.shares_uid(&c));
        assert!(!EntityCore::default().shares_uid(&a));
    }

    #[test]
    fn test_into_concrete_mismatch() {
        let entity = Entity::from(ProcessSpec::new("mix"));
        let err = entity.into_concrete::<MeasurementSpec>().unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch {
                expected: TypeTag::MeasurementSpec,
                ..
            }
        ));
    }
}
