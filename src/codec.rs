//! Polymorphic wire codec.
//!
//! `decode` reads the `type` discriminant and dispatches over the closed
//! [`TypeTag`] set; every tag has exactly one decoder and the `match` is
//! checked for exhaustiveness by the compiler.
//!
//! Two serialized forms exist:
//!
//! - [`dump`]: lossless. Embedded objects stay embedded, back references are
//!   kept. `decode(dump(x)) == x` for every entity.
//! - [`encode`]: the write form sent to the data store. Back references are
//!   dropped, nested entities that already carry an identifier collapse to a
//!   `link_by_uid` stub, and nested entities without one are embedded
//!   inline (themselves encoded the same way) so the store can create them
//!   atomically with their parent. List order is preserved.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::entity::{
    ConcreteEntity, ConditionTemplate, Entity, IngredientRun, IngredientSpec, MaterialRun,
    MaterialSpec, MaterialTemplate, MeasurementRun, MeasurementSpec, MeasurementTemplate,
    ParameterTemplate, ProcessRun, ProcessSpec, ProcessTemplate, PropertyTemplate, TypeTag,
};
use crate::error::{Error, Result};
use crate::link::LinkByUid;

/// Decode a wire record into the matching concrete entity.
///
/// # Errors
///
/// Returns [`Error::Decode`] when the discriminant is missing, names no
/// known type, or the record's fields do not fit that type.
pub fn decode(value: &Value) -> Result<Entity> {
    match type_tag(value)? {
        TypeTag::ConditionTemplate => build::<ConditionTemplate>(value),
        TypeTag::ParameterTemplate => build::<ParameterTemplate>(value),
        TypeTag::PropertyTemplate => build::<PropertyTemplate>(value),
        TypeTag::MaterialTemplate => build::<MaterialTemplate>(value),
        TypeTag::ProcessTemplate => build::<ProcessTemplate>(value),
        TypeTag::MeasurementTemplate => build::<MeasurementTemplate>(value),
        TypeTag::MaterialSpec => build::<MaterialSpec>(value),
        TypeTag::ProcessSpec => build::<ProcessSpec>(value),
        TypeTag::IngredientSpec => build::<IngredientSpec>(value),
        TypeTag::MeasurementSpec => build::<MeasurementSpec>(value),
        TypeTag::MaterialRun => build::<MaterialRun>(value),
        TypeTag::ProcessRun => build::<ProcessRun>(value),
        TypeTag::IngredientRun => build::<IngredientRun>(value),
        TypeTag::MeasurementRun => build::<MeasurementRun>(value),
    }
}

/// Decode a wire record that must be a `T`.
///
/// # Errors
///
/// Returns [`Error::Decode`] as [`decode`] does, or
/// [`Error::TypeMismatch`] when the record is a different concrete type.
pub fn decode_as<T: ConcreteEntity>(value: &Value) -> Result<T> {
    let tag = type_tag(value)?;
    if tag != T::TYPE {
        return Err(Error::TypeMismatch {
            expected: T::TYPE,
            found: tag.to_string(),
        });
    }
    T::deserialize(value).map_err(|err| Error::Decode(format!("malformed {tag} record: {err}")))
}

/// Read the `type` discriminant of a wire record.
///
/// # Errors
///
/// Returns [`Error::Decode`] naming the offending tag, or noting its absence.
pub fn type_tag(value: &Value) -> Result<TypeTag> {
    value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Decode("record has no 'type' discriminant".to_string()))?
        .parse()
}

fn build<T: ConcreteEntity>(value: &Value) -> Result<Entity> {
    T::deserialize(value)
        .map(Into::into)
        .map_err(|err| Error::Decode(format!("malformed {} record: {err}", T::TYPE)))
}

/// Lossless serialized form.
///
/// # Errors
///
/// Returns [`Error::Decode`] if serialization fails (non-finite floats).
pub fn dump<T: Serialize + ?Sized>(entity: &T) -> Result<Value> {
    serde_json::to_value(entity).map_err(Error::decode)
}

/// Write form sent to the data store.
///
/// # Errors
///
/// Returns [`Error::Decode`] if serialization fails (non-finite floats).
pub fn encode<T: Serialize + ?Sized>(entity: &T) -> Result<Value> {
    let mut value = dump(entity)?;
    encode_entity(&mut value);
    Ok(value)
}

/// Fields the data store derives from the other side of a relation.
#[must_use]
pub const fn back_reference_fields(tag: TypeTag) -> &'static [&'static str] {
    match tag {
        TypeTag::ProcessSpec | TypeTag::ProcessRun => &["ingredients", "output_material"],
        TypeTag::MaterialRun => &["measurements"],
        _ => &[],
    }
}

/// Tag of a value that is an entity record (not a link, bounds, value or
/// attribute).
pub(crate) fn entity_tag(value: &Value) -> Option<TypeTag> {
    value.get("type")?.as_str()?.parse().ok()
}

/// Link built from a record's `uids`, `None` when it has none.
pub(crate) fn record_link(value: &Value) -> Option<LinkByUid> {
    let uids: BTreeMap<String, String> = value
        .get("uids")?
        .as_object()?
        .iter()
        .filter_map(|(scope, id)| Some((scope.clone(), id.as_str()?.to_string())))
        .collect();
    LinkByUid::from_uids(&uids)
}

fn encode_entity(value: &mut Value) {
    let Some(tag) = entity_tag(value) else {
        return;
    };
    if let Some(map) = value.as_object_mut() {
        for field in back_reference_fields(tag) {
            map.remove(*field);
        }
        for (key, child) in map.iter_mut() {
            if key != "uids" {
                substitute_links(child);
            }
        }
    }
}

fn substitute_links(value: &mut Value) {
    if entity_tag(value).is_some() {
        match record_link(value) {
            Some(link) => *value = link.to_value(),
            None => encode_entity(value),
        }
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(substitute_links),
        Value::Object(map) => map.values_mut().for_each(substitute_links),
        _ => {}
    }
}
