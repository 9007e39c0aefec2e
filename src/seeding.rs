//! Idempotent seeding by exact name.
//!
//! Scripts that populate a dataset are rerun often; these helpers make each
//! step a lookup first and a write only when needed.

use tracing::info;

use crate::collection::DataConceptsCollection;
use crate::entity::ConcreteEntity;
use crate::error::{Error, Result};

/// The single object named exactly `name` (ignoring case), if any.
///
/// # Errors
///
/// [`Error::AmbiguousName`] when more than one object matches, or any
/// remote failure.
pub fn find_by_name<T: ConcreteEntity>(
    collection: &DataConceptsCollection<T>,
    name: &str,
) -> Result<Option<T>> {
    let mut matches = collection
        .filter_by_name(name, true)
        .collect::<Result<Vec<T>>>()?;
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        count => Err(Error::AmbiguousName {
            name: name.to_string(),
            count,
        }),
    }
}

/// The object named `name`, registering `default` when there is none.
///
/// # Errors
///
/// As [`find_by_name`], plus any failure registering `default`.
pub fn get_by_name_or_create<T, F>(
    collection: &DataConceptsCollection<T>,
    name: &str,
    default: F,
) -> Result<T>
where
    T: ConcreteEntity,
    F: FnOnce() -> T,
{
    if let Some(found) = find_by_name(collection, name)? {
        return Ok(found);
    }
    info!(resource = T::TYPE.resource(), name, "seeding new object");
    collection.register(&default())
}

/// The object named `name`.
///
/// # Errors
///
/// [`Error::NotFound`] when nothing matches, otherwise as [`find_by_name`].
pub fn get_by_name_or_raise_error<T: ConcreteEntity>(
    collection: &DataConceptsCollection<T>,
    name: &str,
) -> Result<T> {
    find_by_name(collection, name)?
        .ok_or_else(|| Error::NotFound(format!("no {} named '{name}'", T::TYPE)))
}

/// Register `obj`, or replace the existing object with the same name.
///
/// The replacement keeps the existing object's identifiers and adds any
/// `obj` carries in other scopes.
///
/// # Errors
///
/// As [`find_by_name`], plus any failure writing.
pub fn create_or_update<T: ConcreteEntity>(
    collection: &DataConceptsCollection<T>,
    obj: &T,
) -> Result<T> {
    let Some(existing) = find_by_name(collection, obj.name())? else {
        return collection.register(obj);
    };
    let mut replacement = obj.clone();
    for (scope, id) in &existing.core().uids {
        replacement.core_mut().add_uid(scope.clone(), id.clone());
    }
    info!(resource = T::TYPE.resource(), name = obj.name(), "updating seeded object");
    collection.update(&replacement)
}
