//! Batch soft delete across every type in a project.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::entity::Entity;
use crate::error::{Error, Result, ValidationError};
use crate::link::LinkByUid;
use crate::session::{segment, QueryParams, Session};

/// Largest number of ids sent in one batch-delete request.
pub const DELETE_SERVICE_MAX: usize = 50;

/// Why the data store refused to delete one object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiError {
    /// HTTP-style status code
    pub code: u16,
    /// Server-provided message
    pub message: String,
}

#[derive(Deserialize)]
struct Failure {
    id: Value,
    cause: ApiError,
}

/// Soft-delete every object in `ids`, [`DELETE_SERVICE_MAX`] per request.
///
/// Refusals (most often an object still referenced from outside the batch)
/// do not stop the batch; they are returned as `(id, cause)` pairs. With
/// `dataset_id`, only objects in that dataset are eligible.
///
/// # Errors
///
/// Any failure of a request as a whole, or [`Error::Decode`] for a
/// malformed response. Chunks sent before the failure stay deleted.
pub fn batch_delete(
    session: &dyn Session,
    project_id: &str,
    ids: &[LinkByUid],
    dataset_id: Option<&str>,
) -> Result<Vec<(LinkByUid, ApiError)>> {
    let path = format!("projects/{}/gemd/batch-delete", segment(project_id));
    let mut failures = Vec::new();
    for chunk in ids.chunks(DELETE_SERVICE_MAX) {
        let mut body = json!({ "ids": chunk.iter().map(LinkByUid::to_value).collect::<Vec<_>>() });
        if let (Some(dataset), Some(map)) = (dataset_id, body.as_object_mut()) {
            map.insert("dataset_id".to_string(), Value::String(dataset.to_string()));
        }
        let response = session.post(&path, &body, &QueryParams::new())?;
        let reported: Vec<Failure> = response
            .get("failures")
            .cloned()
            .map(serde_json::from_value::<Vec<Failure>>)
            .transpose()
            .map_err(Error::decode)?
            .unwrap_or_default();
        debug!(%path, requested = chunk.len(), failed = reported.len(), "batch delete");
        for failure in reported {
            let id = LinkByUid::from_value(&failure.id).ok_or_else(|| {
                Error::Decode(format!("batch delete failure id is not a link: {}", failure.id))
            })?;
            warn!(%id, code = failure.cause.code, message = %failure.cause.message, "delete refused");
            failures.push((id, failure.cause));
        }
    }
    Ok(failures)
}

/// Soft-delete `entities`, ordered so that dependents go before what they
/// depend on: measurement runs before material runs, runs before specs,
/// specs before templates.
///
/// # Errors
///
/// [`ValidationError::MissingUid`] when an entity has no identifier, else
/// as [`batch_delete`].
pub fn batch_delete_entities(
    session: &dyn Session,
    project_id: &str,
    entities: &[Entity],
    dataset_id: Option<&str>,
) -> Result<Vec<(LinkByUid, ApiError)>> {
    let mut ordered: Vec<&Entity> = entities.iter().collect();
    ordered.sort_by_key(|entity| std::cmp::Reverse(entity.type_tag().writable_sort_order()));
    let ids = ordered
        .into_iter()
        .map(|entity| {
            let concept = entity.as_concept();
            concept.to_link().ok_or_else(|| {
                ValidationError::MissingUid(format!("{} '{}'", concept.type_tag(), concept.name()))
                    .into()
            })
        })
        .collect::<Result<Vec<_>>>()?;
    batch_delete(session, project_id, &ids, dataset_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::DataConceptsCollection;
    use crate::entity::{DataConcept, MaterialRun, ProcessRun, DEFAULT_SCOPE};
    use crate::link::LinkOr;
    use crate::session::InMemorySession;
    use std::sync::Arc;

    #[test]
    fn test_referenced_object_reported_not_raised() {
        let session = Arc::new(InMemorySession::with_api_key("key").unwrap());
        let runs = DataConceptsCollection::<MaterialRun>::new("p", Some("d"), session.clone());
        let cake = runs
            .register(&MaterialRun::new("cake").with_process(ProcessRun::new("bake")))
            .unwrap();
        let process = cake.process.as_ref().and_then(LinkOr::to_link).unwrap();

        let failures = batch_delete(session.as_ref(), "p", &[process.clone()], None).unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, process);
        assert_eq!(failures[0].1.code, 409);
    }

    #[test]
    fn test_entities_deleted_dependents_first() {
        let session = Arc::new(InMemorySession::with_api_key("key").unwrap());
        let runs = DataConceptsCollection::<MaterialRun>::new("p", Some("d"), session.clone());
        let processes = DataConceptsCollection::<ProcessRun>::new("p", Some("d"), session.clone());
        let cake = runs
            .register(&MaterialRun::new("cake").with_process(ProcessRun::new("bake")))
            .unwrap();
        let link = cake.process.as_ref().and_then(LinkOr::to_link).unwrap();
        let bake = processes.get(&link.scope, &link.id).unwrap();

        let failures =
            batch_delete_entities(session.as_ref(), "p", &[bake.into(), cake.clone().into()], Some("d"))
                .unwrap();
        assert!(failures.is_empty());
        assert!(runs.get(DEFAULT_SCOPE, cake.uid().unwrap()).is_err());
    }

    #[test]
    fn test_entity_without_uid_rejected() {
        let session = InMemorySession::with_api_key("key").unwrap();
        let err = batch_delete_entities(&session, "p", &[MaterialRun::new("cake").into()], None)
            .unwrap_err();
        assert!(matches!(err, Error::Validation(ValidationError::MissingUid(_))));
        assert_eq!(session.request_count(), 0);
    }
}
