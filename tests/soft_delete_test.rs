//! Integration tests for soft delete visibility

use std::sync::Arc;

use data_concepts::collection::{MaterialRunCollection, ProcessRunCollection, ProcessSpecCollection};
use data_concepts::config::ListOptions;
use data_concepts::{
    DataConcept, Error, InMemorySession, LinkOr, MaterialRun, ProcessRun, ProcessSpec,
    ValidationError,
};

fn specs() -> (Arc<InMemorySession>, ProcessSpecCollection) {
    let store = Arc::new(InMemorySession::with_api_key("key").unwrap());
    let specs = ProcessSpecCollection::new("p", Some("d"), store.clone());
    (store, specs)
}

#[test]
fn test_deleted_object_hidden_by_default() {
    let (_, specs) = specs();
    let bake = specs.register(&ProcessSpec::new("Bake")).unwrap();
    specs.register(&ProcessSpec::new("Mix")).unwrap();
    let id = bake.uid().unwrap();

    specs.delete("id", id).unwrap();

    let live: Vec<String> = specs.list().map(|s| s.unwrap().name).collect();
    assert_eq!(live, ["Mix"]);
    assert_eq!(specs.filter_by_name("bake", false).count(), 0);
    assert!(matches!(specs.get("id", id), Err(Error::NotFound(_))));

    let deleted = specs.get_including_deleted("id", id).unwrap();
    assert_eq!(deleted.name, "Bake");
    let everything = specs
        .list_with(ListOptions::default().include_deleted(true))
        .count();
    assert_eq!(everything, 2);
}

#[test]
fn test_delete_twice_is_not_found() {
    let (_, specs) = specs();
    let bake = specs.register(&ProcessSpec::new("Bake")).unwrap();
    specs.delete("id", bake.uid().unwrap()).unwrap();
    assert!(matches!(
        specs.delete("id", bake.uid().unwrap()),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_delete_dry_run_changes_nothing() {
    let (_, specs) = specs();
    let bake = specs.register(&ProcessSpec::new("Bake")).unwrap();
    specs.delete_dry_run("id", bake.uid().unwrap()).unwrap();
    assert!(specs.get("id", bake.uid().unwrap()).is_ok());
}

#[test]
fn test_referenced_object_cannot_be_deleted() {
    let store = Arc::new(InMemorySession::with_api_key("key").unwrap());
    let runs = MaterialRunCollection::new("p", Some("d"), store.clone());
    let processes = ProcessRunCollection::new("p", Some("d"), store);
    let cake = runs
        .register(&MaterialRun::new("cake").with_process(ProcessRun::new("bake")))
        .unwrap();
    let bake = cake.process.as_ref().and_then(LinkOr::to_link).unwrap();

    let err = processes.delete(&bake.scope, &bake.id).unwrap_err();
    assert!(matches!(err, Error::NonRetryable { status: 409, .. }));
    assert!(!err.is_retryable());

    runs.delete("id", cake.uid().unwrap()).unwrap();
    processes.delete(&bake.scope, &bake.id).unwrap();
}

#[test]
fn test_deleted_object_reachable_from_history() {
    let store = Arc::new(InMemorySession::with_api_key("key").unwrap());
    let runs = MaterialRunCollection::new("p", Some("d"), store.clone());
    let processes = ProcessRunCollection::new("p", Some("d"), store);

    let bake = processes.register(&ProcessRun::new("bake")).unwrap();
    processes.delete("id", bake.uid().unwrap()).unwrap();

    let cake = runs
        .register(&MaterialRun::new("cake").with_process(bake.to_link().unwrap()))
        .unwrap();
    let history = runs.get_history("id", cake.uid().unwrap()).unwrap();
    let process = history.process.as_ref().and_then(LinkOr::as_object).unwrap();
    assert_eq!(process.name, "bake");
    assert_eq!(processes.list().count(), 0);
}

#[test]
fn test_delete_needs_dataset() {
    let store = Arc::new(InMemorySession::with_api_key("key").unwrap());
    let specs = ProcessSpecCollection::new("p", None, store);
    assert!(matches!(
        specs.delete("id", "anything"),
        Err(Error::Validation(ValidationError::MissingDataset("delete")))
    ));
}
