//! Integration tests for lazy paged traversal

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use data_concepts::collection::ProcessSpecCollection;
use data_concepts::config::{ListOptions, SessionConfig};
use data_concepts::session::QueryParams;
use data_concepts::{DataConcept, Error, InMemorySession, ProcessSpec, Result, Session};
use serde_json::{json, Value};

fn seeded(count: usize) -> (Arc<InMemorySession>, ProcessSpecCollection) {
    let store = Arc::new(InMemorySession::with_api_key("key").unwrap());
    let specs = ProcessSpecCollection::new("p", Some("d"), store.clone());
    for i in 0..count {
        specs.register(&ProcessSpec::new(format!("step {i:02}"))).unwrap();
    }
    (store, specs)
}

#[test]
fn test_list_yields_every_object_once() {
    let (_, specs) = seeded(23);
    let mut iter = specs.list_with(ListOptions::default().per_page(5));
    let names: Vec<String> = iter.by_ref().map(|s| s.unwrap().name).collect();

    assert_eq!(names.len(), 23);
    assert_eq!(names.first().map(String::as_str), Some("step 00"));
    assert_eq!(names.last().map(String::as_str), Some("step 22"));
    assert_eq!(iter.pages_fetched(), 5);
}

#[test]
fn test_list_is_lazy() {
    let (store, specs) = seeded(10);
    let before = store.request_count();
    let mut iter = specs.list_with(ListOptions::default().per_page(4));
    assert_eq!(store.request_count(), before);

    iter.next().unwrap().unwrap();
    assert_eq!(store.request_count(), before + 1);
    for _ in 0..3 {
        iter.next().unwrap().unwrap();
    }
    assert_eq!(store.request_count(), before + 1);
    iter.next().unwrap().unwrap();
    assert_eq!(store.request_count(), before + 2);
}

#[test]
fn test_list_is_restartable() {
    let (_, specs) = seeded(7);
    let first: Vec<_> = specs.list().map(|s| s.unwrap().uid().map(str::to_string)).collect();
    let second: Vec<_> = specs.list().map(|s| s.unwrap().uid().map(str::to_string)).collect();
    assert_eq!(first, second);
}

#[test]
fn test_backward_traversal() {
    let (_, specs) = seeded(6);
    let names: Vec<String> = specs
        .list_with(ListOptions::default().per_page(4).forward(false))
        .map(|s| s.unwrap().name)
        .collect();
    assert_eq!(names.first().map(String::as_str), Some("step 05"));
    assert_eq!(names.last().map(String::as_str), Some("step 00"));
    assert_eq!(names.len(), 6);
}

#[test]
fn test_empty_collection() {
    let (_, specs) = seeded(0);
    let mut iter = specs.list();
    assert!(iter.next().is_none());
    assert_eq!(iter.pages_fetched(), 1);
}

#[test]
fn test_error_ends_traversal() {
    let (store, specs) = seeded(4);
    let mut iter = specs.list_with(ListOptions::default().per_page(2));
    assert!(iter.next().unwrap().is_ok());
    assert!(iter.next().unwrap().is_ok());

    store.fail_next(503);
    assert!(iter.next().unwrap().unwrap_err().is_retryable());
    assert!(iter.next().is_none());
}

/// Serves the same page forever, with the same continuation token.
struct LoopingSession {
    config: SessionConfig,
    calls: AtomicUsize,
}

impl LoopingSession {
    fn new() -> Self {
        Self {
            config: SessionConfig::builder().host("loop").api_key("k").build().unwrap(),
            calls: AtomicUsize::new(0),
        }
    }

    fn page() -> Value {
        json!({
            "contents": [
                {"type": "process_spec", "name": "a", "uids": {"id": "a"}},
                {"type": "process_spec", "name": "b", "uids": {"id": "b"}},
                {"type": "process_spec", "name": "a again", "uids": {"id": "a"}},
            ],
            "next": "same-token",
        })
    }
}

impl Session for LoopingSession {
    fn get(&self, _path: &str, _params: &QueryParams) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(Self::page())
    }

    fn post(&self, _path: &str, _body: &Value, _params: &QueryParams) -> Result<Value> {
        Err(Error::from_status(405, "read only"))
    }

    fn put(&self, _path: &str, _body: &Value, _params: &QueryParams) -> Result<Value> {
        Err(Error::from_status(405, "read only"))
    }

    fn delete(&self, _path: &str, _params: &QueryParams) -> Result<Value> {
        Err(Error::from_status(405, "read only"))
    }

    fn config(&self) -> &SessionConfig {
        &self.config
    }
}

#[test]
fn test_repeated_token_and_duplicates_terminate() {
    let session = Arc::new(LoopingSession::new());
    let specs = ProcessSpecCollection::new("p", None, session.clone());
    let names: Vec<String> = specs.list().map(|s| s.unwrap().name).collect();

    assert_eq!(names, ["a", "b"]);
    assert_eq!(session.calls.load(Ordering::Relaxed), 2);
}
