//! Tests for error types and their classification

use std::sync::Arc;

use data_concepts::session::QueryParams;
use data_concepts::{
    DataConceptsCollection, Error, InMemorySession, MaterialRun, Session, TypeTag, ValidationError,
};

#[test]
fn test_not_found_error() {
    let error = Error::from_status(404, "no such run");
    let error_str = format!("{error}");
    assert!(error_str.contains("Not found"));
    assert!(error_str.contains("no such run"));
    assert!(!error.is_retryable());
}

#[test]
fn test_retryable_statuses() {
    for status in [408, 429, 500, 502, 503, 504] {
        let error = Error::from_status(status, "try later");
        assert!(error.is_retryable(), "status {status} should be retryable");
        assert!(format!("{error}").contains(&status.to_string()));
    }
}

#[test]
fn test_non_retryable_statuses() {
    for status in [400, 403, 409, 422] {
        let error = Error::from_status(status, "rejected");
        assert!(matches!(error, Error::NonRetryable { .. }));
        assert!(!error.is_retryable());
    }
}

#[test]
fn test_unauthorized_variants() {
    assert!(matches!(
        Error::from_status(401, "invalid api key"),
        Error::Unauthorized(_)
    ));
    assert!(matches!(
        Error::from_status(401, "refresh token expired"),
        Error::UnauthorizedRefreshToken(_)
    ));
}

#[test]
fn test_decode_error_names_tag() {
    let error = "steel_ingot".parse::<TypeTag>().unwrap_err();
    let error_str = format!("{error}");
    assert!(error_str.contains("Decode error"));
    assert!(error_str.contains("steel_ingot"));
}

#[test]
fn test_type_mismatch_error() {
    let error = Error::TypeMismatch {
        expected: TypeTag::MeasurementSpec,
        found: "process_spec".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Type mismatch"));
    assert!(error_str.contains("measurement_spec"));
    assert!(error_str.contains("process_spec"));
}

#[test]
fn test_validation_error_wraps() {
    let error: Error = ValidationError::OutOfBounds {
        attribute: "Temperature".to_string(),
        value: "150 degC".to_string(),
        bounds: "[0, 100] degC".to_string(),
    }
    .into();
    let error_str = format!("{error}");
    assert!(error_str.contains("Validation failed"));
    assert!(error_str.contains("Temperature"));
    assert!(!error.is_retryable());
}

#[test]
fn test_ambiguous_name_error() {
    let error = Error::AmbiguousName {
        name: "flour".to_string(),
        count: 3,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Ambiguous name"));
    assert!(error_str.contains("flour"));
    assert!(error_str.contains('3'));
}

#[test]
fn test_session_surfaces_injected_failures() {
    let session = Arc::new(InMemorySession::with_api_key("key").unwrap());
    let runs = DataConceptsCollection::<MaterialRun>::new("p", Some("d"), session.clone());

    session.fail_next(503);
    let err = runs.register(&MaterialRun::new("cake")).unwrap_err();
    assert!(err.is_retryable());
    assert!(session.is_empty());

    session.fail_next(422);
    let err = runs.register(&MaterialRun::new("cake")).unwrap_err();
    assert!(matches!(err, Error::NonRetryable { status: 422, .. }));

    assert!(runs.register(&MaterialRun::new("cake")).is_ok());
}

#[test]
fn test_credentials_surface_without_retry() {
    let session = Arc::new(InMemorySession::with_api_key("key").unwrap());
    let runs = DataConceptsCollection::<MaterialRun>::new("p", Some("d"), session.clone());

    session.revoke_credentials();
    assert!(matches!(
        runs.get("id", "anything"),
        Err(Error::Unauthorized(_))
    ));
    assert_eq!(session.request_count(), 1);

    session.expire_token();
    assert!(matches!(
        session.get("projects/p/material-runs", &QueryParams::new()),
        Err(Error::UnauthorizedRefreshToken(_))
    ));
}

#[test]
fn test_invalid_config_error() {
    let error = InMemorySession::with_api_key("").unwrap_err();
    assert!(matches!(error, Error::Config(_)));
    assert!(format!("{error}").contains("Invalid configuration"));
}
