//! # data-concepts: Typed Materials Data With Remote Collections
//!
//! **Version**: 0.1.0
//!
//! A closed family of linked entities (templates, specs and runs of
//! materials, processes, ingredients and measurements), a polymorphic JSON
//! codec for them, and per-type collections that validate, register, fetch
//! and page through them over a pluggable [`Session`].
//!
//! ## Design Principles
//!
//! - **Closed family**: every wire record decodes to exactly one [`Entity`]
//!   variant or fails with a decode error naming the unknown tag
//! - **Links are values**: a [`LinkByUid`] is a lookup key, never a pointer;
//!   resolution is an explicit call through a collection
//! - **Fail before the wire**: bounds, fractions and link targets are
//!   checked locally before any write is sent
//! - **Lazy traversal**: listings are pull-based page cursors, never
//!   materialized up front
//!
//! ## Example Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use data_concepts::{
//!     BaseValue, Bounds, Condition, ConditionTemplate, DataConcept, DataConceptsCollection,
//!     InMemorySession, ProcessSpec,
//! };
//!
//! let session = Arc::new(InMemorySession::with_api_key("secret")?);
//! let specs = DataConceptsCollection::<ProcessSpec>::new("project", Some("dataset"), session);
//!
//! let oven = ConditionTemplate::new("Oven temperature", Bounds::real(0.0, 300.0, "degC"));
//! let bake = ProcessSpec::new("bake").with_condition(
//!     Condition::new("Oven temperature")
//!         .with_value(BaseValue::nominal_real(180.0, "degC"))
//!         .with_template(oven),
//! );
//!
//! let stored = specs.register(&bake)?;
//! assert!(stored.uid().is_some());
//! assert_eq!(specs.list().count(), 1);
//! # Ok::<(), data_concepts::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod attribute;
pub mod bounds;
pub mod codec;
pub mod collection;
pub mod config;
pub mod delete;
pub mod entity;
pub mod error;
pub mod file_link;
pub mod history;
pub mod link;
pub mod logging;
pub mod seeding;
pub mod session;
pub mod validate;
pub mod value;

pub use attribute::{Condition, Origin, Parameter, Property, PropertyAndConditions};
pub use bounds::Bounds;
pub use collection::{DataConceptsCollection, PagedIter};
pub use config::{ListOptions, SessionConfig};
pub use entity::{
    ConcreteEntity, ConditionTemplate, DataConcept, Entity, IngredientRun, IngredientSpec,
    MaterialRun, MaterialSpec, MaterialTemplate, MeasurementRun, MeasurementSpec,
    MeasurementTemplate, ParameterTemplate, ProcessRun, ProcessSpec, ProcessTemplate,
    PropertyTemplate, TypeTag,
};
pub use error::{Error, Result, ValidationError};
pub use file_link::FileLink;
pub use link::{LinkByUid, LinkOr};
pub use session::{InMemorySession, Session};
pub use value::BaseValue;
