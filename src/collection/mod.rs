//! Remote-backed, per-type collections.
//!
//! A [`DataConceptsCollection<T>`] is bound to one project, optionally one
//! dataset, and exactly one concrete entity type. Writes need a dataset;
//! reads without one span the whole project.
//!
//! Every call is a fresh round trip through the [`Session`]; nothing is
//! cached.

pub mod paged;

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::bounds::Bounds;
use crate::codec::{self, decode_as};
use crate::config::ListOptions;
use crate::entity::{
    ConcreteEntity, ConditionTemplate, Entity, IngredientRun, IngredientSpec, MaterialRun,
    MaterialSpec, MaterialTemplate, MeasurementRun, MeasurementSpec, MeasurementTemplate,
    ParameterTemplate, ProcessRun, ProcessSpec, ProcessTemplate, PropertyTemplate, TypeTag,
};
use crate::error::{Error, Result, ValidationError};
use crate::link::{LinkByUid, LinkOr};
use crate::session::{segment, QueryParams, Session};
use crate::validate::{check_placement, output_materials_to_confirm, outbound_links, validate};

pub use paged::PagedIter;

/// Collection of `T` inside one project (and optionally one dataset).
pub struct DataConceptsCollection<T> {
    project_id: String,
    dataset_id: Option<String>,
    session: Arc<dyn Session>,
    _marker: PhantomData<fn() -> T>,
}

/// Collection of [`ConditionTemplate`]s.
pub type ConditionTemplateCollection = DataConceptsCollection<ConditionTemplate>;
/// Collection of [`ParameterTemplate`]s.
pub type ParameterTemplateCollection = DataConceptsCollection<ParameterTemplate>;
/// Collection of [`PropertyTemplate`]s.
pub type PropertyTemplateCollection = DataConceptsCollection<PropertyTemplate>;
/// Collection of [`MaterialTemplate`]s.
pub type MaterialTemplateCollection = DataConceptsCollection<MaterialTemplate>;
/// Collection of [`ProcessTemplate`]s.
pub type ProcessTemplateCollection = DataConceptsCollection<ProcessTemplate>;
/// Collection of [`MeasurementTemplate`]s.
pub type MeasurementTemplateCollection = DataConceptsCollection<MeasurementTemplate>;
/// Collection of [`MaterialSpec`]s.
pub type MaterialSpecCollection = DataConceptsCollection<MaterialSpec>;
/// Collection of [`ProcessSpec`]s.
pub type ProcessSpecCollection = DataConceptsCollection<ProcessSpec>;
/// Collection of [`IngredientSpec`]s.
pub type IngredientSpecCollection = DataConceptsCollection<IngredientSpec>;
/// Collection of [`MeasurementSpec`]s.
pub type MeasurementSpecCollection = DataConceptsCollection<MeasurementSpec>;
/// Collection of [`MaterialRun`]s.
pub type MaterialRunCollection = DataConceptsCollection<MaterialRun>;
/// Collection of [`ProcessRun`]s.
pub type ProcessRunCollection = DataConceptsCollection<ProcessRun>;
/// Collection of [`IngredientRun`]s.
pub type IngredientRunCollection = DataConceptsCollection<IngredientRun>;
/// Collection of [`MeasurementRun`]s.
pub type MeasurementRunCollection = DataConceptsCollection<MeasurementRun>;

impl<T> Clone for DataConceptsCollection<T> {
    fn clone(&self) -> Self {
        Self {
            project_id: self.project_id.clone(),
            dataset_id: self.dataset_id.clone(),
            session: Arc::clone(&self.session),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for DataConceptsCollection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataConceptsCollection")
            .field("project_id", &self.project_id)
            .field("dataset_id", &self.dataset_id)
            .finish_non_exhaustive()
    }
}

impl<T: ConcreteEntity> DataConceptsCollection<T> {
    /// Bind a collection to a project and, for writes, a dataset.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        dataset_id: Option<&str>,
        session: Arc<dyn Session>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            dataset_id: dataset_id.map(str::to_string),
            session,
            _marker: PhantomData,
        }
    }

    /// The concrete type this collection holds.
    #[must_use]
    pub const fn get_type(&self) -> TypeTag {
        T::TYPE
    }

    /// Owning project.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Dataset writes go to, if any.
    #[must_use]
    pub fn dataset_id(&self) -> Option<&str> {
        self.dataset_id.as_deref()
    }

    /// Session the collection talks through.
    #[must_use]
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// Decode a wire record locally. No network call.
    ///
    /// # Errors
    ///
    /// [`Error::Decode`] for a malformed record, [`Error::TypeMismatch`]
    /// for a record of another type.
    pub fn build(&self, record: &Value) -> Result<T> {
        decode_as(record)
    }

    /// Validate, encode and create-or-update `obj`, returning the stored
    /// object with server-assigned identifiers.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] before any write when a bound is violated or a
    /// link resolves nowhere; otherwise any remote failure. `obj` is never
    /// modified.
    pub fn register(&self, obj: &T) -> Result<T> {
        self.write(obj, false)
    }

    /// Run [`register`](Self::register) without persisting anything.
    ///
    /// # Errors
    ///
    /// As [`register`](Self::register).
    pub fn register_dry_run(&self, obj: &T) -> Result<T> {
        self.write(obj, true)
    }

    /// Register several objects in one request. Objects may link to each
    /// other. The result has the input's order and length.
    ///
    /// # Errors
    ///
    /// As [`register`](Self::register); nothing is written when any object
    /// fails validation.
    pub fn register_all(&self, objs: &[T]) -> Result<Vec<T>> {
        let dataset = self.require_dataset("register")?;
        let batch: Vec<Entity> = objs.iter().cloned().map(Into::into).collect();
        for obj in objs {
            self.prepare(obj, &batch, dataset)?;
        }
        let objects = objs.iter().map(codec::encode).collect::<Result<Vec<_>>>()?;
        let path = format!(
            "projects/{}/datasets/{}/batch",
            segment(&self.project_id),
            segment(dataset)
        );
        let response = self
            .session
            .put(&path, &json!({ "objects": objects }), &QueryParams::new())?;
        info!(resource = T::TYPE.resource(), count = objs.len(), "registered batch");
        response
            .get("objects")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Decode("batch response has no 'objects' list".to_string()))?
            .iter()
            .map(decode_as)
            .collect()
    }

    /// Replace a registered object in full.
    ///
    /// # Errors
    ///
    /// [`ValidationError::MissingUid`] when `obj` has no identifier, else
    /// as [`register`](Self::register).
    pub fn update(&self, obj: &T) -> Result<T> {
        let link = obj
            .to_link()
            .ok_or_else(|| ValidationError::MissingUid(format!("{} '{}'", T::TYPE, obj.name())))?;
        let dataset = self.require_dataset("update")?;
        self.prepare(obj, &[], dataset)?;
        let path = format!(
            "projects/{}/datasets/{}/{}/{}/{}",
            segment(&self.project_id),
            segment(dataset),
            T::TYPE.resource(),
            segment(&link.scope),
            segment(&link.id)
        );
        let response = self
            .session
            .put(&path, &codec::encode(obj)?, &QueryParams::new())?;
        debug!(%path, "updated");
        decode_as(&response)
    }

    /// Fetch by identifier.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when absent or soft-deleted.
    pub fn get(&self, scope: &str, id: &str) -> Result<T> {
        self.fetch(scope, id, false)
    }

    /// Fetch by identifier, soft-deleted objects included.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when absent.
    pub fn get_including_deleted(&self, scope: &str, id: &str) -> Result<T> {
        self.fetch(scope, id, true)
    }

    /// Resolve a field to an object, fetching only when it holds a link.
    ///
    /// # Errors
    ///
    /// As [`get`](Self::get).
    pub fn resolve(&self, field: &LinkOr<T>) -> Result<T> {
        match field {
            LinkOr::Object(obj) => Ok((**obj).clone()),
            LinkOr::Link(link) => self.get(&link.scope, &link.id),
        }
    }

    /// Every live object, in creation order.
    #[must_use]
    pub fn list(&self) -> PagedIter<T> {
        self.list_with(ListOptions::default())
    }

    /// Every object, with explicit paging options.
    #[must_use]
    pub fn list_with(&self, options: ListOptions) -> PagedIter<T> {
        PagedIter::get(
            Arc::clone(&self.session),
            self.resource_path(),
            self.list_params(options),
        )
    }

    /// Objects whose name contains `name` (or equals it, when `exact`),
    /// ignoring case.
    #[must_use]
    pub fn filter_by_name(&self, name: &str, exact: bool) -> PagedIter<T> {
        let params = self
            .list_params(ListOptions::default())
            .with("name", name)
            .with("exact", exact);
        PagedIter::get(
            Arc::clone(&self.session),
            format!("{}/filter-by-name", self.resource_path()),
            params,
        )
    }

    /// Objects carrying any (or, with `match_all`, every) of `tags`. A tag
    /// also matches its `::`-delimited refinements.
    #[must_use]
    pub fn filter_by_tags(&self, tags: &[&str], match_all: bool) -> PagedIter<T> {
        let mut params = self.list_params(ListOptions::default());
        for tag in tags {
            params.push("tags", tag);
        }
        params.push("match_all", match_all);
        PagedIter::get(
            Arc::clone(&self.session),
            format!("{}/filter-by-tags", self.resource_path()),
            params,
        )
    }

    /// Objects with, for every entry, an attribute linked to that attribute
    /// template whose value lies within the bounds.
    #[must_use]
    pub fn filter_by_attribute_bounds(
        &self,
        attribute_bounds: &BTreeMap<LinkByUid, Bounds>,
    ) -> PagedIter<T> {
        let pairs: Vec<Value> = attribute_bounds
            .iter()
            .map(|(template, bounds)| json!({ "template": template.to_value(), "bounds": bounds }))
            .collect();
        PagedIter::post(
            Arc::clone(&self.session),
            format!("{}/filter-by-attribute-bounds", self.resource_path()),
            self.list_params(ListOptions::default()),
            json!({ "attribute_bounds": pairs }),
        )
    }

    /// Objects of this collection's type that link to the object of type
    /// `relation` identified by `link`.
    #[must_use]
    pub fn list_related(&self, relation: TypeTag, link: &LinkByUid) -> PagedIter<T> {
        let path = format!(
            "projects/{}/{}/{}/{}/{}",
            segment(&self.project_id),
            relation.resource(),
            segment(&link.scope),
            segment(&link.id),
            T::TYPE.resource()
        );
        PagedIter::get(
            Arc::clone(&self.session),
            path,
            self.list_params(ListOptions::default()),
        )
    }

    /// Soft-delete an object.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when absent; a non-retryable error when another
    /// live object still links to it.
    pub fn delete(&self, scope: &str, id: &str) -> Result<()> {
        self.remove(scope, id, false)
    }

    /// Check that [`delete`](Self::delete) would succeed, changing nothing.
    ///
    /// # Errors
    ///
    /// As [`delete`](Self::delete).
    pub fn delete_dry_run(&self, scope: &str, id: &str) -> Result<()> {
        self.remove(scope, id, true)
    }

    fn require_dataset(&self, operation: &'static str) -> Result<&str> {
        self.dataset_id
            .as_deref()
            .ok_or(Error::Validation(ValidationError::MissingDataset(operation)))
    }

    fn resource_path(&self) -> String {
        format!("projects/{}/{}", segment(&self.project_id), T::TYPE.resource())
    }

    fn list_params(&self, options: ListOptions) -> QueryParams {
        let mut params = QueryParams::new().with("per_page", options.per_page);
        if let Some(dataset) = &self.dataset_id {
            params.push("dataset_id", dataset);
        }
        if !options.forward {
            params.push("forward", false);
        }
        if options.include_deleted {
            params.push("include_deleted", true);
        }
        params
    }

    /// Local validation, then existence checks for every outbound link.
    /// Fetched objects join a second validation pass so linked templates
    /// are enforced too, then graph placement is checked against them.
    fn prepare(&self, obj: &T, batch: &[Entity], dataset: &str) -> Result<()> {
        validate(obj, batch)?;
        let mut context = batch.to_vec();
        if self.fetch_into(outbound_links(obj, batch), &mut context)? {
            validate(obj, &context)?;
        }
        let produced = output_materials_to_confirm(obj, &context);
        self.fetch_into(produced, &mut context)?;
        check_placement(obj, &context, dataset)?;
        Ok(())
    }

    /// Fetch every link into `context`. Returns whether anything was fetched.
    fn fetch_into(
        &self,
        links: Vec<(LinkByUid, TypeTag)>,
        context: &mut Vec<Entity>,
    ) -> Result<bool> {
        let fetched = !links.is_empty();
        for (link, expected) in links {
            match self.fetch_any(expected, &link) {
                Ok(entity) => context.push(entity),
                Err(Error::NotFound(_)) => {
                    return Err(ValidationError::UnresolvedLink {
                        scope: link.scope,
                        id: link.id,
                        expected,
                    }
                    .into())
                }
                Err(err) => return Err(err),
            }
        }
        Ok(fetched)
    }

    /// Fetch any object in the project by link, checking its type.
    /// Soft-deleted targets still count: links to them stay valid.
    fn fetch_any(&self, expected: TypeTag, link: &LinkByUid) -> Result<Entity> {
        let path = format!(
            "projects/{}/{}/{}/{}",
            segment(&self.project_id),
            expected.resource(),
            segment(&link.scope),
            segment(&link.id)
        );
        let params = QueryParams::new().with("include_deleted", true);
        let entity = codec::decode(&self.session.get(&path, &params)?)?;
        if entity.type_tag() != expected {
            return Err(Error::TypeMismatch {
                expected,
                found: entity.type_tag().to_string(),
            });
        }
        Ok(entity)
    }

    fn write(&self, obj: &T, dry_run: bool) -> Result<T> {
        let dataset = self.require_dataset("register")?;
        self.prepare(obj, &[], dataset)?;
        let path = format!(
            "projects/{}/datasets/{}/{}",
            segment(&self.project_id),
            segment(dataset),
            T::TYPE.resource()
        );
        let mut params = QueryParams::new();
        if dry_run {
            params.push("dry_run", true);
        }
        let response = self.session.post(&path, &codec::encode(obj)?, &params)?;
        debug!(%path, dry_run, name = obj.name(), "registered");
        decode_as(&response)
    }

    fn fetch(&self, scope: &str, id: &str, include_deleted: bool) -> Result<T> {
        let path = match &self.dataset_id {
            Some(dataset) => format!(
                "projects/{}/datasets/{}/{}/{}/{}",
                segment(&self.project_id),
                segment(dataset),
                T::TYPE.resource(),
                segment(scope),
                segment(id)
            ),
            None => format!(
                "projects/{}/{}/{}/{}",
                segment(&self.project_id),
                T::TYPE.resource(),
                segment(scope),
                segment(id)
            ),
        };
        let mut params = QueryParams::new();
        if include_deleted {
            params.push("include_deleted", true);
        }
        let record = self.session.get(&path, &params)?;
        debug!(%path, "fetched");
        decode_as(&record)
    }

    fn remove(&self, scope: &str, id: &str, dry_run: bool) -> Result<()> {
        let dataset = self.require_dataset("delete")?;
        let path = format!(
            "projects/{}/datasets/{}/{}/{}/{}",
            segment(&self.project_id),
            segment(dataset),
            T::TYPE.resource(),
            segment(scope),
            segment(id)
        );
        let mut params = QueryParams::new();
        if dry_run {
            params.push("dry_run", true);
        }
        self.session.delete(&path, &params)?;
        debug!(%path, dry_run, "deleted");
        Ok(())
    }
}
