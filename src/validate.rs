//! Client-side validation run before any write.
//!
//! Every entity embedded in the object graph is indexed by each of its uids,
//! together with any caller-supplied context (objects already fetched from
//! the data store). A link is *resolvable* when it points into that index.
//! Checks that need an unresolvable target are skipped, never failed.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::warn;

use crate::bounds::Bounds;
use crate::entity::{DataConcept, Entity, Reference, ReferenceKind, TypeTag};
use crate::error::ValidationError;
use crate::link::LinkByUid;
use crate::value::BaseValue;

/// Graph-wide lookup of entities by uid.
#[derive(Debug, Default)]
pub struct Index<'a> {
    by_uid: FxHashMap<LinkByUid, &'a dyn DataConcept>,
}

impl<'a> Index<'a> {
    /// Index `root`, everything embedded in it, and `context`.
    #[must_use]
    pub fn build(root: &'a dyn DataConcept, context: &'a [Entity]) -> Self {
        let mut index = Self::default();
        for nodes in [vec![root], context.iter().map(Entity::as_concept).collect()] {
            for node in nodes {
                for embedded in embedded_nodes(node) {
                    index.insert(embedded);
                }
            }
        }
        index
    }

    fn insert(&mut self, node: &'a dyn DataConcept) {
        for (scope, id) in &node.core().uids {
            self.by_uid
                .entry(LinkByUid::new(scope.clone(), id.clone()))
                .or_insert(node);
        }
    }

    /// Object a reference points at, if embedded or indexed.
    #[must_use]
    pub fn resolve(&self, reference: &Reference<'a>) -> Option<&'a dyn DataConcept> {
        match reference.kind {
            ReferenceKind::Object(obj) => Some(obj),
            ReferenceKind::Link(link) => self.by_uid.get(link).copied(),
        }
    }

    /// Whether `link` points at an indexed object.
    #[must_use]
    pub fn contains(&self, link: &LinkByUid) -> bool {
        self.by_uid.contains_key(link)
    }
}

/// Every outgoing reference of `node`: entity fields plus attribute
/// templates.
pub(crate) fn all_references(node: &dyn DataConcept) -> Vec<Reference<'_>> {
    let mut refs = node.references();
    refs.extend(node.attributes().into_iter().filter_map(|a| a.template));
    refs
}

/// `root` and every entity embedded beneath it, depth first.
pub(crate) fn embedded_nodes(root: &dyn DataConcept) -> Vec<&dyn DataConcept> {
    let mut nodes = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        nodes.push(node);
        for reference in all_references(node) {
            if let ReferenceKind::Object(obj) = reference.kind {
                stack.push(obj);
            }
        }
    }
    nodes
}

/// Validate `root` and everything embedded in it.
///
/// `context` supplies already-registered objects so linked templates can be
/// resolved. Returns the first violation found.
///
/// # Errors
///
/// Returns the [`ValidationError`] describing the first violation.
pub fn validate(root: &dyn DataConcept, context: &[Entity]) -> Result<(), ValidationError> {
    let index = Index::build(root, context);
    let result = embedded_nodes(root)
        .into_iter()
        .try_for_each(|node| check_node(node, &index));
    if let Err(err) = &result {
        warn!(entity = root.name(), type_tag = %root.type_tag(), error = %err, "validation rejected");
    }
    result
}

/// Links the write form of `root` will carry that `context` does not
/// satisfy, excluding back references. Each must exist remotely for a write
/// to succeed.
///
/// Mirrors [`encode`](crate::codec::encode): a nested object that already
/// has a uid travels as a link, one without is embedded and walked.
#[must_use]
pub fn outbound_links(root: &dyn DataConcept, context: &[Entity]) -> Vec<(LinkByUid, TypeTag)> {
    let mut known: FxHashSet<LinkByUid> = context
        .iter()
        .flat_map(|entity| entity.as_concept().core().uids.iter())
        .map(|(scope, id)| LinkByUid::new(scope.clone(), id.clone()))
        .collect();
    known.extend(
        root.core()
            .uids
            .iter()
            .map(|(scope, id)| LinkByUid::new(scope.clone(), id.clone())),
    );

    let mut links = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        for reference in all_references(node) {
            if reference.back_reference {
                continue;
            }
            let link = match reference.kind {
                ReferenceKind::Link(link) => link.clone(),
                ReferenceKind::Object(obj) => match obj.to_link() {
                    Some(link) => link,
                    None => {
                        stack.push(obj);
                        continue;
                    }
                },
            };
            if known.insert(link.clone()) {
                links.push((link, reference.target));
            }
        }
    }
    links
}

fn identifies(node: &dyn DataConcept, link: &LinkByUid) -> bool {
    node.core().uids.get(&link.scope) == Some(&link.id)
}

fn find_in<'a>(context: &'a [Entity], link: &LinkByUid) -> Option<&'a dyn DataConcept> {
    context
        .iter()
        .map(Entity::as_concept)
        .find(|entity| identifies(*entity, link))
}

fn forward_reference(node: &dyn DataConcept, field: &str) -> Option<LinkByUid> {
    node.references()
        .into_iter()
        .find(|r| r.field == field && !r.back_reference)
        .and_then(|r| reference_link(&r))
}

/// For each material in `root` whose registered process in `context`
/// already produces something: the link to that product and its type.
fn produced_materials<'a>(
    root: &'a dyn DataConcept,
    context: &'a [Entity],
) -> Vec<(&'a dyn DataConcept, LinkByUid, TypeTag)> {
    embedded_nodes(root)
        .into_iter()
        .filter(|node| matches!(node.type_tag(), TypeTag::MaterialRun | TypeTag::MaterialSpec))
        .filter_map(|material| {
            let process = find_in(context, &forward_reference(material, "process")?)?;
            let output = process
                .references()
                .into_iter()
                .find(|r| r.field == "output_material")?;
            Some((material, reference_link(&output)?, output.target))
        })
        .collect()
}

/// Products of `root`'s processes that `context` must hold before
/// [`check_placement`] can tell them apart from `root`'s own materials.
#[must_use]
pub fn output_materials_to_confirm(
    root: &dyn DataConcept,
    context: &[Entity],
) -> Vec<(LinkByUid, TypeTag)> {
    produced_materials(root, context)
        .into_iter()
        .filter(|(material, existing, _)| {
            !identifies(*material, existing) && find_in(context, existing).is_none()
        })
        .map(|(_, existing, target)| (existing, target))
        .collect()
}

/// Graph rules that need registered neighbours from `context`:
/// - a process produces at most one material
/// - an ingredient's process and material belong to `dataset`
///
/// Targets missing from `context` are skipped.
///
/// # Errors
///
/// [`ValidationError::OutputMaterialTaken`] or
/// [`ValidationError::ForeignDataset`] for the first violation.
pub fn check_placement(
    root: &dyn DataConcept,
    context: &[Entity],
    dataset: &str,
) -> Result<(), ValidationError> {
    for (material, existing, _) in produced_materials(root, context) {
        let same = identifies(material, &existing)
            || find_in(context, &existing)
                .is_some_and(|other| other.core().shares_uid(material.core()));
        if !same {
            let process = forward_reference(material, "process")
                .map(|link| link.to_string())
                .unwrap_or_default();
            return Err(ValidationError::OutputMaterialTaken {
                process,
                material: material.name().to_string(),
                existing: existing.to_string(),
            });
        }
    }

    for node in embedded_nodes(root) {
        let Some(ingredient) = node.ingredient() else {
            continue;
        };
        for field in ["process", "material"] {
            let Some(link) = forward_reference(node, field) else {
                continue;
            };
            let found = find_in(context, &link).and_then(|target| target.core().dataset.as_deref());
            if let Some(found) = found.filter(|found| *found != dataset) {
                return Err(ValidationError::ForeignDataset {
                    ingredient: ingredient.name.to_string(),
                    field,
                    link: link.to_string(),
                    dataset: dataset.to_string(),
                    found: found.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn check_node<'a>(node: &'a dyn DataConcept, index: &Index<'a>) -> Result<(), ValidationError> {
    check_links(node)?;
    check_template_entries(node, index)?;
    check_attributes(node, index)?;
    check_ingredient(node, index)
}

fn check_links(node: &dyn DataConcept) -> Result<(), ValidationError> {
    for reference in all_references(node) {
        if let ReferenceKind::Link(link) = reference.kind {
            if link.scope.trim().is_empty() || link.id.trim().is_empty() {
                return Err(ValidationError::InvalidLink {
                    field: reference.field,
                });
            }
        }
    }
    Ok(())
}

/// Narrowed bounds on an object template must lie within the attribute
/// template's declared bounds.
fn check_template_entries<'a>(
    node: &'a dyn DataConcept,
    index: &Index<'a>,
) -> Result<(), ValidationError> {
    for entry in node.template_entries() {
        let (Some(narrowed), Some(template)) = (entry.bounds, index.resolve(&entry.template))
        else {
            continue;
        };
        if let Some(declared) = template.attribute_bounds() {
            if !declared.includes(narrowed) {
                return Err(ValidationError::IncompatibleBounds {
                    template: template.name().to_string(),
                    narrowed: narrowed.to_string(),
                    declared: declared.to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Object template governing `node`: its own, or its spec's.
fn object_template<'a>(
    node: &'a dyn DataConcept,
    index: &Index<'a>,
) -> Option<&'a dyn DataConcept> {
    if let Some(reference) = node.template() {
        return index.resolve(&reference);
    }
    let spec = index.resolve(&node.spec()?)?;
    index.resolve(&spec.template()?)
}

fn reference_link(reference: &Reference<'_>) -> Option<LinkByUid> {
    match reference.kind {
        ReferenceKind::Link(link) => Some(link.clone()),
        ReferenceKind::Object(obj) => obj.to_link(),
    }
}

fn check_attributes<'a>(
    node: &'a dyn DataConcept,
    index: &Index<'a>,
) -> Result<(), ValidationError> {
    let attributes = node.attributes();
    if attributes.is_empty() {
        return Ok(());
    }

    let mut narrowed: FxHashMap<LinkByUid, &Bounds> = FxHashMap::default();
    if let Some(template) = object_template(node, index) {
        for entry in template.template_entries() {
            if let (Some(bounds), Some(link)) = (entry.bounds, reference_link(&entry.template)) {
                narrowed.insert(link, bounds);
            }
        }
    }

    for attribute in attributes {
        let (Some(value), Some(reference)) = (attribute.value, attribute.template) else {
            continue;
        };
        if let Some(bounds) = index.resolve(&reference).and_then(|t| t.attribute_bounds()) {
            ensure_contains(attribute.name, value, bounds)?;
        }
        if let Some(bounds) = reference_link(&reference).and_then(|l| narrowed.get(&l).copied()) {
            ensure_contains(attribute.name, value, bounds)?;
        }
    }
    Ok(())
}

fn ensure_contains(name: &str, value: &BaseValue, bounds: &Bounds) -> Result<(), ValidationError> {
    if bounds.contains(value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfBounds {
            attribute: name.to_string(),
            value: value.to_string(),
            bounds: bounds.to_string(),
        })
    }
}

fn fraction_in_unit_interval(value: &BaseValue) -> bool {
    let unit = |x: f64| (0.0..=1.0).contains(&x);
    match value {
        BaseValue::NominalReal { nominal, .. } => unit(*nominal),
        BaseValue::UniformReal {
            lower_bound,
            upper_bound,
            ..
        } => unit(*lower_bound) && unit(*upper_bound),
        BaseValue::NormalReal { mean, .. } => unit(*mean),
        BaseValue::Unknown => true,
        _ => false,
    }
}

fn check_ingredient<'a>(
    node: &'a dyn DataConcept,
    index: &Index<'a>,
) -> Result<(), ValidationError> {
    let Some(ingredient) = node.ingredient() else {
        return Ok(());
    };

    for (field, value) in ingredient.fractions {
        if let Some(value) = value {
            if !fraction_in_unit_interval(value) {
                return Err(ValidationError::InvalidFraction {
                    ingredient: ingredient.name.to_string(),
                    field,
                    value: value.to_string(),
                });
            }
        }
    }

    let Some(template) = ingredient
        .process
        .and_then(|p| index.resolve(&p))
        .and_then(|process| object_template(process, index))
    else {
        return Ok(());
    };
    let (allowed_names, allowed_labels) = template.allowed_ingredients();
    if let Some(names) = allowed_names {
        if !names.iter().any(|n| n == ingredient.name) {
            return Err(ValidationError::NameNotAllowed {
                name: ingredient.name.to_string(),
                template: template.name().to_string(),
            });
        }
    }
    if let Some(labels) = allowed_labels {
        if let Some(label) = ingredient.labels.iter().find(|l| !labels.contains(l)) {
            return Err(ValidationError::LabelNotAllowed {
                label: label.clone(),
                template: template.name().to_string(),
            });
        }
    }
    Ok(())
}
