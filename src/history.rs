//! Material history: one fully dereferenced tree per material run.
//!
//! The history endpoint answers with the requested run (`roots`) and every
//! record reachable from it (`context`), all in link form. Hydration
//! replaces each link with the context record it names, recursively. A link
//! back to a record already being expanded on the current path stays a
//! link, which is what keeps the result a finite tree.

use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tracing::debug;

use crate::codec::{decode_as, entity_tag, record_link};
use crate::collection::DataConceptsCollection;
use crate::entity::{MaterialRun, TypeTag};
use crate::error::{Error, Result};
use crate::link::LinkByUid;
use crate::session::{segment, QueryParams};

/// Back-reference fields derivable from the records that point the other
/// way: `(owner, field, referrer, referrer field, many)`.
const BACK_REFERENCES: [(TypeTag, &str, TypeTag, &str, bool); 5] = [
    (TypeTag::ProcessRun, "ingredients", TypeTag::IngredientRun, "process", true),
    (TypeTag::ProcessRun, "output_material", TypeTag::MaterialRun, "process", false),
    (TypeTag::ProcessSpec, "ingredients", TypeTag::IngredientSpec, "process", true),
    (TypeTag::ProcessSpec, "output_material", TypeTag::MaterialSpec, "process", false),
    (TypeTag::MaterialRun, "measurements", TypeTag::MeasurementRun, "material", true),
];

impl DataConceptsCollection<MaterialRun> {
    /// Fetch a material run with its full upstream history inlined: the
    /// process that made it, that process's ingredients and their source
    /// materials (recursively), the specs and templates behind each, and
    /// every measurement on each material.
    ///
    /// Soft-deleted records still referenced by live ones are included.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] for an unknown run; [`Error::Decode`] for a
    /// malformed response.
    pub fn get_history(&self, scope: &str, id: &str) -> Result<MaterialRun> {
        let path = format!(
            "projects/{}/material-runs/{}/{}/history",
            segment(self.project_id()),
            segment(scope),
            segment(id)
        );
        let response = self.session().get(&path, &QueryParams::new())?;
        let root = response
            .get("roots")
            .and_then(Value::as_array)
            .and_then(|roots| roots.first())
            .ok_or_else(|| Error::Decode(format!("history for {scope}/{id} has no root")))?;
        let context = response
            .get("context")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice);
        debug!(%path, context = context.len(), "history");
        hydrate(root, context)
    }
}

/// Inline every resolvable link under `root` using `context`.
///
/// # Errors
///
/// [`Error::Decode`] when the hydrated tree is not a material run.
pub fn hydrate(root: &Value, context: &[Value]) -> Result<MaterialRun> {
    let mut records: Vec<Value> = std::iter::once(root)
        .chain(context)
        .cloned()
        .collect();
    fill_back_references(&mut records);

    let graph = Graph::new(&records);
    let mut path = Vec::new();
    let tree = graph.inline(&records[0], &mut path);
    decode_as(&tree)
}

/// Add back-reference fields the server left out, from the referrers
/// present among `records`.
fn fill_back_references(records: &mut [Value]) {
    let mut additions: Vec<(usize, &str, Value)> = Vec::new();
    for (index, owner) in records.iter().enumerate() {
        let Some(tag) = entity_tag(owner) else {
            continue;
        };
        for (owner_tag, field, referrer_tag, referrer_field, many) in BACK_REFERENCES {
            if owner_tag != tag || owner.get(field).is_some_and(|v| !v.is_null()) {
                continue;
            }
            let mut referrers = records.iter().filter(|other| {
                entity_tag(other) == Some(referrer_tag)
                    && other
                        .get(referrer_field)
                        .and_then(LinkByUid::from_value)
                        .is_some_and(|link| identified_by(owner, &link))
            });
            let value = if many {
                let links: Vec<Value> = referrers
                    .filter_map(record_link)
                    .map(|link| link.to_value())
                    .collect();
                if links.is_empty() {
                    continue;
                }
                Value::Array(links)
            } else {
                match referrers.find_map(record_link) {
                    Some(link) => link.to_value(),
                    None => continue,
                }
            };
            additions.push((index, field, value));
        }
    }
    for (index, field, value) in additions {
        if let Some(map) = records[index].as_object_mut() {
            map.insert(field.to_string(), value);
        }
    }
}

fn identified_by(record: &Value, link: &LinkByUid) -> bool {
    record
        .get("uids")
        .and_then(|uids| uids.get(&link.scope))
        .and_then(Value::as_str)
        == Some(link.id.as_str())
}

/// Context records indexed by every uid they carry.
struct Graph<'a> {
    by_uid: FxHashMap<LinkByUid, &'a Value>,
}

impl<'a> Graph<'a> {
    fn new(records: &'a [Value]) -> Self {
        let mut by_uid = FxHashMap::default();
        for record in records {
            let Some(uids) = record.get("uids").and_then(Value::as_object) else {
                continue;
            };
            for (scope, id) in uids {
                if let Some(id) = id.as_str() {
                    by_uid.entry(LinkByUid::new(scope.clone(), id)).or_insert(record);
                }
            }
        }
        Self { by_uid }
    }

    /// `path` holds the canonical link of each record being expanded.
    fn inline(&self, value: &Value, path: &mut Vec<LinkByUid>) -> Value {
        if let Some(link) = LinkByUid::from_value(value) {
            let Some(target) = self.by_uid.get(&link) else {
                return value.clone();
            };
            let on_path = record_link(target).is_some_and(|key| path.contains(&key));
            return if on_path {
                value.clone()
            } else {
                self.inline(target, path)
            };
        }
        match value {
            Value::Array(items) => {
                Value::Array(items.iter().map(|item| self.inline(item, path)).collect())
            }
            Value::Object(map) => {
                let key = entity_tag(value).and_then(|_| record_link(value));
                if let Some(key) = &key {
                    path.push(key.clone());
                }
                let expanded: Map<String, Value> = map
                    .iter()
                    .map(|(field, child)| {
                        let child = if field == "uids" {
                            child.clone()
                        } else {
                            self.inline(child, path)
                        };
                        (field.clone(), child)
                    })
                    .collect();
                if key.is_some() {
                    path.pop();
                }
                Value::Object(expanded)
            }
            other => other.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::LinkOr;
    use serde_json::json;

    fn link(id: &str) -> Value {
        json!({"type": "link_by_uid", "scope": "id", "id": id})
    }

    #[test]
    fn test_hydrate_inlines_process_and_keeps_cycle_as_link() {
        let root = json!({
            "type": "material_run", "name": "cake", "uids": {"id": "m1"},
            "process": link("p1"),
        });
        let context = vec![json!({
            "type": "process_run", "name": "bake", "uids": {"id": "p1"},
            "output_material": link("m1"),
        })];
        let run = hydrate(&root, &context).unwrap();
        let process = run.process.as_ref().and_then(LinkOr::as_object).unwrap();
        assert_eq!(process.name, "bake");
        assert_eq!(
            process.output_material.as_ref().and_then(LinkOr::as_link),
            Some(&LinkByUid::new("id", "m1"))
        );
    }

    #[test]
    fn test_missing_back_references_filled() {
        let root = json!({
            "type": "material_run", "name": "cake", "uids": {"id": "m1"},
        });
        let context = vec![json!({
            "type": "measurement_run", "name": "taste", "uids": {"id": "x1"},
            "material": link("m1"),
        })];
        let run = hydrate(&root, &context).unwrap();
        assert_eq!(run.measurements.len(), 1);
        assert_eq!(run.measurements[0].as_object().unwrap().name, "taste");
    }

    #[test]
    fn test_unknown_links_stay_links() {
        let root = json!({
            "type": "material_run", "name": "cake", "uids": {"id": "m1"},
            "spec": link("elsewhere"),
        });
        let run = hydrate(&root, &[]).unwrap();
        assert!(run.spec.as_ref().and_then(LinkOr::as_link).is_some());
    }
}
