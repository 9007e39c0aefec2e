//! In-memory data store implementing [`Session`] using `DashMap`.
//!
//! Everything lives in process memory and is lost when the session is
//! dropped. Each record is stored in write form: back references removed and
//! nested objects replaced by links. Back references are derived again on
//! every read.
//!
//! Routes (relative to the base URL):
//!
//! ```text
//! GET    projects/{p}/{resource}[?dataset_id]                 list
//! GET    projects/{p}/{resource}/filter-by-name?name&exact     filter
//! GET    projects/{p}/{resource}/filter-by-tags?tags&match_all filter
//! POST   projects/{p}/{resource}/filter-by-attribute-bounds    filter
//! GET    projects/{p}/[datasets/{d}/]{resource}/{scope}/{id}   get
//! GET    projects/{p}/{relation}/{scope}/{id}/{resource}       related
//! GET    projects/{p}/material-runs/{scope}/{id}/history       history
//! POST   projects/{p}/datasets/{d}/{resource}[?dry_run]        register
//! PUT    projects/{p}/datasets/{d}/batch[?dry_run]             register many
//! DELETE projects/{p}/datasets/{d}/{resource}/{scope}/{id}     soft delete
//! POST   projects/{p}/gemd/batch-delete                        delete many
//! ```

use std::borrow::Cow;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicU8, AtomicUsize, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::{QueryParams, Session};
use crate::bounds::Bounds;
use crate::codec::{back_reference_fields, decode, entity_tag, record_link};
use crate::config::{Scheme, SessionConfig, DEFAULT_PER_PAGE};
use crate::entity::{AuditInfo, ReferenceKind, TypeTag, DEFAULT_SCOPE};
use crate::error::{Error, Result};
use crate::link::LinkByUid;

const AUTH_OK: u8 = 0;
const AUTH_REVOKED: u8 = 1;
const AUTH_EXPIRED: u8 = 2;

const AUDIT_USER: &str = "in-memory-session";

#[derive(Debug, Clone)]
struct StoredRecord {
    project: String,
    dataset: String,
    tag: TypeTag,
    seq: u64,
    deleted: bool,
    body: Value,
}

impl StoredRecord {
    fn uids(&self) -> Vec<LinkByUid> {
        uid_links(&self.body)
    }

    fn server_id(&self) -> Option<&str> {
        server_id(&self.body)
    }

    fn identified_by(&self, link: &LinkByUid) -> bool {
        self.body
            .get("uids")
            .and_then(|uids| uids.get(&link.scope))
            .and_then(Value::as_str)
            == Some(link.id.as_str())
    }

    fn name(&self) -> &str {
        self.body.get("name").and_then(Value::as_str).unwrap_or("")
    }

    fn links_to(&self, field: &str, target: &Self) -> bool {
        self.body
            .get(field)
            .and_then(LinkByUid::from_value)
            .is_some_and(|link| target.identified_by(&link))
    }
}

struct WriteContext<'a> {
    project: &'a str,
    dataset: &'a str,
}

enum Filter {
    All,
    Name { name: String, exact: bool },
    Tags { tags: Vec<String>, match_all: bool },
    AttributeBounds(Vec<(LinkByUid, Bounds)>),
    Related(Vec<LinkByUid>),
}

impl Filter {
    fn matches(&self, record: &StoredRecord) -> bool {
        match self {
            Self::All => true,
            Self::Name { name, exact } => {
                let candidate = record.name().to_lowercase();
                let wanted = name.to_lowercase();
                if *exact {
                    candidate == wanted
                } else {
                    candidate.contains(&wanted)
                }
            }
            Self::Tags { tags, match_all } => {
                let own: Vec<&str> = record
                    .body
                    .get("tags")
                    .and_then(Value::as_array)
                    .map(|tags| tags.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                let hit = |wanted: &String| own.iter().any(|tag| tag_matches(wanted, tag));
                if *match_all {
                    tags.iter().all(hit)
                } else {
                    tags.iter().any(hit)
                }
            }
            Self::AttributeBounds(pairs) => {
                let Ok(entity) = decode(&record.body) else {
                    return false;
                };
                let attributes = entity.as_concept().attributes();
                pairs.iter().all(|(template, bounds)| {
                    attributes.iter().any(|attribute| {
                        let same_template = attribute.template.is_some_and(|reference| {
                            match reference.kind {
                                ReferenceKind::Link(link) => link == template,
                                ReferenceKind::Object(obj) => {
                                    obj.to_link().as_ref() == Some(template)
                                }
                            }
                        });
                        same_template && attribute.value.is_some_and(|v| bounds.contains(v))
                    })
                })
            }
            Self::Related(targets) => outbound(&record.body)
                .iter()
                .any(|link| targets.contains(link)),
        }
    }
}

/// `wanted` matches the tag itself or any `::`-delimited refinement of it.
fn tag_matches(wanted: &str, tag: &str) -> bool {
    tag == wanted
        || tag
            .strip_prefix(wanted)
            .is_some_and(|rest| rest.starts_with("::"))
}

fn uid_links(body: &Value) -> Vec<LinkByUid> {
    body.get("uids")
        .and_then(Value::as_object)
        .map(|uids| {
            uids.iter()
                .filter_map(|(scope, id)| Some(LinkByUid::new(scope.clone(), id.as_str()?)))
                .collect()
        })
        .unwrap_or_default()
}

fn server_id(body: &Value) -> Option<&str> {
    body.get("uids")?.get(DEFAULT_SCOPE)?.as_str()
}

/// Every link stub in a record, outside its own `uids`.
fn outbound(body: &Value) -> Vec<LinkByUid> {
    fn walk(value: &Value, out: &mut Vec<LinkByUid>) {
        if let Some(link) = LinkByUid::from_value(value) {
            out.push(link);
            return;
        }
        match value {
            Value::Array(items) => items.iter().for_each(|item| walk(item, out)),
            Value::Object(map) => map
                .iter()
                .filter(|(key, _)| key.as_str() != "uids")
                .for_each(|(_, child)| walk(child, out)),
            _ => {}
        }
    }
    let mut links = Vec::new();
    walk(body, &mut links);
    links
}

fn bad_request(message: impl Into<String>) -> Error {
    Error::from_status(400, message)
}

fn not_found(message: impl Into<String>) -> Error {
    Error::from_status(404, message)
}

fn resource_tag(resource: &str) -> Result<TypeTag> {
    TypeTag::from_resource(resource).ok_or_else(|| not_found(format!("unknown resource '{resource}'")))
}

fn segments(path: &str) -> Result<Vec<String>> {
    path.trim_matches('/')
        .split('/')
        .map(|raw| {
            urlencoding::decode(raw)
                .map(Cow::into_owned)
                .map_err(|err| bad_request(format!("malformed path segment '{raw}': {err}")))
        })
        .collect()
}

/// In-memory data store.
///
/// Thread-safe; every call is an independent request against shared
/// `DashMap` state. Failure injection hooks simulate credential problems and
/// remote faults.
///
/// # Example
///
/// ```rust
/// use data_concepts::session::{InMemorySession, QueryParams, Session};
///
/// let session = InMemorySession::with_api_key("secret").unwrap();
/// session.fail_next(503);
/// let err = session.get("projects/p/material-runs", &QueryParams::new()).unwrap_err();
/// assert!(err.is_retryable());
/// ```
#[derive(Debug)]
pub struct InMemorySession {
    config: SessionConfig,
    records: DashMap<String, StoredRecord>,
    uids: DashMap<LinkByUid, String>,
    sequence: AtomicU64,
    auth: AtomicU8,
    fail_next: AtomicU16,
    requests: AtomicUsize,
}

impl InMemorySession {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            records: DashMap::new(),
            uids: DashMap::new(),
            sequence: AtomicU64::new(1),
            auth: AtomicU8::new(AUTH_OK),
            fail_next: AtomicU16::new(0),
            requests: AtomicUsize::new(0),
        }
    }

    /// Create an empty store reachable at `http://localhost`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a blank key.
    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self> {
        let config = SessionConfig::builder()
            .scheme(Scheme::Http)
            .host("localhost")
            .api_key(api_key)
            .build()?;
        Ok(Self::new(config))
    }

    /// Number of stored records, deleted ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop every record.
    pub fn clear(&self) {
        self.records.clear();
        self.uids.clear();
    }

    /// Requests served so far, failed ones included.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    /// Reject every request with 401 until credentials are restored.
    pub fn revoke_credentials(&self) {
        self.auth.store(AUTH_REVOKED, Ordering::Release);
    }

    /// Reject every request with 401 (expired refresh token) until
    /// credentials are restored.
    pub fn expire_token(&self) {
        self.auth.store(AUTH_EXPIRED, Ordering::Release);
    }

    /// Accept requests again.
    pub fn restore_credentials(&self) {
        self.auth.store(AUTH_OK, Ordering::Release);
    }

    /// Fail the next request with `status`.
    pub fn fail_next(&self, status: u16) {
        self.fail_next.store(status, Ordering::Release);
    }

    fn begin(&self, method: &str, path: &str, params: &QueryParams) -> Result<Vec<String>> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        debug!(method, path, query = %params.to_query_string(), "in-memory request");
        match self.auth.load(Ordering::Acquire) {
            AUTH_REVOKED => return Err(Error::from_status(401, "invalid api key")),
            AUTH_EXPIRED => return Err(Error::from_status(401, "refresh token expired")),
            _ => {}
        }
        let injected = self.fail_next.swap(0, Ordering::AcqRel);
        if injected != 0 {
            return Err(Error::from_status(injected, "injected failure"));
        }
        segments(path)
    }

    /// Every record in creation order.
    fn snapshot(&self) -> Vec<StoredRecord> {
        let mut all: Vec<StoredRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        all.sort_by_key(|r| r.seq);
        all
    }

    /// Record body with back references derived from `all`.
    fn render(record: &StoredRecord, all: &[StoredRecord]) -> Value {
        let mut body = record.body.clone();
        let live = |tag: TypeTag| {
            all.iter()
                .filter(move |other| other.tag == tag && !other.deleted)
        };
        let links = |others: Vec<&StoredRecord>| -> Vec<Value> {
            others
                .into_iter()
                .filter_map(|other| record_link(&other.body))
                .map(|link| link.to_value())
                .collect()
        };
        let (ingredient_tag, material_tag) = match record.tag {
            TypeTag::ProcessSpec => (TypeTag::IngredientSpec, TypeTag::MaterialSpec),
            TypeTag::ProcessRun => (TypeTag::IngredientRun, TypeTag::MaterialRun),
            TypeTag::MaterialRun => {
                let measurements = links(
                    live(TypeTag::MeasurementRun)
                        .filter(|m| m.links_to("material", record))
                        .collect(),
                );
                if let (Some(map), false) = (body.as_object_mut(), measurements.is_empty()) {
                    map.insert("measurements".to_string(), Value::Array(measurements));
                }
                return body;
            }
            _ => return body,
        };
        let ingredients = links(
            live(ingredient_tag)
                .filter(|i| i.links_to("process", record))
                .collect(),
        );
        // Writes keep at most one live material per process.
        let output = live(material_tag)
            .find(|m| m.links_to("process", record))
            .and_then(|m| record_link(&m.body));
        if let Some(map) = body.as_object_mut() {
            if !ingredients.is_empty() {
                map.insert("ingredients".to_string(), Value::Array(ingredients));
            }
            if let Some(material) = output {
                map.insert("output_material".to_string(), material.to_value());
            }
        }
        body
    }

    fn render_id(&self, id: &str) -> Result<Value> {
        let all = self.snapshot();
        all.iter()
            .find(|r| r.server_id() == Some(id))
            .map(|r| Self::render(r, &all))
            .ok_or_else(|| not_found(format!("record {id} vanished")))
    }

    fn list(
        &self,
        project: &str,
        dataset: Option<&str>,
        tag: TypeTag,
        params: &QueryParams,
        filter: &Filter,
    ) -> Result<Value> {
        let per_page = params
            .get("per_page")
            .map(str::parse::<usize>)
            .transpose()
            .map_err(|err| bad_request(format!("per_page: {err}")))?
            .unwrap_or(DEFAULT_PER_PAGE)
            .max(1);
        let cursor = params
            .get("cursor")
            .map(|c| u64::from_str_radix(c, 16))
            .transpose()
            .map_err(|_| bad_request("malformed cursor"))?;
        let forward = params.get("forward") != Some("false");
        let include_deleted = params.flag("include_deleted");

        let all = self.snapshot();
        let mut matching: Vec<&StoredRecord> = all
            .iter()
            .filter(|r| {
                r.project == project
                    && r.tag == tag
                    && dataset.map_or(true, |d| r.dataset == d)
                    && (include_deleted || !r.deleted)
                    && filter.matches(r)
            })
            .collect();
        if !forward {
            matching.reverse();
        }
        let start = cursor.map_or(0, |c| {
            matching
                .iter()
                .position(|r| if forward { r.seq > c } else { r.seq < c })
                .unwrap_or(matching.len())
        });
        let page: Vec<&StoredRecord> = matching[start..].iter().take(per_page).copied().collect();
        let next = if start + page.len() < matching.len() {
            page.last().map(|r| format!("{:x}", r.seq))
        } else {
            None
        };
        debug!(%tag, returned = page.len(), has_next = next.is_some(), "list page");
        let contents: Vec<Value> = page.iter().map(|r| Self::render(r, &all)).collect();
        Ok(json!({ "contents": contents, "next": next }))
    }

    fn get_one(
        &self,
        project: &str,
        dataset: Option<&str>,
        tag: TypeTag,
        link: &LinkByUid,
        include_deleted: bool,
    ) -> Result<Value> {
        let all = self.snapshot();
        let record = all
            .iter()
            .find(|r| {
                r.project == project
                    && r.tag == tag
                    && dataset.map_or(true, |d| r.dataset == d)
                    && r.identified_by(link)
            })
            .ok_or_else(|| not_found(format!("no {tag} with uid {link}")))?;
        if record.deleted && !include_deleted {
            return Err(not_found(format!("{tag} {link} has been deleted")));
        }
        Ok(Self::render(record, &all))
    }

    fn related(
        &self,
        project: &str,
        relation: TypeTag,
        link: &LinkByUid,
        tag: TypeTag,
        params: &QueryParams,
    ) -> Result<Value> {
        let targets = self
            .snapshot()
            .into_iter()
            .find(|r| r.project == project && r.tag == relation && r.identified_by(link))
            .map(|r| r.uids())
            .ok_or_else(|| not_found(format!("no {relation} with uid {link}")))?;
        self.list(
            project,
            params.get("dataset_id"),
            tag,
            params,
            &Filter::Related(targets),
        )
    }

    fn history(&self, project: &str, link: &LinkByUid) -> Result<Value> {
        let all = self.snapshot();
        let root = all
            .iter()
            .find(|r| r.project == project && r.tag == TypeTag::MaterialRun && r.identified_by(link))
            .ok_or_else(|| not_found(format!("no material run with uid {link}")))?;

        let feeds = |other: &StoredRecord, target: &StoredRecord| match (target.tag, other.tag) {
            _ if other.deleted => false,
            (TypeTag::ProcessRun, TypeTag::IngredientRun)
            | (TypeTag::ProcessSpec, TypeTag::IngredientSpec) => other.links_to("process", target),
            (TypeTag::MaterialRun, TypeTag::MeasurementRun) => other.links_to("material", target),
            _ => false,
        };

        let mut seen = FxHashSet::default();
        seen.insert(root.seq);
        let mut context: Vec<&StoredRecord> = Vec::new();
        let mut queue = vec![root];
        while let Some(record) = queue.pop() {
            let upstream = outbound(&record.body)
                .into_iter()
                .filter_map(|l| all.iter().find(|other| other.identified_by(&l)));
            let lateral = all.iter().filter(|other| feeds(other, record));
            for next in upstream.chain(lateral).collect::<Vec<_>>() {
                if seen.insert(next.seq) {
                    context.push(next);
                    queue.push(next);
                }
            }
        }
        context.sort_by_key(|r| r.seq);
        debug!(%link, context = context.len(), "history");

        let context: Vec<Value> = context.iter().map(|r| Self::render(r, &all)).collect();
        Ok(json!({ "roots": [Self::render(root, &all)], "context": context }))
    }

    /// Stage `record` and every embedded entity beneath it.
    fn stage(
        &self,
        mut record: Value,
        ctx: &WriteContext<'_>,
        staged: &mut Vec<StoredRecord>,
    ) -> Result<Value> {
        let tag = entity_tag(&record).ok_or_else(|| bad_request("value is not an entity record"))?;
        if let Some(map) = record.as_object_mut() {
            for field in back_reference_fields(tag) {
                map.remove(*field);
            }
            for (key, child) in map.iter_mut() {
                if key != "uids" {
                    self.stage_children(child, ctx, staged)?;
                }
            }
        }

        let own = uid_links(&record);
        let previous = staged
            .iter()
            .find(|r| r.uids().iter().any(|l| own.contains(l)))
            .cloned()
            .or_else(|| {
                own.iter().find_map(|l| {
                    let id = self.uids.get(l)?.value().clone();
                    self.records.get(&id).map(|r| r.value().clone())
                })
            });
        if let Some(previous) = &previous {
            if previous.tag != tag {
                return Err(Error::from_status(
                    409,
                    format!("uid already belongs to a {}", previous.tag),
                ));
            }
        }

        let id = previous
            .as_ref()
            .and_then(StoredRecord::server_id)
            .or_else(|| server_id(&record))
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        let now = Utc::now();
        let previous_audit = previous
            .as_ref()
            .and_then(|p| p.body.get("audit_info").cloned())
            .and_then(|a| serde_json::from_value::<AuditInfo>(a).ok());
        let audit = AuditInfo {
            created_by: previous_audit
                .as_ref()
                .and_then(|a| a.created_by.clone())
                .or_else(|| Some(AUDIT_USER.to_string())),
            created_at: previous_audit.and_then(|a| a.created_at).or(Some(now)),
            updated_by: Some(AUDIT_USER.to_string()),
            updated_at: Some(now),
        };

        let map = record
            .as_object_mut()
            .ok_or_else(|| bad_request("value is not an entity record"))?;
        let uids = map.entry("uids").or_insert_with(|| json!({}));
        if let Some(uids) = uids.as_object_mut() {
            uids.insert(DEFAULT_SCOPE.to_string(), Value::String(id.clone()));
        }
        map.insert("dataset".to_string(), Value::String(ctx.dataset.to_string()));
        map.insert(
            "audit_info".to_string(),
            serde_json::to_value(&audit).map_err(Error::decode)?,
        );

        let seq = previous
            .as_ref()
            .map_or_else(|| self.sequence.fetch_add(1, Ordering::Relaxed), |p| p.seq);
        staged.retain(|r| r.server_id() != Some(id.as_str()));
        staged.push(StoredRecord {
            project: ctx.project.to_string(),
            dataset: ctx.dataset.to_string(),
            tag,
            seq,
            deleted: false,
            body: record.clone(),
        });
        Ok(record)
    }

    fn stage_children(
        &self,
        value: &mut Value,
        ctx: &WriteContext<'_>,
        staged: &mut Vec<StoredRecord>,
    ) -> Result<()> {
        if entity_tag(value).is_some() {
            let created = self.stage(std::mem::take(value), ctx, staged)?;
            let link = record_link(&created)
                .ok_or_else(|| Error::from_status(500, "staged record has no identifier"))?;
            *value = link.to_value();
            return Ok(());
        }
        match value {
            Value::Array(items) => items
                .iter_mut()
                .try_for_each(|item| self.stage_children(item, ctx, staged)),
            Value::Object(map) => map
                .values_mut()
                .try_for_each(|child| self.stage_children(child, ctx, staged)),
            _ => Ok(()),
        }
    }

    fn superseded(record: &StoredRecord, staged: &[StoredRecord]) -> bool {
        staged.iter().any(|s| s.server_id() == record.server_id())
    }

    /// Record `link` points at once `staged` is committed.
    fn target(&self, link: &LinkByUid, staged: &[StoredRecord]) -> Option<StoredRecord> {
        if let Some(record) = staged.iter().find(|r| r.identified_by(link)) {
            return Some(record.clone());
        }
        let id = self.uids.get(link)?.value().clone();
        self.records
            .get(&id)
            .map(|r| r.value().clone())
            .filter(|r| !Self::superseded(r, staged))
    }

    fn check_links(&self, staged: &[StoredRecord]) -> Result<()> {
        for record in staged {
            for link in outbound(&record.body) {
                if self.target(&link, staged).is_none() {
                    return Err(bad_request(format!(
                        "dangling link {link} in {} '{}'",
                        record.tag,
                        record.name()
                    )));
                }
            }
            if matches!(record.tag, TypeTag::IngredientRun | TypeTag::IngredientSpec) {
                self.check_same_dataset(record, staged)?;
            }
        }
        self.check_output_materials(staged)
    }

    /// An ingredient's process and material live in its own dataset.
    fn check_same_dataset(
        &self,
        ingredient: &StoredRecord,
        staged: &[StoredRecord],
    ) -> Result<()> {
        for field in ["process", "material"] {
            let Some(link) = ingredient.body.get(field).and_then(LinkByUid::from_value) else {
                continue;
            };
            let Some(target) = self.target(&link, staged) else {
                continue;
            };
            if target.dataset != ingredient.dataset {
                return Err(bad_request(format!(
                    "ingredient '{}' {field} {link} is in dataset '{}', not '{}'",
                    ingredient.name(),
                    target.dataset,
                    ingredient.dataset
                )));
            }
        }
        Ok(())
    }

    /// A process produces at most one live material.
    fn check_output_materials(&self, staged: &[StoredRecord]) -> Result<()> {
        let stored = self
            .snapshot()
            .into_iter()
            .filter(|r| !r.deleted && !Self::superseded(r, staged));
        let mut producers: FxHashMap<String, StoredRecord> = FxHashMap::default();
        for material in stored.chain(staged.iter().cloned()) {
            if !matches!(material.tag, TypeTag::MaterialRun | TypeTag::MaterialSpec) {
                continue;
            }
            let Some(process) = material
                .body
                .get("process")
                .and_then(LinkByUid::from_value)
                .and_then(|link| self.target(&link, staged))
            else {
                continue;
            };
            let Some(process_id) = process.server_id().map(str::to_string) else {
                continue;
            };
            if let Some(existing) = producers.get(&process_id) {
                return Err(bad_request(format!(
                    "{} '{}' already produces '{}'; '{}' cannot share it",
                    process.tag,
                    process.name(),
                    existing.name(),
                    material.name()
                )));
            }
            producers.insert(process_id, material);
        }
        Ok(())
    }

    fn commit(&self, staged: Vec<StoredRecord>) {
        for record in staged {
            let Some(id) = record.server_id().map(str::to_string) else {
                continue;
            };
            let previous = self.records.get(&id).map(|r| r.uids()).unwrap_or_default();
            for uid in previous {
                self.uids.remove_if(&uid, |_, owner| *owner == id);
            }
            for uid in record.uids() {
                self.uids.insert(uid, id.clone());
            }
            self.records.insert(id, record);
        }
    }

    fn register(
        &self,
        ctx: &WriteContext<'_>,
        objects: &[Value],
        expected: Option<TypeTag>,
        dry_run: bool,
    ) -> Result<Vec<Value>> {
        let mut staged = Vec::new();
        let mut roots = Vec::with_capacity(objects.len());
        for object in objects {
            let found = entity_tag(object).ok_or_else(|| bad_request("record has no entity type"))?;
            if let Some(expected) = expected {
                if found != expected {
                    return Err(bad_request(format!("expected {expected}, found {found}")));
                }
            }
            roots.push(self.stage(object.clone(), ctx, &mut staged)?);
        }
        self.check_links(&staged)?;
        if dry_run {
            return Ok(roots);
        }
        self.commit(staged);
        roots
            .iter()
            .map(|root| -> Result<Value> {
                let id = server_id(root).ok_or_else(|| Error::from_status(500, "root has no id"))?;
                self.render_id(id)
            })
            .collect()
    }

    /// A live record, other than `record`, that links to it.
    fn referrer<'a>(record: &StoredRecord, all: &'a [StoredRecord]) -> Option<&'a StoredRecord> {
        all.iter().find(|other| {
            !other.deleted
                && other.seq != record.seq
                && outbound(&other.body)
                    .iter()
                    .any(|link| record.identified_by(link))
        })
    }

    fn soft_delete(
        &self,
        project: &str,
        dataset: Option<&str>,
        tag: Option<TypeTag>,
        link: &LinkByUid,
        dry_run: bool,
    ) -> Result<Value> {
        let all = self.snapshot();
        let record = all
            .iter()
            .find(|r| {
                r.project == project
                    && !r.deleted
                    && tag.map_or(true, |t| r.tag == t)
                    && dataset.map_or(true, |d| r.dataset == d)
                    && r.identified_by(link)
            })
            .ok_or_else(|| not_found(format!("no live object with uid {link}")))?;
        if let Some(other) = Self::referrer(record, &all) {
            return Err(Error::from_status(
                409,
                format!("{link} is referenced by {} '{}'", other.tag, other.name()),
            ));
        }
        if !dry_run {
            if let Some(id) = record.server_id() {
                if let Some(mut stored) = self.records.get_mut(id) {
                    stored.deleted = true;
                }
            }
        }
        debug!(%link, dry_run, "soft delete");
        Ok(Self::render(record, &all))
    }

    fn batch_delete(&self, project: &str, body: &Value) -> Result<Value> {
        let ids = body
            .get("ids")
            .and_then(Value::as_array)
            .ok_or_else(|| bad_request("batch delete needs an 'ids' list"))?;
        let dataset = body.get("dataset_id").and_then(Value::as_str);
        let mut failures = Vec::new();
        for raw in ids {
            let link = LinkByUid::from_value(raw)
                .ok_or_else(|| bad_request("batch delete ids must be links"))?;
            if let Err(err) = self.soft_delete(project, dataset, None, &link, false) {
                let (code, message) = match err {
                    Error::NotFound(message) => (404, message),
                    Error::NonRetryable { status, message } | Error::Retryable { status, message } => {
                        (status, message)
                    }
                    other => (500, other.to_string()),
                };
                failures.push(json!({
                    "id": link.to_value(),
                    "cause": { "code": code, "message": message },
                }));
            }
        }
        Ok(json!({ "failures": failures }))
    }

    fn attribute_bounds(body: &Value) -> Result<Vec<(LinkByUid, Bounds)>> {
        body.get("attribute_bounds")
            .and_then(Value::as_array)
            .ok_or_else(|| bad_request("missing 'attribute_bounds' list"))?
            .iter()
            .map(|pair| -> Result<(LinkByUid, Bounds)> {
                let template = pair
                    .get("template")
                    .and_then(LinkByUid::from_value)
                    .ok_or_else(|| bad_request("attribute bounds template must be a link"))?;
                let bounds = pair
                    .get("bounds")
                    .cloned()
                    .ok_or_else(|| bad_request("attribute bounds entry has no bounds"))?;
                let bounds: Bounds = serde_json::from_value(bounds)
                    .map_err(|err| bad_request(format!("malformed bounds: {err}")))?;
                Ok((template, bounds))
            })
            .collect()
    }
}

impl Session for InMemorySession {
    fn get(&self, path: &str, params: &QueryParams) -> Result<Value> {
        let segs = self.begin("GET", path, params)?;
        let segs: Vec<&str> = segs.iter().map(String::as_str).collect();
        let include_deleted = params.flag("include_deleted");
        match segs.as_slice() {
            ["projects", project, "datasets", dataset, resource] => self.list(
                project,
                Some(*dataset),
                resource_tag(resource)?,
                params,
                &Filter::All,
            ),
            ["projects", project, "datasets", dataset, resource, scope, id] => self.get_one(
                project,
                Some(*dataset),
                resource_tag(resource)?,
                &LinkByUid::new(*scope, *id),
                include_deleted,
            ),
            ["projects", project, resource] => self.list(
                project,
                params.get("dataset_id"),
                resource_tag(resource)?,
                params,
                &Filter::All,
            ),
            ["projects", project, resource, "filter-by-name"] => {
                let name = params
                    .get("name")
                    .ok_or_else(|| bad_request("filter-by-name needs a 'name'"))?;
                let filter = Filter::Name {
                    name: name.to_string(),
                    exact: params.flag("exact"),
                };
                self.list(project, params.get("dataset_id"), resource_tag(resource)?, params, &filter)
            }
            ["projects", project, resource, "filter-by-tags"] => {
                let filter = Filter::Tags {
                    tags: params.get_all("tags").map(str::to_string).collect(),
                    match_all: params.flag("match_all"),
                };
                self.list(project, params.get("dataset_id"), resource_tag(resource)?, params, &filter)
            }
            ["projects", project, resource, scope, id] => self.get_one(
                project,
                params.get("dataset_id"),
                resource_tag(resource)?,
                &LinkByUid::new(*scope, *id),
                include_deleted,
            ),
            ["projects", project, "material-runs", scope, id, "history"] => {
                self.history(project, &LinkByUid::new(*scope, *id))
            }
            ["projects", project, relation, scope, id, resource] => self.related(
                project,
                resource_tag(relation)?,
                &LinkByUid::new(*scope, *id),
                resource_tag(resource)?,
                params,
            ),
            _ => Err(not_found(format!("no route for GET {path}"))),
        }
    }

    fn post(&self, path: &str, body: &Value, params: &QueryParams) -> Result<Value> {
        let segs = self.begin("POST", path, params)?;
        let segs: Vec<&str> = segs.iter().map(String::as_str).collect();
        match segs.as_slice() {
            ["projects", project, "gemd", "batch-delete"] => self.batch_delete(project, body),
            ["projects", project, resource, "filter-by-attribute-bounds"] => {
                let filter = Filter::AttributeBounds(Self::attribute_bounds(body)?);
                self.list(project, params.get("dataset_id"), resource_tag(resource)?, params, &filter)
            }
            ["projects", project, "datasets", dataset, resource] => {
                let ctx = WriteContext {
                    project: *project,
                    dataset: *dataset,
                };
                let expected = resource_tag(resource)?;
                let mut registered = self.register(
                    &ctx,
                    std::slice::from_ref(body),
                    Some(expected),
                    params.flag("dry_run"),
                )?;
                registered
                    .pop()
                    .ok_or_else(|| Error::from_status(500, "nothing registered"))
            }
            _ => Err(not_found(format!("no route for POST {path}"))),
        }
    }

    fn put(&self, path: &str, body: &Value, params: &QueryParams) -> Result<Value> {
        let segs = self.begin("PUT", path, params)?;
        let segs: Vec<&str> = segs.iter().map(String::as_str).collect();
        match segs.as_slice() {
            ["projects", project, "datasets", dataset, "batch"] => {
                let objects = body
                    .get("objects")
                    .and_then(Value::as_array)
                    .ok_or_else(|| bad_request("batch body needs an 'objects' list"))?;
                let ctx = WriteContext {
                    project: *project,
                    dataset: *dataset,
                };
                let registered = self.register(&ctx, objects, None, params.flag("dry_run"))?;
                Ok(json!({ "objects": registered }))
            }
            ["projects", project, "datasets", dataset, resource, _scope, _id] => {
                let ctx = WriteContext {
                    project: *project,
                    dataset: *dataset,
                };
                let expected = resource_tag(resource)?;
                let mut registered = self.register(
                    &ctx,
                    std::slice::from_ref(body),
                    Some(expected),
                    params.flag("dry_run"),
                )?;
                registered
                    .pop()
                    .ok_or_else(|| Error::from_status(500, "nothing registered"))
            }
            _ => Err(not_found(format!("no route for PUT {path}"))),
        }
    }

    fn delete(&self, path: &str, params: &QueryParams) -> Result<Value> {
        let segs = self.begin("DELETE", path, params)?;
        let segs: Vec<&str> = segs.iter().map(String::as_str).collect();
        match segs.as_slice() {
            ["projects", project, "datasets", dataset, resource, scope, id] => self.soft_delete(
                project,
                Some(*dataset),
                Some(resource_tag(resource)?),
                &LinkByUid::new(*scope, *id),
                params.flag("dry_run"),
            ),
            _ => Err(not_found(format!("no route for DELETE {path}"))),
        }
    }

    fn config(&self) -> &SessionConfig {
        &self.config
    }
}
