//! Non-owning references between entities.
//!
//! A [`LinkByUid`] is a lookup key, never a pointer: resolving it is an
//! explicit call against a collection. Fields that may hold either a link or
//! the embedded object use [`LinkOr`], which accepts both shapes on read and
//! rejects an embedded object of the wrong concrete type.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::entity::{ConcreteEntity, Reference, ReferenceKind, DEFAULT_SCOPE};

/// Wire discriminant of a link stub.
pub const LINK_TYPE: &str = "link_by_uid";

/// Reference to an entity by `(scope, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename = "link_by_uid")]
pub struct LinkByUid {
    /// Namespace of the identifier
    pub scope: String,
    /// Identifier within the scope
    pub id: String,
}

impl LinkByUid {
    /// Create a link from a scope and id.
    #[must_use]
    pub fn new(scope: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            id: id.into(),
        }
    }

    /// Link in the default (`id`) scope.
    #[must_use]
    pub fn from_id(id: impl Into<String>) -> Self {
        Self::new(DEFAULT_SCOPE, id)
    }

    /// Choose a link from an entity's uid map.
    ///
    /// The default scope wins when present; otherwise the first scope in
    /// lexical order is used. Returns `None` for an empty map.
    #[must_use]
    pub fn from_uids(uids: &BTreeMap<String, String>) -> Option<Self> {
        uids.get(DEFAULT_SCOPE)
            .map(|id| Self::new(DEFAULT_SCOPE, id.clone()))
            .or_else(|| {
                uids.iter()
                    .next()
                    .map(|(scope, id)| Self::new(scope.clone(), id.clone()))
            })
    }

    /// Whether a wire value is a link stub.
    #[must_use]
    pub fn is_link(value: &Value) -> bool {
        value.get("type").and_then(Value::as_str) == Some(LINK_TYPE)
    }

    /// Parse a link stub, `None` when the value is not one.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        if !Self::is_link(value) {
            return None;
        }
        Some(Self::new(
            value.get("scope")?.as_str()?,
            value.get("id")?.as_str()?,
        ))
    }

    /// Whether `uids` contains this link's scope/id pair.
    #[must_use]
    pub fn matches(&self, uids: &BTreeMap<String, String>) -> bool {
        uids.get(&self.scope) == Some(&self.id)
    }

    /// Wire form of the link.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({"type": LINK_TYPE, "scope": self.scope, "id": self.id})
    }
}

impl fmt::Display for LinkByUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.id)
    }
}

/// A field holding either a link or the embedded object.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOr<T> {
    /// Reference by identifier
    Link(LinkByUid),
    /// Embedded object
    Object(Box<T>),
}

impl<T: ConcreteEntity> LinkOr<T> {
    /// Embed an object.
    #[must_use]
    pub fn object(value: T) -> Self {
        Self::Object(Box::new(value))
    }

    /// The embedded object, if any.
    #[must_use]
    pub fn as_object(&self) -> Option<&T> {
        match self {
            Self::Object(obj) => Some(&**obj),
            Self::Link(_) => None,
        }
    }

    /// The link, if this field is not embedded.
    #[must_use]
    pub const fn as_link(&self) -> Option<&LinkByUid> {
        match self {
            Self::Link(link) => Some(link),
            Self::Object(_) => None,
        }
    }

    /// A link to the referenced entity: the stored link, or one built from
    /// the embedded object's uids. `None` for an unregistered object.
    #[must_use]
    pub fn to_link(&self) -> Option<LinkByUid> {
        match self {
            Self::Link(link) => Some(link.clone()),
            Self::Object(obj) => LinkByUid::from_uids(&obj.core().uids),
        }
    }

    /// Whether this field refers to the entity identified by `link`.
    #[must_use]
    pub fn refers_to(&self, link: &LinkByUid) -> bool {
        match self {
            Self::Link(own) => own == link,
            Self::Object(obj) => link.matches(&obj.core().uids),
        }
    }

    pub(crate) fn reference(&self, field: &'static str) -> Reference<'_> {
        self.reference_with(field, false)
    }

    pub(crate) fn back_reference(&self, field: &'static str) -> Reference<'_> {
        self.reference_with(field, true)
    }

    fn reference_with(&self, field: &'static str, back_reference: bool) -> Reference<'_> {
        let kind = match self {
            Self::Link(link) => ReferenceKind::Link(link),
            Self::Object(obj) => ReferenceKind::Object(&**obj),
        };
        Reference {
            field,
            target: T::TYPE,
            back_reference,
            kind,
        }
    }
}

impl<T> From<LinkByUid> for LinkOr<T> {
    fn from(link: LinkByUid) -> Self {
        Self::Link(link)
    }
}

impl<T: ConcreteEntity> Serialize for LinkOr<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Link(link) => link.serialize(serializer),
            Self::Object(obj) => obj.serialize(serializer),
        }
    }
}

impl<'de, T: ConcreteEntity> Deserialize<'de> for LinkOr<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value.get("type").and_then(Value::as_str) {
            Some(LINK_TYPE) => LinkByUid::deserialize(&value)
                .map(Self::Link)
                .map_err(D::Error::custom),
            Some(tag) if tag == T::TYPE.as_str() => T::deserialize(&value)
                .map(|obj| Self::Object(Box::new(obj)))
                .map_err(D::Error::custom),
            Some(tag) => Err(D::Error::custom(format!(
                "type mismatch: expected {} or {LINK_TYPE}, found '{tag}'",
                T::TYPE
            ))),
            None => Err(D::Error::custom(format!(
                "missing type discriminant where {} or {LINK_TYPE} was expected",
                T::TYPE
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_wire_shape() {
        let link = LinkByUid::new("id", "abc");
        let json = serde_json::to_value(&link).unwrap();
        assert_eq!(json, link.to_value());
        assert!(LinkByUid::is_link(&json));
        assert_eq!(LinkByUid::from_value(&json), Some(link));
    }

    #[test]
    fn test_from_uids_prefers_default_scope() {
        let mut uids = BTreeMap::new();
        uids.insert("alpha".to_string(), "a-1".to_string());
        assert_eq!(
            LinkByUid::from_uids(&uids),
            Some(LinkByUid::new("alpha", "a-1"))
        );
        uids.insert("id".to_string(), "x-9".to_string());
        assert_eq!(LinkByUid::from_uids(&uids), Some(LinkByUid::from_id("x-9")));
        assert_eq!(LinkByUid::from_uids(&BTreeMap::new()), None);
    }

    #[test]
    fn test_non_link_value() {
        let value = serde_json::json!({"type": "material_run", "name": "x"});
        assert!(!LinkByUid::is_link(&value));
        assert_eq!(LinkByUid::from_value(&value), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(LinkByUid::new("lab", "42").to_string(), "lab:42");
    }
}
