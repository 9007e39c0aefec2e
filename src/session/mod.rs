//! The transport collaborator.
//!
//! A [`Session`] issues authenticated JSON requests against the data store
//! and maps every non-2xx response onto the crate [`Error`] taxonomy via
//! [`Error::from_status`]. Timeouts and retry policy belong to the session
//! implementation; the core only reads [`Error::is_retryable`].
//!
//! [`InMemorySession`] is a complete reference data store used by the test
//! suites and for offline work.
//!
//! [`Error`]: crate::error::Error
//! [`Error::from_status`]: crate::error::Error::from_status
//! [`Error::is_retryable`]: crate::error::Error::is_retryable

pub mod memory;

use std::borrow::Cow;

use serde_json::Value;

use crate::config::SessionConfig;
use crate::error::Result;

pub use memory::InMemorySession;

/// Synchronous request/response access to the data store.
///
/// Paths are relative to [`SessionConfig::base_url`] and already escaped.
/// Implementations must be safe to share across threads.
pub trait Session: Send + Sync {
    /// `GET path?params`
    ///
    /// # Errors
    ///
    /// Any remote failure, classified by status.
    fn get(&self, path: &str, params: &QueryParams) -> Result<Value>;

    /// `POST path?params` with a JSON body
    ///
    /// # Errors
    ///
    /// Any remote failure, classified by status.
    fn post(&self, path: &str, body: &Value, params: &QueryParams) -> Result<Value>;

    /// `PUT path?params` with a JSON body
    ///
    /// # Errors
    ///
    /// Any remote failure, classified by status.
    fn put(&self, path: &str, body: &Value, params: &QueryParams) -> Result<Value>;

    /// `DELETE path?params`
    ///
    /// # Errors
    ///
    /// Any remote failure, classified by status.
    fn delete(&self, path: &str, params: &QueryParams) -> Result<Value>;

    /// Connection settings.
    fn config(&self) -> &SessionConfig;
}

/// Ordered query parameters. Keys may repeat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    /// Empty parameter list.
    #[must_use]
    pub const fn new() -> Self {
        Self { pairs: Vec::new() }
    }

    /// Append a parameter.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// Append a parameter in place.
    pub fn push(&mut self, key: impl Into<String>, value: impl ToString) {
        self.pairs.push((key.into(), value.to_string()));
    }

    /// First value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Every value for `key`, in insertion order.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Boolean parameter, `false` when absent.
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| v == "true")
    }

    /// All pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render as `k=v&k=v`, escaping both sides.
    #[must_use]
    pub fn to_query_string(&self) -> String {
        self.iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Escape one path segment (a scope or id may contain `/`).
#[must_use]
pub fn segment(raw: &str) -> Cow<'_, str> {
    urlencoding::encode(raw)
}
