//! Session configuration.
//!
//! ```
//! use data_concepts::config::{Scheme, SessionConfig};
//!
//! let config = SessionConfig::builder()
//!     .scheme(Scheme::Http)
//!     .host("localhost")
//!     .port(8080)
//!     .api_key("secret")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.base_url(), "http://localhost:8080/api/v1");
//! ```

use std::fmt;

use crate::error::{Error, Result};

/// Default number of records requested per page.
pub const DEFAULT_PER_PAGE: usize = 100;

/// URL scheme of the data store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scheme {
    /// `http`
    Http,
    /// `https`
    #[default]
    Https,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "http",
            Self::Https => "https",
        })
    }
}

/// Connection settings carried by a session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionConfig {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
    api_key: String,
}

impl SessionConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// URL scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host name.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Explicit port, if any.
    #[must_use]
    pub const fn port(&self) -> Option<u16> {
        self.port
    }

    /// API key presented on every call.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Root of the REST surface, `scheme://host[:port]/api/v1`.
    #[must_use]
    pub fn base_url(&self) -> String {
        match self.port {
            Some(port) => format!("{}://{}:{port}/api/v1", self.scheme, self.host),
            None => format!("{}://{}/api/v1", self.scheme, self.host),
        }
    }
}

// API key stays out of logs.
impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("scheme", &self.scheme)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Consuming builder for [`SessionConfig`].
#[derive(Debug, Default)]
#[must_use]
pub struct SessionConfigBuilder {
    scheme: Scheme,
    host: Option<String>,
    port: Option<u16>,
    api_key: Option<String>,
}

impl SessionConfigBuilder {
    /// Set the scheme (default `https`).
    pub const fn scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the host.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Set an explicit port.
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Set the API key.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when the host or API key is missing or
    /// blank.
    pub fn build(self) -> Result<SessionConfig> {
        let host = self
            .host
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::Config("host must not be empty".to_string()))?;
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| Error::Config("api key must not be empty".to_string()))?;
        Ok(SessionConfig {
            scheme: self.scheme,
            host,
            port: self.port,
            api_key,
        })
    }
}

/// Per-traversal options for list and filter calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListOptions {
    /// Records requested per page
    pub per_page: usize,
    /// Traverse in creation order (`false` for newest first)
    pub forward: bool,
    /// Include soft-deleted records
    pub include_deleted: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            per_page: DEFAULT_PER_PAGE,
            forward: true,
            include_deleted: false,
        }
    }
}

impl ListOptions {
    /// Set the page size.
    #[must_use]
    pub const fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    /// Set the traversal direction.
    #[must_use]
    pub const fn forward(mut self, forward: bool) -> Self {
        self.forward = forward;
        self
    }

    /// Include soft-deleted records.
    #[must_use]
    pub const fn include_deleted(mut self, include_deleted: bool) -> Self {
        self.include_deleted = include_deleted;
        self
    }
}
