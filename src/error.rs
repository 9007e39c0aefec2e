//! Error types for data-concepts
//!
//! Local validation failures never reach the wire; remote failures are
//! classified by status so callers can drive their own retry policy.

use thiserror::Error;

use crate::entity::TypeTag;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// data-concepts error types
#[derive(Error, Debug)]
pub enum Error {
    /// Local bounds/shape violation, raised before any network call
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// 404 - object absent or soft-deleted
    #[error("Not found: {0}")]
    NotFound(String),

    /// 401 - credentials rejected; re-authenticate before retrying
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 401 - refresh token expired; a new session is required
    #[error("Unauthorized (refresh token expired): {0}")]
    UnauthorizedRefreshToken(String),

    /// Transient remote failure, safe to retry with backoff
    #[error("Retryable remote failure (status {status}): {message}")]
    Retryable {
        /// HTTP status reported by the session
        status: u16,
        /// Server-provided message
        message: String,
    },

    /// Fatal remote failure, must not be retried
    #[error("Non-retryable remote failure (status {status}): {message}")]
    NonRetryable {
        /// HTTP status reported by the session
        status: u16,
        /// Server-provided message
        message: String,
    },

    /// Unrecognized type discriminant or malformed wire record
    #[error("Decode error: {0}")]
    Decode(String),

    /// A concrete entity of the wrong variant was offered
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Variant required by the field or collection
        expected: TypeTag,
        /// Variant (or raw tag) actually supplied
        found: String,
    },

    /// More than one object matched an exact-name lookup
    #[error("Ambiguous name: {count} objects named '{name}'")]
    AmbiguousName {
        /// Searched name
        name: String,
        /// Number of matches
        count: usize,
    },

    /// Invalid session configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Map an HTTP status and server message onto the error taxonomy.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => {
                let lowered = message.to_lowercase();
                if lowered.contains("refresh token") || lowered.contains("expired") {
                    Self::UnauthorizedRefreshToken(message)
                } else {
                    Self::Unauthorized(message)
                }
            }
            404 => Self::NotFound(message),
            408 | 429 | 500..=599 => Self::Retryable { status, message },
            _ => Self::NonRetryable { status, message },
        }
    }

    /// Whether the failure is transient and may be retried by the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }

    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Client-side validation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// An attribute value lies outside its template's bounds
    #[error("{attribute} value {value} is outside bounds {bounds}")]
    OutOfBounds {
        /// Attribute name
        attribute: String,
        /// Rendered value
        value: String,
        /// Rendered bounds
        bounds: String,
    },

    /// Object template bounds are not included in the attribute template bounds
    #[error("bounds {narrowed} for template '{template}' are not within {declared}")]
    IncompatibleBounds {
        /// Attribute template name
        template: String,
        /// Narrowed bounds from the object template
        narrowed: String,
        /// Declared attribute template bounds
        declared: String,
    },

    /// Ingredient fraction outside [0, 1]
    #[error("ingredient '{ingredient}' has {field} outside [0, 1]: {value}")]
    InvalidFraction {
        /// Ingredient name
        ingredient: String,
        /// Fraction field name
        field: &'static str,
        /// Rendered value
        value: String,
    },

    /// Ingredient name not among the process template's allowed names
    #[error("ingredient name '{name}' is not allowed by process template '{template}'")]
    NameNotAllowed {
        /// Ingredient name
        name: String,
        /// Process template name
        template: String,
    },

    /// Ingredient label not among the process template's allowed labels
    #[error("ingredient label '{label}' is not allowed by process template '{template}'")]
    LabelNotAllowed {
        /// Offending label
        label: String,
        /// Process template name
        template: String,
    },

    /// A link with an empty scope or id
    #[error("link in field '{field}' has an empty scope or id")]
    InvalidLink {
        /// Field holding the link
        field: &'static str,
    },

    /// A link whose target exists neither inline nor remotely
    #[error("unresolved link {scope}:{id} ({expected})")]
    UnresolvedLink {
        /// Link scope
        scope: String,
        /// Link id
        id: String,
        /// Type the link must resolve to
        expected: TypeTag,
    },

    /// A process already has a different output material
    #[error("{process} already produces {existing}; '{material}' cannot share it")]
    OutputMaterialTaken {
        /// Link to the process
        process: String,
        /// Material being written
        material: String,
        /// Link to the material the process already produces
        existing: String,
    },

    /// An ingredient links into a dataset other than its own
    #[error("ingredient '{ingredient}' {field} {link} lives in dataset '{found}', not '{dataset}'")]
    ForeignDataset {
        /// Ingredient name
        ingredient: String,
        /// `process` or `material`
        field: &'static str,
        /// Rendered link
        link: String,
        /// Dataset the ingredient is written to
        dataset: String,
        /// Dataset owning the link target
        found: String,
    },

    /// The object carries no identifier where one is required
    #[error("{0} has no identifier")]
    MissingUid(String),

    /// A write was attempted through a dataset-agnostic collection
    #[error("a dataset must be specified to {0}")]
    MissingDataset(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(Error::from_status(404, "gone"), Error::NotFound(_)));
        assert!(matches!(Error::from_status(401, "bad key"), Error::Unauthorized(_)));
        assert!(matches!(
            Error::from_status(401, "Refresh token expired"),
            Error::UnauthorizedRefreshToken(_)
        ));
        assert!(Error::from_status(503, "busy").is_retryable());
        assert!(Error::from_status(429, "slow down").is_retryable());
        assert!(matches!(
            Error::from_status(400, "bad"),
            Error::NonRetryable { status: 400, .. }
        ));
        assert!(!Error::from_status(409, "conflict").is_retryable());
    }

    #[test]
    fn test_validation_error_converts() {
        let err: Error = ValidationError::MissingDataset("register").into();
        assert!(format!("{err}").contains("a dataset must be specified to register"));
    }
}
