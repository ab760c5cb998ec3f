//! Unified error handling for the vulcanizer supervision services
//!
//! A closed set of error kinds shared by the acquisition and recipe crates so
//! callers branch on [`ErrorKind`] instead of message text.

use thiserror::Error;

// ============================================================================
// VulcanError - Main error type
// ============================================================================

/// Error kind, one per taxonomy branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Link,
    Decode,
    NotFound,
    Validation,
    Persistence,
    Conflict,
    InvalidTransition,
    Delivery,
    Configuration,
    Internal,
}

/// Main error type for all services
#[derive(Debug, Error)]
pub enum VulcanError {
    // ======================================
    // Controller link
    // ======================================
    #[error("Link error: {0}")]
    Link(String),

    #[error("Decode error: {0}")]
    Decode(String),

    // ======================================
    // Recipe lifecycle
    // ======================================
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition for recipe {id}: {from} -> {to}")]
    InvalidTransition { id: i64, from: String, to: String },

    #[error("Delivery error: {0}")]
    Delivery(String),

    // ======================================
    // Storage
    // ======================================
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    // ======================================
    // Service & Runtime Errors
    // ======================================
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VulcanError
pub type VulcanResult<T> = Result<T, VulcanError>;

impl VulcanError {
    /// Recipe id absent from the store
    pub fn recipe_not_found(id: i64) -> Self {
        Self::NotFound {
            resource: format!("recipe {}", id),
        }
    }

    /// Caller-supplied field violates a recipe invariant
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Closed classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Link(_) => ErrorKind::Link,
            Self::Decode(_) => ErrorKind::Decode,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            Self::Delivery(_) => ErrorKind::Delivery,
            Self::Persistence(_) | Self::Sqlite(_) => ErrorKind::Persistence,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Io(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict | ErrorKind::InvalidTransition => 409,
            ErrorKind::Link | ErrorKind::Delivery => 502,
            ErrorKind::Persistence => 503,
            ErrorKind::Decode | ErrorKind::Configuration | ErrorKind::Internal => 500,
        }
    }
}

// Conversion traits for common error types
impl From<serde_json::Error> for VulcanError {
    fn from(err: serde_json::Error) -> Self {
        Self::Persistence(format!("Serialization: {}", err))
    }
}

// Helper macros for creating errors
#[macro_export]
macro_rules! config_error {
    ($msg:expr) => {
        $crate::VulcanError::Configuration($msg.to_string())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::VulcanError::Configuration(format!($fmt, $($arg)*))
    };
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(VulcanError::recipe_not_found(7).kind(), ErrorKind::NotFound);
        assert_eq!(
            VulcanError::validation("name", "required").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            VulcanError::Persistence("locked".into()).kind(),
            ErrorKind::Persistence
        );
        assert_eq!(
            VulcanError::from(sqlx::Error::RowNotFound).kind(),
            ErrorKind::Persistence
        );
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(VulcanError::validation("x", "y").status_code(), 400);
        assert_eq!(VulcanError::recipe_not_found(1).status_code(), 404);
        assert_eq!(VulcanError::Conflict("stale".into()).status_code(), 409);
        assert_eq!(VulcanError::Link("down".into()).status_code(), 502);
    }

    #[test]
    fn test_config_error_macro() {
        let err = config_error!("bad port {}", 0);
        assert_eq!(err.to_string(), "Configuration error: bad port 0");
    }
}
