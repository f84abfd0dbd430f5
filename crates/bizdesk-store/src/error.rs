//! Entity store error types
//!
//! Error definitions with classification used by the scanner (which failures
//! count as "zero records") and by the repair executor (which failures count
//! as "already done").

use thiserror::Error;

/// Error that can occur while talking to the entity store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entity type does not exist in this deployment.
    #[error("unknown entity type: {entity}")]
    UnknownEntity { entity: String },

    /// The record does not exist (or was already deleted).
    #[error("{entity} record not found: {id}")]
    NotFound { entity: String, id: String },

    /// The store is temporarily unavailable.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// The request did not complete in time.
    #[error("store request timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The caller is not allowed to perform the operation.
    #[error("permission denied: cannot {operation} {entity}")]
    PermissionDenied { entity: String, operation: String },

    /// A record or dataset could not be decoded.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    /// Any other backend failure.
    #[error("backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type for entity store operations.
pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Create a not-found error.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Create a backend error without a source.
    pub fn backend(message: impl Into<String>) -> Self {
        StoreError::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Check if this error is transient and the call may succeed later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable { .. } | StoreError::Timeout { .. }
        )
    }

    /// Check if the addressed record does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Check if a list failure just means "this entity has no records here".
    ///
    /// An entity type that is not deployed is indistinguishable from an
    /// empty one for auditing purposes.
    pub fn is_empty_equivalent(&self) -> bool {
        matches!(self, StoreError::UnknownEntity { .. })
    }

    /// Get an error code for classification.
    pub fn error_code(&self) -> &'static str {
        match self {
            StoreError::UnknownEntity { .. } => "UNKNOWN_ENTITY",
            StoreError::NotFound { .. } => "NOT_FOUND",
            StoreError::Unavailable { .. } => "STORE_UNAVAILABLE",
            StoreError::Timeout { .. } => "STORE_TIMEOUT",
            StoreError::PermissionDenied { .. } => "PERMISSION_DENIED",
            StoreError::InvalidData { .. } => "INVALID_DATA",
            StoreError::Backend { .. } => "BACKEND_ERROR",
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::InvalidData {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Backend {
            message: e.to_string(),
            source: Some(Box::new(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(StoreError::Unavailable {
            message: "503".to_string()
        }
        .is_transient());
        assert!(StoreError::Timeout { timeout_secs: 5 }.is_transient());
        assert!(!StoreError::not_found("Sale", "S1").is_transient());
        assert!(!StoreError::backend("boom").is_transient());
    }

    #[test]
    fn test_empty_equivalent_only_for_unknown_entity() {
        assert!(StoreError::UnknownEntity {
            entity: "Payroll".to_string()
        }
        .is_empty_equivalent());
        assert!(!StoreError::PermissionDenied {
            entity: "Employee".to_string(),
            operation: "list".to_string(),
        }
        .is_empty_equivalent());
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreError::not_found("Sale", "S1").error_code(), "NOT_FOUND");
        assert_eq!(StoreError::backend("x").error_code(), "BACKEND_ERROR");
        assert_eq!(
            StoreError::Timeout { timeout_secs: 1 }.error_code(),
            "STORE_TIMEOUT"
        );
    }

    #[test]
    fn test_display() {
        let err = StoreError::not_found("Attendance", "A9");
        assert_eq!(err.to_string(), "Attendance record not found: A9");
    }
}
