//! Error types for the store layer.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
///
/// Missing ids are never errors: lookups on absent keys return empty
/// results. Errors are reserved for malformed requests against the
/// store's declared shape.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A named index was requested that was never declared.
    #[error("unknown index: {name}")]
    UnknownIndex {
        /// The requested index name.
        name: String,
    },

    /// A predicate referenced a field with no index and no registered
    /// accessor, so not even the scan fallback can evaluate it.
    #[error("unknown query field: {field}")]
    UnknownField {
        /// The requested field name.
        field: String,
    },

    /// A predicate could not be built from its textual form.
    #[error("invalid predicate {input:?}: {message}")]
    InvalidPredicate {
        /// The offending input.
        input: String,
        /// Description of the problem.
        message: String,
    },
}

impl StoreError {
    /// Creates an unknown-index error.
    pub fn unknown_index(name: impl Into<String>) -> Self {
        Self::UnknownIndex { name: name.into() }
    }

    /// Creates an unknown-field error.
    pub fn unknown_field(field: impl Into<String>) -> Self {
        Self::UnknownField {
            field: field.into(),
        }
    }

    /// Creates an invalid-predicate error.
    pub fn invalid_predicate(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPredicate {
            input: input.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let err = StoreError::unknown_index("version");
        assert_eq!(err.to_string(), "unknown index: version");

        let err = StoreError::unknown_field("node");
        assert_eq!(err.to_string(), "unknown query field: node");

        let err = StoreError::invalid_predicate("xx:1", "unknown operator");
        assert!(err.to_string().contains("xx:1"));
        assert!(err.to_string().contains("unknown operator"));
    }
}
