//! Data store error types
//!
//! Errors carry the operation that failed and the collection involved so the
//! Error Normalizer can turn them into client-facing messages.

use std::fmt;

/// Store operations that can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Insert,
    FindById,
    Find,
    Count,
    Replace,
    Delete,
    Clear,
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::FindById => write!(f, "find_by_id"),
            Self::Find => write!(f, "find"),
            Self::Count => write!(f, "count"),
            Self::Replace => write!(f, "replace"),
            Self::Delete => write!(f, "delete"),
            Self::Clear => write!(f, "clear"),
        }
    }
}

/// A single schema rule violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Category of store failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreErrorKind {
    /// An identifier could not be cast to the store's id format
    InvalidId { path: String, value: String },
    /// A unique index rejected the write
    DuplicateKey { field: String, value: String },
    /// The document broke one or more schema rules
    Validation(Vec<FieldError>),
    /// The backend could not serve the request
    Unavailable(String),
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { .. } => write!(f, "invalid_id"),
            Self::DuplicateKey { .. } => write!(f, "duplicate_key"),
            Self::Validation(_) => write!(f, "validation"),
            Self::Unavailable(_) => write!(f, "unavailable"),
        }
    }
}

/// Error raised by a [`DocumentStore`](super::DocumentStore) or schema check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub operation: StoreOperation,
    pub kind: StoreErrorKind,
    pub collection: Option<String>,
}

impl StoreError {
    pub fn new(operation: StoreOperation, kind: StoreErrorKind) -> Self {
        Self {
            operation,
            kind,
            collection: None,
        }
    }

    pub fn invalid_id(
        operation: StoreOperation,
        path: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            operation,
            StoreErrorKind::InvalidId {
                path: path.into(),
                value: value.into(),
            },
        )
    }

    pub fn duplicate_key(
        operation: StoreOperation,
        field: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            operation,
            StoreErrorKind::DuplicateKey {
                field: field.into(),
                value: value.into(),
            },
        )
    }

    pub fn validation(operation: StoreOperation, errors: Vec<FieldError>) -> Self {
        Self::new(operation, StoreErrorKind::Validation(errors))
    }

    pub fn unavailable(operation: StoreOperation, message: impl Into<String>) -> Self {
        Self::new(operation, StoreErrorKind::Unavailable(message.into()))
    }

    #[must_use]
    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Messages of every failed schema rule, empty for other kinds
    pub fn field_messages(&self) -> Vec<&str> {
        match &self.kind {
            StoreErrorKind::Validation(errors) => {
                errors.iter().map(|e| e.message.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Store {} error during {}", self.kind, self.operation)?;
        if let Some(collection) = &self.collection {
            write!(f, " on {collection}")?;
        }
        match &self.kind {
            StoreErrorKind::InvalidId { path, value } => write!(f, ": {path}={value}"),
            StoreErrorKind::DuplicateKey { field, value } => write!(f, ": {field}={value}"),
            StoreErrorKind::Validation(errors) => {
                let messages: Vec<String> = errors.iter().map(ToString::to_string).collect();
                write!(f, ": {}", messages.join(", "))
            }
            StoreErrorKind::Unavailable(message) => write!(f, ": {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let error = StoreError::duplicate_key(StoreOperation::Insert, "name", "The Forest Hiker")
            .with_collection("tours");
        assert_eq!(
            error.to_string(),
            "Store duplicate_key error during insert on tours: name=The Forest Hiker"
        );
    }

    #[test]
    fn test_field_messages() {
        let error = StoreError::validation(
            StoreOperation::Insert,
            vec![
                FieldError::new("name", "A tour must have a name"),
                FieldError::new("price", "A tour must have a price"),
            ],
        );
        assert_eq!(
            error.field_messages(),
            vec!["A tour must have a name", "A tour must have a price"]
        );

        let other = StoreError::unavailable(StoreOperation::Find, "offline");
        assert!(other.field_messages().is_empty());
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(StoreOperation::FindById.to_string(), "find_by_id");
        assert_eq!(StoreOperation::Replace.to_string(), "replace");
    }
}
