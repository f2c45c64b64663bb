//! Document store collaborator
//!
//! Resources are persisted as JSON objects through the [`DocumentStore`]
//! trait. The store owns three fields on every document: the identifier
//! ([`ID_FIELD`]), the write version ([`VERSION_FIELD`]) and the creation
//! timestamp ([`CREATED_AT_FIELD`]). Validation and lifecycle steps live in
//! the repository layer above, so backends only need to honour the query
//! types in [`query`] and the unique indexes registered with
//! [`DocumentStore::ensure_unique`].

pub mod error;
pub mod memory;
pub mod query;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

pub use error::{FieldError, StoreError, StoreErrorKind, StoreOperation, StoreResult};
pub use memory::MemoryStore;
pub use query::{
    Filter, FilterCondition, FilterOperator, FilterValue, OrderDirection, Projection, ReadQuery,
    SortKey,
};

/// A stored record
pub type Document = serde_json::Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const VERSION_FIELD: &str = "__v";
pub const CREATED_AT_FIELD: &str = "createdAt";

/// Persistence contract used by every resource collection
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Register a unique index over one or more fields
    async fn ensure_unique(&self, collection: &str, fields: &[&str]) -> StoreResult<()>;

    /// Insert a document, assigning an identifier when none is present
    async fn insert(&self, collection: &str, doc: Document) -> StoreResult<Document>;

    async fn find_by_id(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    async fn find(&self, collection: &str, query: &ReadQuery) -> StoreResult<Vec<Document>>;

    async fn count(&self, collection: &str, filter: &Filter) -> StoreResult<u64>;

    /// Replace the stored document, returning the new version if it existed
    async fn replace(
        &self,
        collection: &str,
        id: &str,
        doc: Document,
    ) -> StoreResult<Option<Document>>;

    /// Remove a document, returning it if it existed
    async fn delete(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;

    /// Remove every document in a collection, returning how many were dropped
    async fn clear(&self, collection: &str) -> StoreResult<u64>;
}

/// Validate an identifier string
pub fn parse_id(operation: StoreOperation, value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|_| StoreError::invalid_id(operation, ID_FIELD, value))
}

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Timestamp format used for every stored date; sorts lexicographically
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn now_timestamp() -> String {
    timestamp(Utc::now())
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Identifier of a stored document
pub fn document_id(doc: &Document) -> Option<&str> {
    doc.get(ID_FIELD).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_id() {
        let id = new_id();
        assert!(parse_id(StoreOperation::FindById, &id).is_ok());

        let err = parse_id(StoreOperation::FindById, "xyz").unwrap_err();
        assert_eq!(
            err.kind,
            StoreErrorKind::InvalidId {
                path: "id".into(),
                value: "xyz".into()
            }
        );
    }

    #[test]
    fn test_timestamp_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let stamp = timestamp(at);
        assert_eq!(stamp, "2024-03-01T12:00:00.000Z");
        assert_eq!(parse_timestamp(&Value::String(stamp)), Some(at));
    }

    #[test]
    fn test_timestamps_sort_chronologically() {
        let earlier = timestamp(Utc.with_ymd_and_hms(2024, 1, 9, 0, 0, 0).unwrap());
        let later = timestamp(Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap());
        assert!(earlier < later);
    }
}
